//! One client session: framed receiver, transmit ring, window handle
//! table, and request dispatch.
//!
//! The receiver accumulates a header, then exactly `header.size` body
//! bytes; partial reads park progress and EWOULDBLOCK returns without
//! state change. A declared size above the packet ceiling is a protocol
//! violation that tears the session down. Structural errors inside a
//! known message only earn an ack-with-error.

use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use log::{debug, warn};

use crate::device::{LayoutSink, VideoOutput};
use crate::proto::{
    self, Event, Header, Request, HEADER_SIZE, MAX_BODY_SIZE, MAX_WINDOW_HEIGHT,
    MAX_WINDOW_WIDTH,
};
use crate::scene::{ConnId, Display, WindowKey};

/// Window-id space per connection.
pub const MAX_WINDOWS: usize = 256;

#[derive(Debug)]
enum RecvState {
    Header { fill: usize },
    Body { header: Header, fill: usize },
}

/// Progressive header/body accumulation for one stream.
#[derive(Debug)]
pub struct Receiver {
    state: RecvState,
    header_buf: [u8; HEADER_SIZE],
    body: Vec<u8>,
}

impl Default for Receiver {
    fn default() -> Self {
        Receiver {
            state: RecvState::Header { fill: 0 },
            header_buf: [0; HEADER_SIZE],
            body: Vec::new(),
        }
    }
}

impl Receiver {
    /// Pull at most one complete packet. `Ok(None)` means the stream would
    /// block mid-packet; any `Err` is a disconnect.
    pub fn next_packet(&mut self, stream: &mut impl Read) -> io::Result<Option<(Header, Vec<u8>)>> {
        loop {
            match self.state {
                RecvState::Header { fill } => {
                    let n = match stream.read(&mut self.header_buf[fill..]) {
                        Ok(0) => {
                            return Err(io::Error::new(ErrorKind::UnexpectedEof, "client hung up"))
                        }
                        Ok(n) => n,
                        Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e),
                    };
                    let fill = fill + n;
                    if fill < HEADER_SIZE {
                        self.state = RecvState::Header { fill };
                        continue;
                    }
                    let header = Header::parse(self.header_buf);
                    if header.size > MAX_BODY_SIZE {
                        return Err(io::Error::new(
                            ErrorKind::InvalidData,
                            format!("declared packet size {} exceeds the ceiling", header.size),
                        ));
                    }
                    let size = header.size as usize;
                    self.body.clear();
                    if self.body.try_reserve_exact(size).is_err() {
                        return Err(io::Error::new(ErrorKind::OutOfMemory, "body allocation"));
                    }
                    self.body.resize(size, 0);
                    if size == 0 {
                        self.state = RecvState::Header { fill: 0 };
                        return Ok(Some((header, std::mem::take(&mut self.body))));
                    }
                    self.state = RecvState::Body { header, fill: 0 };
                }
                RecvState::Body { header, fill } => {
                    let n = match stream.read(&mut self.body[fill..]) {
                        Ok(0) => {
                            return Err(io::Error::new(ErrorKind::UnexpectedEof, "client hung up"))
                        }
                        Ok(n) => n,
                        Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e),
                    };
                    let fill = fill + n;
                    if fill < self.body.len() {
                        self.state = RecvState::Body { header, fill };
                        continue;
                    }
                    self.state = RecvState::Header { fill: 0 };
                    return Ok(Some((header, std::mem::take(&mut self.body))));
                }
            }
        }
    }
}

/// Outgoing byte queue: one contiguous buffer used as a ring. Never shrunk;
/// when a message does not fit, the occupied region is linearized into a
/// fresh buffer sized exactly `used + count`.
#[derive(Debug, Default)]
pub struct TransmitRing {
    buf: Vec<u8>,
    offset: usize,
    used: usize,
}

impl TransmitRing {
    pub fn used(&self) -> usize {
        self.used
    }

    /// Append bytes, growing fallibly. Err means the allocator refused.
    pub fn schedule(&mut self, bytes: &[u8]) -> Result<(), ()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let free = self.buf.len() - self.used;
        if free < bytes.len() {
            let mut fresh = Vec::new();
            fresh.try_reserve_exact(self.used + bytes.len()).map_err(|_| ())?;
            let (a, b) = self.occupied();
            fresh.extend_from_slice(a);
            fresh.extend_from_slice(b);
            fresh.extend_from_slice(bytes);
            self.used = fresh.len();
            self.offset = 0;
            self.buf = fresh;
            return Ok(());
        }
        let start = (self.offset + self.used) % self.buf.len();
        let tail = (self.buf.len() - start).min(bytes.len());
        self.buf[start..start + tail].copy_from_slice(&bytes[..tail]);
        self.buf[..bytes.len() - tail].copy_from_slice(&bytes[tail..]);
        self.used += bytes.len();
        Ok(())
    }

    fn occupied(&self) -> (&[u8], &[u8]) {
        let end = (self.offset + self.used).min(self.buf.len());
        let first = &self.buf[self.offset..end];
        let wrapped = self.used - first.len();
        (first, &self.buf[..wrapped])
    }

    /// Write as much as the sink accepts: from the offset up to the wrap,
    /// then from the start. EWOULDBLOCK leaves the rest queued.
    pub fn drain(&mut self, sink: &mut impl Write) -> io::Result<()> {
        while self.used > 0 {
            let end = (self.offset + self.used).min(self.buf.len());
            let chunk_len = end - self.offset;
            let written = match sink.write(&self.buf[self.offset..end]) {
                Ok(0) => return Err(io::Error::new(ErrorKind::WriteZero, "peer stopped reading")),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.offset += written;
            self.used -= written;
            if self.offset == self.buf.len() {
                self.offset = 0;
            }
            if written < chunk_len {
                // Partial write; the socket buffer is full enough.
                return Ok(());
            }
        }
        Ok(())
    }
}

pub struct Connection {
    id: ConnId,
    stream: UnixStream,
    receiver: Receiver,
    ring: TransmitRing,
    windows: Box<[Option<WindowKey>; MAX_WINDOWS]>,
    dead: bool,
}

impl Connection {
    pub fn new(id: ConnId, stream: UnixStream) -> io::Result<Connection> {
        stream.set_nonblocking(true)?;
        Ok(Connection {
            id,
            stream,
            receiver: Receiver::default(),
            ring: TransmitRing::default(),
            windows: Box::new([None; MAX_WINDOWS]),
            dead: false,
        })
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn mark_dead(&mut self) {
        self.dead = true;
    }

    /// POLLOUT interest: anything queued?
    pub fn wants_write(&self) -> bool {
        self.ring.used() > 0
    }

    pub fn schedule_transmit(&mut self, bytes: &[u8]) {
        if self.ring.schedule(bytes).is_err() {
            warn!("connection {}: transmit queue allocation failed", self.id);
            self.dead = true;
        }
    }

    pub fn flush(&mut self) {
        let mut stream = &self.stream;
        if let Err(err) = self.ring.drain(&mut stream) {
            debug!("connection {}: write failed: {}", self.id, err);
            self.dead = true;
        }
    }

    /// Ingest and dispatch at most one complete packet.
    pub fn service_read<V: VideoOutput, L: LayoutSink>(
        &mut self,
        display: &mut Display,
        video: &mut V,
        layout: &mut L,
    ) {
        let packet = {
            let mut stream = &self.stream;
            self.receiver.next_packet(&mut stream)
        };
        match packet {
            Ok(Some((header, body))) => self.dispatch(header, &body, display, video, layout),
            Ok(None) => {}
            Err(err) => {
                debug!("connection {}: {}", self.id, err);
                self.dead = true;
            }
        }
    }

    fn window_key(&self, window_id: u32) -> Option<WindowKey> {
        *self.windows.get(window_id as usize)?
    }

    fn ack(&self, display: &mut Display, id: u32, error: i32) {
        display.push_event(self.id, Event::Ack { id, error });
    }

    fn dispatch<V: VideoOutput, L: LayoutSink>(
        &mut self,
        header: Header,
        body: &[u8],
        display: &mut Display,
        video: &mut V,
        layout: &mut L,
    ) {
        let request = match proto::parse(header.id, body) {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!("connection {}: ignoring unknown message {}", self.id, header.id);
                return;
            }
            Err(bad) => {
                warn!(
                    "connection {}: malformed message {} ({} bytes)",
                    self.id, header.id, header.size
                );
                self.ack(display, bad.request_id, bad.error);
                return;
            }
        };
        match request {
            Request::CreateWindow { window_id } => {
                if window_id as usize >= MAX_WINDOWS
                    || self.windows[window_id as usize].is_some()
                {
                    self.ack(display, window_id, proto::ERR_BAD_WINDOW);
                    return;
                }
                match display.create_window(self.id, window_id) {
                    Some(key) => self.windows[window_id as usize] = Some(key),
                    None => self.ack(display, window_id, proto::ERR_NO_MEMORY),
                }
            }
            Request::DestroyWindow { window_id } => {
                match self.windows.get_mut(window_id as usize).and_then(|w| w.take()) {
                    Some(key) => display.destroy_window(key),
                    None => self.ack(display, window_id, proto::ERR_BAD_WINDOW),
                }
            }
            Request::ResizeWindow { window_id, width, height } => {
                if width > MAX_WINDOW_WIDTH || height > MAX_WINDOW_HEIGHT {
                    self.ack(display, window_id, proto::ERR_BAD_VALUE);
                    return;
                }
                match self.window_key(window_id) {
                    Some(key) => display.resize_window(key, width, height),
                    None => self.ack(display, window_id, proto::ERR_BAD_WINDOW),
                }
            }
            Request::RenderWindow { window_id, left, top, width, height, pixels } => {
                match self.window_key(window_id) {
                    Some(key) => display.render_window(key, left, top, width, height, pixels),
                    None => self.ack(display, window_id, proto::ERR_BAD_WINDOW),
                }
            }
            Request::TitleWindow { window_id, title } => match self.window_key(window_id) {
                Some(key) => display.title_window(key, title),
                None => self.ack(display, window_id, proto::ERR_BAD_WINDOW),
            },
            Request::ShowWindow { window_id } => match self.window_key(window_id) {
                Some(key) => display.show_window(key, true),
                None => self.ack(display, window_id, proto::ERR_BAD_WINDOW),
            },
            Request::HideWindow { window_id } => match self.window_key(window_id) {
                Some(key) => display.show_window(key, false),
                None => self.ack(display, window_id, proto::ERR_BAD_WINDOW),
            },
            Request::Shutdown { code } => {
                display.request_exit(code as i32);
            }
            Request::ChkbLayout { id, layout: blob } => match layout.set_layout(blob) {
                Ok(()) => self.ack(display, id, 0),
                Err(err) => {
                    warn!("connection {}: keyboard layout rejected: {}", self.id, err);
                    self.ack(display, id, proto::ERR_DEVICE);
                }
            },
            Request::RequestDisplays { id } => {
                display.push_event(self.id, Event::Displays { id, count: 1 });
            }
            Request::RequestDisplayModes { id, display_id } => {
                if display_id != 0 {
                    self.ack(display, id, proto::ERR_BAD_DISPLAY);
                    return;
                }
                display.push_event(self.id, Event::DisplayModes { id, modes: video.modes() });
            }
            Request::RequestDisplayMode { id, display_id } => {
                if display_id != 0 {
                    self.ack(display, id, proto::ERR_BAD_DISPLAY);
                    return;
                }
                display.push_event(
                    self.id,
                    Event::DisplayMode { id, mode: video.current_mode() },
                );
            }
            Request::SetDisplayMode { id, display_id, mode } => {
                if display_id != 0 {
                    self.ack(display, id, proto::ERR_BAD_DISPLAY);
                    return;
                }
                if mode.view_xres == 0 || mode.view_yres == 0 {
                    self.ack(display, id, proto::ERR_BAD_VALUE);
                    return;
                }
                match video.set_mode(mode) {
                    Ok(actual) => {
                        display.reconfigure(actual);
                        self.ack(display, id, 0);
                    }
                    Err(err) => {
                        warn!("connection {}: mode set failed: {}", self.id, err);
                        self.ack(display, id, proto::ERR_DEVICE);
                    }
                }
            }
        }
    }

    /// Forget every window this client owned; the display destroys the
    /// bodies.
    pub fn teardown(&mut self, display: &mut Display) {
        display.destroy_connection_windows(self.id);
        self.windows.fill(None);
        self.dead = true;
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::font::test_font;
    use crate::proto::CrtcMode;

    struct TestVideo {
        mode: CrtcMode,
    }

    impl VideoOutput for TestVideo {
        fn current_mode(&self) -> CrtcMode {
            self.mode
        }
        fn modes(&self) -> Vec<CrtcMode> {
            vec![self.mode]
        }
        fn set_mode(&mut self, mode: CrtcMode) -> io::Result<CrtcMode> {
            self.mode = mode;
            Ok(mode)
        }
        fn submit(&mut self, _fb: &crate::gfx::Framebuffer) -> io::Result<()> {
            Ok(())
        }
    }

    struct TestLayout {
        applied: Vec<Vec<u8>>,
    }

    impl LayoutSink for TestLayout {
        fn set_layout(&mut self, blob: &[u8]) -> io::Result<()> {
            self.applied.push(blob.to_vec());
            Ok(())
        }
    }

    fn harness() -> (Display, TestVideo, TestLayout) {
        let mode = CrtcMode { view_xres: 1024, view_yres: 768, fb_format: 32 };
        let display = Display::new(mode, test_font(), 1, "terminal".into()).expect("display");
        (display, TestVideo { mode }, TestLayout { applied: Vec::new() })
    }

    /// Reader handing out a byte stream in fixed-size slices, ending with
    /// WouldBlock like a drained socket.
    struct ChunkReader {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl Read for ChunkReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos == self.data.len() {
                return Err(io::Error::new(ErrorKind::WouldBlock, "drained"));
            }
            let n = self.chunk.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    /// Writer that accepts a bounded number of bytes per call, then blocks.
    struct ThrottledWriter {
        accepted: Vec<u8>,
        per_call: usize,
        budget: usize,
    }

    impl Write for ThrottledWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(ErrorKind::WouldBlock, "full"));
            }
            let n = self.per_call.min(buf.len()).min(self.budget);
            self.accepted.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn framing_round_trips_across_arbitrary_splits() {
        let mut stream = Vec::new();
        stream.extend(proto::encode_request(proto::MSG_CREATE_WINDOW, &[7], &[]));
        stream.extend(proto::encode_request(proto::MSG_RESIZE_WINDOW, &[7, 100, 50], &[]));
        let pixels = vec![0xABu8; 4 * 4 * 4];
        stream.extend(proto::encode_request(
            proto::MSG_RENDER_WINDOW,
            &[7, 0, 0, 4, 4],
            &pixels,
        ));

        for chunk in [1, 2, 3, 5, 7, stream.len()] {
            let mut reader = ChunkReader { data: stream.clone(), pos: 0, chunk };
            let mut receiver = Receiver::default();
            let mut packets = Vec::new();
            while let Some(packet) = receiver.next_packet(&mut reader).expect("framing") {
                packets.push(packet);
            }
            assert_eq!(packets.len(), 3, "chunk size {}", chunk);
            assert_eq!(packets[0].0, Header { id: proto::MSG_CREATE_WINDOW, size: 4 });
            assert_eq!(packets[1].0, Header { id: proto::MSG_RESIZE_WINDOW, size: 12 });
            assert_eq!(packets[2].0.size as usize, 20 + pixels.len());
            assert_eq!(&packets[2].1[20..], &pixels[..]);
        }
    }

    #[test]
    fn oversized_header_is_a_disconnect() {
        let mut bytes = Vec::new();
        bytes.extend(1u32.to_le_bytes());
        bytes.extend((1u32 << 30).to_le_bytes());
        let mut reader = ChunkReader { data: bytes, pos: 0, chunk: 8 };
        let mut receiver = Receiver::default();
        assert!(receiver.next_packet(&mut reader).is_err());
    }

    #[test]
    fn ring_preserves_byte_order_across_partial_writes() {
        let mut ring = TransmitRing::default();
        let mut expected = Vec::new();
        for i in 0..10u8 {
            let msg = vec![i; 1024];
            ring.schedule(&msg).expect("schedule");
            expected.extend_from_slice(&msg);
        }
        assert_eq!(ring.used(), 10 * 1024);

        let mut sink = ThrottledWriter { accepted: Vec::new(), per_call: 1024, budget: 1024 };
        for _ in 0..10 {
            ring.drain(&mut sink).expect("drain");
            sink.budget = 1024;
        }
        assert_eq!(ring.used(), 0);
        assert_eq!(sink.accepted, expected);
    }

    #[test]
    fn ring_interleaves_schedule_and_drain() {
        let mut ring = TransmitRing::default();
        let mut expected = Vec::new();
        let mut sink = ThrottledWriter { accepted: Vec::new(), per_call: 7, budget: usize::MAX };
        for round in 0..50u8 {
            let msg: Vec<u8> = (0..13).map(|i| round.wrapping_mul(31).wrapping_add(i)).collect();
            ring.schedule(&msg).expect("schedule");
            expected.extend_from_slice(&msg);
            ring.drain(&mut sink).expect("drain");
        }
        while ring.used() > 0 {
            ring.drain(&mut sink).expect("drain");
        }
        assert_eq!(sink.accepted, expected);
    }

    #[test]
    fn create_resize_render_destroy_over_a_socket() {
        let (mut display, mut video, mut layout) = harness();
        let (client, server) = UnixStream::pair().expect("socketpair");
        client.set_nonblocking(true).expect("nonblocking");
        let mut conn = Connection::new(1, server).expect("connection");

        let mut send = |bytes: &[u8]| {
            (&client).write_all(bytes).expect("send");
        };
        send(&proto::encode_request(proto::MSG_CREATE_WINDOW, &[7], &[]));
        conn.service_read(&mut display, &mut video, &mut layout);
        send(&proto::encode_request(proto::MSG_RESIZE_WINDOW, &[7, 100, 50], &[]));
        conn.service_read(&mut display, &mut video, &mut layout);

        let mut resizes = Vec::new();
        while let Some((conn_id, event)) = display.pop_event() {
            assert_eq!(conn_id, 1);
            if let Event::Resize { window_id, width, height } = event {
                resizes.push((window_id, width, height));
            }
        }
        assert_eq!(resizes, vec![(7, 0, 0), (7, 100, 50)]);

        send(&proto::encode_request(proto::MSG_DESTROY_WINDOW, &[7], &[]));
        conn.service_read(&mut display, &mut video, &mut layout);
        assert!(display.pop_event().is_none());
        // The id is free again.
        send(&proto::encode_request(proto::MSG_CREATE_WINDOW, &[7], &[]));
        conn.service_read(&mut display, &mut video, &mut layout);
        assert!(matches!(display.pop_event(), Some((1, Event::Resize { .. }))));
        assert!(!conn.is_dead());
    }

    #[test]
    fn oversize_packet_kills_connection_and_its_windows() {
        let (mut display, mut video, mut layout) = harness();
        let (client, server) = UnixStream::pair().expect("socketpair");
        let mut conn = Connection::new(1, server).expect("connection");

        (&client)
            .write_all(&proto::encode_request(proto::MSG_CREATE_WINDOW, &[3], &[]))
            .expect("send");
        conn.service_read(&mut display, &mut video, &mut layout);
        while display.pop_event().is_some() {}

        let mut evil = Vec::new();
        evil.extend(proto::MSG_RENDER_WINDOW.to_le_bytes());
        evil.extend((1u32 << 30).to_le_bytes());
        (&client).write_all(&evil).expect("send");
        conn.service_read(&mut display, &mut video, &mut layout);
        assert!(conn.is_dead());

        conn.teardown(&mut display);
        display.schedule_redraw();
        display.composite();
        // No window pixels left: recreate the same scene from scratch and
        // compare against a fresh empty display.
        let (mut empty, _, _) = harness();
        empty.composite();
        assert_eq!(display.output().pixels(), empty.output().pixels());
    }

    #[test]
    fn bad_window_ids_get_acks_not_disconnects() {
        let (mut display, mut video, mut layout) = harness();
        let (client, server) = UnixStream::pair().expect("socketpair");
        let mut conn = Connection::new(1, server).expect("connection");

        (&client)
            .write_all(&proto::encode_request(proto::MSG_RESIZE_WINDOW, &[9, 10, 10], &[]))
            .expect("send");
        conn.service_read(&mut display, &mut video, &mut layout);
        assert!(matches!(
            display.pop_event(),
            Some((1, Event::Ack { id: 9, error: proto::ERR_BAD_WINDOW }))
        ));
        assert!(!conn.is_dead());

        // Truncated body: ack with the leading u32 echoed.
        let mut short = Vec::new();
        short.extend(proto::MSG_RESIZE_WINDOW.to_le_bytes());
        short.extend(4u32.to_le_bytes());
        short.extend(9u32.to_le_bytes());
        (&client).write_all(&short).expect("send");
        conn.service_read(&mut display, &mut video, &mut layout);
        assert!(matches!(
            display.pop_event(),
            Some((1, Event::Ack { id: 9, error: proto::ERR_BAD_SIZE }))
        ));
        assert!(!conn.is_dead());
    }

    #[test]
    fn display_requests_and_layout() {
        let (mut display, mut video, mut layout) = harness();
        let (client, server) = UnixStream::pair().expect("socketpair");
        let mut conn = Connection::new(1, server).expect("connection");

        (&client)
            .write_all(&proto::encode_request(proto::MSG_REQUEST_DISPLAYS, &[5], &[]))
            .expect("send");
        conn.service_read(&mut display, &mut video, &mut layout);
        assert!(matches!(
            display.pop_event(),
            Some((1, Event::Displays { id: 5, count: 1 }))
        ));

        (&client)
            .write_all(&proto::encode_request(proto::MSG_CHKBLAYOUT, &[6], b"dvorak"))
            .expect("send");
        conn.service_read(&mut display, &mut video, &mut layout);
        assert!(matches!(
            display.pop_event(),
            Some((1, Event::Ack { id: 6, error: 0 }))
        ));
        assert_eq!(layout.applied, vec![b"dvorak".to_vec()]);

        // Mode set on a display that does not exist.
        (&client)
            .write_all(&proto::encode_request(
                proto::MSG_SET_DISPLAY_MODE,
                &[8, 3, 800, 600, 32],
                &[],
            ))
            .expect("send");
        conn.service_read(&mut display, &mut video, &mut layout);
        assert!(matches!(
            display.pop_event(),
            Some((1, Event::Ack { id: 8, error: proto::ERR_BAD_DISPLAY }))
        ));

        // And on the real one.
        (&client)
            .write_all(&proto::encode_request(
                proto::MSG_SET_DISPLAY_MODE,
                &[9, 0, 800, 600, 32],
                &[],
            ))
            .expect("send");
        conn.service_read(&mut display, &mut video, &mut layout);
        assert!(matches!(
            display.pop_event(),
            Some((1, Event::Ack { id: 9, error: 0 }))
        ));
        assert_eq!(display.screen_width(), 800);
        assert_eq!(video.mode.view_xres, 800);
    }
}
