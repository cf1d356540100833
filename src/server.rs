//! The multiplexed event loop.
//!
//! One poll(2) set per iteration: the listening socket, the keyboard, the
//! pointer, and every client connection. Any state change that touched
//! pixels set the display's redraw flag; the top of the next iteration
//! composites and submits one frame.

use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixListener;

use log::{debug, info, warn};

use crate::connection::Connection;
use crate::device::{FbDevice, KeyboardDevice, PointerDevice, VideoOutput};
use crate::scene::Display;

pub struct Server {
    display: Display,
    listener: UnixListener,
    video: FbDevice,
    keyboard: KeyboardDevice,
    pointer: PointerDevice,
    connections: Vec<Connection>,
    pollfds: Vec<libc::pollfd>,
    unit_buf: Vec<u32>,
    next_conn_id: u64,
}

// Fixed poll slots before the per-connection ones.
const SLOT_LISTENER: usize = 0;
const SLOT_KEYBOARD: usize = 1;
const SLOT_POINTER: usize = 2;
const FIXED_SLOTS: usize = 3;

impl Server {
    pub fn new(
        display: Display,
        listener: UnixListener,
        video: FbDevice,
        keyboard: KeyboardDevice,
        pointer: PointerDevice,
    ) -> io::Result<Server> {
        listener.set_nonblocking(true)?;
        Ok(Server {
            display,
            listener,
            video,
            keyboard,
            pointer,
            connections: Vec::new(),
            pollfds: Vec::new(),
            unit_buf: Vec::new(),
            next_conn_id: 1,
        })
    }

    /// Run until an exit is requested; returns the exit code. Only device
    /// I/O failures propagate as errors.
    pub fn run(&mut self) -> io::Result<i32> {
        loop {
            if self.display.redraw_wanted() {
                self.render()?;
            }
            if !self.display.running() {
                return Ok(self.display.exit_code());
            }

            let polled_connections = self.rebuild_pollfds();
            self.wait()?;

            if self.revents(SLOT_LISTENER) != 0 {
                self.accept_clients();
            }
            if self.revents(SLOT_KEYBOARD) != 0 {
                self.read_keyboard()?;
            }
            if self.revents(SLOT_POINTER) != 0 {
                self.read_pointer()?;
            }
            for index in 0..polled_connections {
                let revents = self.revents(FIXED_SLOTS + index);
                if revents == 0 {
                    continue;
                }
                let conn = &mut self.connections[index];
                if revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                    debug!("connection {}: hangup", conn.id());
                    conn.mark_dead();
                    continue;
                }
                if revents & libc::POLLOUT != 0 {
                    conn.flush();
                }
                if revents & libc::POLLIN != 0 {
                    conn.service_read(&mut self.display, &mut self.video, &mut self.keyboard);
                }
            }

            self.deliver_events();
            self.reap_dead();
        }
    }

    fn render(&mut self) -> io::Result<()> {
        // The device is authoritative about the mode; adopt whatever it
        // currently reports before compositing.
        self.display.reconfigure(self.video.current_mode());
        self.display.composite();
        self.video.submit(self.display.output())
    }

    fn rebuild_pollfds(&mut self) -> usize {
        self.pollfds.clear();
        for fd in [
            self.listener.as_raw_fd(),
            self.keyboard.as_raw_fd(),
            self.pointer.as_raw_fd(),
        ] {
            self.pollfds.push(libc::pollfd { fd, events: libc::POLLIN, revents: 0 });
        }
        for conn in &self.connections {
            let mut events = libc::POLLIN;
            if conn.wants_write() {
                events |= libc::POLLOUT;
            }
            self.pollfds.push(libc::pollfd { fd: conn.as_raw_fd(), events, revents: 0 });
        }
        self.pollfds.len() - FIXED_SLOTS
    }

    fn wait(&mut self) -> io::Result<()> {
        loop {
            let rc = unsafe {
                libc::poll(
                    self.pollfds.as_mut_ptr(),
                    self.pollfds.len() as libc::nfds_t,
                    -1,
                )
            };
            if rc >= 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    fn revents(&self, slot: usize) -> libc::c_short {
        self.pollfds.get(slot).map(|p| p.revents).unwrap_or(0)
    }

    fn accept_clients(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    let id = self.next_conn_id;
                    self.next_conn_id += 1;
                    match Connection::new(id, stream) {
                        Ok(conn) => {
                            info!("connection {} accepted", id);
                            self.connections.push(conn);
                        }
                        Err(err) => warn!("dropping fresh connection: {}", err),
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) => {
                    warn!("accept failed: {}", err);
                    return;
                }
            }
        }
    }

    fn read_keyboard(&mut self) -> io::Result<()> {
        self.unit_buf.clear();
        self.keyboard.read_units(&mut self.unit_buf)?;
        let units = std::mem::take(&mut self.unit_buf);
        for &unit in &units {
            self.display.on_keyboard_unit(unit);
        }
        self.unit_buf = units;
        Ok(())
    }

    fn read_pointer(&mut self) -> io::Result<()> {
        let mut buf = [0u8; 64];
        let n = self.pointer.read_some(&mut buf)?;
        self.display.on_pointer_bytes(&buf[..n]);
        Ok(())
    }

    /// Move queued scene events into the owning connections' rings and try
    /// an opportunistic flush; whatever the sockets refuse waits for
    /// POLLOUT.
    fn deliver_events(&mut self) {
        while let Some((conn_id, event)) = self.display.pop_event() {
            let Some(conn) = self
                .connections
                .iter_mut()
                .find(|c| c.id() == conn_id && !c.is_dead())
            else {
                // Raced with a disconnect; nobody is listening anymore.
                continue;
            };
            conn.schedule_transmit(&event.encode());
        }
        for conn in &mut self.connections {
            if !conn.is_dead() && conn.wants_write() {
                conn.flush();
            }
        }
    }

    /// Destroy dead connections' windows and compact the vector, keeping
    /// the order of the survivors.
    fn reap_dead(&mut self) {
        if self.connections.iter().all(|c| !c.is_dead()) {
            return;
        }
        for conn in &mut self.connections {
            if conn.is_dead() {
                info!("connection {} closed", conn.id());
                conn.teardown(&mut self.display);
            }
        }
        self.connections.retain(|c| !c.is_dead());
        // Window teardown queued no events for the dead client, but it may
        // have refocused or retiled; make sure the scene repaints.
        self.display.schedule_redraw();
    }
}
