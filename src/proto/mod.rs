//! Wire protocol.
//!
//! Every packet in both directions is a little-endian `{ id: u32, size: u32 }`
//! header followed by `size` body bytes: a fixed struct, then message-defined
//! auxiliary bytes. The declared size is untrusted until it has been checked
//! against [`MAX_BODY_SIZE`] and the per-message size table.

use bytes::{Buf, BufMut};

pub const HEADER_SIZE: usize = 8;

/// Ceiling on the declared body size. A header above this tears the
/// connection down rather than earning an ack.
pub const MAX_BODY_SIZE: u32 = 64 * 1024;

/// Largest client area a window may request, either axis.
pub const MAX_WINDOW_WIDTH: u32 = 16384;
pub const MAX_WINDOW_HEIGHT: u32 = 6144;

// Client -> server requests, ids dense from zero.
pub const MSG_CREATE_WINDOW: u32 = 0;
pub const MSG_DESTROY_WINDOW: u32 = 1;
pub const MSG_RESIZE_WINDOW: u32 = 2;
pub const MSG_RENDER_WINDOW: u32 = 3;
pub const MSG_TITLE_WINDOW: u32 = 4;
pub const MSG_SHOW_WINDOW: u32 = 5;
pub const MSG_HIDE_WINDOW: u32 = 6;
pub const MSG_SHUTDOWN: u32 = 7;
pub const MSG_CHKBLAYOUT: u32 = 8;
pub const MSG_REQUEST_DISPLAYS: u32 = 9;
pub const MSG_REQUEST_DISPLAY_MODES: u32 = 10;
pub const MSG_REQUEST_DISPLAY_MODE: u32 = 11;
pub const MSG_SET_DISPLAY_MODE: u32 = 12;

// Server -> client events, ids dense from zero.
pub const EVENT_ACK: u32 = 0;
pub const EVENT_DISPLAYS: u32 = 1;
pub const EVENT_DISPLAY_MODE: u32 = 2;
pub const EVENT_DISPLAY_MODES: u32 = 3;
pub const EVENT_RESIZE: u32 = 4;
pub const EVENT_KEYBOARD: u32 = 5;
pub const EVENT_QUIT: u32 = 6;

// Ack error codes.
pub const ERR_BAD_SIZE: i32 = 1;
pub const ERR_BAD_WINDOW: i32 = 2;
pub const ERR_BAD_DISPLAY: i32 = 3;
pub const ERR_BAD_VALUE: i32 = 4;
pub const ERR_NO_MEMORY: i32 = 5;
pub const ERR_DEVICE: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub id: u32,
    pub size: u32,
}

impl Header {
    pub fn parse(bytes: [u8; HEADER_SIZE]) -> Header {
        let mut buf = &bytes[..];
        Header {
            id: buf.get_u32_le(),
            size: buf.get_u32_le(),
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u32_le(self.id);
        out.put_u32_le(self.size);
    }
}

/// Display mode as negotiated with the video device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CrtcMode {
    pub view_xres: u32,
    pub view_yres: u32,
    pub fb_format: u32,
}

pub const CRTC_MODE_SIZE: usize = 12;

impl CrtcMode {
    fn parse(buf: &mut &[u8]) -> CrtcMode {
        CrtcMode {
            view_xres: buf.get_u32_le(),
            view_yres: buf.get_u32_le(),
            fb_format: buf.get_u32_le(),
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u32_le(self.view_xres);
        out.put_u32_le(self.view_yres);
        out.put_u32_le(self.fb_format);
    }
}

/// A parsed client request. Aux bytes borrow from the receive buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Request<'a> {
    CreateWindow { window_id: u32 },
    DestroyWindow { window_id: u32 },
    ResizeWindow { window_id: u32, width: u32, height: u32 },
    RenderWindow {
        window_id: u32,
        left: u32,
        top: u32,
        width: u32,
        height: u32,
        pixels: &'a [u8],
    },
    TitleWindow { window_id: u32, title: &'a str },
    ShowWindow { window_id: u32 },
    HideWindow { window_id: u32 },
    Shutdown { code: u32 },
    ChkbLayout { id: u32, layout: &'a [u8] },
    RequestDisplays { id: u32 },
    RequestDisplayModes { id: u32, display_id: u32 },
    RequestDisplayMode { id: u32, display_id: u32 },
    SetDisplayMode { id: u32, display_id: u32, mode: CrtcMode },
}

/// Structural rejection of a known message. Carries the leading u32 of the
/// body (the client's request or window id) so the ack can echo it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Malformed {
    pub request_id: u32,
    pub error: i32,
}

/// Fixed-struct size for a request id, or None for unknown ids.
pub fn fixed_size(id: u32) -> Option<usize> {
    Some(match id {
        MSG_CREATE_WINDOW | MSG_DESTROY_WINDOW | MSG_SHOW_WINDOW | MSG_HIDE_WINDOW
        | MSG_TITLE_WINDOW | MSG_SHUTDOWN | MSG_CHKBLAYOUT | MSG_REQUEST_DISPLAYS => 4,
        MSG_RESIZE_WINDOW => 12,
        MSG_RENDER_WINDOW => 20,
        MSG_REQUEST_DISPLAY_MODES | MSG_REQUEST_DISPLAY_MODE => 8,
        MSG_SET_DISPLAY_MODE => 8 + CRTC_MODE_SIZE,
        _ => return None,
    })
}

fn leading_u32(body: &[u8]) -> u32 {
    if body.len() >= 4 {
        u32::from_le_bytes([body[0], body[1], body[2], body[3]])
    } else {
        0
    }
}

fn malformed(body: &[u8], error: i32) -> Malformed {
    Malformed {
        request_id: leading_u32(body),
        error,
    }
}

/// Parse one complete body against the message table.
///
/// `Ok(None)` means the id is unknown and the packet is consumed silently
/// (forward compatibility). `Err` is a structural rejection that earns an
/// ack-with-error without dropping the connection.
pub fn parse(id: u32, body: &[u8]) -> Result<Option<Request<'_>>, Malformed> {
    let fixed = match fixed_size(id) {
        Some(f) => f,
        None => return Ok(None),
    };
    if body.len() < fixed {
        return Err(malformed(body, ERR_BAD_SIZE));
    }
    let (fixed_bytes, aux) = body.split_at(fixed);
    let mut buf = fixed_bytes;
    let exact = |aux: &[u8]| -> Result<(), Malformed> {
        if aux.is_empty() {
            Ok(())
        } else {
            Err(malformed(body, ERR_BAD_SIZE))
        }
    };
    let req = match id {
        MSG_CREATE_WINDOW => {
            exact(aux)?;
            Request::CreateWindow { window_id: buf.get_u32_le() }
        }
        MSG_DESTROY_WINDOW => {
            exact(aux)?;
            Request::DestroyWindow { window_id: buf.get_u32_le() }
        }
        MSG_RESIZE_WINDOW => {
            exact(aux)?;
            Request::ResizeWindow {
                window_id: buf.get_u32_le(),
                width: buf.get_u32_le(),
                height: buf.get_u32_le(),
            }
        }
        MSG_RENDER_WINDOW => {
            let window_id = buf.get_u32_le();
            let left = buf.get_u32_le();
            let top = buf.get_u32_le();
            let width = buf.get_u32_le();
            let height = buf.get_u32_le();
            let expected = width as u64 * height as u64 * 4;
            if aux.len() as u64 != expected {
                return Err(malformed(body, ERR_BAD_SIZE));
            }
            Request::RenderWindow {
                window_id,
                left,
                top,
                width,
                height,
                pixels: aux,
            }
        }
        MSG_TITLE_WINDOW => {
            let window_id = buf.get_u32_le();
            let title = std::str::from_utf8(aux)
                .map_err(|_| malformed(body, ERR_BAD_VALUE))?;
            Request::TitleWindow { window_id, title }
        }
        MSG_SHOW_WINDOW => {
            exact(aux)?;
            Request::ShowWindow { window_id: buf.get_u32_le() }
        }
        MSG_HIDE_WINDOW => {
            exact(aux)?;
            Request::HideWindow { window_id: buf.get_u32_le() }
        }
        MSG_SHUTDOWN => {
            exact(aux)?;
            Request::Shutdown { code: buf.get_u32_le() }
        }
        MSG_CHKBLAYOUT => Request::ChkbLayout {
            id: buf.get_u32_le(),
            layout: aux,
        },
        MSG_REQUEST_DISPLAYS => {
            exact(aux)?;
            Request::RequestDisplays { id: buf.get_u32_le() }
        }
        MSG_REQUEST_DISPLAY_MODES => {
            exact(aux)?;
            Request::RequestDisplayModes {
                id: buf.get_u32_le(),
                display_id: buf.get_u32_le(),
            }
        }
        MSG_REQUEST_DISPLAY_MODE => {
            exact(aux)?;
            Request::RequestDisplayMode {
                id: buf.get_u32_le(),
                display_id: buf.get_u32_le(),
            }
        }
        MSG_SET_DISPLAY_MODE => {
            exact(aux)?;
            Request::SetDisplayMode {
                id: buf.get_u32_le(),
                display_id: buf.get_u32_le(),
                mode: CrtcMode::parse(&mut buf),
            }
        }
        _ => unreachable!("fixed_size covered the id range"),
    };
    Ok(Some(req))
}

/// A server -> client event, encoded on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Ack { id: u32, error: i32 },
    Displays { id: u32, count: u32 },
    DisplayMode { id: u32, mode: CrtcMode },
    DisplayModes { id: u32, modes: Vec<CrtcMode> },
    Resize { window_id: u32, width: u32, height: u32 },
    Keyboard { window_id: u32, unit: u32 },
    Quit { window_id: u32 },
}

impl Event {
    /// Header plus body, ready for the transmit ring.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        let id = match self {
            Event::Ack { id, error } => {
                body.put_u32_le(*id);
                body.put_i32_le(*error);
                EVENT_ACK
            }
            Event::Displays { id, count } => {
                body.put_u32_le(*id);
                body.put_u32_le(*count);
                EVENT_DISPLAYS
            }
            Event::DisplayMode { id, mode } => {
                body.put_u32_le(*id);
                mode.encode(&mut body);
                EVENT_DISPLAY_MODE
            }
            Event::DisplayModes { id, modes } => {
                body.put_u32_le(*id);
                body.put_u32_le(modes.len() as u32);
                for mode in modes {
                    mode.encode(&mut body);
                }
                EVENT_DISPLAY_MODES
            }
            Event::Resize { window_id, width, height } => {
                body.put_u32_le(*window_id);
                body.put_u32_le(*width);
                body.put_u32_le(*height);
                EVENT_RESIZE
            }
            Event::Keyboard { window_id, unit } => {
                body.put_u32_le(*window_id);
                body.put_u32_le(*unit);
                EVENT_KEYBOARD
            }
            Event::Quit { window_id } => {
                body.put_u32_le(*window_id);
                EVENT_QUIT
            }
        };
        let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
        Header { id, size: body.len() as u32 }.encode(&mut out);
        out.extend_from_slice(&body);
        out
    }
}

/// Encode a request. The server never sends these; clients and tests do.
pub fn encode_request(id: u32, fixed: &[u32], aux: &[u8]) -> Vec<u8> {
    let size = fixed.len() * 4 + aux.len();
    let mut out = Vec::with_capacity(HEADER_SIZE + size);
    Header { id, size: size as u32 }.encode(&mut out);
    for word in fixed {
        out.put_u32_le(*word);
    }
    out.extend_from_slice(aux);
    out
}
