//! Kernel-facing devices.
//!
//! The display server owns three device files: the framebuffer it submits
//! frames to, the keyboard TTY it reads 32-bit units from, and the pointer
//! device it reads 3-byte packets from. Everything is non-blocking; the
//! event loop polls the fds.

use std::fs::{File, OpenOptions};
use std::io::{self, Error, ErrorKind, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use log::debug;

use crate::gfx::framebuffer::Framebuffer;
use crate::proto::CrtcMode;

/// The compositor's output target. Mode queries, mode sets, and the single
/// whole-frame submit call.
pub trait VideoOutput {
    fn current_mode(&self) -> CrtcMode;
    fn modes(&self) -> Vec<CrtcMode>;
    fn set_mode(&mut self, mode: CrtcMode) -> io::Result<CrtcMode>;
    fn submit(&mut self, fb: &Framebuffer) -> io::Result<()>;
}

/// Where chkblayout payloads go.
pub trait LayoutSink {
    fn set_layout(&mut self, blob: &[u8]) -> io::Result<()>;
}

const FBIOGET_VSCREENINFO: libc::c_ulong = 0x4600;
const FBIOPUT_VSCREENINFO: libc::c_ulong = 0x4601;

/// Prefix of the kernel's variable screen info; the tail is opaque here.
#[repr(C)]
#[derive(Clone, Copy, Default)]
struct FbVarScreeninfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    rest: [u32; 32],
}

/// Linear 32-bpp framebuffer device.
pub struct FbDevice {
    file: File,
    mode: CrtcMode,
}

impl FbDevice {
    pub fn open(path: &Path) -> io::Result<FbDevice> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let info = query_screeninfo(file.as_raw_fd())?;
        if info.bits_per_pixel != 32 {
            return Err(Error::new(
                ErrorKind::Unsupported,
                format!("framebuffer is {} bpp, need 32", info.bits_per_pixel),
            ));
        }
        let mode = CrtcMode {
            view_xres: info.xres,
            view_yres: info.yres,
            fb_format: info.bits_per_pixel,
        };
        debug!("video mode {}x{} @ {} bpp", mode.view_xres, mode.view_yres, mode.fb_format);
        Ok(FbDevice { file, mode })
    }
}

impl VideoOutput for FbDevice {
    fn current_mode(&self) -> CrtcMode {
        self.mode
    }

    fn modes(&self) -> Vec<CrtcMode> {
        vec![self.mode]
    }

    fn set_mode(&mut self, mode: CrtcMode) -> io::Result<CrtcMode> {
        let mut info = query_screeninfo(self.file.as_raw_fd())?;
        info.xres = mode.view_xres;
        info.yres = mode.view_yres;
        info.xres_virtual = mode.view_xres;
        info.yres_virtual = mode.view_yres;
        info.bits_per_pixel = 32;
        let rc = unsafe {
            libc::ioctl(self.file.as_raw_fd(), FBIOPUT_VSCREENINFO as _, &mut info)
        };
        if rc != 0 {
            return Err(Error::last_os_error());
        }
        // The device may have rounded the request; trust what it reports.
        let info = query_screeninfo(self.file.as_raw_fd())?;
        self.mode = CrtcMode {
            view_xres: info.xres,
            view_yres: info.yres,
            fb_format: info.bits_per_pixel,
        };
        Ok(self.mode)
    }

    fn submit(&mut self, fb: &Framebuffer) -> io::Result<()> {
        let bytes = fb.as_bytes();
        let written = unsafe {
            libc::pwrite(
                self.file.as_raw_fd(),
                bytes.as_ptr() as *const libc::c_void,
                bytes.len(),
                0,
            )
        };
        if written != bytes.len() as isize {
            return Err(Error::last_os_error());
        }
        Ok(())
    }
}

fn query_screeninfo(fd: RawFd) -> io::Result<FbVarScreeninfo> {
    let mut info = FbVarScreeninfo::default();
    let rc = unsafe { libc::ioctl(fd, FBIOGET_VSCREENINFO as _, &mut info) };
    if rc != 0 {
        return Err(Error::last_os_error());
    }
    Ok(info)
}

/// Keyboard-layout ioctl on the raw keyboard TTY. The blob format belongs
/// to the kernel; the server only forwards it.
const KBIO_SET_LAYOUT: libc::c_ulong = 0x4B72;

#[repr(C)]
struct KbLayoutReq {
    data: *const u8,
    size: libc::size_t,
}

/// Keyboard TTY in raw unit mode: non-blocking reads of 32-bit units.
pub struct KeyboardDevice {
    file: File,
    saved: libc::termios,
    carry: [u8; 4],
    carry_len: usize,
}

impl KeyboardDevice {
    pub fn open(path: &Path) -> io::Result<KeyboardDevice> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
            .open(path)?;
        let fd = file.as_raw_fd();
        let mut saved: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(fd, &mut saved) } != 0 {
            return Err(Error::last_os_error());
        }
        let mut raw = saved;
        unsafe { libc::cfmakeraw(&mut raw) };
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &raw) } != 0 {
            return Err(Error::last_os_error());
        }
        Ok(KeyboardDevice { file, saved, carry: [0; 4], carry_len: 0 })
    }

    /// Drain every whole unit the device has buffered. A trailing partial
    /// unit is carried into the next call.
    pub fn read_units(&mut self, units: &mut Vec<u32>) -> io::Result<()> {
        let mut buf = [0u8; 256];
        loop {
            let n = match self.file.read(&mut buf) {
                Ok(0) => return Err(Error::new(ErrorKind::UnexpectedEof, "keyboard EOF")),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            for &byte in &buf[..n] {
                self.carry[self.carry_len] = byte;
                self.carry_len += 1;
                if self.carry_len == 4 {
                    self.carry_len = 0;
                    units.push(u32::from_le_bytes(self.carry));
                }
            }
        }
    }
}

impl LayoutSink for KeyboardDevice {
    fn set_layout(&mut self, blob: &[u8]) -> io::Result<()> {
        let req = KbLayoutReq { data: blob.as_ptr(), size: blob.len() };
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), KBIO_SET_LAYOUT as _, &req) };
        if rc != 0 {
            return Err(Error::last_os_error());
        }
        Ok(())
    }
}

impl AsRawFd for KeyboardDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl Drop for KeyboardDevice {
    fn drop(&mut self) {
        unsafe {
            libc::tcsetattr(self.file.as_raw_fd(), libc::TCSANOW, &self.saved);
        }
    }
}

/// Pointer device emitting 3-byte packets.
pub struct PointerDevice {
    file: File,
}

impl PointerDevice {
    pub fn open(path: &Path) -> io::Result<PointerDevice> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;
        Ok(PointerDevice { file })
    }

    /// One non-blocking read; Ok(0) when nothing is pending.
    pub fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            return match self.file.read(buf) {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => Err(e),
            };
        }
    }
}

impl AsRawFd for PointerDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl AsRawFd for FbDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
