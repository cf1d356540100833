//! PS/2-style pointer packets.
//!
//! The device emits fixed 3-byte packets: button bits plus signed 9-bit x
//! and y deltas. Bit 3 of the first byte is always set and is the only
//! resynchronization hook after a short read or device glitch.

pub const PACKET_SIZE: usize = 3;

pub const BUTTON_LEFT: u8 = 1 << 0;
pub const BUTTON_RIGHT: u8 = 1 << 1;
pub const BUTTON_MIDDLE: u8 = 1 << 2;

const SYNC_BIT: u8 = 1 << 3;
const X_SIGN: u8 = 1 << 4;
const Y_SIGN: u8 = 1 << 5;
const X_OVERFLOW: u8 = 1 << 6;
const Y_OVERFLOW: u8 = 1 << 7;

/// A decoded packet. `dy` is already flipped into screen coordinates
/// (positive is down).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub buttons: u8,
    pub dx: i32,
    pub dy: i32,
}

/// Accumulates device bytes into whole packets, resynchronizing on the
/// always-set bit.
#[derive(Debug, Default)]
pub struct PacketAccumulator {
    buf: [u8; PACKET_SIZE],
    fill: usize,
}

impl PacketAccumulator {
    pub fn push(&mut self, byte: u8) -> Option<Packet> {
        if self.fill == 0 && byte & SYNC_BIT == 0 {
            // Mid-packet byte from a lost packet; skip until sync.
            return None;
        }
        self.buf[self.fill] = byte;
        self.fill += 1;
        if self.fill < PACKET_SIZE {
            return None;
        }
        self.fill = 0;
        Some(decode(self.buf))
    }
}

fn decode(raw: [u8; PACKET_SIZE]) -> Packet {
    let flags = raw[0];
    let mut dx = raw[1] as i32;
    if flags & X_SIGN != 0 {
        dx -= 256;
    }
    let mut dy = raw[2] as i32;
    if flags & Y_SIGN != 0 {
        dy -= 256;
    }
    if flags & (X_OVERFLOW | Y_OVERFLOW) != 0 {
        // Overflowed deltas are garbage; keep the button state only.
        dx = 0;
        dy = 0;
    }
    Packet {
        buttons: flags & (BUTTON_LEFT | BUTTON_RIGHT | BUTTON_MIDDLE),
        dx,
        // Device y grows upward, screen y grows downward.
        dy: -dy,
    }
}

/// Nonlinear pointer acceleration. The branches are checked in this order;
/// the second arm is only reached when the first test failed, so with these
/// thresholds it never fires. That matches the shipped behavior and is
/// pinned by a test below.
pub fn accelerate(dx: i32, dy: i32) -> (i32, i32) {
    let d2 = dx * dx + dy * dy;
    if d2 >= 4 {
        (dx * 2, dy * 2)
    } else if d2 >= 25 {
        (dx * 3, dy * 3)
    } else {
        (dx, dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_signed_deltas() {
        let mut acc = PacketAccumulator::default();
        assert_eq!(acc.push(SYNC_BIT | X_SIGN), None);
        assert_eq!(acc.push(0xFF), None);
        let p = acc.push(2).expect("packet");
        assert_eq!(p.dx, -1);
        assert_eq!(p.dy, -2);
        assert_eq!(p.buttons, 0);
    }

    #[test]
    fn resynchronizes_on_sync_bit() {
        let mut acc = PacketAccumulator::default();
        // Two stray non-sync bytes are dropped.
        assert_eq!(acc.push(0x00), None);
        assert_eq!(acc.push(0x04), None);
        assert_eq!(acc.push(SYNC_BIT | BUTTON_LEFT), None);
        assert_eq!(acc.push(5), None);
        let p = acc.push(0).expect("packet");
        assert_eq!(p.buttons, BUTTON_LEFT);
        assert_eq!(p.dx, 5);
    }

    #[test]
    fn overflow_drops_deltas() {
        let mut acc = PacketAccumulator::default();
        acc.push(SYNC_BIT | X_OVERFLOW);
        acc.push(200);
        let p = acc.push(10).expect("packet");
        assert_eq!((p.dx, p.dy), (0, 0));
    }

    #[test]
    fn acceleration_cascade_is_literal() {
        assert_eq!(accelerate(1, 0), (1, 0));
        assert_eq!(accelerate(2, 0), (4, 0));
        // Magnitude 5 satisfies the first test, so the x3 arm never runs.
        assert_eq!(accelerate(5, 0), (10, 0));
        assert_eq!(accelerate(3, 4), (6, 8));
    }
}
