//! Keyboard unit codec and modifier tracking.
//!
//! The keyboard device emits 32-bit units. The top 11 bits carry a signed
//! key code (positive press, negative release); the low 21 bits carry the
//! Unicode codepoint the keymap resolved, when there is one. Key codes
//! follow scancode set 1, with 0x80 added for extended (E0-prefixed) keys.

const KEY_SHIFT: u32 = 21;
pub const CODEPOINT_MASK: u32 = (1 << KEY_SHIFT) - 1;

/// Number of distinct key codes a window tracks for key-up synthesis.
pub const KEY_CODE_SPACE: usize = 512;

#[inline]
pub fn encode_key(key: i32) -> u32 {
    ((key << KEY_SHIFT as i32) as u32) & !CODEPOINT_MASK
}

/// Signed key code of a unit; 0 for plain codepoint units.
#[inline]
pub fn decode_key(unit: u32) -> i32 {
    (unit as i32) >> KEY_SHIFT
}

#[inline]
pub fn decode_codepoint(unit: u32) -> Option<char> {
    char::from_u32(unit & CODEPOINT_MASK)
}

pub mod keys {
    pub const ESC: i32 = 1;
    pub const TAB: i32 = 15;
    pub const T: i32 = 20;
    pub const ENTER: i32 = 28;
    pub const LCTRL: i32 = 29;
    pub const LSHIFT: i32 = 42;
    pub const RSHIFT: i32 = 54;
    pub const LALT: i32 = 56;
    pub const F4: i32 = 62;
    pub const F10: i32 = 68;
    pub const F11: i32 = 87;
    pub const F12: i32 = 88;
    // Extended keys carry the 0xE0 prefix as +0x80.
    pub const RCTRL: i32 = 0x80 + 29;
    pub const RALT: i32 = 0x80 + 56;
    pub const UP: i32 = 0x80 + 72;
    pub const LEFT: i32 = 0x80 + 75;
    pub const RIGHT: i32 = 0x80 + 77;
    pub const DOWN: i32 = 0x80 + 80;
    pub const DELETE: i32 = 0x80 + 83;
    pub const LSUPER: i32 = 0x80 + 91;
    pub const RSUPER: i32 = 0x80 + 92;
}

/// Modifier state the display cares about for global chords.
#[derive(Debug, Default, Clone, Copy)]
pub struct Modifiers {
    pub lctrl: bool,
    pub lalt: bool,
    pub lsuper: bool,
    pub rsuper: bool,
}

impl Modifiers {
    /// Track a signed key code; returns true when it was a modifier.
    pub fn update(&mut self, key: i32) -> bool {
        let down = key > 0;
        match key.abs() {
            k if k == keys::LCTRL => self.lctrl = down,
            k if k == keys::LALT => self.lalt = down,
            k if k == keys::LSUPER => self.lsuper = down,
            k if k == keys::RSUPER => self.rsuper = down,
            _ => return false,
        }
        true
    }

    pub fn any_super(&self) -> bool {
        self.lsuper || self.rsuper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_codec_round_trip() {
        for key in [1, 88, 511, -1, -88, -511] {
            assert_eq!(decode_key(encode_key(key)), key);
        }
    }

    #[test]
    fn codepoint_units_have_zero_key() {
        let unit = 'q' as u32;
        assert_eq!(decode_key(unit), 0);
        assert_eq!(decode_codepoint(unit), Some('q'));
    }

    #[test]
    fn key_units_can_carry_codepoints() {
        let unit = encode_key(keys::T) | 't' as u32;
        assert_eq!(decode_key(unit), keys::T);
        assert_eq!(decode_codepoint(unit), Some('t'));
    }

    #[test]
    fn modifiers_follow_press_release() {
        let mut mods = Modifiers::default();
        assert!(mods.update(keys::LALT));
        assert!(mods.lalt);
        assert!(mods.update(-keys::LALT));
        assert!(!mods.lalt);
        assert!(!mods.update(keys::T));
    }
}
