//! Deterministic wallpaper texture.
//!
//! Seeded once at startup; the same seed and size always paint the same
//! pixels, so the compositor only repaints on a mode change.

use super::framebuffer::{make_color, Framebuffer};

/// splitmix64-style mix; position-keyed so paint order never matters.
#[inline]
fn mix(mut v: u64) -> u64 {
    v = v.wrapping_add(0x9E37_79B9_7F4A_7C15);
    v = (v ^ (v >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    v = (v ^ (v >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    v ^ (v >> 31)
}

pub fn paint(fb: &mut Framebuffer, seed: u64) {
    let width = fb.width();
    let height = fb.height();
    for y in 0..height {
        // Darken toward the bottom for a little depth.
        let shade = if height > 1 {
            255 - (y * 96 / (height - 1))
        } else {
            255
        };
        for x in 0..width {
            let cell = (y as u64) << 32 | x as u64;
            let noise = mix(seed ^ cell);
            let r = ((noise & 0x3F) + 16) as u32 * shade / 255;
            let g = (((noise >> 8) & 0x3F) + 40) as u32 * shade / 255;
            let b = (((noise >> 16) & 0x7F) + 96) as u32 * shade / 255;
            fb.set(x, y, make_color(r as u8, g as u8, b as u8));
        }
    }
}
