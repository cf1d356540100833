//! 8x16 bitmap font loaded from a character-ROM blob.
//!
//! The blob holds 256 glyphs of 16 rows each, one byte per row, most
//! significant bit leftmost. Codepoints above 0xFF render as '?'.

use std::fs;
use std::io::{self, Error, ErrorKind};
use std::path::Path;

use super::framebuffer::{Pixel, ViewMut};

pub const FONT_WIDTH: u32 = 8;
pub const FONT_HEIGHT: u32 = 16;
const GLYPH_COUNT: usize = 256;
const BLOB_SIZE: usize = GLYPH_COUNT * FONT_HEIGHT as usize;

pub struct Font {
    glyphs: Box<[u8; BLOB_SIZE]>,
}

impl Font {
    pub fn from_blob(blob: &[u8]) -> io::Result<Font> {
        if blob.len() < BLOB_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("font blob is {} bytes, need {}", blob.len(), BLOB_SIZE),
            ));
        }
        let mut glyphs = Box::new([0u8; BLOB_SIZE]);
        glyphs.copy_from_slice(&blob[..BLOB_SIZE]);
        Ok(Font { glyphs })
    }

    pub fn load(path: &Path) -> io::Result<Font> {
        Font::from_blob(&fs::read(path)?)
    }

    fn glyph(&self, ch: char) -> &[u8] {
        let index = if (ch as u32) < GLYPH_COUNT as u32 {
            ch as usize
        } else {
            b'?' as usize
        };
        let start = index * FONT_HEIGHT as usize;
        &self.glyphs[start..start + FONT_HEIGHT as usize]
    }

    pub fn render_char(&self, fb: &mut ViewMut<'_>, x: i32, y: i32, fg: Pixel, ch: char) {
        let rows = self.glyph(ch);
        for (row, bits) in rows.iter().enumerate() {
            let py = y + row as i32;
            if py < 0 {
                continue;
            }
            for col in 0..FONT_WIDTH {
                if bits & (0x80 >> col) == 0 {
                    continue;
                }
                let px = x + col as i32;
                if px < 0 {
                    continue;
                }
                fb.blend(px as u32, py as u32, fg);
            }
        }
    }

    pub fn render_text(&self, fb: &mut ViewMut<'_>, x: i32, y: i32, fg: Pixel, text: &str) {
        let mut pen = x;
        for ch in text.chars() {
            self.render_char(fb, pen, y, fg, ch);
            pen += FONT_WIDTH as i32;
        }
    }
}

pub fn text_width(text: &str) -> u32 {
    text.chars().count() as u32 * FONT_WIDTH
}

#[cfg(test)]
pub(crate) fn test_font() -> Font {
    // Synthetic ROM: every glyph is a full 8x16 block, so tests can assert
    // coverage without shipping a real character ROM.
    Font::from_blob(&[0xFFu8; BLOB_SIZE]).expect("blob")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::framebuffer::{make_color, Framebuffer};

    #[test]
    fn short_blob_rejected() {
        assert!(Font::from_blob(&[0u8; 100]).is_err());
    }

    #[test]
    fn render_clips_at_edges() {
        let font = test_font();
        let mut fb = Framebuffer::try_new(4, 4).expect("alloc");
        let fg = make_color(255, 255, 255);
        font.render_char(&mut fb.view_mut(), -2, -2, fg, 'A');
        assert_eq!(fb.get(0, 0), fg);
        assert_eq!(fb.get(3, 3), fg);
    }

    #[test]
    fn text_width_counts_chars() {
        assert_eq!(text_width(""), 0);
        assert_eq!(text_width("abc"), 3 * FONT_WIDTH);
    }
}
