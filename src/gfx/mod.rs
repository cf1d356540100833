//! Software rendering primitives: framebuffers, bitmap font, wallpaper,
//! cursor sprites.

pub mod cursor;
pub mod font;
pub mod framebuffer;
pub mod wallpaper;

pub use framebuffer::{blend_pixel, make_color, make_color_a, Framebuffer, Pixel, View, ViewMut};
