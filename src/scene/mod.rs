//! Scene state: windows, tiling policy, and the display that composes them.

pub mod display;
pub mod tile;
pub mod window;

pub use display::{Display, PointerState, WindowKey};
pub use tile::{TileKey, TileState};
pub use window::{ConnId, ResizeEdge, Window};
