//! displayd - single-seat compositing display server.
//!
//! Owns the framebuffer, keyboard, and pointer; multiplexes clients over a
//! local stream socket; arbitrates focus and layout; composites every
//! window over a wallpaper into one on-screen image.

pub mod args;
pub mod config;
pub mod connection;
pub mod device;
pub mod gfx;
pub mod input;
pub mod proto;
pub mod scene;
pub mod server;
pub mod session;

// Re-exports
pub use config::Config;
pub use proto::{CrtcMode, Event, Request};
pub use scene::{Display, TileState, Window};
pub use server::Server;
