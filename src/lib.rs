//! tuios — a terminal-hosted window manager.
//!
//! One host terminal is multiplexed into many PTY-backed windows, each a
//! full VT emulator, arranged floating or BSP-tiled across workspaces. A
//! background daemon can own the PTYs so thin clients attach and detach
//! without killing anything (`tuios new`, `tuios attach`), tmux-style.
//!
//! # Crate layout
//!
//! | module | role |
//! |---|---|
//! | [`term`] | VT emulator: grid, scrollback, modes, OSC 133 markers |
//! | [`pty`] | PTY spawn/reader/resize lifecycle |
//! | [`window`] | one VT + PTY with bounds, Z, dirty flags |
//! | [`layout`] | floating snap regions, BSP trees, animations |
//! | [`wm`] | window manager state, input dispatch, notifications |
//! | [`render`] | layer cache, composition, overlays, adaptive FPS |
//! | [`session`] | daemon, wire protocol, replicated state |
//! | [`blocks`] | command-block extraction from scrollback |
//! | [`tape`] | typed commands and the serial executor |
//! | [`app`] | the UI event loop tying it together |

pub mod app;
pub mod blocks;
pub mod config;
pub mod constants;
pub mod geom;
pub mod layout;
pub mod pty;
pub mod render;
pub mod session;
pub mod tape;
pub mod term;
pub mod window;
pub mod wm;

pub use config::Config;
pub use geom::Rect;
pub use window::Window;
pub use wm::WindowManager;
