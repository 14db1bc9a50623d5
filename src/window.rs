//! A window: one VT (plus its PTY, or a remote PTY id) wrapped with screen
//! coordinates, Z order, workspace membership, and dirty tracking.
//!
//! Three dirty flags drive the render pipeline:
//! - `position`: bounds changed, the cached layer's placement is invalid;
//! - `content`: VT cells changed, the layer body must be re-rendered;
//! - `full`: derived chrome (border color, badges) is invalid too.
//!
//! The window's interior is `(w-2) × (h-2)` — one cell of border on every
//! side — and the VT and PTY are always resized to the interior.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use uuid::Uuid;

use crate::geom::Rect;
use crate::pty::PtyHandle;
use crate::term::Vt;

/// Minimum total window width (interior stays usable).
pub const MIN_WINDOW_WIDTH: u16 = 20;
/// Minimum total window height.
pub const MIN_WINDOW_HEIGHT: u16 = 3;

/// Render invalidation flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyFlags {
    /// Bounds changed.
    pub position: bool,
    /// VT content changed.
    pub content: bool,
    /// Everything derived is stale (border, badges).
    pub full: bool,
}

impl DirtyFlags {
    /// Whether any flag is set.
    pub fn any(&self) -> bool {
        self.position || self.content || self.full
    }

    /// Clear all flags.
    pub fn clear(&mut self) {
        *self = DirtyFlags::default();
    }
}

/// One managed window.
#[derive(Debug)]
pub struct Window {
    /// Stable identity, also used on the wire.
    pub id: Uuid,
    /// Title from the program (OSC 0/2).
    pub title: String,
    /// User-assigned name; takes precedence over `title` when present.
    pub custom_name: Option<String>,
    /// Outer bounds including the border.
    pub bounds: Rect,
    /// Stacking order; the focused window holds the workspace maximum.
    pub z: u32,
    /// Workspace this window lives on (1-based).
    pub workspace: usize,
    /// Minimized to the dockbar.
    pub minimized: bool,
    /// Bounds to restore when un-minimizing.
    pub pre_minimize_bounds: Option<Rect>,
    /// Daemon-side PTY id (set in client mode; local mode tracks it too).
    pub pty_id: Option<u64>,
    /// Mirror of the VT's alternate-screen flag; authority for host-side
    /// mouse forwarding decisions.
    pub is_alt_screen: bool,
    /// The emulator. Locked briefly by the PTY reader (writes) and the
    /// renderer / state snapshots (reads).
    pub vt: Arc<Mutex<Vt>>,
    /// Render invalidation state.
    pub dirty: DirtyFlags,
    /// Locally owned PTY (absent in daemon-client mode).
    pty: Option<PtyHandle>,
}

impl Window {
    /// Create a window with a fresh VT sized to the interior.
    pub fn new(bounds: Rect, workspace: usize, scrollback_lines: usize) -> Self {
        let (rows, cols) = interior_size(bounds);
        Self {
            id: Uuid::new_v4(),
            title: String::new(),
            custom_name: None,
            bounds,
            z: 0,
            workspace,
            minimized: false,
            pre_minimize_bounds: None,
            pty_id: None,
            is_alt_screen: false,
            vt: Arc::new(Mutex::new(Vt::new(rows as usize, cols as usize, scrollback_lines))),
            dirty: DirtyFlags {
                position: true,
                content: true,
                full: true,
            },
            pty: None,
        }
    }

    /// Attach a locally owned PTY.
    pub fn attach_pty(&mut self, pty: PtyHandle) {
        self.pty_id = Some(pty.id());
        self.pty = Some(pty);
    }

    /// Whether a local PTY is attached.
    pub fn has_local_pty(&self) -> bool {
        self.pty.is_some()
    }

    /// Display name: the custom name if set, else the program title, else a
    /// short id.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.custom_name {
            return name.clone();
        }
        if !self.title.is_empty() {
            return self.title.clone();
        }
        let id = self.id.simple().to_string();
        format!("window-{}", &id[..6])
    }

    /// Interior rows/cols (bounds minus the border).
    pub fn interior(&self) -> (u16, u16) {
        interior_size(self.bounds)
    }

    /// Move without resizing.
    pub fn set_position(&mut self, x: i32, y: i32) {
        if (self.bounds.x, self.bounds.y) == (x, y) {
            return;
        }
        self.bounds.x = x;
        self.bounds.y = y;
        self.dirty.position = true;
    }

    /// Set new bounds, resizing the VT and PTY to the interior when the
    /// size actually changed.
    pub fn set_bounds(&mut self, bounds: Rect) {
        let size_changed = (bounds.w, bounds.h) != (self.bounds.w, self.bounds.h);
        let moved = (bounds.x, bounds.y) != (self.bounds.x, self.bounds.y);
        if !size_changed && !moved {
            return;
        }
        self.bounds = Rect {
            w: bounds.w.max(MIN_WINDOW_WIDTH),
            h: bounds.h.max(MIN_WINDOW_HEIGHT),
            ..bounds
        };
        self.dirty.position = true;
        if size_changed {
            self.dirty.content = true;
            self.resize_inner();
        }
    }

    /// Resize the VT and PTY to the current interior.
    fn resize_inner(&mut self) {
        let (rows, cols) = self.interior();
        if let Ok(mut vt) = self.vt.lock() {
            vt.resize(rows as usize, cols as usize);
        }
        if let Some(pty) = &self.pty {
            if let Err(e) = pty.resize(rows, cols) {
                log::warn!("window {}: PTY resize failed: {e}", self.id);
            }
        }
    }

    /// Write input to the local PTY, if any.
    pub fn write_input(&self, bytes: &[u8]) -> Result<()> {
        if let Some(pty) = &self.pty {
            pty.write(bytes)?;
        }
        Ok(())
    }

    /// Invalidate every cached derivative.
    pub fn invalidate_cache(&mut self) {
        self.dirty.position = true;
        self.dirty.content = true;
        self.dirty.full = true;
    }

    /// Pull VT-side state the window mirrors (title, alt-screen flag).
    ///
    /// Returns true when something changed.
    pub fn sync_from_vt(&mut self) -> bool {
        let Ok(vt) = self.vt.lock() else {
            return false;
        };
        let mut changed = false;
        if self.title != vt.title() {
            self.title = vt.title().to_string();
            self.dirty.full = true;
            changed = true;
        }
        let alt = vt.is_alt_screen();
        if self.is_alt_screen != alt {
            self.is_alt_screen = alt;
            changed = true;
        }
        changed
    }

    /// Drop the PTY (killing the child) and mark everything dirty.
    pub fn close(&mut self) {
        if let Some(pty) = self.pty.take() {
            pty.close();
        }
        self.invalidate_cache();
    }
}

/// Interior size for outer bounds: `(rows, cols)`, floor 1×1.
pub fn interior_size(bounds: Rect) -> (u16, u16) {
    (bounds.h.saturating_sub(2).max(1), bounds.w.saturating_sub(2).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> Window {
        Window::new(Rect::new(0, 0, 40, 12), 1, 100)
    }

    #[test]
    fn new_window_has_interior_sized_vt() {
        let w = window();
        let vt = w.vt.lock().unwrap();
        assert_eq!(vt.screen().lines(), 10);
        assert_eq!(vt.screen().cols(), 38);
    }

    #[test]
    fn set_bounds_enforces_minimums() {
        let mut w = window();
        w.set_bounds(Rect::new(0, 0, 5, 1));
        assert_eq!(w.bounds.w, MIN_WINDOW_WIDTH);
        assert_eq!(w.bounds.h, MIN_WINDOW_HEIGHT);
    }

    #[test]
    fn move_marks_position_dirty_only() {
        let mut w = window();
        w.dirty.clear();
        w.set_position(5, 5);
        assert!(w.dirty.position);
        assert!(!w.dirty.content);
    }

    #[test]
    fn resize_marks_content_dirty_and_resizes_vt() {
        let mut w = window();
        w.dirty.clear();
        w.set_bounds(Rect::new(0, 0, 60, 20));
        assert!(w.dirty.position);
        assert!(w.dirty.content);
        let vt = w.vt.lock().unwrap();
        assert_eq!(vt.screen().lines(), 18);
        assert_eq!(vt.screen().cols(), 58);
    }

    #[test]
    fn unchanged_bounds_are_a_noop() {
        let mut w = window();
        w.dirty.clear();
        let bounds = w.bounds;
        w.set_bounds(bounds);
        assert!(!w.dirty.any());
    }

    #[test]
    fn display_name_precedence() {
        let mut w = window();
        assert!(w.display_name().starts_with("window-"));
        w.title = "vim".to_string();
        assert_eq!(w.display_name(), "vim");
        w.custom_name = Some("build".to_string());
        assert_eq!(w.display_name(), "build");
    }

    #[test]
    fn sync_from_vt_mirrors_alt_screen() {
        let mut w = window();
        {
            let mut vt = w.vt.lock().unwrap();
            vt.write(b"\x1b[?1049h");
        }
        assert!(w.sync_from_vt());
        assert!(w.is_alt_screen);
    }
}
