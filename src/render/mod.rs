//! The render pipeline.
//!
//! Single-threaded. Each tick the renderer:
//! 1. scans every visible window's VT for new output (`has_new_output` is
//!    one-shot) — the focused window goes content-dirty immediately,
//!    background windows are batched to every third tick;
//! 2. decides whether anything changed at all (dirty windows, animations,
//!    overlays, the clock) — if not, the previous frame stands and the
//!    tick is skipped entirely;
//! 3. rebuilds only the layers whose dirty flags or placement key
//!    changed, composes them by Z with clipping, and draws overlays.
//!
//! Adaptive FPS: 60 Hz normally, 30 Hz during drag/resize gestures, and
//! 10 Hz once [`IDLE_THRESHOLD_FRAMES`] consecutive ticks saw no work.

pub mod layer;
pub mod overlays;

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use ratatui::buffer::Buffer;
use ratatui::layout::{Position, Rect as TuiRect};
use uuid::Uuid;

use crate::constants::{
    BACKGROUND_REFRESH_INTERVAL, FPS_IDLE, FPS_INTERACTION, FPS_NORMAL, IDLE_THRESHOLD_FRAMES,
};
use crate::term::GraphicsKind;
use crate::wm::WindowManager;

pub use layer::{render_window, to_host_color, Layer};

/// Cache key: a layer is valid only for one exact placement and focus
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LayerKey {
    x: i32,
    y: i32,
    z: u32,
    w: u16,
    h: u16,
    focused: bool,
}

#[derive(Debug)]
struct CachedLayer {
    key: LayerKey,
    layer: Layer,
}

/// Current tick-rate tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpsTier {
    /// 60 Hz.
    Normal,
    /// 30 Hz while dragging/resizing.
    Interaction,
    /// 10 Hz when idle.
    Idle,
}

impl FpsTier {
    /// Tick interval for this tier.
    pub fn interval(self) -> Duration {
        let fps = match self {
            FpsTier::Normal => FPS_NORMAL,
            FpsTier::Interaction => FPS_INTERACTION,
            FpsTier::Idle => FPS_IDLE,
        };
        Duration::from_micros(1_000_000 / fps as u64)
    }
}

/// The compositor.
#[derive(Debug, Default)]
pub struct Renderer {
    layers: HashMap<Uuid, CachedLayer>,
    /// Background windows with output not yet surfaced.
    pending_output: HashSet<Uuid>,
    tick_count: u64,
    idle_ticks: u32,
    last_clock: String,
}

impl Renderer {
    /// Fresh renderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// The tick rate to run at right now.
    pub fn fps_tier(&self, wm: &WindowManager) -> FpsTier {
        if wm.drag.is_some() || wm.resize.is_some() {
            FpsTier::Interaction
        } else if self.idle_ticks >= IDLE_THRESHOLD_FRAMES {
            FpsTier::Idle
        } else {
            FpsTier::Normal
        }
    }

    /// Per-tick bookkeeping; returns whether a new frame must be drawn.
    ///
    /// When this returns false the caller reuses the previous frame
    /// verbatim — no buffer mutation, no flush.
    pub fn prepare(&mut self, wm: &mut WindowManager) -> bool {
        self.tick_count += 1;
        let focused = wm.focused_id();

        // Step 1/2: surface new VT output as content dirt.
        let ids = wm.workspace_window_ids();
        for id in ids {
            let Some(window) = wm.window_mut(id) else {
                continue;
            };
            let new_output = window
                .vt
                .lock()
                .map(|mut vt| vt.take_new_output())
                .unwrap_or(false);
            if new_output {
                window.sync_from_vt();
            }
            if Some(id) == focused {
                if new_output {
                    window.dirty.content = true;
                }
            } else if new_output {
                self.pending_output.insert(id);
            }
        }
        // Background windows flush on every Nth tick.
        if self.tick_count % BACKGROUND_REFRESH_INTERVAL == 0 && !self.pending_output.is_empty() {
            for id in self.pending_output.drain() {
                if let Some(window) = wm.window_mut(id) {
                    window.dirty.content = true;
                }
            }
        }

        // Drop cache entries for windows that no longer exist.
        self.layers.retain(|id, _| wm.window(*id).is_some());

        let clock = chrono::Local::now().format("%H:%M").to_string();
        let clock_changed = !wm.config.hide_clock && clock != self.last_clock;
        if clock_changed {
            self.last_clock = clock;
        }

        let any_dirty = wm
            .windows
            .iter()
            .filter(|w| w.workspace == wm.current_workspace)
            .any(|w| w.dirty.any());
        let overlays_live = !wm.notifications.is_empty()
            || wm.quit_dialog
            || wm.help_visible
            || wm.logs_visible
            || wm.tape_manager_visible
            || wm.scrollback_browser_visible
            || wm.rename.is_some()
            || wm.prefix.is_some();

        let needs_frame = any_dirty
            || wm.has_active_animations()
            || wm.drag.is_some()
            || wm.resize.is_some()
            || overlays_live
            || clock_changed;

        if needs_frame {
            self.idle_ticks = 0;
        } else {
            self.idle_ticks = self.idle_ticks.saturating_add(1);
        }
        needs_frame
    }

    /// Compose the frame: window layers by Z, then overlays.
    pub fn render(&mut self, wm: &mut WindowManager, area: TuiRect, buf: &mut Buffer) {
        let focused = wm.focused_id();

        // Rebuild stale layers.
        let visible: Vec<Uuid> = wm.visible_windows().iter().map(|w| w.id).collect();
        for id in &visible {
            let Some(window) = wm.window(*id) else {
                continue;
            };
            let key = LayerKey {
                x: window.bounds.x,
                y: window.bounds.y,
                z: window.z,
                w: window.bounds.w,
                h: window.bounds.h,
                focused: focused == Some(*id),
            };
            let stale = window.dirty.any()
                || self
                    .layers
                    .get(id)
                    .map(|cached| cached.key != key)
                    .unwrap_or(true);
            if stale {
                let layer = render_window(window, key.focused, &wm.config);
                self.layers.insert(*id, CachedLayer { key, layer });
                if let Some(window) = wm.window_mut(*id) {
                    window.dirty.clear();
                }
            }
        }

        // Compose bottom-to-top.
        for id in &visible {
            let (Some(cached), Some(window)) = (self.layers.get(id), wm.window(*id)) else {
                continue;
            };
            compose(buf, area, window.bounds.x, window.bounds.y, &cached.layer);
        }

        overlays::draw(wm, area, buf);
    }

    /// Host-TTY passthrough for the focused window's live graphics
    /// payload: delete previous images, position the cursor at the
    /// window interior, replay the payload. Emitted each tick while the
    /// payload is live; the caller flushes it after the frame.
    pub fn graphics_passthrough(&self, wm: &WindowManager) -> Option<Vec<u8>> {
        let window = wm.focused_window()?;
        let vt = window.vt.lock().ok()?;
        let graphics = vt.graphics()?;

        let mut out = Vec::new();
        // Cursor save; position at the window interior (1-based).
        let row = (window.bounds.y + 1).max(0) as usize + 1;
        let col = (window.bounds.x + 1).max(0) as usize + 1;
        out.extend_from_slice(b"\x1b7");
        out.extend_from_slice(format!("\x1b[{row};{col}H").as_bytes());
        match graphics.kind {
            GraphicsKind::Kitty => {
                // Delete all visible placements, then replay.
                out.extend_from_slice(b"\x1b_Ga=d\x1b\\");
                out.extend_from_slice(b"\x1b_");
                out.extend_from_slice(&graphics.data);
                out.extend_from_slice(b"\x1b\\");
            }
            GraphicsKind::Sixel => {
                out.extend_from_slice(b"\x1bP");
                out.extend_from_slice(&graphics.data);
                out.extend_from_slice(b"\x1b\\");
            }
        }
        // Cursor restore.
        out.extend_from_slice(b"\x1b8");
        Some(out)
    }
}

/// Copy a layer onto the frame at `(x, y)`, clipping to `area`.
fn compose(buf: &mut Buffer, area: TuiRect, x: i32, y: i32, layer: &Layer) {
    for ly in 0..layer.height {
        let target_y = y + ly as i32;
        if target_y < area.y as i32 || target_y >= area.bottom() as i32 {
            continue;
        }
        for lx in 0..layer.width {
            let target_x = x + lx as i32;
            if target_x < area.x as i32 || target_x >= area.right() as i32 {
                continue;
            }
            let Some(src) = layer.cell(lx, ly) else {
                continue;
            };
            if let Some(dst) =
                buf.cell_mut(Position::new(target_x as u16, target_y as u16))
            {
                *dst = src.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Rect;
    use crate::window::Window;
    use crate::wm::test_support::manager;

    fn spawn(wm: &mut WindowManager, bounds: Rect) -> Uuid {
        let window = Window::new(bounds, wm.current_workspace, 100);
        let id = window.id;
        wm.add_window(window);
        id
    }

    fn frame_area() -> TuiRect {
        TuiRect::new(0, 0, 120, 40)
    }

    #[test]
    fn first_render_builds_layers() {
        let mut wm = manager();
        wm.animations_suppressed = true;
        let id = spawn(&mut wm, Rect::new(2, 2, 30, 10));
        let mut renderer = Renderer::new();
        let mut buf = Buffer::empty(frame_area());
        renderer.render(&mut wm, frame_area(), &mut buf);

        assert!(renderer.layers.contains_key(&id));
        // The window frame landed on the host grid.
        assert_ne!(buf.cell(Position::new(2, 2)).unwrap().symbol(), " ");
        // Dirty flags were consumed.
        assert!(!wm.window(id).unwrap().dirty.any());
    }

    #[test]
    fn clean_windows_reuse_cached_layers() {
        let mut wm = manager();
        wm.animations_suppressed = true;
        let id = spawn(&mut wm, Rect::new(0, 0, 30, 10));
        let mut renderer = Renderer::new();
        let mut buf = Buffer::empty(frame_area());
        renderer.render(&mut wm, frame_area(), &mut buf);

        let before = renderer.layers.get(&id).unwrap().key;
        renderer.render(&mut wm, frame_area(), &mut buf);
        assert_eq!(renderer.layers.get(&id).unwrap().key, before);
    }

    #[test]
    fn moved_window_invalidates_key() {
        let mut wm = manager();
        wm.animations_suppressed = true;
        let id = spawn(&mut wm, Rect::new(0, 0, 30, 10));
        let mut renderer = Renderer::new();
        let mut buf = Buffer::empty(frame_area());
        renderer.render(&mut wm, frame_area(), &mut buf);

        wm.window_mut(id).unwrap().set_position(10, 5);
        let mut buf = Buffer::empty(frame_area());
        renderer.render(&mut wm, frame_area(), &mut buf);
        let key = renderer.layers.get(&id).unwrap().key;
        assert_eq!((key.x, key.y), (10, 5));
        assert_ne!(buf.cell(Position::new(10, 5)).unwrap().symbol(), " ");
    }

    #[test]
    fn focused_output_dirties_immediately_background_batches() {
        let mut wm = manager();
        wm.animations_suppressed = true;
        let back = spawn(&mut wm, Rect::new(0, 0, 30, 10));
        let front = spawn(&mut wm, Rect::new(40, 0, 30, 10));
        assert_eq!(wm.focused_id(), Some(front));

        // Consume initial dirt.
        let mut renderer = Renderer::new();
        let mut buf = Buffer::empty(frame_area());
        renderer.render(&mut wm, frame_area(), &mut buf);
        wm.window_mut(back).unwrap().dirty.clear();
        wm.window_mut(front).unwrap().dirty.clear();

        // Output in both.
        for id in [back, front] {
            let window = wm.window(id).unwrap();
            window.vt.lock().unwrap().write(b"x");
        }

        renderer.tick_count = 0; // next prepare is tick 1: not a flush tick
        assert!(renderer.prepare(&mut wm));
        assert!(wm.window(front).unwrap().dirty.content);
        assert!(!wm.window(back).unwrap().dirty.content);

        // Third tick flushes the background window.
        renderer.prepare(&mut wm);
        renderer.prepare(&mut wm);
        assert!(wm.window(back).unwrap().dirty.content);
    }

    #[test]
    fn idle_counter_reaches_idle_tier() {
        let mut wm = manager();
        let mut renderer = Renderer::new();
        renderer.last_clock = chrono::Local::now().format("%H:%M").to_string();
        // No windows, no overlays: nothing to do.
        for _ in 0..IDLE_THRESHOLD_FRAMES {
            let _ = renderer.prepare(&mut wm);
        }
        assert_eq!(renderer.fps_tier(&wm), FpsTier::Idle);

        // Interaction beats idle.
        wm.drag = Some(crate::wm::DragState {
            window: Uuid::new_v4(),
            offset: (0, 0),
            was_tiled: false,
        });
        assert_eq!(renderer.fps_tier(&wm), FpsTier::Interaction);
    }

    #[test]
    fn frame_skip_when_nothing_changed() {
        let mut wm = manager();
        wm.animations_suppressed = true;
        let id = spawn(&mut wm, Rect::new(0, 0, 30, 10));
        let mut renderer = Renderer::new();
        let mut buf = Buffer::empty(frame_area());
        renderer.render(&mut wm, frame_area(), &mut buf);
        wm.window_mut(id).unwrap().dirty.clear();

        // Stabilize the clock so it can't force a frame.
        renderer.last_clock = chrono::Local::now().format("%H:%M").to_string();
        assert!(!renderer.prepare(&mut wm));
    }

    #[test]
    fn other_workspace_windows_are_not_composited() {
        let mut wm = manager();
        wm.animations_suppressed = true;
        let id = spawn(&mut wm, Rect::new(0, 0, 30, 10));
        wm.window_mut(id).unwrap().workspace = 5;
        wm.workspace_mut(1).focus = None;

        let mut renderer = Renderer::new();
        let mut buf = Buffer::empty(frame_area());
        renderer.render(&mut wm, frame_area(), &mut buf);
        assert_eq!(buf.cell(Position::new(0, 0)).unwrap().symbol(), " ");
    }

    #[test]
    fn offscreen_layers_clip() {
        let mut wm = manager();
        wm.animations_suppressed = true;
        // Hanging off the left edge.
        let id = spawn(&mut wm, Rect::new(-10, 0, 30, 10));
        let mut renderer = Renderer::new();
        let mut buf = Buffer::empty(frame_area());
        renderer.render(&mut wm, frame_area(), &mut buf);
        // Visible remnant rendered; no panic from negative coordinates.
        assert!(renderer.layers.contains_key(&id));
        assert_ne!(buf.cell(Position::new(0, 0)).unwrap().symbol(), " ");
    }

    #[test]
    fn fps_intervals() {
        assert_eq!(FpsTier::Normal.interval(), Duration::from_micros(16_666));
        assert_eq!(FpsTier::Interaction.interval(), Duration::from_micros(33_333));
        assert_eq!(FpsTier::Idle.interval(), Duration::from_micros(100_000));
    }
}
