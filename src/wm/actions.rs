//! Window lifecycle and layout actions.
//!
//! Everything here mutates manager state only; PTY side effects surface as
//! [`WmEffect`](super::WmEffect) values from the input layer or are done by
//! the app loop after calling these.

use std::time::Instant;

use uuid::Uuid;

use crate::constants::WORKSPACE_COUNT;
use crate::geom::Rect;
use crate::layout::animation::DEFAULT_DURATION;
use crate::layout::{clamp_to_view, snap_bounds, Orientation, SnapRegion};
use crate::window::Window;

use super::{Direction, Severity, WindowManager};

impl WindowManager {
    /// Cascade placement for a new floating window.
    pub fn spawn_bounds(&self) -> Rect {
        let area = self.viewport.usable();
        let count = self
            .windows
            .iter()
            .filter(|w| w.workspace == self.current_workspace)
            .count() as i32;
        let w = (area.w as i32 * 3 / 5).clamp(crate::layout::MIN_VISIBLE_COLS, area.w as i32) as u16;
        let h = (area.h as i32 * 3 / 5).clamp(crate::layout::MIN_VISIBLE_ROWS, area.h as i32) as u16;
        let step = (count % 5) * 2;
        clamp_to_view(
            Rect::new(area.x + 2 + step, area.y + 1 + step, w, h),
            &self.viewport,
        )
    }

    /// Register a window: focus it and tile it if auto-tiling is on.
    pub fn add_window(&mut self, window: Window) {
        let id = window.id;
        let workspace = window.workspace;
        self.windows.push(window);
        if self.auto_tiling && workspace == self.current_workspace {
            let focused = self.focused_id();
            self.workspace_mut(workspace).bsp.insert(id, focused);
        }
        if workspace == self.current_workspace {
            self.workspace_mut(workspace).focus = Some(id);
            self.raise(id);
        }
        self.retile();
    }

    /// Remove a window from every structure and hand it back for PTY
    /// teardown. Focus falls to the top remaining window.
    pub fn remove_window(&mut self, id: Uuid) -> Option<Window> {
        let index = self.windows.iter().position(|w| w.id == id)?;
        let window = self.windows.remove(index);
        let workspace = window.workspace;

        self.animations.remove_window(id);
        {
            let ws = self.workspace_mut(workspace);
            ws.bsp.remove(id);
            ws.floating_bounds.remove(&id);
            if ws.focus == Some(id) {
                ws.focus = None;
            }
        }

        if workspace == self.current_workspace {
            let next = self.visible_windows().last().map(|w| w.id);
            if let Some(next) = next {
                self.workspace_mut(workspace).focus = Some(next);
                self.raise(next);
            }
        }
        self.retile();
        self.log(Severity::Info, format!("window closed: {}", window.display_name()));
        Some(window)
    }

    /// Re-apply the BSP layout to the current workspace (no-op while
    /// floating).
    pub fn retile(&mut self) {
        if !self.auto_tiling {
            return;
        }
        let area = self.viewport.usable();
        let placements = self
            .workspace_mut(self.current_workspace)
            .bsp
            .layout(area);
        for (id, bounds) in placements {
            self.place_window(id, bounds);
        }
    }

    /// Move a window toward `target`, animated when allowed.
    pub fn place_window(&mut self, id: Uuid, target: Rect) {
        let Some(window) = self.window(id) else {
            return;
        };
        if window.bounds == target {
            return;
        }
        if self.animations_allowed() {
            let start = window.bounds;
            self.animations.animate(id, start, target, DEFAULT_DURATION);
        } else if let Some(window) = self.window_mut(id) {
            window.set_bounds(target);
        }
    }

    /// Advance animations: intermediate frames move bounds without
    /// resizing the VT; the final frame commits through `set_bounds` so
    /// the PTY resizes exactly once.
    pub fn tick_animations(&mut self, now: Instant) {
        for step in self.animations.tick(now) {
            let Some(window) = self.window_mut(step.window_id) else {
                continue;
            };
            if step.finished {
                window.set_bounds(step.bounds);
            } else {
                window.bounds = step.bounds;
                window.dirty.position = true;
            }
        }
    }

    /// Snap the focused window to a region.
    pub fn snap_focused(&mut self, region: SnapRegion) {
        let Some(id) = self.focused_id() else {
            return;
        };
        let target = snap_bounds(region, &self.viewport);
        if self.auto_tiling {
            // Snapping detaches the window into floating mode.
            self.workspace_mut(self.current_workspace).bsp.remove(id);
            self.retile();
        }
        self.place_window(id, target);
    }

    /// Minimize or restore a window.
    pub fn toggle_minimize(&mut self, id: Uuid) {
        let Some(window) = self.window_mut(id) else {
            return;
        };
        if window.minimized {
            window.minimized = false;
            let restore = window.pre_minimize_bounds.take().unwrap_or(window.bounds);
            window.invalidate_cache();
            if self.auto_tiling {
                let focused = self.focused_id();
                self.workspace_mut(self.current_workspace)
                    .bsp
                    .insert(id, focused);
                self.retile();
            } else {
                self.place_window(id, restore);
            }
            self.focus(id);
        } else {
            window.pre_minimize_bounds = Some(window.bounds);
            window.minimized = true;
            window.invalidate_cache();
            self.animations.remove_window(id);
            if self.auto_tiling {
                self.workspace_mut(self.current_workspace).bsp.remove(id);
                self.retile();
            }
            if self.focused_id() == Some(id) {
                let next = self.visible_windows().last().map(|w| w.id);
                self.workspace_mut(self.current_workspace).focus = next;
                if let Some(next) = next {
                    self.raise(next);
                }
            }
        }
    }

    /// Assign a custom name.
    pub fn rename_window(&mut self, id: Uuid, name: String) {
        if let Some(window) = self.window_mut(id) {
            window.custom_name = (!name.is_empty()).then_some(name);
            window.dirty.full = true;
        }
    }

    /// Move a window to another workspace, optionally following it.
    pub fn move_to_workspace(&mut self, id: Uuid, target: usize, follow: bool) {
        if target == 0 || target > WORKSPACE_COUNT {
            self.notify(Severity::Error, format!("no workspace {target}"));
            return;
        }
        let Some(current_ws) = self.window(id).map(|w| w.workspace) else {
            return;
        };
        if current_ws == target {
            return;
        }

        self.animations.remove_window(id);
        {
            let ws = self.workspace_mut(current_ws);
            ws.bsp.remove(id);
            if ws.focus == Some(id) {
                ws.focus = None;
            }
        }
        if let Some(window) = self.window_mut(id) {
            window.workspace = target;
            window.invalidate_cache();
        }
        {
            let auto_tiling = self.auto_tiling;
            let focused_there = self.workspaces.get(&target).and_then(|ws| ws.focus);
            let ws = self.workspace_mut(target);
            if auto_tiling {
                ws.bsp.insert(id, focused_there);
            }
            ws.focus = Some(id);
        }

        if follow {
            self.switch_workspace(target);
            self.focus(id);
        } else if current_ws == self.current_workspace {
            let next = self.visible_windows().last().map(|w| w.id);
            self.workspace_mut(current_ws).focus = next;
        }
        self.retile();
    }

    /// Toggle BSP tiling for the whole session.
    ///
    /// Enabling rebuilds the current workspace's tree from the visible
    /// windows in stacking order and remembers each window's floating
    /// bounds; disabling restores them.
    pub fn toggle_tiling(&mut self) {
        self.auto_tiling = !self.auto_tiling;
        if self.auto_tiling {
            let ordered: Vec<(Uuid, Rect)> = self
                .visible_windows()
                .iter()
                .map(|w| (w.id, w.bounds))
                .collect();
            let ws = self.workspace_mut(self.current_workspace);
            ws.bsp = crate::layout::BspTree::new(ws.bsp.scheme);
            for (id, bounds) in &ordered {
                ws.floating_bounds.insert(*id, *bounds);
            }
            let mut last = None;
            for (id, _) in ordered {
                self.workspace_mut(self.current_workspace).bsp.insert(id, last);
                last = Some(id);
            }
            self.retile();
        } else {
            let restores: Vec<(Uuid, Rect)> = {
                let ws = self.workspace_mut(self.current_workspace);
                ws.bsp = crate::layout::BspTree::new(ws.bsp.scheme);
                ws.floating_bounds.drain().collect()
            };
            for (id, bounds) in restores {
                self.place_window(id, bounds);
            }
        }
        let state = if self.auto_tiling { "tiling" } else { "floating" };
        self.log(Severity::Info, format!("layout mode: {state}"));
    }

    /// Set every split ratio in the current workspace to 0.5 and retile.
    pub fn equalize(&mut self) {
        self.workspace_mut(self.current_workspace).bsp.equalize();
        self.retile();
    }

    /// Flip the focused leaf's parent split and retile.
    pub fn rotate_split(&mut self) {
        if let Some(id) = self.focused_id() {
            self.workspace_mut(self.current_workspace).bsp.rotate(id);
            self.retile();
        }
    }

    /// One-shot orientation override for the next insert.
    pub fn preselect_split(&mut self, orientation: Orientation) {
        self.workspace_mut(self.current_workspace).bsp.preselect = Some(orientation);
    }

    /// Focus the neighbor in a direction, if any.
    pub fn focus_direction(&mut self, direction: Direction) {
        if let Some(id) = self.neighbor(direction) {
            self.focus(id);
        }
    }

    /// Cycle focus through the current workspace by stacking order.
    pub fn cycle_focus(&mut self, forward: bool) {
        let visible = self.visible_windows();
        if visible.is_empty() {
            return;
        }
        let ids: Vec<Uuid> = visible.iter().map(|w| w.id).collect();
        let current = self.focused_id();
        let index = current
            .and_then(|id| ids.iter().position(|&w| w == id))
            .unwrap_or(0);
        let next = if forward {
            ids[(index + 1) % ids.len()]
        } else {
            ids[(index + ids.len() - 1) % ids.len()]
        };
        self.focus(next);
    }

    /// Clamp every window on the current workspace into the viewport.
    pub fn clamp_windows_to_view(&mut self) {
        let viewport = self.viewport;
        let updates: Vec<(Uuid, Rect)> = self
            .windows
            .iter()
            .filter(|w| w.workspace == self.current_workspace && !w.minimized)
            .map(|w| (w.id, clamp_to_view(w.bounds, &viewport)))
            .collect();
        for (id, bounds) in updates {
            if let Some(window) = self.window_mut(id) {
                if window.bounds != bounds {
                    window.set_bounds(bounds);
                }
            }
        }
    }

    /// Handle a host viewport resize: re-clamp or re-tile everything.
    pub fn viewport_resized(&mut self, width: u16, height: u16) {
        self.viewport.width = width;
        self.viewport.height = height;
        if self.auto_tiling {
            self.retile();
        } else {
            self.clamp_windows_to_view();
        }
        for window in &mut self.windows {
            window.invalidate_cache();
        }
    }
}
