//! Input dispatch: keys and mouse events into manager mutations and
//! [`WmEffect`]s.
//!
//! Two modes route everything. In window-management mode keys map through
//! the binding table below; in terminal mode keys are encoded for the
//! focused window's PTY unless they open the leader prefix. The leader
//! (default `ctrl+b`) starts a 2-second prefix window with sub-prefixes
//! (`w` workspaces, `m` move-to-workspace, `t` tiling, `T` tapes, `D`
//! dockbar); pressing the leader twice forwards it literally.
//!
//! Mouse gestures: title-bar drag moves a window (detaching it from the
//! tiling tree for the gesture), corner drag resizes with the VT resized
//! once on release. In terminal mode, events forward to the focused VT
//! only when it enabled a mouse mode — and motion right after a mode
//! switch is discarded so misparsed escape fragments can't surface as
//! phantom events.

use std::time::Instant;

use crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use uuid::Uuid;

use crate::constants::{MOUSE_MOTION_SETTLE, PREFIX_TIMEOUT};
use crate::geom::Rect;
use crate::layout::{clamp_to_view, DockbarPosition, Orientation, SnapRegion};
use crate::tape::keys::parse_key_token;
use crate::window::{MIN_WINDOW_HEIGHT, MIN_WINDOW_WIDTH};

use super::encode;
use super::{
    Corner, Direction, DragState, InputMode, PrefixState, ResizeState, Severity, WindowManager,
    WmEffect,
};

/// One row of the keybinding listing (`keybinds list`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct Keybind {
    /// Where the binding applies.
    pub context: &'static str,
    /// Key chord, user-facing notation.
    pub keys: String,
    /// What it does.
    pub action: &'static str,
}

/// The default binding table, for the help overlay and `keybinds list`.
pub fn default_keybinds(leader: &str) -> Vec<Keybind> {
    let p = |tail: &str| format!("{leader} {tail}");
    vec![
        Keybind { context: "any", keys: leader.to_string(), action: "enter prefix mode" },
        Keybind { context: "prefix", keys: p("c"), action: "create window" },
        Keybind { context: "prefix", keys: p("x"), action: "close focused window" },
        Keybind { context: "prefix", keys: p("n / p"), action: "cycle focus forward / back" },
        Keybind { context: "prefix", keys: p("d"), action: "detach from session" },
        Keybind { context: "prefix", keys: p("1..9"), action: "switch workspace" },
        Keybind { context: "prefix", keys: p("esc"), action: "window-management mode" },
        Keybind { context: "prefix", keys: p("w 1..9"), action: "switch workspace" },
        Keybind { context: "prefix", keys: p("m 1..9"), action: "move window to workspace" },
        Keybind { context: "prefix", keys: p("t t"), action: "toggle tiling" },
        Keybind { context: "prefix", keys: p("t e"), action: "equalize splits" },
        Keybind { context: "prefix", keys: p("t r"), action: "rotate split" },
        Keybind { context: "prefix", keys: p("t h / t v"), action: "preselect split direction" },
        Keybind { context: "prefix", keys: p("T l"), action: "tape manager" },
        Keybind { context: "prefix", keys: p("D t/b/h"), action: "dockbar top / bottom / hidden" },
        Keybind { context: "wm", keys: "enter / i".into(), action: "terminal mode" },
        Keybind { context: "wm", keys: "n".into(), action: "create window" },
        Keybind { context: "wm", keys: "x".into(), action: "close focused window" },
        Keybind { context: "wm", keys: "q".into(), action: "quit (with confirmation)" },
        Keybind { context: "wm", keys: "h/j/k/l, arrows".into(), action: "focus direction" },
        Keybind { context: "wm", keys: "H / L".into(), action: "snap left / right half" },
        Keybind { context: "wm", keys: "U/I/O/P".into(), action: "snap quarters" },
        Keybind { context: "wm", keys: "F".into(), action: "snap fullscreen" },
        Keybind { context: "wm", keys: "t".into(), action: "toggle tiling" },
        Keybind { context: "wm", keys: "e".into(), action: "equalize splits" },
        Keybind { context: "wm", keys: "r".into(), action: "rotate split" },
        Keybind { context: "wm", keys: "m".into(), action: "minimize / restore" },
        Keybind { context: "wm", keys: "N".into(), action: "rename window" },
        Keybind { context: "wm", keys: "tab".into(), action: "cycle focus" },
        Keybind { context: "wm", keys: "1..9".into(), action: "switch workspace" },
        Keybind { context: "wm", keys: "?".into(), action: "help overlay" },
        Keybind { context: "wm", keys: "g".into(), action: "logs overlay" },
        Keybind { context: "wm", keys: "b".into(), action: "scrollback browser" },
    ]
}

impl WindowManager {
    /// Per-tick housekeeping: prefix timeout, notification expiry,
    /// animation progress.
    pub fn housekeeping(&mut self, now: Instant) {
        if let Some(prefix) = self.prefix {
            if now.duration_since(prefix.entered_at) > PREFIX_TIMEOUT {
                self.prefix = None;
            }
        }
        self.expire_notifications();
        self.tick_animations(now);
    }

    /// Whether the leader chord matches this key.
    fn is_leader(&self, key: &KeyEvent) -> bool {
        match parse_key_token(&self.config.leader_key) {
            Some((modifiers, code)) => key.modifiers == modifiers && key.code == code,
            None => {
                key.modifiers == KeyModifiers::CONTROL && key.code == KeyCode::Char('b')
            }
        }
    }
}

/// Handle a key event. Returns the effects for the app loop.
pub fn handle_key(wm: &mut WindowManager, key: &KeyEvent) -> Vec<WmEffect> {
    if key.kind == KeyEventKind::Release {
        return Vec::new();
    }

    // Modal surfaces swallow everything first.
    if wm.quit_dialog {
        return handle_quit_dialog(wm, key);
    }
    if wm.rename.is_some() {
        handle_rename_prompt(wm, key);
        return Vec::new();
    }

    // Prefix mode (with its 2 s timeout).
    if let Some(prefix) = wm.prefix {
        if Instant::now().duration_since(prefix.entered_at) > PREFIX_TIMEOUT {
            wm.prefix = None;
        } else {
            return handle_prefix_key(wm, prefix, key);
        }
    }

    if wm.is_leader(key) {
        wm.prefix = Some(PrefixState {
            entered_at: Instant::now(),
            sub: None,
        });
        return Vec::new();
    }

    match wm.mode {
        InputMode::Terminal => forward_key(wm, key),
        InputMode::WindowManagement => handle_wm_key(wm, key),
    }
}

fn handle_quit_dialog(wm: &mut WindowManager, key: &KeyEvent) -> Vec<WmEffect> {
    match key.code {
        KeyCode::Char('y') | KeyCode::Enter => {
            wm.quit_dialog = false;
            vec![WmEffect::Quit]
        }
        KeyCode::Char('n') | KeyCode::Esc => {
            wm.quit_dialog = false;
            Vec::new()
        }
        _ => Vec::new(),
    }
}

fn handle_rename_prompt(wm: &mut WindowManager, key: &KeyEvent) {
    let Some((target, mut buffer)) = wm.rename.take() else {
        return;
    };
    match key.code {
        KeyCode::Enter => {
            wm.rename_window(target, buffer);
        }
        KeyCode::Esc => {}
        KeyCode::Backspace => {
            buffer.pop();
            wm.rename = Some((target, buffer));
        }
        KeyCode::Char(c) => {
            buffer.push(c);
            wm.rename = Some((target, buffer));
        }
        _ => {
            wm.rename = Some((target, buffer));
        }
    }
}

fn handle_prefix_key(
    wm: &mut WindowManager,
    prefix: PrefixState,
    key: &KeyEvent,
) -> Vec<WmEffect> {
    // Leader twice forwards the leader chord literally.
    if prefix.sub.is_none() && wm.is_leader(key) {
        wm.prefix = None;
        return forward_key(wm, key);
    }

    match prefix.sub {
        None => match key.code {
            KeyCode::Char('c') => {
                wm.prefix = None;
                vec![WmEffect::CreateWindow { name: None }]
            }
            KeyCode::Char('x') => {
                wm.prefix = None;
                wm.focused_id()
                    .map(|window| vec![WmEffect::CloseWindow { window }])
                    .unwrap_or_default()
            }
            KeyCode::Char('n') => {
                wm.prefix = None;
                wm.cycle_focus(true);
                Vec::new()
            }
            KeyCode::Char('p') => {
                wm.prefix = None;
                wm.cycle_focus(false);
                Vec::new()
            }
            KeyCode::Char('d') => {
                wm.prefix = None;
                vec![WmEffect::Detach]
            }
            KeyCode::Char(c @ '1'..='9') => {
                wm.prefix = None;
                wm.switch_workspace(c as usize - '0' as usize);
                Vec::new()
            }
            KeyCode::Char(sub @ ('w' | 'm' | 't' | 'T' | 'D')) => {
                wm.prefix = Some(PrefixState {
                    entered_at: Instant::now(),
                    sub: Some(sub),
                });
                Vec::new()
            }
            KeyCode::Esc => {
                wm.prefix = None;
                wm.set_mode(InputMode::WindowManagement);
                Vec::new()
            }
            other => {
                wm.prefix = None;
                wm.notify(Severity::Warning, format!("unbound prefix key: {other:?}"));
                Vec::new()
            }
        },
        Some('w') => {
            wm.prefix = None;
            if let KeyCode::Char(c @ '1'..='9') = key.code {
                wm.switch_workspace(c as usize - '0' as usize);
            }
            Vec::new()
        }
        Some('m') => {
            wm.prefix = None;
            if let KeyCode::Char(c @ '1'..='9') = key.code {
                if let Some(id) = wm.focused_id() {
                    wm.move_to_workspace(id, c as usize - '0' as usize, false);
                }
            }
            Vec::new()
        }
        Some('t') => {
            wm.prefix = None;
            match key.code {
                KeyCode::Char('t') => wm.toggle_tiling(),
                KeyCode::Char('e') => wm.equalize(),
                KeyCode::Char('r') => wm.rotate_split(),
                // "horizontal split" = side by side = vertical divider.
                KeyCode::Char('h') => wm.preselect_split(Orientation::Vertical),
                KeyCode::Char('v') => wm.preselect_split(Orientation::Horizontal),
                _ => {}
            }
            Vec::new()
        }
        Some('T') => {
            wm.prefix = None;
            if key.code == KeyCode::Char('l') {
                wm.help_visible = false;
                wm.logs_visible = false;
                wm.tape_manager_visible = !wm.tape_manager_visible;
            }
            Vec::new()
        }
        Some('D') => {
            wm.prefix = None;
            let position = match key.code {
                KeyCode::Char('t') => Some(DockbarPosition::Top),
                KeyCode::Char('b') => Some(DockbarPosition::Bottom),
                KeyCode::Char('h') => Some(DockbarPosition::Hidden),
                _ => None,
            };
            if let Some(position) = position {
                wm.config.dockbar_position = position;
                wm.viewport.dockbar = position;
                wm.viewport_resized(wm.viewport.width, wm.viewport.height);
            }
            Vec::new()
        }
        Some(other) => {
            wm.prefix = None;
            log::debug!("unknown sub-prefix {other:?}");
            Vec::new()
        }
    }
}

fn handle_wm_key(wm: &mut WindowManager, key: &KeyEvent) -> Vec<WmEffect> {
    match key.code {
        KeyCode::Enter | KeyCode::Char('i') => {
            if wm.focused_id().is_some() {
                wm.set_mode(InputMode::Terminal);
            }
            Vec::new()
        }
        KeyCode::Char('n') => vec![WmEffect::CreateWindow { name: None }],
        KeyCode::Char('x') => wm
            .focused_id()
            .map(|window| vec![WmEffect::CloseWindow { window }])
            .unwrap_or_default(),
        KeyCode::Char('q') => {
            wm.quit_dialog = true;
            Vec::new()
        }
        KeyCode::Char('h') | KeyCode::Left => {
            wm.focus_direction(Direction::Left);
            Vec::new()
        }
        KeyCode::Char('j') | KeyCode::Down => {
            wm.focus_direction(Direction::Down);
            Vec::new()
        }
        KeyCode::Char('k') | KeyCode::Up => {
            wm.focus_direction(Direction::Up);
            Vec::new()
        }
        KeyCode::Char('l') | KeyCode::Right => {
            wm.focus_direction(Direction::Right);
            Vec::new()
        }
        KeyCode::Char('H') => snap(wm, SnapRegion::Left),
        KeyCode::Char('L') => snap(wm, SnapRegion::Right),
        KeyCode::Char('F') => snap(wm, SnapRegion::Fullscreen),
        KeyCode::Char('U') => snap(wm, SnapRegion::TopLeft),
        KeyCode::Char('I') => snap(wm, SnapRegion::TopRight),
        KeyCode::Char('O') => snap(wm, SnapRegion::BottomLeft),
        KeyCode::Char('P') => snap(wm, SnapRegion::BottomRight),
        KeyCode::Char('t') => {
            wm.toggle_tiling();
            Vec::new()
        }
        KeyCode::Char('e') => {
            wm.equalize();
            Vec::new()
        }
        KeyCode::Char('r') => {
            wm.rotate_split();
            Vec::new()
        }
        KeyCode::Char('m') => {
            if let Some(id) = wm.focused_id() {
                wm.toggle_minimize(id);
            }
            Vec::new()
        }
        KeyCode::Char('N') => {
            if let Some(id) = wm.focused_id() {
                let current = wm
                    .window(id)
                    .and_then(|w| w.custom_name.clone())
                    .unwrap_or_default();
                wm.rename = Some((id, current));
            }
            Vec::new()
        }
        KeyCode::Tab => {
            wm.cycle_focus(true);
            Vec::new()
        }
        KeyCode::Char(c @ '1'..='9') => {
            wm.switch_workspace(c as usize - '0' as usize);
            Vec::new()
        }
        KeyCode::Char('?') => {
            wm.logs_visible = false;
            wm.tape_manager_visible = false;
            wm.help_visible = !wm.help_visible;
            Vec::new()
        }
        KeyCode::Char('g') => {
            wm.help_visible = false;
            wm.tape_manager_visible = false;
            wm.logs_visible = !wm.logs_visible;
            Vec::new()
        }
        KeyCode::Char('b') => {
            wm.help_visible = false;
            wm.logs_visible = false;
            wm.tape_manager_visible = false;
            wm.scrollback_browser_visible = !wm.scrollback_browser_visible;
            Vec::new()
        }
        KeyCode::Esc => {
            wm.help_visible = false;
            wm.logs_visible = false;
            wm.tape_manager_visible = false;
            wm.scrollback_browser_visible = false;
            Vec::new()
        }
        _ => Vec::new(),
    }
}

fn snap(wm: &mut WindowManager, region: SnapRegion) -> Vec<WmEffect> {
    wm.snap_focused(region);
    Vec::new()
}

/// Encode and forward a key to the focused window's PTY.
fn forward_key(wm: &mut WindowManager, key: &KeyEvent) -> Vec<WmEffect> {
    let Some(window) = wm.focused_window() else {
        return Vec::new();
    };
    let modes = window
        .vt
        .lock()
        .map(|vt| vt.modes())
        .unwrap_or_default();
    let bytes = encode::encode_key(key, modes);
    if bytes.is_empty() {
        return Vec::new();
    }
    vec![WmEffect::WritePty {
        window: window.id,
        bytes,
    }]
}

/// Forward pasted text to the focused window.
pub fn handle_paste(wm: &mut WindowManager, text: &str) -> Vec<WmEffect> {
    if wm.mode != InputMode::Terminal {
        return Vec::new();
    }
    let Some(window) = wm.focused_window() else {
        return Vec::new();
    };
    let modes = window.vt.lock().map(|vt| vt.modes()).unwrap_or_default();
    vec![WmEffect::WritePty {
        window: window.id,
        bytes: encode::encode_paste(text, modes),
    }]
}

/// Handle a mouse event.
pub fn handle_mouse(wm: &mut WindowManager, event: &MouseEvent) -> Vec<WmEffect> {
    let (x, y) = (event.column as i32, event.row as i32);

    match wm.mode {
        InputMode::WindowManagement => {
            handle_wm_mouse(wm, event, x, y);
            Vec::new()
        }
        InputMode::Terminal => handle_terminal_mouse(wm, event, x, y),
    }
}

fn handle_wm_mouse(wm: &mut WindowManager, event: &MouseEvent, x: i32, y: i32) {
    match event.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            let Some(id) = window_at(wm, x, y) else {
                return;
            };
            wm.focus(id);
            let Some(window) = wm.window(id) else {
                return;
            };
            let bounds = window.bounds;

            if let Some(corner) = corner_at(bounds, x, y) {
                wm.resize = Some(ResizeState {
                    window: id,
                    start_bounds: bounds,
                    start_cursor: (x, y),
                    corner,
                });
                return;
            }

            // Title-bar row drags; a tiled window detaches for the gesture.
            if y == bounds.y {
                let was_tiled = wm.auto_tiling
                    && wm
                        .workspaces
                        .get(&wm.current_workspace)
                        .is_some_and(|ws| ws.bsp.contains(id));
                if was_tiled {
                    wm.workspace_mut(wm.current_workspace).bsp.remove(id);
                    wm.retile();
                }
                wm.drag = Some(DragState {
                    window: id,
                    offset: (x - bounds.x, y - bounds.y),
                    was_tiled,
                });
            }
        }
        MouseEventKind::Drag(MouseButton::Left) | MouseEventKind::Moved => {
            if let Some(drag) = wm.drag {
                let target = {
                    let Some(window) = wm.window(drag.window) else {
                        return;
                    };
                    Rect::new(x - drag.offset.0, y - drag.offset.1, window.bounds.w, window.bounds.h)
                };
                let clamped = clamp_to_view(target, &wm.viewport);
                if let Some(window) = wm.window_mut(drag.window) {
                    window.set_position(clamped.x, clamped.y);
                }
            } else if let Some(resize) = wm.resize {
                let bounds = resize_bounds(resize, x, y);
                if let Some(window) = wm.window_mut(resize.window) {
                    // Intermediate frames move the frame only; the VT is
                    // resized once on release.
                    window.bounds = bounds;
                    window.dirty.position = true;
                }
            }
            // Motion with no gesture in progress is filtered.
        }
        MouseEventKind::Up(MouseButton::Left) => {
            if let Some(drag) = wm.drag.take() {
                let clamped = {
                    let Some(window) = wm.window(drag.window) else {
                        return;
                    };
                    clamp_to_view(window.bounds, &wm.viewport)
                };
                if let Some(window) = wm.window_mut(drag.window) {
                    window.set_position(clamped.x, clamped.y);
                }
                // A detached tiled window rejoins the tree once the
                // gesture ends.
                if drag.was_tiled && wm.auto_tiling {
                    let focused = wm.focused_id();
                    wm.workspace_mut(wm.current_workspace)
                        .bsp
                        .insert(drag.window, focused.filter(|f| *f != drag.window));
                    wm.retile();
                }
            }
            if let Some(resize) = wm.resize.take() {
                let bounds = {
                    let Some(window) = wm.window(resize.window) else {
                        return;
                    };
                    clamp_to_view(window.bounds, &wm.viewport)
                };
                if let Some(window) = wm.window_mut(resize.window) {
                    window.set_bounds(bounds);
                }
            }
        }
        _ => {}
    }
}

fn handle_terminal_mouse(wm: &mut WindowManager, event: &MouseEvent, x: i32, y: i32) -> Vec<WmEffect> {
    // Discard motion right after a mode switch: CSI-u fragments from the
    // transition would otherwise parse as phantom events.
    if matches!(event.kind, MouseEventKind::Moved | MouseEventKind::Drag(_))
        && Instant::now().duration_since(wm.mode_switched_at) < MOUSE_MOTION_SETTLE
    {
        return Vec::new();
    }

    // Clicking a different window focuses it instead of forwarding.
    if let MouseEventKind::Down(_) = event.kind {
        if let Some(id) = window_at(wm, x, y) {
            if wm.focused_id() != Some(id) {
                wm.focus(id);
                return Vec::new();
            }
        }
    }

    let Some(window) = wm.focused_window() else {
        return Vec::new();
    };
    let bounds = window.bounds;
    // Interior coordinates (inside the border).
    let col = x - bounds.x - 1;
    let row = y - bounds.y - 1;
    if col < 0 || row < 0 || col >= bounds.w as i32 - 2 || row >= bounds.h as i32 - 2 {
        return Vec::new();
    }

    let modes = window.vt.lock().map(|vt| vt.modes()).unwrap_or_default();
    match encode::encode_mouse(event, col as u16, row as u16, modes) {
        Some(bytes) => vec![WmEffect::WritePty {
            window: window.id,
            bytes,
        }],
        None => Vec::new(),
    }
}

/// Topmost visible window containing the point.
fn window_at(wm: &WindowManager, x: i32, y: i32) -> Option<Uuid> {
    wm.visible_windows()
        .iter()
        .rev()
        .find(|w| w.bounds.contains(x, y))
        .map(|w| w.id)
}

/// Which corner cell of the border the point sits on, if any.
fn corner_at(bounds: Rect, x: i32, y: i32) -> Option<Corner> {
    let right = bounds.right() - 1;
    let bottom = bounds.bottom() - 1;
    match (x, y) {
        _ if (x, y) == (bounds.x, bounds.y) => Some(Corner::TopLeft),
        _ if (x, y) == (right, bounds.y) => Some(Corner::TopRight),
        _ if (x, y) == (bounds.x, bottom) => Some(Corner::BottomLeft),
        _ if (x, y) == (right, bottom) => Some(Corner::BottomRight),
        _ => None,
    }
}

/// New bounds for a corner resize, respecting the minimum size.
fn resize_bounds(resize: ResizeState, x: i32, y: i32) -> Rect {
    let dx = x - resize.start_cursor.0;
    let dy = y - resize.start_cursor.1;
    let start = resize.start_bounds;
    let min_w = MIN_WINDOW_WIDTH as i32;
    let min_h = MIN_WINDOW_HEIGHT as i32;

    let (new_x, new_w) = match resize.corner {
        Corner::TopRight | Corner::BottomRight => {
            (start.x, (start.w as i32 + dx).max(min_w))
        }
        Corner::TopLeft | Corner::BottomLeft => {
            let w = (start.w as i32 - dx).max(min_w);
            (start.right() - w, w)
        }
    };
    let (new_y, new_h) = match resize.corner {
        Corner::BottomLeft | Corner::BottomRight => {
            (start.y, (start.h as i32 + dy).max(min_h))
        }
        Corner::TopLeft | Corner::TopRight => {
            let h = (start.h as i32 - dy).max(min_h);
            (start.bottom() - h, h)
        }
    };
    Rect::new(new_x, new_y, new_w as u16, new_h as u16)
}
