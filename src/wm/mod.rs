//! The window manager: all windows, workspaces, focus, Z order, input
//! modes, notifications, and the log ring.
//!
//! `WindowManager` is pure state plus operations — it never touches a PTY
//! or a socket. Input dispatch and actions return [`WmEffect`] values that
//! the owning event loop executes (spawn a PTY, write bytes, quit), which
//! keeps the manager synchronously testable and breaks the input↔manager
//! cycle without callback registries.
//!
//! ```text
//! crossterm event ──> wm::input::handle_* ──┬──> state mutation (here)
//!                                           └──> Vec<WmEffect> ──> app loop
//! ```

pub mod actions;
pub mod encode;
pub mod input;

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use uuid::Uuid;

use crate::config::Config;
use crate::constants::{LOG_RING_CAP, NOTIFICATION_DURATION, WORKSPACE_COUNT};
use crate::geom::Rect;
use crate::layout::{AnimationSet, AutoScheme, BspTree, Viewport};
use crate::window::Window;

/// Overlap tolerance for directional neighbor search: windows must share
/// at least this many cells on the orthogonal axis. Forgives off-by-one
/// tiling.
pub const NEIGHBOR_OVERLAP_MIN: i32 = 5;

/// Which part of the system consumes keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Keys drive the window manager.
    WindowManagement,
    /// Keys forward to the focused window's PTY.
    Terminal,
}

/// Side effects the event loop must perform on the manager's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WmEffect {
    /// Spawn a PTY-backed window (name becomes the custom name).
    CreateWindow {
        /// Optional custom name.
        name: Option<String>,
    },
    /// Close a window's PTY and remove it.
    CloseWindow {
        /// Target window.
        window: Uuid,
    },
    /// Forward bytes to a window's PTY.
    WritePty {
        /// Target window.
        window: Uuid,
        /// Raw bytes (already encoded for the child).
        bytes: Vec<u8>,
    },
    /// Quit the UI (after confirmation).
    Quit,
    /// Detach from the daemon, leaving the session running.
    Detach,
}

/// Severity of a notification / log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational.
    Info,
    /// Something odd, not fatal.
    Warning,
    /// An operation failed.
    Error,
}

/// A timed notification bubble.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Displayed text.
    pub message: String,
    /// Color coding.
    pub severity: Severity,
    /// Creation time (drives fade-out).
    pub created: Instant,
    /// Lifetime.
    pub duration: std::time::Duration,
}

/// One entry in the log ring.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Wall-clock timestamp.
    pub time: chrono::DateTime<chrono::Local>,
    /// Severity.
    pub severity: Severity,
    /// Message.
    pub message: String,
}

/// Per-workspace remembered state.
#[derive(Debug, Default)]
pub struct Workspace {
    /// Focused window to restore on switch-back.
    pub focus: Option<Uuid>,
    /// The tiling tree (meaningful while auto-tiling).
    pub bsp: BspTree,
    /// Floating bounds remembered per window for un-tiling.
    pub floating_bounds: HashMap<Uuid, Rect>,
    /// Whether a user adjusted the floating layout by hand.
    pub has_custom_layout: bool,
    /// Legacy master ratio carried on the wire.
    pub master_ratio: f64,
}

/// Transient drag state.
#[derive(Debug, Clone, Copy)]
pub struct DragState {
    /// Window being dragged.
    pub window: Uuid,
    /// Cursor offset from the window origin at grab time.
    pub offset: (i32, i32),
    /// The window was tiled and got detached for the gesture.
    pub was_tiled: bool,
}

/// Which corner a resize gesture grabbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    /// Top-left.
    TopLeft,
    /// Top-right.
    TopRight,
    /// Bottom-left.
    BottomLeft,
    /// Bottom-right.
    BottomRight,
}

/// Transient resize state.
#[derive(Debug, Clone, Copy)]
pub struct ResizeState {
    /// Window being resized.
    pub window: Uuid,
    /// Bounds at grab time.
    pub start_bounds: Rect,
    /// Cursor position at grab time.
    pub start_cursor: (i32, i32),
    /// Grabbed corner.
    pub corner: Corner,
}

/// Leader-key (prefix) mode state.
#[derive(Debug, Clone, Copy)]
pub struct PrefixState {
    /// When the leader was pressed (2 s timeout).
    pub entered_at: Instant,
    /// Active sub-prefix (`w`, `m`, `t`, `T`, `D`), if any.
    pub sub: Option<char>,
}

/// The window manager root.
#[derive(Debug)]
pub struct WindowManager {
    /// Every window across all workspaces.
    pub windows: Vec<Window>,
    /// Active workspace, 1-based.
    pub current_workspace: usize,
    /// Per-workspace remembered state.
    pub workspaces: HashMap<usize, Workspace>,
    /// Input routing mode.
    pub mode: InputMode,
    /// When the mode last changed (gates post-switch mouse motion).
    pub mode_switched_at: Instant,
    /// The host viewport.
    pub viewport: Viewport,
    /// Owned configuration.
    pub config: Config,
    /// In-flight animations (window ids, not pointers).
    pub animations: AnimationSet,
    /// Suppress animations globally (remote key execution).
    pub animations_suppressed: bool,
    /// Remote key/tape execution in progress.
    pub processing_remote_keys: bool,
    /// Automatic BSP tiling.
    pub auto_tiling: bool,
    /// Live drag gesture.
    pub drag: Option<DragState>,
    /// Live resize gesture.
    pub resize: Option<ResizeState>,
    /// Leader key state.
    pub prefix: Option<PrefixState>,
    /// Quit confirmation modal showing.
    pub quit_dialog: bool,
    /// Rename prompt: target window and the buffer.
    pub rename: Option<(Uuid, String)>,
    /// Help overlay visible.
    pub help_visible: bool,
    /// Logs overlay visible.
    pub logs_visible: bool,
    /// Tape manager overlay visible.
    pub tape_manager_visible: bool,
    /// Scrollback browser overlay visible (focused window's blocks).
    pub scrollback_browser_visible: bool,
    /// Active notification bubbles.
    pub notifications: Vec<Notification>,
    /// Log ring (cap 100).
    pub log_ring: VecDeque<LogEntry>,
    next_z: u32,
}

impl WindowManager {
    /// Create a manager for the given viewport.
    pub fn new(config: Config, viewport: Viewport) -> Self {
        let auto_tiling = config.auto_tiling;
        Self {
            windows: Vec::new(),
            current_workspace: 1,
            workspaces: HashMap::new(),
            mode: InputMode::WindowManagement,
            mode_switched_at: Instant::now(),
            viewport,
            config,
            animations: AnimationSet::new(),
            animations_suppressed: false,
            processing_remote_keys: false,
            auto_tiling,
            drag: None,
            resize: None,
            prefix: None,
            quit_dialog: false,
            rename: None,
            help_visible: false,
            logs_visible: false,
            tape_manager_visible: false,
            scrollback_browser_visible: false,
            notifications: Vec::new(),
            log_ring: VecDeque::new(),
            next_z: 1,
        }
    }

    /// The workspace record, created on first touch.
    pub fn workspace_mut(&mut self, index: usize) -> &mut Workspace {
        self.workspaces.entry(index).or_insert_with(|| Workspace {
            master_ratio: 0.5,
            bsp: BspTree::new(AutoScheme::Horizontal),
            ..Workspace::default()
        })
    }

    /// Window by id.
    pub fn window(&self, id: Uuid) -> Option<&Window> {
        self.windows.iter().find(|w| w.id == id)
    }

    /// Mutable window by id.
    pub fn window_mut(&mut self, id: Uuid) -> Option<&mut Window> {
        self.windows.iter_mut().find(|w| w.id == id)
    }

    /// Window by custom name, title, or id prefix.
    pub fn window_by_name(&self, name: &str) -> Option<&Window> {
        self.windows
            .iter()
            .find(|w| w.custom_name.as_deref() == Some(name))
            .or_else(|| self.windows.iter().find(|w| w.title == name))
            .or_else(|| {
                self.windows
                    .iter()
                    .find(|w| w.id.to_string().starts_with(name))
            })
    }

    /// Ids of windows on the current workspace (minimized included).
    pub fn workspace_window_ids(&self) -> Vec<Uuid> {
        self.windows
            .iter()
            .filter(|w| w.workspace == self.current_workspace)
            .map(|w| w.id)
            .collect()
    }

    /// Windows visible on the current workspace, bottom-to-top Z.
    pub fn visible_windows(&self) -> Vec<&Window> {
        let mut list: Vec<&Window> = self
            .windows
            .iter()
            .filter(|w| w.workspace == self.current_workspace && !w.minimized)
            .collect();
        list.sort_by_key(|w| w.z);
        list
    }

    /// The focused window id on the current workspace.
    pub fn focused_id(&self) -> Option<Uuid> {
        self.workspaces
            .get(&self.current_workspace)
            .and_then(|ws| ws.focus)
            .filter(|id| self.window(*id).is_some())
    }

    /// The focused window.
    pub fn focused_window(&self) -> Option<&Window> {
        self.focused_id().and_then(|id| self.window(id))
    }

    /// Focus a window: records per-workspace focus and renumbers Z so the
    /// focused window holds the maximum while the rest keep their relative
    /// order. No-op when already focused.
    pub fn focus(&mut self, id: Uuid) {
        if self.focused_id() == Some(id) {
            return;
        }
        let Some(workspace) = self.window(id).map(|w| w.workspace) else {
            return;
        };
        if workspace != self.current_workspace {
            return;
        }
        self.workspace_mut(workspace).focus = Some(id);
        self.raise(id);
    }

    /// Give `id` the top Z in its workspace, preserving relative order of
    /// the others.
    pub fn raise(&mut self, id: Uuid) {
        let Some(workspace) = self.window(id).map(|w| w.workspace) else {
            return;
        };
        let mut ordered: Vec<Uuid> = {
            let mut ws: Vec<&Window> = self
                .windows
                .iter()
                .filter(|w| w.workspace == workspace)
                .collect();
            ws.sort_by_key(|w| w.z);
            ws.iter().map(|w| w.id).collect()
        };
        ordered.retain(|wid| *wid != id);
        ordered.push(id);
        for (z, wid) in ordered.iter().enumerate() {
            if let Some(w) = self.window_mut(*wid) {
                let z = z as u32;
                if w.z != z {
                    w.z = z;
                    w.dirty.position = true;
                }
            }
        }
        self.next_z = ordered.len() as u32;
    }

    /// Directional neighbor of the focused window.
    ///
    /// Candidates must lie in the requested direction and overlap the
    /// focused window by at least [`NEIGHBOR_OVERLAP_MIN`] cells on the
    /// orthogonal axis; the nearest wins.
    pub fn neighbor(&self, direction: Direction) -> Option<Uuid> {
        let current = self.focused_window()?;
        let from = current.bounds;
        self.windows
            .iter()
            .filter(|w| {
                w.workspace == self.current_workspace && !w.minimized && w.id != current.id
            })
            .filter_map(|w| {
                let b = w.bounds;
                let (ahead, distance, overlap) = match direction {
                    Direction::Left => (b.center_x() < from.center_x(), from.center_x() - b.center_x(), from.overlap_y(&b)),
                    Direction::Right => (b.center_x() > from.center_x(), b.center_x() - from.center_x(), from.overlap_y(&b)),
                    Direction::Up => (b.center_y() < from.center_y(), from.center_y() - b.center_y(), from.overlap_x(&b)),
                    Direction::Down => (b.center_y() > from.center_y(), b.center_y() - from.center_y(), from.overlap_x(&b)),
                };
                (ahead && overlap >= NEIGHBOR_OVERLAP_MIN.min(from.w.min(b.w) as i32))
                    .then_some((w.id, distance))
            })
            .min_by_key(|(_, distance)| *distance)
            .map(|(id, _)| id)
    }

    /// Switch workspaces: remember focus, switch, restore the target's
    /// remembered focus (or the first visible window).
    pub fn switch_workspace(&mut self, target: usize) {
        if target == self.current_workspace || target == 0 || target > WORKSPACE_COUNT {
            return;
        }
        let current_focus = self.focused_id();
        self.workspace_mut(self.current_workspace).focus = current_focus;

        self.current_workspace = target;
        let remembered = self
            .workspaces
            .get(&target)
            .and_then(|ws| ws.focus)
            .filter(|id| {
                self.window(*id)
                    .is_some_and(|w| w.workspace == target && !w.minimized)
            });
        let fallback = self
            .visible_windows()
            .last()
            .map(|w| w.id);
        let focus = remembered.or(fallback);
        self.workspace_mut(target).focus = focus;
        if let Some(id) = focus {
            self.raise(id);
        }
        for w in &mut self.windows {
            if w.workspace == target {
                w.invalidate_cache();
            }
        }
    }

    /// Record a notification bubble and mirror it into the log ring.
    /// Past the cap the oldest bubble drops silently.
    pub fn notify(&mut self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        self.log(severity, message.clone());
        self.notifications.push(Notification {
            message,
            severity,
            created: Instant::now(),
            duration: NOTIFICATION_DURATION,
        });
        while self.notifications.len() > 10 {
            self.notifications.remove(0);
        }
    }

    /// Append to the log ring, dropping the oldest entry past the cap.
    pub fn log(&mut self, severity: Severity, message: impl Into<String>) {
        self.log_ring.push_back(LogEntry {
            time: chrono::Local::now(),
            severity,
            message: message.into(),
        });
        while self.log_ring.len() > LOG_RING_CAP {
            self.log_ring.pop_front();
        }
    }

    /// Drop expired notifications.
    pub fn expire_notifications(&mut self) {
        let now = Instant::now();
        self.notifications
            .retain(|n| now.duration_since(n.created) < n.duration);
    }

    /// Whether any animation is active (progress < 1.0).
    pub fn has_active_animations(&self) -> bool {
        self.animations.has_active()
    }

    /// Whether animations should run right now.
    pub fn animations_allowed(&self) -> bool {
        self.config.animations_enabled && !self.animations_suppressed
    }

    /// Switch input mode, recording the timestamp that gates mouse motion.
    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.mode = mode;
            self.mode_switched_at = Instant::now();
        }
    }
}

/// Focus movement directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Toward smaller x.
    Left,
    /// Toward larger x.
    Right,
    /// Toward smaller y.
    Up,
    /// Toward larger y.
    Down,
}

impl Direction {
    /// Parse a user-facing token.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::layout::DockbarPosition;

    /// A manager with a fixed 120×40 viewport and default config.
    pub fn manager() -> WindowManager {
        WindowManager::new(
            Config::default(),
            Viewport {
                width: 120,
                height: 40,
                dockbar: DockbarPosition::Bottom,
            },
        )
    }

    /// Add a plain window at the given bounds on the current workspace.
    pub fn add_window(wm: &mut WindowManager, bounds: Rect) -> Uuid {
        let workspace = wm.current_workspace;
        let mut window = Window::new(bounds, workspace, 100);
        window.z = wm.windows.len() as u32;
        let id = window.id;
        wm.windows.push(window);
        wm.workspace_mut(workspace).focus.get_or_insert(id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{add_window, manager};
    use super::*;

    #[test]
    fn focus_renumbers_z_preserving_order() {
        let mut wm = manager();
        let a = add_window(&mut wm, Rect::new(0, 0, 30, 10));
        let b = add_window(&mut wm, Rect::new(10, 0, 30, 10));
        let c = add_window(&mut wm, Rect::new(20, 0, 30, 10));

        wm.focus(b);
        let (za, zb, zc) = (
            wm.window(a).unwrap().z,
            wm.window(b).unwrap().z,
            wm.window(c).unwrap().z,
        );
        assert!(zb > za && zb > zc, "focused must hold max z");
        assert!(za < zc, "relative order of others preserved");
        assert_eq!(wm.focused_id(), Some(b));
    }

    #[test]
    fn focus_uniqueness_invariant() {
        let mut wm = manager();
        let ids: Vec<Uuid> = (0..4)
            .map(|i| add_window(&mut wm, Rect::new(i * 5, 0, 30, 10)))
            .collect();
        wm.focus(ids[2]);
        let max_z = wm
            .visible_windows()
            .iter()
            .map(|w| w.z)
            .max()
            .unwrap();
        let top_count = wm
            .visible_windows()
            .iter()
            .filter(|w| w.z == max_z)
            .count();
        assert_eq!(top_count, 1);
        assert_eq!(
            wm.focused_window().unwrap().z,
            max_z,
            "focused references the max-Z window"
        );
    }

    #[test]
    fn focus_on_same_window_is_noop() {
        let mut wm = manager();
        let a = add_window(&mut wm, Rect::new(0, 0, 30, 10));
        wm.focus(a);
        let z_before: Vec<u32> = wm.windows.iter().map(|w| w.z).collect();
        wm.focus(a);
        let z_after: Vec<u32> = wm.windows.iter().map(|w| w.z).collect();
        assert_eq!(z_before, z_after);
    }

    #[test]
    fn neighbor_search_requires_overlap() {
        let mut wm = manager();
        let left = add_window(&mut wm, Rect::new(0, 0, 30, 10));
        let right = add_window(&mut wm, Rect::new(60, 0, 30, 10));
        // Below the focused window, overlapping it horizontally.
        let below = add_window(&mut wm, Rect::new(10, 25, 30, 10));
        wm.focus(left);

        assert_eq!(wm.neighbor(Direction::Right), Some(right));
        assert_eq!(wm.neighbor(Direction::Left), None);
        assert_eq!(wm.neighbor(Direction::Down), Some(below));
    }

    #[test]
    fn neighbor_prefers_nearest() {
        let mut wm = manager();
        let focus = add_window(&mut wm, Rect::new(0, 0, 20, 10));
        let near = add_window(&mut wm, Rect::new(25, 0, 20, 10));
        let far = add_window(&mut wm, Rect::new(70, 0, 20, 10));
        wm.focus(focus);
        let got = wm.neighbor(Direction::Right);
        assert_eq!(got, Some(near));
        assert_ne!(got, Some(far));
    }

    #[test]
    fn workspace_switch_remembers_focus() {
        let mut wm = manager();
        let w1 = add_window(&mut wm, Rect::new(0, 0, 30, 10));
        wm.focus(w1);

        wm.switch_workspace(2);
        assert_eq!(wm.current_workspace, 2);
        assert_eq!(wm.focused_id(), None);

        wm.switch_workspace(1);
        assert_eq!(wm.focused_id(), Some(w1));
    }

    #[test]
    fn log_ring_caps_at_limit() {
        let mut wm = manager();
        for i in 0..150 {
            wm.log(Severity::Info, format!("entry {i}"));
        }
        assert_eq!(wm.log_ring.len(), LOG_RING_CAP);
        assert_eq!(wm.log_ring.front().unwrap().message, "entry 50");
    }

    #[test]
    fn notifications_expire() {
        let mut wm = manager();
        wm.notifications.push(Notification {
            message: "old".into(),
            severity: Severity::Info,
            created: Instant::now() - std::time::Duration::from_secs(10),
            duration: NOTIFICATION_DURATION,
        });
        wm.notify(Severity::Info, "fresh");
        wm.expire_notifications();
        assert_eq!(wm.notifications.len(), 1);
        assert_eq!(wm.notifications[0].message, "fresh");
    }
}
