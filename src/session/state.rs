//! Replicated session state and terminal snapshots.
//!
//! `SessionState` is the compact wire snapshot every client and the daemon
//! agree on: windows, workspaces, focus, and serialized BSP trees (by
//! stable integer id). `TerminalState` is a per-PTY grid snapshot a
//! late-joining client applies to its local VT — by direct cell writes and
//! mode assignment, never by replaying escape sequences.
//!
//! Wire compatibility: field names are stable; every field defaults so
//! older peers tolerate additions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vte::ansi::{Color as VtColor, NamedColor};

use crate::geom::Rect;
use crate::layout::SerializedBsp;
use crate::term::{Cell, CellAttrs, Hyperlink, ModesSnapshot, Row, Vt};
use crate::window::Window;
use crate::wm::{InputMode, WindowManager};

/// One window on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowState {
    /// Stable identity.
    pub id: Uuid,
    /// Program title.
    #[serde(default)]
    pub title: String,
    /// User-assigned name.
    #[serde(default)]
    pub custom_name: Option<String>,
    /// Left column.
    pub x: i32,
    /// Top row.
    pub y: i32,
    /// Width.
    pub w: u16,
    /// Height.
    pub h: u16,
    /// Stacking order.
    pub z: u32,
    /// Workspace (1-based).
    pub workspace: usize,
    /// Minimized to the dockbar.
    #[serde(default)]
    pub minimized: bool,
    /// Bounds to restore on un-minimize.
    #[serde(default)]
    pub pre_minimize: Option<Rect>,
    /// Daemon-side PTY id.
    #[serde(default)]
    pub pty_id: Option<u64>,
    /// Alternate screen active (drives mouse forwarding on the host).
    #[serde(default)]
    pub is_alt_screen: bool,
}

impl WindowState {
    /// Capture from a live window.
    pub fn capture(window: &Window) -> Self {
        Self {
            id: window.id,
            title: window.title.clone(),
            custom_name: window.custom_name.clone(),
            x: window.bounds.x,
            y: window.bounds.y,
            w: window.bounds.w,
            h: window.bounds.h,
            z: window.z,
            workspace: window.workspace,
            minimized: window.minimized,
            pre_minimize: window.pre_minimize_bounds,
            pty_id: window.pty_id,
            is_alt_screen: window.is_alt_screen,
        }
    }
}

/// The authoritative, replicated session snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    /// Session name.
    pub name: String,
    /// Active workspace.
    pub current_workspace: usize,
    /// Effective viewport width.
    pub width: u16,
    /// Effective viewport height.
    pub height: u16,
    /// BSP tiling active.
    pub auto_tiling: bool,
    /// Input mode.
    pub mode: Option<InputMode>,
    /// Every window.
    pub windows: Vec<WindowState>,
    /// Remembered focus per workspace.
    pub workspace_focus: HashMap<usize, Uuid>,
    /// Serialized BSP tree per workspace.
    pub bsp_trees: HashMap<usize, SerializedBsp>,
    /// The focused window.
    pub focused_window: Option<Uuid>,
}

impl SessionState {
    /// Capture the replicated snapshot from a manager.
    pub fn capture(wm: &WindowManager, name: &str) -> Self {
        let mut workspace_focus = HashMap::new();
        let mut bsp_trees = HashMap::new();
        for (index, workspace) in &wm.workspaces {
            if let Some(focus) = workspace.focus {
                workspace_focus.insert(*index, focus);
            }
            if !workspace.bsp.is_empty() {
                bsp_trees.insert(*index, workspace.bsp.to_wire());
            }
        }
        Self {
            name: name.to_string(),
            current_workspace: wm.current_workspace,
            width: wm.viewport.width,
            height: wm.viewport.height,
            auto_tiling: wm.auto_tiling,
            mode: Some(wm.mode),
            windows: wm.windows.iter().map(WindowState::capture).collect(),
            workspace_focus,
            bsp_trees,
            focused_window: wm.focused_id(),
        }
    }
}

// ── Terminal snapshots ────────────────────────────────────────────────────

/// One cell on the wire. Compact encodings: colors are `"d"` (default),
/// `"i:N"` (indexed), or `"r:RRGGBB"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCell {
    /// Glyph plus combining marks.
    #[serde(default)]
    pub t: String,
    /// Foreground.
    #[serde(default = "default_color")]
    pub fg: String,
    /// Background.
    #[serde(default = "default_color")]
    pub bg: String,
    /// Attribute bits (matches [`CellAttrs`]).
    #[serde(default)]
    pub a: u16,
    /// Hyperlink URI, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

fn default_color() -> String {
    "d".to_string()
}

fn encode_color(color: VtColor, foreground: bool) -> String {
    match color {
        VtColor::Named(NamedColor::Foreground) if foreground => "d".to_string(),
        VtColor::Named(NamedColor::Background) if !foreground => "d".to_string(),
        VtColor::Named(named) => {
            let index = named as usize;
            if index < 16 {
                format!("i:{index}")
            } else {
                "d".to_string()
            }
        }
        VtColor::Indexed(index) => format!("i:{index}"),
        VtColor::Spec(rgb) => format!("r:{:02x}{:02x}{:02x}", rgb.r, rgb.g, rgb.b),
    }
}

fn decode_color(text: &str, foreground: bool) -> VtColor {
    if let Some(index) = text.strip_prefix("i:").and_then(|s| s.parse::<u8>().ok()) {
        return VtColor::Indexed(index);
    }
    if let Some(hex) = text.strip_prefix("r:") {
        if hex.len() == 6 {
            if let (Ok(r), Ok(g), Ok(b)) = (
                u8::from_str_radix(&hex[0..2], 16),
                u8::from_str_radix(&hex[2..4], 16),
                u8::from_str_radix(&hex[4..6], 16),
            ) {
                return VtColor::Spec(vte::ansi::Rgb { r, g, b });
            }
        }
    }
    if foreground {
        VtColor::Named(NamedColor::Foreground)
    } else {
        VtColor::Named(NamedColor::Background)
    }
}

impl WireCell {
    fn capture(cell: &Cell) -> Self {
        Self {
            t: cell.grapheme(),
            fg: encode_color(cell.fg, true),
            bg: encode_color(cell.bg, false),
            a: cell.attrs.bits(),
            link: cell.hyperlink().map(|l| l.uri.clone()),
        }
    }

    fn apply(&self, cell: &mut Cell) {
        let mut chars = self.t.chars();
        cell.glyph = chars.next().unwrap_or(' ');
        cell.extra = None;
        for zw in chars {
            cell.push_zerowidth(zw);
        }
        cell.fg = decode_color(&self.fg, true);
        cell.bg = decode_color(&self.bg, false);
        cell.attrs = CellAttrs::from_bits_truncate(self.a);
        if let Some(uri) = &self.link {
            cell.set_hyperlink(Some(Hyperlink {
                id: None,
                uri: uri.clone(),
            }));
        }
    }
}

fn capture_row(row: &Row) -> Vec<WireCell> {
    row.cells().iter().map(WireCell::capture).collect()
}

fn apply_row(cells: &[WireCell], row: &mut Row) {
    for (i, wire) in cells.iter().enumerate() {
        if let Some(cell) = row.get_mut(i) {
            wire.apply(cell);
        }
    }
}

/// A full terminal snapshot served by `get_terminal_state`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalState {
    /// Grid width.
    pub width: u16,
    /// Grid height.
    pub height: u16,
    /// Active-screen rows, top to bottom.
    pub cells: Vec<Vec<WireCell>>,
    /// Scrollback rows, oldest first (empty unless requested).
    pub scrollback_cells: Vec<Vec<WireCell>>,
    /// Cursor row on the active screen.
    pub cursor_row: usize,
    /// Cursor column.
    pub cursor_col: usize,
    /// Alternate screen active.
    pub is_alt_screen: bool,
    /// Replicated modes.
    pub modes: ModesSnapshot,
    /// Window title.
    pub title: String,
}

impl TerminalState {
    /// Snapshot a VT's current grid, cursor, and modes.
    pub fn capture(vt: &Vt, include_scrollback: bool) -> Self {
        let screen = vt.screen();
        let cells = screen.rows().iter().map(capture_row).collect();
        let scrollback_cells = if include_scrollback {
            vt.primary_screen()
                .scrollback()
                .iter()
                .map(capture_row)
                .collect()
        } else {
            Vec::new()
        };
        Self {
            width: screen.cols() as u16,
            height: screen.lines() as u16,
            cells,
            scrollback_cells,
            cursor_row: screen.cursor.row,
            cursor_col: screen.cursor.col,
            is_alt_screen: vt.is_alt_screen(),
            modes: vt.modes_snapshot(),
            title: vt.title().to_string(),
        }
    }

    /// Apply the snapshot to a local VT.
    ///
    /// Restores by direct cell writes, `restore_alt_screen_mode` (never a
    /// replayed `1049h`, which would clear the restored alternate screen),
    /// and `restore_modes` by assignment. Rows and columns beyond the
    /// local grid are clipped — invariant violations are skipped, never
    /// fatal.
    pub fn apply(&self, vt: &mut Vt) {
        vt.resize(self.height.max(1) as usize, self.width.max(1) as usize);

        // Scrollback first, oldest rows first.
        if !self.scrollback_cells.is_empty() {
            let width = self.width.max(1) as usize;
            let rows: Vec<Row> = self
                .scrollback_cells
                .iter()
                .map(|cells| {
                    let mut row = Row::new(width);
                    apply_row(cells, &mut row);
                    row
                })
                .collect();
            vt.restore_scrollback(rows);
        }

        vt.restore_alt_screen_mode(self.is_alt_screen);
        {
            let screen = vt.screen_restore_mut(self.is_alt_screen);
            for (row_idx, wire_row) in self.cells.iter().enumerate() {
                if row_idx >= screen.lines() {
                    log::warn!("terminal state row {row_idx} out of bounds, skipping");
                    break;
                }
                apply_row(wire_row, screen.row_mut(row_idx));
            }
            screen.cursor.row = self.cursor_row.min(screen.lines().saturating_sub(1));
            screen.cursor.col = self.cursor_col.min(screen.cols().saturating_sub(1));
        }
        vt.restore_modes(&self.modes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::TermModes;

    #[test]
    fn wire_cell_round_trip() {
        let mut cell = Cell::default();
        cell.glyph = 'x';
        cell.fg = VtColor::Indexed(3);
        cell.bg = VtColor::Spec(vte::ansi::Rgb { r: 1, g: 2, b: 3 });
        cell.attrs = CellAttrs::BOLD | CellAttrs::UNDERLINE;
        cell.push_zerowidth('\u{0301}');

        let wire = WireCell::capture(&cell);
        let mut restored = Cell::default();
        wire.apply(&mut restored);

        assert_eq!(restored.glyph, 'x');
        assert_eq!(restored.grapheme(), "x\u{0301}");
        assert_eq!(restored.fg, VtColor::Indexed(3));
        assert_eq!(restored.bg, VtColor::Spec(vte::ansi::Rgb { r: 1, g: 2, b: 3 }));
        assert!(restored.attrs.contains(CellAttrs::BOLD | CellAttrs::UNDERLINE));
    }

    #[test]
    fn default_colors_encode_compactly() {
        let cell = Cell::default();
        let wire = WireCell::capture(&cell);
        assert_eq!(wire.fg, "d");
        assert_eq!(wire.bg, "d");
    }

    #[test]
    fn terminal_state_round_trip() {
        let mut vt = Vt::new(5, 20, 100);
        vt.write(b"hello\r\n\x1b[31mred\x1b[0m\x1b[2;4H");

        let snapshot = TerminalState::capture(&vt, true);
        assert_eq!(snapshot.width, 20);
        assert_eq!(snapshot.height, 5);

        let mut restored = Vt::new(5, 20, 100);
        snapshot.apply(&mut restored);
        assert_eq!(restored.screen().row(0).text(), "hello");
        assert_eq!(restored.screen().row(1).text(), "red");
        assert_eq!(restored.screen().row(1)[0].fg, VtColor::Indexed(1));
        assert_eq!(restored.screen().cursor.row, 1);
        assert_eq!(restored.screen().cursor.col, 3);
    }

    #[test]
    fn alt_screen_replay_safety() {
        // A VT in alt screen with content; the snapshot applies to a
        // fresh VT without wiping the restored cells.
        let mut vt = Vt::new(5, 20, 100);
        vt.write(b"\x1b[?1049h\x1b[?1000hvim content");
        let snapshot = TerminalState::capture(&vt, false);
        assert!(snapshot.is_alt_screen);
        assert!(snapshot.modes.mouse_clicks);

        let mut restored = Vt::new(5, 20, 100);
        restored.set_callbacks_enabled(false);
        snapshot.apply(&mut restored);
        assert!(restored.is_alt_screen());
        assert_eq!(restored.screen().row(0).text(), "vim content");
        assert!(restored.modes().contains(TermModes::MOUSE_CLICKS));
        assert!(restored.modes().contains(TermModes::ALT_SCREEN));
    }

    #[test]
    fn scrollback_restores_oldest_first() {
        let mut vt = Vt::new(3, 10, 100);
        for i in 0..6 {
            vt.write(format!("line{i}\r\n").as_bytes());
        }
        let archived = vt.scrollback_len();
        assert!(archived > 0);

        let snapshot = TerminalState::capture(&vt, true);
        let mut restored = Vt::new(3, 10, 100);
        snapshot.apply(&mut restored);
        assert_eq!(restored.scrollback_len(), archived);
        assert_eq!(
            restored.text_at_abs(0),
            vt.text_at_abs(0),
            "oldest scrollback line matches"
        );
    }

    #[test]
    fn oversized_snapshot_rows_are_clipped() {
        let mut snapshot = TerminalState {
            width: 10,
            height: 2,
            ..TerminalState::default()
        };
        snapshot.cells = (0..5)
            .map(|_| {
                (0..10)
                    .map(|_| WireCell {
                        t: "x".into(),
                        fg: "d".into(),
                        bg: "d".into(),
                        a: 0,
                        link: None,
                    })
                    .collect()
            })
            .collect();
        let mut vt = Vt::new(2, 10, 0);
        snapshot.apply(&mut vt);
        assert_eq!(vt.screen().row(0).text(), "xxxxxxxxxx");
    }

    #[test]
    fn session_state_capture_and_serde() {
        use crate::wm::test_support::{add_window, manager};

        let mut wm = manager();
        let id = add_window(&mut wm, Rect::new(0, 0, 40, 12));
        wm.window_mut(id).unwrap().pty_id = Some(3);

        let state = SessionState::capture(&wm, "main");
        assert_eq!(state.name, "main");
        assert_eq!(state.windows.len(), 1);
        assert_eq!(state.windows[0].pty_id, Some(3));
        assert_eq!(state.focused_window, Some(id));

        let json = serde_json::to_string(&state).unwrap();
        let parsed: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn session_state_tolerates_missing_fields() {
        let parsed: SessionState = serde_json::from_str(r#"{"name":"s"}"#).unwrap();
        assert_eq!(parsed.name, "s");
        assert!(parsed.windows.is_empty());
        assert!(parsed.mode.is_none());
    }
}
