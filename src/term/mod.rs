//! The VT emulator.
//!
//! One `Vt` per window consumes that program's raw PTY bytes and maintains
//! dual screen buffers (primary + alternate), a scrollback ring, DEC modes,
//! semantic markers, and a palette. The `vte` crate supplies the escape
//! state machine (ground/CSI/OSC/DCS recognition and UTF-8 assembly); every
//! grid mutation and dispatch decision lives in [`handler`].
//!
//! ```text
//! PTY reader ──bytes──> Vt::write ──vte::Parser──> TermState (Perform)
//!                                                    ├── ScreenBuffer ×2
//!                                                    ├── TermModes
//!                                                    ├── MarkerList
//!                                                    ├── responses  (→ PTY)
//!                                                    └── events     (→ UI)
//! ```
//!
//! Threading: a single writer (the PTY reader) mutates the VT through a
//! short-held mutex owned by the window; readers (renderer, state snapshot)
//! take the same lock briefly. Query responses (CPR, DA, OSC color reads)
//! accumulate in an internal pipe drained by the PTY writer, and terminal
//! events (title, cwd, colors) queue for the UI loop — when callbacks are
//! disabled during an attach replay, events are silently dropped.

pub mod ansi;
pub mod cell;
pub mod charset;
pub mod handler;
pub mod marker;
pub mod modes;
pub mod palette;
pub mod screen;
pub mod scrollback;

pub use cell::{Cell, CellAttrs, CellExtra, Hyperlink, Row};
pub use marker::{MarkerKind, MarkerList, SemanticMarker};
pub use modes::{CursorShape, ModesSnapshot, TermModes};
pub use palette::Palette;
pub use screen::{Cursor, EraseMode, ScreenBuffer};
pub use scrollback::{Scrollback, DEFAULT_SCROLLBACK_LINES};

use charset::CharsetState;
use vte::ansi::Rgb;

/// Cap on buffered OSC/DCS payload bytes; longer payloads are truncated,
/// never fatal.
pub(crate) const STRING_PAYLOAD_CAP: usize = 1024 * 1024;

/// Assumed cell pixel metrics for XTWINOPS and graphics row reservation.
pub(crate) const CELL_PIXEL_WIDTH: usize = 8;
pub(crate) const CELL_PIXEL_HEIGHT: usize = 16;

/// Terminal event queued for the UI loop.
#[derive(Debug, Clone, PartialEq)]
pub enum VtEvent {
    /// OSC 0/2 title change.
    Title(String),
    /// OSC 1 icon name change.
    IconName(String),
    /// OSC 7 working directory report (a `file://` URI).
    WorkingDir(String),
    /// OSC 10 default foreground change.
    DefaultFg(Rgb),
    /// OSC 11 default background change.
    DefaultBg(Rgb),
    /// OSC 12 cursor color change.
    CursorColor(Rgb),
    /// DECSCUSR cursor shape/blink change.
    CursorStyle(CursorShape, bool),
    /// OSC 52 clipboard write (decoded text).
    Clipboard(String),
    /// BEL.
    Bell,
}

/// Kind of forwarded graphics payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphicsKind {
    /// DCS `q` Sixel data.
    Sixel,
    /// APC `G` Kitty graphics command.
    Kitty,
}

/// A graphics payload held for host passthrough (never rasterized here).
#[derive(Debug, Clone)]
pub struct GraphicsPayload {
    /// Protocol the payload arrived in.
    pub kind: GraphicsKind,
    /// Raw payload bytes, without the DCS/APC framing.
    pub data: Vec<u8>,
    /// Cell rows reserved for the image.
    pub rows: usize,
}

/// All terminal state mutated by the escape dispatcher.
///
/// Separated from [`Vt`] so the `vte::Parser` (owned by `Vt`) can drive a
/// `&mut TermState` without borrow conflicts.
#[derive(Debug)]
pub struct TermState {
    pub(crate) primary: ScreenBuffer,
    pub(crate) alt: ScreenBuffer,
    pub(crate) active_is_alt: bool,
    pub(crate) modes: TermModes,
    pub(crate) palette: Palette,
    pub(crate) charsets: CharsetState,
    pub(crate) title: String,
    /// XTWINOPS 22/23 title stack.
    pub(crate) title_stack: Vec<String>,
    pub(crate) markers: MarkerList,
    /// Query responses awaiting the PTY writer.
    pub(crate) responses: Vec<u8>,
    /// Events awaiting the UI loop.
    pub(crate) events: std::collections::VecDeque<VtEvent>,
    /// When false, events are dropped instead of queued (attach replay).
    pub(crate) callbacks_enabled: bool,
    /// Last printed glyph, for CSI REP.
    pub(crate) last_printed: Option<char>,
    /// In-flight DCS payload (Sixel), if any.
    pub(crate) dcs_sixel: Option<Vec<u8>>,
    /// Latest graphics payload held for passthrough.
    pub(crate) graphics: Option<GraphicsPayload>,
}

impl TermState {
    fn new(lines: usize, cols: usize, scrollback_lines: usize) -> Self {
        Self {
            primary: ScreenBuffer::new(lines, cols, scrollback_lines),
            alt: ScreenBuffer::new(lines, cols, 0),
            active_is_alt: false,
            modes: TermModes::default(),
            palette: Palette::default(),
            charsets: CharsetState::default(),
            title: String::new(),
            title_stack: Vec::new(),
            markers: MarkerList::new(),
            responses: Vec::new(),
            events: std::collections::VecDeque::new(),
            callbacks_enabled: true,
            last_printed: None,
            dcs_sixel: None,
            graphics: None,
        }
    }

    /// The active screen buffer.
    pub(crate) fn screen(&self) -> &ScreenBuffer {
        if self.active_is_alt { &self.alt } else { &self.primary }
    }

    /// Mutable active screen buffer.
    pub(crate) fn screen_mut(&mut self) -> &mut ScreenBuffer {
        if self.active_is_alt { &mut self.alt } else { &mut self.primary }
    }

    /// Queue a query response for the PTY.
    pub(crate) fn respond(&mut self, bytes: &[u8]) {
        self.responses.extend_from_slice(bytes);
    }

    /// Queue a terminal event, unless callbacks are quiesced.
    pub(crate) fn emit(&mut self, event: VtEvent) {
        if self.callbacks_enabled {
            self.events.push_back(event);
        }
    }

    /// Absolute line of the primary cursor (scrollback length + row).
    pub(crate) fn cursor_abs_line(&self) -> i64 {
        self.primary.scrollback().len() as i64 + self.primary.cursor.row as i64
    }

    /// Reconcile marker positions with scrollback trims.
    pub(crate) fn sync_markers(&mut self) {
        self.markers
            .sync_trims(self.primary.scrollback().total_trimmed());
    }

    /// Plain text of an absolute line (scrollback first, then screen).
    pub(crate) fn text_at_abs(&self, abs: i64) -> Option<String> {
        if abs < 0 {
            return None;
        }
        let abs = abs as usize;
        let sb = self.primary.scrollback();
        if abs < sb.len() {
            return sb.get(abs).map(Row::text);
        }
        let visible = abs - sb.len();
        if visible < self.primary.lines() {
            return Some(self.primary.row(visible).text());
        }
        None
    }

    /// Enter the alternate screen (?47/?1047/?1049).
    pub(crate) fn enter_alt_screen(&mut self, save_cursor: bool) {
        if self.active_is_alt {
            return;
        }
        if save_cursor {
            self.primary.save_cursor();
        }
        self.alt.clear_all();
        self.alt.cursor = Cursor::default();
        self.active_is_alt = true;
        self.modes.insert(TermModes::ALT_SCREEN);
    }

    /// Leave the alternate screen.
    pub(crate) fn leave_alt_screen(&mut self, restore_cursor: bool) {
        if !self.active_is_alt {
            return;
        }
        self.active_is_alt = false;
        self.modes.remove(TermModes::ALT_SCREEN);
        if restore_cursor {
            self.primary.restore_cursor();
        }
    }

    /// Emit the in-band resize report (mode ?2048).
    pub(crate) fn report_inband_size(&mut self) {
        let (lines, cols) = (self.screen().lines(), self.screen().cols());
        let report = format!(
            "\x1b[48;{};{};{};{}t",
            lines,
            cols,
            lines * CELL_PIXEL_HEIGHT,
            cols * CELL_PIXEL_WIDTH
        );
        self.respond(report.as_bytes());
    }
}

/// The per-window VT emulator.
pub struct Vt {
    state: TermState,
    parser: vte::Parser,
    /// Kitty APC scanner state (vte consumes APC strings silently, so the
    /// raw stream is scanned before parsing).
    apc: ApcScan,
    /// One-shot new-output flag read by the renderer.
    has_new_output: bool,
}

impl std::fmt::Debug for Vt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vt")
            .field("cols", &self.state.screen().cols())
            .field("lines", &self.state.screen().lines())
            .field("alt_screen", &self.state.active_is_alt)
            .field("scrollback", &self.state.primary.scrollback().len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum ApcScan {
    Ground,
    Esc,
    /// Inside `ESC _` collecting payload.
    Collect(Vec<u8>),
    /// Saw ESC inside the payload; next `\` terminates.
    CollectEsc(Vec<u8>),
}

impl Vt {
    /// Create an emulator of `lines` × `cols` with the given scrollback
    /// capacity on the primary screen.
    pub fn new(lines: usize, cols: usize, scrollback_lines: usize) -> Self {
        Self {
            state: TermState::new(lines, cols, scrollback_lines),
            parser: vte::Parser::new(),
            apc: ApcScan::Ground,
            has_new_output: false,
        }
    }

    /// Feed raw PTY output. The single mutating entry point.
    pub fn write(&mut self, bytes: &[u8]) {
        self.scan_apc(bytes);
        self.parser.advance(&mut self.state, bytes);
        self.state.sync_markers();
        self.has_new_output = true;
    }

    /// Resize both screens; no reflow, the captured width just changes.
    ///
    /// Emits an in-band size report when the program opted in (?2048).
    pub fn resize(&mut self, lines: usize, cols: usize) {
        self.state.primary.resize(lines, cols);
        self.state.alt.resize(lines, cols);
        self.state.sync_markers();
        if self.state.modes.contains(TermModes::INBAND_RESIZE) {
            self.state.report_inband_size();
        }
    }

    /// The active screen buffer.
    pub fn screen(&self) -> &ScreenBuffer {
        self.state.screen()
    }

    /// The primary screen buffer regardless of which is active.
    pub fn primary_screen(&self) -> &ScreenBuffer {
        &self.state.primary
    }

    /// Whether the alternate screen is active.
    pub fn is_alt_screen(&self) -> bool {
        self.state.active_is_alt
    }

    /// Current mode flags.
    pub fn modes(&self) -> TermModes {
        self.state.modes
    }

    /// Window title (OSC 0/2).
    pub fn title(&self) -> &str {
        &self.state.title
    }

    /// Recorded semantic markers.
    pub fn markers(&self) -> &[SemanticMarker] {
        self.state.markers.markers()
    }

    /// The palette (for renderers and color queries).
    pub fn palette(&self) -> &Palette {
        &self.state.palette
    }

    /// Drain pending query responses destined for the PTY.
    pub fn take_responses(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.state.responses)
    }

    /// Drain queued terminal events.
    pub fn drain_events(&mut self) -> Vec<VtEvent> {
        self.state.events.drain(..).collect()
    }

    /// Gate event emission. While disabled, events are dropped silently —
    /// used while replaying restored state on attach.
    pub fn set_callbacks_enabled(&mut self, enabled: bool) {
        self.state.callbacks_enabled = enabled;
    }

    /// Whether events are currently emitted.
    pub fn callbacks_enabled(&self) -> bool {
        self.state.callbacks_enabled
    }

    /// Read and clear the one-shot new-output flag.
    pub fn take_new_output(&mut self) -> bool {
        std::mem::take(&mut self.has_new_output)
    }

    /// The held graphics payload, if a Sixel/Kitty image is live.
    pub fn graphics(&self) -> Option<&GraphicsPayload> {
        self.state.graphics.as_ref()
    }

    /// Drop the held graphics payload.
    pub fn clear_graphics(&mut self) {
        self.state.graphics = None;
    }

    /// Switch the active buffer without clearing either screen.
    ///
    /// Attach-path only: restoring a replicated session must not wipe the
    /// alternate screen the way a replayed `?1049h` would.
    pub fn restore_alt_screen_mode(&mut self, alt: bool) {
        self.state.active_is_alt = alt;
        self.state.modes.set(TermModes::ALT_SCREEN, alt);
    }

    /// Mutable access to one of the two screens for attach-time restore.
    ///
    /// Restore writes cells directly instead of replaying escape bytes —
    /// replay would re-trigger destructive side effects.
    pub fn screen_restore_mut(&mut self, alt: bool) -> &mut ScreenBuffer {
        if alt { &mut self.state.alt } else { &mut self.state.primary }
    }

    /// Append restored rows to the primary scrollback ring (oldest first).
    pub fn restore_scrollback(&mut self, rows: Vec<Row>) {
        for row in rows {
            self.state.primary.scrollback_mut().push(row);
        }
        self.state.sync_markers();
    }

    /// Export the replicated mode subset.
    pub fn modes_snapshot(&self) -> ModesSnapshot {
        ModesSnapshot::capture(self.state.modes)
    }

    /// Restore modes by direct assignment — never by replaying sequences.
    pub fn restore_modes(&mut self, snapshot: &ModesSnapshot) {
        snapshot.apply(&mut self.state.modes);
    }

    /// Lines retained in primary scrollback.
    pub fn scrollback_len(&self) -> usize {
        self.state.primary.scrollback().len()
    }

    /// Total addressable lines: scrollback + visible primary rows.
    pub fn total_lines(&self) -> usize {
        self.scrollback_len() + self.state.primary.lines()
    }

    /// Row at an absolute line index, if it exists.
    pub fn row_at_abs(&self, abs: usize) -> Option<&Row> {
        let sb = self.state.primary.scrollback();
        if abs < sb.len() {
            sb.get(abs)
        } else {
            let visible = abs - sb.len();
            (visible < self.state.primary.lines()).then(|| self.state.primary.row(visible))
        }
    }

    /// Plain text at an absolute line index.
    pub fn text_at_abs(&self, abs: usize) -> Option<String> {
        self.state.text_at_abs(abs as i64)
    }

    /// Scan raw bytes for Kitty graphics APC sequences (`ESC _ G … ESC \`).
    fn scan_apc(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.apc = match std::mem::replace(&mut self.apc, ApcScan::Ground) {
                ApcScan::Ground => {
                    if byte == 0x1b { ApcScan::Esc } else { ApcScan::Ground }
                }
                ApcScan::Esc => {
                    if byte == b'_' { ApcScan::Collect(Vec::new()) } else { ApcScan::Ground }
                }
                ApcScan::Collect(mut buf) => {
                    if byte == 0x1b {
                        ApcScan::CollectEsc(buf)
                    } else {
                        if buf.len() < STRING_PAYLOAD_CAP {
                            buf.push(byte);
                        }
                        ApcScan::Collect(buf)
                    }
                }
                ApcScan::CollectEsc(buf) => {
                    if byte == b'\\' {
                        self.finish_apc(buf);
                        ApcScan::Ground
                    } else {
                        // Not ST: treat the payload as aborted.
                        ApcScan::Ground
                    }
                }
            };
        }
    }

    /// A complete APC string arrived; keep it if it is a Kitty command.
    fn finish_apc(&mut self, payload: Vec<u8>) {
        if payload.first() != Some(&b'G') {
            return;
        }
        let rows = kitty_rows(&payload);
        // Reserve cell space by advancing the cursor, as the program expects.
        for _ in 0..rows {
            self.state.screen_mut().linefeed();
        }
        self.state.graphics = Some(GraphicsPayload {
            kind: GraphicsKind::Kitty,
            data: payload,
            rows,
        });
        self.state.sync_markers();
    }
}

/// Rows a Kitty command reserves: the `r=` key when present, else derived
/// from the pixel height `v=` key, else zero (control-only commands).
fn kitty_rows(payload: &[u8]) -> usize {
    let control = payload
        .split(|&b| b == b';')
        .next()
        .unwrap_or_default();
    let control = String::from_utf8_lossy(control);
    let mut rows = 0usize;
    let mut pixel_height = 0usize;
    for pair in control.trim_start_matches('G').split(',') {
        if let Some((key, value)) = pair.split_once('=') {
            match key {
                "r" => rows = value.parse().unwrap_or(0),
                "v" => pixel_height = value.parse().unwrap_or(0),
                _ => {}
            }
        }
    }
    if rows == 0 && pixel_height > 0 {
        rows = pixel_height.div_ceil(CELL_PIXEL_HEIGHT);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vt() -> Vt {
        Vt::new(5, 20, 100)
    }

    #[test]
    fn plain_text_reaches_grid() {
        let mut v = vt();
        v.write(b"hello");
        assert_eq!(v.screen().row(0).text(), "hello");
        assert!(v.take_new_output());
        assert!(!v.take_new_output());
    }

    #[test]
    fn title_event_queued() {
        let mut v = vt();
        v.write(b"\x1b]0;my title\x07");
        assert_eq!(v.title(), "my title");
        assert_eq!(v.drain_events(), vec![VtEvent::Title("my title".into())]);
    }

    #[test]
    fn disabled_callbacks_drop_events() {
        let mut v = vt();
        v.set_callbacks_enabled(false);
        v.write(b"\x1b]0;ignored\x07");
        assert!(v.drain_events().is_empty());
        // Title state still tracks; only the notification is suppressed.
        assert_eq!(v.title(), "ignored");
    }

    #[test]
    fn alt_screen_restore_does_not_clear() {
        let mut v = vt();
        v.write(b"\x1b[?1049h");
        v.write(b"alt content");
        assert!(v.is_alt_screen());
        assert_eq!(v.screen().row(0).text(), "alt content");

        // Simulated detach/attach: direct restore must not wipe the cells.
        v.restore_alt_screen_mode(false);
        assert!(!v.is_alt_screen());
        v.restore_alt_screen_mode(true);
        assert!(v.is_alt_screen());
        assert_eq!(v.screen().row(0).text(), "alt content");
    }

    #[test]
    fn mode_snapshot_restores_without_side_effects() {
        let mut v = vt();
        v.write(b"\x1b[?1000h\x1b[?1006h\x1b[?2004h");
        let snap = v.modes_snapshot();
        assert!(snap.mouse_clicks);
        assert!(snap.sgr_mouse);
        assert!(snap.bracketed_paste);

        let mut fresh = vt();
        fresh.restore_modes(&snap);
        assert!(fresh.modes().contains(TermModes::MOUSE_CLICKS));
        assert!(fresh.modes().contains(TermModes::SGR_MOUSE));
        assert!(fresh.modes().contains(TermModes::BRACKETED_PASTE));
    }

    #[test]
    fn cpr_reply_lands_in_response_pipe() {
        let mut v = vt();
        v.write(b"\x1b[3;7H\x1b[6n");
        assert_eq!(v.take_responses(), b"\x1b[3;7R");
        assert!(v.take_responses().is_empty());
    }

    #[test]
    fn kitty_apc_is_captured_and_reserves_rows() {
        let mut v = vt();
        v.write(b"\x1b_Ga=T,f=100,r=2;cGF5bG9hZA==\x1b\\");
        let g = v.graphics().expect("payload held");
        assert_eq!(g.kind, GraphicsKind::Kitty);
        assert_eq!(g.rows, 2);
        assert_eq!(v.screen().cursor.row, 2);
    }

    #[test]
    fn markers_follow_scrollback_trims() {
        let mut v = Vt::new(3, 20, 4);
        v.write(b"\x1b]133;A\x07$ ");
        assert_eq!(v.markers()[0].abs_line, 0);

        // Push enough lines through a 4-line ring to trim the marker's line.
        for _ in 0..10 {
            v.write(b"\r\nfiller");
        }
        assert!(v.markers().is_empty());
    }

    #[test]
    fn in_band_resize_report() {
        let mut v = vt();
        v.write(b"\x1b[?2048h");
        let first = v.take_responses();
        assert!(first.starts_with(b"\x1b[48;5;20;"));

        v.resize(10, 40);
        let report = v.take_responses();
        assert_eq!(report, format!("\x1b[48;10;40;{};{}t", 160, 320).into_bytes());
    }
}
