//! Escape sequence dispatch.
//!
//! Implements [`vte::Perform`] for [`TermState`]: printable glyphs, C0
//! controls, CSI, ESC, OSC (including the 133 shell-integration family),
//! and DCS (Sixel capture). Malformed or unrecognized sequences are logged
//! at trace level and dropped; payload caps truncate, never abort.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use unicode_width::UnicodeWidthChar;
use vte::{Params, Perform};

use super::cell::CellAttrs;
use super::charset::Charset;
use super::marker::{MarkerKind, SemanticMarker};
use super::modes::{CursorShape, TermModes};
use super::palette::{format_color_reply, parse_color_spec};
use super::screen::EraseMode;
use super::{
    GraphicsKind, GraphicsPayload, TermState, VtEvent, CELL_PIXEL_HEIGHT, CELL_PIXEL_WIDTH,
    STRING_PAYLOAD_CAP,
};

/// First parameter of a group, with `0` promoted to `default` (the common
/// "Ps with default 1" rule).
fn param_or(groups: &[Vec<u16>], index: usize, default: u16) -> u16 {
    match groups.get(index).and_then(|g| g.first()).copied() {
        Some(0) | None => default,
        Some(v) => v,
    }
}

/// Raw first parameter of a group (no zero promotion).
fn raw_param(groups: &[Vec<u16>], index: usize) -> Option<u16> {
    groups.get(index).and_then(|g| g.first()).copied()
}

impl TermState {
    fn autowrap(&self) -> bool {
        self.modes.contains(TermModes::AUTOWRAP)
    }

    fn insert_mode(&self) -> bool {
        self.modes.contains(TermModes::INSERT)
    }

    fn origin(&self) -> bool {
        self.modes.contains(TermModes::ORIGIN)
    }

    /// Attach a zero-width character to the previous base cell.
    fn attach_zerowidth(&mut self, ch: char) {
        let screen = self.screen_mut();
        let row = screen.cursor.row;
        let col = if screen.cursor.wrap_pending {
            screen.cursor.col
        } else if screen.cursor.col > 0 {
            screen.cursor.col - 1
        } else {
            return;
        };
        let col = if screen.row(row)[col].attrs.contains(CellAttrs::WIDE_SPACER) && col > 0 {
            col - 1
        } else {
            col
        };
        screen.row_mut(row)[col].push_zerowidth(ch);
    }

    fn print_char(&mut self, ch: char) {
        let ch = self.charsets.map(ch);
        match UnicodeWidthChar::width(ch) {
            Some(0) => self.attach_zerowidth(ch),
            width => {
                let width = width.unwrap_or(1);
                let autowrap = self.autowrap();
                let insert = self.insert_mode();
                self.screen_mut().put_char(ch, width, autowrap, insert);
                self.last_printed = Some(ch);
            }
        }
    }

    // ── CSI groups ────────────────────────────────────────────────────────

    fn erase_display(&mut self, mode: u16) {
        match mode {
            0 => self.screen_mut().erase_display(EraseMode::Below),
            1 => self.screen_mut().erase_display(EraseMode::Above),
            2 => {
                if !self.active_is_alt {
                    // The visible screen is gone; markers pointing at it are
                    // stale, archived ones stay valid.
                    let sb_len = self.primary.scrollback().len();
                    self.markers.drop_screen_markers(sb_len);
                }
                self.screen_mut().erase_display(EraseMode::All);
                self.graphics = None;
            }
            3 => {
                self.screen_mut().erase_display(EraseMode::All);
                if !self.active_is_alt {
                    self.primary.scrollback_mut().clear();
                    self.sync_markers();
                }
            }
            other => log::trace!("unhandled ED mode {other}"),
        }
    }

    fn set_ansi_mode(&mut self, param: u16, enable: bool) {
        match param {
            4 => self.modes.set(TermModes::INSERT, enable),
            20 => self.modes.set(TermModes::LINEFEED_CR, enable),
            other => log::trace!("unhandled ANSI mode {other}"),
        }
    }

    fn set_private_mode(&mut self, param: u16, enable: bool) {
        match param {
            1 => self.modes.set(TermModes::APP_CURSOR, enable),
            6 => {
                self.modes.set(TermModes::ORIGIN, enable);
                let origin = self.origin();
                self.screen_mut().goto(0, 0, origin);
            }
            7 => self.modes.set(TermModes::AUTOWRAP, enable),
            9 => self.modes.set(TermModes::MOUSE_X10, enable),
            12 => self.screen_mut().cursor.blink = enable,
            25 => {
                self.modes.set(TermModes::SHOW_CURSOR, enable);
                self.screen_mut().cursor.visible = enable;
            }
            47 => {
                if enable {
                    self.enter_alt_screen(false);
                } else {
                    self.leave_alt_screen(false);
                }
            }
            1000 => self.modes.set(TermModes::MOUSE_CLICKS, enable),
            1001 => self.modes.set(TermModes::MOUSE_HIGHLIGHT, enable),
            1002 => self.modes.set(TermModes::MOUSE_DRAG, enable),
            1003 => self.modes.set(TermModes::MOUSE_ANY, enable),
            1004 => self.modes.set(TermModes::FOCUS_REPORT, enable),
            1006 => self.modes.set(TermModes::SGR_MOUSE, enable),
            1047 => {
                if enable {
                    self.enter_alt_screen(false);
                } else {
                    self.leave_alt_screen(false);
                }
            }
            1048 => {
                if enable {
                    self.primary.save_cursor();
                } else {
                    self.primary.restore_cursor();
                }
            }
            1049 => {
                if enable {
                    self.enter_alt_screen(true);
                } else {
                    self.leave_alt_screen(true);
                }
            }
            2004 => self.modes.set(TermModes::BRACKETED_PASTE, enable),
            2048 => {
                self.modes.set(TermModes::INBAND_RESIZE, enable);
                if enable {
                    self.report_inband_size();
                }
            }
            other => log::trace!("unhandled private mode {other}"),
        }
    }

    /// DECRPM reply for DECRQM (`CSI ? Ps $ p`).
    fn report_private_mode(&mut self, param: u16) {
        let flag = match param {
            1 => Some(TermModes::APP_CURSOR),
            6 => Some(TermModes::ORIGIN),
            7 => Some(TermModes::AUTOWRAP),
            25 => Some(TermModes::SHOW_CURSOR),
            1000 => Some(TermModes::MOUSE_CLICKS),
            1002 => Some(TermModes::MOUSE_DRAG),
            1003 => Some(TermModes::MOUSE_ANY),
            1004 => Some(TermModes::FOCUS_REPORT),
            1006 => Some(TermModes::SGR_MOUSE),
            1049 => Some(TermModes::ALT_SCREEN),
            2004 => Some(TermModes::BRACKETED_PASTE),
            2048 => Some(TermModes::INBAND_RESIZE),
            _ => None,
        };
        let state = match flag {
            Some(flag) if self.modes.contains(flag) => 1,
            Some(_) => 2,
            None => 0,
        };
        let reply = format!("\x1b[?{param};{state}$y");
        self.respond(reply.as_bytes());
    }

    fn device_status(&mut self, param: u16) {
        match param {
            5 => self.respond(b"\x1b[0n"),
            6 => {
                let (row, col) = {
                    let cursor = &self.screen().cursor;
                    (cursor.row + 1, cursor.col + 1)
                };
                let reply = format!("\x1b[{row};{col}R");
                self.respond(reply.as_bytes());
            }
            other => log::trace!("unhandled DSR {other}"),
        }
    }

    fn window_op(&mut self, groups: &[Vec<u16>]) {
        match raw_param(groups, 0) {
            // Text area size in pixels.
            Some(14) => {
                let (lines, cols) = (self.screen().lines(), self.screen().cols());
                let reply = format!(
                    "\x1b[4;{};{}t",
                    lines * CELL_PIXEL_HEIGHT,
                    cols * CELL_PIXEL_WIDTH
                );
                self.respond(reply.as_bytes());
            }
            // Text area size in characters.
            Some(18) => {
                let (lines, cols) = (self.screen().lines(), self.screen().cols());
                let reply = format!("\x1b[8;{lines};{cols}t");
                self.respond(reply.as_bytes());
            }
            Some(22) => self.title_stack.push(self.title.clone()),
            Some(23) => {
                if let Some(title) = self.title_stack.pop() {
                    self.title = title.clone();
                    self.emit(VtEvent::Title(title));
                }
            }
            other => log::trace!("unhandled XTWINOPS {other:?}"),
        }
    }

    /// DECSCUSR — `CSI Ps SP q`.
    fn set_cursor_style(&mut self, param: u16) {
        let (shape, blink) = match param {
            0 | 1 => (CursorShape::Block, true),
            2 => (CursorShape::Block, false),
            3 => (CursorShape::Underline, true),
            4 => (CursorShape::Underline, false),
            5 => (CursorShape::Beam, true),
            6 => (CursorShape::Beam, false),
            _ => return,
        };
        {
            let cursor = &mut self.screen_mut().cursor;
            cursor.shape = shape;
            cursor.blink = blink;
        }
        self.emit(VtEvent::CursorStyle(shape, blink));
    }

    fn apply_sgr(&mut self, groups: &[Vec<u16>]) {
        if groups.is_empty() {
            self.sgr_reset();
            return;
        }
        let mut i = 0;
        while i < groups.len() {
            let group = &groups[i];
            let code = group.first().copied().unwrap_or(0);

            // Colon form: the whole spec lives in one group (38:5:n etc.).
            if group.len() > 1 && matches!(code, 38 | 48 | 58) {
                self.apply_color_spec(code, &group[1..]);
                i += 1;
                continue;
            }
            // Colon form underline styles: 4:0 .. 4:5.
            if group.len() > 1 && code == 4 {
                let attrs = &mut self.screen_mut().cursor.template.attrs;
                if group[1] == 0 {
                    attrs.remove(CellAttrs::UNDERLINE);
                } else {
                    attrs.insert(CellAttrs::UNDERLINE);
                }
                i += 1;
                continue;
            }
            // Semicolon form extended colors consume the following groups.
            if matches!(code, 38 | 48 | 58) {
                let consumed = self.apply_color_spec_semicolon(code, &groups[i + 1..]);
                i += 1 + consumed;
                continue;
            }

            self.apply_simple_sgr(code);
            i += 1;
        }
    }

    fn sgr_reset(&mut self) {
        let template = &mut self.screen_mut().cursor.template;
        template.fg = vte::ansi::Color::Named(vte::ansi::NamedColor::Foreground);
        template.bg = vte::ansi::Color::Named(vte::ansi::NamedColor::Background);
        template.attrs = CellAttrs::empty();
        // Hyperlinks are scoped by OSC 8, not SGR.
    }

    fn apply_simple_sgr(&mut self, code: u16) {
        use vte::ansi::{Color, NamedColor};
        if code == 0 {
            self.sgr_reset();
            return;
        }
        let template = &mut self.screen_mut().cursor.template;
        match code {
            0 => {}
            1 => template.attrs.insert(CellAttrs::BOLD),
            2 => template.attrs.insert(CellAttrs::FAINT),
            3 => template.attrs.insert(CellAttrs::ITALIC),
            4 => template.attrs.insert(CellAttrs::UNDERLINE),
            5 | 6 => template.attrs.insert(CellAttrs::BLINK),
            7 => template.attrs.insert(CellAttrs::INVERSE),
            8 => template.attrs.insert(CellAttrs::CONCEAL),
            9 => template.attrs.insert(CellAttrs::STRIKETHROUGH),
            21 => template.attrs.insert(CellAttrs::UNDERLINE),
            22 => template.attrs.remove(CellAttrs::BOLD | CellAttrs::FAINT),
            23 => template.attrs.remove(CellAttrs::ITALIC),
            24 => template.attrs.remove(CellAttrs::UNDERLINE),
            25 => template.attrs.remove(CellAttrs::BLINK),
            27 => template.attrs.remove(CellAttrs::INVERSE),
            28 => template.attrs.remove(CellAttrs::CONCEAL),
            29 => template.attrs.remove(CellAttrs::STRIKETHROUGH),
            30..=37 => template.fg = Color::Indexed((code - 30) as u8),
            39 => template.fg = Color::Named(NamedColor::Foreground),
            40..=47 => template.bg = Color::Indexed((code - 40) as u8),
            49 => template.bg = Color::Named(NamedColor::Background),
            90..=97 => template.fg = Color::Indexed((code - 90 + 8) as u8),
            100..=107 => template.bg = Color::Indexed((code - 100 + 8) as u8),
            59 => {} // reset underline color — underline colors not stored
            other => log::trace!("unhandled SGR {other}"),
        }
    }

    /// Colon-form extended color: `spec` is the tail after 38/48/58.
    fn apply_color_spec(&mut self, code: u16, spec: &[u16]) {
        use vte::ansi::{Color, Rgb};
        let color = match spec.first() {
            Some(5) => spec.get(1).map(|&n| Color::Indexed(n as u8)),
            Some(2) => {
                // Both 38:2:r:g:b and 38:2:colorspace:r:g:b occur in the wild.
                let tail: Vec<u16> = spec[1..].to_vec();
                let rgb = if tail.len() >= 4 { &tail[1..4] } else { &tail[..] };
                (rgb.len() >= 3).then(|| {
                    Color::Spec(Rgb {
                        r: rgb[0] as u8,
                        g: rgb[1] as u8,
                        b: rgb[2] as u8,
                    })
                })
            }
            _ => None,
        };
        if let Some(color) = color {
            let template = &mut self.screen_mut().cursor.template;
            match code {
                38 => template.fg = color,
                48 => template.bg = color,
                _ => {} // 58 underline color — not stored
            }
        }
    }

    /// Semicolon-form extended color; returns how many groups it consumed.
    fn apply_color_spec_semicolon(&mut self, code: u16, rest: &[Vec<u16>]) -> usize {
        match rest.first().and_then(|g| g.first()).copied() {
            Some(5) => {
                if let Some(&n) = rest.get(1).and_then(|g| g.first()) {
                    self.apply_color_spec(code, &[5, n]);
                }
                2
            }
            Some(2) => {
                let rgb: Vec<u16> = rest[1..]
                    .iter()
                    .take(3)
                    .filter_map(|g| g.first().copied())
                    .collect();
                if rgb.len() == 3 {
                    self.apply_color_spec(code, &[2, rgb[0], rgb[1], rgb[2]]);
                }
                4
            }
            _ => 0,
        }
    }

    // ── OSC 133 ───────────────────────────────────────────────────────────

    /// Record a shell-integration marker. Alt-screen programs don't have
    /// prompts; markers only track the primary buffer.
    fn semantic_marker(&mut self, kind: u8, exit_code: Option<i32>) {
        if self.active_is_alt {
            return;
        }
        let abs_line = self.cursor_abs_line();
        let col = self.primary.cursor.col;
        let marker = match kind {
            b'A' => SemanticMarker {
                kind: MarkerKind::PromptStart,
                abs_line,
                col,
                exit_code: None,
                captured_text: None,
            },
            b'B' => SemanticMarker {
                kind: MarkerKind::CommandStart,
                abs_line,
                col,
                exit_code: None,
                captured_text: None,
            },
            b'C' => SemanticMarker {
                kind: MarkerKind::CommandExecuted,
                abs_line,
                col,
                exit_code: None,
                captured_text: self.capture_command_text(),
            },
            b'D' => SemanticMarker {
                kind: MarkerKind::CommandFinished,
                abs_line,
                col,
                exit_code,
                captured_text: None,
            },
            _ => return,
        };
        self.markers.record(marker);
    }

    /// Command text between the latest `B` marker and the cursor, recorded
    /// when `C` fires so later screen clears can't destroy it.
    fn capture_command_text(&self) -> Option<String> {
        let start = self.markers.last_of(MarkerKind::CommandStart)?.clone();
        let end_abs = self.cursor_abs_line();
        if end_abs < start.abs_line {
            return None;
        }
        let mut text = String::new();
        for abs in start.abs_line..=end_abs {
            let line = self.text_at_abs(abs)?;
            if abs == start.abs_line {
                text.push_str(&line.chars().skip(start.col).collect::<String>());
            } else {
                text.push('\n');
                text.push_str(&line);
            }
        }
        let trimmed = text.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    fn osc_color(&mut self, index: usize, payload: &str, bell_terminated: bool) {
        let terminator = if bell_terminated { "\x07" } else { "\x1b\\" };
        if payload == "?" {
            let color = match index {
                10 => self.palette.default_fg,
                11 => self.palette.default_bg,
                _ => self.palette.cursor,
            };
            let reply = format!("\x1b]{index};{}{terminator}", format_color_reply(color));
            self.respond(reply.as_bytes());
            return;
        }
        let Some(color) = parse_color_spec(payload) else {
            log::trace!("unparseable OSC {index} color: {payload}");
            return;
        };
        match index {
            10 => {
                self.palette.default_fg = color;
                self.emit(VtEvent::DefaultFg(color));
            }
            11 => {
                self.palette.default_bg = color;
                self.emit(VtEvent::DefaultBg(color));
            }
            _ => {
                self.palette.cursor = color;
                self.emit(VtEvent::CursorColor(color));
            }
        }
    }

    fn osc_reset_color(&mut self, index: usize) {
        let defaults = super::Palette::default();
        match index {
            110 => {
                self.palette.default_fg = defaults.default_fg;
                self.emit(VtEvent::DefaultFg(defaults.default_fg));
            }
            111 => {
                self.palette.default_bg = defaults.default_bg;
                self.emit(VtEvent::DefaultBg(defaults.default_bg));
            }
            _ => {
                self.palette.cursor = defaults.cursor;
                self.emit(VtEvent::CursorColor(defaults.cursor));
            }
        }
    }

    fn full_reset(&mut self) {
        let lines = self.primary.lines();
        let cols = self.primary.cols();
        let scrollback = self.primary.scrollback().max_lines();
        self.primary = super::ScreenBuffer::new(lines, cols, scrollback);
        self.alt = super::ScreenBuffer::new(lines, cols, 0);
        self.active_is_alt = false;
        self.modes = TermModes::default();
        self.charsets = Default::default();
        self.title_stack.clear();
        self.markers.clear();
        self.graphics = None;
        self.last_printed = None;
    }
}

impl Perform for TermState {
    fn print(&mut self, ch: char) {
        self.print_char(ch);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            0x07 => self.emit(VtEvent::Bell),
            0x08 => self.screen_mut().backspace(),
            0x09 => self.screen_mut().advance_tab(1),
            0x0a | 0x0b | 0x0c => {
                self.screen_mut().linefeed();
                if self.modes.contains(TermModes::LINEFEED_CR) {
                    self.screen_mut().carriage_return();
                }
            }
            0x0d => self.screen_mut().carriage_return(),
            0x0e => self.charsets.active = 1,
            0x0f => self.charsets.active = 0,
            _ => log::trace!("unhandled C0 control {byte:#04x}"),
        }
    }

    fn csi_dispatch(
        &mut self,
        params: &Params,
        intermediates: &[u8],
        ignore: bool,
        action: char,
    ) {
        if ignore {
            return;
        }
        let groups: Vec<Vec<u16>> = params.iter().map(<[u16]>::to_vec).collect();
        let private = intermediates.contains(&b'?');

        match (action, private) {
            ('@', false) => {
                let n = param_or(&groups, 0, 1) as usize;
                self.screen_mut().insert_blank(n);
            }
            ('A', false) => {
                let n = param_or(&groups, 0, 1) as usize;
                self.screen_mut().move_up(n);
            }
            ('B' | 'e', false) => {
                let n = param_or(&groups, 0, 1) as usize;
                self.screen_mut().move_down(n);
            }
            ('C' | 'a', false) => {
                let n = param_or(&groups, 0, 1) as usize;
                self.screen_mut().move_forward(n);
            }
            ('D', false) => {
                let n = param_or(&groups, 0, 1) as usize;
                self.screen_mut().move_backward(n);
            }
            ('E', false) => {
                let n = param_or(&groups, 0, 1) as usize;
                self.screen_mut().move_down(n);
                self.screen_mut().carriage_return();
            }
            ('F', false) => {
                let n = param_or(&groups, 0, 1) as usize;
                self.screen_mut().move_up(n);
                self.screen_mut().carriage_return();
            }
            ('G' | '`', false) => {
                let col = param_or(&groups, 0, 1) as usize - 1;
                self.screen_mut().goto_col(col);
            }
            ('H' | 'f', false) => {
                let row = param_or(&groups, 0, 1) as usize - 1;
                let col = param_or(&groups, 1, 1) as usize - 1;
                let origin = self.origin();
                self.screen_mut().goto(row, col, origin);
            }
            ('I', false) => self.screen_mut().advance_tab(param_or(&groups, 0, 1)),
            ('J', _) => self.erase_display(raw_param(&groups, 0).unwrap_or(0)),
            ('K', _) => {
                let mode = match raw_param(&groups, 0).unwrap_or(0) {
                    1 => EraseMode::Above,
                    2 => EraseMode::All,
                    _ => EraseMode::Below,
                };
                self.screen_mut().erase_line(mode);
            }
            ('L', false) => {
                let n = param_or(&groups, 0, 1) as usize;
                self.screen_mut().insert_lines(n);
            }
            ('M', false) => {
                let n = param_or(&groups, 0, 1) as usize;
                self.screen_mut().delete_lines(n);
            }
            ('P', false) => {
                let n = param_or(&groups, 0, 1) as usize;
                self.screen_mut().delete_chars(n);
            }
            ('S', false) => {
                let n = param_or(&groups, 0, 1) as usize;
                self.screen_mut().scroll_up(n);
            }
            ('T', false) => {
                let n = param_or(&groups, 0, 1) as usize;
                self.screen_mut().scroll_down(n);
            }
            ('X', false) => {
                let n = param_or(&groups, 0, 1) as usize;
                self.screen_mut().erase_chars(n);
            }
            ('Z', false) => self.screen_mut().backward_tab(param_or(&groups, 0, 1)),
            ('b', false) => {
                if let Some(ch) = self.last_printed {
                    let n = param_or(&groups, 0, 1) as usize;
                    for _ in 0..n {
                        self.print_char(ch);
                    }
                }
            }
            ('c', _) => {
                if intermediates.contains(&b'>') {
                    // DA2: VT220-class, firmware 10.
                    self.respond(b"\x1b[>1;10;0c");
                } else if intermediates.is_empty() {
                    // DA1: VT220 with ANSI color and Sixel forwarding.
                    self.respond(b"\x1b[?62;4;22c");
                }
            }
            ('d', false) => {
                let row = param_or(&groups, 0, 1) as usize - 1;
                let origin = self.origin();
                self.screen_mut().goto_row(row, origin);
            }
            ('g', false) => {
                let all = raw_param(&groups, 0) == Some(3);
                self.screen_mut().clear_tab_stops(all);
            }
            ('h', false) => {
                for group in &groups {
                    if let Some(&p) = group.first() {
                        self.set_ansi_mode(p, true);
                    }
                }
            }
            ('h', true) => {
                for group in &groups {
                    if let Some(&p) = group.first() {
                        self.set_private_mode(p, true);
                    }
                }
            }
            ('l', false) => {
                for group in &groups {
                    if let Some(&p) = group.first() {
                        self.set_ansi_mode(p, false);
                    }
                }
            }
            ('l', true) => {
                for group in &groups {
                    if let Some(&p) = group.first() {
                        self.set_private_mode(p, false);
                    }
                }
            }
            ('m', false) => self.apply_sgr(&groups),
            ('n', _) => self.device_status(raw_param(&groups, 0).unwrap_or(0)),
            ('p', true) => {
                if intermediates.contains(&b'$') {
                    self.report_private_mode(raw_param(&groups, 0).unwrap_or(0));
                }
            }
            ('q', false) => {
                if intermediates.contains(&b' ') {
                    self.set_cursor_style(raw_param(&groups, 0).unwrap_or(0));
                }
            }
            ('r', false) => {
                let lines = self.screen().lines();
                let top = param_or(&groups, 0, 1) as usize - 1;
                let bottom = match raw_param(&groups, 1) {
                    Some(0) | None => None,
                    Some(b) => Some((b as usize - 1).min(lines - 1)),
                };
                self.screen_mut().set_scroll_region(top, bottom);
            }
            ('s', false) => self.screen_mut().save_cursor(),
            ('u', false) => {
                if intermediates.is_empty() {
                    self.screen_mut().restore_cursor();
                }
                // CSI > u / CSI < u (kitty keyboard) intentionally ignored.
            }
            ('t', false) => self.window_op(&groups),
            (action, _) => log::trace!("unhandled CSI {action:?} (private={private})"),
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], ignore: bool, byte: u8) {
        if ignore {
            return;
        }
        match (intermediates.first(), byte) {
            (None, b'7') => self.screen_mut().save_cursor(),
            (None, b'8') => self.screen_mut().restore_cursor(),
            (None, b'D') => self.screen_mut().linefeed(),
            (None, b'E') => {
                self.screen_mut().linefeed();
                self.screen_mut().carriage_return();
            }
            (None, b'H') => self.screen_mut().set_tab_stop(),
            (None, b'M') => self.screen_mut().reverse_index(),
            (None, b'c') => self.full_reset(),
            (None, b'=') => self.modes.insert(TermModes::APP_KEYPAD),
            (None, b'>') => self.modes.remove(TermModes::APP_KEYPAD),
            (Some(b'#'), b'8') => self.screen_mut().decaln(),
            (Some(&slot @ (b'(' | b')' | b'*' | b'+')), designator) => {
                let index = match slot {
                    b'(' => 0,
                    b')' => 1,
                    b'*' => 2,
                    _ => 3,
                };
                self.charsets.slots[index] = match designator {
                    b'0' => Charset::SpecialGraphics,
                    _ => Charset::Ascii,
                };
            }
            (_, b'\\') => {} // ST
            (intermediate, byte) => {
                log::trace!("unhandled ESC {intermediate:?} {byte:#04x}");
            }
        }
    }

    fn osc_dispatch(&mut self, params: &[&[u8]], bell_terminated: bool) {
        let Some(selector) = params.first() else {
            return;
        };
        let code: usize = match std::str::from_utf8(selector).ok().and_then(|s| s.parse().ok()) {
            Some(code) => code,
            None => return,
        };
        let arg = |i: usize| -> String {
            params
                .get(i)
                .map(|p| String::from_utf8_lossy(&p[..p.len().min(STRING_PAYLOAD_CAP)]).into_owned())
                .unwrap_or_default()
        };

        match code {
            0 => {
                let title = arg(1);
                self.title = title.clone();
                self.emit(VtEvent::IconName(title.clone()));
                self.emit(VtEvent::Title(title));
            }
            1 => self.emit(VtEvent::IconName(arg(1))),
            2 => {
                let title = arg(1);
                self.title = title.clone();
                self.emit(VtEvent::Title(title));
            }
            4 => {
                // Pairs of (index, spec); "?" queries an entry.
                let mut i = 1;
                while i + 1 < params.len() {
                    let Some(index) = params
                        .get(i)
                        .and_then(|p| std::str::from_utf8(p).ok())
                        .and_then(|s| s.parse::<usize>().ok())
                    else {
                        break;
                    };
                    let spec = arg(i + 1);
                    if spec == "?" {
                        if let Some(color) = self.palette.get(index) {
                            let terminator = if bell_terminated { "\x07" } else { "\x1b\\" };
                            let reply = format!(
                                "\x1b]4;{index};{}{terminator}",
                                format_color_reply(color)
                            );
                            self.respond(reply.as_bytes());
                        }
                    } else if let Some(color) = parse_color_spec(&spec) {
                        self.palette.set(index, color);
                    }
                    i += 2;
                }
            }
            104 => {
                if params.len() <= 1 {
                    self.palette.reset_all();
                } else {
                    for p in &params[1..] {
                        if let Some(index) = std::str::from_utf8(p)
                            .ok()
                            .and_then(|s| s.parse::<usize>().ok())
                        {
                            self.palette.reset(index);
                        }
                    }
                }
            }
            7 => self.emit(VtEvent::WorkingDir(arg(1))),
            8 => {
                let link_params = arg(1);
                let uri = arg(2);
                let link = (!uri.is_empty()).then(|| super::Hyperlink {
                    id: link_params
                        .split(':')
                        .find_map(|kv| kv.strip_prefix("id=").map(str::to_string)),
                    uri,
                });
                self.screen_mut().cursor.template.set_hyperlink(link);
            }
            10 | 11 | 12 => self.osc_color(code, &arg(1), bell_terminated),
            110 | 111 | 112 => self.osc_reset_color(code),
            52 => {
                let data = arg(2);
                if data != "?" {
                    if let Ok(decoded) = BASE64.decode(data.as_bytes()) {
                        if let Ok(text) = String::from_utf8(decoded) {
                            self.emit(VtEvent::Clipboard(text));
                        }
                    }
                }
            }
            133 => {
                let Some(kind) = params.get(1).and_then(|p| p.first()).copied() else {
                    return;
                };
                let exit_code = params
                    .get(2)
                    .and_then(|p| std::str::from_utf8(p).ok())
                    .and_then(|s| s.parse::<i32>().ok());
                self.semantic_marker(kind, exit_code);
            }
            other => log::trace!("unhandled OSC {other}"),
        }
    }

    fn hook(&mut self, params: &Params, intermediates: &[u8], _ignore: bool, action: char) {
        if action == 'q' {
            // Sixel: keep the full DCS introducer so the host replay is
            // byte-faithful.
            let mut buf = Vec::new();
            let groups: Vec<String> = params
                .iter()
                .map(|g| {
                    g.iter()
                        .map(u16::to_string)
                        .collect::<Vec<_>>()
                        .join(":")
                })
                .collect();
            buf.extend_from_slice(groups.join(";").as_bytes());
            buf.extend_from_slice(intermediates);
            buf.push(b'q');
            self.dcs_sixel = Some(buf);
        } else {
            log::trace!("unhandled DCS {action:?}");
        }
    }

    fn put(&mut self, byte: u8) {
        if let Some(buf) = self.dcs_sixel.as_mut() {
            if buf.len() < STRING_PAYLOAD_CAP {
                buf.push(byte);
            }
        }
    }

    fn unhook(&mut self) {
        let Some(data) = self.dcs_sixel.take() else {
            return;
        };
        // Each `-` starts a new 6-pixel sixel band.
        let bands = data.iter().filter(|&&b| b == b'-').count() + 1;
        let rows = (bands * 6).div_ceil(CELL_PIXEL_HEIGHT);
        for _ in 0..rows {
            self.screen_mut().linefeed();
        }
        self.graphics = Some(GraphicsPayload {
            kind: GraphicsKind::Sixel,
            data,
            rows,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::super::Vt;
    use super::*;
    use vte::ansi::{Color, NamedColor};

    fn vt() -> Vt {
        Vt::new(6, 20, 100)
    }

    fn feed(v: &mut Vt, bytes: &[u8]) {
        v.write(bytes);
    }

    #[test]
    fn cursor_motion_sequences() {
        let mut v = vt();
        feed(&mut v, b"\x1b[3;5H");
        assert_eq!((v.screen().cursor.row, v.screen().cursor.col), (2, 4));
        feed(&mut v, b"\x1b[2A\x1b[3C");
        assert_eq!((v.screen().cursor.row, v.screen().cursor.col), (0, 7));
        feed(&mut v, b"\x1b[B\x1b[2D");
        assert_eq!((v.screen().cursor.row, v.screen().cursor.col), (1, 5));
    }

    #[test]
    fn sgr_colors_and_attributes() {
        let mut v = vt();
        feed(&mut v, b"\x1b[1;31mX\x1b[0mY");
        let x = &v.screen().row(0)[0];
        assert!(x.attrs.contains(CellAttrs::BOLD));
        assert_eq!(x.fg, Color::Indexed(1));
        let y = &v.screen().row(0)[1];
        assert!(y.attrs.is_empty());
        assert_eq!(y.fg, Color::Named(NamedColor::Foreground));
    }

    #[test]
    fn sgr_256_and_truecolor() {
        let mut v = vt();
        feed(&mut v, b"\x1b[38;5;42mA\x1b[48;2;10;20;30mB");
        assert_eq!(v.screen().row(0)[0].fg, Color::Indexed(42));
        assert_eq!(
            v.screen().row(0)[1].bg,
            Color::Spec(vte::ansi::Rgb { r: 10, g: 20, b: 30 })
        );
    }

    #[test]
    fn sgr_colon_form() {
        let mut v = vt();
        feed(&mut v, b"\x1b[38:5:99mZ");
        assert_eq!(v.screen().row(0)[0].fg, Color::Indexed(99));
    }

    #[test]
    fn bright_colors() {
        let mut v = vt();
        feed(&mut v, b"\x1b[91mA\x1b[104mB");
        assert_eq!(v.screen().row(0)[0].fg, Color::Indexed(9));
        assert_eq!(v.screen().row(0)[1].bg, Color::Indexed(12));
    }

    #[test]
    fn erase_display_and_line() {
        let mut v = vt();
        feed(&mut v, b"aaaa\r\nbbbb\r\ncccc");
        feed(&mut v, b"\x1b[2;2H\x1b[0K");
        assert_eq!(v.screen().row(1).text(), "b");
        feed(&mut v, b"\x1b[2J");
        assert_eq!(v.screen().row(0).text(), "");
        assert_eq!(v.screen().row(2).text(), "");
    }

    #[test]
    fn ed3_clears_scrollback() {
        let mut v = Vt::new(3, 20, 100);
        for i in 0..6 {
            feed(&mut v, format!("line{i}\r\n").as_bytes());
        }
        assert!(v.scrollback_len() > 0);
        feed(&mut v, b"\x1b[3J");
        assert_eq!(v.scrollback_len(), 0);
    }

    #[test]
    fn scroll_region_and_su_sd() {
        let mut v = vt();
        feed(&mut v, b"one\r\ntwo\r\nthree");
        feed(&mut v, b"\x1b[1;2r\x1b[1S");
        assert_eq!(v.screen().row(0).text(), "two");
        assert_eq!(v.screen().row(1).text(), "");
        assert_eq!(v.screen().row(2).text(), "three");
        // DECSTBM homes the cursor.
        assert_eq!((v.screen().cursor.row, v.screen().cursor.col), (0, 0));
    }

    #[test]
    fn decsc_decrc_round_trip() {
        let mut v = vt();
        feed(&mut v, b"\x1b[4;6H\x1b7\x1b[H\x1b8");
        assert_eq!((v.screen().cursor.row, v.screen().cursor.col), (3, 5));
    }

    #[test]
    fn alt_screen_1049_saves_and_restores() {
        let mut v = vt();
        feed(&mut v, b"primary\x1b[?1049h");
        assert!(v.is_alt_screen());
        assert_eq!(v.screen().row(0).text(), "");
        feed(&mut v, b"editor");
        feed(&mut v, b"\x1b[?1049l");
        assert!(!v.is_alt_screen());
        assert_eq!(v.screen().row(0).text(), "primary");
        assert_eq!(v.screen().cursor.col, 7);
    }

    #[test]
    fn mouse_modes_toggle() {
        let mut v = vt();
        feed(&mut v, b"\x1b[?1002h\x1b[?1006h");
        assert!(v.modes().mouse_motion_enabled());
        assert!(v.modes().contains(TermModes::SGR_MOUSE));
        feed(&mut v, b"\x1b[?1002l");
        assert!(!v.modes().mouse_motion_enabled());
    }

    #[test]
    fn decscusr_sets_shape_and_event() {
        let mut v = vt();
        feed(&mut v, b"\x1b[5 q");
        assert_eq!(v.screen().cursor.shape, CursorShape::Beam);
        assert!(v
            .drain_events()
            .contains(&VtEvent::CursorStyle(CursorShape::Beam, true)));
    }

    #[test]
    fn da1_and_da2_replies() {
        let mut v = vt();
        feed(&mut v, b"\x1b[c");
        assert_eq!(v.take_responses(), b"\x1b[?62;4;22c");
        feed(&mut v, b"\x1b[>c");
        assert_eq!(v.take_responses(), b"\x1b[>1;10;0c");
    }

    #[test]
    fn xtwinops_size_report() {
        let mut v = vt();
        feed(&mut v, b"\x1b[18t");
        assert_eq!(v.take_responses(), b"\x1b[8;6;20t");
    }

    #[test]
    fn osc_hyperlink_applies_to_cells() {
        let mut v = vt();
        feed(&mut v, b"\x1b]8;;https://example.com\x1b\\link\x1b]8;;\x1b\\plain");
        let cell = &v.screen().row(0)[0];
        assert_eq!(cell.hyperlink().unwrap().uri, "https://example.com");
        let plain = &v.screen().row(0)[4];
        assert!(plain.hyperlink().is_none());
    }

    #[test]
    fn osc_palette_set_and_query() {
        let mut v = vt();
        feed(&mut v, b"\x1b]4;17;#336699\x07");
        assert_eq!(
            v.palette().get(17).unwrap(),
            vte::ansi::Rgb { r: 0x33, g: 0x66, b: 0x99 }
        );
        feed(&mut v, b"\x1b]4;17;?\x07");
        assert_eq!(v.take_responses(), b"\x1b]4;17;rgb:3333/6666/9999\x07");
    }

    #[test]
    fn osc_default_color_query() {
        let mut v = vt();
        feed(&mut v, b"\x1b]10;?\x07");
        let reply = v.take_responses();
        assert!(reply.starts_with(b"\x1b]10;rgb:"));
        assert!(reply.ends_with(b"\x07"));
    }

    #[test]
    fn osc_52_clipboard_event() {
        let mut v = vt();
        feed(&mut v, b"\x1b]52;c;aGVsbG8=\x07");
        assert_eq!(v.drain_events(), vec![VtEvent::Clipboard("hello".into())]);
    }

    #[test]
    fn osc_133_full_cycle() {
        let mut v = vt();
        feed(&mut v, b"\x1b]133;A\x07$ \x1b]133;B\x07echo foo\x1b]133;C\x07\r\nfoo\r\n\x1b]133;D;0\x07");
        let markers = v.markers();
        assert_eq!(markers.len(), 4);
        assert_eq!(markers[0].kind, MarkerKind::PromptStart);
        assert_eq!(markers[1].kind, MarkerKind::CommandStart);
        assert_eq!(markers[1].col, 2);
        assert_eq!(markers[2].kind, MarkerKind::CommandExecuted);
        assert_eq!(markers[2].captured_text.as_deref(), Some("echo foo"));
        assert_eq!(markers[3].kind, MarkerKind::CommandFinished);
        assert_eq!(markers[3].exit_code, Some(0));
    }

    #[test]
    fn csi_2j_drops_screen_markers_only() {
        let mut v = Vt::new(3, 20, 100);
        // Archive a prompt into scrollback, then leave one on screen.
        feed(&mut v, b"\x1b]133;A\x07$ old\r\n\r\n\r\n\r\n");
        feed(&mut v, b"\x1b]133;A\x07$ new");
        assert_eq!(v.markers().len(), 2);

        feed(&mut v, b"\x1b[2J");
        let markers = v.markers();
        assert_eq!(markers.len(), 1);
        assert!(markers[0].abs_line < v.scrollback_len() as i64);
    }

    #[test]
    fn charset_box_drawing() {
        let mut v = vt();
        feed(&mut v, b"\x1b(0qqx\x1b(Bq");
        assert_eq!(v.screen().row(0).text(), "──│q");
    }

    #[test]
    fn rep_repeats_last_glyph() {
        let mut v = vt();
        feed(&mut v, b"a\x1b[3b");
        assert_eq!(v.screen().row(0).text(), "aaaa");
    }

    #[test]
    fn decrqm_reports_mode_state() {
        let mut v = vt();
        feed(&mut v, b"\x1b[?2004h\x1b[?2004$p");
        assert_eq!(v.take_responses(), b"\x1b[?2004;1$y");
        feed(&mut v, b"\x1b[?2004l\x1b[?2004$p");
        assert_eq!(v.take_responses(), b"\x1b[?2004;2$y");
    }

    #[test]
    fn sixel_payload_captured() {
        let mut v = vt();
        feed(&mut v, b"\x1bPq#0;2;0;0;0#0~~--~~\x1b\\");
        let g = v.graphics().expect("sixel held");
        assert_eq!(g.kind, GraphicsKind::Sixel);
        assert!(g.data.ends_with(b"~~--~~"));
        // 3 bands * 6px = 18px → 2 rows at 16px cells.
        assert_eq!(g.rows, 2);
    }

    #[test]
    fn malformed_sequences_do_not_corrupt_state() {
        let mut v = vt();
        feed(&mut v, b"\x1b[999;999H");
        // Cursor clamped to the grid.
        assert!(v.screen().cursor.row < 6);
        assert!(v.screen().cursor.col < 20);
        feed(&mut v, b"\x1b[H\x1b[;;;m\x1b]not-a-number;x\x07ok");
        assert_eq!(v.screen().row(0).text(), "ok");
    }

    #[test]
    fn insert_mode_shifts_existing_text() {
        let mut v = vt();
        feed(&mut v, b"abc\x1b[1;1H\x1b[4hX\x1b[4l");
        assert_eq!(v.screen().row(0).text(), "Xabc");
    }
}
