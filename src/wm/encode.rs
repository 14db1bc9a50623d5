//! Encoding host input events into PTY byte sequences.
//!
//! Terminal-mode keys, mouse events, and pastes are translated into the
//! bytes the child program expects, honoring the focused VT's modes:
//! application cursor keys flip arrows between CSI and SS3, SGR mouse mode
//! selects the extended encoding, and bracketed paste wraps pasted text.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

use crate::term::TermModes;

/// Encode a key event for the child PTY.
///
/// Returns an empty vector for keys that have no terminal representation
/// (bare modifiers, unhandled specials).
pub fn encode_key(key: &KeyEvent, modes: TermModes) -> Vec<u8> {
    let alt = key.modifiers.contains(KeyModifiers::ALT);
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let app_cursor = modes.contains(TermModes::APP_CURSOR);

    let mut out = Vec::new();
    if alt {
        out.push(0x1b);
    }

    match key.code {
        KeyCode::Char(c) => {
            if ctrl {
                if let Some(byte) = ctrl_byte(c) {
                    out.push(byte);
                    return out;
                }
            }
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
        KeyCode::Enter => out.push(b'\r'),
        KeyCode::Tab => out.push(b'\t'),
        KeyCode::BackTab => out.extend_from_slice(b"\x1b[Z"),
        KeyCode::Backspace => out.push(0x7f),
        KeyCode::Esc => out.push(0x1b),
        KeyCode::Up => out.extend_from_slice(arrow(app_cursor, b'A')),
        KeyCode::Down => out.extend_from_slice(arrow(app_cursor, b'B')),
        KeyCode::Right => out.extend_from_slice(arrow(app_cursor, b'C')),
        KeyCode::Left => out.extend_from_slice(arrow(app_cursor, b'D')),
        KeyCode::Home => out.extend_from_slice(arrow(app_cursor, b'H')),
        KeyCode::End => out.extend_from_slice(arrow(app_cursor, b'F')),
        KeyCode::PageUp => out.extend_from_slice(b"\x1b[5~"),
        KeyCode::PageDown => out.extend_from_slice(b"\x1b[6~"),
        KeyCode::Insert => out.extend_from_slice(b"\x1b[2~"),
        KeyCode::Delete => out.extend_from_slice(b"\x1b[3~"),
        KeyCode::F(n) => out.extend_from_slice(function_key(n).as_bytes()),
        _ => {
            out.clear();
        }
    }
    out
}

fn arrow(app_cursor: bool, letter: u8) -> &'static [u8] {
    match (app_cursor, letter) {
        (true, b'A') => b"\x1bOA",
        (true, b'B') => b"\x1bOB",
        (true, b'C') => b"\x1bOC",
        (true, b'D') => b"\x1bOD",
        (true, b'H') => b"\x1bOH",
        (true, b'F') => b"\x1bOF",
        (false, b'A') => b"\x1b[A",
        (false, b'B') => b"\x1b[B",
        (false, b'C') => b"\x1b[C",
        (false, b'D') => b"\x1b[D",
        (false, b'H') => b"\x1b[H",
        _ => b"\x1b[F",
    }
}

fn ctrl_byte(c: char) -> Option<u8> {
    let c = c.to_ascii_lowercase();
    match c {
        'a'..='z' => Some(c as u8 - b'a' + 1),
        ' ' | '@' => Some(0),
        '[' => Some(0x1b),
        '\\' => Some(0x1c),
        ']' => Some(0x1d),
        '^' => Some(0x1e),
        '_' => Some(0x1f),
        _ => None,
    }
}

fn function_key(n: u8) -> String {
    match n {
        1 => "\x1bOP".to_string(),
        2 => "\x1bOQ".to_string(),
        3 => "\x1bOR".to_string(),
        4 => "\x1bOS".to_string(),
        5 => "\x1b[15~".to_string(),
        6 => "\x1b[17~".to_string(),
        7 => "\x1b[18~".to_string(),
        8 => "\x1b[19~".to_string(),
        9 => "\x1b[20~".to_string(),
        10 => "\x1b[21~".to_string(),
        11 => "\x1b[23~".to_string(),
        12 => "\x1b[24~".to_string(),
        _ => String::new(),
    }
}

/// Encode a mouse event at window-interior coordinates `(col, row)`
/// (0-based) for the child, or `None` when the VT's modes don't report it.
pub fn encode_mouse(
    event: &MouseEvent,
    col: u16,
    row: u16,
    modes: TermModes,
) -> Option<Vec<u8>> {
    if !modes.mouse_enabled() {
        return None;
    }

    let (button, press) = match event.kind {
        MouseEventKind::Down(b) => (base_button(b), true),
        MouseEventKind::Up(b) => (base_button(b), false),
        MouseEventKind::Drag(b) => {
            if !modes.mouse_motion_enabled() {
                return None;
            }
            (base_button(b) + 32, true)
        }
        MouseEventKind::Moved => {
            if !modes.contains(TermModes::MOUSE_ANY) {
                return None;
            }
            (35, true)
        }
        MouseEventKind::ScrollUp => (64, true),
        MouseEventKind::ScrollDown => (65, true),
        _ => return None,
    };

    if modes.contains(TermModes::SGR_MOUSE) {
        let terminator = if press { 'M' } else { 'm' };
        return Some(
            format!("\x1b[<{button};{};{}{terminator}", col + 1, row + 1).into_bytes(),
        );
    }

    // Legacy X10 encoding: button and coordinates offset by 32, clamped to
    // a single byte.
    let encode = |v: u16| -> u8 { (v + 1 + 32).min(255) as u8 };
    let button_byte = if press { button } else { 3 } + 32;
    Some(vec![
        0x1b,
        b'[',
        b'M',
        button_byte as u8,
        encode(col),
        encode(row),
    ])
}

fn base_button(button: MouseButton) -> u16 {
    match button {
        MouseButton::Left => 0,
        MouseButton::Middle => 1,
        MouseButton::Right => 2,
    }
}

/// Encode pasted text, wrapping it in bracketed-paste markers when the
/// child opted in.
pub fn encode_paste(text: &str, modes: TermModes) -> Vec<u8> {
    if modes.contains(TermModes::BRACKETED_PASTE) {
        let mut out = Vec::with_capacity(text.len() + 12);
        out.extend_from_slice(b"\x1b[200~");
        out.extend_from_slice(text.as_bytes());
        out.extend_from_slice(b"\x1b[201~");
        out
    } else {
        text.as_bytes().to_vec()
    }
}

/// Focus gained/lost reports for children that enabled mode 1004.
pub fn encode_focus(gained: bool, modes: TermModes) -> Option<&'static [u8]> {
    if !modes.contains(TermModes::FOCUS_REPORT) {
        return None;
    }
    Some(if gained { b"\x1b[I" } else { b"\x1b[O" })
}
