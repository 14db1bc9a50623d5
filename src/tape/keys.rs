//! Key-token parsing for `send-keys` and keybinding configuration.
//!
//! Tokens are separated by spaces or commas. A token is zero or more
//! modifiers (`ctrl`, `alt`, `shift`, `super`, `meta`) joined with `+`
//! and a final key: a single character or a special-key name (Enter,
//! Space, Tab, Escape, Backspace, Delete, arrows, Home/End, PageUp/Down,
//! F1–F12). `$PREFIX` expands to the configured leader chord.
//!
//! An unknown token rejects the whole operation — no partial key streams.

use anyhow::{bail, Result};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyEventState, KeyModifiers};

/// Parse a single chord like `ctrl+shift+p` or `Enter`.
pub fn parse_key_token(token: &str) -> Option<(KeyModifiers, KeyCode)> {
    let mut modifiers = KeyModifiers::NONE;
    let mut parts = token.split('+').peekable();
    let mut last = None;

    while let Some(part) = parts.next() {
        let is_last = parts.peek().is_none();
        if is_last {
            last = Some(part);
            break;
        }
        match part.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => modifiers |= KeyModifiers::CONTROL,
            "alt" => modifiers |= KeyModifiers::ALT,
            "shift" => modifiers |= KeyModifiers::SHIFT,
            "super" => modifiers |= KeyModifiers::SUPER,
            "meta" => modifiers |= KeyModifiers::META,
            _ => return None,
        }
    }

    let key = last?;
    let code = parse_key_name(key)?;
    Some((modifiers, code))
}

fn parse_key_name(name: &str) -> Option<KeyCode> {
    if name.chars().count() == 1 {
        return name.chars().next().map(KeyCode::Char);
    }
    match name.to_ascii_lowercase().as_str() {
        "enter" | "return" => Some(KeyCode::Enter),
        "space" => Some(KeyCode::Char(' ')),
        "tab" => Some(KeyCode::Tab),
        "escape" | "esc" => Some(KeyCode::Esc),
        "backspace" | "bspace" => Some(KeyCode::Backspace),
        "delete" | "del" => Some(KeyCode::Delete),
        "insert" => Some(KeyCode::Insert),
        "up" => Some(KeyCode::Up),
        "down" => Some(KeyCode::Down),
        "left" => Some(KeyCode::Left),
        "right" => Some(KeyCode::Right),
        "home" => Some(KeyCode::Home),
        "end" => Some(KeyCode::End),
        "pageup" | "pgup" => Some(KeyCode::PageUp),
        "pagedown" | "pgdn" => Some(KeyCode::PageDown),
        lower => {
            let fnum = lower.strip_prefix('f')?;
            let n: u8 = fnum.parse().ok()?;
            (1..=12).contains(&n).then_some(KeyCode::F(n))
        }
    }
}

fn event(modifiers: KeyModifiers, code: KeyCode) -> KeyEvent {
    KeyEvent {
        code,
        modifiers,
        kind: KeyEventKind::Press,
        state: KeyEventState::NONE,
    }
}

/// Parse a `send-keys` string into discrete key events.
///
/// `$PREFIX` expands to `leader`. Any unknown token fails the whole parse.
pub fn parse_keys(input: &str, leader: &str) -> Result<Vec<KeyEvent>> {
    let mut events = Vec::new();
    for token in input.split([' ', ',']).filter(|t| !t.is_empty()) {
        let token = if token == "$PREFIX" { leader } else { token };
        match parse_key_token(token) {
            Some((modifiers, code)) => events.push(event(modifiers, code)),
            None => bail!("unknown key token: {token}"),
        }
    }
    Ok(events)
}

/// Treat every character of `text` as an independent key event (`raw`
/// send-keys mode).
pub fn raw_key_events(text: &str) -> Vec<KeyEvent> {
    text.chars()
        .map(|c| match c {
            '\n' | '\r' => event(KeyModifiers::NONE, KeyCode::Enter),
            '\t' => event(KeyModifiers::NONE, KeyCode::Tab),
            c => event(KeyModifiers::NONE, KeyCode::Char(c)),
        })
        .collect()
}
