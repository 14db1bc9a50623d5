//! Styled-text helpers shared by the renderer, the scrollback parser, and
//! the daemon's terminal-state serializer.
//!
//! Three concerns live here:
//! - building a minimal SGR prefix for a cell (full reset + re-apply, which
//!   is universally correct where incremental attribute removal is not),
//! - computing a per-rune SGR prefix map for a styled string, so overlays
//!   can repaint a selection without losing the underlying colors,
//! - clipping styled strings to a column width without ever splitting an
//!   escape sequence.

use unicode_width::UnicodeWidthChar;
use vte::ansi::{Color, NamedColor};

use super::cell::{Cell, CellAttrs, Row};

/// SGR full reset.
pub const RESET: &str = "\x1b[0m";

/// Build the SGR sequence that styles `cell`, starting from a reset.
///
/// Returns an empty string for a default-styled cell so unstyled runs cost
/// nothing.
pub fn cell_sgr(cell: &Cell) -> String {
    let mut codes = String::new();

    if cell.attrs.contains(CellAttrs::BOLD) {
        codes.push_str(";1");
    }
    if cell.attrs.contains(CellAttrs::FAINT) {
        codes.push_str(";2");
    }
    if cell.attrs.contains(CellAttrs::ITALIC) {
        codes.push_str(";3");
    }
    if cell.attrs.contains(CellAttrs::UNDERLINE) {
        codes.push_str(";4");
    }
    if cell.attrs.contains(CellAttrs::BLINK) {
        codes.push_str(";5");
    }
    if cell.attrs.contains(CellAttrs::INVERSE) {
        codes.push_str(";7");
    }
    if cell.attrs.contains(CellAttrs::CONCEAL) {
        codes.push_str(";8");
    }
    if cell.attrs.contains(CellAttrs::STRIKETHROUGH) {
        codes.push_str(";9");
    }
    push_color(&mut codes, cell.fg, true);
    push_color(&mut codes, cell.bg, false);

    if codes.is_empty() {
        String::new()
    } else {
        format!("\x1b[0{codes}m")
    }
}

fn push_color(out: &mut String, color: Color, foreground: bool) {
    match color {
        Color::Named(NamedColor::Foreground) if foreground => {}
        Color::Named(NamedColor::Background) if !foreground => {}
        Color::Named(named) => {
            // Named colors other than the defaults map onto the first 16
            // indexed entries.
            let index = named as usize;
            if index < 16 {
                let base = if foreground { 38 } else { 48 };
                out.push_str(&format!(";{base};5;{index}"));
            }
        }
        Color::Indexed(index) if index < 8 => {
            let base = if foreground { 30 } else { 40 };
            out.push_str(&format!(";{}", base + index as u16));
        }
        Color::Indexed(index) if index < 16 => {
            let base = if foreground { 90 } else { 100 };
            out.push_str(&format!(";{}", base + (index - 8) as u16));
        }
        Color::Indexed(index) => {
            let base = if foreground { 38 } else { 48 };
            out.push_str(&format!(";{base};5;{index}"));
        }
        Color::Spec(rgb) => {
            let base = if foreground { 38 } else { 48 };
            out.push_str(&format!(";{base};2;{};{};{}", rgb.r, rgb.g, rgb.b));
        }
    }
}

/// Render a row as a styled string: minimal SGR transitions, wide-char
/// spacers skipped, combining marks kept, trailing reset appended iff any
/// style was emitted.
pub fn row_to_ansi(row: &Row) -> String {
    let mut out = String::new();
    let mut current = String::new();
    let mut styled = false;

    for cell in row.cells() {
        if cell.attrs.contains(CellAttrs::WIDE_SPACER) {
            continue;
        }
        let sgr = cell_sgr(cell);
        if sgr != current {
            if sgr.is_empty() {
                out.push_str(RESET);
            } else {
                out.push_str(&sgr);
                styled = true;
            }
            current = sgr;
        }
        out.push_str(&cell.grapheme());
    }
    if styled && !current.is_empty() {
        out.push_str(RESET);
    }

    // Trailing unstyled blanks are noise for consumers that trim.
    let trimmed_len = out.trim_end_matches(' ').len();
    out.truncate(trimmed_len);
    out
}

/// For a string with embedded SGR sequences, the SGR prefix to emit before
/// each visible rune to reproduce its style in isolation.
///
/// The scrollback browser repaints selected runes over a different
/// background; this map lets it restore the original style for the rest of
/// the line without re-parsing.
pub fn rune_style_map(styled: &str) -> Vec<String> {
    let mut map = Vec::new();
    let mut active = String::new();
    let mut chars = styled.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            if let Some(seq) = consume_escape(&mut chars) {
                if seq.ends_with('m') {
                    if seq == "\x1b[0m" || seq == "\x1b[m" {
                        active.clear();
                    } else {
                        active.push_str(&seq);
                    }
                }
            }
            continue;
        }
        map.push(active.clone());
    }
    map
}

/// Clip a styled string to at most `max_width` display columns.
///
/// Escape sequences are copied through whole (they occupy no columns) and a
/// reset is appended if any styling was active at the cut.
pub fn clip_ansi(styled: &str, max_width: usize) -> String {
    let mut out = String::new();
    let mut width = 0usize;
    let mut styled_open = false;
    let mut chars = styled.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            if let Some(seq) = consume_escape(&mut chars) {
                if seq.ends_with('m') {
                    styled_open = !(seq == "\x1b[0m" || seq == "\x1b[m");
                }
                out.push_str(&seq);
            }
            continue;
        }
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + ch_width > max_width {
            break;
        }
        width += ch_width;
        out.push(ch);
    }

    if styled_open {
        out.push_str(RESET);
    }
    out
}

/// Display width of a styled string, ignoring escape sequences.
pub fn visible_width(styled: &str) -> usize {
    let mut width = 0usize;
    let mut chars = styled.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            consume_escape(&mut chars);
            continue;
        }
        width += UnicodeWidthChar::width(ch).unwrap_or(0);
    }
    width
}

/// Consume one escape sequence after a seen ESC, returning it with the ESC
/// prepended. Handles CSI (terminated by 0x40–0x7e) and OSC/DCS/APC strings
/// (terminated by BEL or ST).
fn consume_escape(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<String> {
    let mut seq = String::from('\x1b');
    let first = *chars.peek()?;
    seq.push(first);
    chars.next();

    match first {
        '[' => {
            for ch in chars.by_ref() {
                seq.push(ch);
                if ('\u{40}'..='\u{7e}').contains(&ch) {
                    break;
                }
            }
        }
        ']' | 'P' | '_' | '^' | 'X' => {
            let mut prev_esc = false;
            for ch in chars.by_ref() {
                seq.push(ch);
                if ch == '\x07' || (prev_esc && ch == '\\') {
                    break;
                }
                prev_esc = ch == '\x1b';
            }
        }
        _ => {}
    }
    Some(seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vte::ansi::Rgb;

    #[test]
    fn default_cell_has_no_sgr() {
        assert_eq!(cell_sgr(&Cell::default()), "");
    }

    #[test]
    fn styled_cell_sgr_resets_first() {
        let mut cell = Cell::default();
        cell.attrs = CellAttrs::BOLD;
        cell.fg = Color::Indexed(1);
        assert_eq!(cell_sgr(&cell), "\x1b[0;1;31m");
    }

    #[test]
    fn truecolor_and_256_encoding() {
        let mut cell = Cell::default();
        cell.fg = Color::Indexed(42);
        cell.bg = Color::Spec(Rgb { r: 1, g: 2, b: 3 });
        assert_eq!(cell_sgr(&cell), "\x1b[0;38;5;42;48;2;1;2;3m");
    }

    #[test]
    fn bright_indexed_uses_90_range() {
        let mut cell = Cell::default();
        cell.fg = Color::Indexed(9);
        assert_eq!(cell_sgr(&cell), "\x1b[0;91m");
    }

    #[test]
    fn row_to_ansi_emits_minimal_transitions() {
        let mut row = Row::new(6);
        row[0].glyph = 'a';
        row[1].glyph = 'b';
        row[1].fg = Color::Indexed(2);
        row[2].glyph = 'c';
        row[2].fg = Color::Indexed(2);
        row[3].glyph = 'd';

        let ansi = row_to_ansi(&row);
        assert_eq!(ansi, "a\x1b[0;32mbc\x1b[0md");
    }

    #[test]
    fn rune_style_map_tracks_state() {
        let map = rune_style_map("ab\x1b[31mcd\x1b[0me");
        assert_eq!(map.len(), 5);
        assert_eq!(map[0], "");
        assert_eq!(map[1], "");
        assert_eq!(map[2], "\x1b[31m");
        assert_eq!(map[3], "\x1b[31m");
        assert_eq!(map[4], "");
    }

    #[test]
    fn rune_style_map_accumulates_sequences() {
        let map = rune_style_map("\x1b[1m\x1b[34mx");
        assert_eq!(map[0], "\x1b[1m\x1b[34m");
    }

    #[test]
    fn clip_keeps_escapes_whole() {
        let clipped = clip_ansi("ab\x1b[31mcdef", 3);
        assert_eq!(clipped, "ab\x1b[31mc\x1b[0m");
    }

    #[test]
    fn clip_never_splits_wide_chars() {
        let clipped = clip_ansi("a世b", 2);
        // The wide char doesn't fit in the remaining single column.
        assert_eq!(clipped, "a");
    }

    #[test]
    fn clip_exact_fit_needs_no_reset() {
        assert_eq!(clip_ansi("abc", 5), "abc");
    }

    #[test]
    fn visible_width_ignores_escapes() {
        assert_eq!(visible_width("\x1b[31mab\x1b[0m世"), 4);
    }

    #[test]
    fn clip_passes_osc_through_whole() {
        let input = "\x1b]8;;https://x\x1b\\ab\x1b]8;;\x1b\\cd";
        let clipped = clip_ansi(input, 2);
        assert!(clipped.contains("\x1b]8;;https://x\x1b\\"));
        assert!(clipped.contains("ab"));
        assert!(!clipped.contains("cd"));
    }
}
