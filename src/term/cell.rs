//! Cell and row types for the terminal grid.
//!
//! A `Cell` is one character position: a base glyph, colors, and an
//! attribute bitset. Combining marks and hyperlinks are rare, so they live
//! in a lazily allocated `CellExtra` box and ordinary cells stay small.
//!
//! Wide characters occupy two cells: the base cell carries `WIDE` and the
//! following cell carries `WIDE_SPACER`. The pair is always written and
//! cleared together.

use std::fmt;

use bitflags::bitflags;
use unicode_width::UnicodeWidthChar;
use vte::ansi::{Color, NamedColor};

bitflags! {
    /// Per-cell SGR and structural attribute flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CellAttrs: u16 {
        const BOLD          = 1 << 0;
        const FAINT         = 1 << 1;
        const ITALIC        = 1 << 2;
        const UNDERLINE     = 1 << 3;
        const BLINK         = 1 << 4;
        const INVERSE       = 1 << 5;
        const CONCEAL       = 1 << 6;
        const STRIKETHROUGH = 1 << 7;
        /// Base cell of a double-width character.
        const WIDE          = 1 << 8;
        /// Placeholder behind a double-width character.
        const WIDE_SPACER   = 1 << 9;
    }
}

impl Default for CellAttrs {
    fn default() -> Self {
        Self::empty()
    }
}

/// OSC 8 hyperlink attached to a run of cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hyperlink {
    /// Optional id used to group multi-segment links.
    pub id: Option<String>,
    /// Target URI.
    pub uri: String,
}

impl fmt::Display for Hyperlink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Heap side-table for the uncommon cell features.
///
/// Allocated on first use; a plain cell carries `extra: None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellExtra {
    /// Combining marks / zero-width characters appended to the base glyph.
    pub zerowidth: Vec<char>,
    /// OSC 8 hyperlink, if this cell is part of one.
    pub hyperlink: Option<Hyperlink>,
}

/// One character position in the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// Base glyph.
    pub glyph: char,
    /// Foreground color (palette resolution deferred to the renderer).
    pub fg: Color,
    /// Background color.
    pub bg: Color,
    /// SGR attribute flags.
    pub attrs: CellAttrs,
    /// Combining marks and hyperlink, when present.
    pub extra: Option<Box<CellExtra>>,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            glyph: ' ',
            fg: Color::Named(NamedColor::Foreground),
            bg: Color::Named(NamedColor::Background),
            attrs: CellAttrs::empty(),
            extra: None,
        }
    }
}

impl Cell {
    /// Reset this cell to the template (used by erase operations, which
    /// keep the current background color per BCE semantics).
    pub fn reset(&mut self, template: &Cell) {
        self.glyph = ' ';
        self.fg = template.fg;
        self.bg = template.bg;
        self.attrs = CellAttrs::empty();
        self.extra = None;
    }

    /// Display width: 2 for wide base cells, 0 for spacers, else per
    /// `unicode-width`.
    pub fn width(&self) -> usize {
        if self.attrs.contains(CellAttrs::WIDE) {
            2
        } else if self.attrs.contains(CellAttrs::WIDE_SPACER) {
            0
        } else {
            UnicodeWidthChar::width(self.glyph).unwrap_or(1)
        }
    }

    /// Whether this cell renders as blank default-styled space.
    pub fn is_blank(&self) -> bool {
        self.glyph == ' '
            && self.attrs.is_empty()
            && self.fg == Color::Named(NamedColor::Foreground)
            && self.bg == Color::Named(NamedColor::Background)
            && self.extra.is_none()
    }

    /// Append a combining mark to this cell, allocating `extra` on demand.
    pub fn push_zerowidth(&mut self, ch: char) {
        self.extra
            .get_or_insert_with(Box::default)
            .zerowidth
            .push(ch);
    }

    /// Set or clear the hyperlink on this cell.
    pub fn set_hyperlink(&mut self, link: Option<Hyperlink>) {
        match link {
            Some(link) => {
                self.extra.get_or_insert_with(Box::default).hyperlink = Some(link);
            }
            None => {
                if let Some(extra) = self.extra.as_mut() {
                    extra.hyperlink = None;
                    if extra.zerowidth.is_empty() {
                        self.extra = None;
                    }
                }
            }
        }
    }

    /// Hyperlink on this cell, if any.
    pub fn hyperlink(&self) -> Option<&Hyperlink> {
        self.extra.as_ref().and_then(|e| e.hyperlink.as_ref())
    }

    /// The glyph plus any combining marks, as a string.
    pub fn grapheme(&self) -> String {
        let mut s = String::new();
        s.push(self.glyph);
        if let Some(extra) = &self.extra {
            s.extend(extra.zerowidth.iter());
        }
        s
    }
}

/// One grid row: a fixed-width run of cells plus a soft-wrap marker.
///
/// `soft_wrapped` records that the line continued onto the next row via
/// autowrap rather than an explicit newline; the scrollback parser uses it
/// to rejoin logical lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    cells: Vec<Cell>,
    /// True when this row flowed into the next one via autowrap.
    pub soft_wrapped: bool,
}

impl Row {
    /// Create a blank row of `cols` default cells.
    pub fn new(cols: usize) -> Self {
        Self {
            cells: vec![Cell::default(); cols],
            soft_wrapped: false,
        }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the row has zero cells (only after a degenerate resize).
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Immutable cell access; `None` past the end.
    pub fn get(&self, col: usize) -> Option<&Cell> {
        self.cells.get(col)
    }

    /// Mutable cell access; `None` past the end.
    pub fn get_mut(&mut self, col: usize) -> Option<&mut Cell> {
        self.cells.get_mut(col)
    }

    /// All cells, left to right.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Mutable view of all cells.
    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// Reset every cell to the template and clear the wrap marker.
    pub fn clear(&mut self, template: &Cell) {
        for cell in &mut self.cells {
            cell.reset(template);
        }
        self.soft_wrapped = false;
    }

    /// Grow or shrink to `cols`, padding with default cells.
    pub fn resize(&mut self, cols: usize) {
        self.cells.resize(cols, Cell::default());
    }

    /// Plain text of the row with trailing blanks trimmed.
    ///
    /// Wide-char spacers are skipped; combining marks are kept attached to
    /// their base glyph.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for cell in &self.cells {
            if cell.attrs.contains(CellAttrs::WIDE_SPACER) {
                continue;
            }
            out.push_str(&cell.grapheme());
        }
        out.truncate(out.trim_end().len());
        out
    }
}

impl std::ops::Index<usize> for Row {
    type Output = Cell;

    fn index(&self, col: usize) -> &Cell {
        &self.cells[col]
    }
}

impl std::ops::IndexMut<usize> for Row {
    fn index_mut(&mut self, col: usize) -> &mut Cell {
        &mut self.cells[col]
    }
}
