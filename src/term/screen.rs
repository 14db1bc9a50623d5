//! Screen buffer: the W×H cell grid with cursor, tab stops, and scroll
//! region.
//!
//! Every VT owns two of these — primary and alternate — with exactly one
//! active. The primary buffer's scrollback ring receives rows that scroll
//! off the top when the scroll region covers the full screen; the alternate
//! buffer is constructed with a zero-capacity ring and never archives.
//!
//! Autowrap is deferred: printing in the last column sets `wrap_pending`
//! instead of moving the cursor, and the *next* print wraps first. Shells
//! that count characters depend on this ordering.

use super::cell::{Cell, CellAttrs, Row};
use super::modes::CursorShape;
use super::scrollback::Scrollback;

/// Cursor position, pending-wrap state, and the SGR template applied to
/// newly written cells.
#[derive(Debug, Clone)]
pub struct Cursor {
    /// Row, 0-based from the top of the visible screen.
    pub row: usize,
    /// Column, 0-based.
    pub col: usize,
    /// Template cell: colors and attrs for the next write.
    pub template: Cell,
    /// Deferred autowrap armed by a print in the last column.
    pub wrap_pending: bool,
    /// DECTCEM visibility (mirrored from the mode bit for snapshots).
    pub visible: bool,
    /// DECSCUSR shape.
    pub shape: CursorShape,
    /// Whether the cursor blinks.
    pub blink: bool,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            row: 0,
            col: 0,
            template: Cell::default(),
            wrap_pending: false,
            visible: true,
            shape: CursorShape::Block,
            blink: true,
        }
    }
}

/// Erase extents for ED / EL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseMode {
    /// From the cursor to the end.
    Below,
    /// From the start to the cursor (inclusive).
    Above,
    /// Everything.
    All,
}

/// One of the VT's two grids.
#[derive(Debug, Clone)]
pub struct ScreenBuffer {
    rows: Vec<Row>,
    cols: usize,
    lines: usize,
    /// Live cursor.
    pub cursor: Cursor,
    saved_cursor: Option<Cursor>,
    tab_stops: Vec<bool>,
    /// Scroll region top, inclusive.
    scroll_top: usize,
    /// Scroll region bottom, inclusive.
    scroll_bottom: usize,
    scrollback: Scrollback,
}

impl ScreenBuffer {
    /// Create a grid of `lines` × `cols` with the given scrollback capacity
    /// (0 for the alternate screen).
    pub fn new(lines: usize, cols: usize, scrollback_lines: usize) -> Self {
        let lines = lines.max(1);
        let cols = cols.max(1);
        Self {
            rows: (0..lines).map(|_| Row::new(cols)).collect(),
            cols,
            lines,
            cursor: Cursor::default(),
            saved_cursor: None,
            tab_stops: default_tab_stops(cols),
            scroll_top: 0,
            scroll_bottom: lines - 1,
            scrollback: Scrollback::new(scrollback_lines),
        }
    }

    /// Visible line count.
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Column count.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Row by visible index (0 = top).
    pub fn row(&self, line: usize) -> &Row {
        &self.rows[line]
    }

    /// Mutable row by visible index.
    pub fn row_mut(&mut self, line: usize) -> &mut Row {
        &mut self.rows[line]
    }

    /// All visible rows, top to bottom.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// The scrollback ring.
    pub fn scrollback(&self) -> &Scrollback {
        &self.scrollback
    }

    /// Mutable scrollback (ED 3 clears it through here).
    pub fn scrollback_mut(&mut self) -> &mut Scrollback {
        &mut self.scrollback
    }

    /// Scroll region as an inclusive `(top, bottom)` pair.
    pub fn scroll_region(&self) -> (usize, usize) {
        (self.scroll_top, self.scroll_bottom)
    }

    /// Whether the scroll region covers the whole screen.
    fn full_region(&self) -> bool {
        self.scroll_top == 0 && self.scroll_bottom == self.lines - 1
    }

    // ── Writing ───────────────────────────────────────────────────────────

    /// Print one glyph of display width `width` (1 or 2) at the cursor.
    ///
    /// Handles deferred autowrap, insert mode, wide-char pair integrity,
    /// and cursor advance. Zero-width characters never reach here — the
    /// handler attaches them to the previous base cell.
    pub fn put_char(&mut self, ch: char, width: usize, autowrap: bool, insert: bool) {
        if self.cursor.wrap_pending {
            self.cursor.wrap_pending = false;
            if autowrap {
                self.rows[self.cursor.row].soft_wrapped = true;
                self.linefeed();
                self.cursor.col = 0;
            }
        }

        // A wide char that doesn't fit in the remaining columns wraps early
        // (never split across rows) or, without autowrap, is dropped.
        if width == 2 && self.cursor.col + 1 >= self.cols {
            if !autowrap {
                return;
            }
            self.rows[self.cursor.row].soft_wrapped = true;
            self.linefeed();
            self.cursor.col = 0;
        }

        if insert {
            self.insert_blank(width);
        }

        let row = self.cursor.row;
        let col = self.cursor.col;
        self.clear_wide_pair(row, col);

        let template = self.cursor.template.clone();
        let cell = &mut self.rows[row][col];
        cell.glyph = ch;
        cell.fg = template.fg;
        cell.bg = template.bg;
        cell.attrs = template.attrs & !(CellAttrs::WIDE | CellAttrs::WIDE_SPACER);
        cell.extra = template
            .extra
            .as_ref()
            .filter(|e| e.hyperlink.is_some())
            .map(|e| {
                Box::new(super::cell::CellExtra {
                    zerowidth: Vec::new(),
                    hyperlink: e.hyperlink.clone(),
                })
            });

        if width == 2 {
            self.rows[row][col].attrs.insert(CellAttrs::WIDE);
            self.clear_wide_pair(row, col + 1);
            let spacer = &mut self.rows[row][col + 1];
            spacer.glyph = ' ';
            spacer.fg = template.fg;
            spacer.bg = template.bg;
            spacer.attrs = CellAttrs::WIDE_SPACER;
            spacer.extra = None;
        }

        let next = col + width;
        if next >= self.cols {
            self.cursor.col = self.cols - 1;
            self.cursor.wrap_pending = true;
        } else {
            self.cursor.col = next;
        }
    }

    /// Break up a wide-char pair overlapping `(row, col)` so neither half
    /// is left dangling after an overwrite.
    fn clear_wide_pair(&mut self, row: usize, col: usize) {
        if col >= self.cols {
            return;
        }
        let attrs = self.rows[row][col].attrs;
        if attrs.contains(CellAttrs::WIDE_SPACER) && col > 0 {
            let base = &mut self.rows[row][col - 1];
            base.glyph = ' ';
            base.attrs.remove(CellAttrs::WIDE);
        }
        if attrs.contains(CellAttrs::WIDE) && col + 1 < self.cols {
            let spacer = &mut self.rows[row][col + 1];
            spacer.glyph = ' ';
            spacer.attrs.remove(CellAttrs::WIDE_SPACER);
        }
    }

    // ── Cursor motion ─────────────────────────────────────────────────────

    /// Absolute cursor move. With origin mode the row is relative to the
    /// scroll region and clamped inside it.
    pub fn goto(&mut self, row: usize, col: usize, origin: bool) {
        self.cursor.wrap_pending = false;
        if origin {
            self.cursor.row = (self.scroll_top + row).min(self.scroll_bottom);
        } else {
            self.cursor.row = row.min(self.lines - 1);
        }
        self.cursor.col = col.min(self.cols - 1);
    }

    /// Move to a column on the current row.
    pub fn goto_col(&mut self, col: usize) {
        self.cursor.wrap_pending = false;
        self.cursor.col = col.min(self.cols - 1);
    }

    /// Move to a row keeping the column.
    pub fn goto_row(&mut self, row: usize, origin: bool) {
        self.cursor.wrap_pending = false;
        if origin {
            self.cursor.row = (self.scroll_top + row).min(self.scroll_bottom);
        } else {
            self.cursor.row = row.min(self.lines - 1);
        }
    }

    /// CUU — up `n`, stopping at the scroll region top when inside it.
    pub fn move_up(&mut self, n: usize) {
        self.cursor.wrap_pending = false;
        let floor = if self.cursor.row >= self.scroll_top {
            self.scroll_top
        } else {
            0
        };
        self.cursor.row = self.cursor.row.saturating_sub(n).max(floor);
    }

    /// CUD — down `n`, stopping at the scroll region bottom when inside it.
    pub fn move_down(&mut self, n: usize) {
        self.cursor.wrap_pending = false;
        let ceil = if self.cursor.row <= self.scroll_bottom {
            self.scroll_bottom
        } else {
            self.lines - 1
        };
        self.cursor.row = (self.cursor.row + n).min(ceil);
    }

    /// CUF — right `n`.
    pub fn move_forward(&mut self, n: usize) {
        self.cursor.wrap_pending = false;
        self.cursor.col = (self.cursor.col + n).min(self.cols - 1);
    }

    /// CUB — left `n`.
    pub fn move_backward(&mut self, n: usize) {
        self.cursor.wrap_pending = false;
        self.cursor.col = self.cursor.col.saturating_sub(n);
    }

    /// LF — down one line, scrolling the region when at its bottom.
    pub fn linefeed(&mut self) {
        self.cursor.wrap_pending = false;
        if self.cursor.row == self.scroll_bottom {
            self.scroll_up(1);
        } else if self.cursor.row + 1 < self.lines {
            self.cursor.row += 1;
        }
    }

    /// RI — up one line, scrolling the region down when at its top.
    pub fn reverse_index(&mut self) {
        self.cursor.wrap_pending = false;
        if self.cursor.row == self.scroll_top {
            self.scroll_down(1);
        } else if self.cursor.row > 0 {
            self.cursor.row -= 1;
        }
    }

    /// CR — column zero.
    pub fn carriage_return(&mut self) {
        self.cursor.wrap_pending = false;
        self.cursor.col = 0;
    }

    /// BS — one column left, clearing any pending wrap.
    pub fn backspace(&mut self) {
        self.cursor.wrap_pending = false;
        self.cursor.col = self.cursor.col.saturating_sub(1);
    }

    // ── Tab stops ─────────────────────────────────────────────────────────

    /// HT — advance to the next tab stop, `count` times.
    pub fn advance_tab(&mut self, count: u16) {
        self.cursor.wrap_pending = false;
        for _ in 0..count {
            let mut col = self.cursor.col + 1;
            while col < self.cols - 1 && !self.tab_stops[col] {
                col += 1;
            }
            self.cursor.col = col.min(self.cols - 1);
        }
    }

    /// CBT — move back to the previous tab stop, `count` times.
    pub fn backward_tab(&mut self, count: u16) {
        self.cursor.wrap_pending = false;
        for _ in 0..count {
            let mut col = self.cursor.col;
            while col > 0 {
                col -= 1;
                if self.tab_stops[col] {
                    break;
                }
            }
            self.cursor.col = col;
        }
    }

    /// HTS — set a tab stop at the cursor column.
    pub fn set_tab_stop(&mut self) {
        self.tab_stops[self.cursor.col] = true;
    }

    /// TBC — clear the tab stop at the cursor (`all` clears every stop).
    pub fn clear_tab_stops(&mut self, all: bool) {
        if all {
            self.tab_stops.iter_mut().for_each(|s| *s = false);
        } else {
            self.tab_stops[self.cursor.col] = false;
        }
    }

    // ── Save / restore ────────────────────────────────────────────────────

    /// DECSC.
    pub fn save_cursor(&mut self) {
        self.saved_cursor = Some(self.cursor.clone());
    }

    /// DECRC — restores the save, or homes the cursor if none exists.
    pub fn restore_cursor(&mut self) {
        match self.saved_cursor.take() {
            Some(saved) => {
                self.cursor = saved;
                self.cursor.row = self.cursor.row.min(self.lines - 1);
                self.cursor.col = self.cursor.col.min(self.cols - 1);
                self.saved_cursor = Some(self.cursor.clone());
            }
            None => {
                self.cursor.row = 0;
                self.cursor.col = 0;
                self.cursor.template = Cell::default();
            }
        }
    }

    // ── Erase / edit ──────────────────────────────────────────────────────

    /// ED 0/1/2.
    pub fn erase_display(&mut self, mode: EraseMode) {
        let template = self.cursor.template.clone();
        match mode {
            EraseMode::Below => {
                self.erase_line(EraseMode::Below);
                for line in self.cursor.row + 1..self.lines {
                    self.rows[line].clear(&template);
                }
            }
            EraseMode::Above => {
                self.erase_line(EraseMode::Above);
                for line in 0..self.cursor.row {
                    self.rows[line].clear(&template);
                }
            }
            EraseMode::All => {
                for row in &mut self.rows {
                    row.clear(&template);
                }
            }
        }
    }

    /// EL 0/1/2.
    pub fn erase_line(&mut self, mode: EraseMode) {
        let template = self.cursor.template.clone();
        let row = self.cursor.row;
        let col = self.cursor.col.min(self.cols - 1);
        match mode {
            EraseMode::Below => {
                for c in col..self.cols {
                    self.rows[row][c].reset(&template);
                }
                self.rows[row].soft_wrapped = false;
            }
            EraseMode::Above => {
                for c in 0..=col {
                    self.rows[row][c].reset(&template);
                }
            }
            EraseMode::All => {
                self.rows[row].clear(&template);
            }
        }
    }

    /// ECH — reset `count` cells from the cursor without shifting.
    pub fn erase_chars(&mut self, count: usize) {
        let template = self.cursor.template.clone();
        let row = self.cursor.row;
        let end = (self.cursor.col + count.max(1)).min(self.cols);
        for c in self.cursor.col..end {
            self.rows[row][c].reset(&template);
        }
    }

    /// ICH — insert `count` blanks at the cursor, shifting right.
    pub fn insert_blank(&mut self, count: usize) {
        let row = self.cursor.row;
        let col = self.cursor.col;
        if col >= self.cols {
            return;
        }
        let count = count.max(1).min(self.cols - col);
        let template = self.cursor.template.clone();
        let cells = self.rows[row].cells_mut();
        for i in (col + count..cells.len()).rev() {
            cells.swap(i, i - count);
        }
        for cell in &mut cells[col..col + count] {
            cell.reset(&template);
        }
    }

    /// DCH — delete `count` cells at the cursor, shifting left.
    pub fn delete_chars(&mut self, count: usize) {
        let row = self.cursor.row;
        let col = self.cursor.col;
        if col >= self.cols {
            return;
        }
        let count = count.max(1).min(self.cols - col);
        let template = self.cursor.template.clone();
        let cols = self.cols;
        let cells = self.rows[row].cells_mut();
        for i in col..cols - count {
            cells.swap(i, i + count);
        }
        for cell in &mut cells[cols - count..] {
            cell.reset(&template);
        }
    }

    /// IL — insert blank lines at the cursor (inside the scroll region).
    pub fn insert_lines(&mut self, count: usize) {
        if self.cursor.row < self.scroll_top || self.cursor.row > self.scroll_bottom {
            return;
        }
        let count = count.max(1).min(self.scroll_bottom - self.cursor.row + 1);
        let template = self.cursor.template.clone();
        for _ in 0..count {
            self.rows.remove(self.scroll_bottom);
            let mut blank = Row::new(self.cols);
            blank.clear(&template);
            self.rows.insert(self.cursor.row, blank);
        }
        self.cursor.col = 0;
        self.cursor.wrap_pending = false;
    }

    /// DL — delete lines at the cursor (inside the scroll region).
    pub fn delete_lines(&mut self, count: usize) {
        if self.cursor.row < self.scroll_top || self.cursor.row > self.scroll_bottom {
            return;
        }
        let count = count.max(1).min(self.scroll_bottom - self.cursor.row + 1);
        let template = self.cursor.template.clone();
        for _ in 0..count {
            self.rows.remove(self.cursor.row);
            let mut blank = Row::new(self.cols);
            blank.clear(&template);
            self.rows.insert(self.scroll_bottom, blank);
        }
        self.cursor.col = 0;
        self.cursor.wrap_pending = false;
    }

    // ── Scrolling ─────────────────────────────────────────────────────────

    /// SU — shift the scroll region up `n` lines.
    ///
    /// Rows leaving the top are archived iff the region covers the full
    /// screen (and this buffer has a scrollback ring).
    pub fn scroll_up(&mut self, n: usize) {
        let n = n.max(1).min(self.scroll_bottom - self.scroll_top + 1);
        let archive = self.full_region();
        for _ in 0..n {
            let row = self.rows.remove(self.scroll_top);
            if archive {
                self.scrollback.push(row);
            }
            let mut blank = Row::new(self.cols);
            blank.clear(&self.cursor.template);
            self.rows.insert(self.scroll_bottom, blank);
        }
    }

    /// SD — shift the scroll region down `n` lines.
    pub fn scroll_down(&mut self, n: usize) {
        let n = n.max(1).min(self.scroll_bottom - self.scroll_top + 1);
        for _ in 0..n {
            self.rows.remove(self.scroll_bottom);
            let mut blank = Row::new(self.cols);
            blank.clear(&self.cursor.template);
            self.rows.insert(self.scroll_top, blank);
        }
    }

    /// DECSTBM — set the scroll region (0-based, inclusive) and home the
    /// cursor. Degenerate regions reset to full screen.
    pub fn set_scroll_region(&mut self, top: usize, bottom: Option<usize>) {
        let bottom = bottom.unwrap_or(self.lines - 1).min(self.lines - 1);
        if top < bottom {
            self.scroll_top = top;
            self.scroll_bottom = bottom;
        } else {
            self.scroll_top = 0;
            self.scroll_bottom = self.lines - 1;
        }
        self.cursor.row = 0;
        self.cursor.col = 0;
        self.cursor.wrap_pending = false;
    }

    // ── Whole-screen operations ───────────────────────────────────────────

    /// Clear every cell to the default template (alt-screen entry, RIS).
    pub fn clear_all(&mut self) {
        let template = Cell::default();
        for row in &mut self.rows {
            row.clear(&template);
        }
    }

    /// DECALN — fill the screen with `E` for alignment checks.
    pub fn decaln(&mut self) {
        for row in &mut self.rows {
            for cell in row.cells_mut() {
                cell.reset(&Cell::default());
                cell.glyph = 'E';
            }
        }
    }

    /// Resize the grid. No reflow: rows are truncated or padded in place.
    ///
    /// When shrinking vertically, rows pushed off the top are archived so
    /// content above the cursor survives; growing appends blank rows at the
    /// bottom. The scroll region resets to full screen.
    pub fn resize(&mut self, lines: usize, cols: usize) {
        let lines = lines.max(1);
        let cols = cols.max(1);

        if lines < self.lines {
            // Drop from the top first so the cursor line stays visible.
            let mut excess = self.lines - lines;
            while excess > 0 && self.cursor.row > 0 {
                let row = self.rows.remove(0);
                self.scrollback.push(row);
                self.cursor.row -= 1;
                excess -= 1;
            }
            // Remainder comes off the bottom (below the cursor).
            self.rows.truncate(lines);
        } else {
            for _ in self.lines..lines {
                self.rows.push(Row::new(cols));
            }
        }

        for row in &mut self.rows {
            row.resize(cols);
        }

        self.lines = lines;
        self.cols = cols;
        self.scroll_top = 0;
        self.scroll_bottom = lines - 1;
        self.tab_stops = default_tab_stops(cols);
        self.cursor.row = self.cursor.row.min(lines - 1);
        self.cursor.col = self.cursor.col.min(cols - 1);
        self.cursor.wrap_pending = false;
    }

    /// Plain text of the visible screen, one string per row.
    pub fn visible_text(&self) -> Vec<String> {
        self.rows.iter().map(Row::text).collect()
    }
}

fn default_tab_stops(cols: usize) -> Vec<bool> {
    (0..cols).map(|c| c % 8 == 0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen() -> ScreenBuffer {
        ScreenBuffer::new(5, 10, 100)
    }

    fn type_text(s: &mut ScreenBuffer, text: &str) {
        for ch in text.chars() {
            s.put_char(ch, 1, true, false);
        }
    }

    #[test]
    fn put_char_advances_cursor() {
        let mut s = screen();
        type_text(&mut s, "hi");
        assert_eq!(s.row(0).text(), "hi");
        assert_eq!(s.cursor.col, 2);
    }

    #[test]
    fn wrap_is_deferred_until_next_print() {
        let mut s = screen();
        type_text(&mut s, "0123456789");
        // Cursor parked in the last column, not yet wrapped.
        assert_eq!(s.cursor.row, 0);
        assert_eq!(s.cursor.col, 9);
        assert!(s.cursor.wrap_pending);

        s.put_char('x', 1, true, false);
        assert_eq!(s.cursor.row, 1);
        assert_eq!(s.cursor.col, 1);
        assert_eq!(s.row(1).text(), "x");
        assert!(s.row(0).soft_wrapped);
    }

    #[test]
    fn autowrap_disabled_overwrites_last_column() {
        let mut s = screen();
        type_text(&mut s, "0123456789");
        s.put_char('x', 1, false, false);
        assert_eq!(s.cursor.row, 0);
        assert_eq!(s.row(0).text(), "012345678x");
    }

    #[test]
    fn wide_char_writes_pair() {
        let mut s = screen();
        s.put_char('世', 2, true, false);
        assert!(s.row(0)[0].attrs.contains(CellAttrs::WIDE));
        assert!(s.row(0)[1].attrs.contains(CellAttrs::WIDE_SPACER));
        assert_eq!(s.cursor.col, 2);
    }

    #[test]
    fn wide_char_never_splits_at_edge() {
        let mut s = screen();
        type_text(&mut s, "012345678");
        assert_eq!(s.cursor.col, 9);
        s.put_char('世', 2, true, false);
        assert_eq!(s.cursor.row, 1);
        assert!(s.row(1)[0].attrs.contains(CellAttrs::WIDE));
    }

    #[test]
    fn overwriting_spacer_clears_wide_base() {
        let mut s = screen();
        s.put_char('世', 2, true, false);
        s.goto(0, 1, false);
        s.put_char('x', 1, true, false);
        assert_eq!(s.row(0)[0].glyph, ' ');
        assert!(!s.row(0)[0].attrs.contains(CellAttrs::WIDE));
        assert_eq!(s.row(0)[1].glyph, 'x');
    }

    #[test]
    fn linefeed_at_region_bottom_archives() {
        let mut s = screen();
        type_text(&mut s, "top");
        s.goto(4, 0, false);
        s.linefeed();
        assert_eq!(s.scrollback().len(), 1);
        assert_eq!(s.scrollback().get(0).unwrap().text(), "top");
    }

    #[test]
    fn restricted_region_never_archives() {
        let mut s = screen();
        type_text(&mut s, "top");
        s.set_scroll_region(1, Some(3));
        s.goto(3, 0, false);
        s.linefeed();
        assert_eq!(s.scrollback().len(), 0);
        // Row 0 is outside the region and untouched.
        assert_eq!(s.row(0).text(), "top");
    }

    #[test]
    fn scroll_region_shifts_only_region_rows() {
        let mut s = screen();
        for (i, t) in ["aa", "bb", "cc", "dd", "ee"].iter().enumerate() {
            s.goto(i, 0, false);
            type_text(&mut s, t);
        }
        s.set_scroll_region(1, Some(3));
        s.scroll_up(1);
        assert_eq!(s.row(0).text(), "aa");
        assert_eq!(s.row(1).text(), "cc");
        assert_eq!(s.row(2).text(), "dd");
        assert_eq!(s.row(3).text(), "");
        assert_eq!(s.row(4).text(), "ee");
    }

    #[test]
    fn reverse_index_at_top_scrolls_down() {
        let mut s = screen();
        type_text(&mut s, "first");
        s.goto(0, 0, false);
        s.reverse_index();
        assert_eq!(s.row(0).text(), "");
        assert_eq!(s.row(1).text(), "first");
    }

    #[test]
    fn erase_display_below_from_cursor() {
        let mut s = screen();
        for i in 0..5 {
            s.goto(i, 0, false);
            type_text(&mut s, "xxxxxxxxxx");
        }
        s.goto(2, 5, false);
        s.erase_display(EraseMode::Below);
        assert_eq!(s.row(1).text(), "xxxxxxxxxx");
        assert_eq!(s.row(2).text(), "xxxxx");
        assert_eq!(s.row(3).text(), "");
    }

    #[test]
    fn insert_and_delete_chars() {
        let mut s = screen();
        type_text(&mut s, "abcde");
        s.goto(0, 1, false);
        s.insert_blank(2);
        assert_eq!(s.row(0).text(), "a  bcde");

        s.goto(0, 1, false);
        s.delete_chars(2);
        assert_eq!(s.row(0).text(), "abcde");
    }

    #[test]
    fn insert_and_delete_lines_respect_region() {
        let mut s = screen();
        for (i, t) in ["aa", "bb", "cc", "dd", "ee"].iter().enumerate() {
            s.goto(i, 0, false);
            type_text(&mut s, t);
        }
        s.set_scroll_region(1, Some(3));
        s.goto(1, 0, false);
        s.insert_lines(1);
        assert_eq!(s.row(1).text(), "");
        assert_eq!(s.row(2).text(), "bb");
        assert_eq!(s.row(3).text(), "cc");
        assert_eq!(s.row(4).text(), "ee");

        s.goto(1, 0, false);
        s.delete_lines(1);
        assert_eq!(s.row(1).text(), "bb");
        assert_eq!(s.row(3).text(), "");
    }

    #[test]
    fn tab_stops_every_eight() {
        let mut s = ScreenBuffer::new(5, 20, 0);
        s.advance_tab(1);
        assert_eq!(s.cursor.col, 8);
        s.advance_tab(1);
        assert_eq!(s.cursor.col, 16);
        s.backward_tab(1);
        assert_eq!(s.cursor.col, 8);
    }

    #[test]
    fn save_restore_cursor_keeps_template() {
        let mut s = screen();
        s.goto(2, 3, false);
        s.cursor.template.attrs.insert(CellAttrs::BOLD);
        s.save_cursor();

        s.goto(0, 0, false);
        s.cursor.template.attrs = CellAttrs::empty();
        s.restore_cursor();

        assert_eq!((s.cursor.row, s.cursor.col), (2, 3));
        assert!(s.cursor.template.attrs.contains(CellAttrs::BOLD));
    }

    #[test]
    fn origin_mode_addresses_relative_to_region() {
        let mut s = screen();
        s.set_scroll_region(1, Some(3));
        s.goto(0, 0, true);
        assert_eq!(s.cursor.row, 1);
        s.goto(10, 0, true);
        assert_eq!(s.cursor.row, 3);
    }

    #[test]
    fn resize_shrink_archives_rows_above_cursor() {
        let mut s = screen();
        for i in 0..5 {
            s.goto(i, 0, false);
            type_text(&mut s, &format!("line{i}"));
        }
        // Cursor on the last row; shrink to 3 lines.
        s.resize(3, 10);
        assert_eq!(s.lines(), 3);
        assert_eq!(s.scrollback().len(), 2);
        assert_eq!(s.row(2).text(), "line4");
        assert_eq!(s.cursor.row, 2);
    }

    #[test]
    fn resize_updates_captured_width() {
        let mut s = screen();
        s.resize(5, 14);
        assert_eq!(s.cols(), 14);
        assert_eq!(s.row(0).len(), 14);
    }

    #[test]
    fn backspace_clears_pending_wrap() {
        let mut s = screen();
        type_text(&mut s, "0123456789");
        assert!(s.cursor.wrap_pending);
        s.backspace();
        assert!(!s.cursor.wrap_pending);
        assert_eq!(s.cursor.col, 8);
    }
}
