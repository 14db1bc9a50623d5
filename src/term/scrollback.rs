//! Scrollback ring buffer.
//!
//! Rows scrolled off the top of the primary screen land here. Push is O(1);
//! once the ring is full every push evicts the oldest row. A cumulative
//! eviction counter lets external observers (the semantic-marker list,
//! absolute line indices) reconcile after the fact instead of being called
//! back on every trim.
//!
//! Only the primary screen owns a non-zero-capacity ring; the alternate
//! screen is constructed with capacity 0 and never retains history.

use super::cell::Row;

/// Default maximum scrollback lines.
pub const DEFAULT_SCROLLBACK_LINES: usize = 10_000;

/// Ring of rows scrolled off the top of the screen.
///
/// Logical index 0 is the **oldest** retained row and `len() - 1` the most
/// recent, matching absolute line numbering (`abs_line 0` = oldest line the
/// terminal has ever produced, minus trims).
#[derive(Debug, Clone)]
pub struct Scrollback {
    rows: Vec<Row>,
    /// Maximum rows retained; 0 disables the ring entirely.
    max_lines: usize,
    /// Physical index of the oldest row once the ring has wrapped.
    start: usize,
    /// Total rows evicted over the lifetime of this ring.
    total_trimmed: u64,
}

impl Scrollback {
    /// Create a ring retaining at most `max_lines` rows.
    pub fn new(max_lines: usize) -> Self {
        Self {
            rows: Vec::new(),
            max_lines,
            start: 0,
            total_trimmed: 0,
        }
    }

    /// Rows currently retained.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the ring holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Configured capacity.
    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// Total rows evicted since construction (monotonic).
    pub fn total_trimmed(&self) -> u64 {
        self.total_trimmed
    }

    /// Append a row, evicting the oldest if the ring is full.
    pub fn push(&mut self, row: Row) {
        if self.max_lines == 0 {
            return;
        }
        if self.rows.len() < self.max_lines {
            self.rows.push(row);
        } else {
            self.rows[self.start] = row;
            self.start = (self.start + 1) % self.max_lines;
            self.total_trimmed += 1;
        }
    }

    /// Row by logical index (0 = oldest). `None` past the end.
    pub fn get(&self, index: usize) -> Option<&Row> {
        if index >= self.rows.len() {
            return None;
        }
        Some(&self.rows[(self.start + index) % self.rows.len()])
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Row> + '_ {
        (0..self.rows.len()).map(move |i| self.get(i).expect("index in range"))
    }

    /// Drop all retained rows, counting them as trimmed.
    pub fn clear(&mut self) {
        self.total_trimmed += self.rows.len() as u64;
        self.rows.clear();
        self.start = 0;
    }
}
