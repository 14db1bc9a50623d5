//! Shell-integration semantic markers (OSC 133).
//!
//! Shells with prompt integration emit `OSC 133 ; A/B/C/D` around each
//! command: `A` prompt start, `B` command input start, `C` command executed
//! (output begins), `D` command finished with an exit code. The emulator
//! records each marker at an absolute line position so the scrollback
//! parser can cut history into discrete command blocks.
//!
//! Absolute lines count from the oldest line the terminal has produced:
//! `abs_line = scrollback_len + cursor_row` at emission time. When the
//! scrollback ring trims `n` lines, every marker shifts down by `n` and
//! markers that fall below zero are dropped.

use serde::{Deserialize, Serialize};

/// Which OSC 133 marker was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerKind {
    /// Prompt start.
    PromptStart,
    /// Command input start.
    CommandStart,
    /// Command executed; output begins.
    CommandExecuted,
    /// Command finished.
    CommandFinished,
}

/// One recorded shell-integration marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticMarker {
    /// Marker kind.
    pub kind: MarkerKind,
    /// Absolute line at emission (scrollback length + cursor row).
    pub abs_line: i64,
    /// Cursor column at emission.
    pub col: usize,
    /// Exit code carried by `D` markers.
    pub exit_code: Option<i32>,
    /// Command text captured when `C` fired (text between `B` and `C`).
    pub captured_text: Option<String>,
}

/// Ordered marker list with trim reconciliation.
///
/// The list does not watch the scrollback ring; instead it remembers the
/// ring's cumulative trim counter from its last sync and applies the delta
/// lazily. Callers sync before reading and after each write burst.
#[derive(Debug, Clone, Default)]
pub struct MarkerList {
    markers: Vec<SemanticMarker>,
    trim_seen: u64,
}

impl MarkerList {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a marker at the given absolute position.
    pub fn record(&mut self, marker: SemanticMarker) {
        self.markers.push(marker);
    }

    /// All markers, oldest first.
    pub fn markers(&self) -> &[SemanticMarker] {
        &self.markers
    }

    /// Number of recorded markers.
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Whether no markers are recorded.
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Most recent marker of `kind`, if any.
    pub fn last_of(&self, kind: MarkerKind) -> Option<&SemanticMarker> {
        self.markers.iter().rev().find(|m| m.kind == kind)
    }

    /// Mutable access to the most recent marker of `kind`.
    pub fn last_of_mut(&mut self, kind: MarkerKind) -> Option<&mut SemanticMarker> {
        self.markers.iter_mut().rev().find(|m| m.kind == kind)
    }

    /// Reconcile positions against the ring's cumulative trim counter.
    ///
    /// Shifts every marker down by the number of lines trimmed since the
    /// last sync and drops markers that now reference trimmed lines.
    pub fn sync_trims(&mut self, total_trimmed: u64) {
        let delta = total_trimmed.saturating_sub(self.trim_seen);
        if delta == 0 {
            return;
        }
        self.trim_seen = total_trimmed;
        for marker in &mut self.markers {
            marker.abs_line -= delta as i64;
        }
        self.markers.retain(|m| m.abs_line >= 0);
    }

    /// Drop markers that reference the visible screen (CSI 2J overwrote it).
    ///
    /// Markers pointing into archived scrollback rows stay valid.
    pub fn drop_screen_markers(&mut self, scrollback_len: usize) {
        self.markers.retain(|m| m.abs_line < scrollback_len as i64);
    }

    /// Remove every marker.
    pub fn clear(&mut self) {
        self.markers.clear();
    }
}
