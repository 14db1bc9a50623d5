//! DEC private mode flags and the replication snapshot.
//!
//! Modes are a bitset rather than a map: lookups happen on every input
//! event (mouse gating, bracketed paste) and the daemon protocol only
//! replicates a fixed set anyway.
//!
//! Replication restores modes by direct assignment (`restore`) — never by
//! replaying the escape sequences that set them, because several of those
//! have destructive side effects (1049 clears the alternate screen).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Active DEC private modes (plus the two ANSI modes we track).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TermModes: u32 {
        /// DECAWM (?7) — autowrap at the right margin.
        const AUTOWRAP         = 1 << 0;
        /// DECTCEM (?25) — cursor visible.
        const SHOW_CURSOR      = 1 << 1;
        /// ?1047/?1049 — alternate screen active.
        const ALT_SCREEN       = 1 << 2;
        /// ?2004 — bracketed paste.
        const BRACKETED_PASTE  = 1 << 3;
        /// ?1004 — focus in/out reporting.
        const FOCUS_REPORT     = 1 << 4;
        /// ?9 — X10 mouse (button press only).
        const MOUSE_X10        = 1 << 5;
        /// ?1000 — mouse press/release reporting.
        const MOUSE_CLICKS     = 1 << 6;
        /// ?1001 — highlight mouse tracking.
        const MOUSE_HIGHLIGHT  = 1 << 7;
        /// ?1002 — cell-motion mouse tracking (while button held).
        const MOUSE_DRAG       = 1 << 8;
        /// ?1003 — all-motion mouse tracking.
        const MOUSE_ANY        = 1 << 9;
        /// ?1006 — SGR extended mouse encoding.
        const SGR_MOUSE        = 1 << 10;
        /// ?1 — DECCKM application cursor keys.
        const APP_CURSOR       = 1 << 11;
        /// DECKPAM/DECKPNM — application keypad.
        const APP_KEYPAD       = 1 << 12;
        /// ?6 — DECOM origin mode (cursor addressing relative to region).
        const ORIGIN           = 1 << 13;
        /// ANSI mode 4 — insert mode (IRM).
        const INSERT           = 1 << 14;
        /// ANSI mode 20 — linefeed implies carriage return (LNM).
        const LINEFEED_CR      = 1 << 15;
        /// ?2048 — in-band resize notifications.
        const INBAND_RESIZE    = 1 << 16;
    }
}

impl Default for TermModes {
    fn default() -> Self {
        TermModes::AUTOWRAP | TermModes::SHOW_CURSOR
    }
}

impl TermModes {
    /// Whether any mouse reporting mode is enabled.
    pub fn mouse_enabled(self) -> bool {
        self.intersects(
            TermModes::MOUSE_X10
                | TermModes::MOUSE_CLICKS
                | TermModes::MOUSE_HIGHLIGHT
                | TermModes::MOUSE_DRAG
                | TermModes::MOUSE_ANY,
        )
    }

    /// Whether motion events (not just clicks) are reported.
    pub fn mouse_motion_enabled(self) -> bool {
        self.intersects(TermModes::MOUSE_DRAG | TermModes::MOUSE_ANY)
    }
}

/// Cursor rendering shape (DECSCUSR).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CursorShape {
    /// Solid block.
    #[default]
    Block,
    /// Underline bar.
    Underline,
    /// Vertical beam.
    Beam,
}

/// The mode subset replicated through the daemon on attach.
///
/// Field names are wire-stable; added fields must default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModesSnapshot {
    /// Any of ?9/?1000/?1002/?1003 set.
    #[serde(default)]
    pub mouse_clicks: bool,
    /// Cell-motion tracking (?1002).
    #[serde(default)]
    pub mouse_drag: bool,
    /// All-motion tracking (?1003).
    #[serde(default)]
    pub mouse_any: bool,
    /// SGR mouse encoding (?1006).
    #[serde(default)]
    pub sgr_mouse: bool,
    /// Alternate screen active.
    #[serde(default)]
    pub alt_screen: bool,
    /// Bracketed paste (?2004).
    #[serde(default)]
    pub bracketed_paste: bool,
    /// Focus reporting (?1004).
    #[serde(default)]
    pub focus_report: bool,
    /// Autowrap (?7).
    #[serde(default = "default_true")]
    pub autowrap: bool,
    /// Application cursor keys (?1).
    #[serde(default)]
    pub app_cursor: bool,
}

fn default_true() -> bool {
    true
}

impl ModesSnapshot {
    /// Capture the replicated subset from the live bitset.
    pub fn capture(modes: TermModes) -> Self {
        Self {
            mouse_clicks: modes
                .intersects(TermModes::MOUSE_X10 | TermModes::MOUSE_CLICKS),
            mouse_drag: modes.contains(TermModes::MOUSE_DRAG),
            mouse_any: modes.contains(TermModes::MOUSE_ANY),
            sgr_mouse: modes.contains(TermModes::SGR_MOUSE),
            alt_screen: modes.contains(TermModes::ALT_SCREEN),
            bracketed_paste: modes.contains(TermModes::BRACKETED_PASTE),
            focus_report: modes.contains(TermModes::FOCUS_REPORT),
            autowrap: modes.contains(TermModes::AUTOWRAP),
            app_cursor: modes.contains(TermModes::APP_CURSOR),
        }
    }

    /// Apply the snapshot onto a live bitset by direct assignment.
    pub fn apply(&self, modes: &mut TermModes) {
        modes.set(TermModes::MOUSE_CLICKS, self.mouse_clicks);
        modes.set(TermModes::MOUSE_DRAG, self.mouse_drag);
        modes.set(TermModes::MOUSE_ANY, self.mouse_any);
        modes.set(TermModes::SGR_MOUSE, self.sgr_mouse);
        modes.set(TermModes::ALT_SCREEN, self.alt_screen);
        modes.set(TermModes::BRACKETED_PASTE, self.bracketed_paste);
        modes.set(TermModes::FOCUS_REPORT, self.focus_report);
        modes.set(TermModes::AUTOWRAP, self.autowrap);
        modes.set(TermModes::APP_CURSOR, self.app_cursor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_autowrap_and_visible_cursor() {
        let modes = TermModes::default();
        assert!(modes.contains(TermModes::AUTOWRAP));
        assert!(modes.contains(TermModes::SHOW_CURSOR));
        assert!(!modes.mouse_enabled());
    }

    #[test]
    fn mouse_predicates() {
        let mut modes = TermModes::default();
        modes.insert(TermModes::MOUSE_CLICKS);
        assert!(modes.mouse_enabled());
        assert!(!modes.mouse_motion_enabled());

        modes.insert(TermModes::MOUSE_ANY);
        assert!(modes.mouse_motion_enabled());
    }

    #[test]
    fn snapshot_round_trip() {
        let mut modes = TermModes::default();
        modes.insert(TermModes::MOUSE_DRAG | TermModes::SGR_MOUSE | TermModes::ALT_SCREEN);
        modes.remove(TermModes::AUTOWRAP);

        let snap = ModesSnapshot::capture(modes);
        let mut restored = TermModes::default();
        snap.apply(&mut restored);

        assert!(restored.contains(TermModes::MOUSE_DRAG));
        assert!(restored.contains(TermModes::SGR_MOUSE));
        assert!(restored.contains(TermModes::ALT_SCREEN));
        assert!(!restored.contains(TermModes::AUTOWRAP));
        // Non-replicated bits are untouched.
        assert!(restored.contains(TermModes::SHOW_CURSOR));
    }

    #[test]
    fn snapshot_serde_defaults_tolerate_old_clients() {
        // An older peer that omits newly added fields still deserializes.
        let snap: ModesSnapshot = serde_json::from_str("{}").unwrap();
        assert!(snap.autowrap);
        assert!(!snap.alt_screen);
    }
}
