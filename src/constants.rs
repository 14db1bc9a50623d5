//! Timing and capacity constants shared across the crate.

use std::time::Duration;

/// Leader (prefix) key mode times out after this long.
pub const PREFIX_TIMEOUT: Duration = Duration::from_secs(2);

/// The which-key overlay appears this long after entering prefix mode.
pub const WHICH_KEY_DELAY: Duration = Duration::from_millis(500);

/// Default lifetime of a notification bubble.
pub const NOTIFICATION_DURATION: Duration = Duration::from_millis(1500);

/// Notifications fade over their final 500 ms.
pub const NOTIFICATION_FADE: Duration = Duration::from_millis(500);

/// Pause between scripted tape command executions.
pub const SCRIPT_COMMAND_PACING: Duration = Duration::from_millis(50);

/// VT callbacks re-enable this long after an attach replay completes.
pub const CALLBACK_REENABLE_DELAY: Duration = Duration::from_millis(500);

/// Grace period for PTY reader threads on shutdown before force-terminate.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Mouse motion within this window after a mode switch is discarded —
/// misparsed CSI-u fragments would otherwise surface as phantom events.
pub const MOUSE_MOTION_SETTLE: Duration = Duration::from_millis(25);

/// Render tick rate while everything is normal.
pub const FPS_NORMAL: u32 = 60;

/// Render tick rate while dragging/resizing (mouse responsiveness wins).
pub const FPS_INTERACTION: u32 = 30;

/// Render tick rate after the idle threshold.
pub const FPS_IDLE: u32 = 10;

/// Consecutive ticks with no dirty windows and no animations before the
/// renderer drops to the idle rate.
pub const IDLE_THRESHOLD_FRAMES: u32 = 30;

/// Background (unfocused) windows refresh every Nth tick, throttling
/// high-output windows to ~20 Hz at the 60 Hz base rate.
pub const BACKGROUND_REFRESH_INTERVAL: u64 = 3;

/// Log ring capacity surfaced by the logs overlay.
pub const LOG_RING_CAP: usize = 100;

/// Number of workspaces.
pub const WORKSPACE_COUNT: usize = 9;
