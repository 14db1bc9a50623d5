//! Tape commands and the serial executor.
//!
//! A tape is a scripted sequence of typed commands driving the window
//! manager — recorded interactively or written by hand. The DSL surface
//! here is deliberately small: a line/semicolon statement parser producing
//! [`TapeCommand`] values, and [`TapeExecutor`], the dispatch queue the
//! event loop drains **one step per iteration** so every key's layout
//! consequences are observable before the next lands (an explicit queue in
//! place of posted continuation messages).
//!
//! While a tape (or remote `send-keys`) runs, `processing_remote_keys` and
//! animation suppression are set so layouts snap immediately and scripts
//! observe deterministic intermediate states. After the final step the
//! executor restores animations and forces one re-tile + dirty-all,
//! exactly once.

pub mod keys;

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use crossterm::event::KeyEvent;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::constants::SCRIPT_COMMAND_PACING;
use crate::layout::{Orientation, SnapRegion};
use crate::wm::{input, Direction, Severity, WindowManager, WmEffect};

/// A typed tape / remote command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum TapeCommand {
    /// Create a window, optionally named.
    NewWindow {
        /// Custom name for the window.
        #[serde(default)]
        name: Option<String>,
    },
    /// Close a window by id or name (focused when omitted).
    CloseWindow {
        /// Id prefix, custom name, or title.
        #[serde(default)]
        target: Option<String>,
    },
    /// Focus a window by id or name.
    FocusWindow {
        /// Id prefix, custom name, or title.
        target: String,
    },
    /// Create a window splitting the focused one side-by-side.
    SplitHorizontal,
    /// Create a window splitting the focused one stacked.
    SplitVertical,
    /// Flip the focused leaf's parent split.
    RotateSplit,
    /// Set every split ratio to 0.5.
    Equalize,
    /// Switch to a workspace.
    SwitchWorkspace {
        /// Target workspace (1-based).
        workspace: usize,
    },
    /// Toggle BSP tiling.
    ToggleTiling,
    /// Re-enable animations.
    EnableAnimations,
    /// Disable animations.
    DisableAnimations,
    /// Set a config value by dot-path.
    SetConfig {
        /// Config path.
        path: String,
        /// New value, parsed per field type.
        value: String,
    },
    /// Send keys to the manager (or focused PTY).
    SendKeys {
        /// Key tokens, literal text, or raw characters.
        keys: String,
        /// Bypass token parsing and stream bytes to the focused PTY.
        #[serde(default)]
        literal: bool,
        /// Treat each character as an independent key event.
        #[serde(default)]
        raw: bool,
    },
    /// Snap the focused window.
    Snap {
        /// Region token (`left`, `right`, `top-left`, …, `fullscreen`).
        direction: String,
    },
    /// Move a window to a workspace.
    MoveToWorkspace {
        /// Window id or name (focused when omitted).
        #[serde(default)]
        target: Option<String>,
        /// Destination workspace.
        workspace: usize,
        /// Switch to the destination too.
        #[serde(default)]
        follow: bool,
    },
    /// Pause before the next command.
    Sleep {
        /// Delay in milliseconds.
        ms: u64,
    },
    /// Inspection: all windows as JSON.
    ListWindows,
    /// Inspection: one window as JSON.
    GetWindow {
        /// Id prefix, custom name, or title (focused when omitted).
        #[serde(default)]
        target: Option<String>,
    },
    /// Inspection: session summary as JSON.
    GetSessionInfo,
}

/// Parse a tape script: statements separated by newlines or `;`, `#`
/// comments, double-quoted strings with `\n`/`\t`/`\"`/`\\` escapes.
pub fn parse_script(text: &str) -> Result<Vec<TapeCommand>> {
    let mut commands = Vec::new();
    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        for statement in split_statements(line) {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            let command = parse_statement(statement)
                .with_context(|| format!("line {}: {statement}", line_no + 1))?;
            commands.push(command);
        }
    }
    Ok(commands)
}

/// Split on `;` outside double quotes.
fn split_statements(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    for ch in line.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => {
                current.push(ch);
                escaped = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ';' if !in_quotes => {
                out.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    out.push(current);
    out
}

/// Tokenize one statement: bare words and quoted strings.
fn tokenize(statement: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = statement.chars().peekable();
    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        if ch == '"' {
            chars.next();
            let mut token = String::new();
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some('n') => token.push('\n'),
                        Some('t') => token.push('\t'),
                        Some('r') => token.push('\r'),
                        Some('"') => token.push('"'),
                        Some('\\') => token.push('\\'),
                        Some(other) => token.push(other),
                        None => bail!("unterminated escape"),
                    },
                    Some('"') => break,
                    Some(other) => token.push(other),
                    None => bail!("unterminated string"),
                }
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
            tokens.push(token);
        }
    }
    Ok(tokens)
}

fn parse_statement(statement: &str) -> Result<TapeCommand> {
    let tokens = tokenize(statement)?;
    let Some(verb) = tokens.first() else {
        bail!("empty statement");
    };
    let arg = |i: usize| tokens.get(i).cloned();
    let required = |i: usize, what: &str| -> Result<String> {
        tokens
            .get(i)
            .cloned()
            .with_context(|| format!("{verb}: missing {what}"))
    };

    Ok(match verb.to_ascii_lowercase().as_str() {
        "createwindow" | "newwindow" | "new" => TapeCommand::NewWindow { name: arg(1) },
        "close" | "closewindow" => TapeCommand::CloseWindow { target: arg(1) },
        "focus" | "focuswindow" => TapeCommand::FocusWindow {
            target: required(1, "target")?,
        },
        "type" => TapeCommand::SendKeys {
            keys: required(1, "text")?,
            literal: true,
            raw: false,
        },
        "sendkeys" => TapeCommand::SendKeys {
            keys: required(1, "keys")?,
            literal: false,
            raw: false,
        },
        "sleep" => TapeCommand::Sleep {
            ms: parse_duration_ms(&required(1, "duration")?)?,
        },
        "snap" => TapeCommand::Snap {
            direction: required(1, "direction")?,
        },
        "switchworkspace" | "workspace" => TapeCommand::SwitchWorkspace {
            workspace: required(1, "workspace")?
                .parse()
                .context("invalid workspace number")?,
        },
        "toggletiling" => TapeCommand::ToggleTiling,
        "splithorizontal" => TapeCommand::SplitHorizontal,
        "splitvertical" => TapeCommand::SplitVertical,
        "rotatesplit" | "rotate" => TapeCommand::RotateSplit,
        "equalize" => TapeCommand::Equalize,
        "setconfig" => TapeCommand::SetConfig {
            path: required(1, "path")?,
            value: required(2, "value")?,
        },
        "movetoworkspace" => {
            let workspace: usize = required(2, "workspace")?
                .parse()
                .context("invalid workspace number")?;
            TapeCommand::MoveToWorkspace {
                target: arg(1),
                workspace,
                follow: arg(3).as_deref() == Some("follow"),
            }
        }
        "enableanimations" => TapeCommand::EnableAnimations,
        "disableanimations" => TapeCommand::DisableAnimations,
        "listwindows" => TapeCommand::ListWindows,
        "getwindow" => TapeCommand::GetWindow { target: arg(1) },
        "sessioninfo" | "getsessioninfo" => TapeCommand::GetSessionInfo,
        other => bail!("unknown tape command: {other}"),
    })
}

fn parse_duration_ms(token: &str) -> Result<u64> {
    if let Some(ms) = token.strip_suffix("ms") {
        return ms.parse().context("invalid duration");
    }
    if let Some(s) = token.strip_suffix('s') {
        let secs: f64 = s.parse().context("invalid duration")?;
        return Ok((secs * 1000.0) as u64);
    }
    token.parse().context("invalid duration")
}

/// One queued unit of work.
#[derive(Debug, Clone)]
enum TapeStep {
    Command(TapeCommand),
    Key(KeyEvent),
    LiteralBytes(Vec<u8>),
    Sleep(Duration),
}

/// The serial dispatch queue.
#[derive(Debug, Default)]
pub struct TapeExecutor {
    queue: VecDeque<TapeStep>,
    sleep_until: Option<Instant>,
    active: bool,
    results: Vec<serde_json::Value>,
}

impl TapeExecutor {
    /// Fresh, idle executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a tape is still running.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Inspection results produced so far (drained by the RPC reply path).
    pub fn take_results(&mut self) -> Vec<serde_json::Value> {
        std::mem::take(&mut self.results)
    }

    /// Begin executing commands: suppresses animations and marks remote
    /// processing so intermediate layouts are deterministic.
    pub fn start(&mut self, wm: &mut WindowManager, commands: Vec<TapeCommand>) {
        for command in commands {
            self.queue.push_back(TapeStep::Command(command));
        }
        if !self.active {
            self.active = true;
            wm.processing_remote_keys = true;
            wm.animations_suppressed = true;
            // Finish in-flight animations instantly so the script starts
            // from settled bounds.
            for step in wm.animations.clear() {
                if let Some(window) = wm.window_mut(step.window_id) {
                    window.set_bounds(step.bounds);
                }
            }
        }
    }

    /// Execute at most one queued step. The event loop calls this once per
    /// iteration, so each key's consequences are visible before the next.
    pub fn step(&mut self, wm: &mut WindowManager, now: Instant) -> Vec<WmEffect> {
        if !self.active {
            return Vec::new();
        }
        if let Some(deadline) = self.sleep_until {
            if now < deadline {
                return Vec::new();
            }
            self.sleep_until = None;
        }

        let Some(step) = self.queue.pop_front() else {
            self.finish(wm);
            return Vec::new();
        };

        match step {
            TapeStep::Command(TapeCommand::SendKeys { keys, literal, raw }) => {
                self.expand_send_keys(wm, &keys, literal, raw);
                Vec::new()
            }
            TapeStep::Command(TapeCommand::Sleep { ms }) => {
                self.sleep_until = Some(now + Duration::from_millis(ms));
                Vec::new()
            }
            TapeStep::Command(command) => {
                self.sleep_until = Some(now + SCRIPT_COMMAND_PACING);
                match execute_command(wm, &command) {
                    Ok((effects, result)) => {
                        if !result.is_null() {
                            self.results.push(result);
                        }
                        effects
                    }
                    Err(e) => {
                        wm.notify(Severity::Error, format!("tape: {e}"));
                        Vec::new()
                    }
                }
            }
            TapeStep::Key(key) => input::handle_key(wm, &key),
            TapeStep::LiteralBytes(bytes) => match wm.focused_id() {
                Some(window) => vec![WmEffect::WritePty { window, bytes }],
                None => {
                    wm.notify(Severity::Warning, "tape: no focused window for input");
                    Vec::new()
                }
            },
            TapeStep::Sleep(duration) => {
                self.sleep_until = Some(now + duration);
                Vec::new()
            }
        }
    }

    /// Queue key steps for a send-keys command, front of the queue so they
    /// run before later commands.
    fn expand_send_keys(&mut self, wm: &mut WindowManager, keys: &str, literal: bool, raw: bool) {
        if literal {
            self.queue
                .push_front(TapeStep::LiteralBytes(keys.as_bytes().to_vec()));
            return;
        }
        let events = if raw {
            Ok(keys::raw_key_events(keys))
        } else {
            keys::parse_keys(keys, &wm.config.leader_key)
        };
        match events {
            Ok(events) => {
                for event in events.into_iter().rev() {
                    self.queue.push_front(TapeStep::Key(event));
                }
            }
            Err(e) => wm.notify(Severity::Error, format!("send-keys: {e}")),
        }
    }

    /// Final restore: animations back on, one re-tile, everything dirty.
    fn finish(&mut self, wm: &mut WindowManager) {
        self.active = false;
        self.sleep_until = None;
        wm.processing_remote_keys = false;
        wm.animations_suppressed = false;
        wm.retile();
        for window in &mut wm.windows {
            window.invalidate_cache();
        }
    }
}

/// Apply one non-key command to the manager, returning effects plus an
/// inspection result (JSON null for mutations).
pub fn execute_command(
    wm: &mut WindowManager,
    command: &TapeCommand,
) -> Result<(Vec<WmEffect>, serde_json::Value)> {
    let mut effects = Vec::new();
    let mut result = serde_json::Value::Null;

    match command {
        TapeCommand::NewWindow { name } => {
            effects.push(WmEffect::CreateWindow { name: name.clone() });
        }
        TapeCommand::CloseWindow { target } => {
            let id = resolve_target(wm, target.as_deref())?;
            effects.push(WmEffect::CloseWindow { window: id });
        }
        TapeCommand::FocusWindow { target } => {
            let id = resolve_target(wm, Some(target))?;
            wm.focus(id);
        }
        TapeCommand::SplitHorizontal => {
            wm.preselect_split(Orientation::Vertical);
            effects.push(WmEffect::CreateWindow { name: None });
        }
        TapeCommand::SplitVertical => {
            wm.preselect_split(Orientation::Horizontal);
            effects.push(WmEffect::CreateWindow { name: None });
        }
        TapeCommand::RotateSplit => wm.rotate_split(),
        TapeCommand::Equalize => wm.equalize(),
        TapeCommand::SwitchWorkspace { workspace } => wm.switch_workspace(*workspace),
        TapeCommand::ToggleTiling => wm.toggle_tiling(),
        TapeCommand::EnableAnimations => wm.config.animations_enabled = true,
        TapeCommand::DisableAnimations => wm.config.animations_enabled = false,
        TapeCommand::SetConfig { path, value } => {
            wm.config.set(path, value)?;
            if path == "dockbar_position" {
                wm.viewport.dockbar = wm.config.dockbar_position;
                wm.viewport_resized(wm.viewport.width, wm.viewport.height);
            }
        }
        TapeCommand::Snap { direction } => {
            let region = SnapRegion::parse(direction)
                .or_else(|| {
                    // Bare directions map to halves / fullscreen.
                    Direction::parse(direction).map(|d| match d {
                        Direction::Left => SnapRegion::Left,
                        Direction::Right => SnapRegion::Right,
                        Direction::Up => SnapRegion::Fullscreen,
                        Direction::Down => SnapRegion::BottomLeft,
                    })
                })
                .with_context(|| format!("unknown snap direction: {direction}"))?;
            wm.snap_focused(region);
        }
        TapeCommand::MoveToWorkspace {
            target,
            workspace,
            follow,
        } => {
            let id = resolve_target(wm, target.as_deref())?;
            wm.move_to_workspace(id, *workspace, *follow);
        }
        TapeCommand::SendKeys { .. } | TapeCommand::Sleep { .. } => {
            // Handled by the executor queue; direct execution is a no-op.
        }
        TapeCommand::ListWindows => {
            let windows: Vec<serde_json::Value> =
                wm.windows.iter().map(|w| window_json(wm, w)).collect();
            result = json!(windows);
        }
        TapeCommand::GetWindow { target } => {
            let id = resolve_target(wm, target.as_deref())?;
            let window = wm.window(id).context("window disappeared")?;
            result = window_json(wm, window);
        }
        TapeCommand::GetSessionInfo => {
            result = json!({
                "current_workspace": wm.current_workspace,
                "window_count": wm.windows.len(),
                "auto_tiling": wm.auto_tiling,
                "mode": wm.mode,
                "width": wm.viewport.width,
                "height": wm.viewport.height,
                "focused_window": wm.focused_id().map(|id| id.to_string()),
            });
        }
    }

    Ok((effects, result))
}

fn resolve_target(wm: &WindowManager, target: Option<&str>) -> Result<uuid::Uuid> {
    match target {
        Some(name) => wm
            .window_by_name(name)
            .map(|w| w.id)
            .with_context(|| format!("no window matching {name:?}")),
        None => wm.focused_id().context("no focused window"),
    }
}

fn window_json(wm: &WindowManager, w: &crate::window::Window) -> serde_json::Value {
    json!({
        "id": w.id.to_string(),
        "title": w.title,
        "custom_name": w.custom_name,
        "x": w.bounds.x,
        "y": w.bounds.y,
        "width": w.bounds.w,
        "height": w.bounds.h,
        "z": w.z,
        "workspace": w.workspace,
        "minimized": w.minimized,
        "is_alt_screen": w.is_alt_screen,
        "focused": wm.focused_id() == Some(w.id),
    })
}
