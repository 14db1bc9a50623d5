//! Configuration: a single owned value, loaded from TOML, mutated at
//! runtime through dot-path `set` (the `set-config` entry point).
//!
//! Nothing here is global — the window manager owns the `Config` and the
//! renderer reads it. Unknown keys in the file are ignored so old configs
//! keep loading.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::layout::DockbarPosition;
use crate::term::DEFAULT_SCROLLBACK_LINES;

/// Where the window title badge renders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TitlePosition {
    /// On the top border.
    #[default]
    Top,
    /// On the bottom border.
    Bottom,
    /// Not rendered.
    Hidden,
}

/// User configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Extra debug logging.
    pub debug: bool,
    /// Avoid non-ASCII decorations (borders, icons).
    pub ascii_only: bool,
    /// Theme identifier (resolved by the theme adapter).
    pub theme: String,
    /// Border style identifier (`rounded`, `plain`, `double`, `thick`).
    pub border_style: String,
    /// Dockbar placement.
    pub dockbar_position: DockbarPosition,
    /// Hide the close/minimize buttons on window borders.
    pub hide_window_buttons: bool,
    /// Scrollback lines per window.
    pub scrollback_lines: usize,
    /// Show pressed keys in the dockbar.
    pub show_keys: bool,
    /// Window animations.
    pub animations_enabled: bool,
    /// Window title badge placement.
    pub window_title_position: TitlePosition,
    /// Hide the clock overlay.
    pub hide_clock: bool,
    /// Leader key, e.g. `ctrl+b`.
    pub leader_key: String,
    /// Tile new windows automatically.
    pub auto_tiling: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            ascii_only: false,
            theme: "default".to_string(),
            border_style: "rounded".to_string(),
            dockbar_position: DockbarPosition::Bottom,
            hide_window_buttons: false,
            scrollback_lines: DEFAULT_SCROLLBACK_LINES,
            show_keys: false,
            animations_enabled: true,
            window_title_position: TitlePosition::Top,
            hide_clock: false,
            leader_key: "ctrl+b".to_string(),
            auto_tiling: false,
        }
    }
}

impl Config {
    /// Per-user data directory (`~/.local/share/tuios` or equivalent).
    pub fn data_dir() -> Result<PathBuf> {
        let base = dirs::data_dir().context("no user data directory available")?;
        let dir = base.join("tuios");
        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create data dir {}", dir.display()))?;
        }
        Ok(dir)
    }

    /// Path of the config file.
    pub fn path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("config.toml"))
    }

    /// Directory holding tape files.
    pub fn tapes_dir() -> Result<PathBuf> {
        let dir = Self::data_dir()?.join("tapes");
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(dir)
    }

    /// Load from disk; a missing file yields defaults.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config at {}", path.display()))
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        let text = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(&path, text)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Set a field by dot-path, parsing `value` per the field's type.
    ///
    /// This is the runtime mutation entry point used by `set-config` and
    /// tape `set_config` commands. An unknown path or unparseable value
    /// rejects the operation without altering state.
    pub fn set(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "debug" => self.debug = parse_bool(value)?,
            "ascii_only" => self.ascii_only = parse_bool(value)?,
            "theme" => self.theme = value.to_string(),
            "border_style" => self.border_style = value.to_string(),
            "dockbar_position" => {
                self.dockbar_position = match value {
                    "top" => DockbarPosition::Top,
                    "bottom" => DockbarPosition::Bottom,
                    "hidden" => DockbarPosition::Hidden,
                    other => bail!("invalid dockbar position: {other}"),
                }
            }
            "hide_window_buttons" => self.hide_window_buttons = parse_bool(value)?,
            "scrollback_lines" => {
                self.scrollback_lines = value
                    .parse()
                    .with_context(|| format!("invalid scrollback_lines: {value}"))?;
            }
            "show_keys" => self.show_keys = parse_bool(value)?,
            "animations_enabled" => self.animations_enabled = parse_bool(value)?,
            "window_title_position" => {
                self.window_title_position = match value {
                    "top" => TitlePosition::Top,
                    "bottom" => TitlePosition::Bottom,
                    "hidden" => TitlePosition::Hidden,
                    other => bail!("invalid title position: {other}"),
                }
            }
            "hide_clock" => self.hide_clock = parse_bool(value)?,
            "leader_key" => self.leader_key = value.to_string(),
            "auto_tiling" => self.auto_tiling = parse_bool(value)?,
            other => bail!("unknown config path: {other}"),
        }
        Ok(())
    }

    /// Apply command-line flag overrides on top of the loaded file.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_overrides(
        &mut self,
        debug: bool,
        ascii_only: bool,
        theme: Option<&str>,
        border_style: Option<&str>,
        dockbar_position: Option<&str>,
        hide_window_buttons: bool,
        scrollback_lines: Option<usize>,
        show_keys: bool,
        no_animations: bool,
        window_title_position: Option<&str>,
        hide_clock: bool,
    ) -> Result<()> {
        if debug {
            self.debug = true;
        }
        if ascii_only {
            self.ascii_only = true;
        }
        if let Some(theme) = theme {
            self.theme = theme.to_string();
        }
        if let Some(style) = border_style {
            self.border_style = style.to_string();
        }
        if let Some(pos) = dockbar_position {
            self.set("dockbar_position", pos)?;
        }
        if hide_window_buttons {
            self.hide_window_buttons = true;
        }
        if let Some(lines) = scrollback_lines {
            self.scrollback_lines = lines;
        }
        if show_keys {
            self.show_keys = true;
        }
        if no_animations {
            self.animations_enabled = false;
        }
        if let Some(pos) = window_title_position {
            self.set("window_title_position", pos)?;
        }
        if hide_clock {
            self.hide_clock = true;
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" => Ok(false),
        other => bail!("invalid boolean: {other}"),
    }
}
