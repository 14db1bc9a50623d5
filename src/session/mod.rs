//! Daemon sessions: naming, on-disk footprint, liveness, and the wire
//! protocol modules.
//!
//! A session is **live iff its Unix socket accepts a connection**. The PID
//! file is only a hint for `kill-server`'s signal fallback — probing the
//! socket instead of the recorded PID sidesteps PID reuse entirely, and a
//! crashed daemon becomes indistinguishable from a missing one, which is
//! exactly how `ls` and `attach` want to treat it.
//!
//! Sockets go under a per-user directory in the system temp dir so the
//! full path stays comfortably inside `sun_path` (~104 bytes on some
//! platforms); PID files live with the rest of the session's data in the
//! user data dir. Leftovers from daemons that died without cleanup are
//! reaped opportunistically whenever sessions are listed.

pub mod client;
pub mod daemon;
pub mod protocol;
pub mod state;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::config::Config;

/// Default session name when none is given.
pub const DEFAULT_SESSION: &str = "default";

/// Longest accepted session name.
const NAME_LIMIT: usize = 32;

/// Check a session name: short, filesystem-safe, and unambiguous.
///
/// Names become file names (`{name}.sock`, a data subdirectory), so only
/// ASCII alphanumerics plus `.`/`_`/`-` are allowed, and the first
/// character may not be a dot or dash.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("session name is empty");
    }
    if name.len() > NAME_LIMIT {
        bail!("session name longer than {NAME_LIMIT} characters: {name:?}");
    }
    if name.starts_with(['.', '-']) {
        bail!("session name may not start with '.' or '-': {name:?}");
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '_' | '-'))
    {
        bail!("session name contains {bad:?}; use letters, digits, '.', '_', '-'");
    }
    Ok(())
}

/// The on-disk footprint of one named session.
#[derive(Debug, Clone)]
pub struct SessionFiles {
    name: String,
    /// Unix socket clients connect to.
    pub socket: PathBuf,
    /// Recorded daemon PID, used only as a signal-fallback hint.
    pub pid_file: PathBuf,
}

impl SessionFiles {
    /// Validate the name and lay out both paths, creating the parent
    /// directories on the way.
    pub fn resolve(name: &str) -> Result<Self> {
        validate_name(name)?;

        let socket = runtime_dir()?.join(format!("{name}.sock"));
        // sun_path is finite; better a clear error here than EINVAL from
        // bind() later (an exotic TMPDIR can push us over).
        if socket.as_os_str().len() > 100 {
            bail!(
                "socket path {} exceeds the AF_UNIX path limit; set a shorter TMPDIR",
                socket.display()
            );
        }

        let data = Config::data_dir()?.join("sessions").join(name);
        fs::create_dir_all(&data)
            .with_context(|| format!("failed to create {}", data.display()))?;

        Ok(Self {
            name: name.to_string(),
            socket,
            pid_file: data.join("daemon.pid"),
        })
    }

    /// The session's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record this process as the session's daemon.
    pub fn write_pid(&self) -> Result<()> {
        let pid = std::process::id();
        fs::write(&self.pid_file, format!("{pid}\n"))
            .with_context(|| format!("failed to write {}", self.pid_file.display()))?;
        log::info!("session {}: daemon pid {pid}", self.name);
        Ok(())
    }

    /// The recorded daemon PID, if a parseable file exists.
    pub fn read_pid(&self) -> Option<u32> {
        fs::read_to_string(&self.pid_file).ok()?.trim().parse().ok()
    }

    /// Whether a daemon currently answers on the socket.
    pub fn live(&self) -> bool {
        socket_answers(&self.socket)
    }

    /// Delete both files, best-effort. Shutdown and reaping both come
    /// through here; a file that is already gone is fine.
    pub fn remove(&self) {
        let _ = fs::remove_file(&self.socket);
        let _ = fs::remove_file(&self.pid_file);
    }
}

/// Per-user socket directory, permissions tightened to 0700.
///
/// The chmod happens after creation; the sockets themselves are 0600
/// from the moment they bind, so nothing sensitive is reachable in the
/// gap.
fn runtime_dir() -> Result<PathBuf> {
    let uid = unsafe { libc::getuid() };
    let dir = std::env::temp_dir().join(format!("tuios-{uid}"));
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(dir)
}

/// Probe a socket by connecting and immediately dropping the stream.
fn socket_answers(path: &Path) -> bool {
    std::os::unix::net::UnixStream::connect(path).is_ok()
}

/// Whether the named session's daemon is up.
pub fn daemon_alive(name: &str) -> bool {
    SessionFiles::resolve(name).map(|f| f.live()).unwrap_or(false)
}

/// One row of `ls` output.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    /// Session name.
    pub name: String,
    /// Daemon PID, when the hint file is readable.
    pub pid: Option<u32>,
}

/// Scan the socket directory for sessions, sorted by name.
///
/// Doubles as the reaper: a socket nobody answers on belongs to a daemon
/// that died without cleanup, so it is removed along with its PID file in
/// passing. Files that are not `*.sock`, or whose stem is not a valid
/// session name, are not ours to manage and stay untouched.
pub fn list_sessions() -> Vec<SessionEntry> {
    let Ok(dir) = runtime_dir() else {
        return Vec::new();
    };
    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };

    let mut live = Vec::new();
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().and_then(|f| f.strip_suffix(".sock")) else {
            continue;
        };
        let Ok(files) = SessionFiles::resolve(name) else {
            continue;
        };
        if files.live() {
            live.push(SessionEntry {
                name: name.to_string(),
                pid: files.read_pid(),
            });
        } else {
            log::debug!("reaping dead session {name}");
            files.remove();
        }
    }
    live.sort_by(|a, b| a.name.cmp(&b.name));
    live
}
