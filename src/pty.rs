//! PTY hosting: child spawn, reader thread, resize, lifecycle.
//!
//! Each window (or daemon-side PTY) owns one `PtyHandle`. A dedicated
//! blocking reader thread copies bytes from the master fd into the owning
//! VT's `write()` and forwards the raw bytes as [`PtyEvent::Output`] for
//! subscribers; on EOF it reaps the child and emits [`PtyEvent::Exited`].
//!
//! Query responses the emulator generates (CPR, DA, OSC color reads) are
//! drained from the VT's internal pipe after every write burst and fed back
//! to the child, so programs that interrogate the terminal see replies
//! without any UI involvement.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Context, Result};
use bytes::Bytes;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};

use crate::term::Vt;

/// Lifecycle and output events emitted by a PTY reader thread.
#[derive(Debug, Clone)]
pub enum PtyEvent {
    /// Raw output bytes (already applied to the VT).
    Output {
        /// PTY id the bytes came from.
        id: u64,
        /// The raw bytes, shareable across subscribers.
        data: Bytes,
    },
    /// The child exited or the master hit EOF.
    Exited {
        /// PTY id that closed.
        id: u64,
        /// Exit code when the child exited normally.
        exit_code: Option<i32>,
    },
}

/// Spawn parameters for a new PTY child.
#[derive(Debug, Clone)]
pub struct PtySpawnConfig {
    /// Stable id used in events and the daemon protocol.
    pub id: u64,
    /// Terminal rows handed to the child.
    pub rows: u16,
    /// Terminal columns handed to the child.
    pub cols: u16,
    /// Program to run; `None` spawns the user's shell.
    pub command: Option<String>,
    /// Session name exported as `TUIOS_SESSION`.
    pub session_name: String,
}

/// A live PTY: master side, shared writer, child killer, reader thread.
pub struct PtyHandle {
    id: u64,
    master: Box<dyn MasterPty + Send>,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    reader_thread: Option<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for PtyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl PtyHandle {
    /// Open a PTY pair, spawn the child, and start the reader thread.
    ///
    /// On spawn failure nothing is created — no zombie entry for callers
    /// to clean up.
    pub fn spawn(
        config: PtySpawnConfig,
        vt: Arc<Mutex<Vt>>,
        events: std::sync::mpsc::Sender<PtyEvent>,
    ) -> Result<Self> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: config.rows.max(1),
                cols: config.cols.max(1),
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("failed to open PTY")?;

        let mut cmd = match &config.command {
            Some(command) => {
                let mut parts = command.split_whitespace();
                let program = parts.next().unwrap_or("/bin/sh");
                let mut cmd = CommandBuilder::new(program);
                for arg in parts {
                    cmd.arg(arg);
                }
                cmd
            }
            None => CommandBuilder::new(default_shell()),
        };
        cmd.env("TUIOS_SESSION", &config.session_name);
        cmd.env("TERM", "xterm-256color");
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .context("failed to spawn PTY child")?;
        let killer = child.clone_killer();

        let reader = pair
            .master
            .try_clone_reader()
            .context("failed to clone PTY reader")?;
        let writer = Arc::new(Mutex::new(
            pair.master
                .take_writer()
                .context("failed to take PTY writer")?,
        ));

        let reader_thread = spawn_reader_thread(
            config.id,
            reader,
            Arc::clone(&vt),
            Arc::clone(&writer),
            events,
            child,
        );

        Ok(Self {
            id: config.id,
            master: pair.master,
            writer,
            killer,
            reader_thread: Some(reader_thread),
        })
    }

    /// PTY id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Write input bytes to the child.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("PTY writer lock poisoned"))?;
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Resize the PTY; the child receives SIGWINCH.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        self.master
            .resize(PtySize {
                rows: rows.max(1),
                cols: cols.max(1),
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("failed to resize PTY")
    }

    /// Kill the child and wait briefly for the reader to drain.
    pub fn close(mut self) {
        let _ = self.killer.kill();
        if let Some(handle) = self.reader_thread.take() {
            // Bounded grace: the reader exits on EOF after the kill.
            let deadline = std::time::Instant::now() + std::time::Duration::from_millis(500);
            while !handle.is_finished() && std::time::Instant::now() < deadline {
                thread::sleep(std::time::Duration::from_millis(10));
            }
        }
    }
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        let _ = self.killer.kill();
    }
}

/// The blocking read loop: PTY bytes → VT → broadcast event.
fn spawn_reader_thread(
    id: u64,
    mut reader: Box<dyn Read + Send>,
    vt: Arc<Mutex<Vt>>,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    events: std::sync::mpsc::Sender<PtyEvent>,
    mut child: Box<dyn portable_pty::Child + Send + Sync>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        log::debug!("PTY {id} reader thread started");
        let mut buf = [0u8; 8192];

        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let responses = {
                        let mut vt = match vt.lock() {
                            Ok(vt) => vt,
                            Err(_) => {
                                log::error!("PTY {id}: VT lock poisoned, stopping reader");
                                break;
                            }
                        };
                        vt.write(&buf[..n]);
                        vt.take_responses()
                    };

                    // Feed emulator query replies back to the child.
                    if !responses.is_empty() {
                        if let Ok(mut w) = writer.lock() {
                            let _ = w.write_all(&responses);
                            let _ = w.flush();
                        }
                    }

                    let data = Bytes::copy_from_slice(&buf[..n]);
                    if events.send(PtyEvent::Output { id, data }).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::debug!("PTY {id} read error: {e}");
                    break;
                }
            }
        }

        let exit_code = child
            .wait()
            .ok()
            .map(|status| status.exit_code() as i32);
        log::debug!("PTY {id} reader exiting (exit_code={exit_code:?})");
        let _ = events.send(PtyEvent::Exited { id, exit_code });
    })
}

/// The user's shell, or a sensible platform fallback.
pub fn default_shell() -> String {
    #[cfg(windows)]
    {
        std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string())
    }
    #[cfg(not(windows))]
    {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn recv_until<F: Fn(&PtyEvent) -> bool>(
        rx: &mpsc::Receiver<PtyEvent>,
        pred: F,
        timeout: Duration,
    ) -> Option<PtyEvent> {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if let Ok(event) = rx.recv_timeout(Duration::from_millis(50)) {
                if pred(&event) {
                    return Some(event);
                }
            }
        }
        None
    }

    #[test]
    fn spawn_echo_and_observe_output() {
        let vt = Arc::new(Mutex::new(Vt::new(24, 80, 100)));
        let (tx, rx) = mpsc::channel();
        let handle = PtyHandle::spawn(
            PtySpawnConfig {
                id: 7,
                rows: 24,
                cols: 80,
                command: Some("echo tuios-pty-test".to_string()),
                session_name: "test".to_string(),
            },
            Arc::clone(&vt),
            tx,
        )
        .expect("spawn");

        let got = recv_until(
            &rx,
            |e| matches!(e, PtyEvent::Output { id: 7, data } if data.windows(14).any(|w| w == b"tuios-pty-test")),
            Duration::from_secs(5),
        );
        assert!(got.is_some(), "expected echoed output");

        let exited = recv_until(
            &rx,
            |e| matches!(e, PtyEvent::Exited { id: 7, .. }),
            Duration::from_secs(5),
        );
        assert!(exited.is_some(), "expected exit event");

        // Output also reached the VT grid.
        let vt = vt.lock().unwrap();
        let screen_text = vt.screen().visible_text().join("\n");
        assert!(screen_text.contains("tuios-pty-test"));
        drop(vt);
        handle.close();
    }

    #[test]
    fn spawn_failure_creates_nothing() {
        let vt = Arc::new(Mutex::new(Vt::new(24, 80, 100)));
        let (tx, _rx) = mpsc::channel();
        let result = PtyHandle::spawn(
            PtySpawnConfig {
                id: 1,
                rows: 24,
                cols: 80,
                command: Some("/nonexistent/binary/path".to_string()),
                session_name: "test".to_string(),
            },
            vt,
            tx,
        );
        assert!(result.is_err());
    }

    #[test]
    fn default_shell_is_nonempty() {
        assert!(!default_shell().is_empty());
    }
}
