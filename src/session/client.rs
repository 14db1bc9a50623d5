//! Client-side bridge to a session daemon.
//!
//! The UI event loop is synchronous; the socket is async. The bridge runs
//! a small tokio runtime on a background thread and translates both ways:
//!
//! ```text
//! UI loop <--std mpsc ClientEvent-- bridge <--frames-- Unix socket
//! UI loop --ClientHandle (frames)--> bridge --frames--> Unix socket
//! ```
//!
//! Requests get monotonically increasing correlation ids; responses and
//! pushes surface as [`ClientEvent`]s for the loop to drain. One-shot CLI
//! verbs use [`call`], which waits for the matching response.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc as tokio_mpsc;

use super::protocol::{Frame, FrameDecoder, Message, Push, Request, RequestEnvelope, Response};

/// Events delivered to the UI loop.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A response to one of our requests.
    Response(Response),
    /// A daemon push.
    Push(Push),
    /// Raw PTY output for a subscribed PTY.
    PtyOutput {
        /// Source PTY.
        pty_id: u64,
        /// The bytes.
        data: Vec<u8>,
    },
    /// The socket closed; the session is unreachable.
    Disconnected,
}

/// Sender half owned by the UI loop.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    out_tx: tokio_mpsc::UnboundedSender<Vec<u8>>,
    next_id: Arc<AtomicU64>,
}

impl ClientHandle {
    /// Send a request; returns its correlation id.
    pub fn request(&self, request: Request) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = Message::Request(RequestEnvelope { id, request }).into_frame();
        let _ = self.out_tx.send(frame.encode());
        id
    }

    /// Stream raw input bytes to a daemon PTY.
    pub fn send_pty_input(&self, pty_id: u64, data: Vec<u8>) {
        let frame = Frame::PtyInput { pty_id, data };
        let _ = self.out_tx.send(frame.encode());
    }

    /// Whether the bridge can still accept traffic.
    pub fn is_connected(&self) -> bool {
        !self.out_tx.is_closed()
    }
}

/// Connect to a session's socket and start the bridge thread.
pub fn connect(session: &str) -> Result<(ClientHandle, mpsc::Receiver<ClientEvent>)> {
    let files = super::SessionFiles::resolve(session)?;
    let path = files.socket;
    // Connect synchronously so a missing daemon fails fast.
    let stream = std::os::unix::net::UnixStream::connect(&path)
        .with_context(|| format!("no daemon listening at {}", path.display()))?;
    stream.set_nonblocking(true)?;

    let (out_tx, mut out_rx) = tokio_mpsc::unbounded_channel::<Vec<u8>>();
    let (event_tx, event_rx) = mpsc::channel::<ClientEvent>();

    std::thread::Builder::new()
        .name("session-bridge".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("bridge runtime failed: {e}");
                    let _ = event_tx.send(ClientEvent::Disconnected);
                    return;
                }
            };
            runtime.block_on(async move {
                let stream = match tokio::net::UnixStream::from_std(stream) {
                    Ok(s) => s,
                    Err(e) => {
                        log::error!("bridge stream conversion failed: {e}");
                        let _ = event_tx.send(ClientEvent::Disconnected);
                        return;
                    }
                };
                let (mut read_half, mut write_half) = stream.into_split();

                let outbound = tokio::spawn(async move {
                    while let Some(bytes) = out_rx.recv().await {
                        if write_half.write_all(&bytes).await.is_err() {
                            break;
                        }
                    }
                });

                let mut decoder = FrameDecoder::new();
                let mut buf = [0u8; 64 * 1024];
                loop {
                    match read_half.read(&mut buf).await {
                        Ok(0) => break,
                        Ok(n) => {
                            let frames = match decoder.feed(&buf[..n]) {
                                Ok(frames) => frames,
                                Err(e) => {
                                    log::error!("bridge decode error: {e}");
                                    break;
                                }
                            };
                            for frame in frames {
                                let event = match frame {
                                    Frame::Json(value) => match Message::from_value(value) {
                                        Ok(Message::Response(response)) => {
                                            ClientEvent::Response(response)
                                        }
                                        Ok(Message::Push(push)) => ClientEvent::Push(push),
                                        Ok(Message::Request(_)) => {
                                            log::warn!("daemon sent a request; ignoring");
                                            continue;
                                        }
                                        Err(e) => {
                                            log::error!("bridge message error: {e}");
                                            continue;
                                        }
                                    },
                                    Frame::PtyOutput { pty_id, data } => {
                                        ClientEvent::PtyOutput { pty_id, data }
                                    }
                                    Frame::PtyInput { .. } => continue,
                                };
                                if event_tx.send(event).is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            log::debug!("bridge read error: {e}");
                            break;
                        }
                    }
                }
                outbound.abort();
                let _ = event_tx.send(ClientEvent::Disconnected);
            });
        })
        .context("failed to spawn bridge thread")?;

    Ok((
        ClientHandle {
            out_tx,
            next_id: Arc::new(AtomicU64::new(1)),
        },
        event_rx,
    ))
}

/// Send one request and wait for its response, passing other events by.
///
/// For one-shot CLI verbs. Interleaved pushes and PTY output are dropped —
/// a one-shot client has nothing to do with them.
pub fn call(
    handle: &ClientHandle,
    events: &mpsc::Receiver<ClientEvent>,
    request: Request,
    timeout: Duration,
) -> Result<Response> {
    let id = handle.request(request);
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            bail!("timed out waiting for daemon response");
        }
        match events.recv_timeout(remaining) {
            Ok(ClientEvent::Response(response)) if response.id == id => return Ok(response),
            Ok(ClientEvent::Disconnected) => bail!("daemon closed the connection"),
            Ok(_) => continue,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                bail!("timed out waiting for daemon response")
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                bail!("bridge thread exited")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::daemon;

    fn unique_name(tag: &str) -> String {
        format!("_t_cli_{tag}_{}", std::process::id())
    }

    /// Start a daemon on a background runtime thread and wait until it
    /// answers on its socket.
    fn start_daemon(name: &str) -> std::thread::JoinHandle<()> {
        let name_owned = name.to_string();
        let handle = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();
            let _ = runtime.block_on(daemon::run(&name_owned));
        });
        for _ in 0..100 {
            if crate::session::daemon_alive(name) {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        handle
    }

    #[test]
    fn bridge_round_trip_and_call() {
        let name = unique_name("rt");
        let daemon_thread = start_daemon(&name);

        let (handle, events) = connect(&name).unwrap();
        assert!(handle.is_connected());

        let response = call(
            &handle,
            &events,
            Request::NotifyTerminalSize { cols: 90, rows: 28 },
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(response.ok);
        assert_eq!(response.data.unwrap()["effective_width"], 90);

        let response = call(
            &handle,
            &events,
            Request::SessionInfo,
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(response.ok);
        assert_eq!(response.data.unwrap()["clients"], 1);

        let _ = call(&handle, &events, Request::Shutdown, Duration::from_secs(5));
        let _ = daemon_thread.join();
        crate::session::SessionFiles::resolve(&name).unwrap().remove();
    }

    #[test]
    fn connect_to_missing_session_fails_fast() {
        assert!(connect("definitely.not.running").is_err());
    }
}
