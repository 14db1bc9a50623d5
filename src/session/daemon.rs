//! The session daemon: owns PTYs, fans output out to subscribed clients,
//! and holds the authoritative replicated state.
//!
//! ```text
//! Daemon process (tokio)
//! ┌─────────────────────────────────────────────┐
//! │ accept loop ──per client──> read task ──┐   │
//! │                             write task <─┼──┤
//! │ PTY reader threads ──std mpsc──> bridge ─┤  │
//! │                                          ▼  │
//! │                        central event loop   │
//! │  ptys: PtyHandle + shadow VT + subscribers  │
//! │  clients: frame queue + advertised size     │
//! │  state: SessionState (authoritative)        │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The daemon never interprets PTY output for rendering — fan-out is raw
//! bytes. A shadow VT per PTY serves `get_terminal_state` so late joiners
//! can catch up without replaying history. Slow subscribers are dropped
//! from the fan-out after a bounded queue fills, then logged.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

use crate::pty::{PtyEvent, PtyHandle, PtySpawnConfig};
use crate::term::{Vt, DEFAULT_SCROLLBACK_LINES};

use super::protocol::{
    self, CreatePtyReply, Frame, FrameDecoder, Message, Push, Request, RequestEnvelope, Response,
    SessionInfoReply, TerminalStateReply,
};
use super::state::{SessionState, TerminalState};

/// Bounded per-client frame queue; a client that can't drain this many
/// frames is disconnected rather than blocking the fan-out.
const CLIENT_QUEUE_DEPTH: usize = 1024;

/// Events the central loop processes.
#[derive(Debug)]
enum DaemonEvent {
    ClientConnected {
        client_id: String,
        frame_tx: mpsc::Sender<Vec<u8>>,
    },
    ClientDisconnected {
        client_id: String,
    },
    ClientMessage {
        client_id: String,
        message: Message,
    },
    ClientPtyInput {
        client_id: String,
        pty_id: u64,
        data: Vec<u8>,
    },
    Pty(PtyEvent),
    Shutdown,
}

/// One owned PTY with its shadow emulator and subscriber set.
struct DaemonPty {
    handle: PtyHandle,
    shadow: Arc<Mutex<Vt>>,
    subscribers: HashSet<String>,
}

/// One attached client.
struct DaemonClient {
    frame_tx: mpsc::Sender<Vec<u8>>,
    size: Option<(u16, u16)>,
}

/// In-flight remote command: which client asked, with which envelope id.
struct PendingCommand {
    requester: String,
    envelope_id: u64,
}

struct Daemon {
    name: String,
    ptys: HashMap<u64, DaemonPty>,
    clients: HashMap<String, DaemonClient>,
    state: SessionState,
    pending_commands: HashMap<String, PendingCommand>,
    next_pty_id: u64,
    pty_events: std::sync::mpsc::Sender<PtyEvent>,
    effective: (u16, u16),
}

/// Run the session daemon until shutdown. Binding the socket is the only
/// fatal failure; everything after that is recoverable.
pub async fn run(name: &str) -> Result<()> {
    let files = super::SessionFiles::resolve(name)?;
    if files.live() {
        anyhow::bail!("session {name:?} already has a running daemon");
    }
    // Nobody answered, so any socket file here is a dead daemon's
    // leftover and safe to replace.
    let _ = std::fs::remove_file(&files.socket);

    let listener = UnixListener::bind(&files.socket)
        .with_context(|| format!("failed to bind {}", files.socket.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&files.socket, std::fs::Permissions::from_mode(0o600))?;
    }
    files.write_pid()?;
    log::info!(
        "daemon for session {name} listening on {}",
        files.socket.display()
    );

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<DaemonEvent>();

    // Bridge: PTY reader threads (std mpsc) → tokio event loop.
    let (pty_tx, pty_rx) = std::sync::mpsc::channel::<PtyEvent>();
    {
        let event_tx = event_tx.clone();
        std::thread::spawn(move || {
            while let Ok(event) = pty_rx.recv() {
                if event_tx.send(DaemonEvent::Pty(event)).is_err() {
                    break;
                }
            }
        });
    }

    // SIGTERM/SIGINT → orderly shutdown.
    {
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("signal handler");
            let mut int = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
                .expect("signal handler");
            tokio::select! {
                _ = term.recv() => {}
                _ = int.recv() => {}
            }
            let _ = event_tx.send(DaemonEvent::Shutdown);
        });
    }

    // Accept loop.
    {
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let client_id = protocol::generate_client_id();
                        log::info!("client connected: {client_id}");
                        spawn_client_tasks(client_id, stream, event_tx.clone());
                    }
                    Err(e) => {
                        log::error!("accept error: {e}");
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }
        });
    }

    let mut daemon = Daemon {
        name: name.to_string(),
        ptys: HashMap::new(),
        clients: HashMap::new(),
        state: SessionState {
            name: name.to_string(),
            ..SessionState::default()
        },
        pending_commands: HashMap::new(),
        next_pty_id: 1,
        pty_events: pty_tx,
        effective: (0, 0),
    };

    while let Some(event) = event_rx.recv().await {
        if matches!(event, DaemonEvent::Shutdown) {
            log::info!("daemon shutting down");
            break;
        }
        daemon.handle_event(event);
    }

    for (_, pty) in daemon.ptys.drain() {
        pty.handle.close();
    }
    files.remove();
    log::info!("session {name}: daemon files removed");
    Ok(())
}

/// Spawn the read/write tasks for an accepted connection.
fn spawn_client_tasks(
    client_id: String,
    stream: UnixStream,
    event_tx: mpsc::UnboundedSender<DaemonEvent>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<u8>>(CLIENT_QUEUE_DEPTH);

    if event_tx
        .send(DaemonEvent::ClientConnected {
            client_id: client_id.clone(),
            frame_tx,
        })
        .is_err()
    {
        return;
    }

    // Write task.
    {
        let client_id = client_id.clone();
        tokio::spawn(async move {
            while let Some(bytes) = frame_rx.recv().await {
                if let Err(e) = write_half.write_all(&bytes).await {
                    log::debug!("write error for {client_id}: {e}");
                    break;
                }
            }
        });
    }

    // Read task.
    tokio::spawn(async move {
        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => match decoder.feed(&buf[..n]) {
                    Ok(frames) => {
                        for frame in frames {
                            let event = match frame {
                                Frame::Json(value) => match Message::from_value(value) {
                                    Ok(message) => DaemonEvent::ClientMessage {
                                        client_id: client_id.clone(),
                                        message,
                                    },
                                    Err(e) => {
                                        log::error!("malformed message from {client_id}: {e}");
                                        continue;
                                    }
                                },
                                Frame::PtyInput { pty_id, data } => DaemonEvent::ClientPtyInput {
                                    client_id: client_id.clone(),
                                    pty_id,
                                    data,
                                },
                                Frame::PtyOutput { .. } => {
                                    log::warn!("{client_id} sent a daemon-only frame type");
                                    continue;
                                }
                            };
                            if event_tx.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        log::error!("frame decode error from {client_id}: {e}");
                        break;
                    }
                },
                Err(e) => {
                    log::debug!("read error from {client_id}: {e}");
                    break;
                }
            }
        }
        let _ = event_tx.send(DaemonEvent::ClientDisconnected { client_id });
    });
}

impl Daemon {
    fn handle_event(&mut self, event: DaemonEvent) {
        match event {
            DaemonEvent::ClientConnected { client_id, frame_tx } => {
                self.clients.insert(
                    client_id,
                    DaemonClient {
                        frame_tx,
                        size: None,
                    },
                );
            }
            DaemonEvent::ClientDisconnected { client_id } => self.drop_client(&client_id),
            DaemonEvent::ClientMessage { client_id, message } => {
                self.handle_message(&client_id, message);
            }
            DaemonEvent::ClientPtyInput { client_id, pty_id, data } => {
                let Some(pty) = self.ptys.get(&pty_id) else {
                    log::debug!("{client_id} wrote to unknown PTY {pty_id}");
                    return;
                };
                if let Err(e) = pty.handle.write(&data) {
                    log::warn!("write to PTY {pty_id} failed: {e}");
                }
            }
            DaemonEvent::Pty(PtyEvent::Output { id, data }) => {
                let Some(pty) = self.ptys.get(&id) else {
                    return;
                };
                if pty.subscribers.is_empty() {
                    return;
                }
                let encoded = Frame::PtyOutput {
                    pty_id: id,
                    data: data.to_vec(),
                }
                .encode();
                let mut dead = Vec::new();
                for subscriber in &pty.subscribers {
                    let Some(client) = self.clients.get(subscriber) else {
                        continue;
                    };
                    if client.frame_tx.try_send(encoded.clone()).is_err() {
                        log::warn!("dropping slow subscriber {subscriber} of PTY {id}");
                        dead.push(subscriber.clone());
                    }
                }
                for subscriber in dead {
                    self.drop_client(&subscriber);
                }
            }
            DaemonEvent::Pty(PtyEvent::Exited { id, exit_code }) => {
                log::info!("PTY {id} exited (code {exit_code:?})");
                if let Some(pty) = self.ptys.remove(&id) {
                    pty.handle.close();
                }
                self.broadcast(Push::PtyClosed { pty_id: id }, None);
            }
            DaemonEvent::Shutdown => unreachable!("handled by the run loop"),
        }
    }

    fn handle_message(&mut self, client_id: &str, message: Message) {
        match message {
            Message::Request(envelope) => self.handle_request(client_id, envelope),
            Message::Response(_) | Message::Push(_) => {
                log::warn!("{client_id} sent a daemon-only message kind");
            }
        }
    }

    fn handle_request(&mut self, client_id: &str, envelope: RequestEnvelope) {
        let id = envelope.id;
        let response = match envelope.request {
            Request::CreatePty { title, cols, rows } => self.create_pty(title, cols, rows, id),
            Request::ResizePty { pty_id, cols, rows } => match self.ptys.get(&pty_id) {
                Some(pty) => {
                    if let Ok(mut shadow) = pty.shadow.lock() {
                        shadow.resize(rows.max(1) as usize, cols.max(1) as usize);
                    }
                    match pty.handle.resize(rows, cols) {
                        Ok(()) => Response::ok(id, None),
                        Err(e) => Response::err(id, e.to_string()),
                    }
                }
                None => Response::err(id, format!("no PTY {pty_id}")),
            },
            Request::ClosePty { pty_id } => match self.ptys.remove(&pty_id) {
                Some(pty) => {
                    pty.handle.close();
                    self.broadcast(Push::PtyClosed { pty_id }, None);
                    Response::ok(id, None)
                }
                None => Response::err(id, format!("no PTY {pty_id}")),
            },
            Request::SubscribePty { pty_id } => match self.ptys.get_mut(&pty_id) {
                Some(pty) => {
                    pty.subscribers.insert(client_id.to_string());
                    Response::ok(id, None)
                }
                None => Response::err(id, format!("no PTY {pty_id}")),
            },
            Request::UnsubscribePty { pty_id } => {
                if let Some(pty) = self.ptys.get_mut(&pty_id) {
                    pty.subscribers.remove(client_id);
                }
                Response::ok(id, None)
            }
            Request::GetTerminalState { pty_id, include_scrollback } => {
                match self.ptys.get(&pty_id) {
                    Some(pty) => match pty.shadow.lock() {
                        Ok(shadow) => {
                            let state = TerminalState::capture(&shadow, include_scrollback);
                            Response::ok(
                                id,
                                Some(
                                    serde_json::to_value(TerminalStateReply { state })
                                        .expect("terminal state serializes"),
                                ),
                            )
                        }
                        Err(_) => Response::err(id, "shadow VT lock poisoned"),
                    },
                    None => Response::err(id, format!("no PTY {pty_id}")),
                }
            }
            Request::UpdateState { state } => {
                self.state = state;
                let push = Push::StateSync {
                    state: self.state.clone(),
                    trigger: "update_state".to_string(),
                    source_id: client_id.to_string(),
                };
                self.broadcast(push, Some(client_id));
                Response::ok(id, None)
            }
            Request::NotifyTerminalSize { cols, rows } => {
                if let Some(client) = self.clients.get_mut(client_id) {
                    client.size = Some((cols, rows));
                }
                self.broadcast(
                    Push::ClientJoined {
                        client_id: client_id.to_string(),
                        count: self.clients.len(),
                        width: cols,
                        height: rows,
                    },
                    Some(client_id),
                );
                self.recompute_effective_size();
                // The attach handshake: the reply carries the full state.
                Response::ok(
                    id,
                    Some(json!({
                        "state": self.state,
                        "effective_width": self.effective.0,
                        "effective_height": self.effective.1,
                        "client_count": self.clients.len(),
                    })),
                )
            }
            Request::SendCommandResult {
                request_id,
                ok,
                message,
                data,
            } => {
                if let Some(pending) = self.pending_commands.remove(&request_id) {
                    let response = Response {
                        id: pending.envelope_id,
                        ok,
                        message,
                        data,
                    };
                    self.send_to(&pending.requester, Message::Response(response).into_frame());
                } else {
                    log::warn!("command result for unknown request {request_id}");
                }
                Response::ok(id, None)
            }
            Request::RunCommand { command } => {
                // Route to an attached UI client (one that advertised a
                // size); correlate the eventual result back to us.
                let target = self
                    .clients
                    .iter()
                    .find(|(cid, client)| *cid != client_id && client.size.is_some())
                    .map(|(cid, _)| cid.clone());
                match target {
                    Some(target) => {
                        let request_id = protocol::generate_request_id();
                        self.pending_commands.insert(
                            request_id.clone(),
                            PendingCommand {
                                requester: client_id.to_string(),
                                envelope_id: id,
                            },
                        );
                        let push = Push::RunCommand {
                            request_id,
                            command,
                        };
                        self.send_to(&target, Message::Push(push).into_frame());
                        return; // response comes via send_command_result
                    }
                    None => Response::err(id, "no attached UI client to run the command"),
                }
            }
            Request::SessionInfo => Response::ok(
                id,
                Some(
                    serde_json::to_value(SessionInfoReply {
                        name: self.name.clone(),
                        clients: self.clients.len(),
                        ptys: self.ptys.len(),
                        width: self.effective.0,
                        height: self.effective.1,
                        windows: self.state.windows.len(),
                    })
                    .expect("session info serializes"),
                ),
            ),
            Request::Detach => {
                let response = Response::ok(id, None);
                self.send_to(client_id, Message::Response(response).into_frame());
                self.drop_client(client_id);
                return;
            }
            Request::Shutdown => {
                let response = Response::ok(id, None);
                self.send_to(client_id, Message::Response(response).into_frame());
                // Raise SIGTERM at ourselves so the run loop exits through
                // the ordinary path.
                unsafe {
                    libc::kill(std::process::id() as libc::pid_t, libc::SIGTERM);
                }
                return;
            }
        };
        self.send_to(client_id, Message::Response(response).into_frame());
    }

    fn create_pty(&mut self, title: String, cols: u16, rows: u16, envelope_id: u64) -> Response {
        let pty_id = self.next_pty_id;
        let shadow = Arc::new(Mutex::new(Vt::new(
            rows.max(1) as usize,
            cols.max(1) as usize,
            DEFAULT_SCROLLBACK_LINES,
        )));
        let config = PtySpawnConfig {
            id: pty_id,
            rows,
            cols,
            command: None,
            session_name: self.name.clone(),
        };
        match PtyHandle::spawn(config, Arc::clone(&shadow), self.pty_events.clone()) {
            Ok(handle) => {
                self.next_pty_id += 1;
                log::info!("created PTY {pty_id} ({title}) at {cols}x{rows}");
                self.ptys.insert(
                    pty_id,
                    DaemonPty {
                        handle,
                        shadow,
                        subscribers: HashSet::new(),
                    },
                );
                Response::ok(
                    envelope_id,
                    Some(serde_json::to_value(CreatePtyReply { pty_id }).expect("reply serializes")),
                )
            }
            Err(e) => Response::err(envelope_id, format!("spawn failed: {e}")),
        }
    }

    fn drop_client(&mut self, client_id: &str) {
        if self.clients.remove(client_id).is_none() {
            return;
        }
        log::info!("client left: {client_id}");
        for pty in self.ptys.values_mut() {
            pty.subscribers.remove(client_id);
        }
        self.pending_commands
            .retain(|_, pending| pending.requester != client_id);
        self.broadcast(
            Push::ClientLeft {
                client_id: client_id.to_string(),
                count: self.clients.len(),
            },
            None,
        );
        self.recompute_effective_size();
    }

    /// Effective viewport = min over every advertised client size.
    fn recompute_effective_size(&mut self) {
        let sizes: Vec<(u16, u16)> = self.clients.values().filter_map(|c| c.size).collect();
        let new = if sizes.is_empty() {
            (0, 0)
        } else {
            (
                sizes.iter().map(|s| s.0).min().unwrap_or(0),
                sizes.iter().map(|s| s.1).min().unwrap_or(0),
            )
        };
        if new != self.effective && new != (0, 0) {
            self.effective = new;
            self.state.width = new.0;
            self.state.height = new.1;
            self.broadcast(
                Push::SessionResize {
                    width: new.0,
                    height: new.1,
                    count: self.clients.len(),
                },
                None,
            );
        } else {
            self.effective = new;
        }
    }

    fn send_to(&self, client_id: &str, frame: Frame) {
        if let Some(client) = self.clients.get(client_id) {
            if client.frame_tx.try_send(frame.encode()).is_err() {
                log::warn!("queue full sending to {client_id}");
            }
        }
    }

    fn broadcast(&self, push: Push, except: Option<&str>) {
        let encoded = Message::Push(push).into_frame().encode();
        for (client_id, client) in &self.clients {
            if Some(client_id.as_str()) == except {
                continue;
            }
            if client.frame_tx.try_send(encoded.clone()).is_err() {
                log::warn!("queue full broadcasting to {client_id}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::protocol::{Frame, FrameDecoder, Message, Push, Request, RequestEnvelope};
    use super::*;
    use tokio::io::AsyncWriteExt as _;

    /// Minimal test client over a raw socket.
    struct TestClient {
        stream: UnixStream,
        decoder: FrameDecoder,
        pending: Vec<Frame>,
        next_id: u64,
    }

    impl TestClient {
        async fn connect(path: &std::path::Path) -> Self {
            let mut last_err = None;
            for _ in 0..50 {
                match UnixStream::connect(path).await {
                    Ok(stream) => {
                        return Self {
                            stream,
                            decoder: FrameDecoder::new(),
                            pending: Vec::new(),
                            next_id: 1,
                        }
                    }
                    Err(e) => {
                        last_err = Some(e);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    }
                }
            }
            panic!("could not connect: {last_err:?}");
        }

        async fn request(&mut self, request: Request) -> u64 {
            let id = self.next_id;
            self.next_id += 1;
            let envelope = RequestEnvelope { id, request };
            let frame = Message::Request(envelope).into_frame();
            self.stream.write_all(&frame.encode()).await.unwrap();
            id
        }

        async fn next_frame(&mut self) -> Frame {
            if !self.pending.is_empty() {
                return self.pending.remove(0);
            }
            let mut buf = [0u8; 64 * 1024];
            loop {
                let n = tokio::time::timeout(
                    std::time::Duration::from_secs(5),
                    self.stream.read(&mut buf),
                )
                .await
                .expect("timed out")
                .expect("read failed");
                assert!(n > 0, "daemon closed the connection");
                let mut frames = self.decoder.feed(&buf[..n]).unwrap();
                if !frames.is_empty() {
                    let first = frames.remove(0);
                    self.pending.extend(frames);
                    return first;
                }
            }
        }

        /// Wait for the response with the given id; interleaved pushes are
        /// dropped (the tests re-request what they need afterwards) and
        /// PTY frames buffered.
        async fn response(&mut self, id: u64) -> super::super::protocol::Response {
            let mut stash = Vec::new();
            loop {
                match self.next_frame().await {
                    Frame::Json(value) => match Message::from_value(value).unwrap() {
                        Message::Response(response) if response.id == id => {
                            self.pending.extend(stash);
                            return response;
                        }
                        _ => continue,
                    },
                    frame => stash.push(frame),
                }
            }
        }

        /// Wait for a push matching the predicate, buffering the rest.
        async fn expect_push<F: Fn(&Push) -> bool>(&mut self, pred: F) -> Push {
            for _ in 0..100 {
                match self.next_frame().await {
                    Frame::Json(value) => match Message::from_value(value).unwrap() {
                        Message::Push(push) if pred(&push) => return push,
                        _ => continue,
                    },
                    _ => continue,
                }
            }
            panic!("push not observed");
        }
    }

    fn unique_name(tag: &str) -> String {
        format!("_t_{tag}_{}", std::process::id())
    }

    async fn start_daemon(name: &str) -> tokio::task::JoinHandle<Result<()>> {
        let name = name.to_string();
        tokio::spawn(async move { run(&name).await })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn attach_create_write_observe_output() {
        let name = unique_name("io");
        let handle = start_daemon(&name).await;
        let path = super::super::SessionFiles::resolve(&name).unwrap().socket;
        let mut client = TestClient::connect(&path).await;

        // Attach handshake.
        let id = client
            .request(Request::NotifyTerminalSize { cols: 100, rows: 30 })
            .await;
        let response = client.response(id).await;
        assert!(response.ok);
        let data = response.data.unwrap();
        assert_eq!(data["effective_width"], 100);

        // Create a PTY and subscribe.
        let id = client
            .request(Request::CreatePty {
                title: "shell".into(),
                cols: 80,
                rows: 24,
            })
            .await;
        let response = client.response(id).await;
        assert!(response.ok, "create failed: {:?}", response.message);
        let pty_id = response.data.unwrap()["pty_id"].as_u64().unwrap();

        let id = client.request(Request::SubscribePty { pty_id }).await;
        assert!(client.response(id).await.ok);

        // Drive the shell and watch raw output come back.
        let frame = Frame::PtyInput {
            pty_id,
            data: b"echo daemon-roundtrip\n".to_vec(),
        };
        client.stream.write_all(&frame.encode()).await.unwrap();

        let mut seen = Vec::new();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while std::time::Instant::now() < deadline {
            if let Frame::PtyOutput { pty_id: from, data } = client.next_frame().await {
                assert_eq!(from, pty_id);
                seen.extend_from_slice(&data);
                if seen
                    .windows(b"daemon-roundtrip".len())
                    .any(|w| w == b"daemon-roundtrip")
                {
                    break;
                }
            }
        }
        assert!(
            seen.windows(b"daemon-roundtrip".len())
                .any(|w| w == b"daemon-roundtrip"),
            "expected echoed output"
        );

        // The shadow VT serves terminal state snapshots.
        let id = client
            .request(Request::GetTerminalState {
                pty_id,
                include_scrollback: true,
            })
            .await;
        let response = client.response(id).await;
        assert!(response.ok);
        let state: TerminalState =
            serde_json::from_value(response.data.unwrap()["state"].clone()).unwrap();
        let text: String = state
            .cells
            .iter()
            .map(|row| {
                row.iter().map(|c| c.t.clone()).collect::<String>()
            })
            .collect();
        assert!(text.contains("daemon-roundtrip"));

        let id = client.request(Request::Shutdown).await;
        let _ = client.response(id).await;
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
        super::super::SessionFiles::resolve(&name).unwrap().remove();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn size_negotiation_is_min_over_clients() {
        let name = unique_name("size");
        let handle = start_daemon(&name).await;
        let path = super::super::SessionFiles::resolve(&name).unwrap().socket;

        let mut a = TestClient::connect(&path).await;
        let id = a
            .request(Request::NotifyTerminalSize { cols: 120, rows: 40 })
            .await;
        assert!(a.response(id).await.ok);

        let mut b = TestClient::connect(&path).await;
        let id = b
            .request(Request::NotifyTerminalSize { cols: 80, rows: 24 })
            .await;
        let response = b.response(id).await;
        assert_eq!(response.data.as_ref().unwrap()["effective_width"], 80);
        assert_eq!(response.data.as_ref().unwrap()["effective_height"], 24);

        // A sees the shrink.
        let push = a
            .expect_push(|p| matches!(p, Push::SessionResize { .. }))
            .await;
        assert_eq!(
            push,
            Push::SessionResize {
                width: 80,
                height: 24,
                count: 2
            }
        );

        // B detaches: effective size grows back and A is told.
        let id = b.request(Request::Detach).await;
        let _ = b.response(id).await;
        let push = a
            .expect_push(
                |p| matches!(p, Push::SessionResize { width: 120, height: 40, .. }),
            )
            .await;
        assert_eq!(
            push,
            Push::SessionResize {
                width: 120,
                height: 40,
                count: 1
            }
        );

        let id = a.request(Request::Shutdown).await;
        let _ = a.response(id).await;
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
        super::super::SessionFiles::resolve(&name).unwrap().remove();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn state_sync_fans_out_to_other_clients_only() {
        let name = unique_name("sync");
        let handle = start_daemon(&name).await;
        let path = super::super::SessionFiles::resolve(&name).unwrap().socket;

        let mut a = TestClient::connect(&path).await;
        let id = a
            .request(Request::NotifyTerminalSize { cols: 100, rows: 30 })
            .await;
        assert!(a.response(id).await.ok);
        let mut b = TestClient::connect(&path).await;
        let id = b
            .request(Request::NotifyTerminalSize { cols: 100, rows: 30 })
            .await;
        assert!(b.response(id).await.ok);

        let mut state = SessionState::default();
        state.name = name.clone();
        state.current_workspace = 4;
        let id = a.request(Request::UpdateState { state }).await;
        assert!(a.response(id).await.ok);

        let push = b
            .expect_push(|p| matches!(p, Push::StateSync { .. }))
            .await;
        match push {
            Push::StateSync { state, trigger, .. } => {
                assert_eq!(state.current_workspace, 4);
                assert_eq!(trigger, "update_state");
            }
            other => panic!("expected state sync, got {other:?}"),
        }

        let id = a.request(Request::Shutdown).await;
        let _ = a.response(id).await;
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
        super::super::SessionFiles::resolve(&name).unwrap().remove();
    }
}
