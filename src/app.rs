//! The UI application: terminal setup, the cooperative event loop, and
//! the two session backends (local PTYs or a daemon attachment).
//!
//! The loop is single-threaded: input events, render ticks, PTY output
//! notifications, daemon pushes, and tape steps are processed one message
//! at a time. Nothing else touches the window manager, so no UI code takes
//! a lock on it.
//!
//! ```text
//!            ┌── crossterm events (key/mouse/paste/resize)
//! one loop ──┼── PTY events (local) / ClientEvents (attached)
//!  iteration ├── TapeExecutor::step (one queued item)
//!            ├── WindowManager::housekeeping (prefix, toasts, animations)
//!            └── Renderer::prepare → draw (or frame-skip)
//! ```

use std::collections::HashMap;
use std::io::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{
    DisableMouseCapture, EnableMouseCapture, Event, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use uuid::Uuid;

use crate::config::Config;
use crate::constants::{CALLBACK_REENABLE_DELAY, SHUTDOWN_GRACE};
use crate::geom::Rect;
use crate::layout::Viewport;
use crate::pty::{PtyEvent, PtyHandle, PtySpawnConfig};
use crate::render::Renderer;
use crate::session::client::{self, ClientEvent, ClientHandle};
use crate::session::protocol::{Push, Request, Response, TerminalStateReply};
use crate::session::state::{SessionState, TerminalState};
use crate::tape::TapeExecutor;
use crate::window::Window;
use crate::wm::{input, Severity, WindowManager, WmEffect};

/// RAII terminal restore: raw mode off, alternate screen left, mouse
/// capture off, mirrored modes reset, cursor shown. Runs on drop so a
/// panic still leaves the host usable.
#[derive(Debug)]
pub struct TerminalGuard;

impl TerminalGuard {
    /// Arm the guard.
    pub fn new() -> Self {
        Self
    }
}

impl Default for TerminalGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let mut stdout = std::io::stdout();
        // Reset modes the focused window may have had us mirror.
        let _ = stdout.write_all(b"\x1b[?1l");
        let _ = stdout.write_all(b"\x1b[?2004l");
        let _ = stdout.write_all(b"\x1b[?1004l");
        let _ = execute!(stdout, PopKeyboardEnhancementFlags);
        let _ = execute!(stdout, LeaveAlternateScreen, DisableMouseCapture);
        let _ = execute!(stdout, crossterm::cursor::Show);
    }
}

/// Where windows get their PTYs from.
enum Backend {
    /// This process owns the PTYs.
    Local {
        session_name: String,
        pty_tx: mpsc::Sender<PtyEvent>,
        pty_rx: mpsc::Receiver<PtyEvent>,
        next_pty_id: u64,
    },
    /// A daemon owns them; we attach over the socket.
    Attached {
        session_name: String,
        handle: ClientHandle,
        events: mpsc::Receiver<ClientEvent>,
        /// create_pty requests in flight: request id → window name.
        pending_creates: HashMap<u64, Option<String>>,
        /// get_terminal_state requests in flight: request id → window.
        pending_states: HashMap<u64, Uuid>,
        /// PTYs we currently receive output for.
        subscribed: std::collections::HashSet<u64>,
        /// Re-enable VT callbacks at this instant (post-replay quiesce).
        callbacks_at: Option<Instant>,
        /// Last state snapshot we pushed, to avoid echo storms.
        last_pushed_state: Option<SessionState>,
        last_push: Instant,
    },
}

/// The running application.
pub struct App {
    wm: WindowManager,
    renderer: Renderer,
    executor: TapeExecutor,
    backend: Backend,
    shutdown: Arc<AtomicBool>,
    quit: bool,
}

impl App {
    /// Build a local (daemon-less) app.
    pub fn new_local(
        config: Config,
        session_name: &str,
        width: u16,
        height: u16,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let viewport = Viewport {
            width,
            height,
            dockbar: config.dockbar_position,
        };
        let (pty_tx, pty_rx) = mpsc::channel();
        Self {
            wm: WindowManager::new(config, viewport),
            renderer: Renderer::new(),
            executor: TapeExecutor::new(),
            backend: Backend::Local {
                session_name: session_name.to_string(),
                pty_tx,
                pty_rx,
                next_pty_id: 1,
            },
            shutdown,
            quit: false,
        }
    }

    /// Attach to a daemon session: handshake, reconstruct state, and
    /// subscribe the current workspace.
    pub fn new_attached(
        config: Config,
        session_name: &str,
        width: u16,
        height: u16,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        let (handle, events) = client::connect(session_name)?;

        let response = client::call(
            &handle,
            &events,
            Request::NotifyTerminalSize {
                cols: width,
                rows: height,
            },
            Duration::from_secs(5),
        )?;
        if !response.ok {
            anyhow::bail!(
                "attach rejected: {}",
                response.message.unwrap_or_default()
            );
        }
        let data = response.data.context("attach reply carried no state")?;
        let state: SessionState = serde_json::from_value(data["state"].clone())
            .context("malformed session state")?;
        let effective_width = data["effective_width"].as_u64().unwrap_or(width as u64) as u16;
        let effective_height = data["effective_height"].as_u64().unwrap_or(height as u64) as u16;

        let viewport = Viewport {
            width: effective_width.max(2),
            height: effective_height.max(2),
            dockbar: config.dockbar_position,
        };
        let mut wm = WindowManager::new(config, viewport);
        apply_session_state(&mut wm, &state);

        let mut app = Self {
            wm,
            renderer: Renderer::new(),
            executor: TapeExecutor::new(),
            backend: Backend::Attached {
                session_name: session_name.to_string(),
                handle,
                events,
                pending_creates: HashMap::new(),
                pending_states: HashMap::new(),
                subscribed: std::collections::HashSet::new(),
                callbacks_at: None,
                last_pushed_state: Some(state),
                last_push: Instant::now(),
            },
            shutdown,
            quit: false,
        };
        app.sync_subscriptions();
        Ok(app)
    }

    /// Run the event loop until quit/detach.
    pub fn run(&mut self, terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>) -> Result<()> {
        // Local sessions start with one window so there is something to
        // type into; attached sessions restore whatever the daemon has.
        if matches!(self.backend, Backend::Local { .. }) && self.wm.windows.is_empty() {
            self.apply_effects(vec![WmEffect::CreateWindow { name: None }]);
        }

        while !self.quit && !self.shutdown.load(Ordering::Relaxed) {
            let tier = self.renderer.fps_tier(&self.wm);
            let timeout = tier.interval();

            // Input.
            if crossterm::event::poll(timeout)? {
                let event = crossterm::event::read()?;
                self.handle_event(event);
                // Drain whatever queued behind it without waiting.
                while crossterm::event::poll(Duration::ZERO)? {
                    let event = crossterm::event::read()?;
                    self.handle_event(event);
                }
            }

            // Backend traffic (PTY output, daemon pushes).
            self.pump_backend();

            // One tape step per iteration keeps remote key sequencing
            // deterministic.
            let now = Instant::now();
            let effects = self.executor.step(&mut self.wm, now);
            self.apply_effects(effects);

            self.wm.housekeeping(now);
            self.drain_vt_events();
            self.maybe_reenable_callbacks();
            self.push_state_if_changed();

            if self.renderer.prepare(&mut self.wm) {
                terminal.draw(|frame| {
                    let area = frame.area();
                    self.renderer.render(&mut self.wm, area, frame.buffer_mut());
                })?;
                if let Some(bytes) = self.renderer.graphics_passthrough(&self.wm) {
                    let mut stdout = std::io::stdout();
                    let _ = stdout.write_all(&bytes);
                    let _ = stdout.flush();
                }
            }
        }

        self.shutdown_windows();
        Ok(())
    }

    fn handle_event(&mut self, event: Event) {
        let effects = match event {
            Event::Key(key) => input::handle_key(&mut self.wm, &key),
            Event::Mouse(mouse) => input::handle_mouse(&mut self.wm, &mouse),
            Event::Paste(text) => input::handle_paste(&mut self.wm, &text),
            Event::Resize(width, height) => {
                self.host_resized(width, height);
                Vec::new()
            }
            Event::FocusGained | Event::FocusLost => Vec::new(),
        };
        self.apply_effects(effects);
    }

    fn host_resized(&mut self, width: u16, height: u16) {
        match &self.backend {
            Backend::Local { .. } => {
                self.wm.viewport_resized(width, height);
            }
            Backend::Attached { handle, .. } => {
                // Advertise; the daemon pushes the new effective size.
                handle.request(Request::NotifyTerminalSize {
                    cols: width,
                    rows: height,
                });
            }
        }
    }

    fn apply_effects(&mut self, effects: Vec<WmEffect>) {
        for effect in effects {
            match effect {
                WmEffect::CreateWindow { name } => self.create_window(name),
                WmEffect::CloseWindow { window } => self.close_window(window),
                WmEffect::WritePty { window, bytes } => self.write_pty(window, &bytes),
                WmEffect::Quit => self.quit = true,
                WmEffect::Detach => match &self.backend {
                    Backend::Attached { handle, .. } => {
                        handle.request(Request::Detach);
                        self.quit = true;
                    }
                    Backend::Local { .. } => {
                        self.wm
                            .notify(Severity::Warning, "not attached to a daemon session");
                    }
                },
            }
        }
    }

    fn create_window(&mut self, name: Option<String>) {
        let bounds = self.wm.spawn_bounds();
        match &mut self.backend {
            Backend::Local {
                session_name,
                pty_tx,
                next_pty_id,
                ..
            } => {
                let mut window = Window::new(
                    bounds,
                    self.wm.current_workspace,
                    self.wm.config.scrollback_lines,
                );
                window.custom_name = name;
                let (rows, cols) = window.interior();
                let config = PtySpawnConfig {
                    id: *next_pty_id,
                    rows,
                    cols,
                    command: None,
                    session_name: session_name.clone(),
                };
                match PtyHandle::spawn(config, Arc::clone(&window.vt), pty_tx.clone()) {
                    Ok(pty) => {
                        *next_pty_id += 1;
                        window.attach_pty(pty);
                        self.wm.add_window(window);
                    }
                    Err(e) => {
                        self.wm
                            .notify(Severity::Error, format!("window spawn failed: {e}"));
                    }
                }
            }
            Backend::Attached {
                handle,
                pending_creates,
                ..
            } => {
                let (rows, cols) = crate::window::interior_size(bounds);
                let id = handle.request(Request::CreatePty {
                    title: name.clone().unwrap_or_default(),
                    cols,
                    rows,
                });
                pending_creates.insert(id, name);
            }
        }
    }

    fn close_window(&mut self, id: Uuid) {
        let pty_id = self.wm.window(id).and_then(|w| w.pty_id);
        if let Some(mut window) = self.wm.remove_window(id) {
            window.close();
        }
        if let (Backend::Attached { handle, subscribed, .. }, Some(pty_id)) =
            (&mut self.backend, pty_id)
        {
            subscribed.remove(&pty_id);
            handle.request(Request::ClosePty { pty_id });
        }
    }

    fn write_pty(&mut self, id: Uuid, bytes: &[u8]) {
        let Some(window) = self.wm.window(id) else {
            return;
        };
        match &self.backend {
            Backend::Local { .. } => {
                if let Err(e) = window.write_input(bytes) {
                    self.wm
                        .notify(Severity::Error, format!("PTY write failed: {e}"));
                }
            }
            Backend::Attached { handle, .. } => {
                if let Some(pty_id) = window.pty_id {
                    handle.send_pty_input(pty_id, bytes.to_vec());
                }
            }
        }
    }

    /// Drain backend events without blocking.
    fn pump_backend(&mut self) {
        match &mut self.backend {
            Backend::Local { pty_rx, .. } => {
                let events: Vec<PtyEvent> = pty_rx.try_iter().collect();
                for event in events {
                    match event {
                        // Output already reached the VT via the reader
                        // thread; the renderer picks it up from the
                        // has_new_output flag.
                        PtyEvent::Output { .. } => {}
                        PtyEvent::Exited { id, exit_code } => {
                            let window = self
                                .wm
                                .windows
                                .iter()
                                .find(|w| w.pty_id == Some(id))
                                .map(|w| w.id);
                            if let Some(window_id) = window {
                                self.wm.log(
                                    Severity::Info,
                                    format!("window exited (code {exit_code:?})"),
                                );
                                self.close_window(window_id);
                            }
                        }
                    }
                }
            }
            Backend::Attached { events, .. } => {
                let drained: Vec<ClientEvent> = events.try_iter().collect();
                for event in drained {
                    self.handle_client_event(event);
                }
            }
        }
    }

    fn handle_client_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::PtyOutput { pty_id, data } => {
                let vt = self
                    .wm
                    .windows
                    .iter()
                    .find(|w| w.pty_id == Some(pty_id))
                    .map(|w| Arc::clone(&w.vt));
                if let Some(vt) = vt {
                    let responses = {
                        let Ok(mut vt) = vt.lock() else { return };
                        vt.write(&data);
                        vt.take_responses()
                    };
                    // Emulator query replies route back through the daemon.
                    if !responses.is_empty() {
                        if let Backend::Attached { handle, .. } = &self.backend {
                            handle.send_pty_input(pty_id, responses);
                        }
                    }
                }
            }
            ClientEvent::Response(response) => self.handle_response(response),
            ClientEvent::Push(push) => self.handle_push(push),
            ClientEvent::Disconnected => {
                self.wm.notify(Severity::Error, "session connection lost");
                self.quit = true;
            }
        }
    }

    fn handle_response(&mut self, response: Response) {
        let Backend::Attached {
            pending_creates,
            pending_states,
            ..
        } = &mut self.backend
        else {
            return;
        };

        if let Some(name) = pending_creates.remove(&response.id) {
            if !response.ok {
                self.wm.notify(
                    Severity::Error,
                    format!(
                        "create window failed: {}",
                        response.message.unwrap_or_default()
                    ),
                );
                return;
            }
            let pty_id = response
                .data
                .as_ref()
                .and_then(|d| d["pty_id"].as_u64())
                .unwrap_or(0);
            let bounds = self.wm.spawn_bounds();
            let mut window = Window::new(
                bounds,
                self.wm.current_workspace,
                self.wm.config.scrollback_lines,
            );
            window.custom_name = name;
            window.pty_id = Some(pty_id);
            self.wm.add_window(window);
            self.sync_subscriptions();
            return;
        }

        if let Some(window_id) = pending_states.remove(&response.id) {
            if !response.ok {
                log::warn!(
                    "terminal state fetch failed: {}",
                    response.message.unwrap_or_default()
                );
                return;
            }
            let Some(data) = response.data else { return };
            let reply: TerminalStateReply = match serde_json::from_value(data) {
                Ok(reply) => reply,
                Err(e) => {
                    log::error!("malformed terminal state: {e}");
                    return;
                }
            };
            self.apply_terminal_state(window_id, &reply.state);
            return;
        }

        if !response.ok {
            self.wm.notify(
                Severity::Warning,
                format!("daemon: {}", response.message.unwrap_or_default()),
            );
        }
    }

    /// Apply a restored grid to a window's VT with callbacks quiesced, and
    /// nudge alt-screen children into redrawing.
    fn apply_terminal_state(&mut self, window_id: Uuid, state: &TerminalState) {
        let Some(window) = self.wm.window_mut(window_id) else {
            return;
        };
        let pty_id = window.pty_id;
        {
            let Ok(mut vt) = window.vt.lock() else { return };
            vt.set_callbacks_enabled(false);
            state.apply(&mut vt);
        }
        window.is_alt_screen = state.is_alt_screen;
        window.title = state.title.clone();
        window.invalidate_cache();

        if let Backend::Attached {
            handle,
            callbacks_at,
            ..
        } = &mut self.backend
        {
            *callbacks_at = Some(Instant::now() + CALLBACK_REENABLE_DELAY);
            // Alt-screen programs repaint on SIGWINCH: fake a one-cell
            // shrink, then restore the real size.
            if state.is_alt_screen {
                if let Some(pty_id) = pty_id {
                    handle.request(Request::ResizePty {
                        pty_id,
                        cols: state.width.saturating_sub(1).max(1),
                        rows: state.height,
                    });
                    handle.request(Request::ResizePty {
                        pty_id,
                        cols: state.width,
                        rows: state.height,
                    });
                }
            }
        }
    }

    fn maybe_reenable_callbacks(&mut self) {
        let Backend::Attached { callbacks_at, .. } = &mut self.backend else {
            return;
        };
        let Some(at) = *callbacks_at else { return };
        if Instant::now() < at {
            return;
        }
        *callbacks_at = None;
        for window in &self.wm.windows {
            if let Ok(mut vt) = window.vt.lock() {
                vt.set_callbacks_enabled(true);
            }
        }
    }

    fn handle_push(&mut self, push: Push) {
        match push {
            Push::StateSync { state, source_id, .. } => {
                log::debug!("state sync from {source_id}");
                apply_session_state(&mut self.wm, &state);
                if let Backend::Attached {
                    last_pushed_state, ..
                } = &mut self.backend
                {
                    *last_pushed_state = Some(state);
                }
                self.sync_subscriptions();
            }
            Push::SessionResize { width, height, count } => {
                self.wm.log(
                    Severity::Info,
                    format!("effective size now {width}x{height} ({count} clients)"),
                );
                self.wm.viewport_resized(width, height);
                // Resize every daemon PTY to the new tiled interiors.
                let resizes: Vec<(u64, u16, u16)> = self
                    .wm
                    .windows
                    .iter()
                    .filter_map(|w| {
                        let (rows, cols) = w.interior();
                        w.pty_id.map(|id| (id, cols, rows))
                    })
                    .collect();
                if let Backend::Attached { handle, .. } = &self.backend {
                    for (pty_id, cols, rows) in resizes {
                        handle.request(Request::ResizePty { pty_id, cols, rows });
                    }
                }
            }
            Push::PtyClosed { pty_id } => {
                let window = self
                    .wm
                    .windows
                    .iter()
                    .find(|w| w.pty_id == Some(pty_id))
                    .map(|w| w.id);
                if let Some(id) = window {
                    self.wm.log(Severity::Info, "remote window closed");
                    if let Some(mut w) = self.wm.remove_window(id) {
                        w.close();
                    }
                }
            }
            Push::ClientJoined { count, .. } => {
                self.wm
                    .notify(Severity::Info, format!("client attached ({count} total)"));
            }
            Push::ClientLeft { count, .. } => {
                self.wm
                    .notify(Severity::Info, format!("client detached ({count} left)"));
            }
            Push::ForceRefresh { .. } => {
                for window in &mut self.wm.windows {
                    window.invalidate_cache();
                }
            }
            Push::RunCommand { request_id, command } => {
                self.run_remote_command(request_id, command);
            }
        }
    }

    /// Execute a remote command and reply through the daemon.
    fn run_remote_command(&mut self, request_id: String, command: crate::tape::TapeCommand) {
        use crate::tape::TapeCommand;

        // Key streams go through the serial executor; everything else is
        // immediate so the reply can carry inspection data.
        let is_keys = matches!(
            command,
            TapeCommand::SendKeys { .. } | TapeCommand::Sleep { .. }
        );
        let (ok, message, data) = if is_keys {
            self.executor.start(&mut self.wm, vec![command]);
            (true, None, None)
        } else {
            match crate::tape::execute_command(&mut self.wm, &command) {
                Ok((effects, result)) => {
                    self.apply_effects(effects);
                    let data = (!result.is_null()).then_some(result);
                    (true, None, data)
                }
                Err(e) => (false, Some(e.to_string()), None),
            }
        };

        if let Backend::Attached { handle, .. } = &self.backend {
            handle.request(Request::SendCommandResult {
                request_id,
                ok,
                message,
                data,
            });
        }
    }

    /// Subscribe windows in the current workspace, unsubscribe the rest,
    /// and fetch terminal state for newly subscribed PTYs.
    fn sync_subscriptions(&mut self) {
        let desired: std::collections::HashSet<u64> = self
            .wm
            .windows
            .iter()
            .filter(|w| w.workspace == self.wm.current_workspace)
            .filter_map(|w| w.pty_id)
            .collect();
        let by_pty: HashMap<u64, Uuid> = self
            .wm
            .windows
            .iter()
            .filter_map(|w| w.pty_id.map(|p| (p, w.id)))
            .collect();

        let Backend::Attached {
            handle,
            subscribed,
            pending_states,
            ..
        } = &mut self.backend
        else {
            return;
        };

        for pty_id in desired.difference(&subscribed.clone()) {
            handle.request(Request::SubscribePty { pty_id: *pty_id });
            let id = handle.request(Request::GetTerminalState {
                pty_id: *pty_id,
                include_scrollback: true,
            });
            if let Some(window_id) = by_pty.get(pty_id) {
                pending_states.insert(id, *window_id);
            }
            subscribed.insert(*pty_id);
        }
        for pty_id in subscribed.clone().difference(&desired) {
            handle.request(Request::UnsubscribePty { pty_id: *pty_id });
            subscribed.remove(pty_id);
        }
    }

    /// Forward VT events (titles, alt-screen flips) into window state.
    fn drain_vt_events(&mut self) {
        let previous_workspace = self.wm.current_workspace;
        for window in &mut self.wm.windows {
            if window.sync_from_vt() {
                // Titles and alt-screen flags feed the border and mouse
                // forwarding decisions.
            }
            if let Ok(mut vt) = window.vt.lock() {
                for event in vt.drain_events() {
                    log::trace!("vt event from {}: {event:?}", window.id);
                }
            }
        }
        // Workspace may have changed through input handlers this tick.
        if previous_workspace != self.wm.current_workspace {
            self.sync_subscriptions();
        }
    }

    /// Replicate local layout mutations to the daemon, debounced.
    fn push_state_if_changed(&mut self) {
        let session_name = match &self.backend {
            Backend::Attached { session_name, .. } => session_name.clone(),
            Backend::Local { .. } => return,
        };
        let current = SessionState::capture(&self.wm, &session_name);
        let Backend::Attached {
            handle,
            last_pushed_state,
            last_push,
            ..
        } = &mut self.backend
        else {
            return;
        };
        if last_push.elapsed() < Duration::from_millis(100) {
            return;
        }
        if last_pushed_state.as_ref() == Some(&current) {
            return;
        }
        handle.request(Request::UpdateState {
            state: current.clone(),
        });
        *last_pushed_state = Some(current);
        *last_push = Instant::now();
    }

    /// Close every local PTY with a bounded grace period.
    fn shutdown_windows(&mut self) {
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        let windows = std::mem::take(&mut self.wm.windows);
        for mut window in windows {
            window.close();
            if Instant::now() >= deadline {
                break;
            }
        }
    }
}

/// Rebuild manager state from a replicated snapshot.
///
/// Windows are matched by id: existing ones update in place (keeping
/// their VT contents), new ones appear without a local PTY, and ones
/// absent from the snapshot are dropped. Unknown BSP window ids are
/// skipped by the tree deserializer.
pub fn apply_session_state(wm: &mut WindowManager, state: &SessionState) {
    let known: std::collections::HashSet<Uuid> =
        state.windows.iter().map(|w| w.id).collect();
    wm.windows.retain(|w| known.contains(&w.id));

    for wire in &state.windows {
        let bounds = Rect::new(wire.x, wire.y, wire.w, wire.h);
        match wm.window_mut(wire.id) {
            Some(window) => {
                window.bounds = bounds;
                window.z = wire.z;
                window.workspace = wire.workspace;
                window.minimized = wire.minimized;
                window.pre_minimize_bounds = wire.pre_minimize;
                window.title = wire.title.clone();
                window.custom_name = wire.custom_name.clone();
                window.pty_id = wire.pty_id;
                window.is_alt_screen = wire.is_alt_screen;
                window.invalidate_cache();
            }
            None => {
                let mut window =
                    Window::new(bounds, wire.workspace, wm.config.scrollback_lines);
                window.id = wire.id;
                window.bounds = bounds;
                window.z = wire.z;
                window.title = wire.title.clone();
                window.custom_name = wire.custom_name.clone();
                window.minimized = wire.minimized;
                window.pre_minimize_bounds = wire.pre_minimize;
                window.pty_id = wire.pty_id;
                window.is_alt_screen = wire.is_alt_screen;
                wm.windows.push(window);
            }
        }
    }

    if state.current_workspace >= 1 {
        wm.current_workspace = state.current_workspace;
    }
    wm.auto_tiling = state.auto_tiling;
    for (workspace, focus) in &state.workspace_focus {
        wm.workspace_mut(*workspace).focus = Some(*focus);
    }
    for (workspace, wire_tree) in &state.bsp_trees {
        wm.workspace_mut(*workspace).bsp = crate::layout::BspTree::from_wire(wire_tree);
    }
    if let Some(focus) = state.focused_window {
        wm.workspace_mut(state.current_workspace).focus = Some(focus);
        wm.raise(focus);
    }
}

/// Set up the host terminal, run `app`, and restore on the way out.
pub fn run_with_terminal(app: &mut App) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    // Disambiguated escapes keep modified keys (ctrl+enter etc.) distinct.
    let _ = execute!(
        stdout,
        PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
    );
    let _guard = TerminalGuard::new();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    app.run(&mut terminal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DockbarPosition;
    use crate::session::state::WindowState;

    fn local_app() -> App {
        App::new_local(
            Config::default(),
            "test",
            120,
            40,
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[test]
    fn apply_session_state_reconstructs_windows() {
        let mut app = local_app();
        let id = Uuid::new_v4();
        let state = SessionState {
            name: "s".into(),
            current_workspace: 2,
            width: 120,
            height: 40,
            auto_tiling: true,
            mode: None,
            windows: vec![WindowState {
                id,
                title: "vim".into(),
                custom_name: Some("edit".into()),
                x: 3,
                y: 4,
                w: 50,
                h: 20,
                z: 1,
                workspace: 2,
                minimized: false,
                pre_minimize: None,
                pty_id: Some(9),
                is_alt_screen: true,
            }],
            workspace_focus: [(2usize, id)].into_iter().collect(),
            bsp_trees: HashMap::new(),
            focused_window: Some(id),
        };

        apply_session_state(&mut app.wm, &state);
        assert_eq!(app.wm.current_workspace, 2);
        assert!(app.wm.auto_tiling);
        let window = app.wm.window(id).unwrap();
        assert_eq!(window.bounds, Rect::new(3, 4, 50, 20));
        assert_eq!(window.pty_id, Some(9));
        assert!(window.is_alt_screen);
        assert_eq!(app.wm.focused_id(), Some(id));
    }

    #[test]
    fn apply_session_state_drops_absent_windows() {
        let mut app = local_app();
        app.apply_effects(vec![]);
        let stale = Window::new(Rect::new(0, 0, 30, 10), 1, 100);
        let stale_id = stale.id;
        app.wm.add_window(stale);
        assert!(app.wm.window(stale_id).is_some());

        apply_session_state(&mut app.wm, &SessionState::default());
        assert!(app.wm.window(stale_id).is_none());
    }

    #[test]
    fn apply_session_state_updates_in_place_keeping_vt() {
        let mut app = local_app();
        let window = Window::new(Rect::new(0, 0, 30, 10), 1, 100);
        let id = window.id;
        window.vt.lock().unwrap().write(b"preserved");
        app.wm.add_window(window);

        let state = SessionState {
            current_workspace: 1,
            windows: vec![WindowState {
                id,
                title: String::new(),
                custom_name: None,
                x: 5,
                y: 6,
                w: 40,
                h: 12,
                z: 0,
                workspace: 1,
                minimized: false,
                pre_minimize: None,
                pty_id: None,
                is_alt_screen: false,
            }],
            ..SessionState::default()
        };
        apply_session_state(&mut app.wm, &state);

        let window = app.wm.window(id).unwrap();
        assert_eq!(window.bounds, Rect::new(5, 6, 40, 12));
        let vt = window.vt.lock().unwrap();
        assert_eq!(vt.screen().row(0).text(), "preserved");
    }

    #[test]
    fn local_effects_create_and_close_windows() {
        let mut app = local_app();
        app.wm.animations_suppressed = true;
        app.apply_effects(vec![WmEffect::CreateWindow {
            name: Some("shell".into()),
        }]);
        assert_eq!(app.wm.windows.len(), 1);
        let id = app.wm.windows[0].id;
        assert!(app.wm.windows[0].has_local_pty());
        assert_eq!(app.wm.windows[0].custom_name.as_deref(), Some("shell"));

        app.apply_effects(vec![WmEffect::CloseWindow { window: id }]);
        assert!(app.wm.windows.is_empty());
    }

    #[test]
    fn pty_exit_event_closes_its_window() {
        let mut app = local_app();
        app.wm.animations_suppressed = true;
        app.apply_effects(vec![WmEffect::CreateWindow { name: None }]);
        let pty_id = app.wm.windows[0].pty_id.unwrap();

        // Simulate child exit arriving on the event channel.
        if let Backend::Local { pty_tx, .. } = &app.backend {
            pty_tx
                .send(PtyEvent::Exited {
                    id: pty_id,
                    exit_code: Some(0),
                })
                .unwrap();
        }
        app.pump_backend();
        assert!(app.wm.windows.is_empty());
        assert!(app
            .wm
            .log_ring
            .iter()
            .any(|entry| entry.message.contains("exited")));
    }

    #[test]
    fn quit_effect_stops_the_loop() {
        let mut app = local_app();
        app.apply_effects(vec![WmEffect::Quit]);
        assert!(app.quit);
    }

    #[test]
    fn viewport_follows_dockbar_config() {
        let config = Config {
            dockbar_position: DockbarPosition::Top,
            ..Config::default()
        };
        let app = App::new_local(config, "t", 100, 30, Arc::new(AtomicBool::new(false)));
        assert_eq!(app.wm.viewport.usable().y, 1);
    }
}
