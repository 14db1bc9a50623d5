//! tuios binary entry point: CLI parsing and verb dispatch.
//!
//! The TUI owns stdout, so logs go to a file (`TUIOS_LOG_FILE` overrides
//! the default under the data dir). A panic hook restores the host
//! terminal before the backtrace prints.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossterm::event::{DisableMouseCapture, PopKeyboardEnhancementFlags};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, LeaveAlternateScreen};
use tuios::app::{self, App};
use tuios::config::Config;
use tuios::session::{self, client, protocol::Request};
use tuios::tape::{self, TapeCommand};

/// Shutdown flag shared with the signal handlers.
static SHUTDOWN_FLAG: std::sync::LazyLock<Arc<AtomicBool>> =
    std::sync::LazyLock::new(|| Arc::new(AtomicBool::new(false)));

#[derive(Parser)]
#[command(name = "tuios", version, about = "Terminal-hosted window manager")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Session name (defaults to $TUIOS_SESSION, then "default").
    #[arg(long, global = true)]
    session: Option<String>,

    /// Extra debug logging.
    #[arg(long, global = true)]
    debug: bool,

    /// ASCII-only decorations.
    #[arg(long, global = true)]
    ascii_only: bool,

    /// Theme identifier.
    #[arg(long, global = true)]
    theme: Option<String>,

    /// Border style (rounded, plain, double, thick).
    #[arg(long, global = true)]
    border_style: Option<String>,

    /// Dockbar position (top, bottom, hidden).
    #[arg(long, global = true)]
    dockbar_position: Option<String>,

    /// Hide window buttons on borders.
    #[arg(long, global = true)]
    hide_window_buttons: bool,

    /// Scrollback lines per window.
    #[arg(long, global = true)]
    scrollback_lines: Option<usize>,

    /// Show pressed keys in the dockbar.
    #[arg(long, global = true)]
    show_keys: bool,

    /// Disable window animations.
    #[arg(long, global = true)]
    no_animations: bool,

    /// Window title position (top, bottom, hidden).
    #[arg(long, global = true)]
    window_title_position: Option<String>,

    /// Hide the clock.
    #[arg(long, global = true)]
    hide_clock: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run standalone (no daemon). The default.
    Run,
    /// Run a session daemon in the foreground.
    Daemon,
    /// Start a session daemon in the background.
    StartServer {
        /// Session name.
        name: Option<String>,
    },
    /// Stop a session daemon.
    KillServer {
        /// Session name.
        name: Option<String>,
    },
    /// Attach to a running session.
    Attach {
        /// Session name.
        name: Option<String>,
    },
    /// Create (if needed) and attach to a session.
    New {
        /// Session name.
        name: Option<String>,
    },
    /// List running sessions.
    Ls,
    /// Kill a session daemon by name.
    KillSession {
        /// Session name.
        name: String,
    },
    /// Send keys to the attached session.
    SendKeys {
        /// Key tokens ($PREFIX expands to the leader).
        keys: String,
        /// Bypass parsing; stream the bytes to the focused PTY.
        #[arg(long)]
        literal: bool,
        /// Each character becomes an independent key event.
        #[arg(long)]
        raw: bool,
    },
    /// Run a single command in the session (tape syntax).
    RunCommand {
        /// Command verb.
        command: String,
        /// Arguments.
        args: Vec<String>,
    },
    /// Set a config value (dot path) in the running session.
    SetConfig {
        /// Config path.
        path: String,
        /// New value.
        value: String,
    },
    /// List windows in the session as JSON.
    ListWindows,
    /// Show one window as JSON.
    GetWindow {
        /// Window id or name (focused when omitted).
        target: Option<String>,
    },
    /// Session summary.
    SessionInfo,
    /// Print the log file.
    Logs,
    /// Tape automation.
    Tape {
        #[command(subcommand)]
        command: TapeCli,
    },
    /// Configuration file management.
    Config {
        #[command(subcommand)]
        command: ConfigCli,
    },
    /// Keybinding listings.
    Keybinds {
        #[command(subcommand)]
        command: KeybindsCli,
    },
}

#[derive(Subcommand)]
enum TapeCli {
    /// Play a recorded tape in the attached session.
    Play {
        /// Tape name (with or without .tape).
        name: String,
    },
    /// Execute inline tape statements.
    Exec {
        /// Statements, e.g. 'CreateWindow "A"; Type "ls\n"'.
        script: String,
    },
    /// Parse a tape file without executing it.
    Validate {
        /// Path to a tape file.
        file: String,
    },
    /// List recorded tapes.
    List,
    /// Print a tape's contents.
    Show {
        /// Tape name.
        name: String,
    },
    /// Delete a tape.
    Delete {
        /// Tape name.
        name: String,
    },
    /// Print the tapes directory.
    Dir,
}

#[derive(Subcommand)]
enum ConfigCli {
    /// Print the config file path.
    Path,
    /// Open the config in $EDITOR / $VISUAL.
    Edit,
    /// Reset the config to defaults.
    Reset,
}

#[derive(Subcommand)]
enum KeybindsCli {
    /// List all keybindings.
    List,
    /// List only user-customized keybindings.
    ListCustom,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug)?;
    install_panic_hook();

    let mut config = Config::load()?;
    config.apply_overrides(
        cli.debug,
        cli.ascii_only,
        cli.theme.as_deref(),
        cli.border_style.as_deref(),
        cli.dockbar_position.as_deref(),
        cli.hide_window_buttons,
        cli.scrollback_lines,
        cli.show_keys,
        cli.no_animations,
        cli.window_title_position.as_deref(),
        cli.hide_clock,
    )?;

    let session_name = cli
        .session
        .clone()
        .or_else(|| std::env::var("TUIOS_SESSION").ok())
        .unwrap_or_else(|| session::DEFAULT_SESSION.to_string());

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_standalone(config, &session_name),
        Commands::Daemon => run_daemon_foreground(&session_name),
        Commands::StartServer { name } => {
            start_server(&name.unwrap_or_else(|| session_name.clone()))
        }
        Commands::KillServer { name } => {
            kill_session(&name.unwrap_or_else(|| session_name.clone()))
        }
        Commands::Attach { name } => {
            run_attached(config, &name.unwrap_or_else(|| session_name.clone()))
        }
        Commands::New { name } => {
            let name = name.unwrap_or_else(|| session_name.clone());
            if !session::daemon_alive(&name) {
                start_server(&name)?;
                wait_for_daemon(&name)?;
            }
            run_attached(config, &name)
        }
        Commands::Ls => {
            let sessions = session::list_sessions();
            if sessions.is_empty() {
                println!("no running sessions");
            }
            for entry in sessions {
                match entry.pid {
                    Some(pid) => println!("{}\t(pid {pid})", entry.name),
                    None => println!("{}", entry.name),
                }
            }
            Ok(())
        }
        Commands::KillSession { name } => kill_session(&name),
        Commands::SendKeys { keys, literal, raw } => remote_command(
            &session_name,
            TapeCommand::SendKeys { keys, literal, raw },
        ),
        Commands::RunCommand { command, args } => {
            let statement = std::iter::once(command)
                .chain(args.into_iter().map(quote_arg))
                .collect::<Vec<_>>()
                .join(" ");
            let commands = tape::parse_script(&statement)?;
            for command in commands {
                remote_command(&session_name, command)?;
            }
            Ok(())
        }
        Commands::SetConfig { path, value } => {
            remote_command(&session_name, TapeCommand::SetConfig { path, value })
        }
        Commands::ListWindows => remote_command(&session_name, TapeCommand::ListWindows),
        Commands::GetWindow { target } => {
            remote_command(&session_name, TapeCommand::GetWindow { target })
        }
        Commands::SessionInfo => session_info(&session_name),
        Commands::Logs => print_logs(),
        Commands::Tape { command } => run_tape_cli(&session_name, command),
        Commands::Config { command } => run_config_cli(command),
        Commands::Keybinds { command } => run_keybinds_cli(&config, command),
    }
}

fn init_logging(debug: bool) -> Result<()> {
    let path = if let Ok(path) = std::env::var("TUIOS_LOG_FILE") {
        std::path::PathBuf::from(path)
    } else {
        Config::data_dir()?.join("tuios.log")
    };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let default_level = if debug || std::env::var("TUIOS_DEBUG_INTERNAL").is_ok() {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format_timestamp_secs()
        .init();
    Ok(())
}

/// Restore the host terminal before panicking messages print.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        log::error!("PANIC: {panic_info:?}");
        let _ = disable_raw_mode();
        let mut stdout = std::io::stdout();
        let _ = std::io::Write::write_all(&mut stdout, b"\x1b[?1l\x1b[?2004l\x1b[?1004l");
        let _ = execute!(stdout, PopKeyboardEnhancementFlags);
        let _ = execute!(
            stdout,
            LeaveAlternateScreen,
            DisableMouseCapture,
            crossterm::cursor::Show
        );
        default_hook(panic_info);
    }));
}

fn install_signal_handlers() -> Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    signal_hook::flag::register(SIGINT, Arc::clone(&SHUTDOWN_FLAG))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&SHUTDOWN_FLAG))?;
    signal_hook::flag::register(SIGHUP, Arc::clone(&SHUTDOWN_FLAG))?;
    Ok(())
}

fn host_size() -> Result<(u16, u16)> {
    crossterm::terminal::size().context("failed to query terminal size")
}

fn run_standalone(config: Config, session_name: &str) -> Result<()> {
    install_signal_handlers()?;
    let (width, height) = host_size()?;
    let mut app = App::new_local(
        config,
        session_name,
        width,
        height,
        Arc::clone(&SHUTDOWN_FLAG),
    );
    log::info!("tuios started standalone ({width}x{height})");
    app::run_with_terminal(&mut app)
}

fn run_attached(config: Config, name: &str) -> Result<()> {
    install_signal_handlers()?;
    let (width, height) = host_size()?;
    let mut app = App::new_attached(config, name, width, height, Arc::clone(&SHUTDOWN_FLAG))
        .with_context(|| format!("failed to attach to session {name:?}"))?;
    log::info!("attached to session {name} ({width}x{height})");
    app::run_with_terminal(&mut app)
}

fn run_daemon_foreground(name: &str) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build daemon runtime")?;
    runtime.block_on(session::daemon::run(name))
}

/// Fork the daemon into the background (double-fork, new session,
/// stdio to /dev/null), then return in the parent.
fn start_server(name: &str) -> Result<()> {
    session::validate_name(name)?;
    if session::daemon_alive(name) {
        bail!("session {name:?} is already running");
    }
    // SAFETY-ADJACENT: plain POSIX daemonization; the child never returns
    // from this function.
    unsafe {
        match libc::fork() {
            -1 => bail!("fork failed"),
            0 => {}
            _ => {
                println!("started session {name}");
                return Ok(());
            }
        }
        if libc::setsid() == -1 {
            std::process::exit(1);
        }
        match libc::fork() {
            -1 => std::process::exit(1),
            0 => {}
            _ => std::process::exit(0),
        }
        let devnull = std::ffi::CString::new("/dev/null").expect("static path");
        let fd = libc::open(devnull.as_ptr(), libc::O_RDWR);
        if fd >= 0 {
            libc::dup2(fd, 0);
            libc::dup2(fd, 1);
            libc::dup2(fd, 2);
            if fd > 2 {
                libc::close(fd);
            }
        }
    }
    let result = run_daemon_foreground(name);
    if let Err(e) = &result {
        log::error!("daemon exited with error: {e:#}");
    }
    std::process::exit(result.is_err() as i32);
}

/// Wait until the freshly forked daemon answers on its socket.
fn wait_for_daemon(name: &str) -> Result<()> {
    for _ in 0..100 {
        if session::daemon_alive(name) {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    bail!("daemon for {name:?} did not come up")
}

fn kill_session(name: &str) -> Result<()> {
    // Prefer an orderly shutdown over the socket; fall back to SIGTERM at
    // the recorded PID, then clear the session's files either way.
    if let Ok((handle, events)) = client::connect(name) {
        if client::call(&handle, &events, Request::Shutdown, Duration::from_secs(3)).is_ok() {
            println!("killed session {name}");
            return Ok(());
        }
    }
    let files = session::SessionFiles::resolve(name)?;
    let Some(pid) = files.read_pid() else {
        bail!("no session named {name:?}");
    };
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
    files.remove();
    println!("killed session {name}");
    Ok(())
}

/// Route a command through the daemon to an attached UI client and print
/// the result.
fn remote_command(session_name: &str, command: TapeCommand) -> Result<()> {
    let (handle, events) = client::connect(session_name)
        .with_context(|| format!("session {session_name:?} is not running"))?;
    let response = client::call(
        &handle,
        &events,
        Request::RunCommand { command },
        Duration::from_secs(10),
    )?;
    if !response.ok {
        bail!(
            "{}",
            response
                .message
                .unwrap_or_else(|| "command failed".to_string())
        );
    }
    if let Some(data) = response.data {
        println!("{}", serde_json::to_string_pretty(&data)?);
    }
    Ok(())
}

fn session_info(name: &str) -> Result<()> {
    let (handle, events) = client::connect(name)
        .with_context(|| format!("session {name:?} is not running"))?;
    let response = client::call(&handle, &events, Request::SessionInfo, Duration::from_secs(5))?;
    match response.data {
        Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
        None => println!("no data"),
    }
    Ok(())
}

fn print_logs() -> Result<()> {
    let path = if let Ok(path) = std::env::var("TUIOS_LOG_FILE") {
        std::path::PathBuf::from(path)
    } else {
        Config::data_dir()?.join("tuios.log")
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            print!("{text}");
            Ok(())
        }
        Err(_) => {
            println!("no logs at {}", path.display());
            Ok(())
        }
    }
}

fn tape_path(name: &str) -> Result<std::path::PathBuf> {
    let file = if name.ends_with(".tape") {
        name.to_string()
    } else {
        format!("{name}.tape")
    };
    Ok(Config::tapes_dir()?.join(file))
}

fn run_tape_cli(session_name: &str, command: TapeCli) -> Result<()> {
    match command {
        TapeCli::Play { name } => {
            let path = tape_path(&name)?;
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("no tape at {}", path.display()))?;
            let commands = tape::parse_script(&text)?;
            for command in commands {
                remote_command(session_name, command)?;
            }
            Ok(())
        }
        TapeCli::Exec { script } => {
            let commands = tape::parse_script(&script)?;
            for command in commands {
                remote_command(session_name, command)?;
            }
            Ok(())
        }
        TapeCli::Validate { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read {file}"))?;
            let commands = tape::parse_script(&text)?;
            println!("ok: {} command(s)", commands.len());
            Ok(())
        }
        TapeCli::List => {
            let dir = Config::tapes_dir()?;
            let mut names: Vec<String> = std::fs::read_dir(&dir)?
                .flatten()
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "tape"))
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            if names.is_empty() {
                println!("no tapes in {}", dir.display());
            }
            for name in names {
                println!("{name}");
            }
            Ok(())
        }
        TapeCli::Show { name } => {
            let path = tape_path(&name)?;
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("no tape at {}", path.display()))?;
            print!("{text}");
            Ok(())
        }
        TapeCli::Delete { name } => {
            let path = tape_path(&name)?;
            std::fs::remove_file(&path)
                .with_context(|| format!("no tape at {}", path.display()))?;
            println!("deleted {}", path.display());
            Ok(())
        }
        TapeCli::Dir => {
            println!("{}", Config::tapes_dir()?.display());
            Ok(())
        }
    }
}

fn run_config_cli(command: ConfigCli) -> Result<()> {
    match command {
        ConfigCli::Path => {
            println!("{}", Config::path()?.display());
            Ok(())
        }
        ConfigCli::Edit => {
            let editor = std::env::var("VISUAL")
                .or_else(|_| std::env::var("EDITOR"))
                .unwrap_or_else(|_| "vi".to_string());
            let path = Config::path()?;
            if !path.exists() {
                Config::default().save()?;
            }
            let status = std::process::Command::new(editor)
                .arg(&path)
                .status()
                .context("failed to launch editor")?;
            if !status.success() {
                bail!("editor exited with failure");
            }
            // Validate what was written.
            Config::load().context("edited config does not parse")?;
            Ok(())
        }
        ConfigCli::Reset => {
            Config::default().save()?;
            println!("config reset to defaults");
            Ok(())
        }
    }
}

fn run_keybinds_cli(config: &Config, command: KeybindsCli) -> Result<()> {
    match command {
        KeybindsCli::List => {
            for bind in tuios::wm::input::default_keybinds(&config.leader_key) {
                println!("{:<8} {:<22} {}", bind.context, bind.keys, bind.action);
            }
            Ok(())
        }
        KeybindsCli::ListCustom => {
            // Custom keybindings come from the config; only the leader is
            // rebindable today.
            if config.leader_key != "ctrl+b" {
                println!("leader   {:<22} enter prefix mode", config.leader_key);
            } else {
                println!("no custom keybindings");
            }
            Ok(())
        }
    }
}

/// Quote an argument for the tape statement parser when it has spaces.
fn quote_arg(arg: String) -> String {
    if arg.contains(' ') || arg.contains('"') {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        arg
    }
}
