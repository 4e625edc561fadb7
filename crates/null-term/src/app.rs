use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use crossterm::style::Stylize;
use null_term_common::error_codes::ErrorCategory;
use null_term_host::{start_host, HostConfig, HostError};
use null_term_ipc::lifecycle::ensure_host;
use null_term_ipc::{socket_path, ChannelClient, ClientError, ListResult};
use null_term_pty::SpawnMode;
use null_term_ui::{PanelController, SessionManager, SpawnOptions, TabInfo, UiError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::commands::{Cli, Commands};
use crate::line::PanelLine;
use crate::surface::StdoutSurfaceFactory;

/// How often host events are drained into the surfaces.
const PUMP_INTERVAL: Duration = Duration::from_millis(16);
/// How often the outer terminal's size is checked for changes.
const LAYOUT_INTERVAL: Duration = Duration::from_millis(250);

/// Exit codes following sysexits.h.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const USAGE: i32 = 64;
    pub const UNAVAILABLE: i32 = 69;
    pub const CANTCREAT: i32 = 73;
    pub const IOERR: i32 = 74;
    pub const TEMPFAIL: i32 = 75;
}

pub fn default_log_level(cli: &Cli) -> &'static str {
    if cli.verbose {
        "debug"
    } else if matches!(cli.command, Commands::Host { .. }) {
        "info"
    } else {
        "warn"
    }
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let socket = resolve_socket(cli.socket.clone());

    match cli.command {
        Commands::Host {
            max_sessions,
            shell,
            spawn_mode,
        } => run_host(&socket, max_sessions, shell, spawn_mode),

        Commands::Panel {
            shell,
            cwd,
            no_autostart,
        } => {
            if !no_autostart {
                ensure_host(&socket)?;
            }
            block_on(run_panel(&socket, SpawnOptions { shell, cwd }))
        }

        Commands::Sessions { json } => block_on(print_sessions(&socket, json)),
    }
}

fn block_on<F>(future: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = anyhow::Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let result = runtime.block_on(future);
    // stdin is read on a blocking thread that cannot be interrupted.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

fn run_host(
    socket: &Path,
    max_sessions: Option<usize>,
    shell: Option<String>,
    spawn_mode: Option<SpawnMode>,
) -> anyhow::Result<()> {
    let mut config = HostConfig::from_env();
    if let Some(max) = max_sessions {
        config = config.with_max_sessions(max);
    }
    if shell.is_some() {
        config = config.with_shell(shell);
    }
    if let Some(mode) = spawn_mode {
        config = config.with_spawn_mode(mode);
    }
    start_host(config, socket)?;
    Ok(())
}

pub async fn print_sessions(socket: &Path, json: bool) -> anyhow::Result<()> {
    let client = ChannelClient::connect(socket).await?;
    let result = client.list().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", format_sessions(&result));
    }
    Ok(())
}

pub fn format_sessions(result: &ListResult) -> String {
    if result.sessions.is_empty() {
        return "No sessions\n".to_string();
    }
    let mut out = String::new();
    for session in &result.sessions {
        let pid = session
            .pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{}  pid {}  {}  {}x{}  {}  {}\n",
            session.id,
            pid,
            session.shell,
            session.cols,
            session.rows,
            if session.pty { "pty" } else { "pipes" },
            session.created_at
        ));
    }
    out
}

pub async fn run_panel(socket: &Path, options: SpawnOptions) -> anyhow::Result<()> {
    let client = ChannelClient::connect(socket).await?;
    client.ping().await?;

    let manager = SessionManager::new(Arc::new(client), Box::new(StdoutSurfaceFactory))
        .with_spawn_options(options);
    let mut panel = PanelController::new(manager);
    panel.mount().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pump = tokio::time::interval(PUMP_INTERVAL);
    let mut layout = tokio::time::interval(LAYOUT_INTERVAL);

    loop {
        tokio::select! {
            _ = pump.tick() => {
                panel.pump();
            }
            _ = layout.tick() => {
                if panel.is_visible() {
                    if let Err(e) = panel.manager_mut().resize_all().await {
                        debug!(error = %e, "Layout refit failed");
                    }
                }
            }
            line = lines.next_line() => {
                match line.context("failed to read panel input")? {
                    Some(line) => {
                        if !handle_line(&mut panel, &line).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    panel.pump();
    let closed = panel.window_closing().await;
    info!(closed, "Panel closed");
    Ok(())
}

/// Applies one line of panel input. Returns false when the panel should exit.
pub async fn handle_line(panel: &mut PanelController, line: &str) -> bool {
    let parsed = match PanelLine::parse(line) {
        Ok(parsed) => parsed,
        Err(msg) => {
            status_error(&msg, None);
            return true;
        }
    };

    match parsed {
        PanelLine::Quit => return false,
        PanelLine::New => {
            panel.new_tab().await;
        }
        PanelLine::Close => report(panel.close_active_tab().await),
        PanelLine::Next => report(panel.select_next().await.map(|_| ())),
        PanelLine::Prev => report(panel.select_prev().await.map(|_| ())),
        PanelLine::Tab(n) => report(panel.select_index(n).await.map(|_| ())),
        PanelLine::Tabs => eprint!("{}", format_tabs(&panel.tabs())),
        PanelLine::Hide => panel.set_visible(false).await,
        PanelLine::Show => panel.set_visible(true).await,
        PanelLine::Toggle => {
            panel.toggle().await;
        }
        PanelLine::Height(px) => {
            let applied = panel.set_height(px).await;
            eprintln!("{} {}px", "Panel height".dim(), applied);
        }
        PanelLine::Input(data) => report(panel.input(&data).await),
    }
    true
}

pub fn format_tabs(tabs: &[TabInfo]) -> String {
    if tabs.is_empty() {
        return "No terminals open\n".to_string();
    }
    tabs.iter()
        .enumerate()
        .map(|(i, tab)| {
            format!(
                "{} {}. {}  [{}]  {}\n",
                if tab.active { "*" } else { " " },
                i + 1,
                tab.title,
                tab.state,
                tab.id
            )
        })
        .collect()
}

fn report(result: Result<(), UiError>) {
    if let Err(err) = result {
        status_error(&err.to_string(), err.suggestion());
    }
}

fn status_error(message: &str, suggestion: Option<String>) {
    eprintln!("{} {}", "Error:".red().bold(), message);
    if let Some(suggestion) = suggestion {
        eprintln!("{} {}", "Suggestion:".dim(), suggestion);
    }
}

/// Prints a failed command's error with its suggestion and returns the
/// process exit code for it.
pub fn report_error(err: &anyhow::Error) -> i32 {
    let (suggestion, retryable, code) = if let Some(e) = err.downcast_ref::<ClientError>() {
        (
            e.suggestion(),
            e.is_retryable(),
            e.category().map_or(exit_codes::GENERAL_ERROR, exit_code_for_category),
        )
    } else if let Some(e) = err.downcast_ref::<HostError>() {
        (
            Some(e.suggestion()),
            e.is_retryable(),
            exit_code_for_category(e.category()),
        )
    } else if let Some(e) = err.downcast_ref::<UiError>() {
        (
            e.suggestion(),
            e.is_retryable(),
            exit_code_for_category(e.category()),
        )
    } else {
        (None, false, exit_codes::GENERAL_ERROR)
    };

    eprintln!("{} {:#}", "Error:".red().bold(), err);
    if let Some(suggestion) = suggestion {
        eprintln!("{} {}", "Suggestion:".dim(), suggestion);
    }
    if retryable {
        eprintln!("{}", "(This error may be transient - retry may succeed)".dim());
    }
    code
}

pub fn exit_code_for_category(category: ErrorCategory) -> i32 {
    match category {
        ErrorCategory::InvalidInput => exit_codes::USAGE,
        ErrorCategory::NotFound => exit_codes::UNAVAILABLE,
        ErrorCategory::Busy => exit_codes::CANTCREAT,
        ErrorCategory::External | ErrorCategory::Internal => exit_codes::IOERR,
        ErrorCategory::Disconnected => exit_codes::TEMPFAIL,
    }
}

/// Resolved socket path for commands that accept `--socket`.
pub fn resolve_socket(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(socket_path)
}
