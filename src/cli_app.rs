//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime, TimeDelta};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::control;
use serde_json::{Value, json};
use thiserror::Error;

use chia_log_monitor::cli::render;
use chia_log_monitor::cli::watch::{self, WatchConfig};
use chia_log_monitor::core::config::{Config, MAX_WINDOW_MINUTES};
use chia_log_monitor::core::errors::ClmError;
use chia_log_monitor::core::paths;
use chia_log_monitor::engine::monitor::{EngineHandle, EngineOptions, ingest_file};
use chia_log_monitor::engine::signals::SignalHandler;
use chia_log_monitor::logger::activity::{
    ActivityEvent, ActivityLoggerConfig, ActivityLoggerHandle, spawn_logger,
};
use chia_log_monitor::store::ingest::IngestionStore;
use chia_log_monitor::store::window::WindowedView;

/// Chia log monitor: proof timing statistics from harvester debug logs.
#[derive(Debug, Parser)]
#[command(
    name = "clm",
    author,
    version,
    about = "Chia log monitor - harvester proof statistics",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Load a log once and print summary statistics.
    Stats(StatsArgs),
    /// List farming-cycle events inside a time window.
    Events(EventsArgs),
    /// Follow a log and keep the statistics live.
    Watch(WatchArgs),
    /// Inspect configuration.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct WindowArgs {
    /// Window length in minutes (defaults to `stats.window_minutes`).
    #[arg(long, value_name = "MINUTES")]
    window_minutes: Option<u64>,
    /// End the window at the newest event instead of the current time.
    #[arg(long)]
    until_last: bool,
}

#[derive(Debug, Clone, Args)]
struct StatsArgs {
    /// Log file (defaults to the configured or standard Chia location).
    path: Option<PathBuf>,
    #[command(flatten)]
    window: WindowArgs,
}

#[derive(Debug, Clone, Args)]
struct EventsArgs {
    /// Log file (defaults to the configured or standard Chia location).
    path: Option<PathBuf>,
    #[command(flatten)]
    window: WindowArgs,
    /// Only list events that found at least one proof.
    #[arg(long)]
    proofs_only: bool,
    /// List every event regardless of window.
    #[arg(long, conflicts_with_all = ["window_minutes", "until_last"])]
    all: bool,
}

#[derive(Debug, Clone, Args)]
struct WatchArgs {
    /// Log file (defaults to the configured or standard Chia location).
    path: Option<PathBuf>,
    /// Screen refresh interval in milliseconds.
    #[arg(long, default_value_t = 1000, value_name = "MS")]
    refresh_ms: u64,
    /// Window length in minutes for the recent-lookups line.
    #[arg(long, value_name = "MINUTES")]
    window_minutes: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
        }
    }
}

impl From<ClmError> for CliError {
    fn from(err: ClmError) -> Self {
        match err {
            ClmError::InvalidConfig { .. }
            | ClmError::MissingConfig { .. }
            | ClmError::ConfigParse { .. } => Self::User(err.to_string()),
            ClmError::Serialization { .. } => Self::Internal(err.to_string()),
            _ => Self::Runtime(err.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Stats(args) => run_stats(cli, args),
        Command::Events(args) => run_events(cli, args),
        Command::Watch(args) => run_watch(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Activity logger lifetime
// ---------------------------------------------------------------------------

/// Owns the activity logger thread for one command; flushes it on drop.
struct ActivityLog {
    handle: ActivityLoggerHandle,
    join: Option<thread::JoinHandle<()>>,
}

impl ActivityLog {
    fn start(config: &Config) -> Self {
        if !config.logging.enabled {
            return Self {
                handle: ActivityLoggerHandle::disabled(),
                join: None,
            };
        }
        match spawn_logger(ActivityLoggerConfig::from(&config.logging)) {
            Ok((handle, join)) => {
                handle.send(ActivityEvent::ConfigLoaded {
                    source: config.paths.config_file.display().to_string(),
                    config_hash: config.stable_hash().unwrap_or_default(),
                });
                Self {
                    handle,
                    join: Some(join),
                }
            }
            Err(e) => {
                eprintln!("[CLM-LOGGER] activity log disabled: {e}");
                Self {
                    handle: ActivityLoggerHandle::disabled(),
                    join: None,
                }
            }
        }
    }
}

impl Drop for ActivityLog {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            self.handle.shutdown();
            let _ = join.join();
        }
    }
}

// ---------------------------------------------------------------------------
// stats / events
// ---------------------------------------------------------------------------

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Ok(Config::load(cli.config.as_deref())?)
}

fn target_path(config: &Config, explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(
        || config.resolved_log_file(),
        |path| paths::resolve_absolute_path(&paths::expand_tilde(path)),
    )
}

/// Load `path` once into a fresh store, recording the load in the activity log.
fn load_once(
    config: &Config,
    path: &Path,
    activity: &ActivityLog,
) -> Result<IngestionStore, CliError> {
    let store = IngestionStore::new(config.ledger_settings());
    let started = Instant::now();
    let report = ingest_file(path, &store, config.monitor.load_chunk_lines)?;
    activity.handle.send(ActivityEvent::LoadCompleted {
        path: path.to_path_buf(),
        lines: report.lines(),
        events: report.proof_events,
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    });
    if report.rejected_payloads > 0 {
        activity.handle.send(ActivityEvent::PayloadsRejected {
            path: path.to_path_buf(),
            count: report.rejected_payloads,
        });
    }
    Ok(store)
}

fn window_length(config: &Config, minutes: Option<u64>) -> Result<TimeDelta, CliError> {
    match minutes {
        None => Ok(config.window()),
        Some(m) if (1..=MAX_WINDOW_MINUTES).contains(&m) => i64::try_from(m)
            .ok()
            .and_then(TimeDelta::try_minutes)
            .ok_or_else(|| CliError::Internal(format!("window of {m} minutes not representable"))),
        Some(m) => Err(CliError::User(format!(
            "--window-minutes must be in [1, {MAX_WINDOW_MINUTES}], got {m}"
        ))),
    }
}

fn window_end(store: &IngestionStore, until_last: bool) -> NaiveDateTime {
    let now = Local::now().naive_local();
    if until_last {
        store
            .with_ledger(|ledger| ledger.events().last().map(|event| event.timestamp))
            .unwrap_or(now)
    } else {
        now
    }
}

fn build_window(
    config: &Config,
    store: &IngestionStore,
    args: &WindowArgs,
) -> Result<WindowedView, CliError> {
    let length = window_length(config, args.window_minutes)?;
    Ok(store.window(window_end(store, args.until_last), length))
}

fn window_json(view: &WindowedView) -> Value {
    json!({
        "start": view.start(),
        "end": view.end(),
        "events": view.len(),
        "fast": view.fast().count(),
        "slow": view.slow().count(),
        "suggested_y_limit": view.suggested_y_limit(),
    })
}

fn run_stats(cli: &Cli, args: &StatsArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let activity = ActivityLog::start(&config);
    let path = target_path(&config, args.path.as_deref());
    let store = load_once(&config, &path, &activity)?;
    let view = build_window(&config, &store, &args.window)?;
    let snapshot = store.snapshot();

    match output_mode(cli) {
        OutputMode::Human => {
            println!("{}", path.display());
            println!();
            print!("{}", render::render_summary(&snapshot));
            println!();
            println!(
                "Last {} min: {} lookups, {} fast, {} slow",
                (view.end() - view.start()).num_minutes(),
                view.len(),
                view.fast().count(),
                view.slow().count()
            );
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "stats",
                "path": path.to_string_lossy(),
                "summary": serde_json::to_value(&snapshot)?,
                "window": window_json(&view),
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_events(cli: &Cli, args: &EventsArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let activity = ActivityLog::start(&config);
    let path = target_path(&config, args.path.as_deref());
    let store = load_once(&config, &path, &activity)?;

    let mut view = if args.all {
        store.with_ledger(|ledger| {
            let events = ledger.events();
            let now = Local::now().naive_local();
            WindowedView::new(
                events.to_vec(),
                events.first().map_or(now, |event| event.timestamp),
                events.last().map_or(now, |event| event.timestamp),
                ledger.settings().slow_threshold_secs,
            )
        })
    } else {
        build_window(&config, &store, &args.window)?
    };
    if args.proofs_only {
        view = view.proofs_only();
    }

    match output_mode(cli) {
        OutputMode::Human => print!("{}", render::render_events(&view)),
        OutputMode::Json => {
            let payload = json!({
                "command": "events",
                "path": path.to_string_lossy(),
                "window": serde_json::to_value(&view)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// watch
// ---------------------------------------------------------------------------

fn run_watch(cli: &Cli, args: &WatchArgs) -> Result<(), CliError> {
    if args.refresh_ms == 0 {
        return Err(CliError::User("--refresh-ms must be > 0".to_string()));
    }
    let config = load_config(cli)?;
    let window = window_length(&config, args.window_minutes)?;
    let activity = ActivityLog::start(&config);
    let path = target_path(&config, args.path.as_deref());

    let store = Arc::new(IngestionStore::new(config.ledger_settings()));
    let engine = EngineHandle::spawn(
        EngineOptions::from_config(&config, path),
        store,
        activity.handle.clone(),
    )?;
    let signals = SignalHandler::new();
    let refresh = Duration::from_millis(args.refresh_ms);

    let result = match output_mode(cli) {
        OutputMode::Human => watch::run(&engine, &signals, &WatchConfig { refresh, window })
            .map_err(CliError::from),
        OutputMode::Json => stream_snapshots(&engine, &signals, refresh),
    };

    engine.shutdown();
    drop(activity);
    result
}

/// Headless variant of `watch`: one JSON snapshot per refresh until a signal.
fn stream_snapshots(
    engine: &EngineHandle,
    signals: &SignalHandler,
    refresh: Duration,
) -> Result<(), CliError> {
    let tick = Duration::from_millis(50).min(refresh);
    let mut last_emit: Option<Instant> = None;

    while !signals.should_shutdown() {
        if signals.should_reload() {
            engine.reload()?;
        }
        if last_emit.is_none_or(|at| at.elapsed() >= refresh) {
            last_emit = Some(Instant::now());
            let payload = json!({
                "command": "watch",
                "at": Local::now().naive_local(),
                "snapshot": serde_json::to_value(engine.snapshot())?,
            });
            write_json_line(&payload)?;
        }
        thread::sleep(tick);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = load_config(cli)?;

            match output_mode(cli) {
                OutputMode::Human => println!("{}", config.to_toml()?),
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                        "log_file": config.resolved_log_file().to_string_lossy(),
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => eprintln!("Configuration is INVALID: {e}"),
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "code": e.code(),
                            "error": e.to_string(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("CLM_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
