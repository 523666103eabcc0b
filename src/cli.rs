use std::{
    collections::BTreeMap,
    env,
    fs::OpenOptions,
    io::{self, BufRead, IsTerminal},
    path::{Path, PathBuf},
    sync::Mutex,
    thread,
};

use clap::Parser;
use crossterm::{
    cursor,
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::ingest::{
    decode_line, Ingestor, LineParser, MonotonicClock, DEFAULT_DELIMITER, DEFAULT_PREFIX,
};
use crate::nav::{Session, Transition};
use crate::store::Timestamp;
use crate::tui;

const CONFIG_FILE_NAME: &str = "pfdb.json";
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
const DEFAULT_LOG_FILTER: &str = "warn";

pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Everything the viewer loop consumes, merged from the stdin and terminal
/// readers into one ordered stream.
#[derive(Debug)]
enum UiEvent {
    Line { text: String, received_at: Timestamp },
    Key(KeyEvent),
    Resize { height: u16 },
    InputFailed(io::Error),
    Quit,
}

#[derive(Parser, Debug)]
#[command(name = "pfdb", version, about = "Scrub through piped logs and the variables they print")]
struct Cli {
    /// Lines starting with this are checked for variables [default: .]
    #[arg(long, allow_hyphen_values = true)]
    prefix: Option<String>,
    /// Separates a variable name from its value [default: =]
    #[arg(long, visible_alias = "delimeter", allow_hyphen_values = true)]
    delimiter: Option<String>,
    /// Config file to use instead of searching for pfdb.json
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write diagnostics here instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Config {
    prefix: String,
    delimiter: String,
    log_file: Option<PathBuf>,
    channel_capacity: usize,
}

#[derive(Debug, Default, Clone)]
struct PartialConfig {
    prefix: Option<String>,
    delimiter: Option<String>,
    log_file: Option<PathBuf>,
    channel_capacity: Option<usize>,
}

impl PartialConfig {
    fn merge(&mut self, other: PartialConfig) {
        if other.prefix.is_some() {
            self.prefix = other.prefix;
        }
        if other.delimiter.is_some() {
            self.delimiter = other.delimiter;
        }
        if other.log_file.is_some() {
            self.log_file = other.log_file;
        }
        if other.channel_capacity.is_some() {
            self.channel_capacity = other.channel_capacity;
        }
    }
}

impl TryFrom<PartialConfig> for Config {
    type Error = ConfigError;

    fn try_from(partial: PartialConfig) -> Result<Self, Self::Error> {
        let channel_capacity = match partial.channel_capacity {
            Some(0) => return Err(ConfigError::ZeroCapacity),
            Some(capacity) => capacity,
            None => DEFAULT_CHANNEL_CAPACITY,
        };
        Ok(Self {
            prefix: partial.prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            delimiter: partial.delimiter.unwrap_or_else(|| DEFAULT_DELIMITER.to_string()),
            log_file: partial.log_file,
            channel_capacity,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    prefix: Option<String>,
    #[serde(alias = "delimeter")]
    delimiter: Option<String>,
    #[serde(alias = "logFile", alias = "log-file")]
    log_file: Option<PathBuf>,
    #[serde(alias = "channelCapacity", alias = "channel-capacity")]
    channel_capacity: Option<usize>,
}

impl FileConfig {
    fn into_partial(self) -> PartialConfig {
        PartialConfig {
            prefix: self.prefix,
            delimiter: self.delimiter,
            log_file: self.log_file,
            channel_capacity: self.channel_capacity,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    ParseFile { path: PathBuf, source: serde_json::Error },
    #[error("config file not found: {path}")]
    MissingConfig { path: PathBuf },
    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },
    #[error("channel_capacity must be at least 1")]
    ZeroCapacity,
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("pfdb only reads from pipes; pipe something into it, e.g. `./my-program | pfdb`")]
    InteractiveStdin,
    #[error("failed to open log file {path}: {source}")]
    LogFile { path: PathBuf, source: std::io::Error },
    #[error("failed to spawn {name} reader: {source}")]
    SpawnReader { name: &'static str, source: std::io::Error },
    #[error("terminal input failed: {0}")]
    TerminalInput(std::io::Error),
}

fn cli_overrides(cli: &Cli) -> PartialConfig {
    PartialConfig {
        prefix: cli.prefix.clone(),
        delimiter: cli.delimiter.clone(),
        log_file: cli.log_file.clone(),
        ..PartialConfig::default()
    }
}

fn env_overrides(env: &BTreeMap<String, String>) -> Result<PartialConfig, ConfigError> {
    let mut partial = PartialConfig::default();
    if let Some(prefix) = env.get("PFDB_PREFIX") {
        partial.prefix = Some(prefix.clone());
    }
    if let Some(delimiter) = env.get("PFDB_DELIMITER") {
        partial.delimiter = Some(delimiter.clone());
    }
    if let Some(path) = env.get("PFDB_LOG_FILE") {
        if !path.trim().is_empty() {
            partial.log_file = Some(PathBuf::from(path));
        }
    }
    if let Some(value) = env.get("PFDB_CHANNEL_CAPACITY") {
        partial.channel_capacity = Some(parse_capacity("PFDB_CHANNEL_CAPACITY", value)?);
    }
    Ok(partial)
}

/// Surrounding whitespace is tolerated, so `PFDB_CHANNEL_CAPACITY=" 64"` works.
fn parse_capacity(name: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { name: name.to_string(), value: value.to_string() })
}

/// An empty or all-whitespace file counts as `{}`.
fn read_config_file(path: &Path) -> Result<PartialConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    if contents.trim().is_empty() {
        return Ok(PartialConfig::default());
    }
    serde_json::from_str::<FileConfig>(&contents)
        .map(FileConfig::into_partial)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Nearest `pfdb.json` in `start` or one of its ancestors.
fn discover_config(start: &Path) -> Option<PathBuf> {
    start.ancestors().map(|dir| dir.join(CONFIG_FILE_NAME)).find(|candidate| candidate.is_file())
}

/// Defaults, then the config file, then `PFDB_*` env vars, then flags.
fn resolve_config(
    cli: &Cli,
    cwd: &Path,
    env: &BTreeMap<String, String>,
) -> Result<(Config, Option<PathBuf>), ConfigError> {
    let config_path = match &cli.config {
        Some(path) if path.is_file() => Some(path.clone()),
        Some(path) => return Err(ConfigError::MissingConfig { path: path.clone() }),
        None => discover_config(cwd),
    };

    let mut partial = match &config_path {
        Some(path) => read_config_file(path)?,
        None => PartialConfig::default(),
    };
    partial.merge(env_overrides(env)?);
    partial.merge(cli_overrides(cli));

    Ok((Config::try_from(partial)?, config_path))
}

fn init_tracing(log_file: Option<&Path>) -> Result<(), StartupError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| StartupError::LogFile { path: path.to_path_buf(), source })?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}

fn spawn_stdin_reader(
    tx: mpsc::Sender<UiEvent>,
    clock: MonotonicClock,
) -> Result<thread::JoinHandle<()>, StartupError> {
    thread::Builder::new()
        .name("pfdb-stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            let mut reader = stdin.lock();
            let mut buf = Vec::new();
            let mut lines = 0usize;
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => {
                        info!(lines, "stdin closed");
                        break;
                    }
                    Ok(_) => {
                        let event = UiEvent::Line { text: decode_line(&buf), received_at: clock.now() };
                        if tx.blocking_send(event).is_err() {
                            break;
                        }
                        lines += 1;
                    }
                    Err(error) => {
                        warn!(%error, lines, "stdin read failed");
                        break;
                    }
                }
            }
        })
        .map_err(|source| StartupError::SpawnReader { name: "stdin", source })
}

fn spawn_terminal_reader(
    tx: mpsc::Sender<UiEvent>,
) -> Result<thread::JoinHandle<()>, StartupError> {
    thread::Builder::new()
        .name("pfdb-terminal".to_string())
        .spawn(move || loop {
            let ui_event = match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => UiEvent::Key(key),
                Ok(Event::Resize(_, height)) => UiEvent::Resize { height },
                Ok(_) => continue,
                Err(error) => UiEvent::InputFailed(error),
            };
            let failed = matches!(ui_event, UiEvent::InputFailed(_));
            if tx.blocking_send(ui_event).is_err() || failed {
                break;
            }
        })
        .map_err(|source| StartupError::SpawnReader { name: "terminal", source })
}

fn run_tui_loop(
    config: Config,
    tx: mpsc::Sender<UiEvent>,
    mut rx: mpsc::Receiver<UiEvent>,
    start_time: Timestamp,
) -> Result<(), DynError> {
    let _guard = ScreenGuard::acquire()?;
    let stdout = io::stdout();
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let size = terminal.size()?;
    let ingestor = Ingestor::new(LineParser::new(config.prefix, config.delimiter));
    let mut session = Session::new(start_time, usize::from(size.height));
    spawn_terminal_reader(tx)?;

    terminal.draw(|frame| tui::render(frame, &session))?;

    while let Some(event) = rx.blocking_recv() {
        let transition = match event {
            UiEvent::Line { text, received_at } => ingestor.ingest(&mut session, text, received_at),
            UiEvent::Key(key) => match tui::key_action(key) {
                Some(action) => session.apply(action),
                None => Transition::Redraw,
            },
            UiEvent::Resize { height } => {
                debug!(height, "terminal resized");
                session.resize(usize::from(height))
            }
            UiEvent::InputFailed(error) => return Err(StartupError::TerminalInput(error).into()),
            UiEvent::Quit => Transition::Quit,
        };
        if transition == Transition::Quit {
            break;
        }
        terminal.draw(|frame| tui::render(frame, &session))?;
    }

    info!(
        lines = session.store().buffer().len(),
        variables = session.store().registry().len(),
        "viewer closed"
    );
    Ok(())
}

/// Raw mode, alternate screen, mouse capture and a hidden cursor for as long
/// as the viewer runs. Restored on drop, including on error paths.
struct ScreenGuard;

impl ScreenGuard {
    fn acquire() -> Result<Self, DynError> {
        enable_raw_mode()?;
        let guard = Self;
        execute!(io::stdout(), EnterAlternateScreen, EnableMouseCapture, cursor::Hide)?;
        Ok(guard)
    }
}

impl Drop for ScreenGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), cursor::Show, DisableMouseCapture, LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

pub async fn run() -> Result<(), DynError> {
    let cli = Cli::parse();
    let cwd = env::current_dir()?;
    let env_map: BTreeMap<String, String> = env::vars().collect();
    let (config, config_path) = resolve_config(&cli, &cwd, &env_map)?;

    if io::stdin().is_terminal() {
        return Err(StartupError::InteractiveStdin.into());
    }

    init_tracing(config.log_file.as_deref())?;

    if let Some(path) = &config_path {
        info!(path = %path.display(), "loaded config file");
    } else {
        debug!("no pfdb.json found, using defaults and env/cli overrides");
    }
    info!(
        prefix = %config.prefix,
        delimiter = %config.delimiter,
        channel_capacity = config.channel_capacity,
        log_file = ?config.log_file,
        "resolved config"
    );

    let clock = MonotonicClock::new();
    let start_time = clock.now();
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    spawn_stdin_reader(tx.clone(), clock)?;

    let signal_tx = tx.clone();
    let mut tui_handle =
        tokio::task::spawn_blocking(move || run_tui_loop(config, tx, rx, start_time));

    let mut tui_result: Option<Result<(), DynError>> = None;
    tokio::select! {
        res = &mut tui_handle => {
            tui_result = Some(res?);
        }
        _ = tokio::signal::ctrl_c() => {
            let _ = signal_tx.send(UiEvent::Quit).await;
        }
    }

    match tui_result {
        Some(result) => result,
        None => tui_handle.await?,
    }
}
