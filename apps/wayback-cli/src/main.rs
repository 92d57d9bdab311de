mod session;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use wayback_common::{DEFAULT_LOG_NAME, LogSelector};
use wayback_history::{HistoryConfig, NavigationHistory, SessionBound};
use wayback_log::{AppendOnlyLog, FileLog, LogOptions, LogStore};

use session::{HELP, SessionCommand, parse_command};

type History = NavigationHistory<FileLog, Value>;

/// Contents of the `--config` file: history settings at the top level, file
/// log options under `log`.
#[derive(Debug, Default, Deserialize)]
struct CliConfig {
    #[serde(flatten)]
    history: HistoryConfig,
    #[serde(default)]
    log: LogOptions,
}

#[derive(Parser)]
#[command(name = "wayback", about = "Persisted, forkable navigation history")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Store directory holding the logs
    #[arg(long, global = true, default_value = "wayback-data")]
    store: PathBuf,

    /// JSON file with history and log configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    log: LogArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LogArgs {
    /// Name of the log to use
    #[arg(long, global = true, conflicts_with = "key")]
    name: Option<String>,

    /// Hex key of the log to use
    #[arg(long, global = true)]
    key: Option<String>,
}

impl LogArgs {
    fn selector(&self) -> anyhow::Result<LogSelector> {
        match (&self.name, &self.key) {
            (_, Some(hex)) => Ok(LogSelector::key_hex(hex)?),
            (Some(name), None) => Ok(LogSelector::name(name.clone())),
            (None, None) => Ok(LogSelector::name(DEFAULT_LOG_NAME)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the log key, length and the logs present in the store
    Info,
    /// Append one JSON state after the last persisted entry
    Push {
        /// State to record, as JSON
        state: String,
    },
    /// Print every persisted entry with its index
    Entries,
    /// Verify the integrity hash chain of the log
    Verify,
    /// Interactive back/forward session on stdin
    Session,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let CliConfig { history: config, log } = load_config(cli.config.as_deref())?;
    let store = LogStore::open(&cli.store)
        .await
        .with_context(|| format!("failed to open store at {}", cli.store.display()))?
        .with_options(log);
    let selector = cli.log.selector()?;

    match cli.command {
        Commands::Info => {
            let mut log = store.get(&selector);
            log.open().await?;
            println!("wayback v{}", env!("CARGO_PKG_VERSION"));
            println!("store: {}", store.root().display());
            println!("key: {}", log.key());
            println!("length: {}", log.len());
            if let Some(meta) = log.meta() {
                println!("schema: v{}", meta.log_schema_version);
            }
            log.close().await?;

            let keys = store.keys().await?;
            println!("logs in store: {}", keys.len());
            for key in keys {
                println!("  {key}");
            }
        }
        Commands::Push { state } => {
            let value: Value = serde_json::from_str(&state).context("state must be valid JSON")?;
            let len = append_state(&store, &selector, config, value).await?;
            println!("pushed: length={len}");
        }
        Commands::Entries => {
            let history = History::open(store.get(&selector), config).await?;
            let len = history.length().await;
            for index in 0..len {
                let entry = history.entry(index).await?;
                println!("{index}: {entry}");
            }
            if len == 0 {
                println!("(empty)");
            }
            history.close().await?;
        }
        Commands::Verify => {
            let mut log = store.get(&selector);
            log.open().await?;
            match log.verify_integrity().await {
                Ok(()) => println!("OK: {} entries verified", log.len()),
                Err(e) => {
                    tracing::error!("integrity check failed: {e}");
                    anyhow::bail!("integrity check failed for {}", log.key());
                }
            }
            log.close().await?;
        }
        Commands::Session => {
            let history = Arc::new(History::open(store.get(&selector), config).await?);
            run_session(Arc::clone(&history)).await?;
            history.close().await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CliConfig> {
    let Some(path) = path else {
        return Ok(CliConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = serde_json::from_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))?;
    tracing::debug!(?config, "loaded config");
    Ok(config)
}

/// Push `value` after the last persisted entry, whichever session wrote it.
///
/// A fresh session starts at the virtual initial state, where a plain push
/// would fork at index 0. Moving to the tip first turns it into an append.
async fn append_state(
    store: &LogStore,
    selector: &LogSelector,
    config: HistoryConfig,
    value: Value,
) -> anyhow::Result<u64> {
    let config = HistoryConfig {
        session_bound: SessionBound::Start,
        ..config
    };
    let history = History::open(store.get(selector), config).await?;
    let len = history.length().await;
    if len > 0 {
        history.go(len as i64).await?;
    }
    let new_len = history.push_state(value).await?;
    history.close().await?;
    Ok(new_len)
}

async fn run_session(history: Arc<History>) -> anyhow::Result<()> {
    let mut events = history.subscribe();
    let watcher = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    tracing::debug!(session = %event.session, index = event.index, "navigated");
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "navigation watcher lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!(
        "session {} on log {} (length {}); type `help` for commands",
        history.session_id(),
        history.key(),
        history.length().await
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let cmd = match parse_command(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                println!("error: {e}");
                continue;
            }
        };

        let result = match cmd {
            SessionCommand::Quit => break,
            SessionCommand::Help => {
                println!("{HELP}");
                Ok(())
            }
            SessionCommand::Push(value) => history
                .push_state(value)
                .await
                .map(|len| println!("pushed: length={len}")),
            SessionCommand::Back => history.back().await.map(|s| print_state(s.as_ref())),
            SessionCommand::Forward => history.forward().await.map(|s| print_state(s.as_ref())),
            SessionCommand::Go(delta) => history.go(delta).await.map(|s| print_state(s.as_ref())),
            SessionCommand::Peek(delta) => history.peek(delta).await.map(|ok| println!("{ok}")),
            SessionCommand::State => {
                print_state(history.state().await.as_ref());
                Ok(())
            }
            SessionCommand::Status => history.status().await.map(|s| {
                println!(
                    "position={} length={} min={} back={} forward={}",
                    s.position, s.length, s.session_min_index, s.can_go_back, s.can_go_forward
                )
            }),
        };

        if let Err(e) = result {
            tracing::error!("{e}");
            println!("error: {e}");
        }
    }

    watcher.abort();
    Ok(())
}

fn print_state(state: Option<&Value>) {
    match state {
        Some(value) => println!("{value}"),
        None => println!("(initial state)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn separate_pushes_append_to_the_log() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LogStore::open(tmp.path()).await.unwrap();
        let selector = LogSelector::default();

        for (i, name) in ["A", "B", "C"].into_iter().enumerate() {
            let config = HistoryConfig::default();
            let len = append_state(&store, &selector, config, json!({ "p": name })).await.unwrap();
            assert_eq!(len, i as u64 + 1);
        }

        let config = HistoryConfig {
            session_bound: SessionBound::Start,
            ..HistoryConfig::default()
        };
        let history = History::open(store.get(&selector), config).await.unwrap();
        assert_eq!(history.length().await, 3);
        assert_eq!(history.entry(0).await.unwrap(), json!({ "p": "A" }));
        assert_eq!(history.entry(2).await.unwrap(), json!({ "p": "C" }));
    }

    #[tokio::test]
    async fn push_keeps_entries_written_by_a_session() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LogStore::open(tmp.path()).await.unwrap();
        let selector = LogSelector::name("pages");

        let history = History::open(store.get(&selector), HistoryConfig::default())
            .await
            .unwrap();
        history.push_state(json!("home")).await.unwrap();
        history.push_state(json!("about")).await.unwrap();
        history.close().await.unwrap();

        let len = append_state(&store, &selector, HistoryConfig::default(), json!("contact"))
            .await
            .unwrap();
        assert_eq!(len, 3);

        let mut log = store.get(&selector);
        log.open().await.unwrap();
        assert_eq!(log.len(), 3);
        log.verify_integrity().await.unwrap();
    }

    #[test]
    fn config_file_splits_history_and_log_options() {
        let config: CliConfig = serde_json::from_str(
            r#"{"session_bound":"start","notify_capacity":8,"log":{"compression_level":9}}"#,
        )
        .unwrap();
        assert_eq!(config.history.session_bound, SessionBound::Start);
        assert_eq!(config.history.notify_capacity, 8);
        assert_eq!(config.log.compression_level, 9);

        let empty: CliConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.history, HistoryConfig::default());
        assert_eq!(empty.log, LogOptions::default());
    }
}
