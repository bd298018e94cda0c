// Local crates
use crate::{
    error::BridgeError,
    formatter::formatter::Columns,
    helpers::{
        load_config::{BridgeConfig, DEFAULT_BATCH_SIZE, DEFAULT_FIELD_KEY, FileConfig, StoreConfig},
        shutdown::Shutdown,
    },
    ingest::source::InputSource,
    instrumentation,
    runtime,
    store::models::RetentionBound,
    tailer::models::StartPosition,
};

// External crates
use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "stream-bridge",
    long_about = "stream-bridge connects shell pipelines to Redis Streams. Piped input is appended \
                  line by line to one stream; without input, one or more streams (or glob patterns) \
                  are tailed to stdout.",
    about = "Pipe lines into Redis Streams and tail them back out",
    version,
    term_width = 100,
    after_help = "\
    EXAMPLES:
        tail -f app.log | stream-bridge app
        stream-bridge -s -t 'orders*'
        stream-bridge --all -c 100 audit
        stream-bridge --list 'orders*'"
)]
pub struct Cli {
    /// Stream names or glob patterns (`*`, `?`). Ingestion takes exactly one literal name.
    pub streams: Vec<String>,

    /// Redis hostname
    #[arg(short = 'H', long, env = "REDISHOST")]
    pub hostname: Option<String>,

    /// Redis port
    #[arg(short, long, env = "REDISPORT")]
    pub port: Option<u16>,

    /// Redis password
    #[arg(short, long, env = "REDISPASSWORD", hide_env_values = true)]
    pub auth: Option<String>,

    /// Field key of ingested entries
    #[arg(short, long)]
    pub key: Option<String>,

    /// Approximate maximum length of the ingestion stream
    #[arg(short, long)]
    pub maxlen: Option<u64>,

    /// Show the stream name column
    #[arg(short = 's', long)]
    pub showstream: bool,

    /// Show the entry index column
    #[arg(short, long)]
    pub index: bool,

    /// Show the decoded entry timestamp column
    #[arg(short, long)]
    pub timestamp: bool,

    /// Show the field key column
    #[arg(short = 'o', long)]
    pub keyout: bool,

    /// Ingest from this file instead of tailing, `-` for stdin
    #[arg(short, long)]
    pub file: Option<String>,

    /// Replay every stream from its beginning before following it
    #[arg(long)]
    pub all: bool,

    /// Print the resolved stream names and exit
    #[arg(short, long)]
    pub list: bool,

    /// Maximum entries read per stream per poll
    #[arg(short, long)]
    pub count: Option<usize>,

    /// Optional TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// More diagnostics on stderr, repeat for more detail
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Merge arguments over the configuration file over built-in defaults, then validate.
    pub fn into_config(self, file: FileConfig) -> Result<BridgeConfig, BridgeError> {
        let defaults = StoreConfig::default();
        let store = StoreConfig {
            hostname: self
                .hostname
                .or(file.store.hostname)
                .unwrap_or(defaults.hostname),
            port: self.port.or(file.store.port).unwrap_or(defaults.port),
            auth: self.auth.or(file.store.auth),
        };

        let replay = self.all || file.tail.all.unwrap_or(false);

        BridgeConfig {
            store,
            streams: self.streams,
            field_key: self
                .key
                .or(file.ingest.key)
                .unwrap_or_else(|| DEFAULT_FIELD_KEY.to_string()),
            retention: self.maxlen.or(file.ingest.maxlen).map(RetentionBound),
            columns: Columns {
                timestamp: self.timestamp,
                stream_name: self.showstream,
                index: self.index,
                key_out: self.keyout,
            },
            start: if replay {
                StartPosition::Beginning
            } else {
                StartPosition::Latest
            },
            input: self.file.as_deref().map(InputSource::from_arg),
            list_only: self.list,
            batch_size: self
                .count
                .or(file.tail.count)
                .unwrap_or(DEFAULT_BATCH_SIZE),
        }
        .validate()
    }
}

/// Entry function for CLI
pub async fn run() -> ExitCode {
    let cli = Cli::parse();

    let _guard = instrumentation::tracing::init_tracing(cli.verbose);
    instrumentation::tracing::init_panic_handler();

    match run_cli(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "Stream bridge failed");
            eprintln!("stream-bridge: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run_cli(cli: Cli) -> Result<()> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path).map_err(|e| {
            anyhow::Error::new(BridgeError::Config(format!("{e:#}")))
        })?,
        None => FileConfig::default(),
    };
    let config = cli.into_config(file)?;

    let shutdown = Shutdown::new();
    shutdown.listen_for_signals();

    runtime::runtime::run_bridge(config, &shutdown)
        .await
        .context("stream bridge run failed")
}

/// `BridgeError`s carry their own status, anything else is a generic failure.
fn exit_code(e: &anyhow::Error) -> u8 {
    e.downcast_ref::<BridgeError>()
        .map(BridgeError::exit_code)
        .unwrap_or(1)
}
