// Local crates
use crate::{
    error::BridgeError,
    formatter::formatter::Columns,
    ingest::source::InputSource,
    store::models::RetentionBound,
    tailer::models::StartPosition,
};

// External crates
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::instrument;

pub const DEFAULT_HOSTNAME: &str = "localhost";
pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_FIELD_KEY: &str = "default";
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Optional TOML configuration file. Every value can be overridden from the command line.
///
/// ```toml
/// [store]
/// hostname = "redis.internal"
/// port = 6380
/// auth = "secret"
///
/// [ingest]
/// key = "line"
/// maxlen = 10000
///
/// [tail]
/// count = 100
/// all = false
/// ```
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub store: StoreFileConfig,
    #[serde(default)]
    pub ingest: IngestFileConfig,
    #[serde(default)]
    pub tail: TailFileConfig,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StoreFileConfig {
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub auth: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct IngestFileConfig {
    pub key: Option<String>,
    pub maxlen: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TailFileConfig {
    pub count: Option<usize>,
    pub all: Option<bool>,
}

impl FileConfig {
    /// Load and parse the configuration file
    #[instrument(
        name = "config_loader",
        target = "helpers::load_config",
        level = "trace",
        skip_all
    )]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        tracing::trace!(
            configuration_file_path = %path_ref.display(),
            "Loading stream bridge configuration file"
        );

        let config_str = match fs::read_to_string(path_ref) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read configuration file");
                return Err(e)
                    .with_context(|| format!("Failed to read config file at {:?}", path_ref));
            }
        };
        let config = Self::parse(&config_str)
            .with_context(|| format!("Failed to parse TOML from {:?}", path_ref))?;

        tracing::trace!(configuration_file_path = %path_ref.display(), "Configuration file loaded successfully");
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match toml::from_str(raw) {
            Ok(cfg) => Ok(cfg),
            Err(e) => {
                tracing::error!(error = %e, "Failed to parse TOML configuration");
                Err(e.into())
            }
        }
    }
}

/// Connection settings handed to the store client. The password is opaque to the bridge.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub hostname: String,
    pub port: u16,
    pub auth: Option<String>,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("auth", &self.auth.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            port: DEFAULT_PORT,
            auth: None,
        }
    }
}

/// Validated configuration consumed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub store: StoreConfig,
    /// Stream names or glob patterns, as given.
    pub streams: Vec<String>,
    /// Field key of ingested entries.
    pub field_key: String,
    pub retention: Option<RetentionBound>,
    pub columns: Columns,
    pub start: StartPosition,
    /// Explicit input source. Forces ingestion when set.
    pub input: Option<InputSource>,
    /// Print resolved stream names and exit.
    pub list_only: bool,
    /// Upper bound of entries per stream per poll.
    pub batch_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            streams: Vec::new(),
            field_key: DEFAULT_FIELD_KEY.to_string(),
            retention: None,
            columns: Columns::default(),
            start: StartPosition::Latest,
            input: None,
            list_only: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl BridgeConfig {
    /// Reject settings no run can work with.
    pub fn validate(self) -> Result<Self, BridgeError> {
        if self.batch_size == 0 {
            return Err(BridgeError::Config("count must be at least 1".to_string()));
        }
        if self.field_key.is_empty() {
            return Err(BridgeError::Config("key must not be empty".to_string()));
        }
        if self.retention == Some(RetentionBound(0)) {
            return Err(BridgeError::Config("maxlen must be at least 1".to_string()));
        }
        if self.streams.is_empty() && !self.list_only {
            return Err(BridgeError::Config(
                "at least one stream argument is required".to_string(),
            ));
        }
        Ok(self)
    }
}
