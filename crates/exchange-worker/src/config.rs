use std::path::Path;

use exchange_auth::StoreConfig;
use exchange_ops::HttpConfig;
use percent_encoding::{utf8_percent_encode, PercentEncode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

/// Worker configuration. Every section is optional; a missing file means
/// all defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WorkerConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_host")]
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    #[serde(default = "default_guest")]
    pub username: String,
    #[serde(default = "default_guest")]
    pub password: String,
    #[serde(default = "default_vhost")]
    pub vhost: String,
    /// Unacknowledged deliveries the broker may push per consumer.
    #[serde(default = "default_prefetch")]
    pub prefetch: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            username: default_guest(),
            password: default_guest(),
            vhost: default_vhost(),
            prefetch: default_prefetch(),
        }
    }
}

impl BrokerConfig {
    /// AMQP URI with the credentials and vhost percent-encoded.
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            encode(&self.username),
            encode(&self.password),
            self.host,
            self.port,
            encode(&self.vhost)
        )
    }
}

fn encode(part: &str) -> PercentEncode<'_> {
    utf8_percent_encode(part, NON_ALPHANUMERIC)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchConfig {
    /// Upper bound on operations running at once across all three queues.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Publish every outcome to the results exchange.
    #[serde(default)]
    pub publish_results: bool,
    /// Declare the status exchange for status distribution.
    #[serde(default)]
    pub status: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            publish_results: false,
            status: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
    /// Default to debug level when `RUST_LOG` is unset.
    #[serde(default)]
    pub debug: bool,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub broker_host: Option<String>,
    pub store_host: Option<String>,
    pub store_port: Option<u16>,
    pub store_db: Option<i64>,
    pub max_in_flight: Option<usize>,
    pub status: bool,
    pub publish_results: bool,
    pub debug: bool,
    pub log_json: bool,
}

impl WorkerConfig {
    pub fn from_toml(source: &str) -> Result<Self, WorkerError> {
        toml::from_str(source).map_err(|e| WorkerError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, WorkerError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| WorkerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&source)
    }

    /// Apply CLI overrides. Flags only ever switch features on.
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(host) = &overrides.broker_host {
            self.broker.host = host.clone();
        }
        if let Some(host) = &overrides.store_host {
            self.store.host = host.clone();
        }
        if let Some(port) = overrides.store_port {
            self.store.port = port;
        }
        if let Some(db) = overrides.store_db {
            self.store.db = db;
        }
        if let Some(limit) = overrides.max_in_flight {
            self.dispatch.max_in_flight = limit;
        }
        self.dispatch.status |= overrides.status;
        self.dispatch.publish_results |= overrides.publish_results;
        self.logging.debug |= overrides.debug;
        self.logging.json |= overrides.log_json;
    }

    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.dispatch.max_in_flight == 0 {
            return Err(WorkerError::Config(
                "dispatch.max_in_flight must be at least 1".to_string(),
            ));
        }
        if self.http.timeout_seconds == 0 {
            return Err(WorkerError::Config(
                "http.timeout_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_broker_host() -> String {
    "localhost".to_string()
}
fn default_broker_port() -> u16 {
    5672
}
fn default_guest() -> String {
    "guest".to_string()
}
fn default_vhost() -> String {
    "/".to_string()
}
fn default_prefetch() -> u16 {
    32
}
fn default_max_in_flight() -> usize {
    64
}
