use async_trait::async_trait;
use exchange_models::Credentials;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AuthError;
use crate::lookup::AuthLookup;

/// Connection settings for the Redis credential store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Logical database index.
    #[serde(default)]
    pub db: i64,
    /// Prepended to the user identifier to form the record key.
    #[serde(default)]
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db: 0,
            key_prefix: String::new(),
        }
    }
}

impl StoreConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    6379
}

/// Key under which a user's credential record is stored.
pub fn record_key(prefix: &str, steam_id: &str) -> String {
    format!("{prefix}{steam_id}")
}

/// Credential lookup backed by Redis `GET`.
///
/// Holds one multiplexed connection; each lookup works on a cheap clone of it,
/// so concurrent tasks never wait on each other here.
pub struct RedisAuthStore {
    conn: MultiplexedConnection,
    key_prefix: String,
}

impl RedisAuthStore {
    /// Connect and `PING` once so an unreachable store fails at startup.
    pub async fn connect(config: &StoreConfig) -> Result<Self, AuthError> {
        let client = redis::Client::open(config.url())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        debug!("Connected to redis");
        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
        })
    }
}

#[async_trait]
impl AuthLookup for RedisAuthStore {
    async fn credentials(&self, steam_id: &str) -> Result<Credentials, AuthError> {
        let mut conn = self.conn.clone();
        let raw: Option<Vec<u8>> = conn.get(record_key(&self.key_prefix, steam_id)).await?;
        parse_record(steam_id, raw)
    }
}

/// Turn a fetched value into credentials. The store answered, so anything
/// wrong with the value is the record's fault, not the store's.
fn parse_record(steam_id: &str, raw: Option<Vec<u8>>) -> Result<Credentials, AuthError> {
    let raw = raw.ok_or_else(|| AuthError::NotFound(steam_id.to_string()))?;
    Credentials::from_bytes(&raw).map_err(|source| AuthError::Invalid {
        steam_id: steam_id.to_string(),
        source,
    })
}
