use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use exchange_models::Credentials;
use tokio::sync::RwLock;

use crate::error::AuthError;
use crate::lookup::AuthLookup;

/// In-process credential store holding raw records, parsed on every lookup
/// exactly like the Redis store does.
pub struct MemoryAuthStore {
    records: RwLock<HashMap<String, String>>,
    available: AtomicBool,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Store a well-formed record for `steam_id`.
    pub fn with_credentials(self, steam_id: &str, session_id: &str, api_key: &str) -> Self {
        let raw = serde_json::json!({ "sessionid": session_id, "api_key": api_key }).to_string();
        self.with_record(steam_id, raw)
    }

    /// Store an arbitrary raw record for `steam_id`.
    pub fn with_record(mut self, steam_id: &str, raw: impl Into<String>) -> Self {
        self.records
            .get_mut()
            .insert(steam_id.to_string(), raw.into());
        self
    }

    pub async fn insert(&self, steam_id: &str, raw: impl Into<String>) {
        self.records
            .write()
            .await
            .insert(steam_id.to_string(), raw.into());
    }

    /// Simulate the backing store going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Default for MemoryAuthStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthLookup for MemoryAuthStore {
    async fn credentials(&self, steam_id: &str) -> Result<Credentials, AuthError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(AuthError::StoreUnavailable(
                "memory store switched off".to_string(),
            ));
        }

        let records = self.records.read().await;
        let raw = records
            .get(steam_id)
            .ok_or_else(|| AuthError::NotFound(steam_id.to_string()))?;

        Credentials::from_record(raw).map_err(|source| AuthError::Invalid {
            steam_id: steam_id.to_string(),
            source,
        })
    }
}
