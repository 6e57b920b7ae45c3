use async_trait::async_trait;
use exchange_models::Credentials;

use crate::error::AuthError;

/// Resolves a user identifier to the session credentials stored for it.
///
/// Implementations are read-only and must not retry: the caller decides what
/// a failed lookup means for the operation.
#[async_trait]
pub trait AuthLookup: Send + Sync {
    async fn credentials(&self, steam_id: &str) -> Result<Credentials, AuthError>;
}
