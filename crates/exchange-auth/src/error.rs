use exchange_models::{CredentialsError, FailureKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("no credentials stored for {0}")]
    NotFound(String),

    #[error("credential store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("invalid credentials stored for {steam_id}: {source}")]
    Invalid {
        steam_id: String,
        #[source]
        source: CredentialsError,
    },
}

impl From<redis::RedisError> for AuthError {
    fn from(e: redis::RedisError) -> Self {
        AuthError::StoreUnavailable(e.to_string())
    }
}

impl AuthError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            AuthError::NotFound(_) => FailureKind::AuthNotFound,
            AuthError::StoreUnavailable(_) => FailureKind::StoreUnavailable,
            AuthError::Invalid { .. } => FailureKind::InvalidCredentials,
        }
    }
}
