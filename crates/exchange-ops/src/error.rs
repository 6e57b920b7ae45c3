use exchange_models::{FailureKind, MissingField};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] MissingField),
}

impl ExecutorError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ExecutorError::Transport(_) => FailureKind::Transport,
            ExecutorError::Upstream { .. } => FailureKind::Upstream,
            ExecutorError::MalformedResponse(_) => FailureKind::MalformedResponse,
            ExecutorError::InvalidRequest(_) => FailureKind::InvalidRequest,
        }
    }
}
