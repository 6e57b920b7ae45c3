use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::operation::OperationKind;

/// Classification of a failed operation, as reported on the results exchange.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Decode,
    AuthNotFound,
    StoreUnavailable,
    InvalidCredentials,
    Transport,
    Upstream,
    MalformedResponse,
    InvalidRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded {
        response: serde_json::Value,
    },
    Failed {
        error: FailureKind,
        message: String,
    },
}

/// The recorded result of one executed trade operation.
///
/// Deliberately carries nothing about the queue delivery it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationOutcome {
    pub id: Uuid,
    pub operation: OperationKind,
    pub steam_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_offer_id: Option<String>,
    #[serde(flatten)]
    pub status: OutcomeStatus,
    pub completed_at: DateTime<Utc>,
}

impl OperationOutcome {
    pub fn succeeded(
        operation: OperationKind,
        steam_id: impl Into<String>,
        trade_offer_id: Option<String>,
        response: serde_json::Value,
    ) -> Self {
        Self::with_status(
            operation,
            steam_id.into(),
            trade_offer_id,
            OutcomeStatus::Succeeded { response },
        )
    }

    pub fn failed(
        operation: OperationKind,
        steam_id: impl Into<String>,
        trade_offer_id: Option<String>,
        error: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self::with_status(
            operation,
            steam_id.into(),
            trade_offer_id,
            OutcomeStatus::Failed {
                error,
                message: message.into(),
            },
        )
    }

    fn with_status(
        operation: OperationKind,
        steam_id: String,
        trade_offer_id: Option<String>,
        status: OutcomeStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            steam_id,
            trade_offer_id,
            status,
            completed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Succeeded { .. })
    }

    pub fn failure(&self) -> Option<FailureKind> {
        match &self.status {
            OutcomeStatus::Failed { error, .. } => Some(*error),
            OutcomeStatus::Succeeded { .. } => None,
        }
    }

    /// Body published to the results exchange.
    pub fn to_body(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
