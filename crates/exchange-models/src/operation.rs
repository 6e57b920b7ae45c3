use std::fmt;

use serde::{Deserialize, Serialize};

/// Direct exchange the inbound work queues are bound to.
pub const PROCESS_EXCHANGE: &str = "tradeProcess";
/// Direct exchange outcomes are published to when result publishing is on.
pub const RESULTS_EXCHANGE: &str = "tradeResults";
/// Topic exchange for status distribution.
pub const STATUS_EXCHANGE: &str = "status";

/// The three trade operations the worker knows how to run.
///
/// Each kind owns one queue on the process exchange and one routing key,
/// which is reused when tagging published outcomes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Accept,
    Decline,
    Create,
}

impl OperationKind {
    pub const ALL: [OperationKind; 3] = [
        OperationKind::Accept,
        OperationKind::Decline,
        OperationKind::Create,
    ];

    /// Routing key on both the process and the results exchange.
    pub fn routing_key(self) -> &'static str {
        match self {
            OperationKind::Accept => "accept",
            OperationKind::Decline => "decline",
            OperationKind::Create => "create",
        }
    }

    /// Name of the work queue this kind is consumed from.
    pub fn queue_name(self) -> &'static str {
        match self {
            OperationKind::Accept => "tradeAccept",
            OperationKind::Decline => "tradeDecline",
            OperationKind::Create => "tradeCreate",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.routing_key())
    }
}
