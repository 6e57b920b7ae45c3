pub mod credentials;
pub mod operation;
pub mod outcome;
pub mod trade_request;

pub use credentials::{Credentials, CredentialsError};
pub use operation::{OperationKind, PROCESS_EXCHANGE, RESULTS_EXCHANGE, STATUS_EXCHANGE};
pub use outcome::{FailureKind, OperationOutcome, OutcomeStatus};
pub use trade_request::{DecodeError, MissingField, TradeRequest};
