use exchange_auth::AuthError;
use exchange_ops::ExecutorError;
use thiserror::Error;

pub const EXIT_CONFIG: u8 = 1;
pub const EXIT_BROKER_UNAVAILABLE: u8 = 2;
pub const EXIT_STORE_UNAVAILABLE: u8 = 3;
pub const EXIT_CONNECTION_LOST: u8 = 4;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Channel closed: {0}")]
    Closed(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Couldn't connect to rabbitmq: {0}")]
    BrokerConnect(#[source] ChannelError),

    #[error("Couldn't connect to redis: {0}")]
    StoreConnect(#[source] AuthError),

    #[error("HTTP client error: {0}")]
    Http(#[from] ExecutorError),

    #[error("Lost broker connection while consuming {queue}: {source}")]
    ConnectionLost {
        queue: &'static str,
        #[source]
        source: ChannelError,
    },

    #[error("Consumer task failed: {0}")]
    Task(String),
}

impl WorkerError {
    /// Process exit status for this failure; each dependency gets its own.
    pub fn exit_code(&self) -> u8 {
        match self {
            WorkerError::Config(_) | WorkerError::Http(_) => EXIT_CONFIG,
            WorkerError::BrokerConnect(_) => EXIT_BROKER_UNAVAILABLE,
            WorkerError::StoreConnect(_) => EXIT_STORE_UNAVAILABLE,
            WorkerError::ConnectionLost { .. } | WorkerError::Task(_) => EXIT_CONNECTION_LOST,
        }
    }
}
