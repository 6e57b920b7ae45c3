pub mod call;
pub mod config;
pub mod error;
pub mod executor;
pub mod registry;
pub mod transport;

pub mod test_support;

pub use call::OutboundCall;
pub use config::HttpConfig;
pub use error::ExecutorError;
pub use executor::{AcceptExecutor, CreateExecutor, DeclineExecutor, OperationExecutor};
pub use registry::ExecutorSet;
pub use transport::{ReqwestTransport, TradeTransport};
