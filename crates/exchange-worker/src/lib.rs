pub mod amqp;
pub mod bootstrap;
pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod publisher;

pub mod test_support;

pub use channel::{BrokerChannel, DeliveryTag, InboundDelivery, SharedChannel};
pub use config::{ConfigOverrides, WorkerConfig};
pub use dispatch::{DeliveryStream, Dispatcher, Subscription};
pub use error::{ChannelError, WorkerError};
pub use publisher::ResultPublisher;
