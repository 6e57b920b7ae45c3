use async_trait::async_trait;
use exchange_models::OperationOutcome;
use tokio::sync::Mutex;

use crate::error::ChannelError;
use crate::publisher::ResultPublisher;

/// Broker-assigned handle of one delivery, used only to acknowledge it.
pub type DeliveryTag = u64;

/// One message taken off a work queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundDelivery {
    pub tag: DeliveryTag,
    pub body: Vec<u8>,
}

/// The outbound side of the broker connection. Implementations are not
/// expected to tolerate concurrent use, hence `&mut self`.
#[async_trait]
pub trait BrokerChannel: Send {
    async fn ack(&mut self, tag: DeliveryTag) -> Result<(), ChannelError>;

    async fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), ChannelError>;
}

/// The single broker channel shared by every operation task.
///
/// All access goes through one mutex, held only for "acknowledge, then
/// publish". The trading API calls themselves never run under it.
pub struct SharedChannel<C> {
    channel: Mutex<C>,
}

impl<C: BrokerChannel> SharedChannel<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel: Mutex::new(channel),
        }
    }

    /// Acknowledge a delivery that produced no operation.
    pub async fn acknowledge(&self, tag: DeliveryTag) -> Result<(), ChannelError> {
        let mut channel = self.channel.lock().await;
        channel.ack(tag).await
    }

    /// Acknowledge `tag` and hand the outcome to the publisher, in that order,
    /// inside one critical section. The publisher runs even if the ack failed.
    pub async fn settle(
        &self,
        tag: DeliveryTag,
        outcome: &OperationOutcome,
        publisher: &ResultPublisher,
    ) -> Result<(), ChannelError> {
        let mut channel = self.channel.lock().await;
        let acked = channel.ack(tag).await;
        publisher.publish(&mut *channel, outcome).await;
        acked
    }
}
