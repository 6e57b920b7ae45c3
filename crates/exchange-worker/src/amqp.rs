//! RabbitMQ adapter: connection setup, topology, consumers, and the
//! [`BrokerChannel`] implementation the dispatcher settles through.

use async_trait::async_trait;
use exchange_models::{OperationKind, PROCESS_EXCHANGE, RESULTS_EXCHANGE, STATUS_EXCHANGE};
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::{debug, info};

use crate::channel::{BrokerChannel, DeliveryTag, InboundDelivery};
use crate::config::{BrokerConfig, DispatchConfig};
use crate::dispatch::{DeliveryStream, Subscription};
use crate::error::ChannelError;

const CONTENT_TYPE: &str = "application/json";

/// The publishing half of a lapin channel.
pub struct AmqpChannel {
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn ack(&mut self, tag: DeliveryTag) -> Result<(), ChannelError> {
        self.channel
            .basic_ack(tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }

    async fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), ChannelError> {
        let properties = BasicProperties::default().with_content_type(CONTENT_TYPE.into());
        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await?;
        Ok(())
    }
}

/// One broker connection with the single channel everything runs on.
pub struct BrokerSession {
    connection: Connection,
    channel: Channel,
}

impl BrokerSession {
    pub async fn connect(config: &BrokerConfig) -> Result<Self, ChannelError> {
        info!(host = %config.host, port = config.port, vhost = %config.vhost, "Connecting to rabbitmq");
        let connection = Connection::connect(&config.uri(), ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .basic_qos(config.prefetch, BasicQosOptions::default())
            .await?;
        Ok(Self {
            connection,
            channel,
        })
    }

    /// Declare the process exchange and work queues, plus the results and
    /// status exchanges when those features are on.
    pub async fn declare_topology(&self, dispatch: &DispatchConfig) -> Result<(), ChannelError> {
        if dispatch.publish_results {
            self.declare_exchange(RESULTS_EXCHANGE, ExchangeKind::Direct)
                .await?;
        }
        if dispatch.status {
            self.declare_exchange(STATUS_EXCHANGE, ExchangeKind::Topic)
                .await?;
        }
        self.declare_exchange(PROCESS_EXCHANGE, ExchangeKind::Direct)
            .await?;

        for kind in OperationKind::ALL {
            self.channel
                .queue_declare(
                    kind.queue_name(),
                    QueueDeclareOptions::default(),
                    FieldTable::default(),
                )
                .await?;
            self.channel
                .queue_bind(
                    kind.queue_name(),
                    PROCESS_EXCHANGE,
                    kind.routing_key(),
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
            debug!(queue = kind.queue_name(), routing_key = kind.routing_key(), "Queue bound");
        }
        Ok(())
    }

    async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<(), ChannelError> {
        self.channel
            .exchange_declare(
                name,
                kind,
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    /// Start a consumer on the queue for `kind`. Acknowledgement is manual.
    pub async fn subscribe(&self, kind: OperationKind) -> Result<Subscription, ChannelError> {
        let tag = format!("trade-exchange-{kind}-{}", std::process::id());
        let consumer = self
            .channel
            .basic_consume(
                kind.queue_name(),
                &tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        info!(queue = kind.queue_name(), consumer = %tag, "Subscribed");

        let deliveries: DeliveryStream = consumer
            .map(|item| {
                item.map(|delivery| InboundDelivery {
                    tag: delivery.delivery_tag,
                    body: delivery.data,
                })
                .map_err(ChannelError::from)
            })
            .boxed();
        Ok(Subscription::new(kind, deliveries))
    }

    /// Consumers for all three work queues.
    pub async fn subscribe_all(&self) -> Result<Vec<Subscription>, ChannelError> {
        let mut subscriptions = Vec::with_capacity(OperationKind::ALL.len());
        for kind in OperationKind::ALL {
            subscriptions.push(self.subscribe(kind).await?);
        }
        Ok(subscriptions)
    }

    /// Split into the connection (kept for shutdown) and the channel handed
    /// to the dispatcher.
    pub fn into_parts(self) -> (Connection, AmqpChannel) {
        (
            self.connection,
            AmqpChannel {
                channel: self.channel,
            },
        )
    }
}
