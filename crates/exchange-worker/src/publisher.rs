use exchange_models::{OperationOutcome, RESULTS_EXCHANGE};
use tracing::{debug, error};

use crate::channel::BrokerChannel;

/// Emits outcomes to the results exchange, tagged with the operation kind.
///
/// Takes the channel by `&mut`, which only the critical section in
/// [`crate::channel::SharedChannel::settle`] can hand out.
#[derive(Debug, Clone)]
pub struct ResultPublisher {
    enabled: bool,
    exchange: String,
}

impl ResultPublisher {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            exchange: RESULTS_EXCHANGE.to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Publish `outcome` if enabled. Failures are logged, never returned.
    pub async fn publish<C: BrokerChannel + ?Sized>(&self, channel: &mut C, outcome: &OperationOutcome) {
        if !self.enabled {
            return;
        }

        let body = match outcome.to_body() {
            Ok(body) => body,
            Err(e) => {
                error!(outcome = %outcome.id, error = %e, "Failed to serialize outcome");
                return;
            }
        };

        let routing_key = outcome.operation.routing_key();
        match channel.publish(&self.exchange, routing_key, &body).await {
            Ok(()) => debug!(outcome = %outcome.id, routing_key, "Published outcome"),
            Err(e) => error!(outcome = %outcome.id, routing_key, error = %e, "Failed to publish outcome"),
        }
    }
}
