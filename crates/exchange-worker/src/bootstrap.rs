use std::future::Future;
use std::io;
use std::sync::Arc;

use exchange_auth::{AuthLookup, RedisAuthStore};
use exchange_ops::ExecutorSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::amqp::BrokerSession;
use crate::config::WorkerConfig;
use crate::dispatch::Dispatcher;
use crate::error::WorkerError;
use crate::publisher::ResultPublisher;

/// Connect to the broker and the credential store, declare the topology,
/// and dispatch until `shutdown` fires or the broker connection is lost.
pub async fn run(config: WorkerConfig, shutdown: CancellationToken) -> Result<(), WorkerError> {
    config.validate()?;

    let session = BrokerSession::connect(&config.broker)
        .await
        .map_err(WorkerError::BrokerConnect)?;

    info!(host = %config.store.host, port = config.store.port, db = config.store.db, "Connecting to redis");
    let auth: Arc<dyn AuthLookup> = Arc::new(
        RedisAuthStore::connect(&config.store)
            .await
            .map_err(WorkerError::StoreConnect)?,
    );

    let executors = ExecutorSet::http(&config.http)?;

    session
        .declare_topology(&config.dispatch)
        .await
        .map_err(WorkerError::BrokerConnect)?;
    let subscriptions = session
        .subscribe_all()
        .await
        .map_err(WorkerError::BrokerConnect)?;

    let (connection, channel) = session.into_parts();
    let dispatcher = Dispatcher::new(
        channel,
        executors,
        auth,
        ResultPublisher::new(config.dispatch.publish_results),
        config.dispatch.max_in_flight,
    )
    .with_cancel_token(shutdown);

    info!(
        max_in_flight = config.dispatch.max_in_flight,
        publish_results = config.dispatch.publish_results,
        status = config.dispatch.status,
        "Worker ready"
    );
    let result = dispatcher.run(subscriptions).await;

    if let Err(e) = connection.close(200, "shutdown").await {
        warn!(error = %e, "Failed to close broker connection");
    }
    result
}

/// Cancel `shutdown` once `signal` fires. A signal listener that could not be
/// installed is logged and leaves the worker running.
pub async fn cancel_on_interrupt<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Received shutdown signal");
            shutdown.cancel();
        }
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
