use std::sync::Arc;
use std::time::Instant;

use exchange_auth::AuthLookup;
use exchange_models::{OperationKind, OperationOutcome, TradeRequest};
use exchange_ops::ExecutorSet;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::channel::{BrokerChannel, DeliveryTag, InboundDelivery, SharedChannel};
use crate::error::{ChannelError, WorkerError};
use crate::publisher::ResultPublisher;

/// Deliveries from one queue. An `Err` item means the connection is gone.
pub type DeliveryStream = BoxStream<'static, Result<InboundDelivery, ChannelError>>;

/// One queue's delivery stream, bound to the operation it carries.
pub struct Subscription {
    pub kind: OperationKind,
    pub deliveries: DeliveryStream,
}

impl Subscription {
    pub fn new(kind: OperationKind, deliveries: DeliveryStream) -> Self {
        Self { kind, deliveries }
    }
}

/// Everything one operation task needs, handed over explicitly.
struct Job {
    kind: OperationKind,
    request: TradeRequest,
    delivery: DeliveryTag,
}

enum LoopExit {
    Shutdown,
    Closed,
    Failed(ChannelError),
}

/// State shared by every task. Only `channel` is mutable, and only behind
/// its lock.
struct Shared<C> {
    executors: ExecutorSet,
    auth: Arc<dyn AuthLookup>,
    channel: SharedChannel<C>,
    publisher: ResultPublisher,
}

/// The dispatch engine: one consumption loop per queue, one task per message.
///
/// Loops only decode and spawn. Each task looks up credentials and runs its
/// executor without holding any lock, then acknowledges and publishes inside
/// the shared channel's critical section. At most `max_in_flight` tasks run
/// at once.
pub struct Dispatcher<C> {
    shared: Arc<Shared<C>>,
    in_flight: Arc<Semaphore>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl<C> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            in_flight: Arc::clone(&self.in_flight),
            tasks: self.tasks.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<C: BrokerChannel + 'static> Dispatcher<C> {
    pub fn new(
        channel: C,
        executors: ExecutorSet,
        auth: Arc<dyn AuthLookup>,
        publisher: ResultPublisher,
        max_in_flight: usize,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                executors,
                auth,
                channel: SharedChannel::new(channel),
                publisher,
            }),
            in_flight: Arc::new(Semaphore::new(max_in_flight.max(1))),
            tasks: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token for shutdown.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns a CancellationToken that can be used to trigger shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Operation tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Consume every subscription until shutdown or until a consumer is lost.
    /// Declares no topology. A stream error or a stream that ends without a
    /// shutdown request stops every loop and returns `ConnectionLost`.
    /// In-flight operations are always allowed to finish before this returns.
    pub async fn run(&self, subscriptions: Vec<Subscription>) -> Result<(), WorkerError> {
        info!(queues = subscriptions.len(), "Dispatch engine starting");

        let mut loops = JoinSet::new();
        for subscription in subscriptions {
            let dispatcher = self.clone();
            loops.spawn(async move {
                let kind = subscription.kind;
                (kind, dispatcher.consume(subscription).await)
            });
        }

        let mut fatal = None;
        while let Some(joined) = loops.join_next().await {
            match joined {
                Ok((kind, LoopExit::Shutdown)) => {
                    info!(queue = kind.queue_name(), "Consumer shutting down");
                }
                Ok((kind, LoopExit::Closed)) => {
                    error!(queue = kind.queue_name(), "Delivery stream ended without shutdown, stopping dispatch");
                    self.cancel.cancel();
                    if fatal.is_none() {
                        fatal = Some(WorkerError::ConnectionLost {
                            queue: kind.queue_name(),
                            source: ChannelError::Closed("consumer stream ended".to_string()),
                        });
                    }
                }
                Ok((kind, LoopExit::Failed(source))) => {
                    error!(queue = kind.queue_name(), error = %source, "Consumer failed, stopping dispatch");
                    self.cancel.cancel();
                    if fatal.is_none() {
                        fatal = Some(WorkerError::ConnectionLost {
                            queue: kind.queue_name(),
                            source,
                        });
                    }
                }
                Err(e) => {
                    error!(error = %e, "Consumer task panicked");
                    self.cancel.cancel();
                    if fatal.is_none() {
                        fatal = Some(WorkerError::Task(e.to_string()));
                    }
                }
            }
        }

        self.tasks.close();
        if !self.tasks.is_empty() {
            info!(in_flight = self.tasks.len(), "Waiting for in-flight operations");
        }
        self.tasks.wait().await;

        info!("Dispatch engine stopped");
        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn consume(&self, mut subscription: Subscription) -> LoopExit {
        let kind = subscription.kind;
        info!(queue = kind.queue_name(), "Consumer started");

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return LoopExit::Shutdown,
                next = subscription.deliveries.next() => next,
            };

            match next {
                Some(Ok(delivery)) => self.on_message(kind, delivery).await,
                Some(Err(e)) => return LoopExit::Failed(e),
                None if self.cancel.is_cancelled() => return LoopExit::Shutdown,
                None => return LoopExit::Closed,
            }
        }
    }

    /// Decode one delivery and spawn its operation task.
    ///
    /// An undecodable body is acknowledged and dropped straight away: the
    /// queues have no dead-letter route, so leaving it unacknowledged would
    /// redeliver it forever. Waits for an in-flight permit before spawning.
    pub async fn on_message(&self, kind: OperationKind, delivery: InboundDelivery) {
        let request = match TradeRequest::decode(kind, &delivery.body) {
            Ok(request) => request,
            Err(e) => {
                warn!(queue = kind.queue_name(), delivery = delivery.tag, error = %e, "Dropping undecodable message");
                if let Err(e) = self.shared.channel.acknowledge(delivery.tag).await {
                    error!(delivery = delivery.tag, error = %e, "Failed to acknowledge message");
                }
                return;
            }
        };

        let permit = match Arc::clone(&self.in_flight).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(delivery = delivery.tag, error = %e, "In-flight limiter closed, leaving message unacknowledged");
                return;
            }
        };

        debug!(
            operation = %kind,
            steam_id = request.steam_id(),
            delivery = delivery.tag,
            "Dispatching operation"
        );

        let job = Job {
            kind,
            request,
            delivery: delivery.tag,
        };
        let shared = Arc::clone(&self.shared);
        self.tasks.spawn(async move {
            shared.run_job(job).await;
            drop(permit);
        });
    }
}

impl<C: BrokerChannel> Shared<C> {
    async fn run_job(&self, job: Job) {
        let outcome = self.perform(&job).await;

        if let Err(e) = self
            .channel
            .settle(job.delivery, &outcome, &self.publisher)
            .await
        {
            error!(delivery = job.delivery, error = %e, "Failed to acknowledge message");
        }
    }

    /// Credential lookup and the trading API call. Runs outside the lock.
    async fn perform(&self, job: &Job) -> OperationOutcome {
        let request = &job.request;
        let steam_id = request.steam_id();
        let offer_id = request.offer_id().map(str::to_string);

        let credentials = match self.auth.credentials(steam_id).await {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(operation = %job.kind, steam_id, error = %e, "Credential lookup failed");
                return OperationOutcome::failed(
                    job.kind,
                    steam_id,
                    offer_id,
                    e.failure_kind(),
                    e.to_string(),
                );
            }
        };

        let start = Instant::now();
        match self
            .executors
            .for_kind(job.kind)
            .execute(request, &credentials)
            .await
        {
            Ok(response) => {
                info!(
                    operation = %job.kind,
                    steam_id,
                    trade_offer_id = offer_id.as_deref(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Operation succeeded"
                );
                OperationOutcome::succeeded(job.kind, steam_id, offer_id, response)
            }
            Err(e) => {
                warn!(
                    operation = %job.kind,
                    steam_id,
                    trade_offer_id = offer_id.as_deref(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    error = %e,
                    "Operation failed"
                );
                OperationOutcome::failed(job.kind, steam_id, offer_id, e.failure_kind(), e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        delivery, finite_stream, open_stream, run_until_acked, ChannelLog, RecordingChannel,
    };
    use exchange_auth::MemoryAuthStore;
    use exchange_ops::test_support::MockExecutor;
    use exchange_ops::OperationExecutor;

    fn mocks() -> (Arc<MockExecutor>, Arc<MockExecutor>, Arc<MockExecutor>) {
        (
            Arc::new(MockExecutor::new(OperationKind::Accept)),
            Arc::new(MockExecutor::new(OperationKind::Decline)),
            Arc::new(MockExecutor::new(OperationKind::Create)),
        )
    }

    fn dispatcher(
        log: &ChannelLog,
        executors: &(Arc<MockExecutor>, Arc<MockExecutor>, Arc<MockExecutor>),
        publish: bool,
    ) -> Dispatcher<RecordingChannel> {
        let set = ExecutorSet::new(
            executors.0.clone() as Arc<dyn OperationExecutor>,
            executors.1.clone() as Arc<dyn OperationExecutor>,
            executors.2.clone() as Arc<dyn OperationExecutor>,
        );
        let auth = Arc::new(MemoryAuthStore::new().with_credentials("765", "S1", "K1"));
        Dispatcher::new(
            RecordingChannel::new(log.clone()),
            set,
            auth,
            ResultPublisher::new(publish),
            4,
        )
    }

    #[tokio::test]
    async fn undecodable_message_is_acked_without_running_anything() {
        let log = ChannelLog::new();
        let executors = mocks();
        let dispatcher = dispatcher(&log, &executors, true);

        dispatcher
            .on_message(OperationKind::Accept, delivery(1, "{not json"))
            .await;

        assert_eq!(log.acks(), vec![1]);
        assert!(log.published().is_empty());
        assert_eq!(executors.0.invocations(), 0);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn run_drains_in_flight_tasks_before_returning() {
        let log = ChannelLog::new();
        let executors = mocks();
        let dispatcher = dispatcher(&log, &executors, false);

        let subscription = Subscription::new(
            OperationKind::Decline,
            open_stream(vec![
                delivery(1, r#"{"steam_id":"765","trade_offer_id":"10"}"#),
                delivery(2, r#"{"steam_id":"765","trade_offer_id":"11"}"#),
            ]),
        );
        run_until_acked(&dispatcher, vec![subscription], &log, 2)
            .await
            .unwrap();

        assert_eq!(executors.1.invocations(), 2);
        let mut acks = log.acks();
        acks.sort_unstable();
        assert_eq!(acks, vec![1, 2]);
    }

    #[tokio::test]
    async fn cancelled_dispatcher_stops_cleanly() {
        let log = ChannelLog::new();
        let executors = mocks();
        let dispatcher = dispatcher(&log, &executors, false);
        let (_tx, deliveries) = crate::test_support::channel_stream();

        dispatcher.cancel_token().cancel();
        dispatcher
            .run(vec![Subscription::new(OperationKind::Accept, deliveries)])
            .await
            .unwrap();
        assert!(log.acks().is_empty());
    }

    #[tokio::test]
    async fn ended_stream_without_shutdown_is_a_lost_connection() {
        let log = ChannelLog::new();
        let executors = mocks();
        let dispatcher = dispatcher(&log, &executors, false);
        let (_tx, idle) = crate::test_support::channel_stream();

        let err = dispatcher
            .run(vec![
                Subscription::new(
                    OperationKind::Accept,
                    finite_stream(vec![delivery(1, r#"{"steam_id":"765","trade_offer_id":"10"}"#)]),
                ),
                Subscription::new(OperationKind::Decline, idle),
            ])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WorkerError::ConnectionLost { queue: "tradeAccept", .. }
        ));
        assert_eq!(err.exit_code(), crate::error::EXIT_CONNECTION_LOST);
        assert!(dispatcher.cancel_token().is_cancelled());
        // The delivery taken before the stream ended was still settled.
        assert_eq!(log.acks(), vec![1]);
    }

    #[tokio::test]
    async fn all_streams_ending_does_not_exit_cleanly() {
        let log = ChannelLog::new();
        let executors = mocks();
        let dispatcher = dispatcher(&log, &executors, false);

        let subscriptions = OperationKind::ALL
            .into_iter()
            .map(|kind| Subscription::new(kind, finite_stream(Vec::new())))
            .collect();
        let err = dispatcher.run(subscriptions).await.unwrap_err();
        assert!(matches!(err, WorkerError::ConnectionLost { .. }));
    }
}
