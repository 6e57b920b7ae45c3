//! Test support: an in-memory broker channel that records what it was asked
//! to do, plus helpers to feed deliveries into the dispatcher.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use exchange_ops::test_support::Journal;
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;

use crate::channel::{BrokerChannel, DeliveryTag, InboundDelivery};
use crate::dispatch::{DeliveryStream, Dispatcher, Subscription};
use crate::error::{ChannelError, WorkerError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedRecord {
    pub exchange: String,
    pub routing_key: String,
    pub body: serde_json::Value,
}

#[derive(Default)]
struct LogState {
    acks: Vec<DeliveryTag>,
    published: Vec<PublishedRecord>,
}

/// Shared view of everything a [`RecordingChannel`] did.
///
/// Events go to a [`Journal`] as `ack:<tag>` and `publish:<exchange>/<key>`;
/// pass the executor's journal in to check ordering across both.
#[derive(Clone)]
pub struct ChannelLog {
    state: Arc<Mutex<LogState>>,
    journal: Journal,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl ChannelLog {
    pub fn new() -> Self {
        Self::with_journal(Journal::new())
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self {
            state: Arc::new(Mutex::new(LogState::default())),
            journal,
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn acks(&self) -> Vec<DeliveryTag> {
        lock(&self.state).acks.clone()
    }

    pub fn published(&self) -> Vec<PublishedRecord> {
        lock(&self.state).published.clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.journal.entries()
    }

    /// Highest number of calls ever observed inside the channel at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for ChannelLog {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory [`BrokerChannel`]. Each call can be slowed down to widen the
/// window in which overlapping use would be observed.
pub struct RecordingChannel {
    log: ChannelLog,
    delay: Duration,
    fail_acks: bool,
    fail_publishes: bool,
}

impl RecordingChannel {
    pub fn new(log: ChannelLog) -> Self {
        Self {
            log,
            delay: Duration::ZERO,
            fail_acks: false,
            fail_publishes: false,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_acks(mut self) -> Self {
        self.fail_acks = true;
        self
    }

    pub fn failing_publishes(mut self) -> Self {
        self.fail_publishes = true;
        self
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl BrokerChannel for RecordingChannel {
    async fn ack(&mut self, tag: DeliveryTag) -> Result<(), ChannelError> {
        self.log.enter();
        self.pause().await;
        let result = if self.fail_acks {
            Err(ChannelError::Closed("ack refused".to_string()))
        } else {
            lock(&self.log.state).acks.push(tag);
            self.log.journal.record(format!("ack:{tag}"));
            Ok(())
        };
        self.log.exit();
        result
    }

    async fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), ChannelError> {
        self.log.enter();
        self.pause().await;
        let result = if self.fail_publishes {
            Err(ChannelError::Closed("publish refused".to_string()))
        } else {
            let body = serde_json::from_slice(body).unwrap_or(serde_json::Value::Null);
            lock(&self.log.state).published.push(PublishedRecord {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                body,
            });
            self.log
                .journal
                .record(format!("publish:{exchange}/{routing_key}"));
            Ok(())
        };
        self.log.exit();
        result
    }
}

pub fn delivery(tag: DeliveryTag, body: &str) -> InboundDelivery {
    InboundDelivery {
        tag,
        body: body.as_bytes().to_vec(),
    }
}

/// A stream that yields `deliveries` and then ends, like a consumer the
/// broker has cancelled.
pub fn finite_stream(deliveries: Vec<InboundDelivery>) -> DeliveryStream {
    stream::iter(deliveries.into_iter().map(Ok)).boxed()
}

/// A stream that yields `deliveries` and then stays open, like a live
/// consumer on a drained queue.
pub fn open_stream(deliveries: Vec<InboundDelivery>) -> DeliveryStream {
    stream::iter(deliveries.into_iter().map(Ok))
        .chain(stream::pending())
        .boxed()
}

/// Run `dispatcher` until `log` has seen `acks` acknowledgements, then shut
/// it down and return what `run` returned. Gives up waiting after five
/// seconds so a missing ack fails the caller's assertions instead of hanging.
pub async fn run_until_acked<C: BrokerChannel + 'static>(
    dispatcher: &Dispatcher<C>,
    subscriptions: Vec<Subscription>,
    log: &ChannelLog,
    acks: usize,
) -> Result<(), WorkerError> {
    let cancel = dispatcher.cancel_token();
    let watcher = async {
        for _ in 0..1000 {
            if log.acks().len() >= acks || cancel.is_cancelled() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
    };
    let (result, ()) = tokio::join!(dispatcher.run(subscriptions), watcher);
    result
}

/// A stream fed from an mpsc channel; it ends when every sender is dropped.
pub fn channel_stream() -> (
    mpsc::UnboundedSender<Result<InboundDelivery, ChannelError>>,
    DeliveryStream,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let deliveries = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed();
    (tx, deliveries)
}
