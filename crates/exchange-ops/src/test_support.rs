//! Test support: a scripted transport and a recording executor, so the
//! dispatch path can be exercised without the trading API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use exchange_models::{Credentials, OperationKind, TradeRequest};

use crate::call::OutboundCall;
use crate::error::ExecutorError;
use crate::executor::OperationExecutor;
use crate::transport::TradeTransport;

type ErrorFactory = Box<dyn Fn() -> ExecutorError + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Ordered, shared record of events from several mocks, used to assert
/// cross-component ordering (e.g. "executed before acknowledged").
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        lock(&self.entries).push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.entries).clone()
    }

    /// Position of the first entry equal to `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        lock(&self.entries).iter().position(|e| e == entry)
    }

    pub fn count(&self, entry: &str) -> usize {
        lock(&self.entries).iter().filter(|e| *e == entry).count()
    }
}

/// Transport that records every call and answers from a script.
pub struct MockTransport {
    calls: Mutex<Vec<OutboundCall>>,
    response: Mutex<serde_json::Value>,
    failure: Mutex<Option<ErrorFactory>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            response: Mutex::new(serde_json::json!({})),
            failure: Mutex::new(None),
        }
    }

    pub fn respond_with(&self, response: serde_json::Value) {
        *lock(&self.response) = response;
        *lock(&self.failure) = None;
    }

    pub fn fail_with(&self, error: impl Fn() -> ExecutorError + Send + Sync + 'static) {
        *lock(&self.failure) = Some(Box::new(error));
    }

    pub fn calls(&self) -> Vec<OutboundCall> {
        lock(&self.calls).clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TradeTransport for MockTransport {
    async fn send(&self, call: &OutboundCall) -> Result<serde_json::Value, ExecutorError> {
        lock(&self.calls).push(call.clone());
        if let Some(error) = lock(&self.failure).as_ref() {
            return Err(error());
        }
        Ok(lock(&self.response).clone())
    }
}

/// Executor that records the requests it sees, optionally after a delay and
/// optionally failing.
pub struct MockExecutor {
    kind: OperationKind,
    delay: Duration,
    fail: bool,
    invocations: AtomicUsize,
    seen: Mutex<Vec<String>>,
    journal: Option<Journal>,
}

impl MockExecutor {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            delay: Duration::ZERO,
            fail: false,
            invocations: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            journal: None,
        }
    }

    pub fn failing(kind: OperationKind) -> Self {
        let mut mock = Self::new(kind);
        mock.fail = true;
        mock
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Records `executed:<offer id or steam id>` once the call concludes.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Offer ids (or steam ids when there is none) in invocation order.
    pub fn seen(&self) -> Vec<String> {
        lock(&self.seen).clone()
    }
}

#[async_trait]
impl OperationExecutor for MockExecutor {
    fn kind(&self) -> OperationKind {
        self.kind
    }

    async fn execute(
        &self,
        request: &TradeRequest,
        _credentials: &Credentials,
    ) -> Result<serde_json::Value, ExecutorError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let label = request.offer_id().unwrap_or(request.steam_id()).to_string();
        lock(&self.seen).push(label.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(journal) = &self.journal {
            journal.record(format!("executed:{label}"));
        }

        if self.fail {
            return Err(ExecutorError::Transport("mock failure".to_string()));
        }
        Ok(serde_json::json!({ "operation": self.kind, "id": label }))
    }
}
