use std::sync::Arc;

use exchange_models::OperationKind;

use crate::config::HttpConfig;
use crate::error::ExecutorError;
use crate::executor::{AcceptExecutor, CreateExecutor, DeclineExecutor, OperationExecutor};
use crate::transport::{ReqwestTransport, TradeTransport};

/// One executor per operation kind.
#[derive(Clone)]
pub struct ExecutorSet {
    accept: Arc<dyn OperationExecutor>,
    decline: Arc<dyn OperationExecutor>,
    create: Arc<dyn OperationExecutor>,
}

impl ExecutorSet {
    pub fn new(
        accept: Arc<dyn OperationExecutor>,
        decline: Arc<dyn OperationExecutor>,
        create: Arc<dyn OperationExecutor>,
    ) -> Self {
        Self {
            accept,
            decline,
            create,
        }
    }

    /// The three HTTP executors sharing one transport.
    pub fn with_transport(transport: Arc<dyn TradeTransport>, config: &HttpConfig) -> Self {
        Self::new(
            Arc::new(AcceptExecutor::new(transport.clone(), config.clone())),
            Arc::new(DeclineExecutor::new(transport.clone(), config.clone())),
            Arc::new(CreateExecutor::new(transport, config.clone())),
        )
    }

    /// The three HTTP executors over a fresh `reqwest` client.
    pub fn http(config: &HttpConfig) -> Result<Self, ExecutorError> {
        let transport: Arc<dyn TradeTransport> = Arc::new(ReqwestTransport::new(config)?);
        Ok(Self::with_transport(transport, config))
    }

    pub fn for_kind(&self, kind: OperationKind) -> &Arc<dyn OperationExecutor> {
        match kind {
            OperationKind::Accept => &self.accept,
            OperationKind::Decline => &self.decline,
            OperationKind::Create => &self.create,
        }
    }
}
