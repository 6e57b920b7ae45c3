use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::Client;
use tracing::{debug, warn};

use crate::call::OutboundCall;
use crate::config::HttpConfig;
use crate::error::ExecutorError;

/// Longest upstream body excerpt kept in an error.
const BODY_EXCERPT_CHARS: usize = 512;

/// Sends one [`OutboundCall`] and returns the parsed JSON body. Mockable for testing.
#[async_trait]
pub trait TradeTransport: Send + Sync {
    async fn send(&self, call: &OutboundCall) -> Result<serde_json::Value, ExecutorError>;
}

/// Production transport over a shared `reqwest` client.
///
/// No retries: one invocation is exactly one HTTP request.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &HttpConfig) -> Result<Self, ExecutorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ExecutorError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TradeTransport for ReqwestTransport {
    async fn send(&self, call: &OutboundCall) -> Result<serde_json::Value, ExecutorError> {
        debug!(url = %call.url, "Sending trade API request");

        let mut request = self.client.post(&call.url).form(&call.form);
        for (name, value) in &call.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(cookie) = &call.cookie {
            request = request.header(COOKIE, cookie.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;

        if !status.is_success() {
            warn!(url = %call.url, status = status.as_u16(), "Trade API returned an error status");
            return Err(ExecutorError::Upstream {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        parse_body(&body)
    }
}

/// Parse a success body. Anything but JSON is a malformed response.
pub fn parse_body(body: &str) -> Result<serde_json::Value, ExecutorError> {
    serde_json::from_str(body).map_err(|e| {
        ExecutorError::MalformedResponse(format!("{e}; body starts with {:?}", excerpt(body)))
    })
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}
