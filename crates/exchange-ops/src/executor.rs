use std::sync::Arc;

use async_trait::async_trait;
use exchange_models::{Credentials, OperationKind, TradeRequest};

use crate::call::OutboundCall;
use crate::config::HttpConfig;
use crate::error::ExecutorError;
use crate::transport::TradeTransport;

/// One trade operation: turns a request plus credentials into exactly one
/// outbound call and its parsed response. Mockable for testing.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    fn kind(&self) -> OperationKind;

    async fn execute(
        &self,
        request: &TradeRequest,
        credentials: &Credentials,
    ) -> Result<serde_json::Value, ExecutorError>;
}

/// Accepts an incoming offer through the community site (session cookie auth).
pub struct AcceptExecutor {
    transport: Arc<dyn TradeTransport>,
    config: HttpConfig,
}

impl AcceptExecutor {
    pub fn new(transport: Arc<dyn TradeTransport>, config: HttpConfig) -> Self {
        Self { transport, config }
    }

    pub fn build_call(
        &self,
        request: &TradeRequest,
        credentials: &Credentials,
    ) -> Result<OutboundCall, ExecutorError> {
        let community = self.config.community();
        let offer_id = request.trade_offer_id()?;

        Ok(
            OutboundCall::post(format!("{community}/tradeoffer/{offer_id}/accept"))
                .header("Origin", community)
                .header("Referer", format!("{community}/tradeoffer/{offer_id}/"))
                .param("sessionid", credentials.session_id())
                .param("serverid", "1")
                .param("tradeofferid", offer_id)
                .cookie(credentials.session_cookie_header()),
        )
    }
}

#[async_trait]
impl OperationExecutor for AcceptExecutor {
    fn kind(&self) -> OperationKind {
        OperationKind::Accept
    }

    async fn execute(
        &self,
        request: &TradeRequest,
        credentials: &Credentials,
    ) -> Result<serde_json::Value, ExecutorError> {
        let call = self.build_call(request, credentials)?;
        self.transport.send(&call).await
    }
}

/// Declines an offer through the Web API (API key auth, no cookies).
pub struct DeclineExecutor {
    transport: Arc<dyn TradeTransport>,
    config: HttpConfig,
}

impl DeclineExecutor {
    pub fn new(transport: Arc<dyn TradeTransport>, config: HttpConfig) -> Self {
        Self { transport, config }
    }

    pub fn build_call(
        &self,
        request: &TradeRequest,
        credentials: &Credentials,
    ) -> Result<OutboundCall, ExecutorError> {
        Ok(OutboundCall::post(format!(
            "{}/IEconService/DeclineTradeOffer/v1/",
            self.config.api()
        ))
        .param("key", credentials.api_key())
        .param("tradeofferid", request.trade_offer_id()?))
    }
}

#[async_trait]
impl OperationExecutor for DeclineExecutor {
    fn kind(&self) -> OperationKind {
        OperationKind::Decline
    }

    async fn execute(
        &self,
        request: &TradeRequest,
        credentials: &Credentials,
    ) -> Result<serde_json::Value, ExecutorError> {
        let call = self.build_call(request, credentials)?;
        self.transport.send(&call).await
    }
}

/// Sends a new offer through the community site.
///
/// Without a trade token the offer is only valid between accounts that are
/// already friends; with one, both the referer and the create params carry it.
pub struct CreateExecutor {
    transport: Arc<dyn TradeTransport>,
    config: HttpConfig,
}

impl CreateExecutor {
    pub fn new(transport: Arc<dyn TradeTransport>, config: HttpConfig) -> Self {
        Self { transport, config }
    }

    pub fn build_call(
        &self,
        request: &TradeRequest,
        credentials: &Credentials,
    ) -> Result<OutboundCall, ExecutorError> {
        let community = self.config.community();
        let mut referer = format!(
            "{community}/tradeoffer/new/?partner={}",
            request.partner_id_short()?
        );
        // A payload that arrives as a string is already serialized.
        let offer = match request.trade_offer_payload()? {
            serde_json::Value::String(raw) => raw.clone(),
            payload => payload.to_string(),
        };
        let create_params = match request.trade_token() {
            Some(token) => {
                referer.push_str(&format!("&token={token}"));
                serde_json::json!({ "trade_offer_access_token": token })
            }
            None => serde_json::json!({}),
        };

        Ok(OutboundCall::post(format!("{community}/tradeoffer/new/send"))
            .header("Origin", community)
            .header("Referer", referer)
            .param("sessionid", credentials.session_id())
            .param("serverid", "1")
            .param("partner", request.partner_id_long()?)
            .param("tradeoffermessage", request.trade_message())
            .param("captcha", "")
            .param("json_tradeoffer", offer)
            .param("trade_offer_create_params", create_params.to_string())
            .cookie(credentials.session_cookie_header()))
    }
}

#[async_trait]
impl OperationExecutor for CreateExecutor {
    fn kind(&self) -> OperationKind {
        OperationKind::Create
    }

    async fn execute(
        &self,
        request: &TradeRequest,
        credentials: &Credentials,
    ) -> Result<serde_json::Value, ExecutorError> {
        let call = self.build_call(request, credentials)?;
        self.transport.send(&call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockTransport;

    fn creds() -> Credentials {
        Credentials::from_record(r#"{"sessionid":"S1","api_key":"K1","steamLoginSecure":"L1"}"#)
            .unwrap()
    }

    fn decode(kind: OperationKind, body: &str) -> TradeRequest {
        TradeRequest::decode(kind, body.as_bytes()).unwrap()
    }

    fn transport() -> Arc<MockTransport> {
        Arc::new(MockTransport::new())
    }

    #[test]
    fn accept_call_shape() {
        let executor = AcceptExecutor::new(transport(), HttpConfig::default());
        let request = decode(
            OperationKind::Accept,
            r#"{"steam_id":"76561198000000001","trade_offer_id":"123456"}"#,
        );
        let call = executor.build_call(&request, &creds()).unwrap();

        assert_eq!(
            call.url,
            "https://steamcommunity.com/tradeoffer/123456/accept"
        );
        assert_eq!(call.form_value("tradeofferid"), Some("123456"));
        assert_eq!(call.form_value("sessionid"), Some("S1"));
        assert_eq!(call.form_value("serverid"), Some("1"));
        assert_eq!(
            call.header_value("referer"),
            Some("https://steamcommunity.com/tradeoffer/123456/")
        );
        let cookie = call.cookie.unwrap();
        assert!(cookie.contains("sessionid=S1"));
        assert!(cookie.contains("steamLoginSecure=L1"));
        assert!(!cookie.contains("api_key"));
    }

    #[test]
    fn decline_call_uses_api_key_only() {
        let executor = DeclineExecutor::new(transport(), HttpConfig::default());
        let request = decode(OperationKind::Decline, r#"{"steam_id":"1","trade_offer_id":"77"}"#);
        let call = executor.build_call(&request, &creds()).unwrap();

        assert_eq!(
            call.url,
            "https://api.steampowered.com/IEconService/DeclineTradeOffer/v1/"
        );
        assert_eq!(call.form_value("key"), Some("K1"));
        assert_eq!(call.form_value("tradeofferid"), Some("77"));
        assert!(call.cookie.is_none());
        assert!(call.form_value("sessionid").is_none());
    }

    #[test]
    fn create_with_token_carries_it_twice() {
        let executor = CreateExecutor::new(transport(), HttpConfig::default());
        let request = decode(
            OperationKind::Create,
            r#"{"steam_id":"1","partner_id_short":"12","partner_id_long":"999",
                "trade_message":"hi","trade_offer_payload":{"newversion":true},"trade_token":"T1"}"#,
        );
        let call = executor.build_call(&request, &creds()).unwrap();

        assert_eq!(call.url, "https://steamcommunity.com/tradeoffer/new/send");
        assert_eq!(call.form_value("partner"), Some("999"));
        assert_eq!(call.form_value("tradeoffermessage"), Some("hi"));
        assert_eq!(call.form_value("json_tradeoffer"), Some(r#"{"newversion":true}"#));
        assert_eq!(
            call.form_value("trade_offer_create_params"),
            Some(r#"{"trade_offer_access_token":"T1"}"#)
        );
        assert_eq!(
            call.header_value("Referer"),
            Some("https://steamcommunity.com/tradeoffer/new/?partner=12&token=T1")
        );
    }

    #[test]
    fn create_sends_string_payload_verbatim() {
        let executor = CreateExecutor::new(transport(), HttpConfig::default());
        let request = decode(
            OperationKind::Create,
            r#"{"steam_id":"1","partner_id_short":"12","partner_id_long":"999",
                "trade":"{\"newversion\":true}"}"#,
        );
        let call = executor.build_call(&request, &creds()).unwrap();
        assert_eq!(call.form_value("json_tradeoffer"), Some(r#"{"newversion":true}"#));
    }

    #[test]
    fn create_without_token_leaves_it_out() {
        let executor = CreateExecutor::new(transport(), HttpConfig::default());
        for token in [r#""#, r#","trade_token":"""#] {
            let body = format!(
                r#"{{"steam_id":"1","partner_id_short":"12","partner_id_long":"999","trade":{{}}{token}}}"#
            );
            let call = executor
                .build_call(&decode(OperationKind::Create, &body), &creds())
                .unwrap();

            assert_eq!(call.form_value("trade_offer_create_params"), Some("{}"));
            assert_eq!(call.form_value("tradeoffermessage"), Some(""));
            let referer = call.header_value("Referer").unwrap();
            assert!(!referer.contains("token"));
            assert!(call.form.iter().all(|(_, v)| !v.contains("access_token")));
        }
    }

    #[tokio::test]
    async fn execute_sends_exactly_one_call() {
        let mock = transport();
        mock.respond_with(serde_json::json!({"tradeid": "9"}));
        let executor = AcceptExecutor::new(mock.clone(), HttpConfig::default());
        let request = decode(OperationKind::Accept, r#"{"steam_id":"1","trade_offer_id":"5"}"#);

        let response = executor.execute(&request, &creds()).await.unwrap();
        assert_eq!(response["tradeid"], "9");
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn transport_failure_is_returned_unchanged() {
        let mock = transport();
        mock.fail_with(|| ExecutorError::Upstream {
            status: 500,
            body: "oops".to_string(),
        });
        let executor = DeclineExecutor::new(mock.clone(), HttpConfig::default());
        let request = decode(OperationKind::Decline, r#"{"steam_id":"1","trade_offer_id":"5"}"#);

        let err = executor.execute(&request, &creds()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Upstream { status: 500, .. }));
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn request_for_wrong_operation_makes_no_call() {
        let mock = transport();
        let executor = CreateExecutor::new(mock.clone(), HttpConfig::default());
        // decoded as an accept, so the create fields were never checked
        let request = decode(OperationKind::Accept, r#"{"steam_id":"1","trade_offer_id":"5"}"#);

        let err = executor.execute(&request, &creds()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidRequest(_)));
        assert!(mock.calls().is_empty());
    }
}
