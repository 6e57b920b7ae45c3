use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::operation::OperationKind;

/// A required request field was absent (or empty) for the operation at hand.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("missing required field `{0}`")]
pub struct MissingField(pub &'static str);

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("message body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message body is not a JSON object")]
    NotAnObject,

    #[error("{operation} request rejected: {source}")]
    Missing {
        operation: OperationKind,
        #[source]
        source: MissingField,
    },
}

/// A trade operation request decoded from a queue message body.
///
/// Fields are private: once decoded a request is only read, never edited.
/// Identifiers may arrive as JSON strings or numbers and are normalised to
/// strings.
#[derive(Debug, Deserialize, PartialEq)]
pub struct TradeRequest {
    #[serde(alias = "steamid64", deserialize_with = "identifier")]
    steam_id: String,
    #[serde(default, deserialize_with = "optional_identifier")]
    trade_offer_id: Option<String>,
    #[serde(default, deserialize_with = "optional_identifier")]
    partner_id_short: Option<String>,
    #[serde(default, deserialize_with = "optional_identifier")]
    partner_id_long: Option<String>,
    #[serde(default)]
    trade_message: Option<String>,
    #[serde(default, alias = "trade")]
    trade_offer_payload: Option<serde_json::Value>,
    #[serde(default)]
    trade_token: Option<String>,
}

impl TradeRequest {
    /// Decode a UTF-8 JSON body and check the fields `kind` needs.
    ///
    /// Duplicate keys are rejected by the deserializer.
    pub fn decode(kind: OperationKind, body: &[u8]) -> Result<Self, DecodeError> {
        let first = body.iter().find(|b| !b.is_ascii_whitespace());
        if first != Some(&b'{') {
            // serde_json would happily map a JSON array onto the struct
            serde_json::from_slice::<serde_json::Value>(body)?;
            return Err(DecodeError::NotAnObject);
        }

        let request: TradeRequest = serde_json::from_slice(body)?;
        request
            .validate(kind)
            .map_err(|source| DecodeError::Missing {
                operation: kind,
                source,
            })?;
        Ok(request)
    }

    fn validate(&self, kind: OperationKind) -> Result<(), MissingField> {
        if self.steam_id.is_empty() {
            return Err(MissingField("steam_id"));
        }
        match kind {
            OperationKind::Accept | OperationKind::Decline => {
                self.trade_offer_id()?;
            }
            OperationKind::Create => {
                self.partner_id_short()?;
                self.partner_id_long()?;
                self.trade_offer_payload()?;
            }
        }
        Ok(())
    }

    pub fn steam_id(&self) -> &str {
        &self.steam_id
    }

    pub fn trade_offer_id(&self) -> Result<&str, MissingField> {
        non_empty(&self.trade_offer_id, "trade_offer_id")
    }

    /// The offer id when present, for logging and outcome records.
    pub fn offer_id(&self) -> Option<&str> {
        self.trade_offer_id.as_deref().filter(|s| !s.is_empty())
    }

    pub fn partner_id_short(&self) -> Result<&str, MissingField> {
        non_empty(&self.partner_id_short, "partner_id_short")
    }

    pub fn partner_id_long(&self) -> Result<&str, MissingField> {
        non_empty(&self.partner_id_long, "partner_id_long")
    }

    pub fn trade_offer_payload(&self) -> Result<&serde_json::Value, MissingField> {
        match &self.trade_offer_payload {
            Some(value) if !value.is_null() => Ok(value),
            _ => Err(MissingField("trade_offer_payload")),
        }
    }

    /// Free-text message; absent is sent as an empty string.
    pub fn trade_message(&self) -> &str {
        self.trade_message.as_deref().unwrap_or_default()
    }

    /// Trade access token. An empty string counts as no token.
    pub fn trade_token(&self) -> Option<&str> {
        self.trade_token.as_deref().filter(|t| !t.is_empty())
    }
}

fn non_empty<'a>(
    value: &'a Option<String>,
    field: &'static str,
) -> Result<&'a str, MissingField> {
    value
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(MissingField(field))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Identifier {
    Text(String),
    Unsigned(u64),
    Signed(i64),
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        match id {
            Identifier::Text(s) => s,
            Identifier::Unsigned(n) => n.to_string(),
            Identifier::Signed(n) => n.to_string(),
        }
    }
}

fn identifier<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Identifier::deserialize(deserializer).map(String::from)
}

fn optional_identifier<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Option::<Identifier>::deserialize(deserializer).map(|id| id.map(String::from))
}
