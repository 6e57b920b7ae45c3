use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Cookie name carrying the web session id.
pub const SESSION_COOKIE: &str = "sessionid";
/// Entry carrying the Web API key. Stored beside the cookies, never sent as one.
pub const API_KEY_FIELD: &str = "api_key";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("credential record is not a JSON object of strings: {0}")]
    Format(String),

    #[error("credential record has no `{0}` entry")]
    MissingEntry(&'static str),
}

/// Session credentials for one account, as stored in the key-value store.
///
/// The stored record is a flat JSON object of cookie name to value that also
/// carries the `api_key`. Session-authenticated calls get a cookie header
/// derived from the record with the API key left out.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    session_id: String,
    api_key: String,
    record: BTreeMap<String, String>,
}

impl Credentials {
    pub fn new(session_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        let session_id = session_id.into();
        let api_key = api_key.into();
        let mut record = BTreeMap::new();
        record.insert(SESSION_COOKIE.to_string(), session_id.clone());
        record.insert(API_KEY_FIELD.to_string(), api_key.clone());
        Self {
            session_id,
            api_key,
            record,
        }
    }

    /// Parse the raw record stored under a user's key.
    pub fn from_record(raw: &str) -> Result<Self, CredentialsError> {
        Self::from_bytes(raw.as_bytes())
    }

    /// Parse a record fetched as raw bytes. Bytes that are not UTF-8 are a
    /// format error like any other malformed record.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, CredentialsError> {
        let record: BTreeMap<String, String> =
            serde_json::from_slice(raw).map_err(|e| CredentialsError::Format(e.to_string()))?;
        Self::from_map(record)
    }

    pub fn from_map(record: BTreeMap<String, String>) -> Result<Self, CredentialsError> {
        let session_id = record
            .get(SESSION_COOKIE)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or(CredentialsError::MissingEntry(SESSION_COOKIE))?;
        let api_key = record
            .get(API_KEY_FIELD)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or(CredentialsError::MissingEntry(API_KEY_FIELD))?;
        Ok(Self {
            session_id,
            api_key,
            record,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// `Cookie` header value for session-authenticated calls: every stored
    /// entry except the API key.
    pub fn session_cookie_header(&self) -> String {
        self.record
            .iter()
            .filter(|(name, _)| name.as_str() != API_KEY_FIELD)
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("session_id", &"<redacted>")
            .field("api_key", &"<redacted>")
            .field("cookies", &self.record.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_stored_record() {
        let raw = r#"{"sessionid":"S1","api_key":"K1","steamLoginSecure":"abc"}"#;
        let creds = Credentials::from_record(raw).unwrap();
        assert_eq!(creds.session_id(), "S1");
        assert_eq!(creds.api_key(), "K1");
    }

    #[test]
    fn cookie_header_leaves_out_api_key() {
        let raw = r#"{"sessionid":"S1","api_key":"K1","steamLoginSecure":"abc"}"#;
        let creds = Credentials::from_record(raw).unwrap();
        let header = creds.session_cookie_header();
        assert_eq!(header, "sessionid=S1; steamLoginSecure=abc");
        // the credentials themselves still hold the key
        assert_eq!(creds.api_key(), "K1");
    }

    #[test]
    fn missing_entries_are_reported() {
        let err = Credentials::from_record(r#"{"sessionid":"S1"}"#).unwrap_err();
        assert_eq!(err, CredentialsError::MissingEntry("api_key"));

        let err = Credentials::from_record(r#"{"api_key":"K1","sessionid":""}"#).unwrap_err();
        assert_eq!(err, CredentialsError::MissingEntry("sessionid"));
    }

    #[test]
    fn non_object_records_are_rejected() {
        assert!(matches!(
            Credentials::from_record("[1,2]"),
            Err(CredentialsError::Format(_))
        ));
        assert!(matches!(
            Credentials::from_record(r#"{"sessionid":1}"#),
            Err(CredentialsError::Format(_))
        ));
    }

    #[test]
    fn non_utf8_record_is_a_format_error() {
        let mut raw = br#"{"sessionid":"S1","api_key":"K"#.to_vec();
        raw.extend_from_slice(&[0xff, 0xfe]);
        raw.extend_from_slice(br#""}"#);
        assert!(matches!(
            Credentials::from_bytes(&raw),
            Err(CredentialsError::Format(_))
        ));
    }

    #[test]
    fn debug_redacts_secrets() {
        let creds = Credentials::new("S1", "K1");
        let printed = format!("{creds:?}");
        assert!(!printed.contains("S1"));
        assert!(!printed.contains("K1"));
    }
}
