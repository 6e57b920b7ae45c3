use serde::{Deserialize, Serialize};

/// Trading API endpoints and HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    /// Base URL of the community site (accept and create endpoints).
    #[serde(default = "default_community_url")]
    pub community_url: String,
    /// Base URL of the Web API (decline endpoint).
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Whole-request timeout in seconds. This is the only timeout an operation has.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            community_url: default_community_url(),
            api_url: default_api_url(),
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    pub(crate) fn community(&self) -> &str {
        self.community_url.trim_end_matches('/')
    }

    pub(crate) fn api(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }
}

fn default_community_url() -> String {
    "https://steamcommunity.com".to_string()
}
fn default_api_url() -> String {
    "https://api.steampowered.com".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    concat!("trade-exchange/", env!("CARGO_PKG_VERSION")).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_are_ignored() {
        let config = HttpConfig {
            community_url: "http://localhost:8080/".to_string(),
            ..HttpConfig::default()
        };
        assert_eq!(config.community(), "http://localhost:8080");
        assert_eq!(config.api(), "https://api.steampowered.com");
    }
}
