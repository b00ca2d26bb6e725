// Authentication types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Opaque bearer credential
///
/// Never empty. `Debug` and `Display` only reveal a short prefix. Two tokens
/// are equal when they carry the same credential.
#[derive(Clone)]
pub struct AccessToken {
    value: String,
    obtained_at: DateTime<Utc>,
}

impl AccessToken {
    /// Wrap a token string; empty or whitespace-only input yields `None`
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return None;
        }
        Some(Self {
            value,
            obtained_at: Utc::now(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// When this token was handed to the client
    pub fn obtained_at(&self) -> DateTime<Utc> {
        self.obtained_at
    }

    /// Value of the `Authorization` header for this token
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value)
    }

    fn prefix(&self) -> &str {
        let end = self
            .value
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.value.len());
        &self.value[..end]
    }
}

impl PartialEq for AccessToken {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for AccessToken {}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken({}...)", self.prefix())
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}...", self.prefix())
    }
}

/// Body of any response that hands out a new access token
/// (refresh, login, 2FA verification)
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
}

impl TokenResponse {
    pub fn into_token(self) -> Option<AccessToken> {
        self.access_token.and_then(AccessToken::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_token_is_absent() {
        assert!(AccessToken::new("").is_none());
        assert!(AccessToken::new("   ").is_none());
        assert!(AccessToken::new("T1").is_some());
    }

    #[test]
    fn test_debug_hides_token() {
        let token = AccessToken::new("eyJhbGciOiJIUzI1NiJ9.secret-payload").unwrap();
        let rendered = format!("{:?}", token);
        assert_eq!(rendered, "AccessToken(eyJhbGci...)");
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_equality_ignores_obtained_at() {
        let first = AccessToken::new("T1").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = AccessToken::new("T1").unwrap();

        assert_ne!(first.obtained_at(), second.obtained_at());
        assert_eq!(first, second);
        assert_ne!(first, AccessToken::new("T2").unwrap());
    }

    #[test]
    fn test_bearer_format() {
        let token = AccessToken::new("T2").unwrap();
        assert_eq!(token.bearer(), "Bearer T2");
    }

    #[test]
    fn test_token_response_parsing() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token": "T2", "user": {"id": 1}}"#).unwrap();
        assert_eq!(response.into_token().unwrap().as_str(), "T2");

        let response: TokenResponse = serde_json::from_str(r#"{"detail": "ok"}"#).unwrap();
        assert!(response.into_token().is_none());
    }
}
