// Error handling module
// Defines the session error taxonomy and error body flattening

use serde_json::Value;
use thiserror::Error;

/// Errors surfaced to callers of the session client
///
/// Cloneable because a single refresh failure is delivered to every caller
/// queued behind it.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    /// Network or transport failure unrelated to authentication
    #[error("Transport error ({kind}): {message}")]
    Transport { kind: &'static str, message: String },

    /// Request rejected with 401 and not recoverable
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// The refresh endpoint failed, timed out, or rejected the session
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// Non-2xx response from the API
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The refresh cycle ended without resolving this caller
    #[error("Token refresh was abandoned before completing")]
    RefreshAbandoned,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            SessionError::Unauthorized { .. } => Some(401),
            SessionError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for errors that ended the session
    pub fn is_session_terminated(&self) -> bool {
        matches!(
            self,
            SessionError::Unauthorized { .. } | SessionError::RefreshFailed(_)
        )
    }

    /// Field-level messages from an API error body
    ///
    /// Returns an empty list for non-API errors and for bodies that are not
    /// JSON objects.
    pub fn error_messages(&self) -> Vec<String> {
        match self {
            SessionError::Api { message, .. } | SessionError::Unauthorized { message } => {
                serde_json::from_str::<Value>(message)
                    .map(|body| flatten_error_messages(&body))
                    .unwrap_or_default()
            }
            _ => Vec::new(),
        }
    }
}

impl From<anyhow::Error> for SessionError {
    fn from(err: anyhow::Error) -> Self {
        SessionError::Internal(format!("{:#}", err))
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::InvalidResponse(err.to_string())
    }
}

/// Flatten a JSON error object into a list of messages
///
/// Fields are visited in key order: `{"email": ["taken"], "detail": "bad"}`
/// becomes `["bad", "taken"]`.
pub fn flatten_error_messages(body: &Value) -> Vec<String> {
    let Some(fields) = body.as_object() else {
        return Vec::new();
    };

    let mut messages = Vec::new();
    for value in fields.values() {
        match value {
            Value::Array(items) => messages.extend(items.iter().map(render_message)),
            other => messages.push(render_message(other)),
        }
    }
    messages
}

fn render_message(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
