// In-memory access token storage

use std::sync::Arc;
use tokio::sync::RwLock;

use super::types::AccessToken;

/// Thread-safe holder of the current access token
///
/// Cheap to clone; clones share the same slot. Nothing is persisted.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    token: Arc<RwLock<Option<AccessToken>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `token`
    pub fn with_token(token: AccessToken) -> Self {
        Self {
            token: Arc::new(RwLock::new(Some(token))),
        }
    }

    /// Current token, if any
    pub async fn get(&self) -> Option<AccessToken> {
        self.token.read().await.clone()
    }

    /// Replace the current token
    pub async fn set(&self, token: AccessToken) {
        tracing::debug!(token = %token, "Access token updated");
        *self.token.write().await = Some(token);
    }

    /// Drop the current token
    ///
    /// The write lock is released before this returns, so every later `get`
    /// observes the empty slot.
    pub async fn clear(&self) {
        let mut token = self.token.write().await;
        if token.take().is_some() {
            tracing::debug!("Access token cleared");
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }
}
