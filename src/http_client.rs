use serde::Serialize;
use std::sync::Arc;

use crate::auth::{authenticate, RefreshCoordinator, SessionTerminationHook, TokenStore};
use crate::config::ClientSettings;
use crate::error::{Result, SessionError};
use crate::request::{ApiResponse, RequestDescriptor};
use crate::transport::{ReqwestTransport, Transport};

/// HTTP client that authenticates every call and recovers from expired tokens
///
/// A 401 hands the call to the refresh coordinator, which replays it once
/// with a fresh token or fails it with the refresh error. Any other status
/// or transport failure goes straight back to the caller.
pub struct SessionClient {
    transport: Arc<dyn Transport>,
    tokens: TokenStore,
    coordinator: Arc<RefreshCoordinator>,
}

impl SessionClient {
    /// Create a client over a pooled reqwest transport
    pub fn new(settings: &ClientSettings, hook: Arc<dyn SessionTerminationHook>) -> Result<Self> {
        let transport = ReqwestTransport::new(settings)?;
        Ok(Self::with_transport(Arc::new(transport), settings, hook))
    }

    /// Create a client over any transport
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        settings: &ClientSettings,
        hook: Arc<dyn SessionTerminationHook>,
    ) -> Self {
        let tokens = TokenStore::new();
        let coordinator = Arc::new(RefreshCoordinator::new(
            tokens.clone(),
            transport.clone(),
            hook,
            settings.refresh_path.clone(),
            settings.refresh_timeout,
        ));

        Self {
            transport,
            tokens,
            coordinator,
        }
    }

    /// Token store shared with the refresh coordinator
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Send a request, recovering once from an expired token
    ///
    /// Resolves exactly once: with the 2xx response, with the error response
    /// or transport failure, or with the refresh error.
    pub async fn execute(&self, request: RequestDescriptor) -> Result<ApiResponse> {
        let mut request = request;
        let mut token = self.tokens.get().await;

        loop {
            let attempt = authenticate(&request, token.as_ref());
            let response = self.transport.send(attempt).await?;

            if !response.is_unauthorized() {
                if !response.status().is_success() {
                    tracing::warn!(
                        request_id = %request.request_id(),
                        method = %request.method(),
                        path = %request.path(),
                        status = response.status().as_u16(),
                        "Received error response"
                    );
                }
                return response.error_for_status();
            }

            tracing::debug!(
                request_id = %request.request_id(),
                path = %request.path(),
                retried = request.is_already_retried(),
                "Received 401"
            );

            let failure = SessionError::Unauthorized {
                message: response.text(),
            };
            let replay = self
                .coordinator
                .handle_unauthorized(request, token, failure)
                .await?;

            request = replay.request;
            token = Some(replay.token);
        }
    }

    /// GET `path`
    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.execute(RequestDescriptor::get(path)).await
    }

    /// POST `payload` as JSON to `path`
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<ApiResponse> {
        self.execute(RequestDescriptor::post(path).with_json(payload)?)
            .await
    }

    /// Forget the current token without ending the session through the hook
    pub async fn logout(&self) {
        tracing::info!("Logging out");
        self.tokens.clear().await;
    }
}
