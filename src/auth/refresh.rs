// Single-flight access token refresh

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{oneshot, Mutex};

use super::authenticator::authenticate;
use super::hook::SessionTerminationHook;
use super::token_store::TokenStore;
use super::types::{AccessToken, TokenResponse};
use crate::error::{Result, SessionError};
use crate::request::RequestDescriptor;
use crate::transport::Transport;

/// A request suspended until the in-flight refresh resolves
struct PendingCaller {
    request: RequestDescriptor,
    slot: oneshot::Sender<Result<AccessToken>>,
}

/// Refresh cycle state, one per client
enum RefreshState {
    Idle,
    /// A refresh call is outstanding; callers wait here in arrival order
    Refreshing { pending: VecDeque<PendingCaller> },
}

impl RefreshState {
    fn is_refreshing(&self) -> bool {
        matches!(self, RefreshState::Refreshing { .. })
    }

    fn enqueue(&mut self, caller: PendingCaller) {
        match self {
            RefreshState::Refreshing { pending } => pending.push_back(caller),
            RefreshState::Idle => {
                *self = RefreshState::Refreshing {
                    pending: VecDeque::from([caller]),
                }
            }
        }
    }

    /// Back to `Idle`, handing out whoever was waiting
    fn finish(&mut self) -> VecDeque<PendingCaller> {
        match std::mem::replace(self, RefreshState::Idle) {
            RefreshState::Refreshing { pending } => pending,
            RefreshState::Idle => VecDeque::new(),
        }
    }
}

/// What a recovered caller should send next
#[derive(Debug)]
pub struct Replay {
    /// The original request with its retry marker set
    pub request: RequestDescriptor,

    /// Token to authenticate the replay with
    pub token: AccessToken,
}

/// Coordinates recovery from 401 responses
///
/// At most one refresh call is outstanding at a time. Callers that hit a 401
/// while it runs are queued and resolved in arrival order once it finishes.
/// The refresh runs on its own task, so a caller that gives up waiting does
/// not strand the rest of the queue.
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    tokens: TokenStore,
    transport: Arc<dyn Transport>,
    hook: Arc<dyn SessionTerminationHook>,
    refresh_path: String,
    refresh_timeout: Option<Duration>,
}

impl RefreshCoordinator {
    pub fn new(
        tokens: TokenStore,
        transport: Arc<dyn Transport>,
        hook: Arc<dyn SessionTerminationHook>,
        refresh_path: impl Into<String>,
        refresh_timeout: Option<Duration>,
    ) -> Self {
        Self {
            state: Mutex::new(RefreshState::Idle),
            tokens,
            transport,
            hook,
            refresh_path: refresh_path.into(),
            refresh_timeout,
        }
    }

    pub fn refresh_path(&self) -> &str {
        &self.refresh_path
    }

    pub async fn is_refreshing(&self) -> bool {
        self.state.lock().await.is_refreshing()
    }

    /// Number of callers waiting on the current refresh
    pub async fn pending_callers(&self) -> usize {
        match &*self.state.lock().await {
            RefreshState::Refreshing { pending } => pending.len(),
            RefreshState::Idle => 0,
        }
    }

    /// Recover from a 401 received for `request`
    ///
    /// `sent_with` is the token the failing attempt carried and `failure` is
    /// the error to propagate if the request cannot be recovered. Returns the
    /// request to replay and the token to replay it with, or the refresh
    /// error.
    pub async fn handle_unauthorized(
        self: &Arc<Self>,
        request: RequestDescriptor,
        sent_with: Option<AccessToken>,
        failure: SessionError,
    ) -> Result<Replay> {
        if request.targets(&self.refresh_path) || request.is_already_retried() {
            tracing::warn!(
                request_id = %request.request_id(),
                method = %request.method(),
                path = %request.path(),
                retried = request.is_already_retried(),
                "Unauthorized response is not recoverable, ending session"
            );
            self.terminate_session().await;
            return Err(failure);
        }

        let request = request.retried();
        let (slot, resolution) = oneshot::channel();

        let start_refresh = {
            let mut state = self.state.lock().await;

            if !state.is_refreshing() {
                match (self.tokens.get().await, sent_with.as_ref()) {
                    // A refresh completed after this request went out
                    (Some(current), sent) if sent != Some(&current) => {
                        tracing::debug!(
                            request_id = %request.request_id(),
                            "Request carried an outdated token, replaying with the current one"
                        );
                        return Ok(Replay {
                            request,
                            token: current,
                        });
                    }
                    // The session ended after this request went out
                    (None, Some(_)) => {
                        tracing::debug!(
                            request_id = %request.request_id(),
                            "Token was cleared while the request was in flight"
                        );
                        return Err(failure);
                    }
                    _ => {}
                }
            }

            let start_refresh = !state.is_refreshing();
            state.enqueue(PendingCaller {
                request: request.clone(),
                slot,
            });

            tracing::debug!(
                request_id = %request.request_id(),
                path = %request.path(),
                start_refresh,
                "Queued behind token refresh"
            );
            start_refresh
        };

        if start_refresh {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move {
                let cycle = AssertUnwindSafe(coordinator.run_refresh_cycle())
                    .catch_unwind()
                    .await;
                if cycle.is_err() {
                    coordinator.abandon_cycle().await;
                }
            });
        }

        let token = resolution.await.map_err(|_| SessionError::RefreshAbandoned)??;
        Ok(Replay { request, token })
    }

    /// Clear the token and notify the application
    pub async fn terminate_session(&self) {
        self.tokens.clear().await;
        self.hook.on_session_terminated();
    }

    async fn run_refresh_cycle(&self) {
        match self.refresh().await {
            Ok(token) => {
                self.tokens.set(token.clone()).await;
                let pending = self.state.lock().await.finish();

                tracing::info!(
                    waiters = pending.len(),
                    "Access token refreshed, resuming queued requests"
                );

                for caller in pending {
                    tracing::debug!(
                        request_id = %caller.request.request_id(),
                        path = %caller.request.path(),
                        "Resuming request with refreshed token"
                    );
                    let _ = caller.slot.send(Ok(token.clone()));
                }
            }
            Err(err) => {
                self.tokens.clear().await;
                let pending = self.state.lock().await.finish();

                tracing::error!(
                    error = %err,
                    waiters = pending.len(),
                    "Token refresh failed, rejecting queued requests"
                );

                for caller in pending {
                    tracing::debug!(
                        request_id = %caller.request.request_id(),
                        path = %caller.request.path(),
                        "Rejecting request after failed refresh"
                    );
                    let _ = caller.slot.send(Err(err.clone()));
                }

                self.hook.on_session_terminated();
            }
        }
    }

    /// Release the queue of a refresh cycle that panicked
    async fn abandon_cycle(&self) {
        let pending = self.state.lock().await.finish();
        tracing::error!(
            waiters = pending.len(),
            "Token refresh task panicked, abandoning queued requests"
        );
        for caller in pending {
            let _ = caller.slot.send(Err(SessionError::RefreshAbandoned));
        }
    }

    /// Call the refresh endpoint once
    async fn refresh(&self) -> Result<AccessToken> {
        tracing::debug!(path = %self.refresh_path, "Refreshing access token...");

        let current = self.tokens.get().await;
        let request = authenticate(&RequestDescriptor::post(&self.refresh_path), current.as_ref());
        let call = self.transport.send(request);

        let response = match self.refresh_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                SessionError::RefreshFailed(format!("timed out after {}s", limit.as_secs_f64()))
            })?,
            None => call.await,
        }
        .map_err(|e| SessionError::RefreshFailed(e.to_string()))?;

        if response.is_unauthorized() {
            return Err(SessionError::RefreshFailed(
                "refresh endpoint rejected the session (401)".to_string(),
            ));
        }

        let response = response
            .error_for_status()
            .map_err(|e| SessionError::RefreshFailed(e.to_string()))?;

        response
            .json::<TokenResponse>()
            .map_err(|e| SessionError::RefreshFailed(e.to_string()))?
            .into_token()
            .ok_or_else(|| {
                SessionError::RefreshFailed("response does not contain access_token".to_string())
            })
    }
}
