// Transport abstraction and the reqwest-backed implementation

use futures::future::BoxFuture;
use reqwest::{Client, Url};

use crate::config::ClientSettings;
use crate::error::{Result, SessionError};
use crate::request::{ApiResponse, RequestDescriptor};

/// Request/response capability the session client is built on
///
/// Implementations send the descriptor exactly as given (headers included)
/// and return the response with its body read. Non-2xx statuses are
/// responses, not errors; only failures to get a response are errors.
pub trait Transport: Send + Sync {
    fn send(&self, request: RequestDescriptor) -> BoxFuture<'_, Result<ApiResponse>>;
}

/// HTTP transport over a pooled reqwest client
pub struct ReqwestTransport {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Every descriptor path is resolved against this
    base_url: Url,
}

impl ReqwestTransport {
    /// Create a transport from client settings
    ///
    /// With `with_credentials` set, cookies returned by the API (such as the
    /// refresh cookie) are kept and sent back on later calls.
    pub fn new(settings: &ClientSettings) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = Client::builder()
            .pool_max_idle_per_host(settings.max_connections)
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .cookie_store(settings.with_credentials)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a descriptor's path and query against the base URL
    pub fn url_for(&self, request: &RequestDescriptor) -> Result<Url> {
        let mut url = self
            .base_url
            .join(request.path().trim_start_matches('/'))
            .map_err(|e| {
                SessionError::Internal(format!("Invalid request path '{}': {}", request.path(), e))
            })?;

        if !request.query().is_empty() {
            url.query_pairs_mut().extend_pairs(request.query());
        }

        Ok(url)
    }

    async fn execute(&self, request: RequestDescriptor) -> Result<ApiResponse> {
        let url = self.url_for(&request)?;

        tracing::debug!(
            request_id = %request.request_id(),
            method = %request.method(),
            url = %url,
            retried = request.is_already_retried(),
            "Sending HTTP request"
        );

        let mut builder = self
            .client
            .request(request.method().clone(), url.clone())
            .headers(request.headers().clone());
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(&e, &url))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(&e, &url))?;

        tracing::debug!(
            request_id = %request.request_id(),
            status = %status,
            "Received HTTP response"
        );

        Ok(ApiResponse::new(status, headers, body))
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: RequestDescriptor) -> BoxFuture<'_, Result<ApiResponse>> {
        Box::pin(self.execute(request))
    }
}

/// Categorize a reqwest failure for logs and for the caller
fn transport_error(e: &reqwest::Error, url: &Url) -> SessionError {
    let error_kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection_failed"
    } else if e.is_request() {
        "request_error"
    } else if e.is_body() {
        "body_error"
    } else if e.is_decode() {
        "decode_error"
    } else {
        "unknown"
    };

    tracing::warn!(
        error_kind = error_kind,
        error = %e,
        error_debug = ?e,
        url = %url,
        "HTTP request error"
    );

    SessionError::Transport {
        kind: error_kind,
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> ReqwestTransport {
        let settings = ClientSettings::new("http://localhost:8000").unwrap();
        ReqwestTransport::new(&settings).unwrap()
    }

    #[test]
    fn test_url_for_relative_paths() {
        let transport = transport();

        let url = transport
            .url_for(&RequestDescriptor::get("accounts/account/me/"))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/accounts/account/me/");

        let url = transport
            .url_for(&RequestDescriptor::post("/auth/refresh-token/"))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/auth/refresh-token/");
    }

    #[test]
    fn test_url_for_encodes_query() {
        let transport = transport();
        let request = RequestDescriptor::post("accounts/password/forgot-confirm/")
            .with_query("auth", "a b&c");

        let url = transport.url_for(&request).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/accounts/password/forgot-confirm/?auth=a+b%26c"
        );
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport_error() {
        // Port 9 (discard) is closed on test machines
        let settings = ClientSettings::new("http://127.0.0.1:9/").unwrap();
        let transport = ReqwestTransport::new(&settings).unwrap();

        let err = transport
            .send(RequestDescriptor::get("anything"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Transport { .. }));
    }
}
