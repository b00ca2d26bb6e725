// Account endpoints consumed through the session client
// Payloads are opaque JSON; only `access_token` in login-type responses is read

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::auth::TokenResponse;
use crate::error::{Result, SessionError};
use crate::http_client::SessionClient;
use crate::request::RequestDescriptor;

const REGISTER_PATH: &str = "accounts/account/register/";
const LOGIN_PATH: &str = "accounts/account/login/";
const TWO_FACTOR_PATH: &str = "auth/2FA/";
const FORGOT_PASSWORD_PATH: &str = "accounts/password/forgot/";
const FORGOT_PASSWORD_CONFIRM_PATH: &str = "accounts/password/forgot-confirm/";
const CURRENT_USER_PATH: &str = "accounts/account/me/";

/// Account operations for the application layer
#[derive(Clone)]
pub struct AccountApi {
    client: Arc<SessionClient>,
}

impl AccountApi {
    pub fn new(client: Arc<SessionClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<SessionClient> {
        &self.client
    }

    /// Create an account
    pub async fn register<T: Serialize + ?Sized>(&self, form: &T) -> Result<Value> {
        self.client.post_json(REGISTER_PATH, form).await?.json()
    }

    /// Log in and keep the returned access token
    ///
    /// Accounts with two-factor enabled get a temporary token here and the
    /// final one from `verify_two_factor`.
    pub async fn login<T: Serialize + ?Sized>(&self, credentials: &T) -> Result<Value> {
        let body: Value = self.client.post_json(LOGIN_PATH, credentials).await?.json()?;
        self.store_token(&body, LOGIN_PATH).await?;
        Ok(body)
    }

    /// Submit a one-time code and keep the returned access token
    pub async fn verify_two_factor<T: Serialize + ?Sized>(&self, otp: &T) -> Result<Value> {
        let body: Value = self.client.post_json(TWO_FACTOR_PATH, otp).await?.json()?;
        self.store_token(&body, TWO_FACTOR_PATH).await?;
        Ok(body)
    }

    /// Request a password reset
    pub async fn forgot_password<T: Serialize + ?Sized>(&self, payload: &T) -> Result<Value> {
        self.client
            .post_json(FORGOT_PASSWORD_PATH, payload)
            .await?
            .json()
    }

    /// Confirm a password reset with the `auth` value from the reset link
    pub async fn forgot_password_confirm<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        auth: &str,
    ) -> Result<Value> {
        let request = RequestDescriptor::post(FORGOT_PASSWORD_CONFIRM_PATH)
            .with_query("auth", auth)
            .with_json(payload)?;
        self.client.execute(request).await?.json()
    }

    /// The logged-in user
    pub async fn current_user(&self) -> Result<Value> {
        let result = self
            .client
            .get(CURRENT_USER_PATH)
            .await
            .and_then(|response| response.json());
        if let Err(ref e) = result {
            tracing::error!(error = %e, "Current user lookup failed");
        }
        result
    }

    /// Forget the access token locally
    pub async fn logout(&self) {
        self.client.logout().await;
    }

    async fn store_token(&self, body: &Value, path: &str) -> Result<()> {
        let token = TokenResponse::deserialize(body)
            .ok()
            .and_then(TokenResponse::into_token)
            .ok_or_else(|| {
                SessionError::InvalidResponse(format!("{} response has no access_token", path))
            })?;

        tracing::info!(path = %path, token = %token, "Access token received");
        self.client.tokens().set(token).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionTerminationHook;
    use crate::config::ClientSettings;
    use crate::request::ApiResponse;
    use crate::transport::Transport;
    use futures::future::BoxFuture;
    use reqwest::header::{HeaderMap, AUTHORIZATION};
    use reqwest::StatusCode;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records requests and answers every one with the same response
    struct Recorder {
        status: StatusCode,
        body: &'static str,
        seen: Mutex<Vec<RequestDescriptor>>,
    }

    impl Transport for Recorder {
        fn send(&self, request: RequestDescriptor) -> BoxFuture<'_, Result<ApiResponse>> {
            self.seen.lock().unwrap().push(request);
            let response = ApiResponse::new(self.status, HeaderMap::new(), self.body);
            Box::pin(async move { Ok(response) })
        }
    }

    fn api(status: StatusCode, body: &'static str) -> (AccountApi, Arc<Recorder>) {
        let recorder = Arc::new(Recorder {
            status,
            body,
            seen: Mutex::new(Vec::new()),
        });
        let settings = ClientSettings::new("http://localhost:8000/").unwrap();
        let hook: Arc<dyn SessionTerminationHook> = Arc::new(|| {});
        let client = SessionClient::with_transport(recorder.clone(), &settings, hook);
        (AccountApi::new(Arc::new(client)), recorder)
    }

    #[tokio::test]
    async fn test_login_stores_token() {
        let (api, recorder) = api(StatusCode::OK, r#"{"access_token": "T1", "two_factor": true}"#);

        let body = api
            .login(&json!({"email": "ana@example.com", "password": "secret"}))
            .await
            .unwrap();

        assert_eq!(body["two_factor"], true);
        assert_eq!(api.client().tokens().get().await.unwrap().as_str(), "T1");
        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen[0].path(), LOGIN_PATH);
        assert!(seen[0].headers().get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_login_without_token_is_invalid_response() {
        let (api, _) = api(StatusCode::OK, r#"{"detail": "check your email"}"#);

        let err = api.login(&json!({})).await.unwrap_err();

        assert!(matches!(err, SessionError::InvalidResponse(_)));
        assert!(api.client().tokens().get().await.is_none());
    }

    #[tokio::test]
    async fn test_two_factor_replaces_token_and_authenticates_later_calls() {
        let (api, recorder) = api(StatusCode::OK, r#"{"access_token": "T2"}"#);
        api.login(&json!({})).await.unwrap();

        api.verify_two_factor(&json!({"otp_code": "123456"}))
            .await
            .unwrap();
        api.current_user().await.unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen[1].path(), TWO_FACTOR_PATH);
        assert_eq!(seen[2].path(), CURRENT_USER_PATH);
        assert_eq!(seen[2].headers().get(AUTHORIZATION).unwrap(), "Bearer T2");
    }

    #[tokio::test]
    async fn test_forgot_password_confirm_sends_auth_query() {
        let (api, recorder) = api(StatusCode::OK, r#"{"detail": "ok"}"#);

        api.forgot_password_confirm(&json!({"password": "n3w"}), "abc123")
            .await
            .unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen[0].path(), FORGOT_PASSWORD_CONFIRM_PATH);
        assert_eq!(
            seen[0].query(),
            &[("auth".to_string(), "abc123".to_string())]
        );
    }

    #[tokio::test]
    async fn test_register_validation_errors_surface() {
        let (api, _) = api(
            StatusCode::BAD_REQUEST,
            r#"{"email": ["user with this email already exists."]}"#,
        );

        let err = api.register(&json!({"email": "ana@example.com"})).await.unwrap_err();

        assert_eq!(err.status(), Some(400));
        assert_eq!(
            err.error_messages(),
            vec!["user with this email already exists."]
        );
    }

    #[tokio::test]
    async fn test_current_user_error_is_returned() {
        let (api, _) = api(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(api.current_user().await.is_err());
    }

    #[tokio::test]
    async fn test_current_user_malformed_body_is_returned() {
        let (api, _) = api(StatusCode::OK, "<html>maintenance</html>");

        let err = api.current_user().await.unwrap_err();

        assert!(matches!(err, SessionError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_logout_clears_token() {
        let (api, _) = api(StatusCode::OK, r#"{"access_token": "T1"}"#);
        api.login(&json!({})).await.unwrap();

        api.logout().await;

        assert!(api.client().tokens().get().await.is_none());
    }
}
