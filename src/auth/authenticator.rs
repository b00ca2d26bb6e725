// Bearer credential attachment

use reqwest::header::{HeaderValue, AUTHORIZATION};

use super::types::AccessToken;
use crate::request::RequestDescriptor;

/// Attach `Authorization: Bearer <token>` when a token is present
///
/// Returns the request unchanged when there is no token, or when the token
/// cannot be represented as a header value.
pub fn authenticate(request: &RequestDescriptor, token: Option<&AccessToken>) -> RequestDescriptor {
    let Some(token) = token else {
        return request.clone();
    };

    match HeaderValue::from_str(&token.bearer()) {
        Ok(mut value) => {
            value.set_sensitive(true);
            request.clone().with_header(AUTHORIZATION, value)
        }
        Err(_) => {
            tracing::warn!(
                request_id = %request.request_id(),
                "Access token contains characters not allowed in a header, sending unauthenticated"
            );
            request.clone()
        }
    }
}
