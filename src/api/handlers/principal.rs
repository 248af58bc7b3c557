//! Bearer extraction and per-request authentication.

use axum::http::{HeaderMap, header::AUTHORIZATION};
use axum::response::Response;

use crate::error::AuthError;
use crate::service::{AuthContext, AuthService};

use super::error_response;

const BEARER_PREFIX: &str = "Bearer ";

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authenticates the request or produces the error response to return.
pub(crate) async fn require_auth(
    headers: &HeaderMap,
    service: &AuthService,
) -> Result<AuthContext, Response> {
    let Some(token) = extract_bearer_token(headers) else {
        return Err(error_response(&AuthError::TokenMalformed));
    };
    service
        .authenticate(token)
        .await
        .map_err(|err| error_response(&err))
}

/// Client address as reported by the proxy in front of us.
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Device label: explicit value from the body, else the user agent.
pub(crate) fn device_name(explicit: Option<String>, headers: &HeaderMap) -> String {
    if let Some(device) = explicit {
        let device = device.trim();
        if !device.is_empty() {
            return device.to_string();
        }
    }
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map_or_else(|| "unknown".to_string(), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_extraction_requires_the_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers), Some("abc123"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn forwarded_for_takes_the_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers), Some("203.0.113.9".to_string()));
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn device_falls_back_to_user_agent() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::USER_AGENT,
            HeaderValue::from_static("lexicon-web/1.0"),
        );
        assert_eq!(device_name(None, &headers), "lexicon-web/1.0");
        assert_eq!(
            device_name(Some("laptop".to_string()), &headers),
            "laptop"
        );
        assert_eq!(device_name(Some("  ".to_string()), &headers), "lexicon-web/1.0");
        assert_eq!(device_name(None, &HeaderMap::new()), "unknown");
    }
}
