//! Connection authentication — gates every WebSocket upgrade.
//!
//! The handshake carries the identity token either in the `access_token`
//! cookie (set by the CRUD layer on login) or in the `Authorization`
//! header (with an optional `Bearer` prefix). Verification runs once per
//! attempt, before the upgrade completes; a failed attempt is refused with
//! `401` and creates no state anywhere.

use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use parley_auth::TokenService;
use parley_core::UserId;
use tracing::debug;

/// Cookie holding the identity token.
pub const TOKEN_COOKIE: &str = "access_token";

/// Pull a candidate token out of the handshake headers.
///
/// Cookie first, `Authorization` as fallback; returns `None` when neither
/// is present.
#[must_use]
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = cookie_token(headers) {
        return Some(token);
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == TOKEN_COOKIE && !value.is_empty()).then(|| value.to_owned())
    })
}

/// Resolve the handshake to a user, or refuse it.
///
/// Missing, malformed, forged, and expired tokens are all the same
/// failure; the client only learns that the handshake never completed.
pub fn authenticate(headers: &HeaderMap, tokens: &TokenService) -> Option<UserId> {
    let token = extract_token(headers)?;
    match tokens.verify(&token) {
        Ok(user) => Some(user),
        Err(_) => {
            debug!("handshake token rejected");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(name: axum::http::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn service() -> TokenService {
        TokenService::new(b"gateway-test-secret")
    }

    #[test]
    fn token_from_cookie() {
        let headers = headers_with(COOKIE, "access_token=abc123");
        assert_eq!(extract_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn token_from_cookie_among_others() {
        let headers = headers_with(COOKIE, "theme=dark; access_token=abc123; lang=en");
        assert_eq!(extract_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn token_from_authorization_header() {
        let headers = headers_with(AUTHORIZATION, "Bearer abc123");
        assert_eq!(extract_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn bare_authorization_value_accepted() {
        let headers = headers_with(AUTHORIZATION, "abc123");
        assert_eq!(extract_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn cookie_wins_over_header() {
        let mut headers = headers_with(COOKIE, "access_token=from_cookie");
        let _ = headers.insert(AUTHORIZATION, HeaderValue::from_static("from_header"));
        assert_eq!(extract_token(&headers).as_deref(), Some("from_cookie"));
    }

    #[test]
    fn no_headers_no_token() {
        assert!(extract_token(&HeaderMap::new()).is_none());
    }

    #[test]
    fn empty_values_ignored() {
        assert!(extract_token(&headers_with(COOKIE, "access_token=")).is_none());
        assert!(extract_token(&headers_with(AUTHORIZATION, "Bearer ")).is_none());
    }

    #[test]
    fn unrelated_cookie_ignored() {
        let headers = headers_with(COOKIE, "session=abc123");
        assert!(extract_token(&headers).is_none());
    }

    #[test]
    fn authenticate_accepts_valid_token() {
        let svc = service();
        let token = svc.issue(UserId::new(42)).unwrap();
        let headers = headers_with(COOKIE, &format!("access_token={token}"));
        assert_eq!(authenticate(&headers, &svc), Some(UserId::new(42)));
    }

    #[test]
    fn authenticate_rejects_garbage() {
        let svc = service();
        let headers = headers_with(COOKIE, "access_token=garbage");
        assert!(authenticate(&headers, &svc).is_none());
    }

    #[test]
    fn authenticate_rejects_missing_token() {
        assert!(authenticate(&HeaderMap::new(), &service()).is_none());
    }

    #[test]
    fn authenticate_rejects_foreign_signature() {
        let other = TokenService::new(b"other-secret");
        let token = other.issue(UserId::new(42)).unwrap();
        let headers = headers_with(AUTHORIZATION, &format!("Bearer {token}"));
        assert!(authenticate(&headers, &service()).is_none());
    }
}
