//! JWT issue/verify over a shared secret.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use parley_core::UserId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::TokenError;

/// Token validity period: one hour from issue.
const TOKEN_TTL_SECS: i64 = 60 * 60;

/// Claims embedded in an identity token.
///
/// `sub` carries the user ID as a decimal string; it is parsed back to
/// `i64` on verify and a non-numeric subject makes the token invalid.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Subject — the user ID.
    sub: String,
    /// Issued at (Unix timestamp).
    iat: i64,
    /// Expiry (Unix timestamp).
    exp: i64,
}

/// Issues and verifies identity tokens.
///
/// Pure function of the signing secret; holds no other state. Rotating the
/// secret invalidates every outstanding token, which is the only revocation
/// mechanism.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService").finish_non_exhaustive()
    }
}

impl TokenService {
    /// Create a service from the shared signing secret.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Issue a token for `user` expiring one hour from now.
    ///
    /// The output is base64url text, safe to embed in a cookie value or a
    /// header value as-is.
    pub fn issue(&self, user: UserId) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.to_string(),
            iat: now,
            exp: now + TOKEN_TTL_SECS,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify a token and return the embedded user ID.
    ///
    /// Any parse, signature, or expiry failure resolves to
    /// [`TokenError::Invalid`]; this never panics on malformed input.
    pub fn verify(&self, token: &str) -> Result<UserId, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!(reason = %e, "token rejected");
            TokenError::Invalid
        })?;
        data.claims
            .sub
            .parse::<UserId>()
            .map_err(|_| TokenError::Invalid)
    }
}
