//! Token error types.

/// Errors that can occur during token operations.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The token failed verification. Deliberately opaque: parse failures,
    /// bad signatures, and expiry all map here so callers cannot build an
    /// oracle out of the distinction.
    #[error("invalid token")]
    Invalid,

    /// Signing a freshly issued token failed.
    #[error("token signing failed: {0}")]
    Signing(String),
}
