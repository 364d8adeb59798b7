//! # parley-auth
//!
//! Signed, time-bound identity tokens (JWT, HS256) for the Parley chat
//! backend. The CRUD layer issues a token on login/registration; the
//! real-time gateway verifies it once per connection attempt.
//!
//! Verification never distinguishes *why* a token is bad — malformed,
//! forged, and expired all collapse to [`TokenError::Invalid`] so the
//! handshake leaks nothing to a probing client.

#![deny(unsafe_code)]

pub mod errors;
pub mod token;

pub use errors::TokenError;
pub use token::TokenService;
