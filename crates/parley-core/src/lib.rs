//! # parley-core
//!
//! Foundation types for the Parley real-time chat core.
//!
//! - Branded ID newtypes ([`ids`]): user, room, and connection identifiers
//! - Wire-format events ([`events`]): client requests, join acknowledgements,
//!   and server-pushed event envelopes
//!
//! This crate performs no I/O; everything here is plain data shared between
//! the auth and server crates.

#![deny(unsafe_code)]

pub mod events;
pub mod ids;

pub use events::{ClientRequest, JoinAck, ServerEvent};
pub use ids::{ConnectionId, RoomId, UserId};
