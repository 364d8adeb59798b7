//! The authoritative room-membership oracle.
//!
//! Who is allowed in a room is owned by the CRUD layer's database; this
//! subsystem only asks. The [`RoomDirectory`] trait is the seam: production
//! wires in an implementation backed by the relational store, tests use a
//! mock.

use async_trait::async_trait;
use parley_core::{RoomId, UserId};

/// Failure talking to the authoritative store.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The store could not be reached or errored. Distinct from a
    /// membership denial; the caller's state is left unchanged and no
    /// retry is performed here.
    #[error("membership store unavailable: {0}")]
    Unavailable(String),
}

/// Authoritative membership lookup.
///
/// A nonexistent room and a non-member are both `Ok(false)`; the
/// subsystem does not distinguish them to the client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Whether `user` is currently a member of `room`.
    async fn is_member(&self, user: UserId, room: RoomId) -> Result<bool, DirectoryError>;
}
