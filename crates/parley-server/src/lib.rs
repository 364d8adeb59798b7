//! # parley-server
//!
//! The real-time connection and room-broadcast core of the Parley chat
//! backend.
//!
//! - WebSocket gateway over Axum: token-gated upgrade, per-connection
//!   read/write tasks, heartbeat
//! - Presence registry: which users are online, across how many devices
//! - Room membership coordination against the authoritative store
//! - Best-effort fan-out of messages and notifications to live connections
//! - `/health` and `/metrics` endpoints, graceful shutdown via
//!   `CancellationToken`
//!
//! The REST/CRUD layer embeds this crate: it constructs a
//! [`RealtimeService`], mounts the router, and calls
//! [`BroadcastDispatcher`](websocket::broadcast::BroadcastDispatcher)
//! after its own database writes commit.

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod health;
pub mod membership;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use membership::{DirectoryError, RoomDirectory};
pub use server::RealtimeService;
