//! WebSocket connection management, presence, rooms, and broadcasting.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | Per-connection record: owner, current room, send queue |
//! | `presence` | Online-user registry (multi-device) |
//! | `rooms` | Subscriber sets + join/leave coordinator |
//! | `broadcast` | Best-effort fan-out to rooms and users |
//! | `handler` | Inbound frame parsing and dispatch |
//! | `session` | Per-connection read/write loops, heartbeat, teardown |
//!
//! ## Data Flow
//!
//! upgrade → `session` → `handler` → `rooms` (directory-checked join).
//! CRUD layer → `broadcast` → each subscriber's send queue → `session`
//! outbound task → client.

pub mod broadcast;
pub mod connection;
pub mod handler;
pub mod presence;
pub mod rooms;
pub mod session;
