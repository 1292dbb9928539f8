//! Wire types for the messaging bridge.
//!
//! This crate contains the serde-serializable types shared by the session
//! core and its collaborators: client lifecycle states, delivery statuses,
//! the notification-sink event payloads, and the persisted credential blob.
//!
//! Types in this crate are pure data: no behavior beyond serialization,
//! small predicate helpers, and `Display`. The lifecycle semantics built on
//! top of them live in `mb-core`.

pub mod credentials;
pub mod events;
pub mod state;
pub mod status;

pub use credentials::*;
pub use events::*;
pub use state::*;
pub use status::*;
