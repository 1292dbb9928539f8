//! Session lifecycle manager for the automated messaging client.
//!
//! Keeps a single, expensive, failure-prone automation session alive and
//! consistent across restarts, partial failures, and concurrent requests,
//! while bounding memory in the outbound-message tracker.
//!
//! The pieces, leaves first: the [`state`] machine holds the one
//! authoritative lifecycle state; the [`breaker`] short-circuits
//! initialization retries after repeated failures; the [`lock`] serializes
//! concurrent initialize/destroy requests; the [`handshake`] decides
//! credential-restore versus fresh pairing; the [`session`] tracker records
//! per-message delivery status in bounded, time-windowed sessions; and the
//! [`events`] bridge pushes everything user-visible to the notification
//! sink. [`client::MessagingClient`] wires them together around the
//! resource controller from `mb-runtime`.

/// Circuit breaker isolating repeated initialization failures.
pub mod breaker;
/// Client facade exposing the public lifecycle operations.
pub mod client;
/// Credential store contract and filesystem/in-memory implementations.
pub mod credentials;
/// Error taxonomy and crate `Result` alias.
pub mod error;
/// Typed event channels feeding the notification sink.
pub mod events;
/// Authentication handshake: restore versus pairing resolution.
pub mod handshake;
/// FIFO initialization lock with timeout and stale-hold recovery.
pub mod lock;
/// Bounded, time-windowed outbound-message session tracking.
pub mod session;
/// Client lifecycle state machine.
pub mod state;

pub use client::{ClientConfig, DestroyOptions, InitOutcome, MessagingClient};
pub use error::{MbError, Result};
pub use events::EventBridge;
