//! Bounded, time-windowed outbound-message session tracking.
//!
//! Outbound messages are grouped into one session per window key (typically
//! a calendar day). The active set and the retained history are both
//! bounded; completed sessions are frozen. See [`tracker::SessionTracker`]
//! for the operations.

/// Per-message delivery records.
pub mod record;
/// The session tracker and its bounds.
pub mod tracker;

pub use record::MessageRecord;
pub use tracker::{CompleteReason, CompletedSession, SessionConfig, SessionTracker};
