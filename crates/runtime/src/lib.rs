//! Driver lifecycle, connection, and resource ownership for the messaging
//! bridge.
//!
//! The automation driver (an authenticated browser session impersonating a
//! messaging client) is an expensive, failure-prone external resource. This
//! crate owns exactly one live instance of it at a time: the
//! [`ResourceController`] creates the session under a deadline, fans its
//! events out to the rest of the system, and tears it down with a
//! graceful-then-forced fallback. Nothing outside the controller ever holds
//! the raw session handle.

/// Resource lifecycle controller owning the active driver session.
pub mod controller;
/// Driver and driver-session contracts plus the event stream type.
pub mod driver;
/// Driver error taxonomy.
pub mod error;
/// Scripted in-memory driver for tests and demos.
pub mod fake;
/// Platform process liveness and termination helpers.
pub mod process;

pub use controller::{ControllerConfig, ResourceController};
pub use driver::{Driver, DriverEvent, DriverSession};
pub use error::{DriverError, Result};
