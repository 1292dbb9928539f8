//! Contracts for the opaque automation driver.
//!
//! The wire protocol of the messaging platform is a black box; the session
//! core only depends on the lifecycle contract below. A production driver
//! wraps a browser-automation process, the [`fake`](crate::fake) module
//! provides a scripted stand-in.

use async_trait::async_trait;
use mb_protocol::{CredentialBlob, DeliveryStatus, MessageId};
use tokio::sync::broadcast;

use crate::error::Result;

/// Asynchronous notifications pushed by a live driver session.
#[derive(Debug, Clone)]
pub enum DriverEvent {
	/// Stored credentials were accepted; no pairing needed.
	AuthRestored,
	/// A fresh pairing code must be confirmed out-of-band.
	PairingChallenge { challenge: String },
	/// Authentication finished (either path); the session is usable.
	Ready,
	/// The platform issued new session credentials worth persisting.
	CredentialsIssued { blob: CredentialBlob },
	/// Delivery acknowledgement for a previously submitted message.
	MessageAck { message_id: MessageId, status: DeliveryStatus },
	/// The session dropped; the client must re-initialize to recover.
	Disconnected { reason: String },
}

/// Factory for driver sessions.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
	/// Spawns the underlying automation session.
	///
	/// When `credentials` is present the driver attempts a silent resume and
	/// reports the outcome through [`DriverEvent::AuthRestored`] or
	/// [`DriverEvent::PairingChallenge`]; exactly one of the two fires.
	async fn connect(&self, credentials: Option<CredentialBlob>) -> Result<Box<dyn DriverSession>>;
}

/// A live automation session.
///
/// Owned exclusively by the [`ResourceController`](crate::ResourceController);
/// no other component holds this handle.
#[async_trait]
pub trait DriverSession: Send + Sync + 'static {
	/// Subscribes to the session's event stream.
	fn events(&self) -> broadcast::Receiver<DriverEvent>;

	/// Submits an outbound message. Acknowledgements arrive later as
	/// [`DriverEvent::MessageAck`] carrying the same `message_id`.
	async fn send_text(&self, message_id: &MessageId, recipient: &str, payload: &str) -> Result<()>;

	/// Requests an orderly shutdown of the underlying session.
	async fn shutdown(&self) -> Result<()>;

	/// Unconditionally terminates the underlying session.
	async fn kill(&self) -> Result<()>;

	/// Returns the OS process id of the automation process, when there is one.
	fn pid(&self) -> Option<u32>;
}
