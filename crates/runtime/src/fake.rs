//! Scripted in-memory driver for tests and demos.
//!
//! No browser, no process: the scripted driver plays back an authentication
//! sequence and records submitted messages, while the paired
//! [`FakeDriverHandle`] lets a test inject acknowledgements, confirm a
//! pairing challenge, or drop the connection at will.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use mb_protocol::{CredentialBlob, DeliveryStatus, MessageId};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast;

use crate::driver::{Driver, DriverEvent, DriverSession};
use crate::error::{DriverError, Result};

const FAKE_EVENT_CAPACITY: usize = 64;

/// How the scripted driver resolves authentication.
#[derive(Debug, Clone)]
pub enum FakeAuth {
	/// Accept provided credentials silently. Falls back to pairing when the
	/// client connects without credentials.
	Restored,
	/// Always demand a fresh pairing with this challenge code.
	Pairing { challenge: String },
}

impl Default for FakeAuth {
	fn default() -> Self {
		FakeAuth::Pairing {
			challenge: "000-111".to_string(),
		}
	}
}

/// Knobs controlling the scripted driver.
#[derive(Debug, Clone, Default)]
pub struct FakeBehavior {
	pub auth: FakeAuth,
	/// Delay before `connect` resolves; used to exercise create deadlines.
	pub connect_delay: Duration,
	/// Fail every `connect` call.
	pub fail_connect: bool,
	/// Never resolve the graceful shutdown; forces the kill fallback.
	pub hang_on_shutdown: bool,
	/// Fail the graceful shutdown immediately.
	pub fail_shutdown: bool,
	/// Acknowledge each submitted message with `sent` then `delivered`.
	pub auto_ack: bool,
	/// Follow the pairing challenge immediately with its confirmation, as
	/// when the human already approved on the device.
	pub preconfirmed_pairing: bool,
}

/// A message the fake received through `send_text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
	pub message_id: MessageId,
	pub recipient: String,
	pub payload: String,
}

#[derive(Default)]
struct FakeShared {
	connect_calls: AtomicUsize,
	shutdown_calls: AtomicUsize,
	kill_calls: AtomicUsize,
	current: Mutex<Option<broadcast::Sender<DriverEvent>>>,
	sent: Mutex<Vec<SentMessage>>,
}

/// Test-side controller for the scripted driver.
#[derive(Clone)]
pub struct FakeDriverHandle {
	shared: Arc<FakeShared>,
}

impl FakeDriverHandle {
	pub fn connect_calls(&self) -> usize {
		self.shared.connect_calls.load(Ordering::SeqCst)
	}

	pub fn shutdown_calls(&self) -> usize {
		self.shared.shutdown_calls.load(Ordering::SeqCst)
	}

	pub fn kill_calls(&self) -> usize {
		self.shared.kill_calls.load(Ordering::SeqCst)
	}

	/// Messages submitted through the current and previous sessions.
	pub fn sent_messages(&self) -> Vec<SentMessage> {
		self.shared.sent.lock().clone()
	}

	/// Injects a raw driver event into the live session, if any.
	pub fn emit(&self, event: DriverEvent) -> bool {
		let current = self.shared.current.lock();
		match current.as_ref() {
			Some(tx) => tx.send(event).is_ok(),
			None => false,
		}
	}

	/// Simulates the human confirming the pairing challenge out-of-band.
	pub fn confirm_pairing(&self) {
		self.emit(DriverEvent::CredentialsIssued {
			blob: fresh_credentials(),
		});
		self.emit(DriverEvent::Ready);
	}

	/// Injects a delivery acknowledgement.
	pub fn ack(&self, message_id: &MessageId, status: DeliveryStatus) -> bool {
		self.emit(DriverEvent::MessageAck {
			message_id: message_id.clone(),
			status,
		})
	}

	/// Drops the simulated platform connection.
	pub fn disconnect(&self, reason: &str) {
		self.emit(DriverEvent::Disconnected {
			reason: reason.to_string(),
		});
	}
}

/// Driver that plays back a scripted authentication sequence.
pub struct ScriptedDriver {
	behavior: FakeBehavior,
	shared: Arc<FakeShared>,
}

impl ScriptedDriver {
	pub fn new(behavior: FakeBehavior) -> (Self, FakeDriverHandle) {
		let shared = Arc::new(FakeShared::default());
		let handle = FakeDriverHandle {
			shared: Arc::clone(&shared),
		};
		(Self { behavior, shared }, handle)
	}
}

#[async_trait]
impl Driver for ScriptedDriver {
	async fn connect(&self, credentials: Option<CredentialBlob>) -> Result<Box<dyn DriverSession>> {
		self.shared.connect_calls.fetch_add(1, Ordering::SeqCst);

		if !self.behavior.connect_delay.is_zero() {
			tokio::time::sleep(self.behavior.connect_delay).await;
		}
		if self.behavior.fail_connect {
			return Err(DriverError::Spawn("scripted connect failure".to_string()));
		}

		let (events_tx, _) = broadcast::channel(FAKE_EVENT_CAPACITY);
		*self.shared.current.lock() = Some(events_tx.clone());

		let session = FakeSession {
			behavior: self.behavior.clone(),
			events_tx: events_tx.clone(),
			shared: Arc::clone(&self.shared),
		};

		let auth = self.behavior.auth.clone();
		let preconfirmed = self.behavior.preconfirmed_pairing;
		let restoring = credentials.is_some();
		tokio::spawn(async move {
			// Hold the script until someone is listening, then resolve the
			// authentication phase exactly once.
			while events_tx.receiver_count() == 0 {
				tokio::time::sleep(Duration::from_millis(1)).await;
			}
			match auth {
				FakeAuth::Restored if restoring => {
					let _ = events_tx.send(DriverEvent::AuthRestored);
					let _ = events_tx.send(DriverEvent::Ready);
				}
				FakeAuth::Restored => {
					let _ = events_tx.send(DriverEvent::PairingChallenge {
						challenge: "000-111".to_string(),
					});
				}
				FakeAuth::Pairing { challenge } => {
					let _ = events_tx.send(DriverEvent::PairingChallenge { challenge });
					if preconfirmed {
						let _ = events_tx.send(DriverEvent::CredentialsIssued {
							blob: fresh_credentials(),
						});
						let _ = events_tx.send(DriverEvent::Ready);
					}
				}
			}
		});

		Ok(Box::new(session))
	}
}

struct FakeSession {
	behavior: FakeBehavior,
	events_tx: broadcast::Sender<DriverEvent>,
	shared: Arc<FakeShared>,
}

#[async_trait]
impl DriverSession for FakeSession {
	fn events(&self) -> broadcast::Receiver<DriverEvent> {
		self.events_tx.subscribe()
	}

	async fn send_text(&self, message_id: &MessageId, recipient: &str, payload: &str) -> Result<()> {
		self.shared.sent.lock().push(SentMessage {
			message_id: message_id.clone(),
			recipient: recipient.to_string(),
			payload: payload.to_string(),
		});

		if self.behavior.auto_ack {
			let _ = self.events_tx.send(DriverEvent::MessageAck {
				message_id: message_id.clone(),
				status: DeliveryStatus::Sent,
			});
			let _ = self.events_tx.send(DriverEvent::MessageAck {
				message_id: message_id.clone(),
				status: DeliveryStatus::Delivered,
			});
		}

		Ok(())
	}

	async fn shutdown(&self) -> Result<()> {
		self.shared.shutdown_calls.fetch_add(1, Ordering::SeqCst);
		if self.behavior.hang_on_shutdown {
			tokio::time::sleep(Duration::from_secs(86_400)).await;
		}
		if self.behavior.fail_shutdown {
			return Err(DriverError::Shutdown("scripted shutdown failure".to_string()));
		}
		Ok(())
	}

	async fn kill(&self) -> Result<()> {
		self.shared.kill_calls.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	fn pid(&self) -> Option<u32> {
		None
	}
}

fn fresh_credentials() -> CredentialBlob {
	let now_ms = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|elapsed| elapsed.as_millis() as u64)
		.unwrap_or(0);
	CredentialBlob::new(now_ms, json!({ "token": "scripted-session-token" }))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn pairing_script_emits_challenge_to_first_subscriber() {
		let (driver, _handle) = ScriptedDriver::new(FakeBehavior::default());
		let session = driver.connect(None).await.unwrap();
		let mut events = session.events();
		match events.recv().await.unwrap() {
			DriverEvent::PairingChallenge { challenge } => assert_eq!(challenge, "000-111"),
			other => panic!("expected pairing challenge, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn restored_script_requires_credentials() {
		let behavior = FakeBehavior {
			auth: FakeAuth::Restored,
			..FakeBehavior::default()
		};
		let (driver, _handle) = ScriptedDriver::new(behavior);
		// Without credentials even a resume-capable driver demands pairing.
		let session = driver.connect(None).await.unwrap();
		let mut events = session.events();
		assert!(matches!(events.recv().await.unwrap(), DriverEvent::PairingChallenge { .. }));
	}

	#[tokio::test]
	async fn auto_ack_settles_submitted_messages() {
		let behavior = FakeBehavior {
			auto_ack: true,
			..FakeBehavior::default()
		};
		let (driver, handle) = ScriptedDriver::new(behavior);
		let session = driver.connect(None).await.unwrap();
		let mut events = session.events();

		let id = MessageId::new("m-1");
		session.send_text(&id, "recipient", "hello").await.unwrap();

		assert_eq!(handle.sent_messages().len(), 1);
		let mut statuses = Vec::new();
		for _ in 0..3 {
			match events.recv().await.unwrap() {
				DriverEvent::MessageAck { status, .. } => {
					statuses.push(status);
					if statuses.len() == 2 {
						break;
					}
				}
				_ => continue,
			}
		}
		assert_eq!(statuses, vec![DeliveryStatus::Sent, DeliveryStatus::Delivered]);
	}
}
