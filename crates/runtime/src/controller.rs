//! Resource lifecycle controller for the active driver session.
//!
//! The controller is the only owner of the raw [`DriverSession`] handle. It
//! creates the session under a deadline (tearing down anything partially
//! created when the deadline expires), re-broadcasts driver events to the
//! rest of the system through its own channel, and tears the session down
//! with a graceful-then-forced fallback.
//!
//! Teardown always begins by dropping the event-forwarding task and its
//! outbound channel, so no handler can observe events raised during or after
//! teardown. Teardown never fails: errors past the forced fallback are
//! logged and swallowed.

use std::sync::Arc;
use std::time::Duration;

use mb_protocol::{CredentialBlob, MessageId};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::driver::{Driver, DriverEvent, DriverSession};
use crate::error::{DriverError, Result};
use crate::process;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Deadlines for create/destroy phases.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
	/// Bound on `create()`; on expiry the partial resource is torn down
	/// before the error surfaces.
	pub connect_deadline: Duration,
	/// Bound on the graceful shutdown phase before falling back to a kill.
	pub graceful_timeout: Duration,
}

impl Default for ControllerConfig {
	fn default() -> Self {
		Self {
			connect_deadline: Duration::from_secs(30),
			graceful_timeout: Duration::from_secs(5),
		}
	}
}

struct ActiveResource {
	session: Arc<dyn DriverSession>,
	out_tx: broadcast::Sender<DriverEvent>,
	forward: JoinHandle<()>,
	pid: Option<u32>,
}

/// Exclusive owner of the driver session lifecycle.
pub struct ResourceController {
	driver: Arc<dyn Driver>,
	config: ControllerConfig,
	active: Mutex<Option<ActiveResource>>,
}

impl ResourceController {
	pub fn new(driver: Arc<dyn Driver>, config: ControllerConfig) -> Self {
		Self {
			driver,
			config,
			active: Mutex::new(None),
		}
	}

	/// Returns `true` while a driver session is held.
	pub async fn is_active(&self) -> bool {
		self.active.lock().await.is_some()
	}

	/// Creates the driver session and returns a receiver for its events.
	///
	/// Fails with [`DriverError::AlreadyActive`] when a session is already
	/// held, and with [`DriverError::ConnectTimeout`] when the deadline
	/// expires; in the latter case any session that materialized is killed
	/// before the error is returned.
	pub async fn create(&self, credentials: Option<CredentialBlob>) -> Result<broadcast::Receiver<DriverEvent>> {
		let mut slot = self.active.lock().await;
		if slot.is_some() {
			return Err(DriverError::AlreadyActive);
		}

		let driver = Arc::clone(&self.driver);
		let restoring = credentials.is_some();
		let mut connect = tokio::spawn(async move { driver.connect(credentials).await });

		let session = match timeout(self.config.connect_deadline, &mut connect).await {
			Ok(Ok(Ok(session))) => session,
			Ok(Ok(Err(err))) => return Err(err),
			Ok(Err(join_err)) => return Err(DriverError::Spawn(join_err.to_string())),
			Err(_) => {
				// Deadline hit. Cancel the connect, then reap any session
				// that completed in the race window so nothing leaks.
				connect.abort();
				if let Ok(Ok(session)) = connect.await {
					warn!(target = "mb.driver", "connect finished after deadline; killing orphaned session");
					let _ = session.kill().await;
				}
				return Err(DriverError::ConnectTimeout(self.config.connect_deadline));
			}
		};

		let session: Arc<dyn DriverSession> = Arc::from(session);
		let pid = session.pid();
		let (out_tx, out_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
		let forward = spawn_forwarder(session.events(), out_tx.clone());

		info!(target = "mb.driver", restoring, pid, "driver session created");
		*slot = Some(ActiveResource {
			session,
			out_tx,
			forward,
			pid,
		});

		Ok(out_rx)
	}

	/// Subscribes to the active session's events.
	pub async fn events(&self) -> Result<broadcast::Receiver<DriverEvent>> {
		let slot = self.active.lock().await;
		slot.as_ref()
			.map(|resource| resource.out_tx.subscribe())
			.ok_or(DriverError::NotConnected)
	}

	/// Submits an outbound message through the active session.
	pub async fn send_text(&self, message_id: &MessageId, recipient: &str, payload: &str) -> Result<()> {
		let session = {
			let slot = self.active.lock().await;
			let Some(resource) = slot.as_ref() else {
				return Err(DriverError::NotConnected);
			};
			Arc::clone(&resource.session)
		};
		session.send_text(message_id, recipient, payload).await
	}

	/// Tears down the active session, if any.
	///
	/// Idempotent: with no active session this is a successful no-op.
	/// Concurrent calls coalesce onto one physical teardown (the slot lock
	/// serializes them; later callers observe the empty slot). Returns
	/// `true` when a physical teardown happened.
	pub async fn destroy(&self, graceful: bool, reason: &str) -> bool {
		let resource = {
			let mut slot = self.active.lock().await;
			match slot.take() {
				Some(resource) => resource,
				None => {
					debug!(target = "mb.driver", reason, "destroy with no active session; no-op");
					return false;
				}
			}
		};

		// Deregister first: stop forwarding and drop the outbound channel so
		// subscribers see a clean close instead of teardown-phase events.
		resource.forward.abort();
		drop(resource.out_tx);

		if graceful {
			match timeout(self.config.graceful_timeout, resource.session.shutdown()).await {
				Ok(Ok(())) => {
					info!(target = "mb.driver", reason, "driver session shut down gracefully");
					return true;
				}
				Ok(Err(err)) => {
					warn!(target = "mb.driver", error = %err, "graceful shutdown failed; forcing termination");
				}
				Err(_) => {
					warn!(
						target = "mb.driver",
						timeout = ?self.config.graceful_timeout,
						"graceful shutdown timed out; forcing termination"
					);
				}
			}
		}

		if let Err(err) = resource.session.kill().await {
			warn!(target = "mb.driver", error = %err, "forced termination reported an error");
		}
		if let Some(pid) = resource.pid {
			if process::pid_is_alive(pid) {
				warn!(target = "mb.driver", pid, "automation process survived driver kill; killing at the OS level");
				process::force_kill(pid);
			}
		}

		info!(target = "mb.driver", reason, "driver session destroyed");
		true
	}
}

fn spawn_forwarder(mut driver_rx: broadcast::Receiver<DriverEvent>, out_tx: broadcast::Sender<DriverEvent>) -> JoinHandle<()> {
	tokio::spawn(async move {
		loop {
			match driver_rx.recv().await {
				Ok(event) => {
					// No subscribers yet is fine; the send just drops.
					let _ = out_tx.send(event);
				}
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					warn!(target = "mb.driver", skipped, "driver event forwarder lagged");
				}
				Err(broadcast::error::RecvError::Closed) => break,
			}
		}
	})
}
