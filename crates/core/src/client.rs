//! Client facade wiring the lifecycle components together.
//!
//! `initialize` and `destroy` are serialized by the initialization lock and
//! gated by the circuit breaker; a background pump fans driver events into
//! the session tracker and state machine and is stopped before any
//! teardown. The facade owns no driver handle itself; all resource access
//! goes through the controller.

use std::sync::Arc;
use std::time::Duration;

use mb_protocol::{ClientState, DeliveryStatus, MessageId, PairingChallenge, SessionStats};
use mb_runtime::{ControllerConfig, Driver, DriverError, DriverEvent, ResourceController};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::credentials::CredentialStore;
use crate::error::{MbError, Result};
use crate::events::EventBridge;
use crate::handshake::{self, HandshakeOutcome};
use crate::lock::{InitLock, LockConfig};
use crate::session::{SessionConfig, SessionTracker};
use crate::state::StateMachine;

/// Tunables for the client facade and its components.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Bound on waiting for the initialization lock.
	pub lock_timeout: Duration,
	/// Bound on waiting for the driver's authentication signal.
	pub handshake_deadline: Duration,
	/// Stored credentials older than this are discarded unused.
	pub credential_max_age: Duration,
	pub breaker: BreakerConfig,
	pub lock: LockConfig,
	pub session: SessionConfig,
	pub controller: ControllerConfig,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			lock_timeout: Duration::from_secs(10),
			handshake_deadline: Duration::from_secs(60),
			credential_max_age: Duration::from_secs(14 * 24 * 3600),
			breaker: BreakerConfig::default(),
			lock: LockConfig::default(),
			session: SessionConfig::default(),
			controller: ControllerConfig::default(),
		}
	}
}

/// How `initialize` resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
	/// The session is connected; stored credentials were restored or a
	/// prior initialization already connected.
	Connected,
	/// A pairing challenge awaits out-of-band confirmation; the client
	/// connects in the background once it is confirmed.
	PairingRequired { challenge: String },
}

/// Teardown parameters; one operation covers destroy, restart, and logout.
#[derive(Debug, Clone)]
pub struct DestroyOptions {
	/// Attempt an orderly shutdown before the forced fallback.
	pub graceful: bool,
	pub reason: String,
	/// `false` turns the teardown into a logout: stored credentials are
	/// discarded so the next initialization must pair.
	pub preserve_credentials: bool,
}

impl Default for DestroyOptions {
	fn default() -> Self {
		Self {
			graceful: true,
			reason: "client shutdown".to_string(),
			preserve_credentials: true,
		}
	}
}

struct ClientInner {
	config: ClientConfig,
	bridge: EventBridge,
	state: StateMachine,
	breaker: CircuitBreaker,
	lock: InitLock,
	controller: ResourceController,
	tracker: SessionTracker,
	credentials: Arc<dyn CredentialStore>,
	pump: Mutex<Option<JoinHandle<()>>>,
	last_challenge: Mutex<Option<String>>,
}

/// The automated messaging client.
pub struct MessagingClient {
	inner: Arc<ClientInner>,
}

impl MessagingClient {
	pub fn new(driver: Arc<dyn Driver>, credentials: Arc<dyn CredentialStore>, config: ClientConfig) -> Self {
		let bridge = EventBridge::new();
		let inner = ClientInner {
			bridge: bridge.clone(),
			state: StateMachine::new(bridge.clone()),
			breaker: CircuitBreaker::new(config.breaker.clone()),
			lock: InitLock::new(config.lock.clone()),
			controller: ResourceController::new(driver, config.controller.clone()),
			tracker: SessionTracker::new(config.session.clone(), bridge),
			credentials,
			pump: Mutex::new(None),
			last_challenge: Mutex::new(None),
			config,
		};
		Self { inner: Arc::new(inner) }
	}

	/// Current lifecycle state.
	pub fn state(&self) -> ClientState {
		self.inner.state.state()
	}

	/// Current session tracker counters.
	pub fn session_stats(&self) -> SessionStats {
		self.inner.tracker.stats()
	}

	/// The notification surface; subscribe before triggering operations.
	pub fn events(&self) -> &EventBridge {
		&self.inner.bridge
	}

	/// Marks the session for `window_key` complete.
	pub fn complete_window(&self, window_key: &str) -> bool {
		self.inner.tracker.complete_window(window_key)
	}

	/// Brings the client up: create the driver session, resolve the
	/// authentication handshake, and connect.
	///
	/// Serialized by the initialization lock; concurrent callers coalesce
	/// onto one attempt and observe its resolved state. Gated by the
	/// circuit breaker; the core never auto-retries.
	pub async fn initialize(&self) -> Result<InitOutcome> {
		let inner = &self.inner;
		let _guard = inner.lock.acquire(inner.config.lock_timeout).await?;

		// A concurrent caller may have finished the job while we waited.
		match inner.state.state() {
			ClientState::Connected | ClientState::Authenticated => return Ok(InitOutcome::Connected),
			ClientState::PairingPending => {
				let challenge = inner.last_challenge.lock().clone().unwrap_or_default();
				return Ok(InitOutcome::PairingRequired { challenge });
			}
			_ => {}
		}

		if !inner.breaker.allow_attempt() {
			let remaining = inner.breaker.deny_for().unwrap_or(Duration::ZERO);
			return Err(MbError::BreakerOpen { remaining });
		}

		inner.state.transition(ClientState::Initializing, "initialize requested")?;

		// After a disconnect or failure the defunct session may still be
		// held; clear it so the fresh attempt starts from nothing.
		self.stop_pump();
		inner.controller.destroy(false, "replacing defunct session").await;

		match self.run_initialize().await {
			Ok(outcome) => Ok(outcome),
			Err(err) => {
				inner.breaker.record_failure();
				self.stop_pump();
				// Tear down anything partially created so a retry starts clean.
				inner.controller.destroy(false, "initialization failure cleanup").await;
				let _ = inner.state.transition(ClientState::Error, "initialization failed");
				Err(err)
			}
		}
	}

	async fn run_initialize(&self) -> Result<InitOutcome> {
		let inner = &self.inner;

		let credentials = handshake::prepare_credentials(inner.credentials.as_ref(), inner.config.credential_max_age)?;
		let mut events = inner.controller.create(credentials).await.map_err(|err| match err {
			DriverError::ConnectTimeout(deadline) => MbError::InitTimeout(deadline),
			other => MbError::Driver(other),
		})?;

		// The pump inherits this same receiver below, so a driver event
		// arriving between handshake resolution and pump startup is buffered,
		// never lost.
		match handshake::resolve(&mut events, inner.config.handshake_deadline).await? {
			HandshakeOutcome::Restored => {
				self.wait_ready(&mut events).await?;
				inner.state.transition(ClientState::Authenticated, "credentials restored")?;
				inner.state.transition(ClientState::Connected, "driver session ready")?;
				inner.breaker.record_success();
				self.spawn_pump(events);
				Ok(InitOutcome::Connected)
			}
			HandshakeOutcome::PairingRequired { challenge } => {
				inner.state.transition(ClientState::PairingPending, "pairing challenge issued")?;
				*inner.last_challenge.lock() = Some(challenge.clone());
				inner.bridge.emit_pairing(PairingChallenge {
					challenge: challenge.clone(),
				});
				// The pump completes the connection once pairing is confirmed.
				self.spawn_pump(events);
				Ok(InitOutcome::PairingRequired { challenge })
			}
		}
	}

	/// Waits for the driver's ready signal after a silent resume.
	async fn wait_ready(&self, events: &mut broadcast::Receiver<DriverEvent>) -> Result<()> {
		let deadline = self.inner.config.handshake_deadline;
		let expires = tokio::time::Instant::now() + deadline;

		loop {
			let event = match tokio::time::timeout_at(expires, events.recv()).await {
				Ok(Ok(event)) => event,
				Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
					warn!(target = "mb.client", skipped, "ready listener lagged");
					continue;
				}
				Ok(Err(broadcast::error::RecvError::Closed)) => {
					return Err(MbError::Driver(DriverError::ChannelClosed));
				}
				Err(_) => return Err(MbError::InitTimeout(deadline)),
			};

			match event {
				DriverEvent::Ready => return Ok(()),
				DriverEvent::Disconnected { reason } => {
					return Err(MbError::Driver(DriverError::Shutdown(reason)));
				}
				other => self.inner.handle_passive_event(other),
			}
		}
	}

	/// Submits an outbound message; delivery acknowledgements arrive
	/// asynchronously and update the returned id's record.
	pub async fn send_message(&self, window_key: &str, recipient_key: &str, payload: &str) -> Result<MessageId> {
		let inner = &self.inner;
		let current = inner.state.state();
		if current != ClientState::Connected {
			return Err(MbError::NotConnected(current));
		}

		let message_id = inner.tracker.enqueue(window_key, recipient_key);
		match inner.controller.send_text(&message_id, recipient_key, payload).await {
			Ok(()) => Ok(message_id),
			Err(err) => {
				inner.tracker.apply_ack(&message_id, DeliveryStatus::Failed);
				inner.breaker.record_failure();
				Err(err.into())
			}
		}
	}

	/// Tears the client down. Idempotent; never leaves a stuck resource
	/// behind (graceful shutdown falls back to forced termination).
	pub async fn destroy(&self, options: DestroyOptions) -> Result<()> {
		let inner = &self.inner;
		let _guard = inner.lock.acquire(inner.config.lock_timeout).await?;

		if inner.state.state() == ClientState::Uninitialized {
			debug!(target = "mb.client", "already uninitialized; destroy is a no-op");
			return Ok(());
		}

		// Stop consuming driver events before touching the resource, then
		// settle tracked sessions so none dangle across a restart.
		self.stop_pump();
		inner.tracker.force_complete_all();
		self.route_to_destroying(&options.reason);

		inner.controller.destroy(options.graceful, &options.reason).await;

		if !options.preserve_credentials {
			match inner.credentials.discard() {
				Ok(true) => info!(target = "mb.client", "stored credentials discarded on logout"),
				Ok(false) => {}
				Err(err) => warn!(target = "mb.client", error = %err, "credential discard failed during teardown"),
			}
		}

		let _ = inner.state.transition(ClientState::Uninitialized, "teardown complete");
		Ok(())
	}

	/// Walks the state machine into `Destroying` along table edges from
	/// whatever state teardown was requested in.
	fn route_to_destroying(&self, reason: &str) {
		use ClientState::*;
		let state = &self.inner.state;
		let _ = match state.state() {
			Connected | Disconnected | Error => state.transition(Destroying, reason),
			Initializing | PairingPending => {
				let _ = state.transition(Error, "teardown requested");
				state.transition(Destroying, reason)
			}
			Authenticated => {
				let _ = state.transition(Connected, "teardown requested");
				state.transition(Destroying, reason)
			}
			Uninitialized | Destroying => Ok(Uninitialized),
		};
	}

	/// Spawns the driver event pump: acknowledgements, disconnects,
	/// credential refreshes, and the periodic session sweep.
	///
	/// Takes over the receiver that watched the handshake rather than
	/// subscribing afresh, so events already in flight are carried over.
	fn spawn_pump(&self, mut events: broadcast::Receiver<DriverEvent>) {
		let inner = Arc::clone(&self.inner);
		let sweep_interval = inner.config.session.sweep_interval;

		let handle = tokio::spawn(async move {
			let mut sweep = tokio::time::interval(sweep_interval);
			sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
			sweep.tick().await; // the first tick is immediate

			loop {
				tokio::select! {
					_ = sweep.tick() => inner.tracker.sweep(),
					event = events.recv() => match event {
						Ok(event) => inner.handle_event(event),
						Err(broadcast::error::RecvError::Lagged(skipped)) => {
							warn!(target = "mb.client", skipped, "event pump lagged");
						}
						Err(broadcast::error::RecvError::Closed) => break,
					},
				}
			}
			debug!(target = "mb.client", "driver event pump stopped");
		});

		if let Some(previous) = self.inner.pump.lock().replace(handle) {
			previous.abort();
		}
	}

	fn stop_pump(&self) {
		if let Some(handle) = self.inner.pump.lock().take() {
			handle.abort();
		}
	}
}

impl ClientInner {
	fn handle_event(&self, event: DriverEvent) {
		match event {
			DriverEvent::Ready => {
				// Pairing was confirmed out-of-band; finish connecting.
				if self.state.state() == ClientState::PairingPending {
					let authenticated = self.state.transition(ClientState::Authenticated, "pairing confirmed");
					let connected = self.state.transition(ClientState::Connected, "driver session ready");
					if authenticated.is_ok() && connected.is_ok() {
						self.breaker.record_success();
						self.last_challenge.lock().take();
					}
				}
			}
			DriverEvent::Disconnected { reason } => {
				if self.state.transition(ClientState::Disconnected, &reason).is_ok() {
					self.breaker.record_failure();
				}
			}
			other => self.handle_passive_event(other),
		}
	}

	/// Events that are safe to apply in any lifecycle phase.
	fn handle_passive_event(&self, event: DriverEvent) {
		match event {
			DriverEvent::MessageAck { message_id, status } => {
				self.tracker.apply_ack(&message_id, status);
			}
			DriverEvent::CredentialsIssued { blob } => {
				if let Err(err) = self.credentials.save(&blob) {
					warn!(target = "mb.client", error = %err, "failed to persist refreshed credentials");
				}
			}
			DriverEvent::PairingChallenge { challenge } => {
				// A mid-session re-pairing demand; surface it to the sink.
				*self.last_challenge.lock() = Some(challenge.clone());
				self.bridge.emit_pairing(PairingChallenge { challenge });
			}
			DriverEvent::AuthRestored | DriverEvent::Ready | DriverEvent::Disconnected { .. } => {}
		}
	}
}
