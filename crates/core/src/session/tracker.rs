//! The session tracker: bounded active set, frozen bounded history.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use mb_protocol::{DeliveryStatus, MessageId, MessageStatus, SessionStats};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::events::{EventBridge, now_ms};
use crate::session::record::MessageRecord;

/// Bounds and cadence for session tracking.
#[derive(Debug, Clone)]
pub struct SessionConfig {
	/// Cap on concurrently active sessions; overflow force-completes the
	/// oldest.
	pub max_active: usize,
	/// Cap on retained completed sessions; zero disables history.
	pub max_history: usize,
	/// Active sessions older than this are force-completed by the sweep.
	pub max_session_age: Duration,
	/// Cadence of the periodic sweep.
	pub sweep_interval: Duration,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			max_active: 2,
			max_history: 10,
			max_session_age: Duration::from_secs(36 * 3600),
			sweep_interval: Duration::from_secs(60),
		}
	}
}

/// Why a session left the active set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteReason {
	/// The window was externally marked complete.
	WindowCompleted,
	/// Explicit force-completion, e.g. during teardown.
	Forced,
	/// The periodic sweep aged it out.
	AgedOut,
	/// Evicted to make room under the active-session cap.
	Evicted,
}

struct ActiveSession {
	session_id: String,
	window_key: String,
	created_at: Instant,
	created_at_ms: u64,
	messages: HashMap<MessageId, MessageRecord>,
}

/// A frozen session retained in history for inspection.
#[derive(Debug, Clone)]
pub struct CompletedSession {
	pub session_id: String,
	pub window_key: String,
	pub created_at_ms: u64,
	pub completed_at_ms: u64,
	pub reason: CompleteReason,
	pub messages: BTreeMap<MessageId, MessageRecord>,
}

#[derive(Default)]
struct Inner {
	/// Creation order; index 0 is the oldest.
	active: Vec<ActiveSession>,
	history: VecDeque<CompletedSession>,
	next_message_seq: u64,
	next_session_seq: u64,
}

/// Tracks outbound messages in bounded, time-windowed sessions.
pub struct SessionTracker {
	config: SessionConfig,
	bridge: EventBridge,
	inner: Mutex<Inner>,
}

impl SessionTracker {
	pub fn new(config: SessionConfig, bridge: EventBridge) -> Self {
		Self {
			config,
			bridge,
			inner: Mutex::new(Inner::default()),
		}
	}

	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Records a new outbound message under `window_key`, creating the
	/// session on first use. Exceeding the active cap force-completes the
	/// oldest active session to make room.
	pub fn enqueue(&self, window_key: &str, recipient_key: &str) -> MessageId {
		let at_ms = now_ms();
		let mut inner = self.inner.lock();

		let index = match inner.active.iter().position(|session| session.window_key == window_key) {
			Some(index) => index,
			None => {
				while inner.active.len() >= self.config.max_active.max(1) {
					let oldest = inner.active.remove(0);
					warn!(
						target = "mb.session",
						window = %oldest.window_key,
						"active session cap reached; evicting oldest"
					);
					Self::archive(&self.config, &mut inner, oldest, CompleteReason::Evicted, at_ms);
				}

				let seq = inner.next_session_seq;
				inner.next_session_seq += 1;
				inner.active.push(ActiveSession {
					session_id: format!("s-{at_ms}-{seq}"),
					window_key: window_key.to_string(),
					created_at: Instant::now(),
					created_at_ms: at_ms,
					messages: HashMap::new(),
				});
				debug!(target = "mb.session", window = %window_key, "session created");
				inner.active.len() - 1
			}
		};

		let seq = inner.next_message_seq;
		inner.next_message_seq += 1;
		let message_id = MessageId::new(format!("m-{at_ms}-{seq}"));
		inner.active[index].messages.insert(message_id.clone(), MessageRecord::new(recipient_key, at_ms));

		let stats = Self::stats_locked(&inner);
		drop(inner);
		self.bridge.emit_stats(stats);
		message_id
	}

	/// Applies a delivery acknowledgement to a message in an active session.
	///
	/// Unknown ids are dropped and logged; acks never touch history.
	/// Returns `true` when the ack was applied.
	pub fn apply_ack(&self, message_id: &MessageId, status: DeliveryStatus) -> bool {
		let at_ms = now_ms();
		let mut inner = self.inner.lock();

		let record = inner
			.active
			.iter_mut()
			.find_map(|session| session.messages.get_mut(message_id));
		let Some(record) = record else {
			drop(inner);
			warn!(
				target = "mb.session",
				message_id = %message_id,
				%status,
				"acknowledgement references unknown message id; dropping"
			);
			return false;
		};

		record.apply(status, at_ms);
		drop(inner);
		self.bridge.emit_message_status(MessageStatus {
			message_id: message_id.clone(),
			status,
		});
		true
	}

	/// Completes the session for `window_key`, moving it to history.
	pub fn complete_window(&self, window_key: &str) -> bool {
		let at_ms = now_ms();
		let mut inner = self.inner.lock();
		let Some(index) = inner.active.iter().position(|session| session.window_key == window_key) else {
			debug!(target = "mb.session", window = %window_key, "complete for unknown window; no-op");
			return false;
		};

		let session = inner.active.remove(index);
		Self::archive(&self.config, &mut inner, session, CompleteReason::WindowCompleted, at_ms);
		let stats = Self::stats_locked(&inner);
		drop(inner);
		self.bridge.emit_stats(stats);
		true
	}

	/// Force-completes every active session. Used during teardown so no
	/// session dangles across a client restart.
	pub fn force_complete_all(&self) {
		let at_ms = now_ms();
		let mut inner = self.inner.lock();
		let drained: Vec<ActiveSession> = inner.active.drain(..).collect();
		let count = drained.len();
		for session in drained {
			Self::archive(&self.config, &mut inner, session, CompleteReason::Forced, at_ms);
		}
		let stats = Self::stats_locked(&inner);
		drop(inner);

		if count > 0 {
			info!(target = "mb.session", count, "force-completed all active sessions");
			self.bridge.emit_stats(stats);
		}
	}

	/// Force-completes active sessions older than the configured maximum.
	pub fn sweep(&self) {
		let at_ms = now_ms();
		let mut inner = self.inner.lock();
		let max_age = self.config.max_session_age;

		let mut index = 0;
		let mut aged = 0;
		while index < inner.active.len() {
			if inner.active[index].created_at.elapsed() > max_age {
				let session = inner.active.remove(index);
				info!(
					target = "mb.session",
					window = %session.window_key,
					"session exceeded max age; force-completing"
				);
				Self::archive(&self.config, &mut inner, session, CompleteReason::AgedOut, at_ms);
				aged += 1;
			} else {
				index += 1;
			}
		}

		if aged > 0 {
			let stats = Self::stats_locked(&inner);
			drop(inner);
			self.bridge.emit_stats(stats);
		}
	}

	/// Current counters.
	pub fn stats(&self) -> SessionStats {
		Self::stats_locked(&self.inner.lock())
	}

	/// Snapshot of the frozen history, oldest first.
	pub fn history(&self) -> Vec<CompletedSession> {
		self.inner.lock().history.iter().cloned().collect()
	}

	/// Delivery status of a message in an active session, when present.
	pub fn status_of(&self, message_id: &MessageId) -> Option<DeliveryStatus> {
		self.inner
			.lock()
			.active
			.iter()
			.find_map(|session| session.messages.get(message_id))
			.map(|record| record.status)
	}

	fn archive(config: &SessionConfig, inner: &mut Inner, session: ActiveSession, reason: CompleteReason, at_ms: u64) {
		if config.max_history == 0 {
			return;
		}
		inner.history.push_back(CompletedSession {
			session_id: session.session_id,
			window_key: session.window_key,
			created_at_ms: session.created_at_ms,
			completed_at_ms: at_ms,
			reason,
			messages: session.messages.into_iter().collect(),
		});
		while inner.history.len() > config.max_history {
			inner.history.pop_front();
		}
	}

	fn stats_locked(inner: &Inner) -> SessionStats {
		let mut pending_by_window = BTreeMap::new();
		for session in &inner.active {
			let pending = session.messages.values().filter(|record| !record.status.is_settled()).count();
			pending_by_window.insert(session.window_key.clone(), pending);
		}
		SessionStats {
			active_count: inner.active.len(),
			history_count: inner.history.len(),
			pending_by_window,
		}
	}
}
