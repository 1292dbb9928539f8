//! Typed event channels feeding the notification sink.
//!
//! One broadcast channel per concern. The bridge is push-only: emitters
//! never block on, or read from, subscribers, and a channel with no
//! receivers simply drops the event.

use std::time::{SystemTime, UNIX_EPOCH};

use mb_protocol::{ClientEvent, MessageStatus, PairingChallenge, SessionStats, StateChanged};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Outward notification surface of the session core.
#[derive(Clone)]
pub struct EventBridge {
	state_tx: broadcast::Sender<StateChanged>,
	pairing_tx: broadcast::Sender<PairingChallenge>,
	message_tx: broadcast::Sender<MessageStatus>,
	stats_tx: broadcast::Sender<SessionStats>,
	all_tx: broadcast::Sender<ClientEvent>,
}

impl EventBridge {
	pub fn new() -> Self {
		let (state_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
		let (pairing_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
		let (message_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
		let (stats_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
		let (all_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
		Self {
			state_tx,
			pairing_tx,
			message_tx,
			stats_tx,
			all_tx,
		}
	}

	pub fn subscribe_state(&self) -> broadcast::Receiver<StateChanged> {
		self.state_tx.subscribe()
	}

	pub fn subscribe_pairing(&self) -> broadcast::Receiver<PairingChallenge> {
		self.pairing_tx.subscribe()
	}

	pub fn subscribe_message_status(&self) -> broadcast::Receiver<MessageStatus> {
		self.message_tx.subscribe()
	}

	pub fn subscribe_stats(&self) -> broadcast::Receiver<SessionStats> {
		self.stats_tx.subscribe()
	}

	/// All concerns multiplexed onto one stream, for relays that forward
	/// everything to a single sink.
	pub fn subscribe_all(&self) -> broadcast::Receiver<ClientEvent> {
		self.all_tx.subscribe()
	}

	pub(crate) fn emit_state(&self, event: StateChanged) {
		let _ = self.all_tx.send(ClientEvent::StateChanged(event.clone()));
		let _ = self.state_tx.send(event);
	}

	pub(crate) fn emit_pairing(&self, event: PairingChallenge) {
		let _ = self.all_tx.send(ClientEvent::PairingChallenge(event.clone()));
		let _ = self.pairing_tx.send(event);
	}

	pub(crate) fn emit_message_status(&self, event: MessageStatus) {
		let _ = self.all_tx.send(ClientEvent::MessageStatus(event.clone()));
		let _ = self.message_tx.send(event);
	}

	pub(crate) fn emit_stats(&self, event: SessionStats) {
		let _ = self.all_tx.send(ClientEvent::SessionStats(event.clone()));
		let _ = self.stats_tx.send(event);
	}
}

impl Default for EventBridge {
	fn default() -> Self {
		Self::new()
	}
}

/// Wall-clock time as unix milliseconds.
pub(crate) fn now_ms() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|elapsed| elapsed.as_millis() as u64)
		.unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use mb_protocol::ClientState;

	use super::*;

	#[tokio::test]
	async fn emission_without_subscribers_is_dropped() {
		let bridge = EventBridge::new();
		bridge.emit_pairing(PairingChallenge {
			challenge: "c".to_string(),
		});
	}

	#[tokio::test]
	async fn subscribers_observe_events_in_emission_order() {
		let bridge = EventBridge::new();
		let mut rx = bridge.subscribe_state();

		for (from, to) in [
			(ClientState::Uninitialized, ClientState::Initializing),
			(ClientState::Initializing, ClientState::Authenticated),
		] {
			bridge.emit_state(StateChanged {
				from,
				to,
				reason: "test".to_string(),
				at_ms: now_ms(),
			});
		}

		assert_eq!(rx.recv().await.unwrap().to, ClientState::Initializing);
		assert_eq!(rx.recv().await.unwrap().to, ClientState::Authenticated);
	}

	#[tokio::test]
	async fn merged_stream_wraps_every_concern() {
		let bridge = EventBridge::new();
		let mut all = bridge.subscribe_all();

		bridge.emit_pairing(PairingChallenge {
			challenge: "c".to_string(),
		});
		bridge.emit_stats(SessionStats::default());

		assert!(matches!(all.recv().await.unwrap(), ClientEvent::PairingChallenge(_)));
		assert!(matches!(all.recv().await.unwrap(), ClientEvent::SessionStats(_)));
	}
}
