//! Client lifecycle state machine.
//!
//! Exactly one authoritative state at any instant; transitions only along
//! the fixed edge table. Off-table requests are rejected without mutating
//! state. Every accepted transition emits a `state_changed` event, and
//! events are observed in emission order because the transition is applied
//! and emitted under one lock.

use mb_protocol::{ClientState, StateChanged};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{MbError, Result};
use crate::events::{EventBridge, now_ms};

/// Holder of the single authoritative [`ClientState`].
pub struct StateMachine {
	current: Mutex<ClientState>,
	bridge: EventBridge,
}

impl StateMachine {
	pub fn new(bridge: EventBridge) -> Self {
		Self {
			current: Mutex::new(ClientState::Uninitialized),
			bridge,
		}
	}

	/// Returns the current state.
	pub fn state(&self) -> ClientState {
		*self.current.lock()
	}

	/// Applies a transition, returning the prior state.
	///
	/// Rejects with [`MbError::InvalidTransition`] when the edge is not in
	/// the table; the current state is left untouched.
	pub fn transition(&self, to: ClientState, reason: &str) -> Result<ClientState> {
		let mut current = self.current.lock();
		let from = *current;

		if !edge_allowed(from, to) {
			debug!(target = "mb.state", %from, %to, reason, "transition rejected");
			return Err(MbError::InvalidTransition { from, to });
		}

		*current = to;
		info!(target = "mb.state", %from, %to, reason, "state changed");
		self.bridge.emit_state(StateChanged {
			from,
			to,
			reason: reason.to_string(),
			at_ms: now_ms(),
		});
		Ok(from)
	}
}

/// The fixed transition table.
fn edge_allowed(from: ClientState, to: ClientState) -> bool {
	use ClientState::*;
	matches!(
		(from, to),
		(Uninitialized, Initializing)
			| (Initializing, PairingPending)
			| (Initializing, Authenticated)
			| (Initializing, Error)
			| (PairingPending, Authenticated)
			| (PairingPending, Error)
			| (Authenticated, Connected)
			| (Connected, Disconnected)
			| (Connected, Error)
			| (Connected, Destroying)
			| (Disconnected, Initializing)
			| (Disconnected, Destroying)
			| (Error, Initializing)
			| (Error, Destroying)
			| (Destroying, Uninitialized)
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn machine() -> StateMachine {
		StateMachine::new(EventBridge::new())
	}

	#[test]
	fn starts_uninitialized() {
		assert_eq!(machine().state(), ClientState::Uninitialized);
	}

	#[test]
	fn walks_the_happy_path() {
		let sm = machine();
		for to in [
			ClientState::Initializing,
			ClientState::PairingPending,
			ClientState::Authenticated,
			ClientState::Connected,
			ClientState::Destroying,
			ClientState::Uninitialized,
		] {
			sm.transition(to, "test").unwrap();
			assert_eq!(sm.state(), to);
		}
	}

	#[test]
	fn off_table_transition_is_rejected_without_mutation() {
		let sm = machine();
		let err = sm.transition(ClientState::Connected, "test").unwrap_err();
		assert!(matches!(
			err,
			MbError::InvalidTransition {
				from: ClientState::Uninitialized,
				to: ClientState::Connected,
			}
		));
		assert_eq!(sm.state(), ClientState::Uninitialized);
	}

	#[test]
	fn error_state_allows_reinitialization() {
		let sm = machine();
		sm.transition(ClientState::Initializing, "test").unwrap();
		sm.transition(ClientState::Error, "test").unwrap();
		sm.transition(ClientState::Initializing, "retry").unwrap();
		assert_eq!(sm.state(), ClientState::Initializing);
	}

	#[tokio::test]
	async fn accepted_transitions_emit_in_order() {
		let bridge = EventBridge::new();
		let mut rx = bridge.subscribe_state();
		let sm = StateMachine::new(bridge);

		sm.transition(ClientState::Initializing, "start").unwrap();
		sm.transition(ClientState::Error, "boom").unwrap();
		// Rejected transitions emit nothing.
		let _ = sm.transition(ClientState::Connected, "nope");

		let first = rx.recv().await.unwrap();
		assert_eq!((first.from, first.to), (ClientState::Uninitialized, ClientState::Initializing));
		assert_eq!(first.reason, "start");
		let second = rx.recv().await.unwrap();
		assert_eq!((second.from, second.to), (ClientState::Initializing, ClientState::Error));
		assert!(rx.try_recv().is_err());
	}
}
