//! Client lifecycle states as they appear on the notification wire.

use serde::{Deserialize, Serialize};

/// Single authoritative lifecycle state of the messaging client.
///
/// The allowed transitions between states are enforced by the state machine
/// in `mb-core`; this type is only the wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientState {
	Uninitialized,
	Initializing,
	PairingPending,
	Authenticated,
	Connected,
	Disconnected,
	Error,
	Destroying,
}

impl ClientState {
	/// Returns the wire name of this state.
	pub fn as_str(self) -> &'static str {
		match self {
			ClientState::Uninitialized => "UNINITIALIZED",
			ClientState::Initializing => "INITIALIZING",
			ClientState::PairingPending => "PAIRING_PENDING",
			ClientState::Authenticated => "AUTHENTICATED",
			ClientState::Connected => "CONNECTED",
			ClientState::Disconnected => "DISCONNECTED",
			ClientState::Error => "ERROR",
			ClientState::Destroying => "DESTROYING",
		}
	}
}

impl std::fmt::Display for ClientState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn states_serialize_to_screaming_snake_case() {
		let json = serde_json::to_string(&ClientState::PairingPending).unwrap();
		assert_eq!(json, "\"PAIRING_PENDING\"");
		let back: ClientState = serde_json::from_str(&json).unwrap();
		assert_eq!(back, ClientState::PairingPending);
	}

	#[test]
	fn display_matches_wire_name() {
		assert_eq!(ClientState::Uninitialized.to_string(), "UNINITIALIZED");
		assert_eq!(ClientState::Destroying.to_string(), "DESTROYING");
	}
}
