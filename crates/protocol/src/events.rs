//! Payloads pushed to the notification sink.
//!
//! The session core emits these on one typed channel per concern; the sink
//! relays them to connected UIs. The core never reads anything back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::state::ClientState;
use crate::status::{DeliveryStatus, MessageId};

/// Accepted state-machine transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChanged {
	pub from: ClientState,
	pub to: ClientState,
	pub reason: String,
	/// Wall-clock transition time, unix milliseconds.
	pub at_ms: u64,
}

/// A pairing code a human must confirm out-of-band to authorize a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingChallenge {
	pub challenge: String,
}

/// Delivery-status change for one tracked message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatus {
	pub message_id: MessageId,
	pub status: DeliveryStatus,
}

/// Counters describing the message-session tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
	pub active_count: usize,
	pub history_count: usize,
	/// Unsettled message counts keyed by window.
	pub pending_by_window: BTreeMap<String, usize>,
}

/// Union of everything the sink can receive, for relays that multiplex
/// all concerns onto one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
	StateChanged(StateChanged),
	PairingChallenge(PairingChallenge),
	MessageStatus(MessageStatus),
	SessionStats(SessionStats),
}
