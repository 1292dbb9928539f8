//! Per-message delivery records.

use mb_protocol::DeliveryStatus;
use serde::{Deserialize, Serialize};

/// Delivery state of one tracked outbound message.
///
/// Belongs to exactly one session. Mutated only by acknowledgement
/// callbacks until its session is completed and frozen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
	pub recipient_key: String,
	/// Wall-clock enqueue time, unix milliseconds. Never changes.
	pub enqueued_at_ms: u64,
	pub status: DeliveryStatus,
	pub last_updated_at_ms: u64,
}

impl MessageRecord {
	pub(crate) fn new(recipient_key: impl Into<String>, enqueued_at_ms: u64) -> Self {
		Self {
			recipient_key: recipient_key.into(),
			enqueued_at_ms,
			status: DeliveryStatus::Queued,
			last_updated_at_ms: enqueued_at_ms,
		}
	}

	/// Applies an acknowledgement. Later acks overwrite earlier ones; they
	/// are applied in arrival order, never reordered.
	pub(crate) fn apply(&mut self, status: DeliveryStatus, at_ms: u64) {
		self.status = status;
		self.last_updated_at_ms = at_ms;
	}
}
