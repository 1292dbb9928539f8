//! Delivery statuses and message identifiers for outbound messages.

use serde::{Deserialize, Serialize};

/// Delivery status of a tracked outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
	Queued,
	Sent,
	Delivered,
	Read,
	Failed,
}

impl DeliveryStatus {
	/// Returns `true` once a message needs no further acknowledgements.
	pub fn is_settled(self) -> bool {
		matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Read | DeliveryStatus::Failed)
	}
}

impl std::fmt::Display for DeliveryStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			DeliveryStatus::Queued => "queued",
			DeliveryStatus::Sent => "sent",
			DeliveryStatus::Delivered => "delivered",
			DeliveryStatus::Read => "read",
			DeliveryStatus::Failed => "failed",
		};
		f.write_str(name)
	}
}

/// Opaque identifier for a tracked outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl std::fmt::Display for MessageId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}
