//! Persisted credential blob schema.
//!
//! The blob payload is opaque to the session core; only existence, schema
//! version, non-emptiness, and age are ever inspected (structural
//! validation). The driver produces and consumes the payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current schema version for persisted credential blobs.
pub const CREDENTIAL_SCHEMA_VERSION: u32 = 1;

/// Stored session credentials plus the metadata needed for validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialBlob {
	pub schema: u32,
	/// Wall-clock save time, unix milliseconds. Used for the max-age check.
	pub saved_at_ms: u64,
	/// Driver-owned session material. Opaque here.
	pub payload: Value,
}

impl CredentialBlob {
	/// Creates a blob at the current schema version.
	pub fn new(saved_at_ms: u64, payload: Value) -> Self {
		Self {
			schema: CREDENTIAL_SCHEMA_VERSION,
			saved_at_ms,
			payload,
		}
	}

	/// Returns `true` when the payload carries any usable content.
	pub fn has_payload(&self) -> bool {
		match &self.payload {
			Value::Null => false,
			Value::String(s) => !s.is_empty(),
			Value::Object(map) => !map.is_empty(),
			Value::Array(items) => !items.is_empty(),
			_ => true,
		}
	}
}
