//! Authentication handshake: restore versus pairing.
//!
//! Stored credentials are validated structurally before any use: present,
//! parseable, current schema, non-empty, and newer than the configured
//! maximum age. A blob failing validation is discarded (with a backup) so a
//! corrupted credential cannot wedge initialization in a retry loop.
//!
//! Resolution is event-driven: the driver deterministically reports either
//! a silent resume or a pairing challenge, and we wait on whichever fires
//! first. There is no timer race against the driver.

use std::time::Duration;

use mb_protocol::{CREDENTIAL_SCHEMA_VERSION, CredentialBlob};
use mb_runtime::{DriverError, DriverEvent};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::credentials::{CredentialStore, LoadedCredentials};
use crate::error::{MbError, Result};
use crate::events::now_ms;

/// How the handshake resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
	/// Stored credentials were accepted; the session resumed silently.
	Restored,
	/// A fresh pairing code must be confirmed out-of-band.
	PairingRequired { challenge: String },
}

/// Structural validation of a stored blob. Never touches the driver.
fn validate_blob(blob: &CredentialBlob, max_age: Duration) -> Result<()> {
	if blob.schema != CREDENTIAL_SCHEMA_VERSION {
		return Err(MbError::AuthStale(format!(
			"schema {} does not match current {}",
			blob.schema, CREDENTIAL_SCHEMA_VERSION
		)));
	}
	if !blob.has_payload() {
		return Err(MbError::AuthStale("payload is empty".to_string()));
	}

	let age_ms = now_ms().saturating_sub(blob.saved_at_ms);
	if age_ms > max_age.as_millis() as u64 {
		return Err(MbError::AuthStale(format!("saved {age_ms}ms ago, max age is {max_age:?}")));
	}
	Ok(())
}

/// Loads and structurally validates stored credentials.
///
/// Returns a usable blob, or `None` when pairing is required. Invalid or
/// unreadable blobs are proactively discarded so the next attempt starts
/// clean; discard failures are logged, never fatal.
pub fn prepare_credentials(store: &dyn CredentialStore, max_age: Duration) -> Result<Option<CredentialBlob>> {
	let loaded = store.load()?;

	let blob = match loaded {
		LoadedCredentials::Absent => {
			debug!(target = "mb.auth", "no stored credentials; pairing required");
			return Ok(None);
		}
		LoadedCredentials::Unreadable => {
			warn!(target = "mb.auth", "discarding unreadable credential blob");
			discard_quietly(store);
			return Ok(None);
		}
		LoadedCredentials::Present(blob) => blob,
	};

	match validate_blob(&blob, max_age) {
		Ok(()) => {
			debug!(target = "mb.auth", "stored credentials pass structural validation");
			Ok(Some(blob))
		}
		Err(err) => {
			warn!(target = "mb.auth", error = %err, "discarding stale credentials");
			discard_quietly(store);
			Ok(None)
		}
	}
}

fn discard_quietly(store: &dyn CredentialStore) {
	if let Err(err) = store.discard() {
		warn!(target = "mb.auth", error = %err, "credential discard failed");
	}
}

/// Waits for the driver's authoritative authentication signal.
///
/// Exactly one of `AuthRestored` or `PairingChallenge` decides the outcome;
/// other events arriving first are skipped. Bounded by `deadline`.
pub async fn resolve(events: &mut broadcast::Receiver<DriverEvent>, deadline: Duration) -> Result<HandshakeOutcome> {
	let expires = Instant::now() + deadline;

	loop {
		let event = match tokio::time::timeout_at(expires, events.recv()).await {
			Ok(Ok(event)) => event,
			Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
				warn!(target = "mb.auth", skipped, "handshake listener lagged");
				continue;
			}
			Ok(Err(broadcast::error::RecvError::Closed)) => {
				return Err(MbError::Driver(DriverError::ChannelClosed));
			}
			Err(_) => return Err(MbError::InitTimeout(deadline)),
		};

		match event {
			DriverEvent::AuthRestored => {
				info!(target = "mb.auth", "session resumed from stored credentials");
				return Ok(HandshakeOutcome::Restored);
			}
			DriverEvent::PairingChallenge { challenge } => {
				info!(target = "mb.auth", "pairing challenge issued");
				return Ok(HandshakeOutcome::PairingRequired { challenge });
			}
			other => {
				debug!(target = "mb.auth", event = ?other, "event before auth resolution; skipping");
			}
		}
	}
}
