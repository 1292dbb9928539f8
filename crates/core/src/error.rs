//! Error taxonomy for the session core.

use std::time::Duration;

use mb_protocol::ClientState;
use mb_runtime::DriverError;
use thiserror::Error;

/// Errors surfaced by the session core.
///
/// Unknown message acknowledgements are deliberately absent: they are a
/// logged no-op, not an error.
#[derive(Debug, Error)]
pub enum MbError {
	#[error("invalid state transition: {from} -> {to}")]
	InvalidTransition { from: ClientState, to: ClientState },

	#[error("initialization blocked: circuit breaker open for another {remaining:?}")]
	BreakerOpen { remaining: Duration },

	#[error("initialization exceeded its deadline of {0:?}")]
	InitTimeout(Duration),

	#[error("timed out waiting for the initialization lock after {0:?}")]
	LockTimeout(Duration),

	#[error("stored credentials failed validation: {0}")]
	AuthStale(String),

	#[error("client is not connected (state: {0})")]
	NotConnected(ClientState),

	#[error(transparent)]
	Driver(#[from] DriverError),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MbError>;
