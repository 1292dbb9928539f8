//! Error taxonomy for driver lifecycle operations.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the driver and resource controller.
#[derive(Debug, Error)]
pub enum DriverError {
	#[error("driver session spawn failed: {0}")]
	Spawn(String),

	#[error("driver connect exceeded its deadline of {0:?}")]
	ConnectTimeout(Duration),

	#[error("a driver session is already active")]
	AlreadyActive,

	#[error("no active driver session")]
	NotConnected,

	#[error("driver send failed: {0}")]
	Send(String),

	#[error("driver shutdown failed: {0}")]
	Shutdown(String),

	#[error("driver event channel closed")]
	ChannelClosed,
}

pub type Result<T> = std::result::Result<T, DriverError>;
