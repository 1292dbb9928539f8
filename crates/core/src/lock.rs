//! FIFO initialization lock with timeout and stale-hold recovery.
//!
//! Serializes initialize/destroy so only one lifecycle operation is in
//! flight. Waiters queue in arrival order; a waiter that times out is
//! removed from the queue and told so. A holder that exceeds the staleness
//! bound (a caller that crashed mid-hold) is force-released with a warning,
//! admitting the next waiter.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{MbError, Result};

/// Staleness policy for held locks.
#[derive(Debug, Clone)]
pub struct LockConfig {
	/// A hold longer than this is eligible for forced release.
	pub stale_after: Duration,
}

impl Default for LockConfig {
	fn default() -> Self {
		Self {
			stale_after: Duration::from_secs(120),
		}
	}
}

#[derive(Debug)]
struct Holder {
	token: u64,
	acquired_at: Instant,
}

#[derive(Debug)]
struct Waiter {
	token: u64,
	grant_tx: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
struct LockState {
	holder: Option<Holder>,
	waiters: VecDeque<Waiter>,
}

#[derive(Debug)]
struct LockInner {
	config: LockConfig,
	next_token: AtomicU64,
	state: Mutex<LockState>,
}

impl LockInner {
	fn release(&self, token: u64) {
		let mut state = self.state.lock();
		match &state.holder {
			Some(holder) if holder.token == token => grant_next(&mut state),
			_ => {
				// Force-released earlier; this guard no longer holds.
				debug!(target = "mb.lock", token, "release from non-holder ignored");
			}
		}
	}

	fn force_release_if_stale(&self, state: &mut LockState) {
		let Some(holder) = &state.holder else {
			return;
		};
		let held = holder.acquired_at.elapsed();
		if held > self.config.stale_after {
			warn!(
				target = "mb.lock",
				token = holder.token,
				held = ?held,
				"forcing release of stale initialization lock"
			);
			grant_next(state);
		}
	}
}

/// Hands the lock to the next live waiter, or leaves it free.
fn grant_next(state: &mut LockState) {
	while let Some(waiter) = state.waiters.pop_front() {
		let token = waiter.token;
		if waiter.grant_tx.send(()).is_ok() {
			state.holder = Some(Holder {
				token,
				acquired_at: Instant::now(),
			});
			return;
		}
		// That waiter gave up; try the next one.
	}
	state.holder = None;
}

/// FIFO mutual exclusion for lifecycle operations.
pub struct InitLock {
	inner: Arc<LockInner>,
}

/// Proof of holding the lock; releases on drop.
#[derive(Debug)]
pub struct LockGuard {
	inner: Arc<LockInner>,
	token: u64,
}

impl Drop for LockGuard {
	fn drop(&mut self) {
		self.inner.release(self.token);
	}
}

impl InitLock {
	pub fn new(config: LockConfig) -> Self {
		Self {
			inner: Arc::new(LockInner {
				config,
				next_token: AtomicU64::new(1),
				state: Mutex::new(LockState::default()),
			}),
		}
	}

	/// Acquires the lock, waiting in FIFO order up to `timeout`.
	pub async fn acquire(&self, timeout: Duration) -> Result<LockGuard> {
		let token = self.inner.next_token.fetch_add(1, Ordering::SeqCst);

		let grant_rx = {
			let mut state = self.inner.state.lock();
			self.inner.force_release_if_stale(&mut state);

			if state.holder.is_none() && state.waiters.is_empty() {
				state.holder = Some(Holder {
					token,
					acquired_at: Instant::now(),
				});
				return Ok(LockGuard {
					inner: Arc::clone(&self.inner),
					token,
				});
			}

			let (grant_tx, grant_rx) = oneshot::channel();
			state.waiters.push_back(Waiter { token, grant_tx });
			grant_rx
		};

		match tokio::time::timeout(timeout, grant_rx).await {
			Ok(Ok(())) => Ok(LockGuard {
				inner: Arc::clone(&self.inner),
				token,
			}),
			// Sender dropped without granting; treat like a timeout.
			Ok(Err(_)) => Err(MbError::LockTimeout(timeout)),
			Err(_) => {
				let mut state = self.inner.state.lock();
				if state.holder.as_ref().is_some_and(|holder| holder.token == token) {
					// The grant raced our timeout; pass the lock along.
					grant_next(&mut state);
				} else {
					state.waiters.retain(|waiter| waiter.token != token);
				}
				Err(MbError::LockTimeout(timeout))
			}
		}
	}
}

impl Default for InitLock {
	fn default() -> Self {
		Self::new(LockConfig::default())
	}
}
