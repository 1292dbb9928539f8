//! Circuit breaker isolating repeated initialization failures.
//!
//! Consecutive failures up to a threshold open the breaker; attempts are
//! then refused until a cooldown elapses, after which exactly one half-open
//! probe is admitted. The cooldown doubles on every re-open up to a bound,
//! and any success fully resets the breaker.
//!
//! Time is measured with `tokio::time::Instant` so cooldown behavior can be
//! tested under a paused clock.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Breaker thresholds and cooldown policy.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
	/// Consecutive failures that open the breaker.
	pub failure_threshold: u32,
	/// First cooldown; doubles on every subsequent open.
	pub cooldown_base: Duration,
	/// Upper bound on the cooldown growth.
	pub cooldown_max: Duration,
}

impl Default for BreakerConfig {
	fn default() -> Self {
		Self {
			failure_threshold: 3,
			cooldown_base: Duration::from_secs(30),
			cooldown_max: Duration::from_secs(600),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
	Closed,
	Open,
	HalfOpen,
}

struct Inner {
	status: Status,
	consecutive_failures: u32,
	/// Cooldown to apply at the next open. Monotonically non-decreasing
	/// until a success resets it.
	next_cooldown: Duration,
	open_until: Option<Instant>,
}

/// Failure isolator for the initialize path.
pub struct CircuitBreaker {
	config: BreakerConfig,
	inner: Mutex<Inner>,
}

impl CircuitBreaker {
	pub fn new(config: BreakerConfig) -> Self {
		let next_cooldown = config.cooldown_base;
		Self {
			config,
			inner: Mutex::new(Inner {
				status: Status::Closed,
				consecutive_failures: 0,
				next_cooldown,
				open_until: None,
			}),
		}
	}

	/// Records a successful attempt, fully resetting the breaker.
	pub fn record_success(&self) {
		let mut inner = self.inner.lock();
		inner.status = Status::Closed;
		inner.consecutive_failures = 0;
		inner.next_cooldown = self.config.cooldown_base;
		inner.open_until = None;
	}

	/// Records a failed attempt, opening the breaker at the threshold.
	pub fn record_failure(&self) {
		let mut inner = self.inner.lock();
		inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

		let should_open = match inner.status {
			// The half-open probe failed; go straight back to open.
			Status::HalfOpen => true,
			Status::Closed => inner.consecutive_failures >= self.config.failure_threshold,
			Status::Open => false,
		};

		if should_open {
			let cooldown = inner.next_cooldown;
			inner.status = Status::Open;
			inner.open_until = Some(Instant::now() + cooldown);
			inner.next_cooldown = (cooldown * 2).min(self.config.cooldown_max);
			warn!(
				target = "mb.breaker",
				failures = inner.consecutive_failures,
				cooldown = ?cooldown,
				"circuit breaker opened"
			);
		}
	}

	/// Returns `true` when an attempt may proceed.
	///
	/// While open this refuses until the cooldown elapses, then admits
	/// exactly one half-open probe; further calls refuse until that probe's
	/// outcome is recorded.
	pub fn allow_attempt(&self) -> bool {
		let mut inner = self.inner.lock();
		match inner.status {
			Status::Closed => true,
			Status::HalfOpen => false,
			Status::Open => {
				let elapsed = inner.open_until.is_none_or(|until| Instant::now() >= until);
				if elapsed {
					debug!(target = "mb.breaker", "cooldown elapsed; admitting half-open probe");
					inner.status = Status::HalfOpen;
					inner.open_until = None;
					true
				} else {
					false
				}
			}
		}
	}

	/// Remaining cooldown when attempts are currently refused.
	pub fn deny_for(&self) -> Option<Duration> {
		let inner = self.inner.lock();
		match inner.status {
			Status::Closed => None,
			// The probe slot is taken; callers should retry shortly.
			Status::HalfOpen => Some(Duration::ZERO),
			Status::Open => {
				let until = inner.open_until?;
				let now = Instant::now();
				if now >= until { None } else { Some(until - now) }
			}
		}
	}
}

impl Default for CircuitBreaker {
	fn default() -> Self {
		Self::new(BreakerConfig::default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn breaker(threshold: u32, base_ms: u64, max_ms: u64) -> CircuitBreaker {
		CircuitBreaker::new(BreakerConfig {
			failure_threshold: threshold,
			cooldown_base: Duration::from_millis(base_ms),
			cooldown_max: Duration::from_millis(max_ms),
		})
	}

	#[tokio::test(start_paused = true)]
	async fn opens_after_threshold_failures() {
		let breaker = breaker(3, 100, 1000);
		breaker.record_failure();
		breaker.record_failure();
		assert!(breaker.allow_attempt());
		breaker.record_failure();
		assert!(!breaker.allow_attempt());
	}

	#[tokio::test(start_paused = true)]
	async fn cooldown_admits_exactly_one_probe() {
		let breaker = breaker(1, 100, 1000);
		breaker.record_failure();
		assert!(!breaker.allow_attempt());

		tokio::time::advance(Duration::from_millis(101)).await;
		assert!(breaker.allow_attempt());
		// Probe slot taken until an outcome is recorded.
		assert!(!breaker.allow_attempt());
	}

	#[tokio::test(start_paused = true)]
	async fn probe_success_closes_the_breaker() {
		let breaker = breaker(1, 100, 1000);
		breaker.record_failure();
		tokio::time::advance(Duration::from_millis(101)).await;
		assert!(breaker.allow_attempt());
		breaker.record_success();
		assert!(breaker.allow_attempt());
		assert!(breaker.deny_for().is_none());
	}

	#[tokio::test(start_paused = true)]
	async fn probe_failure_reopens_with_doubled_cooldown() {
		let breaker = breaker(1, 100, 1000);
		breaker.record_failure();
		tokio::time::advance(Duration::from_millis(101)).await;
		assert!(breaker.allow_attempt());
		breaker.record_failure();

		// First re-open uses the doubled cooldown: 200ms.
		tokio::time::advance(Duration::from_millis(101)).await;
		assert!(!breaker.allow_attempt());
		tokio::time::advance(Duration::from_millis(100)).await;
		assert!(breaker.allow_attempt());
	}

	#[tokio::test(start_paused = true)]
	async fn cooldown_growth_is_bounded() {
		let breaker = breaker(1, 100, 250);
		for _ in 0..5 {
			breaker.record_failure();
			// Worst case is the max cooldown; one extra millisecond suffices.
			tokio::time::advance(Duration::from_millis(251)).await;
			assert!(breaker.allow_attempt());
		}
	}

	#[tokio::test(start_paused = true)]
	async fn success_resets_consecutive_failures() {
		let breaker = breaker(3, 100, 1000);
		breaker.record_failure();
		breaker.record_failure();
		breaker.record_success();
		breaker.record_failure();
		breaker.record_failure();
		assert!(breaker.allow_attempt());
	}
}
