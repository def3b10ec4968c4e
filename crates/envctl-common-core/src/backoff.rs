// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stateful backoff schedules.

use std::time::Duration;

/// A retry schedule that yields successive delays until reset.
pub trait Backoff: Send {
	/// Record a failure and return how long to wait before the next attempt.
	fn next_delay(&mut self) -> Duration;

	/// Forget previous failures.
	fn reset(&mut self);
}

/// Doubles from `min` up to `max`; the first failure after a reset waits `min`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
	min: Duration,
	max: Duration,
	current: Duration,
}

impl ExponentialBackoff {
	pub const DEFAULT_MIN: Duration = Duration::from_secs(1);
	pub const DEFAULT_MAX: Duration = Duration::from_secs(60);

	pub fn new(min: Duration, max: Duration) -> Self {
		Self {
			min,
			max: max.max(min),
			current: Duration::ZERO,
		}
	}

	pub fn current(&self) -> Duration {
		self.current
	}
}

impl Default for ExponentialBackoff {
	fn default() -> Self {
		Self::new(Self::DEFAULT_MIN, Self::DEFAULT_MAX)
	}
}

impl Backoff for ExponentialBackoff {
	fn next_delay(&mut self) -> Duration {
		self.current = if self.current.is_zero() {
			self.min
		} else {
			self.current.saturating_mul(2).min(self.max)
		};
		self.current
	}

	fn reset(&mut self) {
		self.current = Duration::ZERO;
	}
}

/// Adds `step` after every failure, capped at `max`.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
	step: Duration,
	max: Duration,
	current: Duration,
}

impl LinearBackoff {
	pub fn new(step: Duration, max: Duration) -> Self {
		Self {
			step,
			max,
			current: Duration::ZERO,
		}
	}
}

impl Backoff for LinearBackoff {
	fn next_delay(&mut self) -> Duration {
		self.current = self.current.saturating_add(self.step).min(self.max);
		self.current
	}

	fn reset(&mut self) {
		self.current = Duration::ZERO;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn exponential_doubles_then_caps() {
		let mut backoff = ExponentialBackoff::default();
		let delays: Vec<u64> = (0..9).map(|_| backoff.next_delay().as_secs()).collect();
		assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60, 60]);
	}

	#[test]
	fn exponential_reset_starts_over() {
		let mut backoff = ExponentialBackoff::default();
		backoff.next_delay();
		backoff.next_delay();
		backoff.reset();
		assert_eq!(backoff.current(), Duration::ZERO);
		assert_eq!(backoff.next_delay(), Duration::from_secs(1));
	}

	#[test]
	fn linear_steps_by_five_seconds_to_an_hour() {
		let mut backoff = LinearBackoff::new(Duration::from_secs(5), Duration::from_secs(3600));
		assert_eq!(backoff.next_delay(), Duration::from_secs(5));
		assert_eq!(backoff.next_delay(), Duration::from_secs(10));
		for _ in 0..1000 {
			backoff.next_delay();
		}
		assert_eq!(backoff.next_delay(), Duration::from_secs(3600));
	}

	proptest! {
		#[test]
		fn exponential_stays_within_bounds(min_ms in 1u64..5_000, max_ms in 1u64..120_000, steps in 1usize..64) {
			let min = Duration::from_millis(min_ms);
			let max = Duration::from_millis(max_ms);
			let mut backoff = ExponentialBackoff::new(min, max);
			let mut previous = Duration::ZERO;
			for _ in 0..steps {
				let delay = backoff.next_delay();
				prop_assert!(delay >= min);
				prop_assert!(delay <= max.max(min));
				prop_assert!(delay >= previous);
				previous = delay;
			}
		}

		#[test]
		fn linear_is_monotonic_and_capped(step_s in 1u64..60, max_s in 1u64..7200, steps in 1usize..256) {
			let mut backoff = LinearBackoff::new(Duration::from_secs(step_s), Duration::from_secs(max_s));
			let mut previous = Duration::ZERO;
			for _ in 0..steps {
				let delay = backoff.next_delay();
				prop_assert!(delay >= previous);
				prop_assert!(delay <= Duration::from_secs(max_s));
				previous = delay;
			}
		}
	}
}
