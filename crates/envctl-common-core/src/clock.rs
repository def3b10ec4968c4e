// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Injectable wall-clock sources.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Source of the current instant.
pub trait Clock: Send + Sync + 'static {
	fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Wall-clock time that advances with the tokio timer.
///
/// The clock is anchored to [`Utc::now`] at construction and then follows
/// [`tokio::time::Instant`], so it moves in lock-step with `tokio::time::sleep`
/// when the runtime is paused in tests.
#[derive(Debug, Clone)]
pub struct TokioClock {
	wall_anchor: DateTime<Utc>,
	instant_anchor: tokio::time::Instant,
}

impl TokioClock {
	pub fn new() -> Self {
		Self::anchored_at(Utc::now())
	}

	pub fn anchored_at(wall_anchor: DateTime<Utc>) -> Self {
		Self {
			wall_anchor,
			instant_anchor: tokio::time::Instant::now(),
		}
	}
}

impl Default for TokioClock {
	fn default() -> Self {
		Self::new()
	}
}

impl Clock for TokioClock {
	fn now(&self) -> DateTime<Utc> {
		let elapsed = self.instant_anchor.elapsed();
		self.wall_anchor
			+ chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
	}
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
	now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
	pub fn new(start: DateTime<Utc>) -> Self {
		Self {
			now: Arc::new(Mutex::new(start)),
		}
	}

	pub fn advance(&self, by: Duration) {
		let by = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
		let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
		*now += by;
	}

	pub fn set(&self, at: DateTime<Utc>) {
		*self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
	}
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.lock().unwrap_or_else(|e| e.into_inner())
	}
}
