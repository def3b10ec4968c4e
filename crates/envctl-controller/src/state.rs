// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Desired-state map and per-spec retry bookkeeping.

use std::collections::HashMap;
use std::time::Duration;

use envctl_envconfig::{LogConfigSpec, SpecKey};

pub const MIN_RETRY_BACKOFF: Duration = Duration::from_secs(10);
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(900);

/// Wait before retrying a spec that has failed `error_count` times.
pub fn retry_backoff(error_count: u32) -> Duration {
	let secs = MIN_RETRY_BACKOFF.as_secs().saturating_mul(u64::from(error_count));
	Duration::from_secs(secs.clamp(MIN_RETRY_BACKOFF.as_secs(), MAX_RETRY_BACKOFF.as_secs()))
}

/// What observing a candidate did to the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
	New,
	Unchanged,
	/// Same content, but the last attempt failed.
	Retry,
	Changed,
}

impl Observation {
	pub fn needs_reconcile(&self) -> bool {
		!matches!(self, Observation::Unchanged)
	}
}

#[derive(Debug, Default)]
pub struct DesiredState {
	entries: HashMap<SpecKey, LogConfigSpec>,
}

impl DesiredState {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn get(&self, key: &SpecKey) -> Option<&LogConfigSpec> {
		self.entries.get(key)
	}

	/// Merge a freshly derived spec into the map. `now` is epoch seconds.
	pub fn observe(&mut self, mut candidate: LogConfigSpec, now: i64) -> Observation {
		candidate.last_fetch_at = now;
		let key = candidate.key();
		match self.entries.get_mut(&key) {
			None => {
				self.entries.insert(key, candidate);
				Observation::New
			}
			Some(existing) if existing.hash == candidate.hash => {
				existing.last_fetch_at = now;
				if existing.error_count > 0 {
					Observation::Retry
				} else {
					Observation::Unchanged
				}
			}
			Some(existing) => {
				*existing = candidate;
				Observation::Changed
			}
		}
	}

	/// Whether the spec's retry gate has opened.
	pub fn is_due(&self, key: &SpecKey, now: i64) -> bool {
		self.entries
			.get(key)
			.is_some_and(|spec| spec.next_retry_at <= now)
	}

	pub fn record_success(&mut self, key: &SpecKey) {
		if let Some(spec) = self.entries.get_mut(key) {
			spec.error_count = 0;
			spec.next_retry_at = 0;
		}
	}

	/// Count a failure and push the retry gate out. Returns the backoff applied.
	pub fn record_failure(&mut self, key: &SpecKey, now: i64) -> Option<Duration> {
		let spec = self.entries.get_mut(key)?;
		spec.error_count = spec.error_count.saturating_add(1);
		let backoff = retry_backoff(spec.error_count);
		spec.next_retry_at = now + backoff.as_secs() as i64;
		Some(backoff)
	}

	/// Specs whose last attempt failed.
	pub fn failing(&self) -> usize {
		self.entries.values().filter(|s| s.error_count > 0).count()
	}

	/// Drop specs not observed for longer than `max_age`. Returns how many went.
	pub fn evict_older_than(&mut self, now: i64, max_age: Duration) -> usize {
		let cutoff = now - max_age.as_secs() as i64;
		let before = self.entries.len();
		self.entries.retain(|_, spec| spec.last_fetch_at >= cutoff);
		before - self.entries.len()
	}
}
