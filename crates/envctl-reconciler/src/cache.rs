// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use envctl_common_core::Clock;

struct Entry {
	verified_at: DateTime<Utc>,
	fingerprint: Option<[u8; 32]>,
}

/// Remembers which remote resources were recently verified to exist.
///
/// Keys are `project@@name`. An entry is fresh while less than `ttl` has
/// passed since it was recorded; stale entries are treated as absent.
pub struct ResourceCache {
	entries: RwLock<HashMap<String, Entry>>,
	ttl: Duration,
	clock: Arc<dyn Clock>,
}

pub fn cache_key(project: &str, name: &str) -> String {
	format!("{project}@@{name}")
}

impl ResourceCache {
	pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
		Self {
			entries: RwLock::new(HashMap::new()),
			ttl,
			clock,
		}
	}

	pub fn contains(&self, project: &str, name: &str) -> bool {
		self.lookup(project, name, None)
	}

	/// Fresh and recorded with the same fingerprint.
	pub fn contains_version(&self, project: &str, name: &str, fingerprint: &[u8; 32]) -> bool {
		self.lookup(project, name, Some(fingerprint))
	}

	pub fn insert(&self, project: &str, name: &str) {
		self.record(project, name, None);
	}

	pub fn insert_version(&self, project: &str, name: &str, fingerprint: [u8; 32]) {
		self.record(project, name, Some(fingerprint));
	}

	fn lookup(&self, project: &str, name: &str, fingerprint: Option<&[u8; 32]>) -> bool {
		let entries = self
			.entries
			.read()
			.unwrap_or_else(|poisoned| poisoned.into_inner());
		let Some(entry) = entries.get(&cache_key(project, name)) else {
			return false;
		};
		let age = (self.clock.now() - entry.verified_at)
			.to_std()
			.unwrap_or(Duration::ZERO);
		if age >= self.ttl {
			return false;
		}
		match fingerprint {
			Some(expected) => entry.fingerprint.as_ref() == Some(expected),
			None => true,
		}
	}

	fn record(&self, project: &str, name: &str, fingerprint: Option<[u8; 32]>) {
		let entry = Entry {
			verified_at: self.clock.now(),
			fingerprint,
		};
		self.entries
			.write()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.insert(cache_key(project, name), entry);
	}
}
