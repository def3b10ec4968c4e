// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded retry for remote calls.

use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times to try a call and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
	pub max_attempts: u32,
	pub delay: Duration,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self::fixed(3, Duration::from_millis(100))
	}
}

impl RetryConfig {
	/// `max_attempts` tries separated by a constant `delay`.
	pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
		Self {
			max_attempts: max_attempts.max(1),
			delay,
		}
	}
}

/// Classifies an error as worth another attempt.
pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

/// Throttling, timeouts and server-side failures.
pub fn is_retryable_status(status: StatusCode) -> bool {
	matches!(
		status,
		StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT
	) || status.is_server_error()
}

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		self.is_timeout()
			|| self.is_connect()
			|| self.status().is_some_and(is_retryable_status)
	}
}

/// Run `f` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is used up. The last error is returned.
pub async fn retry<F, Fut, T, E>(cfg: &RetryConfig, mut f: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = Result<T, E>>,
	E: RetryableError + std::fmt::Display,
{
	let mut failures = 0;
	loop {
		let err = match f().await {
			Ok(value) => return Ok(value),
			Err(err) => err,
		};
		failures += 1;

		if !err.is_retryable() {
			debug!(error = %err, attempt = failures, "giving up on non-retryable error");
			return Err(err);
		}
		if failures >= cfg.max_attempts {
			warn!(
				error = %err,
				attempts = failures,
				"retries exhausted"
			);
			return Err(err);
		}

		let delay = cfg.delay;
		debug!(
			error = %err,
			attempt = failures,
			max_attempts = cfg.max_attempts,
			delay_ms = delay.as_millis() as u64,
			"retrying"
		);
		tokio::time::sleep(delay).await;
	}
}
