// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared HTTP client with consistent User-Agent header.

use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// Creates a new HTTP client builder with the standard envctl User-Agent header.
///
/// # Example
/// ```ignore
/// let client = envctl_common_http::builder()
///     .timeout(Duration::from_secs(3))
///     .build()?;
/// ```
pub fn builder() -> ClientBuilder {
	Client::builder().user_agent(user_agent())
}

/// Creates a new HTTP client with a per-request timeout and the standard User-Agent.
pub fn new_client_with_timeout(timeout: Duration) -> reqwest::Result<Client> {
	builder().timeout(timeout).connect_timeout(timeout).build()
}

/// Returns the standard envctl User-Agent string, `envctl/{version}`.
pub fn user_agent() -> String {
	format!("envctl/{}", env!("CARGO_PKG_VERSION"))
}
