// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Log Service endpoint and operation settings.

use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "cn-hangzhou.log.aliyuncs.com";
pub const DEFAULT_PRODUCT_DOMAIN: &str = "sls.aliyuncs.com";
pub const DEFAULT_REGION: &str = "cn-hangzhou";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LogServiceConfigLayer {
	pub endpoint: Option<String>,
	pub default_project: Option<String>,
	pub default_machine_group: Option<String>,
	pub product_domain: Option<String>,
	pub region: Option<String>,
	pub cache_expire_secs: Option<u64>,
	pub max_retries: Option<u32>,
	pub request_timeout_secs: Option<u64>,
}

impl LogServiceConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.endpoint.is_some() {
			self.endpoint = other.endpoint;
		}
		if other.default_project.is_some() {
			self.default_project = other.default_project;
		}
		if other.default_machine_group.is_some() {
			self.default_machine_group = other.default_machine_group;
		}
		if other.product_domain.is_some() {
			self.product_domain = other.product_domain;
		}
		if other.region.is_some() {
			self.region = other.region;
		}
		if other.cache_expire_secs.is_some() {
			self.cache_expire_secs = other.cache_expire_secs;
		}
		if other.max_retries.is_some() {
			self.max_retries = other.max_retries;
		}
		if other.request_timeout_secs.is_some() {
			self.request_timeout_secs = other.request_timeout_secs;
		}
	}

	pub fn finalize(self) -> LogServiceConfig {
		let endpoint = self
			.endpoint
			.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
		let region = self
			.region
			.or_else(|| guess_region(&endpoint))
			.unwrap_or_else(|| DEFAULT_REGION.to_string());

		LogServiceConfig {
			region,
			endpoint,
			default_project: self.default_project.unwrap_or_default(),
			default_machine_group: self.default_machine_group.unwrap_or_default(),
			product_domain: self
				.product_domain
				.unwrap_or_else(|| DEFAULT_PRODUCT_DOMAIN.to_string()),
			cache_expire_secs: self.cache_expire_secs.unwrap_or(600),
			max_retries: self.max_retries.unwrap_or(3).max(1),
			request_timeout_secs: self.request_timeout_secs.unwrap_or(10),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogServiceConfig {
	pub endpoint: String,
	pub default_project: String,
	pub default_machine_group: String,
	pub product_domain: String,
	pub region: String,
	pub cache_expire_secs: u64,
	pub max_retries: u32,
	pub request_timeout_secs: u64,
}

impl Default for LogServiceConfig {
	fn default() -> Self {
		LogServiceConfigLayer::default().finalize()
	}
}

/// Derive the region id from an endpoint host such as
/// `cn-hangzhou-intranet.log.aliyuncs.com`.
pub fn guess_region(endpoint: &str) -> Option<String> {
	let host = endpoint
		.trim_start_matches("https://")
		.trim_start_matches("http://");
	let mut label = host.split('.').next()?;
	for suffix in ["-intranet", "-vpc", "-share"] {
		if let Some(stripped) = label.strip_suffix(suffix) {
			label = stripped;
		}
	}
	if label.contains('-') {
		Some(label.to_string())
	} else {
		None
	}
}
