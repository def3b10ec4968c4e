// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Controller behaviour settings.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PREFIX: &str = "aliyun_logs_";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EnvConfigConfigLayer {
	pub enabled: Option<bool>,
	pub k8s_events: Option<bool>,
	pub prefix: Option<String>,
	pub update_interval_secs: Option<u64>,
	pub self_env_config: Option<bool>,
	pub self_env_only: Option<bool>,
	pub node_name: Option<String>,
}

impl EnvConfigConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.k8s_events.is_some() {
			self.k8s_events = other.k8s_events;
		}
		if other.prefix.is_some() {
			self.prefix = other.prefix;
		}
		if other.update_interval_secs.is_some() {
			self.update_interval_secs = other.update_interval_secs;
		}
		if other.self_env_config.is_some() {
			self.self_env_config = other.self_env_config;
		}
		if other.self_env_only.is_some() {
			self.self_env_only = other.self_env_only;
		}
		if other.node_name.is_some() {
			self.node_name = other.node_name;
		}
	}

	pub fn finalize(self) -> EnvConfigConfig {
		EnvConfigConfig {
			enabled: self.enabled.unwrap_or(false),
			k8s_events: self.k8s_events.unwrap_or(false),
			prefix: self
				.prefix
				.filter(|p| !p.is_empty())
				.unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
			update_interval_secs: self.update_interval_secs.unwrap_or(10).max(1),
			self_env_config: self.self_env_config.unwrap_or(false),
			self_env_only: self.self_env_only.unwrap_or(false),
			node_name: self.node_name,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvConfigConfig {
	/// Gates the whole controller.
	pub enabled: bool,
	/// Emit reconciliation events to the Kubernetes API.
	pub k8s_events: bool,
	pub prefix: String,
	pub update_interval_secs: u64,
	/// Also derive configs from the agent's own environment.
	pub self_env_config: bool,
	/// Exit after the first iteration that reconciles without failure.
	pub self_env_only: bool,
	pub node_name: Option<String>,
}

impl Default for EnvConfigConfig {
	fn default() -> Self {
		EnvConfigConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_values() {
		let config = EnvConfigConfig::default();
		assert!(!config.enabled);
		assert!(!config.k8s_events);
		assert_eq!(config.prefix, "aliyun_logs_");
		assert_eq!(config.update_interval_secs, 10);
		assert!(!config.self_env_only);
	}

	#[test]
	fn test_empty_prefix_falls_back_to_default() {
		let config = EnvConfigConfigLayer {
			prefix: Some(String::new()),
			..Default::default()
		}
		.finalize();
		assert_eq!(config.prefix, "aliyun_logs_");
	}

	#[test]
	fn test_zero_interval_is_clamped() {
		let config = EnvConfigConfigLayer {
			update_interval_secs: Some(0),
			..Default::default()
		}
		.finalize();
		assert_eq!(config.update_interval_secs, 1);
	}
}
