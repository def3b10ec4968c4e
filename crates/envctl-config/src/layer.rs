// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration layer for merging from multiple sources.

use serde::Deserialize;

use crate::sections::{
	CredentialsConfigLayer, EnvConfigConfigLayer, LogServiceConfigLayer, LoggingConfigLayer,
};

/// Controller configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControllerConfigLayer {
	#[serde(default)]
	pub env_config: Option<EnvConfigConfigLayer>,
	#[serde(default)]
	pub log_service: Option<LogServiceConfigLayer>,
	#[serde(default)]
	pub credentials: Option<CredentialsConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl ControllerConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: ControllerConfigLayer) {
		merge_option(
			&mut self.env_config,
			other.env_config,
			EnvConfigConfigLayer::merge,
		);
		merge_option(
			&mut self.log_service,
			other.log_service,
			LogServiceConfigLayer::merge,
		);
		merge_option(
			&mut self.credentials,
			other.credentials,
			CredentialsConfigLayer::merge,
		);
		merge_option(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_empty_layers() {
		let mut base = ControllerConfigLayer::default();
		base.merge(ControllerConfigLayer::default());
		assert!(base.log_service.is_none());
	}

	#[test]
	fn test_merge_other_overwrites_field_by_field() {
		let mut base = ControllerConfigLayer {
			log_service: Some(LogServiceConfigLayer {
				endpoint: Some("cn-beijing.log.aliyuncs.com".to_string()),
				default_project: Some("k8s-log-base".to_string()),
				..Default::default()
			}),
			..Default::default()
		};
		let other = ControllerConfigLayer {
			log_service: Some(LogServiceConfigLayer {
				endpoint: Some("cn-shanghai.log.aliyuncs.com".to_string()),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(other);

		let log_service = base.log_service.unwrap();
		assert_eq!(
			log_service.endpoint.as_deref(),
			Some("cn-shanghai.log.aliyuncs.com")
		);
		assert_eq!(log_service.default_project.as_deref(), Some("k8s-log-base"));
	}

	#[test]
	fn test_merge_adds_missing_sections() {
		let mut base = ControllerConfigLayer::default();
		let other = ControllerConfigLayer {
			env_config: Some(EnvConfigConfigLayer {
				enabled: Some(true),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(other);
		assert_eq!(base.env_config.unwrap().enabled, Some(true));
	}
}
