// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential acquisition settings.

use envctl_common_secret::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_TOKEN_FILE_PATH: &str = "/var/addon/token-config";
pub const DEFAULT_METADATA_ENDPOINT: &str =
	"http://100.100.100.200/latest/meta-data/ram/security-credentials/";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CredentialsConfigLayer {
	pub ecs: Option<bool>,
	pub access_key_id: Option<String>,
	pub access_key_secret: Option<SecretString>,
	pub sts_token: Option<SecretString>,
	pub token_file_path: Option<String>,
	pub metadata_endpoint: Option<String>,
}

impl CredentialsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.ecs.is_some() {
			self.ecs = other.ecs;
		}
		if other.access_key_id.is_some() {
			self.access_key_id = other.access_key_id;
		}
		if other.access_key_secret.is_some() {
			self.access_key_secret = other.access_key_secret;
		}
		if other.sts_token.is_some() {
			self.sts_token = other.sts_token;
		}
		if other.token_file_path.is_some() {
			self.token_file_path = other.token_file_path;
		}
		if other.metadata_endpoint.is_some() {
			self.metadata_endpoint = other.metadata_endpoint;
		}
	}

	pub fn finalize(self) -> CredentialsConfig {
		CredentialsConfig {
			ecs: self.ecs.unwrap_or(false),
			access_key_id: self.access_key_id.filter(|s| !s.is_empty()),
			access_key_secret: self.access_key_secret.filter(|s| !s.is_empty()),
			sts_token: self.sts_token.filter(|s| !s.is_empty()),
			token_file_path: PathBuf::from(
				self
					.token_file_path
					.unwrap_or_else(|| DEFAULT_TOKEN_FILE_PATH.to_string()),
			),
			metadata_endpoint: self
				.metadata_endpoint
				.unwrap_or_else(|| DEFAULT_METADATA_ENDPOINT.to_string()),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialsConfig {
	/// Take credentials from the token file or the instance-metadata service.
	pub ecs: bool,
	pub access_key_id: Option<String>,
	pub access_key_secret: Option<SecretString>,
	pub sts_token: Option<SecretString>,
	pub token_file_path: PathBuf,
	pub metadata_endpoint: String,
}

impl Default for CredentialsConfig {
	fn default() -> Self {
		CredentialsConfigLayer::default().finalize()
	}
}

impl CredentialsConfig {
	pub fn has_static_keys(&self) -> bool {
		self.access_key_id.is_some() && self.access_key_secret.is_some()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_values() {
		let config = CredentialsConfig::default();
		assert!(!config.ecs);
		assert!(!config.has_static_keys());
		assert_eq!(
			config.token_file_path,
			PathBuf::from("/var/addon/token-config")
		);
	}

	#[test]
	fn test_empty_keys_are_treated_as_absent() {
		let config = CredentialsConfigLayer {
			access_key_id: Some(String::new()),
			access_key_secret: Some(SecretString::from("")),
			..Default::default()
		}
		.finalize();
		assert!(config.access_key_id.is_none());
		assert!(config.access_key_secret.is_none());
	}

	#[test]
	fn test_debug_does_not_leak_secret() {
		let config = CredentialsConfigLayer {
			access_key_id: Some("LTAIexample".to_string()),
			access_key_secret: Some(SecretString::from("very-secret")),
			sts_token: Some(SecretString::from("sts-token")),
			..Default::default()
		}
		.finalize();
		let debug = format!("{config:?}");
		assert!(!debug.contains("very-secret"));
		assert!(!debug.contains("sts-token"));
		assert!(debug.contains("LTAIexample"));
	}

	#[test]
	fn test_merge_overwrites() {
		let mut base = CredentialsConfigLayer {
			ecs: Some(false),
			token_file_path: Some("/a".to_string()),
			..Default::default()
		};
		base.merge(CredentialsConfigLayer {
			ecs: Some(true),
			..Default::default()
		});
		assert_eq!(base.ecs, Some(true));
		assert_eq!(base.token_file_path.as_deref(), Some("/a"));
	}
}
