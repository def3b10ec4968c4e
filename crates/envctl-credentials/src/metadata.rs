// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! ECS instance-metadata RAM role credentials.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use envctl_common_secret::{sanitize_for_error, scrub, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{CredentialError, CredentialResult};
use crate::provider::CredentialProvider;
use crate::Credential;

pub const METADATA_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleCredential {
	#[serde(default)]
	access_key_id: String,
	#[serde(default)]
	access_key_secret: SecretString,
	#[serde(default)]
	security_token: SecretString,
	#[serde(default)]
	expiration: String,
	#[serde(default)]
	code: String,
	#[serde(default)]
	#[allow(dead_code)]
	last_updated: String,
}

/// Reads the RAM role attached to the instance from the metadata service.
///
/// The role list endpoint returns newline-delimited role names; the first one
/// is used.
pub struct MetadataProvider {
	client: reqwest::Client,
	base_url: String,
}

impl MetadataProvider {
	pub fn new(base_url: impl Into<String>) -> CredentialResult<Self> {
		let client = envctl_common_http::new_client_with_timeout(METADATA_TIMEOUT).map_err(|e| {
			CredentialError::Unavailable(format!("failed to create HTTP client: {e}"))
		})?;
		let mut base_url = base_url.into();
		if !base_url.ends_with('/') {
			base_url.push('/');
		}
		Ok(Self { client, base_url })
	}

	async fn get_text(&self, url: &str) -> CredentialResult<String> {
		let response = self
			.client
			.get(url)
			.send()
			.await
			.map_err(|e| CredentialError::Unavailable(format!("metadata request failed: {e}")))?;

		let status = response.status();
		let body = response
			.text()
			.await
			.map_err(|e| CredentialError::Unavailable(format!("metadata body unreadable: {e}")))?;

		if !status.is_success() {
			return Err(CredentialError::Unavailable(format!(
				"metadata service returned HTTP {}: {}",
				status,
				sanitize_for_error(&body, 200)
			)));
		}
		Ok(body)
	}

	async fn role_name(&self) -> CredentialResult<String> {
		let body = self.get_text(&self.base_url).await?;
		body
			.lines()
			.map(str::trim)
			.find(|line| !line.is_empty())
			.map(str::to_string)
			.ok_or_else(|| CredentialError::Unavailable("no RAM role attached to instance".into()))
	}
}

#[async_trait]
impl CredentialProvider for MetadataProvider {
	fn name(&self) -> &'static str {
		"instance-metadata"
	}

	#[instrument(skip(self), fields(base_url = %self.base_url))]
	async fn fetch(&self) -> CredentialResult<Credential> {
		let role = self.role_name().await?;
		let body = self.get_text(&format!("{}{}", self.base_url, role)).await?;

		let parsed: RoleCredential = serde_json::from_str(&body).map_err(|e| {
			CredentialError::Unavailable(format!("role credential is not valid JSON: {e}"))
		})?;

		if !parsed.code.eq_ignore_ascii_case("success") {
			let diagnostic = scrub(
				&sanitize_for_error(&body, 512),
				&[&parsed.access_key_secret, &parsed.security_token],
			);
			warn!(role = %role, code = %parsed.code, "metadata service refused credentials");
			return Err(CredentialError::Unavailable(format!(
				"role {role} returned code {}: {diagnostic}",
				parsed.code
			)));
		}

		let expiration = DateTime::parse_from_rfc3339(parsed.expiration.trim())
			.map(|dt| dt.with_timezone(&Utc))
			.map_err(|e| {
				CredentialError::Unavailable(format!(
					"invalid expiration '{}': {e}",
					parsed.expiration
				))
			})?;

		debug!(role = %role, expiration = %expiration, "obtained role credential");

		Ok(Credential {
			access_key_id: parsed.access_key_id,
			access_key_secret: parsed.access_key_secret,
			security_token: Some(parsed.security_token).filter(|t| !t.is_empty()),
			expiration: Some(expiration),
		})
	}
}

impl std::fmt::Debug for MetadataProvider {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MetadataProvider")
			.field("base_url", &self.base_url)
			.finish()
	}
}
