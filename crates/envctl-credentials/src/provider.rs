// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use envctl_common_core::Clock;
use envctl_config::CredentialsConfig;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{CredentialError, CredentialResult};
use crate::metadata::MetadataProvider;
use crate::token_file::TokenFileProvider;
use crate::Credential;

/// Produces a fresh credential on each call.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
	fn name(&self) -> &'static str;

	async fn fetch(&self) -> CredentialResult<Credential>;
}

/// Returns a configured key pair verbatim.
pub struct StaticProvider {
	credential: Credential,
}

impl StaticProvider {
	pub fn new(credential: Credential) -> Self {
		Self { credential }
	}
}

#[async_trait]
impl CredentialProvider for StaticProvider {
	fn name(&self) -> &'static str {
		"static"
	}

	async fn fetch(&self) -> CredentialResult<Credential> {
		Ok(self.credential.clone())
	}
}

/// Tries each provider in order and returns the first credential obtained.
pub struct ChainProvider {
	providers: Vec<Arc<dyn CredentialProvider>>,
}

impl ChainProvider {
	pub fn new(providers: Vec<Arc<dyn CredentialProvider>>) -> Self {
		Self { providers }
	}
}

#[async_trait]
impl CredentialProvider for ChainProvider {
	fn name(&self) -> &'static str {
		"chain"
	}

	async fn fetch(&self) -> CredentialResult<Credential> {
		let mut last_error = None;
		for provider in &self.providers {
			match provider.fetch().await {
				Ok(credential) => {
					debug!(provider = provider.name(), "credential obtained");
					return Ok(credential);
				}
				Err(e) => {
					debug!(provider = provider.name(), error = %e, "credential provider failed");
					last_error = Some(e);
				}
			}
		}
		Err(last_error
			.unwrap_or_else(|| CredentialError::Unavailable("no credential providers".into())))
	}
}

/// Build the provider chain for the configured credential mode.
///
/// With the ECS flag on, the addon token file is preferred and the instance
/// metadata service is the fallback. Otherwise the static key pair is used.
pub fn build_provider(
	config: &CredentialsConfig,
	clock: Arc<dyn Clock>,
) -> CredentialResult<Arc<dyn CredentialProvider>> {
	if config.ecs {
		info!(
			token_file = %config.token_file_path.display(),
			metadata = %config.metadata_endpoint,
			"using token file and instance metadata credentials"
		);
		let token_file: Arc<dyn CredentialProvider> =
			Arc::new(TokenFileProvider::new(&config.token_file_path, clock));
		let metadata: Arc<dyn CredentialProvider> =
			Arc::new(MetadataProvider::new(config.metadata_endpoint.clone())?);
		return Ok(Arc::new(ChainProvider::new(vec![token_file, metadata])));
	}

	let (Some(access_key_id), Some(access_key_secret)) =
		(&config.access_key_id, &config.access_key_secret)
	else {
		return Err(CredentialError::Unavailable(
			"static credentials selected but no access key configured".into(),
		));
	};

	info!(access_key_id = %access_key_id, "using static credentials");
	Ok(Arc::new(StaticProvider::new(Credential {
		access_key_id: access_key_id.clone(),
		access_key_secret: access_key_secret.clone(),
		security_token: config.sts_token.clone(),
		expiration: None,
	})))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::token_file::tests::{token_file_json, KEYRING};
	use chrono::{TimeZone, Utc};
	use envctl_common_core::ManualClock;
	use envctl_common_secret::SecretString;
	use std::sync::atomic::{AtomicU32, Ordering};

	struct FailingProvider {
		calls: AtomicU32,
	}

	#[async_trait]
	impl CredentialProvider for FailingProvider {
		fn name(&self) -> &'static str {
			"failing"
		}

		async fn fetch(&self) -> CredentialResult<Credential> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			Err(CredentialError::Unavailable("down".into()))
		}
	}

	fn clock() -> Arc<dyn Clock> {
		Arc::new(ManualClock::new(
			Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
		))
	}

	#[tokio::test]
	async fn chain_returns_first_success() {
		let failing = Arc::new(FailingProvider {
			calls: AtomicU32::new(0),
		});
		let fixed: Arc<dyn CredentialProvider> = Arc::new(StaticProvider::new(Credential::fixed(
			"LTAIexample",
			SecretString::from("secret"),
		)));
		let first: Arc<dyn CredentialProvider> = failing.clone();
		let chain = ChainProvider::new(vec![first, fixed]);

		let credential = chain.fetch().await.unwrap();
		assert_eq!(credential.access_key_id, "LTAIexample");
		assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn chain_reports_last_error() {
		let failing: Arc<dyn CredentialProvider> = Arc::new(FailingProvider {
			calls: AtomicU32::new(0),
		});
		let chain = ChainProvider::new(vec![failing]);
		assert!(matches!(
			chain.fetch().await,
			Err(CredentialError::Unavailable(message)) if message == "down"
		));
	}

	#[tokio::test]
	async fn static_mode_requires_keys() {
		let result = build_provider(&CredentialsConfig::default(), clock());
		assert!(result.is_err());
	}

	#[tokio::test]
	async fn static_mode_returns_configured_keys() {
		let config = CredentialsConfig {
			access_key_id: Some("LTAIexample".into()),
			access_key_secret: Some(SecretString::from("secret")),
			sts_token: Some(SecretString::from("token")),
			..Default::default()
		};
		let provider = build_provider(&config, clock()).unwrap();
		let credential = provider.fetch().await.unwrap();
		assert_eq!(provider.name(), "static");
		assert_eq!(credential.security_token.unwrap().expose(), "token");
		assert!(credential.expiration.is_none());
	}

	#[tokio::test]
	async fn ecs_mode_prefers_token_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("token-config");
		std::fs::write(&path, token_file_json(KEYRING, "2024-05-01T12:00:00Z")).unwrap();

		let config = CredentialsConfig {
			ecs: true,
			token_file_path: path,
			metadata_endpoint: "http://127.0.0.1:9/".into(),
			..Default::default()
		};
		let provider = build_provider(&config, clock()).unwrap();
		let credential = provider.fetch().await.unwrap();
		assert_eq!(provider.name(), "chain");
		assert_eq!(credential.access_key_id, "STS.id");
	}
}
