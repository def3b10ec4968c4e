// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the envctl controller.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - The agent's historical `ALICLOUD_LOG_*` environment variable names
//! - Cross-field validation once layers are merged
//!
//! # Usage
//!
//! ```ignore
//! use envctl_config::load_config;
//!
//! let config = load_config()?;
//! if !config.env_config.enabled {
//!     return Ok(());
//! }
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::{ConfigError, ConfigResult};
pub use layer::ControllerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved controller configuration.
#[derive(Debug, Clone, Default)]
pub struct ControllerConfig {
	pub env_config: EnvConfigConfig,
	pub log_service: LogServiceConfig,
	pub credentials: CredentialsConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`ALICLOUD_LOG_*`, `ENVCTL_*`)
/// 2. Config file (`ENVCTL_CONFIG_FILE`, else `/etc/envctl/controller.toml`)
/// 3. Built-in defaults
pub fn load_config() -> ConfigResult<ControllerConfig> {
	let toml = match std::env::var("ENVCTL_CONFIG_FILE") {
		Ok(path) if !path.is_empty() => TomlSource::new(path),
		_ => TomlSource::system(),
	};
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(toml),
		Box::new(EnvSource::process()),
	])
}

/// Merge the given sources in precedence order and finalize.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> ConfigResult<ControllerConfig> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ControllerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: ControllerConfigLayer) -> ConfigResult<ControllerConfig> {
	let config = ControllerConfig {
		env_config: layer.env_config.unwrap_or_default().finalize(),
		log_service: layer.log_service.unwrap_or_default().finalize(),
		credentials: layer.credentials.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		enabled = config.env_config.enabled,
		k8s_events = config.env_config.k8s_events,
		endpoint = %config.log_service.endpoint,
		region = %config.log_service.region,
		default_project = %config.log_service.default_project,
		default_machine_group = %config.log_service.default_machine_group,
		ecs = config.credentials.ecs,
		"Controller configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &ControllerConfig) -> ConfigResult<()> {
	if !config.env_config.enabled {
		return Ok(());
	}

	if config.log_service.default_project.is_empty() {
		return Err(ConfigError::Missing(
			"ALICLOUD_LOG_DEFAULT_PROJECT (log_service.default_project)".to_string(),
		));
	}
	if config.log_service.default_machine_group.is_empty() {
		return Err(ConfigError::Missing(
			"ALICLOUD_LOG_DEFAULT_MACHINE_GROUP (log_service.default_machine_group)".to_string(),
		));
	}
	if !config.credentials.ecs && !config.credentials.has_static_keys() {
		return Err(ConfigError::Validation(
			"ALICLOUD_LOG_ECS_FLAG is off and no static access key is configured. \
			 Set ALICLOUD_LOG_ACCESS_KEY_ID and ALICLOUD_LOG_ACCESS_KEY_SECRET, or enable \
			 ALICLOUD_LOG_ECS_FLAG."
				.to_string(),
		));
	}

	Ok(())
}
