// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, a TOML file and the environment.

use std::collections::HashMap;
use std::path::PathBuf;

use envctl_common_secret::SecretString;
use tracing::{debug, trace};

use crate::error::{ConfigError, ConfigResult};
use crate::layer::ControllerConfigLayer;
use crate::sections::{
	CredentialsConfigLayer, EnvConfigConfigLayer, LogServiceConfigLayer, LoggingConfigLayer,
};

pub const SYSTEM_CONFIG_PATH: &str = "/etc/envctl/controller.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> ConfigResult<ControllerConfigLayer>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> ConfigResult<ControllerConfigLayer> {
		debug!("loading defaults");
		Ok(ControllerConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file is not an error.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new(SYSTEM_CONFIG_PATH)
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> ConfigResult<ControllerConfigLayer> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ControllerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ControllerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Environment variable source.
///
/// Variable names follow the log agent's historical `ALICLOUD_LOG_*` names so
/// existing DaemonSet manifests keep working.
pub struct EnvSource {
	lookup: Lookup,
}

impl EnvSource {
	/// Read from the process environment.
	pub fn process() -> Self {
		Self {
			lookup: Box::new(|name| std::env::var(name).ok()),
		}
	}

	/// Read from a fixed set of variables.
	pub fn from_map(vars: HashMap<String, String>) -> Self {
		Self {
			lookup: Box::new(move |name| vars.get(name).cloned()),
		}
	}

	fn var(&self, name: &str) -> Option<String> {
		(self.lookup)(name).filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Option<bool> {
		self
			.var(name)
			.map(|v| v.eq_ignore_ascii_case("true") || v == "1")
	}

	fn u64(&self, name: &str) -> ConfigResult<Option<u64>> {
		match self.var(name) {
			Some(v) => v
				.trim()
				.parse()
				.map(Some)
				.map_err(|_| ConfigError::InvalidValue {
					key: name.to_string(),
					message: format!("invalid u64 value '{v}'"),
				}),
			None => Ok(None),
		}
	}

	/// A secret from `NAME`, or from the file named by `NAME_FILE`.
	fn secret(&self, name: &str) -> ConfigResult<Option<SecretString>> {
		let file_var = format!("{name}_FILE");
		if let Some(path) = self.var(&file_var) {
			let path = PathBuf::from(path);
			let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileRead {
				path: path.clone(),
				source: e,
			})?;
			let value = content.strip_suffix('\n').unwrap_or(&content).to_string();
			return Ok(Some(SecretString::new(value)));
		}
		Ok(self.var(name).map(SecretString::new))
	}

	fn load_env_config(&self) -> ConfigResult<EnvConfigConfigLayer> {
		Ok(EnvConfigConfigLayer {
			enabled: self.bool("ALICLOUD_LOG_DOCKER_ENV_CONFIG"),
			k8s_events: self.bool("ALICLOUD_LOG_K8S_FLAG"),
			prefix: self.var("ALICLOUD_LOG_CONFIG_PREFIX"),
			update_interval_secs: self.u64("ALICLOUD_LOG_ENV_CONFIG_UPDATE_INTERVAL")?,
			self_env_config: self.bool("ALICLOUD_LOG_DOCKER_ENV_CONFIG_SELF"),
			self_env_only: self.bool("ALICLOUD_LOG_DOCKER_ENV_CONFIG_SELF_ONLY"),
			node_name: self.var("NODE_NAME"),
		})
	}

	fn load_log_service(&self) -> ConfigResult<LogServiceConfigLayer> {
		let max_retries = self
			.u64("ALICLOUD_LOG_OPERATION_MAX_TRY")?
			.map(|v| u32::try_from(v).unwrap_or(u32::MAX));
		Ok(LogServiceConfigLayer {
			endpoint: self.var("ALICLOUD_LOG_ENDPOINT"),
			default_project: self.var("ALICLOUD_LOG_DEFAULT_PROJECT"),
			default_machine_group: self.var("ALICLOUD_LOG_DEFAULT_MACHINE_GROUP"),
			product_domain: self.var("ALICLOUD_LOG_PRODUCT_DOMAIN"),
			region: self.var("ALICLOUD_LOG_REGION"),
			cache_expire_secs: self.u64("ALICLOUD_LOG_CACHE_EXPIRE_SEC")?,
			max_retries,
			request_timeout_secs: self.u64("ALICLOUD_LOG_REQUEST_TIMEOUT_SEC")?,
		})
	}

	fn load_credentials(&self) -> ConfigResult<CredentialsConfigLayer> {
		Ok(CredentialsConfigLayer {
			ecs: self.bool("ALICLOUD_LOG_ECS_FLAG"),
			access_key_id: self.var("ALICLOUD_LOG_ACCESS_KEY_ID"),
			access_key_secret: self.secret("ALICLOUD_LOG_ACCESS_KEY_SECRET")?,
			sts_token: self.secret("ALICLOUD_LOG_STS_TOKEN")?,
			token_file_path: self.var("ALICLOUD_LOG_TOKEN_FILE_PATH"),
			metadata_endpoint: self.var("ALICLOUD_LOG_METADATA_ENDPOINT"),
		})
	}

	fn load_logging(&self) -> LoggingConfigLayer {
		LoggingConfigLayer {
			level: self.var("ENVCTL_LOG_LEVEL"),
			json: self.bool("ENVCTL_LOG_JSON"),
		}
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> ConfigResult<ControllerConfigLayer> {
		debug!("loading environment variables");
		Ok(ControllerConfigLayer {
			env_config: Some(self.load_env_config()?),
			log_service: Some(self.load_log_service()?),
			credentials: Some(self.load_credentials()?),
			logging: Some(self.load_logging()),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	fn env(vars: &[(&str, &str)]) -> EnvSource {
		EnvSource::from_map(
			vars
				.iter()
				.map(|(k, v)| (k.to_string(), v.to_string()))
				.collect(),
		)
	}

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::Environment > Precedence::ConfigFile);
		assert!(Precedence::ConfigFile > Precedence::Defaults);
	}

	#[test]
	fn test_defaults_source_returns_empty_layer() {
		let layer = DefaultsSource.load().unwrap();
		assert!(layer.log_service.is_none());
		assert!(layer.credentials.is_none());
	}

	#[test]
	fn test_toml_source_missing_file_returns_empty() {
		let layer = TomlSource::new("/nonexistent/controller.toml")
			.load()
			.unwrap();
		assert!(layer.env_config.is_none());
	}

	#[test]
	fn test_toml_source_parses_sections() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
[env_config]
enabled = true
prefix = "custom_logs_"

[log_service]
default_project = "k8s-log-c1"
"#
		)
		.unwrap();

		let layer = TomlSource::new(file.path()).load().unwrap();
		let env_config = layer.env_config.unwrap();
		assert_eq!(env_config.enabled, Some(true));
		assert_eq!(env_config.prefix.as_deref(), Some("custom_logs_"));
		assert_eq!(
			layer.log_service.unwrap().default_project.as_deref(),
			Some("k8s-log-c1")
		);
	}

	#[test]
	fn test_toml_source_reports_parse_errors() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[env_config\nenabled = ").unwrap();
		let err = TomlSource::new(file.path()).load().unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
	}

	#[test]
	fn test_env_source_reads_agent_variables() {
		let source = env(&[
			("ALICLOUD_LOG_DOCKER_ENV_CONFIG", "true"),
			("ALICLOUD_LOG_K8S_FLAG", "TRUE"),
			("ALICLOUD_LOG_ECS_FLAG", "false"),
			("ALICLOUD_LOG_DEFAULT_PROJECT", "k8s-log-c1"),
			("ALICLOUD_LOG_DEFAULT_MACHINE_GROUP", "k8s-group-c1"),
			("ALICLOUD_LOG_CACHE_EXPIRE_SEC", "30"),
			("ALICLOUD_LOG_OPERATION_MAX_TRY", "5"),
			("ALICLOUD_LOG_ACCESS_KEY_ID", "LTAIexample"),
			("ALICLOUD_LOG_ACCESS_KEY_SECRET", "very-secret"),
		]);
		let layer = source.load().unwrap();

		let env_config = layer.env_config.unwrap();
		assert_eq!(env_config.enabled, Some(true));
		assert_eq!(env_config.k8s_events, Some(true));

		let log_service = layer.log_service.unwrap();
		assert_eq!(log_service.default_project.as_deref(), Some("k8s-log-c1"));
		assert_eq!(log_service.cache_expire_secs, Some(30));
		assert_eq!(log_service.max_retries, Some(5));

		let credentials = layer.credentials.unwrap();
		assert_eq!(credentials.ecs, Some(false));
		assert_eq!(
			credentials.access_key_secret.unwrap().expose(),
			"very-secret"
		);
	}

	#[test]
	fn test_env_source_rejects_bad_numbers() {
		let source = env(&[("ALICLOUD_LOG_ENV_CONFIG_UPDATE_INTERVAL", "ten")]);
		let err = source.load().unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "ALICLOUD_LOG_ENV_CONFIG_UPDATE_INTERVAL"));
		assert_eq!(
			err.origin().as_deref(),
			Some("ALICLOUD_LOG_ENV_CONFIG_UPDATE_INTERVAL")
		);
	}

	#[test]
	fn test_env_source_reads_secret_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "secret-from-file").unwrap();
		let path = file.path().to_string_lossy().to_string();

		let source = env(&[("ALICLOUD_LOG_ACCESS_KEY_SECRET_FILE", path.as_str())]);
		let credentials = source.load().unwrap().credentials.unwrap();
		assert_eq!(
			credentials.access_key_secret.unwrap().expose(),
			"secret-from-file"
		);
	}
}
