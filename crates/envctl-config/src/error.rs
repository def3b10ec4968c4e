// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

/// Why the agent configuration could not be assembled.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("{0} must be set")]
	Missing(String),

	#[error("{key}: {message}")]
	InvalidValue { key: String, message: String },

	#[error("config file {path} is not valid TOML: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("cannot read {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("inconsistent configuration: {0}")]
	Validation(String),
}

impl ConfigError {
	/// The environment variable or file the error points at, if any.
	pub fn origin(&self) -> Option<String> {
		match self {
			ConfigError::InvalidValue { key, .. } => Some(key.clone()),
			ConfigError::TomlParse { path, .. } | ConfigError::FileRead { path, .. } => {
				Some(path.display().to_string())
			}
			ConfigError::Missing(_) | ConfigError::Validation(_) => None,
		}
	}
}

pub type ConfigResult<T> = Result<T, ConfigError>;
