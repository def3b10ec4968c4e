// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use envctl_sls::{LogstoreMode, LogtailConfig, OutputDetail, OUTPUT_TYPE_LOG_SERVICE};

/// Collection input kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InputType {
	/// Plugin input; container stdout/stderr is collected this way.
	Plugin,
	File,
	/// Whatever a literal `detail` config declared.
	Other(String),
}

impl InputType {
	pub fn from_wire(value: &str) -> Self {
		match value {
			"plugin" => InputType::Plugin,
			"file" => InputType::File,
			other => InputType::Other(other.to_string()),
		}
	}

	pub fn as_wire(&self) -> &str {
		match self {
			InputType::Plugin => "plugin",
			InputType::File => "file",
			InputType::Other(value) => value,
		}
	}
}

impl fmt::Display for InputType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_wire())
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogtailConfigDetail {
	pub config_name: String,
	pub input_type: InputType,
	pub input_detail: Map<String, Value>,
}

/// Identity of a spec in the desired-state map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpecKey {
	pub project: String,
	pub config_name: String,
	pub container_name: String,
}

impl fmt::Display for SpecKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}@{}@{}",
			self.project, self.config_name, self.container_name
		)
	}
}

/// Desired state for one collection config.
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfigSpec {
	pub project: String,
	pub logstore: String,
	pub shard_count: Option<u32>,
	/// Lifecycle in days.
	pub ttl: Option<u32>,
	pub machine_groups: Vec<String>,
	pub logtail: LogtailConfigDetail,
	pub container_name: String,
	pub hash: [u8; 32],
	pub error_count: u32,
	/// Epoch seconds.
	pub next_retry_at: i64,
	pub simple_config: bool,
	/// Epoch seconds.
	pub last_fetch_at: i64,
	pub product_code: Option<String>,
	pub product_lang: Option<String>,
	pub logstore_mode: LogstoreMode,
	/// Tags written onto the remote config.
	pub config_tags: BTreeMap<String, String>,
}

impl LogConfigSpec {
	pub fn key(&self) -> SpecKey {
		SpecKey {
			project: self.project.clone(),
			config_name: self.logtail.config_name.clone(),
			container_name: self.container_name.clone(),
		}
	}

	pub fn config_name(&self) -> &str {
		&self.logtail.config_name
	}

	pub fn hash_hex(&self) -> String {
		hex::encode(self.hash)
	}

	/// The machine group the config is applied to.
	pub fn machine_group<'a>(&'a self, default: &'a str) -> &'a str {
		self.machine_groups
			.iter()
			.map(|g| g.trim())
			.find(|g| !g.is_empty())
			.unwrap_or(default)
	}

	/// Remote representation written to the Log Service.
	pub fn to_logtail_config(&self) -> LogtailConfig {
		LogtailConfig {
			config_name: self.logtail.config_name.clone(),
			input_type: self.logtail.input_type.as_wire().to_string(),
			input_detail: self.logtail.input_detail.clone(),
			output_type: OUTPUT_TYPE_LOG_SERVICE.to_string(),
			output_detail: OutputDetail {
				project_name: self.project.clone(),
				logstore_name: self.logstore.clone(),
			},
			log_sample: None,
		}
	}
}
