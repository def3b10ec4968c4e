// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Grouping of prefixed environment variables into per-config option maps.

use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Env var that marks a container as carrying the agent's own configuration.
pub const SELF_ENV_CONFIG_FLAG: &str = "ALICLOUD_LOG_DOCKER_ENV_CONFIG_SELF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptionKey {
	/// The unsuffixed variable: stdout selector or file path.
	Primary,
	Project,
	Logstore,
	Shard,
	Ttl,
	MachineGroup,
	JsonFile,
	DockerFile,
	Product,
	Language,
	Detail,
	Tags,
}

impl OptionKey {
	pub const SUFFIXED: [OptionKey; 11] = [
		OptionKey::Project,
		OptionKey::Logstore,
		OptionKey::Shard,
		OptionKey::Ttl,
		OptionKey::MachineGroup,
		OptionKey::JsonFile,
		OptionKey::DockerFile,
		OptionKey::Product,
		OptionKey::Language,
		OptionKey::Detail,
		OptionKey::Tags,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			OptionKey::Primary => "",
			OptionKey::Project => "project",
			OptionKey::Logstore => "logstore",
			OptionKey::Shard => "shard",
			OptionKey::Ttl => "ttl",
			OptionKey::MachineGroup => "machinegroup",
			OptionKey::JsonFile => "jsonfile",
			OptionKey::DockerFile => "dockerfile",
			OptionKey::Product => "product",
			OptionKey::Language => "language",
			OptionKey::Detail => "detail",
			OptionKey::Tags => "tags",
		}
	}

	/// Case-sensitive lookup of a suffix.
	pub fn from_suffix(suffix: &str) -> Option<Self> {
		Self::SUFFIXED.into_iter().find(|k| k.as_str() == suffix)
	}
}

impl fmt::Display for OptionKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// All options declared for one config name on one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfigInfo {
	pub config_name: String,
	pub items: BTreeMap<OptionKey, String>,
}

impl EnvConfigInfo {
	pub fn new(config_name: impl Into<String>) -> Self {
		Self {
			config_name: config_name.into(),
			items: BTreeMap::new(),
		}
	}

	pub fn get(&self, key: OptionKey) -> Option<&str> {
		self.items.get(&key).map(String::as_str)
	}

	pub fn primary(&self) -> Option<&str> {
		self.get(OptionKey::Primary)
	}

	/// A group is usable only with a primary entry.
	pub fn is_valid(&self) -> bool {
		self.items.contains_key(&OptionKey::Primary)
	}
}

/// Result of scanning one container's environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvScan {
	pub configs: BTreeMap<String, EnvConfigInfo>,
	/// Tags declared through `<prefix><name>_tags`.
	pub tags: BTreeMap<String, String>,
	/// The container set [`SELF_ENV_CONFIG_FLAG`].
	pub self_configured: bool,
}

/// Split a prefix-stripped variable name into config name and option key.
///
/// The suffix after the last underscore is an option key only when it is a
/// recognised one; otherwise the whole remainder is the config name.
/// Returns `None` for names ending in `_` and for empty config names.
pub fn split_env_key(remainder: &str) -> Option<(&str, OptionKey)> {
	if remainder.is_empty() || remainder.ends_with('_') {
		return None;
	}
	let (name, key) = match remainder.rfind('_') {
		Some(idx) => match OptionKey::from_suffix(&remainder[idx + 1..]) {
			Some(key) => (&remainder[..idx], key),
			None => (remainder, OptionKey::Primary),
		},
		None => (remainder, OptionKey::Primary),
	};
	if name.is_empty() {
		None
	} else {
		Some((name, key))
	}
}

/// Parse a `k=v` tag value; a bare `v` becomes `v=v`.
pub fn parse_tag(value: &str) -> (String, String) {
	match value.split_once('=') {
		Some((k, v)) => (k.to_string(), v.to_string()),
		None => (value.to_string(), value.to_string()),
	}
}

/// Group every variable starting with `prefix`.
pub fn group_env(env: &[(String, String)], prefix: &str) -> EnvScan {
	let mut scan = EnvScan::default();
	if prefix.is_empty() {
		return scan;
	}

	for (key, value) in env {
		if key == SELF_ENV_CONFIG_FLAG && (value == "true" || value == "TRUE") {
			scan.self_configured = true;
			continue;
		}
		let Some(remainder) = key.strip_prefix(prefix) else {
			continue;
		};
		let Some((name, option)) = split_env_key(remainder) else {
			debug!(env = %key, "skipping malformed env config name");
			continue;
		};

		if option == OptionKey::Tags {
			let (k, v) = parse_tag(value);
			scan.tags.insert(k, v);
		}
		scan.configs
			.entry(name.to_string())
			.or_insert_with(|| EnvConfigInfo::new(name))
			.items
			.insert(option, value.clone());
	}

	scan
}
