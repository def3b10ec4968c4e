// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wire types for the Log Service REST API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Machine identification mode for groups created by the controller.
pub const MACHINE_ID_TYPE_USER_DEFINED: &str = "userdefined";

/// Output type for every logtail config the controller writes.
pub const OUTPUT_TYPE_LOG_SERVICE: &str = "LogService";

/// Token separators used by the default index.
pub const DEFAULT_INDEX_TOKENS: &[&str] = &[
	" ", "\n", "\t", "\r", ",", ";", "[", "]", "{", "}", "(", ")", "&", "^", "*", "#", "@", "~", "=",
	"<", ">", "/", "\\", "?", ":", "'", "\"",
];

/// Meta keys indexed on every logstore the controller creates.
pub const DEFAULT_INDEX_KEYS: &[&str] = &[
	"__tag__:__hostname__",
	"__tag__:__path__",
	"__tag__:_container_ip_",
	"__tag__:_container_name_",
	"__tag__:_image_name_",
	"__tag__:_namespace_",
	"__tag__:_pod_name_",
	"__tag__:_pod_uid_",
	"_container_ip_",
	"_container_name_",
	"_image_name_",
	"_namespace_",
	"_pod_name_",
	"_pod_uid_",
	"_source_",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogstoreMode {
	#[default]
	Standard,
	Query,
}

impl LogstoreMode {
	pub fn as_str(&self) -> &'static str {
		match self {
			LogstoreMode::Standard => "standard",
			LogstoreMode::Query => "query",
		}
	}
}

/// Body of `POST /logstores`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogstoreSpec {
	pub logstore_name: String,
	pub ttl: u32,
	pub shard_count: u32,
	pub auto_split: bool,
	pub max_split_shard: u32,
	pub mode: LogstoreMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexLine {
	pub token: Vec<String>,
	pub case_sensitive: bool,
	pub chn: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexKey {
	#[serde(rename = "type")]
	pub key_type: String,
	pub token: Vec<String>,
	pub case_sensitive: bool,
	pub chn: bool,
	pub doc_value: bool,
}

/// Body of `POST /logstores/{name}/index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
	pub line: IndexLine,
	pub keys: BTreeMap<String, IndexKey>,
}

impl IndexSpec {
	/// Full-text plus per-key index over the container meta tags.
	pub fn default_k8s(mode: LogstoreMode) -> Self {
		let token: Vec<String> = DEFAULT_INDEX_TOKENS.iter().map(|t| t.to_string()).collect();
		let key = IndexKey {
			key_type: "text".to_string(),
			token: token.clone(),
			case_sensitive: false,
			chn: false,
			doc_value: mode == LogstoreMode::Standard,
		};
		Self {
			line: IndexLine {
				token,
				case_sensitive: false,
				chn: false,
			},
			keys: DEFAULT_INDEX_KEYS
				.iter()
				.map(|k| (k.to_string(), key.clone()))
				.collect(),
		}
	}
}

/// Body of `POST /machinegroups`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineGroupSpec {
	pub group_name: String,
	pub machine_identify_type: String,
	#[serde(default)]
	pub group_attribute: Map<String, Value>,
	pub machine_list: Vec<String>,
}

impl MachineGroupSpec {
	/// A group identified by a user-defined id equal to its own name.
	pub fn user_defined(name: &str) -> Self {
		Self {
			group_name: name.to_string(),
			machine_identify_type: MACHINE_ID_TYPE_USER_DEFINED.to_string(),
			group_attribute: Map::new(),
			machine_list: vec![name.to_string()],
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDetail {
	#[serde(default)]
	pub project_name: String,
	#[serde(default)]
	pub logstore_name: String,
}

/// A logtail collection config as stored by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogtailConfig {
	pub config_name: String,
	pub input_type: String,
	#[serde(default)]
	pub input_detail: Map<String, Value>,
	#[serde(default = "default_output_type")]
	pub output_type: String,
	#[serde(default)]
	pub output_detail: OutputDetail,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub log_sample: Option<String>,
}

fn default_output_type() -> String {
	OUTPUT_TYPE_LOG_SERVICE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
	pub key: String,
	pub value: String,
}

impl Tag {
	pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			value: value.into(),
		}
	}
}

/// Taggable resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
	Project,
	MachineGroup,
	Config,
}

impl ResourceType {
	pub fn as_str(&self) -> &'static str {
		match self {
			ResourceType::Project => "project",
			ResourceType::MachineGroup => "machinegroup",
			ResourceType::Config => "logtailconfig",
		}
	}

	/// Resource id in the `project#name` form the tag API expects.
	pub fn resource_id(&self, project: &str, name: &str) -> String {
		match self {
			ResourceType::Project => project.to_string(),
			_ => format!("{project}#{name}"),
		}
	}
}

impl fmt::Display for ResourceType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Arguments to the product-logstore API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductLogstoreRequest {
	pub region: String,
	pub project: String,
	pub logstore: String,
	pub product: String,
	pub lang: String,
	pub hot_ttl: Option<u32>,
}
