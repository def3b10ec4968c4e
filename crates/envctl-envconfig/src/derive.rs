// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Container descriptor to [`LogConfigSpec`] derivation.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use envctl_sls::LogstoreMode;

use crate::descriptor::ContainerDescriptor;
use crate::env_info::{group_env, EnvConfigInfo, OptionKey};
use crate::product::{apply_product_template, DEFAULT_PRODUCT_LANG};
use crate::spec::{InputType, LogConfigSpec, LogtailConfigDetail};

pub const INVALID_LOG_PATH: &str = "/invalid_log_path";
pub const INVALID_FILE_PATTERN: &str = "invalid_file_pattern";

pub const DEFAULT_SHARD_COUNT: u32 = 2;
pub const MAX_SHARD_COUNT: u32 = 10;
pub const DEFAULT_TTL_DAYS: u32 = 90;
pub const MAX_TTL_DAYS: u32 = 3650;

const AUDIT_LOGSTORE_PREFIX: &str = "audit-";
const AUDIT_LOGSTORE_LEN: usize = 39;

/// Inputs to derivation that come from controller configuration.
#[derive(Debug, Clone)]
pub struct DeriveOptions {
	pub prefix: String,
	pub default_project: String,
}

/// Standard stream selector in a primary value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdoutMode {
	Both,
	StdoutOnly,
	StderrOnly,
}

impl StdoutMode {
	pub fn parse(value: &str) -> Option<Self> {
		match value {
			"stdout" => Some(StdoutMode::Both),
			"stdout-only" => Some(StdoutMode::StdoutOnly),
			"stderr-only" => Some(StdoutMode::StderrOnly),
			_ => None,
		}
	}

	fn streams(&self) -> (bool, bool) {
		match self {
			StdoutMode::Both => (true, true),
			StdoutMode::StdoutOnly => (true, false),
			StdoutMode::StderrOnly => (false, true),
		}
	}
}

/// `audit-` followed by 33 hex characters.
pub fn is_audit_logstore(name: &str) -> bool {
	name.len() == AUDIT_LOGSTORE_LEN
		&& name
			.strip_prefix(AUDIT_LOGSTORE_PREFIX)
			.is_some_and(|rest| rest.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Split a file path into directory (with trailing `/`) and basename pattern.
///
/// Paths without a separator, shorter than two characters, or ending in a
/// separator yield `Err` carrying the sentinel pair.
pub fn split_log_path(path: &str) -> Result<(String, String), (String, String)> {
	let invalid = || (INVALID_LOG_PATH.to_string(), INVALID_FILE_PATTERN.to_string());
	if path.len() < 2 {
		return Err(invalid());
	}
	match path.rfind('/') {
		Some(idx) if idx + 1 < path.len() => {
			Ok((path[..=idx].to_string(), path[idx + 1..].to_string()))
		}
		_ => Err(invalid()),
	}
}

fn clamp_option(raw: &str, default: u32, max: u32) -> u32 {
	match raw.trim().parse::<i64>() {
		Ok(n) if n > 0 => (n.min(max as i64)) as u32,
		_ => default,
	}
}

/// SHA-256 over every input that shapes the spec, including the resolved
/// tag set, which other configs on the same container contribute to.
fn content_hash(
	info: &EnvConfigInfo,
	project: &str,
	logstore: &str,
	tags: &BTreeMap<String, String>,
) -> [u8; 32] {
	let mut hasher = Sha256::new();
	let mut field = |key: &str, value: &str| {
		hasher.update(key.as_bytes());
		hasher.update(b"=");
		hasher.update(value.as_bytes());
		hasher.update(b"\n");
	};
	field("project", project);
	field("logstore", logstore);
	for key in [
		OptionKey::Product,
		OptionKey::Language,
		OptionKey::MachineGroup,
		OptionKey::Shard,
		OptionKey::Ttl,
		OptionKey::JsonFile,
		OptionKey::DockerFile,
	] {
		field(key.as_str(), info.get(key).unwrap_or_default());
	}
	let encoded_tags = serde_json::to_string(tags).unwrap_or_default();
	field(OptionKey::Tags.as_str(), &encoded_tags);
	match info.get(OptionKey::Detail) {
		Some(detail) => field("detail", detail),
		None => field("primary", info.primary().unwrap_or_default()),
	}
	hasher.finalize().into()
}

fn stdout_detail(mode: StdoutMode, env_name: &str, primary: &str) -> Map<String, Value> {
	let (stdout, stderr) = mode.streams();
	let detail = json!({
		"plugin": {
			"inputs": [{
				"type": "service_docker_stdout",
				"detail": {
					"Stdout": stdout,
					"Stderr": stderr,
					"IncludeEnv": { env_name: primary },
				}
			}],
			"global": { "AlwaysOnline": true },
		}
	});
	match detail {
		Value::Object(map) => map,
		_ => Map::new(),
	}
}

fn file_detail(env_name: &str, path: &str, json_log: bool, docker_file: bool) -> Map<String, Value> {
	let (log_path, file_pattern) = split_log_path(path).unwrap_or_else(|sentinel| {
		warn!(
			alarm = "INVALID_DOCKER_ENV_CONFIG_ALARM",
			path,
			"invalid file config, a full file path is required"
		);
		sentinel
	});
	let log_type = if json_log { "json_log" } else { "common_reg_log" };
	let detail = json!({
		"logType": log_type,
		"logPath": log_path,
		"filePattern": file_pattern,
		"dockerFile": docker_file,
		"dockerIncludeEnv": { env_name: path },
	});
	match detail {
		Value::Object(map) => map,
		_ => Map::new(),
	}
}

/// Build the spec for one valid config group.
pub fn make_spec(
	descriptor: &ContainerDescriptor,
	info: &EnvConfigInfo,
	container_tags: &BTreeMap<String, String>,
	options: &DeriveOptions,
	now: DateTime<Utc>,
) -> LogConfigSpec {
	let project = info
		.get(OptionKey::Project)
		.unwrap_or(options.default_project.as_str())
		.to_string();
	let logstore = info
		.get(OptionKey::Logstore)
		.unwrap_or(info.config_name.as_str())
		.to_string();
	let primary = info.primary().unwrap_or_default();
	let env_name = format!("{}{}", options.prefix, info.config_name);

	let product_code = info.get(OptionKey::Product).map(str::to_string);
	let product_lang = product_code.as_ref().map(|_| {
		info.get(OptionKey::Language)
			.unwrap_or(DEFAULT_PRODUCT_LANG)
			.to_string()
	});

	let (input_type, input_detail, simple_config) = match info.get(OptionKey::Detail) {
		Some(raw) => {
			let detail = match serde_json::from_str::<Value>(raw) {
				Ok(Value::Object(map)) => map,
				Ok(_) | Err(_) => {
					warn!(
						alarm = "INVALID_DOCKER_ENV_CONFIG_ALARM",
						config = %info.config_name,
						"env config detail is not a JSON object"
					);
					Map::new()
				}
			};
			(InputType::from_wire(primary), detail, false)
		}
		None => {
			let mut detail;
			let input_type;
			if let Some(mode) = StdoutMode::parse(primary) {
				input_type = InputType::Plugin;
				detail = stdout_detail(mode, &env_name, primary);
			} else {
				let json_log = matches!(info.get(OptionKey::JsonFile), Some("true" | "TRUE"))
					|| is_audit_logstore(&logstore);
				let docker_file = !matches!(info.get(OptionKey::DockerFile), Some("false" | "FALSE"));
				input_type = InputType::File;
				detail = file_detail(&env_name, primary, json_log, docker_file);
			}
			if let Some(product) = &product_code {
				apply_product_template(product, &mut detail);
			}
			(input_type, detail, true)
		}
	};

	let hash = content_hash(info, &project, &logstore, container_tags);
	debug!(
		config = %info.config_name,
		container = descriptor.spec_container_name(),
		hash = %hex::encode(hash),
		"derived env config"
	);

	LogConfigSpec {
		shard_count: info
			.get(OptionKey::Shard)
			.map(|raw| clamp_option(raw, DEFAULT_SHARD_COUNT, MAX_SHARD_COUNT)),
		ttl: info
			.get(OptionKey::Ttl)
			.map(|raw| clamp_option(raw, DEFAULT_TTL_DAYS, MAX_TTL_DAYS)),
		machine_groups: info
			.get(OptionKey::MachineGroup)
			.map(|raw| raw.split(',').map(str::to_string).collect())
			.unwrap_or_default(),
		logtail: LogtailConfigDetail {
			config_name: info.config_name.clone(),
			input_type,
			input_detail,
		},
		container_name: descriptor.spec_container_name().to_string(),
		hash,
		error_count: 0,
		next_retry_at: 0,
		simple_config,
		last_fetch_at: now.timestamp(),
		product_code,
		product_lang,
		logstore_mode: LogstoreMode::Standard,
		config_tags: container_tags.clone(),
		project,
		logstore,
	}
}

/// Every spec a container declares.
///
/// Containers that mark themselves self-configured contribute nothing unless
/// `is_self` is set, i.e. the descriptor is the agent's own.
pub fn derive_specs(
	descriptor: &ContainerDescriptor,
	options: &DeriveOptions,
	is_self: bool,
	now: DateTime<Utc>,
) -> Vec<LogConfigSpec> {
	let scan = group_env(&descriptor.env, &options.prefix);
	if scan.self_configured && !is_self {
		debug!(container = %descriptor.name, "skipping self-configured container");
		return Vec::new();
	}

	scan.configs
		.values()
		.filter(|info| info.is_valid())
		.map(|info| make_spec(descriptor, info, &scan.tags, options, now))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use proptest::prelude::*;

	const PREFIX: &str = "aliyun_logs_";

	fn options() -> DeriveOptions {
		DeriveOptions {
			prefix: PREFIX.to_string(),
			default_project: "P".to_string(),
		}
	}

	fn now() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
	}

	fn container(env: &[(&str, &str)]) -> ContainerDescriptor {
		let mut descriptor = ContainerDescriptor::new("id-1", "tomcat");
		for (k, v) in env {
			descriptor = descriptor.with_env(*k, *v);
		}
		descriptor
	}

	fn only_spec(env: &[(&str, &str)]) -> LogConfigSpec {
		let mut specs = derive_specs(&container(env), &options(), false, now());
		assert_eq!(specs.len(), 1);
		specs.remove(0)
	}

	mod scenarios {
		use super::*;

		#[test]
		fn simple_stdout() {
			let spec = only_spec(&[("aliyun_logs_catalina", "stdout")]);
			assert_eq!(spec.project, "P");
			assert_eq!(spec.logstore, "catalina");
			assert!(spec.simple_config);
			assert_eq!(spec.logtail.input_type, InputType::Plugin);
			let input = &spec.logtail.input_detail["plugin"]["inputs"][0]["detail"];
			assert_eq!(input["Stdout"], true);
			assert_eq!(input["Stderr"], true);
			assert_eq!(input["IncludeEnv"]["aliyun_logs_catalina"], "stdout");
			assert_eq!(spec.last_fetch_at, now().timestamp());
		}

		#[test]
		fn stream_variants() {
			let spec = only_spec(&[("aliyun_logs_app", "stderr-only")]);
			let input = &spec.logtail.input_detail["plugin"]["inputs"][0]["detail"];
			assert_eq!(input["Stdout"], false);
			assert_eq!(input["Stderr"], true);

			let spec = only_spec(&[("aliyun_logs_app", "stdout-only")]);
			let input = &spec.logtail.input_detail["plugin"]["inputs"][0]["detail"];
			assert_eq!(input["Stdout"], true);
			assert_eq!(input["Stderr"], false);
		}

		#[test]
		fn file_with_json_flag() {
			let spec = only_spec(&[
				("aliyun_logs_catalina", "/usr/local/tomcat/logs/catalina.*.log"),
				("aliyun_logs_catalina_jsonfile", "true"),
			]);
			let detail = &spec.logtail.input_detail;
			assert_eq!(spec.logtail.input_type, InputType::File);
			assert_eq!(detail["logPath"], "/usr/local/tomcat/logs/");
			assert_eq!(detail["filePattern"], "catalina.*.log");
			assert_eq!(detail["logType"], "json_log");
			assert_eq!(detail["dockerFile"], true);
			assert_eq!(
				detail["dockerIncludeEnv"]["aliyun_logs_catalina"],
				"/usr/local/tomcat/logs/catalina.*.log"
			);
		}

		#[test]
		fn all_overrides() {
			let spec = only_spec(&[
				("aliyun_logs_catalina", "/var/log/file"),
				("aliyun_logs_catalina_project", "my-project"),
				("aliyun_logs_catalina_logstore", "my-logstore"),
				("aliyun_logs_catalina_shard", "10"),
				("aliyun_logs_catalina_ttl", "3650"),
				("aliyun_logs_catalina_machinegroup", "my-group"),
				("aliyun_logs_catalina_dockerfile", "false"),
			]);
			assert_eq!(spec.project, "my-project");
			assert_eq!(spec.logstore, "my-logstore");
			assert_eq!(spec.shard_count, Some(10));
			assert_eq!(spec.ttl, Some(3650));
			assert_eq!(spec.machine_groups, vec!["my-group".to_string()]);
			assert_eq!(spec.logtail.input_detail["dockerFile"], false);
			assert_eq!(spec.logtail.input_detail["logType"], "common_reg_log");
		}

		#[test]
		fn audit_logstore_is_json() {
			let name = "audit-cfc281c9c4ca548638a1aaa765d8f220d";
			assert!(is_audit_logstore(name));
			let key = format!("aliyun_logs_{name}");
			let spec = only_spec(&[(key.as_str(), "/var/log/audit/audit.log")]);
			assert_eq!(spec.logstore, name);
			assert_eq!(spec.logtail.input_detail["logType"], "json_log");
		}

		#[test]
		fn invalid_path_keeps_spec_with_sentinels() {
			let spec = only_spec(&[("aliyun_logs_filelogs", "invalid-file-path")]);
			assert_eq!(spec.logtail.input_detail["logPath"], INVALID_LOG_PATH);
			assert_eq!(spec.logtail.input_detail["filePattern"], INVALID_FILE_PATTERN);
		}
	}

	#[test]
	fn shard_and_ttl_are_clamped() {
		let spec = only_spec(&[
			("aliyun_logs_a", "stdout"),
			("aliyun_logs_a_shard", "64"),
			("aliyun_logs_a_ttl", "0"),
		]);
		assert_eq!(spec.shard_count, Some(MAX_SHARD_COUNT));
		assert_eq!(spec.ttl, Some(DEFAULT_TTL_DAYS));

		let spec = only_spec(&[
			("aliyun_logs_a", "stdout"),
			("aliyun_logs_a_shard", "abc"),
			("aliyun_logs_a_ttl", "99999"),
		]);
		assert_eq!(spec.shard_count, Some(DEFAULT_SHARD_COUNT));
		assert_eq!(spec.ttl, Some(MAX_TTL_DAYS));
	}

	#[test]
	fn detail_overrides_simple_config() {
		let spec = only_spec(&[
			("aliyun_logs_custom", "plugin"),
			(
				"aliyun_logs_custom_detail",
				r#"{"plugin":{"inputs":[{"type":"service_syslog"}]}}"#,
			),
		]);
		assert!(!spec.simple_config);
		assert_eq!(spec.logtail.input_type, InputType::Plugin);
		assert_eq!(
			spec.logtail.input_detail["plugin"]["inputs"][0]["type"],
			"service_syslog"
		);
	}

	#[test]
	fn malformed_detail_yields_empty_detail() {
		let spec = only_spec(&[
			("aliyun_logs_custom", "file"),
			("aliyun_logs_custom_detail", "not json"),
		]);
		assert!(spec.logtail.input_detail.is_empty());
		assert!(!spec.simple_config);
	}

	#[test]
	fn product_defaults_language() {
		let spec = only_spec(&[
			("aliyun_logs_ingress", "stdout"),
			("aliyun_logs_ingress_product", "k8s-ingress-nginx"),
		]);
		assert_eq!(spec.product_code.as_deref(), Some("k8s-ingress-nginx"));
		assert_eq!(spec.product_lang.as_deref(), Some("cn"));
		assert!(spec.logtail.input_detail["plugin"]["processors"].is_array());
	}

	#[test]
	fn tags_flow_into_config_tags() {
		let spec = only_spec(&[
			("aliyun_logs_app", "stdout"),
			("aliyun_logs_app_tags", "team=infra"),
		]);
		assert_eq!(spec.config_tags["team"], "infra");
	}

	#[test]
	fn sibling_tags_change_the_hash() {
		let hash_of_a = |team: &str| {
			let tag = format!("team={team}");
			derive_specs(
				&container(&[
					("aliyun_logs_a", "stdout"),
					("aliyun_logs_b", "stdout"),
					("aliyun_logs_b_tags", tag.as_str()),
				]),
				&options(),
				false,
				now(),
			)
			.into_iter()
			.find(|s| s.config_name() == "a")
			.map(|s| (s.config_tags, s.hash))
			.unwrap()
		};
		let (tags_x, hash_x) = hash_of_a("x");
		let (tags_y, hash_y) = hash_of_a("y");
		assert_eq!(tags_x["team"], "x");
		assert_eq!(tags_y["team"], "y");
		assert_ne!(hash_x, hash_y);
	}

	#[test]
	fn groups_without_primary_are_dropped() {
		let specs = derive_specs(
			&container(&[("aliyun_logs_a_project", "x"), ("aliyun_logs_b", "stdout")]),
			&options(),
			false,
			now(),
		);
		assert_eq!(specs.len(), 1);
		assert_eq!(specs[0].config_name(), "b");
	}

	#[test]
	fn self_configured_containers_only_count_as_self() {
		let descriptor = container(&[
			("ALICLOUD_LOG_DOCKER_ENV_CONFIG_SELF", "true"),
			("aliyun_logs_agent", "stdout"),
		]);
		assert!(derive_specs(&descriptor, &options(), false, now()).is_empty());
		assert_eq!(derive_specs(&descriptor, &options(), true, now()).len(), 1);
	}

	#[test]
	fn k8s_container_name_is_spec_identity() {
		let descriptor = ContainerDescriptor::from_docker(
			"id",
			"/k8s_web_web-7d9_default_uid-1_0",
			vec![("aliyun_logs_web".to_string(), "stdout".to_string())],
		);
		let specs = derive_specs(&descriptor, &options(), false, now());
		assert_eq!(specs[0].container_name, "web");
		assert_eq!(specs[0].key().to_string(), "P@web@web");
	}

	#[test]
	fn split_log_path_examples() {
		assert_eq!(
			split_log_path("/var/log/app.log"),
			Ok(("/var/log/".to_string(), "app.log".to_string()))
		);
		assert!(split_log_path("/var/log/").is_err());
		assert!(split_log_path("/").is_err());
		assert!(split_log_path("app.log").is_err());
	}

	fn env_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
		let keys = prop::sample::select(vec![
			"", "project", "logstore", "shard", "ttl", "machinegroup", "jsonfile", "tags",
		]);
		prop::collection::vec((keys, "[a-z0-9/._*-]{1,16}"), 1..8).prop_map(|pairs| {
			let mut env = vec![("aliyun_logs_app".to_string(), "stdout".to_string())];
			for (key, value) in pairs {
				let name = if key.is_empty() {
					"aliyun_logs_app".to_string()
				} else {
					format!("aliyun_logs_app_{key}")
				};
				env.push((name, value));
			}
			env
		})
	}

	proptest! {
		#[test]
		fn derivation_is_deterministic(env in env_strategy()) {
			let mut descriptor = ContainerDescriptor::new("id", "c");
			descriptor.env = env;
			let first = derive_specs(&descriptor, &options(), false, now());
			let second = derive_specs(&descriptor, &options(), false, now());
			prop_assert_eq!(first.len(), second.len());
			for (a, b) in first.iter().zip(second.iter()) {
				prop_assert_eq!(a.hash, b.hash);
			}
		}

		#[test]
		fn hash_changes_with_each_visible_field(
			field in prop::sample::select(vec!["", "project", "logstore", "detail", "tags"]),
			before in "[a-z]{1,8}",
			after in "[a-z]{1,8}",
		) {
			prop_assume!(before != after);
			let build = |value: &str| {
				let mut descriptor = ContainerDescriptor::new("id", "c")
					.with_env("aliyun_logs_app", "/var/log/app.log");
				let name = if field.is_empty() {
					"aliyun_logs_app".to_string()
				} else {
					format!("aliyun_logs_app_{field}")
				};
				descriptor.env.retain(|(k, _)| k != &name);
				descriptor.env.push((name, value.to_string()));
				derive_specs(&descriptor, &options(), false, now())
					.into_iter()
					.find(|s| s.config_name() == "app")
					.map(|s| s.hash)
			};
			prop_assert_ne!(build(&before), build(&after));
		}

		#[test]
		fn split_log_path_law(path in "[a-z/.*]{0,24}") {
			match split_log_path(&path) {
				Ok((dir, pattern)) => {
					prop_assert_eq!(format!("{dir}{pattern}"), path);
					prop_assert!(dir.ends_with('/'));
					prop_assert!(!pattern.is_empty());
				}
				Err((dir, pattern)) => {
					prop_assert_eq!(dir, INVALID_LOG_PATH);
					prop_assert_eq!(pattern, INVALID_FILE_PATTERN);
				}
			}
		}
	}
}
