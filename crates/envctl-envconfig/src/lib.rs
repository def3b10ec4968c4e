// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Log collection configs declared through container environment variables.
//!
//! A container opts in with variables such as
//! `aliyun_logs_catalina=stdout` or
//! `aliyun_logs_catalina=/usr/local/tomcat/logs/catalina.*.log` plus optional
//! `aliyun_logs_catalina_<option>` overrides. [`derive_specs`] turns one
//! [`ContainerDescriptor`] into the [`LogConfigSpec`]s it declares, each with
//! a SHA-256 content hash used for change detection.

mod derive;
mod descriptor;
mod env_info;
mod product;
mod spec;

pub use derive::{
	derive_specs, is_audit_logstore, make_spec, split_log_path, DeriveOptions, StdoutMode,
	DEFAULT_SHARD_COUNT, DEFAULT_TTL_DAYS, INVALID_FILE_PATTERN, INVALID_LOG_PATH,
	MAX_SHARD_COUNT, MAX_TTL_DAYS,
};
pub use descriptor::{ContainerDescriptor, K8sInfo};
pub use env_info::{
	group_env, parse_tag, split_env_key, EnvConfigInfo, EnvScan, OptionKey, SELF_ENV_CONFIG_FLAG,
};
pub use product::{
	apply_product_template, DEFAULT_PRODUCT_LANG, PRODUCT_INGRESS_NGINX, PRODUCT_K8S_AUDIT,
};
pub use spec::{InputType, LogConfigSpec, LogtailConfigDetail, SpecKey};
