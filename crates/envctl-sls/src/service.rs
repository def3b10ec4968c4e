// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;

use crate::error::SlsResult;
use crate::types::{
	IndexSpec, LogstoreSpec, LogtailConfig, MachineGroupSpec, ProductLogstoreRequest, ResourceType,
	Tag,
};

/// The subset of the Log Service API the controller drives.
///
/// Existence checks return `Ok(false)` for a 404-class answer and `Err` for
/// anything else, so callers can tell "absent" from "unknown".
#[async_trait]
pub trait LogService: Send + Sync {
	async fn project_exists(&self, project: &str) -> SlsResult<bool>;

	async fn create_project(&self, project: &str, description: &str) -> SlsResult<()>;

	async fn logstore_exists(&self, project: &str, logstore: &str) -> SlsResult<bool>;

	async fn create_logstore(&self, project: &str, spec: &LogstoreSpec) -> SlsResult<()>;

	async fn create_index(&self, project: &str, logstore: &str, index: &IndexSpec) -> SlsResult<()>;

	async fn machine_group_exists(&self, project: &str, group: &str) -> SlsResult<bool>;

	async fn create_machine_group(&self, project: &str, group: &MachineGroupSpec) -> SlsResult<()>;

	/// `Ok(None)` when the config does not exist.
	async fn get_config(&self, project: &str, config: &str) -> SlsResult<Option<LogtailConfig>>;

	async fn create_config(&self, project: &str, config: &LogtailConfig) -> SlsResult<()>;

	async fn update_config(&self, project: &str, config: &LogtailConfig) -> SlsResult<()>;

	/// Names of the configs currently applied to `group`.
	async fn list_applied_configs(&self, project: &str, group: &str) -> SlsResult<Vec<String>>;

	async fn apply_config_to_machine_group(
		&self,
		project: &str,
		config: &str,
		group: &str,
	) -> SlsResult<()>;

	async fn tag_resources(
		&self,
		project: &str,
		resource_type: ResourceType,
		resource: &str,
		tags: &[Tag],
	) -> SlsResult<()>;

	/// Remove every tag from a resource. A missing resource is not an error.
	async fn untag_all(
		&self,
		project: &str,
		resource_type: ResourceType,
		resource: &str,
	) -> SlsResult<()>;

	/// Instantiate a pre-canned product logstore (audit pipelines and the like).
	async fn create_product_logstore(&self, request: &ProductLogstoreRequest) -> SlsResult<()>;
}
