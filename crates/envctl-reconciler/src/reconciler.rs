// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Drives Log Service resources towards a [`LogConfigSpec`].
//!
//! One reconcile runs, in order: ensure the logstore (which ensures a
//! non-default project first), upsert the config, tag it, ensure the target
//! machine group and apply the config to it. Every remote call is retried a
//! bounded number of times with a fixed delay.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use envctl_common_core::Clock;
use envctl_common_http::{retry, RetryConfig};
use envctl_envconfig::{
	is_audit_logstore, LogConfigSpec, DEFAULT_PRODUCT_LANG, DEFAULT_SHARD_COUNT, DEFAULT_TTL_DAYS,
	MAX_SHARD_COUNT, MAX_TTL_DAYS, PRODUCT_K8S_AUDIT,
};
use envctl_sls::{
	ClientHandle, IndexSpec, LogService, LogstoreSpec, LogtailConfig, MachineGroupSpec,
	ProductLogstoreRequest, ResourceType, SlsError, SlsResult, Tag, CODE_INDEX_ALREADY_EXIST,
};

use crate::cache::ResourceCache;
use crate::error::{ReconcileError, ReconcileResult};
use crate::events::{annotations_for, with_error, EventAction, EventSink};

pub const PROJECT_DESCRIPTION: &str = "k8s log project, created by alibaba cloud log controller";
pub const DEPLOY_MODE_TAG_KEY: &str = "sls.machinegroup.deploy_mode";
pub const DEPLOY_MODE_TAG_VALUE: &str = "daemonset";
pub const CHANNEL_TAG_KEY: &str = "sls.logtail.channel";
pub const CHANNEL_TAG_VALUE: &str = "ENV";
pub const MAX_SPLIT_SHARD: u32 = 32;

const FILE_COMPARE_FIELDS: [&str; 4] = [
	"logPath",
	"filePattern",
	"dockerIncludeEnv",
	"dockerIncludeLabel",
];

#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
	pub default_project: String,
	pub default_machine_group: String,
	pub region: String,
	pub cache_ttl: Duration,
	pub max_retries: u32,
	/// Delay between attempts of logstore, config and machine group calls.
	pub retry_delay: Duration,
	pub project_retry_delay: Duration,
	/// Pause between creating a logstore and creating its index.
	pub index_delay: Duration,
	pub startup_project_attempts: u32,
	pub startup_group_attempts: u32,
	pub startup_retry_delay: Duration,
}

impl ReconcilerOptions {
	pub fn new(
		default_project: impl Into<String>,
		default_machine_group: impl Into<String>,
		region: impl Into<String>,
	) -> Self {
		Self {
			default_project: default_project.into(),
			default_machine_group: default_machine_group.into(),
			region: region.into(),
			cache_ttl: Duration::from_secs(600),
			max_retries: 3,
			retry_delay: Duration::from_millis(100),
			project_retry_delay: Duration::from_secs(1),
			index_delay: Duration::from_secs(1),
			startup_project_attempts: 1,
			startup_group_attempts: 3,
			startup_retry_delay: Duration::from_secs(30),
		}
	}
}

/// Something that can bring the remote side in line with one spec.
#[async_trait]
pub trait SpecReconciler: Send + Sync {
	async fn reconcile(&self, spec: &LogConfigSpec) -> ReconcileResult<()>;
}

pub struct Reconciler {
	client: Arc<dyn ClientHandle>,
	events: Arc<dyn EventSink>,
	options: ReconcilerOptions,
	logstores: ResourceCache,
	configs: ResourceCache,
}

impl Reconciler {
	pub fn new(
		client: Arc<dyn ClientHandle>,
		events: Arc<dyn EventSink>,
		clock: Arc<dyn Clock>,
		options: ReconcilerOptions,
	) -> Self {
		Self {
			client,
			events,
			logstores: ResourceCache::new(options.cache_ttl, clock.clone()),
			configs: ResourceCache::new(options.cache_ttl, clock),
			options,
		}
	}

	/// Build a reconciler once the default project and machine group exist.
	///
	/// A default project that cannot be created only raises an alarm; a
	/// default machine group that cannot be ensured fails the call.
	pub async fn connect(
		client: Arc<dyn ClientHandle>,
		events: Arc<dyn EventSink>,
		clock: Arc<dyn Clock>,
		options: ReconcilerOptions,
	) -> ReconcileResult<Self> {
		let reconciler = Self::new(client, events, clock, options);
		reconciler.ensure_defaults().await?;
		Ok(reconciler)
	}

	pub fn options(&self) -> &ReconcilerOptions {
		&self.options
	}

	#[instrument(skip(self), fields(project = %self.options.default_project, machine_group = %self.options.default_machine_group))]
	async fn ensure_defaults(&self) -> ReconcileResult<()> {
		let project = self.options.default_project.as_str();
		let group = self.options.default_machine_group.as_str();

		let attempts = self.options.startup_project_attempts.max(1);
		for attempt in 1..=attempts {
			match self.ensure_project(project).await {
				Ok(()) => break,
				Err(e) => {
					warn!(
						alarm = "CREATE_PROJECT_ALARM",
						attempt,
						error = %e,
						"failed to ensure default project"
					);
					if attempt < attempts {
						sleep(self.options.startup_retry_delay).await;
					}
				}
			}
		}

		let attempts = self.options.startup_group_attempts.max(1);
		let mut attempt = 0;
		loop {
			attempt += 1;
			match self.ensure_machine_group(project, group).await {
				Ok(()) => return Ok(()),
				Err(e) if attempt < attempts => {
					warn!(attempt, error = %e, "failed to ensure default machine group, retrying");
					sleep(self.options.startup_retry_delay).await;
				}
				Err(e) => return Err(e),
			}
		}
	}

	async fn call<T, F, Fut>(&self, delay: Duration, f: F) -> SlsResult<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = SlsResult<T>>,
	{
		retry(&RetryConfig::fixed(self.options.max_retries, delay), f).await
	}

	#[instrument(skip(self))]
	pub async fn ensure_project(&self, project: &str) -> ReconcileResult<()> {
		let client = self.client.acquire().await;
		let delay = self.options.project_retry_delay;

		match self.call(delay, || client.project_exists(project)).await {
			Ok(true) => return Ok(()),
			Ok(false) => {}
			Err(e) => warn!(error = %e, "failed to look up project, trying to create it"),
		}

		let created = match self
			.call(delay, || client.create_project(project, PROJECT_DESCRIPTION))
			.await
		{
			Ok(()) => Ok(()),
			Err(e) => confirm_exists(client.project_exists(project), e).await,
		};

		let annotations = annotations_for(None, project, "", "", "");
		match created {
			Ok(()) => {
				info!("project created");
				self.events
					.normal(
						EventAction::CreateProject,
						annotations,
						&format!("create project {project} success"),
					)
					.await;
				Ok(())
			}
			Err(e) => {
				let detail = e.detail();
				warn!(alarm = "CREATE_PROJECT_ALARM", error = %e, "failed to create project");
				self.events
					.warning(
						EventAction::CreateProject,
						with_error(annotations, &detail),
						&format!("create project {project} failed: {detail}"),
					)
					.await;
				Err(ReconcileError::remote("create project", project, e))
			}
		}
	}

	/// Ensure a user-defined machine group named `group` exists and carries
	/// the deploy-mode tag.
	#[instrument(skip(self))]
	pub async fn ensure_machine_group(&self, project: &str, group: &str) -> ReconcileResult<()> {
		let client = self.client.acquire().await;
		let delay = self.options.retry_delay;

		let exists = self
			.call(delay, || client.machine_group_exists(project, group))
			.await
			.map_err(|e| ReconcileError::remote("get machine group", group, e))?;
		if exists {
			return Ok(());
		}

		let spec = MachineGroupSpec::user_defined(group);
		if let Err(e) = self
			.call(delay, || client.create_machine_group(project, &spec))
			.await
		{
			if !e.is_already_exist() {
				return Err(ReconcileError::remote("create machine group", group, e));
			}
		}
		info!("machine group created");

		let tags = [Tag::new(DEPLOY_MODE_TAG_KEY, DEPLOY_MODE_TAG_VALUE)];
		self.call(delay, || {
			client.tag_resources(project, ResourceType::MachineGroup, group, &tags)
		})
		.await
		.map_err(|e| ReconcileError::remote("tag machine group", group, e))
	}

	/// Ensure the spec's logstore exists, creating it and its index if not.
	///
	/// Product logstores (explicit product code, or an audit logstore name)
	/// go through the product API instead.
	#[instrument(skip(self, spec), fields(project = %spec.project, logstore = %spec.logstore))]
	pub async fn ensure_logstore(&self, spec: &LogConfigSpec) -> ReconcileResult<()> {
		let project = spec.project.as_str();
		let logstore = spec.logstore.as_str();

		if self.logstores.contains(project, logstore) {
			debug!("logstore cached");
			return Ok(());
		}

		if let Some(product) = spec.product_code.as_deref().filter(|p| !p.is_empty()) {
			let lang = spec
				.product_lang
				.as_deref()
				.filter(|l| !l.is_empty())
				.unwrap_or(DEFAULT_PRODUCT_LANG);
			return self.create_product_logstore(spec, product, lang, None).await;
		}
		if is_audit_logstore(logstore) {
			return self
				.create_product_logstore(spec, PRODUCT_K8S_AUDIT, DEFAULT_PRODUCT_LANG, Some(0))
				.await;
		}

		if project != self.options.default_project {
			self.ensure_project(project).await?;
		}

		let client = self.client.acquire().await;
		let delay = self.options.retry_delay;

		match self.call(delay, || client.logstore_exists(project, logstore)).await {
			Ok(true) => {
				self.logstores.insert(project, logstore);
				return Ok(());
			}
			Ok(false) => {}
			Err(e) => warn!(error = %e, "failed to look up logstore, trying to create it"),
		}

		let request = logstore_request(spec);
		let created = match self
			.call(delay, || client.create_logstore(project, &request))
			.await
		{
			Ok(()) => Ok(()),
			Err(e) => confirm_exists(client.logstore_exists(project, logstore), e).await,
		};

		let annotations = annotations_for(Some(spec), project, logstore, "", spec.config_name());
		if let Err(e) = created {
			let detail = e.detail();
			warn!(error = %e, "failed to create logstore");
			self.events
				.warning(
					EventAction::CreateLogstore,
					with_error(annotations, &detail),
					&format!("create logstore {logstore} failed: {detail}"),
				)
				.await;
			return Err(ReconcileError::remote("create logstore", logstore, e));
		}

		info!(
			ttl = request.ttl,
			shard_count = request.shard_count,
			mode = request.mode.as_str(),
			"logstore created"
		);
		self.logstores.insert(project, logstore);
		self.events
			.normal(
				EventAction::CreateLogstore,
				annotations,
				&format!("create logstore {logstore} success"),
			)
			.await;

		sleep(self.options.index_delay).await;
		self.create_index(client.as_ref(), project, logstore, &request)
			.await;
		Ok(())
	}

	async fn create_index(
		&self,
		client: &dyn LogService,
		project: &str,
		logstore: &str,
		request: &LogstoreSpec,
	) {
		let index = IndexSpec::default_k8s(request.mode);
		match self
			.call(self.options.retry_delay, || {
				client.create_index(project, logstore, &index)
			})
			.await
		{
			Ok(()) => info!("index created"),
			Err(e) if e.code() == Some(CODE_INDEX_ALREADY_EXIST) => debug!("index already exists"),
			Err(e) => warn!(
				alarm = "CREATE_INDEX_ALARM",
				error = %e,
				"failed to create index"
			),
		}
	}

	async fn create_product_logstore(
		&self,
		spec: &LogConfigSpec,
		product: &str,
		lang: &str,
		hot_ttl: Option<u32>,
	) -> ReconcileResult<()> {
		let project = spec.project.as_str();
		let logstore = spec.logstore.as_str();
		let request = ProductLogstoreRequest {
			region: self.options.region.clone(),
			project: project.to_string(),
			logstore: logstore.to_string(),
			product: product.to_string(),
			lang: lang.to_string(),
			hot_ttl,
		};

		let client = self.client.acquire().await;
		let annotations =
			annotations_for(Some(spec), project, logstore, product, spec.config_name());
		match self
			.call(self.options.retry_delay, || {
				client.create_product_logstore(&request)
			})
			.await
		{
			Ok(()) => {
				info!(product, lang, "product logstore created");
				self.logstores.insert(project, logstore);
				self.events
					.normal(
						EventAction::CreateProductLogstore,
						annotations,
						&format!("create product {product} logstore {logstore} success"),
					)
					.await;
				Ok(())
			}
			Err(e) => {
				let detail = e.detail();
				warn!(
					alarm = "CREATE_PRODUCT_ALARM",
					product,
					error = %e,
					"failed to create product logstore"
				);
				self.events
					.warning(
						EventAction::CreateProductLogstore,
						with_error(annotations, &detail),
						&format!("create product {product} logstore {logstore} failed: {detail}"),
					)
					.await;
				Err(ReconcileError::remote("create product logstore", logstore, e))
			}
		}
	}

	/// Create the remote config, or merge the desired one into it.
	#[instrument(skip(self, spec), fields(project = %spec.project, config = %spec.config_name()))]
	pub async fn upsert_config(&self, spec: &LogConfigSpec) -> ReconcileResult<()> {
		let project = spec.project.as_str();
		let name = spec.config_name();
		let desired = spec.to_logtail_config();
		let client = self.client.acquire().await;
		let delay = self.options.retry_delay;

		let outcome = match self.call(delay, || client.get_config(project, name)).await {
			Ok(None) => match self.call(delay, || client.create_config(project, &desired)).await {
				Ok(()) => Ok("created"),
				Err(e) if e.is_already_exist() => self
					.call(delay, || client.update_config(project, &desired))
					.await
					.map(|_| "updated"),
				Err(e) => Err(e),
			},
			Ok(Some(current)) => match merge_config(current, &desired, spec.simple_config) {
				Some(merged) => self
					.call(delay, || client.update_config(project, &merged))
					.await
					.map(|_| "updated"),
				None => Ok("unchanged"),
			},
			Err(e) => Err(e),
		};

		let annotations = annotations_for(Some(spec), project, &spec.logstore, "", name);
		match outcome {
			Ok("unchanged") => {
				debug!("config up to date");
				Ok(())
			}
			Ok(outcome) => {
				info!(outcome, "config written");
				self.events
					.normal(
						EventAction::UpdateConfig,
						annotations,
						&format!("config {name} {outcome}"),
					)
					.await;
				Ok(())
			}
			Err(e) => {
				let detail = e.detail();
				warn!(error = %e, "failed to write config");
				self.events
					.warning(
						EventAction::UpdateConfig,
						with_error(annotations, &detail),
						&format!("update config {name} failed: {detail}"),
					)
					.await;
				Err(ReconcileError::remote("update config", name, e))
			}
		}
	}

	/// Replace the config's tags with the spec's tags plus the channel tag.
	#[instrument(skip(self, spec), fields(project = %spec.project, config = %spec.config_name()))]
	pub async fn tag_config(&self, spec: &LogConfigSpec) -> ReconcileResult<()> {
		let project = spec.project.as_str();
		let name = spec.config_name();
		let mut tags: Vec<Tag> = spec
			.config_tags
			.iter()
			.map(|(k, v)| Tag::new(k.as_str(), v.as_str()))
			.collect();
		tags.push(Tag::new(CHANNEL_TAG_KEY, CHANNEL_TAG_VALUE));

		let client = self.client.acquire().await;
		let delay = self.options.retry_delay;
		let result: SlsResult<()> = async {
			self.call(delay, || client.untag_all(project, ResourceType::Config, name))
				.await?;
			self.call(delay, || {
				client.tag_resources(project, ResourceType::Config, name, &tags)
			})
			.await
		}
		.await;

		let annotations = annotations_for(Some(spec), project, &spec.logstore, "", name);
		match result {
			Ok(()) => {
				self.events
					.normal(
						EventAction::CreateTag,
						annotations,
						&format!("tag config {name} success"),
					)
					.await;
				Ok(())
			}
			Err(e) => {
				let detail = e.detail();
				self.events
					.warning(
						EventAction::CreateTag,
						with_error(annotations, &detail),
						&format!("tag config {name} failed: {detail}"),
					)
					.await;
				Err(ReconcileError::remote("tag config", name, e))
			}
		}
	}

	/// Apply `config` to `group` unless it already is.
	#[instrument(skip(self))]
	pub async fn apply_config(&self, project: &str, config: &str, group: &str) -> ReconcileResult<()> {
		let client = self.client.acquire().await;
		let delay = self.options.retry_delay;

		let applied = self
			.call(delay, || client.list_applied_configs(project, group))
			.await
			.map_err(|e| ReconcileError::remote("list applied configs", group, e))?;
		if applied.iter().any(|c| c == config) {
			return Ok(());
		}

		self.call(delay, || {
			client.apply_config_to_machine_group(project, config, group)
		})
		.await
		.map_err(|e| ReconcileError::remote("apply config", config, e))?;
		info!("config applied to machine group");
		Ok(())
	}
}

#[async_trait]
impl SpecReconciler for Reconciler {
	#[instrument(skip(self, spec), fields(key = %spec.key(), hash = %spec.hash_hex()))]
	async fn reconcile(&self, spec: &LogConfigSpec) -> ReconcileResult<()> {
		let project = spec.project.as_str();
		let name = spec.config_name();
		if self.configs.contains_version(project, name, &spec.hash) {
			debug!("config verified recently");
			return Ok(());
		}

		self.ensure_logstore(spec).await?;
		self.upsert_config(spec).await?;
		if let Err(e) = self.tag_config(spec).await {
			warn!(error = %e, "failed to tag config");
		}

		let group = spec.machine_group(&self.options.default_machine_group);
		self.ensure_machine_group(project, group).await?;
		self.apply_config(project, name, group).await?;

		self.configs.insert_version(project, name, spec.hash);
		info!(machine_group = group, "config reconciled");
		Ok(())
	}
}

async fn confirm_exists<F>(check: F, err: SlsError) -> SlsResult<()>
where
	F: Future<Output = SlsResult<bool>>,
{
	match check.await {
		Ok(true) => Ok(()),
		_ => Err(err),
	}
}

fn logstore_request(spec: &LogConfigSpec) -> LogstoreSpec {
	LogstoreSpec {
		logstore_name: spec.logstore.clone(),
		ttl: spec
			.ttl
			.filter(|t| *t > 0)
			.unwrap_or(DEFAULT_TTL_DAYS)
			.min(MAX_TTL_DAYS),
		shard_count: spec
			.shard_count
			.filter(|s| *s > 0)
			.unwrap_or(DEFAULT_SHARD_COUNT)
			.min(MAX_SHARD_COUNT),
		auto_split: true,
		max_split_shard: MAX_SPLIT_SHARD,
		mode: spec.logstore_mode,
	}
}

/// Drop `**` segments and trailing separators so equivalent directory
/// spellings compare equal.
pub fn normalize_log_path(path: &str) -> String {
	let joined = path
		.split('/')
		.filter(|segment| *segment != "**")
		.collect::<Vec<_>>()
		.join("/");
	let trimmed = joined.trim_end_matches('/');
	if trimmed.is_empty() && path.starts_with('/') {
		"/".to_string()
	} else {
		trimmed.to_string()
	}
}

fn meaningful(value: Option<&Value>) -> Option<&Value> {
	value.filter(|v| match v {
		Value::Null => false,
		Value::String(s) => !s.is_empty(),
		Value::Object(map) => !map.is_empty(),
		_ => true,
	})
}

fn field_matches(field: &str, current: Option<&Value>, desired: Option<&Value>) -> bool {
	match (field, meaningful(current), meaningful(desired)) {
		("logPath", Some(Value::String(a)), Some(Value::String(b))) => {
			normalize_log_path(a) == normalize_log_path(b)
		}
		(_, a, b) => a == b,
	}
}

/// The config to write over `current`, or `None` when it already matches.
///
/// A different input type replaces the remote config wholesale. For simple
/// configs, file inputs are compared on path, pattern and container filters
/// and only those fields are overwritten, so server-side additions survive;
/// other inputs are compared on the whole input detail. Configs not owned by
/// the simple path are left alone.
pub fn merge_config(
	current: LogtailConfig,
	desired: &LogtailConfig,
	simple_config: bool,
) -> Option<LogtailConfig> {
	if current.input_type != desired.input_type {
		return Some(desired.clone());
	}
	if !simple_config {
		return None;
	}

	let mut merged = current;
	let mut changed = merged.output_detail != desired.output_detail;
	merged.output_detail = desired.output_detail.clone();

	if desired.input_type == "file" {
		for field in FILE_COMPARE_FIELDS {
			let wanted = desired.input_detail.get(field);
			if field_matches(field, merged.input_detail.get(field), wanted) {
				continue;
			}
			changed = true;
			match meaningful(wanted) {
				Some(value) => {
					merged.input_detail.insert(field.to_string(), value.clone());
				}
				None => {
					merged.input_detail.remove(field);
				}
			}
		}
	} else if merged.input_detail != desired.input_detail {
		changed = true;
		merged.input_detail = desired.input_detail.clone();
	}

	changed.then_some(merged)
}
