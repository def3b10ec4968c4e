// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Signed HTTP implementation of [`LogService`].

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::{Host, Url};

use envctl_common_core::Clock;
use envctl_common_http::new_client_with_timeout;
use envctl_common_secret::scrub;
use envctl_credentials::Credential;

use crate::error::{SlsError, SlsResult, CODE_CONFIG_NOT_EXIST};
use crate::refresh::ClientFactory;
use crate::service::LogService;
use crate::signer::{percent_encode, sign_log_request, sign_rpc, LogRequest};
use crate::types::{
	IndexSpec, LogstoreSpec, LogtailConfig, MachineGroupSpec, ProductLogstoreRequest, ResourceType,
	Tag,
};

const REQUEST_ID_HEADER: &str = "x-log-requestid";
const PRODUCT_API_VERSION: &str = "2020-12-30";
const PRODUCT_ACTION: &str = "AnalyzeProductLog";
const APPLIED_CONFIGS_PAGE_SIZE: usize = 500;

/// Where requests go.
///
/// Hostname endpoints address projects as `{project}.{host}`. IP and
/// `localhost` endpoints receive the request directly and carry the project
/// in the `Host` header.
#[derive(Debug, Clone)]
pub struct Endpoint {
	scheme: String,
	authority: String,
	direct: bool,
}

impl Endpoint {
	/// Parse `host`, `host:port` or a full URL. Defaults to https.
	pub fn parse(raw: &str) -> SlsResult<Self> {
		let with_scheme = if raw.contains("://") {
			raw.to_string()
		} else {
			format!("https://{raw}")
		};
		let url = Url::parse(&with_scheme)
			.map_err(|e| SlsError::Opaque(format!("invalid endpoint {raw:?}: {e}")))?;
		let host = url
			.host()
			.ok_or_else(|| SlsError::Opaque(format!("endpoint {raw:?} has no host")))?;
		let direct = match host {
			Host::Ipv4(_) | Host::Ipv6(_) => true,
			Host::Domain(name) => name == "localhost",
		};
		let authority = match url.port() {
			Some(port) => format!("{}:{port}", url.host_str().unwrap_or_default()),
			None => url.host_str().unwrap_or_default().to_string(),
		};
		Ok(Self {
			scheme: url.scheme().to_string(),
			authority,
			direct,
		})
	}

	fn base_url(&self) -> String {
		format!("{}://{}", self.scheme, self.authority)
	}

	/// Request URL plus an explicit `Host` header when addressing directly.
	fn locate(&self, project: Option<&str>, resource: &str) -> (String, Option<String>) {
		match project {
			Some(project) if self.direct => (
				format!("{}{resource}", self.base_url()),
				Some(format!("{project}.{}", self.authority)),
			),
			Some(project) => (
				format!("{}://{project}.{}{resource}", self.scheme, self.authority),
				None,
			),
			None => (format!("{}{resource}", self.base_url()), None),
		}
	}
}

/// Static settings shared by every client the factory builds.
#[derive(Debug, Clone)]
pub struct HttpLogServiceOptions {
	pub endpoint: String,
	/// Host of the product API, or a full base URL.
	pub product_domain: String,
	pub region: String,
	pub request_timeout: Duration,
}

/// A Log Service client bound to one credential.
pub struct HttpLogService {
	client: Client,
	endpoint: Endpoint,
	product_base: String,
	region: String,
	credential: Credential,
	clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for HttpLogService {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HttpLogService")
			.field("endpoint", &self.endpoint)
			.field("region", &self.region)
			.field("access_key_id", &self.credential.access_key_id)
			.finish_non_exhaustive()
	}
}

struct ApiRequest<'a> {
	method: Method,
	project: Option<&'a str>,
	resource: String,
	query: Vec<(String, String)>,
	body: Option<serde_json::Value>,
}

impl<'a> ApiRequest<'a> {
	fn new(method: Method, project: Option<&'a str>, resource: impl Into<String>) -> Self {
		Self {
			method,
			project,
			resource: resource.into(),
			query: Vec::new(),
			body: None,
		}
	}

	fn query(mut self, key: &str, value: impl ToString) -> Self {
		self.query.push((key.to_string(), value.to_string()));
		self
	}

	fn json(mut self, body: serde_json::Value) -> Self {
		self.body = Some(body);
		self
	}
}

#[derive(Deserialize)]
struct AppliedConfigs {
	#[serde(default)]
	configs: Vec<String>,
}

impl HttpLogService {
	pub fn new(
		client: Client,
		endpoint: Endpoint,
		product_base: String,
		region: String,
		credential: Credential,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			client,
			endpoint,
			product_base,
			region,
			credential,
			clock,
		}
	}

	pub fn credential(&self) -> &Credential {
		&self.credential
	}

	fn secrets(&self) -> Vec<&envctl_common_secret::SecretString> {
		let mut secrets = vec![&self.credential.access_key_secret];
		if let Some(token) = &self.credential.security_token {
			secrets.push(token);
		}
		secrets
	}

	async fn call(&self, request: ApiRequest<'_>) -> SlsResult<String> {
		let body = match &request.body {
			Some(value) => serde_json::to_vec(value)
				.map_err(|e| SlsError::Opaque(format!("failed to encode request: {e}")))?,
			None => Vec::new(),
		};
		let headers = sign_log_request(
			&self.credential,
			&LogRequest {
				method: request.method.as_str(),
				resource: &request.resource,
				query: &request.query,
				body: &body,
				date: self.clock.now(),
			},
		);

		let (url, host) = self.endpoint.locate(request.project, &request.resource);
		let mut builder = self.client.request(request.method.clone(), &url);
		if !request.query.is_empty() {
			builder = builder.query(&request.query);
		}
		for (name, value) in headers {
			builder = builder.header(name, value);
		}
		if let Some(host) = host {
			builder = builder.header(reqwest::header::HOST, host);
		}
		if !body.is_empty() {
			builder = builder.body(body);
		}

		let response = builder.send().await?;
		let status = response.status();
		let request_id = response
			.headers()
			.get(REQUEST_ID_HEADER)
			.and_then(|v| v.to_str().ok())
			.map(str::to_string);
		let text = response.text().await?;

		debug!(
			method = %request.method,
			resource = %request.resource,
			status = status.as_u16(),
			request_id = request_id.as_deref().unwrap_or_default(),
			"log service call"
		);

		if status.is_success() {
			Ok(text)
		} else {
			let text = scrub(&text, &self.secrets());
			Err(SlsError::from_response(status, request_id.as_deref(), &text))
		}
	}

	/// `Ok(false)` on a not-exist answer.
	async fn exists(&self, request: ApiRequest<'_>) -> SlsResult<bool> {
		match self.call(request).await {
			Ok(_) => Ok(true),
			Err(err) if err.is_not_exist() => Ok(false),
			Err(err) => Err(err),
		}
	}

	fn rpc_params(&self, request: &ProductLogstoreRequest) -> Vec<(String, String)> {
		let now = self.clock.now();
		let region = if request.region.is_empty() {
			&self.region
		} else {
			&request.region
		};
		let mut params = vec![
			("Action".to_string(), PRODUCT_ACTION.to_string()),
			("Version".to_string(), PRODUCT_API_VERSION.to_string()),
			("Format".to_string(), "JSON".to_string()),
			(
				"AccessKeyId".to_string(),
				self.credential.access_key_id.clone(),
			),
			("SignatureMethod".to_string(), "HMAC-SHA1".to_string()),
			("SignatureVersion".to_string(), "1.0".to_string()),
			(
				"SignatureNonce".to_string(),
				uuid::Uuid::new_v4().to_string(),
			),
			(
				"Timestamp".to_string(),
				now.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
			),
			("RegionId".to_string(), region.to_string()),
			("Project".to_string(), request.project.clone()),
			("Logstore".to_string(), request.logstore.clone()),
			("CloudProduct".to_string(), request.product.clone()),
			("Lang".to_string(), request.lang.clone()),
		];
		if let Some(hot_ttl) = request.hot_ttl {
			params.push(("HotTTL".to_string(), hot_ttl.to_string()));
		}
		if let Some(token) = self.credential.security_token.as_ref().filter(|t| !t.is_empty()) {
			params.push(("SecurityToken".to_string(), token.expose().clone()));
		}
		params
	}
}

#[async_trait]
impl LogService for HttpLogService {
	async fn project_exists(&self, project: &str) -> SlsResult<bool> {
		self
			.exists(ApiRequest::new(Method::GET, Some(project), "/"))
			.await
	}

	#[instrument(skip(self, description))]
	async fn create_project(&self, project: &str, description: &str) -> SlsResult<()> {
		self
			.call(
				ApiRequest::new(Method::POST, Some(project), "/").json(json!({
					"projectName": project,
					"description": description,
				})),
			)
			.await
			.map(drop)
	}

	async fn logstore_exists(&self, project: &str, logstore: &str) -> SlsResult<bool> {
		self
			.exists(ApiRequest::new(
				Method::GET,
				Some(project),
				format!("/logstores/{logstore}"),
			))
			.await
	}

	#[instrument(skip(self, spec), fields(logstore = %spec.logstore_name))]
	async fn create_logstore(&self, project: &str, spec: &LogstoreSpec) -> SlsResult<()> {
		let body = serde_json::to_value(spec)
			.map_err(|e| SlsError::Opaque(format!("failed to encode logstore: {e}")))?;
		self
			.call(ApiRequest::new(Method::POST, Some(project), "/logstores").json(body))
			.await
			.map(drop)
	}

	#[instrument(skip(self, index))]
	async fn create_index(&self, project: &str, logstore: &str, index: &IndexSpec) -> SlsResult<()> {
		let body = serde_json::to_value(index)
			.map_err(|e| SlsError::Opaque(format!("failed to encode index: {e}")))?;
		self
			.call(
				ApiRequest::new(
					Method::POST,
					Some(project),
					format!("/logstores/{logstore}/index"),
				)
				.json(body),
			)
			.await
			.map(drop)
	}

	async fn machine_group_exists(&self, project: &str, group: &str) -> SlsResult<bool> {
		self
			.exists(ApiRequest::new(
				Method::GET,
				Some(project),
				format!("/machinegroups/{group}"),
			))
			.await
	}

	#[instrument(skip(self, group), fields(group = %group.group_name))]
	async fn create_machine_group(&self, project: &str, group: &MachineGroupSpec) -> SlsResult<()> {
		let body = serde_json::to_value(group)
			.map_err(|e| SlsError::Opaque(format!("failed to encode machine group: {e}")))?;
		self
			.call(ApiRequest::new(Method::POST, Some(project), "/machinegroups").json(body))
			.await
			.map(drop)
	}

	async fn get_config(&self, project: &str, config: &str) -> SlsResult<Option<LogtailConfig>> {
		let request = ApiRequest::new(Method::GET, Some(project), format!("/configs/{config}"));
		match self.call(request).await {
			Ok(text) => serde_json::from_str(&text)
				.map(Some)
				.map_err(|e| SlsError::Opaque(format!("malformed config {config}: {e}"))),
			Err(err) if err.code() == Some(CODE_CONFIG_NOT_EXIST) || err.http_status() == Some(404) => {
				Ok(None)
			}
			Err(err) => Err(err),
		}
	}

	#[instrument(skip(self, config), fields(config = %config.config_name))]
	async fn create_config(&self, project: &str, config: &LogtailConfig) -> SlsResult<()> {
		let body = serde_json::to_value(config)
			.map_err(|e| SlsError::Opaque(format!("failed to encode config: {e}")))?;
		self
			.call(ApiRequest::new(Method::POST, Some(project), "/configs").json(body))
			.await
			.map(drop)
	}

	#[instrument(skip(self, config), fields(config = %config.config_name))]
	async fn update_config(&self, project: &str, config: &LogtailConfig) -> SlsResult<()> {
		let body = serde_json::to_value(config)
			.map_err(|e| SlsError::Opaque(format!("failed to encode config: {e}")))?;
		self
			.call(
				ApiRequest::new(
					Method::PUT,
					Some(project),
					format!("/configs/{}", config.config_name),
				)
				.json(body),
			)
			.await
			.map(drop)
	}

	async fn list_applied_configs(&self, project: &str, group: &str) -> SlsResult<Vec<String>> {
		let text = self
			.call(
				ApiRequest::new(
					Method::GET,
					Some(project),
					format!("/machinegroups/{group}/configs"),
				)
				.query("offset", 0)
				.query("size", APPLIED_CONFIGS_PAGE_SIZE),
			)
			.await?;
		serde_json::from_str::<AppliedConfigs>(&text)
			.map(|applied| applied.configs)
			.map_err(|e| SlsError::Opaque(format!("malformed applied config list: {e}")))
	}

	#[instrument(skip(self))]
	async fn apply_config_to_machine_group(
		&self,
		project: &str,
		config: &str,
		group: &str,
	) -> SlsResult<()> {
		self
			.call(ApiRequest::new(
				Method::PUT,
				Some(project),
				format!("/machinegroups/{group}/configs/{config}"),
			))
			.await
			.map(drop)
	}

	#[instrument(skip(self, tags), fields(tag_count = tags.len()))]
	async fn tag_resources(
		&self,
		project: &str,
		resource_type: ResourceType,
		resource: &str,
		tags: &[Tag],
	) -> SlsResult<()> {
		let body = json!({
			"resourceType": resource_type.as_str(),
			"resourceId": [resource_type.resource_id(project, resource)],
			"tags": tags,
		});
		self
			.call(ApiRequest::new(Method::POST, None, "/tag").json(body))
			.await
			.map(drop)
	}

	#[instrument(skip(self))]
	async fn untag_all(
		&self,
		project: &str,
		resource_type: ResourceType,
		resource: &str,
	) -> SlsResult<()> {
		let body = json!({
			"resourceType": resource_type.as_str(),
			"resourceId": [resource_type.resource_id(project, resource)],
			"all": true,
		});
		match self
			.call(ApiRequest::new(Method::POST, None, "/untag").json(body))
			.await
		{
			Ok(_) => Ok(()),
			Err(err) if err.is_not_exist() => Ok(()),
			Err(err) => Err(err),
		}
	}

	#[instrument(skip(self, request), fields(project = %request.project, logstore = %request.logstore, product = %request.product))]
	async fn create_product_logstore(&self, request: &ProductLogstoreRequest) -> SlsResult<()> {
		let params = self.rpc_params(request);
		let signature = sign_rpc(self.credential.access_key_secret.expose(), &params);
		let mut query: Vec<String> = params
			.iter()
			.map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
			.collect();
		query.push(format!("Signature={}", percent_encode(&signature)));
		let url = format!("{}/?{}", self.product_base, query.join("&"));

		let response = self.client.get(&url).send().await?;
		let status = response.status();
		let text = response.text().await?;
		debug!(status = status.as_u16(), "product logstore call");

		if status.is_success() {
			Ok(())
		} else {
			let text = scrub(&text, &self.secrets());
			Err(SlsError::from_response(status, None, &text))
		}
	}
}

/// Builds an [`HttpLogService`] for each rotated credential.
///
/// The underlying connection pool is shared between builds.
pub struct HttpLogServiceFactory {
	client: Client,
	endpoint: Endpoint,
	product_base: String,
	region: String,
	clock: Arc<dyn Clock>,
}

impl HttpLogServiceFactory {
	pub fn new(options: &HttpLogServiceOptions, clock: Arc<dyn Clock>) -> SlsResult<Self> {
		let client = new_client_with_timeout(options.request_timeout)
			.map_err(|e| SlsError::Opaque(format!("failed to build HTTP client: {e}")))?;
		let product_base = if options.product_domain.contains("://") {
			options.product_domain.trim_end_matches('/').to_string()
		} else {
			format!("https://{}", options.product_domain.trim_end_matches('/'))
		};
		Ok(Self {
			client,
			endpoint: Endpoint::parse(&options.endpoint)?,
			product_base,
			region: options.region.clone(),
			clock,
		})
	}
}

impl ClientFactory for HttpLogServiceFactory {
	fn build(&self, credential: &Credential) -> SlsResult<Arc<dyn LogService>> {
		Ok(Arc::new(HttpLogService::new(
			self.client.clone(),
			self.endpoint.clone(),
			self.product_base.clone(),
			self.region.clone(),
			credential.clone(),
			self.clock.clone(),
		)))
	}
}
