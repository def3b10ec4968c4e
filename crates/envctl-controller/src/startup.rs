// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Construction of a running [`Controller`] from configuration.
//!
//! Both the API client and the reconciler are retried with a linear backoff
//! (5s steps, capped at an hour) until they come up or shutdown is requested.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use envctl_common_core::{Backoff, Clock, LinearBackoff, Shutdown};
use envctl_config::ControllerConfig;
use envctl_credentials::build_provider;
use envctl_envconfig::ContainerDescriptor;
use envctl_reconciler::{EventSink, Reconciler, ReconcilerOptions};
use envctl_sls::{
	AutoRefreshClient, ClientHandle, HttpLogServiceFactory, HttpLogServiceOptions, RefreshOptions,
};

use crate::controller::{Controller, ControllerOptions};
use crate::discovery::ContainerDiscovery;
use crate::error::{ControllerError, ControllerResult};

pub const STARTUP_BACKOFF_STEP: Duration = Duration::from_secs(5);
pub const STARTUP_BACKOFF_MAX: Duration = Duration::from_secs(3600);

/// Collaborators handed to [`start`].
pub struct ControllerDeps {
	pub discovery: Arc<dyn ContainerDiscovery>,
	pub events: Arc<dyn EventSink>,
	pub clock: Arc<dyn Clock>,
	/// The agent's own container, when self-configuration is enabled.
	pub self_descriptor: Option<ContainerDescriptor>,
}

pub fn reconciler_options(config: &ControllerConfig) -> ReconcilerOptions {
	let log_service = &config.log_service;
	ReconcilerOptions {
		cache_ttl: Duration::from_secs(log_service.cache_expire_secs),
		max_retries: log_service.max_retries.max(1),
		..ReconcilerOptions::new(
			log_service.default_project.clone(),
			log_service.default_machine_group.clone(),
			log_service.region.clone(),
		)
	}
}

/// Build the credential-rotating HTTP client described by `config`.
pub async fn connect_client(
	config: &ControllerConfig,
	clock: Arc<dyn Clock>,
	shutdown: Shutdown,
) -> ControllerResult<Arc<dyn ClientHandle>> {
	let provider = build_provider(&config.credentials, clock.clone())?;
	let factory = HttpLogServiceFactory::new(
		&HttpLogServiceOptions {
			endpoint: config.log_service.endpoint.clone(),
			product_domain: config.log_service.product_domain.clone(),
			region: config.log_service.region.clone(),
			request_timeout: Duration::from_secs(config.log_service.request_timeout_secs),
		},
		clock.clone(),
	)?;
	let client = AutoRefreshClient::start(
		provider,
		Arc::new(factory),
		clock,
		RefreshOptions::default(),
		shutdown,
	)
	.await?;
	Ok(Arc::new(client))
}

/// Bring up the API client and the reconciler, then build the controller.
pub async fn start(
	config: &ControllerConfig,
	deps: ControllerDeps,
	shutdown: Shutdown,
) -> ControllerResult<Controller> {
	let clock = deps.clock.clone();
	let refresher_shutdown = shutdown.clone();
	start_with(config, deps, shutdown, || {
		connect_client(config, clock.clone(), refresher_shutdown.clone())
	})
	.await
}

/// [`start`] with the client construction supplied by the caller.
pub async fn start_with<F, Fut>(
	config: &ControllerConfig,
	deps: ControllerDeps,
	mut shutdown: Shutdown,
	mut connect: F,
) -> ControllerResult<Controller>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = ControllerResult<Arc<dyn ClientHandle>>>,
{
	let client = retry_until_ready("log service client", &mut shutdown, &mut connect).await?;
	info!(endpoint = %config.log_service.endpoint, "log service client ready");

	let options = reconciler_options(config);
	let reconciler = retry_until_ready("reconciler", &mut shutdown, || {
		let client = client.clone();
		let events = deps.events.clone();
		let clock = deps.clock.clone();
		let options = options.clone();
		async move {
			Reconciler::connect(client, events, clock, options)
				.await
				.map_err(ControllerError::from)
		}
	})
	.await?;
	info!(
		project = %config.log_service.default_project,
		machine_group = %config.log_service.default_machine_group,
		"reconciler ready"
	);

	Ok(Controller::new(
		deps.discovery,
		Arc::new(reconciler),
		deps.clock,
		ControllerOptions::from_config(config, deps.self_descriptor),
	))
}

async fn retry_until_ready<T, F, Fut>(
	what: &'static str,
	shutdown: &mut Shutdown,
	mut attempt: F,
) -> ControllerResult<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = ControllerResult<T>>,
{
	let mut backoff = LinearBackoff::new(STARTUP_BACKOFF_STEP, STARTUP_BACKOFF_MAX);
	loop {
		match attempt().await {
			Ok(ready) => return Ok(ready),
			Err(e) => {
				let delay = backoff.next_delay();
				warn!(
					what,
					error = %e,
					retry_in_secs = delay.as_secs(),
					"startup step failed"
				);
				tokio::select! {
					_ = shutdown.triggered() => return Err(ControllerError::Cancelled),
					_ = sleep(delay) => {}
				}
			}
		}
	}
}
