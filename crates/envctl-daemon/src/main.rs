// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! envctl node agent.

use std::sync::Arc;

use anyhow::Context;
use envctl_common_core::{shutdown_channel, Clock, ShutdownTrigger, SystemClock};
use envctl_config::{ControllerConfig, LoggingConfig};
use envctl_controller::{ContainerDiscovery, ControllerDeps, StaticDiscovery};
use envctl_envconfig::{ContainerDescriptor, K8sInfo};
use envctl_k8s::{EventTarget, KubeEventSink, KubePodDiscovery};
use envctl_reconciler::{EventSink, LoggingEventSink};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let config = envctl_config::load_config().context("loading configuration")?;
	init_tracing(&config.logging);

	if !config.env_config.enabled {
		info!("env config disabled, exiting");
		return Ok(());
	}

	info!(
		endpoint = %config.log_service.endpoint,
		project = %config.log_service.default_project,
		prefix = %config.env_config.prefix,
		self_env_only = config.env_config.self_env_only,
		"starting envctl"
	);

	let (trigger, shutdown) = shutdown_channel();
	tokio::spawn(wait_for_signal(trigger));

	let deps = build_deps(&config).await?;
	let controller = match envctl_controller::start(&config, deps, shutdown.clone()).await {
		Ok(controller) => controller,
		Err(envctl_controller::ControllerError::Cancelled) => {
			info!("shutdown before controller start");
			return Ok(());
		}
		Err(e) => return Err(e).context("starting controller"),
	};

	controller.run(shutdown).await;
	info!("envctl stopped");
	Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
	let registry = tracing_subscriber::registry().with(filter);
	if logging.json {
		registry
			.with(tracing_subscriber::fmt::layer().json())
			.init();
	} else {
		registry.with(tracing_subscriber::fmt::layer()).init();
	}
}

async fn build_deps(config: &ControllerConfig) -> anyhow::Result<ControllerDeps> {
	let clock: Arc<dyn Clock> = Arc::new(SystemClock);
	let needs_cluster = config.env_config.k8s_events || config.env_config.node_name.is_some();
	let client = if needs_cluster {
		Some(
			envctl_k8s::client()
				.await
				.context("connecting to the Kubernetes API")?,
		)
	} else {
		None
	};

	let events: Arc<dyn EventSink> = match (&client, config.env_config.k8s_events) {
		(Some(client), true) => {
			let target = EventTarget::from_env().context("resolving event target")?;
			Arc::new(KubeEventSink::new(client.clone(), target))
		}
		_ => Arc::new(LoggingEventSink),
	};

	let discovery: Arc<dyn ContainerDiscovery> =
		match (client, config.env_config.node_name.as_deref()) {
			(Some(client), Some(node)) => Arc::new(KubePodDiscovery::new(client, node)),
			_ => {
				warn!("NODE_NAME not set, only the agent's own environment is considered");
				Arc::new(StaticDiscovery::default())
			}
		};

	let self_descriptor = config
		.env_config
		.self_env_config
		.then(|| self_descriptor(std::env::vars()));

	Ok(ControllerDeps {
		discovery,
		events,
		clock,
		self_descriptor,
	})
}

/// The agent's own container, described from its process environment.
fn self_descriptor(vars: impl IntoIterator<Item = (String, String)>) -> ContainerDescriptor {
	let env: Vec<(String, String)> = vars.into_iter().collect();
	let lookup = |name: &str| {
		env.iter()
			.find(|(k, _)| k == name)
			.map(|(_, v)| v.clone())
			.unwrap_or_default()
	};
	let hostname = lookup("HOSTNAME");
	let pod = lookup("POD_NAME");
	let namespace = lookup("POD_NAMESPACE");

	let mut descriptor = ContainerDescriptor::new(format!("self/{hostname}"), "logtail");
	if !pod.is_empty() {
		descriptor = descriptor.with_k8s(K8sInfo {
			namespace,
			pod,
			container_name: "logtail".to_string(),
			pod_uid: lookup("POD_UID"),
		});
	}
	descriptor.env = env;
	descriptor
}

async fn wait_for_signal(trigger: ShutdownTrigger) {
	#[cfg(unix)]
	{
		use tokio::signal::unix::{signal, SignalKind};
		match signal(SignalKind::terminate()) {
			Ok(mut term) => {
				tokio::select! {
					_ = tokio::signal::ctrl_c() => {}
					_ = term.recv() => {}
				}
			}
			Err(e) => {
				warn!(error = %e, "SIGTERM handler unavailable");
				let _ = tokio::signal::ctrl_c().await;
			}
		}
	}
	#[cfg(not(unix))]
	{
		let _ = tokio::signal::ctrl_c().await;
	}
	info!("received shutdown signal");
	trigger.trigger();
}

#[cfg(test)]
mod tests {
	use super::*;

	fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[test]
	fn self_descriptor_carries_pod_metadata() {
		let descriptor = self_descriptor(vars(&[
			("HOSTNAME", "node-a"),
			("POD_NAME", "logtail-ds-x1"),
			("POD_NAMESPACE", "kube-system"),
			("aliyun_logs_agent", "stdout"),
		]));
		assert_eq!(descriptor.id, "self/node-a");
		let k8s = descriptor.k8s.as_ref().unwrap();
		assert_eq!(k8s.pod, "logtail-ds-x1");
		assert_eq!(k8s.namespace, "kube-system");
		assert_eq!(descriptor.tags["_namespace_"], "kube-system");
		assert_eq!(descriptor.env.len(), 4);
	}

	#[test]
	fn self_descriptor_outside_a_pod() {
		let descriptor = self_descriptor(vars(&[("aliyun_logs_agent", "stdout")]));
		assert!(descriptor.k8s.is_none());
		assert_eq!(descriptor.spec_container_name(), "logtail");
	}
}
