// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::debug;

use envctl_controller::{ContainerDiscovery, ControllerResult};
use envctl_envconfig::{ContainerDescriptor, K8sInfo};

use crate::error::K8sError;

/// One descriptor per container of a pod, carrying its literal env vars.
///
/// Env vars sourced from config maps, secrets or field refs have no literal
/// value and are skipped.
pub fn descriptors_from_pod(pod: &Pod) -> Vec<ContainerDescriptor> {
	let namespace = pod.metadata.namespace.clone().unwrap_or_default();
	let pod_name = pod.metadata.name.clone().unwrap_or_default();
	let pod_uid = pod.metadata.uid.clone().unwrap_or_default();
	let statuses = pod
		.status
		.as_ref()
		.and_then(|s| s.container_statuses.as_ref());

	let Some(spec) = pod.spec.as_ref() else {
		return Vec::new();
	};

	spec.containers
		.iter()
		.map(|container| {
			let id = statuses
				.and_then(|all| all.iter().find(|s| s.name == container.name))
				.and_then(|s| s.container_id.clone())
				.unwrap_or_else(|| format!("{pod_uid}/{}", container.name));
			let env = container
				.env
				.iter()
				.flatten()
				.filter_map(|var| var.value.clone().map(|value| (var.name.clone(), value)))
				.collect();
			let k8s = K8sInfo {
				namespace: namespace.clone(),
				pod: pod_name.clone(),
				container_name: container.name.clone(),
				pod_uid: pod_uid.clone(),
			};
			ContainerDescriptor {
				id,
				name: container.name.clone(),
				tags: k8s.tags(),
				k8s: Some(k8s),
				env,
			}
		})
		.collect()
}

/// Lists running pods scheduled on one node.
#[derive(Clone)]
pub struct KubePodDiscovery {
	api: Api<Pod>,
	node: String,
}

impl KubePodDiscovery {
	pub fn new(client: Client, node: impl Into<String>) -> Self {
		Self {
			api: Api::all(client),
			node: node.into(),
		}
	}

	fn list_params(&self) -> ListParams {
		ListParams::default().fields(&format!(
			"spec.nodeName={},status.phase=Running",
			self.node
		))
	}
}

#[async_trait]
impl ContainerDiscovery for KubePodDiscovery {
	async fn list(&self) -> ControllerResult<Vec<ContainerDescriptor>> {
		let pods = self
			.api
			.list(&self.list_params())
			.await
			.map_err(K8sError::from)?;
		let descriptors: Vec<ContainerDescriptor> =
			pods.items.iter().flat_map(descriptors_from_pod).collect();
		debug!(
			node = %self.node,
			pods = pods.items.len(),
			containers = descriptors.len(),
			"listed pods"
		);
		Ok(descriptors)
	}
}
