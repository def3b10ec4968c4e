// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;

/// Orchestrator metadata attached to a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct K8sInfo {
	pub namespace: String,
	pub pod: String,
	pub container_name: String,
	pub pod_uid: String,
}

impl K8sInfo {
	/// Parse a dockershim container name.
	///
	/// `k8s_<container>_<pod>_<namespace>_<uid>_<attempt>`, with or without
	/// the leading `/`. Names with at least four underscores but no `k8s_`
	/// prefix are read from the first field.
	pub fn from_docker_name(name: &str) -> Option<Self> {
		let name = name.strip_prefix('/').unwrap_or(name);
		if !name.starts_with("k8s_") && name.matches('_').count() < 4 {
			return None;
		}
		let fields: Vec<&str> = name.splitn(6, '_').collect();
		let base = if fields.len() == 6 { 1 } else { 0 };
		if fields.len() < base + 4 {
			return None;
		}
		Some(Self {
			container_name: fields[base].to_string(),
			pod: fields[base + 1].to_string(),
			namespace: fields[base + 2].to_string(),
			pod_uid: fields[base + 3].to_string(),
		})
	}

	/// Meta tags attached to collected logs.
	pub fn tags(&self) -> BTreeMap<String, String> {
		BTreeMap::from([
			("_container_name_".to_string(), self.container_name.clone()),
			("_pod_name_".to_string(), self.pod.clone()),
			("_namespace_".to_string(), self.namespace.clone()),
			("_pod_uid_".to_string(), self.pod_uid.clone()),
		])
	}
}

/// A running container as reported by discovery. Read-only to the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerDescriptor {
	pub id: String,
	pub name: String,
	pub k8s: Option<K8sInfo>,
	/// Environment in declaration order.
	pub env: Vec<(String, String)>,
	pub tags: BTreeMap<String, String>,
}

impl ContainerDescriptor {
	pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			name: name.into(),
			..Default::default()
		}
	}

	/// A descriptor for a docker container, with Kubernetes metadata taken
	/// from the container name when it follows the dockershim convention.
	pub fn from_docker(
		id: impl Into<String>,
		name: impl Into<String>,
		env: Vec<(String, String)>,
	) -> Self {
		let name = name.into();
		let k8s = K8sInfo::from_docker_name(&name);
		let tags = k8s.as_ref().map(K8sInfo::tags).unwrap_or_default();
		Self {
			id: id.into(),
			name: name.trim_start_matches('/').to_string(),
			k8s,
			env,
			tags,
		}
	}

	pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.env.push((key.into(), value.into()));
		self
	}

	pub fn with_k8s(mut self, k8s: K8sInfo) -> Self {
		self.tags.extend(k8s.tags());
		self.k8s = Some(k8s);
		self
	}

	/// Container name used in spec identity: the Kubernetes container name
	/// when known.
	pub fn spec_container_name(&self) -> &str {
		match &self.k8s {
			Some(k8s) if !k8s.container_name.is_empty() => &k8s.container_name,
			_ => &self.name,
		}
	}
}
