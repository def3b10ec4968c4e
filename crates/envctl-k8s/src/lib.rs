// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Kubernetes adapters: an [`EventSink`](envctl_reconciler::EventSink) that
//! writes core/v1 events and a [`ContainerDiscovery`](envctl_controller::ContainerDiscovery)
//! over the pods on this node.

mod discovery;
mod error;
mod events;

pub use discovery::{descriptors_from_pod, KubePodDiscovery};
pub use error::{K8sError, K8sResult};
pub use events::{build_event, EventTarget, KubeEventSink, EVENT_COMPONENT};

/// Client from in-cluster config or the local kubeconfig.
pub async fn client() -> K8sResult<kube::Client> {
	kube::Client::try_default()
		.await
		.map_err(|e| K8sError::ClientConfig {
			message: e.to_string(),
		})
}
