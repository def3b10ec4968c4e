// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reconciliation events written as core/v1 `Event` objects.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::{Api, PostParams};
use kube::Client;
use tracing::{debug, warn};

use envctl_reconciler::{Annotations, EventAction, EventKind, EventSink};

use crate::error::{K8sError, K8sResult};

pub const EVENT_COMPONENT: &str = "envctl";

/// The pod events are attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTarget {
	pub pod: String,
	pub namespace: String,
	pub node: Option<String>,
}

impl EventTarget {
	/// Read `POD_NAME`, `POD_NAMESPACE` and `NODE_NAME`.
	pub fn from_env() -> K8sResult<Self> {
		let var = |name: &'static str| {
			std::env::var(name)
				.ok()
				.filter(|v| !v.is_empty())
				.ok_or(K8sError::MissingEnv { name })
		};
		Ok(Self {
			pod: var("POD_NAME")?,
			namespace: var("POD_NAMESPACE")?,
			node: var("NODE_NAME").ok(),
		})
	}
}

/// Build the `Event` object for one reconciliation step.
pub fn build_event(
	target: &EventTarget,
	kind: EventKind,
	action: EventAction,
	annotations: Annotations,
	message: &str,
	now: DateTime<Utc>,
) -> Event {
	Event {
		metadata: ObjectMeta {
			generate_name: Some(format!("{}.", target.pod)),
			namespace: Some(target.namespace.clone()),
			annotations: Some(annotations),
			..Default::default()
		},
		involved_object: ObjectReference {
			api_version: Some("v1".to_string()),
			kind: Some("Pod".to_string()),
			name: Some(target.pod.clone()),
			namespace: Some(target.namespace.clone()),
			..Default::default()
		},
		type_: Some(
			match kind {
				EventKind::Normal => "Normal",
				EventKind::Warning => "Warning",
			}
			.to_string(),
		),
		reason: Some(action.as_str().to_string()),
		action: Some(action.as_str().to_string()),
		message: Some(message.to_string()),
		source: Some(EventSource {
			component: Some(EVENT_COMPONENT.to_string()),
			host: target.node.clone(),
		}),
		reporting_component: Some(EVENT_COMPONENT.to_string()),
		reporting_instance: Some(target.pod.clone()),
		first_timestamp: Some(Time(now)),
		last_timestamp: Some(Time(now)),
		count: Some(1),
		..Default::default()
	}
}

/// Writes events to the API server. Failures are logged and dropped.
#[derive(Clone)]
pub struct KubeEventSink {
	api: Api<Event>,
	target: EventTarget,
}

impl KubeEventSink {
	pub fn new(client: Client, target: EventTarget) -> Self {
		Self {
			api: Api::namespaced(client, &target.namespace),
			target,
		}
	}

	async fn emit(
		&self,
		kind: EventKind,
		action: EventAction,
		annotations: Annotations,
		message: &str,
	) {
		let event = build_event(&self.target, kind, action, annotations, message, Utc::now());
		match self.api.create(&PostParams::default(), &event).await {
			Ok(_) => debug!(action = %action, "event recorded"),
			Err(e) => warn!(action = %action, error = %e, "failed to record event"),
		}
	}
}

#[async_trait]
impl EventSink for KubeEventSink {
	async fn normal(&self, action: EventAction, annotations: Annotations, message: &str) {
		self.emit(EventKind::Normal, action, annotations, message).await;
	}

	async fn warning(&self, action: EventAction, annotations: Annotations, message: &str) {
		self.emit(EventKind::Warning, action, annotations, message).await;
	}
}
