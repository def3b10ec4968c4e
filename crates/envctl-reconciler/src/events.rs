// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Operator-facing events emitted for every reconciliation step.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use tracing::{info, warn};

use envctl_envconfig::LogConfigSpec;
use envctl_sls::ErrorDetail;

pub type Annotations = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventAction {
	UpdateConfig,
	CreateLogstore,
	CreateProject,
	CreateTag,
	CreateProductLogstore,
}

impl EventAction {
	pub fn as_str(&self) -> &'static str {
		match self {
			EventAction::UpdateConfig => "UpdateConfig",
			EventAction::CreateLogstore => "CreateLogstore",
			EventAction::CreateProject => "CreateProject",
			EventAction::CreateTag => "CreateTag",
			EventAction::CreateProductLogstore => "CreateProductLogstore",
		}
	}
}

impl fmt::Display for EventAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
	Normal,
	Warning,
}

/// Destination for reconciliation events.
#[async_trait]
pub trait EventSink: Send + Sync {
	async fn normal(&self, action: EventAction, annotations: Annotations, message: &str);

	async fn warning(&self, action: EventAction, annotations: Annotations, message: &str);
}

/// Annotations describing the resource an event is about.
pub fn annotations_for(
	spec: Option<&LogConfigSpec>,
	project: &str,
	logstore: &str,
	product: &str,
	config: &str,
) -> Annotations {
	let mut annotations = Annotations::new();
	let mut put = |key: &str, value: &str| {
		if !value.is_empty() {
			annotations.insert(key.to_string(), value.to_string());
		}
	};
	put("project", project);
	put("logstore", logstore);
	put("product", product);
	put("config", config);
	if let Some(spec) = spec {
		put("container", &spec.container_name);
		put("hash", &spec.hash_hex());
	}
	annotations
}

/// Add the classified error fields to `annotations`.
pub fn with_error(mut annotations: Annotations, detail: &ErrorDetail) -> Annotations {
	if let Some(status) = detail.http_status {
		annotations.insert("http_code".to_string(), status.to_string());
	}
	annotations.insert("error_code".to_string(), detail.code.clone());
	annotations.insert("error_message".to_string(), detail.message.clone());
	annotations.insert("request_id".to_string(), detail.request_id.clone());
	annotations
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
	async fn normal(&self, _: EventAction, _: Annotations, _: &str) {}

	async fn warning(&self, _: EventAction, _: Annotations, _: &str) {}
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventSink;

#[async_trait]
impl EventSink for LoggingEventSink {
	async fn normal(&self, action: EventAction, annotations: Annotations, message: &str) {
		info!(action = %action, annotations = ?annotations, "{message}");
	}

	async fn warning(&self, action: EventAction, annotations: Annotations, message: &str) {
		warn!(action = %action, annotations = ?annotations, "{message}");
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
	pub kind: EventKind,
	pub action: EventAction,
	pub annotations: Annotations,
	pub message: String,
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
	events: Mutex<Vec<RecordedEvent>>,
}

impl MemoryEventSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn events(&self) -> Vec<RecordedEvent> {
		self.events
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.clone()
	}

	pub fn count(&self, kind: EventKind, action: EventAction) -> usize {
		self.events()
			.iter()
			.filter(|e| e.kind == kind && e.action == action)
			.count()
	}

	fn record(&self, kind: EventKind, action: EventAction, annotations: Annotations, message: &str) {
		self.events
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.push(RecordedEvent {
				kind,
				action,
				annotations,
				message: message.to_string(),
			});
	}
}

#[async_trait]
impl EventSink for MemoryEventSink {
	async fn normal(&self, action: EventAction, annotations: Annotations, message: &str) {
		self.record(EventKind::Normal, action, annotations, message);
	}

	async fn warning(&self, action: EventAction, annotations: Annotations, message: &str) {
		self.record(EventKind::Warning, action, annotations, message);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn annotations_skip_empty_values() {
		let annotations = annotations_for(None, "p", "l", "", "c");
		assert_eq!(annotations.len(), 3);
		assert!(!annotations.contains_key("product"));
	}

	#[test]
	fn error_fields_are_added() {
		let detail = ErrorDetail {
			http_status: Some(403),
			code: "Unauthorized".to_string(),
			request_id: "r-1".to_string(),
			message: "denied".to_string(),
		};
		let annotations = with_error(annotations_for(None, "p", "", "", ""), &detail);
		assert_eq!(annotations["http_code"], "403");
		assert_eq!(annotations["error_code"], "Unauthorized");
		assert_eq!(annotations["request_id"], "r-1");
	}

	#[tokio::test]
	async fn memory_sink_records_in_order() {
		let sink = MemoryEventSink::new();
		sink.normal(EventAction::CreateProject, Annotations::new(), "ok")
			.await;
		sink.warning(EventAction::CreateTag, Annotations::new(), "bad")
			.await;
		let events = sink.events();
		assert_eq!(events.len(), 2);
		assert_eq!(events[1].kind, EventKind::Warning);
		assert_eq!(sink.count(EventKind::Normal, EventAction::CreateProject), 1);
	}
}
