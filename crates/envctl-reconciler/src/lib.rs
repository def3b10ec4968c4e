// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reconciliation of derived log configs against the Log Service.

mod cache;
mod error;
mod events;
mod reconciler;

pub use cache::{cache_key, ResourceCache};
pub use error::{ReconcileError, ReconcileResult};
pub use events::{
	annotations_for, with_error, Annotations, EventAction, EventKind, EventSink, LoggingEventSink,
	MemoryEventSink, NoopEventSink, RecordedEvent,
};
pub use reconciler::{
	merge_config, normalize_log_path, Reconciler, ReconcilerOptions, SpecReconciler,
	CHANNEL_TAG_KEY, CHANNEL_TAG_VALUE, DEPLOY_MODE_TAG_KEY, DEPLOY_MODE_TAG_VALUE,
	MAX_SPLIT_SHARD, PROJECT_DESCRIPTION,
};
