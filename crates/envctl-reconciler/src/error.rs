// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

use envctl_sls::{ErrorDetail, SlsError};

#[derive(Debug, Error)]
pub enum ReconcileError {
	#[error("{operation} {resource} failed: {source}")]
	Remote {
		operation: &'static str,
		resource: String,
		#[source]
		source: SlsError,
	},
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;

impl ReconcileError {
	pub fn remote(operation: &'static str, resource: impl Into<String>, source: SlsError) -> Self {
		ReconcileError::Remote {
			operation,
			resource: resource.into(),
			source,
		}
	}

	pub fn detail(&self) -> ErrorDetail {
		match self {
			ReconcileError::Remote { source, .. } => source.detail(),
		}
	}
}
