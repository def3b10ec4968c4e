// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

use envctl_credentials::CredentialError;
use envctl_reconciler::ReconcileError;
use envctl_sls::{RefreshError, SlsError};

#[derive(Debug, Error)]
pub enum ControllerError {
	#[error("container discovery failed: {0}")]
	Discovery(String),

	#[error(transparent)]
	Credential(#[from] CredentialError),

	#[error(transparent)]
	Refresh(#[from] RefreshError),

	#[error(transparent)]
	Client(#[from] SlsError),

	#[error(transparent)]
	Reconcile(#[from] ReconcileError),

	#[error("shutdown requested during startup")]
	Cancelled,
}

pub type ControllerResult<T> = Result<T, ControllerError>;
