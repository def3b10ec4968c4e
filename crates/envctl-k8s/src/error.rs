// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

use envctl_controller::ControllerError;

/// Result type alias for K8s operations.
pub type K8sResult<T> = Result<T, K8sError>;

/// Errors that can occur during K8s operations.
#[derive(Error, Debug)]
pub enum K8sError {
	#[error("K8s API error: {message}")]
	ApiError { message: String },

	#[error("K8s client configuration error: {message}")]
	ClientConfig { message: String },

	#[error("missing environment variable {name}")]
	MissingEnv { name: &'static str },
}

impl From<kube::Error> for K8sError {
	fn from(err: kube::Error) -> Self {
		K8sError::ApiError {
			message: err.to_string(),
		}
	}
}

impl From<K8sError> for ControllerError {
	fn from(err: K8sError) -> Self {
		ControllerError::Discovery(err.to_string())
	}
}
