// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for credential providers.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while obtaining credentials.
///
/// Messages never carry secret material; providers scrub remote bodies before
/// building these values.
#[derive(Debug, Error)]
pub enum CredentialError {
	/// The token file does not exist.
	#[error("token file not found: {}", path.display())]
	FileMissing { path: PathBuf },

	/// The token file exists but could not be decoded or decrypted.
	#[error("malformed credential: {0}")]
	Malformed(String),

	/// The credential's expiration has already passed.
	#[error("credential expired at {expiration}")]
	Expired { expiration: DateTime<Utc> },

	/// The metadata service did not hand out a usable credential.
	#[error("credential unavailable: {0}")]
	Unavailable(String),

	/// Reading the token file failed for a reason other than absence.
	#[error("failed to read {}: {source}", path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

/// Result type for credential operations.
pub type CredentialResult<T> = Result<T, CredentialError>;
