// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Log Service error types and classification.

use envctl_common_http::{is_retryable_status, RetryableError};
use envctl_common_secret::sanitize_for_error;
use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

pub const CODE_PROJECT_NOT_EXIST: &str = "ProjectNotExist";
pub const CODE_LOGSTORE_NOT_EXIST: &str = "LogStoreNotExist";
pub const CODE_MACHINE_GROUP_NOT_EXIST: &str = "MachineGroupNotExist";
pub const CODE_CONFIG_NOT_EXIST: &str = "ConfigNotExist";
pub const CODE_INDEX_ALREADY_EXIST: &str = "IndexAlreadyExist";

static ERROR_CODE_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"ErrorCode:\s*([^\s,]+)").unwrap());
static REQUEST_ID_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"RequestId:\s*([^\s,]+)").unwrap());
static MESSAGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Message:\s*([^\n]+)").unwrap());

/// Structured fields extracted from any Log Service failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDetail {
	pub http_status: Option<u16>,
	pub code: String,
	pub request_id: String,
	pub message: String,
}

impl fmt::Display for ErrorDetail {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if let Some(status) = self.http_status {
			write!(f, "HTTP {status} ")?;
		}
		write!(f, "{}: {}", self.code, self.message)?;
		if !self.request_id.is_empty() {
			write!(f, " (request {})", self.request_id)?;
		}
		Ok(())
	}
}

/// Errors returned by [`crate::LogService`] implementations.
#[derive(Debug, Error)]
pub enum SlsError {
	/// The service answered with a structured error body.
	#[error("Log Service error: {0}")]
	Api(ErrorDetail),

	/// The request never produced a response.
	#[error("transport error: {message}")]
	Transport { message: String, retryable: bool },

	/// Anything else: unparseable bodies, client construction failures.
	#[error("{0}")]
	Opaque(String),
}

/// Result type for Log Service operations.
pub type SlsResult<T> = Result<T, SlsError>;

#[derive(Deserialize)]
struct ApiErrorBody {
	#[serde(alias = "errorCode", alias = "Code")]
	code: String,
	#[serde(default, alias = "errorMessage", alias = "Message")]
	message: String,
	#[serde(default, alias = "requestID", alias = "RequestId")]
	request_id: String,
}

impl SlsError {
	/// Build an error from a non-2xx response.
	pub fn from_response(status: StatusCode, request_id: Option<&str>, body: &str) -> Self {
		match serde_json::from_str::<ApiErrorBody>(body) {
			Ok(parsed) => SlsError::Api(ErrorDetail {
				http_status: Some(status.as_u16()),
				code: parsed.code,
				request_id: request_id
					.map(str::to_string)
					.filter(|id| !id.is_empty())
					.unwrap_or(parsed.request_id),
				message: parsed.message,
			}),
			Err(_) => SlsError::Opaque(format!(
				"HTTP {}: {}",
				status.as_u16(),
				sanitize_for_error(body, 512)
			)),
		}
	}

	/// The structured view of this error.
	pub fn detail(&self) -> ErrorDetail {
		classify(self)
	}

	pub fn code(&self) -> Option<&str> {
		match self {
			SlsError::Api(detail) => Some(detail.code.as_str()),
			_ => None,
		}
	}

	pub fn http_status(&self) -> Option<u16> {
		match self {
			SlsError::Api(detail) => detail.http_status,
			_ => None,
		}
	}

	/// A 404-class answer, or a `*NotExist` error code.
	pub fn is_not_exist(&self) -> bool {
		self.http_status() == Some(404) || self.code().is_some_and(|code| code.ends_with("NotExist"))
	}

	pub fn is_already_exist(&self) -> bool {
		self.code().is_some_and(|code| code.ends_with("AlreadyExist"))
	}
}

impl From<reqwest::Error> for SlsError {
	fn from(err: reqwest::Error) -> Self {
		SlsError::Transport {
			retryable: err.is_retryable(),
			message: err.to_string(),
		}
	}
}

impl RetryableError for SlsError {
	fn is_retryable(&self) -> bool {
		match self {
			SlsError::Api(detail) => detail
				.http_status
				.and_then(|s| StatusCode::from_u16(s).ok())
				.is_some_and(is_retryable_status),
			SlsError::Transport { retryable, .. } => *retryable,
			SlsError::Opaque(_) => false,
		}
	}
}

/// Reduce any error to `(code, request id, message)`.
///
/// Three cases: structured API errors carry their fields directly; free-form
/// text is searched for `ErrorCode:`, `RequestId:` and `Message:` markers;
/// anything else is returned whole as the message.
pub fn classify(err: &SlsError) -> ErrorDetail {
	match err {
		SlsError::Api(detail) => detail.clone(),
		SlsError::Transport { message, .. } | SlsError::Opaque(message) => classify_text(message),
	}
}

fn classify_text(text: &str) -> ErrorDetail {
	let capture = |re: &Regex| {
		re.captures(text)
			.and_then(|c| c.get(1))
			.map(|m| m.as_str().trim().to_string())
	};

	match capture(&ERROR_CODE_RE) {
		Some(code) => ErrorDetail {
			http_status: None,
			code,
			request_id: capture(&REQUEST_ID_RE).unwrap_or_default(),
			message: capture(&MESSAGE_RE).unwrap_or_else(|| text.to_string()),
		},
		None => ErrorDetail {
			http_status: None,
			code: String::new(),
			request_id: String::new(),
			message: text.to_string(),
		},
	}
}
