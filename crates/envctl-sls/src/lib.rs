// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Log Service API client.
//!
//! - [`LogService`]: the operations the controller needs
//! - [`HttpLogService`]: signed REST implementation
//! - [`AutoRefreshClient`]: rotates credentials without interrupting callers
//! - [`SlsError::detail`]: error classification into code, request id and message

mod error;
mod http;
mod refresh;
mod service;
pub mod signer;
mod types;

pub use error::{
	classify, ErrorDetail, SlsError, SlsResult, CODE_CONFIG_NOT_EXIST, CODE_INDEX_ALREADY_EXIST,
	CODE_LOGSTORE_NOT_EXIST, CODE_MACHINE_GROUP_NOT_EXIST, CODE_PROJECT_NOT_EXIST,
};
pub use http::{Endpoint, HttpLogService, HttpLogServiceFactory, HttpLogServiceOptions};
pub use refresh::{
	next_refresh_delay, AutoRefreshClient, ClientFactory, ClientHandle, RefreshError,
	RefreshOptions, StaticClientHandle,
};
pub use service::LogService;
pub use types::{
	IndexKey, IndexLine, IndexSpec, LogstoreMode, LogstoreSpec, LogtailConfig, MachineGroupSpec,
	OutputDetail, ProductLogstoreRequest, ResourceType, Tag, DEFAULT_INDEX_KEYS,
	DEFAULT_INDEX_TOKENS, MACHINE_ID_TYPE_USER_DEFINED, OUTPUT_TYPE_LOG_SERVICE,
};
