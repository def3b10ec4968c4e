// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod credentials;
mod env_config;
mod log_service;
mod logging;

pub use credentials::{CredentialsConfig, CredentialsConfigLayer};
pub use env_config::{EnvConfigConfig, EnvConfigConfigLayer};
pub use log_service::{guess_region, LogServiceConfig, LogServiceConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
