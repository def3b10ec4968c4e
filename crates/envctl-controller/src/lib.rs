// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The env-config controller loop.
//!
//! [`start`] brings up the credential-rotating client and the reconciler;
//! [`Controller::run`] then polls container discovery every interval,
//! derives specs, and reconciles those that are new, changed or failing.

mod controller;
mod discovery;
mod error;
mod startup;
mod state;

pub use controller::{
	Controller, ControllerOptions, IterationReport, DEFAULT_EVICT_AFTER, DEFAULT_GC_INTERVAL,
	DEFAULT_INTERVAL,
};
pub use discovery::{ContainerDiscovery, StaticDiscovery};
pub use error::{ControllerError, ControllerResult};
pub use startup::{
	connect_client, reconciler_options, start, start_with, ControllerDeps, STARTUP_BACKOFF_MAX,
	STARTUP_BACKOFF_STEP,
};
pub use state::{
	retry_backoff, DesiredState, Observation, MAX_RETRY_BACKOFF, MIN_RETRY_BACKOFF,
};
