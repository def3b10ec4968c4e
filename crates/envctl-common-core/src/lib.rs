// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core primitives shared across envctl.
//!
//! This crate provides:
//! - [`Clock`] so that anything reading wall-clock time can be driven from tests
//! - [`Backoff`] implementations used by the refresher and the startup sequence
//! - [`Shutdown`], a cloneable view of the process-wide shutdown signal

pub mod backoff;
pub mod clock;
pub mod shutdown;

pub use backoff::{Backoff, ExponentialBackoff, LinearBackoff};
pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use shutdown::{shutdown_channel, Shutdown, ShutdownTrigger};
