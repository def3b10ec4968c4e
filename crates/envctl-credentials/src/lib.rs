// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential acquisition for the Log Service.
//!
//! A [`CredentialProvider`] produces a fresh [`Credential`] on every call and
//! keeps no state between calls. Three sources exist:
//!
//! - [`TokenFileProvider`]: the AES-CBC encrypted token file written by the
//!   cluster addon manager
//! - [`MetadataProvider`]: the ECS instance-metadata RAM role endpoint
//! - [`StaticProvider`]: an access key pair from configuration
//!
//! [`build_provider`] picks the chain matching the controller configuration.

mod credential;
mod error;
mod metadata;
mod provider;
mod token_file;

pub use credential::Credential;
pub use error::{CredentialError, CredentialResult};
pub use metadata::MetadataProvider;
pub use provider::{build_provider, ChainProvider, CredentialProvider, StaticProvider};
pub use token_file::TokenFileProvider;
