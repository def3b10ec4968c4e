// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use std::sync::Mutex;

use envctl_envconfig::ContainerDescriptor;

use crate::error::{ControllerError, ControllerResult};

/// Snapshot source for the containers running on this node.
#[async_trait]
pub trait ContainerDiscovery: Send + Sync {
	async fn list(&self) -> ControllerResult<Vec<ContainerDescriptor>>;
}

/// Discovery over a fixed, replaceable set of descriptors.
#[derive(Debug)]
pub struct StaticDiscovery {
	containers: Mutex<Result<Vec<ContainerDescriptor>, String>>,
}

impl StaticDiscovery {
	pub fn new(containers: Vec<ContainerDescriptor>) -> Self {
		Self {
			containers: Mutex::new(Ok(containers)),
		}
	}

	pub fn set(&self, containers: Vec<ContainerDescriptor>) {
		*self
			.containers
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner()) = Ok(containers);
	}

	/// Make subsequent `list` calls fail with `message`.
	pub fn fail(&self, message: impl Into<String>) {
		*self
			.containers
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner()) = Err(message.into());
	}
}

impl Default for StaticDiscovery {
	fn default() -> Self {
		Self::new(Vec::new())
	}
}

#[async_trait]
impl ContainerDiscovery for StaticDiscovery {
	async fn list(&self) -> ControllerResult<Vec<ContainerDescriptor>> {
		self.containers
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.clone()
			.map_err(ControllerError::Discovery)
	}
}
