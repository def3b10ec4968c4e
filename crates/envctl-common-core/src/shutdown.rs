// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process-wide shutdown signal built on a `watch` channel.

use std::sync::Arc;
use tokio::sync::watch;

/// Sending half; dropping it also counts as shutdown.
#[derive(Debug)]
pub struct ShutdownTrigger {
	tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
	pub fn trigger(&self) {
		let _ = self.tx.send(true);
	}

	pub fn subscribe(&self) -> Shutdown {
		Shutdown {
			rx: self.tx.subscribe(),
			_keepalive: None,
		}
	}
}

/// Receiving half, cheap to clone into every task that waits on a timer.
#[derive(Debug, Clone)]
pub struct Shutdown {
	rx: watch::Receiver<bool>,
	_keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl Shutdown {
	/// A signal that never fires.
	pub fn never() -> Self {
		let (tx, rx) = watch::channel(false);
		Self {
			rx,
			_keepalive: Some(Arc::new(tx)),
		}
	}

	pub fn is_triggered(&self) -> bool {
		*self.rx.borrow() || self.rx.has_changed().is_err()
	}

	/// Resolves once shutdown has been requested or the trigger was dropped.
	pub async fn triggered(&mut self) {
		loop {
			if *self.rx.borrow_and_update() {
				return;
			}
			if self.rx.changed().await.is_err() {
				return;
			}
		}
	}
}

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
	let (tx, rx) = watch::channel(false);
	(
		ShutdownTrigger { tx },
		Shutdown {
			rx,
			_keepalive: None,
		},
	)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[tokio::test]
	async fn trigger_wakes_waiters() {
		let (trigger, shutdown) = shutdown_channel();
		let mut waiter = shutdown.clone();
		let handle = tokio::spawn(async move { waiter.triggered().await });

		assert!(!shutdown.is_triggered());
		trigger.trigger();
		handle.await.unwrap();
		assert!(shutdown.is_triggered());
	}

	#[tokio::test]
	async fn dropping_trigger_counts_as_shutdown() {
		let (trigger, mut shutdown) = shutdown_channel();
		drop(trigger);
		tokio::time::timeout(Duration::from_secs(1), shutdown.triggered())
			.await
			.unwrap();
		assert!(shutdown.is_triggered());
	}

	#[tokio::test(start_paused = true)]
	async fn never_does_not_fire() {
		let mut shutdown = Shutdown::never();
		let result = tokio::time::timeout(Duration::from_secs(60), shutdown.triggered()).await;
		assert!(result.is_err());
		assert!(!shutdown.is_triggered());
	}
}
