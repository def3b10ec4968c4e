// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! A [`LogService`] handle whose credentials rotate in the background.
//!
//! [`AutoRefreshClient`] owns the current client. A refresher task sleeps
//! according to [`next_refresh_delay`], fetches a new [`Credential`], builds a
//! fresh client through a [`ClientFactory`] and swaps it in under a mutex.
//! Callers take a clone of the current `Arc` with [`ClientHandle::acquire`];
//! in-flight calls keep whichever client they started with.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use envctl_common_core::{Backoff, Clock, ExponentialBackoff, Shutdown};
use envctl_credentials::{Credential, CredentialError, CredentialProvider};

use crate::error::SlsError;
use crate::service::LogService;

/// Builds a client bound to one credential.
pub trait ClientFactory: Send + Sync {
	fn build(&self, credential: &Credential) -> Result<Arc<dyn LogService>, SlsError>;
}

/// Source of the client to use for a single call.
#[async_trait]
pub trait ClientHandle: Send + Sync {
	async fn acquire(&self) -> Arc<dyn LogService>;
}

/// A handle that always returns the same client.
#[derive(Clone)]
pub struct StaticClientHandle {
	client: Arc<dyn LogService>,
}

impl StaticClientHandle {
	pub fn new(client: Arc<dyn LogService>) -> Self {
		Self { client }
	}
}

#[async_trait]
impl ClientHandle for StaticClientHandle {
	async fn acquire(&self) -> Arc<dyn LogService> {
		self.client.clone()
	}
}

#[derive(Debug, Error)]
pub enum RefreshError {
	#[error("credential refresh requested too soon, retry in {retry_after:?}")]
	TooFrequent { retry_after: Duration },

	#[error(transparent)]
	Credential(#[from] CredentialError),

	#[error("failed to build client: {0}")]
	Client(#[from] SlsError),
}

#[derive(Debug, Clone)]
pub struct RefreshOptions {
	/// Lower bound between two credential fetches.
	pub min_fetch_interval: Duration,
	pub backoff_min: Duration,
	pub backoff_max: Duration,
	/// Re-read period for credentials without an expiration.
	pub no_expiry_refresh: Duration,
	/// How long `acquire` waits for a rotation after seeing an expired credential.
	pub stale_wait: Duration,
}

impl Default for RefreshOptions {
	fn default() -> Self {
		Self {
			min_fetch_interval: Duration::from_secs(1),
			backoff_min: ExponentialBackoff::DEFAULT_MIN,
			backoff_max: ExponentialBackoff::DEFAULT_MAX,
			no_expiry_refresh: Duration::from_secs(3600),
			stale_wait: Duration::from_secs(5),
		}
	}
}

/// Sleep before the next refresh given the time left on the credential.
///
/// Under a minute left: 30s. Under ten minutes: 70% of the remainder. Under
/// an hour: 60%. Otherwise half. Credentials without expiration use
/// `no_expiry`.
pub fn next_refresh_delay(remaining: Option<chrono::Duration>, no_expiry: Duration) -> Duration {
	let Some(remaining) = remaining else {
		return no_expiry;
	};
	let remaining = remaining.to_std().unwrap_or(Duration::ZERO);
	if remaining < Duration::from_secs(60) {
		Duration::from_secs(30)
	} else if remaining < Duration::from_secs(600) {
		remaining.mul_f64(0.7)
	} else if remaining < Duration::from_secs(3600) {
		remaining.mul_f64(0.6)
	} else {
		remaining.mul_f64(0.5)
	}
}

struct Current {
	client: Arc<dyn LogService>,
	credential: Credential,
}

struct Inner {
	provider: Arc<dyn CredentialProvider>,
	factory: Arc<dyn ClientFactory>,
	clock: Arc<dyn Clock>,
	options: RefreshOptions,
	current: Mutex<Current>,
	last_fetch: Mutex<Option<DateTime<Utc>>>,
	failures: AtomicU64,
	refresh_now: Notify,
	generation: watch::Sender<u64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Inner {
	fn snapshot(&self) -> (Arc<dyn LogService>, bool) {
		let current = lock(&self.current);
		(
			current.client.clone(),
			current.credential.is_stale(self.clock.now()),
		)
	}

	fn scheduled_delay(&self) -> Duration {
		let remaining = lock(&self.current).credential.remaining(self.clock.now());
		next_refresh_delay(remaining, self.options.no_expiry_refresh)
	}

	async fn refresh(&self) -> Result<(), RefreshError> {
		let now = self.clock.now();
		{
			let mut last_fetch = lock(&self.last_fetch);
			if let Some(last) = *last_fetch {
				let since = (now - last).to_std().unwrap_or(Duration::ZERO);
				if since < self.options.min_fetch_interval {
					return Err(RefreshError::TooFrequent {
						retry_after: self.options.min_fetch_interval - since,
					});
				}
			}
			*last_fetch = Some(now);
		}

		let credential = self.provider.fetch().await?;
		let client = self.factory.build(&credential)?;
		let expiration = credential.expiration;
		let access_key_id = credential.access_key_id.clone();

		*lock(&self.current) = Current { client, credential };
		self.generation.send_modify(|generation| *generation += 1);

		info!(
			provider = self.provider.name(),
			access_key_id = %access_key_id,
			expiration = ?expiration,
			"credentials rotated"
		);
		Ok(())
	}
}

/// Client wrapper that keeps its credentials fresh.
pub struct AutoRefreshClient {
	inner: Arc<Inner>,
	task: Mutex<Option<JoinHandle<()>>>,
}

impl AutoRefreshClient {
	/// Fetch the first credential, build the first client and spawn the refresher.
	pub async fn start(
		provider: Arc<dyn CredentialProvider>,
		factory: Arc<dyn ClientFactory>,
		clock: Arc<dyn Clock>,
		options: RefreshOptions,
		shutdown: Shutdown,
	) -> Result<Self, RefreshError> {
		let fetched_at = clock.now();
		let credential = provider.fetch().await?;
		let client = factory.build(&credential)?;
		info!(
			provider = provider.name(),
			access_key_id = %credential.access_key_id,
			expiration = ?credential.expiration,
			"log service client created"
		);

		let (generation, _) = watch::channel(0);
		let inner = Arc::new(Inner {
			provider,
			factory,
			clock,
			options,
			current: Mutex::new(Current { client, credential }),
			last_fetch: Mutex::new(Some(fetched_at)),
			failures: AtomicU64::new(0),
			refresh_now: Notify::new(),
			generation,
		});

		let task = tokio::spawn(refresh_loop(inner.clone(), shutdown));
		Ok(Self {
			inner,
			task: Mutex::new(Some(task)),
		})
	}

	/// Rotate now, subject to the minimum fetch interval.
	pub async fn refresh(&self) -> Result<(), RefreshError> {
		self.inner.refresh().await
	}

	/// Number of failed background refreshes since start.
	pub fn refresh_failures(&self) -> u64 {
		self.inner.failures.load(Ordering::Relaxed)
	}

	pub fn current_expiration(&self) -> Option<DateTime<Utc>> {
		lock(&self.inner.current).credential.expiration
	}

	/// Resolves once the refresher has exited.
	pub async fn wait_stopped(&self) {
		let task = lock(&self.task).take();
		if let Some(task) = task {
			let _ = task.await;
		}
	}
}

impl Drop for AutoRefreshClient {
	fn drop(&mut self) {
		if let Some(task) = lock(&self.task).take() {
			task.abort();
		}
	}
}

#[async_trait]
impl ClientHandle for AutoRefreshClient {
	async fn acquire(&self) -> Arc<dyn LogService> {
		let mut generation = self.inner.generation.subscribe();
		let (client, stale) = self.inner.snapshot();
		if !stale {
			return client;
		}

		debug!("credential expired, waking refresher");
		self.inner.refresh_now.notify_one();
		if tokio::time::timeout(self.inner.options.stale_wait, generation.changed())
			.await
			.is_err()
		{
			warn!(
				alarm = "UPDATE_CREDENTIAL_ALARM",
				"no fresh credential available, using expired one"
			);
		}
		self.inner.snapshot().0
	}
}

async fn refresh_loop(inner: Arc<Inner>, mut shutdown: Shutdown) {
	let mut backoff = ExponentialBackoff::new(inner.options.backoff_min, inner.options.backoff_max);
	let mut delay = inner.scheduled_delay();

	loop {
		debug!(delay_ms = delay.as_millis() as u64, "next credential refresh");
		tokio::select! {
			_ = shutdown.triggered() => break,
			_ = tokio::time::sleep(delay) => {}
			_ = inner.refresh_now.notified() => {}
		}
		if shutdown.is_triggered() {
			break;
		}

		delay = match inner.refresh().await {
			Ok(()) => {
				backoff.reset();
				inner.scheduled_delay()
			}
			Err(RefreshError::TooFrequent { retry_after }) => retry_after,
			Err(e) => {
				let failures = inner.failures.fetch_add(1, Ordering::Relaxed) + 1;
				let retry_in = backoff.next_delay();
				warn!(
					alarm = "UPDATE_CREDENTIAL_ALARM",
					error = %e,
					failures,
					retry_in_ms = retry_in.as_millis() as u64,
					"credential refresh failed"
				);
				retry_in
			}
		};
	}

	info!("credential refresher stopped");
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::SlsResult;
	use crate::types::{
		IndexSpec, LogstoreSpec, LogtailConfig, MachineGroupSpec, ProductLogstoreRequest,
		ResourceType, Tag,
	};
	use envctl_common_core::{shutdown_channel, TokioClock};
	use envctl_common_secret::SecretString;
	use envctl_credentials::CredentialResult;
	use std::collections::VecDeque;

	/// Answers `project_exists(x)` with `x == access_key_id` so tests can see
	/// which credential a handle is bound to.
	struct EchoService {
		credential: Credential,
	}

	#[async_trait]
	impl LogService for EchoService {
		async fn project_exists(&self, project: &str) -> SlsResult<bool> {
			Ok(project == self.credential.access_key_id)
		}
		async fn create_project(&self, _: &str, _: &str) -> SlsResult<()> {
			Ok(())
		}
		async fn logstore_exists(&self, _: &str, _: &str) -> SlsResult<bool> {
			Ok(true)
		}
		async fn create_logstore(&self, _: &str, _: &LogstoreSpec) -> SlsResult<()> {
			Ok(())
		}
		async fn create_index(&self, _: &str, _: &str, _: &IndexSpec) -> SlsResult<()> {
			Ok(())
		}
		async fn machine_group_exists(&self, _: &str, _: &str) -> SlsResult<bool> {
			Ok(true)
		}
		async fn create_machine_group(&self, _: &str, _: &MachineGroupSpec) -> SlsResult<()> {
			Ok(())
		}
		async fn get_config(&self, _: &str, _: &str) -> SlsResult<Option<LogtailConfig>> {
			Ok(None)
		}
		async fn create_config(&self, _: &str, _: &LogtailConfig) -> SlsResult<()> {
			Ok(())
		}
		async fn update_config(&self, _: &str, _: &LogtailConfig) -> SlsResult<()> {
			Ok(())
		}
		async fn list_applied_configs(&self, _: &str, _: &str) -> SlsResult<Vec<String>> {
			Ok(Vec::new())
		}
		async fn apply_config_to_machine_group(&self, _: &str, _: &str, _: &str) -> SlsResult<()> {
			Ok(())
		}
		async fn tag_resources(&self, _: &str, _: ResourceType, _: &str, _: &[Tag]) -> SlsResult<()> {
			Ok(())
		}
		async fn untag_all(&self, _: &str, _: ResourceType, _: &str) -> SlsResult<()> {
			Ok(())
		}
		async fn create_product_logstore(&self, _: &ProductLogstoreRequest) -> SlsResult<()> {
			Ok(())
		}
	}

	struct EchoFactory;

	impl ClientFactory for EchoFactory {
		fn build(&self, credential: &Credential) -> SlsResult<Arc<dyn LogService>> {
			Ok(Arc::new(EchoService {
				credential: credential.clone(),
			}))
		}
	}

	/// Hands out scripted lifetimes; `None` entries fail. The last entry repeats.
	struct ScriptedProvider {
		clock: Arc<dyn Clock>,
		script: Mutex<VecDeque<Option<Duration>>>,
		issued: AtomicU64,
	}

	impl ScriptedProvider {
		fn new(clock: Arc<dyn Clock>, script: Vec<Option<Duration>>) -> Self {
			Self {
				clock,
				script: Mutex::new(script.into()),
				issued: AtomicU64::new(0),
			}
		}
	}

	#[async_trait]
	impl CredentialProvider for ScriptedProvider {
		fn name(&self) -> &'static str {
			"scripted"
		}

		async fn fetch(&self) -> CredentialResult<Credential> {
			let next = {
				let mut script = lock(&self.script);
				if script.len() > 1 {
					script.pop_front().flatten()
				} else {
					script.front().copied().flatten()
				}
			};
			let Some(lifetime) = next else {
				return Err(CredentialError::Unavailable("scripted failure".to_string()));
			};
			let n = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
			Ok(Credential {
				security_token: Some(SecretString::from("token")),
				expiration: Some(self.clock.now() + chrono::Duration::from_std(lifetime).unwrap()),
				..Credential::fixed(format!("ak-{n}"), SecretString::from("secret"))
			})
		}
	}

	async fn bound_key(client: &Arc<dyn LogService>, key: &str) -> bool {
		client.project_exists(key).await.unwrap()
	}

	mod schedule {
		use super::*;

		fn secs(s: i64) -> Option<chrono::Duration> {
			Some(chrono::Duration::seconds(s))
		}

		#[test]
		fn tiers() {
			let hour = Duration::from_secs(3600);
			assert_eq!(next_refresh_delay(secs(10), hour), Duration::from_secs(30));
			assert_eq!(next_refresh_delay(secs(-5), hour), Duration::from_secs(30));
			assert_eq!(next_refresh_delay(secs(300), hour), Duration::from_secs(210));
			assert_eq!(next_refresh_delay(secs(1800), hour), Duration::from_secs(1080));
			assert_eq!(next_refresh_delay(secs(7200), hour), Duration::from_secs(3600));
			assert_eq!(next_refresh_delay(None, hour), hour);
		}
	}

	#[tokio::test(start_paused = true)]
	async fn rotates_short_lived_credential_before_use() {
		let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
		let provider = Arc::new(ScriptedProvider::new(
			clock.clone(),
			vec![
				Some(Duration::from_secs(2)),
				Some(Duration::from_secs(3600)),
			],
		));
		let (trigger, shutdown) = shutdown_channel();
		let client = AutoRefreshClient::start(
			provider,
			Arc::new(EchoFactory),
			clock.clone(),
			RefreshOptions::default(),
			shutdown,
		)
		.await
		.unwrap();

		assert!(bound_key(&client.acquire().await, "ak-1").await);

		for _ in 0..20 {
			tokio::time::sleep(Duration::from_millis(500)).await;
			let handle = client.acquire().await;
			let expiration = client.current_expiration().unwrap();
			assert!(expiration > clock.now(), "acquire returned an expired credential");
			assert!(bound_key(&handle, "ak-1").await || bound_key(&handle, "ak-2").await);
		}

		assert!(bound_key(&client.acquire().await, "ak-2").await);
		let remaining = client.current_expiration().unwrap() - clock.now();
		assert!(remaining > chrono::Duration::seconds(3500));
		assert_eq!(client.refresh_failures(), 0);

		trigger.trigger();
		client.wait_stopped().await;
	}

	#[tokio::test(start_paused = true)]
	async fn failed_refresh_keeps_previous_client_and_counts() {
		let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
		let provider = Arc::new(ScriptedProvider::new(
			clock.clone(),
			vec![Some(Duration::from_secs(90)), None],
		));
		let client = AutoRefreshClient::start(
			provider,
			Arc::new(EchoFactory),
			clock.clone(),
			RefreshOptions::default(),
			Shutdown::never(),
		)
		.await
		.unwrap();

		// 90s left schedules a refresh after 63s, which fails from then on.
		tokio::time::sleep(Duration::from_secs(70)).await;
		assert!(client.refresh_failures() >= 1);
		assert!(bound_key(&client.acquire().await, "ak-1").await);
	}

	#[tokio::test(start_paused = true)]
	async fn expired_credential_is_returned_when_refresh_keeps_failing() {
		let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
		let provider = Arc::new(ScriptedProvider::new(
			clock.clone(),
			vec![Some(Duration::from_secs(2)), None],
		));
		let client = AutoRefreshClient::start(
			provider,
			Arc::new(EchoFactory),
			clock.clone(),
			RefreshOptions::default(),
			Shutdown::never(),
		)
		.await
		.unwrap();

		tokio::time::sleep(Duration::from_secs(3)).await;
		let handle = client.acquire().await;
		assert!(bound_key(&handle, "ak-1").await);
		assert!(client.refresh_failures() >= 1);
	}

	#[tokio::test(start_paused = true)]
	async fn manual_refresh_is_rate_limited() {
		let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
		let provider = Arc::new(ScriptedProvider::new(
			clock.clone(),
			vec![Some(Duration::from_secs(3600))],
		));
		let client = AutoRefreshClient::start(
			provider,
			Arc::new(EchoFactory),
			clock.clone(),
			RefreshOptions::default(),
			Shutdown::never(),
		)
		.await
		.unwrap();

		match client.refresh().await {
			Err(RefreshError::TooFrequent { retry_after }) => {
				assert!(retry_after <= Duration::from_secs(1));
			}
			other => panic!("expected TooFrequent, got {other:?}"),
		}

		tokio::time::sleep(Duration::from_secs(2)).await;
		client.refresh().await.unwrap();
		assert!(bound_key(&client.acquire().await, "ak-2").await);
	}

	#[tokio::test(start_paused = true)]
	async fn start_fails_when_first_fetch_fails() {
		let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
		let provider = Arc::new(ScriptedProvider::new(clock.clone(), vec![None]));
		let result = AutoRefreshClient::start(
			provider,
			Arc::new(EchoFactory),
			clock,
			RefreshOptions::default(),
			Shutdown::never(),
		)
		.await;
		assert!(matches!(result, Err(RefreshError::Credential(_))));
	}

	#[tokio::test(start_paused = true)]
	async fn shutdown_stops_refresher() {
		let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
		let provider = Arc::new(ScriptedProvider::new(
			clock.clone(),
			vec![Some(Duration::from_secs(3600))],
		));
		let (trigger, shutdown) = shutdown_channel();
		let client = AutoRefreshClient::start(
			provider,
			Arc::new(EchoFactory),
			clock,
			RefreshOptions::default(),
			shutdown,
		)
		.await
		.unwrap();

		trigger.trigger();
		tokio::time::timeout(Duration::from_secs(1), client.wait_stopped())
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn static_handle_returns_same_client() {
		let service: Arc<dyn LogService> = Arc::new(EchoService {
			credential: Credential::fixed("ak", SecretString::from("s")),
		});
		let handle = StaticClientHandle::new(service.clone());
		assert!(Arc::ptr_eq(&handle.acquire().await, &service));
	}
}
