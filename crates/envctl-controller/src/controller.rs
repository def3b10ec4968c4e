// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use envctl_common_core::{Clock, Shutdown};
use envctl_config::ControllerConfig;
use envctl_envconfig::{derive_specs, ContainerDescriptor, DeriveOptions};
use envctl_reconciler::SpecReconciler;

use crate::discovery::ContainerDiscovery;
use crate::state::DesiredState;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(3600);
pub const DEFAULT_EVICT_AFTER: Duration = Duration::from_secs(6 * 3600);

#[derive(Debug, Clone)]
pub struct ControllerOptions {
	pub interval: Duration,
	pub gc_interval: Duration,
	/// Specs not observed for this long are forgotten.
	pub evict_after: Duration,
	/// Stop after the first iteration that leaves nothing failing.
	pub self_env_only: bool,
	pub derive: DeriveOptions,
	/// The agent's own container, derived with self-configuration allowed.
	pub self_descriptor: Option<ContainerDescriptor>,
}

impl ControllerOptions {
	pub fn new(derive: DeriveOptions) -> Self {
		Self {
			interval: DEFAULT_INTERVAL,
			gc_interval: DEFAULT_GC_INTERVAL,
			evict_after: DEFAULT_EVICT_AFTER,
			self_env_only: false,
			derive,
			self_descriptor: None,
		}
	}

	pub fn from_config(config: &ControllerConfig, self_descriptor: Option<ContainerDescriptor>) -> Self {
		Self {
			interval: Duration::from_secs(config.env_config.update_interval_secs.max(1)),
			self_env_only: config.env_config.self_env_only,
			self_descriptor,
			..Self::new(DeriveOptions {
				prefix: config.env_config.prefix.clone(),
				default_project: config.log_service.default_project.clone(),
			})
		}
	}
}

/// Counters for one pass of the loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationReport {
	pub observed: usize,
	pub reconciled: usize,
	pub failed: usize,
	/// Queued specs still waiting out their retry backoff.
	pub deferred: usize,
	pub evicted: usize,
	pub discovery_failed: bool,
	/// Specs in the map whose last attempt failed.
	pub outstanding_failures: usize,
}

impl IterationReport {
	pub fn is_clean(&self) -> bool {
		!self.discovery_failed && self.outstanding_failures == 0
	}
}

/// Periodically derives specs from running containers and reconciles the
/// ones that are new, changed or still failing.
pub struct Controller {
	discovery: Arc<dyn ContainerDiscovery>,
	reconciler: Arc<dyn SpecReconciler>,
	clock: Arc<dyn Clock>,
	options: ControllerOptions,
	state: DesiredState,
	last_gc: DateTime<Utc>,
}

impl Controller {
	pub fn new(
		discovery: Arc<dyn ContainerDiscovery>,
		reconciler: Arc<dyn SpecReconciler>,
		clock: Arc<dyn Clock>,
		options: ControllerOptions,
	) -> Self {
		let last_gc = clock.now();
		Self {
			discovery,
			reconciler,
			clock,
			options,
			state: DesiredState::new(),
			last_gc,
		}
	}

	pub fn state(&self) -> &DesiredState {
		&self.state
	}

	pub fn options(&self) -> &ControllerOptions {
		&self.options
	}

	#[instrument(skip(self))]
	pub async fn run_iteration(&mut self) -> IterationReport {
		let mut report = IterationReport::default();
		let now = self.clock.now();

		let descriptors = match self.discovery.list().await {
			Ok(descriptors) => descriptors,
			Err(e) => {
				warn!(error = %e, "container discovery failed");
				report.discovery_failed = true;
				Vec::new()
			}
		};

		let mut candidates = Vec::new();
		for descriptor in &descriptors {
			candidates.extend(derive_specs(descriptor, &self.options.derive, false, now));
		}
		if let Some(own) = &self.options.self_descriptor {
			candidates.extend(derive_specs(own, &self.options.derive, true, now));
		}
		report.observed = candidates.len();

		let mut queued = BTreeSet::new();
		for candidate in candidates {
			let key = candidate.key();
			let observation = self.state.observe(candidate, now.timestamp());
			if observation.needs_reconcile() {
				debug!(key = %key, ?observation, "spec queued");
				queued.insert(key);
			}
		}

		for key in queued {
			if !self.state.is_due(&key, now.timestamp()) {
				report.deferred += 1;
				continue;
			}
			let Some(spec) = self.state.get(&key).cloned() else {
				continue;
			};
			match self.reconciler.reconcile(&spec).await {
				Ok(()) => {
					self.state.record_success(&key);
					report.reconciled += 1;
				}
				Err(e) => {
					report.failed += 1;
					let backoff = self.state.record_failure(&key, self.clock.now().timestamp());
					warn!(
						key = %key,
						error = %e,
						error_count = spec.error_count + 1,
						retry_in_secs = backoff.map(|b| b.as_secs()),
						"reconcile failed"
					);
				}
			}
		}

		let now = self.clock.now();
		let since_gc = (now - self.last_gc).to_std().unwrap_or(Duration::ZERO);
		if since_gc > self.options.gc_interval {
			report.evicted = self
				.state
				.evict_older_than(now.timestamp(), self.options.evict_after);
			self.last_gc = now;
			if report.evicted > 0 {
				info!(evicted = report.evicted, "forgot specs no longer observed");
			}
		}

		report.outstanding_failures = self.state.failing();
		report
	}

	/// Run until shutdown, or until a clean pass in self-env-only mode.
	pub async fn run(mut self, mut shutdown: Shutdown) {
		info!(
			interval_secs = self.options.interval.as_secs(),
			self_env_only = self.options.self_env_only,
			"env config controller started"
		);

		loop {
			if shutdown.is_triggered() {
				break;
			}

			let report = self.run_iteration().await;
			debug!(?report, specs = self.state.len(), "iteration finished");

			if self.options.self_env_only && report.is_clean() {
				info!("self env config applied, stopping");
				break;
			}

			tokio::select! {
				_ = shutdown.triggered() => break,
				_ = sleep(self.options.interval) => {}
			}
		}

		info!("env config controller stopped");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::discovery::StaticDiscovery;
	use crate::state::MAX_RETRY_BACKOFF;
	use async_trait::async_trait;
	use envctl_common_core::{shutdown_channel, ManualClock, TokioClock};
	use envctl_envconfig::{LogConfigSpec, SpecKey, SELF_ENV_CONFIG_FLAG};
	use envctl_reconciler::{ReconcileError, ReconcileResult};
	use envctl_sls::{ErrorDetail, SlsError};
	use std::collections::{HashMap, VecDeque};
	use std::sync::Mutex;

	/// Records every reconcile; logstores listed in `script` fail or succeed
	/// in order, everything else succeeds.
	#[derive(Default)]
	struct ScriptedReconciler {
		script: Mutex<HashMap<String, VecDeque<bool>>>,
		always_fail: Mutex<bool>,
		calls: Mutex<Vec<(SpecKey, DateTime<Utc>)>>,
		clock: Option<Arc<dyn Clock>>,
	}

	impl ScriptedReconciler {
		fn with_clock(clock: Arc<dyn Clock>) -> Self {
			Self {
				clock: Some(clock),
				..Default::default()
			}
		}

		fn script(&self, logstore: &str, outcomes: &[bool]) {
			self.script
				.lock()
				.unwrap()
				.insert(logstore.to_string(), outcomes.iter().copied().collect());
		}

		fn fail_always(&self) {
			*self.always_fail.lock().unwrap() = true;
		}

		fn call_count(&self) -> usize {
			self.calls.lock().unwrap().len()
		}

		fn call_times(&self) -> Vec<DateTime<Utc>> {
			self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
		}
	}

	#[async_trait]
	impl SpecReconciler for ScriptedReconciler {
		async fn reconcile(&self, spec: &LogConfigSpec) -> ReconcileResult<()> {
			let at = self
				.clock
				.as_ref()
				.map(|c| c.now())
				.unwrap_or_else(Utc::now);
			self.calls.lock().unwrap().push((spec.key(), at));
			let ok = if *self.always_fail.lock().unwrap() {
				false
			} else {
				self.script
					.lock()
					.unwrap()
					.get_mut(&spec.logstore)
					.and_then(|q| q.pop_front())
					.unwrap_or(true)
			};
			if ok {
				Ok(())
			} else {
				Err(ReconcileError::remote(
					"create logstore",
					spec.logstore.clone(),
					SlsError::Api(ErrorDetail {
						http_status: Some(500),
						code: "InternalServerError".to_string(),
						request_id: "req".to_string(),
						message: "scripted".to_string(),
					}),
				))
			}
		}
	}

	fn tomcat(value: &str) -> ContainerDescriptor {
		ContainerDescriptor::new("c1", "tomcat").with_env("aliyun_logs_catalina", value)
	}

	fn options() -> ControllerOptions {
		ControllerOptions::new(DeriveOptions {
			prefix: "aliyun_logs_".to_string(),
			default_project: "k8s-log-default".to_string(),
		})
	}

	struct Harness {
		clock: Arc<ManualClock>,
		discovery: Arc<StaticDiscovery>,
		reconciler: Arc<ScriptedReconciler>,
	}

	impl Harness {
		fn new(containers: Vec<ContainerDescriptor>) -> Self {
			let clock = Arc::new(ManualClock::new(Utc::now()));
			Self {
				reconciler: Arc::new(ScriptedReconciler::with_clock(clock.clone())),
				discovery: Arc::new(StaticDiscovery::new(containers)),
				clock,
			}
		}

		fn controller(&self, options: ControllerOptions) -> Controller {
			Controller::new(
				self.discovery.clone(),
				self.reconciler.clone(),
				self.clock.clone(),
				options,
			)
		}
	}

	#[tokio::test]
	async fn new_spec_is_reconciled_once() {
		let h = Harness::new(vec![tomcat("stdout")]);
		let mut controller = h.controller(options());

		let first = controller.run_iteration().await;
		assert_eq!(first.observed, 1);
		assert_eq!(first.reconciled, 1);
		assert!(first.is_clean());

		h.clock.advance(Duration::from_secs(10));
		let second = controller.run_iteration().await;
		assert_eq!(second.reconciled, 0);
		assert_eq!(h.reconciler.call_count(), 1);
	}

	#[tokio::test]
	async fn failure_waits_for_backoff_then_retries() {
		let h = Harness::new(vec![tomcat("stdout")]);
		h.reconciler.script("catalina", &[false, true]);
		let mut controller = h.controller(options());

		let report = controller.run_iteration().await;
		assert_eq!(report.failed, 1);
		assert_eq!(report.outstanding_failures, 1);

		h.clock.advance(Duration::from_secs(5));
		let report = controller.run_iteration().await;
		assert_eq!(report.deferred, 1);
		assert_eq!(h.reconciler.call_count(), 1);

		h.clock.advance(Duration::from_secs(5));
		let report = controller.run_iteration().await;
		assert_eq!(report.reconciled, 1);
		assert!(report.is_clean());
		let spec = controller.state().get(&spec_key()).unwrap();
		assert_eq!(spec.error_count, 0);
	}

	fn spec_key() -> SpecKey {
		SpecKey {
			project: "k8s-log-default".to_string(),
			config_name: "catalina".to_string(),
			container_name: "tomcat".to_string(),
		}
	}

	#[tokio::test]
	async fn changed_content_skips_backoff() {
		let h = Harness::new(vec![tomcat("stdout")]);
		h.reconciler.script("catalina", &[false]);
		let mut controller = h.controller(options());
		controller.run_iteration().await;

		h.discovery
			.set(vec![tomcat("/usr/local/tomcat/logs/catalina.*.log")]);
		h.clock.advance(Duration::from_secs(1));
		let report = controller.run_iteration().await;
		assert_eq!(report.reconciled, 1);
		assert_eq!(h.reconciler.call_count(), 2);
	}

	#[tokio::test]
	async fn persistent_failure_gaps_grow_to_ceiling() {
		let h = Harness::new(vec![tomcat("stdout")]);
		h.reconciler.fail_always();
		let mut controller = h.controller(options());

		for _ in 0..6000 {
			controller.run_iteration().await;
			h.clock.advance(Duration::from_secs(10));
		}

		let times = h.reconciler.call_times();
		assert!(times.len() > 10);
		let gaps: Vec<i64> = times
			.windows(2)
			.map(|w| (w[1] - w[0]).num_seconds())
			.collect();
		assert!(gaps.windows(2).all(|g| g[1] >= g[0]));
		let ceiling = MAX_RETRY_BACKOFF.as_secs() as i64 + 10;
		assert!(gaps.iter().all(|g| *g <= ceiling));
		assert!(*gaps.last().unwrap() >= MAX_RETRY_BACKOFF.as_secs() as i64);
	}

	#[tokio::test]
	async fn unobserved_specs_are_evicted_after_gc_window() {
		let h = Harness::new(vec![tomcat("stdout")]);
		let mut controller = h.controller(options());
		controller.run_iteration().await;
		assert_eq!(controller.state().len(), 1);

		h.discovery.set(Vec::new());
		h.clock.advance(Duration::from_secs(3 * 3600));
		let report = controller.run_iteration().await;
		assert_eq!(report.evicted, 0);
		assert_eq!(controller.state().len(), 1);

		h.clock.advance(Duration::from_secs(4 * 3600));
		let report = controller.run_iteration().await;
		assert_eq!(report.evicted, 1);
		assert!(controller.state().is_empty());
	}

	#[tokio::test]
	async fn self_configured_container_only_counts_as_self() {
		let flagged = tomcat("stdout").with_env(SELF_ENV_CONFIG_FLAG, "true");
		let h = Harness::new(vec![flagged.clone()]);
		let mut controller = h.controller(options());
		assert_eq!(controller.run_iteration().await.observed, 0);

		let mut with_self = options();
		with_self.self_descriptor = Some(flagged);
		let mut controller = h.controller(with_self);
		let report = controller.run_iteration().await;
		assert_eq!(report.observed, 1);
		assert_eq!(report.reconciled, 1);
	}

	#[tokio::test]
	async fn discovery_failure_still_retries_known_specs() {
		let h = Harness::new(vec![tomcat("stdout")]);
		let mut controller = h.controller(options());
		controller.run_iteration().await;

		h.discovery.fail("runtime unavailable");
		let report = controller.run_iteration().await;
		assert!(report.discovery_failed);
		assert!(!report.is_clean());
		assert_eq!(controller.state().len(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn self_env_only_stops_after_clean_pass() {
		let discovery = Arc::new(StaticDiscovery::default());
		let reconciler = Arc::new(ScriptedReconciler::default());
		reconciler.script("catalina", &[false]);
		let mut opts = options();
		opts.self_env_only = true;
		opts.self_descriptor = Some(tomcat("stdout"));
		let controller = Controller::new(
			discovery,
			reconciler.clone(),
			Arc::new(TokioClock::new()),
			opts,
		);

		tokio::time::timeout(Duration::from_secs(120), controller.run(Shutdown::never()))
			.await
			.unwrap();
		assert_eq!(reconciler.call_count(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn run_stops_on_shutdown() {
		let discovery = Arc::new(StaticDiscovery::new(vec![tomcat("stdout")]));
		let reconciler = Arc::new(ScriptedReconciler::default());
		let controller = Controller::new(
			discovery,
			reconciler.clone(),
			Arc::new(TokioClock::new()),
			options(),
		);
		let (trigger, shutdown) = shutdown_channel();
		let task = tokio::spawn(controller.run(shutdown));

		tokio::time::sleep(Duration::from_secs(35)).await;
		trigger.trigger();
		tokio::time::timeout(Duration::from_secs(1), task)
			.await
			.unwrap()
			.unwrap();
		assert_eq!(reconciler.call_count(), 1);
	}
}
