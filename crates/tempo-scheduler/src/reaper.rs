// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

use tempo_db::JobStore;
use tempo_metrics::Metrics;

/// Three missed 10 s heartbeats before a running job counts as stale.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(30);

const REAP_BATCH_LIMIT: i64 = 100;

/// Recovers jobs whose owning worker has gone silent: back to pending
/// while retries remain, terminal failure once they are exhausted.
pub struct Reaper {
	jobs: Arc<dyn JobStore>,
	metrics: Arc<Metrics>,
	interval: Duration,
	heartbeat_timeout: Duration,
}

impl Reaper {
	pub fn new(
		jobs: Arc<dyn JobStore>,
		metrics: Arc<Metrics>,
		interval: Duration,
		heartbeat_timeout: Duration,
	) -> Self {
		Self {
			jobs,
			metrics,
			interval,
			heartbeat_timeout,
		}
	}

	pub async fn start(&self, mut shutdown: broadcast::Receiver<()>) {
		info!(
			interval_secs = self.interval.as_secs(),
			heartbeat_timeout_secs = self.heartbeat_timeout.as_secs(),
			"reaper started"
		);

		let mut ticker = tokio::time::interval(self.interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

		loop {
			tokio::select! {
				_ = ticker.tick() => self.reap().await,
				_ = shutdown.recv() => {
					info!("reaper shut down");
					return;
				}
			}
		}
	}

	async fn reap(&self) {
		let started = Instant::now();
		let cutoff = Utc::now()
			- chrono::Duration::from_std(self.heartbeat_timeout)
				.unwrap_or_else(|_| chrono::Duration::seconds(30));

		match self.jobs.reschedule_stale(cutoff, REAP_BATCH_LIMIT).await {
			Ok(0) => {}
			Ok(rescued) => {
				self.metrics
					.reaper_rescued_total
					.with_label_values(&["rescheduled"])
					.inc_by(rescued as f64);
				info!(count = rescued, "rescheduled stale jobs");
			}
			Err(e) => error!(error = %e, "reschedule stale failed"),
		}

		match self.jobs.fail_stale(cutoff, REAP_BATCH_LIMIT).await {
			Ok(0) => {}
			Ok(failed) => {
				self.metrics
					.reaper_rescued_total
					.with_label_values(&["failed"])
					.inc_by(failed as f64);
				info!(count = failed, "permanently failed stale jobs");
			}
			Err(e) => error!(error = %e, "fail stale failed"),
		}

		self.metrics
			.reaper_cycle_duration
			.observe(started.elapsed().as_secs_f64());
	}
}
