// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use tempo_core::{next_skipping_missed, Schedule};
use tempo_db::ScheduleStore;

const DISPATCH_BATCH_LIMIT: i64 = 100;

/// Fires due recurring schedules. The whole tick is one store
/// transaction, so any number of dispatcher replicas stay safe.
pub struct Dispatcher {
	schedules: Arc<dyn ScheduleStore>,
	interval: Duration,
}

impl Dispatcher {
	pub fn new(schedules: Arc<dyn ScheduleStore>, interval: Duration) -> Self {
		Self {
			schedules,
			interval,
		}
	}

	pub async fn start(&self, mut shutdown: broadcast::Receiver<()>) {
		info!(interval_secs = self.interval.as_secs(), "dispatcher started");

		let mut ticker = tokio::time::interval(self.interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

		loop {
			tokio::select! {
				_ = ticker.tick() => self.dispatch().await,
				_ = shutdown.recv() => {
					info!("dispatcher shut down");
					return;
				}
			}
		}
	}

	async fn dispatch(&self) {
		match self
			.schedules
			.claim_and_fire(DISPATCH_BATCH_LIMIT, &compute_next)
			.await
		{
			Ok(fired) if !fired.is_empty() => {
				info!(count = fired.len(), "dispatcher fired jobs");
			}
			Ok(_) => {}
			Err(e) => error!(error = %e, "claim and fire failed"),
		}
	}
}

/// Next future run for a schedule, skipping any missed ticks.
fn compute_next(schedule: &Schedule) -> DateTime<Utc> {
	match next_skipping_missed(&schedule.cron_expr, schedule.next_run_at, Utc::now()) {
		Ok(next) => next,
		Err(e) => {
			// Expressions are validated on create; this should never happen.
			error!(
				schedule_id = %schedule.id,
				cron_expr = %schedule.cron_expr,
				error = %e,
				"invalid cron expression in schedule"
			);
			Utc::now() + chrono::Duration::hours(1)
		}
	}
}
