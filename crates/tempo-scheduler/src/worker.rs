// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The worker pump.
//!
//! Capacity is a semaphore of execution slots. The poll loop claims at
//! most the number of free slots, hands each claimed job to its own
//! task, and never awaits a running job itself: slow jobs hold their
//! slots but cannot stall claiming while other slots are free.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Semaphore};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use tempo_core::{retry_delay, Job, RETRY_BASE};
use tempo_db::{AttemptStore, JobStore, NewAttempt};
use tempo_metrics::Metrics;

use crate::executor::Executor;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct Worker {
	id: String,
	jobs: Arc<dyn JobStore>,
	attempts: Arc<dyn AttemptStore>,
	executor: Arc<Executor>,
	metrics: Arc<Metrics>,
	poll_interval: Duration,
	capacity: usize,
	retry_base: Duration,
	slots: Arc<Semaphore>,
}

impl Worker {
	pub fn new(
		jobs: Arc<dyn JobStore>,
		attempts: Arc<dyn AttemptStore>,
		executor: Arc<Executor>,
		metrics: Arc<Metrics>,
		poll_interval: Duration,
		capacity: usize,
	) -> Self {
		let host = hostname::get()
			.map(|h| h.to_string_lossy().into_owned())
			.unwrap_or_else(|_| "unknown".to_string());
		Self {
			id: format!("{host}-{}", std::process::id()),
			jobs,
			attempts,
			executor,
			metrics,
			poll_interval,
			capacity,
			retry_base: RETRY_BASE,
			slots: Arc::new(Semaphore::new(capacity)),
		}
	}

	/// Override the base retry delay. Tests shrink it to keep retry
	/// scenarios inside a test's lifetime.
	pub fn with_retry_base(mut self, base: Duration) -> Self {
		self.retry_base = base;
		self
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	/// Run until the shutdown signal fires, then drain in-flight jobs up
	/// to the shutdown grace.
	pub async fn start(&self, mut shutdown: broadcast::Receiver<()>) {
		self.metrics
			.worker_start_time
			.set(Utc::now().timestamp() as f64);
		info!(worker_id = %self.id, capacity = self.capacity, "worker started");

		let mut ticker = tokio::time::interval(self.poll_interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

		loop {
			tokio::select! {
				_ = ticker.tick() => self.poll().await,
				_ = shutdown.recv() => break,
			}
		}

		self.metrics.worker_shutdowns_total.inc();
		// All slots free means nothing is in flight any more.
		let drained = tokio::time::timeout(
			SHUTDOWN_GRACE,
			self.slots.clone().acquire_many_owned(self.capacity as u32),
		)
		.await;
		match drained {
			Ok(Ok(_)) => info!(worker_id = %self.id, "worker drained and shut down"),
			Ok(Err(_)) | Err(_) => {
				// Abandoned jobs stop heartbeating; the reaper resets them.
				warn!(worker_id = %self.id, "shutdown grace elapsed with jobs in flight")
			}
		}
	}

	async fn poll(&self) {
		let available = self.slots.available_permits();
		if available == 0 {
			return;
		}

		let batch = match self.jobs.claim_batch(&self.id, available as i64).await {
			Ok(batch) => batch,
			Err(e) => {
				error!(worker_id = %self.id, error = %e, "claim batch failed");
				return;
			}
		};
		if batch.is_empty() {
			return;
		}
		debug!(worker_id = %self.id, count = batch.len(), "claimed jobs");

		let claimed_at = Utc::now();
		for job in batch {
			// Capacity was reserved before claiming, so this cannot block.
			let permit = match self.slots.clone().try_acquire_owned() {
				Ok(permit) => permit,
				Err(_) => {
					error!(worker_id = %self.id, job_id = %job.id, "no slot for claimed job");
					break;
				}
			};

			let pickup = (claimed_at - job.scheduled_at).num_milliseconds().max(0);
			self.metrics
				.job_pickup_latency
				.observe(pickup as f64 / 1000.0);
			self.metrics.jobs_in_flight.inc();

			let worker_id = self.id.clone();
			let jobs = Arc::clone(&self.jobs);
			let attempts = Arc::clone(&self.attempts);
			let executor = Arc::clone(&self.executor);
			let metrics = Arc::clone(&self.metrics);
			let retry_base = self.retry_base;
			tokio::spawn(async move {
				run_job(worker_id, jobs, attempts, executor, &metrics, retry_base, job).await;
				metrics.jobs_in_flight.dec();
				drop(permit);
			});
		}
	}
}

async fn run_job(
	worker_id: String,
	jobs: Arc<dyn JobStore>,
	attempts: Arc<dyn AttemptStore>,
	executor: Arc<Executor>,
	metrics: &Metrics,
	retry_base: Duration,
	job: Job,
) {
	let attempt = match attempts
		.create_attempt(&NewAttempt {
			job_id: job.id.clone(),
			attempt_num: job.retry_count + 1,
			worker_id: worker_id.clone(),
			started_at: Utc::now(),
		})
		.await
	{
		Ok(attempt) => attempt,
		Err(e) => {
			// Without an attempt row this run would be invisible. Abandon
			// it; the stopped heartbeat hands the job to the reaper.
			warn!(worker_id = %worker_id, job_id = %job.id, error = %e,
				"open attempt failed, abandoning run");
			return;
		}
	};

	let heartbeat = tokio::spawn(heartbeat_loop(
		Arc::clone(&jobs),
		worker_id.clone(),
		job.id.clone(),
	));

	let result = executor.run(&job).await;
	let duration_ms = result.duration.as_millis() as i64;

	let status_label = result
		.status_code
		.map(|code| code.to_string())
		.unwrap_or_else(|| "error".to_string());
	metrics
		.job_execution_duration
		.with_label_values(&[&status_label])
		.observe(result.duration.as_secs_f64());

	// Only 200 counts as success. Other 2xx codes follow the failure
	// path; downstream semantics of 201/204 are not guessed here.
	if result.error.is_none() && result.status_code == Some(200) {
		if let Err(e) = attempts
			.complete_attempt(&attempt.id, Some(200), None, duration_ms)
			.await
		{
			warn!(job_id = %job.id, error = %e, "close attempt failed");
		}
		if let Err(e) = jobs.complete_job(&job.id).await {
			error!(worker_id = %worker_id, job_id = %job.id, error = %e, "complete job failed");
		}
		metrics
			.jobs_completed_total
			.with_label_values(&["success"])
			.inc();
		info!(worker_id = %worker_id, job_id = %job.id, duration_ms, "job completed");
	} else {
		let err_msg = match (&result.error, result.status_code) {
			(Some(e), _) => e.clone(),
			(None, Some(code)) => format!("unexpected status code: {code}"),
			(None, None) => "execution produced neither response nor error".to_string(),
		};

		if let Err(e) = attempts
			.complete_attempt(
				&attempt.id,
				result.status_code.map(|code| code as i32),
				Some(&err_msg),
				duration_ms,
			)
			.await
		{
			warn!(job_id = %job.id, error = %e, "close attempt failed");
		}

		if job.retry_count < job.max_retries {
			let delay = retry_delay(job.backoff, job.retry_count, retry_base);
			let retry_at = Utc::now()
				+ chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(30));
			if let Err(e) = jobs.reschedule_job(&job.id, &err_msg, retry_at).await {
				error!(worker_id = %worker_id, job_id = %job.id, error = %e, "reschedule failed");
			}
			metrics
				.jobs_completed_total
				.with_label_values(&["retry"])
				.inc();
			warn!(
				worker_id = %worker_id,
				job_id = %job.id,
				retry = job.retry_count + 1,
				max_retries = job.max_retries,
				retry_at = %retry_at,
				error = %err_msg,
				"job failed, rescheduled"
			);
		} else {
			if let Err(e) = jobs.fail_job(&job.id, &err_msg).await {
				error!(worker_id = %worker_id, job_id = %job.id, error = %e, "fail job failed");
			}
			metrics
				.jobs_completed_total
				.with_label_values(&["failed"])
				.inc();
			warn!(worker_id = %worker_id, job_id = %job.id, error = %err_msg, "job permanently failed");
		}
	}

	heartbeat.abort();
}

async fn heartbeat_loop(jobs: Arc<dyn JobStore>, worker_id: String, job_id: String) {
	let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
	// The claim already stamped heartbeat_at; skip the immediate tick.
	ticker.tick().await;
	loop {
		ticker.tick().await;
		debug!(worker_id = %worker_id, job_id = %job_id, "heartbeat update");
		if let Err(e) = jobs.heartbeat(&job_id).await {
			warn!(worker_id = %worker_id, job_id = %job_id, error = %e, "heartbeat failed");
		}
	}
}
