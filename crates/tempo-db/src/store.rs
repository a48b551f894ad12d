// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Store contracts. Every use-case and loop takes these traits; the
//! Postgres repositories are the production implementation and
//! [`crate::memory::MemoryStore`] the in-process one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tempo_core::{Job, JobAttempt, JobStatus, NewJob, NewSchedule, Schedule};

use crate::error::Result;

/// Computes a schedule's next fire time from its current state. Invoked
/// inside the claim-and-fire transaction, after the idempotency key has
/// been derived from the old `next_run_at`.
pub type ComputeNext<'a> = &'a (dyn Fn(&Schedule) -> DateTime<Utc> + Send + Sync);

/// Keyset listing parameters for jobs. The cursor is the
/// `(scheduled_at, id)` pair of the last item of the previous page.
#[derive(Debug, Clone)]
pub struct ListJobs {
	pub user_id: String,
	pub status: Option<JobStatus>,
	pub cursor: Option<(DateTime<Utc>, String)>,
	pub limit: i64,
}

/// Keyset listing parameters for schedules, cursored on `(created_at, id)`.
#[derive(Debug, Clone)]
pub struct ListSchedules {
	pub user_id: String,
	pub cursor: Option<(DateTime<Utc>, String)>,
	pub limit: i64,
}

/// Insert shape for an execution attempt.
#[derive(Debug, Clone)]
pub struct NewAttempt {
	pub job_id: String,
	pub attempt_num: i32,
	pub worker_id: String,
	pub started_at: DateTime<Utc>,
}

#[async_trait]
pub trait JobStore: Send + Sync {
	async fn create_job(&self, new: &NewJob) -> Result<Job>;
	async fn get_job(&self, id: &str, user_id: &str) -> Result<Job>;
	async fn list_jobs(&self, query: &ListJobs) -> Result<Vec<Job>>;
	async fn list_jobs_by_schedule(
		&self,
		schedule_id: &str,
		limit: i64,
		cursor: Option<(DateTime<Utc>, String)>,
	) -> Result<Vec<Job>>;
	async fn cancel_job(&self, id: &str, user_id: &str) -> Result<()>;

	/// Atomically move up to `limit` due pending jobs to running under
	/// `worker_id`. Concurrent callers receive disjoint sets.
	async fn claim_batch(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>>;

	/// Stamp `heartbeat_at = now` while the job is still running. A
	/// terminal transition voids subsequent heartbeats silently.
	async fn heartbeat(&self, job_id: &str) -> Result<()>;

	async fn complete_job(&self, job_id: &str) -> Result<()>;
	async fn fail_job(&self, job_id: &str, last_error: &str) -> Result<()>;

	/// Re-queue for retry: pending again, `retry_count + 1`, claim and
	/// heartbeat fields cleared, `scheduled_at = retry_at`.
	async fn reschedule_job(
		&self,
		job_id: &str,
		last_error: &str,
		retry_at: DateTime<Utc>,
	) -> Result<()>;

	/// Bulk-reschedule running jobs whose heartbeat predates `cutoff` and
	/// that still have retries left. Returns the number of rows affected.
	async fn reschedule_stale(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<u64>;

	/// Bulk-fail running jobs whose heartbeat predates `cutoff` with
	/// retries exhausted. Returns the number of rows affected.
	async fn fail_stale(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<u64>;
}

#[async_trait]
pub trait AttemptStore: Send + Sync {
	async fn create_attempt(&self, new: &NewAttempt) -> Result<JobAttempt>;
	async fn complete_attempt(
		&self,
		id: &str,
		status_code: Option<i32>,
		error: Option<&str>,
		duration_ms: i64,
	) -> Result<()>;
	async fn list_attempts_by_job(&self, job_id: &str) -> Result<Vec<JobAttempt>>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
	async fn create_schedule(&self, new: &NewSchedule) -> Result<Schedule>;
	async fn get_schedule(&self, id: &str, user_id: &str) -> Result<Schedule>;
	async fn list_schedules(&self, query: &ListSchedules) -> Result<Vec<Schedule>>;
	async fn set_schedule_paused(&self, id: &str, user_id: &str, paused: bool) -> Result<()>;
	async fn delete_schedule(&self, id: &str, user_id: &str) -> Result<()>;

	/// One transaction: claim due non-paused schedules skip-locked,
	/// insert a pending job per schedule keyed on the old `next_run_at`,
	/// advance `next_run_at` via `compute_next`, stamp `last_run_at`.
	/// A duplicate fire is absorbed by the job uniqueness constraint and
	/// the schedule still advances.
	async fn claim_and_fire(&self, limit: i64, compute_next: ComputeNext<'_>)
		-> Result<Vec<Job>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
	/// Insert the caller's user row if it does not exist, so job and
	/// schedule foreign keys are always satisfiable.
	async fn upsert_user(&self, id: &str) -> Result<()>;
}
