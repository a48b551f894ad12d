// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory store implementation.
//!
//! Implements the same contracts as the Postgres repositories over a
//! single mutex-held map; holding the lock for the whole operation gives
//! the same atomicity the database provides per statement, so claims stay
//! disjoint across concurrent callers. Used by the scheduler and
//! transport tests, and the seam for any future non-relational backend.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use tempo_core::{Job, JobAttempt, JobStatus, NewJob, NewSchedule, Schedule};

use crate::error::{DbError, Result};
use crate::store::{
	AttemptStore, ComputeNext, JobStore, ListJobs, ListSchedules, NewAttempt, ScheduleStore,
	UserStore,
};

#[derive(Default)]
struct MemoryState {
	jobs: HashMap<String, Job>,
	attempts: HashMap<String, JobAttempt>,
	schedules: HashMap<String, Schedule>,
	users: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
	state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl JobStore for MemoryStore {
	async fn create_job(&self, new: &NewJob) -> Result<Job> {
		let mut state = self.state.lock().await;
		if state
			.jobs
			.values()
			.any(|j| j.user_id == new.user_id && j.idempotency_key == new.idempotency_key)
		{
			return Err(DbError::DuplicateJob);
		}

		let now = Utc::now();
		let job = Job {
			id: Uuid::new_v4().to_string(),
			user_id: new.user_id.clone(),
			idempotency_key: new.idempotency_key.clone(),
			url: new.url.clone(),
			method: new.method,
			headers: new.headers.clone(),
			body: new.body.clone(),
			timeout_seconds: new.timeout_seconds,
			status: JobStatus::Pending,
			scheduled_at: new.scheduled_at,
			retry_count: 0,
			max_retries: new.max_retries,
			backoff: new.backoff,
			claimed_at: None,
			claimed_by: None,
			heartbeat_at: None,
			completed_at: None,
			last_error: None,
			schedule_id: new.schedule_id.clone(),
			created_at: now,
			updated_at: now,
		};
		state.jobs.insert(job.id.clone(), job.clone());
		Ok(job)
	}

	async fn get_job(&self, id: &str, user_id: &str) -> Result<Job> {
		let state = self.state.lock().await;
		state
			.jobs
			.get(id)
			.filter(|j| j.user_id == user_id)
			.cloned()
			.ok_or(DbError::JobNotFound)
	}

	async fn list_jobs(&self, query: &ListJobs) -> Result<Vec<Job>> {
		let state = self.state.lock().await;
		let mut jobs: Vec<Job> = state
			.jobs
			.values()
			.filter(|j| j.user_id == query.user_id)
			.filter(|j| query.status.map(|s| j.status == s).unwrap_or(true))
			.filter(|j| match &query.cursor {
				Some((at, id)) => (j.scheduled_at, j.id.as_str()) < (*at, id.as_str()),
				None => true,
			})
			.cloned()
			.collect();
		jobs.sort_by(|a, b| (b.scheduled_at, &b.id).cmp(&(a.scheduled_at, &a.id)));
		jobs.truncate(query.limit.max(0) as usize);
		Ok(jobs)
	}

	async fn list_jobs_by_schedule(
		&self,
		schedule_id: &str,
		limit: i64,
		cursor: Option<(DateTime<Utc>, String)>,
	) -> Result<Vec<Job>> {
		let state = self.state.lock().await;
		let mut jobs: Vec<Job> = state
			.jobs
			.values()
			.filter(|j| j.schedule_id.as_deref() == Some(schedule_id))
			.filter(|j| match &cursor {
				Some((at, id)) => (j.scheduled_at, j.id.as_str()) < (*at, id.as_str()),
				None => true,
			})
			.cloned()
			.collect();
		jobs.sort_by(|a, b| (b.scheduled_at, &b.id).cmp(&(a.scheduled_at, &a.id)));
		jobs.truncate(limit.max(0) as usize);
		Ok(jobs)
	}

	async fn cancel_job(&self, id: &str, user_id: &str) -> Result<()> {
		let mut state = self.state.lock().await;
		let job = state
			.jobs
			.get_mut(id)
			.filter(|j| j.user_id == user_id)
			.ok_or(DbError::JobNotFound)?;
		if job.status != JobStatus::Pending {
			return Err(DbError::JobNotCancellable);
		}
		job.status = JobStatus::Cancelled;
		job.updated_at = Utc::now();
		Ok(())
	}

	async fn claim_batch(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>> {
		let mut state = self.state.lock().await;
		let now = Utc::now();

		let mut due: Vec<(DateTime<Utc>, String)> = state
			.jobs
			.values()
			.filter(|j| j.status == JobStatus::Pending && j.scheduled_at <= now)
			.map(|j| (j.scheduled_at, j.id.clone()))
			.collect();
		due.sort();
		due.truncate(limit.max(0) as usize);

		let mut claimed = Vec::with_capacity(due.len());
		for (_, id) in due {
			let job = state.jobs.get_mut(&id).ok_or(DbError::JobNotFound)?;
			job.status = JobStatus::Running;
			job.claimed_at = Some(now);
			job.claimed_by = Some(worker_id.to_string());
			job.heartbeat_at = Some(now);
			job.updated_at = now;
			claimed.push(job.clone());
		}
		Ok(claimed)
	}

	async fn heartbeat(&self, job_id: &str) -> Result<()> {
		let mut state = self.state.lock().await;
		if let Some(job) = state.jobs.get_mut(job_id) {
			if job.status == JobStatus::Running {
				let now = Utc::now();
				job.heartbeat_at = Some(now);
				job.updated_at = now;
			}
		}
		Ok(())
	}

	async fn complete_job(&self, job_id: &str) -> Result<()> {
		let mut state = self.state.lock().await;
		if let Some(job) = state.jobs.get_mut(job_id) {
			if job.status == JobStatus::Running {
				let now = Utc::now();
				job.status = JobStatus::Completed;
				job.completed_at = Some(now);
				job.updated_at = now;
			}
		}
		Ok(())
	}

	async fn fail_job(&self, job_id: &str, last_error: &str) -> Result<()> {
		let mut state = self.state.lock().await;
		if let Some(job) = state.jobs.get_mut(job_id) {
			if job.status == JobStatus::Running {
				job.status = JobStatus::Failed;
				job.last_error = Some(last_error.to_string());
				job.updated_at = Utc::now();
			}
		}
		Ok(())
	}

	async fn reschedule_job(
		&self,
		job_id: &str,
		last_error: &str,
		retry_at: DateTime<Utc>,
	) -> Result<()> {
		let mut state = self.state.lock().await;
		if let Some(job) = state.jobs.get_mut(job_id) {
			if job.status == JobStatus::Running {
				job.status = JobStatus::Pending;
				job.retry_count += 1;
				job.last_error = Some(last_error.to_string());
				job.scheduled_at = retry_at;
				job.claimed_at = None;
				job.claimed_by = None;
				job.heartbeat_at = None;
				job.updated_at = Utc::now();
			}
		}
		Ok(())
	}

	async fn reschedule_stale(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<u64> {
		let mut state = self.state.lock().await;
		let mut stale: Vec<String> = state
			.jobs
			.values()
			.filter(|j| {
				j.status == JobStatus::Running
					&& j.heartbeat_at.map(|hb| hb < cutoff).unwrap_or(false)
					&& j.retry_count < j.max_retries
			})
			.map(|j| j.id.clone())
			.collect();
		stale.sort_by_key(|id| state.jobs[id].heartbeat_at);
		stale.truncate(limit.max(0) as usize);

		let count = stale.len() as u64;
		for id in stale {
			let job = state.jobs.get_mut(&id).ok_or(DbError::JobNotFound)?;
			job.status = JobStatus::Pending;
			job.retry_count += 1;
			job.last_error = Some("worker timeout".to_string());
			job.claimed_at = None;
			job.claimed_by = None;
			job.heartbeat_at = None;
			job.updated_at = Utc::now();
		}
		Ok(count)
	}

	async fn fail_stale(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<u64> {
		let mut state = self.state.lock().await;
		let mut stale: Vec<String> = state
			.jobs
			.values()
			.filter(|j| {
				j.status == JobStatus::Running
					&& j.heartbeat_at.map(|hb| hb < cutoff).unwrap_or(false)
					&& j.retry_count >= j.max_retries
			})
			.map(|j| j.id.clone())
			.collect();
		stale.sort_by_key(|id| state.jobs[id].heartbeat_at);
		stale.truncate(limit.max(0) as usize);

		let count = stale.len() as u64;
		for id in stale {
			let job = state.jobs.get_mut(&id).ok_or(DbError::JobNotFound)?;
			job.status = JobStatus::Failed;
			job.last_error = Some("worker timeout: max retries exceeded".to_string());
			job.updated_at = Utc::now();
		}
		Ok(count)
	}
}

#[async_trait]
impl AttemptStore for MemoryStore {
	async fn create_attempt(&self, new: &NewAttempt) -> Result<JobAttempt> {
		let mut state = self.state.lock().await;
		if state
			.attempts
			.values()
			.any(|a| a.job_id == new.job_id && a.attempt_num == new.attempt_num)
		{
			return Err(DbError::DuplicateAttempt);
		}

		let attempt = JobAttempt {
			id: Uuid::new_v4().to_string(),
			job_id: new.job_id.clone(),
			attempt_num: new.attempt_num,
			worker_id: new.worker_id.clone(),
			started_at: new.started_at,
			completed_at: None,
			status_code: None,
			error: None,
			duration_ms: None,
		};
		state.attempts.insert(attempt.id.clone(), attempt.clone());
		Ok(attempt)
	}

	async fn complete_attempt(
		&self,
		id: &str,
		status_code: Option<i32>,
		error: Option<&str>,
		duration_ms: i64,
	) -> Result<()> {
		let mut state = self.state.lock().await;
		if let Some(attempt) = state.attempts.get_mut(id) {
			attempt.completed_at = Some(Utc::now());
			attempt.status_code = status_code;
			attempt.error = error.map(str::to_string);
			attempt.duration_ms = Some(duration_ms);
		}
		Ok(())
	}

	async fn list_attempts_by_job(&self, job_id: &str) -> Result<Vec<JobAttempt>> {
		let state = self.state.lock().await;
		let mut attempts: Vec<JobAttempt> = state
			.attempts
			.values()
			.filter(|a| a.job_id == job_id)
			.cloned()
			.collect();
		attempts.sort_by_key(|a| a.started_at);
		Ok(attempts)
	}
}

#[async_trait]
impl ScheduleStore for MemoryStore {
	async fn create_schedule(&self, new: &NewSchedule) -> Result<Schedule> {
		let mut state = self.state.lock().await;
		if state
			.schedules
			.values()
			.any(|s| s.user_id == new.user_id && s.name == new.name)
		{
			return Err(DbError::ScheduleNameConflict);
		}

		let now = Utc::now();
		let schedule = Schedule {
			id: Uuid::new_v4().to_string(),
			user_id: new.user_id.clone(),
			name: new.name.clone(),
			cron_expr: new.cron_expr.clone(),
			url: new.url.clone(),
			method: new.method,
			headers: new.headers.clone(),
			body: new.body.clone(),
			timeout_seconds: new.timeout_seconds,
			max_retries: new.max_retries,
			backoff: new.backoff,
			paused: new.paused,
			next_run_at: new.next_run_at,
			last_run_at: None,
			created_at: now,
			updated_at: now,
		};
		state
			.schedules
			.insert(schedule.id.clone(), schedule.clone());
		Ok(schedule)
	}

	async fn get_schedule(&self, id: &str, user_id: &str) -> Result<Schedule> {
		let state = self.state.lock().await;
		state
			.schedules
			.get(id)
			.filter(|s| s.user_id == user_id)
			.cloned()
			.ok_or(DbError::ScheduleNotFound)
	}

	async fn list_schedules(&self, query: &ListSchedules) -> Result<Vec<Schedule>> {
		let state = self.state.lock().await;
		let mut schedules: Vec<Schedule> = state
			.schedules
			.values()
			.filter(|s| s.user_id == query.user_id)
			.filter(|s| match &query.cursor {
				Some((at, id)) => (s.created_at, s.id.as_str()) < (*at, id.as_str()),
				None => true,
			})
			.cloned()
			.collect();
		schedules.sort_by(|a, b| (b.created_at, &b.id).cmp(&(a.created_at, &a.id)));
		schedules.truncate(query.limit.max(0) as usize);
		Ok(schedules)
	}

	async fn set_schedule_paused(&self, id: &str, user_id: &str, paused: bool) -> Result<()> {
		let mut state = self.state.lock().await;
		let schedule = state
			.schedules
			.get_mut(id)
			.filter(|s| s.user_id == user_id)
			.ok_or(DbError::ScheduleNotFound)?;
		if schedule.paused == paused {
			if paused {
				return Err(DbError::ScheduleAlreadyPaused);
			}
			return Err(DbError::ScheduleNotPaused);
		}
		schedule.paused = paused;
		schedule.updated_at = Utc::now();
		Ok(())
	}

	async fn delete_schedule(&self, id: &str, user_id: &str) -> Result<()> {
		let mut state = self.state.lock().await;
		let owned = state
			.schedules
			.get(id)
			.map(|s| s.user_id == user_id)
			.unwrap_or(false);
		if !owned {
			return Err(DbError::ScheduleNotFound);
		}
		state.schedules.remove(id);
		// Break the link; materialised jobs survive their schedule.
		for job in state.jobs.values_mut() {
			if job.schedule_id.as_deref() == Some(id) {
				job.schedule_id = None;
			}
		}
		Ok(())
	}

	async fn claim_and_fire(
		&self,
		limit: i64,
		compute_next: ComputeNext<'_>,
	) -> Result<Vec<Job>> {
		let mut state = self.state.lock().await;
		let now = Utc::now();

		let mut due: Vec<String> = state
			.schedules
			.values()
			.filter(|s| !s.paused && s.next_run_at <= now)
			.map(|s| s.id.clone())
			.collect();
		due.sort_by_key(|id| state.schedules[id].next_run_at);
		due.truncate(limit.max(0) as usize);

		let mut fired = Vec::new();
		for id in due {
			let schedule = state.schedules[&id].clone();
			let idempotency_key =
				format!("sched:{}:{}", schedule.id, schedule.next_run_at.timestamp());
			let next = compute_next(&schedule);

			let duplicate = state
				.jobs
				.values()
				.any(|j| j.user_id == schedule.user_id && j.idempotency_key == idempotency_key);
			if duplicate {
				tracing::warn!(
					schedule_id = %schedule.id,
					idempotency_key = %idempotency_key,
					"duplicate job for schedule, skipping"
				);
			} else {
				let job = Job {
					id: Uuid::new_v4().to_string(),
					user_id: schedule.user_id.clone(),
					idempotency_key,
					url: schedule.url.clone(),
					method: schedule.method,
					headers: schedule.headers.clone(),
					body: schedule.body.clone(),
					timeout_seconds: schedule.timeout_seconds,
					status: JobStatus::Pending,
					scheduled_at: now,
					retry_count: 0,
					max_retries: schedule.max_retries,
					backoff: schedule.backoff,
					claimed_at: None,
					claimed_by: None,
					heartbeat_at: None,
					completed_at: None,
					last_error: None,
					schedule_id: Some(schedule.id.clone()),
					created_at: now,
					updated_at: now,
				};
				state.jobs.insert(job.id.clone(), job.clone());
				fired.push(job);
			}

			let entry = state.schedules.get_mut(&id).ok_or(DbError::ScheduleNotFound)?;
			entry.next_run_at = next;
			entry.last_run_at = Some(now);
			entry.updated_at = now;
		}
		Ok(fired)
	}
}

#[async_trait]
impl UserStore for MemoryStore {
	async fn upsert_user(&self, id: &str) -> Result<()> {
		let mut state = self.state.lock().await;
		state.users.insert(id.to_string());
		Ok(())
	}
}
