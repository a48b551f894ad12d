// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Postgres job queue. Claims take row-level locks with
//! `FOR UPDATE SKIP LOCKED`, so workers racing on the same rows receive
//! disjoint batches instead of blocking on each other.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use tempo_core::{Job, NewJob};

use crate::error::{DbError, Result};
use crate::store::{JobStore, ListJobs};

pub(crate) const JOB_COLUMNS: &str = "id, user_id, idempotency_key, url, method, headers, body, \
	timeout_seconds, status, scheduled_at, retry_count, max_retries, backoff, \
	claimed_at, claimed_by, heartbeat_at, completed_at, last_error, schedule_id, \
	created_at, updated_at";

#[derive(sqlx::FromRow)]
pub(crate) struct JobRow {
	id: Uuid,
	user_id: String,
	idempotency_key: String,
	url: String,
	method: String,
	headers: Json<HashMap<String, String>>,
	body: Option<String>,
	timeout_seconds: i32,
	status: String,
	scheduled_at: DateTime<Utc>,
	retry_count: i32,
	max_retries: i32,
	backoff: String,
	claimed_at: Option<DateTime<Utc>>,
	claimed_by: Option<String>,
	heartbeat_at: Option<DateTime<Utc>>,
	completed_at: Option<DateTime<Utc>>,
	last_error: Option<String>,
	schedule_id: Option<Uuid>,
	created_at: DateTime<Utc>,
	updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
	type Error = DbError;

	fn try_from(row: JobRow) -> Result<Job> {
		Ok(Job {
			id: row.id.to_string(),
			user_id: row.user_id,
			idempotency_key: row.idempotency_key,
			url: row.url,
			method: row
				.method
				.parse()
				.map_err(|e: tempo_core::ValidationError| DbError::Internal(e.to_string()))?,
			headers: row.headers.0,
			body: row.body,
			timeout_seconds: row.timeout_seconds,
			status: row
				.status
				.parse()
				.map_err(|e: tempo_core::ValidationError| DbError::Internal(e.to_string()))?,
			scheduled_at: row.scheduled_at,
			retry_count: row.retry_count,
			max_retries: row.max_retries,
			backoff: row
				.backoff
				.parse()
				.map_err(|e: tempo_core::ValidationError| DbError::Internal(e.to_string()))?,
			claimed_at: row.claimed_at,
			claimed_by: row.claimed_by,
			heartbeat_at: row.heartbeat_at,
			completed_at: row.completed_at,
			last_error: row.last_error,
			schedule_id: row.schedule_id.map(|id| id.to_string()),
			created_at: row.created_at,
			updated_at: row.updated_at,
		})
	}
}

pub(crate) fn parse_uuid(id: &str) -> Option<Uuid> {
	Uuid::parse_str(id).ok()
}

#[derive(Clone)]
pub struct JobRepository {
	pool: PgPool,
}

impl JobRepository {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, new), fields(user_id = %new.user_id))]
	pub async fn create_job(&self, new: &NewJob) -> Result<Job> {
		let sql = format!(
			r#"
			INSERT INTO jobs (
				user_id, idempotency_key, url, method, headers, body,
				timeout_seconds, status, scheduled_at, max_retries, backoff, schedule_id
			) VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9, $10, $11)
			RETURNING {JOB_COLUMNS}
			"#
		);

		let schedule_id = match &new.schedule_id {
			Some(id) => Some(parse_uuid(id).ok_or(DbError::ScheduleNotFound)?),
			None => None,
		};

		let row = sqlx::query_as::<_, JobRow>(&sql)
			.bind(&new.user_id)
			.bind(&new.idempotency_key)
			.bind(&new.url)
			.bind(new.method.as_str())
			.bind(Json(&new.headers))
			.bind(&new.body)
			.bind(new.timeout_seconds)
			.bind(new.scheduled_at)
			.bind(new.max_retries)
			.bind(new.backoff.as_str())
			.bind(schedule_id)
			.fetch_one(&self.pool)
			.await
			.map_err(|e| {
				if DbError::is_unique_violation(&e) {
					DbError::DuplicateJob
				} else {
					DbError::Sqlx(e)
				}
			})?;

		row.try_into()
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_job(&self, id: &str, user_id: &str) -> Result<Job> {
		let Some(job_id) = parse_uuid(id) else {
			return Err(DbError::JobNotFound);
		};

		let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 AND user_id = $2");
		let row = sqlx::query_as::<_, JobRow>(&sql)
			.bind(job_id)
			.bind(user_id)
			.fetch_optional(&self.pool)
			.await?
			.ok_or(DbError::JobNotFound)?;

		row.try_into()
	}

	#[tracing::instrument(skip(self, query), fields(user_id = %query.user_id))]
	pub async fn list_jobs(&self, query: &ListJobs) -> Result<Vec<Job>> {
		let (cursor_at, cursor_id) = match &query.cursor {
			Some((at, id)) => {
				let id = parse_uuid(id).ok_or_else(|| {
					DbError::Internal("list cursor does not name a job".to_string())
				})?;
				(Some(*at), Some(id))
			}
			None => (None, None),
		};

		let sql = format!(
			r#"
			SELECT {JOB_COLUMNS} FROM jobs
			WHERE user_id = $1
			  AND ($2::text IS NULL OR status = $2)
			  AND ($3::timestamptz IS NULL OR (scheduled_at, id) < ($3, $4::uuid))
			ORDER BY scheduled_at DESC, id DESC
			LIMIT $5
			"#
		);

		let rows = sqlx::query_as::<_, JobRow>(&sql)
			.bind(&query.user_id)
			.bind(query.status.map(|s| s.as_str()))
			.bind(cursor_at)
			.bind(cursor_id)
			.bind(query.limit)
			.fetch_all(&self.pool)
			.await?;

		rows.into_iter().map(Job::try_from).collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_jobs_by_schedule(
		&self,
		schedule_id: &str,
		limit: i64,
		cursor: Option<(DateTime<Utc>, String)>,
	) -> Result<Vec<Job>> {
		let Some(schedule_id) = parse_uuid(schedule_id) else {
			return Err(DbError::ScheduleNotFound);
		};
		let (cursor_at, cursor_id) = match &cursor {
			Some((at, id)) => {
				let id = parse_uuid(id).ok_or_else(|| {
					DbError::Internal("list cursor does not name a job".to_string())
				})?;
				(Some(*at), Some(id))
			}
			None => (None, None),
		};

		let sql = format!(
			r#"
			SELECT {JOB_COLUMNS} FROM jobs
			WHERE schedule_id = $1
			  AND ($2::timestamptz IS NULL OR (scheduled_at, id) < ($2, $3::uuid))
			ORDER BY scheduled_at DESC, id DESC
			LIMIT $4
			"#
		);

		let rows = sqlx::query_as::<_, JobRow>(&sql)
			.bind(schedule_id)
			.bind(cursor_at)
			.bind(cursor_id)
			.bind(limit)
			.fetch_all(&self.pool)
			.await?;

		rows.into_iter().map(Job::try_from).collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn cancel_job(&self, id: &str, user_id: &str) -> Result<()> {
		let Some(job_id) = parse_uuid(id) else {
			return Err(DbError::JobNotFound);
		};

		let result = sqlx::query(
			r#"
			UPDATE jobs SET status = 'cancelled', updated_at = NOW()
			WHERE id = $1 AND user_id = $2 AND status = 'pending'
			"#,
		)
		.bind(job_id)
		.bind(user_id)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			// Distinguish not-found from a job past pending.
			self.get_job(id, user_id).await?;
			return Err(DbError::JobNotCancellable);
		}
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn claim_batch(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>> {
		let sql = format!(
			r#"
			UPDATE jobs
			SET    status       = 'running',
			       claimed_at   = NOW(),
			       claimed_by   = $1,
			       heartbeat_at = NOW(),
			       updated_at   = NOW()
			WHERE id IN (
				SELECT id FROM jobs
				WHERE  status       = 'pending'
				  AND  scheduled_at <= NOW()
				ORDER BY scheduled_at ASC
				LIMIT $2
				FOR UPDATE SKIP LOCKED
			)
			RETURNING {JOB_COLUMNS}
			"#
		);

		let rows = sqlx::query_as::<_, JobRow>(&sql)
			.bind(worker_id)
			.bind(limit)
			.fetch_all(&self.pool)
			.await?;

		rows.into_iter().map(Job::try_from).collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn heartbeat(&self, job_id: &str) -> Result<()> {
		let Some(job_id) = parse_uuid(job_id) else {
			return Err(DbError::JobNotFound);
		};

		sqlx::query(
			"UPDATE jobs SET heartbeat_at = NOW(), updated_at = NOW() \
			 WHERE id = $1 AND status = 'running'",
		)
		.bind(job_id)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn complete_job(&self, job_id: &str) -> Result<()> {
		let Some(job_id) = parse_uuid(job_id) else {
			return Err(DbError::JobNotFound);
		};

		sqlx::query(
			"UPDATE jobs SET status = 'completed', completed_at = NOW(), updated_at = NOW() \
			 WHERE id = $1 AND status = 'running'",
		)
		.bind(job_id)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn fail_job(&self, job_id: &str, last_error: &str) -> Result<()> {
		let Some(job_id) = parse_uuid(job_id) else {
			return Err(DbError::JobNotFound);
		};

		sqlx::query(
			"UPDATE jobs SET status = 'failed', last_error = $2, updated_at = NOW() \
			 WHERE id = $1 AND status = 'running'",
		)
		.bind(job_id)
		.bind(last_error)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn reschedule_job(
		&self,
		job_id: &str,
		last_error: &str,
		retry_at: DateTime<Utc>,
	) -> Result<()> {
		let Some(job_id) = parse_uuid(job_id) else {
			return Err(DbError::JobNotFound);
		};

		// The status guard keeps retry_count a store-owned monotonic
		// counter: a job the reaper already reset cannot be incremented a
		// second time by its previous owner.
		sqlx::query(
			r#"
			UPDATE jobs
			SET    status       = 'pending',
			       retry_count  = retry_count + 1,
			       last_error   = $2,
			       scheduled_at = $3,
			       claimed_at   = NULL,
			       claimed_by   = NULL,
			       heartbeat_at = NULL,
			       updated_at   = NOW()
			WHERE id = $1 AND status = 'running'
			"#,
		)
		.bind(job_id)
		.bind(last_error)
		.bind(retry_at)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn reschedule_stale(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<u64> {
		let result = sqlx::query(
			r#"
			UPDATE jobs
			SET    status       = 'pending',
			       retry_count  = retry_count + 1,
			       last_error   = 'worker timeout',
			       claimed_at   = NULL,
			       claimed_by   = NULL,
			       heartbeat_at = NULL,
			       updated_at   = NOW()
			WHERE id IN (
				SELECT id FROM jobs
				WHERE  status       = 'running'
				  AND  heartbeat_at < $1
				  AND  retry_count  < max_retries
				ORDER BY heartbeat_at ASC
				LIMIT $2
				FOR UPDATE SKIP LOCKED
			)
			"#,
		)
		.bind(cutoff)
		.bind(limit)
		.execute(&self.pool)
		.await?;
		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self))]
	pub async fn fail_stale(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<u64> {
		let result = sqlx::query(
			r#"
			UPDATE jobs
			SET    status      = 'failed',
			       last_error  = 'worker timeout: max retries exceeded',
			       updated_at  = NOW()
			WHERE id IN (
				SELECT id FROM jobs
				WHERE  status       = 'running'
				  AND  heartbeat_at < $1
				  AND  retry_count  >= max_retries
				ORDER BY heartbeat_at ASC
				LIMIT $2
				FOR UPDATE SKIP LOCKED
			)
			"#,
		)
		.bind(cutoff)
		.bind(limit)
		.execute(&self.pool)
		.await?;
		Ok(result.rows_affected())
	}
}

#[async_trait]
impl JobStore for JobRepository {
	async fn create_job(&self, new: &NewJob) -> Result<Job> {
		self.create_job(new).await
	}

	async fn get_job(&self, id: &str, user_id: &str) -> Result<Job> {
		self.get_job(id, user_id).await
	}

	async fn list_jobs(&self, query: &ListJobs) -> Result<Vec<Job>> {
		self.list_jobs(query).await
	}

	async fn list_jobs_by_schedule(
		&self,
		schedule_id: &str,
		limit: i64,
		cursor: Option<(DateTime<Utc>, String)>,
	) -> Result<Vec<Job>> {
		self.list_jobs_by_schedule(schedule_id, limit, cursor).await
	}

	async fn cancel_job(&self, id: &str, user_id: &str) -> Result<()> {
		self.cancel_job(id, user_id).await
	}

	async fn claim_batch(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>> {
		self.claim_batch(worker_id, limit).await
	}

	async fn heartbeat(&self, job_id: &str) -> Result<()> {
		self.heartbeat(job_id).await
	}

	async fn complete_job(&self, job_id: &str) -> Result<()> {
		self.complete_job(job_id).await
	}

	async fn fail_job(&self, job_id: &str, last_error: &str) -> Result<()> {
		self.fail_job(job_id, last_error).await
	}

	async fn reschedule_job(
		&self,
		job_id: &str,
		last_error: &str,
		retry_at: DateTime<Utc>,
	) -> Result<()> {
		self.reschedule_job(job_id, last_error, retry_at).await
	}

	async fn reschedule_stale(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<u64> {
		self.reschedule_stale(cutoff, limit).await
	}

	async fn fail_stale(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<u64> {
		self.fail_stale(cutoff, limit).await
	}
}
