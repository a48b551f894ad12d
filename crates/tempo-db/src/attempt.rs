// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use tempo_core::JobAttempt;

use crate::error::{DbError, Result};
use crate::job::parse_uuid;
use crate::store::{AttemptStore, NewAttempt};

#[derive(sqlx::FromRow)]
struct AttemptRow {
	id: Uuid,
	job_id: Uuid,
	attempt_num: i32,
	worker_id: String,
	started_at: DateTime<Utc>,
	completed_at: Option<DateTime<Utc>>,
	status_code: Option<i32>,
	error: Option<String>,
	duration_ms: Option<i64>,
}

impl From<AttemptRow> for JobAttempt {
	fn from(row: AttemptRow) -> JobAttempt {
		JobAttempt {
			id: row.id.to_string(),
			job_id: row.job_id.to_string(),
			attempt_num: row.attempt_num,
			worker_id: row.worker_id,
			started_at: row.started_at,
			completed_at: row.completed_at,
			status_code: row.status_code,
			error: row.error,
			duration_ms: row.duration_ms,
		}
	}
}

#[derive(Clone)]
pub struct AttemptRepository {
	pool: PgPool,
}

impl AttemptRepository {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, new), fields(job_id = %new.job_id, attempt_num = new.attempt_num))]
	pub async fn create_attempt(&self, new: &NewAttempt) -> Result<JobAttempt> {
		let Some(job_id) = parse_uuid(&new.job_id) else {
			return Err(DbError::JobNotFound);
		};

		let row = sqlx::query_as::<_, AttemptRow>(
			r#"
			INSERT INTO job_attempts (job_id, attempt_num, worker_id, started_at)
			VALUES ($1, $2, $3, $4)
			RETURNING id, job_id, attempt_num, worker_id, started_at,
			          completed_at, status_code, error, duration_ms
			"#,
		)
		.bind(job_id)
		.bind(new.attempt_num)
		.bind(&new.worker_id)
		.bind(new.started_at)
		.fetch_one(&self.pool)
		.await
		.map_err(|e| {
			if DbError::is_unique_violation(&e) {
				DbError::DuplicateAttempt
			} else {
				DbError::Sqlx(e)
			}
		})?;

		Ok(row.into())
	}

	#[tracing::instrument(skip(self))]
	pub async fn complete_attempt(
		&self,
		id: &str,
		status_code: Option<i32>,
		error: Option<&str>,
		duration_ms: i64,
	) -> Result<()> {
		let Some(attempt_id) = parse_uuid(id) else {
			return Err(DbError::Internal(format!("malformed attempt id: {id}")));
		};

		sqlx::query(
			r#"
			UPDATE job_attempts
			SET completed_at = NOW(),
			    status_code  = $2,
			    error        = $3,
			    duration_ms  = $4
			WHERE id = $1
			"#,
		)
		.bind(attempt_id)
		.bind(status_code)
		.bind(error)
		.bind(duration_ms)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_attempts_by_job(&self, job_id: &str) -> Result<Vec<JobAttempt>> {
		let Some(job_id) = parse_uuid(job_id) else {
			return Err(DbError::JobNotFound);
		};

		let rows = sqlx::query_as::<_, AttemptRow>(
			r#"
			SELECT id, job_id, attempt_num, worker_id, started_at,
			       completed_at, status_code, error, duration_ms
			FROM job_attempts
			WHERE job_id = $1
			ORDER BY started_at ASC
			"#,
		)
		.bind(job_id)
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.into_iter().map(JobAttempt::from).collect())
	}
}

#[async_trait]
impl AttemptStore for AttemptRepository {
	async fn create_attempt(&self, new: &NewAttempt) -> Result<JobAttempt> {
		self.create_attempt(new).await
	}

	async fn complete_attempt(
		&self,
		id: &str,
		status_code: Option<i32>,
		error: Option<&str>,
		duration_ms: i64,
	) -> Result<()> {
		self.complete_attempt(id, status_code, error, duration_ms)
			.await
	}

	async fn list_attempts_by_job(&self, job_id: &str) -> Result<Vec<JobAttempt>> {
		self.list_attempts_by_job(job_id).await
	}
}
