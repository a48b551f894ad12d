// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Postgres schedule store. `claim_and_fire` is the dispatcher's whole
//! tick in one transaction, so a crash mid-fire leaves no partial state
//! and replicas racing on the same schedules skip each other's rows.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use tempo_core::{Job, NewSchedule, Schedule};

use crate::error::{DbError, Result};
use crate::job::{parse_uuid, JobRow, JOB_COLUMNS};
use crate::store::{ComputeNext, ListSchedules, ScheduleStore};

const SCHEDULE_COLUMNS: &str = "id, user_id, name, cron_expr, url, method, headers, body, \
	timeout_seconds, max_retries, backoff, paused, next_run_at, last_run_at, \
	created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ScheduleRow {
	id: Uuid,
	user_id: String,
	name: String,
	cron_expr: String,
	url: String,
	method: String,
	headers: Json<HashMap<String, String>>,
	body: Option<String>,
	timeout_seconds: i32,
	max_retries: i32,
	backoff: String,
	paused: bool,
	next_run_at: DateTime<Utc>,
	last_run_at: Option<DateTime<Utc>>,
	created_at: DateTime<Utc>,
	updated_at: DateTime<Utc>,
}

impl TryFrom<ScheduleRow> for Schedule {
	type Error = DbError;

	fn try_from(row: ScheduleRow) -> Result<Schedule> {
		Ok(Schedule {
			id: row.id.to_string(),
			user_id: row.user_id,
			name: row.name,
			cron_expr: row.cron_expr,
			url: row.url,
			method: row
				.method
				.parse()
				.map_err(|e: tempo_core::ValidationError| DbError::Internal(e.to_string()))?,
			headers: row.headers.0,
			body: row.body,
			timeout_seconds: row.timeout_seconds,
			max_retries: row.max_retries,
			backoff: row
				.backoff
				.parse()
				.map_err(|e: tempo_core::ValidationError| DbError::Internal(e.to_string()))?,
			paused: row.paused,
			next_run_at: row.next_run_at,
			last_run_at: row.last_run_at,
			created_at: row.created_at,
			updated_at: row.updated_at,
		})
	}
}

#[derive(Clone)]
pub struct ScheduleRepository {
	pool: PgPool,
}

impl ScheduleRepository {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, new), fields(user_id = %new.user_id, name = %new.name))]
	pub async fn create_schedule(&self, new: &NewSchedule) -> Result<Schedule> {
		let sql = format!(
			r#"
			INSERT INTO schedules (
				user_id, name, cron_expr, url, method, headers, body,
				timeout_seconds, max_retries, backoff, paused, next_run_at
			) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
			RETURNING {SCHEDULE_COLUMNS}
			"#
		);

		let row = sqlx::query_as::<_, ScheduleRow>(&sql)
			.bind(&new.user_id)
			.bind(&new.name)
			.bind(&new.cron_expr)
			.bind(&new.url)
			.bind(new.method.as_str())
			.bind(Json(&new.headers))
			.bind(&new.body)
			.bind(new.timeout_seconds)
			.bind(new.max_retries)
			.bind(new.backoff.as_str())
			.bind(new.paused)
			.bind(new.next_run_at)
			.fetch_one(&self.pool)
			.await
			.map_err(|e| {
				if DbError::is_unique_violation(&e) {
					DbError::ScheduleNameConflict
				} else {
					DbError::Sqlx(e)
				}
			})?;

		row.try_into()
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_schedule(&self, id: &str, user_id: &str) -> Result<Schedule> {
		let Some(schedule_id) = parse_uuid(id) else {
			return Err(DbError::ScheduleNotFound);
		};

		let sql = format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = $1 AND user_id = $2");
		let row = sqlx::query_as::<_, ScheduleRow>(&sql)
			.bind(schedule_id)
			.bind(user_id)
			.fetch_optional(&self.pool)
			.await?
			.ok_or(DbError::ScheduleNotFound)?;

		row.try_into()
	}

	#[tracing::instrument(skip(self, query), fields(user_id = %query.user_id))]
	pub async fn list_schedules(&self, query: &ListSchedules) -> Result<Vec<Schedule>> {
		let (cursor_at, cursor_id) = match &query.cursor {
			Some((at, id)) => {
				let id = parse_uuid(id).ok_or_else(|| {
					DbError::Internal("list cursor does not name a schedule".to_string())
				})?;
				(Some(*at), Some(id))
			}
			None => (None, None),
		};

		let sql = format!(
			r#"
			SELECT {SCHEDULE_COLUMNS} FROM schedules
			WHERE user_id = $1
			  AND ($2::timestamptz IS NULL OR (created_at, id) < ($2, $3::uuid))
			ORDER BY created_at DESC, id DESC
			LIMIT $4
			"#
		);

		let rows = sqlx::query_as::<_, ScheduleRow>(&sql)
			.bind(&query.user_id)
			.bind(cursor_at)
			.bind(cursor_id)
			.bind(query.limit)
			.fetch_all(&self.pool)
			.await?;

		rows.into_iter().map(Schedule::try_from).collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn set_schedule_paused(&self, id: &str, user_id: &str, paused: bool) -> Result<()> {
		let Some(schedule_id) = parse_uuid(id) else {
			return Err(DbError::ScheduleNotFound);
		};

		let result = sqlx::query(
			"UPDATE schedules SET paused = $3, updated_at = NOW() \
			 WHERE id = $1 AND user_id = $2 AND paused = $4",
		)
		.bind(schedule_id)
		.bind(user_id)
		.bind(paused)
		.bind(!paused)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			// Distinguish not-found from already-in-desired-state.
			self.get_schedule(id, user_id).await?;
			if paused {
				return Err(DbError::ScheduleAlreadyPaused);
			}
			return Err(DbError::ScheduleNotPaused);
		}
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_schedule(&self, id: &str, user_id: &str) -> Result<()> {
		let Some(schedule_id) = parse_uuid(id) else {
			return Err(DbError::ScheduleNotFound);
		};

		// jobs.schedule_id is ON DELETE SET NULL: already-materialised
		// jobs survive the schedule, with the link broken.
		let result = sqlx::query("DELETE FROM schedules WHERE id = $1 AND user_id = $2")
			.bind(schedule_id)
			.bind(user_id)
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::ScheduleNotFound);
		}
		Ok(())
	}

	#[tracing::instrument(skip(self, compute_next))]
	pub async fn claim_and_fire(
		&self,
		limit: i64,
		compute_next: ComputeNext<'_>,
	) -> Result<Vec<Job>> {
		let mut tx = self.pool.begin().await?;

		let select_sql = format!(
			r#"
			SELECT {SCHEDULE_COLUMNS} FROM schedules
			WHERE next_run_at <= NOW() AND NOT paused
			ORDER BY next_run_at ASC
			LIMIT $1
			FOR UPDATE SKIP LOCKED
			"#
		);
		let rows = sqlx::query_as::<_, ScheduleRow>(&select_sql)
			.bind(limit)
			.fetch_all(&mut *tx)
			.await?;

		let mut due = Vec::with_capacity(rows.len());
		for row in rows {
			let id = row.id;
			due.push((id, Schedule::try_from(row)?));
		}

		// ON CONFLICT keeps the transaction healthy on a duplicate fire;
		// a raised unique violation would abort it and lose the other
		// schedules' advances.
		let insert_sql = format!(
			r#"
			INSERT INTO jobs (
				user_id, idempotency_key, url, method, headers, body,
				timeout_seconds, status, scheduled_at, max_retries, backoff, schedule_id
			) VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', NOW(), $8, $9, $10)
			ON CONFLICT (user_id, idempotency_key) DO NOTHING
			RETURNING {JOB_COLUMNS}
			"#
		);

		let mut fired = Vec::new();
		for (schedule_id, schedule) in &due {
			// The key uses the tick being fired, i.e. next_run_at before
			// the advance. Computing it first is what makes a duplicate
			// fire collapse onto the uniqueness constraint.
			let idempotency_key =
				format!("sched:{}:{}", schedule.id, schedule.next_run_at.timestamp());
			let next = compute_next(schedule);

			let inserted = sqlx::query_as::<_, JobRow>(&insert_sql)
				.bind(&schedule.user_id)
				.bind(&idempotency_key)
				.bind(&schedule.url)
				.bind(schedule.method.as_str())
				.bind(Json(&schedule.headers))
				.bind(&schedule.body)
				.bind(schedule.timeout_seconds)
				.bind(schedule.max_retries)
				.bind(schedule.backoff.as_str())
				.bind(schedule_id)
				.fetch_optional(&mut *tx)
				.await?;

			match inserted {
				Some(row) => fired.push(Job::try_from(row)?),
				None => {
					// De-duplicated fire; the schedule must still advance.
					tracing::warn!(
						schedule_id = %schedule.id,
						idempotency_key = %idempotency_key,
						"duplicate job for schedule, skipping"
					);
				}
			}

			sqlx::query(
				"UPDATE schedules SET next_run_at = $2, last_run_at = NOW(), updated_at = NOW() \
				 WHERE id = $1",
			)
			.bind(schedule_id)
			.bind(next)
			.execute(&mut *tx)
			.await?;
		}

		tx.commit().await?;
		Ok(fired)
	}
}

#[async_trait]
impl ScheduleStore for ScheduleRepository {
	async fn create_schedule(&self, new: &NewSchedule) -> Result<Schedule> {
		self.create_schedule(new).await
	}

	async fn get_schedule(&self, id: &str, user_id: &str) -> Result<Schedule> {
		self.get_schedule(id, user_id).await
	}

	async fn list_schedules(&self, query: &ListSchedules) -> Result<Vec<Schedule>> {
		self.list_schedules(query).await
	}

	async fn set_schedule_paused(&self, id: &str, user_id: &str, paused: bool) -> Result<()> {
		self.set_schedule_paused(id, user_id, paused).await
	}

	async fn delete_schedule(&self, id: &str, user_id: &str) -> Result<()> {
		self.delete_schedule(id, user_id).await
	}

	async fn claim_and_fire(
		&self,
		limit: i64,
		compute_next: ComputeNext<'_>,
	) -> Result<Vec<Job>> {
		self.claim_and_fire(limit, compute_next).await
	}
}
