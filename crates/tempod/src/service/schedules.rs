// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use tempo_core::{
	next_after, validate_cron, Backoff, HttpMethod, Job, NewSchedule, Schedule, ValidationError,
	DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECONDS,
};
use tempo_db::{JobStore, ListSchedules, ScheduleStore};

use crate::api_response::ApiError;
use crate::service::{clamp_limit, cursor, ListJobsResult};

#[derive(Debug, Clone)]
pub struct CreateScheduleInput {
	pub user_id: String,
	pub name: String,
	pub cron_expr: String,
	pub url: String,
	pub method: HttpMethod,
	pub headers: Option<HashMap<String, String>>,
	pub body: Option<String>,
	pub timeout_seconds: Option<i32>,
	pub max_retries: Option<i32>,
	pub backoff: Option<Backoff>,
}

#[derive(Debug, Clone)]
pub struct ListSchedulesInput {
	pub user_id: String,
	pub cursor: Option<String>,
	pub limit: Option<i64>,
}

#[derive(Debug)]
pub struct ListSchedulesResult {
	pub schedules: Vec<Schedule>,
	pub next_cursor: Option<String>,
}

#[derive(Clone)]
pub struct ScheduleService {
	schedules: Arc<dyn ScheduleStore>,
	jobs: Arc<dyn JobStore>,
}

impl ScheduleService {
	pub fn new(schedules: Arc<dyn ScheduleStore>, jobs: Arc<dyn JobStore>) -> Self {
		Self { schedules, jobs }
	}

	pub async fn create_schedule(&self, input: CreateScheduleInput) -> Result<Schedule, ApiError> {
		if input.name.is_empty() {
			return Err(ValidationError::EmptyName.into());
		}
		validate_cron(&input.cron_expr)?;
		tempo_core::job::validate_url(&input.url)?;

		let timeout_seconds = input.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
		tempo_core::job::validate_timeout_seconds(timeout_seconds)?;
		let max_retries = input.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
		tempo_core::job::validate_max_retries(max_retries)?;

		let new = NewSchedule {
			user_id: input.user_id,
			name: input.name,
			next_run_at: next_after(&input.cron_expr, Utc::now())?,
			cron_expr: input.cron_expr,
			url: input.url,
			method: input.method,
			headers: input.headers.unwrap_or_default(),
			body: input.body,
			timeout_seconds,
			max_retries,
			backoff: input.backoff.unwrap_or(Backoff::Exponential),
			paused: false,
		};
		Ok(self.schedules.create_schedule(&new).await?)
	}

	pub async fn get_schedule(&self, id: &str, user_id: &str) -> Result<Schedule, ApiError> {
		Ok(self.schedules.get_schedule(id, user_id).await?)
	}

	pub async fn list_schedules(
		&self,
		input: ListSchedulesInput,
	) -> Result<ListSchedulesResult, ApiError> {
		let cursor = match &input.cursor {
			None => None,
			Some(raw) => Some(cursor::decode(raw)?),
		};
		let limit = clamp_limit(input.limit);

		let mut schedules = self
			.schedules
			.list_schedules(&ListSchedules {
				user_id: input.user_id,
				cursor,
				limit: limit + 1,
			})
			.await?;

		let next_cursor = if schedules.len() as i64 == limit + 1 {
			schedules.truncate(limit as usize);
			schedules
				.last()
				.map(|schedule| cursor::encode(schedule.created_at, &schedule.id))
		} else {
			None
		};

		Ok(ListSchedulesResult {
			schedules,
			next_cursor,
		})
	}

	pub async fn pause_schedule(&self, id: &str, user_id: &str) -> Result<(), ApiError> {
		Ok(self.schedules.set_schedule_paused(id, user_id, true).await?)
	}

	pub async fn resume_schedule(&self, id: &str, user_id: &str) -> Result<(), ApiError> {
		Ok(self
			.schedules
			.set_schedule_paused(id, user_id, false)
			.await?)
	}

	pub async fn delete_schedule(&self, id: &str, user_id: &str) -> Result<(), ApiError> {
		Ok(self.schedules.delete_schedule(id, user_id).await?)
	}

	/// Jobs this schedule has materialised, gated on ownership.
	pub async fn list_schedule_jobs(
		&self,
		id: &str,
		user_id: &str,
		cursor: Option<String>,
		limit: Option<i64>,
	) -> Result<ListJobsResult, ApiError> {
		self.schedules.get_schedule(id, user_id).await?;

		let cursor = match &cursor {
			None => None,
			Some(raw) => Some(cursor::decode(raw)?),
		};
		let limit = clamp_limit(limit);

		let mut jobs = self
			.jobs
			.list_jobs_by_schedule(id, limit + 1, cursor)
			.await?;

		let next_cursor = if jobs.len() as i64 == limit + 1 {
			jobs.truncate(limit as usize);
			jobs.last().map(|job| cursor::encode(job.scheduled_at, &job.id))
		} else {
			None
		};

		Ok(ListJobsResult { jobs, next_cursor })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempo_db::MemoryStore;

	fn service() -> (ScheduleService, MemoryStore) {
		let store = MemoryStore::new();
		(
			ScheduleService::new(Arc::new(store.clone()), Arc::new(store.clone())),
			store,
		)
	}

	fn input(user_id: &str, name: &str) -> CreateScheduleInput {
		CreateScheduleInput {
			user_id: user_id.to_string(),
			name: name.to_string(),
			cron_expr: "*/5 * * * *".to_string(),
			url: "https://example.com/hook".to_string(),
			method: HttpMethod::Post,
			headers: None,
			body: None,
			timeout_seconds: None,
			max_retries: None,
			backoff: None,
		}
	}

	#[tokio::test]
	async fn test_create_computes_first_tick() {
		let (service, _) = service();
		let before = Utc::now();
		let schedule = service.create_schedule(input("u1", "s1")).await.unwrap();
		assert!(schedule.next_run_at > before);
		assert!(!schedule.paused);
		assert_eq!(schedule.timeout_seconds, 30);
		assert_eq!(schedule.max_retries, 3);
	}

	#[tokio::test]
	async fn test_create_rejects_bad_cron() {
		let (service, _) = service();
		let bad = CreateScheduleInput {
			cron_expr: "every five minutes".to_string(),
			..input("u1", "s1")
		};
		assert!(matches!(
			service.create_schedule(bad).await,
			Err(ApiError::Validation(ValidationError::InvalidCron(_)))
		));
	}

	#[tokio::test]
	async fn test_name_conflict_per_user() {
		let (service, _) = service();
		service.create_schedule(input("u1", "nightly")).await.unwrap();
		assert!(service.create_schedule(input("u1", "nightly")).await.is_err());
		// Other users can reuse the name.
		service.create_schedule(input("u2", "nightly")).await.unwrap();
	}

	#[tokio::test]
	async fn test_schedule_jobs_scoped_to_owner() {
		let (service, _) = service();
		let schedule = service.create_schedule(input("u1", "s1")).await.unwrap();

		let listed = service
			.list_schedule_jobs(&schedule.id, "u1", None, None)
			.await
			.unwrap();
		assert!(listed.jobs.is_empty());

		// A foreign caller sees 404-shaped not-found, not an empty list.
		assert!(service
			.list_schedule_jobs(&schedule.id, "u2", None, None)
			.await
			.is_err());
	}
}
