// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use tempo_core::{
	Backoff, HttpMethod, Job, JobAttempt, JobStatus, NewJob, DEFAULT_MAX_RETRIES,
	DEFAULT_TIMEOUT_SECONDS,
};
use tempo_db::{AttemptStore, JobStore, ListJobs};

use crate::api_response::ApiError;
use crate::service::{clamp_limit, cursor};

#[derive(Debug, Clone)]
pub struct CreateJobInput {
	pub user_id: String,
	pub idempotency_key: String,
	pub url: String,
	pub method: HttpMethod,
	pub headers: Option<HashMap<String, String>>,
	pub body: Option<String>,
	pub timeout_seconds: Option<i32>,
	pub scheduled_at: DateTime<Utc>,
	pub max_retries: Option<i32>,
	pub backoff: Option<Backoff>,
}

#[derive(Debug, Clone)]
pub struct ListJobsInput {
	pub user_id: String,
	pub status: Option<String>,
	pub cursor: Option<String>,
	pub limit: Option<i64>,
}

#[derive(Debug)]
pub struct ListJobsResult {
	pub jobs: Vec<Job>,
	pub next_cursor: Option<String>,
}

#[derive(Clone)]
pub struct JobService {
	jobs: Arc<dyn JobStore>,
	attempts: Arc<dyn AttemptStore>,
}

impl JobService {
	pub fn new(jobs: Arc<dyn JobStore>, attempts: Arc<dyn AttemptStore>) -> Self {
		Self { jobs, attempts }
	}

	pub async fn create_job(&self, input: CreateJobInput) -> Result<Job, ApiError> {
		let new = NewJob {
			user_id: input.user_id,
			idempotency_key: input.idempotency_key,
			url: input.url,
			method: input.method,
			headers: input.headers.unwrap_or_default(),
			body: input.body,
			timeout_seconds: input.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS),
			scheduled_at: input.scheduled_at,
			max_retries: input.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
			backoff: input.backoff.unwrap_or(Backoff::Exponential),
			schedule_id: None,
		};
		new.validate()?;
		Ok(self.jobs.create_job(&new).await?)
	}

	pub async fn get_job(&self, id: &str, user_id: &str) -> Result<Job, ApiError> {
		Ok(self.jobs.get_job(id, user_id).await?)
	}

	pub async fn list_jobs(&self, input: ListJobsInput) -> Result<ListJobsResult, ApiError> {
		let status = match &input.status {
			None => None,
			Some(raw) => Some(
				raw.parse::<JobStatus>()
					.map_err(|_| ApiError::UnknownStatusFilter(raw.clone()))?,
			),
		};
		let cursor = match &input.cursor {
			None => None,
			Some(raw) => Some(cursor::decode(raw)?),
		};
		let limit = clamp_limit(input.limit);

		// One extra row decides whether there is a next page.
		let mut jobs = self
			.jobs
			.list_jobs(&ListJobs {
				user_id: input.user_id,
				status,
				cursor,
				limit: limit + 1,
			})
			.await?;

		let next_cursor = if jobs.len() as i64 == limit + 1 {
			jobs.truncate(limit as usize);
			jobs.last().map(|job| cursor::encode(job.scheduled_at, &job.id))
		} else {
			None
		};

		Ok(ListJobsResult { jobs, next_cursor })
	}

	pub async fn cancel_job(&self, id: &str, user_id: &str) -> Result<(), ApiError> {
		Ok(self.jobs.cancel_job(id, user_id).await?)
	}

	/// Attempt history, gated on the caller owning the job.
	pub async fn list_attempts(
		&self,
		id: &str,
		user_id: &str,
	) -> Result<Vec<JobAttempt>, ApiError> {
		self.jobs.get_job(id, user_id).await?;
		Ok(self.attempts.list_attempts_by_job(id).await?)
	}
}
