// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Job HTTP handlers.

use std::collections::HashMap;

use axum::{
	extract::{Path, Query, State},
	extract::rejection::JsonRejection,
	http::StatusCode,
	response::IntoResponse,
	Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tempo_auth::CurrentUser;
use tempo_core::{Backoff, HttpMethod, Job, JobAttempt};

use crate::api::AppState;
use crate::api_response::ApiError;
use crate::service::{CreateJobInput, ListJobsInput};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateJobRequest {
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

#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
	pub status: Option<String>,
	pub cursor: Option<String>,
	pub limit: Option<i64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ListJobsResponse {
	pub jobs: Vec<Job>,
	pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ListAttemptsResponse {
	pub attempts: Vec<JobAttempt>,
}

#[utoipa::path(
	post,
	path = "/jobs",
	request_body = CreateJobRequest,
	responses(
		(status = 201, description = "Job created", body = Job),
		(status = 400, description = "Validation failure or duplicate idempotency key"),
	),
	tag = "jobs"
)]
#[instrument(skip(state, payload))]
pub async fn create_job(
	State(state): State<AppState>,
	Extension(user): Extension<CurrentUser>,
	payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
	let Json(req) = payload.map_err(|e| ApiError::Malformed(e.body_text()))?;

	let job = state
		.job_service
		.create_job(CreateJobInput {
			user_id: user.0,
			idempotency_key: req.idempotency_key,
			url: req.url,
			method: req.method,
			headers: req.headers,
			body: req.body,
			timeout_seconds: req.timeout_seconds,
			scheduled_at: req.scheduled_at,
			max_retries: req.max_retries,
			backoff: req.backoff,
		})
		.await?;

	Ok((StatusCode::CREATED, Json(job)))
}

#[utoipa::path(
	get,
	path = "/jobs",
	params(
		("status" = Option<String>, Query, description = "Filter by job status"),
		("cursor" = Option<String>, Query, description = "Opaque page cursor"),
		("limit" = Option<i64>, Query, description = "Page size, max 100"),
	),
	responses(
		(status = 200, description = "Page of jobs", body = ListJobsResponse),
		(status = 400, description = "Unknown status filter or bad cursor"),
	),
	tag = "jobs"
)]
#[instrument(skip(state, params))]
pub async fn list_jobs(
	State(state): State<AppState>,
	Extension(user): Extension<CurrentUser>,
	Query(params): Query<ListJobsParams>,
) -> Result<impl IntoResponse, ApiError> {
	let result = state
		.job_service
		.list_jobs(ListJobsInput {
			user_id: user.0,
			status: params.status,
			cursor: params.cursor,
			limit: params.limit,
		})
		.await?;

	Ok(Json(ListJobsResponse {
		jobs: result.jobs,
		next_cursor: result.next_cursor,
	}))
}

#[utoipa::path(
	get,
	path = "/jobs/{id}",
	params(("id" = String, Path, description = "Job id")),
	responses(
		(status = 200, description = "The job", body = Job),
		(status = 404, description = "No such job for this caller"),
	),
	tag = "jobs"
)]
#[instrument(skip(state))]
pub async fn get_job(
	State(state): State<AppState>,
	Extension(user): Extension<CurrentUser>,
	Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
	let job = state.job_service.get_job(&id, &user.0).await?;
	Ok(Json(job))
}

#[utoipa::path(
	delete,
	path = "/jobs/{id}",
	params(("id" = String, Path, description = "Job id")),
	responses(
		(status = 204, description = "Job cancelled"),
		(status = 404, description = "No such job for this caller"),
		(status = 409, description = "Job is past pending"),
	),
	tag = "jobs"
)]
#[instrument(skip(state))]
pub async fn cancel_job(
	State(state): State<AppState>,
	Extension(user): Extension<CurrentUser>,
	Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
	state.job_service.cancel_job(&id, &user.0).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
	get,
	path = "/jobs/{id}/attempts",
	params(("id" = String, Path, description = "Job id")),
	responses(
		(status = 200, description = "Attempt history", body = ListAttemptsResponse),
		(status = 404, description = "No such job for this caller"),
	),
	tag = "jobs"
)]
#[instrument(skip(state))]
pub async fn list_attempts(
	State(state): State<AppState>,
	Extension(user): Extension<CurrentUser>,
	Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
	let attempts = state.job_service.list_attempts(&id, &user.0).await?;
	Ok(Json(ListAttemptsResponse { attempts }))
}
