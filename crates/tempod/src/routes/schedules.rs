// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Schedule HTTP handlers.

use std::collections::HashMap;

use axum::{
	extract::{Path, Query, State},
	extract::rejection::JsonRejection,
	http::StatusCode,
	response::IntoResponse,
	Extension, Json,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tempo_auth::CurrentUser;
use tempo_core::{Backoff, HttpMethod, Schedule};

use crate::api::AppState;
use crate::api_response::ApiError;
use crate::routes::jobs::ListJobsResponse;
use crate::service::{CreateScheduleInput, ListSchedulesInput};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateScheduleRequest {
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

#[derive(Debug, Deserialize)]
pub struct ListParams {
	pub cursor: Option<String>,
	pub limit: Option<i64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ListSchedulesResponse {
	pub schedules: Vec<Schedule>,
	pub next_cursor: Option<String>,
}

#[utoipa::path(
	post,
	path = "/schedules",
	request_body = CreateScheduleRequest,
	responses(
		(status = 201, description = "Schedule created", body = Schedule),
		(status = 400, description = "Validation failure, e.g. a bad cron expression"),
		(status = 409, description = "Name already in use by this caller"),
	),
	tag = "schedules"
)]
#[instrument(skip(state, payload))]
pub async fn create_schedule(
	State(state): State<AppState>,
	Extension(user): Extension<CurrentUser>,
	payload: Result<Json<CreateScheduleRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
	let Json(req) = payload.map_err(|e| ApiError::Malformed(e.body_text()))?;

	let schedule = state
		.schedule_service
		.create_schedule(CreateScheduleInput {
			user_id: user.0,
			name: req.name,
			cron_expr: req.cron_expr,
			url: req.url,
			method: req.method,
			headers: req.headers,
			body: req.body,
			timeout_seconds: req.timeout_seconds,
			max_retries: req.max_retries,
			backoff: req.backoff,
		})
		.await?;

	Ok((StatusCode::CREATED, Json(schedule)))
}

#[utoipa::path(
	get,
	path = "/schedules",
	params(
		("cursor" = Option<String>, Query, description = "Opaque page cursor"),
		("limit" = Option<i64>, Query, description = "Page size, max 100"),
	),
	responses(
		(status = 200, description = "Page of schedules", body = ListSchedulesResponse),
	),
	tag = "schedules"
)]
#[instrument(skip(state, params))]
pub async fn list_schedules(
	State(state): State<AppState>,
	Extension(user): Extension<CurrentUser>,
	Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
	let result = state
		.schedule_service
		.list_schedules(ListSchedulesInput {
			user_id: user.0,
			cursor: params.cursor,
			limit: params.limit,
		})
		.await?;

	Ok(Json(ListSchedulesResponse {
		schedules: result.schedules,
		next_cursor: result.next_cursor,
	}))
}

#[utoipa::path(
	get,
	path = "/schedules/{id}",
	params(("id" = String, Path, description = "Schedule id")),
	responses(
		(status = 200, description = "The schedule", body = Schedule),
		(status = 404, description = "No such schedule for this caller"),
	),
	tag = "schedules"
)]
#[instrument(skip(state))]
pub async fn get_schedule(
	State(state): State<AppState>,
	Extension(user): Extension<CurrentUser>,
	Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
	let schedule = state.schedule_service.get_schedule(&id, &user.0).await?;
	Ok(Json(schedule))
}

#[utoipa::path(
	post,
	path = "/schedules/{id}/pause",
	params(("id" = String, Path, description = "Schedule id")),
	responses(
		(status = 204, description = "Schedule paused"),
		(status = 404, description = "No such schedule for this caller"),
		(status = 409, description = "Already paused"),
	),
	tag = "schedules"
)]
#[instrument(skip(state))]
pub async fn pause_schedule(
	State(state): State<AppState>,
	Extension(user): Extension<CurrentUser>,
	Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
	state.schedule_service.pause_schedule(&id, &user.0).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
	post,
	path = "/schedules/{id}/resume",
	params(("id" = String, Path, description = "Schedule id")),
	responses(
		(status = 204, description = "Schedule resumed"),
		(status = 404, description = "No such schedule for this caller"),
		(status = 409, description = "Not paused"),
	),
	tag = "schedules"
)]
#[instrument(skip(state))]
pub async fn resume_schedule(
	State(state): State<AppState>,
	Extension(user): Extension<CurrentUser>,
	Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
	state.schedule_service.resume_schedule(&id, &user.0).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
	delete,
	path = "/schedules/{id}",
	params(("id" = String, Path, description = "Schedule id")),
	responses(
		(status = 204, description = "Schedule deleted; its jobs survive unlinked"),
		(status = 404, description = "No such schedule for this caller"),
	),
	tag = "schedules"
)]
#[instrument(skip(state))]
pub async fn delete_schedule(
	State(state): State<AppState>,
	Extension(user): Extension<CurrentUser>,
	Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
	state.schedule_service.delete_schedule(&id, &user.0).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
	get,
	path = "/schedules/{id}/jobs",
	params(
		("id" = String, Path, description = "Schedule id"),
		("cursor" = Option<String>, Query, description = "Opaque page cursor"),
		("limit" = Option<i64>, Query, description = "Page size, max 100"),
	),
	responses(
		(status = 200, description = "Jobs materialised by this schedule", body = ListJobsResponse),
		(status = 404, description = "No such schedule for this caller"),
	),
	tag = "schedules"
)]
#[instrument(skip(state, params))]
pub async fn list_schedule_jobs(
	State(state): State<AppState>,
	Extension(user): Extension<CurrentUser>,
	Path(id): Path<String>,
	Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
	let result = state
		.schedule_service
		.list_schedule_jobs(&id, &user.0, params.cursor, params.limit)
		.await?;

	Ok(Json(ListJobsResponse {
		jobs: result.jobs,
		next_cursor: result.next_cursor,
	}))
}
