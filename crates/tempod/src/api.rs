// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! API router assembly.

use std::sync::Arc;

use axum::{
	middleware as axum_middleware,
	routing::{get, post},
	Router,
};

use tempo_auth::{require_auth, Verifier};
use tempo_db::{AttemptStore, JobStore, ScheduleStore, UserStore};
use tempo_metrics::Metrics;

use crate::middleware::{ensure_user, http_metrics};
use crate::routes::{jobs, schedules};
use crate::service::{JobService, ScheduleService};

#[derive(Clone)]
pub struct AppState {
	pub job_service: JobService,
	pub schedule_service: ScheduleService,
	pub users: Arc<dyn UserStore>,
	pub metrics: Arc<Metrics>,
}

impl AppState {
	pub fn new(
		jobs: Arc<dyn JobStore>,
		attempts: Arc<dyn AttemptStore>,
		schedules: Arc<dyn ScheduleStore>,
		users: Arc<dyn UserStore>,
		metrics: Arc<Metrics>,
	) -> Self {
		Self {
			job_service: JobService::new(Arc::clone(&jobs), attempts),
			schedule_service: ScheduleService::new(schedules, jobs),
			users,
			metrics,
		}
	}
}

/// All caller-facing routes sit behind bearer auth; after auth the
/// caller's user row is upserted so ownership foreign keys always hold.
pub fn create_router(state: AppState, verifier: Arc<Verifier>) -> Router {
	Router::new()
		.route("/jobs", post(jobs::create_job).get(jobs::list_jobs))
		.route("/jobs/{id}", get(jobs::get_job).delete(jobs::cancel_job))
		.route("/jobs/{id}/attempts", get(jobs::list_attempts))
		.route(
			"/schedules",
			post(schedules::create_schedule).get(schedules::list_schedules),
		)
		.route(
			"/schedules/{id}",
			get(schedules::get_schedule).delete(schedules::delete_schedule),
		)
		.route("/schedules/{id}/pause", post(schedules::pause_schedule))
		.route("/schedules/{id}/resume", post(schedules::resume_schedule))
		.route("/schedules/{id}/jobs", get(schedules::list_schedule_jobs))
		.layer(axum_middleware::from_fn_with_state(state.clone(), ensure_user))
		.layer(axum_middleware::from_fn_with_state(verifier, require_auth))
		.layer(axum_middleware::from_fn_with_state(
			Arc::clone(&state.metrics),
			http_metrics,
		))
		.with_state(state)
}
