// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Instant;

use axum::{
	extract::{MatchedPath, Request, State},
	http::StatusCode,
	middleware::Next,
	response::{IntoResponse, Response},
	Json,
};
use tracing::error;

use tempo_auth::CurrentUser;
use tempo_metrics::Metrics;

use crate::api::AppState;
use crate::api_response::ErrorResponse;

/// Runs after auth: upsert the caller's user row so jobs and schedules
/// can reference it.
pub async fn ensure_user(State(state): State<AppState>, request: Request, next: Next) -> Response {
	if let Some(user) = request.extensions().get::<CurrentUser>() {
		if let Err(e) = state.users.upsert_user(&user.0).await {
			error!(error = %e, "ensure user upsert failed");
			return (
				StatusCode::INTERNAL_SERVER_ERROR,
				Json(ErrorResponse {
					error: "Internal server error".to_string(),
				}),
			)
				.into_response();
		}
	}
	next.run(request).await
}

/// Request count and latency by method, matched route and status. The
/// matched route template keeps label cardinality bounded.
pub async fn http_metrics(
	State(metrics): State<Arc<Metrics>>,
	request: Request,
	next: Next,
) -> Response {
	let method = request.method().to_string();
	let path = request
		.extensions()
		.get::<MatchedPath>()
		.map(|p| p.as_str().to_string())
		.unwrap_or_else(|| "unmatched".to_string());

	let start = Instant::now();
	let response = next.run(request).await;
	let status = response.status().as_u16().to_string();

	metrics
		.http_requests_total
		.with_label_values(&[&method, &path, &status])
		.inc();
	metrics
		.http_request_duration
		.with_label_values(&[&method, &path, &status])
		.observe(start.elapsed().as_secs_f64());

	response
}
