// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Operational listener: Prometheus exposition and health probes, bound
//! separately from the caller-facing API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
	extract::State,
	http::{header::CONTENT_TYPE, StatusCode},
	response::IntoResponse,
	routing::get,
	Json, Router,
};
use serde::Serialize;
use tracing::warn;

use tempo_metrics::Metrics;

/// Readiness dependency. Satisfied by the Postgres pool.
#[async_trait]
pub trait Pinger: Send + Sync {
	async fn ping(&self) -> Result<(), String>;
}

#[async_trait]
impl Pinger for sqlx::PgPool {
	async fn ping(&self) -> Result<(), String> {
		sqlx::query("SELECT 1")
			.execute(self)
			.await
			.map(|_| ())
			.map_err(|e| e.to_string())
	}
}

#[derive(Clone)]
pub struct OpsState {
	pub metrics: Arc<Metrics>,
	pub db: Arc<dyn Pinger>,
}

pub fn ops_router(state: OpsState) -> Router {
	Router::new()
		.route("/metrics", get(prometheus_metrics))
		.route("/healthz/live", get(liveness))
		.route("/healthz/ready", get(readiness))
		.with_state(state)
}

#[derive(Debug, Serialize)]
struct CheckResult {
	status: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	error: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResult {
	status: &'static str,
	#[serde(skip_serializing_if = "HashMap::is_empty")]
	checks: HashMap<&'static str, CheckResult>,
}

async fn prometheus_metrics(State(state): State<OpsState>) -> impl IntoResponse {
	(
		StatusCode::OK,
		[(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
		state.metrics.encode(),
	)
}

/// Always up while the process runs.
async fn liveness() -> impl IntoResponse {
	Json(HealthResult {
		status: "up",
		checks: HashMap::new(),
	})
}

/// Pings every dependency with a short deadline and reports per-check
/// status.
async fn readiness(State(state): State<OpsState>) -> impl IntoResponse {
	let mut checks = HashMap::new();

	let db_check = tokio::time::timeout(Duration::from_secs(2), state.db.ping()).await;
	let db_up = match db_check {
		Ok(Ok(())) => {
			checks.insert("postgres", CheckResult { status: "up", error: None });
			true
		}
		Ok(Err(e)) => {
			warn!(error = %e, "postgres health check failed");
			checks.insert(
				"postgres",
				CheckResult {
					status: "down",
					error: Some(e),
				},
			);
			false
		}
		Err(_) => {
			warn!("postgres health check timed out");
			checks.insert(
				"postgres",
				CheckResult {
					status: "down",
					error: Some("health check timed out".to_string()),
				},
			);
			false
		}
	};

	state
		.metrics
		.health_check_up
		.with_label_values(&["postgres"])
		.set(if db_up { 1.0 } else { 0.0 });

	let status = if db_up {
		StatusCode::OK
	} else {
		StatusCode::SERVICE_UNAVAILABLE
	};
	(
		status,
		Json(HealthResult {
			status: if db_up { "up" } else { "down" },
			checks,
		}),
	)
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::Body;
	use http_body_util::BodyExt;
	use tower::ServiceExt;

	struct AlwaysUp;
	struct AlwaysDown;

	#[async_trait]
	impl Pinger for AlwaysUp {
		async fn ping(&self) -> Result<(), String> {
			Ok(())
		}
	}

	#[async_trait]
	impl Pinger for AlwaysDown {
		async fn ping(&self) -> Result<(), String> {
			Err("connection refused".to_string())
		}
	}

	fn router(db: Arc<dyn Pinger>) -> Router {
		ops_router(OpsState {
			metrics: Arc::new(Metrics::new()),
			db,
		})
	}

	async fn body_string(response: axum::response::Response) -> String {
		let bytes = response.into_body().collect().await.unwrap().to_bytes();
		String::from_utf8(bytes.to_vec()).unwrap()
	}

	#[tokio::test]
	async fn test_liveness_always_ok() {
		let response = router(Arc::new(AlwaysDown))
			.oneshot(
				axum::http::Request::builder()
					.uri("/healthz/live")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		assert!(body_string(response).await.contains("\"up\""));
	}

	#[tokio::test]
	async fn test_readiness_up() {
		let response = router(Arc::new(AlwaysUp))
			.oneshot(
				axum::http::Request::builder()
					.uri("/healthz/ready")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let body = body_string(response).await;
		assert!(body.contains("postgres"));
	}

	#[tokio::test]
	async fn test_readiness_down_is_503() {
		let response = router(Arc::new(AlwaysDown))
			.oneshot(
				axum::http::Request::builder()
					.uri("/healthz/ready")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
		let body = body_string(response).await;
		assert!(body.contains("connection refused"));
	}

	#[tokio::test]
	async fn test_metrics_exposition() {
		let response = router(Arc::new(AlwaysUp))
			.oneshot(
				axum::http::Request::builder()
					.uri("/metrics")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let body = body_string(response).await;
		assert!(body.contains("scheduler_worker_jobs_in_flight"));
	}
}
