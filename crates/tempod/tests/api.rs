// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Router-level tests over the in-memory store: status mapping,
//! ownership scoping and the error body contract.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header::AUTHORIZATION, header::CONTENT_TYPE, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use tempo_auth::{issue_token, Verifier};
use tempo_db::MemoryStore;
use tempo_metrics::Metrics;
use tempod::{create_router, AppState};

const SECRET: &[u8] = b"api-test-secret";

fn app() -> Router {
	let store = MemoryStore::new();
	let state = AppState::new(
		Arc::new(store.clone()),
		Arc::new(store.clone()),
		Arc::new(store.clone()),
		Arc::new(store),
		Arc::new(Metrics::new()),
	);
	create_router(state, Arc::new(Verifier::new(SECRET)))
}

fn bearer(user: &str) -> String {
	format!("Bearer {}", issue_token(SECRET, user, 300))
}

async fn send(
	app: &Router,
	method: Method,
	uri: &str,
	user: Option<&str>,
	body: Option<Value>,
) -> (StatusCode, Value) {
	let mut builder = Request::builder().method(method).uri(uri);
	if let Some(user) = user {
		builder = builder.header(AUTHORIZATION, bearer(user));
	}
	let request = match body {
		Some(body) => builder
			.header(CONTENT_TYPE, "application/json")
			.body(Body::from(body.to_string()))
			.unwrap(),
		None => builder.body(Body::empty()).unwrap(),
	};

	let response = app.clone().oneshot(request).await.unwrap();
	let status = response.status();
	let bytes = response.into_body().collect().await.unwrap().to_bytes();
	let value = if bytes.is_empty() {
		Value::Null
	} else {
		serde_json::from_slice(&bytes).unwrap_or(Value::Null)
	};
	(status, value)
}

fn job_payload(key: &str) -> Value {
	json!({
		"idempotency_key": key,
		"url": "https://example.com/hook",
		"method": "POST",
		"scheduled_at": "2030-01-01T00:00:00Z",
	})
}

fn schedule_payload(name: &str) -> Value {
	json!({
		"name": name,
		"cron_expr": "*/5 * * * *",
		"url": "https://example.com/hook",
		"method": "GET",
	})
}

#[tokio::test]
async fn missing_token_is_401() {
	let app = app();
	let (status, body) = send(&app, Method::GET, "/jobs", None, None).await;
	assert_eq!(status, StatusCode::UNAUTHORIZED);
	assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn create_and_fetch_job() {
	let app = app();
	let (status, created) =
		send(&app, Method::POST, "/jobs", Some("u1"), Some(job_payload("k1"))).await;
	assert_eq!(status, StatusCode::CREATED);
	assert_eq!(created["status"], "pending");
	assert_eq!(created["max_retries"], 3);
	assert_eq!(created["timeout_seconds"], 30);
	assert_eq!(created["backoff"], "exponential");

	let id = created["id"].as_str().unwrap();
	let (status, fetched) =
		send(&app, Method::GET, &format!("/jobs/{id}"), Some("u1"), None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(fetched["id"], created["id"]);
	assert_eq!(fetched["created_at"], created["created_at"]);
}

#[tokio::test]
async fn duplicate_idempotency_key_is_400() {
	let app = app();
	let (status, _) =
		send(&app, Method::POST, "/jobs", Some("u1"), Some(job_payload("k1"))).await;
	assert_eq!(status, StatusCode::CREATED);

	let (status, body) =
		send(&app, Method::POST, "/jobs", Some("u1"), Some(job_payload("k1"))).await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert!(body["error"].as_str().unwrap().contains("idempotency key"));

	// Same key from a different caller is a different job.
	let (status, _) =
		send(&app, Method::POST, "/jobs", Some("u2"), Some(job_payload("k1"))).await;
	assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn malformed_payloads_are_400() {
	let app = app();
	let (status, _) = send(
		&app,
		Method::POST,
		"/jobs",
		Some("u1"),
		Some(json!({"idempotency_key": "k1"})),
	)
	.await;
	assert_eq!(status, StatusCode::BAD_REQUEST);

	// Unsupported method enum value.
	let mut bad_method = job_payload("k2");
	bad_method["method"] = json!("HEAD");
	let (status, _) = send(&app, Method::POST, "/jobs", Some("u1"), Some(bad_method)).await;
	assert_eq!(status, StatusCode::BAD_REQUEST);

	// Timeout outside [1, 3600].
	let mut bad_timeout = job_payload("k3");
	bad_timeout["timeout_seconds"] = json!(7200);
	let (status, body) = send(&app, Method::POST, "/jobs", Some("u1"), Some(bad_timeout)).await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert!(body["error"].as_str().unwrap().contains("timeout_seconds"));
}

#[tokio::test]
async fn foreign_jobs_read_as_not_found() {
	let app = app();
	let (_, created) =
		send(&app, Method::POST, "/jobs", Some("owner"), Some(job_payload("k1"))).await;
	let id = created["id"].as_str().unwrap();

	for (method, uri) in [
		(Method::GET, format!("/jobs/{id}")),
		(Method::DELETE, format!("/jobs/{id}")),
		(Method::GET, format!("/jobs/{id}/attempts")),
	] {
		let (status, body) = send(&app, method, &uri, Some("intruder"), None).await;
		assert_eq!(status, StatusCode::NOT_FOUND, "{uri} leaked");
		assert_eq!(body["error"], "job not found");
	}
}

#[tokio::test]
async fn cancel_transitions_and_conflicts() {
	let app = app();
	let (_, created) =
		send(&app, Method::POST, "/jobs", Some("u1"), Some(job_payload("k1"))).await;
	let id = created["id"].as_str().unwrap();

	let (status, _) = send(&app, Method::DELETE, &format!("/jobs/{id}"), Some("u1"), None).await;
	assert_eq!(status, StatusCode::NO_CONTENT);

	// Cancelling a cancelled job is a state-machine conflict.
	let (status, _) = send(&app, Method::DELETE, &format!("/jobs/{id}"), Some("u1"), None).await;
	assert_eq!(status, StatusCode::CONFLICT);

	let (status, fetched) =
		send(&app, Method::GET, &format!("/jobs/{id}"), Some("u1"), None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(fetched["status"], "cancelled");
}

#[tokio::test]
async fn list_jobs_filters_and_validates() {
	let app = app();
	for i in 0..3 {
		send(
			&app,
			Method::POST,
			"/jobs",
			Some("u1"),
			Some(job_payload(&format!("k{i}"))),
		)
		.await;
	}

	let (status, body) = send(&app, Method::GET, "/jobs", Some("u1"), None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["jobs"].as_array().unwrap().len(), 3);
	assert!(body["next_cursor"].is_null());

	let (status, body) =
		send(&app, Method::GET, "/jobs?status=pending", Some("u1"), None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["jobs"].as_array().unwrap().len(), 3);

	let (status, _) = send(&app, Method::GET, "/jobs?status=sleeping", Some("u1"), None).await;
	assert_eq!(status, StatusCode::BAD_REQUEST);

	let (status, _) = send(&app, Method::GET, "/jobs?cursor=zzz!!!", Some("u1"), None).await;
	assert_eq!(status, StatusCode::BAD_REQUEST);

	// Another caller sees nothing.
	let (status, body) = send(&app, Method::GET, "/jobs", Some("u2"), None).await;
	assert_eq!(status, StatusCode::OK);
	assert!(body["jobs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn attempts_endpoint_scoped_to_owner() {
	let app = app();
	let (_, created) =
		send(&app, Method::POST, "/jobs", Some("u1"), Some(job_payload("k1"))).await;
	let id = created["id"].as_str().unwrap();

	let (status, body) = send(
		&app,
		Method::GET,
		&format!("/jobs/{id}/attempts"),
		Some("u1"),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	assert!(body["attempts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn schedule_lifecycle() {
	let app = app();
	let (status, created) = send(
		&app,
		Method::POST,
		"/schedules",
		Some("u1"),
		Some(schedule_payload("nightly")),
	)
	.await;
	assert_eq!(status, StatusCode::CREATED);
	assert_eq!(created["paused"], false);
	assert!(created["next_run_at"].is_string());
	let id = created["id"].as_str().unwrap();

	// Name conflict for the same caller.
	let (status, _) = send(
		&app,
		Method::POST,
		"/schedules",
		Some("u1"),
		Some(schedule_payload("nightly")),
	)
	.await;
	assert_eq!(status, StatusCode::CONFLICT);

	// Pause, double-pause conflict, resume.
	let (status, _) = send(
		&app,
		Method::POST,
		&format!("/schedules/{id}/pause"),
		Some("u1"),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::NO_CONTENT);
	let (status, _) = send(
		&app,
		Method::POST,
		&format!("/schedules/{id}/pause"),
		Some("u1"),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::CONFLICT);
	let (status, _) = send(
		&app,
		Method::POST,
		&format!("/schedules/{id}/resume"),
		Some("u1"),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::NO_CONTENT);

	// Jobs listing exists and is empty before any fire.
	let (status, body) = send(
		&app,
		Method::GET,
		&format!("/schedules/{id}/jobs"),
		Some("u1"),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	assert!(body["jobs"].as_array().unwrap().is_empty());

	let (status, _) = send(
		&app,
		Method::DELETE,
		&format!("/schedules/{id}"),
		Some("u1"),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::NO_CONTENT);
	let (status, _) = send(&app, Method::GET, &format!("/schedules/{id}"), Some("u1"), None).await;
	assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bad_cron_is_400() {
	let app = app();
	let mut payload = schedule_payload("broken");
	payload["cron_expr"] = json!("every day at noon");
	let (status, body) = send(&app, Method::POST, "/schedules", Some("u1"), Some(payload)).await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert!(body["error"].as_str().unwrap().contains("cron"));
}

#[tokio::test]
async fn foreign_schedules_read_as_not_found() {
	let app = app();
	let (_, created) = send(
		&app,
		Method::POST,
		"/schedules",
		Some("owner"),
		Some(schedule_payload("private")),
	)
	.await;
	let id = created["id"].as_str().unwrap();

	for (method, uri) in [
		(Method::GET, format!("/schedules/{id}")),
		(Method::POST, format!("/schedules/{id}/pause")),
		(Method::POST, format!("/schedules/{id}/resume")),
		(Method::DELETE, format!("/schedules/{id}")),
		(Method::GET, format!("/schedules/{id}/jobs")),
	] {
		let (status, body) = send(&app, method, &uri, Some("intruder"), None).await;
		assert_eq!(status, StatusCode::NOT_FOUND, "{uri} leaked");
		assert_eq!(body["error"], "schedule not found");
	}
}
