// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::{Duration, Instant};

use tempo_core::{HttpMethod, Job};
use tracing::{error, info};

/// Outcome of one outbound request. A transport failure (connect error,
/// deadline, TLS) leaves `status_code` empty; an HTTP response of any
/// status leaves `error` empty.
#[derive(Debug)]
pub struct ExecutionResult {
	pub status_code: Option<u16>,
	pub error: Option<String>,
	pub duration: Duration,
}

/// Issues one outbound HTTP request per invocation under the job's
/// deadline. The client is built once per worker and shared.
pub struct Executor {
	client: reqwest::Client,
}

impl Default for Executor {
	fn default() -> Self {
		Self::new()
	}
}

impl Executor {
	pub fn new() -> Self {
		let client = reqwest::Client::builder()
			.min_tls_version(reqwest::tls::Version::TLS_1_2)
			.pool_idle_timeout(Duration::from_secs(90))
			.pool_max_idle_per_host(10)
			.connect_timeout(Duration::from_secs(10))
			.tcp_keepalive(Duration::from_secs(30))
			.redirect(reqwest::redirect::Policy::limited(10))
			// Per-job deadlines are set on the request; this is a safety net.
			.timeout(Duration::from_secs(5 * 60))
			.build()
			.expect("failed to build HTTP client");
		Self { client }
	}

	pub async fn run(&self, job: &Job) -> ExecutionResult {
		let start = Instant::now();

		let mut request = self
			.client
			.request(to_reqwest_method(job.method), &job.url)
			.timeout(Duration::from_secs(job.timeout_seconds as u64))
			.header("x-request-id", uuid::Uuid::new_v4().to_string());
		for (name, value) in &job.headers {
			request = request.header(name, value);
		}
		if let Some(body) = &job.body {
			request = request.body(body.clone());
		}

		info!(
			job_id = %job.id,
			method = job.method.as_str(),
			url = %job.url,
			"sending request"
		);

		let response = match request.send().await {
			Ok(response) => response,
			Err(e) => {
				error!(
					job_id = %job.id,
					error = %e,
					duration_ms = start.elapsed().as_millis() as u64,
					"request failed"
				);
				return ExecutionResult {
					status_code: None,
					error: Some(format!("do request: {e}")),
					duration: start.elapsed(),
				};
			}
		};

		let status = response.status().as_u16();
		// Drain the body so the connection can be reused by the pool.
		let _ = response.bytes().await;

		let duration = start.elapsed();
		info!(
			job_id = %job.id,
			status,
			duration_ms = duration.as_millis() as u64,
			"received response"
		);

		ExecutionResult {
			status_code: Some(status),
			error: None,
			duration,
		}
	}
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
	match method {
		HttpMethod::Get => reqwest::Method::GET,
		HttpMethod::Post => reqwest::Method::POST,
		HttpMethod::Put => reqwest::Method::PUT,
		HttpMethod::Patch => reqwest::Method::PATCH,
		HttpMethod::Delete => reqwest::Method::DELETE,
	}
}
