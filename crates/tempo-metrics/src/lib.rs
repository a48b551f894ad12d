// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Prometheus metrics for both roles.
//!
//! One `Metrics` instance is constructed at startup and shared; the
//! registry is private and exposed only through [`Metrics::encode`].

use prometheus::{
	Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts,
	Registry, TextEncoder,
};

const NAMESPACE: &str = "scheduler";

pub struct Metrics {
	registry: Registry,

	/// Time from a job becoming due to a worker claiming it.
	pub job_pickup_latency: Histogram,
	/// Outbound HTTP execution time, labelled by job outcome status.
	pub job_execution_duration: HistogramVec,
	pub jobs_in_flight: Gauge,
	/// Finished executions by outcome: success, retry or failed.
	pub jobs_completed_total: CounterVec,

	pub reaper_rescued_total: CounterVec,
	pub reaper_cycle_duration: Histogram,

	pub worker_start_time: Gauge,
	pub worker_shutdowns_total: Counter,

	pub http_request_duration: HistogramVec,
	pub http_requests_total: CounterVec,

	pub health_check_up: GaugeVec,
}

impl Default for Metrics {
	fn default() -> Self {
		Self::new()
	}
}

impl Metrics {
	pub fn new() -> Self {
		let registry = Registry::new();

		let job_pickup_latency = Histogram::with_opts(
			HistogramOpts::new(
				"job_pickup_latency_seconds",
				"Time from job creation to worker claiming it.",
			)
			.namespace(NAMESPACE)
			.buckets(vec![
				0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
			]),
		)
		.unwrap();
		registry
			.register(Box::new(job_pickup_latency.clone()))
			.unwrap();

		let job_execution_duration = HistogramVec::new(
			HistogramOpts::new(
				"job_execution_duration_seconds",
				"Duration of job HTTP execution.",
			)
			.namespace(NAMESPACE)
			.buckets(vec![
				0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
			]),
			&["status"],
		)
		.unwrap();
		registry
			.register(Box::new(job_execution_duration.clone()))
			.unwrap();

		let jobs_in_flight = Gauge::with_opts(
			Opts::new(
				"worker_jobs_in_flight",
				"Number of jobs currently being executed by the worker.",
			)
			.namespace(NAMESPACE),
		)
		.unwrap();
		registry.register(Box::new(jobs_in_flight.clone())).unwrap();

		let jobs_completed_total = CounterVec::new(
			Opts::new("jobs_completed_total", "Total jobs finished, by outcome.")
				.namespace(NAMESPACE),
			&["outcome"],
		)
		.unwrap();
		registry
			.register(Box::new(jobs_completed_total.clone()))
			.unwrap();

		let reaper_rescued_total = CounterVec::new(
			Opts::new(
				"reaper_rescued_total",
				"Total stale jobs handled by the reaper.",
			)
			.namespace(NAMESPACE),
			&["action"],
		)
		.unwrap();
		registry
			.register(Box::new(reaper_rescued_total.clone()))
			.unwrap();

		let reaper_cycle_duration = Histogram::with_opts(
			HistogramOpts::new(
				"reaper_cycle_duration_seconds",
				"Time taken for one reaper cycle.",
			)
			.namespace(NAMESPACE),
		)
		.unwrap();
		registry
			.register(Box::new(reaper_cycle_duration.clone()))
			.unwrap();

		let worker_start_time = Gauge::with_opts(
			Opts::new(
				"worker_start_time_seconds",
				"Unix timestamp when the worker started.",
			)
			.namespace(NAMESPACE),
		)
		.unwrap();
		registry
			.register(Box::new(worker_start_time.clone()))
			.unwrap();

		let worker_shutdowns_total = Counter::with_opts(
			Opts::new(
				"worker_shutdowns_total",
				"Number of times the worker has shut down.",
			)
			.namespace(NAMESPACE),
		)
		.unwrap();
		registry
			.register(Box::new(worker_shutdowns_total.clone()))
			.unwrap();

		let http_request_duration = HistogramVec::new(
			HistogramOpts::new("http_request_duration_seconds", "HTTP request latency.")
				.namespace(NAMESPACE)
				.buckets(vec![
					0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
				]),
			&["method", "path", "status"],
		)
		.unwrap();
		registry
			.register(Box::new(http_request_duration.clone()))
			.unwrap();

		let http_requests_total = CounterVec::new(
			Opts::new("http_requests_total", "Total HTTP requests.").namespace(NAMESPACE),
			&["method", "path", "status"],
		)
		.unwrap();
		registry
			.register(Box::new(http_requests_total.clone()))
			.unwrap();

		let health_check_up = GaugeVec::new(
			Opts::new(
				"health_check_up",
				"Whether a dependency is reachable. 1 = up, 0 = down.",
			)
			.namespace(NAMESPACE),
			&["dependency"],
		)
		.unwrap();
		registry.register(Box::new(health_check_up.clone())).unwrap();

		Metrics {
			registry,
			job_pickup_latency,
			job_execution_duration,
			jobs_in_flight,
			jobs_completed_total,
			reaper_rescued_total,
			reaper_cycle_duration,
			worker_start_time,
			worker_shutdowns_total,
			http_request_duration,
			http_requests_total,
			health_check_up,
		}
	}

	/// Render the registry in the Prometheus text exposition format.
	pub fn encode(&self) -> String {
		let encoder = TextEncoder::new();
		let families = self.registry.gather();
		let mut buffer = Vec::new();
		encoder.encode(&families, &mut buffer).unwrap();
		String::from_utf8(buffer).unwrap()
	}
}
