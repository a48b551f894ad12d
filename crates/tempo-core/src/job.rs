// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const TIMEOUT_SECONDS_MIN: i32 = 1;
pub const TIMEOUT_SECONDS_MAX: i32 = 3600;
pub const MAX_RETRIES_LIMIT: i32 = 20;
pub const DEFAULT_TIMEOUT_SECONDS: i32 = 30;
pub const DEFAULT_MAX_RETRIES: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
	Pending,
	Running,
	Completed,
	Failed,
	Cancelled,
}

impl JobStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			JobStatus::Pending => "pending",
			JobStatus::Running => "running",
			JobStatus::Completed => "completed",
			JobStatus::Failed => "failed",
			JobStatus::Cancelled => "cancelled",
		}
	}

	/// Terminal statuses admit no further transitions.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
		)
	}
}

impl std::str::FromStr for JobStatus {
	type Err = ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(JobStatus::Pending),
			"running" => Ok(JobStatus::Running),
			"completed" => Ok(JobStatus::Completed),
			"failed" => Ok(JobStatus::Failed),
			"cancelled" => Ok(JobStatus::Cancelled),
			_ => Err(ValidationError::UnknownStatus(s.to_string())),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
	Exponential,
	Linear,
}

impl Backoff {
	pub fn as_str(&self) -> &'static str {
		match self {
			Backoff::Exponential => "exponential",
			Backoff::Linear => "linear",
		}
	}
}

impl std::str::FromStr for Backoff {
	type Err = ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"exponential" => Ok(Backoff::Exponential),
			"linear" => Ok(Backoff::Linear),
			_ => Err(ValidationError::UnknownBackoff(s.to_string())),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum HttpMethod {
	#[serde(rename = "GET")]
	Get,
	#[serde(rename = "POST")]
	Post,
	#[serde(rename = "PUT")]
	Put,
	#[serde(rename = "PATCH")]
	Patch,
	#[serde(rename = "DELETE")]
	Delete,
}

impl HttpMethod {
	pub fn as_str(&self) -> &'static str {
		match self {
			HttpMethod::Get => "GET",
			HttpMethod::Post => "POST",
			HttpMethod::Put => "PUT",
			HttpMethod::Patch => "PATCH",
			HttpMethod::Delete => "DELETE",
		}
	}
}

impl std::str::FromStr for HttpMethod {
	type Err = ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"GET" => Ok(HttpMethod::Get),
			"POST" => Ok(HttpMethod::Post),
			"PUT" => Ok(HttpMethod::Put),
			"PATCH" => Ok(HttpMethod::Patch),
			"DELETE" => Ok(HttpMethod::Delete),
			_ => Err(ValidationError::UnknownMethod(s.to_string())),
		}
	}
}

/// One dispatch unit: an outbound HTTP request plus its scheduling and
/// execution bookkeeping. `(user_id, idempotency_key)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Job {
	pub id: String,
	pub user_id: String,
	pub idempotency_key: String,
	pub url: String,
	pub method: HttpMethod,
	pub headers: HashMap<String, String>,
	pub body: Option<String>,
	pub timeout_seconds: i32,

	pub status: JobStatus,
	pub scheduled_at: DateTime<Utc>,

	pub retry_count: i32,
	pub max_retries: i32,
	pub backoff: Backoff,

	pub claimed_at: Option<DateTime<Utc>>,
	pub claimed_by: Option<String>,
	pub heartbeat_at: Option<DateTime<Utc>>,
	pub completed_at: Option<DateTime<Utc>>,
	pub last_error: Option<String>,

	pub schedule_id: Option<String>,

	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Insert shape for a job. The store assigns id, status, retry_count and
/// the audit timestamps.
#[derive(Debug, Clone)]
pub struct NewJob {
	pub user_id: String,
	pub idempotency_key: String,
	pub url: String,
	pub method: HttpMethod,
	pub headers: HashMap<String, String>,
	pub body: Option<String>,
	pub timeout_seconds: i32,
	pub scheduled_at: DateTime<Utc>,
	pub max_retries: i32,
	pub backoff: Backoff,
	pub schedule_id: Option<String>,
}

impl NewJob {
	/// Validate the fields a caller controls. The store enforces the
	/// uniqueness constraints.
	pub fn validate(&self) -> Result<(), ValidationError> {
		if self.idempotency_key.is_empty() {
			return Err(ValidationError::EmptyIdempotencyKey);
		}
		validate_url(&self.url)?;
		validate_timeout_seconds(self.timeout_seconds)?;
		validate_max_retries(self.max_retries)?;
		Ok(())
	}
}

/// One execution record per try. `(job_id, attempt_num)` is unique and
/// `attempt_num` equals the job's `retry_count + 1` at open time. An
/// attempt with `completed_at = None` is still in flight, or its worker
/// crashed.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct JobAttempt {
	pub id: String,
	pub job_id: String,
	pub attempt_num: i32,
	pub worker_id: String,
	pub started_at: DateTime<Utc>,
	pub completed_at: Option<DateTime<Utc>>,
	pub status_code: Option<i32>,
	pub error: Option<String>,
	pub duration_ms: Option<i64>,
}

pub fn validate_url(raw: &str) -> Result<(), ValidationError> {
	let parsed = url::Url::parse(raw).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;
	match parsed.scheme() {
		"http" | "https" => Ok(()),
		_ => Err(ValidationError::UnsupportedScheme),
	}
}

pub fn validate_timeout_seconds(timeout_seconds: i32) -> Result<(), ValidationError> {
	if !(TIMEOUT_SECONDS_MIN..=TIMEOUT_SECONDS_MAX).contains(&timeout_seconds) {
		return Err(ValidationError::TimeoutOutOfRange);
	}
	Ok(())
}

pub fn validate_max_retries(max_retries: i32) -> Result<(), ValidationError> {
	if !(0..=MAX_RETRIES_LIMIT).contains(&max_retries) {
		return Err(ValidationError::MaxRetriesOutOfRange);
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_round_trip() {
		for s in ["pending", "running", "completed", "failed", "cancelled"] {
			let parsed: JobStatus = s.parse().unwrap();
			assert_eq!(parsed.as_str(), s);
		}
	}

	#[test]
	fn test_status_unknown() {
		assert!("queued".parse::<JobStatus>().is_err());
	}

	#[test]
	fn test_terminal_statuses() {
		assert!(!JobStatus::Pending.is_terminal());
		assert!(!JobStatus::Running.is_terminal());
		assert!(JobStatus::Completed.is_terminal());
		assert!(JobStatus::Failed.is_terminal());
		assert!(JobStatus::Cancelled.is_terminal());
	}

	#[test]
	fn test_method_round_trip() {
		for m in ["GET", "POST", "PUT", "PATCH", "DELETE"] {
			let parsed: HttpMethod = m.parse().unwrap();
			assert_eq!(parsed.as_str(), m);
		}
	}

	#[test]
	fn test_method_rejects_lowercase() {
		assert!("get".parse::<HttpMethod>().is_err());
		assert!("HEAD".parse::<HttpMethod>().is_err());
	}

	#[test]
	fn test_backoff_round_trip() {
		for b in ["exponential", "linear"] {
			let parsed: Backoff = b.parse().unwrap();
			assert_eq!(parsed.as_str(), b);
		}
		assert!("fibonacci".parse::<Backoff>().is_err());
	}

	#[test]
	fn test_validate_url() {
		assert!(validate_url("http://example.com/hook").is_ok());
		assert!(validate_url("https://example.com/hook?x=1").is_ok());
		assert!(validate_url("ftp://example.com").is_err());
		assert!(validate_url("not a url").is_err());
		assert!(validate_url("").is_err());
	}

	#[test]
	fn test_validate_timeout_bounds() {
		assert!(validate_timeout_seconds(1).is_ok());
		assert!(validate_timeout_seconds(3600).is_ok());
		assert!(validate_timeout_seconds(0).is_err());
		assert!(validate_timeout_seconds(3601).is_err());
	}

	#[test]
	fn test_validate_max_retries_bounds() {
		assert!(validate_max_retries(0).is_ok());
		assert!(validate_max_retries(20).is_ok());
		assert!(validate_max_retries(-1).is_err());
		assert!(validate_max_retries(21).is_err());
	}

	#[test]
	fn test_new_job_validate() {
		let job = NewJob {
			user_id: "user-1".to_string(),
			idempotency_key: "key-1".to_string(),
			url: "https://example.com/hook".to_string(),
			method: HttpMethod::Post,
			headers: HashMap::new(),
			body: None,
			timeout_seconds: 30,
			scheduled_at: Utc::now(),
			max_retries: 3,
			backoff: Backoff::Exponential,
			schedule_id: None,
		};
		assert!(job.validate().is_ok());

		let empty_key = NewJob {
			idempotency_key: String::new(),
			..job.clone()
		};
		assert!(matches!(
			empty_key.validate(),
			Err(ValidationError::EmptyIdempotencyKey)
		));

		let bad_timeout = NewJob {
			timeout_seconds: 7200,
			..job
		};
		assert!(matches!(
			bad_timeout.validate(),
			Err(ValidationError::TimeoutOutOfRange)
		));
	}
}
