// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error-to-response mapping for the API.
//!
//! Ownership failures surface as 404 so existence of another caller's
//! resources is never leaked; state-machine violations are 409; every
//! validation problem is 400 with the message in the body.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;

use tempo_core::ValidationError;
use tempo_db::DbError;

/// Wire shape of every error: `{"error": "<message>"}`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
	pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
	Db(DbError),
	Validation(ValidationError),
	BadCursor,
	UnknownStatusFilter(String),
	Malformed(String),
}

impl From<DbError> for ApiError {
	fn from(err: DbError) -> Self {
		ApiError::Db(err)
	}
}

impl From<ValidationError> for ApiError {
	fn from(err: ValidationError) -> Self {
		ApiError::Validation(err)
	}
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
	(
		status,
		Json(ErrorResponse {
			error: message.into(),
		}),
	)
		.into_response()
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		match self {
			ApiError::Db(err) => match err {
				DbError::JobNotFound | DbError::ScheduleNotFound => {
					error_response(StatusCode::NOT_FOUND, err.to_string())
				}
				DbError::DuplicateJob => error_response(StatusCode::BAD_REQUEST, err.to_string()),
				DbError::ScheduleNameConflict
				| DbError::JobNotCancellable
				| DbError::ScheduleAlreadyPaused
				| DbError::ScheduleNotPaused => {
					error_response(StatusCode::CONFLICT, err.to_string())
				}
				DbError::Sqlx(_) | DbError::Internal(_) | DbError::DuplicateAttempt => {
					tracing::error!(error = %err, "request failed on store error");
					error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
				}
			},
			ApiError::Validation(err) => error_response(StatusCode::BAD_REQUEST, err.to_string()),
			ApiError::BadCursor => error_response(StatusCode::BAD_REQUEST, "invalid cursor"),
			ApiError::UnknownStatusFilter(raw) => error_response(
				StatusCode::BAD_REQUEST,
				format!("unknown status filter: {raw}"),
			),
			ApiError::Malformed(message) => error_response(StatusCode::BAD_REQUEST, message),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn status_of(err: ApiError) -> StatusCode {
		err.into_response().status()
	}

	#[test]
	fn test_not_found_mapping() {
		assert_eq!(status_of(ApiError::Db(DbError::JobNotFound)), StatusCode::NOT_FOUND);
		assert_eq!(
			status_of(ApiError::Db(DbError::ScheduleNotFound)),
			StatusCode::NOT_FOUND
		);
	}

	#[test]
	fn test_duplicate_job_is_bad_request() {
		assert_eq!(
			status_of(ApiError::Db(DbError::DuplicateJob)),
			StatusCode::BAD_REQUEST
		);
	}

	#[test]
	fn test_conflicts() {
		assert_eq!(
			status_of(ApiError::Db(DbError::JobNotCancellable)),
			StatusCode::CONFLICT
		);
		assert_eq!(
			status_of(ApiError::Db(DbError::ScheduleNameConflict)),
			StatusCode::CONFLICT
		);
		assert_eq!(
			status_of(ApiError::Db(DbError::ScheduleAlreadyPaused)),
			StatusCode::CONFLICT
		);
	}

	#[test]
	fn test_infrastructure_errors_are_opaque_500s() {
		assert_eq!(
			status_of(ApiError::Db(DbError::Internal("boom".to_string()))),
			StatusCode::INTERNAL_SERVER_ERROR
		);
	}

	#[test]
	fn test_validation_is_bad_request() {
		assert_eq!(
			status_of(ApiError::Validation(ValidationError::TimeoutOutOfRange)),
			StatusCode::BAD_REQUEST
		);
		assert_eq!(status_of(ApiError::BadCursor), StatusCode::BAD_REQUEST);
	}
}
