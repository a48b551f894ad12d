// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("job not found")]
	JobNotFound,

	#[error("job with this idempotency key already exists")]
	DuplicateJob,

	#[error("job is not cancellable")]
	JobNotCancellable,

	#[error("attempt already recorded for this try")]
	DuplicateAttempt,

	#[error("schedule not found")]
	ScheduleNotFound,

	#[error("schedule with this name already exists")]
	ScheduleNameConflict,

	#[error("schedule is already paused")]
	ScheduleAlreadyPaused,

	#[error("schedule is not paused")]
	ScheduleNotPaused,

	#[error("internal: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Postgres unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

impl DbError {
	/// Whether the underlying error is a unique-constraint violation,
	/// used to map insert races onto the domain duplicate errors.
	pub fn is_unique_violation(err: &sqlx::Error) -> bool {
		match err {
			sqlx::Error::Database(db) => db
				.code()
				.map(|code| code == UNIQUE_VIOLATION)
				.unwrap_or(false),
			_ => false,
		}
	}
}
