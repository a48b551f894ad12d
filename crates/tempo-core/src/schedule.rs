// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::job::{Backoff, HttpMethod};

/// Recurring plan that materialises concrete jobs on each cron tick.
/// `(user_id, name)` is unique. Pausing freezes `next_run_at` without
/// losing it.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Schedule {
	pub id: String,
	pub user_id: String,
	pub name: String,
	pub cron_expr: String,
	pub url: String,
	pub method: HttpMethod,
	pub headers: HashMap<String, String>,
	pub body: Option<String>,
	pub timeout_seconds: i32,
	pub max_retries: i32,
	pub backoff: Backoff,
	pub paused: bool,
	pub next_run_at: DateTime<Utc>,
	pub last_run_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Insert shape for a schedule. The store assigns id and audit timestamps.
#[derive(Debug, Clone)]
pub struct NewSchedule {
	pub user_id: String,
	pub name: String,
	pub cron_expr: String,
	pub url: String,
	pub method: HttpMethod,
	pub headers: HashMap<String, String>,
	pub body: Option<String>,
	pub timeout_seconds: i32,
	pub max_retries: i32,
	pub backoff: Backoff,
	pub paused: bool,
	pub next_run_at: DateTime<Utc>,
}

/// Convert a standard 5-field Unix cron expression to the 7-field format
/// the `cron` crate expects: seconds are pinned to `0` and the year field
/// is open.
fn to_seven_field(expression: &str) -> String {
	let field_count = expression.split_whitespace().count();
	if field_count == 5 {
		format!("0 {expression} *")
	} else {
		expression.to_string()
	}
}

fn parse_cron(expression: &str) -> Result<CronSchedule, ValidationError> {
	CronSchedule::from_str(&to_seven_field(expression))
		.map_err(|e| ValidationError::InvalidCron(e.to_string()))
}

/// Validate a cron expression without computing a tick.
pub fn validate_cron(expression: &str) -> Result<(), ValidationError> {
	parse_cron(expression).map(|_| ())
}

/// The next tick strictly after `after`.
pub fn next_after(expression: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, ValidationError> {
	let schedule = parse_cron(expression)?;
	schedule
		.after(&after)
		.next()
		.ok_or_else(|| ValidationError::InvalidCron("no future tick".to_string()))
}

/// Advance from the previous `next_run_at`, then keep advancing until the
/// result is in the future. Missed ticks after downtime collapse into a
/// single next fire instead of flooding the queue.
pub fn next_skipping_missed(
	expression: &str,
	old_next: DateTime<Utc>,
	now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ValidationError> {
	let schedule = parse_cron(expression)?;
	let mut next = schedule
		.after(&old_next)
		.next()
		.ok_or_else(|| ValidationError::InvalidCron("no future tick".to_string()))?;
	while next < now {
		next = schedule
			.after(&next)
			.next()
			.ok_or_else(|| ValidationError::InvalidCron("no future tick".to_string()))?;
	}
	Ok(next)
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn test_validate_cron_standard_expressions() {
		assert!(validate_cron("* * * * *").is_ok());
		assert!(validate_cron("*/15 * * * *").is_ok());
		assert!(validate_cron("0 9 * * 1-5").is_ok());
		assert!(validate_cron("30 3 1 * *").is_ok());
	}

	#[test]
	fn test_validate_cron_rejects_garbage() {
		assert!(validate_cron("not a cron").is_err());
		assert!(validate_cron("* * * *").is_err());
		assert!(validate_cron("61 * * * *").is_err());
	}

	#[test]
	fn test_next_after_every_minute() {
		let t = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 30).unwrap();
		let next = next_after("* * * * *", t).unwrap();
		assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 1, 12, 1, 0).unwrap());
	}

	#[test]
	fn test_next_after_is_strictly_later() {
		// Sitting exactly on a tick must advance to the following one.
		let t = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
		let next = next_after("* * * * *", t).unwrap();
		assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 1, 12, 1, 0).unwrap());
	}

	#[test]
	fn test_next_skipping_missed_collapses_downtime() {
		// Schedule last planned to fire an hour ago; after downtime the
		// next fire is the first tick in the future, not 60 backfills.
		let now = Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 30).unwrap();
		let old_next = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
		let next = next_skipping_missed("* * * * *", old_next, now).unwrap();
		assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 1, 13, 1, 0).unwrap());
	}

	#[test]
	fn test_next_skipping_missed_no_downtime() {
		let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 10).unwrap();
		let old_next = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
		let next = next_skipping_missed("* * * * *", old_next, now).unwrap();
		assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 1, 12, 1, 0).unwrap());
	}
}
