// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::Result;

/// Create a PgPool with the tuning this system depends on under
/// container restarts and database failovers.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
	let pool = PgPoolOptions::new()
		.max_connections(25)
		.min_connections(5)
		.max_lifetime(Duration::from_secs(60 * 60))
		.idle_timeout(Duration::from_secs(30 * 60))
		.acquire_timeout(Duration::from_secs(5))
		.test_before_acquire(true)
		.connect(database_url)
		.await?;

	// Fail fast at startup rather than on the first query.
	sqlx::query("SELECT 1").execute(&pool).await?;

	tracing::debug!("database pool created");
	Ok(pool)
}
