// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::Result;
use crate::store::UserStore;

/// Caller identities are opaque external ids; only the row's existence
/// matters, for the jobs and schedules foreign keys.
#[derive(Clone)]
pub struct UserRepository {
	pool: PgPool,
}

impl UserRepository {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self))]
	pub async fn upsert_user(&self, id: &str) -> Result<()> {
		sqlx::query("INSERT INTO users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
			.bind(id)
			.execute(&self.pool)
			.await?;
		Ok(())
	}
}

#[async_trait]
impl UserStore for UserRepository {
	async fn upsert_user(&self, id: &str) -> Result<()> {
		self.upsert_user(id).await
	}
}
