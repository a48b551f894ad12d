// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::PgPool;

use crate::error::Result;

/// Apply the schema. Every statement is idempotent, so both roles can run
/// this at startup in any order.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
	for statement in STATEMENTS {
		sqlx::query(statement).execute(pool).await?;
	}
	tracing::info!("database migrations applied");
	Ok(())
}

const STATEMENTS: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS users (
		id         TEXT PRIMARY KEY,
		created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS schedules (
		id              UUID PRIMARY KEY DEFAULT gen_random_uuid(),
		user_id         TEXT NOT NULL REFERENCES users(id),
		name            TEXT NOT NULL,
		cron_expr       TEXT NOT NULL,
		url             TEXT NOT NULL,
		method          TEXT NOT NULL CHECK (method IN ('GET', 'POST', 'PUT', 'PATCH', 'DELETE')),
		headers         JSONB NOT NULL DEFAULT '{}'::jsonb,
		body            TEXT,
		timeout_seconds INTEGER NOT NULL CHECK (timeout_seconds BETWEEN 1 AND 3600),
		max_retries     INTEGER NOT NULL CHECK (max_retries BETWEEN 0 AND 20),
		backoff         TEXT NOT NULL CHECK (backoff IN ('exponential', 'linear')),
		paused          BOOLEAN NOT NULL DEFAULT FALSE,
		next_run_at     TIMESTAMPTZ NOT NULL,
		last_run_at     TIMESTAMPTZ,
		created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
		updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
		UNIQUE (user_id, name)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS jobs (
		id              UUID PRIMARY KEY DEFAULT gen_random_uuid(),
		user_id         TEXT NOT NULL REFERENCES users(id),
		idempotency_key TEXT NOT NULL,
		url             TEXT NOT NULL,
		method          TEXT NOT NULL CHECK (method IN ('GET', 'POST', 'PUT', 'PATCH', 'DELETE')),
		headers         JSONB NOT NULL DEFAULT '{}'::jsonb,
		body            TEXT,
		timeout_seconds INTEGER NOT NULL CHECK (timeout_seconds BETWEEN 1 AND 3600),
		status          TEXT NOT NULL DEFAULT 'pending'
		                CHECK (status IN ('pending', 'running', 'completed', 'failed', 'cancelled')),
		scheduled_at    TIMESTAMPTZ NOT NULL,
		retry_count     INTEGER NOT NULL DEFAULT 0,
		max_retries     INTEGER NOT NULL CHECK (max_retries BETWEEN 0 AND 20),
		backoff         TEXT NOT NULL CHECK (backoff IN ('exponential', 'linear')),
		claimed_at      TIMESTAMPTZ,
		claimed_by      TEXT,
		heartbeat_at    TIMESTAMPTZ,
		completed_at    TIMESTAMPTZ,
		last_error      TEXT,
		schedule_id     UUID REFERENCES schedules(id) ON DELETE SET NULL,
		created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
		updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
		UNIQUE (user_id, idempotency_key)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS job_attempts (
		id           UUID PRIMARY KEY DEFAULT gen_random_uuid(),
		job_id       UUID NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
		attempt_num  INTEGER NOT NULL,
		worker_id    TEXT NOT NULL,
		started_at   TIMESTAMPTZ NOT NULL,
		completed_at TIMESTAMPTZ,
		status_code  INTEGER,
		error        TEXT,
		duration_ms  BIGINT,
		UNIQUE (job_id, attempt_num)
	)
	"#,
	// Partial indexes sized to each loop's scan.
	r#"
	CREATE INDEX IF NOT EXISTS idx_jobs_pending_scheduled
		ON jobs (scheduled_at) WHERE status = 'pending'
	"#,
	r#"
	CREATE INDEX IF NOT EXISTS idx_jobs_running_heartbeat
		ON jobs (heartbeat_at) WHERE status = 'running'
	"#,
	r#"
	CREATE INDEX IF NOT EXISTS idx_jobs_user_listing
		ON jobs (user_id, scheduled_at DESC, id DESC)
	"#,
	r#"
	CREATE INDEX IF NOT EXISTS idx_jobs_schedule
		ON jobs (schedule_id) WHERE schedule_id IS NOT NULL
	"#,
	r#"
	CREATE INDEX IF NOT EXISTS idx_schedules_due
		ON schedules (next_run_at) WHERE NOT paused
	"#,
	r#"
	CREATE INDEX IF NOT EXISTS idx_job_attempts_job
		ON job_attempts (job_id, started_at)
	"#,
];
