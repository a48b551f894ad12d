// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Queue protocol tests against a real Postgres.
//!
//! These exercise the skip-locked claim paths that the in-memory store
//! can only approximate. They are ignored by default; run them with a
//! live database:
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/tempo_test cargo test -p tempo-db -- --ignored
//! ```

use std::collections::{HashMap, HashSet};

use chrono::{Duration, Utc};
use tempo_core::{Backoff, HttpMethod, JobStatus, NewJob};
use tempo_db::{
	create_pool, run_migrations, AttemptRepository, JobRepository, NewAttempt, UserRepository,
};

async fn test_pool() -> sqlx::PgPool {
	let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
	let pool = create_pool(&url).await.unwrap();
	run_migrations(&pool).await.unwrap();
	pool
}

fn unique_key(prefix: &str) -> String {
	format!("{prefix}-{}", uuid::Uuid::new_v4())
}

fn new_job(user_id: &str, key: &str) -> NewJob {
	NewJob {
		user_id: user_id.to_string(),
		idempotency_key: key.to_string(),
		url: "http://example.com/hook".to_string(),
		method: HttpMethod::Get,
		headers: HashMap::new(),
		body: None,
		timeout_seconds: 30,
		scheduled_at: Utc::now() - Duration::seconds(1),
		max_retries: 3,
		backoff: Backoff::Exponential,
		schedule_id: None,
	}
}

#[tokio::test]
#[ignore]
async fn concurrent_claims_are_disjoint() {
	let pool = test_pool().await;
	let users = UserRepository::new(pool.clone());
	let jobs = JobRepository::new(pool.clone());

	let user = unique_key("claimer");
	users.upsert_user(&user).await.unwrap();

	let mut created = HashSet::new();
	for i in 0..40 {
		let job = jobs
			.create_job(&new_job(&user, &unique_key(&format!("job-{i}"))))
			.await
			.unwrap();
		created.insert(job.id);
	}

	let mut handles = Vec::new();
	for w in 0..4 {
		let jobs = jobs.clone();
		handles.push(tokio::spawn(async move {
			let mut mine = Vec::new();
			while let Ok(batch) = jobs.claim_batch(&format!("worker-{w}"), 5).await {
				if batch.is_empty() {
					break;
				}
				mine.extend(batch.into_iter().map(|j| j.id));
			}
			mine
		}));
	}

	let mut seen = HashSet::new();
	for handle in handles {
		for id in handle.await.unwrap() {
			assert!(seen.insert(id.clone()), "job {id} claimed twice");
		}
	}
	// Other tests may be racing on the queue; every job we created must
	// have been claimed by exactly one of our workers or someone else,
	// never twice by us.
	assert!(seen.iter().filter(|id| created.contains(*id)).count() <= created.len());
}

#[tokio::test]
#[ignore]
async fn reschedule_increments_and_requeues() {
	let pool = test_pool().await;
	let users = UserRepository::new(pool.clone());
	let jobs = JobRepository::new(pool.clone());

	let user = unique_key("requeue");
	users.upsert_user(&user).await.unwrap();
	let job = jobs.create_job(&new_job(&user, &unique_key("job"))).await.unwrap();

	// Claim directly so no other worker can have it.
	let claimed = jobs.claim_batch(&unique_key("worker"), 100).await.unwrap();
	assert!(claimed.iter().any(|j| j.id == job.id));

	let retry_at = Utc::now() + Duration::seconds(120);
	jobs.reschedule_job(&job.id, "http 500", retry_at).await.unwrap();

	let current = jobs.get_job(&job.id, &user).await.unwrap();
	assert_eq!(current.status, JobStatus::Pending);
	assert_eq!(current.retry_count, 1);
	assert!(current.claimed_by.is_none());
	assert!(current.heartbeat_at.is_none());
	assert_eq!(current.last_error.as_deref(), Some("http 500"));

	// A second reschedule without a fresh claim must not double-count.
	jobs.reschedule_job(&job.id, "late worker", retry_at).await.unwrap();
	let current = jobs.get_job(&job.id, &user).await.unwrap();
	assert_eq!(current.retry_count, 1);
}

#[tokio::test]
#[ignore]
async fn duplicate_idempotency_key_maps_to_domain_error() {
	let pool = test_pool().await;
	let users = UserRepository::new(pool.clone());
	let jobs = JobRepository::new(pool.clone());

	let user = unique_key("dup");
	users.upsert_user(&user).await.unwrap();

	let key = unique_key("shared");
	jobs.create_job(&new_job(&user, &key)).await.unwrap();
	let err = jobs.create_job(&new_job(&user, &key)).await;
	assert!(matches!(err, Err(tempo_db::DbError::DuplicateJob)));
}

#[tokio::test]
#[ignore]
async fn attempt_rows_unique_per_try() {
	let pool = test_pool().await;
	let users = UserRepository::new(pool.clone());
	let jobs = JobRepository::new(pool.clone());
	let attempts = AttemptRepository::new(pool.clone());

	let user = unique_key("attempts");
	users.upsert_user(&user).await.unwrap();
	let job = jobs.create_job(&new_job(&user, &unique_key("job"))).await.unwrap();

	let attempt = attempts
		.create_attempt(&NewAttempt {
			job_id: job.id.clone(),
			attempt_num: 1,
			worker_id: "w1".to_string(),
			started_at: Utc::now(),
		})
		.await
		.unwrap();

	let dup = attempts
		.create_attempt(&NewAttempt {
			job_id: job.id.clone(),
			attempt_num: 1,
			worker_id: "w2".to_string(),
			started_at: Utc::now(),
		})
		.await;
	assert!(matches!(dup, Err(tempo_db::DbError::DuplicateAttempt)));

	attempts
		.complete_attempt(&attempt.id, Some(200), None, 42)
		.await
		.unwrap();
	let listed = attempts.list_attempts_by_job(&job.id).await.unwrap();
	assert_eq!(listed.len(), 1);
	assert_eq!(listed[0].status_code, Some(200));
	assert_eq!(listed[0].duration_ms, Some(42));
}
