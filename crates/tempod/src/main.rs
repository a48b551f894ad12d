// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! tempod binary: `serve` runs the API role, `scheduler` runs the
//! worker, reaper and dispatcher loops. Both share one Postgres store
//! and expose metrics and health probes on a separate listener.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tower_http::{
	cors::{Any, CorsLayer},
	trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tempo_auth::Verifier;
use tempo_config::{Config, Environment};
use tempo_db::{
	AttemptRepository, AttemptStore, JobRepository, JobStore, ScheduleRepository, ScheduleStore,
	UserRepository, UserStore,
};
use tempo_metrics::Metrics;
use tempo_scheduler::{
	reaper::{DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_REAP_INTERVAL},
	Dispatcher, Executor, Reaper, Worker,
};
use tempod::ops::{ops_router, OpsState};
use tempod::{create_router, AppState};

/// tempo - distributed HTTP job scheduler.
#[derive(Parser, Debug)]
#[command(name = "tempod", about = "tempo job scheduler", version)]
struct Args {
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the caller-facing API role.
	Serve,
	/// Run the worker, reaper and dispatcher loops.
	Scheduler,
	/// Show version information.
	Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	if let Command::Version = args.command {
		println!("tempod {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	// Load .env file if present.
	dotenvy::dotenv().ok();

	let config = tempo_config::load_config()?;
	init_tracing(&config);

	let pool = tempo_db::create_pool(&config.database.url).await?;
	tempo_db::run_migrations(&pool).await?;
	info!("db connected");

	let metrics = Arc::new(Metrics::new());

	match args.command {
		Command::Serve => run_serve(config, pool, metrics).await,
		Command::Scheduler => run_scheduler(config, pool, metrics).await,
		Command::Version => unreachable!("handled before startup"),
	}
}

fn init_tracing(config: &Config) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.as_str()));

	if config.env == Environment::Local {
		tracing_subscriber::registry()
			.with(filter)
			.with(tracing_subscriber::fmt::layer())
			.init();
	} else {
		tracing_subscriber::registry()
			.with(filter)
			.with(tracing_subscriber::fmt::layer().json())
			.init();
	}
}

async fn run_serve(
	config: Config,
	pool: sqlx::PgPool,
	metrics: Arc<Metrics>,
) -> Result<(), Box<dyn std::error::Error>> {
	let verifier = Arc::new(Verifier::new(config.auth.jwt_secret.as_bytes()));

	let jobs: Arc<dyn JobStore> = Arc::new(JobRepository::new(pool.clone()));
	let attempts: Arc<dyn AttemptStore> = Arc::new(AttemptRepository::new(pool.clone()));
	let schedules: Arc<dyn ScheduleStore> = Arc::new(ScheduleRepository::new(pool.clone()));
	let users: Arc<dyn UserStore> = Arc::new(UserRepository::new(pool.clone()));

	let state = AppState::new(jobs, attempts, schedules, users, Arc::clone(&metrics));
	let app = create_router(state, verifier).layer(TraceLayer::new_for_http()).layer(
		CorsLayer::new()
			.allow_origin(Any)
			.allow_methods(Any)
			.allow_headers(Any),
	);

	let ops = ops_router(OpsState {
		metrics,
		db: Arc::new(pool.clone()),
	});

	let api_listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
	let ops_listener = tokio::net::TcpListener::bind(config.metrics_addr()).await?;
	info!(addr = %config.socket_addr(), "api server started");
	info!(addr = %config.metrics_addr(), "ops server started");

	tokio::select! {
		result = axum::serve(api_listener, app) => {
			if let Err(e) = result {
				error!(error = %e, "api server error");
			}
		}
		result = axum::serve(ops_listener, ops) => {
			if let Err(e) = result {
				error!(error = %e, "ops server error");
			}
		}
		_ = tokio::signal::ctrl_c() => {
			info!("received shutdown signal");
		}
	}

	info!("server shutdown complete");
	Ok(())
}

async fn run_scheduler(
	config: Config,
	pool: sqlx::PgPool,
	metrics: Arc<Metrics>,
) -> Result<(), Box<dyn std::error::Error>> {
	let jobs: Arc<dyn JobStore> = Arc::new(JobRepository::new(pool.clone()));
	let attempts: Arc<dyn AttemptStore> = Arc::new(AttemptRepository::new(pool.clone()));
	let schedules: Arc<dyn ScheduleStore> = Arc::new(ScheduleRepository::new(pool.clone()));

	let (shutdown_tx, _) = broadcast::channel(1);

	let worker = Worker::new(
		Arc::clone(&jobs),
		attempts,
		Arc::new(Executor::new()),
		Arc::clone(&metrics),
		Duration::from_secs(config.scheduler.poll_interval_secs as u64),
		config.scheduler.worker_count as usize,
	);
	let worker_handle = {
		let shutdown = shutdown_tx.subscribe();
		tokio::spawn(async move { worker.start(shutdown).await })
	};

	let reaper = Reaper::new(
		jobs,
		Arc::clone(&metrics),
		DEFAULT_REAP_INTERVAL,
		DEFAULT_HEARTBEAT_TIMEOUT,
	);
	let reaper_handle = {
		let shutdown = shutdown_tx.subscribe();
		tokio::spawn(async move { reaper.start(shutdown).await })
	};

	let dispatcher = Dispatcher::new(
		schedules,
		Duration::from_secs(config.scheduler.dispatch_interval_secs as u64),
	);
	let dispatcher_handle = {
		let shutdown = shutdown_tx.subscribe();
		tokio::spawn(async move { dispatcher.start(shutdown).await })
	};

	let ops = ops_router(OpsState {
		metrics,
		db: Arc::new(pool.clone()),
	});
	let ops_listener = tokio::net::TcpListener::bind(config.metrics_addr()).await?;
	info!(addr = %config.metrics_addr(), "ops server started");
	let ops_handle = tokio::spawn(async move {
		if let Err(e) = axum::serve(ops_listener, ops).await {
			error!(error = %e, "ops server error");
		}
	});

	tokio::signal::ctrl_c().await?;
	info!("received shutdown signal");
	let _ = shutdown_tx.send(());

	// The worker drains in-flight jobs inside its own grace window.
	for handle in [worker_handle, reaper_handle, dispatcher_handle] {
		if tokio::time::timeout(Duration::from_secs(15), handle)
			.await
			.is_err()
		{
			error!("loop did not stop within the shutdown grace");
		}
	}
	ops_handle.abort();

	info!("scheduler shut down");
	Ok(())
}
