// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Environment configuration for tempo.
//!
//! Each section is read into a layer of optional raw values and then
//! finalized with defaults and range validation. The lookup is injected
//! so tests can feed maps instead of mutating the process environment.

pub mod error;
pub mod sections;

pub use error::{ConfigError, Result};
pub use sections::{
	AuthConfig, DatabaseConfig, Environment, HttpConfig, LogLevel, LoggingConfig, SchedulerConfig,
};

use tracing::info;

/// Fully resolved configuration for both roles.
#[derive(Debug, Clone)]
pub struct Config {
	pub env: Environment,
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub scheduler: SchedulerConfig,
	pub auth: AuthConfig,
	pub logging: LoggingConfig,
}

impl Config {
	/// Bind address for the API listener.
	pub fn socket_addr(&self) -> String {
		format!("0.0.0.0:{}", self.http.port)
	}

	/// Bind address for the metrics/health listener.
	pub fn metrics_addr(&self) -> String {
		format!("0.0.0.0:{}", self.http.metrics_port)
	}
}

/// Load configuration from the process environment.
pub fn load_config() -> Result<Config> {
	let config = load_config_from(&|name| std::env::var(name).ok())?;
	info!(
		env = config.env.as_str(),
		port = config.http.port,
		metrics_port = config.http.metrics_port,
		worker_count = config.scheduler.worker_count,
		poll_interval_secs = config.scheduler.poll_interval_secs,
		dispatch_interval_secs = config.scheduler.dispatch_interval_secs,
		log_level = config.logging.level.as_str(),
		"configuration loaded"
	);
	Ok(config)
}

/// Load configuration from an arbitrary lookup.
pub fn load_config_from(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Config> {
	let env = sections::environment(lookup)?;
	let http = sections::HttpConfigLayer::from_lookup(lookup).finalize()?;
	let database = sections::DatabaseConfigLayer::from_lookup(lookup).finalize()?;
	let scheduler = sections::SchedulerConfigLayer::from_lookup(lookup).finalize()?;
	let auth = sections::AuthConfigLayer::from_lookup(lookup).finalize()?;
	let logging = sections::LoggingConfigLayer::from_lookup(lookup).finalize()?;

	Ok(Config {
		env,
		http,
		database,
		scheduler,
		auth,
		logging,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn lookup(values: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> = values
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |name: &str| map.get(name).cloned()
	}

	#[test]
	fn test_minimal_config_uses_defaults() {
		let env = lookup(&[
			("DATABASE_URL", "postgres://localhost/tempo"),
			("JWT_SECRET", "secret"),
		]);
		let config = load_config_from(&env).unwrap();

		assert_eq!(config.env, Environment::Local);
		assert_eq!(config.http.port, 8080);
		assert_eq!(config.http.metrics_port, 9090);
		assert_eq!(config.scheduler.worker_count, 5);
		assert_eq!(config.scheduler.poll_interval_secs, 1);
		assert_eq!(config.scheduler.dispatch_interval_secs, 5);
		assert_eq!(config.logging.level, LogLevel::Info);
		assert_eq!(config.socket_addr(), "0.0.0.0:8080");
		assert_eq!(config.metrics_addr(), "0.0.0.0:9090");
	}

	#[test]
	fn test_database_url_required() {
		let env = lookup(&[("JWT_SECRET", "secret")]);
		let err = load_config_from(&env).unwrap_err();
		assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
	}

	#[test]
	fn test_jwt_secret_required() {
		let env = lookup(&[("DATABASE_URL", "postgres://localhost/tempo")]);
		let err = load_config_from(&env).unwrap_err();
		assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
	}

	#[test]
	fn test_worker_count_range() {
		let env = lookup(&[
			("DATABASE_URL", "postgres://localhost/tempo"),
			("JWT_SECRET", "secret"),
			("WORKER_COUNT", "101"),
		]);
		assert!(load_config_from(&env).is_err());

		let env = lookup(&[
			("DATABASE_URL", "postgres://localhost/tempo"),
			("JWT_SECRET", "secret"),
			("WORKER_COUNT", "0"),
		]);
		assert!(load_config_from(&env).is_err());

		let env = lookup(&[
			("DATABASE_URL", "postgres://localhost/tempo"),
			("JWT_SECRET", "secret"),
			("WORKER_COUNT", "100"),
		]);
		assert_eq!(load_config_from(&env).unwrap().scheduler.worker_count, 100);
	}

	#[test]
	fn test_poll_interval_range() {
		let env = lookup(&[
			("DATABASE_URL", "postgres://localhost/tempo"),
			("JWT_SECRET", "secret"),
			("POLL_INTERVAL_SEC", "61"),
		]);
		assert!(load_config_from(&env).is_err());
	}

	#[test]
	fn test_unknown_env_rejected() {
		let env = lookup(&[
			("DATABASE_URL", "postgres://localhost/tempo"),
			("JWT_SECRET", "secret"),
			("ENV", "qa"),
		]);
		assert!(load_config_from(&env).is_err());
	}

	#[test]
	fn test_log_level_parse() {
		for (raw, expected) in [
			("debug", LogLevel::Debug),
			("info", LogLevel::Info),
			("warn", LogLevel::Warn),
			("error", LogLevel::Error),
		] {
			let env = lookup(&[
				("DATABASE_URL", "postgres://localhost/tempo"),
				("JWT_SECRET", "secret"),
				("LOG_LEVEL", raw),
			]);
			assert_eq!(load_config_from(&env).unwrap().logging.level, expected);
		}

		let env = lookup(&[
			("DATABASE_URL", "postgres://localhost/tempo"),
			("JWT_SECRET", "secret"),
			("LOG_LEVEL", "trace"),
		]);
		assert!(load_config_from(&env).is_err());
	}
}
