// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections: a raw layer read from the lookup, finalized
//! into the resolved struct with defaults and range checks.

use crate::error::{ConfigError, Result};

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
	Local,
	Staging,
	Production,
}

impl Environment {
	pub fn as_str(&self) -> &'static str {
		match self {
			Environment::Local => "local",
			Environment::Staging => "staging",
			Environment::Production => "production",
		}
	}
}

pub(crate) fn environment(lookup: Lookup<'_>) -> Result<Environment> {
	match lookup("ENV").as_deref() {
		None | Some("local") => Ok(Environment::Local),
		Some("staging") => Ok(Environment::Staging),
		Some("production") => Ok(Environment::Production),
		Some(other) => Err(ConfigError::Invalid {
			name: "ENV",
			message: format!("expected local, staging or production, got {other}"),
		}),
	}
}

fn parse_port(name: &'static str, raw: Option<String>, default: u16) -> Result<u16> {
	match raw {
		None => Ok(default),
		Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
			name,
			message: format!("expected a port number, got {value}"),
		}),
	}
}

fn parse_ranged(
	name: &'static str,
	raw: Option<String>,
	default: u32,
	min: u32,
	max: u32,
) -> Result<u32> {
	let value = match raw {
		None => default,
		Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
			name,
			message: format!("expected an integer, got {value}"),
		})?,
	};
	if !(min..=max).contains(&value) {
		return Err(ConfigError::Invalid {
			name,
			message: format!("must be between {min} and {max}, got {value}"),
		});
	}
	Ok(value)
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
	pub port: u16,
	pub metrics_port: u16,
}

#[derive(Debug, Clone, Default)]
pub struct HttpConfigLayer {
	pub port: Option<String>,
	pub metrics_port: Option<String>,
}

impl HttpConfigLayer {
	pub fn from_lookup(lookup: Lookup<'_>) -> Self {
		Self {
			port: lookup("PORT"),
			metrics_port: lookup("METRICS_PORT"),
		}
	}

	pub fn finalize(self) -> Result<HttpConfig> {
		Ok(HttpConfig {
			port: parse_port("PORT", self.port, 8080)?,
			metrics_port: parse_port("METRICS_PORT", self.metrics_port, 9090)?,
		})
	}
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
	pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct DatabaseConfigLayer {
	pub url: Option<String>,
}

impl DatabaseConfigLayer {
	pub fn from_lookup(lookup: Lookup<'_>) -> Self {
		Self {
			url: lookup("DATABASE_URL"),
		}
	}

	pub fn finalize(self) -> Result<DatabaseConfig> {
		Ok(DatabaseConfig {
			url: self.url.ok_or(ConfigError::Missing("DATABASE_URL"))?,
		})
	}
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
	/// Per-worker execution capacity.
	pub worker_count: u32,
	pub poll_interval_secs: u32,
	pub dispatch_interval_secs: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerConfigLayer {
	pub worker_count: Option<String>,
	pub poll_interval_secs: Option<String>,
	pub dispatch_interval_secs: Option<String>,
}

impl SchedulerConfigLayer {
	pub fn from_lookup(lookup: Lookup<'_>) -> Self {
		Self {
			worker_count: lookup("WORKER_COUNT"),
			poll_interval_secs: lookup("POLL_INTERVAL_SEC"),
			dispatch_interval_secs: lookup("DISPATCH_INTERVAL_SEC"),
		}
	}

	pub fn finalize(self) -> Result<SchedulerConfig> {
		Ok(SchedulerConfig {
			worker_count: parse_ranged("WORKER_COUNT", self.worker_count, 5, 1, 100)?,
			poll_interval_secs: parse_ranged("POLL_INTERVAL_SEC", self.poll_interval_secs, 1, 1, 60)?,
			dispatch_interval_secs: parse_ranged(
				"DISPATCH_INTERVAL_SEC",
				self.dispatch_interval_secs,
				5,
				1,
				60,
			)?,
		})
	}
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
	pub jwt_secret: String,
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfigLayer {
	pub jwt_secret: Option<String>,
}

impl AuthConfigLayer {
	pub fn from_lookup(lookup: Lookup<'_>) -> Self {
		Self {
			jwt_secret: lookup("JWT_SECRET"),
		}
	}

	pub fn finalize(self) -> Result<AuthConfig> {
		let jwt_secret = self.jwt_secret.ok_or(ConfigError::Missing("JWT_SECRET"))?;
		if jwt_secret.is_empty() {
			return Err(ConfigError::Validation(
				"JWT_SECRET must not be empty".to_string(),
			));
		}
		Ok(AuthConfig { jwt_secret })
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
	Debug,
	Info,
	Warn,
	Error,
}

impl LogLevel {
	pub fn as_str(&self) -> &'static str {
		match self {
			LogLevel::Debug => "debug",
			LogLevel::Info => "info",
			LogLevel::Warn => "warn",
			LogLevel::Error => "error",
		}
	}
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
	pub level: LogLevel,
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfigLayer {
	pub level: Option<String>,
}

impl LoggingConfigLayer {
	pub fn from_lookup(lookup: Lookup<'_>) -> Self {
		Self {
			level: lookup("LOG_LEVEL"),
		}
	}

	pub fn finalize(self) -> Result<LoggingConfig> {
		let level = match self.level.as_deref() {
			None | Some("info") => LogLevel::Info,
			Some("debug") => LogLevel::Debug,
			Some("warn") => LogLevel::Warn,
			Some("error") => LogLevel::Error,
			Some(other) => {
				return Err(ConfigError::Invalid {
					name: "LOG_LEVEL",
					message: format!("expected debug, info, warn or error, got {other}"),
				})
			}
		};
		Ok(LoggingConfig { level })
	}
}
