// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("missing required environment variable: {0}")]
	Missing(&'static str),

	#[error("invalid value for {name}: {message}")]
	Invalid {
		name: &'static str,
		message: String,
	},

	#[error("configuration validation failed: {0}")]
	Validation(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
