// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
	#[error("missing bearer token")]
	MissingToken,

	#[error("token is invalid or expired")]
	InvalidToken,

	#[error("token carries no subject")]
	MissingSubject,
}
