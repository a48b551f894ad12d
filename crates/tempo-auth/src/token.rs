// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
	sub: String,
	iat: i64,
	exp: i64,
}

/// Validates HS256 bearer tokens against a shared secret.
pub struct Verifier {
	decoding_key: DecodingKey,
	validation: Validation,
}

impl Verifier {
	pub fn new(secret: &[u8]) -> Self {
		let mut validation = Validation::new(Algorithm::HS256);
		validation.required_spec_claims.insert("exp".to_string());
		Self {
			decoding_key: DecodingKey::from_secret(secret),
			validation,
		}
	}

	/// Verify a raw token and return the caller identity from `sub`.
	pub fn verify(&self, token: &str) -> Result<String, AuthError> {
		let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
			.map_err(|_| AuthError::InvalidToken)?;
		if data.claims.sub.is_empty() {
			return Err(AuthError::MissingSubject);
		}
		Ok(data.claims.sub)
	}
}

/// Issue a token for `sub` valid for `ttl_secs`. Local development and
/// tests only; production tokens come from the identity provider.
pub fn issue_token(secret: &[u8], sub: &str, ttl_secs: i64) -> String {
	let now = Utc::now().timestamp();
	let claims = Claims {
		sub: sub.to_string(),
		iat: now,
		exp: now + ttl_secs,
	};
	encode(
		&Header::new(Algorithm::HS256),
		&claims,
		&EncodingKey::from_secret(secret),
	)
	.expect("HS256 signing cannot fail with an in-memory key")
}
