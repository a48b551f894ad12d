// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use axum::{
	extract::{Request, State},
	http::{header::AUTHORIZATION, HeaderMap, StatusCode},
	middleware::Next,
	response::{IntoResponse, Response},
	Json,
};

use crate::error::AuthError;
use crate::token::Verifier;

/// The authenticated caller, inserted into request extensions by
/// [`require_auth`]. The inner string is the token's `sub` claim.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
	let value = headers
		.get(AUTHORIZATION)
		.and_then(|v| v.to_str().ok())
		.ok_or(AuthError::MissingToken)?;
	value.strip_prefix("Bearer ").ok_or(AuthError::MissingToken)
}

/// Reject the request with 401 unless it carries a valid bearer token.
pub async fn require_auth(
	State(verifier): State<Arc<Verifier>>,
	mut request: Request,
	next: Next,
) -> Response {
	let verified = bearer_token(request.headers()).and_then(|token| verifier.verify(token));
	match verified {
		Ok(user_id) => {
			request.extensions_mut().insert(CurrentUser(user_id));
			next.run(request).await
		}
		Err(err) => {
			tracing::debug!(error = %err, "rejected unauthenticated request");
			(
				StatusCode::UNAUTHORIZED,
				Json(serde_json::json!({ "error": "Unauthorized" })),
			)
				.into_response()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::token::issue_token;
	use axum::{body::Body, middleware, routing::get, Extension, Router};
	use tower::ServiceExt;

	const SECRET: &[u8] = b"test-secret";

	async fn whoami(Extension(user): Extension<CurrentUser>) -> String {
		user.0
	}

	fn app() -> Router {
		let verifier = Arc::new(Verifier::new(SECRET));
		Router::new()
			.route("/whoami", get(whoami))
			.layer(middleware::from_fn_with_state(verifier, require_auth))
	}

	#[tokio::test]
	async fn test_valid_token_passes() {
		let token = issue_token(SECRET, "user-7", 60);
		let response = app()
			.oneshot(
				axum::http::Request::builder()
					.uri("/whoami")
					.header(AUTHORIZATION, format!("Bearer {token}"))
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
	}

	#[tokio::test]
	async fn test_missing_header_rejected() {
		let response = app()
			.oneshot(
				axum::http::Request::builder()
					.uri("/whoami")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	}

	#[tokio::test]
	async fn test_non_bearer_scheme_rejected() {
		let response = app()
			.oneshot(
				axum::http::Request::builder()
					.uri("/whoami")
					.header(AUTHORIZATION, "Basic dXNlcjpwYXNz")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	}

	#[tokio::test]
	async fn test_bad_token_rejected() {
		let response = app()
			.oneshot(
				axum::http::Request::builder()
					.uri("/whoami")
					.header(AUTHORIZATION, "Bearer garbage")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	}
}
