// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bearer-token authentication.
//!
//! Tokens are HS256 JWTs; the `sub` claim is the caller identity the
//! rest of the system scopes every read and write by. Issuance belongs
//! to the external identity provider; this crate only validates.

pub mod error;
pub mod middleware;
pub mod token;

pub use error::AuthError;
pub use middleware::{require_auth, CurrentUser};
pub use token::{issue_token, Verifier};
