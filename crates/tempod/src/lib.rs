// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! tempod: the API and scheduler roles of the tempo job scheduler.
//!
//! The library surface exists for the binary and the integration tests;
//! the interesting modules are the use-case services, the axum routes
//! and the operational listener.

pub mod api;
pub mod api_response;
pub mod middleware;
pub mod ops;
pub mod routes;
pub mod service;

pub use api::{create_router, AppState};
pub use api_response::{ApiError, ErrorResponse};
