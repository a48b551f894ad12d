// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The scheduler role: three cooperating loops over one store.
//!
//! The worker pumps due jobs through bounded-concurrency execution, the
//! reaper recovers work from crashed workers, and the dispatcher turns
//! cron schedules into concrete jobs. All coordination goes through the
//! store; nothing here holds in-process queue state.

pub mod dispatcher;
pub mod executor;
pub mod reaper;
pub mod worker;

pub use dispatcher::Dispatcher;
pub use executor::{ExecutionResult, Executor};
pub use reaper::Reaper;
pub use worker::Worker;
