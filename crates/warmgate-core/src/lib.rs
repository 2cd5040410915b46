// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Warmgate Core - Long-lived workers for per-request frameworks
//!
//! This crate keeps a fixed pool of warm executors in front of an application
//! that was built around one fresh process per request. Each executor boots
//! the application once (dependency wiring, schema generation) and then
//! serves many requests from the same container. A deployment generation
//! marker tells executors when their container has gone stale.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           HTTP clients                                  │
//! │                 POST /graphql, /index.php/graphql                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      HTTP listener (axum)                               │
//! │          request -> RequestEnvelope, Response -> HTTP response          │
//! │                           Port 9501                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │ shared queue
//!                                    ▼
//! ┌───────────────────┐   ┌───────────────────┐        ┌───────────────────┐
//! │   executor 0      │   │   executor 1      │  ...   │   executor N-1    │
//! │ Worker+Container  │   │ Worker+Container  │        │ Worker+Container  │
//! └─────────┬─────────┘   └─────────┬─────────┘        └─────────┬─────────┘
//!           │    is_current(captured)?                           │
//!           └──────────────────────┬─────────────────────────────┘
//!                                  ▼
//!                       ┌─────────────────────┐
//!                       │   VersionOracle     │◄──── deployment publishes
//!                       │ (generation marker) │      a new generation
//!                       └─────────────────────┘
//! ```
//!
//! # Request Flow
//!
//! For every request an executor:
//!
//! 1. Compares its captured generation with the oracle (the "poison pill").
//! 2. If stale, resets before touching the request:
//!    - `exit`: the executor retires and its replacement serves the request
//!    - `rebuild`: a new container is built and swapped in place
//! 3. Normalizes the envelope with [`RequestAdapter`](request::RequestAdapter).
//! 4. Dispatches to its [`Container`](application::Container).
//! 5. Writes the response content verbatim.
//!
//! | Failure | Response | Executor |
//! |---------|----------|----------|
//! | Oracle unreadable | 503 | keeps serving |
//! | Malformed envelope | 400 | keeps serving |
//! | Dispatch panic | 500 | container rebuilt before next request |
//! | Response over buffer size | 500 | keeps serving |
//! | Reset failed | 503 | replaced by the supervisor |
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `WARMGATE_HOST` | `0.0.0.0` | Bind host |
//! | `WARMGATE_PORT` | `9501` | Bind port |
//! | `WARMGATE_WORKER_NUM` | `8` | Executors in the pool |
//! | `WARMGATE_MAX_REQUEST` | `10000` | Requests before an executor is recycled (0 = never) |
//! | `WARMGATE_BUFFER_OUTPUT_SIZE` | `33554432` | Max request/response body in bytes |
//! | `WARMGATE_GENERATION_FILE` | `.data/generation` | Generation marker file |
//! | `WARMGATE_RESET_STRATEGY` | `exit` | `exit` or `rebuild` |
//! | `WARMGATE_AREA` | `graphql` | Area code passed to the application |
//!
//! # Modules
//!
//! - [`generation`]: generation markers and oracles
//! - [`gate`]: staleness check
//! - [`request`] / [`response`]: envelopes and normalization
//! - [`application`]: collaborator traits
//! - [`worker`]: per-executor lifecycle
//! - [`pool`]: executor threads and supervisor
//! - [`server`]: HTTP listener
//! - [`runtime`]: embeddable runtime

#![deny(missing_docs)]

pub mod application;
pub mod config;
pub mod error;
pub mod gate;
pub mod generation;
pub mod pool;
pub mod request;
pub mod response;
pub mod runtime;
pub mod server;
pub mod worker;

pub use application::{Application, BootContext, BootError, Container};
pub use config::{Config, ConfigError};
pub use error::{Error, Result};
pub use gate::VersionGate;
pub use generation::{
    FileVersionOracle, Generation, InMemoryVersionOracle, OracleError, VersionOracle,
};
pub use pool::{PoolError, PoolHandle, RunningPool, WorkerPool};
pub use request::{AdaptError, NormalizedRequest, RequestAdapter, RequestEnvelope};
pub use response::Response;
pub use runtime::{ServerRuntime, ServerRuntimeBuilder};
pub use worker::{
    Outcome, ResetStrategy, RetireReason, Worker, WorkerError, WorkerSettings, WorkerState,
};
