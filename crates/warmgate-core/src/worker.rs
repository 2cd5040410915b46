// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Single-executor request loop with generation-based reset.
//!
//! A [`Worker`] owns one booted container and serves requests from it until
//! it is retired. Before every request it asks the [`VersionGate`] whether
//! its captured generation is still the latest one; if not, the container is
//! reset before the request reaches it.
//!
//! ```text
//! Init --boot--> Serving(g) --stale--> Resetting --rebuild ok--> Serving(g')
//!                    |                     |
//!                    |                     +--rebuild failed--> retired (ResetFailed)
//!                    +--stale, ResetStrategy::Exit--> retired (Stale), request handed off
//!                    +--max_requests reached--> retired (Recycled)
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::{Application, BootContext, BootError, Container};
use crate::gate::VersionGate;
use crate::generation::{Generation, OracleError};
use crate::request::{RequestAdapter, RequestEnvelope};
use crate::response::Response;

/// How a worker brings itself back to the latest generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResetStrategy {
    /// Retire the executor and hand the pending request to a freshly booted
    /// replacement.
    #[default]
    Exit,
    /// Build a new container in place and swap it in.
    Rebuild,
}

impl FromStr for ResetStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exit" => Ok(Self::Exit),
            "rebuild" => Ok(Self::Rebuild),
            other => Err(format!("unknown reset strategy '{}'", other)),
        }
    }
}

impl std::fmt::Display for ResetStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exit => write!(f, "exit"),
            Self::Rebuild => write!(f, "rebuild"),
        }
    }
}

/// Per-worker settings, shared by every executor of a pool.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Area code passed to [`Application::boot`].
    pub area: String,
    /// What to do when the captured generation goes stale.
    pub reset_strategy: ResetStrategy,
    /// Requests served before the worker retires; `0` disables recycling.
    pub max_requests: u64,
    /// Largest response body the worker will hand back.
    pub buffer_output_size: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            area: "graphql".to_string(),
            reset_strategy: ResetStrategy::Exit,
            max_requests: 10_000,
            buffer_output_size: 32 * 1024 * 1024,
        }
    }
}

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No container booted yet.
    Init,
    /// Serving under the captured generation.
    Serving(Generation),
    /// Rebuilding its container.
    Resetting,
}

/// Why a worker stopped accepting requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetireReason {
    /// Served its request quota.
    Recycled {
        /// Requests served.
        served: u64,
    },
    /// Saw a newer generation under [`ResetStrategy::Exit`].
    Stale {
        /// Generation the worker had captured.
        captured: Generation,
    },
    /// Rebuilding the container failed.
    ResetFailed(String),
}

impl std::fmt::Display for RetireReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recycled { served } => write!(f, "recycled after {} requests", served),
            Self::Stale { captured } => write!(f, "generation {} is stale", captured),
            Self::ResetFailed(msg) => write!(f, "reset failed: {}", msg),
        }
    }
}

/// Result of handing one envelope to a worker.
#[derive(Debug)]
pub enum Outcome {
    /// The request was answered.
    Respond(Response),
    /// The worker retired without answering; the envelope must be served by
    /// a replacement.
    Handoff(RequestEnvelope),
}

/// Failure to boot a worker.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkerError {
    /// The generation could not be captured.
    #[error("failed to capture generation: {0}")]
    Oracle(#[from] OracleError),

    /// The application failed to build a container.
    #[error("failed to boot container: {0}")]
    Boot(#[from] BootError),
}

/// One warm executor: a container plus the generation it was built under.
pub struct Worker<A: Application> {
    id: usize,
    app: Arc<A>,
    gate: VersionGate,
    settings: Arc<WorkerSettings>,
    container: Option<A::Container>,
    captured: Generation,
    state: WorkerState,
    served: u64,
    tainted: bool,
    retired: Option<RetireReason>,
}

impl<A: Application> Worker<A> {
    /// Capture the current generation, then boot a container under it.
    ///
    /// The generation is captured first: a publish racing the boot makes the
    /// worker stale on its first request instead of serving old state as new.
    pub fn boot(
        id: usize,
        app: Arc<A>,
        gate: VersionGate,
        settings: Arc<WorkerSettings>,
    ) -> Result<Self, WorkerError> {
        let mut worker = Self {
            id,
            app,
            gate,
            settings,
            container: None,
            captured: Generation::INITIAL,
            state: WorkerState::Init,
            served: 0,
            tainted: false,
            retired: None,
        };

        let generation = worker.gate.capture()?;
        let container = worker.build_container(generation)?;
        worker.install(container, generation);

        info!(
            worker_id = id,
            generation = %generation,
            area = %worker.settings.area,
            "Worker booted"
        );
        Ok(worker)
    }

    /// Executor id.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Generation the current container was built under.
    pub fn captured(&self) -> Generation {
        self.captured
    }

    /// The live container, if any.
    pub fn container(&self) -> Option<&A::Container> {
        self.container.as_ref()
    }

    /// Requests answered since boot.
    pub fn served(&self) -> u64 {
        self.served
    }

    /// Set once the worker must not take more requests.
    pub fn retire_reason(&self) -> Option<&RetireReason> {
        self.retired.as_ref()
    }

    /// Serve one request.
    pub fn handle(&mut self, envelope: RequestEnvelope) -> Outcome {
        if self.retired.is_some() {
            return Outcome::Handoff(envelope);
        }

        let current = match self.gate.is_current(self.captured) {
            Ok(current) => current,
            Err(e) => {
                warn!(worker_id = self.id, error = %e, "Generation check failed");
                return self.finish(Response::error(503, "GENERATION_UNAVAILABLE", e));
            }
        };

        if !current {
            info!(
                worker_id = self.id,
                captured = %self.captured,
                strategy = %self.settings.reset_strategy,
                "Worker generation is stale"
            );
            if self.settings.reset_strategy == ResetStrategy::Exit {
                self.retired = Some(RetireReason::Stale {
                    captured: self.captured,
                });
                return Outcome::Handoff(envelope);
            }
        }

        if (!current || self.tainted) && !self.rebuild() {
            return Outcome::Respond(Response::error(
                503,
                "RESET_FAILED",
                "worker could not be reset",
            ));
        }

        let request = match RequestAdapter::adapt(envelope) {
            Ok(request) => request,
            Err(e) => {
                debug!(worker_id = self.id, error = %e, "Rejected malformed request");
                return self.finish(Response::error(400, e.error_code(), e));
            }
        };

        let Some(container) = self.container.as_mut() else {
            return self.finish(Response::error(503, "NO_CONTAINER", "worker has no container"));
        };

        debug!(
            worker_id = self.id,
            path_info = %request.path_info(),
            method = %request.method(),
            "Dispatching request"
        );
        let response = match catch_unwind(AssertUnwindSafe(|| container.dispatch(request))) {
            Ok(response) => response,
            Err(panic) => {
                error!(
                    worker_id = self.id,
                    panic = %panic_message(&*panic),
                    "Dispatch panicked, container will be rebuilt"
                );
                self.tainted = true;
                return self.finish(Response::error(
                    500,
                    "INTERNAL_ERROR",
                    "internal server error",
                ));
            }
        };

        if response.content.len() > self.settings.buffer_output_size {
            warn!(
                worker_id = self.id,
                size = response.content.len(),
                limit = self.settings.buffer_output_size,
                "Response exceeds output buffer"
            );
            return self.finish(Response::error(
                500,
                "RESPONSE_TOO_LARGE",
                "response exceeds output buffer size",
            ));
        }

        self.finish(response)
    }

    /// Count the answered request and retire once the quota is used up.
    fn finish(&mut self, response: Response) -> Outcome {
        self.served += 1;
        let quota = self.settings.max_requests;
        if quota > 0 && self.served >= quota && self.retired.is_none() {
            info!(worker_id = self.id, served = self.served, "Worker reached request quota");
            self.retired = Some(RetireReason::Recycled {
                served: self.served,
            });
        }
        Outcome::Respond(response)
    }

    /// Replace the container with one built under the latest generation.
    ///
    /// Returns `false` if the worker could not be reset. An oracle failure
    /// leaves the old state untouched so the next request retries; a boot
    /// failure retires the worker.
    fn rebuild(&mut self) -> bool {
        let generation = match self.gate.capture() {
            Ok(generation) => generation,
            Err(e) => {
                warn!(worker_id = self.id, error = %e, "Cannot capture generation for reset");
                return false;
            }
        };

        self.state = WorkerState::Resetting;
        // Drop the old graph before building the new one.
        self.container = None;

        match self.build_container(generation) {
            Ok(container) => {
                let previous = self.captured;
                self.install(container, generation);
                self.tainted = false;
                info!(
                    worker_id = self.id,
                    previous = %previous,
                    generation = %generation,
                    "Worker reset"
                );
                true
            }
            Err(e) => {
                error!(worker_id = self.id, error = %e, "Worker reset failed");
                self.retired = Some(RetireReason::ResetFailed(e.to_string()));
                false
            }
        }
    }

    fn build_container(&self, generation: Generation) -> Result<A::Container, BootError> {
        let ctx = BootContext {
            worker_id: self.id,
            area: &self.settings.area,
            generation,
        };
        self.app.boot(&ctx)
    }

    fn install(&mut self, container: A::Container, generation: Generation) {
        self.container = Some(container);
        self.captured = generation;
        self.state = WorkerState::Serving(generation);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
