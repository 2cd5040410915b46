// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for warmgate-core integration tests.
//!
//! Provides a scriptable application whose containers report which boot they
//! came from, plus helpers for building workers and envelopes.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde_json::json;
use warmgate_core::{
    Application, BootContext, BootError, Container, Generation, InMemoryVersionOracle,
    NormalizedRequest, Outcome, RequestEnvelope, ResetStrategy, Response, VersionGate, Worker,
    WorkerSettings,
};

/// Application that counts boots and can be told to fail them.
#[derive(Default)]
pub struct TestApp {
    pub boots: AtomicUsize,
    pub fail_boot: AtomicBool,
}

impl TestApp {
    pub fn boots(&self) -> usize {
        self.boots.load(Ordering::SeqCst)
    }

    pub fn set_fail_boot(&self, fail: bool) {
        self.fail_boot.store(fail, Ordering::SeqCst);
    }
}

/// Container routing on `path_info`:
/// - `/panic` panics
/// - `/big` returns 4 KiB of content
/// - anything else returns a JSON body describing the container
pub struct TestContainer {
    pub worker_id: usize,
    pub generation: Generation,
    pub boot: usize,
    pub handled: u64,
}

impl Container for TestContainer {
    fn dispatch(&mut self, request: NormalizedRequest) -> Response {
        self.handled += 1;
        match request.path_info() {
            "/panic" => panic!("resolver blew up"),
            "/big" => Response::ok(vec![b'x'; 4096]),
            path => Response::json(
                200,
                &json!({
                    "worker": self.worker_id,
                    "generation": self.generation.value(),
                    "boot": self.boot,
                    "handled": self.handled,
                    "path": path,
                    "body": request.content_str().unwrap_or_default(),
                }),
            ),
        }
    }
}

impl Application for TestApp {
    type Container = TestContainer;

    fn boot(&self, ctx: &BootContext<'_>) -> Result<Self::Container, BootError> {
        if self.fail_boot.load(Ordering::SeqCst) {
            return Err(BootError::new("schema generation failed"));
        }
        let boot = self.boots.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TestContainer {
            worker_id: ctx.worker_id,
            generation: ctx.generation,
            boot,
            handled: 0,
        })
    }
}

/// Worker settings with a strategy and no recycling.
pub fn settings(strategy: ResetStrategy) -> WorkerSettings {
    WorkerSettings {
        reset_strategy: strategy,
        max_requests: 0,
        ..WorkerSettings::default()
    }
}

/// Boot worker 0 against `oracle`.
pub fn boot_worker(
    app: &Arc<TestApp>,
    oracle: &Arc<InMemoryVersionOracle>,
    settings: WorkerSettings,
) -> Worker<TestApp> {
    Worker::boot(
        0,
        app.clone(),
        VersionGate::new(oracle.clone()),
        Arc::new(settings),
    )
    .expect("worker should boot")
}

/// GraphQL envelope for `path`.
pub fn graphql(path: &str) -> RequestEnvelope {
    RequestEnvelope::new(r#"{"query":"{ ping }"}"#)
        .with_header("content_type", "application/json")
        .with_path_info(path)
        .with_server("request_method", "POST")
}

/// Unwrap a response outcome.
pub fn respond(outcome: Outcome) -> Response {
    match outcome {
        Outcome::Respond(response) => response,
        Outcome::Handoff(envelope) => panic!("expected a response, got handoff of {:?}", envelope),
    }
}

/// Parse a JSON response body.
pub fn body(response: &Response) -> serde_json::Value {
    serde_json::from_slice(&response.content).expect("response body should be JSON")
}
