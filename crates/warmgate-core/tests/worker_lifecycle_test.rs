// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker lifecycle tests: generation checks, resets, failures and recycling.

mod common;

use std::sync::Arc;

use common::{TestApp, body, boot_worker, graphql, respond, settings};
use warmgate_core::{
    Generation, InMemoryVersionOracle, OracleError, Outcome, ResetStrategy, RetireReason,
    VersionGate, VersionOracle, Worker, WorkerError, WorkerSettings, WorkerState,
};

struct OfflineOracle;

impl VersionOracle for OfflineOracle {
    fn latest_version(&self) -> Result<Generation, OracleError> {
        Err(OracleError::Unavailable("marker store offline".to_string()))
    }
}

/// Oracle that answers once and then goes offline.
struct FlakyOracle {
    calls: std::sync::atomic::AtomicUsize,
}

impl VersionOracle for FlakyOracle {
    fn latest_version(&self) -> Result<Generation, OracleError> {
        if self
            .calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            == 0
        {
            Ok(Generation(1))
        } else {
            Err(OracleError::Unavailable("marker store offline".to_string()))
        }
    }
}

#[test]
fn test_warm_worker_reuses_container() {
    let app = Arc::new(TestApp::default());
    let oracle = Arc::new(InMemoryVersionOracle::new(Generation(1)));
    let mut worker = boot_worker(&app, &oracle, settings(ResetStrategy::Rebuild));

    for expected in 1..=5 {
        let response = respond(worker.handle(graphql("/graphql")));
        assert_eq!(response.status, 200);
        assert_eq!(body(&response)["handled"], expected);
        assert_eq!(body(&response)["boot"], 1);
    }
    assert_eq!(app.boots(), 1);
    assert_eq!(worker.served(), 5);
}

#[test]
fn test_stale_worker_rebuilds_before_responding() {
    let app = Arc::new(TestApp::default());
    let oracle = Arc::new(InMemoryVersionOracle::new(Generation(1)));
    let mut worker = boot_worker(&app, &oracle, settings(ResetStrategy::Rebuild));

    respond(worker.handle(graphql("/graphql")));
    respond(worker.handle(graphql("/graphql")));

    oracle.advance();
    let response = respond(worker.handle(graphql("/graphql")));

    // Served by the new container, whose state starts from scratch.
    let value = body(&response);
    assert_eq!(value["generation"], 2);
    assert_eq!(value["boot"], 2);
    assert_eq!(value["handled"], 1);
    assert_eq!(worker.captured(), oracle.latest_version().unwrap());
    assert_eq!(worker.state(), WorkerState::Serving(Generation(2)));
}

#[test]
fn test_several_publishes_trigger_single_reset() {
    let app = Arc::new(TestApp::default());
    let oracle = Arc::new(InMemoryVersionOracle::new(Generation(1)));
    let mut worker = boot_worker(&app, &oracle, settings(ResetStrategy::Rebuild));

    oracle.advance();
    oracle.advance();
    oracle.advance();

    let response = respond(worker.handle(graphql("/graphql")));
    assert_eq!(body(&response)["generation"], 4);
    respond(worker.handle(graphql("/graphql")));

    assert_eq!(app.boots(), 2);
    assert_eq!(worker.captured(), Generation(4));
}

#[test]
fn test_exit_strategy_hands_off_request() {
    let app = Arc::new(TestApp::default());
    let oracle = Arc::new(InMemoryVersionOracle::new(Generation(1)));
    let mut worker = boot_worker(&app, &oracle, settings(ResetStrategy::Exit));

    oracle.advance();
    let envelope = graphql("/graphql");
    let Outcome::Handoff(pending) = worker.handle(envelope.clone()) else {
        panic!("stale worker must hand the request off");
    };
    assert_eq!(pending, envelope);
    assert_eq!(
        worker.retire_reason(),
        Some(&RetireReason::Stale {
            captured: Generation(1)
        })
    );

    // The replacement boots under the new generation and serves the request.
    let mut replacement = boot_worker(&app, &oracle, settings(ResetStrategy::Exit));
    let response = respond(replacement.handle(pending));
    assert_eq!(body(&response)["generation"], 2);
}

#[test]
fn test_oracle_failure_is_503_and_worker_survives() {
    let app = Arc::new(TestApp::default());
    let oracle = Arc::new(FlakyOracle {
        calls: std::sync::atomic::AtomicUsize::new(0),
    });
    let mut worker = Worker::boot(
        0,
        app.clone(),
        VersionGate::new(oracle),
        Arc::new(settings(ResetStrategy::Rebuild)),
    )
    .unwrap();

    let response = respond(worker.handle(graphql("/graphql")));
    assert_eq!(response.status, 503);
    assert!(worker.retire_reason().is_none());
    assert_eq!(app.boots(), 1);
}

#[test]
fn test_boot_without_oracle_fails() {
    let result = Worker::boot(
        0,
        Arc::new(TestApp::default()),
        VersionGate::new(Arc::new(OfflineOracle)),
        Arc::new(WorkerSettings::default()),
    );
    assert!(matches!(result, Err(WorkerError::Oracle(_))));
}

#[test]
fn test_reset_failure_retires_worker() {
    let app = Arc::new(TestApp::default());
    let oracle = Arc::new(InMemoryVersionOracle::new(Generation(1)));
    let mut worker = boot_worker(&app, &oracle, settings(ResetStrategy::Rebuild));

    app.set_fail_boot(true);
    oracle.advance();

    let response = respond(worker.handle(graphql("/graphql")));
    assert_eq!(response.status, 503);
    assert!(matches!(
        worker.retire_reason(),
        Some(RetireReason::ResetFailed(msg)) if msg.contains("schema generation failed")
    ));
    assert!(worker.container().is_none());
}

#[test]
fn test_dispatch_panic_is_500_and_container_rebuilt() {
    let app = Arc::new(TestApp::default());
    let oracle = Arc::new(InMemoryVersionOracle::new(Generation(1)));
    let mut worker = boot_worker(&app, &oracle, settings(ResetStrategy::Exit));

    let response = respond(worker.handle(graphql("/panic")));
    assert_eq!(response.status, 500);
    assert!(worker.retire_reason().is_none());

    let response = respond(worker.handle(graphql("/graphql")));
    assert_eq!(response.status, 200);
    assert_eq!(body(&response)["boot"], 2);
    assert_eq!(body(&response)["generation"], 1);
}

#[test]
fn test_oversized_response_is_500() {
    let app = Arc::new(TestApp::default());
    let oracle = Arc::new(InMemoryVersionOracle::new(Generation(1)));
    let mut worker = boot_worker(
        &app,
        &oracle,
        WorkerSettings {
            buffer_output_size: 1024,
            ..settings(ResetStrategy::Exit)
        },
    );

    let response = respond(worker.handle(graphql("/big")));
    assert_eq!(response.status, 500);
    assert_eq!(body(&response)["errors"][0]["extensions"]["code"], "RESPONSE_TOO_LARGE");

    let response = respond(worker.handle(graphql("/graphql")));
    assert_eq!(response.status, 200);
}

#[test]
fn test_malformed_envelope_is_400() {
    let app = Arc::new(TestApp::default());
    let oracle = Arc::new(InMemoryVersionOracle::new(Generation(1)));
    let mut worker = boot_worker(&app, &oracle, settings(ResetStrategy::Exit));

    let response = respond(worker.handle(graphql("graphql")));
    assert_eq!(response.status, 400);
    assert_eq!(body(&response)["errors"][0]["extensions"]["code"], "INVALID_PATH_INFO");
    assert_eq!(worker.container().unwrap().handled, 0);
}

#[test]
fn test_worker_recycles_after_quota() {
    let app = Arc::new(TestApp::default());
    let oracle = Arc::new(InMemoryVersionOracle::new(Generation(1)));
    let mut worker = boot_worker(
        &app,
        &oracle,
        WorkerSettings {
            max_requests: 3,
            ..settings(ResetStrategy::Exit)
        },
    );

    for _ in 0..3 {
        respond(worker.handle(graphql("/graphql")));
    }
    assert_eq!(
        worker.retire_reason(),
        Some(&RetireReason::Recycled { served: 3 })
    );
}
