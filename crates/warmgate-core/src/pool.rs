// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fixed pool of executor threads plus the supervisor that replaces them.
//!
//! Each executor is an OS thread that boots its own [`Worker`] and keeps the
//! container on that thread for its whole life, so containers never cross
//! threads and need no locking. Requests are pulled from one shared queue and
//! answered through a oneshot channel.
//!
//! Executors exit when their worker retires (request quota, stale generation
//! under [`ResetStrategy::Exit`](crate::worker::ResetStrategy::Exit), failed
//! reset) or when the pool stops. The supervisor joins the thread and spawns
//! a replacement in the same slot, forwarding any request the old executor
//! handed off.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::application::Application;
use crate::gate::VersionGate;
use crate::request::RequestEnvelope;
use crate::response::Response;
use crate::worker::{Outcome, RetireReason, Worker, WorkerSettings};

/// Delay before replacing an executor whose container failed to boot.
const BOOT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Pool errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// An executor failed to boot while the pool was starting.
    #[error("worker {worker_id} failed to boot: {message}")]
    Boot {
        /// Executor slot.
        worker_id: usize,
        /// Boot failure description.
        message: String,
    },

    /// An executor thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The pool no longer accepts requests.
    #[error("worker pool is closed")]
    Closed,

    /// The request was accepted but dropped without a response.
    #[error("request was dropped before a response was produced")]
    Dropped,
}

struct RequestJob {
    envelope: RequestEnvelope,
    reply: oneshot::Sender<Response>,
    request_id: Uuid,
    enqueued_at: Instant,
}

enum Job {
    Request(RequestJob),
    Stop,
}

#[derive(Debug)]
enum ExitReason {
    Retired(RetireReason),
    BootFailed(String),
    Panicked,
    Stopped,
    QueueClosed,
}

struct ExecutorExit {
    worker_id: usize,
    reason: ExitReason,
    pending: Option<RequestJob>,
}

struct Shared<A: Application> {
    app: Arc<A>,
    gate: VersionGate,
    settings: Arc<WorkerSettings>,
    queue: Mutex<mpsc::UnboundedReceiver<Job>>,
    exits: mpsc::UnboundedSender<ExecutorExit>,
}

/// Pool configuration, ready to start.
pub struct WorkerPool<A: Application> {
    app: Arc<A>,
    gate: VersionGate,
    settings: Arc<WorkerSettings>,
    size: usize,
}

impl<A: Application> std::fmt::Debug for WorkerPool<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("settings", &self.settings)
            .finish()
    }
}

impl<A: Application> WorkerPool<A> {
    /// Pool of `size` executors (at least one).
    pub fn new(app: Arc<A>, gate: VersionGate, settings: WorkerSettings, size: usize) -> Self {
        Self {
            app,
            gate,
            settings: Arc::new(settings),
            size: size.max(1),
        }
    }

    /// Boot every executor and start the supervisor.
    ///
    /// Fails if any executor cannot boot; executors that did boot are
    /// stopped again before returning.
    pub async fn start(self) -> Result<RunningPool, PoolError> {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            app: self.app,
            gate: self.gate,
            settings: self.settings,
            queue: Mutex::new(job_rx),
            exits: exit_tx,
        });

        let mut handles = HashMap::with_capacity(self.size);
        let mut readiness = Vec::with_capacity(self.size);
        let mut failure = None;

        for worker_id in 0..self.size {
            let (ready_tx, ready_rx) = oneshot::channel();
            match spawn_executor(shared.clone(), worker_id, None, Some(ready_tx)) {
                Ok(handle) => {
                    handles.insert(worker_id, handle);
                    readiness.push((worker_id, ready_rx));
                }
                Err(e) => {
                    failure = Some(PoolError::Spawn(e));
                    break;
                }
            }
        }

        for (worker_id, ready_rx) in readiness {
            let message = match ready_rx.await {
                Ok(Ok(())) => continue,
                Ok(Err(message)) => message,
                Err(_) => "executor exited during boot".to_string(),
            };
            if failure.is_none() {
                failure = Some(PoolError::Boot { worker_id, message });
            }
        }

        if let Some(err) = failure {
            error!(error = %err, "Worker pool failed to start");
            for _ in 0..handles.len() {
                let _ = job_tx.send(Job::Stop);
            }
            join_all(handles).await;
            return Err(err);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = tokio::spawn(supervise(
            shared,
            exit_rx,
            job_tx.clone(),
            handles,
            shutdown_rx,
        ));

        info!(workers = self.size, "Worker pool started");

        Ok(RunningPool {
            handle: PoolHandle { jobs: job_tx },
            shutdown_tx,
            supervisor,
        })
    }
}

/// Cheap, cloneable entry point for submitting requests.
#[derive(Clone)]
pub struct PoolHandle {
    jobs: mpsc::UnboundedSender<Job>,
}

impl std::fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolHandle")
            .field("closed", &self.jobs.is_closed())
            .finish()
    }
}

impl PoolHandle {
    /// Queue `envelope` and wait for its response.
    pub async fn dispatch(&self, envelope: RequestEnvelope) -> Result<Response, PoolError> {
        let (reply, response) = oneshot::channel();
        let job = RequestJob {
            envelope,
            reply,
            request_id: Uuid::new_v4(),
            enqueued_at: Instant::now(),
        };
        self.jobs
            .send(Job::Request(job))
            .map_err(|_| PoolError::Closed)?;
        response.await.map_err(|_| PoolError::Dropped)
    }
}

/// A started pool.
pub struct RunningPool {
    handle: PoolHandle,
    shutdown_tx: watch::Sender<bool>,
    supervisor: JoinHandle<()>,
}

impl std::fmt::Debug for RunningPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningPool")
            .field("running", &self.is_running())
            .finish()
    }
}

impl RunningPool {
    /// Handle for submitting requests.
    pub fn handle(&self) -> PoolHandle {
        self.handle.clone()
    }

    /// Whether the supervisor is still running.
    pub fn is_running(&self) -> bool {
        !self.supervisor.is_finished()
    }

    /// Stop every executor after it finishes the request it is serving.
    ///
    /// Requests queued before the call are still served.
    pub async fn shutdown(self) {
        info!("Worker pool shutting down...");
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.supervisor.await {
            error!(error = %e, "Pool supervisor task failed");
            return;
        }
        info!("Worker pool shutdown complete");
    }
}

fn spawn_executor<A: Application>(
    shared: Arc<Shared<A>>,
    worker_id: usize,
    pending: Option<RequestJob>,
    ready: Option<oneshot::Sender<Result<(), String>>>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("warmgate-worker-{}", worker_id))
        .spawn(move || {
            let exit = catch_unwind(AssertUnwindSafe(|| {
                run_executor(&shared, worker_id, pending, ready)
            }))
            .unwrap_or_else(|_| {
                error!(worker_id, "Executor panicked");
                ExecutorExit {
                    worker_id,
                    reason: ExitReason::Panicked,
                    pending: None,
                }
            });
            let _ = shared.exits.send(exit);
        })
}

fn run_executor<A: Application>(
    shared: &Shared<A>,
    worker_id: usize,
    mut pending: Option<RequestJob>,
    ready: Option<oneshot::Sender<Result<(), String>>>,
) -> ExecutorExit {
    let booted = Worker::boot(
        worker_id,
        shared.app.clone(),
        shared.gate.clone(),
        shared.settings.clone(),
    );
    let mut worker = match booted {
        Ok(worker) => {
            if let Some(ready) = ready {
                let _ = ready.send(Ok(()));
            }
            worker
        }
        Err(e) => {
            error!(worker_id, error = %e, "Executor failed to boot");
            if let Some(ready) = ready {
                let _ = ready.send(Err(e.to_string()));
            }
            if let Some(job) = pending.take() {
                let _ = job
                    .reply
                    .send(Response::error(503, "WORKER_UNAVAILABLE", &e));
            }
            return ExecutorExit {
                worker_id,
                reason: ExitReason::BootFailed(e.to_string()),
                pending: None,
            };
        }
    };

    loop {
        let job = match pending.take() {
            Some(job) => job,
            None => {
                let next = shared
                    .queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .blocking_recv();
                match next {
                    Some(Job::Request(job)) => job,
                    Some(Job::Stop) => {
                        return ExecutorExit {
                            worker_id,
                            reason: ExitReason::Stopped,
                            pending: None,
                        };
                    }
                    None => {
                        return ExecutorExit {
                            worker_id,
                            reason: ExitReason::QueueClosed,
                            pending: None,
                        };
                    }
                }
            }
        };

        let RequestJob {
            envelope,
            reply,
            request_id,
            enqueued_at,
        } = job;

        let span = info_span!("request", worker_id, request_id = %request_id);
        let _enter = span.enter();

        if reply.is_closed() {
            debug!("Client went away before the request was picked up");
            continue;
        }
        debug!(
            queued_ms = enqueued_at.elapsed().as_millis() as u64,
            "Request picked up"
        );

        match worker.handle(envelope) {
            Outcome::Respond(response) => {
                debug!(status = response.status, "Request served");
                let _ = reply.send(response);
            }
            Outcome::Handoff(envelope) => {
                let reason = worker
                    .retire_reason()
                    .cloned()
                    .unwrap_or(RetireReason::Stale {
                        captured: worker.captured(),
                    });
                return ExecutorExit {
                    worker_id,
                    reason: ExitReason::Retired(reason),
                    pending: Some(RequestJob {
                        envelope,
                        reply,
                        request_id,
                        enqueued_at,
                    }),
                };
            }
        }

        if let Some(reason) = worker.retire_reason() {
            return ExecutorExit {
                worker_id,
                reason: ExitReason::Retired(reason.clone()),
                pending: None,
            };
        }
    }
}

async fn supervise<A: Application>(
    shared: Arc<Shared<A>>,
    mut exits: mpsc::UnboundedReceiver<ExecutorExit>,
    jobs: mpsc::UnboundedSender<Job>,
    mut handles: HashMap<usize, thread::JoinHandle<()>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut shutting_down = false;

    loop {
        if shutting_down && handles.is_empty() {
            break;
        }

        tokio::select! {
            biased;

            changed = shutdown.changed(), if !shutting_down => {
                if changed.is_err() || *shutdown.borrow() {
                    shutting_down = true;
                    info!(live = handles.len(), "Stopping executors");
                    for _ in 0..handles.len() {
                        let _ = jobs.send(Job::Stop);
                    }
                }
            }

            exit = exits.recv() => {
                let Some(ExecutorExit { worker_id, reason, pending }) = exit else {
                    break;
                };

                if let Some(handle) = handles.remove(&worker_id) {
                    let _ = tokio::task::spawn_blocking(move || handle.join()).await;
                }

                match &reason {
                    ExitReason::Retired(retired @ RetireReason::ResetFailed(_)) => {
                        warn!(worker_id, reason = %retired, "Executor retired")
                    }
                    ExitReason::Retired(retired) => {
                        info!(worker_id, reason = %retired, "Executor retired")
                    }
                    ExitReason::BootFailed(message) => {
                        warn!(worker_id, error = %message, "Executor exited after boot failure")
                    }
                    ExitReason::Panicked => warn!(worker_id, "Executor exited after panic"),
                    ExitReason::Stopped | ExitReason::QueueClosed => {
                        debug!(worker_id, "Executor stopped")
                    }
                }

                if shutting_down || matches!(reason, ExitReason::Stopped | ExitReason::QueueClosed) {
                    if let Some(job) = pending {
                        let _ = job.reply.send(Response::error(
                            503,
                            "SHUTTING_DOWN",
                            "server is shutting down",
                        ));
                    }
                    continue;
                }

                if matches!(reason, ExitReason::BootFailed(_) | ExitReason::Panicked) {
                    tokio::time::sleep(BOOT_RETRY_DELAY).await;
                }

                match spawn_executor(shared.clone(), worker_id, pending, None) {
                    Ok(handle) => {
                        handles.insert(worker_id, handle);
                        info!(worker_id, "Executor replaced");
                    }
                    Err(e) => {
                        error!(worker_id, error = %e, "Failed to spawn replacement executor");
                    }
                }
            }
        }
    }

    info!("Pool supervisor stopped");
}

async fn join_all(handles: HashMap<usize, thread::JoinHandle<()>>) {
    let _ = tokio::task::spawn_blocking(move || {
        for (_, handle) in handles {
            let _ = handle.join();
        }
    })
    .await;
}
