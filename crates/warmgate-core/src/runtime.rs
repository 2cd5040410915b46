// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for warmgate.
//!
//! This module provides [`ServerRuntime`] which runs the worker pool and the
//! HTTP listener inside an existing tokio application.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warmgate_core::generation::FileVersionOracle;
//! use warmgate_core::runtime::ServerRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = ServerRuntime::builder()
//!         .application(Arc::new(MyApp::default()))
//!         .oracle(Arc::new(FileVersionOracle::new(".data/generation")))
//!         .bind_addr("0.0.0.0:9501".parse()?)
//!         .worker_num(8)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... run your application ...
//!
//!     // Graceful shutdown
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::application::Application;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::gate::VersionGate;
use crate::generation::VersionOracle;
use crate::pool::{PoolHandle, RunningPool, WorkerPool};
use crate::server::{ServerState, run_http_server_with_shutdown};
use crate::worker::{ResetStrategy, WorkerSettings};

/// Builder for creating a [`ServerRuntime`].
pub struct ServerRuntimeBuilder<A: Application> {
    application: Option<Arc<A>>,
    oracle: Option<Arc<dyn VersionOracle>>,
    bind_addr: SocketAddr,
    worker_num: usize,
    settings: WorkerSettings,
}

impl<A: Application> std::fmt::Debug for ServerRuntimeBuilder<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRuntimeBuilder")
            .field("application", &self.application.as_ref().map(|_| "..."))
            .field("oracle", &self.oracle.as_ref().map(|_| "..."))
            .field("bind_addr", &self.bind_addr)
            .field("worker_num", &self.worker_num)
            .field("settings", &self.settings)
            .finish()
    }
}

impl<A: Application> Default for ServerRuntimeBuilder<A> {
    fn default() -> Self {
        let defaults = Config::default();
        Self {
            application: None,
            oracle: None,
            bind_addr: defaults.bind_addr,
            worker_num: defaults.worker_num,
            settings: defaults.worker_settings(),
        }
    }
}

impl<A: Application> ServerRuntimeBuilder<A> {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every setting from `config`.
    pub fn config(mut self, config: &Config) -> Self {
        self.bind_addr = config.bind_addr;
        self.worker_num = config.worker_num;
        self.settings = config.worker_settings();
        self
    }

    /// Set the application that boots containers (required).
    pub fn application(mut self, application: Arc<A>) -> Self {
        self.application = Some(application);
        self
    }

    /// Set the generation source (required).
    pub fn oracle(mut self, oracle: Arc<dyn VersionOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Set the HTTP bind address.
    ///
    /// Default: `0.0.0.0:9501`
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the number of executors.
    ///
    /// Default: 8
    pub fn worker_num(mut self, worker_num: usize) -> Self {
        self.worker_num = worker_num;
        self
    }

    /// Set the area passed to the application at boot.
    pub fn area(mut self, area: impl Into<String>) -> Self {
        self.settings.area = area.into();
        self
    }

    /// Set how stale executors are reset.
    pub fn reset_strategy(mut self, strategy: ResetStrategy) -> Self {
        self.settings.reset_strategy = strategy;
        self
    }

    /// Set the per-executor request quota (0 = unlimited).
    pub fn max_requests(mut self, max_requests: u64) -> Self {
        self.settings.max_requests = max_requests;
        self
    }

    /// Set the largest request or response body in bytes.
    pub fn buffer_output_size(mut self, size: usize) -> Self {
        self.settings.buffer_output_size = size;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<ServerRuntimeConfig<A>> {
        let application = self
            .application
            .ok_or(Error::MissingComponent("application"))?;
        let oracle = self.oracle.ok_or(Error::MissingComponent("oracle"))?;

        Ok(ServerRuntimeConfig {
            application,
            oracle,
            bind_addr: self.bind_addr,
            worker_num: self.worker_num.max(1),
            settings: self.settings,
        })
    }
}

/// Configuration for a [`ServerRuntime`].
pub struct ServerRuntimeConfig<A: Application> {
    application: Arc<A>,
    oracle: Arc<dyn VersionOracle>,
    bind_addr: SocketAddr,
    worker_num: usize,
    settings: WorkerSettings,
}

impl<A: Application> std::fmt::Debug for ServerRuntimeConfig<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRuntimeConfig")
            .field("application", &"...")
            .field("oracle", &"...")
            .field("bind_addr", &self.bind_addr)
            .field("worker_num", &self.worker_num)
            .field("settings", &self.settings)
            .finish()
    }
}

impl<A: Application> ServerRuntimeConfig<A> {
    /// Boot the pool, bind the listener and start serving.
    pub async fn start(self) -> Result<ServerRuntime> {
        let generation = self.oracle.latest_version()?;
        info!(
            generation = %generation,
            workers = self.worker_num,
            reset_strategy = %self.settings.reset_strategy,
            "Starting warmgate"
        );

        let body_limit = self.settings.buffer_output_size;
        let gate = VersionGate::new(self.oracle);
        let pool = WorkerPool::new(self.application, gate, self.settings, self.worker_num)
            .start()
            .await?;

        let listener = match TcpListener::bind(self.bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                pool.shutdown().await;
                return Err(e.into());
            }
        };
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = ServerState::new(pool.handle(), local_addr.port());
        let server_handle = tokio::spawn(run_http_server_with_shutdown(
            listener,
            state,
            body_limit,
            shutdown_rx,
        ));

        info!(addr = %local_addr, "ServerRuntime started");

        Ok(ServerRuntime {
            server_handle,
            shutdown_tx,
            pool,
            local_addr,
        })
    }
}

/// A running warmgate server that can be embedded in an application.
///
/// The runtime manages:
/// - the worker pool and its supervisor
/// - the HTTP listener routing every request to the pool
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct ServerRuntime {
    server_handle: JoinHandle<std::io::Result<()>>,
    shutdown_tx: watch::Sender<bool>,
    pool: RunningPool,
    local_addr: SocketAddr,
}

impl std::fmt::Debug for ServerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRuntime")
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .finish()
    }
}

impl ServerRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder<A: Application>() -> ServerRuntimeBuilder<A> {
        ServerRuntimeBuilder::new()
    }

    /// Address the listener is bound to (resolves port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle for dispatching envelopes to the pool without going through HTTP.
    pub fn pool(&self) -> PoolHandle {
        self.pool.handle()
    }

    /// Gracefully shut down the runtime.
    ///
    /// The listener stops accepting connections and drains in-flight
    /// requests, then every executor is stopped.
    pub async fn shutdown(self) -> Result<()> {
        info!("ServerRuntime shutting down...");

        // Signal shutdown
        let _ = self.shutdown_tx.send(true);

        let server_result = match self.server_handle.await {
            Ok(result) => result.map_err(Error::from),
            Err(e) => {
                error!("ServerRuntime listener task panicked: {}", e);
                Err(Error::Io(std::io::Error::other(e)))
            }
        };

        self.pool.shutdown().await;

        if server_result.is_ok() {
            info!("ServerRuntime shutdown complete");
        }
        server_result
    }

    /// Check if the runtime is still running.
    pub fn is_running(&self) -> bool {
        !self.server_handle.is_finished() && self.pool.is_running()
    }
}
