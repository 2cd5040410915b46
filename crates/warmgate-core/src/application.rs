// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Collaborator traits for the application behind the workers.
//!
//! An [`Application`] is shared by every executor and only knows how to boot
//! a [`Container`]: configure the area, wire dependencies, generate the
//! schema. The container is owned by exactly one executor thread and is
//! never shared, so it does not have to be `Send`.

use crate::generation::Generation;
use crate::request::NormalizedRequest;
use crate::response::Response;

/// What an application needs to know when booting a container.
#[derive(Debug, Clone, Copy)]
pub struct BootContext<'a> {
    /// Executor the container is being built for.
    pub worker_id: usize,
    /// Application area to configure (for example `graphql`).
    pub area: &'a str,
    /// Generation captured immediately before the boot started.
    pub generation: Generation,
}

/// Failure to build a container.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct BootError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl BootError {
    /// Boot failure with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Boot failure caused by `source`.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Per-executor object graph: dependency container plus generated schema.
pub trait Container {
    /// Handle one request.
    ///
    /// Errors are the container's business and must come back as a
    /// [`Response`]. A panic is caught by the worker, answered with `500`,
    /// and the container is discarded before the next request.
    fn dispatch(&mut self, request: NormalizedRequest) -> Response;
}

/// Factory for containers, shared across executors.
pub trait Application: Send + Sync + 'static {
    /// Container type built by this application.
    type Container: Container;

    /// Build a fresh container from scratch.
    fn boot(&self, ctx: &BootContext<'_>) -> Result<Self::Container, BootError>;
}
