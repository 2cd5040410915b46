// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for warmgate-core.
//!
//! Request-level failures never surface here: they are answered with a
//! response by the worker. This type covers starting and stopping a server.

use crate::config::ConfigError;
use crate::generation::OracleError;
use crate::pool::PoolError;

/// Result type using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from building, starting or stopping a server.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The generation source could not be read at startup.
    #[error(transparent)]
    Oracle(#[from] OracleError),

    /// The worker pool failed.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Socket or task failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required builder component was not provided.
    #[error("{0} is required")]
    MissingComponent(&'static str),
}

impl Error {
    /// Stable error code, used in logs and process exit messages.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Oracle(_) => "GENERATION_UNAVAILABLE",
            Error::Pool(PoolError::Boot { .. }) => "WORKER_BOOT_FAILED",
            Error::Pool(_) => "POOL_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::MissingComponent(_) => "MISSING_COMPONENT",
        }
    }
}
