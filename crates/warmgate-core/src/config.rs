// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::worker::{ResetStrategy, WorkerSettings};

/// Warmgate server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listener address
    pub bind_addr: SocketAddr,
    /// Number of executors in the pool
    pub worker_num: usize,
    /// Requests an executor serves before it is recycled (0 = never)
    pub max_request: u64,
    /// Largest request or response body in bytes
    pub buffer_output_size: usize,
    /// Generation marker file read by the version oracle
    pub generation_file: PathBuf,
    /// How stale executors are brought up to date
    pub reset_strategy: ResetStrategy,
    /// Area code passed to the application at boot
    pub area: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9501)),
            worker_num: 8,
            max_request: 10_000,
            buffer_output_size: 32 * 1024 * 1024,
            generation_file: PathBuf::from(".data/generation"),
            reset_strategy: ResetStrategy::Exit,
            area: "graphql".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `WARMGATE_HOST`: bind host (default: 0.0.0.0)
    /// - `WARMGATE_PORT`: bind port (default: 9501)
    /// - `WARMGATE_WORKER_NUM`: executors (default: 8)
    /// - `WARMGATE_MAX_REQUEST`: requests before recycle, 0 disables (default: 10000)
    /// - `WARMGATE_BUFFER_OUTPUT_SIZE`: max body size in bytes (default: 32 MiB)
    /// - `WARMGATE_GENERATION_FILE`: generation marker (default: .data/generation)
    /// - `WARMGATE_RESET_STRATEGY`: `exit` or `rebuild` (default: exit)
    /// - `WARMGATE_AREA`: application area (default: graphql)
    pub fn from_env() -> Result<Self, ConfigError> {
        let host: IpAddr = std::env::var("WARMGATE_HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("WARMGATE_HOST", "must be an IP address"))?;

        let port: u16 = std::env::var("WARMGATE_PORT")
            .unwrap_or_else(|_| "9501".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("WARMGATE_PORT", "must be a valid port number"))?;

        let worker_num: usize = std::env::var("WARMGATE_WORKER_NUM")
            .unwrap_or_else(|_| "8".to_string())
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid(
                "WARMGATE_WORKER_NUM",
                "must be a positive integer",
            ))?;

        let max_request: u64 = std::env::var("WARMGATE_MAX_REQUEST")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("WARMGATE_MAX_REQUEST", "must be a non-negative integer")
            })?;

        let buffer_output_size: usize = std::env::var("WARMGATE_BUFFER_OUTPUT_SIZE")
            .unwrap_or_else(|_| (32 * 1024 * 1024).to_string())
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid(
                "WARMGATE_BUFFER_OUTPUT_SIZE",
                "must be a positive number of bytes",
            ))?;

        let generation_file = std::env::var("WARMGATE_GENERATION_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".data/generation"));

        let reset_strategy: ResetStrategy = std::env::var("WARMGATE_RESET_STRATEGY")
            .unwrap_or_else(|_| "exit".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("WARMGATE_RESET_STRATEGY", "must be 'exit' or 'rebuild'")
            })?;

        let area = std::env::var("WARMGATE_AREA").unwrap_or_else(|_| "graphql".to_string());
        if area.trim().is_empty() {
            return Err(ConfigError::Invalid("WARMGATE_AREA", "must not be empty"));
        }

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            worker_num,
            max_request,
            buffer_output_size,
            generation_file,
            reset_strategy,
            area,
        })
    }

    /// Settings handed to every executor.
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            area: self.area.clone(),
            reset_strategy: self.reset_strategy,
            max_requests: self.max_request,
            buffer_output_size: self.buffer_output_size,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
