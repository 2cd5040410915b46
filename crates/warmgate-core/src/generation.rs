// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deployment generation markers and the oracles that publish them.
//!
//! A generation marker identifies the application configuration a worker is
//! allowed to serve under. It is written by the deployment process (or a
//! config push) and only ever read by workers.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Totally ordered deployment generation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Generation(pub u64);

impl Generation {
    /// Generation reported before anything has been published.
    pub const INITIAL: Generation = Generation(0);

    /// Raw marker value.
    pub fn value(self) -> u64 {
        self.0
    }

    /// The generation that follows this one.
    pub fn next(self) -> Generation {
        Generation(self.0.saturating_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Generation {
    fn from(value: u64) -> Self {
        Generation(value)
    }
}

/// Errors from reading the generation source.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OracleError {
    /// The marker could not be read.
    #[error("failed to read generation marker {}: {source}", .path.display())]
    Read {
        /// Marker location.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The marker exists but does not hold a generation.
    #[error("generation marker {} holds {content:?}, expected an unsigned integer", .path.display())]
    Malformed {
        /// Marker location.
        path: PathBuf,
        /// Raw (trimmed) marker content.
        content: String,
    },

    /// The source is temporarily unreachable.
    #[error("generation source unavailable: {0}")]
    Unavailable(String),
}

/// Source of the current deployment generation.
///
/// Implementations must be cheap enough to be consulted once per request.
pub trait VersionOracle: Send + Sync {
    /// Read the latest published generation.
    fn latest_version(&self) -> Result<Generation, OracleError>;

    /// Whether `generation` is still the latest published one.
    fn is_latest_version(&self, generation: Generation) -> Result<bool, OracleError> {
        Ok(self.latest_version()? == generation)
    }
}

/// Reads the generation from a marker file holding a decimal integer.
///
/// A missing file reads as [`Generation::INITIAL`]. Anything else that fails
/// is reported as an error so the request fails instead of serving stale
/// state.
#[derive(Debug, Clone)]
pub struct FileVersionOracle {
    path: PathBuf,
}

impl FileVersionOracle {
    /// Create an oracle backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the marker file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `generation` to the marker file.
    ///
    /// The new value is written to a sibling temp file and renamed over the
    /// marker, so readers never observe a partial write.
    pub fn publish(&self, generation: Generation) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            writeln!(file, "{}", generation)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)
    }
}

impl VersionOracle for FileVersionOracle {
    fn latest_version(&self) -> Result<Generation, OracleError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Generation::INITIAL),
            Err(source) => {
                return Err(OracleError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let trimmed = content.trim();
        trimmed
            .parse::<u64>()
            .map(Generation)
            .map_err(|_| OracleError::Malformed {
                path: self.path.clone(),
                content: trimmed.to_string(),
            })
    }
}

/// Process-local generation counter.
///
/// Publishing never moves the generation backwards.
#[derive(Debug, Default)]
pub struct InMemoryVersionOracle {
    current: AtomicU64,
}

impl InMemoryVersionOracle {
    /// Create an oracle starting at `initial`.
    pub fn new(initial: Generation) -> Self {
        Self {
            current: AtomicU64::new(initial.0),
        }
    }

    /// Bump the generation by one and return the new value.
    pub fn advance(&self) -> Generation {
        Generation(self.current.fetch_add(1, Ordering::SeqCst).saturating_add(1))
    }

    /// Publish `generation` unless a newer one is already current.
    ///
    /// Returns the generation in effect afterwards.
    pub fn publish(&self, generation: Generation) -> Generation {
        let previous = self.current.fetch_max(generation.0, Ordering::SeqCst);
        Generation(previous.max(generation.0))
    }

    /// Current generation without going through the trait.
    pub fn current(&self) -> Generation {
        Generation(self.current.load(Ordering::SeqCst))
    }
}

impl VersionOracle for InMemoryVersionOracle {
    fn latest_version(&self) -> Result<Generation, OracleError> {
        Ok(self.current())
    }
}
