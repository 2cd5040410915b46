// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Staleness check between a worker's captured generation and the oracle.

use std::sync::Arc;

use crate::generation::{Generation, OracleError, VersionOracle};

/// Answers "is this worker still serving the current generation?".
///
/// The gate never mutates anything: resetting a stale worker is the
/// worker's job.
#[derive(Clone)]
pub struct VersionGate {
    oracle: Arc<dyn VersionOracle>,
}

impl std::fmt::Debug for VersionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionGate")
            .field("oracle", &"...")
            .finish()
    }
}

impl VersionGate {
    /// Create a gate over `oracle`.
    pub fn new(oracle: Arc<dyn VersionOracle>) -> Self {
        Self { oracle }
    }

    /// Read the generation a worker should capture at boot or after a reset.
    pub fn capture(&self) -> Result<Generation, OracleError> {
        self.oracle.latest_version()
    }

    /// Whether `captured` equals the latest published generation.
    ///
    /// Any difference counts as stale, including a published generation that
    /// went backwards.
    pub fn is_current(&self, captured: Generation) -> Result<bool, OracleError> {
        self.oracle.is_latest_version(captured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::InMemoryVersionOracle;

    struct BrokenOracle;

    impl VersionOracle for BrokenOracle {
        fn latest_version(&self) -> Result<Generation, OracleError> {
            Err(OracleError::Unavailable("store offline".to_string()))
        }
    }

    #[test]
    fn test_gate_check_is_idempotent() {
        let oracle = Arc::new(InMemoryVersionOracle::new(Generation(5)));
        let gate = VersionGate::new(oracle);

        for _ in 0..10 {
            assert!(gate.is_current(Generation(5)).unwrap());
            assert!(!gate.is_current(Generation(4)).unwrap());
        }
    }

    #[test]
    fn test_gate_stays_stale_until_recapture() {
        let oracle = Arc::new(InMemoryVersionOracle::new(Generation(1)));
        let gate = VersionGate::new(oracle.clone());
        let captured = gate.capture().unwrap();

        oracle.advance();
        assert!(!gate.is_current(captured).unwrap());
        assert!(!gate.is_current(captured).unwrap());

        oracle.advance();
        assert!(!gate.is_current(captured).unwrap());

        let recaptured = gate.capture().unwrap();
        assert_eq!(recaptured, Generation(3));
        assert!(gate.is_current(recaptured).unwrap());
    }

    #[test]
    fn test_gate_treats_newer_capture_as_stale() {
        let gate = VersionGate::new(Arc::new(InMemoryVersionOracle::new(Generation(2))));
        assert!(!gate.is_current(Generation(3)).unwrap());
    }

    #[test]
    fn test_gate_propagates_oracle_errors() {
        let gate = VersionGate::new(Arc::new(BrokenOracle));

        assert!(matches!(
            gate.is_current(Generation(1)),
            Err(OracleError::Unavailable(_))
        ));
        assert!(gate.capture().is_err());
    }
}
