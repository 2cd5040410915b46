// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Warmgate State - Shared-object leak detection
//!
//! A warm worker serves many requests from one container. Any shared service
//! that keeps per-request data after the request ends leaks it into the next
//! one. This crate records the fields of every shared instance before and
//! after a request and reports what changed.
//!
//! ```text
//! request 1 (first)            request 2..n
//! ─────────────────            ────────────
//! capture_before  ─► baseline
//! dispatch
//! capture_after   ─► after ──► new types join baseline
//! compare(op)                  capture_after ─► after
//!                              compare(op)   ─► DiffReport
//! ```
//!
//! Comparison rules per field (missing fields read as null):
//!
//! | Before | After | Reported |
//! |--------|-------|----------|
//! | null | anything | no (lazy initialization) |
//! | kind A | kind B | yes |
//! | scalar | scalar | if not strictly equal |
//! | array | array | if length differs or not loosely equal |
//! | object | object | if type identity differs |
//!
//! [`StateRules`] excuse known-mutable fields and skip whole types, either
//! globally or for one operation.

#![deny(missing_docs)]

pub mod collector;
pub mod comparator;
pub mod report;
pub mod rules;
pub mod value;

pub use collector::{Collector, Inspectable, SharedObjectSnapshot, SharedRegistry};
pub use comparator::Comparator;
pub use report::{DiffReport, FieldDiff, TypeDiff};
pub use rules::{RulesError, StateRules, StateRulesBuilder, StateRulesConfig};
pub use value::{FieldMap, FieldValue, ValueKind};
