// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Warmgate Catalog - Reference application
//!
//! A small storefront catalog answering GraphQL queries, used to run
//! warmgate end to end and to exercise the shared-state checks.
//!
//! ```text
//! CatalogApp::boot ──► CatalogContainer
//!                      ├── SchemaRegistry       fixed after boot
//!                      ├── CategoryRepository   identity map, grows
//!                      ├── ProductRepository    identity map, grows
//!                      ├── UrlResolver          created on first urlResolver
//!                      ├── RequestContext       cleared after each request
//!                      └── QueryLog             counts requests
//! ```
//!
//! Root query fields: `category(id)`, `products(filter, pageSize,
//! currentPage)` and `urlResolver(url)`. Object fields cover what the
//! storefront navigation, category and product pages ask for.
//!
//! The mutations the container is expected to make are described by
//! [`state_rules`], the same rules the state tests run with.

#![deny(missing_docs)]

pub mod app;
pub mod fixtures;
pub mod graphql;
pub mod resolver;
pub mod services;

use warmgate_state::{RulesError, StateRules};

pub use app::{CatalogApp, CatalogContainer, GRAPHQL_AREA, is_graphql_path};
pub use graphql::{GraphQlRequest, QueryError};
pub use resolver::ResolveError;

/// Shared-state rules for the catalog container, as JSON.
pub const STATE_RULES_JSON: &str = include_str!("../state-rules.json");

/// Parsed [`STATE_RULES_JSON`].
pub fn state_rules() -> Result<StateRules, RulesError> {
    StateRules::from_json(STATE_RULES_JSON)
}
