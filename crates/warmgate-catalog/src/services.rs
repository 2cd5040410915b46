// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared services living in a catalog container.
//!
//! Every service outlives the request it was used in and reports its fields
//! through [`Inspectable`], so the state tests can see what a request left
//! behind.

use std::collections::BTreeSet;

use warmgate_state::{FieldMap, FieldValue, Inspectable};

use crate::fixtures::{self, Category, Product, UrlRewrite};

/// Root fields answered by the generated schema.
pub const QUERY_FIELDS: &[&str] = &["category", "products", "urlResolver"];

/// Schema generated at boot. Never changes afterwards.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    area: String,
    generation: u64,
    query_fields: Vec<String>,
}

impl SchemaRegistry {
    /// Generate the schema for `area`.
    pub fn generate(area: &str, generation: u64) -> Self {
        Self {
            area: area.to_string(),
            generation,
            query_fields: QUERY_FIELDS.iter().map(|field| field.to_string()).collect(),
        }
    }

    /// Whether `field` is a root query field.
    pub fn has_query_field(&self, field: &str) -> bool {
        self.query_fields.iter().any(|known| known == field)
    }

    /// Generation the schema was built for.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Inspectable for SchemaRegistry {
    fn type_name(&self) -> &str {
        "SchemaRegistry"
    }

    fn fields(&self) -> FieldMap {
        FieldMap::from([
            ("area".to_string(), FieldValue::from(self.area.as_str())),
            ("generation".to_string(), FieldValue::from(self.generation)),
            ("queryFields".to_string(), FieldValue::from(self.query_fields.clone())),
        ])
    }
}

/// Identity map over catalog entities.
///
/// Loaded ids accumulate across requests; that is the point of the map.
#[derive(Debug, Clone)]
pub struct Repository<T: 'static> {
    type_name: &'static str,
    instances: BTreeSet<i64>,
    lookup: fn(i64) -> Option<&'static T>,
}

/// Category identity map.
pub type CategoryRepository = Repository<Category>;

/// Product identity map.
pub type ProductRepository = Repository<Product>;

impl Repository<Category> {
    /// Empty category repository.
    pub fn categories() -> Self {
        Self {
            type_name: "CategoryRepository",
            instances: BTreeSet::new(),
            lookup: fixtures::category,
        }
    }
}

impl Repository<Product> {
    /// Empty product repository.
    pub fn products() -> Self {
        Self {
            type_name: "ProductRepository",
            instances: BTreeSet::new(),
            lookup: fixtures::product,
        }
    }
}

impl<T: 'static> Repository<T> {
    /// Load `id`, remembering it.
    pub fn get(&mut self, id: i64) -> Option<&'static T> {
        let entity = (self.lookup)(id)?;
        self.instances.insert(id);
        Some(entity)
    }

    /// Ids loaded so far.
    pub fn loaded(&self) -> impl Iterator<Item = i64> + '_ {
        self.instances.iter().copied()
    }
}

impl<T: 'static> Inspectable for Repository<T> {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn fields(&self) -> FieldMap {
        FieldMap::from([
            (
                "instances".to_string(),
                FieldValue::from(self.instances.iter().copied().collect::<Vec<_>>()),
            ),
            ("resource".to_string(), FieldValue::object("CatalogResource")),
        ])
    }
}

/// Storefront URL lookups. Created on first use.
#[derive(Debug, Clone, Default)]
pub struct UrlResolver {
    last_lookup: Option<String>,
}

impl UrlResolver {
    /// Resolve `url` to a rewrite.
    pub fn resolve(&mut self, url: &str) -> Option<&'static UrlRewrite> {
        self.last_lookup = Some(url.to_string());
        fixtures::url_rewrite(url)
    }
}

impl Inspectable for UrlResolver {
    fn type_name(&self) -> &str {
        "UrlResolver"
    }

    fn fields(&self) -> FieldMap {
        FieldMap::from([
            ("lastLookup".to_string(), FieldValue::from(self.last_lookup.clone())),
            ("rewrites".to_string(), FieldValue::from(fixtures::URL_REWRITES.len())),
        ])
    }
}

/// Data describing the request being served.
///
/// Must be cleared once the response is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    store_code: String,
    operation_name: String,
}

impl RequestContext {
    /// Store code used when the client sends none.
    pub const DEFAULT_STORE: &'static str = "default";

    /// Fill in the context for a new request.
    pub fn begin(&mut self, store_code: Option<&str>, operation_name: Option<&str>) {
        self.store_code = store_code.unwrap_or(Self::DEFAULT_STORE).to_string();
        self.operation_name = operation_name.unwrap_or_default().to_string();
    }

    /// Drop everything the request set.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Store code of the current request.
    pub fn store_code(&self) -> &str {
        &self.store_code
    }
}

impl Inspectable for RequestContext {
    fn type_name(&self) -> &str {
        "RequestContext"
    }

    fn fields(&self) -> FieldMap {
        FieldMap::from([
            ("storeCode".to_string(), FieldValue::from(self.store_code.as_str())),
            ("operationName".to_string(), FieldValue::from(self.operation_name.as_str())),
        ])
    }
}

/// Per-container request counter.
#[derive(Debug, Clone, Default)]
pub struct QueryLog {
    served: u64,
    last_operation: Option<String>,
}

impl QueryLog {
    /// Count one served request.
    pub fn record(&mut self, operation: Option<&str>) {
        self.served += 1;
        self.last_operation = operation.map(str::to_string);
    }

    /// Requests served by this container.
    pub fn served(&self) -> u64 {
        self.served
    }
}

impl Inspectable for QueryLog {
    fn type_name(&self) -> &str {
        "QueryLog"
    }

    fn fields(&self) -> FieldMap {
        FieldMap::from([
            ("served".to_string(), FieldValue::from(self.served)),
            ("lastOperation".to_string(), FieldValue::from(self.last_operation.clone())),
        ])
    }
}
