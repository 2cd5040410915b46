// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Before/after comparison of shared object state.
//!
//! Usage around one request:
//!
//! ```rust,ignore
//! comparator.capture_before(&container, first_request);
//! worker.handle(envelope);
//! comparator.capture_after(&container, first_request);
//! let report = comparator.compare("navigationMenu");
//! assert!(report.is_empty(), "{}", report);
//! ```
//!
//! The baseline is taken on the first request only. Objects created lazily
//! during the first request are added to the baseline when that request
//! ends, so they are not reported as new on later requests.

use std::collections::BTreeMap;

use tracing::debug;

use crate::collector::{Collector, SharedObjectSnapshot, SharedRegistry};
use crate::report::{DiffReport, FieldDiff, TypeDiff};
use crate::rules::StateRules;
use crate::value::{FieldValue, ValueKind};

/// Detects shared state that changed across a request.
#[derive(Debug, Clone)]
pub struct Comparator {
    collector: Collector,
    rules: StateRules,
    before: SharedObjectSnapshot,
    after: SharedObjectSnapshot,
}

impl Comparator {
    /// Comparator applying `rules`.
    pub fn new(rules: StateRules) -> Self {
        Self {
            collector: Collector::new(),
            rules,
            before: SharedObjectSnapshot::new(),
            after: SharedObjectSnapshot::new(),
        }
    }

    /// Take the baseline, on the first request only.
    pub fn capture_before(&mut self, registry: &dyn SharedRegistry, first_request: bool) {
        if first_request {
            self.before = self.collector.snapshot(registry);
        }
    }

    /// Record the state after a request.
    ///
    /// After the first request, types that appeared during it join the
    /// baseline; types already in the baseline keep their recorded values.
    pub fn capture_after(&mut self, registry: &dyn SharedRegistry, first_request: bool) {
        self.after = self.collector.snapshot(registry);
        if first_request {
            self.before.absorb_new(&self.after);
        }
    }

    /// Baseline snapshot.
    pub fn before(&self) -> &SharedObjectSnapshot {
        &self.before
    }

    /// Latest after-request snapshot.
    pub fn after(&self) -> &SharedObjectSnapshot {
        &self.after
    }

    /// Report every change between baseline and latest snapshot that the
    /// rules do not excuse for `operation`.
    pub fn compare(&self, operation: &str) -> DiffReport {
        let mut report = DiffReport::default();

        for (type_name, fields_after) in self.after.iter() {
            if self.rules.is_denied(type_name, operation) {
                continue;
            }

            let Some(fields_before) = self.before.get(type_name) else {
                report.insert(type_name, TypeDiff::NewObject);
                continue;
            };

            let allowed = self.rules.allowed_fields(type_name);
            let mut changed = BTreeMap::new();
            for (field, after) in fields_after {
                if allowed.is_some_and(|fields| fields.contains(field)) {
                    continue;
                }
                if let Some(diff) = check_values(fields_before.get(field), after) {
                    changed.insert(field.clone(), diff);
                }
            }

            if !changed.is_empty() {
                report.insert(type_name, TypeDiff::Changed(changed));
            }
        }

        debug!(operation, leaks = report.len(), "Compared shared object state");
        report
    }
}

fn check_values(before: Option<&FieldValue>, after: &FieldValue) -> Option<FieldDiff> {
    let before = before.unwrap_or(&FieldValue::Null);
    let diff = || FieldDiff {
        before: before.clone(),
        after: after.clone(),
    };

    if before.kind() != after.kind() {
        // null -> value is lazy initialization
        return (!before.is_null()).then(diff);
    }

    let changed = match after.kind() {
        ValueKind::Null => false,
        ValueKind::Boolean | ValueKind::Integer | ValueKind::Double | ValueKind::String => {
            before != after
        }
        ValueKind::Array => before.len() != after.len() || !before.loose_eq(after),
        ValueKind::Object => before != after,
    };
    changed.then(diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::Inspectable;
    use crate::value::FieldMap;

    struct Object {
        type_name: &'static str,
        fields: FieldMap,
    }

    impl Inspectable for Object {
        fn type_name(&self) -> &str {
            self.type_name
        }

        fn fields(&self) -> FieldMap {
            self.fields.clone()
        }
    }

    #[derive(Default)]
    struct Registry(Vec<Object>);

    impl Registry {
        fn set(&mut self, type_name: &'static str, field: &str, value: impl Into<FieldValue>) {
            let value = value.into();
            match self.0.iter_mut().find(|o| o.type_name == type_name) {
                Some(object) => {
                    object.fields.insert(field.to_string(), value);
                }
                None => self.0.push(Object {
                    type_name,
                    fields: FieldMap::from([(field.to_string(), value)]),
                }),
            }
        }
    }

    impl SharedRegistry for Registry {
        fn visit_shared(&self, visit: &mut dyn FnMut(&dyn Inspectable)) {
            for object in &self.0 {
                visit(object);
            }
        }
    }

    #[test]
    fn test_unchanged_state_is_empty_report() {
        let mut registry = Registry::default();
        registry.set("Config", "area", "graphql");
        let mut comparator = Comparator::new(StateRules::empty());

        for first in [true, false, false] {
            comparator.capture_before(&registry, first);
            comparator.capture_after(&registry, first);
            assert!(comparator.compare("op").is_empty());
        }
    }

    #[test]
    fn test_new_object_tolerated_on_first_request_only() {
        let mut registry = Registry::default();
        registry.set("Config", "area", "graphql");
        let mut comparator = Comparator::new(StateRules::empty());

        comparator.capture_before(&registry, true);
        registry.set("UrlResolver", "resolved", 0);
        comparator.capture_after(&registry, true);
        assert!(comparator.compare("op").is_empty());

        comparator.capture_before(&registry, false);
        registry.set("MenuCache", "items", 0);
        comparator.capture_after(&registry, false);

        let report = comparator.compare("op");
        assert_eq!(report.len(), 1);
        assert_eq!(report.get("MenuCache"), Some(&TypeDiff::NewObject));
    }

    #[test]
    fn test_first_request_merge_keeps_baseline_values() {
        let mut registry = Registry::default();
        registry.set("Counter", "hits", 0);
        let mut comparator = Comparator::new(StateRules::empty());

        comparator.capture_before(&registry, true);
        registry.set("Counter", "hits", 1);
        comparator.capture_after(&registry, true);

        let report = comparator.compare("op");
        let diff = report.field("Counter", "hits").unwrap();
        assert_eq!(diff.before, FieldValue::Int(0));
        assert_eq!(diff.after, FieldValue::Int(1));
    }

    #[test]
    fn test_scalar_change_reported() {
        let mut registry = Registry::default();
        registry.set("Store", "code", "default");
        let mut comparator = Comparator::new(StateRules::empty());

        comparator.capture_before(&registry, true);
        comparator.capture_after(&registry, true);
        registry.set("Store", "code", "admin");
        comparator.capture_before(&registry, false);
        comparator.capture_after(&registry, false);

        let report = comparator.compare("op");
        assert_eq!(
            report.field("Store", "code"),
            Some(&FieldDiff {
                before: FieldValue::from("default"),
                after: FieldValue::from("admin"),
            })
        );
    }

    #[test]
    fn test_lazy_initialization_is_benign() {
        let mut registry = Registry::default();
        registry.set("Repository", "cache", FieldValue::Null);
        let mut comparator = Comparator::new(StateRules::empty());

        comparator.capture_before(&registry, true);
        registry.set("Repository", "cache", FieldValue::object("ArrayCache"));
        registry.set("Repository", "connection", FieldValue::object("Connection"));
        comparator.capture_after(&registry, true);

        assert!(comparator.compare("op").is_empty());
    }

    #[test]
    fn test_kind_change_from_value_is_reported() {
        let mut registry = Registry::default();
        registry.set("Repository", "limit", 10);
        let mut comparator = Comparator::new(StateRules::empty());

        comparator.capture_before(&registry, true);
        registry.set("Repository", "limit", FieldValue::Null);
        comparator.capture_after(&registry, true);

        let report = comparator.compare("op");
        let diff = report.field("Repository", "limit").unwrap();
        assert_eq!(diff.before, FieldValue::Int(10));
        assert_eq!(diff.after, FieldValue::Null);
    }

    #[test]
    fn test_int_to_float_is_kind_change() {
        let mut registry = Registry::default();
        registry.set("Price", "amount", 10);
        let mut comparator = Comparator::new(StateRules::empty());

        comparator.capture_before(&registry, true);
        registry.set("Price", "amount", 10.0);
        comparator.capture_after(&registry, true);

        assert!(comparator.compare("op").field("Price", "amount").is_some());
    }

    #[test]
    fn test_array_loose_equality_and_length() {
        let mut registry = Registry::default();
        registry.set("Repository", "ids", vec![1, 2]);
        let mut comparator = Comparator::new(StateRules::empty());

        comparator.capture_before(&registry, true);
        registry.set("Repository", "ids", vec!["1", "2"]);
        comparator.capture_after(&registry, true);
        assert!(comparator.compare("op").is_empty());

        registry.set("Repository", "ids", vec![1, 2, 3]);
        comparator.capture_after(&registry, false);
        assert!(comparator.compare("op").field("Repository", "ids").is_some());
    }

    #[test]
    fn test_object_identity_change_is_reported() {
        let mut registry = Registry::default();
        registry.set("Resolver", "cache", FieldValue::object("ArrayCache"));
        let mut comparator = Comparator::new(StateRules::empty());

        comparator.capture_before(&registry, true);
        registry.set("Resolver", "cache", FieldValue::object("RedisCache"));
        comparator.capture_after(&registry, true);

        let report = comparator.compare("op");
        assert_eq!(
            report.field("Resolver", "cache").map(|d| &d.after),
            Some(&FieldValue::object("RedisCache"))
        );
    }

    #[test]
    fn test_allow_list_scoping() {
        let rules = StateRules::builder()
            .allow("UrlResolver", ["lastPath"])
            .allow_descendants("AbstractRepository", ["loaded"])
            .declare_type("CategoryRepository", ["AbstractRepository"])
            .declare_type("ProductRepository", ["AbstractRepository"])
            .build()
            .unwrap();

        let mut registry = Registry::default();
        registry.set("UrlResolver", "lastPath", "/");
        registry.set("UrlResolver", "hits", 0);
        registry.set("CategoryRepository", "loaded", 0);
        registry.set("ProductRepository", "loaded", 0);
        registry.set("ProductRepository", "pageSize", 20);
        registry.set("Sibling", "loaded", 0);

        let mut comparator = Comparator::new(rules);
        comparator.capture_before(&registry, true);
        registry.set("UrlResolver", "lastPath", "/graphql");
        registry.set("UrlResolver", "hits", 1);
        registry.set("CategoryRepository", "loaded", 4);
        registry.set("ProductRepository", "loaded", 2);
        registry.set("ProductRepository", "pageSize", 12);
        registry.set("Sibling", "loaded", 1);
        comparator.capture_after(&registry, true);

        let report = comparator.compare("op");
        assert!(report.field("UrlResolver", "lastPath").is_none());
        assert!(report.field("UrlResolver", "hits").is_some());
        assert!(report.get("CategoryRepository").is_none());
        assert!(report.field("ProductRepository", "loaded").is_none());
        assert!(report.field("ProductRepository", "pageSize").is_some());
        assert!(report.field("Sibling", "loaded").is_some());
        assert_eq!(report.len(), 3);
    }

    #[test]
    fn test_deny_list_scoping() {
        let rules = StateRules::builder()
            .deny("Logger")
            .deny_for("navigationMenu", "MenuCache")
            .build()
            .unwrap();

        let mut registry = Registry::default();
        registry.set("Logger", "lines", 0);
        registry.set("MenuCache", "items", 0);

        let mut comparator = Comparator::new(rules);
        comparator.capture_before(&registry, true);
        registry.set("Logger", "lines", 10);
        registry.set("MenuCache", "items", 3);
        comparator.capture_after(&registry, true);

        assert!(comparator.compare("navigationMenu").is_empty());

        let report = comparator.compare("category");
        assert_eq!(report.len(), 1);
        assert!(report.field("MenuCache", "items").is_some());
    }
}
