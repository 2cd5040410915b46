// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Allow and deny tables for the state comparator.
//!
//! - A **denied** type is skipped entirely, either for every operation or
//!   for one named operation.
//! - An **allowed** field may change between requests without being
//!   reported. Fields are allowed on an exact type, or on every type that
//!   declares a given ancestor.
//!
//! Type ancestry is declared explicitly and resolved once, when the rules
//! are built, into a flat type to allowed-fields table.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key standing for "every operation" in a deny table.
pub const ANY_OPERATION: &str = "*";

/// Errors while building rules.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RulesError {
    /// The declared hierarchy contains a cycle through this type.
    #[error("type hierarchy has a cycle through '{0}'")]
    HierarchyCycle(String),

    /// The JSON document could not be parsed.
    #[error("invalid state rules document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serializable form of the rules.
///
/// ```json
/// {
///   "deny": { "*": ["Logger"], "navigationMenu": ["MenuCache"] },
///   "allow": { "UrlResolver": ["lastPath"] },
///   "allow_descendants": { "AbstractRepository": ["loaded"] },
///   "hierarchy": { "CategoryRepository": ["AbstractRepository"] }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateRulesConfig {
    /// Operation name (or `*`) to denied types.
    pub deny: BTreeMap<String, Vec<String>>,
    /// Type to fields allowed on exactly that type.
    pub allow: BTreeMap<String, Vec<String>>,
    /// Ancestor to fields allowed on its proper descendants.
    pub allow_descendants: BTreeMap<String, Vec<String>>,
    /// Type to its declared ancestors.
    pub hierarchy: BTreeMap<String, Vec<String>>,
}

/// Builder for [`StateRules`].
#[derive(Debug, Clone, Default)]
pub struct StateRulesBuilder {
    global_deny: BTreeSet<String>,
    operation_deny: BTreeMap<String, BTreeSet<String>>,
    allow: BTreeMap<String, BTreeSet<String>>,
    allow_descendants: BTreeMap<String, BTreeSet<String>>,
    hierarchy: BTreeMap<String, BTreeSet<String>>,
}

impl StateRulesBuilder {
    /// Skip `type_name` for every operation.
    pub fn deny(mut self, type_name: impl Into<String>) -> Self {
        self.global_deny.insert(type_name.into());
        self
    }

    /// Skip `type_name` when comparing after `operation` only.
    pub fn deny_for(mut self, operation: impl Into<String>, type_name: impl Into<String>) -> Self {
        let operation = operation.into();
        if operation == ANY_OPERATION {
            return self.deny(type_name);
        }
        self.operation_deny
            .entry(operation)
            .or_default()
            .insert(type_name.into());
        self
    }

    /// Allow `fields` to change on exactly `type_name`.
    pub fn allow<I, S>(mut self, type_name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow
            .entry(type_name.into())
            .or_default()
            .extend(fields.into_iter().map(Into::into));
        self
    }

    /// Allow `fields` to change on every proper descendant of `ancestor`.
    pub fn allow_descendants<I, S>(mut self, ancestor: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_descendants
            .entry(ancestor.into())
            .or_default()
            .extend(fields.into_iter().map(Into::into));
        self
    }

    /// Declare the direct ancestors of `type_name`.
    pub fn declare_type<I, S>(mut self, type_name: impl Into<String>, ancestors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hierarchy
            .entry(type_name.into())
            .or_default()
            .extend(ancestors.into_iter().map(Into::into));
        self
    }

    /// Resolve the hierarchy and flatten the allow tables.
    pub fn build(self) -> Result<StateRules, RulesError> {
        let mut ancestors: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for type_name in self.hierarchy.keys() {
            let mut resolved = BTreeSet::new();
            let mut path = Vec::new();
            collect_ancestors(type_name, &self.hierarchy, &mut path, &mut resolved)?;
            ancestors.insert(type_name.clone(), resolved);
        }

        let mut allowed: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (type_name, fields) in &self.allow {
            allowed
                .entry(type_name.clone())
                .or_default()
                .extend(fields.iter().cloned());
        }
        for (type_name, type_ancestors) in &ancestors {
            for ancestor in type_ancestors {
                if let Some(fields) = self.allow_descendants.get(ancestor) {
                    allowed
                        .entry(type_name.clone())
                        .or_default()
                        .extend(fields.iter().cloned());
                }
            }
        }

        Ok(StateRules {
            global_deny: self.global_deny,
            operation_deny: self.operation_deny,
            allowed,
        })
    }
}

fn collect_ancestors(
    type_name: &str,
    hierarchy: &BTreeMap<String, BTreeSet<String>>,
    path: &mut Vec<String>,
    resolved: &mut BTreeSet<String>,
) -> Result<(), RulesError> {
    let Some(parents) = hierarchy.get(type_name) else {
        return Ok(());
    };
    path.push(type_name.to_string());
    for parent in parents {
        if path.iter().any(|seen| seen == parent) {
            return Err(RulesError::HierarchyCycle(parent.clone()));
        }
        if resolved.insert(parent.clone()) {
            collect_ancestors(parent, hierarchy, path, resolved)?;
        }
    }
    path.pop();
    Ok(())
}

/// Resolved allow and deny tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateRules {
    global_deny: BTreeSet<String>,
    operation_deny: BTreeMap<String, BTreeSet<String>>,
    allowed: BTreeMap<String, BTreeSet<String>>,
}

impl StateRules {
    /// Start building rules.
    pub fn builder() -> StateRulesBuilder {
        StateRulesBuilder::default()
    }

    /// Rules that deny and allow nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build rules from their serializable form.
    pub fn from_config(config: StateRulesConfig) -> Result<Self, RulesError> {
        let mut builder = Self::builder();
        for (operation, types) in config.deny {
            for type_name in types {
                builder = builder.deny_for(operation.clone(), type_name);
            }
        }
        for (type_name, fields) in config.allow {
            builder = builder.allow(type_name, fields);
        }
        for (ancestor, fields) in config.allow_descendants {
            builder = builder.allow_descendants(ancestor, fields);
        }
        for (type_name, ancestors) in config.hierarchy {
            builder = builder.declare_type(type_name, ancestors);
        }
        builder.build()
    }

    /// Parse rules from a JSON document shaped like [`StateRulesConfig`].
    pub fn from_json(json: &str) -> Result<Self, RulesError> {
        Self::from_config(serde_json::from_str(json)?)
    }

    /// Whether `type_name` is skipped when comparing after `operation`.
    pub fn is_denied(&self, type_name: &str, operation: &str) -> bool {
        self.global_deny.contains(type_name)
            || self
                .operation_deny
                .get(operation)
                .is_some_and(|types| types.contains(type_name))
    }

    /// Fields of `type_name` that may change.
    pub fn allowed_fields(&self, type_name: &str) -> Option<&BTreeSet<String>> {
        self.allowed.get(type_name)
    }

    /// Whether `field` of `type_name` may change.
    pub fn is_allowed(&self, type_name: &str, field: &str) -> bool {
        self.allowed
            .get(type_name)
            .is_some_and(|fields| fields.contains(field))
    }
}
