// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Snapshots of the shared objects living in a container.

use std::collections::BTreeMap;

use tracing::debug;

use crate::value::{FieldMap, FieldValue};

/// An object whose mutable state can be recorded.
///
/// Every shared service that outlives a request implements this and lists
/// all of its fields, including the ones that are expected to change.
/// Filtering happens in the comparator, not here.
pub trait Inspectable {
    /// Stable type identifier used as the snapshot key.
    fn type_name(&self) -> &str;

    /// Current value of every field.
    fn fields(&self) -> FieldMap;
}

/// Enumerates the shared instances of a container.
pub trait SharedRegistry {
    /// Call `visit` once for every live shared instance.
    fn visit_shared(&self, visit: &mut dyn FnMut(&dyn Inspectable));
}

/// Type identifier to recorded fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedObjectSnapshot {
    objects: BTreeMap<String, FieldMap>,
}

impl SharedObjectSnapshot {
    /// Empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `fields` for `type_name`, replacing any previous entry.
    pub fn insert(&mut self, type_name: impl Into<String>, fields: FieldMap) {
        self.objects.insert(type_name.into(), fields);
    }

    /// Fields recorded for `type_name`.
    pub fn get(&self, type_name: &str) -> Option<&FieldMap> {
        self.objects.get(type_name)
    }

    /// Single field recorded for `type_name`.
    pub fn field(&self, type_name: &str, field: &str) -> Option<&FieldValue> {
        self.objects.get(type_name).and_then(|fields| fields.get(field))
    }

    /// Whether `type_name` was recorded.
    pub fn contains(&self, type_name: &str) -> bool {
        self.objects.contains_key(type_name)
    }

    /// Number of recorded types.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Recorded types in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldMap)> {
        self.objects.iter().map(|(name, fields)| (name.as_str(), fields))
    }

    /// Add every type from `other` that is not recorded here yet.
    ///
    /// Entries already present are kept as they are.
    pub fn absorb_new(&mut self, other: &SharedObjectSnapshot) {
        for (type_name, fields) in &other.objects {
            self.objects
                .entry(type_name.clone())
                .or_insert_with(|| fields.clone());
        }
    }
}

/// Records [`SharedObjectSnapshot`]s from a [`SharedRegistry`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Collector;

impl Collector {
    /// New collector.
    pub fn new() -> Self {
        Self
    }

    /// Record every shared instance the registry reports.
    ///
    /// Two instances reporting the same type name share one entry; the one
    /// visited last wins.
    pub fn snapshot(&self, registry: &dyn SharedRegistry) -> SharedObjectSnapshot {
        let mut snapshot = SharedObjectSnapshot::new();
        registry.visit_shared(&mut |object| {
            let type_name = object.type_name();
            if snapshot.contains(type_name) {
                debug!(type_name, "Shared type reported twice, keeping the last instance");
            }
            snapshot.insert(type_name, object.fields());
        });
        debug!(types = snapshot.len(), "Collected shared object snapshot");
        snapshot
    }
}
