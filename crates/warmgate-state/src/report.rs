// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Comparison results.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, Serializer};

use crate::value::FieldValue;

/// Message reported for a type that was not in the baseline.
pub const NEW_OBJECT_MESSAGE: &str = "new object appeared after first request";

/// One field that changed across a request.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FieldDiff {
    /// Value in the baseline.
    pub before: FieldValue,
    /// Value after the request.
    pub after: FieldValue,
}

/// What changed for one type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDiff {
    /// The type was not in the baseline.
    NewObject,
    /// These fields changed.
    Changed(BTreeMap<String, FieldDiff>),
}

impl Serialize for TypeDiff {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TypeDiff::NewObject => serializer.serialize_str(NEW_OBJECT_MESSAGE),
            TypeDiff::Changed(fields) => fields.serialize(serializer),
        }
    }
}

/// Every leak found by one comparison. Empty means no leak.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct DiffReport {
    entries: BTreeMap<String, TypeDiff>,
}

impl DiffReport {
    /// Whether no leak was found.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of types reported.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entry for `type_name`.
    pub fn get(&self, type_name: &str) -> Option<&TypeDiff> {
        self.entries.get(type_name)
    }

    /// Changed field of `type_name`, if reported.
    pub fn field(&self, type_name: &str, field: &str) -> Option<&FieldDiff> {
        match self.entries.get(type_name) {
            Some(TypeDiff::Changed(fields)) => fields.get(field),
            _ => None,
        }
    }

    /// Reported types in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypeDiff)> {
        self.entries.iter().map(|(name, diff)| (name.as_str(), diff))
    }

    /// Pretty JSON rendering for failure messages.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{:?}", self.entries))
    }

    pub(crate) fn insert(&mut self, type_name: impl Into<String>, diff: TypeDiff) {
        self.entries.insert(type_name.into(), diff);
    }
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} objects changed state during request", self.entries.len())?;
        let mut separator = ": ";
        for (type_name, diff) in &self.entries {
            f.write_str(separator)?;
            separator = "; ";
            match diff {
                TypeDiff::NewObject => write!(f, "{} (new object)", type_name)?,
                TypeDiff::Changed(fields) => {
                    write!(f, "{} (", type_name)?;
                    for (i, (field, change)) in fields.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{}: {} -> {}", field, change.before, change.after)?;
                    }
                    f.write_str(")")?;
                }
            }
        }
        Ok(())
    }
}
