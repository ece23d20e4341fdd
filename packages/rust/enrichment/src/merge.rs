//! Priority merge of adapter results onto a lead's current fields.
//!
//! Rules, per field:
//! - only successful results take part, in registry order;
//! - the first non-empty value wins;
//! - the winner replaces the current value only when it differs;
//! - empty values never overwrite anything.

use leadflow_shared::{EnrichmentFields, LeadField};
use serde::Serialize;

use crate::EnrichmentResult;

/// One field the merge will change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: LeadField,
    pub value: String,
    /// Adapter that supplied the winning value.
    pub source: String,
}

/// The set of changes a merge would make.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergePlan {
    pub changes: Vec<FieldChange>,
}

impl MergePlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Write the planned values into `fields`.
    pub fn apply(&self, fields: &mut EnrichmentFields) {
        for change in &self.changes {
            fields.set(change.field, Some(change.value.clone()));
        }
    }

    /// Human-readable summary, e.g. `email (people-data), phone (registry)`.
    pub fn describe(&self) -> String {
        self.changes
            .iter()
            .map(|c| format!("{} ({})", c.field.as_str(), c.source))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Compute which fields of `current` the `results` would change.
pub fn plan_merge(current: &EnrichmentFields, results: &[EnrichmentResult]) -> MergePlan {
    let mut changes = Vec::new();

    for field in LeadField::ALL {
        let winner = results
            .iter()
            .filter(|r| r.succeeded)
            .find_map(|r| r.fields.get(field).map(|v| (v, r.source_name.as_str())));

        let Some((value, source)) = winner else {
            continue;
        };
        if current.get(field) != Some(value) {
            changes.push(FieldChange {
                field,
                value: value.to_string(),
                source: source.to_string(),
            });
        }
    }

    MergePlan { changes }
}
