//! In-memory value set catalog.
//!
//! The catalog file is one JSON object with a map per category:
//!
//! ```json
//! {
//!   "observations": {
//!     "ldl": {
//!       "name": "LDL",
//!       "observations": [{ "name": "LDL Cholesterol", "oid": "2.16.840.1.113883.3.117.1.7.1.215" }],
//!       "units": { "code": "mg/dL" }
//!     }
//!   },
//!   "conditions": {}
//! }
//! ```
//!
//! A group without an `id` takes its map key.

use std::collections::HashMap;
use std::path::Path;

use cds_cql::{ValueSetCategory, ValueSetGroup};
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::error::{GenerationError, GenerationResult};
use crate::traits::ValueSetResolver;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogFile {
    #[serde(default)]
    observations: IndexMap<String, ValueSetGroup>,
    #[serde(default)]
    conditions: IndexMap<String, ValueSetGroup>,
    #[serde(default)]
    medications: IndexMap<String, ValueSetGroup>,
    #[serde(default)]
    procedures: IndexMap<String, ValueSetGroup>,
    #[serde(default)]
    encounters: IndexMap<String, ValueSetGroup>,
    #[serde(default)]
    allergy_intolerances: IndexMap<String, ValueSetGroup>,
}

impl CatalogFile {
    fn into_sections(self) -> [(ValueSetCategory, IndexMap<String, ValueSetGroup>); 6] {
        [
            (ValueSetCategory::Observation, self.observations),
            (ValueSetCategory::Condition, self.conditions),
            (ValueSetCategory::Medication, self.medications),
            (ValueSetCategory::Procedure, self.procedures),
            (ValueSetCategory::Encounter, self.encounters),
            (ValueSetCategory::AllergyIntolerance, self.allergy_intolerances),
        ]
    }
}

/// A value set catalog held in memory, keyed by category and group id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    groups: HashMap<ValueSetCategory, IndexMap<String, ValueSetGroup>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a catalog document.
    pub fn from_json(json: &str) -> GenerationResult<Self> {
        let file: CatalogFile =
            serde_json::from_str(json).map_err(|e| GenerationError::Catalog(e.to_string()))?;

        let mut catalog = Self::new();
        for (category, section) in file.into_sections() {
            for (key, mut group) in section {
                if group.id.is_empty() {
                    group.id = key.clone();
                }
                catalog.groups.entry(category).or_default().insert(key, group);
            }
        }
        debug!(groups = catalog.len(), "Loaded value set catalog");
        Ok(catalog)
    }

    /// Reads and parses a catalog file.
    pub fn from_path(path: impl AsRef<Path>) -> GenerationResult<Self> {
        let path = path.as_ref();
        let json =
            std::fs::read_to_string(path).map_err(|e| GenerationError::io_error(path, e))?;
        Self::from_json(&json)
    }

    /// Registers a group under its own id.
    pub fn insert(&mut self, category: ValueSetCategory, group: ValueSetGroup) {
        self.groups
            .entry(category)
            .or_default()
            .insert(group.id.clone(), group);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_group(mut self, category: ValueSetCategory, group: ValueSetGroup) -> Self {
        self.insert(category, group);
        self
    }

    /// Total number of groups across categories.
    pub fn len(&self) -> usize {
        self.groups.values().map(IndexMap::len).sum()
    }

    /// Whether the catalog holds no groups.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ValueSetResolver for InMemoryCatalog {
    fn resolve(&self, category: ValueSetCategory, id: &str) -> Option<ValueSetGroup> {
        self.groups.get(&category)?.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cds_cql::ValueSetResource;

    const CATALOG: &str = r#"{
        "observations": {
            "ldl": {
                "name": "LDL",
                "observations": [{ "name": "LDL Cholesterol", "oid": "2.16.840.1.113883.3.117.1.7.1.215" }],
                "units": { "code": "mg/dL" }
            }
        },
        "medications": {
            "statins": {
                "id": "statin_meds",
                "medications": [
                    { "name": "Statin Statements", "oid": "1.2.3", "type": "MedicationStatement" },
                    { "name": "Statin Orders", "oid": "1.2.3", "type": "MedicationOrder" }
                ]
            }
        }
    }"#;

    #[test]
    fn test_from_json_fills_missing_ids() {
        let catalog = InMemoryCatalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.len(), 2);

        let ldl = catalog.resolve(ValueSetCategory::Observation, "ldl").unwrap();
        assert_eq!(ldl.id, "ldl");
        assert_eq!(ldl.units.unwrap().code, "mg/dL");

        let statins = catalog.resolve(ValueSetCategory::Medication, "statins").unwrap();
        assert_eq!(statins.id, "statin_meds");
        assert_eq!(
            statins.value_sets[1].resource_type.as_deref(),
            Some("MedicationOrder")
        );
    }

    #[test]
    fn test_resolve_is_scoped_by_category() {
        let catalog = InMemoryCatalog::from_json(CATALOG).unwrap();
        assert!(catalog.resolve(ValueSetCategory::Condition, "ldl").is_none());
        assert!(catalog.resolve(ValueSetCategory::Observation, "hdl").is_none());
    }

    #[test]
    fn test_invalid_catalog() {
        let err = InMemoryCatalog::from_json(r#"{ "observations": [] }"#).unwrap_err();
        assert!(matches!(err, GenerationError::Catalog(_)));
    }

    #[test]
    fn test_with_group() {
        let catalog = InMemoryCatalog::new().with_group(
            ValueSetCategory::Encounter,
            ValueSetGroup::new("office", vec![ValueSetResource::new("Office Visit", "1.2")]),
        );
        assert!(!catalog.is_empty());
        assert!(catalog.resolve(ValueSetCategory::Encounter, "office").is_some());
    }

    #[test]
    fn test_from_missing_path() {
        let err = InMemoryCatalog::from_path("/nonexistent/catalog.json").unwrap_err();
        assert!(matches!(err, GenerationError::Io { .. }));
    }
}
