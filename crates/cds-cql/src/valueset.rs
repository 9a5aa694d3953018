//! Value set catalog types.
//!
//! A [`ValueSetGroup`] is what the catalog hands back for one selectable
//! clinical element: the value sets to retrieve against, and optionally the
//! inline concepts (with their codes) to declare instead.

use serde::{Deserialize, Serialize};

/// Catalog category a parameter resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueSetCategory {
    /// Observations (labs, vitals).
    Observation,
    /// Conditions (problems, diagnoses).
    Condition,
    /// Medication orders and statements.
    Medication,
    /// Procedures.
    Procedure,
    /// Encounters.
    Encounter,
    /// Allergies and intolerances.
    AllergyIntolerance,
}

impl ValueSetCategory {
    /// All categories, in catalog order.
    pub const ALL: [ValueSetCategory; 6] = [
        ValueSetCategory::Observation,
        ValueSetCategory::Condition,
        ValueSetCategory::Medication,
        ValueSetCategory::Procedure,
        ValueSetCategory::Encounter,
        ValueSetCategory::AllergyIntolerance,
    ];

    /// Parameter type tag for this category (`observation`, `allergyIntolerance`, ...).
    pub fn tag(self) -> &'static str {
        match self {
            ValueSetCategory::Observation => "observation",
            ValueSetCategory::Condition => "condition",
            ValueSetCategory::Medication => "medication",
            ValueSetCategory::Procedure => "procedure",
            ValueSetCategory::Encounter => "encounter",
            ValueSetCategory::AllergyIntolerance => "allergyIntolerance",
        }
    }

    /// Looks a category up by its parameter type tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.tag() == tag)
    }

    /// FHIR resource type retrieved for this category.
    pub fn resource_type(self) -> &'static str {
        match self {
            ValueSetCategory::Observation => "Observation",
            ValueSetCategory::Condition => "Condition",
            ValueSetCategory::Medication => "Medication",
            ValueSetCategory::Procedure => "Procedure",
            ValueSetCategory::Encounter => "Encounter",
            ValueSetCategory::AllergyIntolerance => "AllergyIntolerance",
        }
    }

    /// Element template used when a group carries inline concepts.
    pub fn concept_template(self) -> &'static str {
        match self {
            ValueSetCategory::Observation => "ObservationByConcept",
            ValueSetCategory::Condition => "ConditionsByConcept",
            ValueSetCategory::Medication => "MedicationsByConcept",
            ValueSetCategory::Procedure => "ProceduresByConcept",
            ValueSetCategory::Encounter => "EncountersByConcept",
            ValueSetCategory::AllergyIntolerance => "AllergyIntolerancesByConcept",
        }
    }
}

impl std::fmt::Display for ValueSetCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A single value set declared in the generated library header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSetResource {
    /// Declared name (`valueset "<name>"`).
    pub name: String,
    /// Value set OID or canonical URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<String>,
    /// Resource type for medications (`MedicationStatement`, `MedicationOrder`).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
}

impl ValueSetResource {
    /// Creates a value set reference.
    pub fn new(name: impl Into<String>, oid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            oid: Some(oid.into()),
            resource_type: None,
        }
    }
}

/// A code system referenced by a code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSystem {
    /// Declared name (`codesystem "<name>"`).
    pub name: String,
    /// Code system identifier.
    pub id: String,
}

/// A single code declared in the generated library header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Code {
    /// Declared name (`code "<name>"`).
    pub name: String,
    /// Code value.
    pub code: String,
    /// Owning code system.
    pub code_system: CodeSystem,
    /// Display text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// A concept grouping one or more codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    /// Declared name (`concept "<name>"`).
    pub name: String,
    /// Codes making up the concept.
    #[serde(default)]
    pub codes: Vec<Code>,
    /// Display text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// Units attached to an observation group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Units {
    /// UCUM unit code.
    pub code: String,
}

/// Everything the catalog knows about one selectable element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSetGroup {
    /// Group identifier; union definitions are named `<id>_valuesets`.
    #[serde(default)]
    pub id: String,
    /// Human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Underlying value sets.
    #[serde(
        default,
        alias = "observations",
        alias = "conditions",
        alias = "medications",
        alias = "procedures",
        alias = "encounters",
        alias = "allergyIntolerances"
    )]
    pub value_sets: Vec<ValueSetResource>,
    /// Inline concepts used instead of value set retrieves.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concepts: Vec<Concept>,
    /// Value set used by `CheckInclusionInVS` modifiers.
    #[serde(
        default,
        rename = "checkInclusionInVS",
        skip_serializing_if = "Option::is_none"
    )]
    pub check_inclusion_in_vs: Option<ValueSetResource>,
    /// Units for value comparisons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<Units>,
}

impl ValueSetGroup {
    /// Creates a group over the given value sets.
    pub fn new(id: impl Into<String>, value_sets: Vec<ValueSetResource>) -> Self {
        Self {
            id: id.into(),
            name: None,
            value_sets,
            concepts: Vec::new(),
            check_inclusion_in_vs: None,
            units: None,
        }
    }

    /// Name of the auxiliary union definition for this group.
    pub fn union_name(&self) -> String {
        format!("{}_valuesets", self.id)
    }
}
