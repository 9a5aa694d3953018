//! The authored artifact: trees, recommendations and error statements.

use serde::{Deserialize, Serialize};

use crate::cql::slugify;
use crate::tree::Conjunction;

/// Data model the generated library is written against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataModel {
    /// Model name (`FHIR`).
    pub name: String,
    /// Model version.
    pub version: String,
}

impl Default for DataModel {
    fn default() -> Self {
        Self {
            name: "FHIR".to_string(),
            version: "1.0.2".to_string(),
        }
    }
}

/// A library included by the generated library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludedLibrary {
    /// Library name.
    pub name: String,
    /// Library version.
    pub version: String,
    /// Local alias (`called <alias>`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl IncludedLibrary {
    /// Creates an include declaration.
    pub fn new(name: &str, version: &str, alias: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            alias: Some(alias.to_string()),
        }
    }

    /// FHIRHelpers, the CDS Connect commons and conversions libraries.
    pub fn defaults() -> Vec<IncludedLibrary> {
        vec![
            IncludedLibrary::new("FHIRHelpers", "1.0.2", "FHIRHelpers"),
            IncludedLibrary::new("CDS_Connect_Commons_for_FHIRv102", "1.1.0", "C3F"),
            IncludedLibrary::new("CDS_Connect_Conversions", "1", "Convert"),
        ]
    }
}

/// A boolean parameter declared by the author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BooleanParameter {
    /// Parameter name.
    pub name: String,
    /// Default value expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// A subpopulation attached to a recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubpopulationRef {
    /// Unique id of the referenced subpopulation.
    #[serde(rename = "uniqueId", default)]
    pub unique_id: Option<String>,
    /// Name of the referenced subpopulation.
    #[serde(rename = "subpopulationName", default)]
    pub subpopulation_name: Option<String>,
    /// Whether the reference targets a system-reserved subpopulation.
    #[serde(default)]
    pub special: bool,
    /// CQL expression for a system-reserved subpopulation.
    #[serde(rename = "special_subpopulationName", default)]
    pub special_subpopulation_name: Option<String>,
}

impl SubpopulationRef {
    /// References a user subpopulation by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            subpopulation_name: Some(name.into()),
            ..Self::default()
        }
    }

    /// The guard expression this reference contributes to a conditional.
    pub fn guard(&self) -> String {
        if let Some(special) = self.special_subpopulation_name.as_deref() {
            if !special.is_empty() {
                return special.to_string();
            }
        }
        let name = self
            .subpopulation_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.unique_id.as_deref())
            .unwrap_or_default();
        format!("\"{name}\"")
    }
}

/// A recommendation with its guarding subpopulations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Recommendation {
    /// Unique id.
    #[serde(default)]
    pub uid: Option<String>,
    /// Evidence grade.
    #[serde(default)]
    pub grade: Option<String>,
    /// Recommendation text.
    #[serde(default)]
    pub text: String,
    /// Rationale text.
    #[serde(default)]
    pub rationale: Option<String>,
    /// Subpopulations that must all hold for the recommendation to apply.
    #[serde(default)]
    pub subpopulations: Vec<SubpopulationRef>,
}

/// Condition of an error statement branch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorCondition {
    /// Label shown in the editor.
    #[serde(default)]
    pub label: Option<String>,
    /// CQL expression tested.
    #[serde(default)]
    pub value: Option<String>,
}

/// One `if ... then ...` branch of an error statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBranch {
    /// Tested condition.
    #[serde(default)]
    pub condition: ErrorCondition,
    /// Error message when the branch is a leaf.
    #[serde(default)]
    pub then_clause: Option<String>,
    /// Leaf (`true`) or nested statement (`false`).
    #[serde(default = "default_true")]
    pub use_then_clause: bool,
    /// Nested statement, used when `use_then_clause` is false.
    #[serde(default)]
    pub child: Option<Box<ErrorStatement>>,
}

fn default_true() -> bool {
    true
}

/// The author's nested if/then/else error logic.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStatement {
    /// Branches in order.
    #[serde(default)]
    pub statements: Vec<ErrorBranch>,
    /// Final else message.
    #[serde(default, alias = "else")]
    pub else_clause: Option<String>,
}

/// An authored decision-support artifact, immutable for one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Display name as authored.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Target data model; `None` means the generator's default.
    pub data_model: Option<DataModel>,
    /// Included libraries; `None` means the generator's defaults.
    pub include_libraries: Option<Vec<IncludedLibrary>>,
    /// Evaluation context.
    pub context: String,
    /// Inclusion criteria tree.
    pub inclusions: Conjunction,
    /// Exclusion criteria tree.
    pub exclusions: Conjunction,
    /// Subpopulation trees.
    pub subpopulations: Vec<Conjunction>,
    /// Author-declared boolean parameters.
    pub boolean_parameters: Vec<BooleanParameter>,
    /// Recommendations, in priority order.
    pub recommendations: Vec<Recommendation>,
    /// Error logic.
    pub error_statement: ErrorStatement,
}

impl Artifact {
    /// Creates an artifact with empty trees and default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "1".to_string(),
            data_model: None,
            include_libraries: None,
            context: "Patient".to_string(),
            inclusions: Conjunction::new("And", "inclusions"),
            exclusions: Conjunction::new("Or", "exclusions"),
            subpopulations: Vec::new(),
            boolean_parameters: Vec::new(),
            recommendations: Vec::new(),
            error_statement: ErrorStatement::default(),
        }
    }

    /// Library name used in the header and as the output file stem.
    pub fn library_name(&self) -> String {
        slugify(&self.name)
    }

    /// Whether any recommendation references the named subpopulation.
    pub fn is_referenced_by_recommendation(&self, subpopulation_name: Option<&str>) -> bool {
        let Some(name) = subpopulation_name else {
            return false;
        };
        self.recommendations.iter().any(|recommendation| {
            recommendation
                .subpopulations
                .iter()
                .any(|subpop| subpop.subpopulation_name.as_deref() == Some(name))
        })
    }
}
