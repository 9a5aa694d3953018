//! JSON ingestion.
//!
//! Reads the authoring tool's document shape and decides, once per node,
//! whether it is a conjunction, a parameter holder or a leaf element.

use serde::Deserialize;
use serde_json::Value;

use crate::artifact::{
    Artifact, BooleanParameter, DataModel, ErrorStatement, IncludedLibrary, Recommendation,
};
use crate::error::{ArtifactError, ArtifactResult};
use crate::tree::{Conjunction, Element, ExpressionNode, Modifier, Parameter, ParameterNode};

// =============================================================================
// Raw document shape
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<Value>,
    #[serde(default)]
    data_model: Option<DataModel>,
    #[serde(default)]
    include_libraries: Option<Vec<IncludedLibrary>>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    exp_tree_include: Option<RawNode>,
    #[serde(default)]
    exp_tree_exclude: Option<RawNode>,
    #[serde(default)]
    subpopulations: Vec<RawNode>,
    #[serde(default)]
    boolean_parameters: Vec<BooleanParameter>,
    #[serde(default)]
    recommendations: Vec<Recommendation>,
    #[serde(default)]
    error_statement: Option<ErrorStatement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    unique_id: Option<String>,
    #[serde(rename = "type", default)]
    node_type: Option<String>,
    #[serde(default)]
    template: Option<String>,
    #[serde(default)]
    extends: Option<String>,
    #[serde(default)]
    parameters: Vec<RawParameter>,
    #[serde(default)]
    modifiers: Vec<Modifier>,
    #[serde(default)]
    child_instances: Option<Vec<RawNode>>,
    #[serde(default)]
    subpopulation_name: Option<String>,
    #[serde(default)]
    special: bool,
    #[serde(rename = "special_subpopulationName", default)]
    special_subpopulation_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawParameter {
    id: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    exclusive: Option<bool>,
}

impl RawParameter {
    fn into_parameter(self) -> Parameter {
        let tag = self.kind.as_deref().unwrap_or("");
        let mut parameter = Parameter::new(self.id, tag, self.value);
        parameter.exclusive = self.exclusive;
        parameter
    }
}

// =============================================================================
// Classification
// =============================================================================

impl RawNode {
    fn into_node(self) -> ArtifactResult<ExpressionNode> {
        if self.child_instances.is_some() {
            return self.into_conjunction(None).map(ExpressionNode::Conjunction);
        }

        let unique_id = self.unique_id.ok_or_else(|| ArtifactError::MissingField {
            field: "uniqueId",
            context: format!("node {}", self.id.as_deref().unwrap_or("<unnamed>")),
        })?;
        let parameters = self
            .parameters
            .into_iter()
            .map(RawParameter::into_parameter)
            .collect();

        if self.node_type.as_deref() == Some("parameter") {
            if self.template.is_some() || !self.modifiers.is_empty() {
                return Err(ArtifactError::InvalidNode {
                    unique_id,
                    message: "parameter node carries template or modifiers".to_string(),
                });
            }
            return Ok(ExpressionNode::Parameters(ParameterNode {
                unique_id,
                parameters,
            }));
        }

        let id = self.id.ok_or_else(|| ArtifactError::MissingField {
            field: "id",
            context: format!("element {unique_id}"),
        })?;
        Ok(ExpressionNode::Element(Element {
            id,
            unique_id,
            template: self.template,
            extends: self.extends,
            parameters,
            modifiers: self.modifiers,
        }))
    }

    /// Converts a node known to be a conjunction. Roots may omit their
    /// unique id, in which case `fallback_id` is used.
    fn into_conjunction(self, fallback_id: Option<&str>) -> ArtifactResult<Conjunction> {
        let unique_id = match (self.unique_id, fallback_id) {
            (Some(unique_id), _) => unique_id,
            (None, Some(fallback)) => fallback.to_string(),
            (None, None) => {
                return Err(ArtifactError::MissingField {
                    field: "uniqueId",
                    context: format!("conjunction {}", self.id.as_deref().unwrap_or("<unnamed>")),
                })
            }
        };
        let children = self
            .child_instances
            .unwrap_or_default()
            .into_iter()
            .map(RawNode::into_node)
            .collect::<ArtifactResult<Vec<_>>>()?;

        Ok(Conjunction {
            id: self.id.unwrap_or_else(|| "And".to_string()),
            unique_id,
            parameters: self
                .parameters
                .into_iter()
                .map(RawParameter::into_parameter)
                .collect(),
            subpopulation_name: self.subpopulation_name,
            special: self.special,
            special_subpopulation_name: self.special_subpopulation_name,
            children,
        })
    }
}

fn root_tree(raw: Option<RawNode>, conjunction: &str, fallback_id: &str) -> ArtifactResult<Conjunction> {
    match raw {
        Some(raw) => raw.into_conjunction(Some(fallback_id)),
        None => Ok(Conjunction::new(conjunction, fallback_id)),
    }
}

fn version_string(version: Option<Value>) -> String {
    match version {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => "1".to_string(),
    }
}

// =============================================================================
// Entry points
// =============================================================================

impl Artifact {
    /// Parses an artifact from the authoring tool's JSON document.
    pub fn from_json(json: &str) -> ArtifactResult<Artifact> {
        let raw: RawArtifact = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    /// Converts an already-parsed JSON document.
    pub fn from_value(value: Value) -> ArtifactResult<Artifact> {
        let raw: RawArtifact = serde_json::from_value(value)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawArtifact) -> ArtifactResult<Artifact> {
        let inclusions = root_tree(raw.exp_tree_include, "And", "inclusions")?;
        let exclusions = root_tree(raw.exp_tree_exclude, "Or", "exclusions")?;
        let subpopulations = raw
            .subpopulations
            .into_iter()
            .map(|subpopulation| subpopulation.into_conjunction(None))
            .collect::<ArtifactResult<Vec<_>>>()?;

        Ok(Artifact {
            name: raw.name.unwrap_or_default(),
            version: version_string(raw.version),
            data_model: raw.data_model,
            include_libraries: raw.include_libraries,
            context: raw
                .context
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "Patient".to_string()),
            inclusions,
            exclusions,
            subpopulations,
            boolean_parameters: raw.boolean_parameters,
            recommendations: raw.recommendations,
            error_statement: raw.error_statement.unwrap_or_default(),
        })
    }
}
