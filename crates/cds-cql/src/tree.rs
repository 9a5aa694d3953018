//! Expression tree types.
//!
//! The authoring UI stores every node in one loose JSON shape. Ingestion
//! classifies each node exactly once into an [`ExpressionNode`]; nothing
//! downstream inspects field presence again.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::valueset::ValueSetCategory;

// =============================================================================
// Parameters
// =============================================================================

/// Where a value-set parameter gets its value sets from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueSetSource {
    /// Resolved by id from the value set catalog.
    Catalog,
    /// Supplied literally by the author (`*_vsac` parameter types).
    Vsac,
}

/// Closed set of parameter kinds the compiler knows how to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterKind {
    /// A clinical element backed by value sets.
    ValueSet {
        /// Catalog category.
        category: ValueSetCategory,
        /// Catalog lookup or literal selection.
        source: ValueSetSource,
    },
    /// Numeric bound, optionally exclusive.
    Number,
    /// Pregnancy status (dedicated template).
    Pregnancy,
    /// Breastfeeding status (dedicated template).
    Breastfeeding,
    /// Anything else; the value is copied verbatim.
    Other(String),
}

impl ParameterKind {
    /// Classifies a parameter type tag as stored by the authoring UI.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "number" => ParameterKind::Number,
            "pregnancy" => ParameterKind::Pregnancy,
            "breastfeeding" => ParameterKind::Breastfeeding,
            _ => {
                let (base, source) = match tag.strip_suffix("_vsac") {
                    Some(base) => (base, ValueSetSource::Vsac),
                    None => (tag, ValueSetSource::Catalog),
                };
                match ValueSetCategory::from_tag(base) {
                    Some(category) => ParameterKind::ValueSet { category, source },
                    None => ParameterKind::Other(tag.to_string()),
                }
            }
        }
    }

    /// Type tag this kind was read from.
    pub fn tag(&self) -> String {
        match self {
            ParameterKind::ValueSet { category, source } => match source {
                ValueSetSource::Catalog => category.tag().to_string(),
                ValueSetSource::Vsac => format!("{}_vsac", category.tag()),
            },
            ParameterKind::Number => "number".to_string(),
            ParameterKind::Pregnancy => "pregnancy".to_string(),
            ParameterKind::Breastfeeding => "breastfeeding".to_string(),
            ParameterKind::Other(tag) => tag.clone(),
        }
    }
}

/// A typed parameter on a leaf element or parameter node.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter id; also the context field it is stored under.
    pub id: String,
    /// Resolution rule.
    pub kind: ParameterKind,
    /// Raw value as authored.
    pub value: Value,
    /// Exclusive-bound flag for numeric parameters.
    pub exclusive: Option<bool>,
}

impl Parameter {
    /// Creates a parameter from its type tag.
    pub fn new(id: impl Into<String>, tag: &str, value: Value) -> Self {
        Self {
            id: id.into(),
            kind: ParameterKind::from_tag(tag),
            value,
            exclusive: None,
        }
    }

    /// Sets the exclusive-bound flag.
    pub fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = Some(exclusive);
        self
    }

    /// The value as a non-empty string, if it is one.
    pub fn value_str(&self) -> Option<&str> {
        self.value.as_str().filter(|s| !s.is_empty())
    }
}

/// The first parameter's value, when it is a non-empty string.
fn first_parameter_name(parameters: &[Parameter]) -> Option<&str> {
    parameters.first().and_then(Parameter::value_str)
}

// =============================================================================
// Modifiers
// =============================================================================

/// A post-processing step applied to every rendered value of an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Modifier {
    /// Modifier id (`BooleanNot`, `ActiveMedication`, `LookBack`, ...).
    pub id: String,
    /// Name of the modifier template to expand.
    #[serde(default)]
    pub cql_template: String,
    /// Library function passed to the template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cql_library_function: Option<String>,
    /// Modifier-specific payload (look-back window, comparison bounds, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Value>,
}

impl Modifier {
    /// Creates a modifier without a payload.
    pub fn new(id: impl Into<String>, cql_template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cql_template: cql_template.into(),
            cql_library_function: None,
            values: None,
        }
    }

    /// Sets the library function.
    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.cql_library_function = Some(function.into());
        self
    }

    /// Sets the payload.
    pub fn with_values(mut self, values: Value) -> Self {
        self.values = Some(values);
        self
    }
}

// =============================================================================
// Nodes
// =============================================================================

/// A node of an inclusion, exclusion or subpopulation tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionNode {
    /// Nested logic with ordered children.
    Conjunction(Conjunction),
    /// Bound variables rather than renderable logic.
    Parameters(ParameterNode),
    /// A renderable clinical element.
    Element(Element),
}

impl ExpressionNode {
    /// Unique id assigned by the authoring UI.
    pub fn unique_id(&self) -> &str {
        match self {
            ExpressionNode::Conjunction(c) => &c.unique_id,
            ExpressionNode::Parameters(p) => &p.unique_id,
            ExpressionNode::Element(e) => &e.unique_id,
        }
    }

    /// Name a parent conjunction uses to reference this node.
    pub fn reference_name(&self) -> &str {
        let parameters = match self {
            ExpressionNode::Conjunction(c) => &c.parameters,
            ExpressionNode::Parameters(p) => &p.parameters,
            ExpressionNode::Element(e) => &e.parameters,
        };
        first_parameter_name(parameters).unwrap_or_else(|| self.unique_id())
    }
}

/// A conjunction (`And`, `Or`) and, at the root, a whole tree or subpopulation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Conjunction {
    /// Conjunction template id (`And`, `Or`).
    pub id: String,
    /// Unique id assigned by the authoring UI.
    pub unique_id: String,
    /// Parameters; the first one carries the user-given name.
    pub parameters: Vec<Parameter>,
    /// Subpopulation name when this is a subpopulation root.
    pub subpopulation_name: Option<String>,
    /// System-reserved subpopulation (e.g. "Meets Exclusion Criteria").
    pub special: bool,
    /// CQL expression standing in for a special subpopulation.
    pub special_subpopulation_name: Option<String>,
    /// Ordered children.
    pub children: Vec<ExpressionNode>,
}

impl Conjunction {
    /// Creates an empty conjunction.
    pub fn new(id: impl Into<String>, unique_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            unique_id: unique_id.into(),
            ..Self::default()
        }
    }

    /// Sets the user-given name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.parameters = vec![Parameter::new(
            "element_name",
            "string",
            Value::String(name.into()),
        )];
        self
    }

    /// Appends a child node.
    pub fn with_child(mut self, child: ExpressionNode) -> Self {
        self.children.push(child);
        self
    }

    /// Name of the definition this conjunction renders to:
    /// first parameter value, else subpopulation name, else unique id.
    pub fn element_name(&self) -> &str {
        first_parameter_name(&self.parameters)
            .or(self.subpopulation_name.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(&self.unique_id)
    }

    /// Whether the conjunction has any children.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// A parameter-holder node.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterNode {
    /// Unique id assigned by the authoring UI.
    pub unique_id: String,
    /// Bound parameters.
    pub parameters: Vec<Parameter>,
}

/// A leaf element.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Element id (`GenericObservation`, `AgeRange`, ...).
    pub id: String,
    /// Unique id assigned by the authoring UI.
    pub unique_id: String,
    /// Explicit template override.
    pub template: Option<String>,
    /// Element this one extends.
    pub extends: Option<String>,
    /// Ordered typed parameters.
    pub parameters: Vec<Parameter>,
    /// Ordered applied modifiers.
    pub modifiers: Vec<Modifier>,
}

impl Element {
    /// Creates an element with no parameters or modifiers.
    pub fn new(id: impl Into<String>, unique_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            unique_id: unique_id.into(),
            template: None,
            extends: None,
            parameters: Vec::new(),
            modifiers: Vec::new(),
        }
    }

    /// Sets the template override.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Sets the extended element.
    pub fn with_extends(mut self, extends: impl Into<String>) -> Self {
        self.extends = Some(extends.into());
        self
    }

    /// Appends a parameter.
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Appends a modifier.
    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    /// Name of the definition this element renders to: first parameter
    /// value, else the unique id.
    pub fn element_name(&self) -> &str {
        first_parameter_name(&self.parameters).unwrap_or(&self.unique_id)
    }

    /// Template name: explicit template, else the extended element, else the id.
    pub fn template_name(&self) -> &str {
        self.template
            .as_deref()
            .or(self.extends.as_deref())
            .unwrap_or(&self.id)
    }
}

impl From<Conjunction> for ExpressionNode {
    fn from(node: Conjunction) -> Self {
        ExpressionNode::Conjunction(node)
    }
}

impl From<ParameterNode> for ExpressionNode {
    fn from(node: ParameterNode) -> Self {
        ExpressionNode::Parameters(node)
    }
}

impl From<Element> for ExpressionNode {
    fn from(node: Element) -> Self {
        ExpressionNode::Element(node)
    }
}
