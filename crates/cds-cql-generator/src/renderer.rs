//! Template renderer.
//!
//! Turns a [`Compilation`] into the six sections of a CQL library. The
//! section order is fixed: header, body, population, recommendation,
//! rationale, errors.

use std::fmt;

use cds_cql::cql::escape_single_quotes;
use cds_cql::{
    Artifact, BooleanParameter, Code, CodeSystem, Concept, Conjunction, DataModel, ErrorBranch,
    ErrorStatement, IncludedLibrary, Recommendation, ValueSetResource,
};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::GeneratorConfig;
use crate::context::{Compilation, ConjunctionDescriptor, ElementContext};
use crate::error::{GenerationError, GenerationResult};
use crate::templates::{TemplateKind, TemplateStore, ARTIFACT_TEMPLATE};

/// Separator placed between the texts of one element's values.
pub const VALUE_SEPARATOR: &str = "\n  or ";

const BASE_TEMPLATE: &str = "BaseTemplate";
const INCLUDE_EXCLUDE: &str = "IncludeExclude";
const ERROR_STATEMENTS: &str = "ErrorStatements";
const IN_POPULATION: &str = "\"InPopulation\"";

// =============================================================================
// Source document
// =============================================================================

/// A rendered CQL library, one field per section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Library, using, include and declaration statements.
    pub header: String,
    /// Element and conjunction definitions; empty when every tree is empty.
    pub body: String,
    /// Inclusion, exclusion and population definitions.
    pub population: String,
    /// The `Recommendation` definition.
    pub recommendation: String,
    /// The `Rationale` definition.
    pub rationale: String,
    /// The `Errors` definition.
    pub errors: String,
}

impl SourceDocument {
    /// Sections in document order, skipping an empty body.
    pub fn sections(&self) -> Vec<&str> {
        [
            self.header.as_str(),
            self.body.as_str(),
            self.population.as_str(),
            self.recommendation.as_str(),
            self.rationale.as_str(),
            self.errors.as_str(),
        ]
        .into_iter()
        .map(str::trim_end)
        .filter(|section| !section.is_empty())
        .collect()
    }
}

impl fmt::Display for SourceDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.sections().join("\n\n"))
    }
}

// =============================================================================
// Template contexts
// =============================================================================

#[derive(Serialize)]
struct ValueContext<'a> {
    element_context: &'a str,
}

#[derive(Serialize)]
struct ModifierContext<'a> {
    #[serde(rename = "cqlLibraryFunction")]
    cql_library_function: Option<&'a str>,
    value_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    values: Option<&'a Value>,
}

#[derive(Serialize)]
struct DefinitionContext<'a> {
    element_name: &'a str,
    #[serde(rename = "cqlString")]
    cql_string: &'a str,
    parameters: &'a IndexMap<String, Value>,
}

#[derive(Serialize)]
struct PopulationContext<'a> {
    inclusions: &'a str,
    exclusions: &'a str,
    parameters: &'a IndexMap<String, Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HeaderContext<'a> {
    name: String,
    version: &'a str,
    data_model: &'a DataModel,
    include_libraries: &'a [IncludedLibrary],
    code_systems: Vec<CodeSystem>,
    value_sets: Vec<&'a ValueSetResource>,
    codes: Vec<&'a Code>,
    concepts: Vec<&'a Concept>,
    boolean_parameters: &'a [BooleanParameter],
    context: &'a str,
    referenced_elements: Vec<String>,
}

// =============================================================================
// Renderer
// =============================================================================

/// Renders compilations against a [`TemplateStore`].
pub struct TemplateRenderer<'a> {
    templates: &'a TemplateStore,
    config: GeneratorConfig,
}

impl<'a> TemplateRenderer<'a> {
    /// Creates a renderer using the default generator settings.
    pub fn new(templates: &'a TemplateStore) -> Self {
        Self {
            templates,
            config: GeneratorConfig::default(),
        }
    }

    /// Uses `config` for include libraries and data model defaults.
    pub fn with_config(mut self, config: &GeneratorConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Renders every section. Lookup failures in the body are collected
    /// across all definitions and reported together.
    pub fn render(
        &self,
        artifact: &Artifact,
        compilation: &Compilation,
    ) -> GenerationResult<SourceDocument> {
        let parameters = compilation.flat_parameters();

        let document = SourceDocument {
            header: self.header(artifact, compilation)?,
            body: self.body(compilation)?,
            population: self.population(artifact, &parameters)?,
            recommendation: self.recommendation(artifact, &parameters)?,
            rationale: self.rationale(artifact, &parameters)?,
            errors: self.errors(&artifact.error_statement, &parameters)?,
        };
        debug!(
            definitions = compilation.contexts.len() + compilation.conjunctions.len(),
            "Rendered source document"
        );
        Ok(document)
    }

    fn header(&self, artifact: &Artifact, compilation: &Compilation) -> GenerationResult<String> {
        let resources = &compilation.resources;
        let referenced_elements = compilation
            .referenced_elements
            .iter()
            .map(|union| self.templates.render(TemplateKind::Specific, &union.template, union))
            .collect::<GenerationResult<Vec<_>>>()?;

        let context = HeaderContext {
            name: artifact.library_name(),
            version: &artifact.version,
            data_model: artifact.data_model.as_ref().unwrap_or(&self.config.data_model),
            include_libraries: artifact
                .include_libraries
                .as_deref()
                .unwrap_or(self.config.include_libraries.as_slice()),
            code_systems: resources
                .code_systems
                .iter()
                .map(|(name, id)| CodeSystem {
                    name: name.clone(),
                    id: id.clone(),
                })
                .collect(),
            value_sets: resources.resources.values().collect(),
            codes: resources.codes.values().collect(),
            concepts: resources.concepts.values().collect(),
            boolean_parameters: &artifact.boolean_parameters,
            context: &artifact.context,
            referenced_elements,
        };
        self.templates
            .render(TemplateKind::Artifact, ARTIFACT_TEMPLATE, &context)
    }

    fn body(&self, compilation: &Compilation) -> GenerationResult<String> {
        let mut definitions = Vec::new();
        let mut failures = Vec::new();

        let rendered = compilation
            .contexts
            .iter()
            .map(|context| self.element(context))
            .chain(
                compilation
                    .conjunctions
                    .iter()
                    .map(|conjunction| self.conjunction(conjunction)),
            );
        for result in rendered {
            match result {
                Ok(text) => definitions.push(text.trim_end().to_string()),
                Err(err) if err.is_lookup_error() => {
                    warn!(error = %err, "Template lookup failed");
                    failures.push(err);
                }
                Err(err) => return Err(err),
            }
        }

        if !failures.is_empty() {
            return Err(GenerationError::LookupFailures(failures));
        }
        Ok(definitions.join("\n\n"))
    }

    fn conjunction(&self, conjunction: &ConjunctionDescriptor) -> GenerationResult<String> {
        self.templates
            .render(TemplateKind::Specific, &conjunction.template, conjunction)
    }

    /// Renders one element: directly for specific templates, otherwise each
    /// value through the element template and then every modifier in order.
    fn element(&self, context: &ElementContext) -> GenerationResult<String> {
        if context.without_modifiers {
            return self
                .templates
                .render(TemplateKind::Specific, &context.template, context);
        }

        let mut texts = Vec::with_capacity(context.values.len());
        for value in &context.values {
            let base = self.templates.render(
                TemplateKind::Element,
                &context.template,
                &ValueContext {
                    element_context: value,
                },
            )?;
            texts.push(self.apply_modifiers(base, context)?);
        }

        let cql_string = texts.join(VALUE_SEPARATOR);
        self.definition(&context.element_name, &cql_string, &IndexMap::new())
    }

    fn apply_modifiers(&self, text: String, context: &ElementContext) -> GenerationResult<String> {
        context.modifiers.iter().try_fold(text, |current, modifier| {
            if !self.templates.has(TemplateKind::Modifier, &modifier.cql_template) {
                return Err(GenerationError::ModifierTemplateNotFound {
                    modifier: modifier.id.clone(),
                    template: modifier.cql_template.clone(),
                });
            }
            self.templates.render(
                TemplateKind::Modifier,
                &modifier.cql_template,
                &ModifierContext {
                    cql_library_function: modifier.cql_library_function.as_deref(),
                    value_name: &current,
                    values: modifier.values.as_ref(),
                },
            )
        })
    }

    fn definition(
        &self,
        element_name: &str,
        cql_string: &str,
        parameters: &IndexMap<String, Value>,
    ) -> GenerationResult<String> {
        self.templates.render(
            TemplateKind::Element,
            BASE_TEMPLATE,
            &DefinitionContext {
                element_name,
                cql_string,
                parameters,
            },
        )
    }

    fn population(
        &self,
        artifact: &Artifact,
        parameters: &IndexMap<String, Value>,
    ) -> GenerationResult<String> {
        self.templates.render(
            TemplateKind::Element,
            INCLUDE_EXCLUDE,
            &PopulationContext {
                inclusions: tree_reference(&artifact.inclusions),
                exclusions: tree_reference(&artifact.exclusions),
                parameters,
            },
        )
    }

    fn recommendation(
        &self,
        artifact: &Artifact,
        parameters: &IndexMap<String, Value>,
    ) -> GenerationResult<String> {
        let branches = artifact
            .recommendations
            .iter()
            .map(|r| format!("{}'{}'", guard(r), escape_single_quotes(&r.text)))
            .collect::<Vec<_>>();
        self.definition("Recommendation", &ladder(&branches), parameters)
    }

    fn rationale(
        &self,
        artifact: &Artifact,
        parameters: &IndexMap<String, Value>,
    ) -> GenerationResult<String> {
        let branches = artifact
            .recommendations
            .iter()
            .map(|r| {
                let text = match r.rationale.as_deref() {
                    Some(rationale) if !rationale.is_empty() => {
                        format!("'{}'", escape_single_quotes(rationale))
                    }
                    _ => "null".to_string(),
                };
                format!("{}{}", guard(r), text)
            })
            .collect::<Vec<_>>();
        self.definition("Rationale", &ladder(&branches), parameters)
    }

    fn errors(
        &self,
        statement: &ErrorStatement,
        parameters: &IndexMap<String, Value>,
    ) -> GenerationResult<String> {
        let cql_string = error_ladder(statement, "  ");
        self.templates.render(
            TemplateKind::Element,
            ERROR_STATEMENTS,
            &DefinitionContext {
                element_name: "Errors",
                cql_string: &cql_string,
                parameters,
            },
        )
    }
}

/// Definition name of a root tree, empty when the tree has no children.
fn tree_reference(tree: &Conjunction) -> &str {
    if tree.has_children() {
        tree.element_name()
    } else {
        ""
    }
}

/// `if <guards> then ` for one recommendation.
fn guard(recommendation: &Recommendation) -> String {
    let guards = if recommendation.subpopulations.is_empty() {
        IN_POPULATION.to_string()
    } else {
        recommendation
            .subpopulations
            .iter()
            .map(|subpop| subpop.guard())
            .collect::<Vec<_>>()
            .join(" and ")
    };
    format!("if {guards} then ")
}

/// Chains branches into an if/else ladder ending in `null`.
fn ladder(branches: &[String]) -> String {
    if branches.is_empty() {
        "null".to_string()
    } else {
        format!("{}\n  else null", branches.join("\n  else "))
    }
}

fn quoted_or_null(text: Option<&str>) -> String {
    match text {
        Some(text) if !text.is_empty() && text != "null" => {
            format!("'{}'", escape_single_quotes(text))
        }
        _ => "null".to_string(),
    }
}

fn has_condition(branch: &&ErrorBranch) -> bool {
    branch
        .condition
        .value
        .as_deref()
        .is_some_and(|value| !value.is_empty())
}

/// Trailing line comment carrying a branch label, flattened to one line.
fn label_comment(label: Option<&str>) -> String {
    let label = label
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if label.is_empty() {
        String::new()
    } else {
        format!(" // {label}")
    }
}

/// Renders an error statement as nested if/else text. Branches without a
/// chosen condition are skipped.
fn error_ladder(statement: &ErrorStatement, indent: &str) -> String {
    let branches: Vec<String> = statement
        .statements
        .iter()
        .filter(has_condition)
        .map(|branch| {
            let condition = branch.condition.value.as_deref().unwrap_or_default();
            let note = label_comment(branch.condition.label.as_deref());
            match (&branch.child, branch.use_then_clause) {
                (Some(child), false) => {
                    let nested = format!("{indent}  ");
                    format!("if {condition} then{note}\n{nested}{}", error_ladder(child, &nested))
                }
                _ => format!(
                    "if {condition} then {}{note}",
                    quoted_or_null(branch.then_clause.as_deref())
                ),
            }
        })
        .collect();

    let otherwise = quoted_or_null(statement.else_clause.as_deref());
    if branches.is_empty() {
        return otherwise;
    }
    let separator = format!("\n{indent}else ");
    format!("{}{separator}{otherwise}", branches.join(&separator))
}
