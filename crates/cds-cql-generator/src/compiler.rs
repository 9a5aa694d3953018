//! Tree compiler.
//!
//! Walks the inclusion, exclusion and subpopulation trees and produces the
//! contexts the renderer consumes. Conjunction descriptors are recorded
//! before their children (pre-order); leaf contexts in visit order.

use cds_cql::cql::quoted_identifier;
use cds_cql::{
    Artifact, ArtifactError, Conjunction, Element, ExpressionNode, Modifier, Parameter,
    ParameterKind, ValueSetCategory, ValueSetGroup, ValueSetResource, ValueSetSource,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::context::{Compilation, Component, ConjunctionDescriptor, ElementContext};
use crate::error::{GenerationError, GenerationResult};
use crate::templates::{TemplateKind, TemplateStore};
use crate::traits::ValueSetResolver;

/// Pass-through template used when an element's values are union references.
pub const GENERIC_STATEMENT: &str = "GenericStatement";

const ACTIVE_MEDICATION: &str = "ActiveMedication";
const BOOLEAN_NOT: &str = "BooleanNot";
const CHECK_EXISTENCE: &str = "CheckExistence";
const CHECK_INCLUSION_IN_VS: &str = "CheckInclusionInVS";
const VALUE_COMPARISON_OBSERVATION: &str = "ValueComparisonObservation";

/// Compiles an artifact's trees into render-ready contexts.
///
/// # Example
///
/// ```rust
/// use cds_cql::Artifact;
/// use cds_cql_generator::{InMemoryCatalog, TemplateKind, TemplateStore, TreeCompiler};
///
/// let templates = TemplateStore::from_sources(Vec::<(TemplateKind, &str, &str)>::new()).unwrap();
/// let catalog = InMemoryCatalog::new();
/// let compilation = TreeCompiler::new(&templates, &catalog)
///     .compile(&Artifact::new("Empty"))
///     .unwrap();
/// assert!(compilation.contexts.is_empty());
/// ```
pub struct TreeCompiler<'a> {
    templates: &'a TemplateStore,
    resolver: &'a dyn ValueSetResolver,
}

impl<'a> TreeCompiler<'a> {
    /// Creates a compiler over a template store and a value set catalog.
    pub fn new(templates: &'a TemplateStore, resolver: &'a dyn ValueSetResolver) -> Self {
        Self {
            templates,
            resolver,
        }
    }

    /// Compiles every non-empty tree of `artifact`.
    pub fn compile(&self, artifact: &Artifact) -> GenerationResult<Compilation> {
        let mut compilation = Compilation::new();

        if artifact.inclusions.has_children() {
            self.visit(artifact, &artifact.inclusions, &mut compilation)?;
        }
        if artifact.exclusions.has_children() {
            self.visit(artifact, &artifact.exclusions, &mut compilation)?;
        }
        for subpopulation in artifact
            .subpopulations
            .iter()
            .filter(|s| !s.special && s.has_children())
        {
            self.visit(artifact, subpopulation, &mut compilation)?;
        }

        debug!(
            contexts = compilation.contexts.len(),
            conjunctions = compilation.conjunctions.len(),
            unions = compilation.referenced_elements.len(),
            value_sets = compilation.resources.resources.len(),
            "Compiled expression trees"
        );
        Ok(compilation)
    }

    fn visit(
        &self,
        artifact: &Artifact,
        conjunction: &Conjunction,
        out: &mut Compilation,
    ) -> GenerationResult<()> {
        out.conjunctions.push(ConjunctionDescriptor {
            template: conjunction.id.clone(),
            element_name: conjunction.element_name().to_string(),
            components: conjunction
                .children
                .iter()
                .map(|child| Component {
                    name: child.reference_name().to_string(),
                })
                .collect(),
            assume_in_population: artifact
                .is_referenced_by_recommendation(conjunction.subpopulation_name.as_deref()),
        });

        for child in &conjunction.children {
            match child {
                ExpressionNode::Conjunction(nested) => self.visit(artifact, nested, out)?,
                ExpressionNode::Parameters(node) => out.parameters.push(
                    node.parameters
                        .iter()
                        .map(|p| (p.id.clone(), p.value.clone()))
                        .collect(),
                ),
                ExpressionNode::Element(element) => {
                    let context = self.compile_element(element, out)?;
                    out.contexts.push(context);
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Leaf elements
    // =========================================================================

    fn compile_element(
        &self,
        element: &Element,
        out: &mut Compilation,
    ) -> GenerationResult<ElementContext> {
        let mut context = ElementContext::new(element.template_name());
        let mut modifiers = element.modifiers.clone();

        if context.template == "AgeRange" {
            let check = modifiers.iter().find(|m| m.id == CHECK_EXISTENCE);
            context.set("checkExistence", check.is_some());
            if let Some(check) = check {
                let value = check
                    .values
                    .as_ref()
                    .and_then(|v| v.get("value"))
                    .cloned()
                    .unwrap_or(Value::Null);
                context.set("checkExistenceValue", value);
            }
        }

        for parameter in &element.parameters {
            match &parameter.kind {
                ParameterKind::ValueSet { category, source } => {
                    let group = self.value_set_group(*category, *source, parameter)?;
                    context.set(parameter.id.clone(), serde_json::to_value(&group)?);
                    modifiers =
                        self.apply_group(*category, *source, &group, &mut context, modifiers, out);
                }
                ParameterKind::Pregnancy => {
                    let fields = self.status_fields(parameter, &modifiers, out, &PREGNANCY_KEYS)?;
                    context.fields.extend(fields);
                }
                ParameterKind::Breastfeeding => {
                    let fields = self.status_fields(parameter, &modifiers, out, &BREASTFEEDING_KEYS)?;
                    context.fields.extend(fields);
                }
                ParameterKind::Number => {
                    context.set(parameter.id.clone(), parameter.value.clone());
                    if let Some(exclusive) = parameter.exclusive {
                        context.set(format!("{}_exclusive", parameter.id), exclusive);
                    }
                }
                ParameterKind::Other(_) => {
                    context.set(parameter.id.clone(), parameter.value.clone());
                }
            }
        }

        context.element_name = element.element_name().to_string();
        context.modifiers = modifiers;
        context.without_modifiers = self.templates.has(TemplateKind::Specific, &context.template);

        if !context.without_modifiers && !self.templates.has(TemplateKind::Element, &context.template) {
            warn!(element = %element.unique_id, template = %context.template, "Template could not be found");
            return Err(GenerationError::TemplateNotFound(context.template));
        }

        debug!(
            element = %element.unique_id,
            template = %context.template,
            values = context.values.len(),
            modifiers = context.modifiers.len(),
            "Compiled element"
        );
        Ok(context)
    }

    /// Resolves a value-set parameter to a group, from the catalog or from
    /// the author's literal selection.
    fn value_set_group(
        &self,
        category: ValueSetCategory,
        source: ValueSetSource,
        parameter: &Parameter,
    ) -> GenerationResult<ValueSetGroup> {
        match source {
            ValueSetSource::Catalog => {
                let id = parameter.value_str().ok_or_else(|| ArtifactError::InvalidParameter {
                    id: parameter.id.clone(),
                    message: format!("{category} parameter needs a value set id"),
                })?;
                self.resolver
                    .resolve(category, id)
                    .ok_or_else(|| GenerationError::UnknownValueSet {
                        category,
                        id: id.to_string(),
                    })
            }
            ValueSetSource::Vsac => vsac_group(category, parameter),
        }
    }

    /// Fills values and registers declarations for a resolved group.
    /// Returns the element's modifier list, rebuilt where the group changes it.
    fn apply_group(
        &self,
        category: ValueSetCategory,
        source: ValueSetSource,
        group: &ValueSetGroup,
        context: &mut ElementContext,
        modifiers: Vec<Modifier>,
        out: &mut Compilation,
    ) -> Vec<Modifier> {
        for resource in &group.value_sets {
            out.resources.register_value_set(resource);
        }
        if category != ValueSetCategory::Medication {
            for concept in &group.concepts {
                out.resources.register_concept(concept);
            }
        }

        let mut modifiers = modifiers;
        let has_concepts = !group.concepts.is_empty();
        let catalog_concepts = has_concepts && source == ValueSetSource::Catalog;
        if category == ValueSetCategory::Medication {
            let (values, rest) = medication_values(&group.value_sets, modifiers);
            context.values = values;
            modifiers = rest;
        } else if catalog_concepts && category == ValueSetCategory::Observation {
            // The element's own template looks the group up by name.
            context.values = vec![group.name.clone().unwrap_or_else(|| group.id.clone())];
        } else if catalog_concepts && category == ValueSetCategory::Condition {
            context.values = condition_retrieves(group);
            context.template = GENERIC_STATEMENT.to_string();
        } else if has_concepts {
            context.values = group.concepts.iter().map(|c| c.name.clone()).collect();
            context.template = category.concept_template().to_string();
        } else if group.value_sets.len() > 1 {
            let union = out.ensure_union(group, category);
            context.values = vec![format!("\"{union}\"")];
            context.template = GENERIC_STATEMENT.to_string();
        } else {
            context.values = group.value_sets.iter().map(|v| v.name.clone()).collect();
        }

        if let Some(check) = &group.check_inclusion_in_vs {
            out.resources.register_value_set(check);
            modifiers = modifiers
                .into_iter()
                .map(|m| {
                    if m.id == CHECK_INCLUSION_IN_VS {
                        m.with_values(Value::String(check.name.clone()))
                    } else {
                        m
                    }
                })
                .collect();
        }

        if let (ValueSetCategory::Observation, Some(units)) = (category, &group.units) {
            modifiers = modifiers
                .into_iter()
                .map(|m| {
                    if m.id == VALUE_COMPARISON_OBSERVATION {
                        let mut values = match m.values.clone() {
                            Some(Value::Object(map)) => map,
                            _ => Map::new(),
                        };
                        values.insert("unit".to_string(), Value::String(units.code.clone()));
                        m.with_values(Value::Object(values))
                    } else {
                        m
                    }
                })
                .collect();
        }

        modifiers
    }

    /// Resolves a pregnancy or breastfeeding parameter into the named
    /// fields its dedicated template reads.
    fn status_fields(
        &self,
        parameter: &Parameter,
        modifiers: &[Modifier],
        out: &mut Compilation,
        keys: &StatusKeys,
    ) -> GenerationResult<Map<String, Value>> {
        let group = self.value_set_group(
            ValueSetCategory::Condition,
            ValueSetSource::Catalog,
            parameter,
        )?;
        let (Some(value_set), [first, second, ..]) =
            (group.value_sets.first(), group.concepts.as_slice())
        else {
            return Err(GenerationError::IncompleteValueSet {
                id: group.id.clone(),
                message: format!("{} needs one value set and two concepts", keys.label),
            });
        };

        for resource in &group.value_sets {
            out.resources.register_value_set(resource);
        }
        for concept in &group.concepts {
            out.resources.register_concept(concept);
        }

        let mut fields = Map::new();
        fields.insert(
            keys.negated.to_string(),
            Value::Bool(modifiers.iter().any(|m| m.id == BOOLEAN_NOT)),
        );
        fields.insert("valueSetName".to_string(), Value::String(value_set.name.clone()));
        fields.insert(keys.first.to_string(), Value::String(first.name.clone()));
        fields.insert(keys.second.to_string(), Value::String(second.name.clone()));
        Ok(fields)
    }
}

/// Field names emitted for a status parameter.
struct StatusKeys {
    label: &'static str,
    negated: &'static str,
    first: &'static str,
    second: &'static str,
}

const PREGNANCY_KEYS: StatusKeys = StatusKeys {
    label: "pregnancy",
    negated: "pregnancyNegated",
    first: "pregnancyStatusConcept",
    second: "pregnancyCodeConcept",
};

const BREASTFEEDING_KEYS: StatusKeys = StatusKeys {
    label: "breastfeeding",
    negated: "breastfeedingNegated",
    first: "breastfeedingCodeConcept",
    second: "breastfeedingYesConcept",
};

/// Retrieve expressions for medication value sets.
///
/// A typed value set retrieves its own type; an untyped one retrieves both
/// statements and orders. When the first modifier is `ActiveMedication`
/// each retrieve is wrapped in the matching active filter and the modifier
/// is dropped from the returned list.
fn medication_values(
    value_sets: &[ValueSetResource],
    modifiers: Vec<Modifier>,
) -> (Vec<String>, Vec<Modifier>) {
    let active = modifiers.first().is_some_and(|m| m.id == ACTIVE_MEDICATION);

    let values = value_sets
        .iter()
        .flat_map(|vs| {
            let types: Vec<&str> = match vs.resource_type.as_deref() {
                Some(t) => vec![t],
                None => vec!["MedicationStatement", "MedicationOrder"],
            };
            types.into_iter().map(move |t| {
                let retrieve = format!("[{t}: \"{}\"]", vs.name);
                if active {
                    format!("C3F.Active{t}({retrieve})")
                } else {
                    retrieve
                }
            })
        })
        .collect();

    let modifiers = if active {
        modifiers.into_iter().skip(1).collect()
    } else {
        modifiers
    };
    (values, modifiers)
}

/// Retrieves for a catalog condition group with concepts: one retrieve per
/// value set, then one concept lookup per concept.
fn condition_retrieves(group: &ValueSetGroup) -> Vec<String> {
    let retrieves = group.value_sets.iter().map(|vs| {
        format!(
            "[{}: {}]",
            ValueSetCategory::Condition.resource_type(),
            quoted_identifier(&vs.name)
        )
    });
    let lookups = group
        .concepts
        .iter()
        .map(|c| format!("C3F.ConditionsByConcept({})", quoted_identifier(&c.name)));
    retrieves.chain(lookups).collect()
}

/// Builds a group from a `*_vsac` parameter value: an OID string, a list of
/// `{name, oid}` value sets, or `{valueSets, concepts}`.
fn vsac_group(category: ValueSetCategory, parameter: &Parameter) -> GenerationResult<ValueSetGroup> {
    let invalid = |message: String| {
        GenerationError::Artifact(ArtifactError::InvalidParameter {
            id: parameter.id.clone(),
            message,
        })
    };

    let mut group = match &parameter.value {
        Value::String(oid) if !oid.is_empty() => ValueSetGroup::new(
            "",
            vec![ValueSetResource::new(
                format!("{} {}", category.resource_type(), oid),
                oid.clone(),
            )],
        ),
        Value::Array(_) => {
            let value_sets: Vec<ValueSetResource> = serde_json::from_value(parameter.value.clone())
                .map_err(|e| invalid(e.to_string()))?;
            ValueSetGroup::new("", value_sets)
        }
        Value::Object(_) => serde_json::from_value(parameter.value.clone())
            .map_err(|e| invalid(e.to_string()))?,
        other => return Err(invalid(format!("unsupported value set selection: {other}"))),
    };

    if group.value_sets.is_empty() && group.concepts.is_empty() {
        return Err(GenerationError::IncompleteValueSet {
            id: parameter.id.clone(),
            message: "selection names no value sets or concepts".to_string(),
        });
    }

    if group.id.is_empty() {
        let oids: Vec<String> = group
            .value_sets
            .iter()
            .map(|vs| vs.oid.as_deref().unwrap_or(&vs.name).to_string())
            .chain(group.concepts.iter().map(|c| c.name.clone()))
            .collect();
        group.id = vsac_id(category, &oids);
    }
    Ok(group)
}

/// Deterministic group id for a literal selection.
fn vsac_id(category: ValueSetCategory, identifiers: &[String]) -> String {
    let mut id = format!("{}_vsac", category.tag());
    for identifier in identifiers {
        id.push('_');
        id.extend(
            identifier
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }),
        );
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use serde_json::json;
    use cds_cql::{Code, CodeSystem, Concept, Units};

    fn templates() -> TemplateStore {
        TemplateStore::from_sources([
            (TemplateKind::Element, "GenericObservation", "[Observation: \"{{element_context}}\"]"),
            (TemplateKind::Element, "GenericCondition", "[Condition: \"{{element_context}}\"]"),
            (TemplateKind::Element, "GenericMedication", "{{element_context}}"),
            (TemplateKind::Element, "GenericStatement", "{{element_context}}"),
            (TemplateKind::Element, "ObservationByConcept", "C3F.ObservationsByConcept(\"{{element_context}}\")"),
            (TemplateKind::Element, "ConditionsByConcept", "C3F.ConditionsByConcept(\"{{element_context}}\")"),
            (TemplateKind::Specific, "AgeRange", "AgeInYears() >= {{min_age}}"),
            (TemplateKind::Specific, "Pregnancydx", "{{valueSetName}}"),
        ])
        .unwrap()
    }

    fn concept(name: &str, code: &str) -> Concept {
        Concept {
            name: name.to_string(),
            codes: vec![Code {
                name: format!("{name} code"),
                code: code.to_string(),
                code_system: CodeSystem {
                    name: "SNOMED".to_string(),
                    id: "http://snomed.info/sct".to_string(),
                },
                display: None,
            }],
            display: None,
        }
    }

    fn catalog() -> InMemoryCatalog {
        let mut ldl = ValueSetGroup::new("ldl", vec![ValueSetResource::new("LDL", "1.1")]);
        ldl.units = Some(Units {
            code: "mg/dL".to_string(),
        });

        let mut smoking = ValueSetGroup::new("smoking", vec![ValueSetResource::new("Smoking", "1.9")]);
        smoking.name = Some("Current smoker".to_string());
        smoking.concepts = vec![concept("Current smoker", "77176002")];
        smoking.check_inclusion_in_vs = Some(ValueSetResource::new("Smoker codes", "1.10"));

        let mut pregnancy = ValueSetGroup::new("pregnancy", vec![ValueSetResource::new("Pregnancy", "1.5")]);
        pregnancy.concepts = vec![concept("Pregnancy status", "1"), concept("Pregnant code", "2")];

        InMemoryCatalog::new()
            .with_group(ValueSetCategory::Observation, ldl)
            .with_group(ValueSetCategory::Observation, smoking)
            .with_group(
                ValueSetCategory::Condition,
                ValueSetGroup::new(
                    "diabetes",
                    vec![
                        ValueSetResource::new("Diabetes", "1.2"),
                        ValueSetResource::new("Diabetes Type 2", "1.3"),
                    ],
                ),
            )
            .with_group(ValueSetCategory::Condition, pregnancy)
            .with_group(
                ValueSetCategory::Medication,
                ValueSetGroup::new(
                    "statins",
                    vec![ValueSetResource {
                        name: "Statins".to_string(),
                        oid: Some("1.4".to_string()),
                        resource_type: Some("MedicationOrder".to_string()),
                    }],
                ),
            )
    }

    fn compile_one(element: Element) -> GenerationResult<Compilation> {
        let mut artifact = Artifact::new("Test");
        artifact.inclusions = Conjunction::new("And", "root").with_child(element.into());
        let templates = templates();
        let catalog = catalog();
        TreeCompiler::new(&templates, &catalog).compile(&artifact)
    }

    #[test]
    fn test_single_value_set() {
        let compilation = compile_one(
            Element::new("GenericObservation", "e-1")
                .with_parameter(Parameter::new("element_name", "string", json!("LDL Test")))
                .with_parameter(Parameter::new("observation", "observation", json!("ldl"))),
        )
        .unwrap();

        let context = &compilation.contexts[0];
        assert_eq!(context.element_name, "LDL Test");
        assert_eq!(context.template, "GenericObservation");
        assert_eq!(context.values, ["LDL"]);
        assert!(!context.without_modifiers);
        assert_eq!(context.fields["observation"]["id"], json!("ldl"));
        assert!(compilation.resources.resources.contains_key("LDL"));
    }

    #[test]
    fn test_multiple_value_sets_create_one_union() {
        let diabetes = |id: &str| {
            Element::new("GenericCondition", id)
                .with_parameter(Parameter::new("condition", "condition", json!("diabetes")))
        };
        let mut artifact = Artifact::new("Test");
        artifact.inclusions = Conjunction::new("And", "root")
            .with_child(diabetes("e-1").into())
            .with_child(diabetes("e-2").into());
        let templates = templates();
        let catalog = catalog();

        let compilation = TreeCompiler::new(&templates, &catalog).compile(&artifact).unwrap();

        assert_eq!(compilation.referenced_elements.len(), 1);
        assert_eq!(compilation.referenced_elements[0].name, "diabetes_valuesets");
        for context in &compilation.contexts {
            assert_eq!(context.template, GENERIC_STATEMENT);
            assert_eq!(context.values, ["\"diabetes_valuesets\""]);
        }
    }

    #[test]
    fn test_unknown_value_set() {
        let err = compile_one(
            Element::new("GenericObservation", "e-1")
                .with_parameter(Parameter::new("observation", "observation", json!("hdl"))),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::UnknownValueSet { category: ValueSetCategory::Observation, ref id } if id == "hdl"
        ));
    }

    #[test]
    fn test_missing_template_is_hard_error() {
        let err = compile_one(Element::new("GenericProcedure", "e-1")).unwrap_err();
        assert!(matches!(err, GenerationError::TemplateNotFound(ref t) if t == "GenericProcedure"));
    }

    #[test]
    fn test_concepts_and_check_inclusion() {
        let compilation = compile_one(
            Element::new("ObservationByConcept", "e-1")
                .with_parameter(Parameter::new("observation", "observation", json!("smoking")))
                .with_modifier(Modifier::new(CHECK_INCLUSION_IN_VS, "CheckInclusionInVS")),
        )
        .unwrap();

        let context = &compilation.contexts[0];
        assert_eq!(context.template, "ObservationByConcept");
        assert_eq!(context.values, ["Current smoker"]);
        assert!(compilation.resources.resources.contains_key("Smoking"));
        assert_eq!(context.modifiers[0].values, Some(json!("Smoker codes")));
        assert!(compilation.resources.resources.contains_key("Smoker codes"));
        assert!(compilation.resources.concepts.contains_key("Current smoker"));
        assert_eq!(compilation.resources.code_systems["SNOMED"], "http://snomed.info/sct");
    }

    #[test]
    fn test_catalog_observation_concepts_keep_element_template() {
        let compilation = compile_one(
            Element::new("GenericObservation", "e-1")
                .with_parameter(Parameter::new("observation", "observation", json!("smoking"))),
        )
        .unwrap();

        let context = &compilation.contexts[0];
        assert_eq!(context.template, "GenericObservation");
        assert_eq!(context.values, ["Current smoker"]);
    }

    #[test]
    fn test_catalog_condition_with_value_set_and_concepts() {
        let compilation = compile_one(
            Element::new("GenericCondition", "e-1")
                .with_parameter(Parameter::new("condition", "condition", json!("pregnancy"))),
        )
        .unwrap();

        let context = &compilation.contexts[0];
        assert_eq!(context.template, GENERIC_STATEMENT);
        assert_eq!(
            context.values,
            [
                "[Condition: \"Pregnancy\"]",
                "C3F.ConditionsByConcept(\"Pregnancy status\")",
                "C3F.ConditionsByConcept(\"Pregnant code\")",
            ]
        );
        assert!(compilation.resources.resources.contains_key("Pregnancy"));
        assert!(compilation.resources.concepts.contains_key("Pregnant code"));
        assert!(compilation.referenced_elements.is_empty());
    }

    #[test]
    fn test_vsac_concepts_use_concept_template() {
        let selection = json!({
            "valueSets": [{ "name": "Asthma", "oid": "1.7" }],
            "concepts": [{
                "name": "Asthma code",
                "codes": [{
                    "name": "Asthma",
                    "code": "195967001",
                    "codeSystem": { "name": "SNOMED", "id": "http://snomed.info/sct" }
                }]
            }]
        });
        let compilation = compile_one(
            Element::new("GenericCondition", "e-1")
                .with_parameter(Parameter::new("condition", "condition_vsac", selection)),
        )
        .unwrap();

        let context = &compilation.contexts[0];
        assert_eq!(context.template, "ConditionsByConcept");
        assert_eq!(context.values, ["Asthma code"]);
        assert!(compilation.resources.resources.contains_key("Asthma"));
    }

    #[test]
    fn test_observation_units_reach_value_comparison() {
        let compilation = compile_one(
            Element::new("GenericObservation", "e-1")
                .with_parameter(Parameter::new("observation", "observation", json!("ldl")))
                .with_modifier(
                    Modifier::new(VALUE_COMPARISON_OBSERVATION, "ValueComparisonObservation")
                        .with_values(json!({ "minOperator": ">", "minValue": 130 })),
                ),
        )
        .unwrap();

        assert_eq!(
            compilation.contexts[0].modifiers[0].values,
            Some(json!({ "minOperator": ">", "minValue": 130, "unit": "mg/dL" }))
        );
    }

    #[test]
    fn test_active_medication_is_absorbed() {
        let element = Element::new("GenericMedication", "e-1")
            .with_parameter(Parameter::new("medication", "medication", json!("statins")))
            .with_modifier(Modifier::new(ACTIVE_MEDICATION, "ActiveMedication"))
            .with_modifier(Modifier::new("BooleanExists", "BooleanExists"));
        let compilation = compile_one(element.clone()).unwrap();

        let context = &compilation.contexts[0];
        assert_eq!(context.values, ["C3F.ActiveMedicationOrder([MedicationOrder: \"Statins\"])"]);
        assert_eq!(context.modifiers.len(), 1);
        assert_eq!(context.modifiers[0].id, "BooleanExists");
        assert_eq!(element.modifiers.len(), 2);
    }

    #[test]
    fn test_untyped_medication_selection_retrieves_both() {
        let compilation = compile_one(
            Element::new("GenericMedication", "e-1")
                .with_parameter(Parameter::new("medication", "medication_vsac", json!("2.16.1"))),
        )
        .unwrap();
        assert_eq!(
            compilation.contexts[0].values,
            [
                "[MedicationStatement: \"Medication 2.16.1\"]",
                "[MedicationOrder: \"Medication 2.16.1\"]"
            ]
        );
    }

    #[test]
    fn test_vsac_selection_union_is_deterministic() {
        let selection = json!([
            { "name": "Diabetes A", "oid": "1.2.3" },
            { "name": "Diabetes B", "oid": "4.5.6" }
        ]);
        let compilation = compile_one(
            Element::new("GenericCondition", "e-1")
                .with_parameter(Parameter::new("condition", "condition_vsac", selection)),
        )
        .unwrap();

        assert_eq!(
            compilation.referenced_elements[0].name,
            "condition_vsac_1_2_3_4_5_6_valuesets"
        );
    }

    #[test]
    fn test_vsac_selection_rejects_numbers() {
        let err = compile_one(
            Element::new("GenericCondition", "e-1")
                .with_parameter(Parameter::new("condition", "condition_vsac", json!(7))),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Artifact(ArtifactError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_number_and_specific_template() {
        let compilation = compile_one(
            Element::new("AgeRange", "e-1")
                .with_parameter(Parameter::new("min_age", "number", json!(40)).with_exclusive(true))
                .with_modifier(
                    Modifier::new(CHECK_EXISTENCE, "CheckExistence").with_values(json!({ "value": "is not null" })),
                ),
        )
        .unwrap();

        let context = &compilation.contexts[0];
        assert!(context.without_modifiers);
        assert_eq!(context.element_name, "e-1");
        assert_eq!(context.fields["min_age"], json!(40));
        assert_eq!(context.fields["min_age_exclusive"], json!(true));
        assert_eq!(context.fields["checkExistence"], json!(true));
        assert_eq!(context.fields["checkExistenceValue"], json!("is not null"));
    }

    #[test]
    fn test_pregnancy_fields() {
        let compilation = compile_one(
            Element::new("Pregnancydx", "e-1")
                .with_parameter(Parameter::new("pregnancy", "pregnancy", json!("pregnancy")))
                .with_modifier(Modifier::new(BOOLEAN_NOT, "BooleanNot")),
        )
        .unwrap();

        let fields = &compilation.contexts[0].fields;
        assert_eq!(fields["pregnancyNegated"], json!(true));
        assert_eq!(fields["valueSetName"], json!("Pregnancy"));
        assert_eq!(fields["pregnancyStatusConcept"], json!("Pregnancy status"));
        assert_eq!(fields["pregnancyCodeConcept"], json!("Pregnant code"));
    }

    #[test]
    fn test_pregnancy_needs_two_concepts() {
        let err = compile_one(
            Element::new("Pregnancydx", "e-1")
                .with_parameter(Parameter::new("pregnancy", "pregnancy", json!("diabetes"))),
        )
        .unwrap_err();
        assert!(matches!(err, GenerationError::IncompleteValueSet { ref id, .. } if id == "diabetes"));
    }

    #[test]
    fn test_conjunctions_are_pre_order_with_references() {
        let mut artifact = Artifact::new("Test");
        artifact.inclusions = Conjunction::new("And", "root").named("Included").with_child(
            Conjunction::new("Or", "nested")
                .with_child(Element::new("AgeRange", "age").into())
                .into(),
        );
        artifact.subpopulations = vec![
            Conjunction {
                special: true,
                subpopulation_name: Some("Meets Exclusion Criteria".to_string()),
                ..Conjunction::new("And", "special")
            }
            .with_child(Element::new("AgeRange", "ignored").into()),
            Conjunction {
                subpopulation_name: Some("Empty".to_string()),
                ..Conjunction::new("And", "empty")
            },
        ];
        let templates = templates();
        let catalog = catalog();

        let compilation = TreeCompiler::new(&templates, &catalog).compile(&artifact).unwrap();

        let names: Vec<_> = compilation.conjunctions.iter().map(|c| c.element_name.as_str()).collect();
        assert_eq!(names, ["Included", "nested"]);
        assert_eq!(compilation.conjunctions[0].components[0].name, "nested");
        assert_eq!(compilation.conjunctions[1].components[0].name, "age");
        assert_eq!(compilation.contexts.len(), 1);
    }

    #[test]
    fn test_parameter_nodes_are_folded() {
        let mut artifact = Artifact::new("Test");
        artifact.inclusions = Conjunction::new("And", "root").with_child(
            cds_cql::ParameterNode {
                unique_id: "p".to_string(),
                parameters: vec![Parameter::new("threshold", "number", json!(7.5))],
            }
            .into(),
        );
        let templates = templates();
        let catalog = catalog();

        let compilation = TreeCompiler::new(&templates, &catalog).compile(&artifact).unwrap();
        assert!(compilation.contexts.is_empty());
        assert_eq!(compilation.flat_parameters()["threshold"], json!(7.5));
    }
}
