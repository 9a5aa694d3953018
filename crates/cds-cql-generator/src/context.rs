//! Render-ready contexts produced by the tree compiler.
//!
//! A [`Compilation`] is owned by exactly one generation. Nothing in it is
//! shared, so concurrent generations cannot see each other's resources.

use cds_cql::{Code, Concept, Modifier, ValueSetCategory, ValueSetGroup, ValueSetResource};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

/// Template rendering the auxiliary union definitions.
pub const UNION_TEMPLATE: &str = "MultipleValuesetsExpression";

/// Context for one leaf element.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementContext {
    /// Target template name.
    pub template: String,
    /// Name of the `define` this element renders to.
    #[serde(rename = "element_name")]
    pub element_name: String,
    /// Value expressions, each rendered through the element template.
    pub values: Vec<String>,
    /// Modifiers applied to every value, in order.
    pub modifiers: Vec<Modifier>,
    /// Rendered directly from a specific template.
    pub without_modifiers: bool,
    /// Element-specific fields (parameter values, resolved groups, flags).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ElementContext {
    /// Creates an empty context for `template`.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            element_name: String::new(),
            values: Vec::new(),
            modifiers: Vec::new(),
            without_modifiers: false,
            fields: Map::new(),
        }
    }

    /// Sets an element-specific field.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }
}

/// A child reference inside a conjunction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    /// Name of the referenced definition.
    pub name: String,
}

/// Context for one conjunction node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConjunctionDescriptor {
    /// Conjunction template (`And`, `Or`).
    pub template: String,
    /// Name of the `define` this conjunction renders to.
    pub element_name: String,
    /// Child references in order.
    pub components: Vec<Component>,
    /// Some recommendation references this subpopulation.
    #[serde(rename = "assumeInPopulation")]
    pub assume_in_population: bool,
}

/// An auxiliary definition unioning the retrieves of several value sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnionContext {
    /// Always [`UNION_TEMPLATE`].
    pub template: String,
    /// Definition name, `<group id>_valuesets`.
    pub name: String,
    /// Value sets unioned.
    pub valuesets: Vec<ValueSetResource>,
    /// Resource type retrieved.
    #[serde(rename = "type")]
    pub resource_type: String,
}

/// Header declarations accumulated while compiling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceMaps {
    /// Value set name to definition.
    pub resources: IndexMap<String, ValueSetResource>,
    /// Code system name to identifier.
    pub code_systems: IndexMap<String, String>,
    /// Code name to code.
    pub codes: IndexMap<String, Code>,
    /// Concept name to concept.
    pub concepts: IndexMap<String, Concept>,
}

impl ResourceMaps {
    /// Records a value set for declaration.
    pub fn register_value_set(&mut self, resource: &ValueSetResource) {
        self.resources.insert(resource.name.clone(), resource.clone());
    }

    /// Records a concept together with its codes and their code systems.
    pub fn register_concept(&mut self, concept: &Concept) {
        for code in &concept.codes {
            self.code_systems
                .insert(code.code_system.name.clone(), code.code_system.id.clone());
            self.codes.insert(code.name.clone(), code.clone());
        }
        self.concepts.insert(concept.name.clone(), concept.clone());
    }
}

/// Everything one compilation produces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compilation {
    /// Leaf element contexts in visit order.
    pub contexts: Vec<ElementContext>,
    /// Conjunction descriptors in visit order (parents before children).
    pub conjunctions: Vec<ConjunctionDescriptor>,
    /// Auxiliary union definitions, unique by name.
    pub referenced_elements: Vec<UnionContext>,
    /// Flat parameter contexts, one per parameter node.
    pub parameters: Vec<IndexMap<String, Value>>,
    /// Header declarations.
    pub resources: ResourceMaps,
}

impl Compilation {
    /// Creates an empty compilation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the union definition name for `group`, creating the
    /// definition on first use.
    pub fn ensure_union(&mut self, group: &ValueSetGroup, category: ValueSetCategory) -> String {
        let name = group.union_name();
        if !self.referenced_elements.iter().any(|u| u.name == name) {
            self.referenced_elements.push(UnionContext {
                template: UNION_TEMPLATE.to_string(),
                name: name.clone(),
                valuesets: group.value_sets.clone(),
                resource_type: category.resource_type().to_string(),
            });
        }
        name
    }

    /// Parameters from every parameter node, later ids overriding earlier ones.
    pub fn flat_parameters(&self) -> IndexMap<String, Value> {
        self.parameters
            .iter()
            .flat_map(|p| p.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cds_cql::CodeSystem;
    use serde_json::json;

    #[test]
    fn test_ensure_union_is_idempotent() {
        let group = ValueSetGroup::new(
            "diabetes",
            vec![
                ValueSetResource::new("Diabetes", "2.16.840.1.113883.3.464.1003.103.12.1001"),
                ValueSetResource::new("Diabetes Type 2", "1.2.3"),
            ],
        );
        let mut compilation = Compilation::new();

        let first = compilation.ensure_union(&group, ValueSetCategory::Condition);
        let second = compilation.ensure_union(&group, ValueSetCategory::Condition);

        assert_eq!(first, "diabetes_valuesets");
        assert_eq!(first, second);
        assert_eq!(compilation.referenced_elements.len(), 1);
        assert_eq!(compilation.referenced_elements[0].resource_type, "Condition");
    }

    #[test]
    fn test_register_concept_collects_codes() {
        let concept = Concept {
            name: "Pregnancy status".to_string(),
            codes: vec![Code {
                name: "Pregnant".to_string(),
                code: "77386006".to_string(),
                code_system: CodeSystem {
                    name: "SNOMED".to_string(),
                    id: "http://snomed.info/sct".to_string(),
                },
                display: None,
            }],
            display: None,
        };
        let mut maps = ResourceMaps::default();
        maps.register_concept(&concept);
        maps.register_concept(&concept);

        assert_eq!(maps.concepts.len(), 1);
        assert_eq!(maps.codes["Pregnant"].code, "77386006");
        assert_eq!(maps.code_systems["SNOMED"], "http://snomed.info/sct");
    }

    #[test]
    fn test_element_context_serializes_flat() {
        let mut context = ElementContext::new("AgeRange");
        context.element_name = "Adults".to_string();
        context.set("min_age", 18);

        let value = serde_json::to_value(&context).unwrap();
        assert_eq!(value["element_name"], json!("Adults"));
        assert_eq!(value["withoutModifiers"], json!(false));
        assert_eq!(value["min_age"], json!(18));
    }

    #[test]
    fn test_flat_parameters_later_wins() {
        let mut compilation = Compilation::new();
        compilation
            .parameters
            .push(IndexMap::from([("limit".to_string(), json!(1))]));
        compilation
            .parameters
            .push(IndexMap::from([("limit".to_string(), json!(2))]));
        assert_eq!(compilation.flat_parameters()["limit"], json!(2));
    }
}
