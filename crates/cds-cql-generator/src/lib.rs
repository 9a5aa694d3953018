//! # cds-cql-generator
//!
//! Template-driven generation of CQL libraries from decision support
//! artifacts.
//!
//! Generation runs in two passes over a read-only [`TemplateStore`]:
//!
//! 1. **Compile**: [`TreeCompiler`] walks the expression trees, resolves
//!    value sets through a [`ValueSetResolver`] and produces a
//!    [`Compilation`] of render-ready contexts.
//! 2. **Render**: [`TemplateRenderer`] turns the compilation into a
//!    [`SourceDocument`] with a fixed section order.
//!
//! [`CqlGenerator`] runs both passes.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use cds_cql::Artifact;
//! use cds_cql_generator::{CqlGenerator, GeneratorConfig, InMemoryCatalog};
//!
//! let catalog = InMemoryCatalog::from_path("data/value_sets.json")?;
//! let config = GeneratorConfig::builder()
//!     .with_template_root("data/cql")
//!     .build();
//! let generator = CqlGenerator::from_config(config, Arc::new(catalog))?;
//!
//! let artifact = Artifact::from_json(&std::fs::read_to_string("artifact.json")?)?;
//! let cql = generator.generate(&artifact)?;
//! println!("{}", cql.text);
//! ```
//!
//! ## Document layout
//!
//! | Section | Contents |
//! |---------|----------|
//! | header | library, using, include, terminology and parameter declarations, union definitions |
//! | body | one definition per element and conjunction |
//! | population | `MeetsInclusionCriteria`, `MeetsExclusionCriteria`, `InPopulation` |
//! | recommendation | `Recommendation` |
//! | rationale | `Rationale` |
//! | errors | `Errors` |

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod catalog;
mod compiler;
mod config;
mod context;
mod error;
mod generator;
mod renderer;
mod templates;
mod traits;

pub use catalog::InMemoryCatalog;
pub use compiler::{TreeCompiler, GENERIC_STATEMENT};
pub use config::{GeneratorConfig, GeneratorConfigBuilder};
pub use context::{
    Compilation, Component, ConjunctionDescriptor, ElementContext, ResourceMaps, UnionContext,
    UNION_TEMPLATE,
};
pub use error::{GenerationError, GenerationResult};
pub use generator::{CqlGenerator, GeneratedCql};
pub use renderer::{SourceDocument, TemplateRenderer, VALUE_SEPARATOR};
pub use templates::{TemplateKind, TemplateStore, ARTIFACT_TEMPLATE};
pub use traits::ValueSetResolver;
