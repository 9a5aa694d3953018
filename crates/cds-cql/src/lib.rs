//! # cds-cql
//!
//! Data model for clinical decision support artifacts authored as expression
//! trees, and the helpers needed to turn them into CQL text.
//!
//! This crate provides:
//! - **Artifact model**: inclusions, exclusions, subpopulations,
//!   recommendations and error statements
//! - **Expression tree**: a tagged [`ExpressionNode`] decided once at ingestion
//! - **Value set types**: what a catalog returns for one clinical element
//! - **CQL helpers**: quote escaping and library-name slugs
//!
//! ## Usage
//!
//! ```rust
//! use cds_cql::{Artifact, ExpressionNode};
//!
//! let artifact = Artifact::from_json(r#"{
//!     "name": "Statin Use",
//!     "expTreeInclude": {
//!         "id": "And",
//!         "uniqueId": "root",
//!         "childInstances": [
//!             { "id": "AgeRange", "uniqueId": "age-1",
//!               "parameters": [{ "id": "min_age", "type": "number", "value": 40 }] }
//!         ]
//!     }
//! }"#).unwrap();
//!
//! assert_eq!(artifact.library_name(), "Statin-Use");
//! assert!(matches!(artifact.inclusions.children[0], ExpressionNode::Element(_)));
//! ```
//!
//! ## Node shapes
//!
//! | JSON shape | Node |
//! |------------|------|
//! | has `childInstances` | [`Conjunction`] |
//! | `"type": "parameter"` | [`ParameterNode`] |
//! | anything else | [`Element`] |

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod artifact;
pub mod cql;
mod error;
mod ingest;
mod tree;
mod valueset;

pub use artifact::{
    Artifact, BooleanParameter, DataModel, ErrorBranch, ErrorCondition, ErrorStatement,
    IncludedLibrary, Recommendation, SubpopulationRef,
};
pub use error::{ArtifactError, ArtifactResult};
pub use tree::{
    Conjunction, Element, ExpressionNode, Modifier, Parameter, ParameterKind, ParameterNode,
    ValueSetSource,
};
pub use valueset::{
    Code, CodeSystem, Concept, Units, ValueSetCategory, ValueSetGroup, ValueSetResource,
};
