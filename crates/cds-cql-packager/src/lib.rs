//! # CDS CQL Packager
//!
//! Sends generated CQL libraries to a CQL-to-ELM translator and bundles the
//! results into a zip archive.
//!
//! ## Pipeline
//!
//! 1. [`CqlGenerator`](cds_cql_generator::CqlGenerator) renders the CQL text.
//! 2. [`ElmTranslator`] posts it, with every helper `*.cql` file, as one
//!    multipart request and splits the multipart answer into
//!    [`CompiledUnit`]s. A disabled translator returns no units.
//! 3. [`ArchiveAssembler`] streams the CQL, one `.json` file per unit and
//!    the helper directory into the sink.
//!
//! [`Packager`] runs the three stages. Any failure aborts the run; nothing
//! reaches the sink unless generation and translation both succeed.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cds_cql_generator::{CqlGenerator, GeneratorConfig, InMemoryCatalog};
//! use cds_cql_packager::{Packager, PackagerConfig, TranslatorConfig};
//!
//! let generator = CqlGenerator::from_config(
//!     GeneratorConfig::default(),
//!     Arc::new(InMemoryCatalog::from_path("data/value_sets.json")?),
//! )?;
//! let config = PackagerConfig::builder()
//!     .with_translator(TranslatorConfig::builder().with_url("http://localhost:8080/cql/translator").build())
//!     .with_helper_dir("data/helpers")
//!     .build();
//! let packager = Packager::new(generator, config)?;
//!
//! let mut archive = Vec::new();
//! let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(30);
//! let summary = packager.package(&artifact, &mut archive, deadline).await?;
//! ```

#![warn(missing_docs)]

pub mod archive;
pub mod config;
pub mod error;
pub mod multipart;
pub mod pipeline;
pub mod translator;

pub use archive::{ArchiveAssembler, MAX_COMPRESSION};
pub use config::{PackagerConfig, PackagerConfigBuilder, TranslatorConfig, TranslatorConfigBuilder};
pub use error::{PackagerError, PackagerResult};
pub use multipart::{demultiplex, validate_unit_names, CompiledUnit};
pub use pipeline::{PackageSummary, Packager};
pub use translator::ElmTranslator;
