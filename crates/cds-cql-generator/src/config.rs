//! Configuration types for the CQL generator.

use std::path::PathBuf;

use cds_cql::{DataModel, IncludedLibrary};
use serde::Deserialize;

/// Configuration for the CQL generator.
///
/// Artifact fields win over these defaults when present.
///
/// # Example
///
/// ```rust
/// use cds_cql_generator::GeneratorConfig;
///
/// let config = GeneratorConfig::builder()
///     .with_template_root("data/cql")
///     .build();
/// assert_eq!(config.include_libraries.len(), 3);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Directory holding `templates/`, `specificTemplates/`, `modifiers/` and `artifact.hbs`.
    pub template_root: PathBuf,
    /// Libraries included when the artifact does not list its own.
    pub include_libraries: Vec<IncludedLibrary>,
    /// Data model used when the artifact does not name one.
    pub data_model: DataModel,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            template_root: PathBuf::from("data/cql"),
            include_libraries: IncludedLibrary::defaults(),
            data_model: DataModel::default(),
        }
    }
}

impl GeneratorConfig {
    /// Creates a new builder for GeneratorConfig.
    pub fn builder() -> GeneratorConfigBuilder {
        GeneratorConfigBuilder::default()
    }
}

/// Builder for GeneratorConfig.
#[derive(Debug, Clone, Default)]
pub struct GeneratorConfigBuilder {
    config: GeneratorConfig,
}

impl GeneratorConfigBuilder {
    /// Sets the template root directory.
    pub fn with_template_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.template_root = root.into();
        self
    }

    /// Replaces the default include libraries.
    pub fn with_include_libraries(mut self, libraries: Vec<IncludedLibrary>) -> Self {
        self.config.include_libraries = libraries;
        self
    }

    /// Sets the default data model.
    pub fn with_data_model(mut self, data_model: DataModel) -> Self {
        self.config.data_model = data_model;
        self
    }

    /// Builds the GeneratorConfig.
    pub fn build(self) -> GeneratorConfig {
        self.config
    }
}
