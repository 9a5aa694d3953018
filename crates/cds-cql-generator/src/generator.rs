//! Generation facade: compile, then render.

use std::sync::Arc;

use cds_cql::Artifact;
use tracing::info;

use crate::compiler::TreeCompiler;
use crate::config::GeneratorConfig;
use crate::error::GenerationResult;
use crate::renderer::TemplateRenderer;
use crate::templates::TemplateStore;
use crate::traits::ValueSetResolver;

/// The CQL source generated for one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCql {
    /// Library name (slug of the artifact name).
    pub name: String,
    /// Library version.
    pub version: String,
    /// Output file name, `<name>.cql`.
    pub filename: String,
    /// Full CQL text.
    pub text: String,
}

/// Generates CQL libraries from artifacts.
///
/// Holds only read-only state, so one generator can serve concurrent
/// generations. Each call owns its own compilation.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use cds_cql_generator::{CqlGenerator, GeneratorConfig, InMemoryCatalog};
///
/// let catalog = InMemoryCatalog::from_path("data/value_sets.json")?;
/// let generator = CqlGenerator::from_config(GeneratorConfig::default(), Arc::new(catalog))?;
/// let cql = generator.generate(&artifact)?;
/// std::fs::write(&cql.filename, &cql.text)?;
/// ```
#[derive(Clone)]
pub struct CqlGenerator {
    templates: Arc<TemplateStore>,
    resolver: Arc<dyn ValueSetResolver>,
    config: GeneratorConfig,
}

impl std::fmt::Debug for CqlGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CqlGenerator")
            .field("templates", &self.templates)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CqlGenerator {
    /// Creates a generator over an already loaded template store.
    pub fn new(templates: Arc<TemplateStore>, resolver: Arc<dyn ValueSetResolver>) -> Self {
        Self {
            templates,
            resolver,
            config: GeneratorConfig::default(),
        }
    }

    /// Loads templates from `config.template_root` and creates a generator.
    pub fn from_config(
        config: GeneratorConfig,
        resolver: Arc<dyn ValueSetResolver>,
    ) -> GenerationResult<Self> {
        let templates = TemplateStore::load(&config.template_root)?;
        Ok(Self::new(Arc::new(templates), resolver).with_config(config))
    }

    /// Replaces the generator settings.
    pub fn with_config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the generator settings.
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Returns the template store.
    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    /// Generates the CQL library for `artifact`.
    pub fn generate(&self, artifact: &Artifact) -> GenerationResult<GeneratedCql> {
        let compilation =
            TreeCompiler::new(&self.templates, self.resolver.as_ref()).compile(artifact)?;

        let document = TemplateRenderer::new(&self.templates)
            .with_config(&self.config)
            .render(artifact, &compilation)?;

        let name = artifact.library_name();
        let generated = GeneratedCql {
            filename: format!("{name}.cql"),
            version: artifact.version.clone(),
            text: document.to_string(),
            name,
        };
        info!(library = %generated.name, bytes = generated.text.len(), "Generated CQL");
        Ok(generated)
    }
}
