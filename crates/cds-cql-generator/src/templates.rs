//! Template store.
//!
//! Templates live under one root directory:
//!
//! | path | kind |
//! |------|------|
//! | `templates/<Name>.hbs` | [`TemplateKind::Element`] |
//! | `specificTemplates/<Name>.hbs` | [`TemplateKind::Specific`] |
//! | `modifiers/<Name>.hbs` | [`TemplateKind::Modifier`] |
//! | `artifact.hbs` | [`TemplateKind::Artifact`] |
//!
//! The file stem is the template name. The store is read-only after load
//! and can be shared between concurrent generations.
//!
//! Rendering is strict: `{{field}}` on a field the data lacks is an error.
//! `#if` and `#unless` still accept absent fields.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use handlebars::{
    Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderErrorReason,
};
use serde::Serialize;
use tracing::{debug, info};

use cds_cql::cql::{escape_single_quotes, literal, quoted_identifier};

use crate::error::{GenerationError, GenerationResult};

/// Name the header template is registered under.
pub const ARTIFACT_TEMPLATE: &str = "artifact";

/// The four template namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    /// Generic element templates, expanded per value and wrapped by modifiers.
    Element,
    /// Templates rendered once against the whole context, without modifiers.
    Specific,
    /// Modifier templates applied to one value's text.
    Modifier,
    /// The library header.
    Artifact,
}

impl TemplateKind {
    /// All kinds.
    pub const ALL: [TemplateKind; 4] = [
        TemplateKind::Element,
        TemplateKind::Specific,
        TemplateKind::Modifier,
        TemplateKind::Artifact,
    ];

    /// Registry prefix and directory name.
    pub fn prefix(self) -> &'static str {
        match self {
            TemplateKind::Element => "templates",
            TemplateKind::Specific => "specificTemplates",
            TemplateKind::Modifier => "modifiers",
            TemplateKind::Artifact => "",
        }
    }

    fn key(self, name: &str) -> String {
        match self {
            TemplateKind::Artifact => ARTIFACT_TEMPLATE.to_string(),
            kind => format!("{}/{}", kind.prefix(), name),
        }
    }
}

/// Loaded templates, keyed by kind and name.
pub struct TemplateStore {
    handlebars: Handlebars<'static>,
    root: Option<PathBuf>,
}

impl std::fmt::Debug for TemplateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateStore")
            .field("root", &self.root)
            .field("templates", &self.names())
            .finish()
    }
}

impl TemplateStore {
    fn empty() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        // A field the context lacks is a render error, not empty text.
        handlebars.set_strict_mode(true);

        handlebars.register_helper("quote", Box::new(quote_helper));
        handlebars.register_helper("escape", Box::new(escape_helper));
        handlebars.register_helper("literal", Box::new(literal_helper));

        Self {
            handlebars,
            root: None,
        }
    }

    /// Loads every template under `root`.
    pub fn load(root: impl AsRef<Path>) -> GenerationResult<Self> {
        let root = root.as_ref();
        let mut store = Self::empty();
        store.root = Some(root.to_path_buf());

        for kind in [TemplateKind::Element, TemplateKind::Specific, TemplateKind::Modifier] {
            let dir = root.join(kind.prefix());
            let mut files = Vec::new();
            let entries = std::fs::read_dir(&dir).map_err(|e| GenerationError::io_error(&dir, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| GenerationError::io_error(&dir, e))?;
                let path = entry.path();
                if path.is_file() {
                    files.push(path);
                }
            }
            files.sort();

            for path in &files {
                let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let source = std::fs::read_to_string(path)
                    .map_err(|e| GenerationError::io_error(path, e))?;
                store.register(kind, name, &source)?;
            }
            debug!(kind = kind.prefix(), count = files.len(), "Loaded templates");
        }

        let header = root.join("artifact.hbs");
        if header.is_file() {
            let source = std::fs::read_to_string(&header)
                .map_err(|e| GenerationError::io_error(&header, e))?;
            store.register(TemplateKind::Artifact, ARTIFACT_TEMPLATE, &source)?;
        }

        info!(root = %root.display(), templates = store.len(), "Template store ready");
        Ok(store)
    }

    /// Builds a store from in-memory sources.
    pub fn from_sources<'a, I>(sources: I) -> GenerationResult<Self>
    where
        I: IntoIterator<Item = (TemplateKind, &'a str, &'a str)>,
    {
        let mut store = Self::empty();
        for (kind, name, source) in sources {
            store.register(kind, name, source)?;
        }
        Ok(store)
    }

    /// Registers or replaces one template.
    pub fn register(&mut self, kind: TemplateKind, name: &str, source: &str) -> GenerationResult<()> {
        self.handlebars
            .register_template_string(&kind.key(name), source)
            .map_err(|e| GenerationError::TemplateParse {
                name: kind.key(name),
                message: e.to_string(),
            })
    }

    /// Whether a template exists.
    pub fn has(&self, kind: TemplateKind, name: &str) -> bool {
        self.handlebars.has_template(&kind.key(name))
    }

    /// Renders a template, failing with [`GenerationError::TemplateNotFound`] when absent.
    pub fn render<T: Serialize>(
        &self,
        kind: TemplateKind,
        name: &str,
        data: &T,
    ) -> GenerationResult<String> {
        let key = kind.key(name);
        if !self.handlebars.has_template(&key) {
            return Err(GenerationError::TemplateNotFound(key));
        }
        self.handlebars
            .render(&key, data)
            .map_err(|e| GenerationError::Render {
                template: key,
                message: e.to_string(),
            })
    }

    /// Registered template keys, sorted.
    pub fn names(&self) -> Vec<String> {
        self.handlebars
            .get_templates()
            .keys()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of registered templates.
    pub fn len(&self) -> usize {
        self.handlebars.get_templates().len()
    }

    /// Whether no templates are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Directory the store was loaded from, if any.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }
}

// Handlebars helpers

fn quote_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let param = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&quoted_identifier(param))?;
    Ok(())
}

fn escape_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let param = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&escape_single_quotes(param))?;
    Ok(())
}

fn literal_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = h
        .param(0)
        .ok_or(RenderErrorReason::ParamNotFoundForIndex("literal", 0))?
        .value();
    out.write(literal(value).as_deref().unwrap_or("null"))?;
    Ok(())
}
