//! CQL-to-ELM translator client.
//!
//! Posts the generated library and every helper `*.cql` file as one
//! `multipart/form-data` request. Each part's field name is the file name
//! without extension. The multipart response is split back into one
//! [`CompiledUnit`] per library.

use std::path::{Path, PathBuf};

use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::TranslatorConfig;
use crate::error::{PackagerError, PackagerResult};
use crate::multipart::{demultiplex, CompiledUnit};

const CQL_MIME: &str = "application/cql";

/// Client for an external CQL-to-ELM translation service.
#[derive(Debug, Clone)]
pub struct ElmTranslator {
    client: reqwest::Client,
    config: TranslatorConfig,
}

impl ElmTranslator {
    /// Creates a translator client.
    pub fn new(config: TranslatorConfig) -> PackagerResult<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PackagerError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Whether requests are sent at all.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Returns the translator settings.
    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// Translates `source` (library `name`) together with the helper
    /// libraries in `helper_dir`.
    ///
    /// Returns no units, without touching the network, when the translator
    /// is disabled. Fails with [`PackagerError::DeadlineExceeded`] if no
    /// complete answer arrives before `deadline`.
    pub async fn translate(
        &self,
        name: &str,
        source: &str,
        helper_dir: Option<&Path>,
        deadline: Instant,
    ) -> PackagerResult<Vec<CompiledUnit>> {
        if !self.config.enabled {
            debug!(library = %name, "Translator disabled, skipping ELM conversion");
            return Ok(Vec::new());
        }

        match tokio::time::timeout_at(deadline, self.exchange(name, source, helper_dir)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(library = %name, url = %self.config.url, "Translator deadline exceeded");
                Err(PackagerError::DeadlineExceeded)
            }
        }
    }

    async fn exchange(
        &self,
        name: &str,
        source: &str,
        helper_dir: Option<&Path>,
    ) -> PackagerResult<Vec<CompiledUnit>> {
        let mut form = Form::new().part(name.to_string(), cql_part(name, source.to_string())?);
        let helpers = match helper_dir {
            Some(dir) => helper_sources(dir).await?,
            None => Vec::new(),
        };
        for (helper, text) in &helpers {
            form = form.part(helper.clone(), cql_part(helper, text.clone())?);
        }

        info!(
            library = %name,
            helpers = helpers.len(),
            url = %self.config.url,
            "Sending CQL to translator"
        );
        let response = self.client.post(&self.config.url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    warn!(status = status.as_u16(), error = %e, "Could not read translator error body");
                    String::new()
                }
            };
            warn!(status = status.as_u16(), "Translator rejected request");
            return Err(PackagerError::TranslatorStatus {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.bytes().await?;
        let units = demultiplex(&content_type, &body)?;

        info!(units = units.len(), status = status.as_u16(), "Translator answered");
        Ok(units)
    }
}

fn cql_part(name: &str, text: String) -> PackagerResult<Part> {
    Ok(Part::text(text)
        .file_name(format!("{name}.cql"))
        .mime_str(CQL_MIME)?)
}

/// Reads every `*.cql` file directly under `dir`, sorted by file name.
/// Returns `(stem, text)` pairs.
async fn helper_sources(dir: &Path) -> PackagerResult<Vec<(String, String)>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| PackagerError::io_error(dir, e))?;

    let mut paths: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PackagerError::io_error(dir, e))?
    {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "cql") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| PackagerError::io_error(&path, e))?;
        sources.push((stem.to_string(), text));
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_disabled_translator_is_a_no_op() {
        let config = TranslatorConfig::builder()
            .with_url("http://127.0.0.1:9")
            .with_enabled(false)
            .build();
        let translator = ElmTranslator::new(config).unwrap();
        let units = translator
            .translate("Lib", "library Lib", None, Instant::now())
            .await
            .unwrap();
        assert!(units.is_empty());
        assert!(!translator.is_enabled());
    }

    #[tokio::test]
    async fn test_helper_sources_are_sorted_cql_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("FHIRHelpers.cql"), "library FHIRHelpers").unwrap();
        std::fs::write(dir.path().join("CDS_Connect_Commons.cql"), "library C3F").unwrap();
        std::fs::write(dir.path().join("README.md"), "docs").unwrap();
        std::fs::create_dir(dir.path().join("nested.cql")).unwrap();

        let sources = helper_sources(dir.path()).await.unwrap();
        let names: Vec<_> = sources.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["CDS_Connect_Commons", "FHIRHelpers"]);
        assert_eq!(sources[1].1, "library FHIRHelpers");
    }

    #[tokio::test]
    async fn test_missing_helper_dir() {
        let err = helper_sources(Path::new("/nonexistent/helpers")).await.unwrap_err();
        assert!(matches!(err, PackagerError::Io { .. }));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = TranslatorConfig::builder()
            .with_url("localhost:8080")
            .with_timeout(Duration::from_secs(1))
            .build();
        assert!(matches!(ElmTranslator::new(config), Err(PackagerError::Config(_))));
    }
}
