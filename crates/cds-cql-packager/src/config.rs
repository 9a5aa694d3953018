//! Configuration types for translation and packaging.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PackagerError, PackagerResult};

/// Settings for the CQL-to-ELM translator.
///
/// Disabled by default; a disabled translator makes no network call and
/// yields no compiled units.
///
/// # Example
///
/// ```rust
/// use cds_cql_packager::TranslatorConfig;
/// use std::time::Duration;
///
/// let config = TranslatorConfig::builder()
///     .with_url("http://localhost:8080/cql/translator")
///     .with_timeout(Duration::from_secs(30))
///     .build();
/// assert!(config.enabled);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Whether to call the translator at all.
    pub enabled: bool,
    /// Translator endpoint.
    pub url: String,
    /// Per-request timeout, in addition to the caller's deadline.
    #[serde(deserialize_with = "duration_secs::deserialize")]
    pub timeout: Duration,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://localhost:8080/cql/translator".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl TranslatorConfig {
    /// Creates a new builder.
    pub fn builder() -> TranslatorConfigBuilder {
        TranslatorConfigBuilder::default()
    }

    /// Checks that an enabled translator has a usable endpoint.
    pub fn validate(&self) -> PackagerResult<()> {
        if self.enabled && !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(PackagerError::Config(format!(
                "translator url must be http(s), got {:?}",
                self.url
            )));
        }
        Ok(())
    }
}

/// Builder for [`TranslatorConfig`].
#[derive(Debug, Clone, Default)]
pub struct TranslatorConfigBuilder {
    config: TranslatorConfig,
}

impl TranslatorConfigBuilder {
    /// Sets the endpoint and enables the translator.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self.config.enabled = true;
        self
    }

    /// Enables or disables the translator.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Builds the config.
    pub fn build(self) -> TranslatorConfig {
        self.config
    }
}

/// Settings for the packaging pipeline.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PackagerConfig {
    /// Translator settings.
    pub translator: TranslatorConfig,
    /// Directory of helper libraries shipped in every archive. Its `*.cql`
    /// files are also sent to the translator.
    pub helper_dir: Option<PathBuf>,
}

impl PackagerConfig {
    /// Creates a new builder.
    pub fn builder() -> PackagerConfigBuilder {
        PackagerConfigBuilder::default()
    }
}

/// Builder for [`PackagerConfig`].
#[derive(Debug, Clone, Default)]
pub struct PackagerConfigBuilder {
    config: PackagerConfig,
}

impl PackagerConfigBuilder {
    /// Sets the translator settings.
    pub fn with_translator(mut self, translator: TranslatorConfig) -> Self {
        self.config.translator = translator;
        self
    }

    /// Sets the helper library directory.
    pub fn with_helper_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.helper_dir = Some(dir.into());
        self
    }

    /// Builds the config.
    pub fn build(self) -> PackagerConfig {
        self.config
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
