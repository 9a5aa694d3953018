//! End-to-end packaging: generate, translate, archive.

use std::io::Write;

use cds_cql::Artifact;
use cds_cql_generator::CqlGenerator;
use tokio::time::Instant;
use tracing::{info, instrument};
use zip::result::ZipError;

use crate::archive::ArchiveAssembler;
use crate::config::PackagerConfig;
use crate::error::PackagerResult;
use crate::multipart::CompiledUnit;
use crate::translator::ElmTranslator;

/// What one packaging run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSummary {
    /// Library name.
    pub library: String,
    /// Source file name inside the archive.
    pub filename: String,
    /// Names of the compiled units, in archive order.
    pub units: Vec<String>,
    /// Total archive entries, helpers included.
    pub entries: usize,
}

/// Runs the whole pipeline for one artifact.
///
/// Stages run strictly in order. The archive is built in memory and written
/// to the sink only after every stage succeeds, so a failure anywhere before
/// the final write leaves the sink untouched.
#[derive(Debug, Clone)]
pub struct Packager {
    generator: CqlGenerator,
    translator: ElmTranslator,
    assembler: ArchiveAssembler,
    config: PackagerConfig,
}

impl Packager {
    /// Creates a packager.
    pub fn new(generator: CqlGenerator, config: PackagerConfig) -> PackagerResult<Self> {
        let translator = ElmTranslator::new(config.translator.clone())?;
        Ok(Self {
            generator,
            translator,
            assembler: ArchiveAssembler::new(),
            config,
        })
    }

    /// Returns the generator.
    pub fn generator(&self) -> &CqlGenerator {
        &self.generator
    }

    /// Returns the packager settings.
    pub fn config(&self) -> &PackagerConfig {
        &self.config
    }

    /// Generates, translates and archives `artifact` into `sink`.
    #[instrument(skip_all, fields(artifact = %artifact.name))]
    pub async fn package<W: Write>(
        &self,
        artifact: &Artifact,
        mut sink: W,
        deadline: Instant,
    ) -> PackagerResult<PackageSummary> {
        let cql = self.generator.generate(artifact)?;
        let helper_dir = self.config.helper_dir.as_deref();

        let units = self
            .translator
            .translate(&cql.name, &cql.text, helper_dir, deadline)
            .await?;

        let (archive, entries) = self.build_archive(&cql.text, &cql.filename, &units).await?;
        sink.write_all(&archive).map_err(ZipError::from)?;
        sink.flush().map_err(ZipError::from)?;

        let summary = PackageSummary {
            library: cql.name,
            filename: cql.filename,
            units: units.into_iter().map(|unit| unit.name).collect(),
            entries,
        };
        info!(
            library = %summary.library,
            units = summary.units.len(),
            entries = summary.entries,
            "Packaged library"
        );
        Ok(summary)
    }

    /// Assembles the archive in memory on the blocking pool; the helper walk
    /// and deflate work stay off the async workers.
    async fn build_archive(
        &self,
        source: &str,
        filename: &str,
        units: &[CompiledUnit],
    ) -> PackagerResult<(Vec<u8>, usize)> {
        let assembler = self.assembler;
        let source = source.to_string();
        let filename = filename.to_string();
        let units = units.to_vec();
        let helper_dir = self.config.helper_dir.clone();

        tokio::task::spawn_blocking(move || -> PackagerResult<(Vec<u8>, usize)> {
            let mut archive = Vec::new();
            let entries =
                assembler.assemble(&mut archive, &source, &filename, &units, helper_dir.as_deref())?;
            Ok((archive, entries))
        })
        .await?
    }
}
