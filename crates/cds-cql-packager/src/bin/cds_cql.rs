//! Command line front end for CQL generation and packaging.
//!
//! ```text
//! cds-cql generate --artifact statins.json --catalog data/value_sets.json
//! cds-cql package  --artifact statins.json --catalog data/value_sets.json \
//!                  --translator http://localhost:8080/cql/translator --out statins.zip
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cds_cql::Artifact;
use cds_cql_generator::{CqlGenerator, GeneratorConfig, InMemoryCatalog};
use cds_cql_packager::{Packager, PackagerConfig};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cds-cql")]
#[command(about = "Generate CQL libraries from CDS artifacts and package them with their ELM")]
#[command(version)]
struct Cli {
    /// JSON settings file with `generator` and `packager` sections
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the CQL library for an artifact
    Generate {
        #[command(flatten)]
        input: InputArgs,
        /// Output file (prints to stdout if not provided)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Render, translate to ELM and write a zip archive
    Package {
        #[command(flatten)]
        input: InputArgs,
        /// Archive to write
        #[arg(short, long)]
        out: PathBuf,
        /// Translator endpoint; enables ELM translation
        #[arg(long)]
        translator: Option<String>,
        /// Helper library directory copied into the archive
        #[arg(long)]
        helpers: Option<PathBuf>,
        /// Seconds to wait for the translator
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Artifact JSON exported by the authoring tool
    #[arg(short, long)]
    artifact: PathBuf,
    /// Value set catalog JSON
    #[arg(long)]
    catalog: PathBuf,
    /// Template root (overrides the settings file)
    #[arg(long)]
    templates: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Settings {
    generator: GeneratorConfig,
    packager: PackagerConfig,
}

impl Settings {
    fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read settings {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("invalid settings {}", path.display()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate { input, out } => {
            let (generator, artifact) = load(&input, settings.generator)?;
            let cql = generator.generate(&artifact)?;
            match out {
                Some(path) => fs::write(&path, &cql.text)
                    .with_context(|| format!("cannot write {}", path.display()))?,
                None => print!("{}", cql.text),
            }
        }
        Commands::Package {
            input,
            out,
            translator,
            helpers,
            timeout,
        } => {
            let (generator, artifact) = load(&input, settings.generator)?;
            let mut config = settings.packager;
            if let Some(url) = translator {
                config.translator.url = url;
                config.translator.enabled = true;
            }
            if helpers.is_some() {
                config.helper_dir = helpers;
            }

            let packager = Packager::new(generator, config)?;
            let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout);

            let mut archive = Vec::new();
            let summary = packager.package(&artifact, &mut archive, deadline).await?;
            fs::write(&out, &archive).with_context(|| format!("cannot write {}", out.display()))?;
            eprintln!(
                "{} -> {} ({} entries, {} ELM units)",
                summary.filename,
                out.display(),
                summary.entries,
                summary.units.len()
            );
        }
    }
    Ok(())
}

fn load(input: &InputArgs, mut config: GeneratorConfig) -> Result<(CqlGenerator, Artifact)> {
    if let Some(root) = &input.templates {
        config.template_root = root.clone();
    }
    let catalog = InMemoryCatalog::from_path(&input.catalog)?;
    let generator = CqlGenerator::from_config(config, Arc::new(catalog))?;

    let text = fs::read_to_string(&input.artifact)
        .with_context(|| format!("cannot read artifact {}", input.artifact.display()))?;
    let artifact = Artifact::from_json(&text)?;
    Ok((generator, artifact))
}
