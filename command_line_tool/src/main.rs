use std::path::{Path, PathBuf};

use aerialmap::arcgis::ArcGisGeocoder;
use aerialmap::batch::{collect_pdf_paths, collect_pdf_paths_recursive, version_report, PathCache};
use aerialmap::config::WorkflowConfig;
use aerialmap::geocode::GeocodeCache;
use aerialmap::model::BatchMetadata;
use aerialmap::workflow::{self, DataMode, OutputPaths};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command line arguments structure.
#[derive(Parser, Debug)]
#[command(author, version, about = "CLI for georeferencing scanned aerial photograph PDFs.")]
struct Args {
    /// JSON configuration file; missing fields keep their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Batch directory of one county and year, e.g. input/macomb/1961
    #[arg(long, global = true)]
    batch_dir: Option<PathBuf>,

    /// Directory for JSON and GeoJSON outputs
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Directory extracted images are written to
    #[arg(long, global = true)]
    image_dir: Option<PathBuf>,

    /// Directory holding the CSV inputs and the geocoding cache
    #[arg(long, global = true)]
    input_dir: Option<PathBuf>,

    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract index links and images of the batch into batch metadata
    Extract,
    /// Georeference the links of previously extracted batch metadata
    Georeference,
    /// Run the whole batch and write image records and GeoJSON
    Process {
        /// process: extract and georeference first; load: reuse earlier outputs
        #[arg(long, value_enum, default_value_t = Mode::Process)]
        mode: Mode,
    },
    /// List every PDF below a directory, cached in a JSON path list
    Paths {
        root: PathBuf,
        #[arg(long, default_value = "pdf_path_cache.json")]
        cache: PathBuf,
    },
    /// Count the PDF versions of the files in a directory
    Versions {
        dir: PathBuf,
        /// Include subdirectories
        #[arg(long)]
        recursive: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
    Process,
    Load,
}

impl From<Mode> for DataMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Process => DataMode::Process,
            Mode::Load => DataMode::Load,
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(args: &Args) -> Result<WorkflowConfig> {
    let mut config = WorkflowConfig::load_or_default(args.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(dir) = &args.batch_dir {
        config.batch_dir = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(dir) = &args.image_dir {
        config.image_dir = dir.clone();
    }
    if let Some(dir) = &args.input_dir {
        config.input_dir = dir.clone();
    }
    Ok(config)
}

fn open_cache(config: &WorkflowConfig) -> Result<GeocodeCache<ArcGisGeocoder>> {
    let geocoder = ArcGisGeocoder::with_base_url(&config.arcgis_url, config.timeout())?;
    let path = config.geocode_cache_path();
    GeocodeCache::open(&path, geocoder)
        .with_context(|| format!("failed to open geocoding cache {}", path.display()))
}

fn read_batch_metadata(path: &Path) -> Result<BatchMetadata> {
    match BatchMetadata::read(path) {
        Ok(batch) => Ok(batch),
        Err(e) if e.is_not_found() => {
            Err(e).context(format!("no batch metadata at {}, run `extract` first", path.display()))
        }
        Err(e) => Err(e).with_context(|| format!("failed to read batch metadata {}", path.display())),
    }
}

fn print_versions(dir: &Path, recursive: bool) -> Result<()> {
    let paths = if recursive {
        collect_pdf_paths_recursive(dir)?
    } else {
        collect_pdf_paths(dir)?
    };
    println!("{} PDF files in {}", paths.len(), dir.display());
    for (version, count) in version_report(&paths) {
        println!("PDF {version}: {count}");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let config = load_config(&args)?;

    match &args.command {
        Command::Extract => {
            let outputs = OutputPaths::for_config(&config)?;
            workflow::extract(&config, &outputs)
                .with_context(|| format!("failed to extract {}", config.batch_dir.display()))?;
        }
        Command::Georeference => {
            let outputs = OutputPaths::for_config(&config)?;
            let batch = read_batch_metadata(&outputs.batch_metadata)?;
            let mut cache = open_cache(&config)?;
            workflow::georeference(&config, &batch, &outputs, &mut cache)?;
        }
        Command::Process { mode } => {
            let mut cache = open_cache(&config)?;
            let summary = workflow::run(&config, (*mode).into(), &mut cache)
                .with_context(|| format!("failed to process {}", config.batch_dir.display()))?;
            if summary.has_issues() {
                info!("review the warnings above and update the override CSV files");
            }
        }
        Command::Paths { root, cache } => {
            let paths = PathCache::load_or_build(cache, root)?;
            println!("{} PDF files listed in {}", paths.master_list.len(), cache.display());
        }
        Command::Versions { dir, recursive } => print_versions(dir, *recursive)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_hint_only_for_missing_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macomb_1961_batch_metadata.json");

        let missing = read_batch_metadata(&path).unwrap_err();
        assert!(missing.to_string().contains("run `extract` first"));

        std::fs::write(&path, "{ \"Index Records\": [").unwrap();
        let malformed = read_batch_metadata(&path).unwrap_err();
        assert!(!malformed.to_string().contains("run `extract` first"));
        assert!(malformed.to_string().contains("failed to read batch metadata"));
        assert!(format!("{malformed:#}").contains("invalid JSON"));
    }
}
