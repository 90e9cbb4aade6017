//! One county/year batch from PDFs to image records and GeoJSON.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::batch::{collect_pdf_paths, county_year_combo, run_extraction};
use crate::config::WorkflowConfig;
use crate::error::{Error, Result};
use crate::geocode::{GeocodeCache, Geocoder};
use crate::georeference::{run_georeferencing, GeoreferencedLinkData};
use crate::matcher::{RecordMatcher, UnmatchedReason};
use crate::model::BatchMetadata;
use crate::overrides::{load_control_points, load_manual_pairs, load_visual_overrides};
use crate::records::{assemble_records, timestamp, write_records, BaseRecord, FeatureCollection};

/// Whether batch metadata and link data are produced or read back from an
/// earlier run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum DataMode {
    #[default]
    Process,
    Load,
}

/// Output files of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPaths {
    pub batch_metadata: PathBuf,
    pub georeferenced_links: PathBuf,
    pub image_records: PathBuf,
    pub image_locations: PathBuf,
}

impl OutputPaths {
    pub fn new(output_dir: &Path, combo: &str, image_prefix: &str) -> Self {
        Self {
            batch_metadata: output_dir.join(format!("{combo}_batch_metadata.json")),
            georeferenced_links: output_dir.join(format!("{combo}_georeferenced_links.json")),
            image_records: output_dir.join(format!("{image_prefix}{combo}_image_records.json")),
            image_locations: output_dir.join(format!("{combo}_image_locations.geojson")),
        }
    }

    pub fn for_config(config: &WorkflowConfig) -> Result<Self> {
        let combo = county_year_combo(&config.batch_dir)?;
        Ok(Self::new(&config.output_dir, &combo, &config.image_prefix))
    }
}

/// Counts and issues of a finished run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunSummary {
    pub image_count: usize,
    pub link_count: usize,
    pub record_count: usize,
    /// Identifier and reason of every image left out of the records.
    pub unmatched_images: Vec<(String, UnmatchedReason)>,
    /// Object numbers of links no image was matched to.
    pub unmatched_links: Vec<u32>,
}

impl RunSummary {
    pub fn has_issues(&self) -> bool {
        !self.unmatched_images.is_empty()
    }

    pub fn log(&self) {
        info!("{} image records processed", self.image_count);
        info!("{} link records processed", self.link_count);
        info!("{} full image records created", self.record_count);
        if self.has_issues() {
            warn!("{} images could not be matched:", self.unmatched_images.len());
            for (identifier, reason) in &self.unmatched_images {
                warn!("  {identifier}: {reason}");
            }
        } else {
            info!("no matching issues found");
        }
        if !self.unmatched_links.is_empty() {
            warn!("unmatched link records: {:?}", self.unmatched_links);
        }
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))
}

/// Extracts the batch directory and writes its metadata.
pub fn extract(config: &WorkflowConfig, outputs: &OutputPaths) -> Result<BatchMetadata> {
    ensure_dir(&config.output_dir)?;
    let paths = collect_pdf_paths(&config.batch_dir)?;
    let batch = run_extraction(&paths, &config.image_dir, &config.image_prefix)?;
    batch.write(&outputs.batch_metadata)?;
    info!("batch metadata written to {}", outputs.batch_metadata.display());
    Ok(batch)
}

/// Georeferences the batch's links and writes the result.
pub fn georeference<G: Geocoder>(
    config: &WorkflowConfig,
    batch: &BatchMetadata,
    outputs: &OutputPaths,
    cache: &mut GeocodeCache<G>,
) -> Result<GeoreferencedLinkData> {
    ensure_dir(&config.output_dir)?;
    let pairs = load_control_points(config.address_pairs_path())?;
    let data = match run_georeferencing(batch, &pairs, cache) {
        Ok(data) => data,
        Err(e @ Error::MissingControlPoints(_)) => {
            error!("{e}, add the index to {}", config.address_pairs_path().display());
            return Err(e);
        }
        Err(e) => return Err(e),
    };
    data.write(&outputs.georeferenced_links)?;
    info!("georeferenced links written to {}", outputs.georeferenced_links.display());
    Ok(data)
}

/// Runs a whole batch and writes the image records and their GeoJSON.
pub fn run<G: Geocoder>(
    config: &WorkflowConfig,
    mode: DataMode,
    cache: &mut GeocodeCache<G>,
) -> Result<RunSummary> {
    let outputs = OutputPaths::for_config(config)?;
    let (batch, links) = match mode {
        DataMode::Process => {
            let batch = extract(config, &outputs)?;
            let links = georeference(config, &batch, &outputs, cache)?;
            (batch, links)
        }
        DataMode::Load => (
            BatchMetadata::read(&outputs.batch_metadata)?,
            GeoreferencedLinkData::read(&outputs.georeferenced_links)?,
        ),
    };

    let index = batch.index()?;
    let base = BaseRecord::from_index(index)?;
    let matcher = RecordMatcher::new(
        load_manual_pairs(config.manual_pairs_path(), &index.file_name)?,
        load_visual_overrides(config.files_without_links_path(), &index.file_name)?,
    );
    let outcome = matcher.match_records(&batch.image_records, &links.records);
    let records = assemble_records(&base, &outcome, &links.transform(), cache, &timestamp()?)?;

    write_records(&outputs.image_records, &records)?;
    FeatureCollection::from_records(&records).write(&outputs.image_locations)?;
    info!(
        "image records written to {} and {}",
        outputs.image_records.display(),
        outputs.image_locations.display()
    );

    let summary = RunSummary {
        image_count: batch.image_records.len(),
        link_count: links.records.len(),
        record_count: records.len(),
        unmatched_images: outcome
            .unmatched
            .iter()
            .map(|u| (u.image.identifier(), u.reason.clone()))
            .collect(),
        unmatched_links: outcome.unmatched_links.clone(),
    };
    summary.log();
    Ok(summary)
}
