use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::arcgis::ARCGIS_BASE_URL;
use crate::error::{Error, Result};
use crate::model::read_json;

/// Locations and names used by a batch run.
///
/// Every field has a default, so a config file only needs the fields it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Directory of one county/year batch, `<county>/<year>`.
    pub batch_dir: PathBuf,
    /// Directory for the JSON and GeoJSON outputs.
    pub output_dir: PathBuf,
    /// Directory the extracted images are written to.
    pub image_dir: PathBuf,
    /// Directory holding the CSV inputs and the geocode cache.
    pub input_dir: PathBuf,
    pub geocode_cache: String,
    pub address_pairs: String,
    pub manual_pairs: String,
    pub files_without_links: String,
    pub image_prefix: String,
    pub arcgis_url: String,
    pub timeout_secs: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            batch_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            image_dir: PathBuf::from("output").join("images"),
            input_dir: PathBuf::from("input"),
            geocode_cache: "arcgis_geocoding_cache.json".into(),
            address_pairs: "address_pairs.csv".into(),
            manual_pairs: "manual_pairs.csv".into(),
            files_without_links: "files_without_links.csv".into(),
            image_prefix: "dte_aerial_".into(),
            arcgis_url: ARCGIS_BASE_URL.into(),
            timeout_secs: 30,
        }
    }
}

impl WorkflowConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config = read_json(path.as_ref())?;
        info!("configuration loaded from {}", path.as_ref().display());
        Ok(config)
    }

    /// Loads `path` if given; a missing file falls back to the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path.map(WorkflowConfig::load) {
            None => Ok(Self::default()),
            Some(Err(Error::NotFound(path))) => {
                warn!("no configuration at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Some(result) => result,
        }
    }

    pub fn geocode_cache_path(&self) -> PathBuf {
        self.input_dir.join(&self.geocode_cache)
    }

    pub fn address_pairs_path(&self) -> PathBuf {
        self.input_dir.join(&self.address_pairs)
    }

    pub fn manual_pairs_path(&self) -> PathBuf {
        self.input_dir.join(&self.manual_pairs)
    }

    pub fn files_without_links_path(&self) -> PathBuf {
        self.input_dir.join(&self.files_without_links)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn partial_config_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aerialmap.json");
        fs::write(&path, r#"{ "batch_dir": "input/wayne/1949", "timeout_secs": 5 }"#).unwrap();

        let config = WorkflowConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.batch_dir, PathBuf::from("input/wayne/1949"));
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.image_prefix, "dte_aerial_");
        assert_eq!(config.manual_pairs_path(), Path::new("input").join("manual_pairs.csv"));
    }

    #[test]
    fn missing_config_file_means_defaults() {
        let config = WorkflowConfig::load_or_default(Some(Path::new("no/aerialmap.json"))).unwrap();
        assert_eq!(config, WorkflowConfig::default());
        assert_eq!(WorkflowConfig::load_or_default(None).unwrap(), WorkflowConfig::default());
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aerialmap.json");
        fs::write(&path, "{ batch_dir: ").unwrap();
        assert!(matches!(WorkflowConfig::load_or_default(Some(&path)), Err(Error::Json(_))));
    }
}
