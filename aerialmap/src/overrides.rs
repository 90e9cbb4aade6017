//! Operator-maintained CSV inputs: control-point address pairs, manual
//! image/link pairs and visually located images without links.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use nalgebra::Point2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Two street addresses with their positions on an index page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPointPair {
    #[serde(rename = "Index File Name")]
    pub index_file_name: String,
    #[serde(rename = "Address 1")]
    pub address_one: String,
    #[serde(rename = "Address 1 GIMP X Coordinate")]
    pub address_one_x: f64,
    #[serde(rename = "Address 1 GIMP Y Coordinate")]
    pub address_one_y: f64,
    #[serde(rename = "Address 2")]
    pub address_two: String,
    #[serde(rename = "Address 2 GIMP X Coordinate")]
    pub address_two_x: f64,
    #[serde(rename = "Address 2 GIMP Y Coordinate")]
    pub address_two_y: f64,
}

impl ControlPointPair {
    pub fn pixel_one(&self) -> Point2<f64> {
        Point2::new(self.address_one_x, self.address_one_y)
    }

    pub fn pixel_two(&self) -> Point2<f64> {
        Point2::new(self.address_two_x, self.address_two_y)
    }

    /// The pair recorded for `index_file_name`, if any.
    pub fn for_index<'a>(
        pairs: &'a [ControlPointPair],
        index_file_name: &str,
    ) -> Option<&'a ControlPointPair> {
        pairs.iter().find(|p| p.index_file_name == index_file_name)
    }
}

/// An image identifier tied by hand to a link annotation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManualPair {
    #[serde(rename = "Index File Name")]
    pub index_file_name: String,
    #[serde(rename = "Image Identifier")]
    pub image_identifier: String,
    #[serde(rename = "PDF Object ID Number")]
    pub object_id: u32,
}

/// An image without a link whose page position was read off the index by eye.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VisualOverride {
    #[serde(rename = "Index File Name")]
    pub index_file_name: String,
    #[serde(rename = "File Identifier")]
    pub file_identifier: String,
    #[serde(rename = "GIMP X Coordinate")]
    pub x: f64,
    #[serde(rename = "GIMP Y Coordinate")]
    pub y: f64,
}

/// Reads every row of a headed CSV file.
///
/// Header names are trimmed and a leading UTF-8 byte order mark is dropped,
/// so spreadsheets exported with either quirk still match the column names.
pub fn read_rows<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let csv_err = |source| Error::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(file);
    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    reader.set_headers(StringRecord::from(headers));

    reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, _>>()
        .map_err(csv_err)
}

/// Loads the address-pairs file. A missing file is an error.
pub fn load_control_points(path: impl AsRef<Path>) -> Result<Vec<ControlPointPair>> {
    read_rows(path)
}

/// Rows of an optional overrides file; a missing file means no overrides.
fn optional_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    match read_rows(path) {
        Err(Error::NotFound(path)) => {
            warn!("CSV file was not found at {}, no overrides applied", path.display());
            Ok(Vec::new())
        }
        other => other,
    }
}

/// Manual pairs for one index: image identifier → link object number.
pub fn load_manual_pairs(
    path: impl AsRef<Path>,
    index_file_name: &str,
) -> Result<BTreeMap<String, u32>> {
    let mut pairs = BTreeMap::new();
    for row in optional_rows::<ManualPair>(path.as_ref())? {
        if row.index_file_name != index_file_name {
            continue;
        }
        if let Some(previous) = pairs.insert(row.image_identifier.clone(), row.object_id) {
            warn!(
                "manual pair for {} listed twice, using object {} over {previous}",
                row.image_identifier, row.object_id
            );
        }
    }
    Ok(pairs)
}

/// Visual overrides for one index: file identifier → page position.
pub fn load_visual_overrides(
    path: impl AsRef<Path>,
    index_file_name: &str,
) -> Result<BTreeMap<String, Point2<f64>>> {
    Ok(optional_rows::<VisualOverride>(path.as_ref())?
        .into_iter()
        .filter(|row| row.index_file_name == index_file_name)
        .map(|row| (row.file_identifier, Point2::new(row.x, row.y)))
        .collect())
}
