//! Consolidated per-image metadata records and their GeoJSON crosswalk.

use std::path::Path;

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::OffsetDateTime;

use crate::affine_transform::AffineTransform;
use crate::error::{Error, Result};
use crate::geocode::{GeocodeCache, Geocoder};
use crate::georeference::county_at;
use crate::matcher::{MatchOutcome, Resolution};
use crate::model::{read_json, write_json, ImageRecord, IndexRecord};

/// Metadata shared by every image of one index document.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseRecord {
    pub year: String,
    pub index_county: String,
    pub index_file_name: String,
}

impl BaseRecord {
    /// Reads year and county from the index location `<county>/<year>/<index>.pdf`.
    ///
    /// # Examples
    /// ```
    /// # use aerialmap::records::BaseRecord;
    /// # use aerialmap::model::IndexRecord;
    /// let index = IndexRecord {
    ///     file_name: "Index_1961.pdf".into(),
    ///     source_path: "input/part1/macomb/1961/Index_1961.pdf".into(),
    ///     links: vec![],
    ///     media_box: [0.0, 0.0, 612.0, 792.0],
    /// };
    /// let base = BaseRecord::from_index(&index).unwrap();
    /// assert_eq!(base.year, "1961");
    /// assert_eq!(base.index_county, "Macomb");
    /// ```
    pub fn from_index(index: &IndexRecord) -> Result<Self> {
        let path = Path::new(&index.source_path);
        let component = |p: Option<&Path>| {
            p.and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    Error::MissingData(format!(
                        "index path {} is not of the form <county>/<year>/<file>",
                        index.source_path
                    ))
                })
        };
        let year_dir = path.parent();
        let year = component(year_dir)?;
        let county = component(year_dir.and_then(Path::parent))?;
        Ok(BaseRecord {
            year,
            index_county: capitalize(&county),
            index_file_name: index.file_name.clone(),
        })
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geocoordinates {
    #[serde(rename = "Longitude")]
    pub longitude: f64,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptive {
    #[serde(rename = "Year")]
    pub year: String,
    #[serde(rename = "Index County")]
    pub index_county: String,
    #[serde(rename = "File Identifier")]
    pub file_identifier: String,
    #[serde(rename = "ArcGIS Current County")]
    pub county: Option<String>,
    #[serde(rename = "ArcGIS Geocoordinates")]
    pub geocoordinates: Geocoordinates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technical {
    #[serde(rename = "Width")]
    pub width: u32,
    #[serde(rename = "Height")]
    pub height: u32,
    #[serde(rename = "ColorSpace")]
    pub color_space: String,
    #[serde(rename = "BitsPerComponent")]
    pub bits_per_component: u32,
    #[serde(rename = "Filter")]
    pub filter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDetails {
    #[serde(rename = "Matching Method")]
    pub method: String,
    /// Object number of the matched link; `None` for visual matches.
    #[serde(rename = "Link PDF Object ID Number")]
    pub link_object_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preservation {
    #[serde(rename = "Related Index File Name")]
    pub index_file_name: String,
    #[serde(rename = "Match Details")]
    pub match_details: MatchDetails,
    #[serde(rename = "PDF Source Relative Path")]
    pub source_path: String,
    #[serde(rename = "Date and Time Created")]
    pub created: String,
}

/// The final metadata record for one extracted image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullImageRecord {
    #[serde(rename = "File Name")]
    pub file_name: String,
    #[serde(rename = "Descriptive")]
    pub descriptive: Descriptive,
    #[serde(rename = "Technical")]
    pub technical: Technical,
    #[serde(rename = "Preservation")]
    pub preservation: Preservation,
}

impl FullImageRecord {
    fn new(
        base: &BaseRecord,
        image: &ImageRecord,
        geocoordinates: Geocoordinates,
        county: Option<String>,
        match_details: MatchDetails,
        created: &str,
    ) -> Self {
        FullImageRecord {
            file_name: image.created_file_name.clone(),
            descriptive: Descriptive {
                year: base.year.clone(),
                index_county: base.index_county.clone(),
                file_identifier: image.identifier(),
                county,
                geocoordinates,
            },
            technical: Technical {
                width: image.width,
                height: image.height,
                color_space: image.color_space.clone(),
                bits_per_component: image.bits_per_component,
                filter: image.filter.clone(),
            },
            preservation: Preservation {
                index_file_name: base.index_file_name.clone(),
                match_details,
                source_path: image.source_path.clone(),
                created: created.to_string(),
            },
        }
    }
}

/// Current local time as `YYYY-M-D-H:M`, falling back to UTC when the
/// local offset cannot be determined.
pub fn timestamp() -> Result<String> {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let format = format_description!(
        "[year]-[month padding:none]-[day padding:none]-[hour padding:none]:[minute padding:none]"
    );
    Ok(now.format(&format)?)
}

/// Builds a full record for every matched image.
///
/// Visually located images are georeferenced here with the index transform
/// and reverse-geocoded for their county.
pub fn assemble_records<G: Geocoder>(
    base: &BaseRecord,
    outcome: &MatchOutcome<'_>,
    transform: &AffineTransform,
    cache: &mut GeocodeCache<G>,
    created: &str,
) -> Result<Vec<FullImageRecord>> {
    let mut records = Vec::with_capacity(outcome.matched.len());
    for matched in &outcome.matched {
        let method = matched.resolution.method();
        let (geocoordinates, county, link_object_id) = match &matched.resolution {
            Resolution::Link { record, .. } => (
                Geocoordinates {
                    longitude: record.longitude,
                    latitude: record.latitude,
                },
                record.county.clone(),
                Some(record.object_id()),
            ),
            Resolution::Visual(position) => {
                let world = transform.transform(position);
                let county = county_at(cache, &world)?;
                (
                    Geocoordinates {
                        longitude: world.x,
                        latitude: world.y,
                    },
                    county,
                    None,
                )
            }
        };
        let details = MatchDetails {
            method: method.description().to_string(),
            link_object_id,
        };
        records.push(FullImageRecord::new(
            base,
            matched.image,
            geocoordinates,
            county,
            details,
            created,
        ));
    }
    Ok(records)
}

pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<FullImageRecord>> {
    read_json(path)
}

pub fn write_records(path: impl AsRef<Path>, records: &[FullImageRecord]) -> Result<()> {
    write_json(path, records)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    pub file_identifier: String,
    pub county: Option<String>,
    pub year: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: PointGeometry,
    pub properties: FeatureProperties,
}

/// GeoJSON `FeatureCollection` with one `Point` per image record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn from_records(records: &[FullImageRecord]) -> Self {
        let features = records
            .iter()
            .map(|record| {
                let descriptive = &record.descriptive;
                Feature {
                    kind: "Feature".into(),
                    geometry: PointGeometry {
                        kind: "Point".into(),
                        coordinates: [
                            descriptive.geocoordinates.longitude,
                            descriptive.geocoordinates.latitude,
                        ],
                    },
                    properties: FeatureProperties {
                        file_identifier: descriptive.file_identifier.clone(),
                        county: descriptive.county.clone(),
                        year: descriptive.year.clone(),
                    },
                }
            })
            .collect();
        FeatureCollection {
            kind: "FeatureCollection".into(),
            features,
        }
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path, self)
    }
}
