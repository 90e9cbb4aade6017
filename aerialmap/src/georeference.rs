//! Converting index link positions into geocoordinates.

use std::path::Path;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::affine_transform::{AffineTransform, TransformConstants};
use crate::error::{Error, Result};
use crate::geocode::{best_location, county_name, GeocodeCache, Geocoder};
use crate::model::{read_json, write_json, BatchMetadata, IndexRecord, LinkRecord};
use crate::overrides::ControlPointPair;

/// A link reduced to the single page point that stands for its photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkLocation {
    #[serde(rename = "PDF Object ID Number")]
    pub object_id: u32,
    #[serde(rename = "Linked Image PDF Identifier")]
    pub linked_identifier: String,
    #[serde(rename = "PDF X Coordinate")]
    pub x: f64,
    #[serde(rename = "PDF Y Coordinate")]
    pub y: f64,
}

impl LinkLocation {
    /// Uses the middle of the link box's left edge, which sits closest to
    /// the photo's real-world position on the index map.
    ///
    /// # Examples
    /// ```
    /// # use aerialmap::georeference::LinkLocation;
    /// # use aerialmap::model::{LinkRecord, LinkTarget};
    /// let link = LinkRecord {
    ///     object_id: 7,
    ///     linked_file_name: "1961-1-12.pdf".into(),
    ///     rect: [100.0, 200.0, 130.0, 210.0],
    ///     target: LinkTarget::File,
    /// };
    /// let location = LinkLocation::from_link(&link);
    /// assert_eq!(location.linked_identifier, "1961-1-12");
    /// assert_eq!((location.x, location.y), (100.0, 205.0));
    /// ```
    pub fn from_link(link: &LinkRecord) -> Self {
        let [x1, y1, _x2, y2] = link.rect;
        LinkLocation {
            object_id: link.object_id,
            linked_identifier: link.linked_identifier(),
            x: x1,
            y: (y2 - y1) / 2.0 + y1,
        }
    }

    pub fn point(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

/// A link location with its derived geocoordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoreferencedLinkRecord {
    #[serde(flatten)]
    pub location: LinkLocation,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    /// County reported by reverse geocoding, `None` if the service gave none.
    #[serde(rename = "Current County")]
    pub county: Option<String>,
}

impl GeoreferencedLinkRecord {
    pub fn object_id(&self) -> u32 {
        self.location.object_id
    }

    pub fn linked_identifier(&self) -> &str {
        &self.location.linked_identifier
    }
}

/// How the transform for an index was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoreferencingMetadata {
    #[serde(rename = "Address Pair Data")]
    pub control_points: ControlPointPair,
    #[serde(rename = "Constants")]
    pub constants: TransformConstants,
}

/// Output of georeferencing one index document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoreferencedLinkData {
    #[serde(rename = "Georeferencing Metadata")]
    pub metadata: GeoreferencingMetadata,
    #[serde(rename = "Georeferenced Link Records")]
    pub records: Vec<GeoreferencedLinkRecord>,
}

impl GeoreferencedLinkData {
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path, self)
    }

    pub fn transform(&self) -> AffineTransform {
        self.metadata.constants.into()
    }
}

/// Link locations for every link of an index.
pub fn link_locations(index: &IndexRecord) -> Vec<LinkLocation> {
    index.links.iter().map(LinkLocation::from_link).collect()
}

/// Geocodes an address to `(longitude, latitude)` through the cache.
pub fn locate_address<G: Geocoder>(cache: &mut GeocodeCache<G>, address: &str) -> Result<Point2<f64>> {
    let response = cache.lookup_address(address)?;
    best_location(response).ok_or_else(|| Error::geocode(address, "no candidates with a location"))
}

/// Reverse geocodes a position to its county name through the cache.
pub fn county_at<G: Geocoder>(
    cache: &mut GeocodeCache<G>,
    position: &Point2<f64>,
) -> Result<Option<String>> {
    let response = cache.lookup_coordinates(position.x, position.y)?;
    let county = county_name(response);
    if county.is_none() {
        warn!("no county found at {}, {}", position.x, position.y);
    }
    Ok(county)
}

/// Derives the page → geocoordinate transform from a control-point pair.
pub fn derive_transform<G: Geocoder>(
    pair: &ControlPointPair,
    cache: &mut GeocodeCache<G>,
) -> Result<AffineTransform> {
    let world_one = locate_address(cache, &pair.address_one)?;
    let world_two = locate_address(cache, &pair.address_two)?;
    AffineTransform::from_control_points(pair.pixel_one(), world_one, pair.pixel_two(), world_two)
}

/// Applies `transform` to every location and looks up the county of each.
pub fn georeference_links<G: Geocoder>(
    locations: Vec<LinkLocation>,
    transform: &AffineTransform,
    cache: &mut GeocodeCache<G>,
) -> Result<Vec<GeoreferencedLinkRecord>> {
    locations
        .into_iter()
        .map(|location| {
            let position = transform.transform(&location.point());
            let county = county_at(cache, &position)?;
            Ok(GeoreferencedLinkRecord {
                location,
                longitude: position.x,
                latitude: position.y,
                county,
            })
        })
        .collect()
}

/// Georeferences all links of the batch's index document.
///
/// Fails with [`Error::MissingControlPoints`] when no address pair is
/// recorded for the index.
pub fn run_georeferencing<G: Geocoder>(
    batch: &BatchMetadata,
    pairs: &[ControlPointPair],
    cache: &mut GeocodeCache<G>,
) -> Result<GeoreferencedLinkData> {
    let index = batch.index()?;
    info!("georeferencing links of {}", index.file_name);
    let pair = ControlPointPair::for_index(pairs, &index.file_name)
        .ok_or_else(|| Error::MissingControlPoints(index.file_name.clone()))?;

    let transform = derive_transform(pair, cache)?;
    let records = georeference_links(link_locations(index), &transform, cache)?;
    info!("{} link records georeferenced", records.len());

    Ok(GeoreferencedLinkData {
        metadata: GeoreferencingMetadata {
            control_points: pair.clone(),
            constants: transform.constants(),
        },
        records,
    })
}
