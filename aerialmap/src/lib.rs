//! # AerialMap Library
//!
//! The `aerialmap` library turns a county/year batch of scanned aerial
//! photograph PDFs into georeferenced image metadata. Each batch holds one
//! index PDF, a map whose link annotations point at the photo PDFs, and the
//! photo PDFs themselves. Link positions on the index are converted to
//! longitude/latitude with a transform anchored by two geocoded street
//! addresses, and every extracted image is matched to its link.
//!
//! ## Overview of Modules
//!
//! - **`affine_transform`**: Per-axis linear mapping from index page
//!   coordinates to geocoordinates, derived from two control points.
//!
//! - **`geocode`**: The `Geocoder` trait and a persistent, append-only cache
//!   of forward and reverse geocoding responses.
//!
//! - **`arcgis`**: A `Geocoder` backed by the ArcGIS World Geocoding REST API.
//!
//! - **`pdf_source`**: Reads link annotations and image XObjects from PDF
//!   pages with `lopdf`, and writes embedded image streams to disk.
//!
//! - **`model`**: Index, link, image and batch records with their JSON form.
//!
//! - **`batch`**: Collects the PDFs of a batch and extracts their metadata.
//!
//! - **`overrides`**: CSV inputs kept by hand: control-point address pairs,
//!   manual image/link pairs and visually located images.
//!
//! - **`georeference`**: Places every link of an index on the map.
//!
//! - **`matcher`**: Pairs extracted images with georeferenced links and
//!   reports what could not be paired.
//!
//! - **`records`**: Full per-image records and their GeoJSON crosswalk.
//!
//! - **`config`** and **`workflow`**: Settings and the end-to-end batch run.

pub mod affine_transform;
pub mod arcgis;
pub mod batch;
pub mod config;
pub mod error;
pub mod geocode;
pub mod georeference;
pub mod matcher;
pub mod model;
pub mod overrides;
pub mod pdf_source;
pub mod records;
pub mod workflow;

pub use error::{Error, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
