//! Memoized geocoding.
//!
//! Every answer from the external geocoder is kept in a JSON object keyed by
//! the literal query string and written back to disk after each miss, so a
//! batch can be re-run without touching the network again.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use nalgebra::Point2;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// An external geocoding service.
pub trait Geocoder {
    /// Converts a single-line street address into candidate locations.
    fn geocode(&mut self, address: &str) -> Result<Value>;

    /// Converts a `(longitude, latitude)` pair into an address description.
    fn reverse_geocode(&mut self, longitude: f64, latitude: f64) -> Result<Value>;
}

impl<G: Geocoder + ?Sized> Geocoder for Box<G> {
    fn geocode(&mut self, address: &str) -> Result<Value> {
        (**self).geocode(address)
    }

    fn reverse_geocode(&mut self, longitude: f64, latitude: f64) -> Result<Value> {
        (**self).reverse_geocode(longitude, latitude)
    }
}

/// Append-only cache in front of a [`Geocoder`], persisted as a JSON object.
#[derive(Debug)]
pub struct GeocodeCache<G> {
    path: PathBuf,
    entries: BTreeMap<String, Value>,
    geocoder: G,
}

impl<G: Geocoder> GeocodeCache<G> {
    /// Opens the cache stored at `path`.
    ///
    /// A missing file yields an empty cache. Unreadable or malformed files
    /// are errors.
    pub fn open(path: impl Into<PathBuf>, geocoder: G) -> Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no geocoding cache at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(Error::io(&path, e)),
        };
        Ok(Self {
            path,
            entries,
            geocoder,
        })
    }

    /// Forward lookup keyed by the literal address string.
    pub fn lookup_address(&mut self, address: &str) -> Result<&Value> {
        if !self.entries.contains_key(address) {
            info!("fetching new geocoding data for {address:?}");
            let data = self.geocoder.geocode(address)?;
            self.insert_and_save(address.to_string(), data)?;
        } else {
            debug!("geocoding cache hit for {address:?}");
        }
        self.get(address)
    }

    /// Reverse lookup keyed by `"<longitude>, <latitude>"`.
    pub fn lookup_coordinates(&mut self, longitude: f64, latitude: f64) -> Result<&Value> {
        let key = coordinate_key(longitude, latitude);
        if !self.entries.contains_key(&key) {
            info!("fetching new reverse geocoding data for {key}");
            let data = self.geocoder.reverse_geocode(longitude, latitude)?;
            self.insert_and_save(key.clone(), data)?;
        } else {
            debug!("reverse geocoding cache hit for {key}");
        }
        self.get(&key)
    }

    fn get(&self, key: &str) -> Result<&Value> {
        self.entries
            .get(key)
            .ok_or_else(|| Error::geocode(key, "entry vanished from cache"))
    }

    fn insert_and_save(&mut self, key: String, data: Value) -> Result<()> {
        self.entries.insert(key, data);
        self.save()
    }

    /// Writes the whole cache to disk through a temporary file.
    pub fn save(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.entries)?;
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path).map_err(|e| Error::io(&tmp_path, e))?;
            file.write_all(text.as_bytes())
                .map_err(|e| Error::io(&tmp_path, e))?;
            file.sync_all().map_err(|e| Error::io(&tmp_path, e))?;
        }
        fs::rename(&tmp_path, &self.path).map_err(|e| Error::io(&self.path, e))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gives back the wrapped geocoder.
    pub fn into_inner(self) -> G {
        self.geocoder
    }
}

/// Cache key for a reverse lookup.
///
/// Whole numbers keep a trailing `.0` so keys written by earlier runs of the
/// collection's scripts are found again.
///
/// # Examples
/// ```
/// # use aerialmap::geocode::coordinate_key;
/// assert_eq!(coordinate_key(-83.05, 42.5), "-83.05, 42.5");
/// assert_eq!(coordinate_key(-83.0, 42.0), "-83.0, 42.0");
/// ```
pub fn coordinate_key(longitude: f64, latitude: f64) -> String {
    format!("{}, {}", key_number(longitude), key_number(latitude))
}

fn key_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Reads `(longitude, latitude)` of the best candidate in a forward response.
///
/// Candidates are expected in score order, as the geocoder returns them.
pub fn best_location(response: &Value) -> Option<Point2<f64>> {
    let location = response.get(0)?.get("location")?;
    let x = location.get("x")?.as_f64()?;
    let y = location.get("y")?.as_f64()?;
    Some(Point2::new(x, y))
}

/// Reads the county (`address.Subregion`) from a reverse response.
pub fn county_name(response: &Value) -> Option<String> {
    response
        .get("address")?
        .get("Subregion")?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Answers every query with a fixed location and counts the calls.
    #[derive(Debug, Default)]
    pub(crate) struct CountingGeocoder {
        pub forward_calls: usize,
        pub reverse_calls: usize,
        pub locations: BTreeMap<String, (f64, f64)>,
        pub county: String,
    }

    impl CountingGeocoder {
        pub(crate) fn with_locations(entries: &[(&str, (f64, f64))], county: &str) -> Self {
            Self {
                locations: entries.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                county: county.to_string(),
                ..Default::default()
            }
        }
    }

    impl Geocoder for CountingGeocoder {
        fn geocode(&mut self, address: &str) -> Result<Value> {
            self.forward_calls += 1;
            Ok(match self.locations.get(address) {
                Some((x, y)) => json!([{ "address": address, "location": { "x": x, "y": y }, "score": 100 }]),
                None => json!([]),
            })
        }

        fn reverse_geocode(&mut self, longitude: f64, latitude: f64) -> Result<Value> {
            self.reverse_calls += 1;
            Ok(json!({
                "address": { "Subregion": self.county },
                "location": { "x": longitude, "y": latitude }
            }))
        }
    }

    #[test]
    fn repeated_lookups_hit_the_service_once() {
        let dir = tempfile::tempdir().unwrap();
        let geocoder = CountingGeocoder::with_locations(&[("1 Main St", (-83.0, 42.5))], "Wayne");
        let mut cache = GeocodeCache::open(dir.path().join("cache.json"), geocoder).unwrap();
        assert!(cache.is_empty());

        for _ in 0..3 {
            let value = cache.lookup_address("1 Main St").unwrap();
            assert_eq!(best_location(value), Some(Point2::new(-83.0, 42.5)));
            let value = cache.lookup_coordinates(-83.0, 42.5).unwrap();
            assert_eq!(county_name(value).as_deref(), Some("Wayne"));
        }

        assert_eq!(cache.len(), 2);
        let geocoder = cache.into_inner();
        assert_eq!(geocoder.forward_calls, 1);
        assert_eq!(geocoder.reverse_calls, 1);
    }

    #[test]
    fn misses_are_persisted_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let geocoder = CountingGeocoder::with_locations(&[("2 Oak Ave", (-82.9, 42.6))], "Macomb");
        let mut cache = GeocodeCache::open(&path, geocoder).unwrap();
        cache.lookup_address("2 Oak Ave").unwrap();

        let reopened = GeocodeCache::open(&path, CountingGeocoder::default()).unwrap();
        assert!(reopened.contains("2 Oak Ave"));

        let mut reopened = reopened;
        reopened.lookup_address("2 Oak Ave").unwrap();
        assert_eq!(reopened.into_inner().forward_calls, 0);
    }

    #[test]
    fn whole_number_coordinates_reuse_existing_keys() {
        assert_eq!(coordinate_key(-83.0, 42.0), "-83.0, 42.0");
        assert_eq!(coordinate_key(-83.25, 42.0), "-83.25, 42.0");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, r#"{ "-83.0, 42.0": { "address": { "Subregion": "Wayne County" } } }"#).unwrap();
        let mut cache = GeocodeCache::open(&path, CountingGeocoder::default()).unwrap();
        let value = cache.lookup_coordinates(-83.0, 42.0).unwrap();
        assert_eq!(county_name(value).as_deref(), Some("Wayne County"));
        assert_eq!(cache.into_inner().reverse_calls, 0);
    }

    #[test]
    fn malformed_cache_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();
        let err = GeocodeCache::open(&path, CountingGeocoder::default()).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn response_helpers_tolerate_missing_fields() {
        assert_eq!(best_location(&json!([])), None);
        assert_eq!(best_location(&json!([{ "location": { "x": 1.0 } }])), None);
        assert_eq!(county_name(&json!({ "address": {} })), None);
        assert_eq!(county_name(&json!({ "address": { "Subregion": "" } })), None);
    }
}
