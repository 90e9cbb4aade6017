//! Records extracted from a batch of PDFs and their on-disk JSON form.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What a link annotation points at.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkTarget {
    File,
    #[serde(rename = "URI")]
    Uri,
}

/// A link annotation on an index page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Object number of the annotation inside the index PDF.
    #[serde(rename = "PDF Object ID Number")]
    pub object_id: u32,
    /// Target file name (or URI) of the link, e.g. `"1961-1-12.pdf"`.
    #[serde(rename = "Linked Image File Name")]
    pub linked_file_name: String,
    /// Link rectangle `[x1, y1, x2, y2]` in PDF user space.
    #[serde(rename = "Link Coordinates")]
    pub rect: [f64; 4],
    #[serde(rename = "File or URI?")]
    pub target: LinkTarget,
}

impl LinkRecord {
    /// Linked file name without its `.pdf` extension.
    pub fn linked_identifier(&self) -> String {
        file_identifier(&self.linked_file_name)
    }
}

/// Metadata for one index PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    #[serde(rename = "Index File Name")]
    pub file_name: String,
    #[serde(rename = "Source Relative Path")]
    pub source_path: String,
    #[serde(rename = "Links")]
    pub links: Vec<LinkRecord>,
    #[serde(rename = "Media Box")]
    pub media_box: [f64; 4],
}

/// Metadata for one image PDF and the image file extracted from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(rename = "Image File Name")]
    pub file_name: String,
    #[serde(rename = "Source Relative Path")]
    pub source_path: String,
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
    #[serde(rename = "Created Image File Name")]
    pub created_file_name: String,
}

impl ImageRecord {
    /// Image file name without its `.pdf` extension.
    pub fn identifier(&self) -> String {
        file_identifier(&self.file_name)
    }
}

/// Everything extracted from one county/year batch directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchMetadata {
    #[serde(rename = "Index Records")]
    pub index_records: Vec<IndexRecord>,
    #[serde(rename = "Image Records")]
    pub image_records: Vec<ImageRecord>,
}

impl BatchMetadata {
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path, self)
    }

    /// The batch's index record; a batch holds a single index PDF.
    pub fn index(&self) -> Result<&IndexRecord> {
        self.index_records
            .first()
            .ok_or_else(|| Error::MissingData("batch metadata has no index record".into()))
    }

    /// Total number of links across all index records.
    pub fn link_count(&self) -> usize {
        self.index_records.iter().map(|i| i.links.len()).sum()
    }
}

/// Strips a trailing `.pdf` from a file name.
///
/// # Examples
/// ```
/// # use aerialmap::model::file_identifier;
/// assert_eq!(file_identifier("1961-1-12.pdf"), "1961-1-12");
/// assert_eq!(file_identifier("notes.txt"), "notes.txt");
/// ```
pub fn file_identifier(file_name: &str) -> String {
    file_name
        .strip_suffix(".pdf")
        .unwrap_or(file_name)
        .to_string()
}

/// Reads a JSON document.
pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(serde_json::from_str(&text)?)
}

/// Writes a JSON document indented by four spaces.
pub fn write_json<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let path = path.as_ref();
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    fs::write(path, buf).map_err(|e| Error::io(path, e))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_batch() -> BatchMetadata {
        BatchMetadata {
            index_records: vec![IndexRecord {
                file_name: "Index_1961.pdf".into(),
                source_path: "input/macomb/1961/Index_1961.pdf".into(),
                links: vec![
                    LinkRecord {
                        object_id: 14,
                        linked_file_name: "1961-1-12.pdf".into(),
                        rect: [100.0, 200.0, 130.0, 210.0],
                        target: LinkTarget::File,
                    },
                    LinkRecord {
                        object_id: 15,
                        linked_file_name: "http://example.org/1961-1-13".into(),
                        rect: [140.5, 200.0, 170.5, 210.0],
                        target: LinkTarget::Uri,
                    },
                ],
                media_box: [0.0, 0.0, 612.0, 792.0],
            }],
            image_records: vec![ImageRecord {
                file_name: "1961-1-12.pdf".into(),
                source_path: "input/macomb/1961/1961-1-12.pdf".into(),
                width: 4000,
                height: 3800,
                color_space: "DeviceGray".into(),
                bits_per_component: 8,
                filter: "DCTDecode".into(),
                created_file_name: "dte_aerial_1961-1-12.jpg".into(),
            }],
        }
    }

    #[test]
    fn batch_metadata_survives_a_write_read_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macomb_1961_batch_metadata.json");
        let batch = sample_batch();
        batch.write(&path).unwrap();
        assert_eq!(BatchMetadata::read(&path).unwrap(), batch);
    }

    #[test]
    fn json_uses_collection_field_names() {
        let value = serde_json::to_value(sample_batch()).unwrap();
        let link = &value["Index Records"][0]["Links"][1];
        assert_eq!(link["PDF Object ID Number"], 15);
        assert_eq!(link["File or URI?"], "URI");
        assert_eq!(value["Image Records"][0]["ColorSpace"], "DeviceGray");
    }

    #[test]
    fn reading_a_missing_file_reports_not_found() {
        let err = BatchMetadata::read("does/not/exist.json").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn batch_without_index_is_missing_data() {
        let batch = BatchMetadata::default();
        assert!(matches!(batch.index(), Err(Error::MissingData(_))));
        assert_eq!(sample_batch().link_count(), 2);
    }
}
