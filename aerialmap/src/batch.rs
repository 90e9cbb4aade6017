//! Collecting the PDFs of a county/year batch and extracting their metadata.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{read_json, write_json, BatchMetadata};
use crate::pdf_source::{extract_image, extract_index};

fn is_pdf(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "pdf")
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    fs::read_dir(dir)
        .map_err(|e| Error::io(dir, e))?
        .map(|entry| entry.map(|e| e.path()).map_err(|e| Error::io(dir, e)))
        .collect()
}

/// The PDF files directly inside `dir`, sorted by path.
///
/// Anything that is not a `.pdf` file is logged and ignored.
pub fn collect_pdf_paths(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut paths = Vec::new();
    for path in read_dir(dir)? {
        if path.is_file() && is_pdf(&path) {
            paths.push(path);
        } else {
            info!("skipping non-PDF entry {}", path.display());
        }
    }
    paths.sort();
    info!("{} PDF files found in {}", paths.len(), dir.display());
    Ok(paths)
}

/// Every PDF file below `root`, as sorted absolute paths.
pub fn collect_pdf_paths_recursive(root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    let root = fs::canonicalize(root).map_err(|e| Error::io(root, e))?;
    let mut pending = vec![root];
    let mut paths = Vec::new();
    while let Some(dir) = pending.pop() {
        for path in read_dir(&dir)? {
            if path.is_dir() {
                pending.push(path);
            } else if is_pdf(&path) {
                paths.push(path);
            }
        }
    }
    paths.sort();
    Ok(paths)
}

/// Persisted list of every PDF in a collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathCache {
    pub master_list: Vec<PathBuf>,
}

impl PathCache {
    /// Loads the cache at `cache_path`, or walks `root` and writes a new one
    /// if there is none yet.
    pub fn load_or_build(cache_path: impl AsRef<Path>, root: impl AsRef<Path>) -> Result<Self> {
        let cache_path = cache_path.as_ref();
        match read_json::<PathCache>(cache_path) {
            Ok(cache) => {
                debug!("{} paths loaded from {}", cache.master_list.len(), cache_path.display());
                Ok(cache)
            }
            Err(Error::NotFound(_)) => {
                let cache = PathCache {
                    master_list: collect_pdf_paths_recursive(root)?,
                };
                write_json(cache_path, &cache)?;
                info!("{} paths written to {}", cache.master_list.len(), cache_path.display());
                Ok(cache)
            }
            Err(e) => Err(e),
        }
    }
}

/// `true` for the index PDF of a batch. Only the file name is inspected, so
/// directories named after indexes do not count.
///
/// # Examples
/// ```
/// # use aerialmap::batch::is_index_path;
/// assert!(is_index_path("input/macomb/1961/Index_1961.pdf"));
/// assert!(!is_index_path("input/macomb/1961/1961-1-12.pdf"));
/// assert!(!is_index_path("Index_Scans/macomb/1961/1961-1-12.pdf"));
/// ```
pub fn is_index_path(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .file_name()
        .map_or(false, |name| name.to_string_lossy().contains("Index"))
}

/// Extracts the index links and the images of every PDF in `paths`.
///
/// Images are written to `image_dir`, which is created if needed.
pub fn run_extraction(paths: &[PathBuf], image_dir: &Path, prefix: &str) -> Result<BatchMetadata> {
    fs::create_dir_all(image_dir).map_err(|e| Error::io(image_dir, e))?;
    let mut batch = BatchMetadata::default();
    for path in paths {
        if is_index_path(path) {
            batch.index_records.push(extract_index(path)?);
        } else {
            batch.image_records.push(extract_image(path, image_dir, prefix)?);
        }
    }
    match batch.index_records.len() {
        0 => warn!("no index PDF found among {} files", paths.len()),
        1 => {}
        n => warn!("{n} index PDFs found, only the first is georeferenced"),
    }
    info!(
        "{} images extracted, {} links identified",
        batch.image_records.len(),
        batch.link_count()
    );
    Ok(batch)
}

/// `<county>_<year>` from the last two components of a batch directory.
///
/// # Examples
/// ```
/// # use aerialmap::batch::county_year_combo;
/// assert_eq!(county_year_combo("input/macomb/1961").unwrap(), "macomb_1961");
/// ```
pub fn county_year_combo(batch_dir: impl AsRef<Path>) -> Result<String> {
    let batch_dir = batch_dir.as_ref();
    let mut names = batch_dir
        .components()
        .rev()
        .filter_map(|c| c.as_os_str().to_str())
        .filter(|name| !name.is_empty() && *name != "." && *name != "/");
    match (names.next(), names.next()) {
        (Some(year), Some(county)) => Ok(format!("{county}_{year}")),
        _ => Err(Error::MissingData(format!(
            "batch directory {} is not of the form <county>/<year>",
            batch_dir.display()
        ))),
    }
}

/// The PDF version from a file's `%PDF-x.y` header.
pub fn pdf_version(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut header = [0u8; 16];
    let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
    let len = file.read(&mut header).map_err(|e| Error::io(path, e))?;
    let header = String::from_utf8_lossy(&header[..len]);
    header
        .strip_prefix("%PDF-")
        .and_then(|rest| rest.split_whitespace().next())
        .filter(|version| !version.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::pdf(path, "missing %PDF- header"))
}

/// Number of files per PDF version. Files without a readable header are
/// counted under `"unknown"`.
pub fn version_report(paths: &[PathBuf]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for path in paths {
        let version = pdf_version(path).unwrap_or_else(|e| {
            warn!("{e}");
            "unknown".to_string()
        });
        *counts.entry(version).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf_source::tests::{image_pdf, index_pdf, JPEG_BYTES};

    fn batch_dir(root: &Path) -> PathBuf {
        let dir = root.join("macomb").join("1961");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Index_1961.pdf"), index_pdf()).unwrap();
        fs::write(dir.join("1961-1-12.pdf"), image_pdf()).unwrap();
        fs::write(dir.join("1961-1-13.pdf"), image_pdf()).unwrap();
        fs::write(dir.join("notes.txt"), "scanned 2019").unwrap();
        dir
    }

    #[test]
    fn only_pdfs_are_collected_in_order() {
        let root = tempfile::tempdir().unwrap();
        let dir = batch_dir(root.path());
        let names: Vec<_> = collect_pdf_paths(&dir)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["1961-1-12.pdf", "1961-1-13.pdf", "Index_1961.pdf"]);
    }

    #[test]
    fn extraction_splits_index_and_images() {
        let root = tempfile::tempdir().unwrap();
        let dir = batch_dir(root.path());
        let image_dir = root.path().join("images");
        let paths = collect_pdf_paths(&dir).unwrap();
        let batch = run_extraction(&paths, &image_dir, "dte_aerial_").unwrap();

        assert_eq!(batch.index_records.len(), 1);
        assert_eq!(batch.image_records.len(), 2);
        assert_eq!(batch.link_count(), 3);
        let written = fs::read(image_dir.join("dte_aerial_1961-1-13.jpg")).unwrap();
        assert_eq!(written, JPEG_BYTES);
    }

    #[test]
    fn index_named_parent_directories_do_not_make_indexes() {
        let root = tempfile::tempdir().unwrap();
        let dir = batch_dir(&root.path().join("Index_Scans"));
        let paths = collect_pdf_paths(&dir).unwrap();
        let batch = run_extraction(&paths, &root.path().join("images"), "dte_aerial_").unwrap();

        assert_eq!(batch.index_records.len(), 1);
        assert_eq!(batch.index_records[0].file_name, "Index_1961.pdf");
        assert_eq!(batch.image_records.len(), 2);
    }

    #[test]
    fn path_cache_is_built_once() {
        let root = tempfile::tempdir().unwrap();
        batch_dir(root.path());
        let cache_path = root.path().join("pdf_path_cache.json");

        let built = PathCache::load_or_build(&cache_path, root.path()).unwrap();
        assert_eq!(built.master_list.len(), 3);
        assert!(built.master_list.iter().all(|p| p.is_absolute()));

        fs::write(root.path().join("macomb").join("1961").join("1961-2-1.pdf"), image_pdf()).unwrap();
        let loaded = PathCache::load_or_build(&cache_path, root.path()).unwrap();
        assert_eq!(loaded, built);
    }

    #[test]
    fn combo_needs_two_components() {
        assert_eq!(county_year_combo("/data/input/wayne/1949/").unwrap(), "wayne_1949");
        assert!(matches!(county_year_combo("1949"), Err(Error::MissingData(_))));
    }

    #[test]
    fn versions_are_read_from_the_header() {
        let root = tempfile::tempdir().unwrap();
        let dir = batch_dir(root.path());
        let broken = dir.join("broken.pdf");
        fs::write(&broken, "not a pdf").unwrap();

        assert_eq!(pdf_version(dir.join("Index_1961.pdf")).unwrap(), "1.5");
        assert!(matches!(pdf_version(&broken), Err(Error::Pdf { .. })));

        let report = version_report(&collect_pdf_paths(&dir).unwrap());
        assert_eq!(report["1.5"], 3);
        assert_eq!(report["unknown"], 1);
    }
}
