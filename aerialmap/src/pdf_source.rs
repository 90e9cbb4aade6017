//! Access to the parts of a PDF page the workflow depends on: link
//! annotations on index pages and image XObjects on image pages.

use std::fs;
use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::{file_identifier, ImageRecord, IndexRecord, LinkRecord, LinkTarget};

const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// A link annotation as found on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkAnnotation {
    /// Object number of the annotation, `None` for annotations stored inline.
    pub object_id: Option<u32>,
    pub rect: [f64; 4],
    /// Target file name or URI, `None` when the annotation has no action target.
    pub target: Option<(String, LinkTarget)>,
}

/// An image XObject with its stream bytes exactly as stored in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageObject {
    /// Resource name, e.g. `Im0`.
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub color_space: String,
    pub bits_per_component: u32,
    pub filter: String,
    pub data: Vec<u8>,
}

/// The page-level view of a PDF needed for extraction.
pub trait PdfPage {
    /// Page bounds `[x1, y1, x2, y2]`.
    fn media_box(&self) -> Result<[f64; 4]>;

    /// Link annotations in page order.
    fn link_annotations(&self) -> Result<Vec<LinkAnnotation>>;

    /// Image XObjects referenced from the page resources.
    fn image_objects(&self) -> Result<Vec<ImageObject>>;
}

/// First page of a document loaded with `lopdf`.
pub struct LopdfPage<'a> {
    doc: &'a Document,
    page_id: ObjectId,
    path: PathBuf,
}

impl<'a> LopdfPage<'a> {
    /// Selects the first page, warning when the document has more than one.
    pub fn first(doc: &'a Document, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let pages = doc.get_pages();
        if pages.len() > 1 {
            warn!("more than one page ({}) in {}", pages.len(), path.display());
        }
        let page_id = *pages
            .values()
            .next()
            .ok_or_else(|| Error::pdf(&path, "document has no pages"))?;
        Ok(Self { doc, page_id, path })
    }

    fn page_dict(&self) -> Result<&'a Dictionary> {
        self.doc
            .get_dictionary(self.page_id)
            .map_err(|e| Error::pdf(&self.path, format!("page dictionary: {e}")))
    }

    fn resolve(&self, object: &'a Object) -> &'a Object {
        match object {
            Object::Reference(id) => self.doc.get_object(*id).unwrap_or(object),
            other => other,
        }
    }

    /// Looks up a page attribute, following `/Parent` for inherited keys.
    fn inherited(&self, key: &[u8]) -> Result<Option<&'a Object>> {
        let mut dict = self.page_dict()?;
        // Bounded so a cyclic /Parent chain cannot hang extraction.
        for _ in 0..32 {
            if let Ok(value) = dict.get(key) {
                return Ok(Some(self.resolve(value)));
            }
            match dict.get(b"Parent").map(|p| self.resolve(p)) {
                Ok(Object::Dictionary(parent)) => dict = parent,
                _ => return Ok(None),
            }
        }
        Ok(None)
    }

    fn action_target(&self, annot: &'a Dictionary) -> Option<(String, LinkTarget)> {
        let action = match annot.get(b"A").map(|a| self.resolve(a)) {
            Ok(Object::Dictionary(action)) => action,
            _ => return None,
        };
        if let Ok(file) = action.get(b"F") {
            let file_name = match self.resolve(file) {
                Object::Dictionary(spec) => spec
                    .get(b"UF")
                    .or_else(|_| spec.get(b"F"))
                    .ok()
                    .and_then(|f| text(self.resolve(f))),
                other => text(other),
            };
            if let Some(file_name) = file_name {
                return Some((file_name, LinkTarget::File));
            }
        }
        action
            .get(b"URI")
            .ok()
            .and_then(|uri| text(self.resolve(uri)))
            .map(|uri| (uri, LinkTarget::Uri))
    }
}

impl PdfPage for LopdfPage<'_> {
    fn media_box(&self) -> Result<[f64; 4]> {
        match self.inherited(b"MediaBox")? {
            Some(Object::Array(values)) => rect_from_array(values)
                .ok_or_else(|| Error::pdf(&self.path, "malformed /MediaBox")),
            _ => {
                warn!("no /MediaBox in {}, assuming US Letter", self.path.display());
                Ok(DEFAULT_MEDIA_BOX)
            }
        }
    }

    fn link_annotations(&self) -> Result<Vec<LinkAnnotation>> {
        let annots = match self.page_dict()?.get(b"Annots") {
            Ok(annots) => annots,
            Err(_) => return Ok(Vec::new()),
        };
        let annots = match self.resolve(annots) {
            Object::Array(annots) => annots,
            _ => return Err(Error::pdf(&self.path, "/Annots is not an array")),
        };

        let mut links = Vec::with_capacity(annots.len());
        for entry in annots {
            let object_id = match entry {
                Object::Reference((number, _)) => Some(*number),
                _ => None,
            };
            let annot = match self.resolve(entry) {
                Object::Dictionary(annot) => annot,
                _ => continue,
            };
            if !matches!(annot.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Link") {
                continue;
            }
            let rect = match annot.get(b"Rect").map(|r| self.resolve(r)) {
                Ok(Object::Array(values)) => match rect_from_array(values) {
                    Some(rect) => rect,
                    None => continue,
                },
                _ => continue,
            };
            links.push(LinkAnnotation {
                object_id,
                rect,
                target: self.action_target(annot),
            });
        }
        Ok(links)
    }

    fn image_objects(&self) -> Result<Vec<ImageObject>> {
        let resources = match self.inherited(b"Resources")? {
            Some(Object::Dictionary(resources)) => resources,
            _ => return Ok(Vec::new()),
        };
        let xobjects = match resources.get(b"XObject").map(|x| self.resolve(x)) {
            Ok(Object::Dictionary(xobjects)) => xobjects,
            _ => return Ok(Vec::new()),
        };

        let mut images = Vec::new();
        for (name, object) in xobjects.iter() {
            let stream = match self.resolve(object) {
                Object::Stream(stream) => stream,
                _ => continue,
            };
            if !matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image") {
                continue;
            }
            let dict = &stream.dict;
            images.push(ImageObject {
                name: String::from_utf8_lossy(name).into_owned(),
                width: self.integer(dict, b"Width").unwrap_or(0),
                height: self.integer(dict, b"Height").unwrap_or(0),
                color_space: self.names(dict, b"ColorSpace", true),
                bits_per_component: self.integer(dict, b"BitsPerComponent").unwrap_or(0),
                filter: self.names(dict, b"Filter", false),
                data: stream.content.clone(),
            });
        }
        Ok(images)
    }
}

impl<'a> LopdfPage<'a> {
    fn integer(&self, dict: &'a Dictionary, key: &[u8]) -> Option<u32> {
        match dict.get(key).map(|v| self.resolve(v)) {
            Ok(Object::Integer(n)) => u32::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Renders a name or an array of names. Color spaces such as
    /// `[/ICCBased 5 0 R]` are reduced to their family name.
    fn names(&self, dict: &'a Dictionary, key: &[u8], family_only: bool) -> String {
        match dict.get(key).map(|v| self.resolve(v)) {
            Ok(Object::Name(name)) => String::from_utf8_lossy(name).into_owned(),
            Ok(Object::Array(items)) => {
                let names = items.iter().filter_map(|item| match self.resolve(item) {
                    Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
                    _ => None,
                });
                if family_only {
                    names.take(1).collect()
                } else {
                    names.collect::<Vec<_>>().join(",")
                }
            }
            _ => String::new(),
        }
    }
}

/// Reals are stored as `f32`; going through their shortest decimal form
/// keeps `123.456` from widening to `123.45600128173828`.
fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(n) => Some(*n as f64),
        Object::Real(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

fn rect_from_array(values: &[Object]) -> Option<[f64; 4]> {
    if values.len() != 4 {
        return None;
    }
    let mut rect = [0.0; 4];
    for (slot, value) in rect.iter_mut().zip(values) {
        *slot = number(value)?;
    }
    Some(rect)
}

/// Decodes a PDF text string (UTF-16BE with BOM, otherwise byte-per-char).
fn text(object: &Object) -> Option<String> {
    let bytes = match object {
        Object::String(bytes, _) => bytes,
        Object::Name(bytes) => bytes,
        _ => return None,
    };
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16(&units).ok()
    } else {
        match std::str::from_utf8(bytes) {
            Ok(s) => Some(s.to_string()),
            Err(_) => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

fn load(path: &Path) -> Result<Document> {
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    Document::load(path).map_err(|e| Error::pdf(path, e.to_string()))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Builds the index record for a page.
///
/// Links are sorted by linked file name. Annotations without a target or
/// without an object number are logged and skipped.
pub fn index_record_from_page(
    page: &impl PdfPage,
    file_name: &str,
    source_path: &str,
) -> Result<IndexRecord> {
    let mut links = Vec::new();
    for annot in page.link_annotations()? {
        let Some((linked_file_name, target)) = annot.target else {
            warn!("link annotation {:?} in {file_name} has no action target", annot.object_id);
            continue;
        };
        let Some(object_id) = annot.object_id else {
            warn!("inline link annotation to {linked_file_name} in {file_name} has no object number");
            continue;
        };
        if target == LinkTarget::Uri {
            warn!("link {object_id} in {file_name} points at a URI, possibly a broken link");
        }
        links.push(LinkRecord {
            object_id,
            linked_file_name,
            rect: annot.rect,
            target,
        });
    }
    links.sort_by(|a, b| a.linked_file_name.cmp(&b.linked_file_name));
    info!("{} links identified in {file_name}", links.len());

    Ok(IndexRecord {
        file_name: file_name.to_string(),
        source_path: source_path.to_string(),
        links,
        media_box: page.media_box()?,
    })
}

/// Parses the links of an index PDF.
pub fn extract_index(path: impl AsRef<Path>) -> Result<IndexRecord> {
    let path = path.as_ref();
    let file_name = file_name_of(path);
    info!("index: {file_name}");
    let doc = load(path)?;
    let page = LopdfPage::first(&doc, path)?;
    index_record_from_page(&page, &file_name, &path.to_string_lossy())
}

/// File extension for raw image stream bytes, from their magic bytes.
///
/// # Examples
/// ```
/// # use aerialmap::pdf_source::image_extension;
/// assert_eq!(image_extension(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10]), "jpg");
/// assert_eq!(image_extension(b"not an image"), "bin");
/// ```
pub fn image_extension(data: &[u8]) -> &'static str {
    image::guess_format(data)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin")
}

/// Writes the page's image stream to `output_dir` and describes it.
///
/// The first image XObject is used. The file is named
/// `<prefix><identifier>.<ext>`, with the extension chosen from the stream's
/// magic bytes; data is never decoded or re-encoded.
pub fn image_record_from_page(
    page: &impl PdfPage,
    file_name: &str,
    source_path: &str,
    output_dir: &Path,
    prefix: &str,
) -> Result<ImageRecord> {
    let mut images = page.image_objects()?;
    if images.len() > 1 {
        warn!("more than one image ({}) in {file_name}", images.len());
    }
    if images.is_empty() {
        return Err(Error::pdf(file_name, "no image XObject on page"));
    }
    let image = images.swap_remove(0);

    let extension = image_extension(&image.data);
    if extension == "bin" {
        warn!(
            "image {} in {file_name} is not a recognizable image file (filter {:?})",
            image.name, image.filter
        );
    }
    let created_file_name = format!("{prefix}{}.{extension}", file_identifier(file_name));
    let output_path = output_dir.join(&created_file_name);
    fs::write(&output_path, &image.data).map_err(|e| Error::io(&output_path, e))?;

    Ok(ImageRecord {
        file_name: file_name.to_string(),
        source_path: source_path.to_string(),
        width: image.width,
        height: image.height,
        color_space: image.color_space,
        bits_per_component: image.bits_per_component,
        filter: image.filter,
        created_file_name,
    })
}

/// Extracts the image of an image PDF into `output_dir`.
pub fn extract_image(path: impl AsRef<Path>, output_dir: &Path, prefix: &str) -> Result<ImageRecord> {
    let path = path.as_ref();
    let file_name = file_name_of(path);
    info!("image: {file_name}");
    let doc = load(path)?;
    let page = LopdfPage::first(&doc, path)?;
    image_record_from_page(&page, &file_name, &path.to_string_lossy(), output_dir, prefix)
}
