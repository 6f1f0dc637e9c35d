//! OPF package document: manifest and spine.

use std::collections::HashMap;

use log::error;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Error, Result};

use super::local_name;

#[derive(Debug, Clone)]
pub struct ManifestItem {
    pub href: String,
    pub media_type: String,
}

/// Parsed package document. The spine stores manifest ids rather than
/// references into the map, so manifest growth cannot invalidate it.
#[derive(Debug, Clone)]
pub struct Opf {
    /// Directory of the OPF inside the archive, trailing `/` or empty.
    base_path: String,
    manifest: HashMap<String, ManifestItem>,
    spine: Vec<String>,
}

/// Directory prefix of `path`, keeping the trailing `/`; empty when the
/// path has no directory part.
fn extract_path(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => path[..=idx].to_string(),
        None => String::new(),
    }
}

impl Opf {
    /// Parse the package document found at `opf_path` in the archive.
    ///
    /// Spine entries whose idref has no manifest item are logged and
    /// skipped. The dc:title and dc:creator element values are not
    /// collected; nothing downstream reads them.
    pub fn parse(opf_path: &str, content: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(content);
        reader.config_mut().trim_text(true);

        let mut manifest: HashMap<String, ManifestItem> = HashMap::new();
        let mut spine_idrefs: Vec<String> = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Empty(e)) | Ok(Event::Start(e)) => {
                    match local_name(e.name().as_ref()) {
                        b"item" => {
                            let mut id = String::new();
                            let mut href = String::new();
                            let mut media_type = String::new();
                            for attr in e.attributes().flatten() {
                                match attr.key.as_ref() {
                                    b"id" => id = String::from_utf8(attr.value.to_vec())?,
                                    b"href" => href = String::from_utf8(attr.value.to_vec())?,
                                    b"media-type" => {
                                        media_type = String::from_utf8(attr.value.to_vec())?
                                    }
                                    _ => {}
                                }
                            }
                            if !id.is_empty() {
                                manifest.insert(id, ManifestItem { href, media_type });
                            }
                        }
                        b"itemref" => {
                            for attr in e.attributes().flatten() {
                                if attr.key.as_ref() == b"idref" {
                                    spine_idrefs.push(String::from_utf8(attr.value.to_vec())?);
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    error!("failed to parse OPF {opf_path}: {e}");
                    return Err(Error::Xml(e));
                }
                _ => {}
            }
        }

        // Resolve the spine once the whole manifest is known.
        let mut spine = Vec::with_capacity(spine_idrefs.len());
        for idref in spine_idrefs {
            if manifest.contains_key(&idref) {
                spine.push(idref);
            } else {
                error!("spine idref not found in manifest: {idref}");
            }
        }

        Ok(Self {
            base_path: extract_path(opf_path),
            manifest,
            spine,
        })
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Prepend the OPF's directory to a manifest-relative href.
    pub fn full_path(&self, file_name: &str) -> String {
        format!("{}{}", self.base_path, file_name)
    }

    pub fn spine_count(&self) -> usize {
        self.spine.len()
    }

    /// Manifest item referenced by spine position `idx`.
    pub fn spine_item(&self, idx: usize) -> Option<&ManifestItem> {
        self.spine.get(idx).and_then(|id| self.manifest.get(id))
    }

    /// Spine position of the item with the given href.
    pub fn spine_idx(&self, href: &str) -> Option<usize> {
        self.spine
            .iter()
            .position(|id| self.manifest.get(id).is_some_and(|item| item.href == href))
    }

    pub fn manifest(&self) -> &HashMap<String, ManifestItem> {
        &self.manifest
    }

    pub fn manifest_exists(&self, id: &str) -> bool {
        self.manifest.contains_key(id)
    }

    pub fn href_by_id(&self, id: &str) -> Option<&str> {
        self.manifest.get(id).map(|item| item.href.as_str())
    }

    pub fn id_by_href(&self, href: &str) -> Option<&str> {
        self.manifest
            .iter()
            .find(|(_, item)| item.href == href)
            .map(|(id, _)| id.as_str())
    }
}
