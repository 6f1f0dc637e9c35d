//! EPUB container access.
//!
//! An EPUB is a ZIP archive holding an OCF entry point
//! (`META-INF/container.xml`), an OPF package document (manifest +
//! spine), and the XHTML content files the spine points at. `EpubFile`
//! resolves that chain and hands out parsed content documents through a
//! one-slot cache.

pub mod container;
pub mod opf;
pub mod xhtml;

use std::path::Path;

use log::warn;

use crate::error::{Error, Result};
use crate::zip::Unzipper;

pub use opf::{ManifestItem, Opf};
pub use xhtml::{TextSpan, XhtmlDoc};

pub const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";

/// Extract local name from a potentially namespaced XML name.
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

struct CachedDoc {
    full_path: String,
    doc: XhtmlDoc,
}

/// An opened EPUB publication.
pub struct EpubFile {
    unzipper: Unzipper,
    opf: Opf,
    cache: Option<CachedDoc>,
}

impl EpubFile {
    /// Open the archive, resolve `container.xml`, and parse the OPF.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut unzipper = Unzipper::open(path)?;

        let container_buf = read_member(&mut unzipper, "META-INF/container.xml")?;
        let rootfiles = container::rootfile_paths(&container_buf)?;
        let opf_path = match rootfiles.first() {
            Some(path) => path.clone(),
            None => {
                return Err(Error::InvalidEpub(
                    "no rootfile found in container.xml".into(),
                ));
            }
        };
        if rootfiles.len() > 1 {
            warn!("multiple rootfile paths found, using {opf_path}");
        }

        let opf_buf = read_member(&mut unzipper, &opf_path)?;
        let opf = Opf::parse(&opf_path, &opf_buf)?;

        Ok(Self {
            unzipper,
            opf,
            cache: None,
        })
    }

    pub fn opf(&self) -> &Opf {
        &self.opf
    }

    pub fn spine_count(&self) -> usize {
        self.opf.spine_count()
    }

    pub fn spine_item(&self, idx: usize) -> Option<&ManifestItem> {
        self.opf.spine_item(idx)
    }

    pub fn spine_idx(&self, href: &str) -> Option<usize> {
        self.opf.spine_idx(href)
    }

    pub fn manifest(&self) -> &std::collections::HashMap<String, ManifestItem> {
        self.opf.manifest()
    }

    pub fn href_by_id(&self, id: &str) -> Option<&str> {
        self.opf.href_by_id(id)
    }

    pub fn id_by_href(&self, href: &str) -> Option<&str> {
        self.opf.id_by_href(href)
    }

    pub fn full_path(&self, file_name: &str) -> String {
        self.opf.full_path(file_name)
    }

    /// Extract an archive member by its complete path. The returned
    /// buffer carries the reader's trailing NUL sentinel.
    pub fn file(&mut self, complete_path: &str) -> Result<Vec<u8>> {
        read_member(&mut self.unzipper, complete_path)
    }

    /// Parsed content document for a manifest href.
    ///
    /// At most one document is kept parsed; requesting a different path
    /// discards the previous buffer and index before loading the next.
    /// Extraction failures propagate; they abort a spine scan.
    pub fn xhtml_file(&mut self, href: &str) -> Result<&XhtmlDoc> {
        let full_path = self.opf.full_path(href);

        if !self
            .cache
            .as_ref()
            .is_some_and(|cached| cached.full_path == full_path)
        {
            self.cache = None;
            let buffer = read_member(&mut self.unzipper, &full_path)?;
            let doc = XhtmlDoc::parse(buffer)?;
            self.cache = Some(CachedDoc { full_path, doc });
        }

        match &self.cache {
            Some(cached) => Ok(&cached.doc),
            None => Err(Error::InvalidEpub("content document cache is empty".into())),
        }
    }

    /// Uncompressed size of a spine item, probed without extraction.
    pub fn uncompressed_size(&mut self, spine_idx: usize) -> Result<u32> {
        let href = match self.opf.spine_item(spine_idx) {
            Some(item) => item.href.clone(),
            None => {
                return Err(Error::InvalidEpub(format!(
                    "spine index {spine_idx} out of range"
                )));
            }
        };
        let full_path = self.opf.full_path(&href);
        self.unzipper.open_file(&full_path)?;
        let size = self.unzipper.file_size();
        self.unzipper.close_file();
        Ok(size)
    }

    /// Resolve `file_name` relative to the directory of a spine item.
    pub fn relative_file_path(&self, file_name: &str, spine_idx: usize) -> Option<String> {
        let item = self.opf.spine_item(spine_idx)?;
        let item_path = self.opf.full_path(&item.href);
        let dir = match item_path.rfind('/') {
            Some(idx) => &item_path[..=idx],
            None => "",
        };
        Some(format!("{dir}{file_name}"))
    }

    /// Byte offset in the file of the text at `char_offset`, counting
    /// text-node bytes under `<html><body>` in document order.
    pub fn file_offset_at_char_offset(&mut self, href: &str, char_offset: u32) -> Result<u32> {
        let doc = self.xhtml_file(href)?;
        let mut running = 0u32;
        for span in doc.body_spans() {
            let len = span.len as u32;
            if running + len > char_offset {
                return Ok(span.start as u32 + (char_offset - running));
            }
            running += len;
        }
        Ok(0)
    }

    /// Inverse of [`Self::file_offset_at_char_offset`]: cumulative text
    /// length at a byte offset in the file, clamped within the node.
    pub fn char_offset_at_file_offset(&mut self, href: &str, file_offset: u32) -> Result<u32> {
        let doc = self.xhtml_file(href)?;
        let mut char_offset = 0u32;
        for span in doc.body_spans() {
            let len = span.len as u32;
            let node_offset = span.start as u32;
            if node_offset + len >= file_offset {
                return Ok(char_offset + file_offset.saturating_sub(node_offset));
            }
            char_offset += len;
        }
        Ok(char_offset)
    }
}

fn read_member(unzipper: &mut Unzipper, path: &str) -> Result<Vec<u8>> {
    unzipper.open_file(path)?;
    let size = unzipper.file_size() as usize;
    let mut buffer = vec![0u8; size];
    let read = unzipper.read_file(&mut buffer);
    unzipper.close_file();
    read?;
    Ok(buffer)
}
