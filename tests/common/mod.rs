//! Shared fixture builders for the integration tests.
//!
//! The tests construct their own archives rather than shipping binary
//! fixtures: a minimal ZIP writer (store and deflate), a miniature EPUB
//! assembler, and GNU Unifont hex-line formatters.

#![allow(dead_code)]

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};

const METHOD_STORE: u16 = 0;
const METHOD_DEFLATE: u16 = 8;

/// Builds a ZIP archive byte-by-byte: local headers with member data,
/// then the central directory and the end record.
pub struct ZipBuilder {
    out: Vec<u8>,
    central: Vec<u8>,
    count: u16,
}

impl Default for ZipBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self {
            out: Vec::new(),
            central: Vec::new(),
            count: 0,
        }
    }

    pub fn add_stored(&mut self, name: &str, data: &[u8]) {
        self.add(name, data, false);
    }

    pub fn add_deflated(&mut self, name: &str, data: &[u8]) {
        self.add(name, data, true);
    }

    fn add(&mut self, name: &str, data: &[u8], deflate: bool) {
        let mut crc = Crc::new();
        crc.update(data);
        let crc = crc.sum();

        let (method, payload) = if deflate {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data).unwrap();
            (METHOD_DEFLATE, encoder.finish().unwrap())
        } else {
            (METHOD_STORE, data.to_vec())
        };

        let header_offset = self.out.len() as u32;

        // Local file header.
        self.out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
        self.out.extend_from_slice(&20u16.to_le_bytes()); // version needed
        self.out.extend_from_slice(&0u16.to_le_bytes()); // flags
        self.out.extend_from_slice(&method.to_le_bytes());
        self.out.extend_from_slice(&0u16.to_le_bytes()); // mod time
        self.out.extend_from_slice(&0u16.to_le_bytes()); // mod date
        self.out.extend_from_slice(&crc.to_le_bytes());
        self.out
            .extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.out
            .extend_from_slice(&(data.len() as u32).to_le_bytes());
        self.out
            .extend_from_slice(&(name.len() as u16).to_le_bytes());
        self.out.extend_from_slice(&0u16.to_le_bytes()); // extra len
        self.out.extend_from_slice(name.as_bytes());
        self.out.extend_from_slice(&payload);

        // Central directory file header.
        self.central
            .extend_from_slice(&0x0201_4b50u32.to_le_bytes());
        self.central.extend_from_slice(&20u16.to_le_bytes()); // made by
        self.central.extend_from_slice(&20u16.to_le_bytes()); // needed
        self.central.extend_from_slice(&0u16.to_le_bytes()); // flags
        self.central.extend_from_slice(&method.to_le_bytes());
        self.central.extend_from_slice(&0u16.to_le_bytes()); // mod time
        self.central.extend_from_slice(&0u16.to_le_bytes()); // mod date
        self.central.extend_from_slice(&crc.to_le_bytes());
        self.central
            .extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.central
            .extend_from_slice(&(data.len() as u32).to_le_bytes());
        self.central
            .extend_from_slice(&(name.len() as u16).to_le_bytes());
        self.central.extend_from_slice(&0u16.to_le_bytes()); // extra len
        self.central.extend_from_slice(&0u16.to_le_bytes()); // comment len
        self.central.extend_from_slice(&0u16.to_le_bytes()); // disk start
        self.central.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
        self.central.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        self.central.extend_from_slice(&header_offset.to_le_bytes());
        self.central.extend_from_slice(name.as_bytes());

        self.count += 1;
    }

    pub fn finish(self) -> Vec<u8> {
        self.finish_with_comment("")
    }

    pub fn finish_with_comment(mut self, comment: &str) -> Vec<u8> {
        let cd_offset = self.out.len() as u32;
        let cd_size = self.central.len() as u32;
        self.out.extend_from_slice(&self.central);

        self.out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
        self.out.extend_from_slice(&0u16.to_le_bytes()); // this disk
        self.out.extend_from_slice(&0u16.to_le_bytes()); // cd disk
        self.out.extend_from_slice(&self.count.to_le_bytes());
        self.out.extend_from_slice(&self.count.to_le_bytes());
        self.out.extend_from_slice(&cd_size.to_le_bytes());
        self.out.extend_from_slice(&cd_offset.to_le_bytes());
        self.out
            .extend_from_slice(&(comment.len() as u16).to_le_bytes());
        self.out.extend_from_slice(comment.as_bytes());

        self.out
    }
}

/// Wrap a body fragment in the XHTML skeleton the fixtures use.
pub fn xhtml_document(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<html xmlns=\"http://www.w3.org/1999/xhtml\"><body>{body}</body></html>"
    )
}

/// Assemble a miniature EPUB from complete content documents:
/// `container.xml` pointing at `OEBPS/content.opf`, one manifest item +
/// spine entry per document. Documents are stored deflated so the
/// extraction path is exercised.
pub fn epub_with_documents(documents: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = ZipBuilder::new();
    zip.add_stored("mimetype", b"application/epub+zip");
    zip.add_stored(
        "META-INF/container.xml",
        br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#,
    );

    let mut manifest = String::new();
    let mut spine = String::new();
    for (idx, (href, _)) in documents.iter().enumerate() {
        manifest.push_str(&format!(
            "    <item id=\"ch{idx}\" href=\"{href}\" media-type=\"application/xhtml+xml\"/>\n"
        ));
        spine.push_str(&format!("    <itemref idref=\"ch{idx}\"/>\n"));
    }
    let opf = format!(
        r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata>
    <dc:identifier id="uid">fixture</dc:identifier>
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine>
{spine}  </spine>
</package>"#
    );
    zip.add_stored("OEBPS/content.opf", opf.as_bytes());

    for (href, document) in documents {
        zip.add_deflated(&format!("OEBPS/{href}"), document.as_bytes());
    }

    zip.finish()
}

/// As [`epub_with_documents`], but taking body fragments.
pub fn minimal_epub(chapters: &[(&str, &str)]) -> Vec<u8> {
    let documents: Vec<(&str, String)> = chapters
        .iter()
        .map(|(href, body)| (*href, xhtml_document(body)))
        .collect();
    let borrowed: Vec<(&str, &str)> = documents
        .iter()
        .map(|(href, doc)| (*href, doc.as_str()))
        .collect();
    epub_with_documents(&borrowed)
}

/// Format a narrow (8x16) glyph as a Unifont hex line.
pub fn hex_line(code_point: u32, rows: &[u8; 16]) -> String {
    let mut line = format!("{code_point:04X}:");
    for row in rows {
        line.push_str(&format!("{row:02X}"));
    }
    line
}

/// Format a wide (16x16) glyph as a Unifont hex line.
pub fn hex_line_wide(code_point: u32, rows: &[u16; 16]) -> String {
    let mut line = format!("{code_point:04X}:");
    for row in rows {
        line.push_str(&format!("{row:04X}"));
    }
    line
}
