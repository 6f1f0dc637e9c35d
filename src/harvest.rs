//! Code-point harvesting and clustering.
//!
//! The harvester collects the set of "interesting" code points a book
//! actually uses, counts occurrences, and partitions the sorted set into
//! maximal contiguous ranges (`UBlock`s) that drive the Unifont import.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::epub::{EpubFile, XHTML_MEDIA_TYPE};
use crate::error::{Error, Result};
use crate::ibmf::{UNKNOWN_CODEPOINT, ZERO_WIDTH_CODEPOINT};
use crate::utf8::Utf8Iterator;

/// A contiguous inclusive code-point range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UBlock {
    pub first: u32,
    pub last: u32,
    pub label: &'static str,
}

impl UBlock {
    pub fn contains(&self, code_point: u32) -> bool {
        code_point >= self.first && code_point <= self.last
    }
}

/// Glyphs the renderer needs regardless of the book's content: link
/// brackets, list bullets, the width-heuristic probes, and digits for
/// numbered lists.
const SEED_CODE_POINTS: [u32; 15] = [
    0x5B, // [
    0x5D, // ]
    0x2D, // -
    0x6F, // o
    0x47, // G
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39,
];

/// Whether a code point is worth carrying into the font. Spaces of every
/// kind, the BOM, the malformed-input replacement, and the specials block
/// are excluded.
pub fn is_interesting(code_point: u32) -> bool {
    code_point > 0x20
        && code_point != 0xA0
        && !(0x2000..=0x200F).contains(&code_point)
        && code_point != 0x202F
        && code_point != ZERO_WIDTH_CODEPOINT
        && code_point != UNKNOWN_CODEPOINT
        && !(0xFFF0..=0xFFFF).contains(&code_point)
}

/// CJK vertical presentation forms are folded onto their base forms so
/// the base glyph is present whenever the presentation form is.
fn translate(code_point: u32) -> Option<u32> {
    Some(match code_point {
        0xFE30 => 0x2025,
        0xFE31 => 0x2014,
        0xFE32 => 0x2013,
        0xFE33 | 0xFE34 => 0x005F,
        0xFE35 => 0x0028,
        0xFE36 => 0x0029,
        0xFE37 => 0x007B,
        0xFE38 => 0x007D,
        0xFE39 => 0x3014,
        0xFE3A => 0x3015,
        0xFE3B => 0x3010,
        0xFE3C => 0x3011,
        0xFE3D => 0x300A,
        0xFE3E => 0x300B,
        0xFE3F => 0x3008,
        0xFE40 => 0x3009,
        0xFE41 => 0x300C,
        0xFE42 => 0x300D,
        0xFE43 => 0x300E,
        0xFE44 => 0x300F,
        0xFE45 => 0xFE51,
        0xFE47 => 0x005B,
        0xFE48 => 0x005D,
        0xFE49..=0xFE4C => 0x203E,
        0xFE4D..=0xFE4F => 0x005F,
        _ => return None,
    })
}

/// Occurrence counts keyed by code point, iterable in code-point order.
#[derive(Debug, Clone)]
pub struct Harvest {
    counts: BTreeMap<u32, u32>,
}

impl Default for Harvest {
    fn default() -> Self {
        Self::new()
    }
}

impl Harvest {
    /// A fresh harvest, pre-seeded with the always-required glyphs.
    pub fn new() -> Self {
        let mut harvest = Self {
            counts: BTreeMap::new(),
        };
        for code_point in SEED_CODE_POINTS {
            harvest.bump(code_point);
        }
        harvest
    }

    fn bump(&mut self, code_point: u32) {
        *self.counts.entry(code_point).or_insert(0) += 1;
    }

    /// Record one occurrence if the code point passes the harvesting
    /// predicate; presentation forms also bump their base form.
    pub fn add(&mut self, code_point: u32) {
        if !is_interesting(code_point) {
            return;
        }
        self.bump(code_point);
        if let Some(base) = translate(code_point) {
            self.bump(base);
        }
    }

    /// Decode a text node and harvest every code point in it.
    pub fn add_text(&mut self, text: &[u8]) {
        for code_point in Utf8Iterator::new(text) {
            self.add(code_point);
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn contains(&self, code_point: u32) -> bool {
        self.counts.contains_key(&code_point)
    }

    pub fn count(&self, code_point: u32) -> u32 {
        self.counts.get(&code_point).copied().unwrap_or(0)
    }

    /// Code points in ascending order with their counts.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.counts.iter().map(|(&cp, &n)| (cp, n))
    }

    /// Partition the harvest set into maximal runs of consecutive code
    /// points. The blocks cover exactly the set, in order, disjoint, and
    /// no two adjacent blocks are mergeable.
    pub fn ublocks(&self) -> Vec<UBlock> {
        let mut blocks = Vec::new();
        let mut run: Option<(u32, u32)> = None;

        for (&code_point, _) in &self.counts {
            run = Some(match run {
                Some((first, last)) if code_point == last + 1 => (first, code_point),
                Some((first, last)) => {
                    debug!("ublock {first:04x} .. {last:04x}");
                    blocks.push(UBlock { first, last, label: "" });
                    (code_point, code_point)
                }
                None => (code_point, code_point),
            });
        }
        if let Some((first, last)) = run {
            debug!("ublock {first:04x} .. {last:04x}");
            blocks.push(UBlock { first, last, label: "" });
        }

        debug!("cluster count: {}", blocks.len());
        blocks
    }
}

/// Harvest every XHTML spine item of an opened publication.
///
/// Content documents that fail to parse are skipped with a warning; a
/// failure to extract one from the archive aborts the scan.
pub fn scan_publication(epub: &mut EpubFile) -> Result<Harvest> {
    let mut harvest = Harvest::new();

    for idx in 0..epub.spine_count() {
        let (href, media_type) = match epub.spine_item(idx) {
            Some(item) => (item.href.clone(), item.media_type.clone()),
            None => continue,
        };
        if media_type != XHTML_MEDIA_TYPE {
            debug!("skipping spine item {href}: media type {media_type}");
            continue;
        }

        let doc = match epub.xhtml_file(&href) {
            Ok(doc) => doc,
            Err(Error::Xml(e)) => {
                warn!("failed to parse content document {href}: {e}");
                continue;
            }
            Err(e) => return Err(e),
        };

        for span in doc.spans() {
            harvest.add_text(doc.text(span));
        }
    }

    Ok(harvest)
}
