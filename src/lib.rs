//! # ibmfgen
//!
//! Derive a compact, embedded-friendly IBMF bitmap font from an EPUB
//! publication and a GNU Unifont hex glyph source.
//!
//! The pipeline harvests the set of code points a book actually uses,
//! clusters them into contiguous ranges, pulls the matching glyphs out of
//! the Unifont `.hex` file, and serializes an IBMF v4 file (`UTF32`
//! format) containing exactly those glyphs, laid out for memory-mapped
//! consumption by an embedded renderer.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ibmfgen::{scan_publication, EpubFile, HexImport};
//!
//! let mut epub = EpubFile::open("book.epub")?;
//! let harvest = scan_publication(&mut epub)?;
//! let font = HexImport::load("unifont-15.1.04.hex", &harvest.ublocks())?;
//! ibmfgen::ibmf::writer::save(&font, "font.ibmf")?;
//! # Ok::<(), ibmfgen::Error>(())
//! ```

pub mod epub;
pub mod error;
pub mod harvest;
pub mod ibmf;
pub mod utf8;
pub mod zip;

pub use epub::EpubFile;
pub use error::{Error, Result};
pub use harvest::{scan_publication, Harvest, UBlock};
pub use ibmf::{Font, HexImport};
