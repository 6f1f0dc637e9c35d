//! Error types for ibmfgen operations.

use thiserror::Error;

/// Errors that can occur while reading an EPUB or producing an IBMF font.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Corrupt archive: {0}")]
    ArchiveCorrupt(String),

    #[error("Decompression failed: {0}")]
    Decompress(String),

    #[error("Invalid EPUB: {0}")]
    InvalidEpub(String),

    #[error("Invalid hex font: {0}")]
    InvalidHexFont(String),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type Result<T> = std::result::Result<T, Error>;
