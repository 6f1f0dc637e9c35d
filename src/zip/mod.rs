//! Random-access extraction of named members from a ZIP archive.
//!
//! EPUB publications are ZIP containers restricted to the store (0) and
//! deflate (8) compression methods. The reader locates the end-of-central-
//! directory record from the tail of the file, builds a member table from
//! the central directory, and extracts members on demand. Extracted
//! buffers carry one extra trailing NUL byte, which the XHTML parser
//! downstream relies on.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use flate2::{Decompress, FlushDecompress, Status};
use log::{debug, error};
use memchr::memmem;

use crate::error::{Error, Result};

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const DIR_FILE_HEADER_SIGNATURE: u32 = 0x0201_4b50;
const FILE_HEADER_SIGNATURE: u32 = 0x0403_4b50;

/// Fixed portion of the end-of-central-directory record.
const EOCD_SIZE: u64 = 22;
/// Fixed portion of a central-directory file header.
const DIR_FILE_HEADER_SIZE: usize = 46;
/// Fixed portion of a local file header.
const FILE_HEADER_SIZE: usize = 30;
/// A trailing ZIP comment is at most 64 KiB, which bounds the EOCD scan.
const MAX_COMMENT_SIZE: u64 = 65_536;
/// Compressed input is fed to the inflater in chunks of this size.
const CHUNK_SIZE: usize = 16 * 1024;

const METHOD_STORE: u16 = 0;
const METHOD_DEFLATE: u16 = 8;

#[derive(Debug, Clone)]
struct FileEntry {
    /// Offset of the member's local file header in the archive.
    header_offset: u32,
    compressed_size: u32,
    /// Size once decompressed.
    size: u32,
    /// 0 = stored, 8 = deflate.
    method: u16,
}

struct CurrentFile {
    entry: FileEntry,
    /// Offset of the first byte of member data, past the local header.
    data_offset: u64,
}

/// ZIP archive reader with a one-member "current file" slot.
pub struct Unzipper {
    file: File,
    entries: HashMap<String, FileEntry>,
    current: Option<CurrentFile>,
}

fn u16_at(buf: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([buf[pos], buf[pos + 1]])
}

fn u32_at(buf: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]])
}

/// Collapse `a/../` segments left-to-right and strip a leading `/`.
///
/// OPF hrefs and OCF rootfile paths are expressed relative to their own
/// containing file, so lookups such as `OEBPS/../img/x` must resolve to
/// the stored member path `img/x`.
pub fn canonical_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        if segment == ".." {
            match parts.last() {
                Some(prev) if !prev.is_empty() && *prev != ".." => {
                    parts.pop();
                }
                _ => parts.push(segment),
            }
        } else {
            parts.push(segment);
        }
    }
    let joined = parts.join("/");
    match joined.strip_prefix('/') {
        Some(stripped) => stripped.to_string(),
        None => joined,
    }
}

impl Unzipper {
    /// Open an archive and build its member table.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;

        let eocd = find_eocd(&mut file)?;
        let cd_offset = u32_at(&eocd.record, 16);
        let entry_count = u16_at(&eocd.record, 10);

        if entry_count == 0 {
            return Err(Error::ArchiveCorrupt(format!(
                "{}: empty central directory",
                path.display()
            )));
        }
        if u64::from(cd_offset) > eocd.offset {
            return Err(Error::ArchiveCorrupt(format!(
                "{}: central directory offset past its end record",
                path.display()
            )));
        }

        let cd_len = (eocd.offset - u64::from(cd_offset)) as usize;
        let mut directory = vec![0u8; cd_len];
        file.seek(SeekFrom::Start(u64::from(cd_offset)))?;
        file.read_exact(&mut directory)?;

        let mut entries = HashMap::new();
        let mut pos = 0usize;
        for _ in 0..entry_count {
            if pos + DIR_FILE_HEADER_SIZE > directory.len() {
                return Err(Error::ArchiveCorrupt(format!(
                    "{}: truncated central directory at offset {}",
                    path.display(),
                    pos
                )));
            }
            if u32_at(&directory, pos) != DIR_FILE_HEADER_SIGNATURE {
                return Err(Error::ArchiveCorrupt(format!(
                    "{}: bad central directory signature at offset {}",
                    path.display(),
                    pos
                )));
            }

            let method = u16_at(&directory, pos + 10);
            let compressed_size = u32_at(&directory, pos + 20);
            let size = u32_at(&directory, pos + 24);
            let name_len = u16_at(&directory, pos + 28) as usize;
            let extra_len = u16_at(&directory, pos + 30) as usize;
            let comment_len = u16_at(&directory, pos + 32) as usize;
            let header_offset = u32_at(&directory, pos + 42);

            let name_end = pos + DIR_FILE_HEADER_SIZE + name_len;
            if name_end > directory.len() {
                return Err(Error::ArchiveCorrupt(format!(
                    "{}: truncated member name at offset {}",
                    path.display(),
                    pos
                )));
            }
            let name = String::from_utf8_lossy(
                &directory[pos + DIR_FILE_HEADER_SIZE..name_end],
            )
            .into_owned();

            entries.insert(
                name,
                FileEntry {
                    header_offset,
                    compressed_size,
                    size,
                    method,
                },
            );

            pos += DIR_FILE_HEADER_SIZE + name_len + extra_len + comment_len;
        }

        let unzipper = Self {
            file,
            entries,
            current: None,
        };
        unzipper.show_entries();
        Ok(unzipper)
    }

    fn show_entries(&self) {
        for (name, entry) in &self.entries {
            debug!(
                "member pos: {:7} zip size: {:7} out size: {:7} method: {} name: <{}>",
                entry.header_offset, entry.compressed_size, entry.size, entry.method, name
            );
        }
    }

    /// Whether a member exists under the canonicalized path.
    pub fn file_exists(&self, file_path: &str) -> bool {
        self.entries.contains_key(&canonical_path(file_path))
    }

    /// Make the named member current, validating its local header.
    pub fn open_file(&mut self, file_path: &str) -> Result<()> {
        let cleaned = canonical_path(file_path);
        let entry = match self.entries.get(&cleaned) {
            Some(entry) => entry.clone(),
            None => {
                error!("open_file: member not found: <{cleaned}>");
                return Err(Error::ArchiveCorrupt(format!(
                    "member not found: {cleaned}"
                )));
            }
        };

        let mut header = [0u8; FILE_HEADER_SIZE];
        self.file
            .seek(SeekFrom::Start(u64::from(entry.header_offset)))?;
        self.file.read_exact(&mut header)?;

        if u32_at(&header, 0) != FILE_HEADER_SIGNATURE {
            error!(
                "open_file: bad local header signature for <{cleaned}> at offset {}",
                entry.header_offset
            );
            return Err(Error::ArchiveCorrupt(format!(
                "bad local header signature for {cleaned}"
            )));
        }

        let name_len = u16_at(&header, 26) as u64;
        let extra_len = u16_at(&header, 28) as u64;
        let data_offset =
            u64::from(entry.header_offset) + FILE_HEADER_SIZE as u64 + name_len + extra_len;

        self.current = Some(CurrentFile { entry, data_offset });
        Ok(())
    }

    /// Uncompressed size of the current member, plus one byte reserved
    /// for the trailing NUL that `read_file` writes.
    pub fn file_size(&self) -> u32 {
        match &self.current {
            Some(current) => current.entry.size + 1,
            None => {
                error!("file_size: no current member");
                0
            }
        }
    }

    /// Extract the current member into `buf`, which must be exactly
    /// `file_size()` bytes long. The final byte is set to NUL.
    pub fn read_file(&mut self, buf: &mut [u8]) -> Result<()> {
        let (entry, data_offset) = match &self.current {
            Some(current) => (current.entry.clone(), current.data_offset),
            None => {
                return Err(Error::ArchiveCorrupt("no current member".into()));
            }
        };

        let size = entry.size as usize;
        if buf.len() != size + 1 {
            return Err(Error::ArchiveCorrupt(format!(
                "buffer size {} does not match member size {}",
                buf.len(),
                size + 1
            )));
        }
        buf[size] = 0;

        self.file.seek(SeekFrom::Start(data_offset))?;

        match entry.method {
            METHOD_STORE => {
                self.file.read_exact(&mut buf[..size])?;
            }
            METHOD_DEFLATE => {
                self.inflate_current(&entry, &mut buf[..size])?;
            }
            method => {
                error!("read_file: unsupported compression method {method}");
                return Err(Error::Decompress(format!(
                    "unsupported compression method {method}"
                )));
            }
        }

        Ok(())
    }

    /// Stream the raw deflate payload through the inflater in 16 KiB
    /// chunks. The inflater state is dropped on every exit path.
    fn inflate_current(&mut self, entry: &FileEntry, out: &mut [u8]) -> Result<()> {
        let mut inflater = Decompress::new(false);
        let mut chunk = [0u8; CHUNK_SIZE];
        let mut compressed_left = entry.compressed_size as usize;
        let mut chunk_len = 0usize;
        let mut chunk_pos = 0usize;
        let mut out_pos = 0usize;

        while out_pos < out.len() {
            if chunk_pos == chunk_len {
                if compressed_left == 0 {
                    return Err(Error::Decompress(format!(
                        "deflate stream ended after {out_pos} of {} bytes",
                        out.len()
                    )));
                }
                chunk_len = CHUNK_SIZE.min(compressed_left);
                self.file.read_exact(&mut chunk[..chunk_len])?;
                compressed_left -= chunk_len;
                chunk_pos = 0;
            }

            let in_before = inflater.total_in();
            let out_before = inflater.total_out();
            let status = inflater
                .decompress(
                    &chunk[chunk_pos..chunk_len],
                    &mut out[out_pos..],
                    FlushDecompress::None,
                )
                .map_err(|e| Error::Decompress(e.to_string()))?;
            chunk_pos += (inflater.total_in() - in_before) as usize;
            out_pos += (inflater.total_out() - out_before) as usize;

            if status == Status::StreamEnd {
                break;
            }
        }

        if out_pos != out.len() {
            return Err(Error::Decompress(format!(
                "deflate produced {out_pos} bytes, expected {}",
                out.len()
            )));
        }
        Ok(())
    }

    /// Release the current-member slot.
    pub fn close_file(&mut self) {
        self.current = None;
    }
}

struct EocdRecord {
    /// Archive offset of the record.
    offset: u64,
    /// The fixed 22-byte record.
    record: [u8; EOCD_SIZE as usize],
}

/// Locate the end-of-central-directory record.
///
/// The record is normally the last 22 bytes of the archive. When the
/// archive carries a trailing comment, scan backwards in overlapping
/// 27-byte windows (22-byte record plus 5 bytes of slack so the signature
/// can straddle a window boundary), at most 64 KiB behind the probe.
fn find_eocd(file: &mut File) -> Result<EocdRecord> {
    let length = file.seek(SeekFrom::End(0))?;
    if length < EOCD_SIZE {
        return Err(Error::ArchiveCorrupt("file shorter than an EOCD record".into()));
    }

    let mut record = [0u8; EOCD_SIZE as usize];
    let mut ecd_offset = length - EOCD_SIZE;
    file.seek(SeekFrom::Start(ecd_offset))?;
    file.read_exact(&mut record)?;
    if u32_at(&record, 0) == EOCD_SIGNATURE {
        return Ok(EocdRecord {
            offset: ecd_offset,
            record,
        });
    }

    // A comment follows the record. Walk backwards looking for the
    // signature, bounded by the maximum comment length.
    let end_offset = ecd_offset.saturating_sub(MAX_COMMENT_SIZE);
    let mut window = [0u8; EOCD_SIZE as usize + 5];
    while ecd_offset > end_offset {
        ecd_offset = match ecd_offset.checked_sub(EOCD_SIZE) {
            Some(offset) => offset,
            None => break,
        };
        file.seek(SeekFrom::Start(ecd_offset))?;
        file.read_exact(&mut window)?;
        if let Some(found) = memmem::find(&window, b"PK\x05\x06") {
            let offset = ecd_offset + found as u64;
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut record)?;
            return Ok(EocdRecord { offset, record });
        }
    }

    error!("end of central directory record not found");
    Err(Error::ArchiveCorrupt(
        "end of central directory record not found".into(),
    ))
}
