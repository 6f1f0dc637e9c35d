//! GNU Unifont hex importer.
//!
//! A `.hex` file carries one glyph per line as `CODEPOINT:HEXBITS`, where
//! the payload is 32 or 64 hex digits: an 8x16 or 16x16 monochrome cell,
//! row-major, MSB first within each byte.
//!
//! The file is read twice, both passes in the same textual order so glyph
//! codes are stable. Pass 1 assigns glyph codes and builds the
//! plane/bundle table from the accepted code points; pass 2 decodes each
//! bitmap, crops it to the tight bounding box, derives offsets and
//! advance, and attaches ligature sub-programs.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, error, warn};

use crate::error::{Error, Result};
use crate::harvest::{is_interesting, UBlock};

use super::{
    Bitmap, CodePlaneTable, CodePointBundle, Face, FaceHeader, Font, GlyphCode, GlyphInfo,
    GlyphLigKern, GlyphLigStep, Plane, RleMetrics, BLACK_EIGHT_BITS, LIGATURES, NO_GLYPH_CODE,
    SPACE_CODE, WHITE_EIGHT_BITS,
};

/// Unifont's baseline sits on row 14 of the 16-row cell.
const BASELINE_ROW: i8 = 14;

/// Signature word of Unifont's private-use placeholder glyphs, which are
/// suppressed from the import.
const PLACEHOLDER_SIGNATURE: u32 = 0xAAAA_0001;

/// Cropped-glyph anchoring for CJK punctuation. Opening brackets hug the
/// right edge of their cell, closers the left edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    None,
    Left,
    Right,
}

fn position_of(code_point: u32) -> Position {
    match code_point {
        0x3014 | 0x3010 | 0x300A | 0x3008 | 0x300C | 0x300E => Position::Right,
        0x3015 | 0x3011 | 0x300B | 0x3009 | 0x300D | 0x300F | 0xFE51 => Position::Left,
        _ => Position::None,
    }
}

fn char_selected(code_point: u32, ublocks: &[UBlock], first_bytes: u32) -> bool {
    is_interesting(code_point)
        && first_bytes != PLACEHOLDER_SIGNATURE
        && ublocks.iter().any(|block| block.contains(code_point))
}

/// One parsed `CODEPOINT:HEXBITS` line.
struct HexLine {
    code_point: u32,
    bytes: Vec<u8>,
    /// First 32 bits of the payload, used to recognize placeholders.
    first_bytes: u32,
}

fn parse_line(line: &str) -> Option<HexLine> {
    let (code_str, payload) = line.split_once(':')?;
    let code_point = u32::from_str_radix(code_str.trim(), 16).ok()?;

    let payload = payload.trim();
    if payload.len() < 8 || payload.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(payload.len() / 2);
    for pair in payload.as_bytes().chunks_exact(2) {
        let hex = std::str::from_utf8(pair).ok()?;
        bytes.push(u8::from_str_radix(hex, 16).ok()?);
    }

    let first_bytes = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    Some(HexLine {
        code_point,
        bytes,
        first_bytes,
    })
}

/// A decoded, cropped glyph ready to become a `GlyphInfo`.
struct DecodedGlyph {
    glyph_code: GlyphCode,
    bitmap: Bitmap,
    horizontal_offset: i8,
    vertical_offset: i8,
    /// Cell advance in pixels (8 narrow, 16 wide), before the Q10.6 shift
    /// and the proportional-advance policy.
    advance: u16,
}

/// Two-pass importer state.
pub struct HexImport {
    table: CodePlaneTable,
    glyph_count: u32,
}

impl HexImport {
    /// Import the hex font, keeping only code points that are harvested
    /// (inside a `UBlock`), interesting, and not placeholder art.
    pub fn load<P: AsRef<Path>>(hex_path: P, ublocks: &[UBlock]) -> Result<Font> {
        let hex_path = hex_path.as_ref();

        let mut import = Self {
            table: CodePlaneTable::default(),
            glyph_count: 0,
        };

        import.prepare_code_planes(hex_path, ublocks)?;
        if import.glyph_count == 0 {
            return Err(Error::InvalidHexFont(format!(
                "{}: no glyphs selected",
                hex_path.display()
            )));
        }
        debug!(
            "code planes ready: {} glyphs in {} bundles",
            import.glyph_count,
            import.table.bundles.len()
        );

        let face = import.read_glyphs(hex_path)?;

        Ok(Font {
            plane_table: import.table,
            faces: vec![face],
        })
    }

    /// Pass 1: one forward scan assigning dense glyph codes and folding
    /// the accepted code points into planes and bundles.
    fn prepare_code_planes(&mut self, hex_path: &Path, ublocks: &[UBlock]) -> Result<()> {
        let reader = BufReader::new(File::open(hex_path)?);

        let mut glyph_code: u32 = 0;
        let mut first_selected = false;
        let mut curr_code_point: u16 = 0;
        let mut curr_plane_idx: usize = 0;

        let planes = &mut self.table.planes;
        let bundles = &mut self.table.bundles;

        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let Some(parsed) = parse_line(&line) else {
                warn!("{}: skipping malformed line: {line}", hex_path.display());
                continue;
            };
            if !char_selected(parsed.code_point, ublocks, parsed.first_bytes) {
                continue;
            }

            let plane_idx = (parsed.code_point >> 16) as usize;
            if plane_idx >= 4 {
                // Only planes 0..3 are representable.
                continue;
            }
            let u16_value = (parsed.code_point & 0xFFFF) as u16;

            if !first_selected {
                planes[plane_idx] = Plane {
                    code_point_bundles_idx: bundles.len() as u16,
                    entries_count: 1,
                    first_glyph_code: glyph_code as GlyphCode,
                };
                bundles.push(CodePointBundle {
                    first_code_point: u16_value,
                    last_code_point: u16_value,
                });
                curr_code_point = u16_value;
                curr_plane_idx = plane_idx;
                first_selected = true;
            } else if plane_idx != curr_plane_idx {
                for skipped in planes.iter_mut().take(plane_idx).skip(curr_plane_idx + 1) {
                    skipped.code_point_bundles_idx = bundles.len() as u16;
                    skipped.first_glyph_code = glyph_code as GlyphCode;
                }
                planes[plane_idx] = Plane {
                    code_point_bundles_idx: bundles.len() as u16,
                    entries_count: 1,
                    first_glyph_code: glyph_code as GlyphCode,
                };
                bundles.push(CodePointBundle {
                    first_code_point: u16_value,
                    last_code_point: u16_value,
                });
                curr_code_point = u16_value;
                curr_plane_idx = plane_idx;
            } else if u32::from(u16_value) == u32::from(curr_code_point) + 1 {
                if let Some(last) = bundles.last_mut() {
                    last.last_code_point = u16_value;
                }
                curr_code_point = u16_value;
            } else {
                bundles.push(CodePointBundle {
                    first_code_point: u16_value,
                    last_code_point: u16_value,
                });
                planes[curr_plane_idx].entries_count += 1;
                curr_code_point = u16_value;
            }

            glyph_code += 1;
        }

        // Planes above the last one written point at the end of the
        // bundle array and carry the final glyph code, keeping the
        // glyph-code continuity across empty planes.
        for plane in planes.iter_mut().skip(curr_plane_idx + 1) {
            plane.code_point_bundles_idx = bundles.len() as u16;
            plane.first_glyph_code = glyph_code as GlyphCode;
        }

        self.glyph_count = glyph_code;
        Ok(())
    }

    /// Pass 2: decode every selected glyph into the face.
    fn read_glyphs(&self, hex_path: &Path) -> Result<Face> {
        let reader = BufReader::new(File::open(hex_path)?);
        let mut face = Face::default();

        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let Some(parsed) = parse_line(&line) else {
                continue;
            };

            let Some(decoded) = self.read_one_glyph(hex_path, &parsed) else {
                continue;
            };

            // Attach ligatures whose first character is this glyph, when
            // both the follower and the replacement made it into the font.
            let mut lig_kern = GlyphLigKern::default();
            if let Some(first_char) = self.table.code_point(decoded.glyph_code) {
                for ligature in &LIGATURES {
                    if ligature.first_char != first_char {
                        continue;
                    }
                    let next = self.table.glyph_code(ligature.next_char);
                    let replacement = self.table.glyph_code(ligature.replacement);
                    if next != NO_GLYPH_CODE && replacement != NO_GLYPH_CODE {
                        lig_kern.lig_steps.push(GlyphLigStep {
                            next_glyph_code: next,
                            replacement_glyph_code: replacement,
                        });
                    }
                }
            }

            let width = u16::from(decoded.bitmap.width);
            let height = u16::from(decoded.bitmap.height);
            let proportional = parsed.code_point < 0x2E80
                || (0xA000..0xFE10).contains(&parsed.code_point)
                || (0xFE70..0xFF00).contains(&parsed.code_point);
            let advance_pixels = if proportional {
                width + 1
            } else {
                decoded.advance
            };

            face.glyphs.push(GlyphInfo {
                bitmap_width: decoded.bitmap.width,
                bitmap_height: decoded.bitmap.height,
                horizontal_offset: decoded.horizontal_offset,
                vertical_offset: decoded.vertical_offset,
                packet_length: width * height,
                advance: (advance_pixels << 6) as i16,
                rle_metrics: RleMetrics::default(),
                lig_kern_pgm_index: 0, // patched at save time
                main_code: decoded.glyph_code,
            });
            face.bitmaps.push(decoded.bitmap);
            face.glyphs_lig_kern.push(lig_kern);
        }

        face.header = FaceHeader {
            point_size: 10,
            line_height: 16,
            dpi: 75,
            x_height: 8 << 6,
            em_size: 10 << 6,
            slant_correction: 0,
            descender_height: 2,
            space_size: 5,
            glyph_count: self.glyph_count as u16,
            lig_kern_step_count: 0, // patched at save time
            pixels_pool_size: 0,    // patched at save time
        };

        Ok(face)
    }

    /// Decode one glyph cell: tight bounding box, one byte per pixel,
    /// baseline-relative vertical offset, and the CJK anchoring policy.
    fn read_one_glyph(&self, hex_path: &Path, parsed: &HexLine) -> Option<DecodedGlyph> {
        let glyph_code = self.table.glyph_code(parsed.code_point);
        if glyph_code == NO_GLYPH_CODE {
            return None;
        }

        let byte_width = match parsed.bytes.len() {
            16 => 1usize,
            32 => 2usize,
            len => {
                error!(
                    "{}: glyph U+{:04X} has a {len}-byte cell, expected 16 or 32",
                    hex_path.display(),
                    parsed.code_point
                );
                return None;
            }
        };
        let advance: u16 = if byte_width == 2 { 16 } else { 8 };

        let row_is_blank = |row: usize| {
            parsed.bytes[row * byte_width..(row + 1) * byte_width]
                .iter()
                .all(|&b| b == 0)
        };
        let pixel_at = |row: usize, col: usize| {
            parsed.bytes[row * byte_width + (col >> 3)] & (0x80 >> (col & 7)) != 0
        };

        let Some(first_row) = (0..16).find(|&r| !row_is_blank(r)) else {
            // All-zero cell: a zero-size space glyph.
            return Some(DecodedGlyph {
                glyph_code: SPACE_CODE,
                bitmap: Bitmap::default(),
                horizontal_offset: 0,
                vertical_offset: 0,
                advance,
            });
        };
        let last_row = (0..16).rev().find(|&r| !row_is_blank(r))?;

        let col_count = byte_width * 8;
        let col_has_pixel =
            |col: usize| (first_row..=last_row).any(|row| pixel_at(row, col));
        let first_col = (0..col_count).find(|&c| col_has_pixel(c))?;
        let last_col = (0..col_count).rev().find(|&c| col_has_pixel(c))?;

        let width = (last_col - first_col + 1) as u8;
        let height = (last_row - first_row + 1) as u8;
        let mut pixels = Vec::with_capacity(usize::from(width) * usize::from(height));
        for row in first_row..=last_row {
            for col in first_col..=last_col {
                pixels.push(if pixel_at(row, col) {
                    BLACK_EIGHT_BITS
                } else {
                    WHITE_EIGHT_BITS
                });
            }
        }

        let horizontal_offset = if position_of(parsed.code_point) == Position::Right {
            (-(advance as i16 - i16::from(width) - 1)) as i8
        } else {
            0
        };

        Some(DecodedGlyph {
            glyph_code,
            bitmap: Bitmap {
                pixels,
                width,
                height,
            },
            horizontal_offset,
            vertical_offset: BASELINE_ROW - first_row as i8,
            advance,
        })
    }
}
