//! IBMF v4 serializer.
//!
//! The file is laid out in an in-memory buffer, every multi-byte field in
//! little-endian order, then written out in one shot. The face-header
//! offset vector near the front is patched once the face bytes have been
//! placed and their absolute offsets are known.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use log::{debug, info};

use crate::error::{Error, Result};

use super::{Face, Font, FontFormat, LigKernStep, IBMF_MARKER, IBMF_VERSION};

/// Serialize `font` and write it to `path`.
pub fn save<P: AsRef<Path>>(font: &Font, path: P) -> Result<()> {
    let path = path.as_ref();
    let bytes = serialize(font)?;
    let mut file = File::create(path)?;
    file.write_all(&bytes)?;
    info!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Produce the byte-exact v4 `UTF32` file image.
pub fn serialize(font: &Font) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    // Preamble: marker, face count, version in the low five bits and the
    // font format in the high three.
    out.extend_from_slice(&IBMF_MARKER);
    out.push(font.faces.len() as u8);
    out.push(IBMF_VERSION | ((FontFormat::Utf32 as u8) << 5));

    // One point-size byte per face, zero-padded to a 32-bit boundary.
    for face in &font.faces {
        out.push(face.header.point_size);
    }
    while out.len() % 4 != 0 {
        out.push(0);
    }

    // Face-header offset vector, patched below.
    let offset_vector_pos = out.len();
    for _ in &font.faces {
        out.extend_from_slice(&0u32.to_le_bytes());
    }

    // Code-point mapping table: 4 planes, then the shared bundle array.
    let table = &font.plane_table;
    for plane in &table.planes {
        out.extend_from_slice(&plane.code_point_bundles_idx.to_le_bytes());
        out.extend_from_slice(&plane.entries_count.to_le_bytes());
        out.extend_from_slice(&plane.first_glyph_code.to_le_bytes());
    }
    for bundle in &table.bundles {
        out.extend_from_slice(&bundle.first_code_point.to_le_bytes());
        out.extend_from_slice(&bundle.last_code_point.to_le_bytes());
    }

    // Glyph codes must run consecutively across planes.
    for pair in table.planes.windows(2) {
        let span: u32 = (pair[0].code_point_bundles_idx
            ..pair[0].code_point_bundles_idx + pair[0].entries_count)
            .map(|i| {
                let b = &table.bundles[i as usize];
                u32::from(b.last_code_point) - u32::from(b.first_code_point) + 1
            })
            .sum();
        debug_assert_eq!(
            u32::from(pair[0].first_glyph_code) + span,
            u32::from(pair[1].first_glyph_code)
        );
    }

    let mut face_offsets = Vec::with_capacity(font.faces.len());
    for face in &font.faces {
        debug_assert_eq!(out.len() % 4, 0);
        face_offsets.push(out.len() as u32);
        write_face(&mut out, face)?;
    }

    for (idx, offset) in face_offsets.iter().enumerate() {
        let pos = offset_vector_pos + idx * 4;
        out[pos..pos + 4].copy_from_slice(&offset.to_le_bytes());
    }

    Ok(out)
}

fn write_face(out: &mut Vec<u8>, face: &Face) -> Result<()> {
    let pixels_pool_size: u32 = face
        .glyphs
        .iter()
        .map(|glyph| u32::from(glyph.packet_length))
        .sum();

    // Flatten the per-glyph sub-programs into one program. Each non-empty
    // sub-program is its ligature steps, its kern steps, then a
    // terminating halt step carrying the stop bit.
    let mut steps: Vec<LigKernStep> = Vec::new();
    let mut pgm_indices: Vec<u8> = Vec::with_capacity(face.glyphs.len());
    for lig_kern in &face.glyphs_lig_kern {
        if lig_kern.is_empty() {
            pgm_indices.push(0xFF);
            continue;
        }
        let start = steps.len();
        if start >= 0xFF {
            return Err(Error::InvalidHexFont(
                "ligature/kern program exceeds the one-byte index range".into(),
            ));
        }
        for lig in &lig_kern.lig_steps {
            steps.push(LigKernStep::ligature(
                lig.next_glyph_code,
                lig.replacement_glyph_code,
            ));
        }
        for kern in &lig_kern.kern_steps {
            steps.push(LigKernStep::kerning(kern.next_glyph_code, kern.kern));
        }
        steps.push(LigKernStep::halt());
        pgm_indices.push(start as u8);
    }

    let mut header = face.header.clone();
    header.pixels_pool_size = pixels_pool_size;
    header.lig_kern_step_count = steps.len() as u16;
    header.write_to(out);

    // Pixel-pool indices: cumulative packet lengths, one u32 per glyph.
    let mut pool_index: u32 = 0;
    for glyph in &face.glyphs {
        debug_assert_eq!(
            glyph.packet_length,
            u16::from(glyph.bitmap_width) * u16::from(glyph.bitmap_height)
        );
        out.extend_from_slice(&pool_index.to_le_bytes());
        pool_index += u32::from(glyph.packet_length);
    }

    debug_assert_eq!(out.len() % 2, 0);
    for (glyph, &pgm_index) in face.glyphs.iter().zip(&pgm_indices) {
        let mut info = glyph.clone();
        info.lig_kern_pgm_index = pgm_index;
        info.write_to(out);
    }

    // Pixel pool, no inter-glyph padding.
    for bitmap in &face.bitmaps {
        out.extend_from_slice(&bitmap.pixels);
    }

    // Filler to the next 32-bit boundary.
    while out.len() % 4 != 0 {
        out.push(0);
    }

    for step in &steps {
        step.write_to(out);
    }

    debug!(
        "face laid out: {} glyphs, {} pool bytes, {} lig/kern steps",
        face.glyphs.len(),
        pixels_pool_size,
        steps.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ibmf::{
        Bitmap, CodePlaneTable, CodePointBundle, FaceHeader, GlyphInfo, GlyphKernStep,
        GlyphLigKern, GlyphLigStep, Plane, RleMetrics, FACE_HEADER_SIZE, GLYPH_INFO_SIZE,
    };

    fn glyph(width: u8, height: u8, code: u16) -> (GlyphInfo, Bitmap) {
        let info = GlyphInfo {
            bitmap_width: width,
            bitmap_height: height,
            horizontal_offset: 0,
            vertical_offset: 12,
            packet_length: u16::from(width) * u16::from(height),
            advance: (i16::from(width) + 1) << 6,
            rle_metrics: RleMetrics::default(),
            lig_kern_pgm_index: 0,
            main_code: code,
        };
        let bitmap = Bitmap {
            pixels: vec![0xFF; usize::from(width) * usize::from(height)],
            width,
            height,
        };
        (info, bitmap)
    }

    fn sample_font() -> Font {
        let mut face = Face {
            header: FaceHeader {
                point_size: 10,
                line_height: 16,
                dpi: 75,
                x_height: 8 << 6,
                em_size: 10 << 6,
                slant_correction: 0,
                descender_height: 2,
                space_size: 5,
                glyph_count: 3,
                lig_kern_step_count: 0,
                pixels_pool_size: 0,
            },
            ..Default::default()
        };
        for (idx, (w, h)) in [(3u8, 5u8), (2, 7), (4, 4)].iter().enumerate() {
            let (info, bitmap) = glyph(*w, *h, idx as u16);
            face.glyphs.push(info);
            face.bitmaps.push(bitmap);
        }
        face.glyphs_lig_kern = vec![
            GlyphLigKern {
                lig_steps: vec![GlyphLigStep {
                    next_glyph_code: 1,
                    replacement_glyph_code: 2,
                }],
                kern_steps: vec![GlyphKernStep {
                    next_glyph_code: 2,
                    kern: -32,
                }],
            },
            GlyphLigKern::default(),
            GlyphLigKern::default(),
        ];

        Font {
            plane_table: CodePlaneTable {
                planes: [
                    Plane { code_point_bundles_idx: 0, entries_count: 1, first_glyph_code: 0 },
                    Plane { code_point_bundles_idx: 1, entries_count: 0, first_glyph_code: 3 },
                    Plane { code_point_bundles_idx: 1, entries_count: 0, first_glyph_code: 3 },
                    Plane { code_point_bundles_idx: 1, entries_count: 0, first_glyph_code: 3 },
                ],
                bundles: vec![CodePointBundle {
                    first_code_point: 0x41,
                    last_code_point: 0x43,
                }],
            },
            faces: vec![face],
        }
    }

    #[test]
    fn preamble_and_face_offset() {
        let bytes = serialize(&sample_font()).unwrap();

        assert_eq!(&bytes[0..4], b"IBMF");
        assert_eq!(bytes[4], 1);
        assert_eq!(bytes[5], 0x24); // version 4, format UTF32

        // Point size at 6, padding to 8, offset vector at 8.
        assert_eq!(bytes[6], 10);
        let face_offset = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;

        // Planes at 12 (24 bytes), one bundle (4 bytes): face at 40.
        assert_eq!(face_offset, 40);
        assert_eq!(face_offset % 4, 0);

        // FaceHeader starts with pointSize, lineHeight, dpi.
        assert_eq!(bytes[face_offset], 10);
        assert_eq!(bytes[face_offset + 1], 16);
        assert_eq!(
            u16::from_le_bytes(bytes[face_offset + 2..face_offset + 4].try_into().unwrap()),
            75
        );
    }

    #[test]
    fn pixel_pool_indices_are_cumulative() {
        let font = sample_font();
        let bytes = serialize(&font).unwrap();
        let face_offset = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let indices_at = face_offset + FACE_HEADER_SIZE;

        let packet_lengths: Vec<u32> = font.faces[0]
            .glyphs
            .iter()
            .map(|g| u32::from(g.packet_length))
            .collect();
        let pool_size: u32 = packet_lengths.iter().sum();

        let mut expected = 0u32;
        for (idx, len) in packet_lengths.iter().enumerate() {
            let pos = indices_at + idx * 4;
            let index = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
            assert_eq!(index, expected);
            expected += len;
        }
        assert_eq!(expected, pool_size);

        // The patched header fields agree.
        let pool_size_at = face_offset + 16;
        assert_eq!(
            u32::from_le_bytes(bytes[pool_size_at..pool_size_at + 4].try_into().unwrap()),
            pool_size
        );
    }

    #[test]
    fn lig_kern_program_terminates_each_subprogram() {
        let font = sample_font();
        let bytes = serialize(&font).unwrap();
        let face_offset = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;

        let glyph_count = font.faces[0].glyphs.len();
        let pool_size: usize = font.faces[0]
            .glyphs
            .iter()
            .map(|g| usize::from(g.packet_length))
            .sum();

        let step_count_at = face_offset + 14;
        let step_count =
            u16::from_le_bytes(bytes[step_count_at..step_count_at + 2].try_into().unwrap());
        // One ligature + one kern + the halt terminator.
        assert_eq!(step_count, 3);

        let glyphs_at = face_offset + FACE_HEADER_SIZE + glyph_count * 4;
        let pool_at = glyphs_at + glyph_count * GLYPH_INFO_SIZE;
        let mut program_at = pool_at + pool_size;
        while program_at % 4 != 0 {
            program_at += 1;
        }
        assert_eq!(bytes.len(), program_at + usize::from(step_count) * 4);

        let step_at = |idx: usize| {
            let pos = program_at + idx * 4;
            LigKernStep::from_words(
                u16::from_le_bytes(bytes[pos..pos + 2].try_into().unwrap()),
                u16::from_le_bytes(bytes[pos + 2..pos + 4].try_into().unwrap()),
            )
        };

        let lig = step_at(0);
        assert!(!lig.stop());
        assert!(!lig.is_a_kern());
        assert_eq!(lig.next_glyph_code(), 1);
        assert_eq!(lig.replacement_glyph_code(), 2);

        let kern = step_at(1);
        assert!(!kern.stop());
        assert!(kern.is_a_kern());

        let halt = step_at(2);
        assert!(halt.stop());

        // First glyph's program index is 0, the others have none.
        let pgm_index_of = |glyph: usize| bytes[glyphs_at + glyph * GLYPH_INFO_SIZE + 9];
        assert_eq!(pgm_index_of(0), 0);
        assert_eq!(pgm_index_of(1), 0xFF);
        assert_eq!(pgm_index_of(2), 0xFF);
    }
}
