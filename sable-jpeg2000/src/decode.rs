//! Tile decoding: Tier-2, Tier-1, dequantization and the inverse DWT.

use crate::codestream::Header;
use crate::dwt::{self, Plane};
use crate::error::Result;
use crate::packet;
use crate::t1;
use crate::tile::{Subband, build_tile_component};

/// Decode one tile into per-component sample planes (still in transform
/// domain units; the multiple component transform and level shift follow).
pub(crate) fn decode_tile(
    header: &Header,
    tile_idx: u32,
    tile_data: &[u8],
    base_offset: usize,
) -> Result<Vec<Plane>> {
    let num_components = header.size.components.len();

    let mut components: Vec<_> = (0..num_components)
        .map(|c| build_tile_component(header, tile_idx, c))
        .collect();

    packet::parse_packets(tile_data, header, &mut components, base_offset)?;

    let mut planes = Vec::with_capacity(num_components);

    for (comp_idx, tc) in components.iter_mut().enumerate() {
        for resolution in &mut tc.resolutions {
            for band in &mut resolution.subbands {
                decode_subband(band, tile_data, base_offset)?;
            }
        }

        let kernel = header.coding[comp_idx].kernel;
        planes.push(dwt::apply(&tc.resolutions, kernel));
    }

    Ok(planes)
}

/// Run Tier-1 over every code-block of a subband and place the dequantized
/// coefficients into the subband's buffer.
fn decode_subband(band: &mut Subband, tile_data: &[u8], base_offset: usize) -> Result<()> {
    let band_rect = band.rect;
    let band_width = band_rect.width() as usize;

    let mut decoded = Vec::new();

    for precinct in &band.precincts {
        for block in &precinct.code_blocks {
            if block.num_passes == 0 || block.rect.is_empty() {
                continue;
            }

            let mut data = Vec::new();

            for &(start, len) in &block.segments {
                data.extend_from_slice(&tile_data[start..start + len]);
            }

            let result = t1::decode_block(
                &data,
                block.rect.width() as usize,
                block.rect.height() as usize,
                band.kind,
                band.num_bit_planes,
                block.missing_bit_planes,
                block.num_passes,
                base_offset,
            )?;

            decoded.push((block.rect, result));
        }
    }

    for (rect, block) in decoded {
        let x_off = (rect.x0 - band_rect.x0) as usize;
        let y_off = (rect.y0 - band_rect.y0) as usize;
        let width = rect.width() as usize;

        for (row, coeffs) in block.coefficients.chunks_exact(width).enumerate() {
            let dst = (y_off + row) * band_width + x_off;

            for (out, &q) in band.coefficients[dst..dst + width].iter_mut().zip(coeffs) {
                *out = dequantize(q, band.reversible, band.delta);
            }
        }
    }

    Ok(())
}

/// E.1: reversible coefficients pass through; irreversible ones are scaled
/// by the step size with a half-bin reconstruction offset.
#[inline]
fn dequantize(q: i32, reversible: bool, delta: f32) -> f32 {
    if reversible {
        q as f32
    } else if q > 0 {
        (q as f32 + 0.5) * delta
    } else if q < 0 {
        (q as f32 - 0.5) * delta
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dequantize_is_odd_symmetric() {
        assert_eq!(dequantize(0, false, 2.0), 0.0);
        assert_eq!(dequantize(3, false, 2.0), 7.0);
        assert_eq!(dequantize(-3, false, 2.0), -7.0);
        assert_eq!(dequantize(5, true, 2.0), 5.0);
        assert_eq!(dequantize(-5, true, 2.0), -5.0);
    }
}
