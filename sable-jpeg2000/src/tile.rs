//! Tile, resolution, subband, precinct and code-block geometry
//! (ISO/IEC 15444-1 B.3-B.7).

use crate::codestream::{Header, QuantizationStyle, SizeData, WaveletKernel};
use crate::tag_tree::TagTree;

/// A half-open rectangle on one of the coordinate grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Rect {
    pub(crate) x0: u32,
    pub(crate) y0: u32,
    pub(crate) x1: u32,
    pub(crate) y1: u32,
}

impl Rect {
    pub(crate) fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub(crate) fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub(crate) fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }

    pub(crate) fn intersect(&self, other: Rect) -> Rect {
        Rect {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        }
    }

    /// Divide all coordinates by `2^shift`, rounding the origin up and the
    /// far edge up (ceil division on both bounds).
    fn ceil_shift(&self, shift: u8) -> Rect {
        Rect {
            x0: ceil_div_pow2(self.x0, shift),
            y0: ceil_div_pow2(self.y0, shift),
            x1: ceil_div_pow2(self.x1, shift),
            y1: ceil_div_pow2(self.y1, shift),
        }
    }
}

pub(crate) fn ceil_div_pow2(value: u32, shift: u8) -> u32 {
    let div = 1_u64 << shift;
    ((value as u64 + div - 1) >> shift) as u32
}

/// One of the four subband orientations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubbandKind {
    LowLow,
    HighLow,
    LowHigh,
    HighHigh,
}

impl SubbandKind {
    /// The horizontal/vertical orientation offsets (xob, yob) from Table B.1.
    fn orientation(&self) -> (u32, u32) {
        match self {
            Self::LowLow => (0, 0),
            Self::HighLow => (1, 0),
            Self::LowHigh => (0, 1),
            Self::HighHigh => (1, 1),
        }
    }

    /// The log2 gain of the subband (Table E.1).
    pub(crate) fn gain(&self) -> u8 {
        match self {
            Self::LowLow => 0,
            Self::HighLow | Self::LowHigh => 1,
            Self::HighHigh => 2,
        }
    }
}

/// One code-block within a precinct.
#[derive(Debug, Clone)]
pub(crate) struct CodeBlock {
    /// The code-block area in subband coordinates.
    pub(crate) rect: Rect,
    /// Position within the precinct's code-block grid.
    pub(crate) x_idx: u32,
    pub(crate) y_idx: u32,
    /// Whether the code-block has been included in any previous layer.
    pub(crate) included: bool,
    /// The number of missing (all-zero) most significant bit-planes.
    pub(crate) missing_bit_planes: u8,
    /// Total coding passes accumulated over all layers so far.
    pub(crate) num_passes: u32,
    /// The Lblock state variable for length decoding (B.10.7.1).
    pub(crate) l_block: u32,
    /// Byte ranges of this code-block's segments within the tile data, in
    /// layer order.
    pub(crate) segments: Vec<(usize, usize)>,
}

/// One precinct of a subband.
#[derive(Debug, Clone)]
pub(crate) struct Precinct {
    /// Code-blocks in raster order over the precinct's code-block grid.
    pub(crate) code_blocks: Vec<CodeBlock>,
    pub(crate) grid_width: u32,
    pub(crate) inclusion_tree: TagTree,
    pub(crate) zero_planes_tree: TagTree,
}

/// One subband of a resolution.
#[derive(Debug, Clone)]
pub(crate) struct Subband {
    pub(crate) kind: SubbandKind,
    /// The subband area in subband coordinates.
    pub(crate) rect: Rect,
    /// Precincts in raster order over the resolution's precinct grid.
    pub(crate) precincts: Vec<Precinct>,
    /// The number of magnitude bit-planes Mb (E-2).
    pub(crate) num_bit_planes: u8,
    /// The quantization step size; 1.0 on the reversible path.
    pub(crate) delta: f32,
    /// Whether coefficients are exact integers (reversible path).
    pub(crate) reversible: bool,
    /// Dequantized coefficients in raster order over `rect`.
    pub(crate) coefficients: Vec<f32>,
}

/// One resolution level of a tile-component.
#[derive(Debug, Clone)]
pub(crate) struct Resolution {
    /// The resolution area in resolution coordinates.
    pub(crate) rect: Rect,
    pub(crate) precincts_x: u32,
    pub(crate) precincts_y: u32,
    /// Precinct exponents (PPx, PPy) on the resolution grid.
    pub(crate) precinct_exp: (u8, u8),
    /// `[LL]` at resolution zero, `[HL, LH, HH]` above.
    pub(crate) subbands: Vec<Subband>,
}

impl Resolution {
    pub(crate) fn num_precincts(&self) -> u32 {
        self.precincts_x * self.precincts_y
    }
}

/// One component of one tile.
#[derive(Debug, Clone)]
pub(crate) struct TileComponent {
    /// The tile-component area on the component grid.
    pub(crate) rect: Rect,
    pub(crate) resolutions: Vec<Resolution>,
}

/// The rectangle of tile `idx` on the reference grid (B-7).
pub(crate) fn tile_rect(size: &SizeData, idx: u32) -> Rect {
    let p = idx % size.tiles_x();
    let q = idx / size.tiles_x();

    let x0 = (size.tile_x_offset + p * size.tile_width).max(size.grid_x_offset);
    let y0 = (size.tile_y_offset + q * size.tile_height).max(size.grid_y_offset);
    let x1 = (size.tile_x_offset + (p + 1) * size.tile_width).min(size.grid_width);
    let y1 = (size.tile_y_offset + (q + 1) * size.tile_height).min(size.grid_height);

    Rect::new(x0, y0, x1, y1)
}

/// Build the full geometry of one tile-component.
pub(crate) fn build_tile_component(header: &Header, tile_idx: u32, comp: usize) -> TileComponent {
    let size = &header.size;
    let coding = &header.coding[comp];
    let quant = &header.quantization[comp];
    let component = &size.components[comp];

    let tile = tile_rect(size, tile_idx);

    // Tile-component rectangle on the component grid (B-12).
    let tc_rect = Rect {
        x0: tile.x0.div_ceil(component.dx as u32),
        y0: tile.y0.div_ceil(component.dy as u32),
        x1: tile.x1.div_ceil(component.dx as u32),
        y1: tile.y1.div_ceil(component.dy as u32),
    };

    let num_decompositions = coding.num_decompositions;
    let mut resolutions = Vec::with_capacity(num_decompositions as usize + 1);

    for r in 0..=num_decompositions {
        // Resolution rectangle (B-14).
        let res_rect = tc_rect.ceil_shift(num_decompositions - r);
        let (ppx, ppy) = coding.precinct_exp(r);

        let (precincts_x, precincts_y) = if res_rect.is_empty() {
            (0, 0)
        } else {
            (
                ceil_div_pow2(res_rect.x1, ppx) - (res_rect.x0 >> ppx),
                ceil_div_pow2(res_rect.y1, ppy) - (res_rect.y0 >> ppy),
            )
        };

        let kinds: &[SubbandKind] = if r == 0 {
            &[SubbandKind::LowLow]
        } else {
            &[
                SubbandKind::HighLow,
                SubbandKind::LowHigh,
                SubbandKind::HighHigh,
            ]
        };

        let mut subbands = Vec::with_capacity(kinds.len());

        for (band_idx, &kind) in kinds.iter().enumerate() {
            // Decomposition depth of this subband (B-15).
            let depth = if r == 0 {
                num_decompositions
            } else {
                num_decompositions - r + 1
            };

            let rect = subband_rect(tc_rect, kind, depth);

            // Quantization step index in the standard subband ordering.
            let step_idx = if r == 0 {
                0
            } else {
                3 * (r as usize - 1) + band_idx + 1
            };

            let (exponent, mantissa) = quant
                .step_for(step_idx, r, num_decompositions)
                .unwrap_or((component.precision, 0));

            let num_bit_planes =
                (quant.guard_bits as i32 + exponent as i32 - 1).clamp(0, 31) as u8;

            let reversible = coding.kernel == WaveletKernel::Reversible53
                && quant.style == QuantizationStyle::None;

            let delta = if reversible {
                1.0
            } else {
                // E-3: the nominal dynamic range includes the subband gain.
                let dynamic_range = component.precision as i32 + kind.gain() as i32;
                let exp = dynamic_range - exponent as i32;
                (1.0 + mantissa as f32 / 2048.0) * 2.0_f32.powi(exp)
            };

            let precincts = build_precincts(
                rect,
                res_rect,
                r,
                (ppx, ppy),
                (precincts_x, precincts_y),
                coding.cb_width_exp,
                coding.cb_height_exp,
            );

            let coefficients = vec![0.0; rect.width() as usize * rect.height() as usize];

            subbands.push(Subband {
                kind,
                rect,
                precincts,
                num_bit_planes,
                delta,
                reversible,
                coefficients,
            });
        }

        resolutions.push(Resolution {
            rect: res_rect,
            precincts_x,
            precincts_y,
            precinct_exp: (ppx, ppy),
            subbands,
        });
    }

    TileComponent {
        rect: tc_rect,
        resolutions,
    }
}

/// The rectangle of a subband at the given decomposition depth (B-15).
fn subband_rect(tc_rect: Rect, kind: SubbandKind, depth: u8) -> Rect {
    let (xob, yob) = kind.orientation();
    let half = 1_u64 << (depth - 1);

    let bound = |v: u32, ob: u32| -> u32 {
        let shifted = (v as u64).saturating_sub(half * ob as u64);
        ((shifted + (1 << depth) - 1) >> depth) as u32
    };

    Rect {
        x0: bound(tc_rect.x0, xob),
        y0: bound(tc_rect.y0, yob),
        x1: bound(tc_rect.x1, xob),
        y1: bound(tc_rect.y1, yob),
    }
}

/// Partition one subband into precincts and code-blocks.
#[allow(clippy::too_many_arguments)]
fn build_precincts(
    band_rect: Rect,
    res_rect: Rect,
    resolution: u8,
    (ppx, ppy): (u8, u8),
    (precincts_x, precincts_y): (u32, u32),
    cb_width_exp: u8,
    cb_height_exp: u8,
) -> Vec<Precinct> {
    let mut precincts = Vec::with_capacity((precincts_x * precincts_y) as usize);

    if precincts_x == 0 || precincts_y == 0 {
        return precincts;
    }

    // Above resolution zero, the subband grid is half the resolution grid.
    let shift = if resolution == 0 { 0 } else { 1 };
    let cbw = cb_width_exp.min(ppx - shift);
    let cbh = cb_height_exp.min(ppy - shift);

    let pu0 = res_rect.x0 >> ppx;
    let pv0 = res_rect.y0 >> ppy;

    for v in 0..precincts_y {
        for u in 0..precincts_x {
            // Unclipped precinct cell on the resolution grid, mapped onto the
            // subband grid.
            let cell = Rect {
                x0: ((pu0 + u) << ppx) >> shift,
                y0: ((pv0 + v) << ppy) >> shift,
                x1: ((pu0 + u + 1) << ppx) >> shift,
                y1: ((pv0 + v + 1) << ppy) >> shift,
            };

            let area = cell.intersect(band_rect);

            let (grid_w, grid_h) = if area.is_empty() {
                (0, 0)
            } else {
                (
                    ceil_div_pow2(area.x1, cbw) - (area.x0 >> cbw),
                    ceil_div_pow2(area.y1, cbh) - (area.y0 >> cbh),
                )
            };

            let mut code_blocks = Vec::with_capacity((grid_w * grid_h) as usize);

            for j in 0..grid_h {
                for i in 0..grid_w {
                    let cu = (area.x0 >> cbw) + i;
                    let cv = (area.y0 >> cbh) + j;

                    let block_rect = Rect {
                        x0: cu << cbw,
                        y0: cv << cbh,
                        x1: (cu + 1) << cbw,
                        y1: (cv + 1) << cbh,
                    }
                    .intersect(area);

                    code_blocks.push(CodeBlock {
                        rect: block_rect,
                        x_idx: i,
                        y_idx: j,
                        included: false,
                        missing_bit_planes: 0,
                        num_passes: 0,
                        l_block: 3,
                        segments: Vec::new(),
                    });
                }
            }

            precincts.push(Precinct {
                code_blocks,
                grid_width: grid_w,
                inclusion_tree: TagTree::new(grid_w.max(1), grid_h.max(1)),
                zero_planes_tree: TagTree::new(grid_w.max(1), grid_h.max(1)),
            });
        }
    }

    precincts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codestream::{
        CodingParameters, ComponentSize, GlobalCodingStyle, Header, ProgressionOrder,
        Quantization, QuantizationStyle, SizeData, WaveletKernel,
    };

    fn test_header(width: u32, height: u32, decompositions: u8) -> Header {
        Header {
            size: SizeData {
                grid_width: width,
                grid_height: height,
                grid_x_offset: 0,
                grid_y_offset: 0,
                tile_width: width,
                tile_height: height,
                tile_x_offset: 0,
                tile_y_offset: 0,
                components: vec![ComponentSize {
                    precision: 8,
                    signed: false,
                    dx: 1,
                    dy: 1,
                }],
            },
            global: GlobalCodingStyle {
                progression_order: ProgressionOrder::Lrcp,
                num_layers: 1,
                mct: false,
                uses_sop: false,
                uses_eph: false,
            },
            coding: vec![CodingParameters {
                num_decompositions: decompositions,
                cb_width_exp: 6,
                cb_height_exp: 6,
                precinct_exps: vec![(15, 15); decompositions as usize + 1],
                kernel: WaveletKernel::Reversible53,
            }],
            quantization: vec![Quantization {
                style: QuantizationStyle::None,
                guard_bits: 2,
                steps: vec![(9, 0); 1 + 3 * decompositions as usize],
            }],
        }
    }

    #[test]
    fn single_level_16x16_subbands() {
        // 16x16 with one 5/3 decomposition: the LL subband is 8x8.
        let header = test_header(16, 16, 1);
        let tc = build_tile_component(&header, 0, 0);

        assert_eq!(tc.rect, Rect::new(0, 0, 16, 16));
        assert_eq!(tc.resolutions.len(), 2);

        let ll = &tc.resolutions[0].subbands[0];
        assert_eq!(ll.kind, SubbandKind::LowLow);
        assert_eq!(ll.rect, Rect::new(0, 0, 8, 8));

        for band in &tc.resolutions[1].subbands {
            assert_eq!(band.rect.width(), 8);
            assert_eq!(band.rect.height(), 8);
        }
    }

    #[test]
    fn odd_sizes_split_unevenly() {
        // A 9x7 image with one decomposition: low halves take the extra
        // sample.
        let header = test_header(9, 7, 1);
        let tc = build_tile_component(&header, 0, 0);

        let ll = &tc.resolutions[0].subbands[0];
        assert_eq!((ll.rect.width(), ll.rect.height()), (5, 4));

        let hl = &tc.resolutions[1].subbands[0];
        assert_eq!(hl.kind, SubbandKind::HighLow);
        assert_eq!((hl.rect.width(), hl.rect.height()), (4, 4));

        let lh = &tc.resolutions[1].subbands[1];
        assert_eq!((lh.rect.width(), lh.rect.height()), (5, 3));

        let hh = &tc.resolutions[1].subbands[2];
        assert_eq!((hh.rect.width(), hh.rect.height()), (4, 3));
    }

    #[test]
    fn code_blocks_cover_each_subband() {
        let header = test_header(200, 120, 2);
        let tc = build_tile_component(&header, 0, 0);

        for res in &tc.resolutions {
            for band in &res.subbands {
                let mut covered = 0;

                for precinct in &band.precincts {
                    for block in &precinct.code_blocks {
                        covered += block.rect.width() as u64 * block.rect.height() as u64;
                    }
                }

                assert_eq!(
                    covered,
                    band.rect.width() as u64 * band.rect.height() as u64,
                    "code blocks must tile the subband"
                );
            }
        }
    }

    #[test]
    fn bit_plane_count_follows_guard_and_exponent() {
        let header = test_header(16, 16, 1);
        let tc = build_tile_component(&header, 0, 0);

        // Mb = guard + epsilon - 1 = 2 + 9 - 1.
        let ll = &tc.resolutions[0].subbands[0];
        assert_eq!(ll.num_bit_planes, 10);
        assert!(ll.reversible);
        assert_eq!(ll.delta, 1.0);
    }
}
