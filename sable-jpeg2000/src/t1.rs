//! Tier-1 code-block decoding: EBCOT context modelling over the MQ coder
//! (ISO/IEC 15444-1 Annex D).
//!
//! Each code-block is decoded bit-plane by bit-plane. The first plane has
//! only a cleanup pass; every further plane runs significance propagation,
//! magnitude refinement and cleanup, in that order. Within a pass, samples
//! are visited in stripes of four rows, top to bottom inside each column.

use sable_common::mq::{MqContext, MqDecoder};

use crate::error::{DecodeError, DecodingError, Result};
use crate::tile::SubbandKind;

/// Context labels. 0..=8 are the zero-coding contexts, 9..=13 sign coding,
/// 14..=16 magnitude refinement, 17 run-length, 18 uniform.
const CTX_RUN_LENGTH: usize = 17;
const CTX_UNIFORM: usize = 18;
const NUM_CONTEXTS: usize = 19;

const SIGNIFICANT: u8 = 1;
/// Set when a sample was coded in the significance-propagation pass of the
/// current bit-plane; cleared after each cleanup pass.
const VISITED: u8 = 2;
const REFINED: u8 = 4;
const NEGATIVE: u8 = 8;

/// A decoded code-block: signed integer coefficients in raster order.
pub(crate) struct DecodedBlock {
    pub(crate) coefficients: Vec<i32>,
}

struct BlockState {
    width: usize,
    height: usize,
    /// Per-sample flag bits, padded by one sample on every side so neighbour
    /// lookups need no bounds checks.
    flags: Vec<u8>,
    padded_width: usize,
    magnitudes: Vec<u32>,
    /// Number of magnitude bits decoded so far per sample.
    bits: Vec<u8>,
    contexts: [MqContext; NUM_CONTEXTS],
    band: SubbandKind,
}

impl BlockState {
    fn new(width: usize, height: usize, band: SubbandKind) -> Self {
        let padded_width = width + 2;
        let padded = padded_width * (height + 2);

        let mut state = Self {
            width,
            height,
            flags: vec![0; padded],
            padded_width,
            magnitudes: vec![0; width * height],
            bits: vec![0; width * height],
            contexts: [MqContext::default(); NUM_CONTEXTS],
            band,
        };
        state.reset_contexts();
        state
    }

    /// Initial context states from Table D.7.
    fn reset_contexts(&mut self) {
        for ctx in &mut self.contexts {
            *ctx = MqContext::default();
        }

        self.contexts[0] = MqContext::new(4, 0);
        self.contexts[CTX_RUN_LENGTH] = MqContext::new(3, 0);
        self.contexts[CTX_UNIFORM] = MqContext::new(46, 0);
    }

    #[inline]
    fn flag_idx(&self, x: usize, y: usize) -> usize {
        (y + 1) * self.padded_width + (x + 1)
    }

    #[inline]
    fn flags_at(&self, x: usize, y: usize) -> u8 {
        self.flags[self.flag_idx(x, y)]
    }

    #[inline]
    fn is_significant(&self, x: usize, y: usize) -> bool {
        self.flags_at(x, y) & SIGNIFICANT != 0
    }

    /// Significance of the eight neighbours as (horizontal, vertical,
    /// diagonal) counts.
    #[inline]
    fn neighbourhood(&self, x: usize, y: usize) -> (u32, u32, u32) {
        let idx = self.flag_idx(x, y);
        let sig = |i: usize| (self.flags[i] & SIGNIFICANT != 0) as u32;

        let h = sig(idx - 1) + sig(idx + 1);
        let v = sig(idx - self.padded_width) + sig(idx + self.padded_width);
        let d = sig(idx - self.padded_width - 1)
            + sig(idx - self.padded_width + 1)
            + sig(idx + self.padded_width - 1)
            + sig(idx + self.padded_width + 1);

        (h, v, d)
    }

    /// The zero-coding context label from Table D.1.
    fn zc_context(&self, x: usize, y: usize) -> usize {
        let (mut h, mut v, d) = self.neighbourhood(x, y);

        match self.band {
            SubbandKind::HighLow => core::mem::swap(&mut h, &mut v),
            SubbandKind::LowLow | SubbandKind::LowHigh => {}
            SubbandKind::HighHigh => {
                let hv = h + v;

                return match (d, hv) {
                    (0, 0) => 0,
                    (0, 1) => 1,
                    (0, _) => 2,
                    (1, 0) => 3,
                    (1, 1) => 4,
                    (1, _) => 5,
                    (2, 0) => 6,
                    (2, _) => 7,
                    _ => 8,
                } as usize;
            }
        }

        (match (h, v, d) {
            (0, 0, 0) => 0,
            (0, 0, 1) => 1,
            (0, 0, _) => 2,
            (0, 1, _) => 3,
            (0, 2, _) => 4,
            (1, 0, 0) => 5,
            (1, 0, _) => 6,
            (1, _, _) => 7,
            (2, _, _) => 8,
            _ => unreachable!(),
        }) as usize
    }

    /// The sign-coding context label and XOR bit from Table D.3.
    fn sc_context(&self, x: usize, y: usize) -> (usize, u32) {
        let idx = self.flag_idx(x, y);

        // Each neighbour contributes +1 when significant and positive, -1
        // when significant and negative; contributions clamp to [-1, 1].
        let contribution = |i: usize| -> i32 {
            let flags = self.flags[i];

            if flags & SIGNIFICANT == 0 {
                0
            } else if flags & NEGATIVE != 0 {
                -1
            } else {
                1
            }
        };

        let h = (contribution(idx - 1) + contribution(idx + 1)).clamp(-1, 1);
        let v = (contribution(idx - self.padded_width) + contribution(idx + self.padded_width))
            .clamp(-1, 1);

        match (h, v) {
            (1, 1) => (13, 0),
            (1, 0) => (12, 0),
            (1, -1) => (11, 0),
            (0, 1) => (10, 0),
            (0, 0) => (9, 0),
            (0, -1) => (10, 1),
            (-1, 1) => (11, 1),
            (-1, 0) => (12, 1),
            (-1, -1) => (13, 1),
            _ => unreachable!(),
        }
    }

    /// The magnitude-refinement context label from Table D.4.
    fn mr_context(&self, x: usize, y: usize) -> usize {
        if self.flags_at(x, y) & REFINED != 0 {
            16
        } else {
            let (h, v, d) = self.neighbourhood(x, y);

            if h + v + d > 0 { 15 } else { 14 }
        }
    }

    #[inline]
    fn push_bit(&mut self, x: usize, y: usize, bit: u32) {
        let idx = y * self.width + x;
        self.magnitudes[idx] = (self.magnitudes[idx] << 1) | bit;
        self.bits[idx] += 1;
    }

    fn set_flag(&mut self, x: usize, y: usize, flag: u8) {
        let idx = self.flag_idx(x, y);
        self.flags[idx] |= flag;
    }

    fn decode_sign(&mut self, decoder: &mut MqDecoder<'_>, x: usize, y: usize) {
        let (ctx, xor) = self.sc_context(x, y);
        let bit = decoder.decode(&mut self.contexts[ctx]) ^ xor;

        if bit != 0 {
            self.set_flag(x, y, NEGATIVE);
        }
    }

    /// The significance propagation pass (D.3.1).
    fn significance_pass(&mut self, decoder: &mut MqDecoder<'_>) {
        self.for_each_sample(|state, decoder, x, y| {
            if !state.is_significant(x, y) && state.zc_context(x, y) != 0 {
                let ctx = state.zc_context(x, y);
                let bit = decoder.decode(&mut state.contexts[ctx]);

                state.push_bit(x, y, bit);
                state.set_flag(x, y, VISITED);

                if bit != 0 {
                    state.decode_sign(decoder, x, y);
                    state.set_flag(x, y, SIGNIFICANT);
                }
            }

            1
        }, decoder);
    }

    /// The magnitude refinement pass (D.3.3).
    fn refinement_pass(&mut self, decoder: &mut MqDecoder<'_>) {
        self.for_each_sample(|state, decoder, x, y| {
            let flags = state.flags_at(x, y);

            if flags & SIGNIFICANT != 0 && flags & VISITED == 0 {
                let ctx = state.mr_context(x, y);
                let bit = decoder.decode(&mut state.contexts[ctx]);

                state.push_bit(x, y, bit);
                state.set_flag(x, y, REFINED);
            }

            1
        }, decoder);
    }

    /// The cleanup pass (D.3.4), including the run-length shortcut for
    /// all-clear stripe columns.
    fn cleanup_pass(&mut self, decoder: &mut MqDecoder<'_>) {
        self.for_each_sample(|state, decoder, x, y| {
            let flags = state.flags_at(x, y);

            if flags & (SIGNIFICANT | VISITED) != 0 {
                return 1;
            }

            // Run-length mode: the column starts a full stripe of four
            // samples, none of which has a significant neighbour.
            let use_run_length = y % 4 == 0
                && state.height - y >= 4
                && (0..4).all(|dy| {
                    let (h, v, d) = state.neighbourhood(x, y + dy);
                    h + v + d == 0 && state.flags_at(x, y + dy) & VISITED == 0
                });

            if use_run_length {
                let bit = decoder.decode(&mut state.contexts[CTX_RUN_LENGTH]);

                if bit == 0 {
                    // All four samples stay insignificant in this plane.
                    for dy in 0..4 {
                        state.push_bit(x, y + dy, 0);
                    }

                    return 4;
                }

                // Two uniform-context bits give the first significant row.
                let mut first = decoder.decode(&mut state.contexts[CTX_UNIFORM]);
                first = (first << 1) | decoder.decode(&mut state.contexts[CTX_UNIFORM]);

                for dy in 0..first as usize {
                    state.push_bit(x, y + dy, 0);
                }

                let sy = y + first as usize;
                state.push_bit(x, sy, 1);
                state.decode_sign(decoder, x, sy);
                state.set_flag(x, sy, SIGNIFICANT);

                return first as usize + 1;
            }

            let ctx = state.zc_context(x, y);
            let bit = decoder.decode(&mut state.contexts[ctx]);
            state.push_bit(x, y, bit);

            if bit != 0 {
                state.decode_sign(decoder, x, y);
                state.set_flag(x, y, SIGNIFICANT);
            }

            1
        }, decoder);

        // The visited marks only distinguish passes within one bit-plane.
        for flags in &mut self.flags {
            *flags &= !VISITED;
        }
    }

    /// Visit samples in stripe order. The callback returns how many samples
    /// of the current column it consumed.
    fn for_each_sample(
        &mut self,
        mut action: impl FnMut(&mut Self, &mut MqDecoder<'_>, usize, usize) -> usize,
        decoder: &mut MqDecoder<'_>,
    ) {
        for stripe in (0..self.height).step_by(4) {
            let stripe_end = (stripe + 4).min(self.height);

            for x in 0..self.width {
                let mut y = stripe;

                while y < stripe_end {
                    y += action(self, decoder, x, y);
                }
            }
        }
    }
}

/// Decode one code-block from its concatenated segment bytes.
///
/// `num_bit_planes` is Mb for the subband; `missing_bit_planes` the P value
/// signalled in the packet header; `num_passes` the total coding passes
/// received across layers.
pub(crate) fn decode_block(
    data: &[u8],
    width: usize,
    height: usize,
    band: SubbandKind,
    num_bit_planes: u8,
    missing_bit_planes: u8,
    num_passes: u32,
    offset: usize,
) -> Result<DecodedBlock> {
    let mut coefficients = vec![0_i32; width * height];

    let planes = num_bit_planes.saturating_sub(missing_bit_planes);

    if planes == 0 || num_passes == 0 {
        return Ok(DecodedBlock { coefficients });
    }

    // 3 * planes - 2: a cleanup-only first plane, three passes per plane
    // after that.
    let max_passes = 3 * planes as u32 - 2;

    if num_passes > max_passes {
        return Err(DecodeError::new(DecodingError::TooManyCodingPasses, offset));
    }

    let mut state = BlockState::new(width, height, band);
    let mut decoder = MqDecoder::new(data);

    for pass in 0..num_passes {
        match pass % 3 {
            0 => state.cleanup_pass(&mut decoder),
            1 => state.significance_pass(&mut decoder),
            2 => state.refinement_pass(&mut decoder),
            _ => unreachable!(),
        }
    }

    // Samples whose low bit-planes were never coded are padded with zeros,
    // so every magnitude is expressed relative to plane zero.
    for (idx, value) in coefficients.iter_mut().enumerate() {
        let (x, y) = (idx % width, idx / width);
        let missing = planes - state.bits[idx];
        let magnitude = state.magnitudes[idx] << missing;

        *value = if state.flags_at(x, y) & NEGATIVE != 0 {
            -(magnitude as i32)
        } else {
            magnitude as i32
        };
    }

    Ok(DecodedBlock { coefficients })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_block_decodes_to_zeros() {
        let block = decode_block(&[], 8, 8, SubbandKind::LowLow, 8, 8, 0, 0).unwrap();
        assert!(block.coefficients.iter().all(|&c| c == 0));
    }

    #[test]
    fn rejects_excess_passes() {
        let result = decode_block(&[0x00], 8, 8, SubbandKind::LowLow, 2, 0, 10, 0);
        assert!(result.is_err());
    }

    #[test]
    fn zc_context_table_is_monotone_in_significance() {
        let state = BlockState::new(4, 4, SubbandKind::LowLow);
        // With no significant neighbours the context is the all-clear one.
        assert_eq!(state.zc_context(1, 1), 0);
    }

    #[test]
    fn sign_context_is_symmetric() {
        let mut state = BlockState::new(3, 3, SubbandKind::LowLow);

        // A positive significant left neighbour selects context 12 with no
        // flip; a negative one selects the same context with a flip.
        state.set_flag(0, 1, SIGNIFICANT);
        assert_eq!(state.sc_context(1, 1), (12, 0));

        state.set_flag(0, 1, NEGATIVE);
        assert_eq!(state.sc_context(1, 1), (12, 1));
    }
}
