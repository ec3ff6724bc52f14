//! Dequantization and the 8x8 inverse DCT (ITU T.81 A.3.3).

use std::sync::LazyLock;

/// `BASIS[x][u] = 0.5 * C(u) * cos((2x + 1) * u * pi / 16)`, so that one
/// 1-D pass is `out[x] = sum_u BASIS[x][u] * in[u]` and two passes yield the
/// 2-D inverse transform including its 1/4 normalization.
static BASIS: LazyLock<[[f32; 8]; 8]> = LazyLock::new(|| {
    let mut basis = [[0.0_f32; 8]; 8];

    for (x, row) in basis.iter_mut().enumerate() {
        for (u, value) in row.iter_mut().enumerate() {
            let c = if u == 0 {
                1.0 / f64::sqrt(2.0)
            } else {
                1.0
            };
            let angle = (2 * x + 1) as f64 * u as f64 * std::f64::consts::PI / 16.0;

            *value = (0.5 * c * angle.cos()) as f32;
        }
    }

    basis
});

/// Dequantize one block of coefficients and apply the inverse DCT, producing
/// 8-bit samples (level shift +128, clamped to 0..=255).
///
/// An all-zero coefficient block yields a block of exactly 128.
pub(crate) fn dequantize_and_idct(coefficients: &[i16; 64], quant: &[u16; 64]) -> [u8; 64] {
    let mut dequantized = [0.0_f32; 64];

    for (k, value) in dequantized.iter_mut().enumerate() {
        *value = coefficients[k] as i32 as f32 * quant[k] as f32;
    }

    let basis = &*BASIS;
    let mut tmp = [0.0_f32; 64];

    // Columns.
    for x in 0..8 {
        for y in 0..8 {
            let mut sum = 0.0;

            for v in 0..8 {
                sum += basis[y][v] * dequantized[v * 8 + x];
            }

            tmp[y * 8 + x] = sum;
        }
    }

    // Rows, then level shift and clamp.
    let mut out = [0_u8; 64];

    for y in 0..8 {
        for x in 0..8 {
            let mut sum = 0.0;

            for u in 0..8 {
                sum += basis[x][u] * tmp[y * 8 + u];
            }

            out[y * 8 + x] = (sum + 128.0).round().clamp(0.0, 255.0) as u8;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAT_QUANT: [u16; 64] = [1; 64];

    #[test]
    fn all_zero_block_is_mid_gray() {
        let block = [0_i16; 64];
        let pixels = dequantize_and_idct(&block, &FLAT_QUANT);
        assert!(pixels.iter().all(|&p| p == 128));
    }

    #[test]
    fn dc_only_block_is_flat() {
        // A DC value of V with quantizer 1 reconstructs to round(V / 8) + 128
        // everywhere.
        for v in [-1024_i16, -8, 8, 24, 40, 400, 1016] {
            let mut block = [0_i16; 64];
            block[0] = v;

            let expected = ((v as f32 / 8.0).round() + 128.0).clamp(0.0, 255.0) as u8;
            let pixels = dequantize_and_idct(&block, &FLAT_QUANT);

            assert!(
                pixels.iter().all(|&p| p == expected),
                "DC {v} should reconstruct to {expected}"
            );
        }
    }

    #[test]
    fn matches_naive_reference_within_one_lsb() {
        // Compare against a direct double-precision evaluation of the
        // 2-D inverse transform definition.
        fn reference(coefficients: &[i16; 64]) -> [u8; 64] {
            let mut out = [0_u8; 64];

            for y in 0..8 {
                for x in 0..8 {
                    let mut sum = 0.0_f64;

                    for v in 0..8 {
                        for u in 0..8 {
                            let cu = if u == 0 { 1.0 / f64::sqrt(2.0) } else { 1.0 };
                            let cv = if v == 0 { 1.0 / f64::sqrt(2.0) } else { 1.0 };
                            sum += 0.25
                                * cu
                                * cv
                                * coefficients[v * 8 + u] as f64
                                * f64::cos((2 * x + 1) as f64 * u as f64 * std::f64::consts::PI
                                    / 16.0)
                                * f64::cos((2 * y + 1) as f64 * v as f64 * std::f64::consts::PI
                                    / 16.0);
                        }
                    }

                    out[y * 8 + x] = (sum + 128.0).round().clamp(0.0, 255.0) as u8;
                }
            }

            out
        }

        // A deterministic pseudo-random coefficient block.
        let mut block = [0_i16; 64];
        let mut state = 0x2545_F491_u32;

        for value in block.iter_mut() {
            state = state.wrapping_mul(747796405).wrapping_add(2891336453);
            *value = ((state >> 16) as i16) % 512;
        }

        let fast = dequantize_and_idct(&block, &FLAT_QUANT);
        let naive = reference(&block);

        for (a, b) in fast.iter().zip(naive.iter()) {
            assert!(a.abs_diff(*b) <= 1, "IDCT differs by more than 1 LSB");
        }
    }
}
