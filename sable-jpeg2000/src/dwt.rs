//! The inverse discrete wavelet transform (ISO/IEC 15444-1 Annex F).

use crate::codestream::WaveletKernel;
use crate::tile::{Rect, Resolution, Subband, SubbandKind};

/// Inverse 9/7 lifting constants (Table F.4).
const ALPHA: f32 = -1.586_134_3;
const BETA: f32 = -0.052_980_117;
const GAMMA: f32 = 0.882_911_1;
const DELTA: f32 = 0.443_506_85;
const K: f32 = 1.230_174_1;

/// A reconstructed sample plane with its position on the coordinate grid.
pub(crate) struct Plane {
    pub(crate) rect: Rect,
    pub(crate) samples: Vec<f32>,
}

/// Run the multi-level inverse transform over a tile-component's
/// resolutions, consuming the subband coefficients.
///
/// Resolution 0 provides the starting LL band; every further resolution
/// contributes HL/LH/HH and doubles the reconstruction.
pub(crate) fn apply(resolutions: &[Resolution], kernel: WaveletKernel) -> Plane {
    let ll = &resolutions[0].subbands[0];

    let mut current = Plane {
        rect: ll.rect,
        samples: ll.coefficients.clone(),
    };

    for resolution in &resolutions[1..] {
        let [hl, lh, hh] = resolution.subbands.as_slice() else {
            unreachable!("resolutions above zero carry exactly three subbands");
        };

        current = reconstruct_level(&current, hl, lh, hh, resolution.rect, kernel);
    }

    current
}

/// The 2D_SR procedure (F.3.2): interleave the four subbands and filter
/// columns and rows.
fn reconstruct_level(
    ll: &Plane,
    hl: &Subband,
    lh: &Subband,
    hh: &Subband,
    rect: Rect,
    kernel: WaveletKernel,
) -> Plane {
    let mut samples = interleave(ll, hl, lh, hh, rect);

    hor_sr(&mut samples, rect, kernel);
    ver_sr(&mut samples, rect, kernel);

    Plane { rect, samples }
}

/// The 2D_INTERLEAVE procedure (F.3.3), using absolute coordinates so parity
/// is preserved for rectangles with odd origins.
fn interleave(ll: &Plane, hl: &Subband, lh: &Subband, hh: &Subband, rect: Rect) -> Vec<f32> {
    let width = rect.width() as usize;
    let mut out = vec![0.0_f32; width * rect.height() as usize];

    let mut place = |band_rect: Rect, data: &[f32], kind: SubbandKind| {
        let (xob, yob) = match kind {
            SubbandKind::LowLow => (0, 0),
            SubbandKind::HighLow => (1, 0),
            SubbandKind::LowHigh => (0, 1),
            SubbandKind::HighHigh => (1, 1),
        };

        for v in band_rect.y0..band_rect.y1 {
            for u in band_rect.x0..band_rect.x1 {
                let x = 2 * u + xob;
                let y = 2 * v + yob;

                debug_assert!(x >= rect.x0 && x < rect.x1 && y >= rect.y0 && y < rect.y1);

                let src = ((v - band_rect.y0) * band_rect.width() + (u - band_rect.x0)) as usize;
                let dst = (y - rect.y0) as usize * width + (x - rect.x0) as usize;
                out[dst] = data[src];
            }
        }
    };

    place(ll.rect, &ll.samples, SubbandKind::LowLow);
    place(hl.rect, &hl.coefficients, SubbandKind::HighLow);
    place(lh.rect, &lh.coefficients, SubbandKind::LowHigh);
    place(hh.rect, &hh.coefficients, SubbandKind::HighHigh);

    out
}

/// Margin added on each side of a line buffer for the 1D_EXTR extension.
const MARGIN: usize = 4;

/// The HOR_SR procedure (F.3.4): filter each row.
fn hor_sr(samples: &mut [f32], rect: Rect, kernel: WaveletKernel) {
    let width = rect.width() as usize;

    if width == 0 {
        return;
    }

    // Shift buffer indices so their parity matches the absolute coordinates.
    let i0 = MARGIN + (rect.x0 % 2) as usize;
    let i1 = i0 + width;

    let mut buf = vec![0.0_f32; i1 + MARGIN + 1];

    for row in 0..rect.height() as usize {
        let line = &samples[row * width..][..width];
        buf[i0..i1].copy_from_slice(line);

        one_dimensional_sr(&mut buf, i0, i1, kernel);

        samples[row * width..][..width].copy_from_slice(&buf[i0..i1]);
    }
}

/// The VER_SR procedure (F.3.5): filter each column.
fn ver_sr(samples: &mut [f32], rect: Rect, kernel: WaveletKernel) {
    let width = rect.width() as usize;
    let height = rect.height() as usize;

    if height == 0 {
        return;
    }

    let i0 = MARGIN + (rect.y0 % 2) as usize;
    let i1 = i0 + height;

    let mut buf = vec![0.0_f32; i1 + MARGIN + 1];

    for col in 0..width {
        for y in 0..height {
            buf[i0 + y] = samples[y * width + col];
        }

        one_dimensional_sr(&mut buf, i0, i1, kernel);

        for y in 0..height {
            samples[y * width + col] = buf[i0 + y];
        }
    }
}

/// The 1D_SR procedure (F.3.6).
fn one_dimensional_sr(y: &mut [f32], i0: usize, i1: usize, kernel: WaveletKernel) {
    if i0 == i1 - 1 {
        // Single-sample signal (F.3.7).
        if i0 % 2 != 0 {
            y[i0] /= 2.0;
        }

        return;
    }

    let (left, right) = extend(y, i0, i1, kernel);

    match kernel {
        WaveletKernel::Reversible53 => filter_53(y, i0, i1, left, right),
        WaveletKernel::Irreversible97 => filter_97(y, i0, i1, left, right),
    }
}

/// The 1D_EXTR procedure: whole-sample symmetric extension. Returns how many
/// samples were written on each side.
fn extend(y: &mut [f32], i0: usize, i1: usize, kernel: WaveletKernel) -> (usize, usize) {
    let (left, right) = match kernel {
        WaveletKernel::Reversible53 => {
            (if i0 % 2 == 0 { 1 } else { 2 }, if i1 % 2 == 0 { 2 } else { 1 })
        }
        WaveletKernel::Irreversible97 => {
            (if i0 % 2 == 0 { 3 } else { 4 }, if i1 % 2 == 0 { 4 } else { 3 })
        }
    };

    for i in (i0 - left)..i0 {
        y[i] = y[pse(i, i0, i1)];
    }

    for i in i1..(i1 + right) {
        y[i] = y[pse(i, i0, i1)];
    }

    (left, right)
}

/// Periodic symmetric extension, equation (F-4).
fn pse(i: usize, i0: usize, i1: usize) -> usize {
    let span = 2 * (i1 as i64 - i0 as i64 - 1);
    let m = (i as i64 - i0 as i64).rem_euclid(span);
    (i0 as i64 + m.min(span - m)) as usize
}

/// The 1D_FILTER_5-3R procedure (F.3.8.1).
fn filter_53(y: &mut [f32], i0: usize, i1: usize, left: usize, right: usize) {
    // (F-5): even samples over [i0 - 1, i1 + 1).
    let mut n = first_with_parity(i0 - left + 1, 0);
    while n < i1 + right - 1 {
        y[n] -= ((y[n - 1] + y[n + 1] + 2.0) / 4.0).floor();
        n += 2;
    }

    // (F-6): odd samples over [i0, i1).
    let mut n = first_with_parity(i0, 1);
    while n < i1 {
        y[n] += ((y[n - 1] + y[n + 1]) / 2.0).floor();
        n += 2;
    }
}

/// The 1D_FILTER_9-7I procedure (F.3.8.2): scaling followed by four lifting
/// steps. The extension is computed once; every lifting step operates on a
/// window one sample narrower per side than the previous one, so boundary
/// values stay consistent with the symmetric extension throughout.
fn filter_97(y: &mut [f32], i0: usize, i1: usize, left: usize, right: usize) {
    let lo = i0 - left;
    let hi = i1 + right;

    // Scaling: K on even samples, 1/K on odd samples.
    for (i, value) in y.iter_mut().enumerate().take(hi).skip(lo) {
        if i % 2 == 0 {
            *value *= K;
        } else {
            *value /= K;
        }
    }

    for (step, (parity, constant)) in [(0, DELTA), (1, GAMMA), (0, BETA), (1, ALPHA)]
        .into_iter()
        .enumerate()
    {
        let shrink = step + 1;
        let mut n = first_with_parity(lo + shrink, parity);

        while n < hi - shrink {
            y[n] -= constant * (y[n - 1] + y[n + 1]);
            n += 2;
        }
    }
}

/// The smallest index >= `from` with the given parity.
fn first_with_parity(from: usize, parity: usize) -> usize {
    if from % 2 == parity { from } else { from + 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pse_mirrors_about_endpoints() {
        assert_eq!(pse(0, 3, 6), 4);
        assert_eq!(pse(1, 3, 6), 5);
        assert_eq!(pse(2, 3, 6), 4);
        assert_eq!(pse(3, 3, 6), 3);
        assert_eq!(pse(4, 3, 6), 4);
        assert_eq!(pse(5, 3, 6), 5);
        assert_eq!(pse(6, 3, 6), 4);
        assert_eq!(pse(7, 3, 6), 3);
        assert_eq!(pse(8, 3, 6), 4);
    }

    #[test]
    fn extend_53() {
        let mut data = [0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 0.0, 0.0];
        extend(&mut data, 3, 9, WaveletKernel::Reversible53);

        assert_eq!(data, [0.0, 3.0, 2.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 5.0, 0.0]);
    }

    /// The forward 5/3 transform of a 1-D signal, used to verify perfect
    /// reconstruction of the inverse.
    fn forward_53(input: &[f32]) -> (Vec<f32>, Vec<f32>) {
        let n = input.len();
        let at = |i: i64| -> f32 {
            // Whole-sample symmetric extension.
            let span = 2 * (n as i64 - 1);
            let m = i.rem_euclid(span);
            input[m.min(span - m) as usize]
        };

        let mut high = Vec::new();
        let mut low = Vec::new();

        // Analysis lifting per (F-1)/(F-2) rearranged.
        let mut y: Vec<f32> = input.to_vec();

        for i in (1..n).step_by(2) {
            y[i] = input[i] - ((at(i as i64 - 1) + at(i as i64 + 1)) / 2.0).floor();
        }

        let yat = |y: &[f32], i: i64| -> f32 {
            let span = 2 * (n as i64 - 1);
            let m = i.rem_euclid(span);
            y[m.min(span - m) as usize]
        };

        for i in (0..n).step_by(2) {
            let l = yat(&y, i as i64 - 1);
            let r = yat(&y, i as i64 + 1);
            y[i] += ((l + r + 2.0) / 4.0).floor();
        }

        for (i, &v) in y.iter().enumerate() {
            if i % 2 == 0 {
                low.push(v);
            } else {
                high.push(v);
            }
        }

        (low, high)
    }

    /// Inverse(forward(x)) = x for the reversible filter on integer signals.
    #[test]
    fn reversible_round_trip_1d() {
        let signal: Vec<f32> = [3, 7, 1, -4, 12, 0, 5, 9, -2, 6, 6, 8]
            .iter()
            .map(|&v| v as f32)
            .collect();

        let (low, high) = forward_53(&signal);

        // Interleave into a padded buffer and run the inverse filter.
        let i0 = MARGIN;
        let i1 = i0 + signal.len();
        let mut buf = vec![0.0; i1 + MARGIN + 1];

        for (k, &v) in low.iter().enumerate() {
            buf[i0 + 2 * k] = v;
        }
        for (k, &v) in high.iter().enumerate() {
            buf[i0 + 2 * k + 1] = v;
        }

        one_dimensional_sr(&mut buf, i0, i1, WaveletKernel::Reversible53);

        assert_eq!(&buf[i0..i1], signal.as_slice());
    }

    #[test]
    fn irreversible_round_trip_1d() {
        // Forward 9/7 on a smooth signal, then inverse; reconstruction must
        // match within floating-point tolerance.
        let signal: Vec<f32> = (0..16).map(|v| (v * v) as f32 * 0.25).collect();
        let n = signal.len();

        // Forward lifting (the exact inverse of `filter_97`): each step
        // updates one parity class over the interior, with the symmetric
        // extension refreshed in between.
        let i0 = MARGIN;
        let i1 = i0 + n;
        let mut buf = vec![0.0; i1 + MARGIN + 1];
        buf[i0..i1].copy_from_slice(&signal);

        for (parity, c) in [(1, ALPHA), (0, BETA), (1, GAMMA), (0, DELTA)] {
            for i in (i0 - MARGIN)..i0 {
                buf[i] = buf[pse(i, i0, i1)];
            }
            for i in i1..(i1 + MARGIN) {
                buf[i] = buf[pse(i, i0, i1)];
            }

            let mut i = first_with_parity(i0, parity);
            while i < i1 {
                buf[i] += c * (buf[i - 1] + buf[i + 1]);
                i += 2;
            }
        }

        for i in i0..i1 {
            if i % 2 == 0 {
                buf[i] /= K;
            } else {
                buf[i] *= K;
            }
        }

        let forward: Vec<f32> = buf[i0..i1].to_vec();

        let mut inv = vec![0.0; i1 + MARGIN + 1];
        inv[i0..i1].copy_from_slice(&forward);
        one_dimensional_sr(&mut inv, i0, i1, WaveletKernel::Irreversible97);

        for (a, b) in inv[i0..i1].iter().zip(signal.iter()) {
            assert!((a - b).abs() < 0.01, "9/7 round trip failed: {a} vs {b}");
        }
    }

    #[test]
    fn interleave_places_bands_on_parity_grid() {
        let ll = Plane {
            rect: Rect::new(0, 0, 2, 2),
            samples: vec![1.0, 2.0, 3.0, 4.0],
        };

        let band = |kind: SubbandKind, fill: f32| Subband {
            kind,
            rect: Rect::new(0, 0, 2, 2),
            precincts: vec![],
            num_bit_planes: 0,
            delta: 1.0,
            reversible: true,
            coefficients: vec![fill; 4],
        };

        let hl = band(SubbandKind::HighLow, 10.0);
        let lh = band(SubbandKind::LowHigh, 20.0);
        let hh = band(SubbandKind::HighHigh, 30.0);

        let out = interleave(&ll, &hl, &lh, &hh, Rect::new(0, 0, 4, 4));

        assert_eq!(out[0], 1.0);
        assert_eq!(out[1], 10.0);
        assert_eq!(out[4], 20.0);
        assert_eq!(out[5], 30.0);
        assert_eq!(out[2], 2.0);
        assert_eq!(out[10], 4.0);
    }
}
