//! Inverse component transforms and the final level shift
//! (ISO/IEC 15444-1 Annex G).

use crate::codestream::{Header, WaveletKernel};
use crate::dwt::Plane;

/// Apply the inverse multiple component transform in place over the first
/// three component planes of one tile (G.2/G.3).
pub(crate) fn inverse_mct(planes: &mut [Plane], kernel: WaveletKernel) {
    let [c0, c1, c2, ..] = planes else {
        return;
    };

    let len = c0
        .samples
        .len()
        .min(c1.samples.len())
        .min(c2.samples.len());

    match kernel {
        WaveletKernel::Reversible53 => {
            // Inverse RCT (G-6): G = Y - floor((Cb + Cr) / 4), R = Cr + G,
            // B = Cb + G.
            for i in 0..len {
                let y = c0.samples[i];
                let cb = c1.samples[i];
                let cr = c2.samples[i];

                let g = y - ((cb + cr) / 4.0).floor();
                let r = cr + g;
                let b = cb + g;

                c0.samples[i] = r;
                c1.samples[i] = g;
                c2.samples[i] = b;
            }
        }
        WaveletKernel::Irreversible97 => {
            // Inverse ICT (G-7), the BT.601 matrix over zero-centred chroma.
            for i in 0..len {
                let y = c0.samples[i];
                let cb = c1.samples[i];
                let cr = c2.samples[i];

                c0.samples[i] = y + 1.402 * cr;
                c1.samples[i] = y - 0.344136 * cb - 0.714136 * cr;
                c2.samples[i] = y + 1.772 * cb;
            }
        }
    }
}

/// Undo the DC level shift and clamp every sample to the component's range
/// (G.1.2).
pub(crate) fn level_shift(planes: &mut [Plane], header: &Header) {
    for (plane, component) in planes.iter_mut().zip(&header.size.components) {
        let shift = (1_u64 << (component.precision - 1)) as f32;
        let max = ((1_u64 << component.precision) - 1) as f32;

        for sample in &mut plane.samples {
            *sample = (*sample + shift).clamp(0.0, max);
        }
    }
}

/// Convert sYCC-tagged planes to RGB. The chroma planes are unsigned at
/// this point, so they are re-centred before the BT.601 matrix.
pub(crate) fn sycc_to_rgb(planes: &mut [Plane], header: &Header) {
    let [y_plane, cb_plane, cr_plane, ..] = planes else {
        return;
    };

    let precision = header.size.components[0].precision;
    let offset = (1_u64 << (precision - 1)) as f32;
    let max = ((1_u64 << precision) - 1) as f32;

    let len = y_plane
        .samples
        .len()
        .min(cb_plane.samples.len())
        .min(cr_plane.samples.len());

    for i in 0..len {
        let y = y_plane.samples[i];
        let cb = cb_plane.samples[i] - offset;
        let cr = cr_plane.samples[i] - offset;

        let r = y + 1.402 * cr;
        let g = y - 0.344136 * cb - 0.714136 * cr;
        let b = y + 1.772 * cb;

        y_plane.samples[i] = r.clamp(0.0, max);
        cb_plane.samples[i] = g.clamp(0.0, max);
        cr_plane.samples[i] = b.clamp(0.0, max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::Rect;

    fn plane(samples: Vec<f32>) -> Plane {
        Plane {
            rect: Rect::new(0, 0, samples.len() as u32, 1),
            samples,
        }
    }

    /// The forward RCT of an RGB triple, inverted by `inverse_mct`.
    #[test]
    fn rct_round_trips() {
        for (r, g, b) in [
            (0.0_f32, 0.0, 0.0),
            (13.0, -20.0, 77.0),
            (-128.0, 127.0, 5.0),
        ] {
            let y = ((r + 2.0 * g + b) / 4.0).floor();
            let cb = b - g;
            let cr = r - g;

            let mut planes = vec![plane(vec![y]), plane(vec![cb]), plane(vec![cr])];
            inverse_mct(&mut planes, WaveletKernel::Reversible53);

            assert_eq!(planes[0].samples[0], r);
            assert_eq!(planes[1].samples[0], g);
            assert_eq!(planes[2].samples[0], b);
        }
    }

    #[test]
    fn ict_recovers_gray() {
        // Zero chroma must leave Y unchanged on all three outputs.
        let mut planes = vec![plane(vec![42.0]), plane(vec![0.0]), plane(vec![0.0])];
        inverse_mct(&mut planes, WaveletKernel::Irreversible97);

        for p in &planes {
            assert!((p.samples[0] - 42.0).abs() < 1e-4);
        }
    }
}
