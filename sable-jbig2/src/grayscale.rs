//! Gray-scale image decoding (ITU-T T.88 Annex C), used by halftone
//! regions.

use sable_common::mq::{MqContext, MqDecoder};

use crate::bitmap::Bitmap;
use crate::error::Result;
use crate::mmr;
use crate::region::generic::gather_context;
use crate::region::{AtPixel, GbTemplate};

/// Parameters of the gray-scale decoding procedure (Table C.1).
pub(crate) struct GrayscaleParams<'a> {
    pub(crate) use_mmr: bool,
    pub(crate) bits_per_value: u32,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) template: GbTemplate,
    /// Grid cells whose value is never decoded.
    pub(crate) skip: Option<&'a Bitmap>,
}

/// Decode a gray-scale image: `bits_per_value` gray-coded bitplanes, most
/// significant first (C.5).
pub(crate) fn decode(data: &[u8], params: &GrayscaleParams<'_>) -> Result<Vec<u32>> {
    let size = params.width as usize * params.height as usize;
    let mut values = vec![0_u32; size];

    let mut planes: Vec<Vec<bool>> = Vec::with_capacity(params.bits_per_value as usize);

    if params.use_mmr {
        let mut offset = 0;

        for _ in 0..params.bits_per_value {
            let mut plane = Bitmap::new(params.width, params.height);
            offset += mmr::decode_into(&mut plane, &data[offset.min(data.len())..])?;
            planes.push(plane.data);
        }
    } else {
        // Table C.4: the adaptive template pixels of the bitplane decoder.
        let at_pixels: &[AtPixel] = match params.template {
            GbTemplate::Template0 => &[
                AtPixel { x: 3, y: -1 },
                AtPixel { x: -3, y: -1 },
                AtPixel { x: 2, y: -2 },
                AtPixel { x: -2, y: -2 },
            ],
            GbTemplate::Template1 => &[AtPixel { x: 3, y: -1 }],
            GbTemplate::Template2 | GbTemplate::Template3 => &[AtPixel { x: 2, y: -1 }],
        };

        let mut decoder = MqDecoder::new(data);
        let mut contexts = vec![MqContext::default(); 1 << params.template.context_bits()];

        for _ in 0..params.bits_per_value {
            let mut plane = Bitmap::new(params.width, params.height);

            for y in 0..params.height {
                for x in 0..params.width {
                    if let Some(skip) = params.skip
                        && skip.get(x, y)
                    {
                        continue;
                    }

                    let context =
                        gather_context(&plane, x as i32, y as i32, params.template, at_pixels);
                    let pixel = decoder.decode(&mut contexts[context as usize]);
                    plane.set(x, y, pixel != 0);
                }
            }

            planes.push(plane.data);
        }
    }

    // C.5: undo the gray coding, most significant plane first.
    let mut prev = planes.remove(0);

    for (i, &bit) in prev.iter().enumerate() {
        if bit {
            values[i] |= 1 << (params.bits_per_value - 1);
        }
    }

    for (plane_idx, mut plane) in planes.into_iter().enumerate() {
        let bit_pos = params.bits_per_value - 2 - plane_idx as u32;

        for i in 0..size {
            plane[i] ^= prev[i];

            if plane[i] {
                values[i] |= 1 << bit_pos;
            }
        }

        prev = plane;
    }

    Ok(values)
}
