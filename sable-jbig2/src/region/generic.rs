//! Generic region decoding (ITU-T T.88 6.2, 7.4.6).

use sable_common::mq::{MqContext, MqDecoder};

use super::{AtPixel, GbTemplate, RegionInfo, parse_at_pixels, parse_region_info};
use crate::bitmap::Bitmap;
use crate::error::{DecodeError, FormatError, RegionError, Result, bail};
use crate::mmr;
use crate::reader::Reader;

/// A decoded region together with its placement on the page.
#[derive(Debug, Clone)]
pub(crate) struct Region {
    pub(crate) info: RegionInfo,
    pub(crate) bitmap: Bitmap,
}

/// Decode a generic region segment (7.4.6).
///
/// `unknown_length` marks an immediate generic region whose data length was
/// signalled as unknown; its real row count trails the data (7.4.6.4).
pub(crate) fn decode(reader: &mut Reader<'_>, unknown_length: bool) -> Result<Region> {
    let mut info = parse_region_info(reader)?;

    let flags = reader.read_byte().ok_or(DecodeError::new(
        FormatError::Truncated,
        reader.byte_pos(),
    ))?;

    let use_mmr = flags & 0x01 != 0;
    let template = GbTemplate::from_bits(flags >> 1);
    let tpgdon = flags & 0x08 != 0;

    let at_pixels = if use_mmr {
        super::AtPixels::new()
    } else {
        parse_at_pixels(reader, template)?
    };

    let mut data = reader.tail().ok_or(DecodeError::new(
        FormatError::Truncated,
        reader.byte_pos(),
    ))?;

    if unknown_length {
        // The last four bytes hold the actual number of decoded rows.
        if data.len() < 4 {
            bail!(FormatError::Truncated, reader.byte_pos());
        }

        let (head, tail) = data.split_at(data.len() - 4);
        let rows = u32::from_be_bytes(tail.try_into().unwrap());

        if rows > info.height {
            bail!(RegionError::InvalidDimension, reader.byte_pos());
        }

        info.height = rows;
        data = head;
    }

    let mut bitmap = Bitmap::new(info.width, info.height);

    if use_mmr {
        mmr::decode_into(&mut bitmap, data)?;
    } else {
        let mut decoder = MqDecoder::new(data);
        let mut contexts = vec![MqContext::default(); 1 << template.context_bits()];

        decode_bitmap(
            &mut bitmap,
            &mut decoder,
            &mut contexts,
            template,
            tpgdon,
            &at_pixels,
            None,
        );
    }

    Ok(Region { info, bitmap })
}

/// The generic region decoding procedure with arithmetic coding (6.2.5.7).
///
/// `skip` optionally masks pixels that are not decoded at all (used by the
/// gray-scale procedure).
pub(crate) fn decode_bitmap(
    bitmap: &mut Bitmap,
    decoder: &mut MqDecoder<'_>,
    contexts: &mut [MqContext],
    template: GbTemplate,
    tpgdon: bool,
    at_pixels: &[AtPixel],
    skip: Option<&Bitmap>,
) {
    let mut ltp = false;

    for y in 0..bitmap.height {
        if tpgdon {
            // The SLTP decision contexts from figures 8-11.
            let sltp_context: u32 = match template {
                GbTemplate::Template0 => 0b1001101100100101,
                GbTemplate::Template1 => 0b0011110010101,
                GbTemplate::Template2 => 0b0011100101,
                GbTemplate::Template3 => 0b0110010101,
            };

            let sltp = decoder.decode(&mut contexts[sltp_context as usize]);
            ltp ^= sltp != 0;
        }

        if ltp {
            // A typical row repeats the row above it.
            for x in 0..bitmap.width {
                let above = y > 0 && bitmap.get(x, y - 1);
                bitmap.set(x, y, above);
            }

            continue;
        }

        for x in 0..bitmap.width {
            if let Some(skip) = skip
                && skip.get(x, y)
            {
                continue;
            }

            let context = gather_context(bitmap, x as i32, y as i32, template, at_pixels);
            let pixel = decoder.decode(&mut contexts[context as usize]);
            bitmap.set(x, y, pixel != 0);
        }
    }
}

/// Form the context value for one pixel (6.2.5.3, 6.2.5.4).
pub(crate) fn gather_context(
    bitmap: &Bitmap,
    x: i32,
    y: i32,
    template: GbTemplate,
    at: &[AtPixel],
) -> u32 {
    let p = |dx: i32, dy: i32| bitmap.get_signed(x + dx, y + dy);
    let a = |i: usize| bitmap.get_signed(x + at[i].x as i32, y + at[i].y as i32);

    match template {
        GbTemplate::Template0 => {
            let mut ctx = 0;

            ctx = (ctx << 1) | a(3);
            ctx = (ctx << 1) | p(-1, -2);
            ctx = (ctx << 1) | p(0, -2);
            ctx = (ctx << 1) | p(1, -2);
            ctx = (ctx << 1) | a(2);

            ctx = (ctx << 1) | a(1);
            ctx = (ctx << 1) | p(-2, -1);
            ctx = (ctx << 1) | p(-1, -1);
            ctx = (ctx << 1) | p(0, -1);
            ctx = (ctx << 1) | p(1, -1);
            ctx = (ctx << 1) | p(2, -1);
            ctx = (ctx << 1) | a(0);

            ctx = (ctx << 1) | p(-4, 0);
            ctx = (ctx << 1) | p(-3, 0);
            ctx = (ctx << 1) | p(-2, 0);
            (ctx << 1) | p(-1, 0)
        }
        GbTemplate::Template1 => {
            let mut ctx = 0;

            ctx = (ctx << 1) | p(-1, -2);
            ctx = (ctx << 1) | p(0, -2);
            ctx = (ctx << 1) | p(1, -2);
            ctx = (ctx << 1) | p(2, -2);

            ctx = (ctx << 1) | p(-2, -1);
            ctx = (ctx << 1) | p(-1, -1);
            ctx = (ctx << 1) | p(0, -1);
            ctx = (ctx << 1) | p(1, -1);
            ctx = (ctx << 1) | p(2, -1);
            ctx = (ctx << 1) | a(0);

            ctx = (ctx << 1) | p(-3, 0);
            ctx = (ctx << 1) | p(-2, 0);
            (ctx << 1) | p(-1, 0)
        }
        GbTemplate::Template2 => {
            let mut ctx = 0;

            ctx = (ctx << 1) | p(-1, -2);
            ctx = (ctx << 1) | p(0, -2);
            ctx = (ctx << 1) | p(1, -2);

            ctx = (ctx << 1) | p(-2, -1);
            ctx = (ctx << 1) | p(-1, -1);
            ctx = (ctx << 1) | p(0, -1);
            ctx = (ctx << 1) | p(1, -1);
            ctx = (ctx << 1) | a(0);

            ctx = (ctx << 1) | p(-2, 0);
            (ctx << 1) | p(-1, 0)
        }
        GbTemplate::Template3 => {
            let mut ctx = 0;

            ctx = (ctx << 1) | p(-3, -1);
            ctx = (ctx << 1) | p(-2, -1);
            ctx = (ctx << 1) | p(-1, -1);
            ctx = (ctx << 1) | p(0, -1);
            ctx = (ctx << 1) | p(1, -1);
            ctx = (ctx << 1) | a(0);

            ctx = (ctx << 1) | p(-4, 0);
            ctx = (ctx << 1) | p(-3, 0);
            ctx = (ctx << 1) | p(-2, 0);
            (ctx << 1) | p(-1, 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_zero_on_empty_bitmap() {
        let bitmap = Bitmap::new(8, 8);
        let at = [
            AtPixel { x: 3, y: -1 },
            AtPixel { x: -3, y: -1 },
            AtPixel { x: 2, y: -2 },
            AtPixel { x: -2, y: -2 },
        ];

        for template in [
            GbTemplate::Template0,
            GbTemplate::Template1,
            GbTemplate::Template2,
            GbTemplate::Template3,
        ] {
            assert_eq!(gather_context(&bitmap, 4, 4, template, &at), 0);
        }
    }

    #[test]
    fn context_reflects_neighbours() {
        let mut bitmap = Bitmap::new(8, 8);
        bitmap.set(3, 4, true); // left neighbour of (4, 4)

        let at = [AtPixel { x: -1, y: -1 }];
        let ctx = gather_context(&bitmap, 4, 4, GbTemplate::Template3, &at);

        // The left neighbour is the least significant context bit.
        assert_eq!(ctx, 1);
    }

    #[test]
    fn mmr_region_decodes() {
        // Region info: 8x1 at (0, 0), OR operator; flags select MMR.
        let mut data = Vec::new();
        data.extend(8_u32.to_be_bytes());
        data.extend(1_u32.to_be_bytes());
        data.extend(0_u32.to_be_bytes());
        data.extend(0_u32.to_be_bytes());
        data.push(0x00);
        data.push(0x01); // MMR
        data.push(0b1000_0000); // V(0): one all-white row

        let mut reader = Reader::new(&data);
        let region = decode(&mut reader, false).unwrap();

        assert_eq!(region.bitmap.width, 8);
        assert_eq!(region.bitmap.height, 1);
        assert!(region.bitmap.data.iter().all(|&p| !p));
    }
}
