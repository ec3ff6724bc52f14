//! Generic refinement region decoding (ITU-T T.88 6.3, 7.4.7).

use sable_common::mq::{MqContext, MqDecoder};

use super::{AtPixel, GrTemplate, parse_refinement_at_pixels, parse_region_info};
use crate::bitmap::Bitmap;
use crate::error::{DecodeError, FormatError, RegionError, Result, bail};
use crate::reader::Reader;
use crate::region::generic::Region;

/// Decode a generic refinement region segment against its reference
/// (7.4.7.5).
pub(crate) fn decode(reader: &mut Reader<'_>, reference: &Region) -> Result<Region> {
    let info = parse_region_info(reader)?;

    let flags = reader.read_byte().ok_or(DecodeError::new(
        FormatError::Truncated,
        reader.byte_pos(),
    ))?;

    let template = GrTemplate::from_bit(flags);
    let tpgron = flags & 0x02 != 0;

    let at_pixels = if template == GrTemplate::Template0 {
        parse_refinement_at_pixels(reader)?
    } else {
        super::AtPixels::new()
    };

    if info.width > reference.bitmap.width || info.height > reference.bitmap.height {
        bail!(RegionError::InvalidDimension, reader.byte_pos());
    }

    // The reference is aligned to the refined region through their page
    // positions.
    let dx = reference.info.x as i64 - info.x as i64;
    let dy = reference.info.y as i64 - info.y as i64;

    let (dx, dy) = (
        i32::try_from(dx).map_err(|_| {
            DecodeError::new(crate::error::ErrorKind::Overflow, reader.byte_pos())
        })?,
        i32::try_from(dy).map_err(|_| {
            DecodeError::new(crate::error::ErrorKind::Overflow, reader.byte_pos())
        })?,
    );

    let data = reader.tail().ok_or(DecodeError::new(
        FormatError::Truncated,
        reader.byte_pos(),
    ))?;

    let mut decoder = MqDecoder::new(data);
    let mut contexts = vec![MqContext::default(); 1 << template.context_bits()];

    let mut bitmap = Bitmap::new(info.width, info.height);

    decode_bitmap(
        &mut bitmap,
        &reference.bitmap,
        dx,
        dy,
        &mut decoder,
        &mut contexts,
        template,
        &at_pixels,
        tpgron,
    );

    Ok(Region { info, bitmap })
}

/// The refinement decoding procedure (6.3.5.6).
///
/// `dx`/`dy` translate refined coordinates into reference coordinates:
/// reference position = refined position - (dx, dy).
#[allow(clippy::too_many_arguments)]
pub(crate) fn decode_bitmap(
    bitmap: &mut Bitmap,
    reference: &Bitmap,
    dx: i32,
    dy: i32,
    decoder: &mut MqDecoder<'_>,
    contexts: &mut [MqContext],
    template: GrTemplate,
    at_pixels: &[AtPixel],
    tpgron: bool,
) {
    let mut ltp = false;

    for y in 0..bitmap.height {
        if tpgron {
            // SLTP contexts from figures 14 and 15.
            let sltp_context: u32 = match template {
                GrTemplate::Template0 => 0b0000100000000,
                GrTemplate::Template1 => 0b0000001000,
            };

            let sltp = decoder.decode(&mut contexts[sltp_context as usize]);
            ltp ^= sltp != 0;
        }

        for x in 0..bitmap.width {
            let rx = x as i32 - dx;
            let ry = y as i32 - dy;

            if ltp && typical_neighbourhood(reference, rx, ry) {
                // The 3x3 reference neighbourhood agrees, so the pixel is
                // predicted without any decoding.
                bitmap.set(x, y, reference.get_signed(rx, ry) != 0);
                continue;
            }

            let context = gather_context(
                bitmap,
                reference,
                x as i32,
                y as i32,
                rx,
                ry,
                template,
                at_pixels,
            );
            let pixel = decoder.decode(&mut contexts[context as usize]);
            bitmap.set(x, y, pixel != 0);
        }
    }
}

/// Whether the 3x3 reference window around (rx, ry) is uniform (6.3.5.6).
fn typical_neighbourhood(reference: &Bitmap, rx: i32, ry: i32) -> bool {
    let center = reference.get_signed(rx, ry);

    for dy in -1..=1 {
        for dx in -1..=1 {
            if reference.get_signed(rx + dx, ry + dy) != center {
                return false;
            }
        }
    }

    true
}

/// Form the refinement context for one pixel (6.3.5.3).
#[allow(clippy::too_many_arguments)]
fn gather_context(
    bitmap: &Bitmap,
    reference: &Bitmap,
    x: i32,
    y: i32,
    rx: i32,
    ry: i32,
    template: GrTemplate,
    at: &[AtPixel],
) -> u32 {
    let c = |dx: i32, dy: i32| bitmap.get_signed(x + dx, y + dy);
    let r = |dx: i32, dy: i32| reference.get_signed(rx + dx, ry + dy);

    match template {
        GrTemplate::Template0 => {
            let mut ctx = 0;

            // Pixels from the bitmap being refined.
            ctx = (ctx << 1) | bitmap.get_signed(x + at[0].x as i32, y + at[0].y as i32);
            ctx = (ctx << 1) | c(0, -1);
            ctx = (ctx << 1) | c(1, -1);
            ctx = (ctx << 1) | c(-1, 0);

            // Pixels from the reference bitmap.
            ctx = (ctx << 1)
                | reference.get_signed(rx + at[1].x as i32, ry + at[1].y as i32);
            ctx = (ctx << 1) | r(0, -1);
            ctx = (ctx << 1) | r(1, -1);
            ctx = (ctx << 1) | r(-1, 0);
            ctx = (ctx << 1) | r(0, 0);
            ctx = (ctx << 1) | r(1, 0);
            ctx = (ctx << 1) | r(-1, 1);
            ctx = (ctx << 1) | r(0, 1);
            (ctx << 1) | r(1, 1)
        }
        GrTemplate::Template1 => {
            let mut ctx = 0;

            ctx = (ctx << 1) | c(-1, -1);
            ctx = (ctx << 1) | c(0, -1);
            ctx = (ctx << 1) | c(1, -1);
            ctx = (ctx << 1) | c(-1, 0);

            ctx = (ctx << 1) | r(0, -1);
            ctx = (ctx << 1) | r(-1, 0);
            ctx = (ctx << 1) | r(0, 0);
            ctx = (ctx << 1) | r(1, 0);
            ctx = (ctx << 1) | r(0, 1);
            (ctx << 1) | r(1, 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typical_neighbourhood_detects_uniform_windows() {
        let mut reference = Bitmap::new(4, 4);
        assert!(typical_neighbourhood(&reference, 1, 1));

        reference.set(2, 2, true);
        assert!(!typical_neighbourhood(&reference, 1, 1));

        // Far outside the bitmap everything reads as white.
        assert!(typical_neighbourhood(&reference, -10, -10));
    }
}
