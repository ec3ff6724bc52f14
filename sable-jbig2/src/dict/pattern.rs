//! Pattern dictionary decoding (ITU-T T.88 6.7, 7.4.4).

use sable_common::mq::{MqContext, MqDecoder};

use crate::bitmap::Bitmap;
use crate::error::{DecodeError, ErrorKind, FormatError, Result};
use crate::reader::Reader;
use crate::region::generic::decode_bitmap;
use crate::region::{AtPixel, AtPixels, GbTemplate};
use crate::{mmr, Limits};

/// A decoded pattern dictionary: fixed-size bitmaps indexed by gray value.
#[derive(Debug, Clone)]
pub(crate) struct PatternDictionary {
    pub(crate) patterns: Vec<Bitmap>,
    pub(crate) pattern_width: u8,
    pub(crate) pattern_height: u8,
}

/// Decode a pattern dictionary segment (7.4.4.2).
pub(crate) fn decode(reader: &mut Reader<'_>, limits: &Limits) -> Result<PatternDictionary> {
    let eof = |reader: &Reader<'_>| {
        DecodeError::new(FormatError::Truncated, reader.byte_pos())
    };

    let flags = reader.read_byte().ok_or_else(|| eof(reader))?;
    let use_mmr = flags & 0x01 != 0;
    let template = GbTemplate::from_bits(flags >> 1);

    let pattern_width = reader.read_nonzero_byte().ok_or_else(|| eof(reader))?;
    let pattern_height = reader.read_nonzero_byte().ok_or_else(|| eof(reader))?;
    let gray_max = reader.read_u32().ok_or_else(|| eof(reader))?;

    let num_patterns = gray_max
        .checked_add(1)
        .ok_or(DecodeError::new(ErrorKind::Overflow, reader.byte_pos()))?;

    if num_patterns as usize > limits.max_symbols {
        return Err(DecodeError::new(
            ErrorKind::ResourceExceeded("pattern count"),
            reader.byte_pos(),
        ));
    }

    // 6.7.5 step 1: all patterns are decoded as one collective bitmap,
    // concatenated left to right.
    let collective_width = num_patterns
        .checked_mul(pattern_width as u32)
        .filter(|&w| (w as u64) * (pattern_height as u64) <= limits.max_bitmap_bytes as u64)
        .ok_or(DecodeError::new(
            ErrorKind::ResourceExceeded("collective pattern bitmap"),
            reader.byte_pos(),
        ))?;

    let mut collective = Bitmap::new(collective_width, pattern_height as u32);
    let data = reader.tail().ok_or_else(|| eof(reader))?;

    if use_mmr {
        mmr::decode_into(&mut collective, data)?;
    } else {
        // Table 27: the adaptive pixels of the collective bitmap.
        let mut at_pixels = AtPixels::new();
        at_pixels.push(AtPixel {
            x: -(pattern_width.min(127) as i8),
            y: 0,
        });

        if template == GbTemplate::Template0 {
            at_pixels.push(AtPixel { x: -3, y: -1 });
            at_pixels.push(AtPixel { x: 2, y: -2 });
            at_pixels.push(AtPixel { x: -2, y: -2 });
        }

        let mut decoder = MqDecoder::new(data);
        let mut contexts = vec![MqContext::default(); 1 << template.context_bits()];

        decode_bitmap(
            &mut collective,
            &mut decoder,
            &mut contexts,
            template,
            false,
            &at_pixels,
            None,
        );
    }

    // 6.7.5 step 4: split the collective bitmap into the patterns.
    let mut patterns = Vec::with_capacity(num_patterns as usize);

    for gray in 0..num_patterns {
        let start_x = gray * pattern_width as u32;
        let mut pattern = Bitmap::new(pattern_width as u32, pattern_height as u32);

        for y in 0..pattern_height as u32 {
            for x in 0..pattern_width as u32 {
                pattern.set(x, y, collective.get(start_x + x, y));
            }
        }

        patterns.push(pattern);
    }

    Ok(PatternDictionary {
        patterns,
        pattern_width,
        pattern_height,
    })
}
