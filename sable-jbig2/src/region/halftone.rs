//! Halftone region decoding (ITU-T T.88 6.6, 7.4.5).

use super::{GbTemplate, parse_region_info};
use crate::bitmap::{Bitmap, CombinationOperator};
use crate::dict::pattern::PatternDictionary;
use crate::error::{
    DecodeError, ErrorKind, FormatError, RegionError, Result, SymbolError, bail,
};
use crate::grayscale::{self, GrayscaleParams};
use crate::reader::Reader;
use crate::region::generic::Region;

/// Decode a halftone region segment (7.4.5.2).
pub(crate) fn decode(reader: &mut Reader<'_>, patterns: &PatternDictionary) -> Result<Region> {
    let eof = |reader: &Reader<'_>| {
        DecodeError::new(FormatError::Truncated, reader.byte_pos())
    };

    let info = parse_region_info(reader)?;

    // 7.4.5.1.1: halftone region segment flags.
    let flags = reader.read_byte().ok_or_else(|| eof(reader))?;
    let use_mmr = flags & 0x01 != 0;
    let template = GbTemplate::from_bits(flags >> 1);
    let enable_skip = flags & 0x08 != 0;
    let operator = CombinationOperator::from_value((flags >> 4) & 0x07).ok_or(
        DecodeError::new(RegionError::InvalidCombinationOperator, reader.byte_pos()),
    )?;
    let default_pixel = flags & 0x80 != 0;

    // 7.4.5.1.2: grid position and size.
    let grid_width = reader.read_u32().ok_or_else(|| eof(reader))?;
    let grid_height = reader.read_u32().ok_or_else(|| eof(reader))?;
    let grid_x = reader.read_i32().ok_or_else(|| eof(reader))?;
    let grid_y = reader.read_i32().ok_or_else(|| eof(reader))?;

    // 7.4.5.1.3: grid vector, in 1/256 pixel units.
    let vector_x = reader.read_u16().ok_or_else(|| eof(reader))? as i32;
    let vector_y = reader.read_u16().ok_or_else(|| eof(reader))? as i32;

    let mut bitmap = Bitmap::filled(info.width, info.height, default_pixel);

    // 6.6.5 step 2: the optional skip bitmap marks grid cells that fall
    // entirely outside the region.
    let skip = if enable_skip {
        Some(compute_skip(
            grid_width,
            grid_height,
            grid_x,
            grid_y,
            vector_x,
            vector_y,
            patterns,
            &bitmap,
        )?)
    } else {
        None
    };

    // 6.6.5 step 3: bits per gray value.
    let bits_per_value = (patterns.patterns.len() as u32)
        .saturating_sub(1)
        .checked_ilog2()
        .map_or(1, |n| n + 1);

    let data = reader.tail().ok_or_else(|| eof(reader))?;

    // 6.6.5 step 4: the gray-scale image.
    let gray = grayscale::decode(
        data,
        &GrayscaleParams {
            use_mmr,
            bits_per_value,
            width: grid_width,
            height: grid_height,
            template,
            skip: skip.as_ref(),
        },
    )?;

    // 6.6.5 step 5: place one pattern per grid cell.
    for m in 0..grid_height {
        for n in 0..grid_width {
            let (x, y) = grid_position(grid_x, grid_y, vector_x, vector_y, m, n)?;

            let index = gray[(m * grid_width + n) as usize] as usize;
            let pattern = patterns
                .patterns
                .get(index)
                .ok_or(DecodeError::new(SymbolError::OutOfRange, 0))?;

            bitmap.combine(pattern, x, y, operator);
        }
    }

    Ok(Region { info, bitmap })
}

/// The position of grid cell (m, n) in region coordinates (6.6.5.1/6.6.5.2).
fn grid_position(
    grid_x: i32,
    grid_y: i32,
    vector_x: i32,
    vector_y: i32,
    m: u32,
    n: u32,
) -> Result<(i32, i32)> {
    let m = m as i32;
    let n = n as i32;
    let overflow = DecodeError::new(ErrorKind::Overflow, 0);

    let x = m
        .checked_mul(vector_y)
        .and_then(|v| v.checked_add(n.checked_mul(vector_x)?))
        .and_then(|v| v.checked_add(grid_x))
        .ok_or(overflow)?
        >> 8;

    let y = m
        .checked_mul(vector_x)
        .and_then(|v| v.checked_sub(n.checked_mul(vector_y)?))
        .and_then(|v| v.checked_add(grid_y))
        .ok_or(overflow)?
        >> 8;

    Ok((x, y))
}

/// Compute the HSKIP bitmap (6.6.5.1).
#[allow(clippy::too_many_arguments)]
fn compute_skip(
    grid_width: u32,
    grid_height: u32,
    grid_x: i32,
    grid_y: i32,
    vector_x: i32,
    vector_y: i32,
    patterns: &PatternDictionary,
    region: &Bitmap,
) -> Result<Bitmap> {
    let mut skip = Bitmap::new(grid_width, grid_height);

    let pattern_width = patterns.pattern_width as i32;
    let pattern_height = patterns.pattern_height as i32;

    for m in 0..grid_height {
        for n in 0..grid_width {
            let (x, y) = grid_position(grid_x, grid_y, vector_x, vector_y, m, n)?;

            let outside = x + pattern_width <= 0
                || x >= region.width as i32
                || y + pattern_height <= 0
                || y >= region.height as i32;

            skip.set(n, m, outside);
        }
    }

    Ok(skip)
}
