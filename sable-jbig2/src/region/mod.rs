//! Region segments: the shared region information field (7.4.1), template
//! definitions and the individual region decoders.

pub(crate) mod generic;
pub(crate) mod halftone;
pub(crate) mod refinement;
pub(crate) mod text;

use smallvec::SmallVec;

use crate::bitmap::CombinationOperator;
use crate::error::{DecodeError, FormatError, RegionError, Result, bail};
use crate::reader::Reader;

/// The region segment information field (7.4.1).
#[derive(Debug, Clone, Copy)]
pub(crate) struct RegionInfo {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) x: u32,
    pub(crate) y: u32,
    pub(crate) operator: CombinationOperator,
}

pub(crate) fn parse_region_info(reader: &mut Reader<'_>) -> Result<RegionInfo> {
    let eof = |reader: &Reader<'_>| {
        DecodeError::new(FormatError::Truncated, reader.byte_pos())
    };

    let width = reader.read_u32().ok_or_else(|| eof(reader))?;
    let height = reader.read_u32().ok_or_else(|| eof(reader))?;
    let x = reader.read_u32().ok_or_else(|| eof(reader))?;
    let y = reader.read_u32().ok_or_else(|| eof(reader))?;
    let flags = reader.read_byte().ok_or_else(|| eof(reader))?;

    let operator = CombinationOperator::from_value(flags & 0x07).ok_or(DecodeError::new(
        RegionError::InvalidCombinationOperator,
        reader.byte_pos(),
    ))?;

    if width == 0 || height == 0 {
        bail!(RegionError::InvalidDimension, reader.byte_pos());
    }

    Ok(RegionInfo {
        width,
        height,
        x,
        y,
        operator,
    })
}

/// The generic-region context templates GB0..GB3 (6.2.5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GbTemplate {
    Template0,
    Template1,
    Template2,
    Template3,
}

impl GbTemplate {
    pub(crate) fn from_bits(value: u8) -> Self {
        match value & 0x03 {
            0 => Self::Template0,
            1 => Self::Template1,
            2 => Self::Template2,
            _ => Self::Template3,
        }
    }

    /// The number of context bits the template forms.
    pub(crate) fn context_bits(&self) -> u8 {
        match self {
            Self::Template0 => 16,
            Self::Template1 => 13,
            Self::Template2 => 10,
            Self::Template3 => 10,
        }
    }

    /// The number of adaptive template pixels the template uses.
    pub(crate) fn at_pixel_count(&self) -> usize {
        match self {
            Self::Template0 => 4,
            _ => 1,
        }
    }
}

/// The refinement context templates GR0/GR1 (6.3.5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GrTemplate {
    Template0,
    Template1,
}

impl GrTemplate {
    pub(crate) fn from_bit(value: u8) -> Self {
        if value & 1 == 0 {
            Self::Template0
        } else {
            Self::Template1
        }
    }

    pub(crate) fn context_bits(&self) -> u8 {
        match self {
            Self::Template0 => 13,
            Self::Template1 => 10,
        }
    }
}

/// An adaptive template pixel offset.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AtPixel {
    pub(crate) x: i8,
    pub(crate) y: i8,
}

pub(crate) type AtPixels = SmallVec<[AtPixel; 4]>;

/// Read the adaptive template pixels of a generic region (7.4.6.3).
pub(crate) fn parse_at_pixels(
    reader: &mut Reader<'_>,
    template: GbTemplate,
) -> Result<AtPixels> {
    let mut pixels = AtPixels::new();

    for _ in 0..template.at_pixel_count() {
        let x = reader.read_byte().ok_or(DecodeError::new(
            FormatError::Truncated,
            reader.byte_pos(),
        ))? as i8;
        let y = reader.read_byte().ok_or(DecodeError::new(
            FormatError::Truncated,
            reader.byte_pos(),
        ))? as i8;

        // AT pixels must reference already-decoded pixels: above the
        // current row, or to its left within the current row.
        if y > 0 || (y == 0 && x >= 0) {
            bail!(RegionError::InvalidAtPixel, reader.byte_pos());
        }

        pixels.push(AtPixel { x, y });
    }

    Ok(pixels)
}

/// Read the two refinement adaptive template pixels (7.4.7.2).
pub(crate) fn parse_refinement_at_pixels(reader: &mut Reader<'_>) -> Result<AtPixels> {
    let mut pixels = AtPixels::new();

    for _ in 0..2 {
        let x = reader.read_byte().ok_or(DecodeError::new(
            FormatError::Truncated,
            reader.byte_pos(),
        ))? as i8;
        let y = reader.read_byte().ok_or(DecodeError::new(
            FormatError::Truncated,
            reader.byte_pos(),
        ))? as i8;

        pixels.push(AtPixel { x, y });
    }

    Ok(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_info_fields() {
        let data = [
            0, 0, 0, 64, // width
            0, 0, 0, 32, // height
            0, 0, 0, 4, // x
            0, 0, 0, 8, // y
            0x02, // XOR
        ];

        let mut reader = Reader::new(&data);
        let info = parse_region_info(&mut reader).unwrap();

        assert_eq!((info.width, info.height), (64, 32));
        assert_eq!((info.x, info.y), (4, 8));
        assert_eq!(info.operator, CombinationOperator::Xor);
    }

    #[test]
    fn at_pixels_must_be_causal() {
        // y = 0 with x >= 0 references an undecoded pixel.
        let data = [0x01, 0x00];
        let mut reader = Reader::new(&data);
        assert!(parse_at_pixels(&mut reader, GbTemplate::Template1).is_err());

        let data = [0xFD, 0xFF]; // (-3, -1)
        let mut reader = Reader::new(&data);
        let pixels = parse_at_pixels(&mut reader, GbTemplate::Template1).unwrap();
        assert_eq!((pixels[0].x, pixels[0].y), (-3, -1));
    }
}
