//! Segment header parsing (ITU-T T.88 Section 7.2).

use crate::error::{FormatError, Result, SegmentError, bail, err};
use crate::reader::Reader;

/// The segment types recognized by this decoder (7.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentType {
    SymbolDictionary,
    IntermediateTextRegion,
    ImmediateTextRegion,
    ImmediateLosslessTextRegion,
    PatternDictionary,
    IntermediateHalftoneRegion,
    ImmediateHalftoneRegion,
    ImmediateLosslessHalftoneRegion,
    IntermediateGenericRegion,
    ImmediateGenericRegion,
    ImmediateLosslessGenericRegion,
    IntermediateGenericRefinementRegion,
    ImmediateGenericRefinementRegion,
    ImmediateLosslessGenericRefinementRegion,
    PageInformation,
    EndOfPage,
    EndOfStripe,
    EndOfFile,
    Profiles,
    Tables,
    ColourPalette,
    Extension,
}

impl SegmentType {
    fn from_value(value: u8, offset: usize) -> Result<Self> {
        Ok(match value {
            0 => Self::SymbolDictionary,
            4 => Self::IntermediateTextRegion,
            6 => Self::ImmediateTextRegion,
            7 => Self::ImmediateLosslessTextRegion,
            16 => Self::PatternDictionary,
            20 => Self::IntermediateHalftoneRegion,
            22 => Self::ImmediateHalftoneRegion,
            23 => Self::ImmediateLosslessHalftoneRegion,
            36 => Self::IntermediateGenericRegion,
            38 => Self::ImmediateGenericRegion,
            39 => Self::ImmediateLosslessGenericRegion,
            40 => Self::IntermediateGenericRefinementRegion,
            42 => Self::ImmediateGenericRefinementRegion,
            43 => Self::ImmediateLosslessGenericRefinementRegion,
            48 => Self::PageInformation,
            49 => Self::EndOfPage,
            50 => Self::EndOfStripe,
            51 => Self::EndOfFile,
            52 => Self::Profiles,
            53 => Self::Tables,
            54 => Self::ColourPalette,
            62 => Self::Extension,
            t => bail!(SegmentError::UnknownType(t), offset),
        })
    }

    /// Whether the segment composes a region directly onto the page.
    pub(crate) fn is_immediate_region(&self) -> bool {
        matches!(
            self,
            Self::ImmediateTextRegion
                | Self::ImmediateLosslessTextRegion
                | Self::ImmediateHalftoneRegion
                | Self::ImmediateLosslessHalftoneRegion
                | Self::ImmediateGenericRegion
                | Self::ImmediateLosslessGenericRegion
                | Self::ImmediateGenericRefinementRegion
                | Self::ImmediateLosslessGenericRefinementRegion
        )
    }
}

/// A parsed segment header (7.2.1).
#[derive(Debug, Clone)]
pub(crate) struct SegmentHeader {
    /// The segment number (7.2.2).
    pub(crate) number: u32,
    pub(crate) segment_type: SegmentType,
    /// The numbers of the segments this segment refers to (7.2.5).
    pub(crate) referred: Vec<u32>,
    /// The page this segment belongs to; zero means "no page" (7.2.6).
    pub(crate) page: u32,
    /// The data length; `None` when signalled as unknown (7.2.7).
    pub(crate) data_length: Option<u32>,
}

/// A segment header together with its data bytes and their position in the
/// input.
#[derive(Debug, Clone)]
pub(crate) struct Segment<'a> {
    pub(crate) header: SegmentHeader,
    pub(crate) data: &'a [u8],
    /// Offset of `data` within the whole input, for error reporting.
    pub(crate) data_offset: usize,
}

/// Parse one segment header (7.2).
pub(crate) fn parse_header(reader: &mut Reader<'_>, base: usize) -> Result<SegmentHeader> {
    let offset = |reader: &Reader<'_>| base + reader.byte_pos();

    let eof = |reader: &Reader<'_>| {
        crate::error::DecodeError::new(FormatError::Truncated, offset(reader))
    };

    let number = reader.read_u32().ok_or_else(|| eof(reader))?;

    // 7.2.3: segment header flags.
    let flags = reader.read_byte().ok_or_else(|| eof(reader))?;
    let segment_type = SegmentType::from_value(flags & 0x3F, offset(reader))?;
    let page_association_long = flags & 0x40 != 0;

    // 7.2.4: referred-to segment count and retention flags. A three-bit
    // count of 7 selects the long form; 5 and 6 are reserved.
    let count_byte = reader.read_byte().ok_or_else(|| eof(reader))?;
    let short_count = count_byte >> 5;

    let referred_count = match short_count {
        0..=4 => short_count as u32,
        5 | 6 => bail!(SegmentError::InvalidReferredCount, offset(reader)),
        _ => {
            let rest = reader.read_bytes(3).ok_or_else(|| eof(reader))?;
            let count =
                u32::from_be_bytes([count_byte & 0x1F, rest[0], rest[1], rest[2]]);

            // The long form is followed by retention flag bytes, one bit per
            // referred segment plus one for this segment.
            let retention_bytes = (count as usize + 1).div_ceil(8);
            reader
                .skip_bytes(retention_bytes)
                .ok_or_else(|| eof(reader))?;

            count
        }
    };

    // 7.2.5: referred-to segment numbers, sized by this segment's number.
    let mut referred = Vec::with_capacity(referred_count as usize);

    for _ in 0..referred_count {
        let value = if number <= 256 {
            reader.read_byte().ok_or_else(|| eof(reader))? as u32
        } else if number <= 65536 {
            reader.read_u16().ok_or_else(|| eof(reader))? as u32
        } else {
            reader.read_u32().ok_or_else(|| eof(reader))?
        };

        // Segments form a DAG: references only point backwards.
        if value >= number {
            bail!(SegmentError::ForwardReference, offset(reader));
        }

        referred.push(value);
    }

    // 7.2.6: page association.
    let page = if page_association_long {
        reader.read_u32().ok_or_else(|| eof(reader))?
    } else {
        reader.read_byte().ok_or_else(|| eof(reader))? as u32
    };

    // 7.2.7: data length; 0xFFFFFFFF means unknown.
    let data_length = match reader.read_u32().ok_or_else(|| eof(reader))? {
        0xFFFF_FFFF => None,
        len => Some(len),
    };

    Ok(SegmentHeader {
        number,
        segment_type,
        referred,
        page,
        data_length,
    })
}

/// Attach the data bytes to a parsed header, handling the unknown-length
/// case.
pub(crate) fn read_data<'a>(
    reader: &mut Reader<'a>,
    header: SegmentHeader,
    base: usize,
) -> Result<Segment<'a>> {
    let data_offset = base + reader.byte_pos();

    let data = match header.data_length {
        Some(len) => reader.read_bytes(len as usize).ok_or_else(|| {
            crate::error::DecodeError::new(FormatError::Truncated, data_offset)
        })?,
        None => {
            // 7.2.7: only immediate generic regions may have an unknown
            // length; the data ends with a terminator pair and a four-byte
            // row count.
            let len = scan_unknown_length(reader, data_offset)?;
            reader.read_bytes(len).ok_or_else(|| {
                crate::error::DecodeError::new(FormatError::Truncated, data_offset)
            })?
        }
    };

    Ok(Segment {
        header,
        data,
        data_offset,
    })
}

/// Find the length of an unknown-length immediate generic region.
///
/// "If MMR is 1, [the row count is] preceded by the two-byte sequence
/// 0x00 0x00; if MMR is 0, [...] by the two-byte sequence 0xFF 0xAC."
/// (7.2.7)
fn scan_unknown_length(reader: &Reader<'_>, data_offset: usize) -> Result<usize> {
    let data = reader.tail().unwrap_or(&[]);

    // The generic region flags byte sits after the 17-byte region segment
    // information field.
    let Some(&flags) = data.get(17) else {
        bail!(FormatError::Truncated, data_offset + data.len());
    };

    let terminator: [u8; 2] = if flags & 1 != 0 {
        [0x00, 0x00]
    } else {
        [0xFF, 0xAC]
    };

    let mut pos = 18;

    while pos + 6 <= data.len() {
        if data[pos..pos + 2] == terminator {
            return Ok(pos + 6);
        }

        pos += 1;
    }

    err!(SegmentError::MissingTerminator, data_offset)
}
