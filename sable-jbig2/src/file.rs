//! Standalone file parsing (ITU-T T.88 Annex D) and the embedded
//! organization used by PDF streams.

use crate::error::{FormatError, Result, bail};
use crate::reader::Reader;
use crate::segment::{self, Segment, SegmentHeader, SegmentType};

/// "This is an 8-byte sequence containing 0x97 0x4A 0x42 0x32 0x0D 0x0A 0x1A
/// 0x0A." (D.4.1)
const FILE_HEADER_ID: [u8; 8] = [0x97, 0x4A, 0x42, 0x32, 0x0D, 0x0A, 0x1A, 0x0A];

/// The two standalone file organizations (Annex D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Organization {
    /// Segment headers and data interleaved (D.1).
    Sequential,
    /// All headers first, then all data parts in order (D.2).
    RandomAccess,
}

/// A parsed JBIG2 file: its segments in segment-number order.
#[derive(Debug)]
pub(crate) struct File<'a> {
    pub(crate) segments: Vec<Segment<'a>>,
}

/// Whether the data begins with the standalone file header.
pub(crate) fn is_file(data: &[u8]) -> bool {
    data.starts_with(&FILE_HEADER_ID)
}

/// Parse a standalone JBIG2 file.
pub(crate) fn parse_file(data: &[u8]) -> Result<File<'_>> {
    let mut reader = Reader::new(data);

    if reader.read_bytes(8).map(|id| id != FILE_HEADER_ID).unwrap_or(true) {
        bail!(FormatError::BadMagic, 0);
    }

    // D.4.2: file header flags.
    let flags = reader
        .read_byte()
        .ok_or(crate::error::DecodeError::new(FormatError::Truncated, 8))?;

    let organization = if flags & 0x01 != 0 {
        Organization::Sequential
    } else {
        Organization::RandomAccess
    };

    let unknown_page_count = flags & 0x02 != 0;

    if flags & 0xF0 != 0 {
        bail!(FormatError::ReservedBits, 8);
    }

    // D.4.3: number of pages, absent when unknown.
    if !unknown_page_count {
        reader
            .read_u32()
            .ok_or(crate::error::DecodeError::new(FormatError::Truncated, 9))?;
    }

    let mut segments = parse_segments(&mut reader, organization)?;

    // The spec mandates ascending segment numbers; sort to be safe.
    segments.sort_by_key(|segment| segment.header.number);

    Ok(File { segments })
}

/// Parse an embedded stream: a bare sequence of segments with no file
/// header, as stored in PDF JBIG2Decode streams. `globals` segments (from a
/// JBIG2Globals stream) precede the page segments.
pub(crate) fn parse_embedded<'a>(
    globals: Option<&'a [u8]>,
    data: &'a [u8],
) -> Result<File<'a>> {
    let mut segments = Vec::new();

    if let Some(globals) = globals {
        let mut reader = Reader::new(globals);
        sequential_segments(&mut reader, &mut segments)?;
    }

    let mut reader = Reader::new(data);
    sequential_segments(&mut reader, &mut segments)?;

    segments.sort_by_key(|segment| segment.header.number);

    Ok(File { segments })
}

fn parse_segments<'a>(
    reader: &mut Reader<'a>,
    organization: Organization,
) -> Result<Vec<Segment<'a>>> {
    let mut segments = Vec::new();

    match organization {
        Organization::Sequential => sequential_segments(reader, &mut segments)?,
        Organization::RandomAccess => {
            // All headers up to (and including) end-of-file, then the data
            // parts in the same order.
            let mut headers: Vec<SegmentHeader> = Vec::new();

            loop {
                if reader.at_end() {
                    break;
                }

                let header = segment::parse_header(reader, 0)?;
                let is_eof = header.segment_type == SegmentType::EndOfFile;
                headers.push(header);

                if is_eof {
                    break;
                }
            }

            for header in headers {
                segments.push(segment::read_data(reader, header, 0)?);
            }
        }
    }

    Ok(segments)
}

fn sequential_segments<'a>(
    reader: &mut Reader<'a>,
    segments: &mut Vec<Segment<'a>>,
) -> Result<()> {
    loop {
        if reader.at_end() {
            break;
        }

        let header = segment::parse_header(reader, 0)?;
        let is_eof = header.segment_type == SegmentType::EndOfFile;
        segments.push(segment::read_data(reader, header, 0)?);

        if is_eof {
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_segment(number: u32, segment_type: u8, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(number.to_be_bytes());
        out.push(segment_type);
        out.push(0x00); // no referred segments
        out.push(0x01); // page 1
        out.extend((data.len() as u32).to_be_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn sequential_file_round_trip() {
        let mut data = FILE_HEADER_ID.to_vec();
        data.push(0x01); // sequential, known page count
        data.extend(1_u32.to_be_bytes());
        data.extend(tiny_segment(0, 48, &[0; 19])); // page information
        data.extend(tiny_segment(1, 51, &[])); // end of file

        let file = parse_file(&data).unwrap();
        assert_eq!(file.segments.len(), 2);
        assert_eq!(
            file.segments[0].header.segment_type,
            SegmentType::PageInformation
        );
        assert_eq!(file.segments[0].data.len(), 19);
    }

    #[test]
    fn random_access_file_reorders_data() {
        let mut data = FILE_HEADER_ID.to_vec();
        data.push(0x00); // random access
        data.extend(1_u32.to_be_bytes());

        // Two headers, then both data parts.
        let mut header_a = Vec::new();
        header_a.extend(0_u32.to_be_bytes());
        header_a.push(48);
        header_a.push(0x00);
        header_a.push(0x01);
        header_a.extend(2_u32.to_be_bytes());

        let mut header_b = header_a.clone();
        header_b[3] = 1; // segment number 1
        header_b[4] = 51; // end of file
        header_b[12..16].copy_from_slice(&0_u32.to_be_bytes());

        data.extend(&header_a);
        data.extend(&header_b);
        data.extend([0xAA, 0xBB]); // data of segment 0

        let file = parse_file(&data).unwrap();
        assert_eq!(file.segments.len(), 2);
        assert_eq!(file.segments[0].data, &[0xAA, 0xBB]);
        assert!(file.segments[1].data.is_empty());
    }

    #[test]
    fn embedded_streams_have_no_header() {
        let globals = tiny_segment(0, 0, &[0; 12]);
        let page = tiny_segment(1, 48, &[0; 19]);

        // Segment data is only collected at this stage, not decoded.
        let file = parse_embedded(Some(&globals), &page).unwrap();
        assert_eq!(file.segments.len(), 2);
        assert_eq!(file.segments[0].header.number, 0);
        assert_eq!(file.segments[1].header.number, 1);
    }

    #[test]
    fn rejects_bad_magic() {
        assert!(parse_file(b"not jbig2").is_err());
    }
}
