//! JP2 container box parsing (ISO/IEC 15444-1 Annex I).

use sable_common::byte::Reader;

use crate::error::{DecodeError, FormatError, Result, bail};

/// The colour information carried by a JP2 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColorSpecification {
    Srgb,
    Greyscale,
    Sycc,
    /// Any method or enumeration this decoder does not interpret.
    Unknown,
}

/// The pieces of a JP2 file needed to reach and interpret the codestream.
#[derive(Debug, Clone)]
pub(crate) struct Jp2File<'a> {
    pub(crate) codestream: &'a [u8],
    pub(crate) color: ColorSpecification,
}

const SIGNATURE: &[u8] = b"\x00\x00\x00\x0C\x6A\x50\x20\x20\x0D\x0A\x87\x0A";

pub(crate) fn is_jp2(data: &[u8]) -> bool {
    data.starts_with(SIGNATURE)
}

/// Walk the top-level box sequence of a JP2 file.
pub(crate) fn parse(data: &[u8]) -> Result<Jp2File<'_>> {
    if !is_jp2(data) {
        bail!(FormatError::BadMagic, 0);
    }

    let mut reader = Reader::new(data);
    reader.skip_bytes(SIGNATURE.len()).unwrap();

    let mut color = ColorSpecification::Unknown;
    let mut codestream = None;

    while !reader.at_end() {
        let (box_type, content) = read_box(&mut reader)?;

        match &box_type {
            b"ftyp" => {
                // The brand is not validated beyond its presence.
            }
            b"jp2h" => {
                color = parse_header_box(content, reader.offset())?;
            }
            b"jp2c" => {
                codestream = Some(content);
                // Everything after the codestream box is irrelevant here.
                break;
            }
            _ => {}
        }
    }

    let codestream = codestream
        .ok_or(DecodeError::new(FormatError::MissingCodestream, data.len()))?;

    Ok(Jp2File { codestream, color })
}

/// Read one box, returning its type and content bytes.
fn read_box<'a>(reader: &mut Reader<'a>) -> Result<([u8; 4], &'a [u8])> {
    let offset = reader.offset();
    let eof = DecodeError::new(FormatError::Truncated, offset);

    let lbox = reader.read_u32().ok_or(eof)? as u64;
    let tbox: [u8; 4] = reader.read_bytes(4).ok_or(eof)?.try_into().unwrap();

    let content_len = match lbox {
        // Box extends to the end of the file.
        0 => reader.remaining() as u64,
        // Extended 64-bit length.
        1 => {
            let xlbox = reader.read_u64().ok_or(eof)?;
            xlbox
                .checked_sub(16)
                .ok_or(DecodeError::new(FormatError::InvalidBox, offset))?
        }
        2..=7 => bail!(FormatError::InvalidBox, offset),
        _ => lbox - 8,
    };

    let content = reader
        .read_bytes(content_len.try_into().map_err(|_| eof)?)
        .ok_or(eof)?;

    Ok((tbox, content))
}

/// Parse the JP2 Header superbox, extracting the colour specification.
fn parse_header_box(content: &[u8], base_offset: usize) -> Result<ColorSpecification> {
    let mut reader = Reader::new(content);
    let mut color = ColorSpecification::Unknown;

    while !reader.at_end() {
        let (box_type, body) = read_box(&mut reader)?;

        if &box_type == b"colr" {
            color = parse_color_box(body, base_offset)?;
        }

        // The image header box duplicates SIZ information and the palette,
        // component-mapping and channel-definition boxes are outside this
        // decoder's colour handling; all are skipped.
    }

    Ok(color)
}

/// The Colour Specification box (I.5.3.3).
fn parse_color_box(body: &[u8], offset: usize) -> Result<ColorSpecification> {
    let mut reader = Reader::new(body);
    let eof = DecodeError::new(FormatError::Truncated, offset);

    let method = reader.read_byte().ok_or(eof)?;
    let _precedence = reader.read_byte().ok_or(eof)?;
    let _approximation = reader.read_byte().ok_or(eof)?;

    if method != 1 {
        // Restricted ICC profiles and vendor methods fall back to the
        // component-count heuristic.
        return Ok(ColorSpecification::Unknown);
    }

    Ok(match reader.read_u32().ok_or(eof)? {
        16 => ColorSpecification::Srgb,
        17 => ColorSpecification::Greyscale,
        18 => ColorSpecification::Sycc,
        _ => ColorSpecification::Unknown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_box(out: &mut Vec<u8>, tbox: &[u8; 4], content: &[u8]) {
        out.extend(((content.len() + 8) as u32).to_be_bytes());
        out.extend(tbox);
        out.extend_from_slice(content);
    }

    fn minimal_jp2(codestream: &[u8]) -> Vec<u8> {
        let mut out = SIGNATURE.to_vec();

        push_box(&mut out, b"ftyp", b"jp2 \x00\x00\x00\x00jp2 ");

        let mut jp2h = Vec::new();
        push_box(
            &mut jp2h,
            b"ihdr",
            &[0, 0, 0, 8, 0, 0, 0, 8, 0, 1, 7, 7, 0, 0],
        );
        let mut colr = vec![1, 0, 0];
        colr.extend(17_u32.to_be_bytes());
        push_box(&mut jp2h, b"colr", &colr);
        push_box(&mut out, b"jp2h", &jp2h);

        push_box(&mut out, b"jp2c", codestream);
        out
    }

    #[test]
    fn finds_codestream_and_color() {
        let data = minimal_jp2(&[0xFF, 0x4F, 0xFF, 0x51]);
        let file = parse(&data).unwrap();

        assert_eq!(file.color, ColorSpecification::Greyscale);
        assert_eq!(file.codestream, &[0xFF, 0x4F, 0xFF, 0x51]);
    }

    #[test]
    fn rejects_missing_signature() {
        assert!(parse(b"not a jp2 file").is_err());
    }

    #[test]
    fn missing_codestream_box_is_an_error() {
        let mut data = SIGNATURE.to_vec();
        push_box(&mut data, b"ftyp", b"jp2 ");

        let err = parse(&data).unwrap_err();
        assert!(matches!(
            err.kind,
            crate::error::ErrorKind::Format(FormatError::MissingCodestream)
        ));
    }
}
