//! Page information segments and page bitmap composition (ITU-T T.88
//! 7.4.8).

use crate::bitmap::CombinationOperator;
use crate::error::{DecodeError, FormatError, Result};
use crate::reader::Reader;

/// A parsed page information segment (7.4.8).
#[derive(Debug, Clone)]
pub(crate) struct PageInfo {
    pub(crate) width: u32,
    /// 0xFFFFFFFF declares the height unknown; the page is then striped and
    /// the height comes from the end-of-stripe segments.
    pub(crate) height: u32,
    pub(crate) default_pixel: bool,
    pub(crate) default_operator: CombinationOperator,
    pub(crate) striped: bool,
}

pub(crate) fn parse(reader: &mut Reader<'_>) -> Result<PageInfo> {
    let eof = |reader: &Reader<'_>| {
        DecodeError::new(FormatError::Truncated, reader.byte_pos())
    };

    let width = reader.read_u32().ok_or_else(|| eof(reader))?;
    let height = reader.read_u32().ok_or_else(|| eof(reader))?;

    // X/Y resolution, unused here.
    reader.read_u32().ok_or_else(|| eof(reader))?;
    reader.read_u32().ok_or_else(|| eof(reader))?;

    // 7.4.8.5: page segment flags.
    let flags = reader.read_byte().ok_or_else(|| eof(reader))?;
    let default_pixel = flags & 0x04 != 0;
    let default_operator =
        CombinationOperator::from_value((flags >> 3) & 0x03).unwrap_or(CombinationOperator::Or);

    // 7.4.8.6: striping information.
    let striping = reader.read_u16().ok_or_else(|| eof(reader))?;
    let striped = striping & 0x8000 != 0;

    Ok(PageInfo {
        width,
        height,
        default_pixel,
        default_operator,
        striped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_page_information() {
        let data = [
            0, 0, 0, 100, // width
            0, 0, 0, 50, // height
            0, 0, 0, 0, // x resolution
            0, 0, 0, 0, // y resolution
            0x0C, // default pixel 1, AND operator
            0x80, 0x00, // striped
        ];

        let mut reader = Reader::new(&data);
        let info = parse(&mut reader).unwrap();

        assert_eq!((info.width, info.height), (100, 50));
        assert!(info.default_pixel);
        assert_eq!(info.default_operator, CombinationOperator::And);
        assert!(info.striped);
    }
}
