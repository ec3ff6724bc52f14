//! Text region decoding (ITU-T T.88 6.4, 7.4.3).

use sable_common::mq::{MqContext, MqDecoder};

use super::{
    AtPixels, GrTemplate, RegionInfo, parse_refinement_at_pixels, parse_region_info, refinement,
};
use crate::bitmap::{Bitmap, CombinationOperator};
use crate::error::{
    DecodeError, ErrorKind, FormatError, HuffmanError, Result, SymbolError, bail,
};
use crate::huffman::{HuffmanTable, StandardTables};
use crate::int::{IdDecoder, IntDecoder};
use crate::reader::Reader;
use crate::region::generic::Region;

/// The corner of each symbol instance that its (S, T) coordinate addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReferenceCorner {
    BottomLeft,
    TopLeft,
    BottomRight,
    TopRight,
}

impl ReferenceCorner {
    fn from_bits(value: u8) -> Self {
        match value & 0x03 {
            0 => Self::BottomLeft,
            1 => Self::TopLeft,
            2 => Self::BottomRight,
            _ => Self::TopRight,
        }
    }
}

/// The parameters of a text region decoding procedure (Table 9).
pub(crate) struct TextParams<'a> {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) num_instances: u32,
    pub(crate) strip_size: u32,
    pub(crate) default_pixel: bool,
    pub(crate) operator: CombinationOperator,
    pub(crate) transposed: bool,
    pub(crate) corner: ReferenceCorner,
    pub(crate) ds_offset: i32,
    pub(crate) use_refinement: bool,
    pub(crate) refinement_template: GrTemplate,
    pub(crate) refinement_at: &'a [super::AtPixel],
    pub(crate) log_strip_size: u8,
}

/// The arithmetic integer decoders shared across one text region (or across
/// a symbol dictionary's refinement/aggregation decoding).
pub(crate) struct TextContexts {
    pub(crate) dt: IntDecoder,
    pub(crate) first_s: IntDecoder,
    pub(crate) delta_s: IntDecoder,
    pub(crate) t: IntDecoder,
    pub(crate) id: IdDecoder,
    pub(crate) refine_flag: IntDecoder,
    pub(crate) rdw: IntDecoder,
    pub(crate) rdh: IntDecoder,
    pub(crate) rdx: IntDecoder,
    pub(crate) rdy: IntDecoder,
    pub(crate) refinement: Vec<MqContext>,
}

impl TextContexts {
    pub(crate) fn new(id_code_len: u32, refinement_template: GrTemplate) -> Self {
        Self {
            dt: IntDecoder::new(),
            first_s: IntDecoder::new(),
            delta_s: IntDecoder::new(),
            t: IntDecoder::new(),
            id: IdDecoder::new(id_code_len),
            refine_flag: IntDecoder::new(),
            rdw: IntDecoder::new(),
            rdh: IntDecoder::new(),
            rdx: IntDecoder::new(),
            rdy: IntDecoder::new(),
            refinement: vec![MqContext::default(); 1 << refinement_template.context_bits()],
        }
    }
}

/// The Huffman tables selected for one text region (7.4.3.1.6).
struct TextTables<'a> {
    first_s: &'a HuffmanTable,
    delta_s: &'a HuffmanTable,
    delta_t: &'a HuffmanTable,
    rdw: &'a HuffmanTable,
    rdh: &'a HuffmanTable,
    rdx: &'a HuffmanTable,
    rdy: &'a HuffmanTable,
    rsize: &'a HuffmanTable,
    symbol_ids: HuffmanTable,
}

/// Either coding backend of the text region procedure.
enum Coder<'a, 'b> {
    Huffman {
        reader: &'a mut Reader<'b>,
        tables: TextTables<'a>,
    },
    Arithmetic {
        decoder: &'a mut MqDecoder<'b>,
        contexts: &'a mut TextContexts,
    },
}

impl Coder<'_, '_> {
    fn strip_delta_t(&mut self, strip_size: u32) -> Result<i32> {
        let value = match self {
            Self::Huffman { reader, tables } => tables.delta_t.decode_value(reader)?,
            Self::Arithmetic { decoder, contexts } => contexts
                .dt
                .decode(decoder)
                .ok_or(DecodeError::new(HuffmanError::UnexpectedOob, 0))?,
        };

        value
            .checked_mul(strip_size as i32)
            .ok_or(DecodeError::new(ErrorKind::Overflow, 0))
    }

    fn first_s(&mut self) -> Result<i32> {
        match self {
            Self::Huffman { reader, tables } => tables.first_s.decode_value(reader),
            Self::Arithmetic { decoder, contexts } => contexts
                .first_s
                .decode(decoder)
                .ok_or(DecodeError::new(HuffmanError::UnexpectedOob, 0)),
        }
    }

    /// `None` closes the current strip.
    fn delta_s(&mut self) -> Result<Option<i32>> {
        match self {
            Self::Huffman { reader, tables } => tables.delta_s.decode(reader),
            Self::Arithmetic { decoder, contexts } => Ok(contexts.delta_s.decode(decoder)),
        }
    }

    fn cur_t(&mut self, params: &TextParams<'_>) -> Result<i32> {
        if params.strip_size == 1 {
            return Ok(0);
        }

        match self {
            Self::Huffman { reader, .. } => reader
                .read_bits(params.log_strip_size)
                .map(|v| v as i32)
                .ok_or(DecodeError::new(FormatError::Truncated, 0)),
            Self::Arithmetic { decoder, contexts } => contexts
                .t
                .decode(decoder)
                .ok_or(DecodeError::new(HuffmanError::UnexpectedOob, 0)),
        }
    }

    fn symbol_id(&mut self) -> Result<usize> {
        match self {
            Self::Huffman { reader, tables } => {
                tables.symbol_ids.decode_value(reader).map(|v| v as usize)
            }
            Self::Arithmetic { decoder, contexts } => Ok(contexts.id.decode(decoder) as usize),
        }
    }

    fn refinement_flag(&mut self) -> Result<bool> {
        match self {
            Self::Huffman { reader, .. } => reader
                .read_bit()
                .map(|b| b != 0)
                .ok_or(DecodeError::new(FormatError::Truncated, 0)),
            Self::Arithmetic { decoder, contexts } => Ok(contexts
                .refine_flag
                .decode(decoder)
                .ok_or(DecodeError::new(HuffmanError::UnexpectedOob, 0))?
                != 0),
        }
    }
}

/// Decode a text region segment (7.4.3).
pub(crate) fn decode(
    reader: &mut Reader<'_>,
    symbols: &[&Bitmap],
    referred_tables: &[&HuffmanTable],
) -> Result<Region> {
    let eof = |reader: &Reader<'_>| {
        DecodeError::new(FormatError::Truncated, reader.byte_pos())
    };

    let info = parse_region_info(reader)?;

    // 7.4.3.1.1: text region segment flags.
    let flags = reader.read_u16().ok_or_else(|| eof(reader))?;
    let use_huffman = flags & 0x0001 != 0;
    let use_refinement = flags & 0x0002 != 0;
    let log_strip_size = ((flags >> 2) & 0x03) as u8;
    let corner = ReferenceCorner::from_bits((flags >> 4) as u8);
    let transposed = flags & 0x0040 != 0;
    let operator = CombinationOperator::from_value(((flags >> 7) & 0x03) as u8).ok_or(
        DecodeError::new(
            crate::error::RegionError::InvalidCombinationOperator,
            reader.byte_pos(),
        ),
    )?;
    let default_pixel = flags & 0x0200 != 0;

    let ds_offset_raw = ((flags >> 10) & 0x1F) as u8;
    let ds_offset = if ds_offset_raw & 0x10 != 0 {
        (ds_offset_raw | 0xE0) as i8 as i32
    } else {
        ds_offset_raw as i32
    };

    let refinement_template = GrTemplate::from_bit((flags >> 15) as u8);

    // 7.4.3.1.2: Huffman table selections.
    let huffman_flags = if use_huffman {
        Some(reader.read_u16().ok_or_else(|| eof(reader))?)
    } else {
        None
    };

    let refinement_at = if use_refinement && refinement_template == GrTemplate::Template0 {
        parse_refinement_at_pixels(reader)?
    } else {
        AtPixels::new()
    };

    let num_instances = reader.read_u32().ok_or_else(|| eof(reader))?;

    let num_symbols = symbols.len() as u32;
    let id_code_len = 32 - num_symbols.saturating_sub(1).leading_zeros();

    let params = TextParams {
        width: info.width,
        height: info.height,
        num_instances,
        strip_size: 1 << log_strip_size,
        default_pixel,
        operator,
        transposed,
        corner,
        ds_offset,
        use_refinement,
        refinement_template,
        refinement_at: &refinement_at,
        log_strip_size,
    };

    let bitmap = if let Some(huffman_flags) = huffman_flags {
        let tables =
            select_tables(huffman_flags, referred_tables, reader, num_symbols)?;
        let mut coder = Coder::Huffman { reader, tables };
        decode_with(&mut coder, symbols, &params)?
    } else {
        let data = reader.tail().ok_or_else(|| eof(reader))?;
        let mut decoder = MqDecoder::new(data);
        let mut contexts = TextContexts::new(id_code_len.max(1), refinement_template);

        let mut coder = Coder::Arithmetic {
            decoder: &mut decoder,
            contexts: &mut contexts,
        };
        decode_with(&mut coder, symbols, &params)?
    };

    Ok(Region { info, bitmap })
}

/// Run the text region procedure over an existing arithmetic decoder; used
/// for symbol aggregation inside symbol dictionaries (6.5.8.2, Table 17).
pub(crate) fn decode_aggregate(
    decoder: &mut MqDecoder<'_>,
    contexts: &mut TextContexts,
    symbols: &[&Bitmap],
    params: &TextParams<'_>,
) -> Result<Bitmap> {
    let mut coder = Coder::Arithmetic { decoder, contexts };
    decode_with(&mut coder, symbols, params)
}

/// Select the text region Huffman tables (7.4.3.1.6) and read the symbol-ID
/// code table.
fn select_tables<'a>(
    flags: u16,
    referred: &[&'a HuffmanTable],
    reader: &mut Reader<'_>,
    num_symbols: u32,
) -> Result<TextTables<'a>> {
    let mut custom_idx = 0;

    let mut custom = |offset: usize| -> Result<&'a HuffmanTable> {
        let table = referred
            .get(custom_idx)
            .copied()
            .ok_or(DecodeError::new(HuffmanError::MissingTables, offset))?;
        custom_idx += 1;
        Ok(table)
    };

    let offset = reader.byte_pos();

    let first_s = match flags & 0x03 {
        0 => StandardTables::f(),
        1 => StandardTables::g(),
        3 => custom(offset)?,
        _ => bail!(HuffmanError::InvalidSelection, offset),
    };

    let delta_s = match (flags >> 2) & 0x03 {
        0 => StandardTables::h(),
        1 => StandardTables::i(),
        2 => StandardTables::j(),
        _ => custom(offset)?,
    };

    let delta_t = match (flags >> 4) & 0x03 {
        0 => StandardTables::k(),
        1 => StandardTables::l(),
        2 => StandardTables::m(),
        _ => custom(offset)?,
    };

    let rdw = match (flags >> 6) & 0x03 {
        0 => StandardTables::n(),
        1 => StandardTables::o(),
        3 => custom(offset)?,
        _ => bail!(HuffmanError::InvalidSelection, offset),
    };

    let rdh = match (flags >> 8) & 0x03 {
        0 => StandardTables::n(),
        1 => StandardTables::o(),
        3 => custom(offset)?,
        _ => bail!(HuffmanError::InvalidSelection, offset),
    };

    let rdx = match (flags >> 10) & 0x03 {
        0 => StandardTables::n(),
        1 => StandardTables::o(),
        3 => custom(offset)?,
        _ => bail!(HuffmanError::InvalidSelection, offset),
    };

    let rdy = match (flags >> 12) & 0x03 {
        0 => StandardTables::n(),
        1 => StandardTables::o(),
        3 => custom(offset)?,
        _ => bail!(HuffmanError::InvalidSelection, offset),
    };

    let rsize = if (flags >> 14) & 0x01 == 0 {
        StandardTables::a()
    } else {
        custom(offset)?
    };

    let symbol_ids = HuffmanTable::symbol_id_codes(reader, num_symbols)?;

    Ok(TextTables {
        first_s,
        delta_s,
        delta_t,
        rdw,
        rdh,
        rdx,
        rdy,
        rsize,
        symbol_ids,
    })
}

/// The text region decoding procedure (6.4.5).
fn decode_with(
    coder: &mut Coder<'_, '_>,
    symbols: &[&Bitmap],
    params: &TextParams<'_>,
) -> Result<Bitmap> {
    let mut bitmap = Bitmap::filled(params.width, params.height, params.default_pixel);

    let overflow = DecodeError::new(ErrorKind::Overflow, 0);

    // "Decode the initial STRIPT value", negated (6.4.5 step 1).
    let mut strip_t = coder
        .strip_delta_t(params.strip_size)?
        .checked_neg()
        .ok_or(overflow)?;
    let mut first_s: i32 = 0;
    let mut instances = 0_u32;

    while instances < params.num_instances {
        // 6.4.5 step 3c: advance to the next strip.
        strip_t = strip_t
            .checked_add(coder.strip_delta_t(params.strip_size)?)
            .ok_or(overflow)?;

        let mut cur_s;

        // First symbol of the strip (6.4.7).
        first_s = first_s.checked_add(coder.first_s()?).ok_or(overflow)?;
        cur_s = first_s;

        loop {
            if instances > params.num_instances {
                bail!(SymbolError::TooManySymbols, 0);
            }

            // The T coordinate of this instance (6.4.9).
            let cur_t = strip_t
                .checked_add(coder.cur_t(params)?)
                .ok_or(overflow)?;

            let id = coder.symbol_id()?;
            let symbol = *symbols.get(id).ok_or(DecodeError::new(SymbolError::OutOfRange, 0))?;

            // An optionally refined instance bitmap (6.4.11).
            let refined;
            let instance: &Bitmap = if params.use_refinement && coder.refinement_flag()? {
                refined = refine_instance(coder, symbol, params)?;
                &refined
            } else {
                symbol
            };

            let (w, h) = (instance.width as i32, instance.height as i32);

            // 6.4.5 step 3c x: advance S to the far edge first for
            // right/bottom reference corners.
            if !params.transposed
                && matches!(
                    params.corner,
                    ReferenceCorner::TopRight | ReferenceCorner::BottomRight
                )
            {
                cur_s = cur_s.checked_add(w - 1).ok_or(overflow)?;
            } else if params.transposed
                && matches!(
                    params.corner,
                    ReferenceCorner::BottomLeft | ReferenceCorner::BottomRight
                )
            {
                cur_s = cur_s.checked_add(h - 1).ok_or(overflow)?;
            }

            let (x, y) = instance_origin(params, cur_s, cur_t, w, h);
            bitmap.combine(instance, x, y, params.operator);

            if !params.transposed
                && matches!(
                    params.corner,
                    ReferenceCorner::TopLeft | ReferenceCorner::BottomLeft
                )
            {
                cur_s = cur_s.checked_add(w - 1).ok_or(overflow)?;
            } else if params.transposed
                && matches!(
                    params.corner,
                    ReferenceCorner::TopLeft | ReferenceCorner::TopRight
                )
            {
                cur_s = cur_s.checked_add(h - 1).ok_or(overflow)?;
            }

            instances += 1;

            if instances == params.num_instances {
                break;
            }

            // Subsequent symbols until the out-of-band strip end (6.4.8).
            let Some(delta_s) = coder.delta_s()? else {
                break;
            };

            cur_s = cur_s
                .checked_add(delta_s)
                .and_then(|s| s.checked_add(params.ds_offset))
                .ok_or(overflow)?;
        }
    }

    Ok(bitmap)
}

/// Where the top-left corner of an instance lands, given its (S, T)
/// coordinate and the region's orientation flags.
fn instance_origin(
    params: &TextParams<'_>,
    s: i32,
    t: i32,
    width: i32,
    height: i32,
) -> (i32, i32) {
    if !params.transposed {
        match params.corner {
            ReferenceCorner::TopLeft => (s, t),
            ReferenceCorner::TopRight => (s - width + 1, t),
            ReferenceCorner::BottomLeft => (s, t - height + 1),
            ReferenceCorner::BottomRight => (s - width + 1, t - height + 1),
        }
    } else {
        match params.corner {
            ReferenceCorner::TopLeft => (t, s),
            ReferenceCorner::TopRight => (t - width + 1, s),
            ReferenceCorner::BottomLeft => (t, s - height + 1),
            ReferenceCorner::BottomRight => (t - width + 1, s - height + 1),
        }
    }
}

/// Decode one refined symbol instance (6.4.11 steps 2-6).
fn refine_instance(
    coder: &mut Coder<'_, '_>,
    symbol: &Bitmap,
    params: &TextParams<'_>,
) -> Result<Bitmap> {
    let overflow = DecodeError::new(ErrorKind::Overflow, 0);

    let (rdw, rdh, rdx, rdy, data): (i32, i32, i32, i32, Option<&[u8]>);

    match coder {
        Coder::Huffman { reader, tables } => {
            rdw = tables.rdw.decode_value(reader)?;
            rdh = tables.rdh.decode_value(reader)?;
            rdx = tables.rdx.decode_value(reader)?;
            rdy = tables.rdy.decode_value(reader)?;

            let size = tables.rsize.decode_value(reader)? as usize;
            reader.align();
            data = Some(
                reader
                    .read_bytes(size)
                    .ok_or(DecodeError::new(FormatError::Truncated, reader.byte_pos()))?,
            );
        }
        Coder::Arithmetic { decoder, contexts } => {
            let oob = DecodeError::new(HuffmanError::UnexpectedOob, 0);
            rdw = contexts.rdw.decode(decoder).ok_or(oob)?;
            rdh = contexts.rdh.decode(decoder).ok_or(oob)?;
            rdx = contexts.rdx.decode(decoder).ok_or(oob)?;
            rdy = contexts.rdy.decode(decoder).ok_or(oob)?;
            data = None;
        }
    }

    let width = (symbol.width as i32).checked_add(rdw).ok_or(overflow)?;
    let height = (symbol.height as i32).checked_add(rdh).ok_or(overflow)?;

    if width <= 0 || height <= 0 {
        bail!(crate::error::RegionError::InvalidDimension, 0);
    }

    // 6.4.11 step 4: the reference alignment offsets.
    let dx = rdw.div_euclid(2).checked_add(rdx).ok_or(overflow)?;
    let dy = rdh.div_euclid(2).checked_add(rdy).ok_or(overflow)?;

    let mut refined = Bitmap::new(width as u32, height as u32);

    match coder {
        Coder::Huffman { .. } => {
            // Huffman-coded refinement data is embedded as its own
            // arithmetically coded block with fresh contexts.
            let data = data.unwrap();
            let mut decoder = MqDecoder::new(data);
            let mut contexts =
                vec![MqContext::default(); 1 << params.refinement_template.context_bits()];

            refinement::decode_bitmap(
                &mut refined,
                symbol,
                dx,
                dy,
                &mut decoder,
                &mut contexts,
                params.refinement_template,
                params.refinement_at,
                false,
            );
        }
        Coder::Arithmetic { decoder, contexts } => {
            refinement::decode_bitmap(
                &mut refined,
                symbol,
                dx,
                dy,
                decoder,
                &mut contexts.refinement,
                params.refinement_template,
                params.refinement_at,
                false,
            );
        }
    }

    Ok(refined)
}
