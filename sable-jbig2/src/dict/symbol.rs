//! Symbol dictionary decoding (ITU-T T.88 6.5, 7.4.2).

use sable_common::mq::{MqContext, MqDecoder};

use crate::bitmap::{Bitmap, CombinationOperator};
use crate::error::{
    DecodeError, ErrorKind, FormatError, HuffmanError, RegionError, Result, SymbolError, bail,
};
use crate::huffman::{HuffmanTable, StandardTables};
use crate::int::IntDecoder;
use crate::mmr;
use crate::reader::Reader;
use crate::region::text::{ReferenceCorner, TextContexts, TextParams};
use crate::region::{
    AtPixels, GbTemplate, GrTemplate, generic, parse_at_pixels, parse_refinement_at_pixels,
    refinement, text,
};
use crate::Limits;

/// A decoded symbol dictionary: the exported bitmaps.
#[derive(Debug, Clone)]
pub(crate) struct SymbolDictionary {
    pub(crate) symbols: Vec<Bitmap>,
}

/// The Huffman table roles a symbol dictionary selects (7.4.2.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableChoice {
    Standard(u8),
    Custom,
}

#[derive(Debug, Clone)]
struct Flags {
    use_huffman: bool,
    use_refagg: bool,
    delta_height: TableChoice,
    delta_width: TableChoice,
    bitmap_size: TableChoice,
    aggregate_count: TableChoice,
    template: GbTemplate,
    refinement_template: GrTemplate,
}

fn parse_flags(word: u16, offset: usize) -> Result<Flags> {
    let delta_height = match (word >> 2) & 0x03 {
        0 => TableChoice::Standard(4),
        1 => TableChoice::Standard(5),
        3 => TableChoice::Custom,
        _ => bail!(HuffmanError::InvalidSelection, offset),
    };

    let delta_width = match (word >> 4) & 0x03 {
        0 => TableChoice::Standard(2),
        1 => TableChoice::Standard(3),
        3 => TableChoice::Custom,
        _ => bail!(HuffmanError::InvalidSelection, offset),
    };

    let bitmap_size = if word & 0x0040 != 0 {
        TableChoice::Custom
    } else {
        TableChoice::Standard(1)
    };

    let aggregate_count = if word & 0x0080 != 0 {
        TableChoice::Custom
    } else {
        TableChoice::Standard(1)
    };

    Ok(Flags {
        use_huffman: word & 0x0001 != 0,
        use_refagg: word & 0x0002 != 0,
        delta_height,
        delta_width,
        bitmap_size,
        aggregate_count,
        template: GbTemplate::from_bits((word >> 10) as u8),
        refinement_template: GrTemplate::from_bit((word >> 12) as u8),
    })
}

/// Decode a symbol dictionary segment (6.5.5).
pub(crate) fn decode(
    reader: &mut Reader<'_>,
    input_symbols: &[&Bitmap],
    referred_tables: &[&HuffmanTable],
    limits: &Limits,
) -> Result<SymbolDictionary> {
    let eof = |reader: &Reader<'_>| {
        DecodeError::new(FormatError::Truncated, reader.byte_pos())
    };

    let flags_word = reader.read_u16().ok_or_else(|| eof(reader))?;
    let flags = parse_flags(flags_word, reader.byte_pos())?;

    let at_pixels = if !flags.use_huffman {
        parse_at_pixels(reader, flags.template)?
    } else {
        AtPixels::new()
    };

    let refinement_at =
        if flags.use_refagg && flags.refinement_template == GrTemplate::Template0 {
            parse_refinement_at_pixels(reader)?
        } else {
            AtPixels::new()
        };

    let num_exported = reader.read_u32().ok_or_else(|| eof(reader))?;
    let num_new = reader.read_u32().ok_or_else(|| eof(reader))?;

    let total_symbols = (input_symbols.len() as u64) + num_new as u64;

    if total_symbols > limits.max_symbols as u64 || num_exported as u64 > total_symbols {
        return Err(DecodeError::new(
            ErrorKind::ResourceExceeded("symbol count"),
            reader.byte_pos(),
        ));
    }

    // 6.5.8.2.3: the symbol-ID code length over input + new symbols.
    let id_code_len = 32 - (total_symbols as u32).saturating_sub(1).leading_zeros();

    let mut ctx = DictContext {
        flags: &flags,
        at_pixels: &at_pixels,
        refinement_at: &refinement_at,
        input_symbols,
        new_symbols: Vec::with_capacity(num_new as usize),
        limits,
        backend: Backend::new(reader, &flags, referred_tables, id_code_len.max(1))?,
    };

    // Only used on the Huffman path without refinement.
    let mut pending_widths: Vec<u32> = Vec::new();

    let mut height: u32 = 0;
    let mut decoded: u32 = 0;

    // 6.5.5: one height class per iteration.
    while decoded < num_new {
        let delta_height = ctx.backend.delta_height()?;
        height = height
            .checked_add_signed(delta_height)
            .ok_or(DecodeError::new(RegionError::InvalidDimension, 0))?;

        let mut width: u32 = 0;
        let mut total_width: u32 = 0;
        let class_start = decoded;

        // Symbols of this height class, until the out-of-band width delta.
        while let Some(delta_width) = ctx.backend.delta_width()? {
            if decoded >= num_new {
                bail!(SymbolError::TooManySymbols, 0);
            }

            width = width
                .checked_add_signed(delta_width)
                .ok_or(DecodeError::new(RegionError::InvalidDimension, 0))?;
            total_width = total_width
                .checked_add(width)
                .ok_or(DecodeError::new(RegionError::InvalidDimension, 0))?;

            if width as u64 * height as u64 > ctx.limits.max_bitmap_bytes as u64 {
                return Err(DecodeError::new(
                    ErrorKind::ResourceExceeded("symbol bitmap"),
                    0,
                ));
            }

            match (flags.use_huffman, flags.use_refagg) {
                (false, false) => {
                    // 6.5.8.1: one symbol by direct generic decoding.
                    let symbol = ctx.decode_generic_symbol(width, height)?;
                    ctx.new_symbols.push(symbol);
                }
                (true, false) => {
                    // The bitmaps come later from the collective bitmap;
                    // only the width is recorded now.
                    pending_widths.push(width);
                }
                (_, true) => {
                    // 6.5.8.2: refinement or aggregation.
                    let symbol = ctx.decode_refagg_symbol(width, height, id_code_len)?;
                    ctx.new_symbols.push(symbol);
                }
            }

            decoded += 1;
        }

        if flags.use_huffman && !flags.use_refagg {
            ctx.decode_collective_class(
                &pending_widths[class_start as usize..decoded as usize],
                total_width,
                height,
            )?;
        }
    }

    let symbols = ctx.export_symbols(num_exported)?;

    Ok(SymbolDictionary { symbols })
}

/// Either coding backend of the symbol dictionary procedure.
enum Backend<'a, 'b> {
    Arithmetic {
        decoder: MqDecoder<'b>,
        delta_height: IntDecoder,
        delta_width: IntDecoder,
        export_run: IntDecoder,
        aggregate_count: IntDecoder,
        generic_contexts: Vec<MqContext>,
        text: TextContexts,
    },
    Huffman {
        reader: &'a mut Reader<'b>,
        delta_height: &'a HuffmanTable,
        delta_width: &'a HuffmanTable,
        bitmap_size: &'a HuffmanTable,
        aggregate_count: &'a HuffmanTable,
        export_run: &'a HuffmanTable,
    },
}

impl<'a, 'b> Backend<'a, 'b> {
    fn new(
        reader: &'a mut Reader<'b>,
        flags: &Flags,
        referred_tables: &[&'a HuffmanTable],
        id_code_len: u32,
    ) -> Result<Self> {
        if !flags.use_huffman {
            let data = reader.tail().ok_or(DecodeError::new(
                FormatError::Truncated,
                reader.byte_pos(),
            ))?;

            return Ok(Self::Arithmetic {
                decoder: MqDecoder::new(data),
                delta_height: IntDecoder::new(),
                delta_width: IntDecoder::new(),
                export_run: IntDecoder::new(),
                aggregate_count: IntDecoder::new(),
                generic_contexts: vec![
                    MqContext::default();
                    1 << flags.template.context_bits()
                ],
                text: TextContexts::new(id_code_len, flags.refinement_template),
            });
        }

        let mut custom_idx = 0;

        let mut select = |choice: TableChoice| -> Result<&'a HuffmanTable> {
            Ok(match choice {
                TableChoice::Standard(1) => StandardTables::a(),
                TableChoice::Standard(2) => StandardTables::b(),
                TableChoice::Standard(3) => StandardTables::c(),
                TableChoice::Standard(4) => StandardTables::d(),
                TableChoice::Standard(5) => StandardTables::e(),
                TableChoice::Standard(_) => bail!(HuffmanError::InvalidSelection, 0),
                TableChoice::Custom => {
                    let table = referred_tables
                        .get(custom_idx)
                        .copied()
                        .ok_or(DecodeError::new(HuffmanError::MissingTables, 0))?;
                    custom_idx += 1;
                    table
                }
            })
        };

        Ok(Self::Huffman {
            delta_height: select(flags.delta_height)?,
            delta_width: select(flags.delta_width)?,
            bitmap_size: select(flags.bitmap_size)?,
            aggregate_count: select(flags.aggregate_count)?,
            export_run: StandardTables::a(),
            reader,
        })
    }

    fn delta_height(&mut self) -> Result<i32> {
        match self {
            Self::Arithmetic {
                decoder,
                delta_height,
                ..
            } => delta_height
                .decode(decoder)
                .ok_or(DecodeError::new(HuffmanError::UnexpectedOob, 0)),
            Self::Huffman {
                reader,
                delta_height,
                ..
            } => delta_height.decode_value(reader),
        }
    }

    fn delta_width(&mut self) -> Result<Option<i32>> {
        match self {
            Self::Arithmetic {
                decoder,
                delta_width,
                ..
            } => Ok(delta_width.decode(decoder)),
            Self::Huffman {
                reader,
                delta_width,
                ..
            } => delta_width.decode(reader),
        }
    }

    fn export_run(&mut self) -> Result<i32> {
        match self {
            Self::Arithmetic {
                decoder,
                export_run,
                ..
            } => export_run
                .decode(decoder)
                .ok_or(DecodeError::new(HuffmanError::UnexpectedOob, 0)),
            Self::Huffman {
                reader, export_run, ..
            } => export_run.decode_value(reader),
        }
    }

    fn aggregate_count(&mut self) -> Result<i32> {
        match self {
            Self::Arithmetic {
                decoder,
                aggregate_count,
                ..
            } => aggregate_count
                .decode(decoder)
                .ok_or(DecodeError::new(HuffmanError::UnexpectedOob, 0)),
            Self::Huffman {
                reader,
                aggregate_count,
                ..
            } => aggregate_count.decode_value(reader),
        }
    }
}

struct DictContext<'a, 'b> {
    flags: &'a Flags,
    at_pixels: &'a AtPixels,
    refinement_at: &'a AtPixels,
    input_symbols: &'a [&'a Bitmap],
    new_symbols: Vec<Bitmap>,
    limits: &'a Limits,
    backend: Backend<'a, 'b>,
}

impl DictContext<'_, '_> {
    /// 6.5.8.1: direct generic decoding of one symbol.
    fn decode_generic_symbol(&mut self, width: u32, height: u32) -> Result<Bitmap> {
        let Backend::Arithmetic {
            decoder,
            generic_contexts,
            ..
        } = &mut self.backend
        else {
            bail!(HuffmanError::InvalidSelection, 0);
        };

        let mut bitmap = Bitmap::new(width, height);

        generic::decode_bitmap(
            &mut bitmap,
            decoder,
            generic_contexts,
            self.flags.template,
            false,
            self.at_pixels,
            None,
        );

        Ok(bitmap)
    }

    /// 6.5.8.2: one symbol by refinement or aggregation.
    fn decode_refagg_symbol(
        &mut self,
        width: u32,
        height: u32,
        id_code_len: u32,
    ) -> Result<Bitmap> {
        let count = self.backend.aggregate_count()?;

        if count == 1 {
            self.decode_single_refinement(width, height, id_code_len)
        } else if count > 1 {
            self.decode_aggregate(width, height, count as u32)
        } else {
            err_invalid()
        }
    }

    /// 6.5.8.2.2: a single refinement of an existing symbol.
    fn decode_single_refinement(
        &mut self,
        width: u32,
        height: u32,
        id_code_len: u32,
    ) -> Result<Bitmap> {
        // The reference lookup touches only the symbol lists, never the
        // backend that stays mutably borrowed here.
        let lookup = |input: &[&Bitmap], new: &[Bitmap], id: usize| -> Result<Bitmap> {
            if id < input.len() {
                Ok(input[id].clone())
            } else {
                new.get(id - input.len())
                    .cloned()
                    .ok_or(DecodeError::new(SymbolError::OutOfRange, 0))
            }
        };

        match &mut self.backend {
            Backend::Arithmetic { decoder, text, .. } => {
                let id = text.id.decode(decoder) as usize;

                let oob = DecodeError::new(HuffmanError::UnexpectedOob, 0);
                let rdx = text.rdx.decode(decoder).ok_or(oob)?;
                let rdy = text.rdy.decode(decoder).ok_or(oob)?;

                let reference = lookup(self.input_symbols, &self.new_symbols, id)?;
                let mut bitmap = Bitmap::new(width, height);

                refinement::decode_bitmap(
                    &mut bitmap,
                    &reference,
                    rdx,
                    rdy,
                    decoder,
                    &mut text.refinement,
                    self.flags.refinement_template,
                    self.refinement_at,
                    false,
                );

                Ok(bitmap)
            }
            Backend::Huffman { reader, .. } => {
                let id = reader
                    .read_bits(id_code_len.max(1) as u8)
                    .ok_or(DecodeError::new(FormatError::Truncated, 0))?
                    as usize;

                let rdx = StandardTables::o().decode_value(reader)?;
                let rdy = StandardTables::o().decode_value(reader)?;

                let size = StandardTables::a().decode_value(reader)? as usize;
                reader.align();
                let data = reader
                    .read_bytes(size)
                    .ok_or(DecodeError::new(FormatError::Truncated, 0))?;

                let reference = lookup(self.input_symbols, &self.new_symbols, id)?;
                let mut bitmap = Bitmap::new(width, height);

                let mut decoder = MqDecoder::new(data);
                let mut contexts = vec![
                    MqContext::default();
                    1 << self.flags.refinement_template.context_bits()
                ];

                refinement::decode_bitmap(
                    &mut bitmap,
                    &reference,
                    rdx,
                    rdy,
                    &mut decoder,
                    &mut contexts,
                    self.flags.refinement_template,
                    self.refinement_at,
                    false,
                );

                Ok(bitmap)
            }
        }
    }

    /// 6.5.8.2 with REFAGGNINST > 1: a text region over the symbols decoded
    /// so far (Table 17).
    fn decode_aggregate(&mut self, width: u32, height: u32, count: u32) -> Result<Bitmap> {
        let Backend::Arithmetic { decoder, text, .. } = &mut self.backend else {
            // Table 17 requires the arithmetic coder for the aggregate
            // bitmap even in Huffman dictionaries; the byte embedding is
            // not implemented.
            bail!(ErrorKind::Unsupported("Huffman aggregate symbols"), 0);
        };

        let mut symbols: Vec<&Bitmap> =
            Vec::with_capacity(self.input_symbols.len() + self.new_symbols.len());
        symbols.extend(self.input_symbols.iter().copied());
        symbols.extend(self.new_symbols.iter());

        let params = TextParams {
            width,
            height,
            num_instances: count,
            strip_size: 1,
            default_pixel: false,
            operator: CombinationOperator::Or,
            transposed: false,
            corner: ReferenceCorner::TopLeft,
            ds_offset: 0,
            use_refinement: true,
            refinement_template: self.flags.refinement_template,
            refinement_at: self.refinement_at,
            log_strip_size: 0,
        };

        text::decode_aggregate(decoder, text, &symbols, &params)
    }

    /// 6.5.9: the collective bitmap of one Huffman height class.
    fn decode_collective_class(
        &mut self,
        widths: &[u32],
        total_width: u32,
        height: u32,
    ) -> Result<()> {
        let Backend::Huffman {
            reader,
            bitmap_size,
            ..
        } = &mut self.backend
        else {
            bail!(HuffmanError::InvalidSelection, 0);
        };

        let size = bitmap_size.decode_value(reader)?;

        if size < 0 {
            bail!(HuffmanError::InvalidCode, 0);
        }

        reader.align();

        let mut collective = Bitmap::new(total_width, height);

        if size == 0 {
            // Stored uncompressed, row-aligned to bytes.
            let row_bytes = total_width.div_ceil(8) as usize;

            for y in 0..height {
                let row = reader
                    .read_bytes(row_bytes)
                    .ok_or(DecodeError::new(FormatError::Truncated, 0))?;

                for x in 0..total_width {
                    let byte = row[(x / 8) as usize];
                    collective.set(x, y, (byte >> (7 - x % 8)) & 1 != 0);
                }
            }
        } else {
            let data = reader
                .read_bytes(size as usize)
                .ok_or(DecodeError::new(FormatError::Truncated, 0))?;
            mmr::decode_into(&mut collective, data)?;
        }

        // 6.5.5 step 4d: split the class bitmap into its symbols.
        let mut x_offset = 0;

        for &width in widths {
            let mut symbol = Bitmap::new(width, height);

            for y in 0..height {
                for x in 0..width {
                    symbol.set(x, y, collective.get(x_offset + x, y));
                }
            }

            self.new_symbols.push(symbol);
            x_offset += width;
        }

        Ok(())
    }

    /// 6.5.10: run-length coded export flags over input + new symbols.
    fn export_symbols(mut self, num_exported: u32) -> Result<Vec<Bitmap>> {
        let total = self.input_symbols.len() + self.new_symbols.len();

        let mut exported = Vec::with_capacity(num_exported as usize);
        let mut index = 0_usize;
        let mut export_flag = false;

        while index < total {
            let run = self.backend.export_run()?;

            if run < 0 {
                bail!(HuffmanError::InvalidCode, 0);
            }

            let end = index
                .checked_add(run as usize)
                .filter(|&end| end <= total)
                .ok_or(DecodeError::new(SymbolError::BadExportCount, 0))?;

            if export_flag {
                for i in index..end {
                    let symbol = if i < self.input_symbols.len() {
                        self.input_symbols[i].clone()
                    } else {
                        self.new_symbols[i - self.input_symbols.len()].clone()
                    };
                    exported.push(symbol);
                }
            }

            index = end;
            export_flag = !export_flag;
        }

        if exported.len() != num_exported as usize {
            bail!(SymbolError::BadExportCount, 0);
        }

        Ok(exported)
    }
}

fn err_invalid() -> Result<Bitmap> {
    Err(DecodeError::new(RegionError::InvalidDimension, 0))
}
