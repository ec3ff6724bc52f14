//! Huffman tables (ITU-T T.88 Annex B): the fifteen standard tables, custom
//! tables from `Tables` segments, and the run-coded symbol-ID tables used by
//! Huffman text regions.

use std::sync::LazyLock;

use crate::error::{DecodeError, FormatError, HuffmanError, Result, bail};
use crate::reader::Reader;

/// One line of a code table (B.1).
#[derive(Debug, Clone, Copy)]
pub(crate) struct TableLine {
    /// The lowest value of the line's range (the highest for lower-range
    /// lines).
    range_low: i32,
    /// The prefix code length; zero means the line is unused.
    preflen: u8,
    /// The number of range bits following the prefix.
    range_len: u8,
    /// Lower-range line: the offset is subtracted instead of added.
    is_lower: bool,
    /// The out-of-band line.
    is_oob: bool,
}

impl TableLine {
    pub(crate) const fn new(range_low: i32, preflen: u8, range_len: u8) -> Self {
        Self {
            range_low,
            preflen,
            range_len,
            is_lower: false,
            is_oob: false,
        }
    }

    const fn lower(range_high: i32, preflen: u8, range_len: u8) -> Self {
        Self {
            range_low: range_high,
            preflen,
            range_len,
            is_lower: true,
            is_oob: false,
        }
    }

    const fn upper(range_low: i32, preflen: u8, range_len: u8) -> Self {
        Self {
            range_low,
            preflen,
            range_len,
            is_lower: false,
            is_oob: false,
        }
    }

    const fn oob(preflen: u8) -> Self {
        Self {
            range_low: 0,
            preflen,
            range_len: 0,
            is_lower: false,
            is_oob: true,
        }
    }
}

/// One assigned code of a built table.
#[derive(Debug, Clone, Copy)]
struct Code {
    prefix: u32,
    preflen: u8,
    line: TableLine,
}

/// A decoding-ready Huffman table.
#[derive(Debug, Clone)]
pub(crate) struct HuffmanTable {
    /// Codes sorted by prefix length, decoded by walking bits.
    codes: Vec<Code>,
}

impl HuffmanTable {
    /// Assign prefix codes to the table lines (B.3) and build the table.
    pub(crate) fn build(lines: &[TableLine]) -> Self {
        let max_len = lines.iter().map(|l| l.preflen).max().unwrap_or(0) as usize;

        // Histogram of prefix lengths; length zero marks unused lines.
        let mut len_count = vec![0_u32; max_len + 1];

        for line in lines {
            len_count[line.preflen as usize] += 1;
        }

        len_count[0] = 0;

        let mut first_code = vec![0_u32; max_len + 1];
        let mut codes = Vec::with_capacity(lines.len());

        for curlen in 1..=max_len {
            first_code[curlen] = (first_code[curlen - 1] + len_count[curlen - 1]) << 1;
            let mut cur_code = first_code[curlen];

            for line in lines {
                if line.preflen as usize == curlen {
                    codes.push(Code {
                        prefix: cur_code,
                        preflen: curlen as u8,
                        line: *line,
                    });
                    cur_code += 1;
                }
            }
        }

        Self { codes }
    }

    /// Decode one value (B.4). Returns `None` for the out-of-band value.
    pub(crate) fn decode(&self, reader: &mut Reader<'_>) -> Result<Option<i32>> {
        let mut prefix = 0_u32;
        let mut len = 0_u8;

        loop {
            let bit = reader.read_bit().ok_or(DecodeError::new(
                FormatError::Truncated,
                reader.byte_pos(),
            ))?;

            prefix = (prefix << 1) | bit as u32;
            len += 1;

            if len > 32 {
                bail!(HuffmanError::InvalidCode, reader.byte_pos());
            }

            let Some(code) = self
                .codes
                .iter()
                .find(|c| c.preflen == len && c.prefix == prefix)
            else {
                continue;
            };

            let line = code.line;

            if line.is_oob {
                return Ok(None);
            }

            let offset = reader.read_bits(line.range_len).ok_or(DecodeError::new(
                FormatError::Truncated,
                reader.byte_pos(),
            ))? as i64;

            let value = if line.is_lower {
                line.range_low as i64 - offset
            } else {
                line.range_low as i64 + offset
            };

            let value = i32::try_from(value)
                .map_err(|_| DecodeError::new(HuffmanError::InvalidCode, reader.byte_pos()))?;

            return Ok(Some(value));
        }
    }

    /// Decode a value that must not be out-of-band.
    pub(crate) fn decode_value(&self, reader: &mut Reader<'_>) -> Result<i32> {
        self.decode(reader)?.ok_or(DecodeError::new(
            HuffmanError::UnexpectedOob,
            reader.byte_pos(),
        ))
    }

    /// Read a custom code table from a `Tables` segment (B.2).
    pub(crate) fn from_custom(reader: &mut Reader<'_>) -> Result<Self> {
        let eof =
            |reader: &Reader<'_>| DecodeError::new(FormatError::Truncated, reader.byte_pos());

        let flags = reader.read_byte().ok_or_else(|| eof(reader))?;
        let htoob = flags & 1 != 0;
        let htps = ((flags >> 1) & 7) + 1;
        let htrs = ((flags >> 4) & 7) + 1;

        let htlow = reader.read_i32().ok_or_else(|| eof(reader))?;
        let hthigh = reader.read_i32().ok_or_else(|| eof(reader))?;

        if htlow > hthigh {
            bail!(HuffmanError::InvalidCustomTable, reader.byte_pos());
        }

        let mut lines = Vec::new();
        let mut cur_low = htlow as i64;

        while cur_low < hthigh as i64 {
            let preflen = reader.read_bits(htps).ok_or_else(|| eof(reader))? as u8;
            let range_len = reader.read_bits(htrs).ok_or_else(|| eof(reader))? as u8;

            if range_len > 32 {
                bail!(HuffmanError::InvalidCustomTable, reader.byte_pos());
            }

            lines.push(TableLine::new(cur_low as i32, preflen, range_len));
            cur_low += 1_i64 << range_len;
        }

        // The lower and upper range lines always use 32 range bits.
        let preflen = reader.read_bits(htps).ok_or_else(|| eof(reader))? as u8;
        lines.push(TableLine::lower(htlow - 1, preflen, 32));

        let preflen = reader.read_bits(htps).ok_or_else(|| eof(reader))? as u8;
        lines.push(TableLine::upper(
            i32::try_from(cur_low)
                .map_err(|_| DecodeError::new(HuffmanError::InvalidCustomTable, 0))?,
            preflen,
            32,
        ));

        if htoob {
            let preflen = reader.read_bits(htps).ok_or_else(|| eof(reader))? as u8;
            lines.push(TableLine::oob(preflen));
        }

        Ok(Self::build(&lines))
    }

    /// Build the symbol-ID code table of a Huffman text region (7.4.3.1.7):
    /// 35 run codes describe the per-symbol code lengths.
    pub(crate) fn symbol_id_codes(reader: &mut Reader<'_>, num_symbols: u32) -> Result<Self> {
        let eof =
            |reader: &Reader<'_>| DecodeError::new(FormatError::Truncated, reader.byte_pos());

        let mut runcode_lines = Vec::with_capacity(35);

        for runcode in 0..35 {
            let preflen = reader.read_bits(4).ok_or_else(|| eof(reader))? as u8;
            runcode_lines.push(TableLine::new(runcode, preflen, 0));
        }

        let runcode_table = Self::build(&runcode_lines);
        let mut lengths: Vec<u8> = Vec::with_capacity(num_symbols as usize);

        while (lengths.len() as u32) < num_symbols {
            let runcode = runcode_table.decode_value(reader)?;

            match runcode {
                0..=31 => lengths.push(runcode as u8),
                32 => {
                    let repeat = reader.read_bits(2).ok_or_else(|| eof(reader))? + 3;
                    let last = *lengths
                        .last()
                        .ok_or(DecodeError::new(HuffmanError::InvalidCode, reader.byte_pos()))?;
                    lengths.extend(std::iter::repeat_n(last, repeat as usize));
                }
                33 => {
                    let repeat = reader.read_bits(3).ok_or_else(|| eof(reader))? + 3;
                    lengths.extend(std::iter::repeat_n(0, repeat as usize));
                }
                34 => {
                    let repeat = reader.read_bits(7).ok_or_else(|| eof(reader))? + 11;
                    lengths.extend(std::iter::repeat_n(0, repeat as usize));
                }
                _ => bail!(HuffmanError::InvalidCode, reader.byte_pos()),
            }
        }

        if lengths.len() as u32 != num_symbols {
            bail!(HuffmanError::InvalidCode, reader.byte_pos());
        }

        reader.align();

        let lines: Vec<TableLine> = lengths
            .iter()
            .enumerate()
            .map(|(idx, &len)| TableLine::new(idx as i32, len, 0))
            .collect();

        Ok(Self::build(&lines))
    }
}

/// The fifteen standard tables from Annex B, referred to by their selection
/// values in segment headers.
pub(crate) struct StandardTables;

macro_rules! standard_table {
    ($name:ident, [$($line:expr),+ $(,)?]) => {
        static $name: LazyLock<HuffmanTable> =
            LazyLock::new(|| HuffmanTable::build(&[$($line),+]));
    };
}

// Table B.1 (A): composite lengths.
standard_table!(TABLE_A, [
    TableLine::new(0, 1, 4),
    TableLine::new(16, 2, 8),
    TableLine::new(272, 3, 16),
    TableLine::upper(65808, 3, 32),
]);

// Table B.2 (B): deltas with OOB.
standard_table!(TABLE_B, [
    TableLine::new(0, 1, 0),
    TableLine::new(1, 2, 0),
    TableLine::new(2, 3, 0),
    TableLine::new(3, 4, 3),
    TableLine::new(11, 5, 6),
    TableLine::upper(75, 6, 32),
    TableLine::oob(6),
]);

// Table B.3 (C).
standard_table!(TABLE_C, [
    TableLine::new(-256, 8, 8),
    TableLine::new(0, 1, 0),
    TableLine::new(1, 2, 0),
    TableLine::new(2, 3, 0),
    TableLine::new(3, 4, 3),
    TableLine::new(11, 5, 6),
    TableLine::lower(-257, 8, 32),
    TableLine::upper(75, 7, 32),
    TableLine::oob(6),
]);

// Table B.4 (D).
standard_table!(TABLE_D, [
    TableLine::new(1, 1, 0),
    TableLine::new(2, 2, 0),
    TableLine::new(3, 3, 0),
    TableLine::new(4, 4, 3),
    TableLine::new(12, 5, 6),
    TableLine::upper(76, 5, 32),
]);

// Table B.5 (E).
standard_table!(TABLE_E, [
    TableLine::new(-255, 7, 8),
    TableLine::new(1, 1, 0),
    TableLine::new(2, 2, 0),
    TableLine::new(3, 3, 0),
    TableLine::new(4, 4, 3),
    TableLine::new(12, 5, 6),
    TableLine::lower(-256, 7, 32),
    TableLine::upper(76, 6, 32),
]);

// Table B.6 (F).
standard_table!(TABLE_F, [
    TableLine::new(-2048, 5, 10),
    TableLine::new(-1024, 4, 9),
    TableLine::new(-512, 4, 8),
    TableLine::new(-256, 4, 7),
    TableLine::new(-128, 5, 6),
    TableLine::new(-64, 5, 5),
    TableLine::new(-32, 4, 5),
    TableLine::new(0, 2, 7),
    TableLine::new(128, 3, 7),
    TableLine::new(256, 3, 8),
    TableLine::new(512, 4, 9),
    TableLine::new(1024, 4, 10),
    TableLine::lower(-2049, 6, 32),
    TableLine::upper(2048, 6, 32),
]);

// Table B.7 (G).
standard_table!(TABLE_G, [
    TableLine::new(-1024, 4, 9),
    TableLine::new(-512, 3, 8),
    TableLine::new(-256, 4, 7),
    TableLine::new(-128, 5, 6),
    TableLine::new(-64, 5, 5),
    TableLine::new(-32, 4, 5),
    TableLine::new(0, 4, 5),
    TableLine::new(32, 5, 5),
    TableLine::new(64, 5, 6),
    TableLine::new(128, 4, 7),
    TableLine::new(256, 3, 8),
    TableLine::new(512, 3, 9),
    TableLine::new(1024, 3, 10),
    TableLine::lower(-1025, 5, 32),
    TableLine::upper(2048, 5, 32),
]);

// Table B.8 (H).
standard_table!(TABLE_H, [
    TableLine::new(-15, 8, 3),
    TableLine::new(-7, 9, 1),
    TableLine::new(-5, 8, 1),
    TableLine::new(-3, 9, 0),
    TableLine::new(-2, 7, 0),
    TableLine::new(-1, 4, 0),
    TableLine::new(0, 2, 1),
    TableLine::new(2, 5, 0),
    TableLine::new(3, 6, 0),
    TableLine::new(4, 3, 4),
    TableLine::new(20, 6, 1),
    TableLine::new(22, 4, 4),
    TableLine::new(38, 4, 5),
    TableLine::new(70, 5, 6),
    TableLine::new(134, 5, 7),
    TableLine::new(262, 6, 7),
    TableLine::new(390, 7, 8),
    TableLine::new(646, 6, 10),
    TableLine::lower(-16, 9, 32),
    TableLine::upper(1670, 9, 32),
    TableLine::oob(2),
]);

// Table B.9 (I).
standard_table!(TABLE_I, [
    TableLine::new(-31, 8, 4),
    TableLine::new(-15, 9, 2),
    TableLine::new(-11, 8, 2),
    TableLine::new(-7, 9, 1),
    TableLine::new(-5, 7, 1),
    TableLine::new(-3, 4, 1),
    TableLine::new(-1, 3, 1),
    TableLine::new(1, 3, 1),
    TableLine::new(3, 5, 1),
    TableLine::new(5, 6, 1),
    TableLine::new(7, 3, 5),
    TableLine::new(39, 6, 2),
    TableLine::new(43, 4, 5),
    TableLine::new(75, 4, 6),
    TableLine::new(139, 5, 7),
    TableLine::new(267, 5, 8),
    TableLine::new(523, 6, 8),
    TableLine::new(779, 7, 9),
    TableLine::new(1291, 6, 11),
    TableLine::lower(-32, 9, 32),
    TableLine::upper(3339, 9, 32),
    TableLine::oob(2),
]);

// Table B.10 (J).
standard_table!(TABLE_J, [
    TableLine::new(-21, 7, 4),
    TableLine::new(-5, 8, 0),
    TableLine::new(-4, 7, 0),
    TableLine::new(-3, 5, 0),
    TableLine::new(-2, 2, 2),
    TableLine::new(2, 5, 0),
    TableLine::new(3, 6, 0),
    TableLine::new(4, 7, 0),
    TableLine::new(5, 8, 0),
    TableLine::new(6, 2, 6),
    TableLine::new(70, 5, 5),
    TableLine::new(102, 6, 5),
    TableLine::new(134, 6, 6),
    TableLine::new(198, 6, 7),
    TableLine::new(326, 6, 8),
    TableLine::new(582, 6, 9),
    TableLine::new(1094, 6, 10),
    TableLine::new(2118, 7, 11),
    TableLine::lower(-22, 8, 32),
    TableLine::upper(4166, 8, 32),
    TableLine::oob(2),
]);

// Table B.11 (K).
standard_table!(TABLE_K, [
    TableLine::new(1, 1, 0),
    TableLine::new(2, 2, 1),
    TableLine::new(4, 4, 0),
    TableLine::new(5, 4, 1),
    TableLine::new(7, 5, 1),
    TableLine::new(9, 5, 2),
    TableLine::new(13, 6, 2),
    TableLine::new(17, 7, 2),
    TableLine::new(21, 7, 3),
    TableLine::new(29, 7, 4),
    TableLine::new(45, 7, 5),
    TableLine::new(77, 7, 6),
    TableLine::upper(141, 7, 32),
]);

// Table B.12 (L).
standard_table!(TABLE_L, [
    TableLine::new(1, 1, 0),
    TableLine::new(2, 2, 0),
    TableLine::new(3, 3, 1),
    TableLine::new(5, 5, 0),
    TableLine::new(6, 5, 1),
    TableLine::new(8, 6, 1),
    TableLine::new(10, 7, 0),
    TableLine::new(11, 7, 1),
    TableLine::new(13, 7, 2),
    TableLine::new(17, 7, 3),
    TableLine::new(25, 7, 4),
    TableLine::new(41, 8, 5),
    TableLine::upper(73, 8, 32),
]);

// Table B.13 (M).
standard_table!(TABLE_M, [
    TableLine::new(1, 1, 0),
    TableLine::new(2, 3, 0),
    TableLine::new(3, 4, 0),
    TableLine::new(4, 5, 0),
    TableLine::new(5, 4, 1),
    TableLine::new(7, 3, 3),
    TableLine::new(15, 6, 1),
    TableLine::new(17, 6, 2),
    TableLine::new(21, 6, 3),
    TableLine::new(29, 6, 4),
    TableLine::new(45, 6, 5),
    TableLine::new(77, 7, 6),
    TableLine::upper(141, 7, 32),
]);

// Table B.14 (N).
standard_table!(TABLE_N, [
    TableLine::new(-2, 3, 0),
    TableLine::new(-1, 3, 0),
    TableLine::new(0, 1, 0),
    TableLine::new(1, 3, 0),
    TableLine::new(2, 3, 0),
]);

// Table B.15 (O).
standard_table!(TABLE_O, [
    TableLine::new(-24, 7, 4),
    TableLine::new(-8, 6, 2),
    TableLine::new(-4, 5, 1),
    TableLine::new(-2, 4, 0),
    TableLine::new(-1, 3, 0),
    TableLine::new(0, 1, 0),
    TableLine::new(1, 3, 0),
    TableLine::new(2, 4, 0),
    TableLine::new(3, 5, 1),
    TableLine::new(5, 6, 2),
    TableLine::new(9, 7, 4),
    TableLine::lower(-25, 7, 32),
    TableLine::upper(25, 7, 32),
]);

impl StandardTables {
    pub(crate) fn a() -> &'static HuffmanTable {
        &TABLE_A
    }
    pub(crate) fn b() -> &'static HuffmanTable {
        &TABLE_B
    }
    pub(crate) fn c() -> &'static HuffmanTable {
        &TABLE_C
    }
    pub(crate) fn d() -> &'static HuffmanTable {
        &TABLE_D
    }
    pub(crate) fn e() -> &'static HuffmanTable {
        &TABLE_E
    }
    pub(crate) fn f() -> &'static HuffmanTable {
        &TABLE_F
    }
    pub(crate) fn g() -> &'static HuffmanTable {
        &TABLE_G
    }
    pub(crate) fn h() -> &'static HuffmanTable {
        &TABLE_H
    }
    pub(crate) fn i() -> &'static HuffmanTable {
        &TABLE_I
    }
    pub(crate) fn j() -> &'static HuffmanTable {
        &TABLE_J
    }
    pub(crate) fn k() -> &'static HuffmanTable {
        &TABLE_K
    }
    pub(crate) fn l() -> &'static HuffmanTable {
        &TABLE_L
    }
    pub(crate) fn m() -> &'static HuffmanTable {
        &TABLE_M
    }
    pub(crate) fn n() -> &'static HuffmanTable {
        &TABLE_N
    }
    pub(crate) fn o() -> &'static HuffmanTable {
        &TABLE_O
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(table: &HuffmanTable, data: &[u8]) -> Option<i32> {
        let mut reader = Reader::new(data);
        table.decode(&mut reader).unwrap()
    }

    #[test]
    fn table_a_ranges() {
        // 0..=15: prefix "0" + 4 range bits.
        assert_eq!(decode_one(StandardTables::a(), &[0b0_0000_000]), Some(0));
        assert_eq!(decode_one(StandardTables::a(), &[0b0_1111_000]), Some(15));
        // 16..=271: prefix "10" + 8 range bits.
        assert_eq!(
            decode_one(StandardTables::a(), &[0b10_000000, 0b00_000000]),
            Some(16)
        );
        assert_eq!(
            decode_one(StandardTables::a(), &[0b10_111111, 0b11_000000]),
            Some(271)
        );
        // 272..: prefix "110" + 16 range bits.
        assert_eq!(
            decode_one(StandardTables::a(), &[0b110_00000, 0x00, 0b000_00000]),
            Some(272)
        );
    }

    #[test]
    fn table_b_oob() {
        // OOB is the length-6 code after the upper range line: "111111".
        assert_eq!(decode_one(StandardTables::b(), &[0b111111_00]), None);
        assert_eq!(decode_one(StandardTables::b(), &[0b0_0000000]), Some(0));
        assert_eq!(decode_one(StandardTables::b(), &[0b10_000000]), Some(1));
    }

    #[test]
    fn table_d_small_values() {
        assert_eq!(decode_one(StandardTables::d(), &[0b0_0000000]), Some(1));
        assert_eq!(decode_one(StandardTables::d(), &[0b10_000000]), Some(2));
        assert_eq!(decode_one(StandardTables::d(), &[0b110_00000]), Some(3));
        // 4..=11: "1110" + 3 bits.
        assert_eq!(decode_one(StandardTables::d(), &[0b1110_101_0]), Some(9));
    }

    #[test]
    fn table_n_is_a_five_value_tree() {
        assert_eq!(decode_one(StandardTables::n(), &[0b0_0000000]), Some(0));
        assert_eq!(decode_one(StandardTables::n(), &[0b100_00000]), Some(-2));
        assert_eq!(decode_one(StandardTables::n(), &[0b101_00000]), Some(-1));
        assert_eq!(decode_one(StandardTables::n(), &[0b110_00000]), Some(1));
        assert_eq!(decode_one(StandardTables::n(), &[0b111_00000]), Some(2));
    }

    #[test]
    fn lower_range_subtracts() {
        // Table C assigns "11111110" to the -256..-1 line and "11111111" to
        // the lower range line, which subtracts its 32 offset bits from
        // -257.
        assert_eq!(
            decode_one(StandardTables::c(), &[0b1111_1110, 128]),
            Some(-128)
        );
        assert_eq!(
            decode_one(StandardTables::c(), &[0xFF, 0, 0, 0, 3]),
            Some(-260)
        );
    }

    /// The custom-table example from B.2, equivalent to Table A.
    #[test]
    fn custom_table_example() {
        let data = [
            0x42, // HTOOB = 0, HTPS = 2, HTRS = 5
            0x00, 0x00, 0x00, 0x00, // HTLOW = 0
            0x00, 0x01, 0x01, 0x10, // HTHIGH = 65808
            0x49, 0x23, 0x81, 0x80, // table lines
        ];

        let mut reader = Reader::new(&data);
        let table = HuffmanTable::from_custom(&mut reader).unwrap();

        assert_eq!(decode_one(&table, &[0b0_0111_000]), Some(7));
        assert_eq!(
            decode_one(&table, &[0b10_111111, 0b11_000000]),
            Some(271)
        );
        assert_eq!(
            decode_one(&table, &[0b110_00000, 0x00, 0b000_00000]),
            Some(272)
        );
    }

    #[test]
    fn symbol_id_code_table() {
        use sable_common::bit::BitWriter;

        // Runcode table: runcode 1 has prefix length 1, runcode 2 length 2.
        // Symbol code lengths: [1, 2, 2] for three symbols.
        let mut buf = vec![0_u8; 32];
        let mut writer = BitWriter::new(&mut buf);

        for runcode in 0..35_u32 {
            let preflen = match runcode {
                1 => 1,
                2 => 2,
                _ => 0,
            };
            writer.write(preflen, 4).unwrap();
        }

        // Symbol lengths: runcode 1 ("0"), runcode 2 ("10"), runcode 2.
        writer.write_bits([0]).unwrap();
        writer.write_bits([1, 0]).unwrap();
        writer.write_bits([1, 0]).unwrap();

        let mut reader = Reader::new(&buf);
        let table = HuffmanTable::symbol_id_codes(&mut reader, 3).unwrap();

        // Canonical codes: symbol 0 -> "0", symbol 1 -> "10", symbol 2 ->
        // "11".
        assert_eq!(decode_one(&table, &[0b0_0000000]), Some(0));
        assert_eq!(decode_one(&table, &[0b10_000000]), Some(1));
        assert_eq!(decode_one(&table, &[0b11_000000]), Some(2));
    }
}
