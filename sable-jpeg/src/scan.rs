//! Baseline interleaved entropy decoding (ITU T.81 F.2).

use crate::bitstream::{BitReader, extend};
use crate::error::{DecodeError, Result, ScanError, TableError, bail};
use crate::huffman::HuffmanTable;
use crate::marker::{Frame, ScanComponent, Tables, markers};

/// The zig-zag sequence: `ZIGZAG[k]` is the natural (row-major) position of
/// the k-th coefficient in scan order (T.81 Figure 5).
pub(crate) const ZIGZAG: [u8; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// Decode the scan following an SOS header into `out`.
///
/// `base_offset` is the position of the entropy data within the whole input
/// (for error reporting). Returns the number of bytes consumed, leaving the
/// caller positioned at the terminating marker.
pub(crate) fn decode_scan(
    data: &[u8],
    frame: &Frame,
    tables: &Tables,
    scan_components: &[ScanComponent],
    out: &mut [Vec<[i16; 64]>],
    base_offset: usize,
) -> Result<usize> {
    let mut reader = BitReader::new(data);
    let mut decoder = ScanDecoder::new(frame, tables, scan_components, base_offset)?;

    let mcus_x = frame.mcus_x();
    let mcus_y = frame.mcus_y();
    let restart_interval = tables.restart_interval as usize;

    let mut expected_rst = 0_u8;
    let mut mcus_since_restart = 0_usize;

    for mcu_y in 0..mcus_y {
        for mcu_x in 0..mcus_x {
            if restart_interval > 0 && mcus_since_restart == restart_interval {
                decoder.restart(&mut reader, &mut expected_rst, base_offset)?;
                mcus_since_restart = 0;
            }

            decoder.decode_mcu(&mut reader, mcu_x, mcu_y, out)?;
            mcus_since_restart += 1;
        }
    }

    // Skip any padding bits so the caller resumes at the next marker.
    reader.align();

    Ok(reader.byte_pos())
}

struct ScanDecoder<'a> {
    frame: &'a Frame,
    scan_components: &'a [ScanComponent],
    dc_tables: Vec<&'a HuffmanTable>,
    ac_tables: Vec<&'a HuffmanTable>,
    /// One DC predictor per scan component, reset at scan start and at every
    /// restart marker.
    dc_predictors: Vec<i32>,
    base_offset: usize,
}

impl<'a> ScanDecoder<'a> {
    fn new(
        frame: &'a Frame,
        tables: &'a Tables,
        scan_components: &'a [ScanComponent],
        base_offset: usize,
    ) -> Result<Self> {
        let mut dc_tables = Vec::with_capacity(scan_components.len());
        let mut ac_tables = Vec::with_capacity(scan_components.len());

        for sc in scan_components {
            dc_tables.push(
                tables.dc_huffman[sc.dc_table as usize]
                    .as_ref()
                    .ok_or(DecodeError::new(TableError::MissingHuffmanTable, base_offset))?,
            );
            ac_tables.push(
                tables.ac_huffman[sc.ac_table as usize]
                    .as_ref()
                    .ok_or(DecodeError::new(TableError::MissingHuffmanTable, base_offset))?,
            );
        }

        Ok(Self {
            frame,
            scan_components,
            dc_tables,
            ac_tables,
            dc_predictors: vec![0; scan_components.len()],
            base_offset,
        })
    }

    /// Consume one restart marker, resynchronizing if the stream is out of
    /// step (F.2.1.3.1).
    fn restart(
        &mut self,
        reader: &mut BitReader<'_>,
        expected_rst: &mut u8,
        base_offset: usize,
    ) -> Result<()> {
        reader.align();

        let expected = markers::RST0 + *expected_rst;

        match reader.marker() {
            Some(m) if m == expected => {
                reader.consume_marker();
            }
            _ => {
                // Out of sync. Seek forward to the expected restart marker
                // and pick up decoding from there.
                log::warn!("lost sync at restart interval, seeking to RST{expected_rst}");

                loop {
                    match reader.seek_to_marker() {
                        Some(m) if m == expected => {
                            reader.consume_marker();
                            break;
                        }
                        Some(m) if (markers::RST0..=markers::RST7).contains(&m) => {
                            reader.consume_marker();
                        }
                        _ => {
                            bail!(
                                ScanError::ResyncFailed,
                                base_offset + reader.byte_pos()
                            );
                        }
                    }
                }
            }
        }

        *expected_rst = (*expected_rst + 1) % 8;

        for predictor in &mut self.dc_predictors {
            *predictor = 0;
        }

        Ok(())
    }

    /// Decode one MCU: every scan component contributes `h * v` blocks in
    /// row-major sub-block order (A.2.3).
    fn decode_mcu(
        &mut self,
        reader: &mut BitReader<'_>,
        mcu_x: usize,
        mcu_y: usize,
        out: &mut [Vec<[i16; 64]>],
    ) -> Result<()> {
        for (scan_idx, sc) in self.scan_components.iter().enumerate() {
            let comp = &self.frame.components[sc.component_idx];
            let blocks_per_row = self.frame.blocks_per_row(sc.component_idx);

            for sub_y in 0..comp.v as usize {
                for sub_x in 0..comp.h as usize {
                    let gx = mcu_x * comp.h as usize + sub_x;
                    let gy = mcu_y * comp.v as usize + sub_y;

                    let block = self.decode_block(reader, scan_idx)?;
                    out[sc.component_idx][gy * blocks_per_row + gx] = block;
                }
            }
        }

        Ok(())
    }

    /// Decode one 8x8 block and place its coefficients in natural order
    /// (F.2.2).
    fn decode_block(&mut self, reader: &mut BitReader<'_>, scan_idx: usize) -> Result<[i16; 64]> {
        let mut zigzagged = [0_i32; 64];

        // DC coefficient: a size category followed by that many extra bits,
        // added to the component's predictor (F.2.2.1).
        let size = self.decode_symbol(reader, self.dc_tables[scan_idx])?;

        if size > 11 {
            bail!(
                ScanError::BadCoefficientRun,
                self.base_offset + reader.byte_pos()
            );
        }

        let diff = if size == 0 {
            0
        } else {
            let raw = reader.read_bits(size).ok_or(DecodeError::new(
                ScanError::TruncatedScan,
                self.base_offset + reader.byte_pos(),
            ))?;
            extend(raw, size)
        };

        self.dc_predictors[scan_idx] += diff;
        zigzagged[0] = self.dc_predictors[scan_idx];

        // AC coefficients: run-length/size pairs (F.2.2.2).
        let mut k = 1;

        while k < 64 {
            let rs = self.decode_symbol(reader, self.ac_tables[scan_idx])?;
            let run = (rs >> 4) as usize;
            let size = rs & 0x0F;

            if size == 0 {
                if rs == 0x00 {
                    // EOB: the remaining coefficients are zero.
                    break;
                }

                if rs == 0xF0 {
                    // ZRL: sixteen zero coefficients.
                    k += 16;
                    continue;
                }

                bail!(
                    ScanError::BadCoefficientRun,
                    self.base_offset + reader.byte_pos()
                );
            }

            k += run;

            if k >= 64 {
                bail!(
                    ScanError::BadCoefficientRun,
                    self.base_offset + reader.byte_pos()
                );
            }

            let raw = reader.read_bits(size).ok_or(DecodeError::new(
                ScanError::TruncatedScan,
                self.base_offset + reader.byte_pos(),
            ))?;
            zigzagged[k] = extend(raw, size);
            k += 1;
        }

        // Inverse zig-zag permute into natural order.
        let mut block = [0_i16; 64];

        for (k, &value) in zigzagged.iter().enumerate() {
            block[ZIGZAG[k] as usize] = value as i16;
        }

        Ok(block)
    }

    #[inline]
    fn decode_symbol(&self, reader: &mut BitReader<'_>, table: &HuffmanTable) -> Result<u8> {
        let bits = reader.peek_16();

        let Some((symbol, length)) = table.lookup(bits) else {
            bail!(
                ScanError::HuffmanCodeNotFound,
                self.base_offset + reader.byte_pos()
            );
        };

        reader.consume(length).ok_or(DecodeError::new(
            ScanError::TruncatedScan,
            self.base_offset + reader.byte_pos(),
        ))?;

        Ok(symbol)
    }
}
