//! Marker-segment parsing (ITU T.81 Annex B).

use crate::error::{FormatError, MarkerError, Result, TableError, bail, err};
use crate::huffman::HuffmanTable;
use crate::scan::ZIGZAG;

pub(crate) mod markers {
    pub(crate) const SOI: u8 = 0xD8;
    pub(crate) const EOI: u8 = 0xD9;
    pub(crate) const SOF0: u8 = 0xC0;
    pub(crate) const SOF1: u8 = 0xC1;
    pub(crate) const SOF2: u8 = 0xC2;
    pub(crate) const DHT: u8 = 0xC4;
    pub(crate) const DQT: u8 = 0xDB;
    pub(crate) const DRI: u8 = 0xDD;
    pub(crate) const SOS: u8 = 0xDA;
    pub(crate) const COM: u8 = 0xFE;
    pub(crate) const RST0: u8 = 0xD0;
    pub(crate) const RST7: u8 = 0xD7;
    pub(crate) const TEM: u8 = 0x01;
    pub(crate) const APP0: u8 = 0xE0;
    pub(crate) const APP15: u8 = 0xEF;
}

/// One frame component from the SOF segment (B.2.2).
#[derive(Debug, Clone, Copy)]
pub(crate) struct Component {
    /// The component identifier.
    pub(crate) id: u8,
    /// Horizontal sampling factor, 1..=4.
    pub(crate) h: u8,
    /// Vertical sampling factor, 1..=4.
    pub(crate) v: u8,
    /// Quantization table slot, 0..=3.
    pub(crate) quant_idx: u8,
}

/// The frame parameters from the SOF segment (B.2.2).
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub(crate) width: u16,
    pub(crate) height: u16,
    pub(crate) components: Vec<Component>,
    /// The maximum horizontal sampling factor over all components.
    pub(crate) h_max: u8,
    /// The maximum vertical sampling factor over all components.
    pub(crate) v_max: u8,
}

impl Frame {
    /// The number of MCU columns in the frame.
    pub(crate) fn mcus_x(&self) -> usize {
        (self.width as usize).div_ceil(self.h_max as usize * 8)
    }

    /// The number of MCU rows in the frame.
    pub(crate) fn mcus_y(&self) -> usize {
        (self.height as usize).div_ceil(self.v_max as usize * 8)
    }

    /// The number of 8x8 blocks per row of the given component.
    pub(crate) fn blocks_per_row(&self, comp: usize) -> usize {
        self.mcus_x() * self.components[comp].h as usize
    }

    /// The number of 8x8 block rows of the given component.
    pub(crate) fn block_rows(&self, comp: usize) -> usize {
        self.mcus_y() * self.components[comp].v as usize
    }
}

/// One component entry from the SOS segment (B.2.3).
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScanComponent {
    /// Index into `Frame::components`.
    pub(crate) component_idx: usize,
    /// DC Huffman table slot.
    pub(crate) dc_table: u8,
    /// AC Huffman table slot.
    pub(crate) ac_table: u8,
}

/// The tables and state accumulated while walking marker segments.
#[derive(Debug)]
pub(crate) struct Tables {
    /// Quantization tables in natural (row-major) order.
    pub(crate) quant: [Option<[u16; 64]>; 4],
    pub(crate) dc_huffman: [Option<HuffmanTable>; 4],
    pub(crate) ac_huffman: [Option<HuffmanTable>; 4],
    /// Restart interval in MCUs; zero disables restart markers.
    pub(crate) restart_interval: u16,
}

impl Tables {
    fn new() -> Self {
        Self {
            quant: [None; 4],
            dc_huffman: [None, None, None, None],
            ac_huffman: [None, None, None, None],
            restart_interval: 0,
        }
    }
}

/// The result of parsing the marker stream: the frame, its tables, and the
/// decoded coefficient blocks of the single baseline scan.
#[derive(Debug)]
pub(crate) struct ParsedImage {
    pub(crate) frame: Frame,
    pub(crate) tables: Tables,
    /// Per component: quantized DCT coefficients in natural order, one
    /// `[i16; 64]` block per grid position, indexed `gy * blocks_per_row + gx`.
    pub(crate) blocks: Vec<Vec<[i16; 64]>>,
}

/// Walk the marker stream from SOI to EOI, decoding the scan when SOS is
/// reached.
pub(crate) fn parse(data: &[u8]) -> Result<ParsedImage> {
    let mut pos = 0;

    if data.len() < 2 || data[0] != 0xFF || data[1] != markers::SOI {
        bail!(FormatError::BadMagic, 0);
    }
    pos += 2;

    let mut frame: Option<Frame> = None;
    let mut tables = Tables::new();
    let mut blocks: Option<Vec<Vec<[i16; 64]>>> = None;

    loop {
        // Markers may be preceded by fill bytes (B.1.1.2).
        while data.get(pos) == Some(&0xFF) && data.get(pos + 1) == Some(&0xFF) {
            pos += 1;
        }

        let &[0xFF, marker] = data.get(pos..pos + 2).ok_or_else(|| {
            crate::error::DecodeError::new(FormatError::Truncated, data.len())
        })? else {
            bail!(MarkerError::Unexpected(data[pos]), pos);
        };
        pos += 2;

        match marker {
            markers::EOI => break,
            markers::SOF0 | markers::SOF1 => {
                let segment = read_segment(data, &mut pos)?;
                frame = Some(parse_sof(segment, pos - segment.len())?);
            }
            // Progressive and the remaining SOFn variants are declared but
            // not decoded.
            markers::SOF2 | 0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                bail!(MarkerError::UnsupportedSof(marker), pos - 1);
            }
            markers::DHT => {
                let segment = read_segment(data, &mut pos)?;
                parse_dht(segment, &mut tables, pos - segment.len())?;
            }
            markers::DQT => {
                let segment = read_segment(data, &mut pos)?;
                parse_dqt(segment, &mut tables, pos - segment.len())?;
            }
            markers::DRI => {
                let segment = read_segment(data, &mut pos)?;

                if segment.len() != 2 {
                    bail!(MarkerError::BadLength, pos);
                }

                tables.restart_interval = u16::from_be_bytes([segment[0], segment[1]]);
            }
            markers::SOS => {
                let frame = frame
                    .as_ref()
                    .ok_or_else(|| crate::error::DecodeError::new(MarkerError::MissingSof, pos))?;

                let segment = read_segment(data, &mut pos)?;
                let scan_components = parse_sos(segment, frame, pos - segment.len())?;

                let out = blocks.get_or_insert_with(|| {
                    frame
                        .components
                        .iter()
                        .enumerate()
                        .map(|(i, _)| {
                            vec![[0_i16; 64]; frame.blocks_per_row(i) * frame.block_rows(i)]
                        })
                        .collect()
                });

                let consumed = crate::scan::decode_scan(
                    &data[pos..],
                    frame,
                    &tables,
                    &scan_components,
                    out,
                    pos,
                )?;
                pos += consumed;
            }
            markers::TEM => {}
            m if (markers::RST0..=markers::RST7).contains(&m) => {
                // Stray restart markers between segments are tolerated.
                log::warn!("restart marker outside entropy-coded data");
            }
            m if (markers::APP0..=markers::APP15).contains(&m) || m == markers::COM => {
                read_segment(data, &mut pos)?;
            }
            // Other length-prefixed segments (DAC, DNL, DHP, EXP, JPGn) are
            // tolerated and skipped.
            0xC8 | 0xCC | 0xDC | 0xDE | 0xDF | 0xF0..=0xFD => {
                read_segment(data, &mut pos)?;
            }
            m => bail!(MarkerError::Unexpected(m), pos - 1),
        }
    }

    let frame = frame.ok_or_else(|| {
        crate::error::DecodeError::new(MarkerError::MissingSof, pos)
    })?;
    let blocks = blocks.ok_or_else(|| {
        crate::error::DecodeError::new(MarkerError::BadScanHeader, pos)
    })?;

    Ok(ParsedImage {
        frame,
        tables,
        blocks,
    })
}

/// Read one length-prefixed marker segment and advance the cursor past it.
///
/// The returned slice excludes the two length bytes.
fn read_segment<'a>(data: &'a [u8], pos: &mut usize) -> Result<&'a [u8]> {
    let bytes = data
        .get(*pos..*pos + 2)
        .ok_or_else(|| crate::error::DecodeError::new(FormatError::Truncated, data.len()))?;
    let len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;

    if len < 2 {
        bail!(MarkerError::BadLength, *pos);
    }

    let segment = data
        .get(*pos + 2..*pos + len)
        .ok_or_else(|| crate::error::DecodeError::new(FormatError::Truncated, data.len()))?;
    *pos += len;

    Ok(segment)
}

/// Parse the frame header (B.2.2).
fn parse_sof(segment: &[u8], offset: usize) -> Result<Frame> {
    if segment.len() < 6 {
        bail!(MarkerError::BadLength, offset);
    }

    let precision = segment[0];
    let height = u16::from_be_bytes([segment[1], segment[2]]);
    let width = u16::from_be_bytes([segment[3], segment[4]]);
    let num_components = segment[5] as usize;

    if precision != 8 {
        bail!(MarkerError::BadFrameHeader, offset);
    }

    if width == 0 || height == 0 {
        bail!(MarkerError::BadFrameHeader, offset);
    }

    if !(num_components == 1 || num_components == 3) {
        bail!(MarkerError::BadFrameHeader, offset);
    }

    if segment.len() != 6 + num_components * 3 {
        bail!(MarkerError::BadLength, offset);
    }

    let mut components = Vec::with_capacity(num_components);

    for chunk in segment[6..].chunks_exact(3) {
        let id = chunk[0];
        let h = chunk[1] >> 4;
        let v = chunk[1] & 0x0F;
        let quant_idx = chunk[2];

        if !(1..=4).contains(&h) || !(1..=4).contains(&v) || quant_idx > 3 {
            bail!(MarkerError::BadFrameHeader, offset);
        }

        components.push(Component {
            id,
            h,
            v,
            quant_idx,
        });
    }

    let h_max = components.iter().map(|c| c.h).max().unwrap();
    let v_max = components.iter().map(|c| c.v).max().unwrap();

    Ok(Frame {
        width,
        height,
        components,
        h_max,
        v_max,
    })
}

/// Parse one DHT segment, which may hold several tables (B.2.4.2).
fn parse_dht(segment: &[u8], tables: &mut Tables, offset: usize) -> Result<()> {
    let mut rest = segment;

    while !rest.is_empty() {
        if rest.len() < 17 {
            bail!(MarkerError::BadLength, offset);
        }

        let class = rest[0] >> 4;
        let slot = (rest[0] & 0x0F) as usize;

        if class > 1 || slot > 3 {
            bail!(MarkerError::BadLength, offset);
        }

        let counts: [u8; 16] = rest[1..17].try_into().unwrap();
        let total: usize = counts.iter().map(|&c| c as usize).sum();

        let symbols = rest
            .get(17..17 + total)
            .ok_or_else(|| crate::error::DecodeError::new(MarkerError::BadLength, offset))?;

        let table = HuffmanTable::build(&counts, symbols, offset)?;

        if class == 0 {
            tables.dc_huffman[slot] = Some(table);
        } else {
            tables.ac_huffman[slot] = Some(table);
        }

        rest = &rest[17 + total..];
    }

    Ok(())
}

/// Parse one DQT segment, which may hold several tables (B.2.4.1).
///
/// Elements arrive in zig-zag order and are stored in natural order, so the
/// dequantizer can index them by natural coefficient position.
fn parse_dqt(segment: &[u8], tables: &mut Tables, offset: usize) -> Result<()> {
    let mut rest = segment;

    while !rest.is_empty() {
        let precision = rest[0] >> 4;
        let slot = (rest[0] & 0x0F) as usize;

        if slot > 3 {
            bail!(MarkerError::BadLength, offset);
        }

        let mut table = [0_u16; 64];

        match precision {
            0 => {
                let values = rest.get(1..65).ok_or_else(|| {
                    crate::error::DecodeError::new(MarkerError::BadLength, offset)
                })?;

                for (k, &v) in values.iter().enumerate() {
                    table[ZIGZAG[k] as usize] = v as u16;
                }

                rest = &rest[65..];
            }
            1 => {
                let values = rest.get(1..129).ok_or_else(|| {
                    crate::error::DecodeError::new(MarkerError::BadLength, offset)
                })?;

                for (k, chunk) in values.chunks_exact(2).enumerate() {
                    table[ZIGZAG[k] as usize] = u16::from_be_bytes([chunk[0], chunk[1]]);
                }

                rest = &rest[129..];
            }
            _ => bail!(TableError::BadQuantPrecision, offset),
        }

        if table.contains(&0) {
            bail!(TableError::BadQuantPrecision, offset);
        }

        tables.quant[slot] = Some(table);
    }

    Ok(())
}

/// Parse the scan header (B.2.3).
fn parse_sos(segment: &[u8], frame: &Frame, offset: usize) -> Result<Vec<ScanComponent>> {
    if segment.is_empty() {
        bail!(MarkerError::BadLength, offset);
    }

    let num_components = segment[0] as usize;

    if segment.len() != 1 + num_components * 2 + 3 {
        bail!(MarkerError::BadLength, offset);
    }

    if num_components != frame.components.len() {
        bail!(MarkerError::BadScanHeader, offset);
    }

    let mut scan_components = Vec::with_capacity(num_components);

    for chunk in segment[1..1 + num_components * 2].chunks_exact(2) {
        let id = chunk[0];
        let dc_table = chunk[1] >> 4;
        let ac_table = chunk[1] & 0x0F;

        let component_idx = frame
            .components
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| crate::error::DecodeError::new(MarkerError::BadScanHeader, offset))?;

        if dc_table > 3 || ac_table > 3 {
            bail!(MarkerError::BadScanHeader, offset);
        }

        scan_components.push(ScanComponent {
            component_idx,
            dc_table,
            ac_table,
        });
    }

    // Baseline requires full spectral selection and no successive
    // approximation: Ss = 0, Se = 63, Ah = Al = 0.
    let tail = &segment[1 + num_components * 2..];
    if tail != [0, 63, 0] {
        return err!(MarkerError::BadScanHeader, offset);
    }

    Ok(scan_components)
}
