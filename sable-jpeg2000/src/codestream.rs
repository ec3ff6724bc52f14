//! Codestream main-header and tile-part parsing (ISO/IEC 15444-1 Annex A).

use sable_common::byte::Reader;

use crate::error::{
    DecodeError, FormatError, MarkerError, Result, ValidationError, bail, err,
};

pub(crate) mod markers {
    pub(crate) const SOC: u16 = 0xFF4F;
    pub(crate) const SIZ: u16 = 0xFF51;
    pub(crate) const COD: u16 = 0xFF52;
    pub(crate) const COC: u16 = 0xFF53;
    pub(crate) const TLM: u16 = 0xFF55;
    pub(crate) const PLM: u16 = 0xFF57;
    pub(crate) const PLT: u16 = 0xFF58;
    pub(crate) const QCD: u16 = 0xFF5C;
    pub(crate) const QCC: u16 = 0xFF5D;
    pub(crate) const RGN: u16 = 0xFF5E;
    pub(crate) const POC: u16 = 0xFF5F;
    pub(crate) const PPM: u16 = 0xFF60;
    pub(crate) const PPT: u16 = 0xFF61;
    pub(crate) const CRG: u16 = 0xFF63;
    pub(crate) const COM: u16 = 0xFF64;
    pub(crate) const SOT: u16 = 0xFF90;
    pub(crate) const SOD: u16 = 0xFF93;
    pub(crate) const EOC: u16 = 0xFFD9;
}

/// Implementation limits (rejected, not silently clamped).
const MAX_DECOMPOSITION_LEVELS: u8 = 32;
const MAX_CODE_BLOCK_EXP: u8 = 6;

/// One component entry of the SIZ marker (A.5.1).
#[derive(Debug, Clone, Copy)]
pub(crate) struct ComponentSize {
    /// Bit depth, 1..=38.
    pub(crate) precision: u8,
    /// Whether samples are signed.
    pub(crate) signed: bool,
    /// Horizontal sub-sampling on the reference grid.
    pub(crate) dx: u8,
    /// Vertical sub-sampling on the reference grid.
    pub(crate) dy: u8,
}

/// The image and tile geometry from the SIZ marker (A.5.1).
#[derive(Debug, Clone)]
pub(crate) struct SizeData {
    pub(crate) grid_width: u32,
    pub(crate) grid_height: u32,
    pub(crate) grid_x_offset: u32,
    pub(crate) grid_y_offset: u32,
    pub(crate) tile_width: u32,
    pub(crate) tile_height: u32,
    pub(crate) tile_x_offset: u32,
    pub(crate) tile_y_offset: u32,
    pub(crate) components: Vec<ComponentSize>,
}

impl SizeData {
    /// The visible image width.
    pub(crate) fn image_width(&self) -> u32 {
        self.grid_width - self.grid_x_offset
    }

    /// The visible image height.
    pub(crate) fn image_height(&self) -> u32 {
        self.grid_height - self.grid_y_offset
    }

    /// The number of tile columns.
    pub(crate) fn tiles_x(&self) -> u32 {
        (self.grid_width - self.tile_x_offset).div_ceil(self.tile_width)
    }

    /// The number of tile rows.
    pub(crate) fn tiles_y(&self) -> u32 {
        (self.grid_height - self.tile_y_offset).div_ceil(self.tile_height)
    }

    /// The size of the given component over the whole image.
    pub(crate) fn component_size(&self, comp: usize) -> (u32, u32) {
        let c = &self.components[comp];
        let w = self.grid_width.div_ceil(c.dx as u32) - self.grid_x_offset.div_ceil(c.dx as u32);
        let h = self.grid_height.div_ceil(c.dy as u32) - self.grid_y_offset.div_ceil(c.dy as u32);
        (w, h)
    }
}

/// Progression order (Table A.16).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProgressionOrder {
    /// Layer-resolution-component-position.
    Lrcp,
    /// Resolution-layer-component-position.
    Rlcp,
    /// Resolution-position-component-layer.
    Rpcl,
    /// Position-component-resolution-layer.
    Pcrl,
    /// Component-position-resolution-layer.
    Cprl,
}

impl ProgressionOrder {
    fn from_u8(value: u8, offset: usize) -> Result<Self> {
        match value {
            0 => Ok(Self::Lrcp),
            1 => Ok(Self::Rlcp),
            2 => Ok(Self::Rpcl),
            3 => Ok(Self::Pcrl),
            4 => Ok(Self::Cprl),
            _ => err!(ValidationError::InvalidProgressionOrder, offset),
        }
    }
}

/// Wavelet kernel (Table A.20).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaveletKernel {
    /// The irreversible 9/7 filter.
    Irreversible97,
    /// The reversible 5/3 filter.
    Reversible53,
}

impl WaveletKernel {
    fn from_u8(value: u8, offset: usize) -> Result<Self> {
        match value {
            0 => Ok(Self::Irreversible97),
            1 => Ok(Self::Reversible53),
            _ => err!(ValidationError::InvalidTransformation, offset),
        }
    }
}

/// The scan-global part of the COD marker (A.6.1).
#[derive(Debug, Clone)]
pub(crate) struct GlobalCodingStyle {
    pub(crate) progression_order: ProgressionOrder,
    pub(crate) num_layers: u16,
    /// Whether the multiple component transform is applied to components
    /// 0..3.
    pub(crate) mct: bool,
    pub(crate) uses_sop: bool,
    pub(crate) uses_eph: bool,
}

/// Per-component coding parameters (COD/COC, A.6.1/A.6.2).
#[derive(Debug, Clone)]
pub(crate) struct CodingParameters {
    /// The number of decomposition levels R.
    pub(crate) num_decompositions: u8,
    /// Code-block width exponent (already including the +2 bias).
    pub(crate) cb_width_exp: u8,
    /// Code-block height exponent (already including the +2 bias).
    pub(crate) cb_height_exp: u8,
    /// Per-resolution precinct exponents (PPx, PPy), resolution 0 first.
    pub(crate) precinct_exps: Vec<(u8, u8)>,
    pub(crate) kernel: WaveletKernel,
}

impl CodingParameters {
    /// The precinct exponents at the given resolution.
    pub(crate) fn precinct_exp(&self, resolution: u8) -> (u8, u8) {
        self.precinct_exps
            .get(resolution as usize)
            .copied()
            .unwrap_or((15, 15))
    }
}

/// Quantization style (Table A.28).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QuantizationStyle {
    /// No quantization (reversible path).
    None,
    /// Scalar quantization with values derived from the LL band.
    Derived,
    /// Scalar quantization with explicit values per subband.
    Expounded,
}

/// Per-component quantization parameters (QCD/QCC, A.6.4/A.6.5).
#[derive(Debug, Clone)]
pub(crate) struct Quantization {
    pub(crate) style: QuantizationStyle,
    pub(crate) guard_bits: u8,
    /// Exponent/mantissa pairs in subband order (LL first). For the derived
    /// style only one pair is present.
    pub(crate) steps: Vec<(u8, u16)>,
}

impl Quantization {
    /// The (exponent, mantissa) for the subband with the given index in the
    /// standard ordering (0 = LL, then HL/LH/HH from the coarsest
    /// resolution), at decomposition depth `level_from_top` below the
    /// deepest level.
    pub(crate) fn step_for(
        &self,
        subband_index: usize,
        resolution: u8,
        num_decompositions: u8,
    ) -> Option<(u8, u16)> {
        match self.style {
            QuantizationStyle::Derived => {
                let (e0, mu) = *self.steps.first()?;
                // E.1.1: epsilon_b = epsilon_0 - N_L + n_b, where n_b is the
                // number of decomposition levels at the subband's resolution.
                let n_b = if resolution == 0 {
                    num_decompositions
                } else {
                    resolution
                };
                let exp = e0 as i32 - num_decompositions as i32 + n_b as i32;
                Some((exp.clamp(0, 31) as u8, mu))
            }
            _ => self.steps.get(subband_index).copied(),
        }
    }
}

/// The parsed main header.
#[derive(Debug, Clone)]
pub(crate) struct Header {
    pub(crate) size: SizeData,
    pub(crate) global: GlobalCodingStyle,
    /// Per-component coding parameters (COC overrides applied).
    pub(crate) coding: Vec<CodingParameters>,
    /// Per-component quantization parameters (QCC overrides applied).
    pub(crate) quantization: Vec<Quantization>,
}

/// One tile's concatenated tile-part payloads.
#[derive(Debug, Default, Clone)]
pub(crate) struct TileData {
    pub(crate) data: Vec<u8>,
}

/// Parse a raw codestream: main header plus all tile-parts.
pub(crate) fn parse(data: &[u8]) -> Result<(Header, Vec<TileData>)> {
    let mut reader = Reader::new(data);

    if read_marker(&mut reader)? != markers::SOC {
        bail!(MarkerError::Expected("SOC"), 0);
    }

    let header = parse_main_header(&mut reader)?;

    let num_tiles = (header.size.tiles_x() as usize)
        .checked_mul(header.size.tiles_y() as usize)
        .filter(|&n| n > 0 && n <= 65535)
        .ok_or(DecodeError::new(ValidationError::InvalidTile, reader.offset()))?;

    let mut tiles = vec![TileData::default(); num_tiles];

    loop {
        if reader.at_end() {
            // A missing EOC is tolerated.
            log::warn!("codestream ended without an EOC marker");
            break;
        }

        let offset = reader.offset();
        let marker = read_marker(&mut reader)?;

        match marker {
            markers::EOC => break,
            markers::SOT => parse_tile_part(&mut reader, &mut tiles, offset)?,
            _ => bail!(MarkerError::Invalid, offset),
        }
    }

    Ok((header, tiles))
}

fn read_marker(reader: &mut Reader<'_>) -> Result<u16> {
    let offset = reader.offset();
    reader
        .read_u16()
        .ok_or(DecodeError::new(FormatError::Truncated, offset))
}

/// Read a marker segment's body (excluding the two length bytes).
fn read_segment<'a>(reader: &mut Reader<'a>, name: &'static str) -> Result<Reader<'a>> {
    let offset = reader.offset();
    let len = reader
        .read_u16()
        .ok_or(DecodeError::new(FormatError::Truncated, offset))? as usize;

    if len < 2 {
        bail!(MarkerError::ParseFailure(name), offset);
    }

    let body = reader
        .read_bytes(len - 2)
        .ok_or(DecodeError::new(FormatError::Truncated, offset))?;

    Ok(Reader::new(body))
}

fn parse_main_header(reader: &mut Reader<'_>) -> Result<Header> {
    let offset = reader.offset();

    if read_marker(reader)? != markers::SIZ {
        bail!(MarkerError::Expected("SIZ"), offset);
    }

    let size = parse_siz(&mut read_segment(reader, "SIZ")?, offset)?;
    let num_components = size.components.len();

    let mut global = None;
    let mut cod: Option<CodingParameters> = None;
    let mut qcd: Option<Quantization> = None;
    let mut coc: Vec<Option<CodingParameters>> = vec![None; num_components];
    let mut qcc: Vec<Option<Quantization>> = vec![None; num_components];

    loop {
        let offset = reader.offset();

        // The main header ends at the first tile-part; leave the SOT marker
        // for the tile-part loop.
        if peek_marker(reader) == Some(markers::SOT) {
            let global = global.ok_or(DecodeError::new(MarkerError::Missing("COD"), offset))?;
            let cod = cod.ok_or(DecodeError::new(MarkerError::Missing("COD"), offset))?;
            let qcd = qcd.ok_or(DecodeError::new(MarkerError::Missing("QCD"), offset))?;

            let coding = coc
                .into_iter()
                .map(|c| c.unwrap_or_else(|| cod.clone()))
                .collect();
            let quantization = qcc
                .into_iter()
                .map(|q| q.unwrap_or_else(|| qcd.clone()))
                .collect();

            return Ok(Header {
                size,
                global,
                coding,
                quantization,
            });
        }

        let marker = read_marker(reader)?;

        match marker {
            markers::COD => {
                let mut body = read_segment(reader, "COD")?;
                let (g, params) = parse_cod(&mut body, offset)?;
                global = Some(g);
                cod = Some(params);
            }
            markers::COC => {
                let mut body = read_segment(reader, "COC")?;
                let (idx, params) = parse_coc(&mut body, num_components, offset)?;
                coc[idx] = Some(params);
            }
            markers::QCD => {
                let mut body = read_segment(reader, "QCD")?;
                qcd = Some(parse_qcd(&mut body, offset)?);
            }
            markers::QCC => {
                let mut body = read_segment(reader, "QCC")?;
                let (idx, quant) = parse_qcc(&mut body, num_components, offset)?;
                qcc[idx] = Some(quant);
            }
            markers::PPM => {
                bail!(MarkerError::Unsupported("packed packet headers (PPM)"), offset);
            }
            markers::POC => {
                bail!(MarkerError::Unsupported("progression order changes (POC)"), offset);
            }
            markers::RGN => {
                bail!(MarkerError::Unsupported("region of interest (RGN)"), offset);
            }
            markers::TLM | markers::PLM | markers::CRG | markers::COM => {
                read_segment(reader, "COM")?;
            }
            _ => bail!(MarkerError::Invalid, offset),
        }
    }
}

fn peek_marker(reader: &Reader<'_>) -> Option<u16> {
    let bytes = reader.peek_bytes(2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Parse the SIZ marker body (A.5.1).
fn parse_siz(reader: &mut Reader<'_>, offset: usize) -> Result<SizeData> {
    let eof = DecodeError::new(MarkerError::ParseFailure("SIZ"), offset);

    let _capabilities = reader.read_u16().ok_or(eof)?;
    let grid_width = reader.read_u32().ok_or(eof)?;
    let grid_height = reader.read_u32().ok_or(eof)?;
    let grid_x_offset = reader.read_u32().ok_or(eof)?;
    let grid_y_offset = reader.read_u32().ok_or(eof)?;
    let tile_width = reader.read_u32().ok_or(eof)?;
    let tile_height = reader.read_u32().ok_or(eof)?;
    let tile_x_offset = reader.read_u32().ok_or(eof)?;
    let tile_y_offset = reader.read_u32().ok_or(eof)?;
    let num_components = reader.read_u16().ok_or(eof)? as usize;

    if grid_width <= grid_x_offset
        || grid_height <= grid_y_offset
        || tile_width == 0
        || tile_height == 0
        || tile_x_offset > grid_x_offset
        || tile_y_offset > grid_y_offset
    {
        bail!(ValidationError::InvalidDimensions, offset);
    }

    if num_components == 0 || num_components > 16384 {
        bail!(ValidationError::LimitExceeded("component count"), offset);
    }

    let mut components = Vec::with_capacity(num_components);

    for _ in 0..num_components {
        let ssiz = reader.read_byte().ok_or(eof)?;
        let dx = reader.read_byte().ok_or(eof)?;
        let dy = reader.read_byte().ok_or(eof)?;

        let precision = (ssiz & 0x7F) + 1;
        let signed = ssiz & 0x80 != 0;

        if precision > 38 || dx == 0 || dy == 0 {
            bail!(ValidationError::InvalidDimensions, offset);
        }

        components.push(ComponentSize {
            precision,
            signed,
            dx,
            dy,
        });
    }

    Ok(SizeData {
        grid_width,
        grid_height,
        grid_x_offset,
        grid_y_offset,
        tile_width,
        tile_height,
        tile_x_offset,
        tile_y_offset,
        components,
    })
}

/// Parse the COD marker body (A.6.1).
fn parse_cod(
    reader: &mut Reader<'_>,
    offset: usize,
) -> Result<(GlobalCodingStyle, CodingParameters)> {
    let eof = DecodeError::new(MarkerError::ParseFailure("COD"), offset);

    let scod = reader.read_byte().ok_or(eof)?;
    let has_precincts = scod & 0x01 != 0;
    let uses_sop = scod & 0x02 != 0;
    let uses_eph = scod & 0x04 != 0;

    let progression_order = ProgressionOrder::from_u8(reader.read_byte().ok_or(eof)?, offset)?;
    let num_layers = reader.read_u16().ok_or(eof)?;

    if num_layers == 0 {
        bail!(ValidationError::LimitExceeded("layer count"), offset);
    }

    let mct = match reader.read_byte().ok_or(eof)? {
        0 => false,
        1 => true,
        _ => bail!(ValidationError::InvalidTransformation, offset),
    };

    let params = parse_coding_parameters(reader, has_precincts, offset)?;

    Ok((
        GlobalCodingStyle {
            progression_order,
            num_layers,
            mct,
            uses_sop,
            uses_eph,
        },
        params,
    ))
}

/// Parse the COC marker body (A.6.2).
fn parse_coc(
    reader: &mut Reader<'_>,
    num_components: usize,
    offset: usize,
) -> Result<(usize, CodingParameters)> {
    let eof = DecodeError::new(MarkerError::ParseFailure("COC"), offset);

    let idx = if num_components <= 256 {
        reader.read_byte().ok_or(eof)? as usize
    } else {
        reader.read_u16().ok_or(eof)? as usize
    };

    if idx >= num_components {
        bail!(MarkerError::ParseFailure("COC"), offset);
    }

    let scoc = reader.read_byte().ok_or(eof)?;
    let params = parse_coding_parameters(reader, scoc & 0x01 != 0, offset)?;

    Ok((idx, params))
}

/// The SPcod/SPcoc parameter block shared by COD and COC.
fn parse_coding_parameters(
    reader: &mut Reader<'_>,
    has_precincts: bool,
    offset: usize,
) -> Result<CodingParameters> {
    let eof = DecodeError::new(MarkerError::ParseFailure("COD"), offset);

    let num_decompositions = reader.read_byte().ok_or(eof)?;

    if num_decompositions > MAX_DECOMPOSITION_LEVELS {
        bail!(ValidationError::LimitExceeded("decomposition levels"), offset);
    }

    let cb_width_exp = (reader.read_byte().ok_or(eof)? & 0x0F) + 2;
    let cb_height_exp = (reader.read_byte().ok_or(eof)? & 0x0F) + 2;

    if cb_width_exp > MAX_CODE_BLOCK_EXP || cb_height_exp > MAX_CODE_BLOCK_EXP {
        bail!(ValidationError::LimitExceeded("code-block size"), offset);
    }

    let cb_style = reader.read_byte().ok_or(eof)?;

    if cb_style != 0 {
        // Bypass, reset, termination, causal and segmentation-symbol modes
        // change the entropy decoding and are not implemented.
        bail!(MarkerError::Unsupported("code-block style flags"), offset);
    }

    let kernel = WaveletKernel::from_u8(reader.read_byte().ok_or(eof)?, offset)?;

    let precinct_exps = if has_precincts {
        let mut exps = Vec::with_capacity(num_decompositions as usize + 1);

        for _ in 0..=num_decompositions {
            let byte = reader.read_byte().ok_or(eof)?;
            exps.push((byte & 0x0F, byte >> 4));
        }

        exps
    } else {
        // Default: maximal precincts.
        vec![(15, 15); num_decompositions as usize + 1]
    };

    // Precinct exponents of zero are only allowed at resolution zero.
    for (r, &(px, py)) in precinct_exps.iter().enumerate() {
        if r > 0 && (px == 0 || py == 0) {
            bail!(ValidationError::InvalidDimensions, offset);
        }
    }

    Ok(CodingParameters {
        num_decompositions,
        cb_width_exp,
        cb_height_exp,
        precinct_exps,
        kernel,
    })
}

/// Parse the QCD marker body (A.6.4).
fn parse_qcd(reader: &mut Reader<'_>, offset: usize) -> Result<Quantization> {
    parse_quantization(reader, offset)
}

/// Parse the QCC marker body (A.6.5).
fn parse_qcc(
    reader: &mut Reader<'_>,
    num_components: usize,
    offset: usize,
) -> Result<(usize, Quantization)> {
    let eof = DecodeError::new(MarkerError::ParseFailure("QCC"), offset);

    let idx = if num_components <= 256 {
        reader.read_byte().ok_or(eof)? as usize
    } else {
        reader.read_u16().ok_or(eof)? as usize
    };

    if idx >= num_components {
        bail!(MarkerError::ParseFailure("QCC"), offset);
    }

    Ok((idx, parse_quantization(reader, offset)?))
}

fn parse_quantization(reader: &mut Reader<'_>, offset: usize) -> Result<Quantization> {
    let eof = DecodeError::new(MarkerError::ParseFailure("QCD"), offset);

    let sqcd = reader.read_byte().ok_or(eof)?;
    let guard_bits = sqcd >> 5;

    let style = match sqcd & 0x1F {
        0 => QuantizationStyle::None,
        1 => QuantizationStyle::Derived,
        2 => QuantizationStyle::Expounded,
        _ => bail!(ValidationError::InvalidQuantization, offset),
    };

    let mut steps = Vec::new();

    match style {
        QuantizationStyle::None => {
            while let Some(byte) = reader.read_byte() {
                steps.push((byte >> 3, 0));
            }
        }
        _ => {
            while let Some(word) = reader.read_u16() {
                steps.push(((word >> 11) as u8, word & 0x07FF));
            }
        }
    }

    if steps.is_empty() {
        bail!(ValidationError::InvalidQuantization, offset);
    }

    Ok(Quantization {
        style,
        guard_bits,
        steps,
    })
}

/// Parse one tile-part: the SOT segment, any skippable tile-header markers,
/// SOD, and the entropy data up to `Psot` bytes after the SOT.
fn parse_tile_part(
    reader: &mut Reader<'_>,
    tiles: &mut [TileData],
    sot_offset: usize,
) -> Result<()> {
    let eof = DecodeError::new(MarkerError::ParseFailure("SOT"), sot_offset);

    let len = reader.read_u16().ok_or(eof)?;

    if len != 10 {
        bail!(MarkerError::ParseFailure("SOT"), sot_offset);
    }

    let tile_idx = reader.read_u16().ok_or(eof)? as usize;
    let psot = reader.read_u32().ok_or(eof)? as usize;
    let _tp_idx = reader.read_byte().ok_or(eof)?;
    let _tp_count = reader.read_byte().ok_or(eof)?;

    if tile_idx >= tiles.len() {
        bail!(ValidationError::InvalidTile, sot_offset);
    }

    // Psot counts from the first byte of the SOT marker; zero means "to the
    // end of the codestream" and is only valid in the last tile-part.
    let data_end = if psot == 0 {
        // Leave room for a trailing EOC if one is present.
        let tail = reader.tail().unwrap_or(&[]);
        let end = reader.offset() + tail.len();
        if tail.ends_with(&[0xFF, 0xD9]) {
            end - 2
        } else {
            end
        }
    } else {
        let end = sot_offset + psot;
        if end < reader.offset() {
            bail!(MarkerError::ParseFailure("SOT"), sot_offset);
        }
        end
    };

    // Tile-part header markers up to SOD.
    loop {
        let offset = reader.offset();
        let marker = read_marker(reader)?;

        match marker {
            markers::SOD => break,
            markers::PLT | markers::COM => {
                read_segment(reader, "PLT")?;
            }
            markers::PPT => {
                bail!(MarkerError::Unsupported("packed packet headers (PPT)"), offset);
            }
            markers::COD | markers::COC | markers::QCD | markers::QCC | markers::POC => {
                bail!(
                    MarkerError::Unsupported("tile-part coding parameter overrides"),
                    offset
                );
            }
            _ => bail!(MarkerError::Invalid, offset),
        }
    }

    let body_len = data_end
        .checked_sub(reader.offset())
        .ok_or(DecodeError::new(MarkerError::ParseFailure("SOT"), sot_offset))?;
    let body = reader
        .read_bytes(body_len)
        .ok_or(DecodeError::new(FormatError::Truncated, reader.offset()))?;

    tiles[tile_idx].data.extend_from_slice(body);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_codestream() -> Vec<u8> {
        let mut out = vec![0xFF, 0x4F]; // SOC

        // SIZ: 8x8, one 8-bit component, one tile.
        out.extend([0xFF, 0x51]);
        out.extend(41_u16.to_be_bytes());
        out.extend(0_u16.to_be_bytes()); // Rsiz
        out.extend(8_u32.to_be_bytes()); // Xsiz
        out.extend(8_u32.to_be_bytes()); // Ysiz
        out.extend(0_u32.to_be_bytes()); // XOsiz
        out.extend(0_u32.to_be_bytes()); // YOsiz
        out.extend(8_u32.to_be_bytes()); // XTsiz
        out.extend(8_u32.to_be_bytes()); // YTsiz
        out.extend(0_u32.to_be_bytes()); // XTOsiz
        out.extend(0_u32.to_be_bytes()); // YTOsiz
        out.extend(1_u16.to_be_bytes()); // Csiz
        out.extend([7, 1, 1]); // Ssiz, XRsiz, YRsiz

        // COD: LRCP, 1 layer, no MCT, 1 decomposition, 64x64 blocks, 5/3.
        out.extend([0xFF, 0x52]);
        out.extend(12_u16.to_be_bytes());
        out.extend([0x00, 0, 0, 1, 0, 1, 4, 4, 0, 1]);

        // QCD: reversible, 2 guard bits, exponents for 4 subbands.
        out.extend([0xFF, 0x5C]);
        out.extend(7_u16.to_be_bytes());
        out.extend([0x40, 9 << 3, 10 << 3, 10 << 3, 11 << 3]);

        // SOT + SOD with an empty tile body.
        out.extend([0xFF, 0x90]);
        out.extend(10_u16.to_be_bytes());
        out.extend(0_u16.to_be_bytes()); // Isot
        out.extend(14_u32.to_be_bytes()); // Psot: SOT(12) + SOD(2)
        out.extend([0, 1]); // TPsot, TNsot
        out.extend([0xFF, 0x93]); // SOD

        out.extend([0xFF, 0xD9]); // EOC
        out
    }

    #[test]
    fn parses_minimal_codestream() {
        let data = minimal_codestream();
        let (header, tiles) = parse(&data).unwrap();

        assert_eq!(header.size.image_width(), 8);
        assert_eq!(header.size.image_height(), 8);
        assert_eq!(header.size.tiles_x(), 1);
        assert_eq!(header.global.num_layers, 1);
        assert_eq!(header.coding[0].num_decompositions, 1);
        assert_eq!(header.coding[0].kernel, WaveletKernel::Reversible53);
        assert_eq!(header.quantization[0].style, QuantizationStyle::None);
        assert_eq!(header.quantization[0].steps.len(), 4);
        assert_eq!(tiles.len(), 1);
        assert!(tiles[0].data.is_empty());
    }

    #[test]
    fn rejects_missing_soc() {
        assert!(parse(&[0x00, 0x00]).is_err());
    }

    #[test]
    fn rejects_oversized_code_blocks() {
        let mut data = minimal_codestream();
        // Patch the COD code-block exponents to 128x128.
        let cod_pos = data.windows(2).position(|w| w == [0xFF, 0x52]).unwrap();
        data[cod_pos + 10] = 5; // xcb exponent 7
        assert!(parse(&data).is_err());
    }
}
