//! Tier-2 packet header and body parsing (ISO/IEC 15444-1 B.9/B.10).

use sable_common::bit::BitReader;

use crate::codestream::Header;
use crate::error::{DecodeError, DecodingError, Result, bail};
use crate::progression::packet_sequence;
use crate::tile::TileComponent;

/// A bit reader for packet headers, which use bit-stuffing: the byte after
/// any 0xFF has a 0 forced into its most significant bit (B.10.1).
pub(crate) struct PacketReader<'a> {
    inner: BitReader<'a>,
}

impl<'a> PacketReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            inner: BitReader::new(data),
        }
    }

    /// Read one header bit, transparently skipping stuffing bits.
    #[inline]
    pub(crate) fn read_bit(&mut self) -> Option<u32> {
        if self.inner.bit_pos() == 0 && self.inner.byte_pos() > 0 {
            let prev = self.inner.data[self.inner.byte_pos() - 1];

            if prev == 0xFF {
                // The stuffing bit must be zero; a one would make the pair a
                // marker, which cannot appear inside a packet header.
                if self.inner.read_bit()? != 0 {
                    return None;
                }
            }
        }

        self.inner.read_bit()
    }

    /// Read `n` header bits, MSB-first.
    pub(crate) fn read_bits(&mut self, n: u8) -> Option<u32> {
        let mut value = 0;

        for _ in 0..n {
            value = (value << 1) | self.read_bit()?;
        }

        Some(value)
    }

    /// Peek `n` header bits without consuming them.
    pub(crate) fn peek_bits(&mut self, n: u8) -> Option<u32> {
        let mut copy = PacketReader {
            inner: self.inner.clone(),
        };
        copy.read_bits(n)
    }

    /// Finish the packet header: skip to the next byte boundary, including
    /// the stuffed byte that follows a final 0xFF header byte.
    pub(crate) fn finish(mut self) -> usize {
        self.inner.align();

        let pos = self.inner.byte_pos();

        if pos > 0 && self.inner.data.get(pos - 1) == Some(&0xFF) {
            pos + 1
        } else {
            pos
        }
    }
}

/// Parse all packets of one tile, attaching each code-block's segment byte
/// ranges (relative to `tile_data`) and pass counts.
pub(crate) fn parse_packets(
    tile_data: &[u8],
    header: &Header,
    components: &mut [TileComponent],
    base_offset: usize,
) -> Result<()> {
    let sequence = packet_sequence(header, components);
    let mut pos = 0;

    for packet in sequence {
        if pos >= tile_data.len() {
            // Truncated codestreams simply stop contributing layers.
            log::warn!("tile data ended before all packets were read");
            break;
        }

        // An optional SOP marker segment precedes the packet (A.8.1).
        if header.global.uses_sop && tile_data[pos..].starts_with(&[0xFF, 0x91]) {
            pos += 6;
        }

        let tc = &mut components[packet.component as usize];
        let resolution = &mut tc.resolutions[packet.resolution as usize];

        let mut reader = PacketReader::new(&tile_data[pos..]);
        let offset = base_offset + pos;

        // B.10.3: a leading zero bit denotes an empty packet.
        let non_empty = reader
            .read_bit()
            .ok_or(DecodeError::new(DecodingError::UnexpectedEof, offset))?;

        // (subband index, code-block index, segment length)
        let mut body_entries: Vec<(usize, usize, u32)> = Vec::new();

        if non_empty == 1 {
            for (band_idx, band) in resolution.subbands.iter_mut().enumerate() {
                let precinct = &mut band.precincts[packet.precinct as usize];
                let grid_width = precinct.grid_width;

                for (cb_idx, block) in precinct.code_blocks.iter_mut().enumerate() {
                    let x_idx = cb_idx as u32 % grid_width;
                    let y_idx = cb_idx as u32 / grid_width;

                    // B.10.4: code-block inclusion.
                    let included = if block.included {
                        reader
                            .read_bit()
                            .ok_or(DecodeError::new(DecodingError::UnexpectedEof, offset))?
                            == 1
                    } else {
                        let first_layer = precinct
                            .inclusion_tree
                            .read(x_idx, y_idx, &mut reader, packet.layer as u32 + 1)
                            .ok_or(DecodeError::new(DecodingError::BadTagTree, offset))?;

                        first_layer <= packet.layer as u32
                    };

                    if !included {
                        continue;
                    }

                    // B.10.5: zero bit-plane information on first inclusion.
                    if !block.included {
                        let missing = precinct
                            .zero_planes_tree
                            .read(x_idx, y_idx, &mut reader, u32::MAX)
                            .ok_or(DecodeError::new(DecodingError::BadTagTree, offset))?;

                        block.missing_bit_planes = missing.min(255) as u8;
                        block.included = true;
                    }

                    // B.10.6: number of new coding passes.
                    let added = read_pass_count(&mut reader)
                        .ok_or(DecodeError::new(DecodingError::MalformedPacket, offset))?;

                    block.num_passes += added;

                    // B.10.7.1: Lblock signalling and the segment length.
                    while reader
                        .read_bit()
                        .ok_or(DecodeError::new(DecodingError::UnexpectedEof, offset))?
                        == 1
                    {
                        block.l_block += 1;

                        if block.l_block > 32 {
                            bail!(DecodingError::MalformedPacket, offset);
                        }
                    }

                    let length_bits = block.l_block + added.ilog2();

                    if length_bits > 32 {
                        bail!(DecodingError::MalformedPacket, offset);
                    }

                    let length = reader
                        .read_bits(length_bits as u8)
                        .ok_or(DecodeError::new(DecodingError::UnexpectedEof, offset))?;

                    body_entries.push((band_idx, cb_idx, length));
                }
            }
        }

        pos += reader.finish();

        // An optional EPH marker terminates the header (A.8.2).
        if header.global.uses_eph {
            if !tile_data[pos..].starts_with(&[0xFF, 0x92]) {
                bail!(DecodingError::MalformedPacket, base_offset + pos);
            }

            pos += 2;
        }

        // The packet body: one contiguous segment per included code-block,
        // in header order.
        for (band_idx, cb_idx, length) in body_entries {
            let end = pos
                .checked_add(length as usize)
                .filter(|&end| end <= tile_data.len())
                .ok_or(DecodeError::new(
                    DecodingError::TierBoundaryMismatch,
                    base_offset + pos,
                ))?;

            let block = &mut resolution.subbands[band_idx].precincts[packet.precinct as usize]
                .code_blocks[cb_idx];
            block.segments.push((pos, length as usize));

            pos = end;
        }
    }

    Ok(())
}

/// Decode the number-of-coding-passes codeword (Table B.4).
fn read_pass_count(reader: &mut PacketReader<'_>) -> Option<u32> {
    if reader.read_bit()? == 0 {
        return Some(1);
    }

    if reader.read_bit()? == 0 {
        return Some(2);
    }

    let two = reader.read_bits(2)?;

    if two < 3 {
        return Some(3 + two);
    }

    let five = reader.read_bits(5)?;

    if five < 31 {
        return Some(6 + five);
    }

    let seven = reader.read_bits(7)?;

    Some(37 + seven)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stuffing_bit_is_skipped() {
        // 0xFF followed by a byte whose MSB (the stuffing bit) is zero: the
        // reader must deliver the 8 data bits of 0xFF and then the 7 payload
        // bits of the next byte.
        let data = [0xFF, 0b0101_0101];
        let mut reader = PacketReader::new(&data);

        assert_eq!(reader.read_bits(8), Some(0xFF));
        assert_eq!(reader.read_bits(7), Some(0b101_0101));
    }

    #[test]
    fn invalid_stuffing_bit_is_rejected() {
        let data = [0xFF, 0b1000_0000];
        let mut reader = PacketReader::new(&data);

        assert_eq!(reader.read_bits(8), Some(0xFF));
        assert_eq!(reader.read_bit(), None);
    }

    #[test]
    fn pass_count_codewords() {
        let cases: &[(&[u8], u32)] = &[
            (&[0b0000_0000], 1),
            (&[0b1000_0000], 2),
            (&[0b1100_0000], 3),
            (&[0b1101_0000], 4),
            (&[0b1110_0000], 5),
            // The all-ones first byte triggers the stuffing rule, so the
            // following bytes carry a zero MSB.
            (&[0b1111_0000, 0b0000_0000], 6),
            (&[0xFF, 0b0100_0000, 0x00], 37),
            (&[0xFF, 0b0111_1111, 0b1000_0000], 164),
        ];

        for &(data, expected) in cases {
            let mut reader = PacketReader::new(data);
            assert_eq!(read_pass_count(&mut reader), Some(expected), "{data:?}");
        }
    }

    #[test]
    fn finish_skips_stuffed_tail_byte() {
        // A header ending in 0xFF owns the following stuffed byte as
        // padding.
        let data = [0xFF, 0x00, 0xAB];
        let mut reader = PacketReader::new(&data);
        reader.read_bits(8).unwrap();
        assert_eq!(reader.finish(), 2);

        let data = [0x80, 0xAB];
        let mut reader = PacketReader::new(&data);
        reader.read_bits(1).unwrap();
        assert_eq!(reader.finish(), 1);
    }
}
