//! Tag trees (ISO/IEC 15444-1 B.10.2).
//!
//! A tag tree is a quad-tree over a 2-D grid of leaves where every node
//! stores the minimum of the values below it. Values are not stored in the
//! codestream up front; each packet header contributes just enough bits to
//! answer the query at hand, so node state accumulates monotonically across
//! reads.
//!
//! Nodes live in flat per-level arrays indexed by (level, y, x); level 0 is
//! the leaf grid and the topmost level is the 1x1 root.

use crate::packet::PacketReader;

#[derive(Debug, Clone)]
pub(crate) struct TagTree {
    /// (width, height, offset into `nodes`) per level, leaves first.
    levels: Vec<(u32, u32, usize)>,
    /// The current lower bound of each node's value.
    values: Vec<u32>,
    /// Whether a node's value is fully decoded.
    known: Vec<bool>,
    width: u32,
    height: u32,
}

impl TagTree {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        let mut levels = Vec::new();
        let mut offset = 0;

        let (mut w, mut h) = (width.max(1), height.max(1));

        loop {
            levels.push((w, h, offset));
            offset += (w * h) as usize;

            if w == 1 && h == 1 {
                break;
            }

            w = w.div_ceil(2);
            h = h.div_ceil(2);
        }

        Self {
            levels,
            values: vec![0; offset],
            known: vec![false; offset],
            width,
            height,
        }
    }

    fn node(&self, level: usize, x: u32, y: u32) -> usize {
        let (w, _, offset) = self.levels[level];
        offset + (y * w + x) as usize
    }

    /// Decode the value of leaf (x, y) up to the threshold `max_val`.
    ///
    /// Returns the leaf's current lower bound. If the returned value is less
    /// than `max_val`, it is the leaf's exact value; otherwise only "at
    /// least `max_val`" is known and no further bits were consumed.
    pub(crate) fn read(
        &mut self,
        x: u32,
        y: u32,
        reader: &mut PacketReader<'_>,
        max_val: u32,
    ) -> Option<u32> {
        if x >= self.width || y >= self.height {
            log::warn!(
                "tag tree read at ({x}, {y}) outside {}x{} grid",
                self.width,
                self.height
            );
            return None;
        }

        // Values are non-decreasing from the root towards the leaves, so the
        // bound established at each level carries down the path.
        let mut low = 0;

        for level in (0..self.levels.len()).rev() {
            let idx = self.node(level, x >> level, y >> level);

            if self.values[idx] < low {
                self.values[idx] = low;
            }

            // "A 0 bit means that the value is larger than the current bound,
            // a 1 bit means that the value equals it."
            while !self.known[idx] && self.values[idx] < max_val {
                match reader.read_bit()? {
                    0 => self.values[idx] += 1,
                    _ => self.known[idx] = true,
                }
            }

            low = self.values[idx];

            if !self.known[idx] {
                // The threshold was reached before the value was decided;
                // nothing below this node can be resolved either.
                return Some(low.max(max_val));
            }
        }

        Some(low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketReader;
    use sable_common::bit::BitWriter;

    /// The example from B.10.2, in its extended form as shown in the
    /// "JPEG2000 Standard for Image Compression" book.
    #[test]
    fn tag_tree_example() {
        let mut tree = TagTree::new(6, 3);

        let mut buf = vec![0; 3];
        let mut writer = BitWriter::new(&mut buf);
        writer
            .write_bits([
                0, 1, 1, 1, 1, // q3(0, 0)
                0, 0, 1, // q3(1, 0)
                1, 0, 1, // q3(2, 0)
                0, 0, 1, // q3(3, 0)
                1, 0, 1, 1, // q3(4, 0)
            ])
            .unwrap();

        let mut reader = PacketReader::new(&buf);

        assert_eq!(tree.read(0, 0, &mut reader, u32::MAX).unwrap(), 1);
        assert_eq!(tree.read(1, 0, &mut reader, u32::MAX).unwrap(), 3);
        assert_eq!(tree.read(2, 0, &mut reader, u32::MAX).unwrap(), 2);
        assert_eq!(tree.read(3, 0, &mut reader, u32::MAX).unwrap(), 3);
        assert_eq!(tree.read(4, 0, &mut reader, u32::MAX).unwrap(), 2);
    }

    /// The inclusion tag tree from Table B.5: partial reads bounded by the
    /// next layer number.
    #[test]
    fn partial_reads_with_threshold() {
        let mut tree = TagTree::new(3, 2);

        let mut buf = vec![0; 1];
        let mut writer = BitWriter::new(&mut buf);
        writer.write_bits([1, 1, 1, 1, 0, 0, 0]).unwrap();

        let mut reader = PacketReader::new(&buf);
        let next_layer = 1;

        assert_eq!(tree.read(0, 0, &mut reader, next_layer).unwrap(), 0);
        assert_eq!(tree.read(1, 0, &mut reader, next_layer).unwrap(), 0);
        assert_eq!(tree.read(2, 0, &mut reader, next_layer).unwrap(), 1);
        assert_eq!(tree.read(0, 1, &mut reader, next_layer).unwrap(), 1);
        assert_eq!(tree.read(1, 1, &mut reader, next_layer).unwrap(), 1);
        assert_eq!(tree.read(2, 1, &mut reader, next_layer).unwrap(), 1);
    }

    /// Values along any root-to-leaf path are monotone non-decreasing.
    #[test]
    fn monotone_along_paths() {
        let mut tree = TagTree::new(4, 4);

        // Mostly-ones input (avoiding 0xFF bytes, which would trigger the
        // bit-stuffing rule): every node resolves after a few bits.
        let buf = vec![0xEF; 16];
        let mut reader = PacketReader::new(&buf);

        for y in 0..4 {
            for x in 0..4 {
                let leaf = tree.read(x, y, &mut reader, u32::MAX).unwrap();

                for level in (0..tree.levels.len()).rev() {
                    let idx = tree.node(level, x >> level, y >> level);
                    assert!(tree.values[idx] <= leaf);
                }
            }
        }
    }

    #[test]
    fn out_of_bounds_read_is_rejected() {
        let mut tree = TagTree::new(2, 2);
        let buf = [0xFF];
        let mut reader = PacketReader::new(&buf);
        assert!(tree.read(2, 0, &mut reader, u32::MAX).is_none());
    }
}
