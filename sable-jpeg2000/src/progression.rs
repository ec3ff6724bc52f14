//! Packet progression orders (ISO/IEC 15444-1 B.12).
//!
//! The packet sequence of a tile is materialized up front: one entry per
//! (layer, resolution, component, precinct) combination, sorted by the keys
//! the progression order prescribes. Position-dependent orders sort by the
//! precinct's projection onto the reference grid.

use crate::codestream::{Header, ProgressionOrder};
use crate::tile::TileComponent;

/// One packet's coordinates within a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PacketIndex {
    pub(crate) layer: u16,
    pub(crate) resolution: u8,
    pub(crate) component: u16,
    pub(crate) precinct: u32,
}

/// Build the packet sequence for one tile in the header's progression order.
pub(crate) fn packet_sequence(header: &Header, components: &[TileComponent]) -> Vec<PacketIndex> {
    let num_layers = header.global.num_layers;

    // Collect every (resolution, component, precinct) with its position on
    // the reference grid.
    struct Entry {
        resolution: u8,
        component: u16,
        precinct: u32,
        grid_x: u64,
        grid_y: u64,
    }

    let mut entries = Vec::new();

    for (comp_idx, tc) in components.iter().enumerate() {
        let size = &header.size.components[comp_idx];
        let decompositions = header.coding[comp_idx].num_decompositions;

        for (r, resolution) in tc.resolutions.iter().enumerate() {
            let (ppx, ppy) = resolution.precinct_exp;
            let scale = decompositions - r as u8;

            let pu0 = resolution.rect.x0 >> ppx;
            let pv0 = resolution.rect.y0 >> ppy;

            for p in 0..resolution.num_precincts() {
                let u = p % resolution.precincts_x;
                let v = p / resolution.precincts_x;

                // The precinct origin projected back onto the reference
                // grid.
                let origin_x = ((pu0 + u) as u64) << ppx;
                let origin_y = ((pv0 + v) as u64) << ppy;
                let grid_x = (origin_x << scale) * size.dx as u64;
                let grid_y = (origin_y << scale) * size.dy as u64;

                entries.push(Entry {
                    resolution: r as u8,
                    component: comp_idx as u16,
                    precinct: p,
                    grid_x,
                    grid_y,
                });
            }
        }
    }

    let mut packets = Vec::with_capacity(entries.len() * num_layers as usize);

    for entry in &entries {
        for layer in 0..num_layers {
            packets.push((
                PacketIndex {
                    layer,
                    resolution: entry.resolution,
                    component: entry.component,
                    precinct: entry.precinct,
                },
                entry.grid_x,
                entry.grid_y,
            ));
        }
    }

    match header.global.progression_order {
        ProgressionOrder::Lrcp => {
            packets.sort_by_key(|(p, _, _)| {
                (p.layer, p.resolution, p.component, p.precinct)
            });
        }
        ProgressionOrder::Rlcp => {
            packets.sort_by_key(|(p, _, _)| {
                (p.resolution, p.layer, p.component, p.precinct)
            });
        }
        ProgressionOrder::Rpcl => {
            packets.sort_by_key(|&(p, x, y)| (p.resolution, y, x, p.component, p.layer));
        }
        ProgressionOrder::Pcrl => {
            packets.sort_by_key(|&(p, x, y)| (y, x, p.component, p.resolution, p.layer));
        }
        ProgressionOrder::Cprl => {
            packets.sort_by_key(|&(p, x, y)| (p.component, y, x, p.resolution, p.layer));
        }
    }

    packets.into_iter().map(|(p, _, _)| p).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codestream::{
        CodingParameters, ComponentSize, GlobalCodingStyle, Quantization, QuantizationStyle,
        SizeData, WaveletKernel,
    };
    use crate::tile::build_tile_component;

    fn test_header(order: ProgressionOrder, layers: u16) -> Header {
        Header {
            size: SizeData {
                grid_width: 16,
                grid_height: 16,
                grid_x_offset: 0,
                grid_y_offset: 0,
                tile_width: 16,
                tile_height: 16,
                tile_x_offset: 0,
                tile_y_offset: 0,
                components: vec![ComponentSize {
                    precision: 8,
                    signed: false,
                    dx: 1,
                    dy: 1,
                }],
            },
            global: GlobalCodingStyle {
                progression_order: order,
                num_layers: layers,
                mct: false,
                uses_sop: false,
                uses_eph: false,
            },
            coding: vec![CodingParameters {
                num_decompositions: 1,
                cb_width_exp: 6,
                cb_height_exp: 6,
                precinct_exps: vec![(15, 15); 2],
                kernel: WaveletKernel::Reversible53,
            }],
            quantization: vec![Quantization {
                style: QuantizationStyle::None,
                guard_bits: 2,
                steps: vec![(9, 0); 4],
            }],
        }
    }

    #[test]
    fn lrcp_iterates_layers_outermost() {
        let header = test_header(ProgressionOrder::Lrcp, 2);
        let components = vec![build_tile_component(&header, 0, 0)];

        let packets = packet_sequence(&header, &components);

        assert_eq!(packets.len(), 4);
        assert_eq!((packets[0].layer, packets[0].resolution), (0, 0));
        assert_eq!((packets[1].layer, packets[1].resolution), (0, 1));
        assert_eq!((packets[2].layer, packets[2].resolution), (1, 0));
        assert_eq!((packets[3].layer, packets[3].resolution), (1, 1));
    }

    #[test]
    fn rlcp_iterates_resolutions_outermost() {
        let header = test_header(ProgressionOrder::Rlcp, 2);
        let components = vec![build_tile_component(&header, 0, 0)];

        let packets = packet_sequence(&header, &components);

        assert_eq!((packets[0].layer, packets[0].resolution), (0, 0));
        assert_eq!((packets[1].layer, packets[1].resolution), (1, 0));
        assert_eq!((packets[2].layer, packets[2].resolution), (0, 1));
        assert_eq!((packets[3].layer, packets[3].resolution), (1, 1));
    }
}
