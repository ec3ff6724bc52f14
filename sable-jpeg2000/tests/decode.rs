//! End-to-end tests over hand-assembled codestreams.
//!
//! Code-block bodies require an MQ encoder to produce, so these tests focus
//! on the header, geometry, empty-packet and reconstruction paths; the
//! entropy-coded path is covered by the module tests against the ITU test
//! vector.

/// Build a raw codestream for a `width`x`height` 8-bit greyscale image with
/// the given number of 5/3 decomposition levels and the given tile body.
fn gray_codestream(width: u32, height: u32, levels: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, 0x4F]; // SOC

    out.extend([0xFF, 0x51]); // SIZ
    out.extend(41_u16.to_be_bytes());
    out.extend(0_u16.to_be_bytes());
    out.extend(width.to_be_bytes());
    out.extend(height.to_be_bytes());
    out.extend(0_u32.to_be_bytes());
    out.extend(0_u32.to_be_bytes());
    out.extend(width.to_be_bytes());
    out.extend(height.to_be_bytes());
    out.extend(0_u32.to_be_bytes());
    out.extend(0_u32.to_be_bytes());
    out.extend(1_u16.to_be_bytes());
    out.extend([7, 1, 1]);

    out.extend([0xFF, 0x52]); // COD
    out.extend(12_u16.to_be_bytes());
    out.extend([0x00, 0, 0, 1, 0, levels, 4, 4, 0, 1]);

    out.extend([0xFF, 0x5C]); // QCD: reversible, 2 guard bits.
    out.extend((3 + 1 + 3 * levels as u16).to_be_bytes());
    out.push(0x40);
    out.push(9 << 3);
    for _ in 0..levels {
        out.extend([10 << 3, 10 << 3, 11 << 3]);
    }

    out.extend([0xFF, 0x90]); // SOT
    out.extend(10_u16.to_be_bytes());
    out.extend(0_u16.to_be_bytes());
    out.extend((12 + 2 + body.len() as u32).to_be_bytes());
    out.extend([0, 1]);
    out.extend([0xFF, 0x93]); // SOD
    out.extend_from_slice(body);

    out.extend([0xFF, 0xD9]); // EOC
    out
}

#[test]
fn empty_packets_reconstruct_mid_gray() {
    // One empty packet per resolution: every coefficient stays zero, so the
    // reconstruction is the DC level shift everywhere.
    let data = gray_codestream(16, 16, 1, &[0x00, 0x00]);

    let image = sable_jpeg2000::Image::new(&data).unwrap();
    assert_eq!(image.width(), 16);
    assert_eq!(image.height(), 16);
    assert_eq!(image.color_space().num_channels(), 1);

    let pixels = image.decode().unwrap();
    assert_eq!(pixels.len(), 256);
    assert!(pixels.iter().all(|&p| p == 128));
}

#[test]
fn truncated_tile_body_still_reconstructs() {
    // A missing tile body simply contributes no coefficient data.
    let data = gray_codestream(8, 8, 0, &[]);

    let image = sable_jpeg2000::Image::new(&data).unwrap();
    let pixels = image.decode().unwrap();

    assert_eq!(pixels.len(), 64);
    assert!(pixels.iter().all(|&p| p == 128));
}

#[test]
fn decoding_is_deterministic() {
    let data = gray_codestream(16, 16, 1, &[0x00, 0x00]);
    let image = sable_jpeg2000::Image::new(&data).unwrap();

    assert_eq!(image.decode().unwrap(), image.decode().unwrap());
}

#[test]
fn output_length_matches_dimensions() {
    for (w, h) in [(7, 5), (8, 8), (33, 17)] {
        let data = gray_codestream(w, h, 0, &[]);
        let image = sable_jpeg2000::Image::new(&data).unwrap();
        let pixels = image.decode().unwrap();

        assert_eq!(pixels.len(), (w * h) as usize);
    }
}

#[test]
fn rejects_garbage() {
    assert!(sable_jpeg2000::Image::new(b"garbage").is_err());
    assert!(sable_jpeg2000::Image::new(&[]).is_err());
}
