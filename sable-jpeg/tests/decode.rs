//! End-to-end decoding tests over hand-assembled baseline JPEG streams.

use sable_common::bit::BitWriter;

/// Append a length-prefixed marker segment.
fn push_segment(out: &mut Vec<u8>, marker: u8, payload: &[u8]) {
    out.push(0xFF);
    out.push(marker);
    out.extend(((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(payload);
}

/// A quantization table of all ones, in zig-zag order.
fn flat_dqt() -> Vec<u8> {
    let mut payload = vec![0x00];
    payload.extend([1u8; 64]);
    payload
}

/// A DHT payload for a table whose codes are canonical over the given
/// symbols, one symbol per code length starting at length 1.
fn tiny_dht(class: u8, slot: u8, symbols: &[u8]) -> Vec<u8> {
    let mut counts = [0u8; 16];
    for i in 0..symbols.len() {
        counts[i] = 1;
    }

    let mut payload = vec![(class << 4) | slot];
    payload.extend(counts);
    payload.extend(symbols);
    payload
}

/// Pack bits MSB-first, pad the final byte with 1 bits, and byte-stuff
/// (0xFF data bytes become FF 00).
fn entropy(bits: &[(u32, u8)]) -> Vec<u8> {
    let total: usize = bits.iter().map(|&(_, n)| n as usize).sum();
    let mut buf = vec![0u8; total.div_ceil(8)];
    let total_bits = buf.len() * 8;
    let mut writer = BitWriter::new(&mut buf);

    for &(value, size) in bits {
        writer.write(value, size).unwrap();
    }

    // Pad with 1 bits.
    let written = writer.cur_pos();
    for _ in written..total_bits {
        writer.write(1, 1).unwrap();
    }

    let mut stuffed = Vec::with_capacity(buf.len() + 2);
    for byte in buf {
        stuffed.push(byte);
        if byte == 0xFF {
            stuffed.push(0x00);
        }
    }

    stuffed
}

/// An 8-bit grayscale frame header for the given size.
fn gray_sof(width: u16, height: u16) -> Vec<u8> {
    let mut payload = vec![8];
    payload.extend(height.to_be_bytes());
    payload.extend(width.to_be_bytes());
    payload.extend([1, 1, 0x11, 0]);
    payload
}

fn gray_sos() -> Vec<u8> {
    vec![1, 1, 0x00, 0, 63, 0]
}

/// Build a single-scan grayscale JPEG with flat quantization, a one-code DC
/// table for `dc_symbol`, and the given entropy-coded payload.
fn gray_jpeg(width: u16, height: u16, dc_symbol: u8, scan: &[u8], dri: Option<u16>) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    push_segment(&mut out, 0xDB, &flat_dqt());
    push_segment(&mut out, 0xC0, &gray_sof(width, height));
    push_segment(&mut out, 0xC4, &tiny_dht(0, 0, &[dc_symbol]));
    push_segment(&mut out, 0xC4, &tiny_dht(1, 0, &[0x00]));

    if let Some(interval) = dri {
        push_segment(&mut out, 0xDD, &interval.to_be_bytes());
    }

    push_segment(&mut out, 0xDA, &gray_sos());
    out.extend_from_slice(scan);
    out.extend([0xFF, 0xD9]);
    out
}

#[test]
fn solid_gray_8x8() {
    // DC category 0 (diff = 0) followed by EOB: every pixel is exactly 128.
    let scan = entropy(&[(0, 1), (0, 1)]);
    let jpeg = gray_jpeg(8, 8, 0x00, &scan, None);

    let image = sable_jpeg::decode(&jpeg).unwrap();
    assert_eq!(image.width, 8);
    assert_eq!(image.height, 8);
    assert_eq!(image.data.len(), 192);
    assert!(image.data.iter().all(|&p| p == 128));
}

#[test]
fn dc_only_block() {
    // DC category 6 with raw value 40 (positive), then EOB. The block
    // reconstructs to round(40 / 8) + 128 = 133 everywhere.
    let scan = entropy(&[(0, 1), (40, 6), (0, 1)]);
    let jpeg = gray_jpeg(8, 8, 0x06, &scan, None);

    let image = sable_jpeg::decode(&jpeg).unwrap();
    assert!(image.data.iter().all(|&p| p == 133));
}

#[test]
fn non_aligned_7x7_is_cropped() {
    let scan = entropy(&[(0, 1), (0, 1)]);
    let jpeg = gray_jpeg(7, 7, 0x00, &scan, None);

    let image = sable_jpeg::decode(&jpeg).unwrap();
    assert_eq!(image.width, 7);
    assert_eq!(image.height, 7);
    assert_eq!(image.data.len(), 7 * 7 * 3);
    assert!(image.data.iter().all(|&p| p == 128));
}

#[test]
fn restart_markers_reset_predictors() {
    // Two MCUs (16x8) with DRI = 1. Both encode a DC diff of +8 (category 4,
    // raw 0b1000). Because the predictor is reset at the restart marker, both
    // blocks decode to DC = 8, i.e. 129 everywhere.
    let mcu = entropy(&[(0, 1), (0b1000, 4), (0, 1)]);

    let mut scan = Vec::new();
    scan.extend_from_slice(&mcu);
    scan.extend([0xFF, 0xD0]);
    scan.extend_from_slice(&mcu);

    let jpeg = gray_jpeg(16, 8, 0x04, &scan, Some(1));

    let image = sable_jpeg::decode(&jpeg).unwrap();
    assert_eq!(image.data.len(), 16 * 8 * 3);
    assert!(image.data.iter().all(|&p| p == 129));
}

#[test]
fn missing_restart_marker_fails_resync() {
    let mcu = entropy(&[(0, 1), (0b1000, 4), (0, 1)]);

    // Same stream as above but without the RST0 between the MCUs.
    let mut scan = Vec::new();
    scan.extend_from_slice(&mcu);
    scan.extend_from_slice(&mcu);

    let jpeg = gray_jpeg(16, 8, 0x04, &scan, Some(1));

    let err = sable_jpeg::decode(&jpeg).unwrap_err();
    assert!(matches!(
        err.kind,
        sable_jpeg::ErrorKind::Scan(sable_jpeg::ScanError::ResyncFailed)
    ));
}

#[test]
fn solid_red_4_4_4() {
    // A 3-component 8x8 image. DC values are chosen so the planes
    // reconstruct to Y = 76, Cb = 85, Cr = 255, i.e. pure red.
    //
    // DC table: symbols 9, 10 at code lengths 1, 2.
    let mut out = vec![0xFF, 0xD8];
    push_segment(&mut out, 0xDB, &flat_dqt());

    let mut sof = vec![8, 0, 8, 0, 8, 3];
    sof.extend([1, 0x11, 0, 2, 0x11, 0, 3, 0x11, 0]);
    push_segment(&mut out, 0xC0, &sof);

    push_segment(&mut out, 0xC4, &tiny_dht(0, 0, &[9, 10]));
    push_segment(&mut out, 0xC4, &tiny_dht(1, 0, &[0x00]));

    let mut sos = vec![3];
    sos.extend([1, 0x00, 2, 0x00, 3, 0x00]);
    sos.extend([0, 63, 0]);
    push_segment(&mut out, 0xDA, &sos);

    // Y: DC -416 (category 9, raw -416 + 511 = 95).
    // Cb: DC -344 (category 9, raw 167).
    // Cr: DC 1016 (category 10, raw 1016).
    let scan = entropy(&[
        (0b0, 1),
        (95, 9),
        (0, 1),
        (0b0, 1),
        (167, 9),
        (0, 1),
        (0b10, 2),
        (1016, 10),
        (0, 1),
    ]);
    out.extend_from_slice(&scan);
    out.extend([0xFF, 0xD9]);

    let image = sable_jpeg::decode(&out).unwrap();
    let center = ((4 * 8 + 4) * 3) as usize;
    let (r, g, b) = (
        image.data[center],
        image.data[center + 1],
        image.data[center + 2],
    );

    assert!(r > 200, "red too weak: {r}");
    assert!(g < 80, "green too strong: {g}");
    assert!(b < 80, "blue too strong: {b}");
}

#[test]
fn chroma_subsampled_4_2_0() {
    // 16x16 4:2:0: one MCU holds four Y blocks and one block each of Cb/Cr.
    // All DC diffs are zero, so the image is uniformly mid-gray.
    let mut out = vec![0xFF, 0xD8];
    push_segment(&mut out, 0xDB, &flat_dqt());

    let mut sof = vec![8, 0, 16, 0, 16, 3];
    sof.extend([1, 0x22, 0, 2, 0x11, 0, 3, 0x11, 0]);
    push_segment(&mut out, 0xC0, &sof);

    push_segment(&mut out, 0xC4, &tiny_dht(0, 0, &[0x00]));
    push_segment(&mut out, 0xC4, &tiny_dht(1, 0, &[0x00]));

    let mut sos = vec![3];
    sos.extend([1, 0x00, 2, 0x00, 3, 0x00]);
    sos.extend([0, 63, 0]);
    push_segment(&mut out, 0xDA, &sos);

    // Six blocks, each a zero DC diff plus EOB.
    let bits: Vec<(u32, u8)> = (0..6).flat_map(|_| [(0, 1), (0, 1)]).collect();
    out.extend_from_slice(&entropy(&bits));
    out.extend([0xFF, 0xD9]);

    let image = sable_jpeg::decode(&out).unwrap();
    assert_eq!(image.data.len(), 16 * 16 * 3);
    assert!(image.data.iter().all(|&p| p == 128));
}

#[test]
fn decode_is_deterministic() {
    let scan = entropy(&[(0, 1), (40, 6), (0, 1)]);
    let jpeg = gray_jpeg(8, 8, 0x06, &scan, None);

    let a = sable_jpeg::decode(&jpeg).unwrap();
    let b = sable_jpeg::decode(&jpeg).unwrap();
    assert_eq!(a.data, b.data);
}
