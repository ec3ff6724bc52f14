//! End-to-end tests over hand-assembled JBIG2 streams.
//!
//! Arithmetic-coded regions require an MQ encoder to produce, so the
//! end-to-end paths exercised here are the MMR and Huffman ones; the
//! arithmetic coder itself is validated against the ITU test vector in its
//! own crate.

use sable_common::bit::BitWriter;

const FILE_HEADER: [u8; 8] = [0x97, 0x4A, 0x42, 0x32, 0x0D, 0x0A, 0x1A, 0x0A];

/// Encode one segment with a short-form header.
fn segment(number: u32, segment_type: u8, referred: &[u8], data: &[u8]) -> Vec<u8> {
    assert!(referred.len() <= 4);

    let mut out = Vec::new();
    out.extend(number.to_be_bytes());
    out.push(segment_type);
    out.push((referred.len() as u8) << 5);
    out.extend_from_slice(referred);
    out.push(0x01); // page 1
    out.extend((data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
    out
}

/// Page information data for a `width`x`height` page, white default pixel.
fn page_info(width: u32, height: u32) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend(width.to_be_bytes());
    data.extend(height.to_be_bytes());
    data.extend(0_u32.to_be_bytes());
    data.extend(0_u32.to_be_bytes());
    data.push(0x00);
    data.extend(0_u16.to_be_bytes());
    data
}

/// Region segment information (7.4.1).
fn region_info(width: u32, height: u32, x: u32, y: u32, operator: u8) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend(width.to_be_bytes());
    data.extend(height.to_be_bytes());
    data.extend(x.to_be_bytes());
    data.extend(y.to_be_bytes());
    data.push(operator);
    data
}

/// An immediate generic region segment, MMR-coded.
fn mmr_region(number: u32, width: u32, height: u32, operator: u8, mmr_data: &[u8]) -> Vec<u8> {
    let mut data = region_info(width, height, 0, 0, operator);
    data.push(0x01); // MMR
    data.extend_from_slice(mmr_data);
    segment(number, 38, &[], &data)
}

#[test]
fn single_all_white_generic_region() {
    // An 8x1 all-white MMR region: one V(0) code covers the row.
    let mut stream = Vec::new();
    stream.extend(segment(0, 48, &[], &page_info(8, 1)));
    stream.extend(mmr_region(1, 8, 1, 0, &[0b1000_0000]));

    let image = sable_jbig2::decode_embedded(None, &stream, &Default::default()).unwrap();

    assert_eq!((image.width, image.height), (8, 1));
    assert_eq!(image.data.len(), 8);
    assert!(image.data.iter().all(|&p| !p));
}

#[test]
fn standalone_file_header_is_accepted() {
    let mut stream = FILE_HEADER.to_vec();
    stream.push(0x01); // sequential organization
    stream.extend(1_u32.to_be_bytes());
    stream.extend(segment(0, 48, &[], &page_info(8, 1)));
    stream.extend(mmr_region(1, 8, 1, 0, &[0b1000_0000]));

    let image = sable_jbig2::decode(&stream).unwrap();
    assert_eq!((image.width, image.height), (8, 1));
}

#[test]
fn xor_composition_cancels() {
    // A black 4x1 region drawn with OR, then the same region drawn with
    // XOR: the page ends up white again.
    //
    // MMR: horizontal mode, white 0 ("00110101"), black 4 ("011").
    let black_row = [0b0010_0110, 0b1010_1100];

    let mut stream = Vec::new();
    stream.extend(segment(0, 48, &[], &page_info(4, 1)));
    stream.extend(mmr_region(1, 4, 1, 0, &black_row)); // OR
    stream.extend(mmr_region(2, 4, 1, 2, &black_row)); // XOR

    let image = sable_jbig2::decode_embedded(None, &stream, &Default::default()).unwrap();
    assert!(image.data.iter().all(|&p| !p));

    // With only the first region the page is black.
    let mut stream = Vec::new();
    stream.extend(segment(0, 48, &[], &page_info(4, 1)));
    stream.extend(mmr_region(1, 4, 1, 0, &black_row));

    let image = sable_jbig2::decode_embedded(None, &stream, &Default::default()).unwrap();
    assert!(image.data.iter().all(|&p| p));
}

#[test]
fn striped_page_with_unknown_height() {
    let mut stream = Vec::new();

    // Height 0xFFFFFFFF, striped.
    let mut info = Vec::new();
    info.extend(8_u32.to_be_bytes());
    info.extend(0xFFFF_FFFF_u32.to_be_bytes());
    info.extend(0_u32.to_be_bytes());
    info.extend(0_u32.to_be_bytes());
    info.push(0x00);
    info.extend(0x8000_u16.to_be_bytes());
    stream.extend(segment(0, 48, &[], &info));

    // End-of-stripe at row 0: the page is one row tall.
    stream.extend(segment(1, 50, &[], &0_u32.to_be_bytes()));
    stream.extend(mmr_region(2, 8, 1, 0, &[0b1000_0000]));

    let image = sable_jbig2::decode_embedded(None, &stream, &Default::default()).unwrap();
    assert_eq!((image.width, image.height), (8, 1));
}

#[test]
fn page_dimension_limit_is_enforced() {
    let mut stream = Vec::new();
    stream.extend(segment(0, 48, &[], &page_info(1 << 20, 8)));

    let err = sable_jbig2::decode_embedded(None, &stream, &Default::default()).unwrap_err();
    assert!(matches!(
        err.kind,
        sable_jbig2::ErrorKind::ResourceExceeded("page dimensions")
    ));
}

/// A symbol dictionary holding three 2x2 all-black symbols, coded with the
/// standard Huffman tables and an uncompressed collective bitmap.
fn huffman_symbol_dictionary(number: u32) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend(0x0001_u16.to_be_bytes()); // SDHUFF, all standard tables
    data.extend(3_u32.to_be_bytes()); // exported
    data.extend(3_u32.to_be_bytes()); // new

    let mut bits = vec![0_u8; 16];
    let mut writer = BitWriter::new(&mut bits);

    // Height class: delta height +2 (Table D: "10").
    writer.write(0b10, 2).unwrap();
    // Widths: +2 (Table B: "110"), +0 ("0"), +0 ("0"), OOB ("111111").
    writer.write(0b110, 3).unwrap();
    writer.write(0, 1).unwrap();
    writer.write(0, 1).unwrap();
    writer.write(0b111111, 6).unwrap();
    // Collective bitmap size 0 (Table A: "0" + 4 offset bits): stored
    // uncompressed.
    writer.write(0, 1).unwrap();
    writer.write(0, 4).unwrap();
    writer.align();

    let header_bytes = writer.cur_pos() / 8;
    data.extend_from_slice(&bits[..header_bytes]);

    // Uncompressed 6x2 collective bitmap: all black, one byte per row.
    data.extend([0xFC, 0xFC]);

    // Export flags: run of 0 unexported, then 3 exported (Table A values).
    let mut bits = vec![0_u8; 4];
    let mut writer = BitWriter::new(&mut bits);
    writer.write(0, 1).unwrap();
    writer.write(0, 4).unwrap();
    writer.write(0, 1).unwrap();
    writer.write(0b0011, 4).unwrap();
    writer.align();

    let export_bytes = writer.cur_pos() / 8;
    data.extend_from_slice(&bits[..export_bytes]);

    segment(number, 0, &[], &data)
}

/// A Huffman text region placing symbols 0, 1, 2 side by side at the
/// origin.
fn huffman_text_region(number: u32, dictionary: u8) -> Vec<u8> {
    let mut data = region_info(6, 2, 0, 0, 0);

    // SBHUFF, top-left reference corner, everything else default.
    data.extend(0x0011_u16.to_be_bytes());
    // All standard table selections.
    data.extend(0x0000_u16.to_be_bytes());
    // Three instances.
    data.extend(3_u32.to_be_bytes());

    let mut bits = vec![0_u8; 32];
    let mut writer = BitWriter::new(&mut bits);

    // Symbol-ID code table: runcode 1 has prefix length 1, runcode 2 length
    // 2; symbol code lengths are [1, 2, 2].
    for runcode in 0..35_u32 {
        let preflen = match runcode {
            1 => 1,
            2 => 2,
            _ => 0,
        };
        writer.write(preflen, 4).unwrap();
    }

    writer.write(0b0, 1).unwrap(); // symbol 0: length 1 (runcode 1)
    writer.write(0b10, 2).unwrap(); // symbol 1: length 2 (runcode 2)
    writer.write(0b10, 2).unwrap(); // symbol 2: length 2
    writer.align();

    // Text data. Strip size is 1, so no per-instance T bits.
    // Initial strip delta (Table K "0" = 1, negated to -1), then +1 back to
    // row 0.
    writer.write(0b0, 1).unwrap();
    writer.write(0b0, 1).unwrap();
    // First S = 0 (Table F: "00" + 7 offset bits).
    writer.write(0b00, 2).unwrap();
    writer.write(0, 7).unwrap();
    // Symbol 0 ("0"), then IDS = 1 (Table H: "00" + 1 offset bit = 1)
    // twice, placing symbols 1 ("10") and 2 ("11") at S = 2 and S = 4.
    writer.write(0b0, 1).unwrap();
    writer.write(0b00, 2).unwrap();
    writer.write(1, 1).unwrap();
    writer.write(0b10, 2).unwrap();
    writer.write(0b00, 2).unwrap();
    writer.write(1, 1).unwrap();
    writer.write(0b11, 2).unwrap();
    writer.align();

    let text_bytes = writer.cur_pos() / 8;
    data.extend_from_slice(&bits[..text_bytes]);

    segment(number, 6, &[dictionary], &data)
}

#[test]
fn symbol_dictionary_feeds_text_region() {
    // Three 2x2 black symbols placed side by side: the page is a 6x2 black
    // rectangle, the horizontal concatenation of the three symbols.
    let mut stream = Vec::new();
    stream.extend(segment(0, 48, &[], &page_info(6, 2)));
    stream.extend(huffman_symbol_dictionary(1));
    stream.extend(huffman_text_region(2, 1));

    let image = sable_jbig2::decode_embedded(None, &stream, &Default::default()).unwrap();

    assert_eq!((image.width, image.height), (6, 2));
    assert!(image.data.iter().all(|&p| p), "page must be solid black");
}

#[test]
fn decode_is_deterministic() {
    let mut stream = Vec::new();
    stream.extend(segment(0, 48, &[], &page_info(6, 2)));
    stream.extend(huffman_symbol_dictionary(1));
    stream.extend(huffman_text_region(2, 1));

    let a = sable_jbig2::decode_embedded(None, &stream, &Default::default()).unwrap();
    let b = sable_jbig2::decode_embedded(None, &stream, &Default::default()).unwrap();
    assert_eq!(a.data, b.data);
}

#[test]
fn rejects_garbage() {
    assert!(sable_jbig2::decode(b"garbage").is_err());
    assert!(sable_jbig2::decode(&[]).is_err());
}
