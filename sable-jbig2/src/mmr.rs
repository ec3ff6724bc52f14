//! MMR (CCITT T.6 two-dimensional) decoding, used by generic regions,
//! collective symbol bitmaps and halftone gray-scale planes.
//!
//! The run-length and mode codes are compiled into small state machines at
//! compile time; decoding walks one state per bit.

use crate::bitmap::Bitmap;
use crate::error::{DecodeError, RegionError, Result};
use crate::reader::Reader;

/// The EOFB pattern: two EOL codes (T.6 EOFB, 24 bits).
const EOFB: u32 = 0x001001;

// State machine encoding:
// - 0x0000..0x3FFF: next state index
// - 0x8000 | value: decoded run length or mode id
// - 0xFFFF: invalid
const VALUE_FLAG: u16 = 0x8000;
const VALUE_MASK: u16 = 0x1FFF;
const INVALID: u16 = 0xFFFF;

#[derive(Clone, Copy)]
struct State {
    on_0: u16,
    on_1: u16,
}

impl State {
    const fn new() -> Self {
        Self {
            on_0: INVALID,
            on_1: INVALID,
        }
    }
}

const fn insert_code<const N: usize>(
    states: &mut [State; N],
    mut num_states: usize,
    value: u16,
    code_length: u8,
    code: u16,
) -> usize {
    let mut current: usize = 0;
    let mut i: u8 = 0;

    while i < code_length {
        let bit = (code >> (code_length - 1 - i)) & 1;
        let is_last = i == code_length - 1;

        let next = if bit == 0 {
            states[current].on_0
        } else {
            states[current].on_1
        };

        if is_last {
            let result = VALUE_FLAG | (value & VALUE_MASK);

            if bit == 0 {
                states[current].on_0 = result;
            } else {
                states[current].on_1 = result;
            }
        } else if next == INVALID || next >= VALUE_FLAG {
            let new_state = num_states;
            num_states += 1;

            if bit == 0 {
                states[current].on_0 = new_state as u16;
            } else {
                states[current].on_1 = new_state as u16;
            }

            current = new_state;
        } else {
            current = next as usize;
        }

        i += 1;
    }

    num_states
}

const fn insert_codes<const N: usize, const M: usize>(
    states: &mut [State; N],
    mut num_states: usize,
    codes: &[(u16, u8, u16); M],
) -> usize {
    let mut i = 0;

    while i < codes.len() {
        let (value, code_length, code) = codes[i];
        num_states = insert_code(states, num_states, value, code_length, code);
        i += 1;
    }

    num_states
}

/// Table 2/T.6: white terminating codes.
const WHITE_TERMINATING: [(u16, u8, u16); 64] = [
    (0, 8, 0b00110101),
    (1, 6, 0b000111),
    (2, 4, 0b0111),
    (3, 4, 0b1000),
    (4, 4, 0b1011),
    (5, 4, 0b1100),
    (6, 4, 0b1110),
    (7, 4, 0b1111),
    (8, 5, 0b10011),
    (9, 5, 0b10100),
    (10, 5, 0b00111),
    (11, 5, 0b01000),
    (12, 6, 0b001000),
    (13, 6, 0b000011),
    (14, 6, 0b110100),
    (15, 6, 0b110101),
    (16, 6, 0b101010),
    (17, 6, 0b101011),
    (18, 7, 0b0100111),
    (19, 7, 0b0001100),
    (20, 7, 0b0001000),
    (21, 7, 0b0010111),
    (22, 7, 0b0000011),
    (23, 7, 0b0000100),
    (24, 7, 0b0101000),
    (25, 7, 0b0101011),
    (26, 7, 0b0010011),
    (27, 7, 0b0100100),
    (28, 7, 0b0011000),
    (29, 8, 0b00000010),
    (30, 8, 0b00000011),
    (31, 8, 0b00011010),
    (32, 8, 0b00011011),
    (33, 8, 0b00010010),
    (34, 8, 0b00010011),
    (35, 8, 0b00010100),
    (36, 8, 0b00010101),
    (37, 8, 0b00010110),
    (38, 8, 0b00010111),
    (39, 8, 0b00101000),
    (40, 8, 0b00101001),
    (41, 8, 0b00101010),
    (42, 8, 0b00101011),
    (43, 8, 0b00101100),
    (44, 8, 0b00101101),
    (45, 8, 0b00000100),
    (46, 8, 0b00000101),
    (47, 8, 0b00001010),
    (48, 8, 0b00001011),
    (49, 8, 0b01010010),
    (50, 8, 0b01010011),
    (51, 8, 0b01010100),
    (52, 8, 0b01010101),
    (53, 8, 0b00100100),
    (54, 8, 0b00100101),
    (55, 8, 0b01011000),
    (56, 8, 0b01011001),
    (57, 8, 0b01011010),
    (58, 8, 0b01011011),
    (59, 8, 0b01001010),
    (60, 8, 0b01001011),
    (61, 8, 0b00110010),
    (62, 8, 0b00110011),
    (63, 8, 0b00110100),
];

/// Table 3/T.6: white make-up codes.
const WHITE_MAKEUP: [(u16, u8, u16); 27] = [
    (64, 5, 0b11011),
    (128, 5, 0b10010),
    (192, 6, 0b010111),
    (256, 7, 0b0110111),
    (320, 8, 0b00110110),
    (384, 8, 0b00110111),
    (448, 8, 0b01100100),
    (512, 8, 0b01100101),
    (576, 8, 0b01101000),
    (640, 8, 0b01100111),
    (704, 9, 0b011001100),
    (768, 9, 0b011001101),
    (832, 9, 0b011010010),
    (896, 9, 0b011010011),
    (960, 9, 0b011010100),
    (1024, 9, 0b011010101),
    (1088, 9, 0b011010110),
    (1152, 9, 0b011010111),
    (1216, 9, 0b011011000),
    (1280, 9, 0b011011001),
    (1344, 9, 0b011011010),
    (1408, 9, 0b011011011),
    (1472, 9, 0b010011000),
    (1536, 9, 0b010011001),
    (1600, 9, 0b010011010),
    (1664, 6, 0b011000),
    (1728, 9, 0b010011011),
];

/// Table 2/T.6: black terminating codes.
const BLACK_TERMINATING: [(u16, u8, u16); 64] = [
    (0, 10, 0b0000110111),
    (1, 3, 0b010),
    (2, 2, 0b11),
    (3, 2, 0b10),
    (4, 3, 0b011),
    (5, 4, 0b0011),
    (6, 4, 0b0010),
    (7, 5, 0b00011),
    (8, 6, 0b000101),
    (9, 6, 0b000100),
    (10, 7, 0b0000100),
    (11, 7, 0b0000101),
    (12, 7, 0b0000111),
    (13, 8, 0b00000100),
    (14, 8, 0b00000111),
    (15, 9, 0b000011000),
    (16, 10, 0b0000010111),
    (17, 10, 0b0000011000),
    (18, 10, 0b0000001000),
    (19, 11, 0b00001100111),
    (20, 11, 0b00001101000),
    (21, 11, 0b00001101100),
    (22, 11, 0b00000110111),
    (23, 11, 0b00000101000),
    (24, 11, 0b00000010111),
    (25, 11, 0b00000011000),
    (26, 12, 0b000011001010),
    (27, 12, 0b000011001011),
    (28, 12, 0b000011001100),
    (29, 12, 0b000011001101),
    (30, 12, 0b000001101000),
    (31, 12, 0b000001101001),
    (32, 12, 0b000001101010),
    (33, 12, 0b000001101011),
    (34, 12, 0b000011010010),
    (35, 12, 0b000011010011),
    (36, 12, 0b000011010100),
    (37, 12, 0b000011010101),
    (38, 12, 0b000011010110),
    (39, 12, 0b000011010111),
    (40, 12, 0b000001101100),
    (41, 12, 0b000001101101),
    (42, 12, 0b000011011010),
    (43, 12, 0b000011011011),
    (44, 12, 0b000001010100),
    (45, 12, 0b000001010101),
    (46, 12, 0b000001010110),
    (47, 12, 0b000001010111),
    (48, 12, 0b000001100100),
    (49, 12, 0b000001100101),
    (50, 12, 0b000001010010),
    (51, 12, 0b000001010011),
    (52, 12, 0b000000100100),
    (53, 12, 0b000000110111),
    (54, 12, 0b000000111000),
    (55, 12, 0b000000100111),
    (56, 12, 0b000000101000),
    (57, 12, 0b000001011000),
    (58, 12, 0b000001011001),
    (59, 12, 0b000000101011),
    (60, 12, 0b000000101100),
    (61, 12, 0b000001011010),
    (62, 12, 0b000001100110),
    (63, 12, 0b000001100111),
];

/// Table 3/T.6: black make-up codes.
const BLACK_MAKEUP: [(u16, u8, u16); 27] = [
    (64, 10, 0b0000001111),
    (128, 12, 0b000011001000),
    (192, 12, 0b000011001001),
    (256, 12, 0b000001011011),
    (320, 12, 0b000000110011),
    (384, 12, 0b000000110100),
    (448, 12, 0b000000110101),
    (512, 13, 0b0000001101100),
    (576, 13, 0b0000001101101),
    (640, 13, 0b0000001001010),
    (704, 13, 0b0000001001011),
    (768, 13, 0b0000001001100),
    (832, 13, 0b0000001001101),
    (896, 13, 0b0000001110010),
    (960, 13, 0b0000001110011),
    (1024, 13, 0b0000001110100),
    (1088, 13, 0b0000001110101),
    (1152, 13, 0b0000001110110),
    (1216, 13, 0b0000001110111),
    (1280, 13, 0b0000001010010),
    (1344, 13, 0b0000001010011),
    (1408, 13, 0b0000001010100),
    (1472, 13, 0b0000001010101),
    (1536, 13, 0b0000001011010),
    (1600, 13, 0b0000001011011),
    (1664, 13, 0b0000001100100),
    (1728, 13, 0b0000001100101),
];

/// Make-up codes shared by both colors.
const COMMON_MAKEUP: [(u16, u8, u16); 13] = [
    (1792, 11, 0b00000001000),
    (1856, 11, 0b00000001100),
    (1920, 11, 0b00000001101),
    (1984, 12, 0b000000010010),
    (2048, 12, 0b000000010011),
    (2112, 12, 0b000000010100),
    (2176, 12, 0b000000010101),
    (2240, 12, 0b000000010110),
    (2304, 12, 0b000000010111),
    (2368, 12, 0b000000011100),
    (2432, 12, 0b000000011101),
    (2496, 12, 0b000000011110),
    (2560, 12, 0b000000011111),
];

/// Table 4/T.6: two-dimensional mode codes, mapped to ids 0..=8.
const MODE_CODES: [(u16, u8, u16); 9] = [
    (0, 4, 0b0001),    // pass
    (1, 3, 0b001),     // horizontal
    (2, 1, 0b1),       // vertical 0
    (3, 3, 0b011),     // vertical right 1
    (4, 6, 0b000011),  // vertical right 2
    (5, 7, 0b0000011), // vertical right 3
    (6, 3, 0b010),     // vertical left 1
    (7, 6, 0b000010),  // vertical left 2
    (8, 7, 0b0000010), // vertical left 3
];

const fn build_run_states(
    terminating: &[(u16, u8, u16); 64],
    makeup: &[(u16, u8, u16); 27],
) -> [State; 104] {
    let mut states = [State::new(); 104];
    let mut num_states = 1;
    num_states = insert_codes(&mut states, num_states, terminating);
    num_states = insert_codes(&mut states, num_states, makeup);
    let _ = insert_codes(&mut states, num_states, &COMMON_MAKEUP);
    states
}

const WHITE_STATES: [State; 104] = build_run_states(&WHITE_TERMINATING, &WHITE_MAKEUP);
const BLACK_STATES: [State; 104] = build_run_states(&BLACK_TERMINATING, &BLACK_MAKEUP);

const MODE_STATES: [State; 9] = {
    let mut states = [State::new(); 9];
    let _ = insert_codes(&mut states, 1, &MODE_CODES);
    states
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Pass,
    Horizontal,
    Vertical(i8),
}

fn decode_with_states(reader: &mut Reader<'_>, states: &[State]) -> Result<u16> {
    let mut total: u16 = 0;
    let mut state: usize = 0;

    loop {
        let bit = reader.read_bit().ok_or(DecodeError::new(
            RegionError::InvalidMmrData,
            reader.byte_pos(),
        ))?;

        let transition = if bit == 0 {
            states[state].on_0
        } else {
            states[state].on_1
        };

        if transition == INVALID {
            return Err(DecodeError::new(
                RegionError::InvalidMmrData,
                reader.byte_pos(),
            ));
        }

        if transition & VALUE_FLAG != 0 {
            let value = transition & VALUE_MASK;
            total = total.saturating_add(value);

            // Values below 64 are terminating codes; make-up codes continue
            // with another code of the same color.
            if value < 64 {
                return Ok(total);
            }

            state = 0;
        } else {
            state = transition as usize;
        }
    }
}

fn decode_run(reader: &mut Reader<'_>, white: bool) -> Result<usize> {
    let states: &[State] = if white { &WHITE_STATES } else { &BLACK_STATES };
    decode_with_states(reader, states).map(usize::from)
}

fn decode_mode(reader: &mut Reader<'_>) -> Result<Mode> {
    Ok(match decode_with_states(reader, &MODE_STATES)? {
        0 => Mode::Pass,
        1 => Mode::Horizontal,
        2 => Mode::Vertical(0),
        3 => Mode::Vertical(1),
        4 => Mode::Vertical(2),
        5 => Mode::Vertical(3),
        6 => Mode::Vertical(-1),
        7 => Mode::Vertical(-2),
        _ => Mode::Vertical(-3),
    })
}

/// The per-line changing-element state of the 2-D coder.
struct LineState {
    /// (position, color) of each color change on the reference line.
    ref_changes: Vec<(usize, bool)>,
    /// Color changes on the line being decoded.
    cur_changes: Vec<(usize, bool)>,
    /// Pixels written on the current line so far; doubles as a0 + 1.
    written: usize,
    /// Index into `ref_changes` of the current b1 candidate.
    b1_idx: usize,
    /// Scan start hint for `update_b`.
    ref_pos: usize,
    /// The color of the next run; lines start white.
    black: bool,
    width: usize,
}

impl LineState {
    fn new(width: usize) -> Self {
        Self {
            ref_changes: Vec::new(),
            cur_changes: Vec::new(),
            written: 0,
            b1_idx: 0,
            ref_pos: 0,
            black: false,
            width,
        }
    }

    /// "The first changing element on the reference line to the right of a0
    /// and of opposite colour to a0."
    fn b1(&self) -> usize {
        self.ref_changes
            .get(self.b1_idx)
            .map_or(self.width, |&(idx, _)| idx)
    }

    fn b2(&self) -> usize {
        self.ref_changes
            .get(self.b1_idx + 1)
            .map_or(self.width, |&(idx, _)| idx)
    }

    fn update_b(&mut self) {
        // b1 starts a run of the opposite color and lies strictly to the
        // right of a0. At the start of a line, a0 is an imaginary white
        // element just before the first pixel.
        let target = !self.black;
        let min_idx = if self.written == 0 { 0 } else { self.written + 1 };

        self.b1_idx = self.ref_changes.len();

        for i in self.ref_pos..self.ref_changes.len() {
            let (idx, color) = self.ref_changes[i];

            if idx < min_idx {
                self.ref_pos = i + 1;
                continue;
            }

            if color == target {
                self.b1_idx = i;
                break;
            }
        }
    }

    /// Write `count` pixels of the current color.
    fn push(&mut self, bitmap: &mut Bitmap, y: u32, count: usize) {
        let count = count.min(self.width - self.written);

        if count == 0 {
            return;
        }

        let color = self.black;

        let is_change = self
            .cur_changes
            .last()
            .map_or(color, |&(_, last)| last != color);

        if is_change {
            self.cur_changes.push((self.written, color));
        }

        if color {
            for x in self.written..self.written + count {
                bitmap.set(x as u32, y, true);
            }
        }

        self.written += count;
    }

    fn at_end(&self) -> bool {
        self.written >= self.width
    }

    fn next_line(&mut self) {
        core::mem::swap(&mut self.ref_changes, &mut self.cur_changes);
        self.cur_changes.clear();
        self.written = 0;
        self.ref_pos = 0;
        self.b1_idx = 0;
        self.black = false;
        self.update_b();
    }
}

/// Decode an MMR-coded bitmap into `bitmap`, consuming an integral number of
/// bytes. Returns how many bytes were consumed.
pub(crate) fn decode_into(bitmap: &mut Bitmap, data: &[u8]) -> Result<usize> {
    let mut reader = Reader::new(data);
    let mut state = LineState::new(bitmap.width as usize);
    state.update_b();

    for y in 0..bitmap.height {
        // An optional EOFB ends the data early (6.2.6).
        if reader.clone().read_bits(24) == Some(EOFB) {
            reader.read_bits(24);
            break;
        }

        while !state.at_end() {
            match decode_mode(&mut reader)? {
                Mode::Pass => {
                    // a0 moves below b2; no color change.
                    let run = state.b2().saturating_sub(state.written);
                    state.push(bitmap, y, run);
                    state.update_b();
                }
                Mode::Horizontal => {
                    let first = decode_run(&mut reader, !state.black)?;
                    state.push(bitmap, y, first);
                    state.black = !state.black;

                    let second = decode_run(&mut reader, !state.black)?;
                    state.push(bitmap, y, second);
                    state.black = !state.black;

                    state.update_b();
                }
                Mode::Vertical(offset) => {
                    let b1 = state.b1() as i64;
                    let a1 = b1 + offset as i64;

                    let run = a1 - state.written as i64;

                    if !(0..=state.width as i64).contains(&a1) || run < 0 {
                        return Err(DecodeError::new(
                            RegionError::InvalidMmrData,
                            reader.byte_pos(),
                        ));
                    }

                    state.push(bitmap, y, run as usize);
                    state.black = !state.black;
                    state.update_b();
                }
            }
        }

        state.next_line();
    }

    // A trailing EOFB after the last row is consumed as well.
    if reader.clone().read_bits(24) == Some(EOFB) {
        reader.read_bits(24);
    }

    reader.align();
    Ok(reader.byte_pos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_codes_decode() {
        // White run 2: "0111".
        let mut reader = Reader::new(&[0b0111_0000]);
        assert_eq!(decode_run(&mut reader, true).unwrap(), 2);

        // Black run 2: "11".
        let mut reader = Reader::new(&[0b1100_0000]);
        assert_eq!(decode_run(&mut reader, false).unwrap(), 2);

        // White makeup 64 + terminating 0: "11011" + "00110101".
        let mut reader = Reader::new(&[0b11011_001, 0b10101_000]);
        assert_eq!(decode_run(&mut reader, true).unwrap(), 64);
    }

    #[test]
    fn mode_codes_decode() {
        let mut reader = Reader::new(&[0b1000_0000]);
        assert_eq!(decode_mode(&mut reader).unwrap(), Mode::Vertical(0));

        let mut reader = Reader::new(&[0b001_00000]);
        assert_eq!(decode_mode(&mut reader).unwrap(), Mode::Horizontal);

        let mut reader = Reader::new(&[0b0001_0000]);
        assert_eq!(decode_mode(&mut reader).unwrap(), Mode::Pass);

        let mut reader = Reader::new(&[0b011_00000]);
        assert_eq!(decode_mode(&mut reader).unwrap(), Mode::Vertical(1));

        let mut reader = Reader::new(&[0b010_00000]);
        assert_eq!(decode_mode(&mut reader).unwrap(), Mode::Vertical(-1));
    }

    #[test]
    fn all_white_line_via_vertical_mode() {
        // With an all-white (empty) reference line, b1 = width, so a single
        // V(0) code produces a full white row.
        let mut bitmap = Bitmap::new(8, 1);
        let consumed = decode_into(&mut bitmap, &[0b1000_0000]).unwrap();

        assert_eq!(consumed, 1);
        assert!(bitmap.data.iter().all(|&p| !p));
    }

    #[test]
    fn all_white_line_via_horizontal_mode() {
        // Horizontal mode with white run 8 ("10011") and black run 0
        // ("0000110111"): a row of eight white pixels.
        let mut bitmap = Bitmap::new(8, 1);

        // "001" + "10011" + "0000110111".
        let data = [0b001_10011, 0b00001101, 0b11_000000];
        decode_into(&mut bitmap, &data).unwrap();

        assert!(bitmap.data.iter().all(|&p| !p));
    }

    #[test]
    fn vertical_modes_track_reference_line() {
        // Row 0: horizontal mode, white 3 ("1000") + black 5 ("0011").
        // Row 1: V(0), V(0): same transitions as row 0.
        let mut bitmap = Bitmap::new(8, 2);

        // "001" (horizontal) + "1000" (white 3) + "0011" (black 5), then
        // two V(0) codes for row 1.
        let data = [0x30, 0x78];
        decode_into(&mut bitmap, &data).unwrap();

        for y in 0..2 {
            for x in 0..8 {
                assert_eq!(bitmap.get(x, y), x >= 3, "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn eofb_terminates_early() {
        let mut bitmap = Bitmap::new(8, 4);

        // One V(0) all-white row, then an EOFB (two EOL codes) directly at
        // the following bit position; the remaining rows stay white.
        let data = [0x80, 0x08, 0x00, 0x80];
        let consumed = decode_into(&mut bitmap, &data).unwrap();

        assert_eq!(consumed, 4);
        assert!(bitmap.data.iter().all(|&p| !p));
    }
}
