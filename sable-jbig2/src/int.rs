//! Arithmetic integer decoding procedures (ITU-T T.88 Annex A).

use sable_common::mq::{MqContext, MqDecoder};

/// The IAx integer arithmetic decoding procedure (A.2).
///
/// Each procedure instance owns 512 contexts, indexed by the PREV tracking
/// value formed from previously decoded bits.
pub(crate) struct IntDecoder {
    contexts: Vec<MqContext>,
}

impl IntDecoder {
    pub(crate) fn new() -> Self {
        Self {
            contexts: vec![MqContext::default(); 512],
        }
    }

    /// Decode one integer. Returns `None` for the out-of-band value.
    pub(crate) fn decode(&mut self, decoder: &mut MqDecoder<'_>) -> Option<i32> {
        let mut prev: u32 = 1;

        let sign = self.decode_bit(decoder, &mut prev);

        // The value class prefix from Figure A.1.
        let value = if self.decode_bit(decoder, &mut prev) == 0 {
            self.decode_bits(decoder, &mut prev, 2)
        } else if self.decode_bit(decoder, &mut prev) == 0 {
            self.decode_bits(decoder, &mut prev, 4) + 4
        } else if self.decode_bit(decoder, &mut prev) == 0 {
            self.decode_bits(decoder, &mut prev, 6) + 20
        } else if self.decode_bit(decoder, &mut prev) == 0 {
            self.decode_bits(decoder, &mut prev, 8) + 84
        } else if self.decode_bit(decoder, &mut prev) == 0 {
            self.decode_bits(decoder, &mut prev, 12) + 340
        } else {
            self.decode_bits(decoder, &mut prev, 32).wrapping_add(4436)
        };

        // "V if S = 0; -V if S = 1 and V > 0; OOB if S = 1 and V = 0." (A.2)
        if sign == 0 {
            Some(value as i32)
        } else if value > 0 {
            Some(-(value as i32))
        } else {
            None
        }
    }

    /// Decode one bit and update PREV (A.2 step 3).
    #[inline]
    fn decode_bit(&mut self, decoder: &mut MqDecoder<'_>, prev: &mut u32) -> u32 {
        let bit = decoder.decode(&mut self.contexts[(*prev & 0x1FF) as usize]);

        *prev = if *prev < 256 {
            (*prev << 1) | bit
        } else {
            ((((*prev << 1) | bit) & 511) | 256)
        };

        bit
    }

    fn decode_bits(&mut self, decoder: &mut MqDecoder<'_>, prev: &mut u32, count: u32) -> u32 {
        let mut value = 0;

        for _ in 0..count {
            value = (value << 1) | self.decode_bit(decoder, prev);
        }

        value
    }
}

/// The IAID symbol-ID decoding procedure (A.3).
pub(crate) struct IdDecoder {
    contexts: Vec<MqContext>,
    code_len: u32,
}

impl IdDecoder {
    pub(crate) fn new(code_len: u32) -> Self {
        Self {
            contexts: vec![MqContext::default(); 1 << (code_len + 1)],
            code_len,
        }
    }

    pub(crate) fn decode(&mut self, decoder: &mut MqDecoder<'_>) -> u32 {
        let mut prev = 1_u32;

        for _ in 0..self.code_len {
            let bit = decoder.decode(&mut self.contexts[prev as usize]);
            prev = (prev << 1) | bit;
        }

        prev - (1 << self.code_len)
    }
}
