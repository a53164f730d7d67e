// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The binary arithmetic coder.
//!
//! Symbols are coded against a probability `p / 256` (`p` in `1..=128`) of being 1. The interval
//! width `A` is kept in `[HALF, ONE)` by renormalization, and the code register `C` carries one
//! extra bit so the encoder can resolve carries with a count of pending opposite bits.

use crate::bits::BitWriter;
use crate::common::AC_BITS;
use crate::error::{corrupt_stream, Result};

/// The width in bits of the interval register.
const A_BITS: u32 = AC_BITS + 4;
/// The weight of the carry bit of the code register.
const ONE: u32 = 1 << A_BITS;
/// The lower bound of the interval width after renormalization.
const HALF: u32 = 1 << (A_BITS - 1);

/// Scales the interval width to the precision of a probability.
#[inline(always)]
fn scaled_width(a: u32) -> u32 {
    (a >> AC_BITS) | ((a >> (AC_BITS - 1)) & 1)
}

/// The probability of the dummy symbol that starts every arithmetic coded frame. It is derived
/// from the first coefficient of the first filter by reversing its 7 least-significant bits.
pub fn dst_x_bit_prob(coef: i32) -> u32 {
    ((coef as u32 & 0x7f).reverse_bits() >> 25) + 1
}

/// Decodes symbols from an arithmetic coded bitstream.
///
/// Reads past the end of the buffer yield zero bits, since the encoder strips trailing zeros from
/// the code.
pub struct ArithmeticDecoder<'a> {
    buf: &'a [u8],
    pos: usize,
    a: u32,
    c: u32,
}

impl<'a> ArithmeticDecoder<'a> {
    /// Instantiate a decoder for the code starting at bit `start` of `buf`.
    pub fn try_new(buf: &'a [u8], start: usize) -> Result<Self> {
        let mut dec = ArithmeticDecoder { buf, pos: start, a: ONE - 1, c: 0 };

        // The first bit of the code is always 0.
        if dec.next_bit() != 0 {
            return corrupt_stream("dst: illegal arithmetic code");
        }

        for _ in 0..A_BITS {
            dec.c = (dec.c << 1) | dec.next_bit();
        }

        Ok(dec)
    }

    #[inline(always)]
    fn next_bit(&mut self) -> u32 {
        let bit = match self.buf.get(self.pos >> 3) {
            Some(byte) => (byte >> (7 - (self.pos & 7))) & 1,
            None => 0,
        };
        self.pos += 1;
        u32::from(bit)
    }

    /// Decode one symbol with probability `p / 256` of being 1.
    #[inline(always)]
    pub fn decode(&mut self, p: u32) -> bool {
        let q = scaled_width(self.a) * p;
        let a_q = self.a - q;

        let symbol = if self.c < a_q {
            self.a = a_q;
            false
        }
        else {
            self.a = q;
            self.c -= a_q;
            true
        };

        while self.a < HALF {
            self.a <<= 1;
            self.c = (self.c << 1) | self.next_bit();
        }

        symbol
    }

    #[cfg(test)]
    fn width(&self) -> u32 {
        self.a
    }
}

/// Encodes symbols into an arithmetic coded bitstream.
pub struct ArithmeticEncoder {
    a: u32,
    c: u32,
    bits_to_follow: usize,
    out: BitWriter,
}

impl ArithmeticEncoder {
    pub fn new(capacity: usize) -> Self {
        ArithmeticEncoder {
            a: ONE - 1,
            c: 0,
            bits_to_follow: 0,
            out: BitWriter::with_capacity(capacity),
        }
    }

    /// The number of code bits produced so far, including those still pending on a carry.
    pub fn bit_len(&self) -> usize {
        self.out.bit_len() + self.bits_to_follow
    }

    /// Encode one symbol with probability `p / 256` of being 1.
    #[inline(always)]
    pub fn encode(&mut self, symbol: bool, p: u32) {
        let q = scaled_width(self.a) * p;

        if symbol {
            self.c += self.a - q;
            self.a = q;
        }
        else {
            self.a -= q;
        }

        while self.a < HALF {
            if self.c & (HALF | ONE) == HALF {
                // The next bit is undecided. Defer it, and every further undecided bit, until a
                // decided bit resolves the carry.
                self.bits_to_follow += 1;
                self.c ^= HALF;
            }
            else {
                self.emit(self.c & ONE != 0);
                self.c &= !ONE;
            }

            self.c <<= 1;
            self.a <<= 1;
        }
    }

    fn emit(&mut self, bit: bool) {
        self.out.write_bit(bit);
        self.out.write_run(!bit, self.bits_to_follow);
        self.bits_to_follow = 0;
    }

    /// Terminate the code. Returns `None` if the code, including its termination, would not be
    /// shorter than `max_len` bits.
    pub fn finish(mut self, max_len: usize) -> Option<BitWriter> {
        // Pick a value inside the final interval that needs as few bits as possible.
        if self.c <= ONE && self.c + self.a > ONE {
            self.c = ONE;
        }
        else {
            self.c += HALF - 1;
        }

        if self.bit_len() + 2 >= max_len {
            return None;
        }

        self.emit(self.c & ONE != 0);

        self.c = (self.c & (ONE - 1)) << 1;
        self.out.write_bit(self.c & ONE != 0);

        debug_assert!(self.out.as_bytes()[0] & 0x80 == 0);

        self.out.trim_trailing_zeros();
        Some(self.out)
    }

    #[cfg(test)]
    fn width(&self) -> u32 {
        self.a
    }
}
