// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bit-level helpers shared by the frame reader and writer.
//!
//! Reading is done with `symphonia_core`'s `BitReaderLtr`. This module adds the small pieces it
//! lacks for DST: zero-width reads and an append-only, MSB-first `BitWriter`.

use symphonia_core::io::ReadBitsLtr;

use crate::error::Result;

/// Read an unsigned field of `bit_width` bits. A zero-width field reads nothing and is 0.
#[inline]
pub fn read_bits<B: ReadBitsLtr>(bs: &mut B, bit_width: u32) -> Result<u32> {
    if bit_width == 0 {
        return Ok(0);
    }
    Ok(bs.read_bits_leq32(bit_width)?)
}

/// Read a two's-complement signed field of `bit_width` bits.
#[inline]
pub fn read_bits_signed<B: ReadBitsLtr>(bs: &mut B, bit_width: u32) -> Result<i32> {
    debug_assert!(bit_width > 0);
    Ok(bs.read_bits_leq32_signed(bit_width)?)
}

/// An append-only writer of MSB-first bit fields.
#[derive(Clone, Debug, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        BitWriter::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        BitWriter { buf: Vec::with_capacity(bytes), len: 0 }
    }

    /// The number of bits written.
    pub fn bit_len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.len = 0;
    }

    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        let shift = self.len & 7;

        if shift == 0 {
            self.buf.push(0);
        }

        if bit {
            // The buffer is never empty after the push above.
            if let Some(last) = self.buf.last_mut() {
                *last |= 0x80 >> shift;
            }
        }

        self.len += 1;
    }

    /// Write the `bit_width` least-significant bits of `value`, most-significant bit first.
    pub fn write_bits(&mut self, value: u32, bit_width: u32) {
        debug_assert!(bit_width <= 32);
        debug_assert!(bit_width == 32 || value >> bit_width == 0);

        for i in (0..bit_width).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    /// Write `value` as a two's-complement field of `bit_width` bits.
    pub fn write_bits_signed(&mut self, value: i32, bit_width: u32) {
        debug_assert!(bit_width > 0 && bit_width <= 32);

        let mask = if bit_width == 32 { u32::MAX } else { (1 << bit_width) - 1 };
        self.write_bits(value as u32 & mask, bit_width);
    }

    /// Write `count` copies of `bit`.
    pub fn write_run(&mut self, bit: bool, count: usize) {
        for _ in 0..count {
            self.write_bit(bit);
        }
    }

    /// Append every bit written to `other`.
    pub fn append(&mut self, other: &BitWriter) {
        let full = other.len / 8;

        for &byte in &other.buf[..full] {
            self.write_bits(u32::from(byte), 8);
        }

        let rem = (other.len & 7) as u32;

        if rem > 0 {
            self.write_bits(u32::from(other.buf[full] >> (8 - rem)), rem);
        }
    }

    /// Drop all zero bits following the last one bit.
    pub fn trim_trailing_zeros(&mut self) {
        match self.buf.iter().rposition(|&byte| byte != 0) {
            Some(pos) => {
                let last = self.buf[pos];
                self.buf.truncate(pos + 1);
                self.len = 8 * pos + 8 - last.trailing_zeros() as usize;
            }
            None => self.clear(),
        }
    }

    /// Get the written bits, zero-padded to a whole number of bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}
