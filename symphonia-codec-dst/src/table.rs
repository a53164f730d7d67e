// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Coding of filter coefficient sets and probability tables.
//!
//! Both kinds of table are stored the same way: either every entry is written raw, or the first
//! few entries are written raw and the rest are predicted from their predecessors with one of
//! three fixed linear predictors, and only the Rice coded prediction error is stored.

use symphonia_core::io::ReadBitsLtr;

use crate::bits::{read_bits, read_bits_signed, BitWriter};
use crate::common::*;
use crate::error::{corrupt_stream, Result};
use crate::rice::{read_rice, rice_len, write_rice};

/// The number of Rice coding methods.
const NUM_METHODS: usize = 3;

/// The storage parameters of one kind of coded table.
pub struct TableCoding {
    /// The prediction taps of each Rice coding method. Method `m` uses `m + 1` taps.
    taps: [&'static [i32]; NUM_METHODS],
    /// The width of a raw entry.
    entry_bits: u32,
    /// Raw entries are two's-complement if true, and stored minus one otherwise.
    signed: bool,
    /// The inclusive range of a valid entry.
    min: i32,
    max: i32,
    invalid_method: &'static str,
    out_of_range: &'static str,
}

/// Filter coefficients: signed 9-bit values.
pub const FILTER_CODING: TableCoding = TableCoding {
    taps: [&[-8], &[-16, 8], &[-9, -5, 6]],
    entry_bits: SIZE_PRED_COEF,
    signed: true,
    min: -(1 << (SIZE_PRED_COEF - 1)),
    max: (1 << (SIZE_PRED_COEF - 1)) - 1,
    invalid_method: "dst: invalid coefficient coding method",
    out_of_range: "dst: filter coefficient out of range",
};

/// Probability table entries: probabilities of a one bit in 1/256 units, 1..=128.
pub const PTABLE_CODING: TableCoding = TableCoding {
    taps: [&[-8], &[-16, 8], &[-24, 24, -8]],
    entry_bits: AC_BITS - 1,
    signed: false,
    min: 1,
    max: 1 << (AC_BITS - 1),
    invalid_method: "dst: invalid probability table coding method",
    out_of_range: "dst: probability table entry out of range",
};

/// Rounds a weighted sum of previous entries to the scale of an entry. The taps are in units of
/// 1/8.
#[inline]
fn scale_prediction(x: i32) -> i32 {
    if x >= 0 {
        (x + 4) >> 3
    }
    else {
        -((-x + 3) >> 3)
    }
}

#[inline]
fn predict(taps: &[i32], entries: &[i32], n: usize) -> i32 {
    let x = taps.iter().enumerate().map(|(t, &c)| c * entries[n - t - 1]).sum();
    scale_prediction(x)
}

impl TableCoding {
    fn read_raw<B: ReadBitsLtr>(&self, bs: &mut B) -> Result<i32> {
        if self.signed {
            read_bits_signed(bs, self.entry_bits)
        }
        else {
            Ok(read_bits(bs, self.entry_bits)? as i32 + 1)
        }
    }

    fn write_raw(&self, bw: &mut BitWriter, value: i32) {
        if self.signed {
            bw.write_bits_signed(value, self.entry_bits);
        }
        else {
            bw.write_bits((value - 1) as u32, self.entry_bits);
        }
    }

    /// Read the `len` entries of a table, starting at its coded flag.
    pub fn read_entries<B: ReadBitsLtr>(&self, bs: &mut B, len: usize) -> Result<Vec<i32>> {
        let mut entries = Vec::with_capacity(len);

        if !bs.read_bool()? {
            for _ in 0..len {
                entries.push(self.read_raw(bs)?);
            }
            return Ok(entries);
        }

        let method = read_bits(bs, SIZE_RICE_METHOD)? as usize;

        if method >= NUM_METHODS || method + 1 >= len {
            return corrupt_stream(self.invalid_method);
        }

        let taps = self.taps[method];

        for _ in 0..taps.len() {
            entries.push(self.read_raw(bs)?);
        }

        let k = read_bits(bs, SIZE_RICE_M)?;

        for n in taps.len()..len {
            let value = read_rice(bs, k)? - predict(taps, &entries, n);

            if value < self.min || value > self.max {
                return corrupt_stream(self.out_of_range);
            }

            entries.push(value);
        }

        Ok(entries)
    }

    /// Find the cheapest Rice coding method and parameter for `entries`, if any is cheaper than
    /// storing the entries raw. Returns `(method, k, bit length)`.
    fn best_method(&self, entries: &[i32]) -> Option<(usize, u32, usize)> {
        let raw_len = 1 + entries.len() * self.entry_bits as usize;

        let mut best: Option<(usize, u32, usize)> = None;
        let mut residuals = Vec::with_capacity(entries.len());

        for (method, taps) in self.taps.iter().enumerate() {
            if taps.len() >= entries.len() {
                continue;
            }

            residuals.clear();
            residuals.extend(
                (taps.len()..entries.len()).map(|n| entries[n] + predict(taps, entries, n)),
            );

            let header_len = 1 + SIZE_RICE_METHOD as usize
                + taps.len() * self.entry_bits as usize
                + SIZE_RICE_M as usize;

            for k in 0..(1 << SIZE_RICE_M) {
                let len = header_len + residuals.iter().map(|&r| rice_len(r, k)).sum::<usize>();

                if len < best.map_or(raw_len, |(_, _, best_len)| best_len) {
                    best = Some((method, k, len));
                }
            }
        }

        best
    }

    /// Write the entries of a table, starting at its coded flag. If `allow_coded` is set, the
    /// shortest representation is chosen.
    pub fn write_entries(&self, bw: &mut BitWriter, entries: &[i32], allow_coded: bool) {
        debug_assert!(entries.iter().all(|&e| e >= self.min && e <= self.max));

        match self.best_method(entries).filter(|_| allow_coded) {
            Some((method, k, _)) => {
                let taps = self.taps[method];

                bw.write_bit(true);
                bw.write_bits(method as u32, SIZE_RICE_METHOD);

                for &value in &entries[..taps.len()] {
                    self.write_raw(bw, value);
                }

                bw.write_bits(k, SIZE_RICE_M);

                for n in taps.len()..entries.len() {
                    write_rice(bw, entries[n] + predict(taps, entries, n), k);
                }
            }
            None => {
                bw.write_bit(false);

                for &value in entries {
                    self.write_raw(bw, value);
                }
            }
        }
    }
}

/// Read a filter: its prediction order followed by its coefficients.
pub fn read_filter<B: ReadBitsLtr>(bs: &mut B) -> Result<Vec<i32>> {
    let order = read_bits(bs, SIZE_CODED_PRED_ORDER)? as usize + 1;
    FILTER_CODING.read_entries(bs, order)
}

pub fn write_filter(bw: &mut BitWriter, coefs: &[i32], allow_coded: bool) {
    debug_assert!(!coefs.is_empty() && coefs.len() <= MAX_PRED_ORDER);

    bw.write_bits(coefs.len() as u32 - 1, SIZE_CODED_PRED_ORDER);
    FILTER_CODING.write_entries(bw, coefs, allow_coded);
}

/// Read a probability table: its length followed by its entries. A table with a single entry
/// stores nothing more, and that entry is always `HALF_PROB`.
pub fn read_ptable<B: ReadBitsLtr>(bs: &mut B) -> Result<Vec<i32>> {
    let len = read_bits(bs, SIZE_CODED_PTABLE_LEN)? as usize + 1;

    if len == 1 {
        return Ok(vec![HALF_PROB as i32]);
    }

    PTABLE_CODING.read_entries(bs, len)
}

pub fn write_ptable(bw: &mut BitWriter, probs: &[i32], allow_coded: bool) {
    debug_assert!(!probs.is_empty() && probs.len() <= MAX_PTABLE_LEN);

    bw.write_bits(probs.len() as u32 - 1, SIZE_CODED_PTABLE_LEN);

    if probs.len() > 1 {
        PTABLE_CODING.write_entries(bw, probs, allow_coded);
    }
}
