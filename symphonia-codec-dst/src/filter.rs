// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The prediction filter.
//!
//! A filter predicts the next bit of a channel from its previous bits (+1 for a 1 bit, -1 for a 0
//! bit) with an integer FIR filter of up to 128 taps. Instead of multiplying each tap, the filter
//! precomputes the partial sum of every group of 8 taps for all 256 possible history bytes, so a
//! prediction costs one table lookup per 8 taps.

use crate::common::MAX_PRED_ORDER;

/// The number of history bytes needed by a filter of the maximum order.
const HISTORY_BYTES: usize = MAX_PRED_ORDER / 8;

/// The bits most recently coded in a channel, newest in the least-significant bit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct History(u128);

impl History {
    /// The history at the start of every frame: alternating 1 and 0 bits.
    pub fn new() -> Self {
        History(u128::from_ne_bytes([0xaa; HISTORY_BYTES]))
    }

    #[inline(always)]
    pub fn push(&mut self, bit: bool) {
        self.0 = (self.0 << 1) | u128::from(bit);
    }

    /// Byte `j` holds the bits at lags `8j + 1` to `8j + 8`, the lag `8j + 1` bit in its
    /// least-significant bit.
    #[inline(always)]
    fn byte(&self, j: usize) -> usize {
        (self.0 >> (8 * j)) as usize & 0xff
    }
}

impl Default for History {
    fn default() -> Self {
        History::new()
    }
}

/// A prediction filter expanded into lookup tables.
pub struct PredictionFilter {
    /// For every group `j` of 8 taps, the sum of the taps weighted by +1 or -1 for each of the
    /// 256 possible history bytes.
    table: Vec<[i16; 256]>,
}

impl PredictionFilter {
    pub fn new(coefs: &[i32]) -> Self {
        debug_assert!(!coefs.is_empty() && coefs.len() <= MAX_PRED_ORDER);

        let table = coefs
            .chunks(8)
            .map(|taps| {
                let mut row = [0i16; 256];

                for (k, sum) in row.iter_mut().enumerate() {
                    let v: i32 = taps
                        .iter()
                        .enumerate()
                        .map(|(l, &c)| if (k >> l) & 1 == 1 { c } else { -c })
                        .sum();

                    *sum = v as i16;
                }

                row
            })
            .collect();

        PredictionFilter { table }
    }

    /// Compute the prediction for the next bit of a channel.
    #[inline(always)]
    pub fn predict(&self, history: &History) -> i32 {
        self.table.iter().enumerate().map(|(j, row)| i32::from(row[history.byte(j)])).sum()
    }
}

/// The bit a prediction favours.
#[inline(always)]
pub fn predicted_bit(prediction: i32) -> bool {
    prediction >= 0
}

/// The confidence of a prediction, used to select a probability table entry.
#[inline(always)]
pub fn prediction_context(prediction: i32) -> usize {
    (prediction.unsigned_abs() >> 3) as usize
}
