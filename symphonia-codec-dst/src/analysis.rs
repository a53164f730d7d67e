// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Signal analysis for the encoder.
//!
//! The encoder designs one prediction filter per channel from the autocorrelation of the channel's
//! bits, runs the quantized filter over the channel to find the residual and context of every bit,
//! and finally derives a probability table from how often each context mispredicts.

use std::cmp::min;

use crate::common::{HALF_PROB, MAX_PTABLE_LEN, SIZE_PRED_COEF};
use crate::filter::{predicted_bit, prediction_context, History, PredictionFilter};

/// A diagonal element of the Cholesky factorization at or below this fraction of the signal
/// energy ends the factorization, and with it, the prediction order.
const CHOLESKY_THRESHOLD: f64 = 0.334;

/// The largest magnitude of a quantized coefficient.
const MAX_QUANT_COEF: f64 = ((1 << (SIZE_PRED_COEF - 1)) - 1) as f64;

/// Set in a per-bit record if the bit was mispredicted.
const RESIDUAL_FLAG: u8 = 0x80;
/// The context of a per-bit record, clamped to the largest table index.
const CONTEXT_MASK: u8 = 0x3f;

/// Compute the autocorrelation of a channel, with bits taken as +1 and -1, for lags `0..=max_lag`.
pub fn autocorrelation(bits: &[bool], max_lag: usize) -> Vec<f64> {
    (0..=max_lag)
        .map(|lag| {
            if lag >= bits.len() {
                return 0.0;
            }

            // Each pair of equal bits adds 1, and each pair of differing bits subtracts 1.
            let pairs = bits.len() - lag;
            let differing = bits[lag..].iter().zip(bits).filter(|(a, b)| a != b).count();

            (pairs as f64) - 2.0 * (differing as f64)
        })
        .collect()
}

/// Design a prediction filter of at most `max_order` taps from the autocorrelation `autocorr`
/// (which must hold at least `max_order + 1` lags) by solving the normal equations with a Cholesky
/// factorization.
///
/// The factorization stops early once the remaining prediction error drops below a fraction of
/// the signal energy, which bounds the filter order to what the signal supports.
pub fn design_filter(autocorr: &[f64], max_order: usize) -> Vec<f64> {
    debug_assert!(max_order >= 1 && autocorr.len() > max_order);

    let n = max_order;
    let threshold = CHOLESKY_THRESHOLD * autocorr[0];

    // The upper triangle holds the Toeplitz autocorrelation matrix. The strictly lower triangle
    // receives the Cholesky factor, and `inv_diag` its inverted diagonal.
    let mut a = vec![vec![0f64; n]; n];

    for (r, row) in a.iter_mut().enumerate() {
        for (c, elem) in row.iter_mut().enumerate().skip(r) {
            *elem = autocorr[c - r];
        }
    }

    let mut inv_diag = vec![0f64; n];
    let mut order = n;

    'factor: for i in 0..n {
        for j in i..n {
            let x = a[i][j] - (0..i).map(|k| a[j][k] * a[i][k]).sum::<f64>();

            if i == j {
                if x > threshold {
                    inv_diag[i] = 1.0 / x.sqrt();
                }
                else {
                    order = i;
                    break 'factor;
                }
            }
            else {
                a[j][i] = x * inv_diag[i];
            }
        }
    }

    if order == 0 {
        // Not even a first order filter is worthwhile. Predict the sign of the lag 1 correlation.
        return vec![if autocorr[1] < 0.0 { -1.0 } else { 1.0 }];
    }

    // Forward substitution.
    let mut x = vec![0f64; order];

    for i in 0..order {
        let sum: f64 = (0..i).map(|k| a[i][k] * x[k]).sum();
        x[i] = (autocorr[i + 1] - sum) * inv_diag[i];
    }

    // Backward substitution.
    for i in (0..order).rev() {
        let sum: f64 = (i + 1..order).map(|k| a[k][i] * x[k]).sum();
        x[i] = (x[i] - sum) * inv_diag[i];
    }

    x
}

/// Quantize filter coefficients so that the largest magnitude maps to the largest coefficient.
pub fn quantize_filter(coefs: &[f64]) -> Vec<i32> {
    let max = coefs.iter().fold(0f64, |max, c| max.max(c.abs()));

    if max < f64::from(f32::MIN_POSITIVE) {
        return vec![0; coefs.len()];
    }

    coefs.iter().map(|&c| (c / max * MAX_QUANT_COEF + 0.5).floor() as i32).collect()
}

/// Run a filter over a channel. Returns a record for every bit: whether it was mispredicted, and
/// its context clamped to the largest probability table index.
pub fn predict_channel(filter: &PredictionFilter, bits: &[bool]) -> Vec<u8> {
    let mut history = History::new();

    bits.iter()
        .map(|&bit| {
            let prediction = filter.predict(&history);

            history.push(bit);

            let context = min(prediction_context(prediction), MAX_PTABLE_LEN - 1) as u8;

            if bit != predicted_bit(prediction) {
                context | RESIDUAL_FLAG
            }
            else {
                context
            }
        })
        .collect()
}

#[inline(always)]
pub fn is_mispredicted(record: u8) -> bool {
    record & RESIDUAL_FLAG != 0
}

#[inline(always)]
pub fn context_of(record: u8) -> usize {
    usize::from(record & CONTEXT_MASK)
}

/// A probability table generated from the prediction records of a channel.
#[derive(Debug, PartialEq, Eq)]
pub struct GeneratedTable {
    pub probs: Vec<i32>,
    /// The number of mispredicted bits counted.
    pub mispredicted: usize,
}

/// Generate a probability table of at most `max_len` entries from the records of a channel,
/// ignoring the first `skip` bits.
///
/// The table is only as long as the highest context that occurs. Every entry estimates the
/// probability of a misprediction in its context, in units of 1/256.
pub fn generate_ptable(records: &[u8], skip: usize, max_len: usize) -> GeneratedTable {
    debug_assert!(max_len >= 1 && max_len <= MAX_PTABLE_LEN);

    let mut total = [0usize; MAX_PTABLE_LEN];
    let mut wrong = [0usize; MAX_PTABLE_LEN];

    for &record in records.iter().skip(skip) {
        let index = min(context_of(record), max_len - 1);

        total[index] += 1;
        wrong[index] += usize::from(is_mispredicted(record));
    }

    let len = total[..max_len].iter().rposition(|&count| count > 0).map_or(1, |last| last + 1);

    let mispredicted = wrong[..len].iter().sum();

    if len == 1 {
        return GeneratedTable { probs: vec![HALF_PROB as i32], mispredicted };
    }

    let probs = total[..len]
        .iter()
        .zip(&wrong[..len])
        .map(|(&all, &wrong)| {
            if all == 0 {
                1
            }
            else {
                let p = (all + 512 * wrong) / (2 * all);
                p.clamp(1, HALF_PROB as usize) as i32
            }
        })
        .collect();

    GeneratedTable { probs, mispredicted }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits_of(bytes: &[u8]) -> Vec<bool> {
        bytes.iter().flat_map(|&byte| (0..8).rev().map(move |i| (byte >> i) & 1 == 1)).collect()
    }

    #[test]
    fn verify_autocorrelation() {
        // +1 -1 +1 -1
        let bits = [true, false, true, false];

        assert_eq!(autocorrelation(&bits, 4), vec![4.0, -3.0, 2.0, -1.0, 0.0]);
    }

    #[test]
    fn verify_design_filter_for_alternating_signal() {
        let bits: Vec<bool> = (0..4096).map(|i| i % 2 == 0).collect();
        let autocorr = autocorrelation(&bits, 8);

        let coefs = design_filter(&autocorr, 8);
        let quant = quantize_filter(&coefs);

        // The next bit is always the opposite of the previous one.
        assert!(quant[0] < 0);
        assert_eq!(quant.iter().map(|c| c.abs()).max(), Some(255));

        let records = predict_channel(&PredictionFilter::new(&quant), &bits);
        assert!(records.iter().skip(quant.len()).all(|&r| !is_mispredicted(r)));
    }

    #[test]
    fn verify_design_filter_fallback() {
        // A signal without energy cannot be factorized.
        let autocorr = [0.0, -10.0, 3.0];
        assert_eq!(design_filter(&autocorr, 2), vec![-1.0]);

        let autocorr = [0.0, 0.0, 3.0];
        assert_eq!(design_filter(&autocorr, 2), vec![1.0]);

        // Weakly correlated signals still get a filter of the full order.
        let autocorr = [1000.0, -10.0, 3.0];
        assert_eq!(design_filter(&autocorr, 2).len(), 2);
    }

    #[test]
    fn verify_quantize_filter() {
        assert_eq!(quantize_filter(&[0.5, -1.0, 0.25]), vec![128, -255, 64]);
        assert_eq!(quantize_filter(&[0.0, 0.0]), vec![0, 0]);
        assert_eq!(quantize_filter(&[2.0, -2.0]), vec![255, -255]);
    }

    #[test]
    fn verify_silence_is_predictable() {
        let bits = bits_of(&[0x69; 588]);

        let autocorr = autocorrelation(&bits, 32);
        let quant = quantize_filter(&design_filter(&autocorr, 32));

        let records = predict_channel(&PredictionFilter::new(&quant), &bits);
        let table = generate_ptable(&records, quant.len(), MAX_PTABLE_LEN);

        assert!(table.mispredicted < bits.len() / 100);
    }

    #[test]
    fn verify_generate_ptable() {
        let records = [
            // Skipped.
            RESIDUAL_FLAG | 5,
            // Context 0: 4 bits, 1 mispredicted.
            0,
            0,
            0,
            RESIDUAL_FLAG,
            // Context 2: 2 bits, both mispredicted.
            RESIDUAL_FLAG | 2,
            RESIDUAL_FLAG | 2,
        ];

        let table = generate_ptable(&records, 1, MAX_PTABLE_LEN);

        // (4 + 512) / 8 = 64, empty context 1 gets 1, (2 + 1024) / 4 = 256 clamped to 128.
        assert_eq!(table.probs, vec![64, 1, 128]);
        assert_eq!(table.mispredicted, 3);

        // Contexts beyond the maximum length are folded into the last entry.
        let table = generate_ptable(&records, 1, 2);
        assert_eq!(table.probs, vec![64, 128]);

        // A table with a single entry is fixed at one half.
        let table = generate_ptable(&records[..5], 1, MAX_PTABLE_LEN);
        assert_eq!(table.probs, vec![128]);
        assert_eq!(table.mispredicted, 1);

        // No counted bits at all.
        let table = generate_ptable(&records, records.len(), MAX_PTABLE_LEN);
        assert_eq!(table.probs, vec![128]);
        assert_eq!(table.mispredicted, 0);
    }
}
