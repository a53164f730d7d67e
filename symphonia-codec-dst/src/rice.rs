// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Signed Rice codes.
//!
//! A value `v` coded with parameter `k` is written as `|v| >> k` zero bits, a terminating one bit,
//! the `k` least-significant bits of `|v|`, and, if `v != 0`, a sign bit (1 for negative).

use symphonia_core::io::ReadBitsLtr;

use crate::bits::{read_bits, BitWriter};
use crate::error::{corrupt_stream, Result};

/// The longest unary prefix accepted while reading. Legitimate residuals of 9-bit coefficients and
/// 8-bit probabilities never come close to this.
const MAX_RICE_RUN: u32 = 1 << 12;

/// Read a Rice coded value with parameter `k`.
pub fn read_rice<B: ReadBitsLtr>(bs: &mut B, k: u32) -> Result<i32> {
    let mut run = 0;

    while !bs.read_bool()? {
        run += 1;

        if run > MAX_RICE_RUN {
            return corrupt_stream("dst: rice code prefix too long");
        }
    }

    let magnitude = ((run << k) | read_bits(bs, k)?) as i32;

    if magnitude != 0 && bs.read_bool()? {
        Ok(-magnitude)
    }
    else {
        Ok(magnitude)
    }
}

/// Write `value` as a Rice code with parameter `k`.
pub fn write_rice(bw: &mut BitWriter, value: i32, k: u32) {
    let magnitude = value.unsigned_abs();

    bw.write_run(false, (magnitude >> k) as usize);
    bw.write_bit(true);
    bw.write_bits(magnitude & ((1 << k) - 1), k);

    if magnitude != 0 {
        bw.write_bit(value < 0);
    }
}

/// The number of bits `write_rice` emits for `value` with parameter `k`.
pub fn rice_len(value: i32, k: u32) -> usize {
    let magnitude = value.unsigned_abs();
    (magnitude >> k) as usize + 1 + k as usize + usize::from(magnitude != 0)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use symphonia_core::io::BitReaderLtr;

    use super::*;
    use crate::error::Error;

    #[test]
    fn verify_rice_layout() {
        let mut bw = BitWriter::new();

        // 5 with k = 1: 00 1 1 0
        write_rice(&mut bw, 5, 1);
        // 0 with k = 2: 1 00
        write_rice(&mut bw, 0, 2);
        // -3 with k = 0: 000 1 1
        write_rice(&mut bw, -3, 0);

        assert_eq!(bw.bit_len(), 5 + 3 + 5);
        assert_eq!(rice_len(5, 1) + rice_len(0, 2) + rice_len(-3, 0), 13);
        // 0011 0100 0001 1[000]
        assert_eq!(bw.as_bytes(), &[0x34, 0x18]);
    }

    #[test]
    fn verify_overlong_prefix_is_rejected() {
        let buf = vec![0u8; 1024];
        let mut bs = BitReaderLtr::new(&buf);

        assert!(matches!(read_rice(&mut bs, 0), Err(Error::CorruptStream(_))));
    }

    #[test]
    fn verify_truncated_code_is_out_of_data() {
        // Prefix terminates, but the 7 suffix bits run past the end.
        let buf = [0x01];
        let mut bs = BitReaderLtr::new(&buf);

        assert!(matches!(read_rice(&mut bs, 7), Err(Error::OutOfData)));
    }

    proptest! {
        #[test]
        fn verify_rice_invertible(
            values in proptest::collection::vec(-4096i32..4096, 1..64),
            k in 0u32..16,
        ) {
            let mut bw = BitWriter::new();

            for &v in &values {
                write_rice(&mut bw, v, k);
            }

            prop_assert_eq!(bw.bit_len(), values.iter().map(|&v| rice_len(v, k)).sum::<usize>());

            let mut bs = BitReaderLtr::new(bw.as_bytes());

            for &v in &values {
                prop_assert_eq!(read_rice(&mut bs, k).unwrap(), v);
            }
        }
    }
}
