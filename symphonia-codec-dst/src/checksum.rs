// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// The divisor of the DST frame checksum.
const POLY: u32 = 0x4000_0008;

/// Compute the checksum of a decoded DSD payload.
///
/// The payload is divided bit by bit, most-significant bit first, by the polynomial
/// `0x40000008`. The remainder register shifts in a 1 whenever it is reduced.
pub fn checksum(data: &[u8]) -> u32 {
    let mut rem = 0u32;

    for &byte in data {
        for i in (0..8).rev() {
            let msg_bit = (byte >> i) & 1 == 1;
            let rem_bit = rem & 0x8000_0000 != 0;

            rem = if msg_bit != rem_bit { ((rem ^ POLY) << 1) | 1 } else { rem << 1 };
        }
    }

    rem
}

/// The result of comparing the checksum of a decoded frame with the expected value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChecksumStatus {
    /// No checksum was verified.
    Unchecked,
    /// The checksum matched.
    Valid,
    /// The checksum did not match. The decoded payload is still returned.
    Mismatch { expected: u32, actual: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A direct transcription of the bit-serial division.
    fn checksum_reference(data: &[u8]) -> u32 {
        let mut rem: u64 = 0;

        for &byte in data {
            let mut msg = byte;

            for _ in 0..8 {
                if ((msg & 0x80) == 0x80) != ((rem & 0x8000_0000) == 0x8000_0000) {
                    rem ^= u64::from(POLY);
                    rem = (rem << 1) + 1;
                }
                else {
                    rem <<= 1;
                }
                rem &= 0xffff_ffff;
                msg <<= 1;
            }
        }

        rem as u32
    }

    #[test]
    fn verify_checksum() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0x00; 16]), 0);
        assert_eq!(checksum(&[0x80]), 0x8000_0f0f);

        let data: Vec<u8> = (0..=255u8).cycle().take(4000).collect();
        assert_eq!(checksum(&data), checksum_reference(&data));

        let silence = vec![0x69; 9408];
        assert_eq!(checksum(&silence), checksum_reference(&silence));
        assert_eq!(checksum(&silence), 0x2b3a_b9f8);
        assert_ne!(checksum(&silence), checksum(&silence[1..]));
    }
}
