// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::error::{unsupported_config, Result};

/// The number of DSD samples in a frame per unit of `Fsample44`. A frame lasts 1/75 s.
pub const SAMPLES_PER_FRAME_PER_FS44: usize = 588;

/// The maximum number of channels in a DST stream.
pub const MAX_CHANNELS: usize = 64;

/// The number of bits used to code the prediction order of a filter.
pub const SIZE_CODED_PRED_ORDER: u32 = 7;
/// The maximum prediction order of a filter.
pub const MAX_PRED_ORDER: usize = 1 << SIZE_CODED_PRED_ORDER;
/// The number of bits of a filter coefficient.
pub const SIZE_PRED_COEF: u32 = 9;

/// The number of bits used to code the length of a probability table.
pub const SIZE_CODED_PTABLE_LEN: u32 = 6;
/// The maximum length of a probability table.
pub const MAX_PTABLE_LEN: usize = 1 << SIZE_CODED_PTABLE_LEN;
/// The number of bits of an arithmetic coder probability.
pub const AC_BITS: u32 = 8;
/// The probability used when the coder has no better estimate.
pub const HALF_PROB: u32 = 1 << (AC_BITS - 1);

/// The number of bits used to code the Rice prediction method of a coded table.
pub const SIZE_RICE_METHOD: u32 = 2;
/// The number of bits used to code the Rice parameter of a coded table.
pub const SIZE_RICE_M: u32 = 3;

/// The maximum number of filter segments per channel.
pub const MAX_FILTER_SEGMENTS: usize = 4;
/// The maximum number of probability table segments per channel.
pub const MAX_PTABLE_SEGMENTS: usize = 8;
/// The minimum length, in bits, of a filter segment.
pub const MIN_FILTER_SEGMENT_LEN: usize = 1024;
/// The minimum length, in bits, of a probability table segment.
pub const MIN_PTABLE_SEGMENT_LEN: usize = 32;

/// Returns the smallest `y` such that `x < 2^y`. This is the number of bits needed to code any
/// value in `0..=x`.
pub fn log2_round_up(x: usize) -> u32 {
    usize::BITS - x.leading_zeros()
}

/// The DSD sample rate of a DST stream as a multiple of 44.1 kHz.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SampleRateClass {
    /// 64 x 44.1 kHz, 2.8224 MHz.
    Dsd64,
    /// 128 x 44.1 kHz, 5.6448 MHz.
    Dsd128,
    /// 256 x 44.1 kHz, 11.2896 MHz.
    Dsd256,
}

impl SampleRateClass {
    /// Get the rate class for a multiple of 44.1 kHz.
    pub fn from_fs44(fs44: u32) -> Result<Self> {
        match fs44 {
            64 => Ok(SampleRateClass::Dsd64),
            128 => Ok(SampleRateClass::Dsd128),
            256 => Ok(SampleRateClass::Dsd256),
            _ => unsupported_config("dst: unsupported sample rate class"),
        }
    }

    /// Get the rate class for a DSD sample rate in Hz.
    pub fn from_sample_rate(rate: u32) -> Result<Self> {
        if rate % 44_100 != 0 {
            return unsupported_config("dst: unsupported sample rate");
        }
        SampleRateClass::from_fs44(rate / 44_100)
    }

    /// The multiple of 44.1 kHz.
    pub fn fs44(&self) -> u32 {
        match self {
            SampleRateClass::Dsd64 => 64,
            SampleRateClass::Dsd128 => 128,
            SampleRateClass::Dsd256 => 256,
        }
    }

    /// The DSD sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.fs44() * 44_100
    }
}

/// The fixed geometry of every frame of a DST stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameParams {
    channels: usize,
    rate: SampleRateClass,
}

impl FrameParams {
    /// Validate and instantiate the frame geometry for a stream.
    pub fn try_new(channels: usize, rate: SampleRateClass) -> Result<Self> {
        if channels == 0 {
            return unsupported_config("dst: stream has no channels");
        }
        if channels > MAX_CHANNELS {
            return unsupported_config("dst: too many channels");
        }
        Ok(FrameParams { channels, rate })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn rate(&self) -> SampleRateClass {
        self.rate
    }

    /// The number of DSD samples (bits) per channel in a frame.
    pub fn samples_per_frame(&self) -> usize {
        SAMPLES_PER_FRAME_PER_FS44 * self.rate.fs44() as usize
    }

    /// The number of bytes per channel in a frame.
    pub fn bytes_per_channel(&self) -> usize {
        self.samples_per_frame() / 8
    }

    /// The size in bytes of the interleaved DSD payload of a frame.
    pub fn payload_len(&self) -> usize {
        self.channels * self.bytes_per_channel()
    }

    /// The maximum number of prediction filters a frame may define.
    pub fn max_filters(&self) -> usize {
        2 * self.channels
    }

    /// The maximum number of probability tables a frame may define.
    pub fn max_ptables(&self) -> usize {
        2 * self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_log2_round_up() {
        assert_eq!(log2_round_up(0), 0);
        assert_eq!(log2_round_up(1), 1);
        assert_eq!(log2_round_up(2), 2);
        assert_eq!(log2_round_up(3), 2);
        assert_eq!(log2_round_up(4), 3);
        assert_eq!(log2_round_up(4575), 13);
    }

    #[test]
    fn verify_rate_class() {
        assert_eq!(SampleRateClass::from_sample_rate(2_822_400).unwrap(), SampleRateClass::Dsd64);
        assert_eq!(SampleRateClass::from_sample_rate(5_644_800).unwrap(), SampleRateClass::Dsd128);
        assert_eq!(SampleRateClass::from_fs44(256).unwrap().sample_rate(), 11_289_600);
        assert!(SampleRateClass::from_sample_rate(44_100).is_err());
        assert!(SampleRateClass::from_sample_rate(2_822_401).is_err());
        assert!(SampleRateClass::from_fs44(512).is_err());
    }

    #[test]
    fn verify_frame_params() {
        let params = FrameParams::try_new(2, SampleRateClass::Dsd64).unwrap();
        assert_eq!(params.samples_per_frame(), 37_632);
        assert_eq!(params.bytes_per_channel(), 4_704);
        assert_eq!(params.payload_len(), 9_408);
        assert_eq!(params.max_filters(), 4);

        let params = FrameParams::try_new(6, SampleRateClass::Dsd256).unwrap();
        assert_eq!(params.samples_per_frame(), 150_528);

        assert!(FrameParams::try_new(0, SampleRateClass::Dsd64).is_err());
        assert!(FrameParams::try_new(65, SampleRateClass::Dsd64).is_err());
        assert!(FrameParams::try_new(64, SampleRateClass::Dsd64).is_ok());
    }
}
