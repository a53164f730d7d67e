// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A pure Rust Direct Stream Transfer (DST) decoder and encoder.
//!
//! DST is the lossless compression scheme for 1-bit DSD audio defined in ISO/IEC 14496-3. Each
//! frame covers 1/75 s of audio. A frame is either stored plain, or coded with per-segment
//! prediction filters, context-selected probability tables, and a binary arithmetic coder.
//!
//! [`FrameDecoder`] and [`FrameEncoder`] work on whole frames and channel-interleaved DSD bytes.
//! [`DstDecoder`] wraps the frame decoder as a Symphonia [`Decoder`].

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all Symphonia crates. Please see the workspace Cargo.toml
// for their justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::excessive_precision)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]

mod ac;
mod analysis;
mod bits;
mod checksum;
mod common;
mod decoder;
mod encoder;
mod error;
mod filter;
mod header;
mod rice;
mod segment;
mod table;

use symphonia_core::audio::{AsAudioBufferRef, AudioBuffer, AudioBufferRef, Signal, SignalSpec};
use symphonia_core::codecs::{decl_codec_type, CodecDescriptor, CodecParameters, CodecType};
use symphonia_core::codecs::{Decoder, DecoderOptions, FinalizeResult};
use symphonia_core::errors::{decode_error, unsupported_error, Result};
use symphonia_core::formats::Packet;
use symphonia_core::support_codec;

use log::debug;

pub use checksum::{checksum, ChecksumStatus};
pub use common::{FrameParams, SampleRateClass, MAX_CHANNELS};
pub use decoder::{DecodedFrame, FrameCoding, FrameDecoder};
pub use encoder::{EncodedFrame, EncoderOptions, FrameEncoder};
pub use error::Error;

/// DST codec type.
pub const CODEC_TYPE_DST: CodecType = decl_codec_type(b"dst");

/// Direct Stream Transfer (DST) decoder.
///
/// Every packet must hold exactly one DST frame. The decoded frame is returned as planar `u8`
/// samples, one byte holding 8 DSD bits, most-significant bit first.
pub struct DstDecoder {
    params: CodecParameters,
    frames: FrameDecoder,
    buf: AudioBuffer<u8>,
    verify: bool,
    expected_checksum: Option<u32>,
    verify_ok: Option<bool>,
}

impl DstDecoder {
    /// Set the checksum the next decoded frame is verified against. Checksums are carried outside
    /// of the frame by the container, so it is up to the caller to provide them. This has no
    /// effect unless verification was enabled in the decoder options.
    pub fn set_expected_checksum(&mut self, checksum: u32) {
        self.expected_checksum = Some(checksum);
    }
}

impl Decoder for DstDecoder {
    fn try_new(params: &CodecParameters, options: &DecoderOptions) -> Result<Self> {
        if params.codec != CODEC_TYPE_DST {
            return unsupported_error("dst: invalid codec type");
        }

        // The sample rate of a DSD stream is its bit rate per channel.
        let sample_rate = match params.sample_rate {
            Some(rate) => rate,
            None => return decode_error("dst: missing sample rate"),
        };

        let channels = match params.channels {
            Some(channels) => channels,
            None => return decode_error("dst: missing channel layout"),
        };

        let rate = SampleRateClass::from_sample_rate(sample_rate)?;
        let frame_params = FrameParams::try_new(channels.count(), rate)?;

        // Each audio frame of the output holds 8 DSD samples.
        let spec = SignalSpec::new(sample_rate / 8, channels);

        let buf = AudioBuffer::new(frame_params.bytes_per_channel() as u64, spec);

        debug!(
            "dst: decoder for {} channels at {} Hz, verify={}",
            frame_params.channels(),
            sample_rate,
            options.verify
        );

        Ok(DstDecoder {
            params: params.clone(),
            frames: FrameDecoder::new(frame_params),
            buf,
            verify: options.verify,
            expected_checksum: None,
            verify_ok: None,
        })
    }

    fn supported_codecs() -> &'static [CodecDescriptor] {
        &[support_codec!(CODEC_TYPE_DST, "dst", "Direct Stream Transfer")]
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.expected_checksum = None;
    }

    fn codec_params(&self) -> &CodecParameters {
        &self.params
    }

    fn decode(&mut self, packet: &Packet) -> Result<AudioBufferRef<'_>> {
        self.buf.clear();

        let channels = self.frames.params().channels();
        let frames = self.frames.params().bytes_per_channel();

        let expected_checksum = self.expected_checksum.take().filter(|_| self.verify);

        let frame = self.frames.decode_frame(packet.buf(), expected_checksum)?;

        match frame.checksum {
            ChecksumStatus::Valid => {
                self.verify_ok.get_or_insert(true);
            }
            ChecksumStatus::Mismatch { .. } => self.verify_ok = Some(false),
            ChecksumStatus::Unchecked => (),
        }

        self.buf.render_reserved(Some(frames));

        // Deinterleave the frame into one plane per channel.
        for (ch, plane) in self.buf.planes_mut().planes().iter_mut().enumerate() {
            for (dst, &src) in plane.iter_mut().zip(frame.data.iter().skip(ch).step_by(channels)) {
                *dst = src;
            }
        }

        Ok(self.buf.as_audio_buffer_ref())
    }

    fn finalize(&mut self) -> FinalizeResult {
        let mut result: FinalizeResult = Default::default();

        if self.verify {
            result.verify_ok = self.verify_ok;
        }

        result
    }

    fn last_decoded(&self) -> AudioBufferRef<'_> {
        self.buf.as_audio_buffer_ref()
    }
}
