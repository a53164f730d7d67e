// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp::min;

use log::debug;

use crate::ac::{dst_x_bit_prob, ArithmeticEncoder};
use crate::analysis::{
    autocorrelation, context_of, design_filter, generate_ptable, is_mispredicted, predict_channel,
    quantize_filter,
};
use crate::bits::BitWriter;
use crate::common::{FrameParams, HALF_PROB, MAX_PRED_ORDER, MAX_PTABLE_LEN};
use crate::decoder::FrameCoding;
use crate::error::{unsupported_config, Result};
use crate::filter::PredictionFilter;
use crate::header::FrameHeader;
use crate::segment::{Mapping, Segmentation};

/// Options controlling how frames are encoded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EncoderOptions {
    /// The maximum prediction order of a filter, 1 to 128.
    pub max_pred_order: usize,
    /// The maximum length of a probability table, 1 to 64.
    pub max_ptable_len: usize,
    /// Rice code filters and probability tables when that is shorter than storing them raw.
    pub code_tables: bool,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        EncoderOptions {
            max_pred_order: MAX_PRED_ORDER,
            max_ptable_len: MAX_PTABLE_LEN,
            code_tables: true,
        }
    }
}

impl EncoderOptions {
    fn validate(&self) -> Result<()> {
        if self.max_pred_order < 1 || self.max_pred_order > MAX_PRED_ORDER {
            return unsupported_config("dst: invalid maximum prediction order");
        }
        if self.max_ptable_len < 1 || self.max_ptable_len > MAX_PTABLE_LEN {
            return unsupported_config("dst: invalid maximum probability table length");
        }
        Ok(())
    }
}

/// An encoded frame.
#[derive(Debug)]
pub struct EncodedFrame<'a> {
    pub coding: FrameCoding,
    pub data: &'a [u8],
}

/// The per-channel outcome of analysing a frame.
struct ChannelModel {
    coefs: Vec<i32>,
    /// The prediction record of every bit of the channel.
    records: Vec<u8>,
    probs: Vec<i32>,
    mispredicted: usize,
}

/// Encodes channel-interleaved DSD into DST frames.
///
/// Every channel gets its own filter and probability table, and the frame falls back to storing
/// the payload as-is whenever compression does not pay off.
pub struct FrameEncoder {
    params: FrameParams,
    options: EncoderOptions,
    channel_bits: Vec<Vec<bool>>,
    buf: Vec<u8>,
}

impl FrameEncoder {
    pub fn try_new(params: FrameParams, options: EncoderOptions) -> Result<Self> {
        options.validate()?;

        debug!(
            "dst: encoder for {} channels at {} Hz, {:?}",
            params.channels(),
            params.rate().sample_rate(),
            options
        );

        let channel_bits = vec![Vec::with_capacity(params.samples_per_frame()); params.channels()];

        Ok(FrameEncoder {
            params,
            options,
            channel_bits,
            buf: Vec::with_capacity(1 + params.payload_len()),
        })
    }

    pub fn params(&self) -> &FrameParams {
        &self.params
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    /// Encode the channel-interleaved DSD payload of one frame.
    pub fn encode_frame(&mut self, dsd: &[u8]) -> Result<EncodedFrame<'_>> {
        if dsd.len() != self.params.payload_len() {
            return unsupported_config("dst: payload length does not match the frame size");
        }

        self.demux(dsd);

        let coding = match self.encode_lossless() {
            Some(frame) => {
                self.buf.clear();
                self.buf.extend_from_slice(frame.as_bytes());
                FrameCoding::Lossless
            }
            None => {
                // DSTCoded, DST_X_Bit and stuffing are all zero.
                self.buf.clear();
                self.buf.push(0);
                self.buf.extend_from_slice(dsd);
                FrameCoding::Plain
            }
        };

        Ok(EncodedFrame { coding, data: &self.buf })
    }

    fn demux(&mut self, dsd: &[u8]) {
        let channels = self.params.channels();

        for (ch, bits) in self.channel_bits.iter_mut().enumerate() {
            bits.clear();
            bits.extend(
                dsd.iter()
                    .skip(ch)
                    .step_by(channels)
                    .flat_map(|&byte| (0..8).rev().map(move |i| (byte >> i) & 1 == 1)),
            );
        }
    }

    fn analyse_channels(&self) -> Vec<ChannelModel> {
        let mut coefs: Vec<Vec<i32>> = self
            .channel_bits
            .iter()
            .map(|bits| {
                let autocorr = autocorrelation(bits, self.options.max_pred_order);
                quantize_filter(&design_filter(&autocorr, self.options.max_pred_order))
            })
            .collect();

        // The first coefficient also seeds DST_X_Bit, and must be odd.
        coefs[0][0] |= 1;

        coefs
            .into_iter()
            .zip(&self.channel_bits)
            .map(|(coefs, bits)| {
                let records = predict_channel(&PredictionFilter::new(&coefs), bits);
                let table = generate_ptable(&records, coefs.len(), self.options.max_ptable_len);

                ChannelModel {
                    coefs,
                    records,
                    probs: table.probs,
                    mispredicted: table.mispredicted,
                }
            })
            .collect()
    }

    /// Try to compress the frame. Returns `None` if the frame should be stored plain.
    fn encode_lossless(&self) -> Option<BitWriter> {
        let channels = self.params.channels();
        let samples = self.params.samples_per_frame();

        let models = self.analyse_channels();

        let mispredicted: usize = models.iter().map(|model| model.mispredicted).sum();

        if mispredicted > (samples / 2) * channels {
            debug!("dst: storing plain frame, {} bits mispredicted", mispredicted);
            return None;
        }

        let max_len = channels * samples;

        let code = match encode_residuals(&models, samples, max_len) {
            Some(code) => code,
            None => {
                debug!("dst: storing plain frame, arithmetic code too long");
                return None;
            }
        };

        // Every channel uses its own filter and probability table for the whole frame.
        let map = Mapping { tables: (0..channels).map(|ch| vec![ch]).collect(), count: channels };

        let header = FrameHeader {
            filter_segments: Segmentation::single(channels),
            ptable_segments: Segmentation::single(channels),
            filter_map: map.clone(),
            ptable_map: map,
            half_prob: vec![true; channels],
            filters: models.iter().map(|model| model.coefs.clone()).collect(),
            ptables: models.iter().map(|model| model.probs.clone()).collect(),
        };

        let mut frame = BitWriter::with_capacity(self.params.payload_len());

        // DSTCoded.
        frame.write_bit(true);
        header.write(&mut frame, &self.params, self.options.code_tables);
        frame.append(&code);

        let frame_bits = 8 * frame.as_bytes().len();

        if frame_bits > max_len + 8 {
            debug!("dst: storing plain frame, {} bits coded", frame_bits);
            return None;
        }

        debug!(
            "dst: coded frame in {} bytes, {} bits mispredicted, orders {:?}",
            frame.as_bytes().len(),
            mispredicted,
            models.iter().map(|model| model.coefs.len()).collect::<Vec<_>>()
        );

        Some(frame)
    }
}

/// Arithmetic code the residuals of every channel, sample by sample. Returns `None` if the code
/// would reach `max_len` bits.
fn encode_residuals(models: &[ChannelModel], samples: usize, max_len: usize) -> Option<BitWriter> {
    let mut enc = ArithmeticEncoder::new(max_len / 8);

    // DST_X_Bit.
    enc.encode(false, dst_x_bit_prob(models[0].coefs[0]));

    for i in 0..samples {
        if enc.bit_len() >= max_len {
            return None;
        }

        for model in models {
            let record = model.records[i];

            // Bits without a full filter history are coded with a fixed probability of one half.
            let prob = if i < model.coefs.len() {
                HALF_PROB
            }
            else {
                model.probs[min(context_of(record), model.probs.len() - 1)] as u32
            };

            enc.encode(is_mispredicted(record), prob);
        }
    }

    enc.finish(max_len)
}
