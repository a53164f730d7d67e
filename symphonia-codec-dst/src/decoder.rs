// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp::min;

use log::{trace, warn};
use symphonia_core::io::{BitReaderLtr, FiniteBitStream, ReadBitsLtr};

use crate::ac::{dst_x_bit_prob, ArithmeticDecoder};
use crate::bits::read_bits;
use crate::checksum::{checksum, ChecksumStatus};
use crate::common::{FrameParams, HALF_PROB};
use crate::error::{corrupt_stream, Error, Result};
use crate::filter::{predicted_bit, prediction_context, History, PredictionFilter};
use crate::header::FrameHeader;
use crate::segment::TableSelector;

/// The number of stuffing bits following the coded flag and `DST_X_Bit` of a plain frame.
const PLAIN_STUFFING_BITS: u32 = 6;

/// How a frame was stored.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameCoding {
    /// The frame holds the raw DSD payload.
    Plain,
    /// The frame is losslessly compressed.
    Lossless,
}

/// A decoded frame.
#[derive(Debug)]
pub struct DecodedFrame<'a> {
    pub coding: FrameCoding,
    /// The channel-interleaved DSD payload of the frame.
    pub data: &'a [u8],
    pub checksum: ChecksumStatus,
}

/// Decodes DST frames into channel-interleaved DSD.
///
/// Every frame is decoded independently: no state other than the output buffer is carried from
/// one frame to the next.
pub struct FrameDecoder {
    params: FrameParams,
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new(params: FrameParams) -> Self {
        FrameDecoder { params, buf: Vec::with_capacity(params.payload_len()) }
    }

    pub fn params(&self) -> &FrameParams {
        &self.params
    }

    /// Decode one complete frame. If `expected_checksum` is provided, the checksum of the decoded
    /// payload is compared against it.
    ///
    /// On error, no part of the frame is returned and the decoder remains usable for the next
    /// frame.
    pub fn decode_frame(
        &mut self,
        frame: &[u8],
        expected_checksum: Option<u32>,
    ) -> Result<DecodedFrame<'_>> {
        self.buf.clear();
        self.buf.resize(self.params.payload_len(), 0);

        let coding = match self.decode_into_buf(frame) {
            Ok(coding) => coding,
            Err(err) => {
                self.buf.clear();
                return Err(err);
            }
        };

        let checksum = match expected_checksum {
            Some(expected) => {
                let actual = checksum(&self.buf);

                if actual == expected {
                    ChecksumStatus::Valid
                }
                else {
                    warn!(
                        "dst: checksum mismatch, expected {:#010x}, got {:#010x}",
                        expected, actual
                    );
                    ChecksumStatus::Mismatch { expected, actual }
                }
            }
            None => ChecksumStatus::Unchecked,
        };

        Ok(DecodedFrame { coding, data: &self.buf, checksum })
    }

    fn decode_into_buf(&mut self, frame: &[u8]) -> Result<FrameCoding> {
        let mut bs = BitReaderLtr::new(frame);

        // DSTCoded flag.
        if !bs.read_bool()? {
            self.read_plain_frame(&mut bs, frame)?;
            return Ok(FrameCoding::Plain);
        }

        let header = FrameHeader::read(&mut bs, &self.params)?;

        // The arithmetic code starts right after the header and runs to the end of the frame.
        let ac_start = 8 * frame.len() - bs.bits_left() as usize;

        trace!("dst: arithmetic code starts at bit {} of {}", ac_start, 8 * frame.len());

        self.decode_lossless(&header, frame, ac_start)?;

        Ok(FrameCoding::Lossless)
    }

    fn read_plain_frame(&mut self, bs: &mut BitReaderLtr<'_>, frame: &[u8]) -> Result<()> {
        // DST_X_Bit carries no information in a plain frame.
        let _ = bs.read_bool()?;

        if read_bits(bs, PLAIN_STUFFING_BITS)? != 0 {
            return corrupt_stream("dst: invalid stuffing in plain frame");
        }

        let payload = &frame[1..];

        if payload.len() < self.buf.len() {
            return Err(Error::OutOfData);
        }

        if payload.len() > self.buf.len() {
            warn!("dst: ignoring {} trailing bytes in plain frame", payload.len() - self.buf.len());
        }

        let len = self.buf.len();
        self.buf.copy_from_slice(&payload[..len]);

        Ok(())
    }

    fn decode_lossless(
        &mut self,
        header: &FrameHeader,
        frame: &[u8],
        ac_start: usize,
    ) -> Result<()> {
        let channels = self.params.channels();

        let filters: Vec<PredictionFilter> =
            header.filters.iter().map(|coefs| PredictionFilter::new(coefs)).collect();

        let mut filter_select: Vec<TableSelector> = (0..channels)
            .map(|ch| TableSelector::new(&header.filter_segments, &header.filter_map, ch))
            .collect();

        let mut ptable_select: Vec<TableSelector> = (0..channels)
            .map(|ch| TableSelector::new(&header.ptable_segments, &header.ptable_map, ch))
            .collect();

        let half_prob_bits: Vec<usize> =
            (0..channels).map(|ch| header.half_prob_bits(ch)).collect();

        let mut history = vec![History::new(); channels];

        let mut ac = ArithmeticDecoder::try_new(frame, ac_start)?;

        // DST_X_Bit.
        let _ = ac.decode(dst_x_bit_prob(header.filters[0][0]));

        // Bits are coded sample by sample, and within a sample, channel by channel.
        for i in 0..self.params.samples_per_frame() {
            let base = (i >> 3) * channels;
            let mask = 0x80 >> (i & 7);

            for ch in 0..channels {
                let filter = &filters[filter_select[ch].table_at(i)];
                let ptable = &header.ptables[ptable_select[ch].table_at(i)];

                let prediction = filter.predict(&history[ch]);

                let prob = if i < half_prob_bits[ch] {
                    HALF_PROB
                }
                else {
                    ptable[min(prediction_context(prediction), ptable.len() - 1)] as u32
                };

                let bit = predicted_bit(prediction) ^ ac.decode(prob);

                history[ch].push(bit);

                if bit {
                    self.buf[base + ch] |= mask;
                }
            }
        }

        Ok(())
    }
}
