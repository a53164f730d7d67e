// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use log::trace;
use symphonia_core::io::ReadBitsLtr;

use crate::bits::BitWriter;
use crate::common::FrameParams;
use crate::error::{corrupt_stream, Result};
use crate::segment::{Mapping, Segmentation, FILTER_SEGMENT_LIMITS, PTABLE_SEGMENT_LIMITS};
use crate::table::{read_filter, read_ptable, write_filter, write_ptable};

/// The header of a lossless coded frame. It follows the frame's leading coded flag and precedes
/// the arithmetic code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub filter_segments: Segmentation,
    pub ptable_segments: Segmentation,
    pub filter_map: Mapping,
    pub ptable_map: Mapping,
    /// For each channel, whether the first bits of the channel, for which the filter lacks a full
    /// history, are coded with a fixed probability of one half.
    pub half_prob: Vec<bool>,
    /// The coefficients of every filter.
    pub filters: Vec<Vec<i32>>,
    /// The entries of every probability table.
    pub ptables: Vec<Vec<i32>>,
}

impl FrameHeader {
    pub fn read<B: ReadBitsLtr>(bs: &mut B, params: &FrameParams) -> Result<FrameHeader> {
        // Segmentation.
        let ptable_same_segs = bs.read_bool()?;

        let filter_segments = Segmentation::read(bs, params, FILTER_SEGMENT_LIMITS)?;

        let ptable_segments = if ptable_same_segs {
            // Filter segments are longer and fewer than the probability table limits require.
            filter_segments.clone()
        }
        else {
            Segmentation::read(bs, params, PTABLE_SEGMENT_LIMITS)?
        };

        // Mapping.
        let ptable_same_map = bs.read_bool()?;

        let filter_map = Mapping::read(bs, &filter_segments, params.max_filters())?;

        let ptable_map = if ptable_same_map {
            let same_counts = (0..params.channels())
                .all(|ch| ptable_segments.num_segments(ch) == filter_segments.num_segments(ch));

            if !same_counts {
                return corrupt_stream(
                    "dst: not same number of segments for filters and probability tables",
                );
            }

            filter_map.clone()
        }
        else {
            Mapping::read(bs, &ptable_segments, params.max_ptables())?
        };

        let mut half_prob = Vec::with_capacity(params.channels());

        for _ in 0..params.channels() {
            half_prob.push(bs.read_bool()?);
        }

        // Filter coefficient sets.
        let mut filters = Vec::with_capacity(filter_map.count);

        for _ in 0..filter_map.count {
            filters.push(read_filter(bs)?);
        }

        // Probability tables.
        let mut ptables = Vec::with_capacity(ptable_map.count);

        for _ in 0..ptable_map.count {
            ptables.push(read_ptable(bs)?);
        }

        trace!(
            "dst: header filters={}, ptables={}, filter_segments={:?}",
            filters.len(),
            ptables.len(),
            filter_segments.lengths
        );

        Ok(FrameHeader {
            filter_segments,
            ptable_segments,
            filter_map,
            ptable_map,
            half_prob,
            filters,
            ptables,
        })
    }

    /// Write the header. If `code_tables` is set, filters and probability tables are written in
    /// their shortest form.
    pub fn write(&self, bw: &mut BitWriter, params: &FrameParams, code_tables: bool) {
        let ptable_same_segs = self.ptable_segments == self.filter_segments;

        bw.write_bit(ptable_same_segs);
        self.filter_segments.write(bw, params, FILTER_SEGMENT_LIMITS);

        if !ptable_same_segs {
            self.ptable_segments.write(bw, params, PTABLE_SEGMENT_LIMITS);
        }

        let ptable_same_map = self.ptable_map == self.filter_map;

        bw.write_bit(ptable_same_map);
        self.filter_map.write(bw);

        if !ptable_same_map {
            self.ptable_map.write(bw);
        }

        for &half_prob in &self.half_prob {
            bw.write_bit(half_prob);
        }

        for coefs in &self.filters {
            write_filter(bw, coefs, code_tables);
        }

        for probs in &self.ptables {
            write_ptable(bw, probs, code_tables);
        }
    }

    /// The number of leading bits of a channel coded with a fixed probability of one half.
    pub fn half_prob_bits(&self, ch: usize) -> usize {
        if self.half_prob[ch] {
            self.filters[self.filter_map.tables[ch][0]].len()
        }
        else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use symphonia_core::io::{BitReaderLtr, FiniteBitStream};

    use super::*;
    use crate::common::SampleRateClass;
    use crate::error::Error;

    fn two_segment_header() -> FrameHeader {
        let filter_segments = Segmentation { resolution: 16, lengths: vec![vec![100], vec![200]] };
        let ptable_segments = Segmentation { resolution: 4, lengths: vec![vec![10, 10], vec![]] };

        FrameHeader {
            filter_segments,
            ptable_segments,
            filter_map: Mapping { tables: vec![vec![0, 1], vec![1, 2]], count: 3 },
            ptable_map: Mapping { tables: vec![vec![0, 1, 0], vec![1]], count: 2 },
            half_prob: vec![true, false],
            filters: vec![vec![3; 20], vec![-100, 50], (0..128).map(|i| i - 64).collect()],
            ptables: vec![vec![128], (1..=64).collect()],
        }
    }

    #[test]
    fn verify_header_round_trip() {
        let params = FrameParams::try_new(2, SampleRateClass::Dsd128).unwrap();
        let header = two_segment_header();

        for code_tables in [false, true] {
            let mut bw = BitWriter::new();
            header.write(&mut bw, &params, code_tables);

            let mut bs = BitReaderLtr::new(bw.as_bytes());
            assert_eq!(FrameHeader::read(&mut bs, &params).unwrap(), header);

            let consumed = 8 * bw.as_bytes().len() - bs.bits_left() as usize;
            assert_eq!(consumed, bw.bit_len());
        }

        assert_eq!(header.half_prob_bits(0), 20);
        assert_eq!(header.half_prob_bits(1), 0);
    }

    #[test]
    fn verify_shared_header_layout() {
        let params = FrameParams::try_new(2, SampleRateClass::Dsd64).unwrap();

        let header = FrameHeader {
            filter_segments: Segmentation::single(2),
            ptable_segments: Segmentation::single(2),
            filter_map: Mapping { tables: vec![vec![0]; 2], count: 1 },
            ptable_map: Mapping { tables: vec![vec![0]; 2], count: 1 },
            half_prob: vec![false, false],
            filters: vec![vec![1]],
            ptables: vec![vec![128]],
        };

        let mut bw = BitWriter::new();
        header.write(&mut bw, &params, true);

        // Segmentation: 1 + 2, mapping: 1 + 1, half probability: 2, filter: 7 + 1 + 9,
        // probability table: 6.
        assert_eq!(bw.bit_len(), 30);

        let mut bs = BitReaderLtr::new(bw.as_bytes());
        assert_eq!(FrameHeader::read(&mut bs, &params).unwrap(), header);
    }

    #[test]
    fn verify_truncated_header() {
        let params = FrameParams::try_new(2, SampleRateClass::Dsd128).unwrap();

        let mut bw = BitWriter::new();
        two_segment_header().write(&mut bw, &params, true);

        let bytes = bw.as_bytes();

        for len in 0..bytes.len() - 1 {
            let mut bs = BitReaderLtr::new(&bytes[..len]);
            assert!(matches!(FrameHeader::read(&mut bs, &params), Err(Error::OutOfData)));
        }
    }
}
