// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Segmentation and table mapping.
//!
//! Each channel of a frame is split into segments, and every segment is assigned a prediction
//! filter and a probability table. Filters and probability tables are segmented independently,
//! though a frame may signal that both share the same segmentation and mapping.

use symphonia_core::io::ReadBitsLtr;

use crate::bits::{read_bits, BitWriter};
use crate::common::*;
use crate::error::{corrupt_stream, Result};

/// The constraints on a segmentation.
#[derive(Copy, Clone, Debug)]
pub struct SegmentLimits {
    /// The maximum number of segments in a channel, including the final one.
    pub max_segments: usize,
    /// The minimum length of a segment in bits.
    pub min_len: usize,
}

pub const FILTER_SEGMENT_LIMITS: SegmentLimits =
    SegmentLimits { max_segments: MAX_FILTER_SEGMENTS, min_len: MIN_FILTER_SEGMENT_LEN };

pub const PTABLE_SEGMENT_LIMITS: SegmentLimits =
    SegmentLimits { max_segments: MAX_PTABLE_SEGMENTS, min_len: MIN_PTABLE_SEGMENT_LEN };

/// The partitioning of every channel of a frame into segments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segmentation {
    /// The granularity of segment lengths in bytes.
    pub resolution: usize,
    /// For each channel, the lengths of all but the final segment in units of `resolution`
    /// bytes. The final segment runs to the end of the frame.
    pub lengths: Vec<Vec<usize>>,
}

impl Segmentation {
    /// A segmentation with a single segment per channel.
    pub fn single(channels: usize) -> Self {
        Segmentation { resolution: 1, lengths: vec![Vec::new(); channels] }
    }

    pub fn num_segments(&self, ch: usize) -> usize {
        self.lengths[ch].len() + 1
    }

    fn is_same_for_all_channels(&self) -> bool {
        self.lengths.iter().all(|lens| *lens == self.lengths[0])
    }

    /// Read the segmentation of all channels.
    pub fn read<B: ReadBitsLtr>(
        bs: &mut B,
        params: &FrameParams,
        limits: SegmentLimits,
    ) -> Result<Segmentation> {
        let mut reader = SegmentReader::new(params, limits);

        let lengths = if bs.read_bool()? {
            let lengths = reader.read_channel(bs)?;
            vec![lengths; params.channels()]
        }
        else {
            let mut lengths = Vec::with_capacity(params.channels());

            for _ in 0..params.channels() {
                lengths.push(reader.read_channel(bs)?);
            }

            lengths
        };

        Ok(Segmentation { resolution: reader.resolution.unwrap_or(1), lengths })
    }

    /// Write the segmentation of all channels.
    pub fn write(&self, bw: &mut BitWriter, params: &FrameParams, limits: SegmentLimits) {
        let same = self.is_same_for_all_channels();

        bw.write_bit(same);

        let channels = if same { &self.lengths[..1] } else { &self.lengths[..] };

        let max_resolution = params.bytes_per_channel() - limits.min_len / 8;
        let mut resolution_written = false;

        for lengths in channels {
            let mut max_seg_size = max_resolution;

            debug_assert!(lengths.len() < limits.max_segments);

            for &len in lengths {
                // End of channel flag.
                bw.write_bit(false);

                if !resolution_written {
                    bw.write_bits(self.resolution as u32, log2_round_up(max_resolution));
                    resolution_written = true;
                }

                bw.write_bits(len as u32, log2_round_up(max_seg_size / self.resolution));
                max_seg_size -= self.resolution * len;
            }

            bw.write_bit(true);
        }
    }
}

/// State shared across the channels while reading a segmentation.
struct SegmentReader {
    frame_len: usize,
    limits: SegmentLimits,
    resolution: Option<usize>,
}

impl SegmentReader {
    fn new(params: &FrameParams, limits: SegmentLimits) -> Self {
        SegmentReader { frame_len: params.bytes_per_channel(), limits, resolution: None }
    }

    fn read_channel<B: ReadBitsLtr>(&mut self, bs: &mut B) -> Result<Vec<usize>> {
        let max_resolution = self.frame_len - self.limits.min_len / 8;

        let mut lengths = Vec::new();
        let mut max_seg_size = max_resolution;
        let mut defined_bits = 0;

        // Each segment is preceded by a cleared end of channel flag.
        while !bs.read_bool()? {
            if lengths.len() + 1 >= self.limits.max_segments {
                return corrupt_stream("dst: too many segments");
            }

            let resolution = match self.resolution {
                Some(resolution) => resolution,
                None => {
                    let resolution = read_bits(bs, log2_round_up(max_resolution))? as usize;

                    if resolution == 0 || resolution > max_resolution {
                        return corrupt_stream("dst: invalid segment resolution");
                    }

                    self.resolution = Some(resolution);
                    resolution
                }
            };

            let len = read_bits(bs, log2_round_up(max_seg_size / resolution))? as usize;
            let len_bits = 8 * resolution * len;

            if len_bits < self.limits.min_len
                || len_bits + defined_bits + self.limits.min_len > 8 * self.frame_len
            {
                return corrupt_stream("dst: invalid segment length");
            }

            defined_bits += len_bits;
            max_seg_size -= resolution * len;

            lengths.push(len);
        }

        Ok(lengths)
    }
}

/// The assignment of a table to every segment of every channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mapping {
    /// For each channel, the table index of every segment.
    pub tables: Vec<Vec<usize>>,
    /// The number of distinct tables.
    pub count: usize,
}

impl Mapping {
    /// Read the mapping for the segments of `segs`.
    pub fn read<B: ReadBitsLtr>(
        bs: &mut B,
        segs: &Segmentation,
        max_tables: usize,
    ) -> Result<Mapping> {
        let channels = segs.lengths.len();

        let mut count = 1;

        let mut read_index = |bs: &mut B| -> Result<usize> {
            let index = read_bits(bs, log2_round_up(count))? as usize;

            if index == count {
                count += 1;
            }
            else if index > count {
                return corrupt_stream("dst: invalid table number for segment");
            }

            Ok(index)
        };

        let tables = if bs.read_bool()? {
            let mut first = vec![0];

            for _ in 1..segs.num_segments(0) {
                first.push(read_index(bs)?);
            }

            if (1..channels).any(|ch| segs.num_segments(ch) != first.len()) {
                return corrupt_stream("dst: mapping can't be the same for all channels");
            }

            vec![first; channels]
        }
        else {
            let mut tables = Vec::with_capacity(channels);

            for ch in 0..channels {
                let mut indices = Vec::with_capacity(segs.num_segments(ch));

                for seg in 0..segs.num_segments(ch) {
                    if ch == 0 && seg == 0 {
                        indices.push(0);
                    }
                    else {
                        indices.push(read_index(bs)?);
                    }
                }

                tables.push(indices);
            }

            tables
        };

        if count > max_tables {
            return corrupt_stream("dst: too many tables");
        }

        Ok(Mapping { tables, count })
    }

    /// Write the mapping. Table indices must be introduced in increasing order.
    pub fn write(&self, bw: &mut BitWriter) {
        let same = self.tables.iter().all(|tables| *tables == self.tables[0]);

        bw.write_bit(same);

        let mut count = 1;

        let channels = if same { &self.tables[..1] } else { &self.tables[..] };

        for (ch, tables) in channels.iter().enumerate() {
            for (seg, &index) in tables.iter().enumerate() {
                if ch == 0 && seg == 0 {
                    debug_assert_eq!(index, 0);
                    continue;
                }

                debug_assert!(index <= count);

                bw.write_bits(index as u32, log2_round_up(count));

                if index == count {
                    count += 1;
                }
            }
        }

        debug_assert_eq!(count, self.count);
    }
}

/// Yields the table used for each bit of one channel, for non-decreasing bit positions.
pub struct TableSelector {
    /// The exclusive end bit and table index of every segment.
    spans: Vec<(usize, usize)>,
    pos: usize,
}

impl TableSelector {
    pub fn new(segs: &Segmentation, map: &Mapping, ch: usize) -> Self {
        let unit = 8 * segs.resolution;

        let mut end = 0;
        let mut spans = Vec::with_capacity(segs.num_segments(ch));

        for (&len, &table) in segs.lengths[ch].iter().zip(&map.tables[ch]) {
            end += unit * len;
            spans.push((end, table));
        }

        spans.push((usize::MAX, map.tables[ch][segs.lengths[ch].len()]));

        TableSelector { spans, pos: 0 }
    }

    #[inline(always)]
    pub fn table_at(&mut self, bit: usize) -> usize {
        while bit >= self.spans[self.pos].0 {
            self.pos += 1;
        }
        self.spans[self.pos].1
    }
}

#[cfg(test)]
mod tests {
    use symphonia_core::io::{BitReaderLtr, FiniteBitStream};

    use super::*;
    use crate::error::Error;

    fn params(channels: usize) -> FrameParams {
        FrameParams::try_new(channels, SampleRateClass::Dsd64).unwrap()
    }

    #[test]
    fn verify_single_segment_layout() {
        let params = params(2);
        let segs = Segmentation::single(2);

        let mut bw = BitWriter::new();
        segs.write(&mut bw, &params, FILTER_SEGMENT_LIMITS);

        // Same for all channels, end of channel.
        assert_eq!(bw.bit_len(), 2);
        assert_eq!(bw.as_bytes(), &[0xc0]);

        let mut bs = BitReaderLtr::new(bw.as_bytes());
        assert_eq!(Segmentation::read(&mut bs, &params, FILTER_SEGMENT_LIMITS).unwrap(), segs);
    }

    #[test]
    fn verify_shared_segmentation() {
        let params = params(3);

        let segs = Segmentation { resolution: 8, lengths: vec![vec![100, 200]; 3] };

        let mut bw = BitWriter::new();
        segs.write(&mut bw, &params, FILTER_SEGMENT_LIMITS);

        // 1 + (1 + 13 + 10) + (1 + 9) + 1
        assert_eq!(bw.bit_len(), 36);

        let mut bs = BitReaderLtr::new(bw.as_bytes());
        let read = Segmentation::read(&mut bs, &params, FILTER_SEGMENT_LIMITS).unwrap();

        assert_eq!(read, segs);
        assert_eq!(read.num_segments(2), 3);
    }

    #[test]
    fn verify_per_channel_segmentation() {
        let params = params(2);

        let segs = Segmentation { resolution: 4, lengths: vec![vec![], vec![300, 100, 50]] };

        let mut bw = BitWriter::new();
        segs.write(&mut bw, &params, PTABLE_SEGMENT_LIMITS);

        let mut bs = BitReaderLtr::new(bw.as_bytes());
        let read = Segmentation::read(&mut bs, &params, PTABLE_SEGMENT_LIMITS).unwrap();

        assert_eq!(read, segs);
        assert_eq!(bs.bits_left() as usize, 8 * bw.as_bytes().len() - bw.bit_len());
    }

    #[test]
    fn verify_segment_length_limits() {
        let params = params(1);

        // A segment shorter than the minimum filter segment length.
        let mut bw = BitWriter::new();
        bw.write_bit(true);
        bw.write_bit(false);
        bw.write_bits(1, 13);
        bw.write_bits(127, 13);
        bw.write_bit(true);

        let mut bs = BitReaderLtr::new(bw.as_bytes());
        match Segmentation::read(&mut bs, &params, FILTER_SEGMENT_LIMITS) {
            Err(Error::CorruptStream("dst: invalid segment length")) => (),
            other => panic!("unexpected result {:?}", other),
        }

        // A zero resolution.
        let mut bw = BitWriter::new();
        bw.write_bit(true);
        bw.write_bit(false);
        bw.write_bits(0, 13);
        bw.write_run(false, 16);

        let mut bs = BitReaderLtr::new(bw.as_bytes());
        match Segmentation::read(&mut bs, &params, FILTER_SEGMENT_LIMITS) {
            Err(Error::CorruptStream("dst: invalid segment resolution")) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn verify_too_many_segments() {
        let params = params(1);

        // Four segments of 1024 bits followed by a final segment.
        let mut bw = BitWriter::new();
        bw.write_bit(true);

        let mut max_seg_size = params.bytes_per_channel() - 128;

        for i in 0..4 {
            bw.write_bit(false);
            if i == 0 {
                bw.write_bits(128, log2_round_up(max_seg_size));
            }
            bw.write_bits(1, log2_round_up(max_seg_size / 128));
            max_seg_size -= 128;
        }
        bw.write_bit(true);

        let mut bs = BitReaderLtr::new(bw.as_bytes());
        assert!(Segmentation::read(&mut bs, &params, PTABLE_SEGMENT_LIMITS).is_ok());

        let mut bs = BitReaderLtr::new(bw.as_bytes());
        match Segmentation::read(&mut bs, &params, FILTER_SEGMENT_LIMITS) {
            Err(Error::CorruptStream("dst: too many segments")) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn verify_mapping_round_trip() {
        let segs = Segmentation { resolution: 8, lengths: vec![vec![100], vec![], vec![50, 50]] };

        let map = Mapping { tables: vec![vec![0, 1], vec![1], vec![2, 0, 3]], count: 4 };

        let mut bw = BitWriter::new();
        map.write(&mut bw);

        // Same flag + 1 + 2 + 2 + 2 + 2 bits.
        assert_eq!(bw.bit_len(), 10);

        let mut bs = BitReaderLtr::new(bw.as_bytes());
        assert_eq!(Mapping::read(&mut bs, &segs, 6).unwrap(), map);

        let mut bs = BitReaderLtr::new(bw.as_bytes());
        match Mapping::read(&mut bs, &segs, 3) {
            Err(Error::CorruptStream("dst: too many tables")) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn verify_shared_mapping() {
        let segs = Segmentation { resolution: 8, lengths: vec![vec![100, 10]; 2] };
        let map = Mapping { tables: vec![vec![0, 1, 0]; 2], count: 2 };

        let mut bw = BitWriter::new();
        map.write(&mut bw);

        // Same flag + 1 + 2 bits.
        assert_eq!(bw.bit_len(), 4);

        let mut bs = BitReaderLtr::new(bw.as_bytes());
        assert_eq!(Mapping::read(&mut bs, &segs, 4).unwrap(), map);

        // Sharing a mapping requires every channel to have the same number of segments.
        let segs = Segmentation { resolution: 8, lengths: vec![vec![100, 10], vec![100]] };

        let mut bs = BitReaderLtr::new(bw.as_bytes());
        assert!(matches!(Mapping::read(&mut bs, &segs, 4), Err(Error::CorruptStream(_))));
    }

    #[test]
    fn verify_table_gap_is_rejected() {
        let segs = Segmentation { resolution: 8, lengths: vec![vec![100, 100]] };

        // Not shared, segment 1 uses table 1, segment 2 uses table 3.
        let mut bw = BitWriter::new();
        bw.write_bit(false);
        bw.write_bits(1, 1);
        bw.write_bits(3, 2);

        let mut bs = BitReaderLtr::new(bw.as_bytes());
        match Mapping::read(&mut bs, &segs, 4) {
            Err(Error::CorruptStream("dst: invalid table number for segment")) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn verify_table_selector() {
        let segs = Segmentation { resolution: 2, lengths: vec![vec![100, 64]] };
        let map = Mapping { tables: vec![vec![0, 1, 0]], count: 2 };

        let mut sel = TableSelector::new(&segs, &map, 0);

        assert_eq!(sel.table_at(0), 0);
        assert_eq!(sel.table_at(1599), 0);
        assert_eq!(sel.table_at(1600), 1);
        assert_eq!(sel.table_at(2623), 1);
        assert_eq!(sel.table_at(2624), 0);
        assert_eq!(sel.table_at(37_631), 0);
    }
}
