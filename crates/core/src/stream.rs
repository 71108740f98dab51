// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream metadata: epochs, ranges, offsets
//!
//! A stream is an append-only logical log whose payload lives out-of-band in
//! shared WAL objects. Ownership of the write end is granted per epoch; each
//! (epoch, broker) ownership window is a range of contiguous offsets.

use crate::broker::BrokerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for a stream, densely allocated by the controller.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct StreamId(pub u64);

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StreamId {
    fn from(id: u64) -> Self {
        StreamId(id)
    }
}

/// Sentinel range index for a stream that has never been opened.
pub const NO_RANGE: i32 = -1;

/// The contiguous offset window written under one (epoch, broker) ownership.
///
/// Only the range at the stream's `current_range_index` may have its
/// `end_offset` advanced; superseded ranges are frozen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeMetadata {
    pub range_index: i32,
    /// The epoch that created this range.
    pub epoch: u64,
    /// The broker that owned the epoch.
    pub broker_id: BrokerId,
    /// Inclusive; equals the previous range's `end_offset`, or 0 for range 0.
    pub start_offset: u64,
    /// Exclusive; advances only under commits from the owning broker.
    pub end_offset: u64,
}

/// Controller-side metadata for one live stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3StreamMetadata {
    pub stream_id: StreamId,
    /// Epoch of the most recent successful open; 0 before any open.
    pub current_epoch: u64,
    /// Index of the currently-writable range; [`NO_RANGE`] before first open.
    pub current_range_index: i32,
    /// Inclusive lower bound of data still retained.
    pub start_offset: u64,
    pub ranges: BTreeMap<i32, RangeMetadata>,
}

impl S3StreamMetadata {
    /// Fresh metadata as created by a `CreateStream` operation.
    pub fn new(stream_id: StreamId) -> Self {
        Self {
            stream_id,
            current_epoch: 0,
            current_range_index: NO_RANGE,
            start_offset: 0,
            ranges: BTreeMap::new(),
        }
    }

    /// The currently-writable range, if the stream has ever been opened.
    pub fn current_range(&self) -> Option<&RangeMetadata> {
        if self.current_range_index < 0 {
            return None;
        }
        self.ranges.get(&self.current_range_index)
    }

    /// Offset the next append would land at: the current range's end, or 0
    /// for a never-opened stream.
    pub fn next_offset(&self) -> u64 {
        self.current_range().map_or(0, |r| r.end_offset)
    }

    pub fn has_been_opened(&self) -> bool {
        self.current_range_index >= 0
    }

    /// Check the per-stream structural invariants: range keys form a
    /// contiguous run ending at `current_range_index`, adjacent ranges abut
    /// with strictly increasing epochs, and the current range carries the
    /// current epoch. Returns a description of the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.current_range_index < 0 {
            if !self.ranges.is_empty() {
                return Err(format!(
                    "stream {} has ranges but no current range index",
                    self.stream_id
                ));
            }
            return Ok(());
        }

        let indexes: Vec<i32> = self.ranges.keys().copied().collect();
        let Some(&first) = indexes.first() else {
            return Err(format!(
                "stream {} claims current range {} but holds none",
                self.stream_id, self.current_range_index
            ));
        };
        let expected: Vec<i32> = (first..=self.current_range_index).collect();
        if indexes != expected {
            return Err(format!(
                "stream {} range indexes {:?} are not contiguous up to {}",
                self.stream_id, indexes, self.current_range_index
            ));
        }

        let mut prev: Option<&RangeMetadata> = None;
        for range in self.ranges.values() {
            if let Some(prev) = prev {
                if range.start_offset != prev.end_offset {
                    return Err(format!(
                        "stream {} range {} starts at {} but range {} ends at {}",
                        self.stream_id,
                        range.range_index,
                        range.start_offset,
                        prev.range_index,
                        prev.end_offset
                    ));
                }
                if range.epoch <= prev.epoch {
                    return Err(format!(
                        "stream {} range {} epoch {} does not exceed range {} epoch {}",
                        self.stream_id, range.range_index, range.epoch, prev.range_index, prev.epoch
                    ));
                }
            }
            prev = Some(range);
        }

        let current = self
            .current_range()
            .ok_or_else(|| format!("stream {} is missing its current range", self.stream_id))?;
        if current.epoch != self.current_epoch {
            return Err(format!(
                "stream {} current range epoch {} != stream epoch {}",
                self.stream_id, current.epoch, self.current_epoch
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
