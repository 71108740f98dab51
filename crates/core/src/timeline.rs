// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Offset-versioned collections for controller state
//!
//! Controller state is versioned against the metadata log: every mutation is
//! tagged with the log offset of the record that caused it, and undo deltas
//! are retained so the state can be rewound when the log truncates (leader
//! change with an uncommitted tail). The [`SnapshotRegistry`] tracks which
//! offsets are valid rewind targets.

use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from snapshot bookkeeping
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimelineError {
    #[error("no snapshot at offset {0}")]
    NoSuchSnapshot(u64),
}

/// Tracks the log offsets that in-memory state can be reverted to.
///
/// Offsets are handed in by the apply loop in ascending order. Reverting is
/// only permitted to an offset where a snapshot was taken and that has not
/// been released past.
#[derive(Debug, Default)]
pub struct SnapshotRegistry {
    /// Snapshotted offsets, ascending.
    offsets: Vec<u64>,
}

impl SnapshotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a snapshot at the given log offset. Re-registering the
    /// latest offset is a no-op.
    pub fn snapshot(&mut self, offset: u64) {
        if self.offsets.last() != Some(&offset) {
            self.offsets.push(offset);
        }
    }

    pub fn has_snapshot(&self, offset: u64) -> bool {
        self.offsets.binary_search(&offset).is_ok()
    }

    pub fn latest(&self) -> Option<u64> {
        self.offsets.last().copied()
    }

    /// Latest snapshotted offset at or below `offset`, if any.
    pub fn latest_at_or_below(&self, offset: u64) -> Option<u64> {
        self.offsets.iter().rev().find(|&&o| o <= offset).copied()
    }

    /// Drop bookkeeping for snapshots newer than `offset`, keeping `offset`
    /// itself as a future rewind target.
    pub fn revert_to(&mut self, offset: u64) -> Result<(), TimelineError> {
        if !self.has_snapshot(offset) {
            return Err(TimelineError::NoSuchSnapshot(offset));
        }
        self.offsets.retain(|&o| o <= offset);
        Ok(())
    }

    /// Release snapshots older than `watermark`; they can no longer be
    /// reverted to.
    pub fn release_before(&mut self, watermark: u64) {
        self.offsets.retain(|&o| o >= watermark);
    }

    pub fn snapshot_count(&self) -> usize {
        self.offsets.len()
    }

    /// Snapshotted offsets still available as rewind targets, ascending.
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }
}

/// Undo record for a single map mutation.
#[derive(Debug, Clone)]
struct MapDelta<K, V> {
    offset: u64,
    key: K,
    /// Value before the mutation; `None` means the key was absent.
    prior: Option<V>,
}

/// An ordered map whose mutations are tagged with log offsets and can be
/// rewound.
///
/// Reads always see the head state. `revert_to(offset)` undoes every
/// mutation applied by records at or after `offset`; `release_before`
/// compacts deltas that precede the rewind watermark.
#[derive(Debug, Clone)]
pub struct TimelineMap<K, V> {
    current: BTreeMap<K, V>,
    /// Deltas in application order (ascending offsets).
    deltas: Vec<MapDelta<K, V>>,
}

impl<K, V> Default for TimelineMap<K, V> {
    fn default() -> Self {
        Self {
            current: BTreeMap::new(),
            deltas: Vec::new(),
        }
    }
}

impl<K: Ord + Clone, V: Clone> TimelineMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.current.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.current.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.current.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.current.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.current.values()
    }

    /// Insert or replace `key` as a mutation of the record at `offset`.
    pub fn insert(&mut self, offset: u64, key: K, value: V) {
        let prior = self.current.insert(key.clone(), value);
        self.deltas.push(MapDelta { offset, key, prior });
    }

    /// Remove `key` as a mutation of the record at `offset`.
    pub fn remove(&mut self, offset: u64, key: &K) -> Option<V> {
        let prior = self.current.remove(key)?;
        self.deltas.push(MapDelta {
            offset,
            key: key.clone(),
            prior: Some(prior.clone()),
        });
        Some(prior)
    }

    /// Undo every mutation tagged with an offset `>= offset`, newest first.
    pub fn revert_to(&mut self, offset: u64) {
        let from = self.deltas.partition_point(|d| d.offset < offset);
        for delta in self.deltas.split_off(from).into_iter().rev() {
            match delta.prior {
                Some(value) => self.current.insert(delta.key, value),
                None => self.current.remove(&delta.key),
            };
        }
    }

    /// Compact deltas for mutations before `watermark`; reverting to offsets
    /// below it is no longer possible.
    pub fn release_before(&mut self, watermark: u64) {
        let keep_from = self.deltas.partition_point(|d| d.offset < watermark);
        self.deltas.drain(..keep_from);
    }

    #[cfg(test)]
    pub(crate) fn delta_count(&self) -> usize {
        self.deltas.len()
    }
}

/// A versioned scalar, used for the stream ID allocator.
#[derive(Debug, Clone, Default)]
pub struct TimelineCell<T> {
    current: T,
    /// `(offset, prior value)` in application order.
    deltas: Vec<(u64, T)>,
}

impl<T: Clone> TimelineCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: value,
            deltas: Vec::new(),
        }
    }

    pub fn get(&self) -> &T {
        &self.current
    }

    /// Replace the value as a mutation of the record at `offset`.
    pub fn set(&mut self, offset: u64, value: T) {
        let prior = std::mem::replace(&mut self.current, value);
        self.deltas.push((offset, prior));
    }

    pub fn revert_to(&mut self, offset: u64) {
        let from = self.deltas.partition_point(|(o, _)| *o < offset);
        for (_, prior) in self.deltas.split_off(from).into_iter().rev() {
            self.current = prior;
        }
    }

    pub fn release_before(&mut self, watermark: u64) {
        let keep_from = self.deltas.partition_point(|(o, _)| *o < watermark);
        self.deltas.drain(..keep_from);
    }
}

#[cfg(test)]
#[path = "timeline_tests.rs"]
mod tests;
