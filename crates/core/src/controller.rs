// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-threaded controller apply loop
//!
//! Glue between the stream control manager and the metadata log: runs one
//! operation at a time, appends the records it returns, replays them so the
//! effects are visible to the next operation, and snapshots the state on a
//! configurable cadence so the log can truncate (leader change with an
//! uncommitted tail).
//!
//! The log transport and replication live elsewhere; here the log is the
//! in-memory record sequence the rest of the system would persist.

use crate::manager::{ControllerResult, ReplayError, StreamControlManager};
use crate::message::{
    CommitWalObjectRequest, CommitWalObjectResponse, CreateStreamRequest, CreateStreamResponse,
    DeleteStreamRequest, DeleteStreamResponse, OpenStreamRequest, OpenStreamResponse,
    TrimStreamRequest, TrimStreamResponse,
};
use crate::objects::ObjectControl;
use crate::record::MetadataRecord;
use crate::timeline::TimelineError;
use thiserror::Error;

/// Errors from the apply loop. Replay failures are fatal: the caller must
/// stop the controller rather than continue on diverged state.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("replay failed: {0}")]
    Replay(#[from] ReplayError),
    #[error("snapshot bookkeeping failed: {0}")]
    Timeline(#[from] TimelineError),
    #[error("cannot truncate to {target}: log ends at {end}")]
    TruncateBeyondEnd { target: u64, end: u64 },
    #[error("no snapshot at or below offset {0}")]
    NoSnapshotAvailable(u64),
}

/// Configuration for the apply loop.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Take a state snapshot after this many applied records.
    pub snapshot_every: u64,
    /// Snapshots retained behind the latest; older ones are released and
    /// stop being rewind targets.
    pub retain_snapshots: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            snapshot_every: 1000,
            retain_snapshots: 2,
        }
    }
}

/// Serialized apply loop over a [`StreamControlManager`] and its metadata
/// log.
#[derive(Debug)]
pub struct MetadataController<O> {
    config: ControllerConfig,
    manager: StreamControlManager,
    objects: O,
    log: Vec<MetadataRecord>,
    records_since_snapshot: u64,
}

impl<O: ObjectControl> MetadataController<O> {
    pub fn new(config: ControllerConfig, objects: O) -> Self {
        let mut manager = StreamControlManager::new();
        // The empty state at offset 0 is always a valid rewind target.
        manager.take_snapshot();
        Self {
            config,
            manager,
            objects,
            log: Vec::new(),
            records_since_snapshot: 0,
        }
    }

    pub fn manager(&self) -> &StreamControlManager {
        &self.manager
    }

    pub fn objects_mut(&mut self) -> &mut O {
        &mut self.objects
    }

    pub fn log(&self) -> &[MetadataRecord] {
        &self.log
    }

    pub fn log_end_offset(&self) -> u64 {
        self.log.len() as u64
    }

    // === Operations ===

    pub fn create_stream(
        &mut self,
        request: &CreateStreamRequest,
    ) -> Result<CreateStreamResponse, ControllerError> {
        let result = self.manager.create_stream(request);
        self.apply(result)
    }

    pub fn open_stream(
        &mut self,
        request: &OpenStreamRequest,
    ) -> Result<OpenStreamResponse, ControllerError> {
        let result = self.manager.open_stream(request);
        self.apply(result)
    }

    pub fn commit_wal_object(
        &mut self,
        request: &CommitWalObjectRequest,
    ) -> Result<CommitWalObjectResponse, ControllerError> {
        let result = self.manager.commit_wal_object(request, &mut self.objects);
        self.apply(result)
    }

    pub fn trim_stream(
        &mut self,
        request: &TrimStreamRequest,
    ) -> Result<TrimStreamResponse, ControllerError> {
        let result = self.manager.trim_stream(request);
        self.apply(result)
    }

    pub fn delete_stream(
        &mut self,
        request: &DeleteStreamRequest,
    ) -> Result<DeleteStreamResponse, ControllerError> {
        let result = self.manager.delete_stream(request);
        self.apply(result)
    }

    /// Append an operation's records to the log and replay them, so the
    /// effects are visible to the next operation.
    fn apply<T>(&mut self, result: ControllerResult<T>) -> Result<T, ControllerError> {
        for record in result.records {
            self.manager.replay(&record)?;
            self.log.push(record);
            self.records_since_snapshot += 1;
        }
        // Snapshots are taken between operations, never mid-batch, so every
        // snapshot offset is a quiescent point.
        if self.records_since_snapshot >= self.config.snapshot_every {
            self.take_snapshot();
        }
        Ok(result.response)
    }

    /// Snapshot now and release snapshots beyond the retention depth.
    pub fn take_snapshot(&mut self) -> u64 {
        let offset = self.manager.take_snapshot();
        self.records_since_snapshot = 0;
        let offsets = self.manager.snapshot_offsets();
        if offsets.len() > self.config.retain_snapshots + 1 {
            let watermark = offsets[offsets.len() - self.config.retain_snapshots - 1];
            self.manager.release_before(watermark);
        }
        tracing::info!(offset, "state snapshot taken");
        offset
    }

    /// Truncate the log at `offset` and rewind state to match: revert to the
    /// nearest snapshot at or below the target, then re-replay the retained
    /// tail.
    pub fn truncate_to(&mut self, offset: u64) -> Result<(), ControllerError> {
        let end = self.log_end_offset();
        if offset > end {
            return Err(ControllerError::TruncateBeyondEnd {
                target: offset,
                end,
            });
        }
        let snapshot = self
            .manager
            .latest_snapshot_at_or_below(offset)
            .ok_or(ControllerError::NoSnapshotAvailable(offset))?;
        self.manager.revert_to(snapshot)?;
        for record in &self.log[snapshot as usize..offset as usize] {
            self.manager.replay(record)?;
        }
        self.log.truncate(offset as usize);
        self.records_since_snapshot = offset - snapshot;
        tracing::info!(offset, from_snapshot = snapshot, "metadata log truncated");
        Ok(())
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
