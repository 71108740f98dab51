// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream control manager
//!
//! Owns the authoritative metadata for streams, ranges and broker WAL-object
//! indexes. Operations never mutate state directly: each computes a response
//! plus an ordered list of metadata records ([`ControllerResult`]), and the
//! caller feeds the records back through [`StreamControlManager::replay`]
//! once they are durable in the metadata log. Replay is the sole mutator, so
//! rebuilding from the log reproduces the live state exactly.

use crate::broker::{BrokerId, BrokerWALMetadata};
use crate::message::{
    CommitWalObjectRequest, CommitWalObjectResponse, CreateStreamRequest, CreateStreamResponse,
    DeleteStreamRequest, DeleteStreamResponse, ErrorCode, ObjectStreamRange, OpenStreamRequest,
    OpenStreamResponse, TrimStreamRequest, TrimStreamResponse,
};
use crate::objects::{ObjectCommit, ObjectControl};
use crate::record::{
    AssignedStreamIdRecord, BrokerWALMetadataRecord, MetadataRecord, RangeRecord,
    RemoveRangeRecord, RemoveS3StreamRecord, S3StreamRecord, WALObjectRecord,
};
use crate::stream::{RangeMetadata, S3StreamMetadata, StreamId, NO_RANGE};
use crate::timeline::{SnapshotRegistry, TimelineCell, TimelineError, TimelineMap};
use thiserror::Error;

/// Response plus the ordered records that make it durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerResult<T> {
    pub response: T,
    pub records: Vec<MetadataRecord>,
}

impl<T> ControllerResult<T> {
    pub fn of(records: Vec<MetadataRecord>, response: T) -> Self {
        Self { response, records }
    }

    /// A result that changes nothing: rejected or idempotent operations.
    pub fn response_only(response: T) -> Self {
        Self {
            response,
            records: Vec::new(),
        }
    }
}

/// A record that cannot be applied. The metadata log is trusted, so this
/// means a bug or log corruption; the controller must stop rather than let
/// replicas diverge.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplayError {
    #[error("record references unknown stream {0}")]
    UnknownStream(StreamId),
    #[error("stream {0} has no writable range")]
    NoCurrentRange(StreamId),
    #[error("stream {stream_id} has no range {range_index}")]
    UnknownRange {
        stream_id: StreamId,
        range_index: i32,
    },
}

/// The controller-side state machine for stream metadata.
///
/// State lives in timeline collections versioned by metadata log offset, so
/// the controller can snapshot and rewind across log truncation.
#[derive(Debug, Default)]
pub struct StreamControlManager {
    registry: SnapshotRegistry,
    next_assigned_stream_id: TimelineCell<u64>,
    streams: TimelineMap<StreamId, S3StreamMetadata>,
    brokers: TimelineMap<BrokerId, BrokerWALMetadata>,
    /// Log offset the next replayed record will be tagged with.
    next_offset: u64,
}

impl StreamControlManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next `create_stream` will assign.
    pub fn next_assigned_stream_id(&self) -> u64 {
        *self.next_assigned_stream_id.get()
    }

    pub fn streams_metadata(&self) -> &TimelineMap<StreamId, S3StreamMetadata> {
        &self.streams
    }

    pub fn brokers_metadata(&self) -> &TimelineMap<BrokerId, BrokerWALMetadata> {
        &self.brokers
    }

    /// Number of records applied so far; equals the log offset of the next
    /// record.
    pub fn applied_offset(&self) -> u64 {
        self.next_offset
    }

    // === Operations ===

    /// Allocate a stream id and lay down its initial metadata. Cannot fail.
    pub fn create_stream(
        &self,
        _request: &CreateStreamRequest,
    ) -> ControllerResult<CreateStreamResponse> {
        let stream_id = StreamId(self.next_assigned_stream_id());
        tracing::debug!(stream_id = %stream_id, "assigning stream id");
        let records = vec![
            MetadataRecord::AssignedStreamId(AssignedStreamIdRecord {
                assigned_stream_id: stream_id.0 + 1,
            }),
            MetadataRecord::S3Stream(S3StreamRecord {
                stream_id,
                epoch: 0,
                range_index: NO_RANGE,
                start_offset: 0,
            }),
        ];
        ControllerResult::of(
            records,
            CreateStreamResponse {
                error_code: ErrorCode::None,
                stream_id,
            },
        )
    }

    /// Grant or confirm write ownership of a stream at the given epoch.
    ///
    /// A strictly greater epoch (or the first open of a fresh stream) rolls a
    /// new range; a matching epoch from the current owner is an idempotent
    /// lookup; everything else is fenced.
    pub fn open_stream(&self, request: &OpenStreamRequest) -> ControllerResult<OpenStreamResponse> {
        let Some(stream) = self.streams.get(&request.stream_id) else {
            return ControllerResult::response_only(OpenStreamResponse::error(
                ErrorCode::StreamNotExist,
            ));
        };

        if request.stream_epoch < stream.current_epoch {
            tracing::warn!(
                stream_id = %request.stream_id,
                broker_id = %request.broker_id,
                stream_epoch = request.stream_epoch,
                current_epoch = stream.current_epoch,
                "open fenced by stale epoch"
            );
            return ControllerResult::response_only(OpenStreamResponse::error(
                ErrorCode::StreamFenced,
            ));
        }

        if request.stream_epoch == stream.current_epoch {
            if let Some(current) = stream.current_range() {
                if current.broker_id == request.broker_id {
                    // Current owner retrying: pure lookup, nothing to log.
                    return ControllerResult::response_only(OpenStreamResponse {
                        error_code: ErrorCode::None,
                        start_offset: stream.start_offset,
                        next_offset: current.end_offset,
                    });
                }
                tracing::warn!(
                    stream_id = %request.stream_id,
                    broker_id = %request.broker_id,
                    owner = %current.broker_id,
                    "open fenced: epoch already owned by another broker"
                );
                return ControllerResult::response_only(OpenStreamResponse::error(
                    ErrorCode::StreamFenced,
                ));
            }
            // Freshly created stream: fall through to the first-time open.
        }

        let new_range_index = stream.current_range_index + 1;
        let prev_end = stream.next_offset();
        tracing::debug!(
            stream_id = %request.stream_id,
            broker_id = %request.broker_id,
            epoch = request.stream_epoch,
            range_index = new_range_index,
            "opening stream with a new range"
        );
        let records = vec![
            MetadataRecord::S3Stream(S3StreamRecord {
                stream_id: request.stream_id,
                epoch: request.stream_epoch,
                range_index: new_range_index,
                start_offset: stream.start_offset,
            }),
            MetadataRecord::Range(RangeRecord {
                stream_id: request.stream_id,
                range_index: new_range_index,
                epoch: request.stream_epoch,
                broker_id: request.broker_id,
                start_offset: prev_end,
                end_offset: prev_end,
            }),
        ];
        ControllerResult::of(
            records,
            OpenStreamResponse {
                error_code: ErrorCode::None,
                start_offset: stream.start_offset,
                next_offset: prev_end,
            },
        )
    }

    /// Record a committed WAL object spanning one or more streams.
    ///
    /// The commit is per-stream atomic but cross-stream best-effort: ranges
    /// that fail validation are soft-rejected into `failed_stream_ids` while
    /// the rest of the object is still recorded.
    pub fn commit_wal_object(
        &self,
        request: &CommitWalObjectRequest,
        objects: &mut impl ObjectControl,
    ) -> ControllerResult<CommitWalObjectResponse> {
        let (piggyback, newly_committed) =
            match objects.commit_object(request.object_id, request.object_size) {
                ObjectCommit::Unknown => {
                    tracing::warn!(
                        object_id = %request.object_id,
                        broker_id = %request.broker_id,
                        "commit of unprepared object"
                    );
                    return ControllerResult::response_only(CommitWalObjectResponse::error(
                        ErrorCode::ObjectNotExist,
                    ));
                }
                ObjectCommit::Committed { records } => (records, true),
                ObjectCommit::AlreadyCommitted => (Vec::new(), false),
            };

        let mut failed_stream_ids = Vec::new();
        let mut surviving = Vec::new();
        for range in &request.object_stream_ranges {
            match self.validate_commit_range(request.broker_id, range) {
                Ok(()) => surviving.push(range.clone()),
                Err(reason) => {
                    tracing::warn!(
                        stream_id = %range.stream_id,
                        broker_id = %request.broker_id,
                        reason,
                        "soft-rejecting stream range"
                    );
                    failed_stream_ids.push(range.stream_id);
                }
            }
        }

        let mut records = Vec::new();
        if !surviving.is_empty() {
            if !self.brokers.contains_key(&request.broker_id) {
                records.push(MetadataRecord::BrokerWALMetadata(BrokerWALMetadataRecord {
                    broker_id: request.broker_id,
                }));
            }
            tracing::debug!(
                object_id = %request.object_id,
                broker_id = %request.broker_id,
                committed = surviving.len(),
                rejected = failed_stream_ids.len(),
                newly_committed,
                "recording wal object commit"
            );
            if newly_committed {
                records.push(MetadataRecord::WALObject(WALObjectRecord {
                    object_id: request.object_id,
                    broker_id: request.broker_id,
                    object_size: request.object_size,
                    stream_ranges: surviving,
                }));
            }
            records.extend(piggyback);
        }

        ControllerResult::of(
            records,
            CommitWalObjectResponse {
                error_code: ErrorCode::None,
                failed_stream_ids,
            },
        )
    }

    fn validate_commit_range(
        &self,
        broker_id: BrokerId,
        range: &ObjectStreamRange,
    ) -> Result<(), &'static str> {
        let stream = self
            .streams
            .get(&range.stream_id)
            .ok_or("stream does not exist")?;
        let current = stream
            .current_range()
            .ok_or("stream has never been opened")?;
        if range.stream_epoch != stream.current_epoch {
            return Err("stream epoch does not match");
        }
        if current.broker_id != broker_id {
            return Err("current range is owned by another broker");
        }
        if range.start_offset != current.end_offset {
            return Err("start offset is not contiguous with committed data");
        }
        if range.end_offset <= range.start_offset {
            return Err("range is empty or inverted");
        }
        Ok(())
    }

    /// Advance a stream's retained lower bound, deleting fully-trimmed
    /// ranges.
    pub fn trim_stream(&self, request: &TrimStreamRequest) -> ControllerResult<TrimStreamResponse> {
        let Some(stream) = self.streams.get(&request.stream_id) else {
            return ControllerResult::response_only(TrimStreamResponse::error(
                ErrorCode::StreamNotExist,
            ));
        };
        if request.stream_epoch != stream.current_epoch {
            tracing::warn!(
                stream_id = %request.stream_id,
                stream_epoch = request.stream_epoch,
                current_epoch = stream.current_epoch,
                "trim fenced by epoch mismatch"
            );
            return ControllerResult::response_only(TrimStreamResponse::error(
                ErrorCode::StreamFenced,
            ));
        }
        let Some(current) = stream.current_range() else {
            // Never opened: nothing has been committed, nothing to trim.
            return ControllerResult::response_only(TrimStreamResponse::error(
                ErrorCode::StreamFenced,
            ));
        };
        if request.new_start_offset > current.end_offset {
            return ControllerResult::response_only(TrimStreamResponse::error(
                ErrorCode::OffsetNotMatched,
            ));
        }
        if request.new_start_offset <= stream.start_offset {
            // Already trimmed at least this far.
            return ControllerResult::response_only(TrimStreamResponse::default());
        }

        let mut records = vec![MetadataRecord::S3Stream(S3StreamRecord {
            stream_id: request.stream_id,
            epoch: stream.current_epoch,
            range_index: stream.current_range_index,
            start_offset: request.new_start_offset,
        })];
        for range in stream.ranges.values() {
            if range.range_index != stream.current_range_index
                && range.end_offset <= request.new_start_offset
            {
                records.push(MetadataRecord::RemoveRange(RemoveRangeRecord {
                    stream_id: request.stream_id,
                    range_index: range.range_index,
                }));
            }
        }
        tracing::debug!(
            stream_id = %request.stream_id,
            new_start_offset = request.new_start_offset,
            removed_ranges = records.len() - 1,
            "trimming stream"
        );
        ControllerResult::of(records, TrimStreamResponse::default())
    }

    /// Delete a stream outright. The id allocator is not rewound.
    pub fn delete_stream(
        &self,
        request: &DeleteStreamRequest,
    ) -> ControllerResult<DeleteStreamResponse> {
        let Some(stream) = self.streams.get(&request.stream_id) else {
            return ControllerResult::response_only(DeleteStreamResponse::error(
                ErrorCode::StreamNotExist,
            ));
        };
        if request.stream_epoch != stream.current_epoch {
            tracing::warn!(
                stream_id = %request.stream_id,
                stream_epoch = request.stream_epoch,
                current_epoch = stream.current_epoch,
                "delete fenced by epoch mismatch"
            );
            return ControllerResult::response_only(DeleteStreamResponse::error(
                ErrorCode::StreamFenced,
            ));
        }
        tracing::debug!(
            stream_id = %request.stream_id,
            epoch = request.stream_epoch,
            "deleting stream"
        );
        ControllerResult::of(
            vec![MetadataRecord::RemoveS3Stream(RemoveS3StreamRecord {
                stream_id: request.stream_id,
            })],
            DeleteStreamResponse::default(),
        )
    }

    // === Replay ===

    /// Apply one record from the metadata log. The sole mutator of state.
    pub fn replay(&mut self, record: &MetadataRecord) -> Result<(), ReplayError> {
        let offset = self.next_offset;
        match record {
            MetadataRecord::AssignedStreamId(r) => {
                self.next_assigned_stream_id
                    .set(offset, r.assigned_stream_id);
            }
            MetadataRecord::S3Stream(r) => {
                let mut stream = self
                    .streams
                    .get(&r.stream_id)
                    .cloned()
                    .unwrap_or_else(|| S3StreamMetadata::new(r.stream_id));
                stream.current_epoch = r.epoch;
                stream.current_range_index = r.range_index;
                stream.start_offset = r.start_offset;
                self.streams.insert(offset, r.stream_id, stream);
            }
            MetadataRecord::RemoveS3Stream(r) => {
                self.streams
                    .remove(offset, &r.stream_id)
                    .ok_or(ReplayError::UnknownStream(r.stream_id))?;
            }
            MetadataRecord::Range(r) => {
                let mut stream = self
                    .streams
                    .get(&r.stream_id)
                    .cloned()
                    .ok_or(ReplayError::UnknownStream(r.stream_id))?;
                stream.ranges.insert(
                    r.range_index,
                    RangeMetadata {
                        range_index: r.range_index,
                        epoch: r.epoch,
                        broker_id: r.broker_id,
                        start_offset: r.start_offset,
                        end_offset: r.end_offset,
                    },
                );
                self.streams.insert(offset, r.stream_id, stream);
            }
            MetadataRecord::RemoveRange(r) => {
                let mut stream = self
                    .streams
                    .get(&r.stream_id)
                    .cloned()
                    .ok_or(ReplayError::UnknownStream(r.stream_id))?;
                stream
                    .ranges
                    .remove(&r.range_index)
                    .ok_or(ReplayError::UnknownRange {
                        stream_id: r.stream_id,
                        range_index: r.range_index,
                    })?;
                self.streams.insert(offset, r.stream_id, stream);
            }
            MetadataRecord::BrokerWALMetadata(r) => {
                if !self.brokers.contains_key(&r.broker_id) {
                    self.brokers
                        .insert(offset, r.broker_id, BrokerWALMetadata::new(r.broker_id));
                }
            }
            MetadataRecord::WALObject(r) => {
                // Validate every touched stream before mutating anything, so
                // a bad record cannot leave a half-applied commit behind.
                let mut updated = Vec::with_capacity(r.stream_ranges.len());
                for stream_range in &r.stream_ranges {
                    let mut stream = self
                        .streams
                        .get(&stream_range.stream_id)
                        .cloned()
                        .ok_or(ReplayError::UnknownStream(stream_range.stream_id))?;
                    let index = stream.current_range_index;
                    let range = stream
                        .ranges
                        .get_mut(&index)
                        .ok_or(ReplayError::NoCurrentRange(stream_range.stream_id))?;
                    range.end_offset = stream_range.end_offset;
                    updated.push((stream_range.stream_id, stream));
                }

                let mut broker = self
                    .brokers
                    .get(&r.broker_id)
                    .cloned()
                    .unwrap_or_else(|| BrokerWALMetadata::new(r.broker_id));
                broker.wal_objects.push(r.object_id);
                self.brokers.insert(offset, r.broker_id, broker);
                for (stream_id, stream) in updated {
                    self.streams.insert(offset, stream_id, stream);
                }
            }
        }
        self.next_offset = offset + 1;
        Ok(())
    }

    // === Snapshots ===

    /// Snapshot the state at the current log offset and return that offset.
    pub fn take_snapshot(&mut self) -> u64 {
        self.registry.snapshot(self.next_offset);
        self.next_offset
    }

    pub fn snapshot_offsets(&self) -> &[u64] {
        self.registry.offsets()
    }

    pub fn latest_snapshot_at_or_below(&self, offset: u64) -> Option<u64> {
        self.registry.latest_at_or_below(offset)
    }

    /// Rewind state to a previously snapshotted offset.
    pub fn revert_to(&mut self, offset: u64) -> Result<(), TimelineError> {
        self.registry.revert_to(offset)?;
        self.next_assigned_stream_id.revert_to(offset);
        self.streams.revert_to(offset);
        self.brokers.revert_to(offset);
        self.next_offset = offset;
        Ok(())
    }

    /// Give up the ability to rewind below `watermark`, releasing older
    /// snapshots and compacting their undo deltas.
    pub fn release_before(&mut self, watermark: u64) {
        self.registry.release_before(watermark);
        self.next_assigned_stream_id.release_before(watermark);
        self.streams.release_before(watermark);
        self.brokers.release_before(watermark);
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
