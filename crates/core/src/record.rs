// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metadata record taxonomy
//!
//! Every state change in the controller is expressed as one of these records,
//! appended to the replicated metadata log and replayed on every controller.
//! The wire tags are fixed for log compatibility; adding a kind without
//! handling it everywhere is a compile error.

use crate::broker::BrokerId;
use crate::message::ObjectStreamRange;
use crate::objects::ObjectId;
use crate::stream::StreamId;
use serde::{Deserialize, Serialize};

/// All record kinds carried by the metadata log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MetadataRecord {
    #[serde(rename = "AssignedStreamIdRecord")]
    AssignedStreamId(AssignedStreamIdRecord),
    #[serde(rename = "S3StreamRecord")]
    S3Stream(S3StreamRecord),
    #[serde(rename = "RemoveS3StreamRecord")]
    RemoveS3Stream(RemoveS3StreamRecord),
    #[serde(rename = "RangeRecord")]
    Range(RangeRecord),
    #[serde(rename = "RemoveRangeRecord")]
    RemoveRange(RemoveRangeRecord),
    #[serde(rename = "BrokerWALMetadataRecord")]
    BrokerWALMetadata(BrokerWALMetadataRecord),
    #[serde(rename = "WALObjectRecord")]
    WALObject(WALObjectRecord),
}

/// Advances the stream ID allocator to `assigned_stream_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedStreamIdRecord {
    pub assigned_stream_id: u64,
}

/// Creates a stream or updates its epoch, current range index and start
/// offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3StreamRecord {
    pub stream_id: StreamId,
    pub epoch: u64,
    pub range_index: i32,
    pub start_offset: u64,
}

/// Deletes a stream and its ranges. The allocator is not rewound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveS3StreamRecord {
    pub stream_id: StreamId,
}

/// Creates or overwrites one range of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRecord {
    pub stream_id: StreamId,
    pub range_index: i32,
    pub epoch: u64,
    pub broker_id: BrokerId,
    pub start_offset: u64,
    pub end_offset: u64,
}

/// Deletes one range of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveRangeRecord {
    pub stream_id: StreamId,
    pub range_index: i32,
}

/// Creates a broker's WAL-object container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerWALMetadataRecord {
    pub broker_id: BrokerId,
}

/// Registers a committed WAL object and advances the end offset of every
/// referenced stream's current range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WALObjectRecord {
    pub object_id: ObjectId,
    pub broker_id: BrokerId,
    pub object_size: u64,
    pub stream_ranges: Vec<ObjectStreamRange>,
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
