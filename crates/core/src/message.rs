// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC request and response payloads
//!
//! The transport encoding, auth and throttling live in the outer server;
//! these are the decoded payloads the stream control manager consumes and
//! produces.

use crate::broker::BrokerId;
use crate::objects::ObjectId;
use crate::stream::StreamId;
use serde::{Deserialize, Serialize};

/// Error codes reported in responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    #[default]
    None,
    StreamNotExist,
    StreamFenced,
    ObjectNotExist,
    /// Trim target lies past the stream's committed data.
    OffsetNotMatched,
}

/// One stream's slice of a WAL object, as submitted by the committing broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStreamRange {
    pub stream_id: StreamId,
    pub stream_epoch: u64,
    /// Inclusive; must equal the stream's current range end.
    pub start_offset: u64,
    /// Exclusive; must exceed `start_offset`.
    pub end_offset: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStreamRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStreamResponse {
    pub error_code: ErrorCode,
    pub stream_id: StreamId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenStreamRequest {
    pub stream_id: StreamId,
    pub stream_epoch: u64,
    pub broker_id: BrokerId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenStreamResponse {
    pub error_code: ErrorCode,
    /// Inclusive lower bound of data still retained.
    pub start_offset: u64,
    /// Offset the broker should append at next.
    pub next_offset: u64,
}

impl OpenStreamResponse {
    pub fn error(error_code: ErrorCode) -> Self {
        Self {
            error_code,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitWalObjectRequest {
    pub object_id: ObjectId,
    pub broker_id: BrokerId,
    pub object_size: u64,
    pub object_stream_ranges: Vec<ObjectStreamRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitWalObjectResponse {
    pub error_code: ErrorCode,
    /// Streams whose ranges were soft-rejected; the rest of the commit stands.
    pub failed_stream_ids: Vec<StreamId>,
}

impl CommitWalObjectResponse {
    pub fn error(error_code: ErrorCode) -> Self {
        Self {
            error_code,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimStreamRequest {
    pub stream_id: StreamId,
    pub stream_epoch: u64,
    /// New inclusive lower bound of retained data.
    pub new_start_offset: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimStreamResponse {
    pub error_code: ErrorCode,
}

impl TrimStreamResponse {
    pub fn error(error_code: ErrorCode) -> Self {
        Self { error_code }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteStreamRequest {
    pub stream_id: StreamId,
    pub stream_epoch: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteStreamResponse {
    pub error_code: ErrorCode,
}

impl DeleteStreamResponse {
    pub fn error(error_code: ErrorCode) -> Self {
        Self { error_code }
    }
}
