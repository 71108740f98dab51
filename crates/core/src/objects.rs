// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared-object collaborator interface
//!
//! The object lifecycle manager (preparation, ref-counting, deletion in the
//! object store) lives outside this crate. The commit planner only needs to
//! confirm that an object id was prepared and collect any metadata records
//! the collaborator wants appended atomically with the WAL commit.

use crate::record::MetadataRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Unique identifier for a shared object in the object store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ObjectId(pub u64);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ObjectId {
    fn from(id: u64) -> Self {
        ObjectId(id)
    }
}

/// Outcome of asking the collaborator to commit an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectCommit {
    /// The object id was never prepared.
    Unknown,
    /// Newly committed; `records` piggyback on the WAL commit batch.
    Committed { records: Vec<MetadataRecord> },
    /// A retry of an already-committed object.
    AlreadyCommitted,
}

/// Narrow, synchronous seam to the object lifecycle manager.
///
/// Implementations must not share mutable state with the stream control
/// manager; they only report outcomes and produce records.
pub trait ObjectControl {
    fn commit_object(&mut self, object_id: ObjectId, object_size: u64) -> ObjectCommit;
}

/// In-memory collaborator for tests and examples.
#[derive(Debug, Default)]
pub struct FakeObjectControl {
    prepared: BTreeSet<ObjectId>,
    committed: BTreeSet<ObjectId>,
    accept_unprepared: bool,
}

impl FakeObjectControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collaborator that treats every object id as prepared.
    pub fn accepting_all() -> Self {
        Self {
            accept_unprepared: true,
            ..Self::default()
        }
    }

    pub fn prepare(&mut self, object_id: ObjectId) {
        self.prepared.insert(object_id);
    }

    pub fn is_committed(&self, object_id: ObjectId) -> bool {
        self.committed.contains(&object_id)
    }
}

impl ObjectControl for FakeObjectControl {
    fn commit_object(&mut self, object_id: ObjectId, _object_size: u64) -> ObjectCommit {
        if self.committed.contains(&object_id) {
            return ObjectCommit::AlreadyCommitted;
        }
        if !self.prepared.remove(&object_id) && !self.accept_unprepared {
            return ObjectCommit::Unknown;
        }
        self.committed.insert(object_id);
        ObjectCommit::Committed {
            records: Vec::new(),
        }
    }
}
