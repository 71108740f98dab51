// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-broker WAL-object index

use crate::objects::ObjectId;
use serde::{Deserialize, Serialize};

/// Unique identifier for a broker.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BrokerId(pub u32);

impl std::fmt::Display for BrokerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for BrokerId {
    fn from(id: u32) -> Self {
        BrokerId(id)
    }
}

/// The WAL objects a broker has committed, in commit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerWALMetadata {
    pub broker_id: BrokerId,
    pub wal_objects: Vec<ObjectId>,
}

impl BrokerWALMetadata {
    pub fn new(broker_id: BrokerId) -> Self {
        Self {
            broker_id,
            wal_objects: Vec::new(),
        }
    }
}
