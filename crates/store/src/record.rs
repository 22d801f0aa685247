//! Projection records and the partial updates that build them.
//!
//! Every update is idempotent on its own: descriptive fields are only ever
//! overwritten with a value taken from an event, and terminal flags are only
//! ever set, never cleared. Applying the same update twice leaves a record
//! unchanged.

use common::{ObjectId, SurrogateId};
use serde::{Deserialize, Serialize};

/// Current state of a lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedRecord {
    pub id: SurrogateId,
    pub object_id: ObjectId,
    pub key_id: Option<String>,
    pub creator: Option<String>,
    pub item_id: Option<String>,
    pub deleted: bool,
}

/// Current state of an escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowRecord {
    pub id: SurrogateId,
    pub object_id: ObjectId,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub key_id: Option<String>,
    pub item_id: Option<String>,
    pub swapped: bool,
    pub cancelled: bool,
}

fn overwrite(target: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = value {
        *target = Some(v.clone());
    }
}

/// A partial change to one [`LockedRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedUpdate {
    pub object_id: ObjectId,
    pub key_id: Option<String>,
    pub creator: Option<String>,
    pub item_id: Option<String>,
    /// When true, marks the lock as deleted.
    pub deleted: bool,
}

impl LockedUpdate {
    /// Creates an empty update for an object.
    pub fn new(object_id: ObjectId) -> Self {
        Self {
            object_id,
            key_id: None,
            creator: None,
            item_id: None,
            deleted: false,
        }
    }

    /// Folds a later update for the same object into this one.
    pub fn merge(&mut self, later: &LockedUpdate) {
        overwrite(&mut self.key_id, &later.key_id);
        overwrite(&mut self.creator, &later.creator);
        overwrite(&mut self.item_id, &later.item_id);
        self.deleted |= later.deleted;
    }

    /// Applies this update to an existing record.
    pub fn apply(&self, record: &mut LockedRecord) {
        overwrite(&mut record.key_id, &self.key_id);
        overwrite(&mut record.creator, &self.creator);
        overwrite(&mut record.item_id, &self.item_id);
        record.deleted |= self.deleted;
    }

    /// Builds a new record from this update.
    pub fn into_record(self, id: SurrogateId) -> LockedRecord {
        LockedRecord {
            id,
            object_id: self.object_id,
            key_id: self.key_id,
            creator: self.creator,
            item_id: self.item_id,
            deleted: self.deleted,
        }
    }
}

/// A partial change to one [`EscrowRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowUpdate {
    pub object_id: ObjectId,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub key_id: Option<String>,
    pub item_id: Option<String>,
    /// When true, marks the escrow as swapped.
    pub swapped: bool,
    /// When true, marks the escrow as cancelled.
    pub cancelled: bool,
}

impl EscrowUpdate {
    /// Creates an empty update for an object.
    pub fn new(object_id: ObjectId) -> Self {
        Self {
            object_id,
            sender: None,
            recipient: None,
            key_id: None,
            item_id: None,
            swapped: false,
            cancelled: false,
        }
    }

    /// Folds a later update for the same object into this one.
    pub fn merge(&mut self, later: &EscrowUpdate) {
        overwrite(&mut self.sender, &later.sender);
        overwrite(&mut self.recipient, &later.recipient);
        overwrite(&mut self.key_id, &later.key_id);
        overwrite(&mut self.item_id, &later.item_id);
        self.swapped |= later.swapped;
        self.cancelled |= later.cancelled;
    }

    /// Applies this update to an existing record.
    pub fn apply(&self, record: &mut EscrowRecord) {
        overwrite(&mut record.sender, &self.sender);
        overwrite(&mut record.recipient, &self.recipient);
        overwrite(&mut record.key_id, &self.key_id);
        overwrite(&mut record.item_id, &self.item_id);
        record.swapped |= self.swapped;
        record.cancelled |= self.cancelled;
    }

    /// Builds a new record from this update.
    pub fn into_record(self, id: SurrogateId) -> EscrowRecord {
        EscrowRecord {
            id,
            object_id: self.object_id,
            sender: self.sender,
            recipient: self.recipient,
            key_id: self.key_id,
            item_id: self.item_id,
            swapped: self.swapped,
            cancelled: self.cancelled,
        }
    }
}
