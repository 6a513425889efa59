//! Persistent storage for run artifacts.
//!
//! Provides a `Storage` trait and a sled-backed implementation for
//! persisting accepted events and a final run snapshot, so a simulation's
//! outcome can be reopened and audited offline.

use serde::{Deserialize, Serialize};

use crate::event::{Event, EventId};
use crate::ledger::Ledger;
use crate::Hash;

/// Errors from storage operations.
#[derive(Clone, Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Snapshot of a finished run for persistence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMeta {
    /// Tick at which the run stopped.
    pub final_tick: u64,
    /// Events in the persisted ledger.
    pub event_count: u64,
    /// Ledger Merkle root at the end of the run.
    pub merkle_root: Option<Hash>,
    /// The recording node's preferred tip at the end of the run.
    pub preferred_tip: Option<Hash>,
    /// Distinct preferred tips across all nodes at the final snapshot.
    pub unique_preferred_tips: u64,
}

/// Trait for persistent storage backends.
pub trait Storage {
    fn put_event(&self, id: &EventId, event: &Event) -> Result<(), StorageError>;
    fn get_event(&self, id: &EventId) -> Result<Option<Event>, StorageError>;
    fn has_event(&self, id: &EventId) -> Result<bool, StorageError>;

    fn put_meta(&self, meta: &RunMeta) -> Result<(), StorageError>;
    fn get_meta(&self) -> Result<Option<RunMeta>, StorageError>;

    fn flush(&self) -> Result<(), StorageError>;

    /// Persist every event of a ledger in canonical digest order.
    fn put_ledger(&self, ledger: &Ledger) -> Result<(), StorageError> {
        for id in ledger.ids_sorted() {
            if let Some(event) = ledger.get(&id) {
                self.put_event(&id, event)?;
            }
        }
        Ok(())
    }
}

const META_KEY: &[u8] = b"run_meta";

/// Sled-backed storage implementation.
pub struct SledStorage {
    #[allow(dead_code)]
    db: sled::Db,
    events: sled::Tree,
    meta: sled::Tree,
}

impl SledStorage {
    /// Open or create a sled database at the given path.
    pub fn open(path: &std::path::Path) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| StorageError::Io(e.to_string()))?;
        let events = db
            .open_tree("events")
            .map_err(|e| StorageError::Io(e.to_string()))?;
        let meta = db
            .open_tree("meta")
            .map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(SledStorage { db, events, meta })
    }
}

impl Storage for SledStorage {
    fn put_event(&self, id: &EventId, event: &Event) -> Result<(), StorageError> {
        let bytes =
            bincode::serialize(event).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.events
            .insert(id.0, bytes)
            .map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(())
    }

    fn get_event(&self, id: &EventId) -> Result<Option<Event>, StorageError> {
        match self
            .events
            .get(id.0)
            .map_err(|e| StorageError::Io(e.to_string()))?
        {
            Some(bytes) => {
                let event = bincode::deserialize(&bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(event))
            }
            None => Ok(None),
        }
    }

    fn has_event(&self, id: &EventId) -> Result<bool, StorageError> {
        self.events
            .contains_key(id.0)
            .map_err(|e| StorageError::Io(e.to_string()))
    }

    fn put_meta(&self, meta: &RunMeta) -> Result<(), StorageError> {
        let bytes =
            bincode::serialize(meta).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.meta
            .insert(META_KEY, bytes)
            .map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(())
    }

    fn get_meta(&self) -> Result<Option<RunMeta>, StorageError> {
        match self
            .meta
            .get(META_KEY)
            .map_err(|e| StorageError::Io(e.to_string()))?
        {
            Some(bytes) => {
                let meta = bincode::deserialize(&bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(())
    }
}
