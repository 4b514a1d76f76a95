//! Record store contract and an in-memory backend.

use crate::types::{IdentityRecord, NewIdentity, RecordId};
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: RecordId, reason: String },
}

/// Append-only persistence of enrolled identities.
///
/// `append` is atomic: a record is visible to `list_all` only once every
/// field has been written. `list_all` returns records in creation order.
pub trait RecordStore {
    fn append(&self, identity: &NewIdentity, photo: &[u8]) -> Result<RecordId, StoreError>;
    fn list_all(&self) -> Result<Vec<IdentityRecord>, StoreError>;
}

impl<S: RecordStore + ?Sized> RecordStore for &S {
    fn append(&self, identity: &NewIdentity, photo: &[u8]) -> Result<RecordId, StoreError> {
        (**self).append(identity, photo)
    }

    fn list_all(&self) -> Result<Vec<IdentityRecord>, StoreError> {
        (**self).list_all()
    }
}

impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    fn append(&self, identity: &NewIdentity, photo: &[u8]) -> Result<RecordId, StoreError> {
        (**self).append(identity, photo)
    }

    fn list_all(&self) -> Result<Vec<IdentityRecord>, StoreError> {
        (**self).list_all()
    }
}

/// Volatile store for tests and dry runs. Records are lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<IdentityRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryStore {
    fn append(&self, identity: &NewIdentity, photo: &[u8]) -> Result<RecordId, StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        let id = records.last().map_or(1, |r| r.id + 1);
        records.push(IdentityRecord {
            id,
            name: identity.name().to_string(),
            age: identity.age(),
            photo: photo.to_vec(),
            created_at: chrono::Utc::now().to_rfc3339(),
        });
        Ok(id)
    }

    fn list_all(&self) -> Result<Vec<IdentityRecord>, StoreError> {
        self.records
            .read()
            .map(|r| r.clone())
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let a = store
            .append(&NewIdentity::new("Alice", 30).unwrap(), b"a")
            .unwrap();
        let b = store
            .append(&NewIdentity::new("Bob", 25).unwrap(), b"b")
            .unwrap();
        assert_eq!((a, b), (1, 2));

        let records = store.list_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Alice");
        assert_eq!(records[1].photo, b"b");
    }

    #[test]
    fn test_memory_store_empty() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert!(store.list_all().unwrap().is_empty());
    }
}
