//! The Atomic Store - Serialized Read-Modify-Write over Durable Records
//!
//! Every experiment state holder (counters, task markers) persists through
//! this facade:
//! - One owner serializes all access to one backing table
//! - `update` is atomic: no other caller's write can land between its
//!   read and its write
//! - `NotFound` is a normal recoverable outcome, distinct from backend errors

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// Storage errors surfaced to callers.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists under the requested key.
    #[error("No record for key: {0}")]
    NotFound(String),

    /// Embedded database failure (I/O, corruption).
    #[error("Backend error: {0}")]
    Backend(#[from] sled::Error),

    /// A record failed to encode or decode.
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StoreError {
    /// True when the error is the recoverable not-found case.
    ///
    /// Callers are expected to branch on this rather than treating every
    /// storage error alike.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A named, durable key/value table with serialized access.
///
/// All operations go through a single owning lock, so concurrent callers are
/// queued and served one at a time. That serialization is what makes
/// [`update`](Self::update) atomic: the read-apply-write sequence can never
/// interleave with another caller's write to the same store.
///
/// Values are opaque serializable payloads; the store applies no merge logic
/// of its own. Writes are last-write-wins at this layer.
pub struct AtomicStore {
    db: Mutex<sled::Db>,
}

impl AtomicStore {
    /// Opens (or creates) the store at `<data_root>/<identifier>`.
    ///
    /// Creates the directory if missing. Failure to open is fatal to the
    /// caller's startup path and must be propagated, not masked.
    pub fn open<P: AsRef<Path>>(data_root: P, identifier: &str) -> Result<Self, StoreError> {
        let db = sled::open(data_root.as_ref().join(identifier))?;
        Ok(Self { db: Mutex::new(db) })
    }

    /// Creates an ephemeral store backed by a temporary file.
    ///
    /// Used for tests and for runs that opt out of durability.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db: Mutex::new(db) })
    }

    /// Unconditionally writes `value` under `key`. Idempotent.
    pub fn put<V: Serialize>(&self, key: &str, value: &V) -> Result<(), StoreError> {
        let db = self.db.lock().unwrap();
        db.insert(key.as_bytes(), serde_json::to_vec(value)?)?;
        db.flush()?;
        Ok(())
    }

    /// Returns the stored value, or `NotFound` if the key is absent.
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Result<V, StoreError> {
        let db = self.db.lock().unwrap();
        match db.get(key.as_bytes())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    /// Atomically applies `mutation` to the value under `key`.
    ///
    /// Reads the current value, applies `mutation(value) -> (new_value,
    /// result)`, writes `new_value` back, and returns `result`. Fails with
    /// `NotFound` if the key is absent; an absent key is never created here.
    ///
    /// The mutation closure runs while the store lock is held and must not
    /// call back into the same store.
    pub fn update<V, R, F>(&self, key: &str, mutation: F) -> Result<R, StoreError>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce(V) -> (V, R),
    {
        let db = self.db.lock().unwrap();
        let bytes = db
            .get(key.as_bytes())?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let value: V = serde_json::from_slice(&bytes)?;
        let (next, result) = mutation(value);
        db.insert(key.as_bytes(), serde_json::to_vec(&next)?)?;
        db.flush()?;
        Ok(result)
    }

    /// Applies `mutation` to every record, collecting one result per record.
    ///
    /// Records are visited in key order. The first failure aborts the pass;
    /// writes already applied in the same call are not rolled back.
    pub fn update_all<V, R, F>(&self, mut mutation: F) -> Result<Vec<R>, StoreError>
    where
        V: Serialize + DeserializeOwned,
        F: FnMut(&str, V) -> (V, R),
    {
        let db = self.db.lock().unwrap();

        // Snapshot the table first so mutation never races the iterator.
        let mut entries = Vec::new();
        for entry in db.iter() {
            let (key, bytes) = entry?;
            entries.push((String::from_utf8_lossy(&key).into_owned(), bytes));
        }

        let mut results = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            let value: V = serde_json::from_slice(&bytes)?;
            let (next, result) = mutation(&key, value);
            db.insert(key.as_bytes(), serde_json::to_vec(&next)?)?;
            results.push(result);
        }
        db.flush()?;
        Ok(results)
    }

    /// Folds `combine(acc, key, value) -> acc` over every record.
    ///
    /// Visit order is implementation-defined; callers must treat it as
    /// unordered.
    pub fn fold<V, A, F>(&self, initial: A, mut combine: F) -> Result<A, StoreError>
    where
        V: DeserializeOwned,
        F: FnMut(A, &str, V) -> A,
    {
        let db = self.db.lock().unwrap();
        let mut acc = initial;
        for entry in db.iter() {
            let (key, bytes) = entry?;
            let value: V = serde_json::from_slice(&bytes)?;
            acc = combine(acc, &String::from_utf8_lossy(&key), value);
        }
        Ok(acc)
    }

    /// Deletes all records. Irreversible.
    pub fn reset(&self) -> Result<(), StoreError> {
        let db = self.db.lock().unwrap();
        db.clear()?;
        db.flush()?;
        Ok(())
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.db.lock().unwrap().len()
    }

    /// True when the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
