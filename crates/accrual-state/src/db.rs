use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;

use accrual_core::error::AccrualError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Persistent state database backed by sled (pure-Rust, no C dependencies).
///
/// Every table lives in the single tree `state` under a one-byte prefix
/// (see [`crate::keys`]) so that one event commits as one atomic batch.
pub struct StateDb {
    db: sled::Db,
    state: sled::Tree,
}

impl StateDb {
    /// Open or create the state database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AccrualError> {
        let db = sled::open(path).map_err(|e| AccrualError::Storage(e.to_string()))?;
        Self::from_db(db)
    }

    /// In-memory database removed on drop.
    pub fn temporary() -> Result<Self, AccrualError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| AccrualError::Storage(e.to_string()))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, AccrualError> {
        let state = db.open_tree("state").map_err(|e| AccrualError::Storage(e.to_string()))?;
        Ok(Self { db, state })
    }

    /// Start a transaction. Dropping it without [`Txn::commit`] discards
    /// every write it buffered.
    pub fn begin(&self) -> Txn<'_> {
        Txn { tree: &self.state, overlay: BTreeMap::new() }
    }

    /// True when nothing has ever been committed.
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), AccrualError> {
        self.db.flush().map_err(|e| AccrualError::Storage(e.to_string()))?;
        Ok(())
    }
}

// ── Txn ──────────────────────────────────────────────────────────────────────

/// Buffered read-your-writes view over the state tree.
///
/// Writes land in an ordered overlay (`None` marks a delete). Reads consult
/// the overlay first, then the committed tree.
pub struct Txn<'a> {
    tree: &'a sled::Tree,
    overlay: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> Txn<'a> {
    pub fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, AccrualError> {
        if let Some(buffered) = self.overlay.get(key) {
            return Ok(buffered.clone());
        }
        self.tree
            .get(key)
            .map(|v| v.map(|iv| iv.to_vec()))
            .map_err(|e| AccrualError::Storage(e.to_string()))
    }

    pub fn put_raw(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.overlay.insert(key, Some(value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.overlay.insert(key, None);
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool, AccrualError> {
        Ok(self.get_raw(key)?.is_some())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, AccrualError> {
        self.get_raw(key)?.map(|bytes| decode(&bytes)).transpose()
    }

    pub fn put<T: Serialize>(&mut self, key: Vec<u8>, value: &T) -> Result<(), AccrualError> {
        let bytes = bincode::serialize(value)
            .map_err(|e| AccrualError::Serialization(e.to_string()))?;
        self.put_raw(key, bytes);
        Ok(())
    }

    /// Every live entry with `start <= key < end` (`end = None` is unbounded),
    /// in key order, with buffered writes applied.
    pub fn range(
        &self,
        start: Vec<u8>,
        end: Option<Vec<u8>>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, AccrualError> {
        if end.as_ref().is_some_and(|end| *end <= start) {
            return Ok(Vec::new());
        }
        let bounds = (
            Bound::Included(start),
            end.map_or(Bound::Unbounded, Bound::Excluded),
        );

        let mut merged = BTreeMap::new();
        for item in self.tree.range(bounds.clone()) {
            let (k, v) = item.map_err(|e| AccrualError::Storage(e.to_string()))?;
            merged.insert(k.to_vec(), v.to_vec());
        }
        for (k, v) in self.overlay.range(bounds) {
            match v {
                Some(v) => merged.insert(k.clone(), v.clone()),
                None => merged.remove(k),
            };
        }
        Ok(merged.into_iter().collect())
    }

    /// Every live entry whose key starts with `prefix`.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, AccrualError> {
        self.range(prefix.to_vec(), prefix_end(prefix))
    }

    /// Number of buffered writes.
    pub fn pending_writes(&self) -> usize {
        self.overlay.len()
    }

    /// Apply every buffered write as one atomic sled batch.
    pub fn commit(self) -> Result<(), AccrualError> {
        let writes = self.overlay.len();
        let mut batch = sled::Batch::default();
        for (k, v) in self.overlay {
            match v {
                Some(v) => batch.insert(k, v),
                None => batch.remove(k),
            }
        }
        self.tree
            .apply_batch(batch)
            .map_err(|e| AccrualError::Storage(e.to_string()))?;
        debug!(writes, "state committed");
        Ok(())
    }
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, AccrualError> {
    bincode::deserialize(bytes).map_err(|e| AccrualError::Serialization(e.to_string()))
}

/// Smallest key greater than every key starting with `prefix`.
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn temp_db(name: &str) -> StateDb {
        let dir = std::env::temp_dir().join(format!("accrual_state_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        StateDb::open(&dir).expect("open temp db")
    }

    // ── Txn ───────────────────────────────────────────────────────────────────

    #[test]
    fn reads_see_own_writes() {
        let db = temp_db("own_writes");
        let mut txn = db.begin();
        txn.put(b"k".to_vec(), &42u64).unwrap();
        assert_eq!(txn.get::<u64>(b"k").unwrap(), Some(42));
        txn.delete(b"k".to_vec());
        assert_eq!(txn.get::<u64>(b"k").unwrap(), None);
    }

    #[test]
    fn dropped_txn_leaves_no_trace() {
        let db = temp_db("rollback");
        {
            let mut txn = db.begin();
            txn.put(b"k".to_vec(), &1u64).unwrap();
        }
        assert!(db.begin().get::<u64>(b"k").unwrap().is_none());
        assert!(db.is_empty());
    }

    #[test]
    fn commit_is_visible_to_later_txns() {
        let db = temp_db("commit");
        let mut txn = db.begin();
        txn.put(b"a".to_vec(), &1u64).unwrap();
        txn.put(b"b".to_vec(), &2u64).unwrap();
        txn.commit().unwrap();

        let mut txn = db.begin();
        txn.delete(b"a".to_vec());
        txn.commit().unwrap();

        let txn = db.begin();
        assert_eq!(txn.get::<u64>(b"a").unwrap(), None);
        assert_eq!(txn.get::<u64>(b"b").unwrap(), Some(2));
    }

    #[test]
    fn range_merges_overlay_in_order() {
        let db = StateDb::temporary().unwrap();
        let mut txn = db.begin();
        for k in [b"p1", b"p3", b"p5"] {
            txn.put_raw(k.to_vec(), vec![1]);
        }
        txn.commit().unwrap();

        let mut txn = db.begin();
        txn.put_raw(b"p2".to_vec(), vec![2]);
        txn.delete(b"p3".to_vec());
        txn.put_raw(b"q0".to_vec(), vec![3]);

        let keys: Vec<Vec<u8>> = txn.scan_prefix(b"p").unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"p1".to_vec(), b"p2".to_vec(), b"p5".to_vec()]);

        let bounded = txn.range(b"p2".to_vec(), Some(b"p5".to_vec())).unwrap();
        assert_eq!(bounded.len(), 1);
    }

    #[test]
    fn prefix_end_carries() {
        assert_eq!(prefix_end(&[1, 2]), Some(vec![1, 3]));
        assert_eq!(prefix_end(&[1, 0xff]), Some(vec![2]));
        assert_eq!(prefix_end(&[0xff, 0xff]), None);
    }
}
