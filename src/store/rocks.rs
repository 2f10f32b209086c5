//! Store implementation on top of RocksDB.
//!
//! Each collection lives in its own column family and documents are stored as JSON.  Match
//! records are keyed by a zero-padded sequence number so iteration follows insertion order.

use std::{path::Path, sync::Mutex};

use serde::{de::DeserializeOwned, Serialize};

use super::{upsert_outcome, MatchFilter, PatientFilter, Store, UpsertOutcome};
use crate::{
    common,
    model::{
        records::{Client, MatchRecord, PeerNode, PendingAsyncQuery},
        Patient,
    },
};

/// Type alias for the database.
pub type Db = rocksdb::DBWithThreadMode<rocksdb::MultiThreaded>;

const CF_META: &str = "meta";
const CF_PATIENTS: &str = "patients";
const CF_MATCHES: &str = "matches";
const CF_NODES: &str = "nodes";
const CF_CLIENTS: &str = "clients";
const CF_ASYNC_RESPONSES: &str = "async_responses";

/// All column families.
pub const CF_NAMES: &[&str] = &[
    CF_META,
    CF_PATIENTS,
    CF_MATCHES,
    CF_NODES,
    CF_CLIENTS,
    CF_ASYNC_RESPONSES,
];

/// Key of the match sequence counter in the `meta` column family.
const KEY_MATCH_SEQ: &str = "match-seq";

/// RocksDB-backed store.
pub struct RocksStore {
    db: Db,
    /// Serializes read-modify-write operations.
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore")
            .field("path", &self.db.path())
            .finish()
    }
}

impl RocksStore {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        tracing::info!("Opening RocksDB at {:?}...", path.as_ref());
        let before_open = std::time::Instant::now();
        let mut options = rocksdb::Options::default();
        options.create_if_missing(true);
        options.create_missing_column_families(true);
        let db = Db::open_cf(&options, path.as_ref(), CF_NAMES)
            .map_err(|e| anyhow::anyhow!("could not open RocksDB {:?}: {}", path.as_ref(), e))?;

        let result = Self {
            db,
            write_lock: Mutex::new(()),
        };
        let cf_meta = result.cf(CF_META)?;
        result
            .db
            .put_cf(&cf_meta, "mme-matcher-version", common::worker_version())?;
        tracing::info!("...done opening RocksDB in {:?}", before_open.elapsed());

        Ok(result)
    }

    fn cf(&self, name: &str) -> Result<std::sync::Arc<rocksdb::BoundColumnFamily<'_>>, anyhow::Error> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| anyhow::anyhow!("no column family {:?} in database", name))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, anyhow::Error> {
        self.write_lock
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))
    }

    fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &str) -> Result<Option<T>, anyhow::Error> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(&cf, key.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw).map_err(|e| {
                anyhow::anyhow!("malformed document {:?} in {}: {}", key, cf_name, e)
            })?)),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, cf_name: &str, key: &str, value: &T) -> Result<(), anyhow::Error> {
        let cf = self.cf(cf_name)?;
        self.db
            .put_cf(&cf, key.as_bytes(), serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn delete(&self, cf_name: &str, key: &[u8]) -> Result<(), anyhow::Error> {
        let cf = self.cf(cf_name)?;
        self.db.delete_cf(&cf, key)?;
        Ok(())
    }

    /// Read all documents of a column family in key order; malformed documents are skipped.
    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<(Vec<u8>, T)>, anyhow::Error> {
        let cf = self.cf(cf_name)?;
        let mut result = Vec::new();
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (key, value) = item?;
            match serde_json::from_slice::<T>(&value) {
                Ok(doc) => result.push((key.to_vec(), doc)),
                Err(e) => tracing::warn!(
                    "skipping malformed document {:?} in {}: {}",
                    String::from_utf8_lossy(&key),
                    cf_name,
                    e
                ),
            }
        }
        Ok(result)
    }

    fn upsert<T>(&self, cf_name: &str, key: &str, value: &T) -> Result<UpsertOutcome, anyhow::Error>
    where
        T: Serialize + DeserializeOwned + PartialEq,
    {
        let _guard = self.lock()?;
        let previous = self.get::<T>(cf_name, key).unwrap_or_else(|e| {
            tracing::warn!("replacing unreadable document: {}", e);
            None
        });
        let outcome = upsert_outcome(previous.as_ref(), value);
        if outcome != UpsertOutcome::Unchanged {
            self.put(cf_name, key, value)?;
        }
        Ok(outcome)
    }

    fn remove(&self, cf_name: &str, key: &str) -> Result<bool, anyhow::Error> {
        let _guard = self.lock()?;
        let cf = self.cf(cf_name)?;
        let existed = self.db.get_cf(&cf, key.as_bytes())?.is_some();
        if existed {
            self.db.delete_cf(&cf, key.as_bytes())?;
        }
        Ok(existed)
    }
}

impl Store for RocksStore {
    fn upsert_patient(&self, patient: &Patient) -> Result<UpsertOutcome, anyhow::Error> {
        self.upsert(CF_PATIENTS, &patient.id, patient)
    }

    fn get_patient(&self, id: &str) -> Result<Option<Patient>, anyhow::Error> {
        self.get(CF_PATIENTS, id)
    }

    fn find_patients(&self, filter: &PatientFilter) -> Result<Vec<Patient>, anyhow::Error> {
        Ok(self
            .scan::<Patient>(CF_PATIENTS)?
            .into_iter()
            .map(|(_, patient)| patient)
            .filter(|patient| filter.matches(patient))
            .collect())
    }

    fn delete_patient(&self, id: &str) -> Result<bool, anyhow::Error> {
        self.remove(CF_PATIENTS, id)
    }

    fn insert_match(&self, record: &MatchRecord) -> Result<(), anyhow::Error> {
        let _guard = self.lock()?;
        let seq = self.get::<u64>(CF_META, KEY_MATCH_SEQ)?.unwrap_or_default() + 1;
        self.put(CF_META, KEY_MATCH_SEQ, &seq)?;
        self.put(CF_MATCHES, &format!("{:020}", seq), record)
    }

    fn find_matches(&self, filter: &MatchFilter) -> Result<Vec<MatchRecord>, anyhow::Error> {
        Ok(self
            .scan::<MatchRecord>(CF_MATCHES)?
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| filter.matches(record))
            .collect())
    }

    fn delete_matches(&self, filter: &MatchFilter) -> Result<usize, anyhow::Error> {
        let _guard = self.lock()?;
        let mut count = 0;
        for (key, record) in self.scan::<MatchRecord>(CF_MATCHES)? {
            if filter.matches(&record) {
                self.delete(CF_MATCHES, &key)?;
                count += 1;
            }
        }
        Ok(count)
    }

    fn upsert_node(&self, node: &PeerNode) -> Result<UpsertOutcome, anyhow::Error> {
        self.upsert(CF_NODES, &node.id, node)
    }

    fn nodes(&self) -> Result<Vec<PeerNode>, anyhow::Error> {
        Ok(self
            .scan(CF_NODES)?
            .into_iter()
            .map(|(_, node)| node)
            .collect())
    }

    fn delete_node(&self, id: &str) -> Result<bool, anyhow::Error> {
        self.remove(CF_NODES, id)
    }

    fn upsert_client(&self, client: &Client) -> Result<UpsertOutcome, anyhow::Error> {
        self.upsert(CF_CLIENTS, &client.id, client)
    }

    fn clients(&self) -> Result<Vec<Client>, anyhow::Error> {
        Ok(self
            .scan(CF_CLIENTS)?
            .into_iter()
            .map(|(_, client)| client)
            .collect())
    }

    fn insert_pending(&self, pending: &PendingAsyncQuery) -> Result<(), anyhow::Error> {
        let _guard = self.lock()?;
        self.put(CF_ASYNC_RESPONSES, &pending.query_id, pending)
    }

    fn take_pending(&self, query_id: &str) -> Result<Option<PendingAsyncQuery>, anyhow::Error> {
        let _guard = self.lock()?;
        let pending = self.get::<PendingAsyncQuery>(CF_ASYNC_RESPONSES, query_id)?;
        if pending.is_some() {
            self.delete(CF_ASYNC_RESPONSES, query_id.as_bytes())?;
        }
        Ok(pending)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{model::test::patient, store::test::exercise_store};

    #[test]
    fn rocks_store() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = RocksStore::open(tmp_dir.join("db"))?;

        exercise_store(&store)
    }

    #[test]
    fn reopen_keeps_documents() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        {
            let store = RocksStore::open(tmp_dir.join("db"))?;
            store.upsert_patient(&patient("P1", &["HP:0001263"], &[]))?;
        }

        let store = RocksStore::open(tmp_dir.join("db"))?;
        assert_eq!(
            store.get_patient("P1")?.map(|p| p.id),
            Some("P1".to_string())
        );

        Ok(())
    }

    #[tracing_test::traced_test]
    #[test]
    fn malformed_documents_are_skipped() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = RocksStore::open(tmp_dir.join("db"))?;
        store.upsert_patient(&patient("P1", &["HP:0001263"], &[]))?;
        let cf = store.cf(CF_PATIENTS)?;
        store.db.put_cf(&cf, b"P0", b"{not json")?;

        let patients = store.find_patients(&PatientFilter::All)?;

        assert_eq!(patients.len(), 1);
        assert!(logs_contain("skipping malformed document"));

        Ok(())
    }
}
