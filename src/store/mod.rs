//! Persistence of patients, match records, peer nodes, clients and pending async queries.

use std::{collections::HashSet, sync::RwLock};

use indexmap::IndexMap;

use crate::model::{
    records::{Client, MatchRecord, MatchType, PeerNode, PendingAsyncQuery},
    Patient,
};

pub mod rocks;

/// Outcome of an insert-or-update operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum UpsertOutcome {
    /// A new document was created.
    Inserted,
    /// An existing document was replaced by a different one.
    Updated,
    /// The stored document equals the given one.
    Unchanged,
}

/// Selection of patients.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PatientFilter {
    /// All patients.
    #[default]
    All,
    /// Patients with the given IDs.
    Ids(Vec<String>),
    /// Patients with the given ID and/or label; `None` matches any value.
    Identity {
        id: Option<String>,
        label: Option<String>,
    },
    /// Patients sharing a gene ID, a gene symbol or a variant key with the query.
    Genomic {
        gene_ids: HashSet<String>,
        gene_symbols: HashSet<String>,
        variant_keys: HashSet<String>,
    },
    /// Patients with phenotypic features (if `with_features`) or one of the disorders.
    Phenotypic {
        with_features: bool,
        disorder_ids: HashSet<String>,
    },
}

impl PatientFilter {
    /// Whether the given patient is selected.
    pub fn matches(&self, patient: &Patient) -> bool {
        match self {
            PatientFilter::All => true,
            PatientFilter::Ids(ids) => ids.contains(&patient.id),
            PatientFilter::Identity { id, label } => {
                (id.is_some() || label.is_some())
                    && id.as_ref().map(|id| id == &patient.id).unwrap_or(true)
                    && label
                        .as_ref()
                        .map(|label| Some(label) == patient.label.as_ref())
                        .unwrap_or(true)
            }
            PatientFilter::Genomic {
                gene_ids,
                gene_symbols,
                variant_keys,
            } => patient.genomic_features().iter().any(|genomic_feature| {
                genomic_feature
                    .gene()
                    .map(|gene| {
                        gene_ids.contains(&gene.id)
                            || gene
                                .hgnc_symbol()
                                .map(|symbol| gene_symbols.contains(symbol))
                                .unwrap_or(false)
                    })
                    .unwrap_or(false)
                    || genomic_feature
                        .variants()
                        .any(|variant| variant_keys.contains(&variant.key()))
            }),
            PatientFilter::Phenotypic {
                with_features,
                disorder_ids,
            } => {
                (*with_features && patient.has_features())
                    || patient
                        .disorder_ids()
                        .iter()
                        .filter_map(|id| crate::pheno::diseases::normalize_code(id))
                        .any(|id| disorder_ids.contains(&id))
            }
        }
    }
}

/// Selection of match records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchFilter {
    /// Records where the patient is the query patient or one of the results.
    pub involved_patient_id: Option<String>,
    /// Records where the patient is the query patient.
    pub query_patient_id: Option<String>,
    /// Records of any of the given types; empty selects all types.
    pub match_types: Vec<MatchType>,
    /// Only records with matches.
    pub with_results: bool,
}

impl MatchFilter {
    /// Whether the given record is selected.
    pub fn matches(&self, record: &MatchRecord) -> bool {
        self.involved_patient_id
            .as_ref()
            .map(|id| record.involves_patient(id))
            .unwrap_or(true)
            && self
                .query_patient_id
                .as_ref()
                .map(|id| id == &record.query_patient_id)
                .unwrap_or(true)
            && (self.match_types.is_empty() || self.match_types.contains(&record.match_type))
            && (!self.with_results || record.has_matches)
    }
}

/// Document store used by the node.
///
/// Writes are single document operations; no cross-document transactions are needed.
pub trait Store: Send + Sync {
    /// Insert or replace a patient, keyed by its ID.
    fn upsert_patient(&self, patient: &Patient) -> Result<UpsertOutcome, anyhow::Error>;
    /// Get a patient by ID.
    fn get_patient(&self, id: &str) -> Result<Option<Patient>, anyhow::Error>;
    /// Select patients in store order.
    fn find_patients(&self, filter: &PatientFilter) -> Result<Vec<Patient>, anyhow::Error>;
    /// Delete a patient, returns whether it existed.
    fn delete_patient(&self, id: &str) -> Result<bool, anyhow::Error>;

    /// Insert a match record.
    fn insert_match(&self, record: &MatchRecord) -> Result<(), anyhow::Error>;
    /// Select match records in insertion order.
    fn find_matches(&self, filter: &MatchFilter) -> Result<Vec<MatchRecord>, anyhow::Error>;
    /// Delete match records, returns the number of deleted records.
    fn delete_matches(&self, filter: &MatchFilter) -> Result<usize, anyhow::Error>;

    /// Insert or replace a peer node, keyed by its ID.
    fn upsert_node(&self, node: &PeerNode) -> Result<UpsertOutcome, anyhow::Error>;
    /// All peer nodes in store order.
    fn nodes(&self) -> Result<Vec<PeerNode>, anyhow::Error>;
    /// Delete a peer node, returns whether it existed.
    fn delete_node(&self, id: &str) -> Result<bool, anyhow::Error>;

    /// Insert or replace a client, keyed by its ID.
    fn upsert_client(&self, client: &Client) -> Result<UpsertOutcome, anyhow::Error>;
    /// All clients in store order.
    fn clients(&self) -> Result<Vec<Client>, anyhow::Error>;

    /// Record a pending async query, replacing one with the same query ID.
    fn insert_pending(&self, pending: &PendingAsyncQuery) -> Result<(), anyhow::Error>;
    /// Remove and return the pending async query; at most one caller obtains it.
    fn take_pending(&self, query_id: &str) -> Result<Option<PendingAsyncQuery>, anyhow::Error>;

    /// The client with the given token, if any.
    fn client_by_token(&self, token: &str) -> Result<Option<Client>, anyhow::Error> {
        Ok(self
            .clients()?
            .into_iter()
            .find(|client| client.auth_token == token))
    }
}

/// Open the RocksDB store at `path_db` or, if no path is given, an in-memory store.
pub fn open(path_db: Option<&str>) -> Result<Box<dyn Store>, anyhow::Error> {
    match path_db {
        Some(path_db) => Ok(Box::new(rocks::RocksStore::open(path_db)?)),
        None => {
            tracing::warn!("no database path configured, patients are kept in memory only");
            Ok(Box::new(MemoryStore::new()))
        }
    }
}

/// Decide the upsert outcome from the previous document.
fn upsert_outcome<T: PartialEq>(previous: Option<&T>, current: &T) -> UpsertOutcome {
    match previous {
        None => UpsertOutcome::Inserted,
        Some(previous) if previous == current => UpsertOutcome::Unchanged,
        Some(_) => UpsertOutcome::Updated,
    }
}

/// The collections of the in-memory store.
#[derive(Debug, Default)]
struct Collections {
    patients: IndexMap<String, Patient>,
    matches: IndexMap<uuid::Uuid, MatchRecord>,
    nodes: IndexMap<String, PeerNode>,
    clients: IndexMap<String, Client>,
    async_responses: IndexMap<String, PendingAsyncQuery>,
}

/// In-memory store keeping insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Collections>, anyhow::Error> {
        self.inner
            .read()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Collections>, anyhow::Error> {
        self.inner
            .write()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))
    }
}

impl Store for MemoryStore {
    fn upsert_patient(&self, patient: &Patient) -> Result<UpsertOutcome, anyhow::Error> {
        let mut inner = self.write()?;
        let outcome = upsert_outcome(inner.patients.get(&patient.id), patient);
        if outcome != UpsertOutcome::Unchanged {
            inner.patients.insert(patient.id.clone(), patient.clone());
        }
        Ok(outcome)
    }

    fn get_patient(&self, id: &str) -> Result<Option<Patient>, anyhow::Error> {
        Ok(self.read()?.patients.get(id).cloned())
    }

    fn find_patients(&self, filter: &PatientFilter) -> Result<Vec<Patient>, anyhow::Error> {
        Ok(self
            .read()?
            .patients
            .values()
            .filter(|patient| filter.matches(patient))
            .cloned()
            .collect())
    }

    fn delete_patient(&self, id: &str) -> Result<bool, anyhow::Error> {
        Ok(self.write()?.patients.shift_remove(id).is_some())
    }

    fn insert_match(&self, record: &MatchRecord) -> Result<(), anyhow::Error> {
        self.write()?.matches.insert(record.id, record.clone());
        Ok(())
    }

    fn find_matches(&self, filter: &MatchFilter) -> Result<Vec<MatchRecord>, anyhow::Error> {
        Ok(self
            .read()?
            .matches
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }

    fn delete_matches(&self, filter: &MatchFilter) -> Result<usize, anyhow::Error> {
        let mut inner = self.write()?;
        let before = inner.matches.len();
        inner.matches.retain(|_, record| !filter.matches(record));
        Ok(before - inner.matches.len())
    }

    fn upsert_node(&self, node: &PeerNode) -> Result<UpsertOutcome, anyhow::Error> {
        let mut inner = self.write()?;
        let outcome = upsert_outcome(inner.nodes.get(&node.id), node);
        inner.nodes.insert(node.id.clone(), node.clone());
        Ok(outcome)
    }

    fn nodes(&self) -> Result<Vec<PeerNode>, anyhow::Error> {
        Ok(self.read()?.nodes.values().cloned().collect())
    }

    fn delete_node(&self, id: &str) -> Result<bool, anyhow::Error> {
        Ok(self.write()?.nodes.shift_remove(id).is_some())
    }

    fn upsert_client(&self, client: &Client) -> Result<UpsertOutcome, anyhow::Error> {
        let mut inner = self.write()?;
        let outcome = upsert_outcome(inner.clients.get(&client.id), client);
        inner.clients.insert(client.id.clone(), client.clone());
        Ok(outcome)
    }

    fn clients(&self) -> Result<Vec<Client>, anyhow::Error> {
        Ok(self.read()?.clients.values().cloned().collect())
    }

    fn insert_pending(&self, pending: &PendingAsyncQuery) -> Result<(), anyhow::Error> {
        self.write()?
            .async_responses
            .insert(pending.query_id.clone(), pending.clone());
        Ok(())
    }

    fn take_pending(&self, query_id: &str) -> Result<Option<PendingAsyncQuery>, anyhow::Error> {
        Ok(self.write()?.async_responses.shift_remove(query_id))
    }
}
