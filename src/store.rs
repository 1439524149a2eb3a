//! # Store Module
//!
//! Storage seams used by the engine ([`RecordStore`], [`BacklinkIndex`]) and an
//! in-memory [`Store`] implementing both. Every record write is individually
//! atomic; there is no multi-record transaction.

use crate::config::StoreConfig;
use crate::index::LinkIndex;
use crate::model::{ContainerId, EntityId, Record, RecordId, RevisionId};
use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(RecordId),
    #[error("record {id} is at revision {actual}, expected {expected}")]
    Conflict {
        id: RecordId,
        expected: RevisionId,
        actual: RevisionId,
    },
    #[error("record {0} already exists")]
    AlreadyExists(RecordId),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read-only view of the external-link table.
pub trait BacklinkIndex: Send + Sync {
    /// Containers whose content links to `url`, compared on normalised form.
    fn page_ids_containing_url(&self, url: &str) -> StoreResult<Vec<ContainerId>>;
}

/// Record persistence with per-record optimistic concurrency.
pub trait RecordStore: Send + Sync {
    /// What the given container holds, if it is known.
    fn entity_for_container(&self, container: ContainerId) -> StoreResult<Option<EntityId>>;

    /// Latest stored state of a record.
    fn load_revision(&self, id: RecordId) -> StoreResult<(Record, RevisionId)>;

    /// Reserve a fresh record ID. Nothing is written.
    fn allocate_record_id(&self) -> StoreResult<RecordId>;

    /// Persist a new record. A record without an ID gets one allocated.
    fn create_record(&self, record: &Record, summary: &str) -> StoreResult<(RecordId, RevisionId)>;

    /// Persist a new revision of an existing record, provided it is still at `expected`.
    fn update_record(
        &self,
        record: &Record,
        expected: RevisionId,
        summary: &str,
    ) -> StoreResult<RevisionId>;
}

/// One entry of the in-memory write log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteEntry {
    pub id: RecordId,
    pub revision: RevisionId,
    pub summary: String,
    pub created: bool,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    record: Record,
    revision: RevisionId,
    container: ContainerId,
}

#[derive(Debug, Default)]
struct StoreState {
    records: HashMap<RecordId, StoredRecord>,
    containers: HashMap<ContainerId, EntityId>,
    links: LinkIndex,
    writes: Vec<WriteEntry>,
    next_record_id: u64,
    next_container_id: u64,
    next_revision: u64,
}

impl StoreState {
    fn next_container(&mut self) -> ContainerId {
        let id = ContainerId(self.next_container_id);
        self.next_container_id += 1;
        id
    }

    fn next_revision(&mut self) -> RevisionId {
        self.next_revision += 1;
        RevisionId(self.next_revision)
    }

    fn log(&mut self, id: RecordId, revision: RevisionId, summary: &str, created: bool) {
        self.writes.push(WriteEntry {
            id,
            revision,
            summary: summary.to_string(),
            created,
        });
    }
}

/// In-memory record store and link index.
#[derive(Debug)]
pub struct Store {
    state: RwLock<StoreState>,
}

impl Store {
    pub fn new() -> Self {
        Self::with_config(&StoreConfig::default())
    }

    pub fn with_config(config: &StoreConfig) -> Self {
        Self {
            state: RwLock::new(StoreState {
                next_record_id: config.first_record_id.max(1),
                next_container_id: config.first_container_id.max(1),
                ..StoreState::default()
            }),
        }
    }

    /// Register a non-record container (for example an attribute page) linking to `urls`.
    pub fn register_container<'a, I>(&self, entity: EntityId, urls: I) -> ContainerId
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut state = self.state.write();
        let container = state.next_container();
        state.containers.insert(container, entity);
        state.links.replace_links(container, urls);
        container
    }

    pub fn get(&self, id: RecordId) -> Option<(Record, RevisionId)> {
        self.state
            .read()
            .records
            .get(&id)
            .map(|stored| (stored.record.clone(), stored.revision))
    }

    pub fn container_of(&self, id: RecordId) -> Option<ContainerId> {
        self.state.read().records.get(&id).map(|stored| stored.container)
    }

    pub fn record_ids(&self) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = self.state.read().records.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every successful write, in commit order.
    pub fn writes(&self) -> Vec<WriteEntry> {
        self.state.read().writes.clone()
    }

    pub fn writes_for(&self, id: RecordId) -> usize {
        self.state
            .read()
            .writes
            .iter()
            .filter(|entry| entry.id == id)
            .count()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_claim_ids(record: &Record) -> StoreResult<()> {
    let mut seen = HashSet::new();
    for claim in &record.claims {
        let Some(id) = &claim.id else {
            return Err(StoreError::InvalidRecord(format!(
                "claim on {} has no claim id",
                claim.attribute
            )));
        };
        if !seen.insert(id) {
            return Err(StoreError::InvalidRecord(format!("duplicate claim id {id}")));
        }
    }
    Ok(())
}

impl BacklinkIndex for Store {
    fn page_ids_containing_url(&self, url: &str) -> StoreResult<Vec<ContainerId>> {
        Ok(self.state.read().links.containers_for(url))
    }
}

impl RecordStore for Store {
    fn entity_for_container(&self, container: ContainerId) -> StoreResult<Option<EntityId>> {
        Ok(self.state.read().containers.get(&container).copied())
    }

    fn load_revision(&self, id: RecordId) -> StoreResult<(Record, RevisionId)> {
        self.get(id).ok_or(StoreError::NotFound(id))
    }

    fn allocate_record_id(&self) -> StoreResult<RecordId> {
        let mut state = self.state.write();
        let id = RecordId(state.next_record_id);
        state.next_record_id += 1;
        Ok(id)
    }

    fn create_record(&self, record: &Record, summary: &str) -> StoreResult<(RecordId, RevisionId)> {
        validate_claim_ids(record)?;
        let mut state = self.state.write();
        let id = match record.id {
            Some(id) => {
                if state.records.contains_key(&id) {
                    return Err(StoreError::AlreadyExists(id));
                }
                state.next_record_id = state.next_record_id.max(id.0 + 1);
                id
            }
            None => {
                let id = RecordId(state.next_record_id);
                state.next_record_id += 1;
                id
            }
        };

        let mut stored = record.clone();
        stored.id = Some(id);
        let container = state.next_container();
        let revision = state.next_revision();
        state.containers.insert(container, EntityId::Record(id));
        state.links.replace_links(container, stored.url_values());
        state.records.insert(
            id,
            StoredRecord {
                record: stored,
                revision,
                container,
            },
        );
        state.log(id, revision, summary, true);
        Ok((id, revision))
    }

    fn update_record(
        &self,
        record: &Record,
        expected: RevisionId,
        summary: &str,
    ) -> StoreResult<RevisionId> {
        let id = record
            .id
            .ok_or_else(|| StoreError::InvalidRecord("update without record id".to_string()))?;
        validate_claim_ids(record)?;
        let mut state = self.state.write();
        let (actual, container) = match state.records.get(&id) {
            Some(stored) => (stored.revision, stored.container),
            None => return Err(StoreError::NotFound(id)),
        };
        if actual != expected {
            return Err(StoreError::Conflict {
                id,
                expected,
                actual,
            });
        }

        let revision = state.next_revision();
        state.links.replace_links(container, record.url_values());
        state.records.insert(
            id,
            StoredRecord {
                record: record.clone(),
                revision,
                container,
            },
        );
        state.log(id, revision, summary, false);
        Ok(revision)
    }
}
