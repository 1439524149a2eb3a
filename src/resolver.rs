//! # Identity Resolver
//!
//! Finds the unique record whose claim on an identifying attribute equals a
//! URL, or allocates a new record carrying that claim.
//!
//! Results are cached per [`ReconciliationSession`], which lives for one API
//! call. Within a session the same `(attribute, url)` key always yields the
//! same [`CandidateHandle`], so a batch never allocates two records for one URL
//! and a claim can point back at a record that has not been saved yet.

use crate::claim_ids::ClaimIdGenerator;
use crate::error::ReconcileError;
use crate::model::{AttributeKey, Claim, Record, RecordId, RevisionId, Value};
use crate::store::{BacklinkIndex, RecordStore, StoreError};
use hashbrown::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, instrument, warn};

/// Lookup key for identity resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReconciliationKey {
    pub attribute: AttributeKey,
    pub url: String,
}

impl ReconciliationKey {
    pub fn new(attribute: AttributeKey, url: impl Into<String>) -> Self {
        Self {
            attribute,
            url: url.into(),
        }
    }
}

impl fmt::Display for ReconciliationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute, self.url)
    }
}

/// Handle to a candidate owned by a session. Equal handles mean the same record.
///
/// Handles are bound to the session that issued them; any other session
/// rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateHandle {
    session: u64,
    index: usize,
}

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Outcome of identity resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedCandidate {
    /// An existing record and the revision it was loaded at.
    Found { record: Record, revision: RevisionId },
    /// A freshly allocated record, not yet persisted.
    New { record: Record },
}

impl ResolvedCandidate {
    pub fn record(&self) -> &Record {
        match self {
            ResolvedCandidate::Found { record, .. } | ResolvedCandidate::New { record } => record,
        }
    }

    pub fn revision(&self) -> Option<RevisionId> {
        match self {
            ResolvedCandidate::Found { revision, .. } => Some(*revision),
            ResolvedCandidate::New { .. } => None,
        }
    }

    pub fn id(&self) -> Option<RecordId> {
        self.record().id
    }

    pub fn is_new(&self) -> bool {
        matches!(self, ResolvedCandidate::New { .. })
    }
}

/// Submission-scoped resolution state.
pub struct ReconciliationSession<'a> {
    id: u64,
    store: &'a dyn RecordStore,
    backlinks: &'a dyn BacklinkIndex,
    claim_ids: &'a dyn ClaimIdGenerator,
    cache: HashMap<ReconciliationKey, CandidateHandle>,
    candidates: Vec<ResolvedCandidate>,
}

impl<'a> ReconciliationSession<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        backlinks: &'a dyn BacklinkIndex,
        claim_ids: &'a dyn ClaimIdGenerator,
    ) -> Self {
        Self {
            id: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            store,
            backlinks,
            claim_ids,
            cache: HashMap::new(),
            candidates: Vec::new(),
        }
    }

    pub fn store(&self) -> &'a dyn RecordStore {
        self.store
    }

    pub fn claim_ids(&self) -> &'a dyn ClaimIdGenerator {
        self.claim_ids
    }

    /// Resolve `(attribute, url)` to a candidate, consulting the session cache first.
    #[instrument(skip(self), fields(attribute = %attribute))]
    pub fn resolve(
        &mut self,
        attribute: AttributeKey,
        url: &str,
    ) -> Result<CandidateHandle, ReconcileError> {
        let key = ReconciliationKey::new(attribute, url);
        if let Some(handle) = self.cache.get(&key) {
            debug!(%key, "resolution cache hit");
            return Ok(*handle);
        }

        let mut matches = self.find_matches(attribute, url)?;
        let candidate = match matches.len() {
            0 => {
                let id = self.store.allocate_record_id()?;
                let mut record = Record::with_id(id);
                record.add_claim(
                    Claim::new(attribute, Value::Url(url.to_string()))
                        .with_id(self.claim_ids.new_claim_id(Some(id))),
                );
                debug!(%key, %id, "no match, allocated new record");
                ResolvedCandidate::New { record }
            }
            1 => {
                let (record, revision) = matches.remove(0);
                debug!(%key, id = ?record.id, %revision, "matched existing record");
                ResolvedCandidate::Found { record, revision }
            }
            _ => {
                let mut ids: Vec<RecordId> =
                    matches.iter().filter_map(|(record, _)| record.id).collect();
                ids.sort();
                warn!(%key, ?ids, "ambiguous reconciliation");
                return Err(ReconcileError::AmbiguousMatch {
                    attribute: attribute.to_string(),
                    url: url.to_string(),
                    ids,
                });
            }
        };

        let handle = CandidateHandle {
            session: self.id,
            index: self.candidates.len(),
        };
        self.candidates.push(candidate);
        self.cache.insert(key, handle);
        Ok(handle)
    }

    /// Records linking to `url` whose claim on `attribute` is exactly that URL.
    fn find_matches(
        &self,
        attribute: AttributeKey,
        url: &str,
    ) -> Result<Vec<(Record, RevisionId)>, ReconcileError> {
        let expected = Value::Url(url.to_string());
        let containers = self.backlinks.page_ids_containing_url(url)?;

        let mut record_ids: Vec<RecordId> = Vec::with_capacity(containers.len());
        for container in containers {
            if let Some(id) = self
                .store
                .entity_for_container(container)?
                .and_then(|entity| entity.as_record())
            {
                if !record_ids.contains(&id) {
                    record_ids.push(id);
                }
            }
        }
        debug!(url, candidates = record_ids.len(), "backlink candidates");

        let mut matches = Vec::new();
        for id in record_ids {
            let (record, revision) = match self.store.load_revision(id) {
                Ok(loaded) => loaded,
                Err(StoreError::NotFound(_)) => {
                    warn!(%id, "backlink index points at a missing record");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            if record
                .claims_for(attribute)
                .any(|claim| claim.value() == Some(&expected))
            {
                matches.push((record, revision));
            }
        }
        Ok(matches)
    }

    pub fn candidate(
        &self,
        handle: CandidateHandle,
    ) -> Result<&ResolvedCandidate, ReconcileError> {
        self.slot(handle).map(|index| &self.candidates[index])
    }

    fn slot(&self, handle: CandidateHandle) -> Result<usize, ReconcileError> {
        if handle.session == self.id && handle.index < self.candidates.len() {
            Ok(handle.index)
        } else {
            Err(foreign_handle(handle))
        }
    }

    /// Cached handle for a key, without resolving.
    pub fn lookup(&self, attribute: AttributeKey, url: &str) -> Option<CandidateHandle> {
        self.cache.get(&ReconciliationKey::new(attribute, url)).copied()
    }

    /// Number of distinct candidates resolved so far.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Replace a candidate with its persisted state; later resolutions see it as found.
    pub(crate) fn mark_saved(
        &mut self,
        handle: CandidateHandle,
        record: Record,
        revision: RevisionId,
    ) -> Result<(), ReconcileError> {
        let index = self.slot(handle)?;
        self.candidates[index] = ResolvedCandidate::Found { record, revision };
        Ok(())
    }
}

fn foreign_handle(handle: CandidateHandle) -> ReconcileError {
    ReconcileError::StoreFailure(format!(
        "candidate {} of session {} is not held by this session",
        handle.index, handle.session
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim_ids::SequentialClaimIds;
    use crate::error::ErrorKind;
    use crate::model::{ClaimId, EntityId, Snak};
    use crate::store::Store;

    const P1: AttributeKey = AttributeKey(1);

    fn persist_with_url(store: &Store, url: &str) -> (RecordId, RevisionId) {
        let mut record = Record::new();
        record.add_claim(
            Claim::new(P1, Value::Url(url.to_string())).with_id(ClaimId(format!("c-{url}"))),
        );
        store.create_record(&record, "seed").unwrap()
    }

    #[test]
    fn test_find_existing_record() {
        let store = Store::new();
        let ids = SequentialClaimIds::new();
        let (id, revision) = persist_with_url(&store, "http://x");

        let mut session = ReconciliationSession::new(&store, &store, &ids);
        let handle = session.resolve(P1, "http://x").unwrap();
        let candidate = session.candidate(handle).unwrap();

        assert_eq!(candidate.id(), Some(id));
        assert_eq!(candidate.revision(), Some(revision));
        assert_eq!(candidate.record(), &store.get(id).unwrap().0);
    }

    #[test]
    fn test_create_when_nothing_matches() {
        let store = Store::new();
        let ids = SequentialClaimIds::new();
        let mut session = ReconciliationSession::new(&store, &store, &ids);

        let handle = session.resolve(P1, "http://new").unwrap();
        let candidate = session.candidate(handle).unwrap();
        assert!(candidate.is_new());
        assert_eq!(candidate.revision(), None);

        let record = candidate.record();
        let id = record.id.unwrap();
        assert_eq!(record.claims.len(), 1);
        assert_eq!(record.claims[0].attribute, P1);
        assert_eq!(record.claims[0].value(), Some(&Value::Url("http://new".into())));
        assert_eq!(record.claims[0].id, Some(ClaimId(format!("{id}$1"))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_resolution_is_idempotent_within_session() {
        let store = Store::new();
        let ids = SequentialClaimIds::new();
        let mut session = ReconciliationSession::new(&store, &store, &ids);

        let first = session.resolve(P1, "http://new").unwrap();
        let second = session.resolve(P1, "http://new").unwrap();
        assert_eq!(first, second);
        assert_eq!(session.len(), 1);
        assert_eq!(session.lookup(P1, "http://new"), Some(first));

        let other_attribute = session.resolve(AttributeKey(2), "http://new").unwrap();
        assert_ne!(first, other_attribute);
    }

    #[test]
    fn test_fresh_session_starts_cold() {
        let store = Store::new();
        let ids = SequentialClaimIds::new();
        let first_id = {
            let mut session = ReconciliationSession::new(&store, &store, &ids);
            let handle = session.resolve(P1, "http://new").unwrap();
            session.candidate(handle).unwrap().id()
        };
        let mut session = ReconciliationSession::new(&store, &store, &ids);
        let handle = session.resolve(P1, "http://new").unwrap();
        assert_ne!(session.candidate(handle).unwrap().id(), first_id);
    }

    #[test]
    fn test_ambiguous_match_lists_all_ids() {
        let store = Store::new();
        let ids = SequentialClaimIds::new();
        let (a, _) = persist_with_url(&store, "http://dup");
        let (b, _) = persist_with_url(&store, "http://dup");
        let (c, _) = persist_with_url(&store, "http://dup");

        let mut session = ReconciliationSession::new(&store, &store, &ids);
        let err = session.resolve(P1, "http://dup").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousMatch);
        match err {
            ReconcileError::AmbiguousMatch { ids, .. } => assert_eq!(ids, vec![a, b, c]),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(session.is_empty());
    }

    #[test]
    fn test_only_exact_url_on_identifying_attribute_matches() {
        let store = Store::new();
        let ids = SequentialClaimIds::new();

        // same normalised link, different literal value
        persist_with_url(&store, "http://x/");
        // same URL under another attribute
        let mut other = Record::new();
        other.add_claim(
            Claim::new(AttributeKey(9), Value::Url("http://x".into())).with_id(ClaimId("o".into())),
        );
        store.create_record(&other, "seed").unwrap();
        // non-value snak on the identifying attribute
        let mut novalue = Record::new();
        novalue.add_claim(Claim::with_snak(P1, Snak::NoValue).with_id(ClaimId("n".into())));
        novalue.add_claim(
            Claim::new(AttributeKey(9), Value::Url("http://x".into())).with_id(ClaimId("m".into())),
        );
        store.create_record(&novalue, "seed").unwrap();
        // a non-record container linking to the URL
        store.register_container(EntityId::Attribute(AttributeKey(4)), ["http://x"]);

        let mut session = ReconciliationSession::new(&store, &store, &ids);
        let handle = session.resolve(P1, "http://x").unwrap();
        assert!(session.candidate(handle).unwrap().is_new());
    }

    #[test]
    fn test_handles_are_bound_to_their_session() {
        let store = Store::new();
        let ids = SequentialClaimIds::new();
        let mut first = ReconciliationSession::new(&store, &store, &ids);
        let mut second = ReconciliationSession::new(&store, &store, &ids);
        let handle = first.resolve(P1, "http://a").unwrap();
        second.resolve(P1, "http://b").unwrap();

        let err = second.candidate(handle).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreFailure);
        let record = first.candidate(handle).unwrap().record().clone();
        assert!(second.mark_saved(handle, record, RevisionId(1)).is_err());
        assert!(second.candidate(handle).is_err());
        assert!(first.candidate(handle).unwrap().is_new());
    }

    #[test]
    fn test_mark_saved_turns_new_into_found() {
        let store = Store::new();
        let ids = SequentialClaimIds::new();
        let mut session = ReconciliationSession::new(&store, &store, &ids);
        let handle = session.resolve(P1, "http://new").unwrap();
        let record = session.candidate(handle).unwrap().record().clone();

        session.mark_saved(handle, record.clone(), RevisionId(9)).unwrap();
        let again = session.resolve(P1, "http://new").unwrap();
        assert_eq!(again, handle);
        assert_eq!(
            session.candidate(again).unwrap(),
            &ResolvedCandidate::Found {
                record,
                revision: RevisionId(9)
            }
        );
    }
}
