//! # Reconcile Edit
//!
//! A URL-keyed record reconciliation and merge engine.
//!
//! A submission describes a record and names one URL-valued identifying
//! attribute. The engine finds the unique stored record carrying that URL (or
//! allocates a new one), merges the submission into it with put/replace
//! semantics, resolves URL-valued references to other records the same way,
//! and saves everything with per-record optimistic concurrency.

pub mod claim_ids;
pub mod config;
pub mod error;
pub mod index;
pub mod input;
pub mod model;
pub mod ontology;
pub mod persistence;
pub mod reconciler;
pub mod request;
pub mod resolver;
pub mod store;
pub mod strategy;

// Re-export main types for convenience
pub use claim_ids::{ClaimIdGenerator, RandomClaimIds, SequentialClaimIds};
pub use config::{ClaimIdScheme, ConfigOverrides, ReconcileConfig};
pub use error::{BatchError, ErrorKind, ReconcileError};
pub use input::{EntityVersion, InputResolver, Submission};
pub use model::{AttributeKey, Claim, ClaimId, Record, RecordId, RevisionId, Value, ValueKind};
pub use ontology::{AttributeDefinition, AttributeLookup, Ontology};
pub use persistence::{EditSaver, Reconciled, Saved};
pub use reconciler::ItemReconciler;
pub use request::{BatchRequest, EditRequest, EditRequestParser};
pub use resolver::{CandidateHandle, ReconciliationSession, ResolvedCandidate};
pub use store::{BacklinkIndex, RecordStore, Store, StoreError};
pub use strategy::{EditStrategy, PutStrategy};

use anyhow::Context;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Main entry point: one engine over a record store, a backlink index and an
/// attribute lookup.
pub struct ReconcileEdit {
    store: Arc<dyn RecordStore>,
    backlinks: Arc<dyn BacklinkIndex>,
    lookup: Arc<dyn AttributeLookup>,
    strategy: PutStrategy,
    summary: String,
}

impl ReconcileEdit {
    /// Engine over a fresh in-memory store with random claim IDs.
    pub fn new(ontology: Ontology) -> Self {
        Self::with_store(ontology, Arc::new(Store::new()))
    }

    /// Engine over a store that also serves as its backlink index.
    pub fn with_store<S>(ontology: Ontology, store: Arc<S>) -> Self
    where
        S: RecordStore + BacklinkIndex + 'static,
    {
        Self::with_backends(
            store.clone(),
            store,
            Arc::new(ontology),
            Arc::new(RandomClaimIds),
        )
    }

    pub fn with_backends(
        store: Arc<dyn RecordStore>,
        backlinks: Arc<dyn BacklinkIndex>,
        lookup: Arc<dyn AttributeLookup>,
        claim_ids: Arc<dyn ClaimIdGenerator>,
    ) -> Self {
        Self {
            store,
            backlinks,
            lookup,
            strategy: PutStrategy::new(claim_ids),
            summary: config::DEFAULT_EDIT_SUMMARY.to_string(),
        }
    }

    /// Build an in-memory engine from configuration. Returns the store as well
    /// so callers can inspect what was written.
    pub fn from_config(config: &ReconcileConfig) -> anyhow::Result<(Self, Arc<Store>)> {
        let ontology = match &config.ontology {
            Some(path) => Ontology::from_json_file(path)
                .with_context(|| format!("load ontology {}", path.display()))?,
            None => Ontology::new(),
        };
        let store = Arc::new(Store::with_config(&config.store));
        let engine = Self::with_backends(
            store.clone(),
            store.clone(),
            Arc::new(ontology),
            claim_ids::generator_for(config.claim_ids),
        )
        .with_summary(config.summary.clone());
        Ok((engine, store))
    }

    /// Edit summary written with every save.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn lookup(&self) -> &dyn AttributeLookup {
        self.lookup.as_ref()
    }

    /// Start a resolution scope. One session serves one API call.
    pub fn session(&self) -> ReconciliationSession<'_> {
        ReconciliationSession::new(
            self.store.as_ref(),
            self.backlinks.as_ref(),
            self.strategy.claim_ids().as_ref(),
        )
    }

    pub fn request_parser(&self) -> EditRequestParser<'_> {
        EditRequestParser::new(self.lookup.as_ref())
    }

    /// Reconcile and save one submission within an existing session.
    #[instrument(skip_all, fields(identifying = %identifying))]
    pub fn submit_in(
        &self,
        session: &mut ReconciliationSession<'_>,
        identifying: AttributeKey,
        submission: &Submission,
    ) -> Result<Saved, ReconcileError> {
        let (record, referenced) =
            InputResolver::new(self.lookup.as_ref()).resolve(submission, identifying, session)?;
        let reconciled =
            ItemReconciler::new(&self.strategy).reconcile(record, identifying, session)?;
        EditSaver::new(self.store.as_ref(), &self.summary).persist(session, reconciled, &referenced)
    }

    /// Reconcile and save one submission in a fresh session.
    pub fn submit(
        &self,
        identifying: AttributeKey,
        submission: &Submission,
    ) -> Result<Saved, ReconcileError> {
        let mut session = self.session();
        self.submit_in(&mut session, identifying, submission)
    }

    /// Reconcile and save submissions in order, sharing one session. Stops at
    /// the first failure; earlier submissions stay saved.
    pub fn submit_batch(
        &self,
        identifying: AttributeKey,
        submissions: &[Submission],
    ) -> Result<Vec<Saved>, BatchError> {
        let mut session = self.session();
        let mut completed = Vec::with_capacity(submissions.len());
        for (index, submission) in submissions.iter().enumerate() {
            match self.submit_in(&mut session, identifying, submission) {
                Ok(saved) => completed.push(saved),
                Err(source) => {
                    warn!(index, completed = completed.len(), error = %source, "batch aborted");
                    return Err(BatchError {
                        index,
                        completed,
                        source,
                    });
                }
            }
        }
        Ok(completed)
    }

    /// Handle a `{reconcile, entity}` request body.
    pub fn handle_request(&self, body: &serde_json::Value) -> Result<Saved, ReconcileError> {
        let request = self.request_parser().parse_request(body)?;
        let submission = request.submission()?;
        self.submit(request.identifying, &submission)
    }

    /// Handle a `{reconcile, entities}` request body. Envelope errors abort
    /// before any entity is processed; entity body errors abort at that entity.
    pub fn handle_batch(&self, body: &serde_json::Value) -> Result<Vec<Saved>, BatchError> {
        let batch = self.request_parser().parse_batch(body)?;
        let mut session = self.session();
        let mut completed = Vec::with_capacity(batch.requests.len());
        for (index, request) in batch.requests.iter().enumerate() {
            let outcome = request.submission().and_then(|submission| {
                self.submit_in(&mut session, batch.identifying, &submission)
            });
            match outcome {
                Ok(saved) => completed.push(saved),
                Err(source) => {
                    warn!(index, completed = completed.len(), error = %source, "batch aborted");
                    return Err(BatchError {
                        index,
                        completed,
                        source,
                    });
                }
            }
        }
        Ok(completed)
    }
}

impl std::fmt::Debug for ReconcileEdit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileEdit")
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> (ReconcileEdit, Arc<Store>) {
        let mut ontology = Ontology::new();
        ontology.add_attribute(AttributeDefinition::new(AttributeKey(1), ValueKind::Url));
        ontology.add_attribute(AttributeDefinition::new(AttributeKey(2), ValueKind::String));
        let store = Arc::new(Store::new());
        (ReconcileEdit::with_store(ontology, store.clone()), store)
    }

    #[test]
    fn test_submit_creates_then_updates() {
        let (engine, store) = engine();
        let body = |name: &str| {
            json!({
                "reconcile": {"reconcile-edit-version": "0.0.1", "urlReconcile": "P1"},
                "entity": {
                    "reconcile-edit-version": "0.0.1/minimal",
                    "statements": [
                        {"property": "P1", "value": "https://example.com/widget"},
                        {"property": "P2", "value": name}
                    ]
                }
            })
        };

        let first = engine.handle_request(&body("Widget")).unwrap();
        let second = engine.handle_request(&body("Gadget")).unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.revision > first.revision);
        assert_eq!(store.len(), 1);

        let writes = store.writes();
        assert_eq!(writes.len(), 2);
        assert!(writes[0].created);
        assert!(!writes[1].created);
        assert_eq!(writes[1].summary, config::DEFAULT_EDIT_SUMMARY);
    }

    #[test]
    fn test_with_summary() {
        let (engine, _) = engine();
        let engine = engine.with_summary("Bulk import");
        assert_eq!(engine.summary(), "Bulk import");
    }
}
