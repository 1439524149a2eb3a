//! # Persistence Module
//!
//! Saves a reconciled target together with the not-yet-persisted records it
//! references. Each record is an independent commit: referenced records saved
//! before a later failure stay in the store.

use crate::error::ReconcileError;
use crate::model::{Record, RecordId, RevisionId};
use crate::resolver::{CandidateHandle, ReconciliationSession};
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// A merged target waiting to be saved.
#[derive(Debug, PartialEq, Eq)]
pub struct Reconciled {
    handle: CandidateHandle,
    record: Record,
    base_revision: Option<RevisionId>,
}

impl Reconciled {
    pub(crate) fn new(
        handle: CandidateHandle,
        record: Record,
        base_revision: Option<RevisionId>,
    ) -> Self {
        Self {
            handle,
            record,
            base_revision,
        }
    }

    /// Session handle of the target record.
    pub fn handle(&self) -> CandidateHandle {
        self.handle
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Revision the target was loaded at; `None` for a record that does not exist yet.
    pub fn base_revision(&self) -> Option<RevisionId> {
        self.base_revision
    }

    pub fn is_new(&self) -> bool {
        self.base_revision.is_none()
    }

    /// Consume the target once stored, publishing the stored state to the session.
    ///
    /// Fails if the target was resolved in a different session.
    pub fn finish(
        self,
        session: &mut ReconciliationSession<'_>,
        id: RecordId,
        revision: RevisionId,
    ) -> Result<Saved, ReconcileError> {
        let mut record = self.record;
        record.id = Some(id);
        session.mark_saved(self.handle, record, revision)?;
        Ok(Saved { id, revision })
    }
}

/// Outcome of a successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Saved {
    pub id: RecordId,
    pub revision: RevisionId,
}

/// Batch Persistence Orchestrator.
pub struct EditSaver<'a> {
    store: &'a dyn RecordStore,
    summary: &'a str,
}

impl<'a> EditSaver<'a> {
    pub fn new(store: &'a dyn RecordStore, summary: &'a str) -> Self {
        Self { store, summary }
    }

    /// Save unsaved referenced records in order, then the target.
    ///
    /// Stops at the first failure. Nothing already committed is undone.
    /// Handles not held by `session` are rejected before anything is written.
    #[instrument(
        skip_all,
        fields(record = ?reconciled.record().id, referenced = referenced.len())
    )]
    pub fn persist(
        &self,
        session: &mut ReconciliationSession<'_>,
        reconciled: Reconciled,
        referenced: &[CandidateHandle],
    ) -> Result<Saved, ReconcileError> {
        session.candidate(reconciled.handle())?;
        for &handle in referenced {
            session.candidate(handle)?;
        }

        for &handle in referenced {
            let candidate = session.candidate(handle)?;
            if candidate.revision().is_some() {
                debug!(id = ?candidate.id(), "referenced record already stored");
                continue;
            }
            if handle == reconciled.handle() {
                debug!(id = ?candidate.id(), "referenced record is the target");
                continue;
            }

            let mut record = candidate.record().clone();
            let (id, revision) = self
                .store
                .create_record(&record, self.summary)
                .map_err(|err| {
                    warn!(id = ?record.id, error = %err, "referenced record save failed");
                    ReconcileError::from(err)
                })?;
            info!(%id, %revision, "created referenced record");
            record.id = Some(id);
            session.mark_saved(handle, record, revision)?;
        }

        let (id, revision) = match reconciled.base_revision() {
            None => self
                .store
                .create_record(reconciled.record(), self.summary)
                .map(|(id, revision)| {
                    info!(%id, %revision, "created record");
                    (id, revision)
                }),
            Some(base) => {
                let id = reconciled.record().id.ok_or_else(|| {
                    ReconcileError::StoreFailure("stored target has no record id".to_string())
                })?;
                self.store
                    .update_record(reconciled.record(), base, self.summary)
                    .map(|revision| {
                        info!(%id, %base, %revision, "updated record");
                        (id, revision)
                    })
            }
        }
        .map_err(|err| {
            warn!(record = ?reconciled.record().id, error = %err, "target save failed");
            ReconcileError::from(err)
        })?;

        reconciled.finish(session, id, revision)
    }
}
