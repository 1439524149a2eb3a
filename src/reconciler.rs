//! Reconciles a submitted record against the store: validates the identifying
//! claim, resolves the target record and merges the submission into it.

use crate::error::ReconcileError;
use crate::model::{AttributeKey, Record, Value};
use crate::persistence::Reconciled;
use crate::resolver::ReconciliationSession;
use crate::strategy::EditStrategy;
use tracing::{debug, instrument};

/// The URL on the record's single identifying claim.
pub fn identifying_url(record: &Record, identifying: AttributeKey) -> Result<&str, ReconcileError> {
    let mut claims = record.claims_for(identifying);
    let (Some(claim), None) = (claims.next(), claims.next()) else {
        return Err(ReconcileError::MissingIdentifyingClaim {
            attribute: identifying.to_string(),
            found: record.claims_for(identifying).count(),
        });
    };
    match claim.value() {
        Some(Value::Url(url)) => Ok(url),
        _ => Err(ReconcileError::InvalidIdentifyingClaim {
            attribute: identifying.to_string(),
        }),
    }
}

pub struct ItemReconciler<'s> {
    strategy: &'s dyn EditStrategy,
}

impl<'s> ItemReconciler<'s> {
    pub fn new(strategy: &'s dyn EditStrategy) -> Self {
        Self { strategy }
    }

    #[instrument(skip_all, fields(identifying = %identifying))]
    pub fn reconcile(
        &self,
        submitted: Record,
        identifying: AttributeKey,
        session: &mut ReconciliationSession<'_>,
    ) -> Result<Reconciled, ReconcileError> {
        let url = identifying_url(&submitted, identifying)?.to_string();
        let handle = session.resolve(identifying, &url)?;

        let candidate = session.candidate(handle)?;
        let base = candidate.record().clone();
        let base_revision = candidate.revision();
        debug!(%url, record = ?base.id, ?base_revision, "reconciled target");

        let merged = self.strategy.apply(base, submitted);
        Ok(Reconciled::new(handle, merged, base_revision))
    }
}
