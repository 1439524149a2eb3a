//! Claim ID minting.

use crate::config::ClaimIdScheme;
use crate::model::{ClaimId, RecordId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Mints fresh claim IDs scoped to a record.
pub trait ClaimIdGenerator: Send + Sync {
    fn new_claim_id(&self, record: Option<RecordId>) -> ClaimId;
}

/// `<record>$<uuid v4>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomClaimIds;

impl ClaimIdGenerator for RandomClaimIds {
    fn new_claim_id(&self, record: Option<RecordId>) -> ClaimId {
        let component = uuid::Uuid::new_v4().hyphenated().to_string().to_uppercase();
        ClaimId::scoped(record, &component)
    }
}

/// `<record>$<n>` from a process-wide counter. Deterministic for a given call order.
#[derive(Debug, Default)]
pub struct SequentialClaimIds {
    next: AtomicU64,
}

impl SequentialClaimIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClaimIdGenerator for SequentialClaimIds {
    fn new_claim_id(&self, record: Option<RecordId>) -> ClaimId {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        ClaimId::scoped(record, &n.to_string())
    }
}

pub fn generator_for(scheme: ClaimIdScheme) -> Arc<dyn ClaimIdGenerator> {
    match scheme {
        ClaimIdScheme::Random => Arc::new(RandomClaimIds),
        ClaimIdScheme::Sequential => Arc::new(SequentialClaimIds::new()),
    }
}
