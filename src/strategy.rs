//! # Merge Strategy
//!
//! Combines a base record (the one found or allocated by identity resolution)
//! with a submitted record. Submitted content decides membership; existing
//! claims only survive to keep their claim IDs when a value is resubmitted.

use crate::claim_ids::ClaimIdGenerator;
use crate::model::{AttributeKey, Claim, Record};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Turns `(base, submitted)` into the record to persist.
pub trait EditStrategy: Send + Sync {
    fn apply(&self, base: Record, submitted: Record) -> Record;
}

/// Put/replace semantics.
#[derive(Clone)]
pub struct PutStrategy {
    claim_ids: Arc<dyn ClaimIdGenerator>,
}

impl PutStrategy {
    pub fn new(claim_ids: Arc<dyn ClaimIdGenerator>) -> Self {
        Self { claim_ids }
    }

    pub fn claim_ids(&self) -> &Arc<dyn ClaimIdGenerator> {
        &self.claim_ids
    }
}

impl std::fmt::Debug for PutStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PutStrategy").finish_non_exhaustive()
    }
}

impl EditStrategy for PutStrategy {
    fn apply(&self, base: Record, submitted: Record) -> Record {
        let Record {
            id,
            mut terms,
            site_links: _,
            claims: base_claims,
        } = base;

        for (lang, text) in submitted.terms.labels {
            terms.labels.insert(lang, text);
        }
        for (lang, text) in submitted.terms.descriptions {
            terms.descriptions.insert(lang, text);
        }
        for (lang, aliases) in submitted.terms.aliases {
            let existing = terms.aliases.remove(&lang).unwrap_or_default();
            terms.set_aliases(lang, aliases.into_iter().chain(existing));
        }

        let mut existing: BTreeMap<AttributeKey, Vec<Claim>> = BTreeMap::new();
        for claim in base_claims {
            existing.entry(claim.attribute).or_default().push(claim);
        }

        let mut kept: Vec<Claim> = Vec::new();
        let mut added: Vec<Claim> = Vec::new();
        for claim in submitted.claims {
            if kept.iter().chain(&added).any(|c| c.same_value(&claim)) {
                continue;
            }
            let matched = existing.get_mut(&claim.attribute).and_then(|group| {
                group
                    .iter()
                    .position(|c| c.same_value(&claim))
                    .map(|pos| group.remove(pos))
            });
            match matched {
                Some(previous) => kept.push(previous),
                None => {
                    let fresh = self.claim_ids.new_claim_id(id);
                    added.push(Claim {
                        id: Some(fresh),
                        ..claim
                    });
                }
            }
        }

        let dropped: usize = existing.values().map(Vec::len).sum();
        debug!(
            record = ?id,
            kept = kept.len(),
            added = added.len(),
            dropped,
            "merged claims"
        );

        kept.extend(added);
        Record {
            id,
            terms,
            site_links: submitted.site_links,
            claims: kept,
        }
    }
}
