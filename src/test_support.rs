use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value as Json};

use reconcile_edit::model::{ContainerId, EntityId};
use reconcile_edit::store::{StoreError, StoreResult};
use reconcile_edit::{
    AttributeDefinition, AttributeKey, BacklinkIndex, Ontology, ReconcileEdit, Record, RecordId,
    RecordStore, RevisionId, SequentialClaimIds, Store, ValueKind,
};

#[allow(dead_code)]
pub const IDENTIFIER: AttributeKey = AttributeKey(1);
#[allow(dead_code)]
pub const NAME: AttributeKey = AttributeKey(2);
#[allow(dead_code)]
pub const PARTS: AttributeKey = AttributeKey(3);
#[allow(dead_code)]
pub const SERIAL: AttributeKey = AttributeKey(4);

/// P1 url "identifier", P2 string "name", P3 record-reference "bill of materials",
/// P4 external-id "serial".
pub fn default_ontology() -> Ontology {
    let mut ontology = Ontology::new();
    ontology.add_attribute(AttributeDefinition::labelled(IDENTIFIER, "identifier", ValueKind::Url));
    ontology.add_attribute(AttributeDefinition::labelled(NAME, "name", ValueKind::String));
    ontology.add_attribute(AttributeDefinition::labelled(
        PARTS,
        "bill of materials",
        ValueKind::RecordReference,
    ));
    ontology.add_attribute(AttributeDefinition::labelled(SERIAL, "serial", ValueKind::ExternalId));
    ontology
}

/// Engine over an in-memory store with deterministic claim IDs.
#[allow(dead_code)]
pub fn engine() -> (ReconcileEdit, Arc<Store>) {
    engine_over(Arc::new(Store::new()))
}

#[allow(dead_code)]
pub fn engine_over<S>(store: Arc<S>) -> (ReconcileEdit, Arc<S>)
where
    S: RecordStore + BacklinkIndex + 'static,
{
    let engine = ReconcileEdit::with_backends(
        store.clone(),
        store.clone(),
        Arc::new(default_ontology()),
        Arc::new(SequentialClaimIds::new()),
    );
    (engine, store)
}

#[allow(dead_code)]
pub fn reconcile_block(attribute: &str) -> Json {
    json!({"reconcile-edit-version": "0.0.1", "urlReconcile": attribute})
}

/// Minimal entity whose first statement is the identifying URL.
#[allow(dead_code)]
pub fn minimal_entity(url: &str, statements: &[(&str, &str)]) -> Json {
    let mut all = vec![json!({"property": "P1", "value": url})];
    all.extend(
        statements
            .iter()
            .map(|(property, value)| json!({"property": property, "value": value})),
    );
    json!({
        "reconcile-edit-version": "0.0.1/minimal",
        "statements": all
    })
}

#[allow(dead_code)]
pub fn request(entity: Json) -> Json {
    json!({"reconcile": reconcile_block("P1"), "entity": entity})
}

#[allow(dead_code)]
pub fn batch_request(entities: Vec<Json>) -> Json {
    json!({"reconcile": reconcile_block("P1"), "entities": entities})
}

/// Store wrapper that fails the Nth write attempt (1-based), counting creates
/// and updates together.
#[allow(dead_code)]
pub struct FailingStore {
    inner: Arc<Store>,
    fail_on: usize,
    attempts: AtomicUsize,
}

#[allow(dead_code)]
impl FailingStore {
    pub fn new(inner: Arc<Store>, fail_on: usize) -> Self {
        Self {
            inner,
            fail_on,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &Store {
        &self.inner
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn check(&self) -> StoreResult<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt == self.fail_on {
            return Err(StoreError::Backend(format!("injected failure on write {attempt}")));
        }
        Ok(())
    }
}

impl BacklinkIndex for FailingStore {
    fn page_ids_containing_url(&self, url: &str) -> StoreResult<Vec<ContainerId>> {
        self.inner.page_ids_containing_url(url)
    }
}

impl RecordStore for FailingStore {
    fn entity_for_container(&self, container: ContainerId) -> StoreResult<Option<EntityId>> {
        self.inner.entity_for_container(container)
    }

    fn load_revision(&self, id: RecordId) -> StoreResult<(Record, RevisionId)> {
        self.inner.load_revision(id)
    }

    fn allocate_record_id(&self) -> StoreResult<RecordId> {
        self.inner.allocate_record_id()
    }

    fn create_record(&self, record: &Record, summary: &str) -> StoreResult<(RecordId, RevisionId)> {
        self.check()?;
        self.inner.create_record(record, summary)
    }

    fn update_record(
        &self,
        record: &Record,
        expected: RevisionId,
        summary: &str,
    ) -> StoreResult<RevisionId> {
        self.check()?;
        self.inner.update_record(record, expected, summary)
    }
}

/// A generated batch: entity bodies plus, per entity, its URL and the URLs it references.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct GeneratedBatch {
    pub entities: Vec<Json>,
    pub urls: Vec<String>,
    pub references: Vec<Vec<String>>,
}

/// Batch of `count` products over a pool of part URLs. Parts may repeat
/// across and within entities, and may name another product in the batch.
#[allow(dead_code)]
pub fn generate_batch(count: usize, seed: u64) -> GeneratedBatch {
    let mut rng = StdRng::seed_from_u64(seed);
    let urls: Vec<String> = (0..count)
        .map(|i| format!("https://parts.example.org/product/{i}"))
        .collect();
    let pool: Vec<String> = (0..count.max(1) * 2)
        .map(|i| format!("https://parts.example.org/part/{i}"))
        .collect();

    let mut entities = Vec::with_capacity(count);
    let mut references = Vec::with_capacity(count);
    for url in &urls {
        let mut refs: Vec<String> = Vec::new();
        for _ in 0..rng.random_range(0..4) {
            let target = if rng.random_bool(0.2) {
                urls[rng.random_range(0..urls.len())].clone()
            } else {
                pool[rng.random_range(0..pool.len())].clone()
            };
            refs.push(target);
        }
        let name = format!("Product {}", rng.random_range(0..1000));
        let mut statements: Vec<(&str, &str)> = vec![("P2", name.as_str())];
        statements.extend(refs.iter().map(|r| ("P3", r.as_str())));
        entities.push(minimal_entity(url, &statements));
        references.push(refs);
    }

    GeneratedBatch {
        entities,
        urls,
        references,
    }
}
