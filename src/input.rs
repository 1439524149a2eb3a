//! # Input Module
//!
//! Raw submission shapes and the resolver that turns them into a [`Record`]
//! plus the records it references.
//!
//! Two shapes are accepted, selected by the entity version tag:
//!
//! - minimal: `{labels, descriptions, aliases, sitelinks, statements: [{property, value}]}`,
//!   where `siteLinks` is accepted for `sitelinks`. Statements carrying qualifiers or
//!   references are rejected.
//!   A record-reference value given as a URL is resolved through the
//!   [`ReconciliationSession`] against the identifying attribute.
//! - full: a complete record serialization. Values are taken literally and
//!   nothing is resolved recursively.

use crate::config::{ENTITY_VERSION_FULL, ENTITY_VERSION_MINIMAL, SUPPORTED_ENTITY_VERSIONS};
use crate::error::ReconcileError;
use crate::model::{AttributeKey, Claim, ClaimId, Record, RecordId, Snak, Value, ValueKind};
use crate::ontology::AttributeLookup;
use crate::resolver::{CandidateHandle, ReconciliationSession};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument};
use url::Url;

/// Entity input version tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityVersion {
    Minimal,
    Full,
}

impl EntityVersion {
    /// Parse the version tag carried by an entity.
    pub fn parse(tag: Option<&str>) -> Result<Self, ReconcileError> {
        match tag {
            None => Err(ReconcileError::UnspecifiedEntityVersion),
            Some(ENTITY_VERSION_MINIMAL) => Ok(EntityVersion::Minimal),
            Some(ENTITY_VERSION_FULL) => Ok(EntityVersion::Full),
            Some(other) => Err(ReconcileError::InvalidEntityVersion {
                found: other.to_string(),
                supported: SUPPORTED_ENTITY_VERSIONS
                    .iter()
                    .map(|v| v.to_string())
                    .collect(),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityVersion::Minimal => ENTITY_VERSION_MINIMAL,
            EntityVersion::Full => ENTITY_VERSION_FULL,
        }
    }
}

/// `{property, value}` entry of the minimal shape. Both keys are required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MinimalStatement {
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub qualifiers: Option<serde_json::Value>,
    #[serde(default)]
    pub references: Option<serde_json::Value>,
}

impl MinimalStatement {
    /// Whether the statement carries qualifiers or references.
    pub fn has_extras(&self) -> bool {
        [&self.qualifiers, &self.references]
            .into_iter()
            .flatten()
            .any(|extra| match extra {
                serde_json::Value::Null => false,
                serde_json::Value::Object(map) => !map.is_empty(),
                serde_json::Value::Array(list) => !list.is_empty(),
                _ => true,
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MinimalEntity {
    pub labels: BTreeMap<String, String>,
    pub descriptions: BTreeMap<String, String>,
    pub aliases: BTreeMap<String, Vec<String>>,
    #[serde(alias = "siteLinks")]
    pub sitelinks: BTreeMap<String, String>,
    pub statements: Vec<MinimalStatement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TermValue {
    pub language: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FullSiteLink {
    pub site: String,
    pub title: String,
    #[serde(default)]
    pub badges: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FullDataValue {
    #[serde(rename = "type")]
    pub value_type: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FullSnak {
    pub snaktype: String,
    pub property: String,
    #[serde(default)]
    pub datavalue: Option<FullDataValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FullClaim {
    pub mainsnak: FullSnak,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub qualifiers: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub references: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FullEntity {
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    pub labels: BTreeMap<String, TermValue>,
    pub descriptions: BTreeMap<String, TermValue>,
    pub aliases: BTreeMap<String, Vec<TermValue>>,
    pub sitelinks: BTreeMap<String, FullSiteLink>,
    pub claims: BTreeMap<String, Vec<FullClaim>>,
}

/// A parsed entity body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Minimal(MinimalEntity),
    Full(FullEntity),
}

impl Submission {
    /// Parse an entity body of the given version. Unknown keys are ignored.
    pub fn parse(
        version: EntityVersion,
        entity: &serde_json::Value,
    ) -> Result<Self, ReconcileError> {
        match version {
            EntityVersion::Minimal => deserialize(entity).map(Submission::Minimal),
            EntityVersion::Full => {
                let full: FullEntity = deserialize(entity)?;
                match full.entity_type.as_deref() {
                    None | Some("item") => Ok(Submission::Full(full)),
                    Some(other) => Err(ReconcileError::malformed(format!(
                        "unsupported entity type {other:?}, expected \"item\""
                    ))),
                }
            }
        }
    }

    /// Parse an entity body, reading the version from its version key.
    pub fn from_json(entity: &serde_json::Value) -> Result<Self, ReconcileError> {
        let tag = entity
            .get(crate::config::VERSION_KEY)
            .and_then(serde_json::Value::as_str);
        Self::parse(EntityVersion::parse(tag)?, entity)
    }

    pub fn version(&self) -> EntityVersion {
        match self {
            Submission::Minimal(_) => EntityVersion::Minimal,
            Submission::Full(_) => EntityVersion::Full,
        }
    }
}

fn deserialize<T: DeserializeOwned>(entity: &serde_json::Value) -> Result<T, ReconcileError> {
    if !entity.is_object() {
        return Err(ReconcileError::malformed("entity must be a JSON object"));
    }
    T::deserialize(entity).map_err(|err| ReconcileError::malformed(err.to_string()))
}

/// Whether `raw` should be resolved as a reconciliation URL rather than parsed literally.
pub fn is_reconcilable_url(raw: &str) -> bool {
    Url::parse(raw).is_ok_and(|url| url.has_host())
}

/// Parse a literal value for an attribute of the given kind.
pub fn parse_value(
    attribute: AttributeKey,
    kind: ValueKind,
    raw: &str,
) -> Result<Value, ReconcileError> {
    let invalid = || ReconcileError::InvalidValue {
        attribute: attribute.to_string(),
        kind: kind.to_string(),
        value: raw.to_string(),
    };
    match kind {
        ValueKind::Url if is_reconcilable_url(raw) => Ok(Value::Url(raw.to_string())),
        ValueKind::Url => Err(invalid()),
        ValueKind::String | ValueKind::ExternalId if raw.trim().is_empty() => Err(invalid()),
        ValueKind::String => Ok(Value::String(raw.to_string())),
        ValueKind::ExternalId => Ok(Value::ExternalId(raw.to_string())),
        ValueKind::RecordReference => raw
            .parse::<RecordId>()
            .map(Value::Record)
            .map_err(|_| invalid()),
    }
}

/// A claim whose value may still need identity resolution.
enum PendingClaim {
    Ready(Claim),
    Reference { attribute: AttributeKey, url: String },
}

impl PendingClaim {
    fn attribute(&self) -> AttributeKey {
        match self {
            PendingClaim::Ready(claim) => claim.attribute,
            PendingClaim::Reference { attribute, .. } => *attribute,
        }
    }
}

/// Recursive Input Resolver.
pub struct InputResolver<'l> {
    lookup: &'l dyn AttributeLookup,
}

impl<'l> InputResolver<'l> {
    pub fn new(lookup: &'l dyn AttributeLookup) -> Self {
        Self { lookup }
    }

    /// Build the submitted record and the candidates it references, in first-seen order.
    ///
    /// Every claim is typed and validated, and the identifying claim checked,
    /// before the session is asked to resolve anything.
    #[instrument(
        skip_all,
        fields(identifying = %identifying, version = submission.version().as_str())
    )]
    pub fn resolve(
        &self,
        submission: &Submission,
        identifying: AttributeKey,
        session: &mut ReconciliationSession<'_>,
    ) -> Result<(Record, Vec<CandidateHandle>), ReconcileError> {
        let (mut record, pending) = match submission {
            Submission::Minimal(entity) => self.minimal(entity)?,
            Submission::Full(entity) => self.full(entity)?,
        };
        check_identifying(&pending, identifying)?;

        let mut referenced: Vec<CandidateHandle> = Vec::new();
        for claim in pending {
            let claim = match claim {
                PendingClaim::Ready(claim) => claim,
                PendingClaim::Reference { attribute, url } => {
                    let handle = session.resolve(identifying, &url)?;
                    if !referenced.contains(&handle) {
                        referenced.push(handle);
                    }
                    let id = session.candidate(handle)?.id().ok_or_else(|| {
                        ReconcileError::StoreFailure(format!("no record id resolved for {url}"))
                    })?;
                    Claim::new(attribute, Value::Record(id))
                }
            };
            record.add_claim(claim);
        }
        debug!(
            claims = record.claims.len(),
            referenced = referenced.len(),
            "resolved submission"
        );
        Ok((record, referenced))
    }

    fn minimal(
        &self,
        entity: &MinimalEntity,
    ) -> Result<(Record, Vec<PendingClaim>), ReconcileError> {
        let mut record = Record::new();
        for (lang, text) in &entity.labels {
            record.terms.set_label(lang.as_str(), text.as_str());
        }
        for (lang, text) in &entity.descriptions {
            record.terms.set_description(lang.as_str(), text.as_str());
        }
        for (lang, aliases) in &entity.aliases {
            record.terms.set_aliases(lang.as_str(), aliases.iter().cloned());
        }
        for (site, page) in &entity.sitelinks {
            record.set_site_link(site.as_str(), page.as_str());
        }

        let mut pending = Vec::with_capacity(entity.statements.len());
        for statement in &entity.statements {
            let (Some(property), Some(raw)) = (&statement.property, &statement.value) else {
                return Err(ReconcileError::malformed(
                    "statements must have property and value keys",
                ));
            };
            let (attribute, kind) = self.lookup.resolve(property)?;
            if statement.has_extras() {
                return Err(ReconcileError::UnsupportedClaimShape {
                    attribute: attribute.to_string(),
                });
            }
            if kind == ValueKind::RecordReference && is_reconcilable_url(raw) {
                pending.push(PendingClaim::Reference {
                    attribute,
                    url: raw.clone(),
                });
            } else {
                let value = parse_value(attribute, kind, raw)?;
                pending.push(PendingClaim::Ready(Claim::new(attribute, value)));
            }
        }
        Ok((record, pending))
    }

    fn full(&self, entity: &FullEntity) -> Result<(Record, Vec<PendingClaim>), ReconcileError> {
        let mut record = Record::new();
        for (lang, term) in &entity.labels {
            record.terms.set_label(lang.as_str(), term.value.as_str());
        }
        for (lang, term) in &entity.descriptions {
            record.terms.set_description(lang.as_str(), term.value.as_str());
        }
        for (lang, terms) in &entity.aliases {
            record
                .terms
                .set_aliases(lang.as_str(), terms.iter().map(|t| t.value.clone()));
        }
        for (key, link) in &entity.sitelinks {
            if key != &link.site {
                return Err(ReconcileError::malformed(format!(
                    "site link keyed {key} names site {}",
                    link.site
                )));
            }
            record.set_site_link(link.site.as_str(), link.title.as_str());
        }

        let mut pending = Vec::new();
        for (property, claims) in &entity.claims {
            for claim in claims {
                let (attribute, kind) = self.lookup.resolve(property)?;
                if !claim.qualifiers.is_empty() || !claim.references.is_empty() {
                    return Err(ReconcileError::UnsupportedClaimShape {
                        attribute: attribute.to_string(),
                    });
                }
                let (snak_attribute, _) = self.lookup.resolve(&claim.mainsnak.property)?;
                if snak_attribute != attribute {
                    return Err(ReconcileError::malformed(format!(
                        "claim listed under {attribute} has main snak on {snak_attribute}"
                    )));
                }
                let snak = full_snak(attribute, kind, &claim.mainsnak)?;
                let mut parsed = Claim::with_snak(attribute, snak);
                if let Some(id) = &claim.id {
                    parsed = parsed.with_id(ClaimId(id.clone()));
                }
                pending.push(PendingClaim::Ready(parsed));
            }
        }
        Ok((record, pending))
    }
}

fn full_snak(
    attribute: AttributeKey,
    kind: ValueKind,
    snak: &FullSnak,
) -> Result<Snak, ReconcileError> {
    match snak.snaktype.as_str() {
        "novalue" => Ok(Snak::NoValue),
        "somevalue" => Ok(Snak::SomeValue),
        "value" => {
            let datavalue = snak.datavalue.as_ref().ok_or_else(|| {
                ReconcileError::malformed(format!("value snak on {attribute} has no datavalue"))
            })?;
            full_value(attribute, kind, datavalue).map(Snak::Value)
        }
        other => Err(ReconcileError::malformed(format!("unknown snak type {other:?}"))),
    }
}

fn full_value(
    attribute: AttributeKey,
    kind: ValueKind,
    datavalue: &FullDataValue,
) -> Result<Value, ReconcileError> {
    let invalid = || ReconcileError::InvalidValue {
        attribute: attribute.to_string(),
        kind: kind.to_string(),
        value: datavalue.value.to_string(),
    };
    match (datavalue.value_type.as_str(), kind) {
        ("string", ValueKind::Url | ValueKind::String | ValueKind::ExternalId) => {
            let raw = datavalue.value.as_str().ok_or_else(invalid)?;
            parse_value(attribute, kind, raw)
        }
        ("wikibase-entityid", ValueKind::RecordReference) => {
            if let Some(id) = datavalue.value.get("id").and_then(serde_json::Value::as_str) {
                return id.parse::<RecordId>().map(Value::Record).map_err(|_| invalid());
            }
            datavalue
                .value
                .get("numeric-id")
                .and_then(serde_json::Value::as_u64)
                .filter(|n| *n > 0)
                .map(|n| Value::Record(RecordId(n)))
                .ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

/// Exactly one claim on the identifying attribute, carrying a URL value.
fn check_identifying(
    pending: &[PendingClaim],
    identifying: AttributeKey,
) -> Result<(), ReconcileError> {
    let mut on_identifying = pending.iter().filter(|c| c.attribute() == identifying);
    let first = on_identifying.next();
    let found = usize::from(first.is_some()) + on_identifying.count();
    if found != 1 {
        return Err(ReconcileError::MissingIdentifyingClaim {
            attribute: identifying.to_string(),
            found,
        });
    }
    match first {
        Some(PendingClaim::Ready(claim)) if matches!(claim.value(), Some(Value::Url(_))) => Ok(()),
        _ => Err(ReconcileError::InvalidIdentifyingClaim {
            attribute: identifying.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim_ids::SequentialClaimIds;
    use crate::error::ErrorKind;
    use crate::ontology::{AttributeDefinition, Ontology};
    use crate::store::Store;
    use serde_json::json;

    const P1: AttributeKey = AttributeKey(1);

    fn ontology() -> Ontology {
        let mut ontology = Ontology::new();
        ontology.add_attribute(AttributeDefinition::labelled(P1, "identifier", ValueKind::Url));
        ontology.add_attribute(AttributeDefinition::labelled(
            AttributeKey(2),
            "name",
            ValueKind::String,
        ));
        ontology.add_attribute(AttributeDefinition::labelled(
            AttributeKey(3),
            "bill of materials",
            ValueKind::RecordReference,
        ));
        ontology.add_attribute(AttributeDefinition::new(AttributeKey(4), ValueKind::ExternalId));
        ontology
    }

    fn minimal(entity: serde_json::Value) -> Submission {
        Submission::parse(EntityVersion::Minimal, &entity).unwrap()
    }

    #[test]
    fn test_entity_version_parsing() {
        assert_eq!(EntityVersion::parse(Some("0.0.1/minimal")), Ok(EntityVersion::Minimal));
        assert_eq!(EntityVersion::parse(Some("0.0.1/full")), Ok(EntityVersion::Full));
        assert_eq!(
            EntityVersion::parse(None),
            Err(ReconcileError::UnspecifiedEntityVersion)
        );
        let err = EntityVersion::parse(Some("0.0.2")).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidEntityVersion { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_parse_value_by_kind() {
        assert_eq!(
            parse_value(P1, ValueKind::Url, "https://example.com/a"),
            Ok(Value::Url("https://example.com/a".into()))
        );
        assert!(parse_value(P1, ValueKind::Url, "not a url").is_err());
        assert!(parse_value(P1, ValueKind::Url, "mailto:someone@example.com").is_err());
        assert_eq!(
            parse_value(P1, ValueKind::RecordReference, "Q12"),
            Ok(Value::Record(RecordId(12)))
        );
        let err = parse_value(P1, ValueKind::String, "  ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_minimal_shape_builds_record() {
        let ontology = ontology();
        let store = Store::new();
        let ids = SequentialClaimIds::new();
        let mut session = ReconciliationSession::new(&store, &store, &ids);

        let submission = minimal(json!({
            "reconcile-edit-version": "0.0.1/minimal",
            "labels": {"en": "en-label"},
            "descriptions": {"fr": "fr-desc"},
            "aliases": {"en": ["en-alias1", "en-alias2"]},
            "sitelinks": {"site1": "SomePage"},
            "statements": [
                {"property": "P1", "value": "http://example.com/1"},
                {"property": "name", "value": "im-a-string"},
                {"property": "P4", "value": "ABC-1"}
            ]
        }));
        let (record, referenced) = InputResolver::new(&ontology)
            .resolve(&submission, P1, &mut session)
            .unwrap();

        assert!(referenced.is_empty());
        assert!(session.is_empty());
        assert_eq!(record.id, None);
        assert_eq!(record.terms.label("en"), Some("en-label"));
        assert_eq!(record.terms.description("fr"), Some("fr-desc"));
        assert_eq!(record.terms.aliases("en").len(), 2);
        assert_eq!(record.site_links.get("site1").map(String::as_str), Some("SomePage"));
        assert_eq!(
            record.claims,
            vec![
                Claim::new(P1, Value::Url("http://example.com/1".into())),
                Claim::new(AttributeKey(2), Value::String("im-a-string".into())),
                Claim::new(AttributeKey(4), Value::ExternalId("ABC-1".into())),
            ]
        );
    }

    #[test]
    fn test_statement_keys_are_required() {
        let ontology = ontology();
        let store = Store::new();
        let ids = SequentialClaimIds::new();
        let resolver = InputResolver::new(&ontology);

        for statement in [json!({"value": "x"}), json!({"property": "P2"})] {
            let mut session = ReconciliationSession::new(&store, &store, &ids);
            let submission = minimal(json!({"statements": [statement]}));
            let err = resolver.resolve(&submission, P1, &mut session).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedInput);
            assert_eq!(err.message_key(), "reconcile-edit-input-required-keys");
        }
    }

    #[test]
    fn test_references_resolve_and_dedup() {
        let ontology = ontology();
        let store = Store::new();
        let ids = SequentialClaimIds::new();
        let mut session = ReconciliationSession::new(&store, &store, &ids);

        let submission = minimal(json!({
            "statements": [
                {"property": "P1", "value": "http://example.com/parent"},
                {"property": "P3", "value": "http://example.com/part"},
                {"property": "bill of materials", "value": "http://example.com/part"},
                {"property": "P3", "value": "Q77"}
            ]
        }));
        let (record, referenced) = InputResolver::new(&ontology)
            .resolve(&submission, P1, &mut session)
            .unwrap();

        assert_eq!(referenced.len(), 1);
        let part = session.candidate(referenced[0]).unwrap();
        assert!(part.is_new());
        let part_id = part.id().unwrap();
        assert_eq!(
            record.claims_for(AttributeKey(3)).filter_map(Claim::value).collect::<Vec<_>>(),
            vec![
                &Value::Record(part_id),
                &Value::Record(part_id),
                &Value::Record(RecordId(77))
            ]
        );
        assert_eq!(session.lookup(P1, "http://example.com/part"), Some(referenced[0]));
    }

    #[test]
    fn test_identifying_claim_checked_before_resolution() {
        let ontology = ontology();
        let store = Store::new();
        let ids = SequentialClaimIds::new();
        let resolver = InputResolver::new(&ontology);

        let cases = [
            (json!([{"property": "P3", "value": "http://example.com/part"}]), 0),
            (
                json!([
                    {"property": "P1", "value": "http://a"},
                    {"property": "P1", "value": "http://b"},
                    {"property": "P3", "value": "http://example.com/part"}
                ]),
                2,
            ),
        ];
        for (statements, found) in cases {
            let mut session = ReconciliationSession::new(&store, &store, &ids);
            let submission = minimal(json!({"statements": statements}));
            let err = resolver.resolve(&submission, P1, &mut session).unwrap_err();
            assert_eq!(
                err,
                ReconcileError::MissingIdentifyingClaim {
                    attribute: "P1".into(),
                    found
                }
            );
            assert!(session.is_empty());
        }
    }

    #[test]
    fn test_unknown_attribute_and_label() {
        let ontology = ontology();
        let store = Store::new();
        let ids = SequentialClaimIds::new();
        let resolver = InputResolver::new(&ontology);
        let mut session = ReconciliationSession::new(&store, &store, &ids);

        let submission = minimal(json!({"statements": [{"property": "P99", "value": "x"}]}));
        let err = resolver.resolve(&submission, P1, &mut session).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownAttribute);

        let submission = minimal(json!({"statements": [{"property": "colour", "value": "x"}]}));
        let err = resolver.resolve(&submission, P1, &mut session).unwrap_err();
        assert_eq!(err, ReconcileError::PropertyNotFound { label: "colour".into() });
    }

    #[test]
    fn test_full_shape() {
        let ontology = ontology();
        let store = Store::new();
        let ids = SequentialClaimIds::new();
        let mut session = ReconciliationSession::new(&store, &store, &ids);

        let entity = json!({
            "reconcile-edit-version": "0.0.1/full",
            "type": "item",
            "labels": {"en": {"language": "en", "value": "Widget"}},
            "aliases": {"en": [{"language": "en", "value": "W"}]},
            "sitelinks": {"enwiki": {"site": "enwiki", "title": "Widget", "badges": []}},
            "claims": {
                "P1": [{
                    "mainsnak": {
                        "snaktype": "value",
                        "property": "P1",
                        "datavalue": {"type": "string", "value": "http://example.com/w"}
                    },
                    "type": "statement",
                    "rank": "normal"
                }],
                "P3": [{
                    "mainsnak": {
                        "snaktype": "value",
                        "property": "P3",
                        "datavalue": {
                            "type": "wikibase-entityid",
                            "value": {"entity-type": "item", "id": "Q5"}
                        }
                    },
                    "id": "Q9$abc"
                }],
                "P2": [{"mainsnak": {"snaktype": "novalue", "property": "P2"}}]
            }
        });
        let submission = Submission::from_json(&entity).unwrap();
        assert_eq!(submission.version(), EntityVersion::Full);
        let (record, referenced) = InputResolver::new(&ontology)
            .resolve(&submission, P1, &mut session)
            .unwrap();

        assert!(referenced.is_empty());
        assert_eq!(record.terms.label("en"), Some("Widget"));
        assert_eq!(record.terms.aliases("en"), ["W".to_string()]);
        assert_eq!(record.site_links.get("enwiki").map(String::as_str), Some("Widget"));
        assert_eq!(record.claims.len(), 3);
        let reference = record.claims_for(AttributeKey(3)).next().unwrap();
        assert_eq!(reference.value(), Some(&Value::Record(RecordId(5))));
        assert_eq!(reference.id, Some(ClaimId("Q9$abc".into())));
        assert_eq!(
            record.claims_for(AttributeKey(2)).next().map(|c| &c.snak),
            Some(&Snak::NoValue)
        );
    }

    #[test]
    fn test_full_shape_rejects_qualifiers_and_references() {
        let ontology = ontology();
        let store = Store::new();
        let ids = SequentialClaimIds::new();
        let resolver = InputResolver::new(&ontology);
        let snak = json!({
            "snaktype": "value",
            "property": "P2",
            "datavalue": {"type": "string", "value": "x"}
        });

        for extra in [
            json!({"qualifiers": {"P2": [snak.clone()]}}),
            json!({"references": [{"snaks": {"P2": [snak.clone()]}}]}),
        ] {
            let mut claim = json!({"mainsnak": snak.clone()});
            if let (Some(claim), Some(extra)) = (claim.as_object_mut(), extra.as_object()) {
                claim.extend(extra.clone());
            }
            let entity = json!({
                "reconcile-edit-version": "0.0.1/full",
                "claims": {"P2": [claim]}
            });
            let submission = Submission::from_json(&entity).unwrap();
            let mut session = ReconciliationSession::new(&store, &store, &ids);
            let err = resolver.resolve(&submission, P1, &mut session).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedClaimShape);
        }
    }

    #[test]
    fn test_minimal_shape_rejects_qualifiers_and_references() {
        let ontology = ontology();
        let store = Store::new();
        let ids = SequentialClaimIds::new();
        let resolver = InputResolver::new(&ontology);

        for extra in [
            json!({"qualifiers": {"P2": ["nested"]}}),
            json!({"references": [{"P2": "cited"}]}),
        ] {
            let mut statement = json!({"property": "P3", "value": "http://part"});
            if let (Some(statement), Some(extra)) = (statement.as_object_mut(), extra.as_object()) {
                statement.extend(extra.clone());
            }
            let submission = minimal(json!({
                "statements": [{"property": "P1", "value": "http://whole"}, statement]
            }));
            let mut session = ReconciliationSession::new(&store, &store, &ids);
            let err = resolver.resolve(&submission, P1, &mut session).unwrap_err();
            assert_eq!(
                err,
                ReconcileError::UnsupportedClaimShape {
                    attribute: "P3".into()
                }
            );
            assert!(session.is_empty());
        }

        // empty containers carry nothing
        let submission = minimal(json!({
            "statements": [
                {"property": "P1", "value": "http://whole"},
                {"property": "P2", "value": "x", "qualifiers": {}, "references": []}
            ]
        }));
        let mut session = ReconciliationSession::new(&store, &store, &ids);
        let (record, _) = resolver.resolve(&submission, P1, &mut session).unwrap();
        assert_eq!(record.claims.len(), 2);
    }

    #[test]
    fn test_minimal_site_links_accept_both_spellings() {
        for key in ["sitelinks", "siteLinks"] {
            let mut entity = json!({"statements": []});
            if let Some(object) = entity.as_object_mut() {
                object.insert(key.to_string(), json!({"enwiki": "Widget"}));
            }
            let Submission::Minimal(parsed) = minimal(entity) else {
                panic!("expected the minimal shape");
            };
            assert_eq!(parsed.sitelinks.get("enwiki").map(String::as_str), Some("Widget"));
        }
    }

    #[test]
    fn test_identifying_claim_must_be_plain_value() {
        let ontology = ontology();
        let store = Store::new();
        let ids = SequentialClaimIds::new();
        let mut session = ReconciliationSession::new(&store, &store, &ids);

        let entity = json!({
            "reconcile-edit-version": "0.0.1/full",
            "claims": {"P1": [{"mainsnak": {"snaktype": "somevalue", "property": "P1"}}]}
        });
        let submission = Submission::from_json(&entity).unwrap();
        let err = InputResolver::new(&ontology)
            .resolve(&submission, P1, &mut session)
            .unwrap_err();
        assert_eq!(err, ReconcileError::InvalidIdentifyingClaim { attribute: "P1".into() });
        assert_eq!(err.kind(), ErrorKind::MissingIdentifyingClaim);
    }

    #[test]
    fn test_entity_body_must_be_an_object() {
        let err = Submission::parse(EntityVersion::Minimal, &json!(["nope"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        let err = Submission::parse(EntityVersion::Full, &json!({"type": "property"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }
}
