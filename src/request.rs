//! Versioned request envelope.
//!
//! ```json
//! {
//!   "reconcile": {"reconcile-edit-version": "0.0.1", "urlReconcile": "P1"},
//!   "entity": {"reconcile-edit-version": "0.0.1/minimal", "statements": [...]}
//! }
//! ```
//!
//! A batch body carries `entities` instead of `entity`. Only the envelope is
//! checked here; entity bodies are parsed when their submission is processed.

use crate::config::{SUPPORTED_RECONCILE_VERSIONS, VERSION_KEY};
use crate::error::{BatchError, ReconcileError};
use crate::input::{EntityVersion, Submission};
use crate::model::{AttributeKey, ValueKind};
use crate::ontology::AttributeLookup;
use serde_json::Value as Json;

const IDENTIFYING_FIELD: &str = "urlReconcile";

/// One entity of a request, with its version tag already checked.
#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    pub identifying: AttributeKey,
    pub version: EntityVersion,
    pub entity: Json,
}

impl EditRequest {
    pub fn submission(&self) -> Result<Submission, ReconcileError> {
        Submission::parse(self.version, &self.entity)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub identifying: AttributeKey,
    pub requests: Vec<EditRequest>,
}

pub struct EditRequestParser<'l> {
    lookup: &'l dyn AttributeLookup,
}

impl<'l> EditRequestParser<'l> {
    pub fn new(lookup: &'l dyn AttributeLookup) -> Self {
        Self { lookup }
    }

    /// Parse a `{reconcile, entity}` body.
    pub fn parse_request(&self, body: &Json) -> Result<EditRequest, ReconcileError> {
        let identifying = self.parse_reconcile(body)?;
        let entity = body.get("entity").unwrap_or(&Json::Null);
        parse_entity(entity, identifying)
    }

    /// Parse a `{reconcile, entities}` body. Fails on the first bad envelope,
    /// reporting the entity index (0 for the reconcile block).
    pub fn parse_batch(&self, body: &Json) -> Result<BatchRequest, BatchError> {
        let at = |index: usize| {
            move |source: ReconcileError| BatchError {
                index,
                completed: Vec::new(),
                source,
            }
        };
        let identifying = self.parse_reconcile(body).map_err(at(0))?;
        let entities = body
            .get("entities")
            .and_then(Json::as_array)
            .ok_or_else(|| ReconcileError::malformed("entities must be a list"))
            .map_err(at(0))?;

        let requests = entities
            .iter()
            .enumerate()
            .map(|(index, entity)| parse_entity(entity, identifying).map_err(at(index)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BatchRequest {
            identifying,
            requests,
        })
    }

    fn parse_reconcile(&self, body: &Json) -> Result<AttributeKey, ReconcileError> {
        let reconcile = body
            .get("reconcile")
            .and_then(Json::as_object)
            .ok_or_else(|| ReconcileError::malformed("reconcile must be an object"))?;

        let version = reconcile.get(VERSION_KEY).and_then(Json::as_str);
        if !version.is_some_and(|v| SUPPORTED_RECONCILE_VERSIONS.contains(&v)) {
            return Err(ReconcileError::UnsupportedReconcileVersion {
                found: reconcile.get(VERSION_KEY).map(|v| match v {
                    Json::String(s) => s.clone(),
                    other => other.to_string(),
                }),
                supported: SUPPORTED_RECONCILE_VERSIONS
                    .iter()
                    .map(|v| v.to_string())
                    .collect(),
            });
        }

        let invalid = || ReconcileError::InvalidReconcileAttribute {
            field: IDENTIFYING_FIELD.to_string(),
        };
        let raw = reconcile
            .get(IDENTIFYING_FIELD)
            .and_then(Json::as_str)
            .ok_or_else(invalid)?;
        let (key, kind) = self.lookup.resolve(raw).map_err(|_| invalid())?;
        if kind != ValueKind::Url {
            return Err(ReconcileError::IdentifyingAttributeNotUrl {
                field: IDENTIFYING_FIELD.to_string(),
                attribute: key.to_string(),
                kind: kind.to_string(),
            });
        }
        Ok(key)
    }
}

fn parse_entity(entity: &Json, identifying: AttributeKey) -> Result<EditRequest, ReconcileError> {
    let tag = entity
        .as_object()
        .and_then(|object| object.get(VERSION_KEY))
        .ok_or(ReconcileError::UnspecifiedEntityVersion)?;
    let version = match tag {
        Json::String(tag) => EntityVersion::parse(Some(tag.as_str()))?,
        other => EntityVersion::parse(Some(other.to_string().as_str()))?,
    };
    Ok(EditRequest {
        identifying,
        version,
        entity: entity.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::ontology::{AttributeDefinition, Ontology};
    use serde_json::json;

    fn ontology() -> Ontology {
        let mut ontology = Ontology::new();
        ontology.add_attribute(AttributeDefinition::labelled(
            AttributeKey(1),
            "identifier",
            ValueKind::Url,
        ));
        ontology.add_attribute(AttributeDefinition::new(AttributeKey(2), ValueKind::String));
        ontology
    }

    fn reconcile(attribute: &str) -> Json {
        json!({"reconcile-edit-version": "0.0.1", "urlReconcile": attribute})
    }

    #[test]
    fn test_parse_single_request() {
        let ontology = ontology();
        let parser = EditRequestParser::new(&ontology);
        let body = json!({
            "reconcile": reconcile("P1"),
            "entity": {"reconcile-edit-version": "0.0.1/minimal", "labels": {"en": "x"}}
        });
        let request = parser.parse_request(&body).unwrap();
        assert_eq!(request.identifying, AttributeKey(1));
        assert_eq!(request.version, EntityVersion::Minimal);
        assert!(matches!(request.submission().unwrap(), Submission::Minimal(_)));
    }

    #[test]
    fn test_identifying_attribute_by_label() {
        let ontology = ontology();
        let parser = EditRequestParser::new(&ontology);
        let body = json!({
            "reconcile": reconcile("identifier"),
            "entity": {"reconcile-edit-version": "0.0.1/full"}
        });
        assert_eq!(parser.parse_request(&body).unwrap().identifying, AttributeKey(1));
    }

    #[test]
    fn test_reconcile_block_errors() {
        let ontology = ontology();
        let parser = EditRequestParser::new(&ontology);
        let entity = json!({"reconcile-edit-version": "0.0.1/minimal"});

        let err = parser
            .parse_request(&json!({"reconcile": "P1", "entity": entity}))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);

        let err = parser
            .parse_request(&json!({
                "reconcile": {"reconcile-edit-version": "9.9", "urlReconcile": "P1"},
                "entity": entity
            }))
            .unwrap_err();
        assert_eq!(
            err,
            ReconcileError::UnsupportedReconcileVersion {
                found: Some("9.9".into()),
                supported: vec!["0.0.1".into()]
            }
        );

        for attribute in ["P9", "nope"] {
            let err = parser
                .parse_request(&json!({"reconcile": reconcile(attribute), "entity": entity}))
                .unwrap_err();
            assert_eq!(
                err,
                ReconcileError::InvalidReconcileAttribute {
                    field: "urlReconcile".into()
                }
            );
        }

        let err = parser
            .parse_request(&json!({"reconcile": reconcile("P2"), "entity": entity}))
            .unwrap_err();
        assert_eq!(err.message_key(), "reconcile-edit-invalid-type-property-must-be-url");
        assert_eq!(err.to_string(), "urlReconcile attribute P2 must be of type url, found string");
    }

    #[test]
    fn test_entity_version_errors() {
        let ontology = ontology();
        let parser = EditRequestParser::new(&ontology);

        let err = parser
            .parse_request(&json!({"reconcile": reconcile("P1"), "entity": {"labels": {}}}))
            .unwrap_err();
        assert_eq!(err, ReconcileError::UnspecifiedEntityVersion);

        let err = parser
            .parse_request(&json!({"reconcile": reconcile("P1")}))
            .unwrap_err();
        assert_eq!(err, ReconcileError::UnspecifiedEntityVersion);

        let err = parser
            .parse_request(&json!({
                "reconcile": reconcile("P1"),
                "entity": {"reconcile-edit-version": "0.0.1"}
            }))
            .unwrap_err();
        assert_eq!(err.message_key(), "reconcile-edit-invalid-entity-input-version");
    }

    #[test]
    fn test_batch_reports_failing_entity_index() {
        let ontology = ontology();
        let parser = EditRequestParser::new(&ontology);
        let body = json!({
            "reconcile": reconcile("P1"),
            "entities": [
                {"reconcile-edit-version": "0.0.1/minimal"},
                {"reconcile-edit-version": "0.0.1/full"},
                {"labels": {"en": "no version"}}
            ]
        });
        let err = parser.parse_batch(&body).unwrap_err();
        assert_eq!(err.index, 2);
        assert!(err.completed.is_empty());
        assert_eq!(err.source, ReconcileError::UnspecifiedEntityVersion);

        let err = parser
            .parse_batch(&json!({"reconcile": reconcile("P1"), "entities": {}}))
            .unwrap_err();
        assert_eq!(err.index, 0);
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_batch_keeps_entity_order() {
        let ontology = ontology();
        let parser = EditRequestParser::new(&ontology);
        let body = json!({
            "reconcile": reconcile("P1"),
            "entities": [
                {"reconcile-edit-version": "0.0.1/full"},
                {"reconcile-edit-version": "0.0.1/minimal"}
            ]
        });
        let batch = parser.parse_batch(&body).unwrap();
        assert_eq!(batch.identifying, AttributeKey(1));
        assert_eq!(
            batch.requests.iter().map(|r| r.version).collect::<Vec<_>>(),
            vec![EntityVersion::Full, EntityVersion::Minimal]
        );
    }
}
