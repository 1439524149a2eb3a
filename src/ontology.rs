//! # Ontology Module
//!
//! Typed attribute definitions: which value kind each attribute holds and the
//! human-readable labels submissions may use in place of attribute keys.

use crate::error::ReconcileError;
use crate::model::{AttributeKey, ValueKind};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Lookup of attribute types and labels, provided by whatever owns the schema.
pub trait AttributeLookup: Send + Sync {
    /// Value kind of an attribute, or `None` if the attribute is unknown.
    fn value_kind(&self, key: AttributeKey) -> Option<ValueKind>;

    /// Attribute carrying the given label, if any.
    fn key_for_label(&self, label: &str) -> Option<AttributeKey>;

    /// Resolve a submitted attribute reference, given either as a key (`P12`)
    /// or as a label, to a known attribute and its value kind.
    fn resolve(&self, raw: &str) -> Result<(AttributeKey, ValueKind), ReconcileError> {
        if let Ok(key) = raw.parse::<AttributeKey>() {
            return self
                .value_kind(key)
                .map(|kind| (key, kind))
                .ok_or_else(|| ReconcileError::UnknownAttribute {
                    attribute: key.to_string(),
                });
        }
        let key = self
            .key_for_label(raw)
            .ok_or_else(|| ReconcileError::PropertyNotFound {
                label: raw.to_string(),
            })?;
        self.value_kind(key)
            .map(|kind| (key, kind))
            .ok_or_else(|| ReconcileError::UnknownAttribute {
                attribute: key.to_string(),
            })
    }
}

/// A single attribute definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub key: AttributeKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub kind: ValueKind,
}

impl AttributeDefinition {
    pub fn new(key: AttributeKey, kind: ValueKind) -> Self {
        Self {
            key,
            label: None,
            kind,
        }
    }

    pub fn labelled(key: AttributeKey, label: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            key,
            label: Some(label.into()),
            kind,
        }
    }
}

/// Serialized form of an ontology, as stored in JSON config files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OntologyConfig {
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
}

/// In-memory attribute registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ontology {
    attributes: BTreeMap<AttributeKey, AttributeDefinition>,
    labels: HashMap<String, AttributeKey>,
}

impl Ontology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: OntologyConfig) -> Self {
        let mut ontology = Self::new();
        for definition in config.attributes {
            ontology.add_attribute(definition);
        }
        ontology
    }

    /// Load an ontology from a JSON file shaped like [`OntologyConfig`].
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read ontology file {}", path.display()))?;
        let config: OntologyConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parse ontology file {}", path.display()))?;
        Ok(Self::from_config(config))
    }

    /// Add or replace an attribute definition. A replaced label stops resolving.
    pub fn add_attribute(&mut self, definition: AttributeDefinition) {
        if let Some(previous) = self.attributes.get(&definition.key) {
            if let Some(label) = &previous.label {
                self.labels.remove(label);
            }
        }
        if let Some(label) = &definition.label {
            self.labels.insert(label.clone(), definition.key);
        }
        self.attributes.insert(definition.key, definition);
    }

    pub fn attribute(&self, key: AttributeKey) -> Option<&AttributeDefinition> {
        self.attributes.get(&key)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDefinition> + '_ {
        self.attributes.values()
    }

    pub fn to_config(&self) -> OntologyConfig {
        OntologyConfig {
            attributes: self.attributes.values().cloned().collect(),
        }
    }
}

impl AttributeLookup for Ontology {
    fn value_kind(&self, key: AttributeKey) -> Option<ValueKind> {
        self.attributes.get(&key).map(|definition| definition.kind)
    }

    fn key_for_label(&self, label: &str) -> Option<AttributeKey> {
        self.labels.get(label).copied()
    }
}
