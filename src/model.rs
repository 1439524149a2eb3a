//! # Data Model
//!
//! Core data structures for record reconciliation: identifiers, claim values,
//! multilingual terms, site links and the record itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of a record, displayed as `Q<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_prefixed(s, 'Q').map(RecordId)
    }
}

/// Identifier of a typed attribute (property), displayed as `P<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeKey(pub u32);

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl FromStr for AttributeKey {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n = parse_prefixed(s, 'P')?;
        u32::try_from(n)
            .map(AttributeKey)
            .map_err(|_| IdParseError(s.to_string()))
    }
}

/// Error returned when a `Q<n>` / `P<n>` identifier does not parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed identifier: {0:?}")]
pub struct IdParseError(pub String);

fn parse_prefixed(s: &str, prefix: char) -> Result<u64, IdParseError> {
    let mut chars = s.chars();
    let head = chars.next().map(|c| c.to_ascii_uppercase());
    let digits = chars.as_str();
    if head != Some(prefix)
        || digits.is_empty()
        || digits.starts_with('0')
        || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(IdParseError(s.to_string()));
    }
    digits.parse().map_err(|_| IdParseError(s.to_string()))
}

/// Stable identifier of a claim, assigned once when the claim is created.
///
/// Format: `<record id>$<component>`; the component is opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClaimId(pub String);

impl ClaimId {
    /// Build a claim ID scoped to a record. Unscoped IDs carry only the component.
    pub fn scoped(record: Option<RecordId>, component: &str) -> Self {
        match record {
            Some(record) => Self(format!("{record}${component}")),
            None => Self(component.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Optimistic concurrency token returned by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RevisionId(pub u64);

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Identifier of a page-like container known to the backlink index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(pub u64);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a container holds. Only `Record` containers take part in reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityId {
    Record(RecordId),
    Attribute(AttributeKey),
}

impl EntityId {
    pub fn as_record(&self) -> Option<RecordId> {
        match self {
            EntityId::Record(id) => Some(*id),
            EntityId::Attribute(_) => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Record(id) => id.fmt(f),
            EntityId::Attribute(key) => key.fmt(f),
        }
    }
}

/// Kind of value an attribute holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueKind {
    Url,
    String,
    ExternalId,
    RecordReference,
}

impl ValueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Url => "url",
            ValueKind::String => "string",
            ValueKind::ExternalId => "external-id",
            ValueKind::RecordReference => "record-reference",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed claim value. Equality is kind-sensitive: a `Url` never equals a `String`
/// carrying the same text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum Value {
    Url(String),
    String(String),
    ExternalId(String),
    Record(RecordId),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Url(_) => ValueKind::Url,
            Value::String(_) => ValueKind::String,
            Value::ExternalId(_) => ValueKind::ExternalId,
            Value::Record(_) => ValueKind::RecordReference,
        }
    }

    pub fn as_url(&self) -> Option<&str> {
        match self {
            Value::Url(url) => Some(url),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Url(s) | Value::String(s) | Value::ExternalId(s) => f.write_str(s),
            Value::Record(id) => id.fmt(f),
        }
    }
}

/// Main value of a claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "snaktype", content = "datavalue", rename_all = "lowercase")]
pub enum Snak {
    Value(Value),
    NoValue,
    SomeValue,
}

impl Snak {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Snak::Value(value) => Some(value),
            Snak::NoValue | Snak::SomeValue => None,
        }
    }
}

/// An `(attribute, value, claim id)` triple on a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub id: Option<ClaimId>,
    pub attribute: AttributeKey,
    pub snak: Snak,
}

impl Claim {
    /// Create a claim with a plain value and no ID yet.
    pub fn new(attribute: AttributeKey, value: Value) -> Self {
        Self {
            id: None,
            attribute,
            snak: Snak::Value(value),
        }
    }

    pub fn with_snak(attribute: AttributeKey, snak: Snak) -> Self {
        Self {
            id: None,
            attribute,
            snak,
        }
    }

    pub fn with_id(mut self, id: ClaimId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn value(&self) -> Option<&Value> {
        self.snak.value()
    }

    /// Whether both claims assert the same thing, ignoring claim IDs.
    pub fn same_value(&self, other: &Claim) -> bool {
        self.attribute == other.attribute && self.snak == other.snak
    }
}

/// Multilingual labels, descriptions and aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terms {
    pub labels: BTreeMap<String, String>,
    pub descriptions: BTreeMap<String, String>,
    pub aliases: BTreeMap<String, Vec<String>>,
}

impl Terms {
    pub fn set_label(&mut self, lang: impl Into<String>, text: impl Into<String>) {
        self.labels.insert(lang.into(), text.into());
    }

    pub fn label(&self, lang: &str) -> Option<&str> {
        self.labels.get(lang).map(String::as_str)
    }

    pub fn set_description(&mut self, lang: impl Into<String>, text: impl Into<String>) {
        self.descriptions.insert(lang.into(), text.into());
    }

    pub fn description(&self, lang: &str) -> Option<&str> {
        self.descriptions.get(lang).map(String::as_str)
    }

    /// Replace the aliases for a language. Duplicates are dropped, keeping the
    /// first occurrence; an empty list removes the language.
    pub fn set_aliases<I, S>(&mut self, lang: impl Into<String>, aliases: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lang = lang.into();
        let mut group: Vec<String> = Vec::new();
        for alias in aliases {
            let alias = alias.into();
            if !group.contains(&alias) {
                group.push(alias);
            }
        }
        if group.is_empty() {
            self.aliases.remove(&lang);
        } else {
            self.aliases.insert(lang, group);
        }
    }

    pub fn aliases(&self, lang: &str) -> &[String] {
        self.aliases.get(lang).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.descriptions.is_empty() && self.aliases.is_empty()
    }
}

/// The reconciled unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Absent until the record has been allocated or persisted.
    pub id: Option<RecordId>,
    pub terms: Terms,
    /// Site key to linked page name.
    pub site_links: BTreeMap<String, String>,
    pub claims: Vec<Claim>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: RecordId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn set_site_link(&mut self, site: impl Into<String>, page: impl Into<String>) {
        self.site_links.insert(site.into(), page.into());
    }

    pub fn add_claim(&mut self, claim: Claim) {
        self.claims.push(claim);
    }

    /// Claims on a specific attribute, in record order.
    pub fn claims_for(&self, attribute: AttributeKey) -> impl Iterator<Item = &Claim> + '_ {
        self.claims
            .iter()
            .filter(move |claim| claim.attribute == attribute)
    }

    /// All URL values carried by the record's claims.
    pub fn url_values(&self) -> impl Iterator<Item = &str> + '_ {
        self.claims
            .iter()
            .filter_map(|claim| claim.value().and_then(Value::as_url))
    }
}
