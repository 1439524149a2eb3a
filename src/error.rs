//! Error taxonomy for reconciliation.
//!
//! Every error carries a machine-readable [`ErrorKind`], a stable message key
//! and a human-readable message.

use crate::model::{RecordId, RevisionId};
use crate::persistence::Saved;
use crate::store::StoreError;
use std::fmt;
use thiserror::Error;

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedInput,
    UnsupportedClaimShape,
    UnknownAttribute,
    PropertyNotFound,
    MissingIdentifyingClaim,
    AmbiguousMatch,
    ConflictFailure,
    StoreFailure,
    InvalidRequest,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MalformedInput => "malformed-input",
            ErrorKind::UnsupportedClaimShape => "unsupported-claim-shape",
            ErrorKind::UnknownAttribute => "unknown-attribute",
            ErrorKind::PropertyNotFound => "property-not-found",
            ErrorKind::MissingIdentifyingClaim => "missing-identifying-claim",
            ErrorKind::AmbiguousMatch => "ambiguous-match",
            ErrorKind::ConflictFailure => "conflict-failure",
            ErrorKind::StoreFailure => "store-failure",
            ErrorKind::InvalidRequest => "invalid-request",
        }
    }

    /// Whether the error was raised before anything was written.
    pub fn is_validation(self) -> bool {
        matches!(
            self,
            ErrorKind::MalformedInput
                | ErrorKind::UnsupportedClaimShape
                | ErrorKind::UnknownAttribute
                | ErrorKind::PropertyNotFound
                | ErrorKind::MissingIdentifyingClaim
                | ErrorKind::InvalidRequest
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("malformed input: {details}")]
    MalformedInput { details: String },

    #[error("value {value:?} is not a valid {kind} for {attribute}")]
    InvalidValue {
        attribute: String,
        kind: String,
        value: String,
    },

    #[error("claims with qualifiers or references are not supported ({attribute})")]
    UnsupportedClaimShape { attribute: String },

    #[error("unknown attribute {attribute}")]
    UnknownAttribute { attribute: String },

    #[error("no attribute is labelled {label:?}")]
    PropertyNotFound { label: String },

    #[error("expected exactly one claim on identifying attribute {attribute}, found {found}")]
    MissingIdentifyingClaim { attribute: String, found: usize },

    #[error("the claim on identifying attribute {attribute} must carry a plain value")]
    InvalidIdentifyingClaim { attribute: String },

    #[error("{} records match {attribute} = {url}: {}", .ids.len(), join_ids(.ids))]
    AmbiguousMatch {
        attribute: String,
        url: String,
        ids: Vec<RecordId>,
    },

    #[error("{id} changed since revision {expected}")]
    ConflictFailure { id: RecordId, expected: RevisionId },

    #[error("store failure: {0}")]
    StoreFailure(String),

    #[error("unsupported reconcile version {found:?}; supported: {}", .supported.join(", "))]
    UnsupportedReconcileVersion {
        found: Option<String>,
        supported: Vec<String>,
    },

    #[error("invalid reconcile attribute in {field}")]
    InvalidReconcileAttribute { field: String },

    #[error("{field} attribute {attribute} must be of type url, found {kind}")]
    IdentifyingAttributeNotUrl {
        field: String,
        attribute: String,
        kind: String,
    },

    #[error("entity input version is not specified")]
    UnspecifiedEntityVersion,

    #[error("unsupported entity input version {found:?}; supported: {}", .supported.join(", "))]
    InvalidEntityVersion {
        found: String,
        supported: Vec<String>,
    },
}

fn join_ids(ids: &[RecordId]) -> String {
    ids.iter()
        .map(RecordId::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ReconcileError {
    pub fn malformed(details: impl Into<String>) -> Self {
        Self::MalformedInput {
            details: details.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedInput { .. } | Self::InvalidValue { .. } => ErrorKind::MalformedInput,
            Self::UnsupportedClaimShape { .. } => ErrorKind::UnsupportedClaimShape,
            Self::UnknownAttribute { .. } => ErrorKind::UnknownAttribute,
            Self::PropertyNotFound { .. } => ErrorKind::PropertyNotFound,
            Self::MissingIdentifyingClaim { .. } | Self::InvalidIdentifyingClaim { .. } => {
                ErrorKind::MissingIdentifyingClaim
            }
            Self::AmbiguousMatch { .. } => ErrorKind::AmbiguousMatch,
            Self::ConflictFailure { .. } => ErrorKind::ConflictFailure,
            Self::StoreFailure(_) => ErrorKind::StoreFailure,
            Self::UnsupportedReconcileVersion { .. }
            | Self::InvalidReconcileAttribute { .. }
            | Self::IdentifyingAttributeNotUrl { .. }
            | Self::UnspecifiedEntityVersion
            | Self::InvalidEntityVersion { .. } => ErrorKind::InvalidRequest,
        }
    }

    /// Stable key for message templating.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::MalformedInput { .. } => "reconcile-edit-input-required-keys",
            Self::InvalidValue { .. } => "reconcile-edit-input-invalid-value",
            Self::UnsupportedClaimShape { .. } => {
                "reconcile-edit-qualifiers-references-not-supported"
            }
            Self::UnknownAttribute { .. } => "reconcile-edit-unknown-attribute",
            Self::PropertyNotFound { .. } => "reconcile-edit-property-not-found",
            Self::MissingIdentifyingClaim { .. } => {
                "reconcile-edit-reconciliation-property-missing-in-statements"
            }
            Self::InvalidIdentifyingClaim { .. } => {
                "reconcile-edit-invalid-reconciliation-statement-type"
            }
            Self::AmbiguousMatch { .. } => "reconcile-edit-matched-multiple-items",
            Self::ConflictFailure { .. } => "reconcile-edit-edit-conflict",
            Self::StoreFailure(_) => "reconcile-edit-store-failure",
            Self::UnsupportedReconcileVersion { .. } => {
                "reconcile-edit-unsupported-reconcile-version"
            }
            Self::InvalidReconcileAttribute { .. } => "reconcile-edit-invalid-reconcile-propertyid",
            Self::IdentifyingAttributeNotUrl { .. } => {
                "reconcile-edit-invalid-type-property-must-be-url"
            }
            Self::UnspecifiedEntityVersion => "reconcile-edit-unspecified-entity-input-version",
            Self::InvalidEntityVersion { .. } => "reconcile-edit-invalid-entity-input-version",
        }
    }
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { id, expected, .. } => Self::ConflictFailure { id, expected },
            other => Self::StoreFailure(other.to_string()),
        }
    }
}

/// A batch aborted at `index`. Submissions before it stay persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("submission {index} failed: {source}")]
pub struct BatchError {
    pub index: usize,
    pub completed: Vec<Saved>,
    #[source]
    pub source: ReconcileError,
}

impl BatchError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_match_message_lists_ids() {
        let err = ReconcileError::AmbiguousMatch {
            attribute: "P1".to_string(),
            url: "http://x".to_string(),
            ids: vec![RecordId(1), RecordId(4)],
        };
        assert_eq!(err.kind(), ErrorKind::AmbiguousMatch);
        assert_eq!(err.to_string(), "2 records match P1 = http://x: Q1, Q4");
        assert_eq!(err.message_key(), "reconcile-edit-matched-multiple-items");
    }

    #[test]
    fn test_store_conflict_maps_to_conflict_failure() {
        let err: ReconcileError = StoreError::Conflict {
            id: RecordId(3),
            expected: RevisionId(1),
            actual: RevisionId(2),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::ConflictFailure);

        let err: ReconcileError = StoreError::NotFound(RecordId(3)).into();
        assert_eq!(err.kind(), ErrorKind::StoreFailure);
    }

    #[test]
    fn test_validation_kinds() {
        assert!(ErrorKind::MissingIdentifyingClaim.is_validation());
        assert!(ErrorKind::InvalidRequest.is_validation());
        assert!(!ErrorKind::AmbiguousMatch.is_validation());
        assert!(!ErrorKind::ConflictFailure.is_validation());
        assert_eq!(ErrorKind::ConflictFailure.as_str(), "conflict-failure");
    }
}
