//! Default constants for reconcile-edit configuration.

// =============================================================================
// Edit Defaults
// =============================================================================

/// Edit summary recorded with every save made by the engine.
pub const DEFAULT_EDIT_SUMMARY: &str = "Reconciliation Edit";

/// Prefix for environment variable overrides, e.g. `RECONCILE_SUMMARY`.
pub const ENV_PREFIX: &str = "RECONCILE_";

// =============================================================================
// Request Versions
// =============================================================================

/// Key carrying the version tag in both the reconcile block and each entity.
pub const VERSION_KEY: &str = "reconcile-edit-version";

/// Supported versions of the reconcile block.
pub const SUPPORTED_RECONCILE_VERSIONS: &[&str] = &["0.0.1"];

/// Entity version selecting the full record serialization.
pub const ENTITY_VERSION_FULL: &str = "0.0.1/full";

/// Entity version selecting the minimal input shape.
pub const ENTITY_VERSION_MINIMAL: &str = "0.0.1/minimal";

/// Supported entity input versions.
pub const SUPPORTED_ENTITY_VERSIONS: &[&str] = &[ENTITY_VERSION_FULL, ENTITY_VERSION_MINIMAL];

// =============================================================================
// In-memory Store Defaults
// =============================================================================

/// First record number handed out by the allocator (`Q1`).
pub const DEFAULT_FIRST_RECORD_ID: u64 = 1;

/// First container number handed out for new pages.
pub const DEFAULT_FIRST_CONTAINER_ID: u64 = 1;
