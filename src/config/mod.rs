//! Configuration for the reconciliation engine.
//!
//! Configuration is loaded with precedence: overrides > Env vars > Config file > Defaults
//!
//! # Example config file (reconcile.toml)
//! ```toml
//! summary = "Bulk import"
//! claim_ids = "sequential"
//! ontology = "/etc/reconcile/ontology.json"
//!
//! [store]
//! first_record_id = 1000
//! ```

mod defaults;

pub use defaults::*;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Edit summary written with every save
    pub summary: String,
    /// How fresh claim IDs are minted
    pub claim_ids: ClaimIdScheme,
    /// Path to an ontology file (JSON)
    pub ontology: Option<PathBuf>,
    /// In-memory store settings
    pub store: StoreConfig,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            summary: DEFAULT_EDIT_SUMMARY.to_string(),
            claim_ids: ClaimIdScheme::default(),
            ontology: None,
            store: StoreConfig::default(),
        }
    }
}

impl ReconcileConfig {
    /// Load configuration with precedence: overrides > Env > File > Defaults
    pub fn load(
        config_path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(ReconcileConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Nested keys use a double underscore: RECONCILE_STORE__FIRST_RECORD_ID
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment = figment.merge(Serialized::defaults(overrides));

        figment.extract().map_err(ConfigError::from)
    }

    /// Load from environment and optional config file only (no overrides)
    pub fn from_env(config_path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load(config_path, ConfigOverrides::default())
    }
}

/// Claim ID minting scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ClaimIdScheme {
    /// `<record>$<uuid v4>`
    #[default]
    Random,
    /// `<record>$<counter>`, reproducible across runs
    Sequential,
}

/// In-memory store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub first_record_id: u64,
    pub first_container_id: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            first_record_id: DEFAULT_FIRST_RECORD_ID,
            first_container_id: DEFAULT_FIRST_CONTAINER_ID,
        }
    }
}

/// Overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_ids: Option<ClaimIdScheme>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ontology: Option<PathBuf>,
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}
