//! # Protocol Configuration & Constants
//!
//! Every magic number in ARCA lives here, next to [`VaultConfig`], the
//! per-deployment settings a node loads from disk. If you're hardcoding a
//! constant somewhere else, move it here.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Address, Amount};
use crate::vault::authority::{Authority, AuthoritySet, SingleOwner};

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The library version string, reported by the node's status endpoint.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Accounting
// ---------------------------------------------------------------------------

/// Fixed-point scale of [`crate::vault::Vault::share_price`]. A price of
/// `PRICE_SCALE` means one share is worth exactly one unit of the asset.
pub const PRICE_SCALE: Amount = 1_000_000_000;

/// Smallest deposit accepted by default. One unit: the vault only rejects
/// zero, and deposits too small to mint a single share.
pub const DEFAULT_MIN_DEPOSIT: Amount = 1;

/// Custody account of the vault on the asset ledger.
pub const DEFAULT_VAULT_ADDRESS: &str = "arca:vault";

/// Model tag assigned before governance sets a real one.
pub const DEFAULT_MODEL_ID: &str = "unassigned";

/// Committed events retained in the vault's in-memory journal. Older
/// entries are dropped once the journal is full; indexers that need the
/// full history should attach an event sink instead of polling.
pub const EVENT_JOURNAL_CAPACITY: usize = 10_000;

// ---------------------------------------------------------------------------
// Network Parameters
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_API_PORT: u16 = 9841;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// Shortest admin bearer token a node accepts.
pub const MIN_ADMIN_TOKEN_LEN: usize = 16;

// ---------------------------------------------------------------------------
// VaultConfig
// ---------------------------------------------------------------------------

/// How the vault authorizes its strategy to pull asset out of custody.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowancePolicy {
    /// Approve exactly the amount being forwarded, right before the
    /// strategy call, and reset to zero right after. The strategy never
    /// holds a standing allowance.
    #[default]
    PerOperation,
    /// Approve `u64::MAX` once when a strategy becomes active, revoke it
    /// on migration.
    Unlimited,
}

/// Errors loading or validating a [`VaultConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the config file failed.
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid config JSON.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The config parsed but is unusable.
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Per-deployment vault settings.
///
/// Missing fields fall back to [`VaultConfig::default`], so a config file
/// only needs to mention what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// The vault's custody account on the asset ledger.
    pub vault_address: Address,
    /// Strategy allowance policy.
    pub allowance_policy: AllowancePolicy,
    /// Deposits (and mints) pulling fewer assets than this are rejected.
    pub min_deposit: Amount,
    /// Initial opaque model tag.
    pub model_id: String,
    /// Identities allowed to run privileged operations.
    pub admins: Vec<Address>,
    /// Bearer token a node accepts as the first admin. When unset the node
    /// generates one per run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            vault_address: Address::from(DEFAULT_VAULT_ADDRESS),
            allowance_policy: AllowancePolicy::default(),
            min_deposit: DEFAULT_MIN_DEPOSIT,
            model_id: DEFAULT_MODEL_ID.to_string(),
            admins: vec![Address::from("arca:governance")],
            admin_token: None,
        }
    }
}

impl VaultConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes this config as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }

    /// Rejects configs no vault can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vault_address.is_empty() {
            return Err(ConfigError::Invalid("vault_address must not be empty"));
        }
        if self.min_deposit == 0 {
            return Err(ConfigError::Invalid("min_deposit must be at least 1"));
        }
        if !self.admins.iter().any(|a| !a.is_empty()) {
            return Err(ConfigError::Invalid("at least one admin is required"));
        }
        if self.admins.contains(&self.vault_address) {
            return Err(ConfigError::Invalid("the vault cannot administer itself"));
        }
        if let Some(token) = &self.admin_token {
            if token.len() < MIN_ADMIN_TOKEN_LEN {
                return Err(ConfigError::Invalid("admin_token is too short"));
            }
        }
        Ok(())
    }

    /// Builds the authority capability for the configured admins: a
    /// [`SingleOwner`] for one admin, an [`AuthoritySet`] otherwise.
    pub fn authority(&self) -> Box<dyn Authority> {
        let admins: Vec<Address> = self
            .admins
            .iter()
            .filter(|a| !a.is_empty())
            .cloned()
            .collect();
        match admins.as_slice() {
            [only] => Box::new(SingleOwner::new(only.clone())),
            _ => Box::new(AuthoritySet::new(admins)),
        }
    }
}
