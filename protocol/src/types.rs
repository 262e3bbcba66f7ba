//! # Shared Primitive Types
//!
//! Identities and amounts that cross every boundary in ARCA: the asset
//! ledger, the strategy, the share ledger, and the node API.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Asset and share quantities, always in smallest-unit denomination.
///
/// Conversions widen to `u128` for the intermediate product, so any two
/// `Amount`s can be multiplied without overflow.
pub type Amount = u64;

/// An account identity on the asset ledger or the share ledger.
///
/// Opaque to the vault: it is compared, hashed, and logged, never parsed.
/// The empty address is reserved as "no account" and is rejected wherever
/// a real counterparty is required.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wraps a raw identity string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the raw identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` for the reserved empty address.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Address {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}
