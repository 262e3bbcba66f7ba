// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ARCA Protocol — Core Library
//!
//! ARCA is a custodial vault: depositors hand over a fungible asset and get
//! back shares, a pluggable strategy custodies the pooled assets, and the
//! share price floats with whatever the strategy reports. That is the whole
//! product. Everything in this crate exists to keep those books exact.
//!
//! ## Architecture
//!
//! - **types** — Addresses and amounts.
//! - **error** — The vault's error taxonomy, with stable codes.
//! - **vault** — Share ledger, the vault itself, and the capabilities it
//!   consumes (asset ledger, strategy, authority).
//! - **config** — Protocol constants and per-deployment settings.
//!
//! ## Design Philosophy
//!
//! 1. Rounding always favors the vault. Nobody extracts value by
//!    splitting an operation into smaller ones.
//! 2. A strategy is untrusted code. Every movement it claims is verified.
//! 3. Operations are all-or-nothing, and events are only emitted on commit.
//! 4. If it touches money, it has tests. Plural.

pub mod config;
pub mod error;
pub mod types;
pub mod vault;

pub use config::{AllowancePolicy, VaultConfig};
pub use error::{VaultError, VaultResult};
pub use types::{Address, Amount};
pub use vault::{AssetLedger, Authority, Strategy, Vault};
