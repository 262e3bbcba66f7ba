//! # Vault Module — Share Accounting & Strategy Custody
//!
//! The vault is where deposits turn into shares. It owns the share ledger
//! and nothing else: the assets themselves always sit with the active
//! strategy, and the vault's custody account on the asset ledger is only a
//! waypoint inside a single operation.
//!
//! ## Architecture
//!
//! ```text
//! engine.rs     — The Vault: deposit/mint/withdraw/redeem, migration, views
//! shares.rs     — Share balances, allowances, and the rounding rules
//! math.rs       — Widened mul-div with explicit rounding direction
//! asset.rs      — Asset-ledger capability the vault moves value through
//! strategy.rs   — Strategy capability: the external custodian
//! authority.rs  — Who may run privileged operations
//! guard.rs      — Re-entrancy guard
//! events.rs     — Committed change notifications
//! ```
//!
//! ## Design Principles
//!
//! 1. **All amounts are `u64` in smallest-unit denomination.** Intermediate
//!    products are computed in `u128` and every division names its
//!    rounding direction. Rounding always favors the vault.
//!
//! 2. **Prices come from the strategy.** `total_assets` is whatever the
//!    active strategy reports, read before any asset moves.
//!
//! 3. **Verify, then trust.** Every movement a strategy or the ledger
//!    claims to have made is checked against custody balances.
//!
//! 4. **All-or-nothing.** A failed operation leaves shares, allowances,
//!    custody, and the strategy pointer as they were.

pub mod asset;
pub mod authority;
pub mod engine;
pub mod events;
pub mod guard;
pub mod math;
pub mod shares;
pub mod strategy;

pub use asset::{AssetError, AssetLedger};
pub use authority::{Authority, AuthoritySet, SingleOwner};
pub use engine::{MigrationReport, Vault, VaultSnapshot};
pub use events::{EventRecord, EventSink, VaultEvent};
pub use guard::{GuardToken, ReentrancyGuard};
pub use shares::{ShareLedger, UNLIMITED_ALLOWANCE};
pub use strategy::{Strategy, StrategyError};
