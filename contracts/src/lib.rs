//! # ARCA Reference Contracts
//!
//! Concrete collaborators for the vault core. The vault itself only knows
//! the [`AssetLedger`](arca_protocol::AssetLedger) and
//! [`Strategy`](arca_protocol::Strategy) capabilities; these are the
//! implementations a devnet node, and the integration tests, plug into it:
//!
//! - **Token Ledger** — an in-memory fungible token with balances,
//!   allowances, issuer-gated minting and account freezes.
//! - **Hold Strategy** — a strategy that simply holds what it is given,
//!   with an optional liquidity cap for exercising partial withdrawals.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow. `checked_add` and
//!    `checked_sub` everywhere, because wrapping arithmetic and money do
//!    not mix.
//! 2. A failed call moves nothing.
//! 3. Every public state type is serializable (serde) so the node can
//!    report it as is.

pub mod hold_strategy;
pub mod token_ledger;

pub use hold_strategy::HoldStrategy;
pub use token_ledger::{LedgerError, TokenLedger};
