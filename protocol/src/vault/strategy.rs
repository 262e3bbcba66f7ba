//! The strategy capability: the external custodian of pooled assets.
//!
//! A strategy is untrusted code. The vault calls into it in the middle of
//! its own operations, verifies every asset movement it claims to have made
//! against the asset ledger, and rejects any attempt to call back into a
//! value-moving vault entry point while the call is in flight.

use thiserror::Error;

use crate::types::{Address, Amount};

/// Failures a strategy reports back to the vault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    /// The strategy holds positions but cannot free enough of them right now.
    #[error("insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity {
        /// Amount the vault asked for.
        requested: Amount,
        /// Amount the strategy could return.
        available: Amount,
    },

    /// Moving the asset between vault and strategy failed.
    #[error("asset transfer failed: {0}")]
    Transfer(String),

    /// Any other failure inside the strategy.
    #[error("{0}")]
    Failed(String),
}

/// A pluggable custodian of the vault's assets.
///
/// Contract:
///
/// - [`deposit`](Strategy::deposit) pulls exactly `amount` from the vault's
///   custody account using the allowance the vault has granted to
///   [`id`](Strategy::id).
/// - [`withdraw`](Strategy::withdraw) sends exactly `amount` to the vault's
///   custody account.
/// - [`total_assets`](Strategy::total_assets) reports the live value of
///   everything the strategy custodies for the vault.
/// - On `Err`, the call must not have moved any asset.
pub trait Strategy: Send + Sync {
    /// Identity of the strategy's custody account on the asset ledger.
    fn id(&self) -> &Address;

    /// Takes custody of `amount` from the vault.
    fn deposit(&self, amount: Amount) -> Result<(), StrategyError>;

    /// Returns `amount` to the vault.
    fn withdraw(&self, amount: Amount) -> Result<(), StrategyError>;

    /// Live valuation of the custodied assets.
    fn total_assets(&self) -> Result<Amount, StrategyError>;
}
