//! Error types for the vault core.
//!
//! Every vault operation that can fail returns a [`VaultError`]. Each
//! variant aborts the whole operation: by the time the caller sees the
//! error, shares, allowances, custody, and the strategy pointer are back
//! where they were before the call.

use thiserror::Error;

use crate::types::{Address, Amount};

/// Result alias for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Failure modes of the vault's value-moving and administrative entry points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// A zero amount, or an amount that converts to zero on the other side.
    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount {
        /// The rejected amount.
        amount: Amount,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// An asset movement into or out of vault custody failed or returned false.
    #[error("asset transfer of {amount} from {from} to {to} failed")]
    TransferFailed {
        /// Debited account.
        from: Address,
        /// Credited account.
        to: Address,
        /// Amount that did not move.
        amount: Amount,
    },

    /// A burn or transfer exceeds the holder's share balance.
    #[error("insufficient shares: {owner} holds {balance}, needs {required}")]
    InsufficientShares {
        /// Holder being debited.
        owner: Address,
        /// Current balance.
        balance: Amount,
        /// Shares the operation needs.
        required: Amount,
    },

    /// The strategy cannot return the requested assets.
    #[error("insufficient liquidity: requested {requested}, strategy can return {available}")]
    InsufficientLiquidity {
        /// Assets requested.
        requested: Amount,
        /// Assets the strategy reported or actually returned.
        available: Amount,
    },

    /// A strategy entry point errored.
    #[error("strategy {strategy} call failed: {reason}")]
    StrategyCallFailed {
        /// Identity of the failing strategy.
        strategy: Address,
        /// Strategy-provided description.
        reason: String,
    },

    /// A privileged entry point was called by an identity outside the authority set.
    #[error("unauthorized caller: {caller}")]
    Unauthorized {
        /// The rejected caller.
        caller: Address,
    },

    /// Migration target has an empty identity or collides with vault custody.
    #[error("invalid strategy address: {reason}")]
    InvalidStrategyAddress {
        /// Why the target was rejected.
        reason: &'static str,
    },

    /// A value-moving entry point was entered while another was in flight.
    #[error("reentrant call rejected")]
    ReentrantCall,

    /// A delegated share spend exceeds the approved allowance.
    #[error("insufficient share allowance: {spender} has {allowance} of {owner}, needs {required}")]
    InsufficientAllowance {
        /// Share holder.
        owner: Address,
        /// Delegated caller.
        spender: Address,
        /// Remaining allowance.
        allowance: Amount,
        /// Shares the operation needs.
        required: Amount,
    },

    /// Shares are outstanding but the strategy values them at zero.
    #[error("vault is insolvent: shares outstanding against zero assets")]
    InsolventVault,

    /// A conversion or balance update does not fit in an [`Amount`].
    #[error("arithmetic overflow")]
    Overflow,
}

impl VaultError {
    /// Stable identifier for logs, metrics labels, and API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount { .. } => "E010_INVALID_AMOUNT",
            Self::TransferFailed { .. } => "E020_TRANSFER_FAILED",
            Self::InsufficientShares { .. } => "E030_INSUFFICIENT_SHARES",
            Self::InsufficientLiquidity { .. } => "E040_INSUFFICIENT_LIQUIDITY",
            Self::StrategyCallFailed { .. } => "E050_STRATEGY_CALL_FAILED",
            Self::Unauthorized { .. } => "E060_UNAUTHORIZED",
            Self::InvalidStrategyAddress { .. } => "E061_INVALID_STRATEGY",
            Self::ReentrantCall => "E070_REENTRANT_CALL",
            Self::InsufficientAllowance { .. } => "E080_INSUFFICIENT_ALLOWANCE",
            Self::InsolventVault => "E090_INSOLVENT",
            Self::Overflow => "E091_OVERFLOW",
        }
    }

    pub(crate) fn zero_amount() -> Self {
        Self::InvalidAmount {
            amount: 0,
            reason: "amount must be greater than zero",
        }
    }
}
