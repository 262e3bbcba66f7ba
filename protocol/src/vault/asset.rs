//! The asset-ledger capability the vault consumes.
//!
//! The vault never edits balances of the underlying asset. It moves value
//! only through these calls, exactly as a token contract would be called
//! from another contract. Caller identities are explicit arguments here
//! because there is no ambient `msg.sender`: the vault only ever passes
//! its own custody address as `from` (for `transfer`), `spender` (for
//! `transfer_from`) or `owner` (for `approve`).

use thiserror::Error;

use crate::types::{Address, Amount};

/// Failures reported by an asset-ledger implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    /// The debited account does not hold enough of the asset.
    #[error("insufficient balance: {account} holds {balance}, needs {required}")]
    InsufficientBalance {
        /// Debited account.
        account: Address,
        /// Its balance.
        balance: Amount,
        /// Amount requested.
        required: Amount,
    },

    /// The spender's allowance over `owner` is too small.
    #[error("allowance too small: {spender} may move {allowance} from {owner}, needs {required}")]
    InsufficientAllowance {
        /// Account whose balance would be debited.
        owner: Address,
        /// Account attempting the debit.
        spender: Address,
        /// Remaining allowance.
        allowance: Amount,
        /// Amount requested.
        required: Amount,
    },

    /// Crediting would overflow the recipient balance or the supply.
    #[error("balance overflow")]
    Overflow,

    /// The ledger refused the call for an implementation-specific reason.
    #[error("ledger rejected call: {0}")]
    Rejected(String),
}

/// Balance/transfer primitive of the fungible asset.
///
/// Mutating calls return `Ok(true)` on success. Both `Ok(false)` and an
/// `Err` are treated by the vault as a failed transfer; neither may leave
/// a partial movement behind.
pub trait AssetLedger: Send + Sync {
    /// Moves `amount` from `from` to `to` on `from`'s own authority.
    fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<bool, AssetError>;

    /// Moves `amount` from `from` to `to`, consuming `spender`'s allowance
    /// over `from`.
    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<bool, AssetError>;

    /// Sets `spender`'s allowance over `owner`'s balance to `amount`.
    fn approve(&self, owner: &Address, spender: &Address, amount: Amount)
        -> Result<bool, AssetError>;

    /// Current balance of `account`.
    fn balance_of(&self, account: &Address) -> Amount;

    /// Current allowance of `spender` over `owner`.
    fn allowance(&self, owner: &Address, spender: &Address) -> Amount;
}
