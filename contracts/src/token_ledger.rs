//! # Token Ledger Contract
//!
//! An in-memory fungible token: the asset a devnet vault accepts. Any
//! account can hold, transfer, and approve; only the issuer can mint new
//! supply. Accounts can be frozen, which makes every movement touching
//! them fail. That is how the integration tests simulate a ledger
//! refusing a transfer halfway through a vault operation.
//!
//! ## Security Model
//!
//! - **Mint gating**: `mint()` checks the caller against the issuer set
//!   at construction.
//! - **Allowances**: `transfer_from` consumes the spender's allowance,
//!   except an allowance of `u64::MAX`, which is treated as unlimited.
//! - **Supply tracking**: total supply and balances are updated under one
//!   lock. Overflow is checked on every operation.

use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use arca_protocol::vault::{AssetError, AssetLedger};
use arca_protocol::{Address, Amount};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during token ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The caller is not the issuer of this token.
    #[error("unauthorized: only the issuer can mint {symbol}")]
    UnauthorizedMint {
        /// Ticker of the token.
        symbol: String,
    },

    /// A supply or balance overflow would occur.
    #[error("supply overflow: crediting {amount} would exceed u64::MAX")]
    SupplyOverflow {
        /// The amount that was attempted.
        amount: Amount,
    },

    /// Insufficient balance for a debit.
    #[error("insufficient balance: {account} has {balance}, tried to move {amount}")]
    InsufficientBalance {
        account: Address,
        balance: Amount,
        amount: Amount,
    },

    /// The spender's allowance is too small.
    #[error("insufficient allowance: {spender} may move {allowance} from {owner}, tried {amount}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowance: Amount,
        amount: Amount,
    },

    /// The account is frozen.
    #[error("account frozen: {0}")]
    Frozen(Address),

    /// An empty account identity was used.
    #[error("empty account identity")]
    EmptyAccount,
}

impl From<LedgerError> for AssetError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance {
                account,
                balance,
                amount,
            } => AssetError::InsufficientBalance {
                account,
                balance,
                required: amount,
            },
            LedgerError::InsufficientAllowance {
                owner,
                spender,
                allowance,
                amount,
            } => AssetError::InsufficientAllowance {
                owner,
                spender,
                allowance,
                required: amount,
            },
            LedgerError::SupplyOverflow { .. } => AssetError::Overflow,
            other => AssetError::Rejected(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Metadata and supply information for the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    /// Ticker symbol (e.g., "aUSD").
    pub symbol: String,
    /// Number of decimal places. Display only; the ledger never divides.
    pub decimals: u8,
    /// Identity allowed to mint.
    pub issuer: Address,
    /// Current total supply in the smallest denomination.
    pub total_supply: Amount,
}

#[derive(Debug, Default)]
struct LedgerState {
    total_supply: Amount,
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
    frozen: HashSet<Address>,
}

impl LedgerState {
    fn ensure_movable(&self, account: &Address) -> Result<(), LedgerError> {
        if account.is_empty() {
            return Err(LedgerError::EmptyAccount);
        }
        if self.frozen.contains(account) {
            return Err(LedgerError::Frozen(account.clone()));
        }
        Ok(())
    }

    fn balance(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn set_balance(&mut self, account: &Address, amount: Amount) {
        if amount == 0 {
            self.balances.remove(account);
        } else {
            self.balances.insert(account.clone(), amount);
        }
    }

    /// Moves `amount` from `from` to `to`. Validates everything before
    /// touching either balance.
    fn move_balance(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.ensure_movable(from)?;
        self.ensure_movable(to)?;

        let from_balance = self.balance(from);
        if from_balance < amount {
            return Err(LedgerError::InsufficientBalance {
                account: from.clone(),
                balance: from_balance,
                amount,
            });
        }
        if from == to || amount == 0 {
            return Ok(());
        }
        let to_balance = self
            .balance(to)
            .checked_add(amount)
            .ok_or(LedgerError::SupplyOverflow { amount })?;

        self.set_balance(from, from_balance - amount);
        self.set_balance(to, to_balance);
        Ok(())
    }
}

/// The token ledger. Interior-mutable, so it can be shared behind an
/// `Arc<dyn AssetLedger>` between the vault, its strategies, and the node.
#[derive(Debug)]
pub struct TokenLedger {
    symbol: String,
    decimals: u8,
    issuer: Address,
    state: RwLock<LedgerState>,
}

impl TokenLedger {
    /// Creates a token with zero supply. The issuer calls
    /// [`mint`](Self::mint) to create the initial supply.
    pub fn new(symbol: impl Into<String>, decimals: u8, issuer: impl Into<Address>) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            decimals,
            issuer: issuer.into(),
            state: RwLock::new(LedgerState::default()),
        }
    }

    /// Mints new tokens to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnauthorizedMint`] if `caller` is not the issuer.
    /// Returns [`LedgerError::SupplyOverflow`] if the mint would overflow u64.
    pub fn mint(&self, caller: &Address, to: &Address, amount: Amount) -> Result<(), LedgerError> {
        if *caller != self.issuer {
            return Err(LedgerError::UnauthorizedMint {
                symbol: self.symbol.clone(),
            });
        }

        let mut state = self.state.write();
        state.ensure_movable(to)?;
        let new_supply = state
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::SupplyOverflow { amount })?;
        let new_balance = state
            .balance(to)
            .checked_add(amount)
            .ok_or(LedgerError::SupplyOverflow { amount })?;

        state.total_supply = new_supply;
        state.set_balance(to, new_balance);
        debug!(symbol = %self.symbol, %to, amount, "minted");
        Ok(())
    }

    /// Burns tokens held by `from`. Only the holder can burn.
    pub fn burn(&self, from: &Address, amount: Amount) -> Result<(), LedgerError> {
        let mut state = self.state.write();
        state.ensure_movable(from)?;
        let balance = state.balance(from);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                account: from.clone(),
                balance,
                amount,
            });
        }
        state.set_balance(from, balance - amount);
        // balance <= total_supply
        state.total_supply -= amount;
        Ok(())
    }

    /// Freezes `account`: every transfer to or from it fails until
    /// [`unfreeze`](Self::unfreeze).
    pub fn freeze(&self, account: &Address) {
        self.state.write().frozen.insert(account.clone());
    }

    pub fn unfreeze(&self, account: &Address) {
        self.state.write().frozen.remove(account);
    }

    pub fn is_frozen(&self, account: &Address) -> bool {
        self.state.read().frozen.contains(account)
    }

    /// Returns the total supply.
    pub fn total_supply(&self) -> Amount {
        self.state.read().total_supply
    }

    /// Returns token metadata and current supply.
    pub fn info(&self) -> TokenInfo {
        TokenInfo {
            symbol: self.symbol.clone(),
            decimals: self.decimals,
            issuer: self.issuer.clone(),
            total_supply: self.total_supply(),
        }
    }

    /// Every non-zero balance, sorted by account.
    pub fn balances(&self) -> BTreeMap<Address, Amount> {
        self.state
            .read()
            .balances
            .iter()
            .map(|(account, amount)| (account.clone(), *amount))
            .collect()
    }

    /// `true` if the balances sum to the total supply.
    pub fn is_conserved(&self) -> bool {
        let state = self.state.read();
        let sum: u128 = state.balances.values().map(|b| u128::from(*b)).sum();
        sum == u128::from(state.total_supply)
    }
}

impl AssetLedger for TokenLedger {
    fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<bool, AssetError> {
        self.state.write().move_balance(from, to, amount)?;
        Ok(true)
    }

    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<bool, AssetError> {
        let mut state = self.state.write();
        if spender == from {
            state.move_balance(from, to, amount)?;
            return Ok(true);
        }

        let key = (from.clone(), spender.clone());
        let allowance = state.allowances.get(&key).copied().unwrap_or(0);
        if allowance < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: from.clone(),
                spender: spender.clone(),
                allowance,
                amount,
            }
            .into());
        }
        state.move_balance(from, to, amount)?;
        if allowance != Amount::MAX {
            state.allowances.insert(key, allowance - amount);
        }
        Ok(true)
    }

    fn approve(
        &self,
        owner: &Address,
        spender: &Address,
        amount: Amount,
    ) -> Result<bool, AssetError> {
        let mut state = self.state.write();
        state.ensure_movable(owner)?;
        if spender.is_empty() {
            return Err(LedgerError::EmptyAccount.into());
        }
        let key = (owner.clone(), spender.clone());
        if amount == 0 {
            state.allowances.remove(&key);
        } else {
            state.allowances.insert(key, amount);
        }
        Ok(true)
    }

    fn balance_of(&self, account: &Address) -> Amount {
        self.state.read().balance(account)
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.state
            .read()
            .allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0)
    }
}
