//! # Share Ledger
//!
//! Total shares outstanding, per-holder balances, and delegated spending
//! allowances. The ledger also owns the asset/share conversion rules,
//! because the rounding direction of each conversion is what protects
//! existing holders:
//!
//! | Conversion                   | Used by            | Rounding |
//! |------------------------------|--------------------|----------|
//! | assets -> shares to mint     | `deposit`          | down     |
//! | shares -> assets to pull     | `mint`             | up       |
//! | assets -> shares to burn     | `withdraw`         | up       |
//! | shares -> assets to pay out  | `redeem`           | down     |
//!
//! Every conversion takes the valuation (`total_assets`) as observed
//! *before* the operation's own asset movement. With no shares
//! outstanding the price is 1:1.
//!
//! Invariant: the sum of all balances equals [`ShareLedger::total_shares`].
//! Zero balances are removed from the map, so a holder that has been
//! fully burned simply stops existing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::math::{mul_div_down, mul_div_up};
use crate::error::{VaultError, VaultResult};
use crate::types::{Address, Amount};

/// Allowance value that is never decremented when spent.
pub const UNLIMITED_ALLOWANCE: Amount = Amount::MAX;

/// The vault's record of share ownership.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShareLedger {
    total_shares: Amount,
    balances: HashMap<Address, Amount>,
    /// `owner -> (spender -> shares)`.
    allowances: HashMap<Address, HashMap<Address, Amount>>,
}

impl ShareLedger {
    /// Creates an empty ledger: no holders, no shares.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total shares outstanding.
    pub fn total_shares(&self) -> Amount {
        self.total_shares
    }

    /// Share balance of `holder` (0 for unknown holders).
    pub fn balance_of(&self, holder: &Address) -> Amount {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    /// All non-zero balances, sorted by holder for deterministic output.
    pub fn holders(&self) -> Vec<(Address, Amount)> {
        let mut out: Vec<_> = self
            .balances
            .iter()
            .map(|(h, b)| (h.clone(), *b))
            .collect();
        out.sort();
        out
    }

    /// Number of holders with a non-zero balance.
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// `true` when the balances sum to the recorded total.
    pub fn is_conserved(&self) -> bool {
        let sum: u128 = self.balances.values().map(|b| *b as u128).sum();
        sum == self.total_shares as u128
    }

    // -- Conversions ---------------------------------------------------------

    // Every conversion fails with [`VaultError::InsolventVault`] when
    // shares are outstanding but `total_assets` is zero.

    /// Shares to mint for a deposit of `assets`, rounded down.
    pub fn shares_for_deposit(&self, assets: Amount, total_assets: Amount) -> VaultResult<Amount> {
        if self.total_shares == 0 {
            return Ok(assets);
        }
        self.ensure_solvent(total_assets)?;
        mul_div_down(assets, self.total_shares, total_assets)
    }

    /// Assets to pull for minting exactly `shares`, rounded up.
    pub fn assets_for_mint(&self, shares: Amount, total_assets: Amount) -> VaultResult<Amount> {
        if self.total_shares == 0 {
            return Ok(shares);
        }
        self.ensure_solvent(total_assets)?;
        mul_div_up(shares, total_assets, self.total_shares)
    }

    /// Shares to burn for paying out exactly `assets`, rounded up.
    pub fn shares_for_withdraw(&self, assets: Amount, total_assets: Amount) -> VaultResult<Amount> {
        if self.total_shares == 0 {
            return Ok(assets);
        }
        self.ensure_solvent(total_assets)?;
        mul_div_up(assets, self.total_shares, total_assets)
    }

    /// Assets paid out for burning `shares`, rounded down.
    pub fn assets_for_withdraw(&self, shares: Amount, total_assets: Amount) -> VaultResult<Amount> {
        if self.total_shares == 0 {
            return Ok(shares);
        }
        self.ensure_solvent(total_assets)?;
        mul_div_down(shares, total_assets, self.total_shares)
    }

    fn ensure_solvent(&self, total_assets: Amount) -> VaultResult<()> {
        if total_assets == 0 {
            return Err(VaultError::InsolventVault);
        }
        Ok(())
    }

    // -- Mutations -----------------------------------------------------------

    /// Credits `shares` to `holder` and grows the total.
    ///
    /// # Errors
    ///
    /// [`VaultError::Overflow`] if either the total or the balance would
    /// exceed `u64::MAX`. Nothing changes on error.
    pub fn mint(&mut self, holder: &Address, shares: Amount) -> VaultResult<()> {
        let new_total = self
            .total_shares
            .checked_add(shares)
            .ok_or(VaultError::Overflow)?;
        let new_balance = self
            .balance_of(holder)
            .checked_add(shares)
            .ok_or(VaultError::Overflow)?;
        if new_balance > 0 {
            self.balances.insert(holder.clone(), new_balance);
        }
        self.total_shares = new_total;
        Ok(())
    }

    /// Debits `shares` from `holder` and shrinks the total.
    ///
    /// # Errors
    ///
    /// [`VaultError::InsufficientShares`] if `shares` exceeds the balance.
    pub fn burn(&mut self, holder: &Address, shares: Amount) -> VaultResult<()> {
        let balance = self.ensure_balance(holder, shares)?;
        self.set_balance(holder, balance - shares);
        // balance <= total_shares by conservation
        self.total_shares -= shares;
        Ok(())
    }

    /// Moves `shares` between holders. The total is unchanged.
    pub fn transfer(&mut self, from: &Address, to: &Address, shares: Amount) -> VaultResult<()> {
        let from_balance = self.ensure_balance(from, shares)?;
        if from == to || shares == 0 {
            return Ok(());
        }
        let to_balance = self
            .balance_of(to)
            .checked_add(shares)
            .ok_or(VaultError::Overflow)?;
        self.set_balance(from, from_balance - shares);
        self.set_balance(to, to_balance);
        Ok(())
    }

    // -- Allowances ----------------------------------------------------------

    /// Sets the number of `owner`'s shares that `spender` may burn or move.
    /// Overwrites any previous value; `0` revokes.
    pub fn approve(&mut self, owner: &Address, spender: &Address, shares: Amount) {
        if shares == 0 {
            if let Some(per_owner) = self.allowances.get_mut(owner) {
                per_owner.remove(spender);
                if per_owner.is_empty() {
                    self.allowances.remove(owner);
                }
            }
            return;
        }
        self.allowances
            .entry(owner.clone())
            .or_default()
            .insert(spender.clone(), shares);
    }

    /// Remaining allowance of `spender` over `owner`'s shares.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Consumes `shares` of allowance. A holder spending their own shares
    /// needs no allowance; [`UNLIMITED_ALLOWANCE`] is never decremented.
    ///
    /// # Errors
    ///
    /// [`VaultError::InsufficientAllowance`] if the allowance is too small.
    pub fn spend_allowance(
        &mut self,
        owner: &Address,
        spender: &Address,
        shares: Amount,
    ) -> VaultResult<()> {
        if owner == spender {
            return Ok(());
        }
        let current = self.allowance(owner, spender);
        if current == UNLIMITED_ALLOWANCE {
            return Ok(());
        }
        if current < shares {
            return Err(VaultError::InsufficientAllowance {
                owner: owner.clone(),
                spender: spender.clone(),
                allowance: current,
                required: shares,
            });
        }
        self.approve(owner, spender, current - shares);
        Ok(())
    }

    fn ensure_balance(&self, holder: &Address, shares: Amount) -> VaultResult<Amount> {
        let balance = self.balance_of(holder);
        if balance < shares {
            return Err(VaultError::InsufficientShares {
                owner: holder.clone(),
                balance,
                required: shares,
            });
        }
        Ok(balance)
    }

    fn set_balance(&mut self, holder: &Address, balance: Amount) {
        if balance == 0 {
            self.balances.remove(holder);
        } else {
            self.balances.insert(holder.clone(), balance);
        }
    }
}
