//! # Hold Strategy
//!
//! The simplest possible strategy: it takes custody of whatever the vault
//! forwards and holds it in its own ledger account. Its valuation is that
//! account's balance, so anything credited to the account directly (a
//! yield distribution, an airdrop) raises the vault's share price, and
//! anything debited lowers it.
//!
//! Two knobs exist for operators and tests: a liquidity cap, which limits
//! how much can be returned in one call, and a pause switch, which makes
//! deposits fail.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use arca_protocol::vault::{AssetError, AssetLedger, Strategy, StrategyError};
use arca_protocol::{Address, Amount};

/// Custody-only strategy over an [`AssetLedger`] account.
pub struct HoldStrategy {
    id: Address,
    vault: Address,
    ledger: Arc<dyn AssetLedger>,
    liquidity_cap: Mutex<Option<Amount>>,
    paused: AtomicBool,
}

impl HoldStrategy {
    /// Creates a strategy custodying under `id` on behalf of `vault`.
    pub fn new(
        id: impl Into<Address>,
        vault: impl Into<Address>,
        ledger: Arc<dyn AssetLedger>,
    ) -> Self {
        Self {
            id: id.into(),
            vault: vault.into(),
            ledger,
            liquidity_cap: Mutex::new(None),
            paused: AtomicBool::new(false),
        }
    }

    /// Limits how much a single `withdraw` can return. `None` lifts the cap.
    pub fn set_liquidity_cap(&self, cap: Option<Amount>) {
        *self.liquidity_cap.lock() = cap;
    }

    /// Makes every `deposit` fail until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Assets a single `withdraw` can currently return.
    pub fn available_liquidity(&self) -> Amount {
        let held = self.ledger.balance_of(&self.id);
        match *self.liquidity_cap.lock() {
            Some(cap) => held.min(cap),
            None => held,
        }
    }
}

impl std::fmt::Debug for HoldStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HoldStrategy")
            .field("id", &self.id)
            .field("vault", &self.vault)
            .field("paused", &self.paused.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

fn settled(result: Result<bool, AssetError>) -> Result<(), StrategyError> {
    match result {
        Ok(true) => Ok(()),
        Ok(false) => Err(StrategyError::Transfer("ledger returned false".into())),
        Err(err) => Err(StrategyError::Transfer(err.to_string())),
    }
}

impl Strategy for HoldStrategy {
    fn id(&self) -> &Address {
        &self.id
    }

    fn deposit(&self, amount: Amount) -> Result<(), StrategyError> {
        if self.paused.load(Ordering::SeqCst) {
            warn!(strategy = %self.id, amount, "deposit refused: paused");
            return Err(StrategyError::Failed("strategy is paused".into()));
        }
        settled(
            self.ledger
                .transfer_from(&self.id, &self.vault, &self.id, amount),
        )?;
        debug!(strategy = %self.id, amount, "took custody");
        Ok(())
    }

    fn withdraw(&self, amount: Amount) -> Result<(), StrategyError> {
        let available = self.available_liquidity();
        if amount > available {
            return Err(StrategyError::InsufficientLiquidity {
                requested: amount,
                available,
            });
        }
        settled(self.ledger.transfer(&self.id, &self.vault, amount))?;
        debug!(strategy = %self.id, amount, "returned custody");
        Ok(())
    }

    fn total_assets(&self) -> Result<Amount, StrategyError> {
        Ok(self.ledger.balance_of(&self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenLedger;

    fn setup() -> (Arc<TokenLedger>, HoldStrategy) {
        let ledger = Arc::new(TokenLedger::new("ausd", 6, "issuer"));
        ledger
            .mint(&Address::from("issuer"), &Address::from("vault"), 1_000)
            .unwrap();
        let strategy = HoldStrategy::new("hold", "vault", ledger.clone());
        (ledger, strategy)
    }

    #[test]
    fn deposit_requires_vault_allowance() {
        let (ledger, strategy) = setup();
        assert!(matches!(strategy.deposit(100), Err(StrategyError::Transfer(_))));

        ledger
            .approve(&Address::from("vault"), &Address::from("hold"), 100)
            .unwrap();
        strategy.deposit(100).unwrap();
        assert_eq!(strategy.total_assets().unwrap(), 100);
        assert_eq!(ledger.balance_of(&Address::from("vault")), 900);
    }

    #[test]
    fn liquidity_cap_limits_withdrawals() {
        let (ledger, strategy) = setup();
        ledger
            .approve(&Address::from("vault"), &Address::from("hold"), 500)
            .unwrap();
        strategy.deposit(500).unwrap();

        strategy.set_liquidity_cap(Some(200));
        assert_eq!(
            strategy.withdraw(300),
            Err(StrategyError::InsufficientLiquidity {
                requested: 300,
                available: 200
            })
        );
        strategy.withdraw(200).unwrap();
        strategy.set_liquidity_cap(None);
        strategy.withdraw(300).unwrap();
        assert_eq!(strategy.total_assets().unwrap(), 0);
    }

    #[test]
    fn paused_strategy_moves_nothing() {
        let (ledger, strategy) = setup();
        ledger
            .approve(&Address::from("vault"), &Address::from("hold"), 100)
            .unwrap();
        strategy.pause();
        assert!(matches!(strategy.deposit(100), Err(StrategyError::Failed(_))));
        assert_eq!(ledger.balance_of(&Address::from("vault")), 1_000);
        strategy.resume();
        assert!(strategy.deposit(100).is_ok());
    }
}
