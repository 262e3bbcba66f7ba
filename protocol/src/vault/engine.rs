//! The vault: share accounting on top of a delegated custodian.
//!
//! A [`Vault`] never holds assets at rest. Every deposit is pulled from the
//! depositor into the vault's custody account and forwarded to the active
//! [`Strategy`] within the same operation; every withdrawal is recalled from
//! the strategy and paid out before the operation returns. Share supply is
//! the only state the vault itself owns.
//!
//! ## Atomicity
//!
//! Each value-moving entry point is all-or-nothing. Local state (shares,
//! share allowances, the strategy pointer) is mutated only after the
//! external calls it depends on succeed, and every external step that
//! already happened is compensated when a later step fails: minted shares
//! are burned, pulled assets are refunded, assets a strategy took are
//! recalled. Events are recorded only on commit.
//!
//! ## Locking
//!
//! Operations are serialized by a re-entrant operation lock. A strategy
//! called from inside an operation runs on the same thread, so it can still
//! read vault views; if it tries to enter a value-moving entry point the
//! [`ReentrancyGuard`] rejects the call with [`VaultError::ReentrantCall`].
//! Views that ask the strategy for its valuation hold the guard as well, so
//! `Strategy::total_assets` never runs with the guard released.
//! The state mutex is never held across a call into the asset ledger or
//! the strategy.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{AllowancePolicy, VaultConfig, EVENT_JOURNAL_CAPACITY, PRICE_SCALE};
use crate::error::{VaultError, VaultResult};
use crate::types::{Address, Amount};

use super::asset::{AssetError, AssetLedger};
use super::authority::Authority;
use super::events::{EventRecord, EventSink, VaultEvent};
use super::guard::{GuardToken, ReentrancyGuard};
use super::math::mul_div_down;
use super::shares::{ShareLedger, UNLIMITED_ALLOWANCE};
use super::strategy::{Strategy, StrategyError};

/// Outcome of a successful [`Vault::set_strategy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Identity of the strategy that was replaced.
    pub old: Address,
    /// Identity of the strategy now active.
    pub new: Address,
    /// Assets moved from `old` to `new`.
    pub migrated_assets: Amount,
}

/// Point-in-time view of the vault, as served by the node's status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultSnapshot {
    pub address: Address,
    pub strategy: Address,
    pub model_id: String,
    pub allowance_policy: AllowancePolicy,
    pub total_assets: Amount,
    pub total_shares: Amount,
    /// Assets per share, scaled by [`PRICE_SCALE`].
    pub share_price: Amount,
    pub holders: usize,
}

struct VaultState {
    shares: ShareLedger,
    strategy: Arc<dyn Strategy>,
    model_id: String,
    authority: Box<dyn Authority>,
    journal: VecDeque<EventRecord>,
    next_sequence: u64,
}

struct VaultInner {
    op_lock: ReentrantMutex<()>,
    guard: ReentrancyGuard,
    address: Address,
    policy: AllowancePolicy,
    min_deposit: Amount,
    asset: Arc<dyn AssetLedger>,
    state: Mutex<VaultState>,
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
}

/// An in-flight value-moving operation.
///
/// Fields drop in declaration order: the guard is released before the
/// operation lock, so the next operation never observes a stale guard.
struct Operation<'a> {
    _token: GuardToken<'a>,
    _serial: ReentrantMutexGuard<'a, ()>,
}

/// A view that calls into the strategy. Holds the guard only when no
/// operation was already in flight.
struct ReadScope<'a> {
    _token: Option<GuardToken<'a>>,
    _serial: ReentrantMutexGuard<'a, ()>,
}

/// Share-issuing vault over a single fungible asset.
///
/// Cloning is cheap and every clone refers to the same vault.
#[derive(Clone)]
pub struct Vault {
    inner: Arc<VaultInner>,
}

impl Vault {
    /// Creates a vault with `strategy` active and no shares outstanding.
    ///
    /// Under [`AllowancePolicy::Unlimited`] the standing allowance is
    /// granted to `strategy` here.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidStrategyAddress`] if the strategy identity is
    /// empty or equals the vault's custody address, and
    /// [`VaultError::TransferFailed`] if the standing allowance cannot be set.
    pub fn new(
        config: &VaultConfig,
        asset: Arc<dyn AssetLedger>,
        strategy: Arc<dyn Strategy>,
        authority: Box<dyn Authority>,
    ) -> VaultResult<Self> {
        validate_strategy_id(&config.vault_address, strategy.id())?;

        let vault = Self {
            inner: Arc::new(VaultInner {
                op_lock: ReentrantMutex::new(()),
                guard: ReentrancyGuard::new(),
                address: config.vault_address.clone(),
                policy: config.allowance_policy,
                min_deposit: config.min_deposit.max(1),
                asset,
                state: Mutex::new(VaultState {
                    shares: ShareLedger::new(),
                    strategy: Arc::clone(&strategy),
                    model_id: config.model_id.clone(),
                    authority,
                    journal: VecDeque::new(),
                    next_sequence: 0,
                }),
                sinks: RwLock::new(Vec::new()),
            }),
        };
        vault.grant_standing_allowance(&strategy)?;

        info!(
            vault = %vault.inner.address,
            strategy = %strategy.id(),
            policy = ?vault.inner.policy,
            "vault initialized"
        );
        Ok(vault)
    }

    // -- Value-moving entry points ---------------------------------------

    /// Pulls `assets` from `caller`, forwards them to the strategy, and
    /// mints the corresponding shares (rounded down) to `receiver`.
    ///
    /// Shares are priced against the valuation taken *before* the assets
    /// move. Returns the shares minted.
    pub fn deposit(
        &self,
        caller: &Address,
        assets: Amount,
        receiver: &Address,
    ) -> VaultResult<Amount> {
        let _op = self.begin()?;
        self.ensure_deposit_amount(assets)?;

        let strategy = self.active_strategy();
        let total_assets = self.valuation(&strategy)?;
        let shares = self.with_state(|s| s.shares.shares_for_deposit(assets, total_assets))?;
        if shares == 0 {
            return Err(VaultError::InvalidAmount {
                amount: assets,
                reason: "deposit is too small to mint a share",
            });
        }
        debug!(%caller, assets, shares, total_assets, "deposit priced");

        self.execute_deposit(caller, receiver, assets, shares, &strategy)?;
        Ok(shares)
    }

    /// Mints exactly `shares` to `receiver`, pulling the assets they cost
    /// (rounded up) from `caller`. Returns the assets pulled.
    pub fn mint(
        &self,
        caller: &Address,
        shares: Amount,
        receiver: &Address,
    ) -> VaultResult<Amount> {
        let _op = self.begin()?;
        if shares == 0 {
            return Err(VaultError::zero_amount());
        }

        let strategy = self.active_strategy();
        let total_assets = self.valuation(&strategy)?;
        let assets = self.with_state(|s| s.shares.assets_for_mint(shares, total_assets))?;
        self.ensure_deposit_amount(assets)?;
        debug!(%caller, assets, shares, total_assets, "mint priced");

        self.execute_deposit(caller, receiver, assets, shares, &strategy)?;
        Ok(assets)
    }

    /// Recalls `assets` from the strategy, burns the shares they are worth
    /// (rounded up) from `owner`, and pays `receiver`.
    ///
    /// When `caller` is not `owner`, the burned shares are charged against
    /// `owner`'s share allowance to `caller`. Returns the shares burned.
    pub fn withdraw(
        &self,
        caller: &Address,
        assets: Amount,
        receiver: &Address,
        owner: &Address,
    ) -> VaultResult<Amount> {
        let _op = self.begin()?;
        if assets == 0 {
            return Err(VaultError::zero_amount());
        }

        let strategy = self.active_strategy();
        let total_assets = self.valuation(&strategy)?;
        if assets > total_assets {
            return Err(VaultError::InsufficientLiquidity {
                requested: assets,
                available: total_assets,
            });
        }
        let shares = self.with_state(|s| s.shares.shares_for_withdraw(assets, total_assets))?;
        debug!(%caller, %owner, assets, shares, total_assets, "withdraw priced");

        self.execute_withdraw(caller, receiver, owner, assets, shares, &strategy)?;
        Ok(shares)
    }

    /// Burns exactly `shares` from `owner` and pays `receiver` what they are
    /// worth (rounded down). Returns the assets paid.
    pub fn redeem(
        &self,
        caller: &Address,
        shares: Amount,
        receiver: &Address,
        owner: &Address,
    ) -> VaultResult<Amount> {
        let _op = self.begin()?;
        if shares == 0 {
            return Err(VaultError::zero_amount());
        }

        let strategy = self.active_strategy();
        let total_assets = self.valuation(&strategy)?;
        let assets = self.with_state(|s| s.shares.assets_for_withdraw(shares, total_assets))?;
        if assets == 0 {
            return Err(VaultError::InvalidAmount {
                amount: shares,
                reason: "redemption is worth zero assets",
            });
        }
        debug!(%caller, %owner, assets, shares, total_assets, "redeem priced");

        self.execute_withdraw(caller, receiver, owner, assets, shares, &strategy)?;
        Ok(assets)
    }

    // -- Administrative entry points -------------------------------------

    /// Replaces the active strategy, moving every asset the old one holds
    /// into the new one.
    ///
    /// The target must report zero assets before it receives anything.
    /// The new strategy becomes active only after the migration completes.
    /// On any failure the old strategy stays active, holds what it held, and
    /// keeps its authorization.
    pub fn set_strategy(
        &self,
        caller: &Address,
        new_strategy: Arc<dyn Strategy>,
    ) -> VaultResult<MigrationReport> {
        let _op = self.begin()?;
        self.ensure_authorized(caller)?;
        validate_strategy_id(&self.inner.address, new_strategy.id())?;

        let old_strategy = self.active_strategy();
        if old_strategy.id() == new_strategy.id() {
            return Err(VaultError::InvalidStrategyAddress {
                reason: "strategy is already active",
            });
        }

        // whatever the target already holds would be credited to holders
        if self.valuation(&new_strategy)? > 0 {
            return Err(VaultError::InvalidStrategyAddress {
                reason: "strategy already reports assets",
            });
        }

        let amount = self.valuation(&old_strategy)?;
        info!(
            from = %old_strategy.id(),
            to = %new_strategy.id(),
            amount,
            "migrating strategy"
        );

        if amount > 0 {
            self.recall(&old_strategy, amount)?;
        }

        if let Err(err) = self.revoke_allowance(&old_strategy) {
            self.return_to_strategy(&old_strategy, amount);
            return Err(err);
        }
        if let Err(err) = self.grant_standing_allowance(&new_strategy) {
            self.restore_standing_allowance(&old_strategy);
            self.return_to_strategy(&old_strategy, amount);
            return Err(err);
        }
        if amount > 0 {
            if let Err(err) = self.forward(&new_strategy, amount) {
                warn!(error = %err, strategy = %new_strategy.id(), "migration rolled back");
                if let Err(revoke) = self.revoke_allowance(&new_strategy) {
                    error!(
                        error = %revoke,
                        strategy = %new_strategy.id(),
                        "failed to revoke unwanted allowance"
                    );
                }
                self.restore_standing_allowance(&old_strategy);
                self.return_to_strategy(&old_strategy, amount);
                return Err(err);
            }
        }

        self.with_state(|s| s.strategy = Arc::clone(&new_strategy));
        let report = MigrationReport {
            old: old_strategy.id().clone(),
            new: new_strategy.id().clone(),
            migrated_assets: amount,
        };
        self.commit(VaultEvent::StrategyChanged {
            old: report.old.clone(),
            new: report.new.clone(),
            migrated_assets: amount,
        });
        info!(strategy = %report.new, migrated = amount, "strategy migrated");
        Ok(report)
    }

    /// Replaces the opaque model tag. Returns the previous tag.
    pub fn set_model_id(
        &self,
        caller: &Address,
        model_id: impl Into<String>,
    ) -> VaultResult<String> {
        let _op = self.begin()?;
        self.ensure_authorized(caller)?;

        let new = model_id.into();
        let old = self.with_state(|s| std::mem::replace(&mut s.model_id, new.clone()));
        info!(%caller, old = %old, new = %new, "model id updated");
        self.commit(VaultEvent::ModelIdUpdated {
            old: old.clone(),
            new,
        });
        Ok(old)
    }

    /// Rotates the authority capability. The caller must be authorized by
    /// the *current* authority.
    pub fn set_authority(
        &self,
        caller: &Address,
        authority: Box<dyn Authority>,
    ) -> VaultResult<()> {
        let _op = self.begin()?;
        self.ensure_authorized(caller)?;

        let description = authority.describe();
        self.with_state(|s| s.authority = authority);
        info!(%caller, authority = %description, "authority rotated");
        self.commit(VaultEvent::AuthorityChanged {
            by: caller.clone(),
            authority: description,
        });
        Ok(())
    }

    // -- Share transfers --------------------------------------------------

    /// Moves `shares` from `caller` to `to`.
    pub fn transfer_shares(
        &self,
        caller: &Address,
        to: &Address,
        shares: Amount,
    ) -> VaultResult<()> {
        let _op = self.begin()?;
        if shares == 0 {
            return Err(VaultError::zero_amount());
        }
        ensure_share_holder(to, shares)?;

        self.with_state(|s| s.shares.transfer(caller, to, shares))?;
        self.commit(VaultEvent::SharesTransferred {
            from: caller.clone(),
            to: to.clone(),
            shares,
        });
        Ok(())
    }

    /// Moves `shares` from `from` to `to`, charged against `from`'s share
    /// allowance to `caller`.
    pub fn transfer_shares_from(
        &self,
        caller: &Address,
        from: &Address,
        to: &Address,
        shares: Amount,
    ) -> VaultResult<()> {
        let _op = self.begin()?;
        if shares == 0 {
            return Err(VaultError::zero_amount());
        }
        ensure_share_holder(to, shares)?;

        self.with_state(|s| -> VaultResult<()> {
            check_share_spend(&s.shares, caller, from, shares)?;
            let prior = s.shares.allowance(from, caller);
            s.shares.spend_allowance(from, caller, shares)?;
            if let Err(err) = s.shares.transfer(from, to, shares) {
                if caller != from {
                    s.shares.approve(from, caller, prior);
                }
                return Err(err);
            }
            Ok(())
        })?;
        self.commit(VaultEvent::SharesTransferred {
            from: from.clone(),
            to: to.clone(),
            shares,
        });
        Ok(())
    }

    /// Sets how many of `owner`'s shares `spender` may move or burn.
    pub fn approve_shares(
        &self,
        owner: &Address,
        spender: &Address,
        shares: Amount,
    ) -> VaultResult<()> {
        let _op = self.begin()?;
        self.with_state(|s| s.shares.approve(owner, spender, shares));
        self.commit(VaultEvent::SharesApproved {
            owner: owner.clone(),
            spender: spender.clone(),
            shares,
        });
        Ok(())
    }

    // -- Views ------------------------------------------------------------

    /// Live valuation reported by the active strategy.
    pub fn total_assets(&self) -> VaultResult<Amount> {
        let _read = self.begin_read();
        self.valuation(&self.active_strategy())
    }

    pub fn total_shares(&self) -> Amount {
        let _read = self.inner.op_lock.lock();
        self.with_state(|s| s.shares.total_shares())
    }

    pub fn balance_of(&self, holder: &Address) -> Amount {
        let _read = self.inner.op_lock.lock();
        self.with_state(|s| s.shares.balance_of(holder))
    }

    /// Share allowance of `spender` over `owner`.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        let _read = self.inner.op_lock.lock();
        self.with_state(|s| s.shares.allowance(owner, spender))
    }

    /// Assets per share, scaled by [`PRICE_SCALE`]. With no shares
    /// outstanding the price is exactly `PRICE_SCALE`.
    pub fn share_price(&self) -> VaultResult<Amount> {
        let _read = self.begin_read();
        let total_assets = self.valuation(&self.active_strategy())?;
        let total_shares = self.with_state(|s| s.shares.total_shares());
        if total_shares == 0 {
            return Ok(PRICE_SCALE);
        }
        mul_div_down(total_assets, PRICE_SCALE, total_shares)
    }

    /// Shares `assets` would be worth at the current valuation, rounded down.
    pub fn convert_to_shares(&self, assets: Amount) -> VaultResult<Amount> {
        self.preview_deposit(assets)
    }

    /// Assets `shares` are worth at the current valuation, rounded down.
    pub fn convert_to_assets(&self, shares: Amount) -> VaultResult<Amount> {
        self.preview_redeem(shares)
    }

    /// Shares [`deposit`](Self::deposit) would mint for `assets` right now.
    pub fn preview_deposit(&self, assets: Amount) -> VaultResult<Amount> {
        self.priced(|ledger, total| ledger.shares_for_deposit(assets, total))
    }

    /// Assets [`mint`](Self::mint) would pull for `shares` right now.
    pub fn preview_mint(&self, shares: Amount) -> VaultResult<Amount> {
        self.priced(|ledger, total| ledger.assets_for_mint(shares, total))
    }

    /// Shares [`withdraw`](Self::withdraw) would burn for `assets` right now.
    pub fn preview_withdraw(&self, assets: Amount) -> VaultResult<Amount> {
        self.priced(|ledger, total| ledger.shares_for_withdraw(assets, total))
    }

    /// Assets [`redeem`](Self::redeem) would pay for `shares` right now.
    pub fn preview_redeem(&self, shares: Amount) -> VaultResult<Amount> {
        self.priced(|ledger, total| ledger.assets_for_withdraw(shares, total))
    }

    /// Largest `assets` argument `owner` can pass to [`withdraw`](Self::withdraw).
    pub fn max_withdraw(&self, owner: &Address) -> VaultResult<Amount> {
        self.priced(|ledger, total| {
            let assets = ledger.assets_for_withdraw(ledger.balance_of(owner), total)?;
            Ok(assets.min(total))
        })
    }

    /// Largest `shares` argument `owner` can pass to [`redeem`](Self::redeem).
    pub fn max_redeem(&self, owner: &Address) -> Amount {
        self.balance_of(owner)
    }

    /// Identity of the active strategy.
    pub fn strategy_id(&self) -> Address {
        let _read = self.inner.op_lock.lock();
        self.active_strategy().id().clone()
    }

    /// The opaque model tag.
    pub fn model_id(&self) -> String {
        let _read = self.inner.op_lock.lock();
        self.with_state(|s| s.model_id.clone())
    }

    /// The vault's custody account on the asset ledger.
    pub fn address(&self) -> &Address {
        &self.inner.address
    }

    pub fn allowance_policy(&self) -> AllowancePolicy {
        self.inner.policy
    }

    /// `true` if `caller` may run privileged operations.
    pub fn is_authorized(&self, caller: &Address) -> bool {
        let _read = self.inner.op_lock.lock();
        self.with_state(|s| s.authority.is_authorized(caller))
    }

    /// Every share holder with a non-zero balance, sorted by address.
    pub fn holders(&self) -> Vec<(Address, Amount)> {
        let _read = self.inner.op_lock.lock();
        self.with_state(|s| s.shares.holders())
    }

    /// Consistent point-in-time summary.
    pub fn snapshot(&self) -> VaultResult<VaultSnapshot> {
        let _read = self.begin_read();
        let strategy = self.active_strategy();
        let total_assets = self.valuation(&strategy)?;
        let share_price = self.share_price()?;
        Ok(self.with_state(|s| VaultSnapshot {
            address: self.inner.address.clone(),
            strategy: strategy.id().clone(),
            model_id: s.model_id.clone(),
            allowance_policy: self.inner.policy,
            total_assets,
            total_shares: s.shares.total_shares(),
            share_price,
            holders: s.shares.holder_count(),
        }))
    }

    // -- Events -----------------------------------------------------------

    /// Registers a sink that receives every event committed from now on.
    pub fn add_event_sink(&self, sink: Arc<dyn EventSink>) {
        self.inner.sinks.write().push(sink);
    }

    /// Journal entries still retained, oldest first.
    pub fn events(&self) -> Vec<EventRecord> {
        self.with_state(|s| s.journal.iter().cloned().collect())
    }

    /// Drains the journal.
    pub fn take_events(&self) -> Vec<EventRecord> {
        self.with_state(|s| s.journal.drain(..).collect())
    }

    // -- Internals ----------------------------------------------------------

    fn begin(&self) -> VaultResult<Operation<'_>> {
        let serial = self.inner.op_lock.lock();
        let token = self.inner.guard.enter().map_err(|err| {
            warn!(vault = %self.inner.address, "re-entrant vault call rejected");
            err
        })?;
        Ok(Operation {
            _token: token,
            _serial: serial,
        })
    }

    /// Scope for a view that calls into the strategy.
    ///
    /// Outside any operation the view takes the guard itself, so a
    /// strategy cannot enter a value-moving call from its valuation. Inside
    /// an operation on this thread the guard is already held and the view
    /// runs under it.
    fn begin_read(&self) -> ReadScope<'_> {
        let serial = self.inner.op_lock.lock();
        // op_lock is held, so a held guard belongs to this thread
        let token = self.inner.guard.enter().ok();
        ReadScope {
            _token: token,
            _serial: serial,
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut VaultState) -> R) -> R {
        let mut state = self.inner.state.lock();
        f(&mut state)
    }

    fn active_strategy(&self) -> Arc<dyn Strategy> {
        self.with_state(|s| Arc::clone(&s.strategy))
    }

    fn custody(&self) -> Amount {
        self.inner.asset.balance_of(&self.inner.address)
    }

    fn valuation(&self, strategy: &Arc<dyn Strategy>) -> VaultResult<Amount> {
        strategy
            .total_assets()
            .map_err(|err| strategy_failure(strategy.id(), err))
    }

    fn priced<R>(
        &self,
        f: impl FnOnce(&ShareLedger, Amount) -> VaultResult<R>,
    ) -> VaultResult<R> {
        let _read = self.begin_read();
        let total_assets = self.valuation(&self.active_strategy())?;
        self.with_state(|s| f(&s.shares, total_assets))
    }

    fn ensure_authorized(&self, caller: &Address) -> VaultResult<()> {
        if self.with_state(|s| s.authority.is_authorized(caller)) {
            return Ok(());
        }
        warn!(%caller, "unauthorized privileged call");
        Err(VaultError::Unauthorized {
            caller: caller.clone(),
        })
    }

    fn ensure_deposit_amount(&self, assets: Amount) -> VaultResult<()> {
        if assets == 0 {
            return Err(VaultError::zero_amount());
        }
        if assets < self.inner.min_deposit {
            return Err(VaultError::InvalidAmount {
                amount: assets,
                reason: "below the minimum deposit",
            });
        }
        Ok(())
    }

    /// Rejects asset counterparties the vault cannot move value to or from.
    fn ensure_counterparty(&self, from: &Address, to: &Address, amount: Amount) -> VaultResult<()> {
        let counterparty = if *from == self.inner.address { to } else { from };
        if counterparty.is_empty() || *counterparty == self.inner.address {
            return Err(VaultError::TransferFailed {
                from: from.clone(),
                to: to.clone(),
                amount,
            });
        }
        Ok(())
    }

    fn execute_deposit(
        &self,
        caller: &Address,
        receiver: &Address,
        assets: Amount,
        shares: Amount,
        strategy: &Arc<dyn Strategy>,
    ) -> VaultResult<()> {
        ensure_share_holder(receiver, shares)?;
        self.pull_from_depositor(caller, assets)?;

        if let Err(err) = self.with_state(|s| s.shares.mint(receiver, shares)) {
            self.refund(caller, assets);
            return Err(err);
        }

        if let Err(err) = self.forward(strategy, assets) {
            warn!(error = %err, %caller, assets, "deposit rolled back");
            if let Err(burn) = self.with_state(|s| s.shares.burn(receiver, shares)) {
                error!(error = %burn, %receiver, shares, "failed to burn rolled-back shares");
            }
            self.refund(caller, assets);
            return Err(err);
        }

        self.commit(VaultEvent::Deposit {
            caller: caller.clone(),
            receiver: receiver.clone(),
            assets,
            shares,
        });
        info!(%caller, %receiver, assets, shares, "deposit");
        Ok(())
    }

    fn execute_withdraw(
        &self,
        caller: &Address,
        receiver: &Address,
        owner: &Address,
        assets: Amount,
        shares: Amount,
        strategy: &Arc<dyn Strategy>,
    ) -> VaultResult<()> {
        self.ensure_counterparty(&self.inner.address, receiver, assets)?;
        let prior_allowance = self.with_state(|s| -> VaultResult<Amount> {
            check_share_spend(&s.shares, caller, owner, shares)?;
            Ok(s.shares.allowance(owner, caller))
        })?;

        self.recall(strategy, assets)?;

        let burned = self.with_state(|s| -> VaultResult<()> {
            s.shares.spend_allowance(owner, caller, shares)?;
            if let Err(err) = s.shares.burn(owner, shares) {
                restore_share_allowance(&mut s.shares, caller, owner, prior_allowance);
                return Err(err);
            }
            Ok(())
        });
        if let Err(err) = burned {
            self.return_to_strategy(strategy, assets);
            return Err(err);
        }

        if let Err(err) = self.pay_out(receiver, assets) {
            warn!(error = %err, %caller, assets, "withdrawal rolled back");
            self.with_state(|s| {
                if let Err(remint) = s.shares.mint(owner, shares) {
                    error!(error = %remint, %owner, shares, "failed to restore burned shares");
                }
                restore_share_allowance(&mut s.shares, caller, owner, prior_allowance);
            });
            self.return_to_strategy(strategy, assets);
            return Err(err);
        }

        self.commit(VaultEvent::Withdraw {
            caller: caller.clone(),
            receiver: receiver.clone(),
            owner: owner.clone(),
            assets,
            shares,
        });
        info!(%caller, %receiver, %owner, assets, shares, "withdraw");
        Ok(())
    }

    /// Moves `assets` from the depositor into custody and verifies arrival.
    fn pull_from_depositor(&self, caller: &Address, assets: Amount) -> VaultResult<()> {
        let vault = &self.inner.address;
        self.ensure_counterparty(caller, vault, assets)?;

        let before = self.custody();
        settle(
            self.inner.asset.transfer_from(vault, caller, vault, assets),
            caller,
            vault,
            assets,
        )?;
        let arrived = self.custody().saturating_sub(before);
        if arrived != assets {
            warn!(%caller, assets, arrived, "ledger reported success but custody disagrees");
            if arrived > 0 {
                self.refund(caller, arrived);
            }
            return Err(VaultError::TransferFailed {
                from: caller.clone(),
                to: vault.clone(),
                amount: assets,
            });
        }
        Ok(())
    }

    fn pay_out(&self, receiver: &Address, assets: Amount) -> VaultResult<()> {
        let vault = &self.inner.address;
        settle(
            self.inner.asset.transfer(vault, receiver, assets),
            vault,
            receiver,
            assets,
        )
    }

    fn refund(&self, caller: &Address, assets: Amount) {
        if let Err(err) = self.pay_out(caller, assets) {
            error!(error = %err, %caller, assets, "refund failed; assets remain in vault custody");
        }
    }

    /// Hands `amount` from custody to `strategy`. If the strategy errors or
    /// takes less than `amount`, whatever it did take is recalled.
    fn forward(&self, strategy: &Arc<dyn Strategy>, amount: Amount) -> VaultResult<()> {
        let before = self.custody();
        let result = self.push_to_strategy(strategy, amount);
        let taken = before.saturating_sub(self.custody());

        let result = result.and_then(|()| {
            if taken < amount {
                return Err(VaultError::StrategyCallFailed {
                    strategy: strategy.id().clone(),
                    reason: format!("took {taken} of {amount} from vault custody"),
                });
            }
            Ok(())
        });

        if let Err(err) = result {
            if taken > 0 {
                if let Err(recall) = self.pull_from_strategy(strategy, taken) {
                    error!(
                        error = %recall,
                        strategy = %strategy.id(),
                        taken,
                        "failed to recall partial deposit"
                    );
                }
            }
            return Err(err);
        }
        Ok(())
    }

    /// Asks `strategy` for `amount` back. If it delivers anything other than
    /// `amount`, the difference is handed back so its books stay whole.
    fn recall(&self, strategy: &Arc<dyn Strategy>, amount: Amount) -> VaultResult<()> {
        let before = self.custody();
        let result = strategy
            .withdraw(amount)
            .map_err(|err| strategy_failure(strategy.id(), err));
        let arrived = self.custody().saturating_sub(before);

        if let Err(err) = result {
            self.return_to_strategy(strategy, arrived);
            return Err(err);
        }
        if arrived < amount {
            warn!(strategy = %strategy.id(), amount, arrived, "strategy under-delivered");
            self.return_to_strategy(strategy, arrived);
            return Err(VaultError::InsufficientLiquidity {
                requested: amount,
                available: arrived,
            });
        }
        if arrived > amount {
            self.return_to_strategy(strategy, arrived - amount);
        }
        Ok(())
    }

    /// Compensation path: moves `amount` back into `strategy`, logging
    /// instead of failing.
    fn return_to_strategy(&self, strategy: &Arc<dyn Strategy>, amount: Amount) {
        if amount == 0 {
            return;
        }
        if let Err(err) = self.push_to_strategy(strategy, amount) {
            error!(
                error = %err,
                strategy = %strategy.id(),
                amount,
                "failed to return assets to strategy; they remain in vault custody"
            );
        }
    }

    fn push_to_strategy(&self, strategy: &Arc<dyn Strategy>, amount: Amount) -> VaultResult<()> {
        self.grant_operation_allowance(strategy, amount)?;
        let result = strategy
            .deposit(amount)
            .map_err(|err| strategy_failure(strategy.id(), err));
        self.reset_operation_allowance(strategy);
        result
    }

    fn pull_from_strategy(&self, strategy: &Arc<dyn Strategy>, amount: Amount) -> VaultResult<()> {
        let before = self.custody();
        strategy
            .withdraw(amount)
            .map_err(|err| strategy_failure(strategy.id(), err))?;
        let arrived = self.custody().saturating_sub(before);
        if arrived < amount {
            return Err(VaultError::InsufficientLiquidity {
                requested: amount,
                available: arrived,
            });
        }
        Ok(())
    }

    fn approve_strategy(&self, strategy: &Arc<dyn Strategy>, amount: Amount) -> VaultResult<()> {
        let vault = &self.inner.address;
        settle(
            self.inner.asset.approve(vault, strategy.id(), amount),
            vault,
            strategy.id(),
            amount,
        )
    }

    fn grant_operation_allowance(
        &self,
        strategy: &Arc<dyn Strategy>,
        amount: Amount,
    ) -> VaultResult<()> {
        match self.inner.policy {
            AllowancePolicy::PerOperation => self.approve_strategy(strategy, amount),
            AllowancePolicy::Unlimited => Ok(()),
        }
    }

    fn reset_operation_allowance(&self, strategy: &Arc<dyn Strategy>) {
        if self.inner.policy != AllowancePolicy::PerOperation {
            return;
        }
        if let Err(err) = self.approve_strategy(strategy, 0) {
            error!(error = %err, strategy = %strategy.id(), "failed to reset strategy allowance");
        }
    }

    fn grant_standing_allowance(&self, strategy: &Arc<dyn Strategy>) -> VaultResult<()> {
        match self.inner.policy {
            AllowancePolicy::Unlimited => self.approve_strategy(strategy, Amount::MAX),
            AllowancePolicy::PerOperation => Ok(()),
        }
    }

    fn restore_standing_allowance(&self, strategy: &Arc<dyn Strategy>) {
        if let Err(err) = self.grant_standing_allowance(strategy) {
            error!(error = %err, strategy = %strategy.id(), "failed to restore strategy allowance");
        }
    }

    fn revoke_allowance(&self, strategy: &Arc<dyn Strategy>) -> VaultResult<()> {
        self.approve_strategy(strategy, 0)
    }

    fn commit(&self, event: VaultEvent) {
        let record = self.with_state(|s| {
            s.next_sequence += 1;
            let record = EventRecord::new(s.next_sequence, event);
            if s.journal.len() == EVENT_JOURNAL_CAPACITY {
                s.journal.pop_front();
            }
            s.journal.push_back(record.clone());
            record
        });
        let sinks: Vec<Arc<dyn EventSink>> = self.inner.sinks.read().clone();
        for sink in sinks {
            sink.publish(&record);
        }
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("address", &self.inner.address)
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

fn validate_strategy_id(vault: &Address, id: &Address) -> VaultResult<()> {
    if id.is_empty() {
        return Err(VaultError::InvalidStrategyAddress {
            reason: "strategy identity is empty",
        });
    }
    if id == vault {
        return Err(VaultError::InvalidStrategyAddress {
            reason: "strategy cannot share the vault's custody account",
        });
    }
    Ok(())
}

fn ensure_share_holder(holder: &Address, shares: Amount) -> VaultResult<()> {
    if holder.is_empty() {
        return Err(VaultError::InvalidAmount {
            amount: shares,
            reason: "share receiver is empty",
        });
    }
    Ok(())
}

/// Balance and allowance pre-check for a delegated share debit.
fn check_share_spend(
    ledger: &ShareLedger,
    caller: &Address,
    owner: &Address,
    shares: Amount,
) -> VaultResult<()> {
    let balance = ledger.balance_of(owner);
    if balance < shares {
        return Err(VaultError::InsufficientShares {
            owner: owner.clone(),
            balance,
            required: shares,
        });
    }
    if caller != owner {
        let allowance = ledger.allowance(owner, caller);
        if allowance != UNLIMITED_ALLOWANCE && allowance < shares {
            return Err(VaultError::InsufficientAllowance {
                owner: owner.clone(),
                spender: caller.clone(),
                allowance,
                required: shares,
            });
        }
    }
    Ok(())
}

fn restore_share_allowance(
    ledger: &mut ShareLedger,
    caller: &Address,
    owner: &Address,
    prior: Amount,
) {
    if caller != owner {
        ledger.approve(owner, caller, prior);
    }
}

fn strategy_failure(strategy: &Address, err: StrategyError) -> VaultError {
    match err {
        StrategyError::InsufficientLiquidity { requested, available } => {
            VaultError::InsufficientLiquidity { requested, available }
        }
        other => VaultError::StrategyCallFailed {
            strategy: strategy.clone(),
            reason: other.to_string(),
        },
    }
}

fn settle(
    result: Result<bool, AssetError>,
    from: &Address,
    to: &Address,
    amount: Amount,
) -> VaultResult<()> {
    let failure = || VaultError::TransferFailed {
        from: from.clone(),
        to: to.clone(),
        amount,
    };
    match result {
        Ok(true) => Ok(()),
        Ok(false) => {
            warn!(%from, %to, amount, "asset ledger returned false");
            Err(failure())
        }
        Err(err) => {
            warn!(error = %err, %from, %to, amount, "asset ledger call failed");
            Err(failure())
        }
    }
}
