// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! The lending pool.
//!
//! [`Pool`] owns the configuration, the mutable [`PoolState`] and the
//! external collaborators. Every public mutating call runs against a
//! snapshot of the state: on error the snapshot is restored, so a failed
//! operation leaves no trace. Calls out to collaborators are queued as
//! [`Effect`]s and dispatched only once the state transition has been made.

mod deposit;
mod loan;

pub use deposit::{Deposit, Redemption, RedemptionAvailability};
pub use loan::{LoanOrigination, LoanQuote, LoanStatus};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::RangeBounds;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::collaborators::{
    CollaboratorError, CollateralLiquidator, DelegationRegistry, LiquidationRequest,
    RecordingLiquidator,
};
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::events::PoolEvent;
use crate::liquidity::{Ledger, Node, Settlement};
use crate::tick::Tick;
use crate::types::{Address, Amount, Context, ReceiptHash, TokenId};

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// Call to an external collaborator, made after the state commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    WithdrawCollateral(LiquidationRequest),
    Delegate {
        borrower: Address,
        token: Address,
        token_id: TokenId,
    },
    Revoke {
        borrower: Address,
        token: Address,
        token_id: TokenId,
    },
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Everything an operation may mutate. Cloned as the rollback snapshot.
#[derive(Debug, Clone, Default)]
pub struct PoolState {
    ledger: Ledger,
    deposits: BTreeMap<(Address, Tick), Deposit>,
    redemptions: BTreeMap<(Address, Tick, u64), Redemption>,
    redemption_sequence: u64,
    loans: HashMap<ReceiptHash, LoanStatus>,
    custody: HashSet<(Address, TokenId)>,
    /// Currency held by the pool.
    cash: Amount,
    /// Cash of fulfilled redemption batches not yet withdrawn.
    unclaimed: Amount,
    admin_fee_balance: Amount,
    events: Vec<PoolEvent>,
    effects: Vec<Effect>,
}

impl PoolState {
    fn apply(&mut self, settlement: Settlement) {
        self.unclaimed += settlement.fulfilled;
        self.admin_fee_balance += settlement.swept;
    }

    fn emit(&mut self, event: PoolEvent) {
        self.events.push(event);
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn redemptions(&self) -> impl Iterator<Item = (&(Address, Tick, u64), &Redemption)> {
        self.redemptions.iter()
    }

    pub fn cash(&self) -> Amount {
        self.cash
    }

    pub fn unclaimed(&self) -> Amount {
        self.unclaimed
    }

    pub fn admin_fee_balance(&self) -> Amount {
        self.admin_fee_balance
    }
}

// ---------------------------------------------------------------------------
// Batched operations
// ---------------------------------------------------------------------------

/// One call of a [`Pool::multicall`] batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Operation {
    Deposit {
        tick: Tick,
        amount: Amount,
        min_shares: Amount,
    },
    Redeem {
        tick: Tick,
        shares: Amount,
    },
    Withdraw {
        tick: Tick,
        redemption_id: u64,
    },
    Rebalance {
        src_tick: Tick,
        dst_tick: Tick,
        redemption_id: u64,
        min_shares: Amount,
        max_dst_limit: Amount,
    },
    Borrow {
        principal: Amount,
        duration: u64,
        collateral_token: Address,
        collateral_token_id: TokenId,
        max_repayment: Amount,
        ticks: Vec<Tick>,
        collateral_wrapper_context: Vec<u8>,
    },
    Repay {
        encoded_receipt: Vec<u8>,
    },
    Refinance {
        encoded_receipt: Vec<u8>,
        principal: Amount,
        duration: u64,
        max_repayment: Amount,
        ticks: Vec<Tick>,
    },
    Liquidate {
        encoded_receipt: Vec<u8>,
    },
}

/// Result of one [`Operation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Deposited { shares: Amount },
    Redeemed { redemption_id: u64 },
    Withdrawn { shares: Amount, amount: Amount },
    Rebalanced { amount: Amount, shares: Amount },
    Borrowed(LoanOrigination),
    Repaid { amount: Amount },
    Liquidated,
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

pub struct Pool {
    config: PoolConfig,
    state: PoolState,
    liquidator: Box<dyn CollateralLiquidator>,
    delegation: Option<Box<dyn DelegationRegistry>>,
}

impl Pool {
    /// Pool with a recording liquidator and no delegation registry.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        Self::with_collaborators(config, Box::new(RecordingLiquidator::default()), None)
    }

    pub fn with_collaborators(
        config: PoolConfig,
        liquidator: Box<dyn CollateralLiquidator>,
        delegation: Option<Box<dyn DelegationRegistry>>,
    ) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self {
            config,
            state: PoolState::default(),
            liquidator,
            delegation,
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn state(&self) -> &PoolState {
        &self.state
    }

    /// Run `op` against a snapshot, dispatch its effects, and keep the
    /// result only if both succeed.
    ///
    /// The event log stays out of the snapshot: events emitted by a failed
    /// operation are dropped, earlier ones are kept.
    fn transact<T>(
        &mut self,
        op: impl FnOnce(&mut PoolState, &PoolConfig) -> Result<T, PoolError>,
    ) -> Result<T, PoolError> {
        let mut events = std::mem::take(&mut self.state.events);
        let snapshot = self.state.clone();

        let result = op(&mut self.state, &self.config).and_then(|value| {
            let effects = std::mem::take(&mut self.state.effects);
            self.dispatch(effects)
                .map(|()| value)
                .map_err(|e| {
                    log::debug!("pool: collaborator failed, reverting: {e}");
                    PoolError::from(e)
                })
        });

        match result {
            Ok(value) => {
                events.append(&mut self.state.events);
                self.state.events = events;
                Ok(value)
            }
            Err(e) => {
                log::debug!("pool: operation reverted: {e}");
                self.state = snapshot;
                self.state.events = events;
                Err(e)
            }
        }
    }

    /// Liquidator requests go out first; delegation updates follow only once
    /// every request has been accepted.
    fn dispatch(&mut self, effects: Vec<Effect>) -> Result<(), CollaboratorError> {
        let (requests, delegations): (Vec<Effect>, Vec<Effect>) = effects
            .into_iter()
            .partition(|e| matches!(e, Effect::WithdrawCollateral(_)));

        for effect in &requests {
            if let Effect::WithdrawCollateral(request) = effect {
                self.liquidator.withdraw_collateral(request)?;
            }
        }

        let Some(registry) = self.delegation.as_mut() else {
            return Ok(());
        };
        for effect in delegations {
            match effect {
                Effect::Delegate {
                    borrower,
                    token,
                    token_id,
                } => {
                    if let Err(e) = registry.delegate(borrower, token, token_id) {
                        log::warn!("pool: delegation to {borrower} ignored: {e}");
                    }
                }
                Effect::Revoke {
                    borrower,
                    token,
                    token_id,
                } => {
                    if let Err(e) = registry.revoke(borrower, token, token_id) {
                        log::warn!("pool: revoking {borrower} ignored: {e}");
                    }
                }
                Effect::WithdrawCollateral(_) => {}
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Depositor operations
    // -----------------------------------------------------------------------

    pub fn deposit(
        &mut self,
        ctx: &Context,
        tick: Tick,
        amount: Amount,
        min_shares: Amount,
    ) -> Result<Amount, PoolError> {
        self.transact(|state, config| state.deposit(config, ctx, tick, amount, min_shares))
    }

    pub fn redeem(&mut self, ctx: &Context, tick: Tick, shares: Amount) -> Result<u64, PoolError> {
        self.transact(|state, _| state.redeem(ctx, tick, shares))
    }

    /// Returns `(shares, amount)` realized.
    pub fn withdraw(
        &mut self,
        ctx: &Context,
        tick: Tick,
        redemption_id: u64,
    ) -> Result<(Amount, Amount), PoolError> {
        self.transact(|state, _| state.withdraw(ctx, tick, redemption_id))
    }

    /// Returns `(amount moved, shares minted at dst_tick)`.
    pub fn rebalance(
        &mut self,
        ctx: &Context,
        src_tick: Tick,
        dst_tick: Tick,
        redemption_id: u64,
        min_shares: Amount,
        max_dst_limit: Amount,
    ) -> Result<(Amount, Amount), PoolError> {
        self.transact(|state, config| {
            state.rebalance(
                config,
                ctx,
                src_tick,
                dst_tick,
                redemption_id,
                min_shares,
                max_dst_limit,
            )
        })
    }

    // -----------------------------------------------------------------------
    // Borrower operations
    // -----------------------------------------------------------------------

    /// Price a loan without changing any state. The collateral wrapper
    /// context does not affect pricing.
    pub fn quote(
        &self,
        principal: Amount,
        duration: u64,
        collateral_token: Address,
        collateral_token_id: TokenId,
        ticks: &[Tick],
    ) -> Result<LoanQuote, PoolError> {
        self.state.quote(
            &self.config,
            principal,
            duration,
            collateral_token,
            collateral_token_id,
            ticks,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn borrow(
        &mut self,
        ctx: &Context,
        principal: Amount,
        duration: u64,
        collateral_token: Address,
        collateral_token_id: TokenId,
        max_repayment: Amount,
        ticks: &[Tick],
        collateral_wrapper_context: &[u8],
    ) -> Result<LoanOrigination, PoolError> {
        self.transact(|state, config| {
            state.borrow(
                config,
                ctx,
                principal,
                duration,
                collateral_token,
                collateral_token_id,
                max_repayment,
                ticks,
                collateral_wrapper_context,
                true,
            )
        })
    }

    /// Returns the amount pulled from the borrower.
    pub fn repay(&mut self, ctx: &Context, encoded_receipt: &[u8]) -> Result<Amount, PoolError> {
        self.transact(|state, _| state.repay(ctx, encoded_receipt))
    }

    pub fn refinance(
        &mut self,
        ctx: &Context,
        encoded_receipt: &[u8],
        principal: Amount,
        duration: u64,
        max_repayment: Amount,
        ticks: &[Tick],
    ) -> Result<LoanOrigination, PoolError> {
        self.transact(|state, config| {
            state.refinance(
                config,
                ctx,
                encoded_receipt,
                principal,
                duration,
                max_repayment,
                ticks,
            )
        })
    }

    pub fn liquidate(&mut self, ctx: &Context, encoded_receipt: &[u8]) -> Result<(), PoolError> {
        self.transact(|state, config| state.liquidate(config, ctx, encoded_receipt))
    }

    /// Inbound call from the liquidator with the proceeds of a sale.
    /// Returns the surplus paid to the borrower.
    pub fn on_collateral_liquidated(
        &mut self,
        ctx: &Context,
        encoded_receipt: &[u8],
        proceeds: Amount,
    ) -> Result<Amount, PoolError> {
        self.transact(|state, config| {
            state.on_collateral_liquidated(config, ctx, encoded_receipt, proceeds)
        })
    }

    /// Apply `operations` in order as one unit: all commit or none do.
    pub fn multicall(
        &mut self,
        ctx: &Context,
        operations: Vec<Operation>,
    ) -> Result<Vec<OperationOutcome>, PoolError> {
        self.transact(|state, config| {
            operations
                .into_iter()
                .map(|op| state.execute(config, ctx, op))
                .collect()
        })
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    pub fn set_admin_fee_rate(&mut self, ctx: &Context, rate: Decimal) -> Result<(), PoolError> {
        if ctx.caller != self.config.admin {
            return Err(PoolError::InvalidCaller);
        }
        if rate.is_sign_negative() || rate >= Decimal::ONE {
            return Err(PoolError::InvalidParameters);
        }
        self.config.admin_fee_rate = rate;
        self.state.emit(PoolEvent::AdminFeeRateUpdated { rate });
        log::info!("pool: admin fee rate set to {rate}");
        Ok(())
    }

    pub fn withdraw_admin_fees(
        &mut self,
        ctx: &Context,
        recipient: Address,
        amount: Amount,
    ) -> Result<(), PoolError> {
        let admin = self.config.admin;
        self.transact(|state, _| {
            if ctx.caller != admin {
                return Err(PoolError::InvalidCaller);
            }
            if recipient.is_zero() || amount > state.admin_fee_balance {
                return Err(PoolError::InvalidParameters);
            }
            state.admin_fee_balance -= amount;
            state.cash -= amount;
            state.emit(PoolEvent::AdminFeesWithdrawn { recipient, amount });
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    pub fn node(&self, tick: Tick) -> Option<&Node> {
        self.state.ledger.node(tick)
    }

    /// Nodes within `range` in ascending tick order.
    pub fn liquidity_nodes<R: RangeBounds<Tick>>(
        &self,
        range: R,
    ) -> impl Iterator<Item = (&Tick, &Node)> {
        self.state.ledger.nodes(range)
    }

    pub fn deposit_info(&self, account: Address, tick: Tick) -> Option<&Deposit> {
        self.state.deposits.get(&(account, tick))
    }

    pub fn redemption(&self, account: Address, tick: Tick, redemption_id: u64) -> Option<&Redemption> {
        self.state.redemptions.get(&(account, tick, redemption_id))
    }

    pub fn redemption_available(
        &self,
        account: Address,
        tick: Tick,
        redemption_id: u64,
    ) -> Result<RedemptionAvailability, PoolError> {
        self.state.redemption_available(account, tick, redemption_id)
    }

    /// Current share price of `tick`; 1.0 when the tick holds no shares.
    pub fn deposit_share_price(&self, tick: Tick) -> Amount {
        self.state
            .ledger
            .node(tick)
            .map_or(Amount::ONE, Node::share_price)
    }

    pub fn loan_status(&self, hash: &ReceiptHash) -> Option<LoanStatus> {
        self.state.loans.get(hash).copied()
    }

    pub fn admin_fee_rate(&self) -> Decimal {
        self.config.admin_fee_rate
    }

    pub fn admin_fee_balance(&self) -> Amount {
        self.state.admin_fee_balance
    }

    pub fn cash(&self) -> Amount {
        self.state.cash
    }

    pub fn events(&self) -> &[PoolEvent] {
        &self.state.events
    }

    pub fn drain_events(&mut self) -> Vec<PoolEvent> {
        std::mem::take(&mut self.state.events)
    }
}

impl PoolState {
    fn execute(
        &mut self,
        config: &PoolConfig,
        ctx: &Context,
        op: Operation,
    ) -> Result<OperationOutcome, PoolError> {
        match op {
            Operation::Deposit {
                tick,
                amount,
                min_shares,
            } => self
                .deposit(config, ctx, tick, amount, min_shares)
                .map(|shares| OperationOutcome::Deposited { shares }),
            Operation::Redeem { tick, shares } => self
                .redeem(ctx, tick, shares)
                .map(|redemption_id| OperationOutcome::Redeemed { redemption_id }),
            Operation::Withdraw {
                tick,
                redemption_id,
            } => self
                .withdraw(ctx, tick, redemption_id)
                .map(|(shares, amount)| OperationOutcome::Withdrawn { shares, amount }),
            Operation::Rebalance {
                src_tick,
                dst_tick,
                redemption_id,
                min_shares,
                max_dst_limit,
            } => self
                .rebalance(
                    config,
                    ctx,
                    src_tick,
                    dst_tick,
                    redemption_id,
                    min_shares,
                    max_dst_limit,
                )
                .map(|(amount, shares)| OperationOutcome::Rebalanced { amount, shares }),
            Operation::Borrow {
                principal,
                duration,
                collateral_token,
                collateral_token_id,
                max_repayment,
                ticks,
                collateral_wrapper_context,
            } => self
                .borrow(
                    config,
                    ctx,
                    principal,
                    duration,
                    collateral_token,
                    collateral_token_id,
                    max_repayment,
                    &ticks,
                    &collateral_wrapper_context,
                    true,
                )
                .map(OperationOutcome::Borrowed),
            Operation::Repay { encoded_receipt } => self
                .repay(ctx, &encoded_receipt)
                .map(|amount| OperationOutcome::Repaid { amount }),
            Operation::Refinance {
                encoded_receipt,
                principal,
                duration,
                max_repayment,
                ticks,
            } => self
                .refinance(
                    config,
                    ctx,
                    &encoded_receipt,
                    principal,
                    duration,
                    max_repayment,
                    &ticks,
                )
                .map(OperationOutcome::Borrowed),
            Operation::Liquidate { encoded_receipt } => self
                .liquidate(config, ctx, &encoded_receipt)
                .map(|()| OperationOutcome::Liquidated),
        }
    }
}
