// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Depositor side of the pool: deposits, redemptions, withdrawals and
//! rebalancing between ticks.

use serde::{Deserialize, Serialize};

use super::PoolState;
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::events::PoolEvent;
use crate::tick::{Tick, TickError};
use crate::types::{Address, Amount, Context};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// An account's position at one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    /// Live shares, excluding any queued for redemption.
    pub shares: Amount,
    /// Id the next redemption at this tick will get.
    pub redemption_id: u64,
}

/// A queued redemption. Deleted once `pending` reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    /// Shares not yet withdrawn.
    pub pending: Amount,
    /// First fulfilled batch that may still contain these shares.
    pub index: u64,
    /// Shares queued ahead of this redemption from `index` on.
    pub target: Amount,
    /// Pool-wide order in which redemptions were queued.
    pub sequence: u64,
}

/// What a withdraw would realize right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionAvailability {
    pub shares: Amount,
    pub amount: Amount,
    /// Shares of earlier redemptions at the tick not yet withdrawn.
    pub shares_ahead: Amount,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl PoolState {
    pub(super) fn deposit(
        &mut self,
        config: &PoolConfig,
        ctx: &Context,
        tick: Tick,
        amount: Amount,
        min_shares: Amount,
    ) -> Result<Amount, PoolError> {
        if amount.is_zero() || !amount.is_representable() {
            return Err(PoolError::InvalidParameters);
        }
        let terms = tick.validate(config)?;
        let node = self
            .ledger
            .insert(tick, &terms, config.tick_limit_spacing)?;
        if !node.is_active(config.impaired_price_threshold) {
            return Err(PoolError::InactiveLiquidity);
        }

        let shares = node.shares_for_deposit(amount);
        if shares.is_zero() || shares < min_shares {
            return Err(PoolError::InsufficientShares);
        }
        if !(node.value + amount).is_representable() || !(node.shares + shares).is_representable() {
            return Err(PoolError::InvalidParameters);
        }

        let settlement = self.ledger.add(tick, amount, shares);
        self.apply(settlement);
        self.cash += amount;
        self.deposits.entry((ctx.caller, tick)).or_default().shares += shares;

        log::debug!("pool: {} deposited {amount} at {tick} for {shares} shares", ctx.caller);
        self.emit(PoolEvent::Deposited {
            account: ctx.caller,
            tick,
            amount,
            shares,
        });
        Ok(shares)
    }

    /// Queue `shares` for redemption. Returns the redemption id.
    pub(super) fn redeem(
        &mut self,
        ctx: &Context,
        tick: Tick,
        shares: Amount,
    ) -> Result<u64, PoolError> {
        let deposit = self
            .deposits
            .get_mut(&(ctx.caller, tick))
            .filter(|d| !shares.is_zero() && shares <= d.shares)
            .ok_or(PoolError::InsufficientShares)?;

        let (index, target) = self
            .ledger
            .enqueue_redemption(tick, shares)
            .ok_or(PoolError::InsufficientShares)?;

        deposit.shares -= shares;
        let redemption_id = deposit.redemption_id;
        deposit.redemption_id += 1;

        let sequence = self.redemption_sequence;
        self.redemption_sequence += 1;
        self.redemptions.insert(
            (ctx.caller, tick, redemption_id),
            Redemption {
                pending: shares,
                index,
                target,
                sequence,
            },
        );

        let settlement = self.ledger.settle(tick);
        self.apply(settlement);

        log::debug!(
            "pool: {} queued {shares} shares at {tick} as redemption {redemption_id}",
            ctx.caller
        );
        self.emit(PoolEvent::Redeemed {
            account: ctx.caller,
            tick,
            redemption_id,
            shares,
        });
        Ok(redemption_id)
    }

    pub(super) fn redemption_available(
        &self,
        account: Address,
        tick: Tick,
        redemption_id: u64,
    ) -> Result<RedemptionAvailability, PoolError> {
        let redemption = self
            .redemptions
            .get(&(account, tick, redemption_id))
            .ok_or(PoolError::InvalidRedemptionStatus)?;
        let progress = self.ledger.redemption_progress(
            tick,
            redemption.pending,
            redemption.index,
            redemption.target,
        );
        let shares_ahead = self
            .redemptions
            .iter()
            .filter(|((_, t, _), r)| *t == tick && r.sequence < redemption.sequence)
            .map(|(_, r)| r.pending)
            .sum();
        Ok(RedemptionAvailability {
            shares: progress.shares,
            amount: progress.amount,
            shares_ahead,
        })
    }

    /// Realize the fulfilled part of a redemption. Returns `(shares, amount)`.
    pub(super) fn withdraw(
        &mut self,
        ctx: &Context,
        tick: Tick,
        redemption_id: u64,
    ) -> Result<(Amount, Amount), PoolError> {
        let key = (ctx.caller, tick, redemption_id);
        let redemption = self
            .redemptions
            .get(&key)
            .copied()
            .ok_or(PoolError::InvalidRedemptionStatus)?;
        let progress = self.ledger.redemption_progress(
            tick,
            redemption.pending,
            redemption.index,
            redemption.target,
        );

        let pending = redemption.pending - progress.shares;
        if pending.is_zero() {
            self.redemptions.remove(&key);
        } else {
            self.redemptions.insert(
                key,
                Redemption {
                    pending,
                    index: progress.index,
                    target: progress.target,
                    sequence: redemption.sequence,
                },
            );
        }

        self.unclaimed -= progress.amount;
        self.cash -= progress.amount;

        log::debug!(
            "pool: {} withdrew {} for {} shares from {tick}",
            ctx.caller,
            progress.amount,
            progress.shares
        );
        self.emit(PoolEvent::Withdrawn {
            account: ctx.caller,
            tick,
            redemption_id,
            shares: progress.shares,
            amount: progress.amount,
        });
        Ok((progress.shares, progress.amount))
    }

    /// Withdraw a fulfilled redemption at `src_tick` straight into a deposit
    /// at `dst_tick`. Returns `(amount, shares minted)`.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn rebalance(
        &mut self,
        config: &PoolConfig,
        ctx: &Context,
        src_tick: Tick,
        dst_tick: Tick,
        redemption_id: u64,
        min_shares: Amount,
        max_dst_limit: Amount,
    ) -> Result<(Amount, Amount), PoolError> {
        let dst_terms = dst_tick.validate(config)?;
        if dst_terms.limit > max_dst_limit {
            return Err(TickError::InvalidLimit.into());
        }

        let (_, amount) = self.withdraw(ctx, src_tick, redemption_id)?;
        if amount.is_zero() {
            return Err(PoolError::InvalidRedemptionStatus);
        }
        let shares = self.deposit(config, ctx, dst_tick, amount, min_shares)?;
        Ok((amount, shares))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn alice() -> Context {
        Context::new(Address::from_low_u64(1), 1_000)
    }

    fn tick(limit: u64) -> Tick {
        Tick::encode(Amount::from_units(limit), 0, 0).expect("test: valid tick")
    }

    #[test]
    fn first_deposit_mints_one_to_one() {
        let config = PoolConfig::default();
        let mut state = PoolState::default();
        let shares = state
            .deposit(&config, &alice(), tick(10), Amount::from_units(5), Amount::ZERO)
            .expect("test: deposit");
        assert_eq!(shares, Amount::from_units(5));
        assert_eq!(state.cash, Amount::from_units(5));
        assert_eq!(
            state.deposits[&(alice().caller, tick(10))].shares,
            Amount::from_units(5)
        );
    }

    #[test]
    fn deposit_below_min_shares_fails() {
        let config = PoolConfig::default();
        let mut state = PoolState::default();
        let err = state.deposit(
            &config,
            &alice(),
            tick(10),
            Amount::from_units(5),
            Amount::from_units(6),
        );
        assert!(matches!(err, Err(PoolError::InsufficientShares)));
    }

    #[test]
    fn redeem_more_than_owned_fails() {
        let config = PoolConfig::default();
        let mut state = PoolState::default();
        state
            .deposit(&config, &alice(), tick(10), Amount::from_units(5), Amount::ZERO)
            .expect("test: deposit");
        let err = state.redeem(&alice(), tick(10), Amount::from_units(6));
        assert!(matches!(err, Err(PoolError::InsufficientShares)));
        let err = state.redeem(&alice(), tick(10), Amount::ZERO);
        assert!(matches!(err, Err(PoolError::InsufficientShares)));
    }

    #[test]
    fn redeem_then_withdraw_with_idle_cash() {
        let config = PoolConfig::default();
        let mut state = PoolState::default();
        state
            .deposit(&config, &alice(), tick(10), Amount::from_units(5), Amount::ZERO)
            .expect("test: deposit");
        let id = state
            .redeem(&alice(), tick(10), Amount::from_units(2))
            .expect("test: redeem");
        assert_eq!(state.unclaimed, Amount::from_units(2));

        let available = state
            .redemption_available(alice().caller, tick(10), id)
            .expect("test: available");
        assert_eq!(available.amount, Amount::from_units(2));
        assert_eq!(available.shares_ahead, Amount::ZERO);

        let (shares, amount) = state.withdraw(&alice(), tick(10), id).expect("test: withdraw");
        assert_eq!((shares, amount), (Amount::from_units(2), Amount::from_units(2)));
        assert_eq!(state.unclaimed, Amount::ZERO);
        assert_eq!(state.cash, Amount::from_units(3));
        assert!(state.redemptions.is_empty());

        let err = state.withdraw(&alice(), tick(10), id);
        assert!(matches!(err, Err(PoolError::InvalidRedemptionStatus)));
    }

    #[test]
    fn shares_ahead_counts_earlier_redemptions_until_withdrawn() {
        let config = PoolConfig::default();
        let mut state = PoolState::default();
        let bob = Context::new(Address::from_low_u64(2), 1_000);
        state
            .deposit(&config, &alice(), tick(10), Amount::from_units(5), Amount::ZERO)
            .expect("test: deposit");
        state
            .deposit(&config, &bob, tick(10), Amount::from_units(5), Amount::ZERO)
            .expect("test: deposit");

        let first = state
            .redeem(&alice(), tick(10), Amount::from_units(3))
            .expect("test: redeem");
        let second = state
            .redeem(&bob, tick(10), Amount::from_units(2))
            .expect("test: redeem");

        // Both are fulfilled from idle cash, yet Alice's shares still stand ahead.
        let view = state
            .redemption_available(bob.caller, tick(10), second)
            .expect("test: available");
        assert_eq!(view.shares, Amount::from_units(2));
        assert_eq!(view.shares_ahead, Amount::from_units(3));
        let view = state
            .redemption_available(alice().caller, tick(10), first)
            .expect("test: available");
        assert_eq!(view.shares_ahead, Amount::ZERO);

        state.withdraw(&alice(), tick(10), first).expect("test: withdraw");
        let view = state
            .redemption_available(bob.caller, tick(10), second)
            .expect("test: available");
        assert_eq!(view.shares_ahead, Amount::ZERO);
        assert_eq!(view.shares, Amount::from_units(2));
    }

    #[test]
    fn full_redemption_collects_node_and_redeposit_starts_fresh() {
        let config = PoolConfig::default();
        let mut state = PoolState::default();
        state
            .deposit(&config, &alice(), tick(10), Amount::from_units(5), Amount::ZERO)
            .expect("test: deposit");
        let id = state
            .redeem(&alice(), tick(10), Amount::from_units(5))
            .expect("test: redeem");
        assert!(!state.ledger.contains(tick(10)));

        state.withdraw(&alice(), tick(10), id).expect("test: withdraw");
        let shares = state
            .deposit(&config, &alice(), tick(10), Amount(dec!(1.5)), Amount::ZERO)
            .expect("test: deposit again");
        assert_eq!(shares, Amount(dec!(1.5)));
        let deposit = state.deposits[&(alice().caller, tick(10))];
        assert_eq!(deposit.redemption_id, 1);
    }

    #[test]
    fn rebalance_moves_cash_between_ticks() {
        let config = PoolConfig::default();
        let mut state = PoolState::default();
        state
            .deposit(&config, &alice(), tick(10), Amount::from_units(5), Amount::ZERO)
            .expect("test: deposit");
        let id = state
            .redeem(&alice(), tick(10), Amount::from_units(5))
            .expect("test: redeem");

        let (amount, shares) = state
            .rebalance(
                &config,
                &alice(),
                tick(10),
                tick(20),
                id,
                Amount::ZERO,
                Amount::from_units(100),
            )
            .expect("test: rebalance");
        assert_eq!((amount, shares), (Amount::from_units(5), Amount::from_units(5)));
        assert_eq!(state.cash, Amount::from_units(5));
        assert_eq!(state.unclaimed, Amount::ZERO);
    }

    #[test]
    fn rebalance_above_max_limit_fails() {
        let config = PoolConfig::default();
        let mut state = PoolState::default();
        let err = state.rebalance(
            &config,
            &alice(),
            tick(10),
            tick(20),
            0,
            Amount::ZERO,
            Amount::from_units(15),
        );
        assert!(matches!(
            err,
            Err(PoolError::InvalidTick(TickError::InvalidLimit))
        ));
        assert!(state.ledger().is_empty());
    }
}
