// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! FIFO redemption queue of a tick.
//!
//! Queued shares are fulfilled in batches whenever cash becomes available.
//! A depositor's redemption remembers the batch index current when it was
//! queued and the shares queued ahead of it (`target`); walking the batches
//! from that index first pays off `target`, then credits the redemption.

use serde::{Deserialize, Serialize};

use super::{Ledger, Node};
use crate::tick::Tick;
use crate::types::Amount;

/// One fulfilled batch: `shares` left the node for `amount` of cash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfilledRedemption {
    pub shares: Amount,
    pub amount: Amount,
}

/// Result of walking fulfilled batches on behalf of one redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionProgress {
    /// Shares of the redemption that are fulfilled.
    pub shares: Amount,
    /// Cash those shares realized.
    pub amount: Amount,
    /// Next batch index to examine.
    pub index: u64,
    /// Shares queued ahead that are still unfulfilled.
    pub target: Amount,
}

impl Ledger {
    /// Number of batches recorded at `tick`; the index the next batch gets.
    pub fn redemption_index(&self, tick: Tick) -> u64 {
        self.fulfilled.get(&tick).map_or(0, |b| b.len() as u64)
    }

    pub fn fulfilled_batches(&self, tick: Tick) -> &[FulfilledRedemption] {
        self.fulfilled.get(&tick).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Queue `shares` for redemption. Returns the `(index, target)` the
    /// depositor's redemption record must carry.
    pub fn enqueue_redemption(&mut self, tick: Tick, shares: Amount) -> Option<(u64, Amount)> {
        let index = self.redemption_index(tick);
        let node = self.nodes.get_mut(&tick)?;
        let target = node.redemptions;
        node.redemptions += shares;
        Some((index, target))
    }

    /// Fulfil as much of the queue as available cash allows, recording one
    /// batch. Returns the batch, if any shares were fulfilled.
    pub(super) fn process_redemptions(&mut self, tick: Tick) -> Option<FulfilledRedemption> {
        let node = self.nodes.get_mut(&tick)?;
        if node.redemptions.is_zero() {
            return None;
        }

        // No value, or nothing on hand and nothing coming: shares redeem for zero.
        let worthless = node.value.is_zero() || (node.available + node.pending).is_zero();
        let batch = if worthless {
            FulfilledRedemption {
                shares: node.redemptions,
                amount: Amount::ZERO,
            }
        } else {
            fulfillable(node)
        };
        if batch.shares.is_zero() {
            return None;
        }

        node.value = node.value.saturating_sub(batch.amount);
        node.available -= batch.amount;
        node.shares -= batch.shares;
        node.redemptions -= batch.shares;
        if worthless {
            node.value = node.available;
        }

        log::debug!(
            "ledger: fulfilled {} shares for {} at tick {tick}",
            batch.shares,
            batch.amount
        );
        self.fulfilled.entry(tick).or_default().push(batch);
        Some(batch)
    }

    /// Walk the batches fulfilled since `index` for a redemption of
    /// `pending` shares with `target` shares queued ahead of it.
    pub fn redemption_progress(
        &self,
        tick: Tick,
        pending: Amount,
        index: u64,
        target: Amount,
    ) -> RedemptionProgress {
        let batches = self.fulfilled_batches(tick);
        let mut progress = RedemptionProgress {
            shares: Amount::ZERO,
            amount: Amount::ZERO,
            index,
            target,
        };

        while progress.shares < pending {
            let Some(batch) = batches.get(progress.index as usize) else {
                break;
            };

            if progress.target >= batch.shares {
                progress.target -= batch.shares;
                progress.index += 1;
                continue;
            }

            let remaining = batch.shares - progress.target;
            let take = remaining.min(pending - progress.shares);
            progress.shares += take;
            progress.amount += take.mul_div_down(batch.amount, batch.shares);
            progress.target = Amount::ZERO;

            if take == remaining {
                progress.index += 1;
            } else {
                // Satisfied part way through this batch.
                break;
            }
        }

        progress
    }
}

/// Shares and cash the queue can take from `node` right now.
fn fulfillable(node: &Node) -> FulfilledRedemption {
    let affordable = node.available.mul_div_down(node.shares, node.value);
    let shares = node.redemptions.min(affordable);
    let amount = if shares == node.shares {
        // Last shares out take everything.
        node.value.min(node.available)
    } else {
        node.amount_for_shares(shares).min(node.available)
    };
    FulfilledRedemption { shares, amount }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn setup(amount: u64) -> (Ledger, Tick) {
        let mut ledger = Ledger::new();
        let tick = Tick::encode(Amount::from_units(100), 0, 0).expect("test: valid");
        let terms = tick.decode().expect("test: decodes");
        ledger.insert(tick, &terms, dec!(0.1)).expect("test: insert");
        ledger.add(tick, Amount::from_units(amount), Amount::from_units(amount));
        (ledger, tick)
    }

    #[test]
    fn immediate_fulfillment_when_cash_available() {
        let (mut ledger, tick) = setup(10);
        let (index, target) = ledger
            .enqueue_redemption(tick, Amount::from_units(4))
            .expect("test: node exists");
        assert_eq!((index, target), (0, Amount::ZERO));

        let settlement = ledger.settle(tick);
        assert_eq!(settlement.fulfilled, Amount::from_units(4));

        let node = ledger.node(tick).expect("test: node remains");
        assert_eq!(node.shares, Amount::from_units(6));
        assert_eq!(node.value, Amount::from_units(6));
        assert_eq!(node.redemptions, Amount::ZERO);

        let progress = ledger.redemption_progress(tick, Amount::from_units(4), index, target);
        assert_eq!(progress.shares, Amount::from_units(4));
        assert_eq!(progress.amount, Amount::from_units(4));
        assert_eq!(progress.index, 1);
    }

    #[test]
    fn queue_waits_for_cash_in_order() {
        let (mut ledger, tick) = setup(10);
        ledger.use_liquidity(tick, Amount::from_units(10), Amount::from_units(11));

        let (i1, t1) = ledger
            .enqueue_redemption(tick, Amount::from_units(5))
            .expect("test: node exists");
        ledger.settle(tick);
        let (i2, t2) = ledger
            .enqueue_redemption(tick, Amount::from_units(5))
            .expect("test: node exists");
        ledger.settle(tick);
        assert_eq!((i1, t1), (0, Amount::ZERO));
        assert_eq!((i2, t2), (0, Amount::from_units(5)));

        let second = ledger.redemption_progress(tick, Amount::from_units(5), i2, t2);
        assert_eq!(second.shares, Amount::ZERO);
        assert_eq!(second.target, Amount::from_units(5));

        // 3 units of cash come back: the first redemption is partly served.
        ledger.restore(tick, Amount::from_units(3), Amount::ZERO, Amount::from_units(3));
        let first = ledger.redemption_progress(tick, Amount::from_units(5), i1, t1);
        assert_eq!(first.shares, Amount::from_units(3));
        let second = ledger.redemption_progress(tick, Amount::from_units(5), i2, t2);
        assert_eq!(second.shares, Amount::ZERO);
        assert_eq!(second.target, Amount::from_units(2));
    }

    #[test]
    fn zero_value_node_redeems_for_nothing() {
        let (mut ledger, tick) = setup(10);
        ledger.use_liquidity(tick, Amount::from_units(10), Amount::from_units(10));
        // Total loss on the loan.
        ledger.restore(tick, Amount::from_units(10), Amount::from_units(10), Amount::ZERO);

        ledger
            .enqueue_redemption(tick, Amount::from_units(10))
            .expect("test: node exists");
        let settlement = ledger.settle(tick);
        assert_eq!(settlement.fulfilled, Amount::ZERO);
        assert!(!ledger.contains(tick), "drained node is collected");
        assert_eq!(
            ledger.fulfilled_batches(tick),
            &[FulfilledRedemption {
                shares: Amount::from_units(10),
                amount: Amount::ZERO
            }]
        );
    }

    #[test]
    fn last_redeemer_takes_all_value() {
        let (mut ledger, tick) = setup(3);
        // Interest makes the price non-terminating: 3 shares worth 4.
        ledger.use_liquidity(tick, Amount::from_units(3), Amount::from_units(4));
        ledger.restore(tick, Amount::from_units(3), Amount::from_units(4), Amount::from_units(4));

        ledger
            .enqueue_redemption(tick, Amount::ONE)
            .expect("test: node exists");
        ledger.settle(tick);
        ledger
            .enqueue_redemption(tick, Amount::from_units(2))
            .expect("test: node exists");
        let settlement = ledger.settle(tick);

        let batches = ledger.fulfilled_batches(tick);
        let total: Amount = batches.iter().map(|b| b.amount).sum();
        assert_eq!(total, Amount::from_units(4));
        assert_eq!(settlement.swept, Amount::ZERO);
        assert!(!ledger.contains(tick));
    }
}
