// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Tick ledger.
//!
//! An ordered map from [`Tick`] to [`Node`]. Map order replaces the
//! prev/next links of a linked list: neighbours are found with range
//! queries, and removing a node cannot leave dangling links.
//!
//! Fulfilled redemption batches are kept per tick outside the node so
//! that they outlive garbage collection: a depositor whose redemption was
//! fulfilled can still withdraw after the node itself is gone.

mod redemption;
mod source;

pub use redemption::{FulfilledRedemption, RedemptionProgress};
pub use source::NodeSource;

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use std::ops::RangeBounds;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::PoolError;
use crate::tick::{Tick, TickTerms};
use crate::types::Amount;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Aggregate state of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Economic value: cash on hand plus principal out on loan.
    pub value: Amount,
    /// Shares outstanding, including shares queued for redemption.
    pub shares: Amount,
    /// Cash not currently lent out.
    pub available: Amount,
    /// Principal plus interest expected back from active loans.
    pub pending: Amount,
    /// Shares queued for redemption and not yet fulfilled.
    pub redemptions: Amount,
}

/// Classification of a node for new deposits and loan sourcing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeHealth {
    Active,
    /// Share price fell below the impairment threshold.
    Impaired,
    /// Outstanding shares with no cash on hand and none expected.
    Insolvent,
}

impl Node {
    pub fn health(&self, impaired_threshold: Decimal) -> NodeHealth {
        if self.shares.is_zero() {
            return NodeHealth::Active;
        }
        if (self.available + self.pending).is_zero() {
            return NodeHealth::Insolvent;
        }
        if self.value.is_zero() || self.value.0 < self.shares.0 * impaired_threshold {
            return NodeHealth::Impaired;
        }
        NodeHealth::Active
    }

    pub fn is_active(&self, impaired_threshold: Decimal) -> bool {
        self.health(impaired_threshold) == NodeHealth::Active
    }

    /// Shares minted for depositing `amount` at the current share price.
    pub fn shares_for_deposit(&self, amount: Amount) -> Amount {
        if self.shares.is_zero() {
            amount
        } else {
            amount.mul_div_down(self.shares, self.value)
        }
    }

    /// Cash value of `shares` at the current share price, rounded down.
    pub fn amount_for_shares(&self, shares: Amount) -> Amount {
        shares.mul_div_down(self.value, self.shares)
    }

    /// Share price, 1.0 for an empty node.
    pub fn share_price(&self) -> Amount {
        if self.shares.is_zero() {
            Amount::ONE
        } else {
            Amount::ONE.mul_div_down(self.value, self.shares)
        }
    }

    fn is_collectible(&self) -> bool {
        self.shares.is_zero() && self.pending.is_zero()
    }
}

/// Cash effects of settling a tick after its available cash changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settlement {
    /// Cash moved from the node into fulfilled redemption batches.
    pub fulfilled: Amount,
    /// Residual cash swept from a garbage-collected node.
    pub swept: Amount,
}

impl Settlement {
    pub fn merge(&mut self, other: Settlement) {
        self.fulfilled += other.fulfilled;
        self.swept += other.swept;
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    nodes: BTreeMap<Tick, Node>,
    fulfilled: BTreeMap<Tick, Vec<FulfilledRedemption>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, tick: Tick) -> Option<&Node> {
        self.nodes.get(&tick)
    }

    pub fn contains(&self, tick: Tick) -> bool {
        self.nodes.contains_key(&tick)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Linked nodes in ascending tick order within `range`.
    pub fn nodes<R: RangeBounds<Tick>>(&self, range: R) -> impl Iterator<Item = (&Tick, &Node)> {
        self.nodes.range(range)
    }

    /// Insert an empty node at `tick`, or return the existing one.
    ///
    /// A new limit must be at least `spacing` (relative) above the nearest
    /// lower distinct limit and below the nearest higher one.
    pub fn insert(
        &mut self,
        tick: Tick,
        terms: &TickTerms,
        spacing: Decimal,
    ) -> Result<&mut Node, PoolError> {
        if !self.nodes.contains_key(&tick) {
            let limit = tick.limit_wad();
            let factor = Decimal::ONE + spacing;

            let prev = self
                .nodes
                .range(..tick)
                .rev()
                .map(|(t, _)| *t)
                .find(|t| t.limit_wad() != limit);
            if let Some(prev) = prev {
                let prev_limit = prev.decode()?.limit;
                if terms.limit.0 < prev_limit.0 * factor {
                    return Err(PoolError::InsufficientTickSpacing);
                }
            }

            let next = self
                .nodes
                .range((Excluded(tick), Unbounded))
                .map(|(t, _)| *t)
                .find(|t| t.limit_wad() != limit);
            if let Some(next) = next {
                let next_limit = next.decode()?.limit;
                if next_limit.0 < terms.limit.0 * factor {
                    return Err(PoolError::InsufficientTickSpacing);
                }
            }

            log::debug!("ledger: inserting node at tick {tick}");
        }
        Ok(self.nodes.entry(tick).or_default())
    }

    /// Credit a deposit of `amount` minting `shares`, then settle the queue.
    pub fn add(&mut self, tick: Tick, amount: Amount, shares: Amount) -> Settlement {
        if let Some(node) = self.nodes.get_mut(&tick) {
            node.value += amount;
            node.available += amount;
            node.shares += shares;
        }
        self.settle(tick)
    }

    /// Reserve `used` cash for a loan expecting `pending` back.
    pub fn use_liquidity(&mut self, tick: Tick, used: Amount, pending: Amount) {
        if let Some(node) = self.nodes.get_mut(&tick) {
            node.available -= used;
            node.pending += pending;
        }
    }

    /// Return `restored` cash for a loan that had reserved `used` and
    /// expected `pending`. Any difference between `used` and `restored`
    /// is gain (interest) or loss (write-down) on the node's value.
    pub fn restore(
        &mut self,
        tick: Tick,
        used: Amount,
        pending: Amount,
        restored: Amount,
    ) -> Settlement {
        if let Some(node) = self.nodes.get_mut(&tick) {
            node.value = node.value.saturating_sub(used) + restored;
            node.available += restored;
            node.pending = node.pending.saturating_sub(pending);
        }
        self.settle(tick)
    }

    /// Advance the redemption queue with whatever cash is available, then
    /// garbage-collect the node if nothing remains in it.
    pub fn settle(&mut self, tick: Tick) -> Settlement {
        let fulfilled = self
            .process_redemptions(tick)
            .map(|batch| batch.amount)
            .unwrap_or(Amount::ZERO);
        let swept = self.garbage_collect(tick).unwrap_or(Amount::ZERO);
        Settlement { fulfilled, swept }
    }

    /// Unlink a node with no shares and no pending loans. Returns the
    /// residual cash left in it, if the node was removed.
    pub fn garbage_collect(&mut self, tick: Tick) -> Option<Amount> {
        let collectible = self.nodes.get(&tick).map(Node::is_collectible)?;
        if !collectible {
            return None;
        }
        let node = self.nodes.remove(&tick)?;
        log::debug!("ledger: garbage collected tick {tick}");
        Some(node.available)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tick(limit: u64) -> (Tick, TickTerms) {
        let t = Tick::encode(Amount::from_units(limit), 0, 0).expect("test: valid tick");
        let terms = t.decode().expect("test: decodes");
        (t, terms)
    }

    #[test]
    fn insert_is_idempotent() {
        let mut ledger = Ledger::new();
        let (t, terms) = tick(10);
        ledger.insert(t, &terms, dec!(0.1)).expect("test: insert");
        ledger.add(t, Amount::from_units(5), Amount::from_units(5));
        let node = ledger.insert(t, &terms, dec!(0.1)).expect("test: existing");
        assert_eq!(node.value, Amount::from_units(5));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn insert_enforces_spacing() {
        let mut ledger = Ledger::new();
        let (t10, terms10) = tick(10);
        ledger.insert(t10, &terms10, dec!(0.1)).expect("test: insert");
        ledger.add(t10, Amount::ONE, Amount::ONE);

        let (t105, terms105) = tick(105);

        // 10.5 would be only 5% above 10.
        let close = Tick::encode(Amount(dec!(10.5)), 0, 0).expect("test: valid");
        let close_terms = close.decode().expect("test: decodes");
        assert!(matches!(
            ledger.insert(close, &close_terms, dec!(0.1)),
            Err(PoolError::InsufficientTickSpacing)
        ));

        // 9.5 would be within 10% below 10.
        let below = Tick::encode(Amount(dec!(9.5)), 0, 0).expect("test: valid");
        let below_terms = below.decode().expect("test: decodes");
        assert!(matches!(
            ledger.insert(below, &below_terms, dec!(0.1)),
            Err(PoolError::InsufficientTickSpacing)
        ));

        assert!(ledger.insert(t105, &terms105, dec!(0.1)).is_ok());
    }

    #[test]
    fn same_limit_different_terms_is_allowed() {
        let mut ledger = Ledger::new();
        let (t, terms) = tick(10);
        ledger.insert(t, &terms, dec!(0.1)).expect("test: insert");
        let other = Tick::encode(Amount::from_units(10), 1, 2).expect("test: valid");
        let other_terms = other.decode().expect("test: decodes");
        assert!(ledger.insert(other, &other_terms, dec!(0.1)).is_ok());
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn health_classification() {
        let threshold = dec!(0.05);
        let mut node = Node {
            value: Amount::from_units(10),
            shares: Amount::from_units(10),
            available: Amount::from_units(10),
            ..Default::default()
        };
        assert_eq!(node.health(threshold), NodeHealth::Active);

        node.value = Amount(dec!(0.1));
        node.available = Amount(dec!(0.1));
        assert_eq!(node.health(threshold), NodeHealth::Impaired);

        node.value = Amount::ZERO;
        node.available = Amount::ZERO;
        assert_eq!(node.health(threshold), NodeHealth::Insolvent);

        node.pending = Amount::ONE;
        assert_eq!(node.health(threshold), NodeHealth::Impaired);
    }

    #[test]
    fn restore_applies_gain_and_loss() {
        let mut ledger = Ledger::new();
        let (t, terms) = tick(100);
        ledger.insert(t, &terms, dec!(0.1)).expect("test: insert");
        ledger.add(t, Amount::from_units(10), Amount::from_units(10));
        ledger.use_liquidity(t, Amount::from_units(4), Amount::from_units(5));

        let node = ledger.node(t).expect("test: node exists");
        assert_eq!(node.available, Amount::from_units(6));
        assert_eq!(node.pending, Amount::from_units(5));
        assert_eq!(node.value, Amount::from_units(10));

        ledger.restore(t, Amount::from_units(4), Amount::from_units(5), Amount::from_units(3));
        let node = ledger.node(t).expect("test: node exists");
        assert_eq!(node.value, Amount::from_units(9));
        assert_eq!(node.available, Amount::from_units(9));
        assert_eq!(node.pending, Amount::ZERO);
    }

    #[test]
    fn garbage_collect_requires_empty_node() {
        let mut ledger = Ledger::new();
        let (t, terms) = tick(10);
        ledger.insert(t, &terms, dec!(0.1)).expect("test: insert");
        ledger.add(t, Amount::ONE, Amount::ONE);
        assert_eq!(ledger.garbage_collect(t), None);
        assert!(ledger.contains(t));
    }
}
