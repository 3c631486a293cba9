// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Loan pricing and settlement arithmetic.
//!
//! No ledger state is touched here. Pricing splits interest across the ticks
//! that funded a loan; settlement decides how much cash each tick gets back
//! on repayment or from liquidation proceeds. Rounding always favours the
//! pool: borrowers' dues round up, node credits round down, and the gap
//! is the admin fee.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::{PoolConfig, SECONDS_PER_YEAR};
use crate::error::PoolError;
use crate::liquidity::NodeSource;
use crate::receipt::{LoanReceipt, NodeReceipt};
use crate::tick::TickError;
use crate::types::Amount;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Priced loan before a receipt is minted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanPricing {
    pub principal: Amount,
    /// Total owed at maturity.
    pub repayment: Amount,
    /// Portion of interest retained by the pool.
    pub admin_fee: Amount,
    pub node_receipts: Vec<NodeReceipt>,
}

impl LoanPricing {
    pub fn interest(&self) -> Amount {
        self.repayment - self.principal
    }
}

/// Cash returned to one tick for one loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRestore {
    pub receipt: NodeReceipt,
    pub restored: Amount,
}

/// Amounts moved by a repayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaymentPlan {
    /// Time-prorated fraction of interest owed, in `[0, 1]`.
    pub proration: Decimal,
    /// Pulled from the borrower.
    pub amount_due: Amount,
    pub restores: Vec<NodeRestore>,
    /// `amount_due` minus everything credited to the ticks.
    pub admin_fee: Amount,
}

/// Amounts moved when liquidation proceeds arrive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProceedsDistribution {
    pub restores: Vec<NodeRestore>,
    /// Surplus returned to the borrower.
    pub borrower_proceeds: Amount,
}

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Price a sourced loan of `duration` seconds.
///
/// Each tick earns simple interest at its own rate on the principal it
/// supplied, rounded up. The admin fee is taken from each tick's interest,
/// rounded down, so `sum(pending) + admin_fee == repayment` exactly.
pub fn price_loan(
    sources: &[NodeSource],
    duration: u64,
    config: &PoolConfig,
) -> Result<LoanPricing, PoolError> {
    let duration = Decimal::from(duration);
    let year = Decimal::from(SECONDS_PER_YEAR);

    let mut principal = Amount::ZERO;
    let mut interest = Amount::ZERO;
    let mut admin_fee = Amount::ZERO;
    let mut node_receipts = Vec::with_capacity(sources.len());

    for source in sources {
        let rate_index = source.tick.rate_index();
        let rate = config
            .rate(rate_index)
            .ok_or(TickError::InvalidRate(rate_index))?;

        let node_interest = Amount::round_up(source.used.0 * rate * duration / year);
        let node_fee = Amount::round_down(node_interest.0 * config.admin_fee_rate);

        node_receipts.push(NodeReceipt {
            tick: source.tick,
            used: source.used,
            pending: source.used + node_interest - node_fee,
        });
        principal += source.used;
        interest += node_interest;
        admin_fee += node_fee;
    }

    Ok(LoanPricing {
        principal,
        repayment: principal + interest,
        admin_fee,
        node_receipts,
    })
}

// ---------------------------------------------------------------------------
// Repayment
// ---------------------------------------------------------------------------

/// Elapsed fraction of the loan term at `now`, clamped to `[0, 1]`.
pub fn proration(receipt: &LoanReceipt, now: u64) -> Decimal {
    if receipt.duration == 0 {
        return Decimal::ONE;
    }
    let elapsed = now.saturating_sub(receipt.origination());
    let fraction = Decimal::from(elapsed) / Decimal::from(receipt.duration);
    fraction.clamp(Decimal::ZERO, Decimal::ONE)
}

/// Amounts for repaying `receipt` at `now`.
pub fn plan_repayment(receipt: &LoanReceipt, now: u64) -> RepaymentPlan {
    let proration = proration(receipt, now);
    let interest = receipt.repayment.saturating_sub(receipt.principal);
    let amount_due = receipt.principal + Amount::round_up(interest.0 * proration);

    let restores: Vec<NodeRestore> = receipt
        .node_receipts
        .iter()
        .map(|node| {
            let node_interest = node.pending.saturating_sub(node.used);
            NodeRestore {
                receipt: *node,
                restored: node.used + Amount::round_down(node_interest.0 * proration),
            }
        })
        .collect();

    let credited: Amount = restores.iter().map(|r| r.restored).sum();
    RepaymentPlan {
        proration,
        amount_due,
        admin_fee: amount_due.saturating_sub(credited),
        restores,
    }
}

// ---------------------------------------------------------------------------
// Liquidation
// ---------------------------------------------------------------------------

/// Split liquidation `proceeds` across the ticks of `receipt`.
///
/// With enough proceeds every tick is made whole and the surplus goes to the
/// borrower. Otherwise ticks share pro rata by pending, the last tick takes
/// the rounding remainder (never more than its pending) and each tick's
/// shortfall becomes a write-down.
pub fn distribute_proceeds(receipt: &LoanReceipt, proceeds: Amount) -> ProceedsDistribution {
    let total_pending: Amount = receipt.node_receipts.iter().map(|n| n.pending).sum();

    if proceeds >= total_pending {
        return ProceedsDistribution {
            restores: receipt
                .node_receipts
                .iter()
                .map(|node| NodeRestore {
                    receipt: *node,
                    restored: node.pending,
                })
                .collect(),
            borrower_proceeds: proceeds - total_pending,
        };
    }

    let mut restores = Vec::with_capacity(receipt.node_receipts.len());
    let mut remaining = proceeds;
    let last = receipt.node_receipts.len().saturating_sub(1);
    let mut borrower_proceeds = Amount::ZERO;

    for (i, node) in receipt.node_receipts.iter().enumerate() {
        let restored = if i == last {
            let capped = remaining.min(node.pending);
            borrower_proceeds = remaining - capped;
            capped
        } else {
            proceeds.mul_div_down(node.pending, total_pending).min(remaining)
        };
        remaining -= restored;
        restores.push(NodeRestore {
            receipt: *node,
            restored,
        });
    }

    ProceedsDistribution {
        restores,
        borrower_proceeds,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::LOAN_RECEIPT_VERSION;
    use crate::tick::Tick;
    use crate::types::{Address, TokenId};
    use rust_decimal_macros::dec;

    const DAY: u64 = 86_400;

    fn source(limit: u64, rate_index: u8, used: Amount) -> NodeSource {
        NodeSource {
            tick: Tick::encode(Amount::from_units(limit), 0, rate_index).expect("test: valid"),
            used,
        }
    }

    fn receipt_from(pricing: &LoanPricing, maturity: u64, duration: u64) -> LoanReceipt {
        LoanReceipt {
            version: LOAN_RECEIPT_VERSION,
            principal: pricing.principal,
            repayment: pricing.repayment,
            admin_fee: pricing.admin_fee,
            borrower: Address::from_low_u64(1),
            maturity,
            duration,
            collateral_token: Address::from_low_u64(2),
            collateral_token_id: TokenId::from(3),
            collateral_wrapper_context: Vec::new(),
            node_receipts: pricing.node_receipts.clone(),
        }
    }

    #[test]
    fn pricing_at_ten_percent_for_a_full_year() {
        let config = PoolConfig {
            durations: vec![365 * DAY],
            ..Default::default()
        };
        let pricing = price_loan(&[source(100, 0, Amount::from_units(10))], 365 * DAY, &config)
            .expect("test: prices");
        assert_eq!(pricing.repayment, Amount::from_units(11));
        assert_eq!(pricing.node_receipts[0].pending, Amount::from_units(11));
        assert_eq!(pricing.admin_fee, Amount::ZERO);
    }

    #[test]
    fn interest_divides_by_the_year_last() {
        // 365 * 0.10 * 30 / 365 is exactly 3; 30/365 alone does not terminate.
        let pricing = price_loan(
            &[source(1_000, 0, Amount::from_units(365))],
            30 * DAY,
            &PoolConfig::default(),
        )
        .expect("test: prices");
        assert_eq!(pricing.repayment, Amount::from_units(368));
    }

    #[test]
    fn pending_plus_fee_equals_repayment() {
        let config = PoolConfig {
            admin_fee_rate: dec!(0.05),
            ..Default::default()
        };
        let sources = [
            source(10, 0, Amount::from_units(10)),
            source(20, 1, Amount(dec!(7.3))),
            source(30, 2, Amount(dec!(0.000000000000000001))),
        ];
        let pricing = price_loan(&sources, 30 * DAY, &config).expect("test: prices");

        let pending: Amount = pricing.node_receipts.iter().map(|n| n.pending).sum();
        assert_eq!(pending + pricing.admin_fee, pricing.repayment);
        let used: Amount = pricing.node_receipts.iter().map(|n| n.used).sum();
        assert_eq!(used, pricing.principal);
        assert!(pricing.admin_fee > Amount::ZERO);
    }

    #[test]
    fn unknown_rate_index_is_invalid_tick() {
        let config = PoolConfig::default();
        let err = price_loan(&[source(10, 6, Amount::ONE)], DAY, &config);
        assert!(matches!(
            err,
            Err(PoolError::InvalidTick(TickError::InvalidRate(6)))
        ));
    }

    #[test]
    fn proration_is_clamped() {
        let config = PoolConfig::default();
        let pricing = price_loan(&[source(10, 0, Amount::from_units(10))], 30 * DAY, &config)
            .expect("test: prices");
        let receipt = receipt_from(&pricing, 1_000 + 30 * DAY, 30 * DAY);

        assert_eq!(proration(&receipt, 0), Decimal::ZERO);
        assert_eq!(proration(&receipt, 1_000 + 15 * DAY), dec!(0.5));
        assert_eq!(proration(&receipt, 1_000 + 90 * DAY), Decimal::ONE);
    }

    #[test]
    fn repayment_at_maturity_restores_full_pending() {
        let config = PoolConfig {
            admin_fee_rate: dec!(0.1),
            ..Default::default()
        };
        let pricing = price_loan(
            &[
                source(10, 0, Amount::from_units(10)),
                source(20, 2, Amount::from_units(5)),
            ],
            30 * DAY,
            &config,
        )
        .expect("test: prices");
        let receipt = receipt_from(&pricing, 30 * DAY, 30 * DAY);

        let plan = plan_repayment(&receipt, 30 * DAY);
        assert_eq!(plan.amount_due, receipt.repayment);
        for restore in &plan.restores {
            assert_eq!(restore.restored, restore.receipt.pending);
        }
        assert_eq!(plan.admin_fee, receipt.admin_fee);
    }

    #[test]
    fn early_repayment_charges_prorated_interest() {
        let config = PoolConfig::default();
        let pricing = price_loan(&[source(10, 0, Amount::from_units(10))], 30 * DAY, &config)
            .expect("test: prices");
        let receipt = receipt_from(&pricing, 30 * DAY, 30 * DAY);

        let plan = plan_repayment(&receipt, 15 * DAY);
        let half_interest = Amount::round_up(pricing.interest().0 / dec!(2));
        assert_eq!(plan.amount_due, receipt.principal + half_interest);
        assert!(plan.restores[0].restored <= plan.amount_due);
    }

    #[test]
    fn proceeds_surplus_goes_to_borrower() {
        let config = PoolConfig::default();
        let pricing = price_loan(&[source(10, 0, Amount::from_units(10))], 30 * DAY, &config)
            .expect("test: prices");
        let receipt = receipt_from(&pricing, 30 * DAY, 30 * DAY);

        let dist = distribute_proceeds(&receipt, Amount::from_units(20));
        assert_eq!(dist.restores[0].restored, receipt.node_receipts[0].pending);
        assert_eq!(
            dist.borrower_proceeds,
            Amount::from_units(20) - receipt.node_receipts[0].pending
        );
    }

    #[test]
    fn shortfall_is_shared_pro_rata() {
        let config = PoolConfig::default();
        let pricing = price_loan(
            &[
                source(10, 0, Amount::from_units(10)),
                source(20, 0, Amount::from_units(10)),
            ],
            30 * DAY,
            &config,
        )
        .expect("test: prices");
        let receipt = receipt_from(&pricing, 30 * DAY, 30 * DAY);

        let proceeds = Amount::from_units(10);
        let dist = distribute_proceeds(&receipt, proceeds);
        let total: Amount = dist.restores.iter().map(|r| r.restored).sum();
        assert_eq!(total, proceeds);
        assert_eq!(dist.borrower_proceeds, Amount::ZERO);
        for restore in &dist.restores {
            assert!(restore.restored < restore.receipt.pending);
        }
    }
}
