// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Conservation audit.
//!
//! Checks the accounting identities the pool must preserve after every
//! operation:
//!
//! ```text
//! cash            == sum(node.available) + unclaimed + admin_fee_balance
//! node.redemptions == sum(unfulfilled shares of queued redemptions at tick)
//! node.pending     == sum(pending of open receipts at tick)
//! principal        == sum(receipt.used)
//! repayment        ~= sum(receipt.pending) + admin_fee   (1 unit per node)
//! ```
//!
//! Cash identities are exact. Only the receipt repayment check has a
//! tolerance, one smallest unit per node receipt.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pool::PoolState;
use crate::receipt::LoanReceipt;
use crate::tick::Tick;
use crate::types::Amount;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConservationError {
    #[error("receipt principal {principal} != sum of used {used}")]
    ReceiptPrincipal { principal: Amount, used: Amount },

    #[error("receipt repayment {repayment} vs pending plus fee {actual} beyond tolerance")]
    ReceiptRepayment { repayment: Amount, actual: Amount },

    #[error("cash {cash} != accounted {accounted}")]
    CashImbalance { cash: Amount, accounted: Amount },

    #[error("tick {tick}: queued shares {node} != redemption records {records}")]
    QueueMismatch {
        tick: Tick,
        node: Amount,
        records: Amount,
    },

    #[error("unclaimed {held} cannot cover withdrawable {owed}")]
    UnclaimedShortfall { held: Amount, owed: Amount },

    #[error("tick {tick}: node pending {node} != open receipts {receipts}")]
    PendingMismatch {
        tick: Tick,
        node: Amount,
        receipts: Amount,
    },
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Running audit over a sequence of pool states.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConservationAudit {
    /// Checks performed.
    pub checks: u64,
    /// Checks that failed.
    pub violations: u64,
}

impl ConservationAudit {
    pub fn new() -> Self {
        Self::default()
    }

    fn record<T>(&mut self, result: Result<T, ConservationError>) -> Result<T, ConservationError> {
        self.checks += 1;
        if let Err(e) = &result {
            self.violations += 1;
            log::warn!("conservation: {e}");
        }
        result
    }

    pub fn verify_receipt(&mut self, receipt: &LoanReceipt) -> Result<(), ConservationError> {
        let result = check_receipt(receipt);
        self.record(result)
    }

    /// Cash and redemption queue identities of `state`.
    pub fn verify_state(&mut self, state: &PoolState) -> Result<(), ConservationError> {
        let result = check_cash(state).and_then(|()| check_queue(state));
        self.record(result)
    }

    /// Node pending against the receipts of loans not yet settled.
    pub fn verify_pending<'a>(
        &mut self,
        state: &PoolState,
        open_receipts: impl IntoIterator<Item = &'a LoanReceipt>,
    ) -> Result<(), ConservationError> {
        let result = check_pending(state, open_receipts);
        self.record(result)
    }

    pub fn is_clean(&self) -> bool {
        self.violations == 0
    }
}

fn check_receipt(receipt: &LoanReceipt) -> Result<(), ConservationError> {
    let used: Amount = receipt.node_receipts.iter().map(|n| n.used).sum();
    if used != receipt.principal {
        return Err(ConservationError::ReceiptPrincipal {
            principal: receipt.principal,
            used,
        });
    }

    let pending: Amount = receipt.node_receipts.iter().map(|n| n.pending).sum();
    let actual = pending + receipt.admin_fee;
    let units = u64::try_from(receipt.node_receipts.len()).unwrap_or(u64::MAX);
    let tolerance = Amount(Amount::unit().0 * rust_decimal::Decimal::from(units));
    let error = actual.saturating_sub(receipt.repayment) + receipt.repayment.saturating_sub(actual);
    if error > tolerance {
        return Err(ConservationError::ReceiptRepayment {
            repayment: receipt.repayment,
            actual,
        });
    }
    Ok(())
}

fn check_cash(state: &PoolState) -> Result<(), ConservationError> {
    let available: Amount = state.ledger().nodes(..).map(|(_, n)| n.available).sum();
    let accounted = available + state.unclaimed() + state.admin_fee_balance();
    if accounted != state.cash() {
        return Err(ConservationError::CashImbalance {
            cash: state.cash(),
            accounted,
        });
    }
    Ok(())
}

fn check_queue(state: &PoolState) -> Result<(), ConservationError> {
    let ledger = state.ledger();
    let mut unfulfilled: BTreeMap<Tick, Amount> = BTreeMap::new();
    let mut owed = Amount::ZERO;

    for ((_, tick, _), redemption) in state.redemptions() {
        let progress = ledger.redemption_progress(
            *tick,
            redemption.pending,
            redemption.index,
            redemption.target,
        );
        *unfulfilled.entry(*tick).or_default() += redemption.pending - progress.shares;
        owed += progress.amount;
    }

    for (tick, node) in ledger.nodes(..) {
        let records = unfulfilled.remove(tick).unwrap_or_default();
        if records != node.redemptions {
            return Err(ConservationError::QueueMismatch {
                tick: *tick,
                node: node.redemptions,
                records,
            });
        }
    }
    // Ticks without a node must have nothing left waiting.
    if let Some((tick, records)) = unfulfilled.into_iter().find(|(_, a)| !a.is_zero()) {
        return Err(ConservationError::QueueMismatch {
            tick,
            node: Amount::ZERO,
            records,
        });
    }

    if owed > state.unclaimed() {
        return Err(ConservationError::UnclaimedShortfall {
            held: state.unclaimed(),
            owed,
        });
    }
    Ok(())
}

fn check_pending<'a>(
    state: &PoolState,
    open_receipts: impl IntoIterator<Item = &'a LoanReceipt>,
) -> Result<(), ConservationError> {
    let mut expected: BTreeMap<Tick, Amount> = BTreeMap::new();
    for receipt in open_receipts {
        for node in &receipt.node_receipts {
            *expected.entry(node.tick).or_default() += node.pending;
        }
    }

    for (tick, node) in state.ledger().nodes(..) {
        let receipts = expected.remove(tick).unwrap_or_default();
        if receipts != node.pending {
            return Err(ConservationError::PendingMismatch {
                tick: *tick,
                node: node.pending,
                receipts,
            });
        }
    }
    if let Some((tick, receipts)) = expected.into_iter().next() {
        return Err(ConservationError::PendingMismatch {
            tick,
            node: Amount::ZERO,
            receipts,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
