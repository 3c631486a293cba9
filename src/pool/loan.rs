// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Borrower side of the pool: quoting, origination, repayment, refinancing
//! and liquidation.
//!
//! ```text
//! Active ──repay──────────▶ Repaid
//!   │
//!   └──liquidate──▶ Liquidated ──proceeds──▶ CollateralLiquidated
//! ```

use serde::{Deserialize, Serialize};

use super::{Effect, PoolState};
use crate::collaborators::LiquidationRequest;
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::events::PoolEvent;
use crate::receipt::{hash_bytes, LoanReceipt, NodeReceipt, LOAN_RECEIPT_VERSION};
use crate::settlement::{self, LoanPricing, NodeRestore};
use crate::tick::Tick;
use crate::types::{Address, Amount, Context, ReceiptHash, TokenId};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanStatus {
    Active,
    Repaid,
    Liquidated,
    CollateralLiquidated,
}

/// Terms a borrow over the same path would get in the same block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanQuote {
    pub principal: Amount,
    pub repayment: Amount,
    pub admin_fee: Amount,
    /// Collateral pricing fee; this pool does not charge one.
    pub oracle_fee: Amount,
    pub node_receipts: Vec<NodeReceipt>,
}

impl From<LoanPricing> for LoanQuote {
    fn from(pricing: LoanPricing) -> Self {
        Self {
            principal: pricing.principal,
            repayment: pricing.repayment,
            admin_fee: pricing.admin_fee,
            oracle_fee: Amount::ZERO,
            node_receipts: pricing.node_receipts,
        }
    }
}

/// A newly minted loan. The borrower keeps `encoded_receipt` and presents
/// it to repay or refinance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanOrigination {
    pub receipt_hash: ReceiptHash,
    pub encoded_receipt: Vec<u8>,
    pub receipt: LoanReceipt,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl PoolState {
    fn price(
        &self,
        config: &PoolConfig,
        principal: Amount,
        duration: u64,
        collateral_token: Address,
        ticks: &[Tick],
    ) -> Result<LoanPricing, PoolError> {
        if principal.is_zero() || !principal.is_representable() || ticks.is_empty() {
            return Err(PoolError::InvalidParameters);
        }
        if !config.supports_collateral(&collateral_token) {
            return Err(PoolError::UnsupportedCollateral);
        }
        let duration_index = config
            .duration_index(duration)
            .ok_or(PoolError::UnsupportedLoanDuration)?;
        let terms = Tick::validate_path(ticks, duration_index, config)?;
        let sources = self.ledger.source(
            principal,
            ticks,
            &terms,
            config.impaired_price_threshold,
        )?;
        settlement::price_loan(&sources, duration, config)
    }

    pub(super) fn quote(
        &self,
        config: &PoolConfig,
        principal: Amount,
        duration: u64,
        collateral_token: Address,
        collateral_token_id: TokenId,
        ticks: &[Tick],
    ) -> Result<LoanQuote, PoolError> {
        let pricing = self.price(config, principal, duration, collateral_token, ticks)?;
        if self.custody.contains(&(collateral_token, collateral_token_id)) {
            return Err(PoolError::CollateralUnavailable);
        }
        Ok(pricing.into())
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn borrow(
        &mut self,
        config: &PoolConfig,
        ctx: &Context,
        principal: Amount,
        duration: u64,
        collateral_token: Address,
        collateral_token_id: TokenId,
        max_repayment: Amount,
        ticks: &[Tick],
        collateral_wrapper_context: &[u8],
        delegate: bool,
    ) -> Result<LoanOrigination, PoolError> {
        let pricing = self.price(config, principal, duration, collateral_token, ticks)?;
        if self.custody.contains(&(collateral_token, collateral_token_id)) {
            return Err(PoolError::CollateralUnavailable);
        }
        if pricing.repayment > max_repayment {
            return Err(PoolError::RepaymentTooHigh);
        }

        let receipt = LoanReceipt {
            version: LOAN_RECEIPT_VERSION,
            principal: pricing.principal,
            repayment: pricing.repayment,
            admin_fee: pricing.admin_fee,
            borrower: ctx.caller,
            maturity: ctx.timestamp + duration,
            duration,
            collateral_token,
            collateral_token_id,
            collateral_wrapper_context: collateral_wrapper_context.to_vec(),
            node_receipts: pricing.node_receipts,
        };
        let encoded_receipt = receipt.encode()?;
        let receipt_hash = hash_bytes(&encoded_receipt);
        if self.loans.contains_key(&receipt_hash) {
            return Err(PoolError::InvalidLoanReceipt);
        }

        for node in &receipt.node_receipts {
            self.ledger.use_liquidity(node.tick, node.used, node.pending);
        }
        self.loans.insert(receipt_hash, LoanStatus::Active);
        self.custody.insert((collateral_token, collateral_token_id));
        self.cash -= receipt.principal;

        if delegate {
            self.effects.push(Effect::Delegate {
                borrower: ctx.caller,
                token: collateral_token,
                token_id: collateral_token_id,
            });
        }

        log::info!(
            "pool: loan {receipt_hash} originated, principal {} repayment {} across {} ticks",
            receipt.principal,
            receipt.repayment,
            receipt.node_receipts.len()
        );
        self.emit(PoolEvent::LoanOriginated {
            receipt_hash,
            receipt: receipt.clone(),
        });
        Ok(LoanOrigination {
            receipt_hash,
            encoded_receipt,
            receipt,
        })
    }

    /// Decode a presented receipt and check the loan is in `expected` state.
    fn load(
        &self,
        encoded_receipt: &[u8],
        expected: LoanStatus,
    ) -> Result<(LoanReceipt, ReceiptHash), PoolError> {
        let receipt = LoanReceipt::decode(encoded_receipt)?;
        let hash = hash_bytes(encoded_receipt);
        if self.loans.get(&hash) != Some(&expected) {
            return Err(PoolError::InvalidLoanReceipt);
        }
        Ok((receipt, hash))
    }

    fn restore_nodes(&mut self, restores: &[NodeRestore]) {
        for restore in restores {
            let settlement = self.ledger.restore(
                restore.receipt.tick,
                restore.receipt.used,
                restore.receipt.pending,
                restore.restored,
            );
            self.apply(settlement);
        }
    }

    /// Settle a repayment and release custody. Returns the receipt and the
    /// amount pulled from the borrower.
    fn close_repaid(
        &mut self,
        ctx: &Context,
        encoded_receipt: &[u8],
    ) -> Result<(LoanReceipt, Amount), PoolError> {
        let (receipt, receipt_hash) = self.load(encoded_receipt, LoanStatus::Active)?;
        if ctx.caller != receipt.borrower {
            return Err(PoolError::InvalidCaller);
        }

        let plan = settlement::plan_repayment(&receipt, ctx.timestamp);
        self.restore_nodes(&plan.restores);
        self.cash += plan.amount_due;
        self.admin_fee_balance += plan.admin_fee;
        self.loans.insert(receipt_hash, LoanStatus::Repaid);
        self.custody
            .remove(&(receipt.collateral_token, receipt.collateral_token_id));

        log::info!(
            "pool: loan {receipt_hash} repaid {} (proration {})",
            plan.amount_due,
            plan.proration
        );
        self.emit(PoolEvent::LoanRepaid {
            receipt_hash,
            repayment: plan.amount_due,
        });
        Ok((receipt, plan.amount_due))
    }

    pub(super) fn repay(&mut self, ctx: &Context, encoded_receipt: &[u8]) -> Result<Amount, PoolError> {
        let (receipt, amount_due) = self.close_repaid(ctx, encoded_receipt)?;
        self.effects.push(Effect::Revoke {
            borrower: receipt.borrower,
            token: receipt.collateral_token,
            token_id: receipt.collateral_token_id,
        });
        Ok(amount_due)
    }

    /// Repay `encoded_receipt` and originate a new loan on the same
    /// collateral. Only the net difference changes hands.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn refinance(
        &mut self,
        config: &PoolConfig,
        ctx: &Context,
        encoded_receipt: &[u8],
        principal: Amount,
        duration: u64,
        max_repayment: Amount,
        ticks: &[Tick],
    ) -> Result<LoanOrigination, PoolError> {
        let (old, _) = self.close_repaid(ctx, encoded_receipt)?;
        self.borrow(
            config,
            ctx,
            principal,
            duration,
            old.collateral_token,
            old.collateral_token_id,
            max_repayment,
            ticks,
            &old.collateral_wrapper_context,
            false,
        )
    }

    pub(super) fn liquidate(
        &mut self,
        config: &PoolConfig,
        ctx: &Context,
        encoded_receipt: &[u8],
    ) -> Result<(), PoolError> {
        let (receipt, receipt_hash) = self.load(encoded_receipt, LoanStatus::Active)?;
        if ctx.timestamp <= receipt.maturity {
            return Err(PoolError::LoanNotExpired);
        }

        // Node pending stays locked until proceeds are reported.
        self.loans.insert(receipt_hash, LoanStatus::Liquidated);
        self.custody
            .remove(&(receipt.collateral_token, receipt.collateral_token_id));

        self.effects.push(Effect::Revoke {
            borrower: receipt.borrower,
            token: receipt.collateral_token,
            token_id: receipt.collateral_token_id,
        });
        self.effects
            .push(Effect::WithdrawCollateral(LiquidationRequest {
                source: config.address,
                collateral_token: receipt.collateral_token,
                collateral_token_id: receipt.collateral_token_id,
                collateral_wrapper_context: receipt.collateral_wrapper_context.clone(),
                encoded_receipt: encoded_receipt.to_vec(),
            }));

        log::info!("pool: loan {receipt_hash} liquidated by {}", ctx.caller);
        self.emit(PoolEvent::LoanLiquidated { receipt_hash });
        Ok(())
    }

    /// Returns the surplus paid to the borrower.
    pub(super) fn on_collateral_liquidated(
        &mut self,
        config: &PoolConfig,
        ctx: &Context,
        encoded_receipt: &[u8],
        proceeds: Amount,
    ) -> Result<Amount, PoolError> {
        if ctx.caller != config.liquidator {
            return Err(PoolError::InvalidCaller);
        }
        if !proceeds.is_representable() {
            return Err(PoolError::InvalidParameters);
        }
        let (receipt, receipt_hash) = self.load(encoded_receipt, LoanStatus::Liquidated)?;

        let distribution = settlement::distribute_proceeds(&receipt, proceeds);
        self.restore_nodes(&distribution.restores);
        self.cash += proceeds - distribution.borrower_proceeds;
        self.loans
            .insert(receipt_hash, LoanStatus::CollateralLiquidated);

        log::info!(
            "pool: loan {receipt_hash} collateral sold for {proceeds}, borrower receives {}",
            distribution.borrower_proceeds
        );
        self.emit(PoolEvent::CollateralLiquidated {
            receipt_hash,
            proceeds,
            borrower_proceeds: distribution.borrower_proceeds,
        });
        Ok(distribution.borrower_proceeds)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
