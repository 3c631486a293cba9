// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Tick-based NFT lending pool.
//!
//! Depositors supply currency at ticks (limit, duration, rate); borrowers
//! draw principal across a path of ticks against NFT collateral and receive
//! a hashable loan receipt. Repayment, refinancing and liquidation settle
//! the receipt back into the ticks that funded it.

pub mod collaborators;
pub mod config;
pub mod conservation;
pub mod error;
pub mod events;
pub mod liquidity;
pub mod pool;
pub mod receipt;
pub mod settlement;
pub mod tick;
pub mod types;

pub use config::PoolConfig;
pub use error::PoolError;
pub use events::PoolEvent;
pub use liquidity::{Ledger, Node, NodeHealth};
pub use pool::{LoanStatus, Operation, OperationOutcome, Pool, PoolState};
pub use receipt::{LoanReceipt, NodeReceipt};
pub use tick::Tick;
pub use types::{Address, Amount, Context, ReceiptHash, TokenId};

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use wasm_bindgen::prelude::*;

use types::{parse_hex, to_hex};

// ─── WASM Interface ──────────────────────────────────────────────────────────

/// JavaScript facade over [`Pool`]. Amounts are decimal strings, ticks are
/// the decimal string of their `u128` encoding, addresses and receipts are
/// hex.
#[wasm_bindgen]
pub struct WasmPool {
    inner: Pool,
}

#[derive(Serialize)]
struct JsLoan {
    receipt_hash: String,
    encoded_receipt: String,
    principal: String,
    repayment: String,
    maturity: u64,
}

#[derive(Serialize)]
struct JsNode {
    tick: String,
    limit: String,
    value: String,
    shares: String,
    available: String,
    pending: String,
    redemptions: String,
}

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn parse_amount(s: &str) -> Result<Amount, JsValue> {
    let d = Decimal::from_str(s).map_err(js_err)?;
    if d.is_sign_negative() {
        return Err(js_err("negative amount"));
    }
    Ok(Amount::round_down(d))
}

fn parse_tick(s: &str) -> Result<Tick, JsValue> {
    u128::from_str(s).map(Tick).map_err(js_err)
}

fn parse_ticks(value: JsValue) -> Result<Vec<Tick>, JsValue> {
    let raw: Vec<String> = serde_wasm_bindgen::from_value(value).map_err(js_err)?;
    raw.iter().map(|s| parse_tick(s)).collect()
}

fn parse_address(s: &str) -> Result<Address, JsValue> {
    Address::from_hex(s).ok_or_else(|| js_err("invalid address"))
}

fn parse_receipt(s: &str) -> Result<Vec<u8>, JsValue> {
    parse_hex(s.trim_start_matches("0x")).ok_or_else(|| js_err("invalid receipt hex"))
}

fn context(caller: &str, timestamp: u64) -> Result<Context, JsValue> {
    Ok(Context::new(parse_address(caller)?, timestamp))
}

#[wasm_bindgen]
impl WasmPool {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<WasmPool, JsValue> {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        let config = PoolConfig::from_json(config_json).map_err(js_err)?;
        let inner = Pool::new(config).map_err(js_err)?;
        Ok(Self { inner })
    }

    pub fn encode_tick(limit: &str, duration_index: u8, rate_index: u8) -> Result<String, JsValue> {
        let tick = Tick::encode(parse_amount(limit)?, duration_index, rate_index).map_err(js_err)?;
        Ok(tick.raw().to_string())
    }

    pub fn deposit(
        &mut self,
        caller: &str,
        timestamp: u64,
        tick: &str,
        amount: &str,
        min_shares: &str,
    ) -> Result<String, JsValue> {
        let ctx = context(caller, timestamp)?;
        let shares = self
            .inner
            .deposit(&ctx, parse_tick(tick)?, parse_amount(amount)?, parse_amount(min_shares)?)
            .map_err(js_err)?;
        Ok(shares.to_string())
    }

    pub fn redeem(&mut self, caller: &str, timestamp: u64, tick: &str, shares: &str) -> Result<u64, JsValue> {
        let ctx = context(caller, timestamp)?;
        self.inner
            .redeem(&ctx, parse_tick(tick)?, parse_amount(shares)?)
            .map_err(js_err)
    }

    pub fn redemption_available(&self, account: &str, tick: &str, redemption_id: u64) -> Result<JsValue, JsValue> {
        let available = self
            .inner
            .redemption_available(parse_address(account)?, parse_tick(tick)?, redemption_id)
            .map_err(js_err)?;
        serde_wasm_bindgen::to_value(&available).map_err(js_err)
    }

    /// Returns `[shares, amount]` as decimal strings.
    pub fn withdraw(&mut self, caller: &str, timestamp: u64, tick: &str, redemption_id: u64) -> Result<JsValue, JsValue> {
        let ctx = context(caller, timestamp)?;
        let (shares, amount) = self
            .inner
            .withdraw(&ctx, parse_tick(tick)?, redemption_id)
            .map_err(js_err)?;
        serde_wasm_bindgen::to_value(&[shares.to_string(), amount.to_string()]).map_err(js_err)
    }

    pub fn quote(
        &self,
        principal: &str,
        duration: u64,
        collateral_token: &str,
        collateral_token_id: u64,
        ticks: JsValue,
    ) -> Result<String, JsValue> {
        let quote = self
            .inner
            .quote(
                parse_amount(principal)?,
                duration,
                parse_address(collateral_token)?,
                TokenId::from(collateral_token_id),
                &parse_ticks(ticks)?,
            )
            .map_err(js_err)?;
        Ok(quote.repayment.to_string())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn borrow(
        &mut self,
        caller: &str,
        timestamp: u64,
        principal: &str,
        duration: u64,
        collateral_token: &str,
        collateral_token_id: u64,
        max_repayment: &str,
        ticks: JsValue,
    ) -> Result<JsValue, JsValue> {
        let ctx = context(caller, timestamp)?;
        let loan = self
            .inner
            .borrow(
                &ctx,
                parse_amount(principal)?,
                duration,
                parse_address(collateral_token)?,
                TokenId::from(collateral_token_id),
                parse_amount(max_repayment)?,
                &parse_ticks(ticks)?,
                &[],
            )
            .map_err(js_err)?;
        let js = JsLoan {
            receipt_hash: to_hex(loan.receipt_hash.as_bytes()),
            encoded_receipt: to_hex(&loan.encoded_receipt),
            principal: loan.receipt.principal.to_string(),
            repayment: loan.receipt.repayment.to_string(),
            maturity: loan.receipt.maturity,
        };
        serde_wasm_bindgen::to_value(&js).map_err(js_err)
    }

    pub fn repay(&mut self, caller: &str, timestamp: u64, encoded_receipt: &str) -> Result<String, JsValue> {
        let ctx = context(caller, timestamp)?;
        let paid = self
            .inner
            .repay(&ctx, &parse_receipt(encoded_receipt)?)
            .map_err(js_err)?;
        Ok(paid.to_string())
    }

    pub fn liquidate(&mut self, caller: &str, timestamp: u64, encoded_receipt: &str) -> Result<(), JsValue> {
        let ctx = context(caller, timestamp)?;
        self.inner
            .liquidate(&ctx, &parse_receipt(encoded_receipt)?)
            .map_err(js_err)
    }

    pub fn deposit_share_price(&self, tick: &str) -> Result<String, JsValue> {
        Ok(self.inner.deposit_share_price(parse_tick(tick)?).to_string())
    }

    pub fn get_nodes(&self) -> JsValue {
        let nodes: Vec<JsNode> = self
            .inner
            .liquidity_nodes(..)
            .map(|(tick, node)| JsNode {
                tick: tick.raw().to_string(),
                limit: Amount::from_wad(tick.limit_wad())
                    .map(|l| l.to_string())
                    .unwrap_or_default(),
                value: node.value.to_string(),
                shares: node.shares.to_string(),
                available: node.available.to_string(),
                pending: node.pending.to_string(),
                redemptions: node.redemptions.to_string(),
            })
            .collect();
        serde_wasm_bindgen::to_value(&nodes).unwrap_or(JsValue::NULL)
    }

    pub fn drain_events(&mut self) -> JsValue {
        let events = self.inner.drain_events();
        serde_wasm_bindgen::to_value(&events).unwrap_or(JsValue::NULL)
    }
}
