// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Notifications emitted on every committed state transition.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::receipt::LoanReceipt;
use crate::tick::Tick;
use crate::types::{Address, Amount, ReceiptHash};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum PoolEvent {
    Deposited {
        account: Address,
        tick: Tick,
        amount: Amount,
        shares: Amount,
    },
    Redeemed {
        account: Address,
        tick: Tick,
        redemption_id: u64,
        shares: Amount,
    },
    Withdrawn {
        account: Address,
        tick: Tick,
        redemption_id: u64,
        shares: Amount,
        amount: Amount,
    },
    LoanOriginated {
        receipt_hash: ReceiptHash,
        receipt: LoanReceipt,
    },
    LoanRepaid {
        receipt_hash: ReceiptHash,
        repayment: Amount,
    },
    LoanLiquidated {
        receipt_hash: ReceiptHash,
    },
    CollateralLiquidated {
        receipt_hash: ReceiptHash,
        proceeds: Amount,
        borrower_proceeds: Amount,
    },
    AdminFeeRateUpdated {
        rate: Decimal,
    },
    AdminFeesWithdrawn {
        recipient: Address,
        amount: Amount,
    },
}
