// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Discriminated failure kinds surfaced by pool operations.
//!
//! Every operation either commits fully or fails with exactly one of these;
//! no partial ledger mutation survives an error.

use crate::collaborators::CollaboratorError;
use crate::config::ConfigError;
use crate::receipt::ReceiptError;
use crate::tick::TickError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("invalid tick: {0}")]
    InvalidTick(TickError),

    #[error("insufficient tick spacing")]
    InsufficientTickSpacing,

    #[error("inactive liquidity")]
    InactiveLiquidity,

    #[error("insufficient liquidity")]
    InsufficientLiquidity,

    #[error("insufficient shares")]
    InsufficientShares,

    #[error("invalid redemption status")]
    InvalidRedemptionStatus,

    #[error("invalid loan receipt")]
    InvalidLoanReceipt,

    #[error("invalid caller")]
    InvalidCaller,

    #[error("repayment too high")]
    RepaymentTooHigh,

    #[error("loan not expired")]
    LoanNotExpired,

    #[error("unsupported collateral")]
    UnsupportedCollateral,

    #[error("unsupported loan duration")]
    UnsupportedLoanDuration,

    #[error("invalid parameters")]
    InvalidParameters,

    #[error("collateral already in custody")]
    CollateralUnavailable,

    #[error("collaborator failure: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<TickError> for PoolError {
    fn from(e: TickError) -> Self {
        PoolError::InvalidTick(e)
    }
}

impl From<ReceiptError> for PoolError {
    fn from(e: ReceiptError) -> Self {
        log::debug!("rejecting loan receipt: {e}");
        PoolError::InvalidLoanReceipt
    }
}
