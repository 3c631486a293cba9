// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! External collaborators the pool calls out to.
//!
//! The pool never runs custody or auction logic itself. It hands defaulted
//! collateral to a [`CollateralLiquidator`] and optionally asks a
//! [`DelegationRegistry`] to extend utility rights to borrowers. Both are
//! invoked only after the pool's own state transition has committed.

use serde::{Deserialize, Serialize};

use crate::types::{Address, TokenId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("collateral liquidator rejected request: {0}")]
    Liquidator(String),

    #[error("delegation registry failed: {0}")]
    Delegation(String),
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Everything a liquidator needs to take over defaulted collateral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationRequest {
    /// Pool the proceeds must be reported back to.
    pub source: Address,
    pub collateral_token: Address,
    pub collateral_token_id: TokenId,
    pub collateral_wrapper_context: Vec<u8>,
    /// Encoded loan receipt, echoed back with the proceeds.
    pub encoded_receipt: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

pub trait CollateralLiquidator {
    fn withdraw_collateral(&mut self, request: &LiquidationRequest) -> Result<(), CollaboratorError>;
}

pub trait DelegationRegistry {
    fn delegate(
        &mut self,
        delegate: Address,
        token: Address,
        token_id: TokenId,
    ) -> Result<(), CollaboratorError>;

    fn revoke(
        &mut self,
        delegate: Address,
        token: Address,
        token_id: TokenId,
    ) -> Result<(), CollaboratorError>;
}

// ---------------------------------------------------------------------------
// Default implementations
// ---------------------------------------------------------------------------

/// Liquidator that accepts every request and keeps them for inspection.
#[derive(Debug, Default, Clone)]
pub struct RecordingLiquidator {
    pub requests: Vec<LiquidationRequest>,
}

impl CollateralLiquidator for RecordingLiquidator {
    fn withdraw_collateral(&mut self, request: &LiquidationRequest) -> Result<(), CollaboratorError> {
        log::debug!(
            "liquidator: received token {} of {}",
            request.collateral_token_id,
            request.collateral_token
        );
        self.requests.push(request.clone());
        Ok(())
    }
}

/// Delegation registry tracking active `(delegate, token, id)` grants.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDelegations {
    pub grants: Vec<(Address, Address, TokenId)>,
}

impl DelegationRegistry for InMemoryDelegations {
    fn delegate(
        &mut self,
        delegate: Address,
        token: Address,
        token_id: TokenId,
    ) -> Result<(), CollaboratorError> {
        self.grants.push((delegate, token, token_id));
        Ok(())
    }

    fn revoke(
        &mut self,
        delegate: Address,
        token: Address,
        token_id: TokenId,
    ) -> Result<(), CollaboratorError> {
        let before = self.grants.len();
        self.grants.retain(|g| *g != (delegate, token, token_id));
        if self.grants.len() == before {
            return Err(CollaboratorError::Delegation(format!(
                "no grant for {token_id} of {token}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revoking_unknown_grant_fails() {
        let mut registry = InMemoryDelegations::default();
        let token = Address::from_low_u64(5);
        let err = registry.revoke(Address::from_low_u64(1), token, TokenId::from(1));
        assert!(matches!(err, Err(CollaboratorError::Delegation(_))));

        registry
            .delegate(Address::from_low_u64(1), token, TokenId::from(1))
            .expect("test: delegate");
        registry
            .revoke(Address::from_low_u64(1), token, TokenId::from(1))
            .expect("test: revoke");
        assert!(registry.grants.is_empty());
    }
}
