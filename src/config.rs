// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Pool configuration: loan durations, interest rates, fee rate, supported
//! collateral and the tick spacing/impairment parameters.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::Address;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Seconds per year used for annual rate accrual.
pub const SECONDS_PER_YEAR: u64 = 365 * 86_400;

/// Duration and rate indices are 3-bit fields of the tick encoding.
pub const MAX_TERMS: usize = 8;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("durations must be non-empty, nonzero and strictly descending (max 8)")]
    InvalidDurations,

    #[error("rates must be non-empty and non-negative (max 8)")]
    InvalidRates,

    #[error("admin fee rate {0} outside [0, 1)")]
    InvalidAdminFeeRate(Decimal),

    #[error("tick limit spacing {0} must be non-negative")]
    InvalidTickSpacing(Decimal),

    #[error("impaired price threshold {0} outside [0, 1]")]
    InvalidImpairedThreshold(Decimal),
}

// ---------------------------------------------------------------------------
// PoolConfig
// ---------------------------------------------------------------------------

/// Static parameters of one pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Allowed loan durations in seconds, strictly descending.
    pub durations: Vec<u64>,
    /// Annual interest rates selectable by a tick's rate index.
    pub rates: Vec<Decimal>,
    /// Fraction of interest retained as admin fee.
    pub admin_fee_rate: Decimal,
    /// Minimum relative spacing between distinct adjacent tick limits.
    pub tick_limit_spacing: Decimal,
    /// Share price below which a tick is considered impaired.
    pub impaired_price_threshold: Decimal,
    /// Collateral token contracts this pool lends against.
    pub collateral_tokens: Vec<Address>,
    /// Account allowed to change the fee rate and withdraw admin fees.
    pub admin: Address,
    /// Account that reports liquidation proceeds.
    pub liquidator: Address,
    /// Account the pool itself acts as towards collaborators.
    pub address: Address,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            durations: vec![30 * 86_400, 14 * 86_400, 7 * 86_400],
            rates: vec![dec!(0.10), dec!(0.30), dec!(0.50)],
            admin_fee_rate: dec!(0),
            tick_limit_spacing: dec!(0.10),
            impaired_price_threshold: dec!(0.05),
            collateral_tokens: Vec::new(),
            admin: Address::ZERO,
            liquidator: Address::ZERO,
            address: Address::ZERO,
        }
    }
}

impl PoolConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: PoolConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let descending = self.durations.windows(2).all(|w| w[0] > w[1]);
        if self.durations.is_empty()
            || self.durations.len() > MAX_TERMS
            || !descending
            || self.durations.contains(&0)
        {
            return Err(ConfigError::InvalidDurations);
        }
        if self.rates.is_empty()
            || self.rates.len() > MAX_TERMS
            || self.rates.iter().any(|r| r.is_sign_negative())
        {
            return Err(ConfigError::InvalidRates);
        }
        if self.admin_fee_rate.is_sign_negative() || self.admin_fee_rate >= Decimal::ONE {
            return Err(ConfigError::InvalidAdminFeeRate(self.admin_fee_rate));
        }
        if self.tick_limit_spacing.is_sign_negative() {
            return Err(ConfigError::InvalidTickSpacing(self.tick_limit_spacing));
        }
        if self.impaired_price_threshold.is_sign_negative()
            || self.impaired_price_threshold > Decimal::ONE
        {
            return Err(ConfigError::InvalidImpairedThreshold(
                self.impaired_price_threshold,
            ));
        }
        Ok(())
    }

    pub fn supports_collateral(&self, token: &Address) -> bool {
        self.collateral_tokens.contains(token)
    }

    /// Index of the shortest configured duration that covers `duration`.
    pub fn duration_index(&self, duration: u64) -> Option<u8> {
        self.durations
            .iter()
            .rposition(|d| duration <= *d)
            .map(|i| i as u8)
    }

    pub fn rate(&self, rate_index: u8) -> Option<Decimal> {
        self.rates.get(rate_index as usize).copied()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PoolConfig::default().validate().is_ok());
    }

    #[test]
    fn duration_index_picks_shortest_covering() {
        let config = PoolConfig::default();
        assert_eq!(config.duration_index(7 * 86_400), Some(2));
        assert_eq!(config.duration_index(86_400), Some(2));
        assert_eq!(config.duration_index(8 * 86_400), Some(1));
        assert_eq!(config.duration_index(30 * 86_400), Some(0));
        assert_eq!(config.duration_index(31 * 86_400), None);
    }

    #[test]
    fn rejects_ascending_durations() {
        let config = PoolConfig {
            durations: vec![7 * 86_400, 30 * 86_400],
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidDurations));
    }

    #[test]
    fn rejects_fee_rate_of_one() {
        let config = PoolConfig {
            admin_fee_rate: Decimal::ONE,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAdminFeeRate(_))
        ));
    }

    #[test]
    fn from_json_fills_defaults() {
        let config = PoolConfig::from_json(r#"{ "admin_fee_rate": "0.05" }"#)
            .expect("test: partial config should parse");
        assert_eq!(config.admin_fee_rate, dec!(0.05));
        assert_eq!(config.durations, PoolConfig::default().durations);
    }

    #[test]
    fn from_json_rejects_garbage() {
        let err = PoolConfig::from_json("not json");
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }
}
