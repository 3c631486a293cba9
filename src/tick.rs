// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Tick encoding.
//!
//! A tick packs the economic terms a depositor accepts into one totally
//! ordered `u128` key:
//!
//! ```text
//! +-----------------------------+----------+------+----------+
//! |        limit (120)          | dur. (3) | rate | rsvd (2) |
//! +-----------------------------+----------+------+----------+
//! ```
//!
//! `limit` is expressed in 10^-18 units. Because it occupies the high bits,
//! numeric order of the key is ordering by limit first.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::PoolConfig;
use crate::types::Amount;

const LIMIT_SHIFT: u32 = 8;
const DURATION_SHIFT: u32 = 5;
const RATE_SHIFT: u32 = 2;
const INDEX_MASK: u128 = 0x7;
const RESERVED_MASK: u128 = 0x3;
const LIMIT_MAX: u128 = (1u128 << 120) - 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TickError {
    #[error("limit is zero or out of range")]
    InvalidLimit,

    #[error("duration index {0} out of range")]
    InvalidDuration(u8),

    #[error("rate index {0} out of range")]
    InvalidRate(u8),

    #[error("reserved bits set")]
    ReservedBits,

    #[error("tick path not strictly increasing")]
    NotIncreasing,

    #[error("tick duration shorter than loan duration")]
    DurationTooShort,
}

// ---------------------------------------------------------------------------
// Tick
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tick(pub u128);

/// Decoded fields of a [`Tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickTerms {
    pub limit: Amount,
    pub duration_index: u8,
    pub rate_index: u8,
}

impl Tick {
    /// Encode a tick. Only the bit widths are checked here; use
    /// [`Tick::validate`] against a pool's configuration.
    pub fn encode(limit: Amount, duration_index: u8, rate_index: u8) -> Result<Self, TickError> {
        let wad = limit.to_wad().ok_or(TickError::InvalidLimit)?;
        if wad == 0 || wad > LIMIT_MAX {
            return Err(TickError::InvalidLimit);
        }
        if duration_index as u128 > INDEX_MASK {
            return Err(TickError::InvalidDuration(duration_index));
        }
        if rate_index as u128 > INDEX_MASK {
            return Err(TickError::InvalidRate(rate_index));
        }
        Ok(Tick(
            (wad << LIMIT_SHIFT)
                | ((duration_index as u128) << DURATION_SHIFT)
                | ((rate_index as u128) << RATE_SHIFT),
        ))
    }

    pub fn raw(&self) -> u128 {
        self.0
    }

    pub fn limit_wad(&self) -> u128 {
        self.0 >> LIMIT_SHIFT
    }

    pub fn duration_index(&self) -> u8 {
        ((self.0 >> DURATION_SHIFT) & INDEX_MASK) as u8
    }

    pub fn rate_index(&self) -> u8 {
        ((self.0 >> RATE_SHIFT) & INDEX_MASK) as u8
    }

    /// Decode into terms, failing on a zero/unrepresentable limit or
    /// reserved bits.
    pub fn decode(&self) -> Result<TickTerms, TickError> {
        if self.0 & RESERVED_MASK != 0 {
            return Err(TickError::ReservedBits);
        }
        let wad = self.limit_wad();
        if wad == 0 {
            return Err(TickError::InvalidLimit);
        }
        let limit = Amount::from_wad(wad).ok_or(TickError::InvalidLimit)?;
        Ok(TickTerms {
            limit,
            duration_index: self.duration_index(),
            rate_index: self.rate_index(),
        })
    }

    /// Decode and check the indices against the pool's term tables.
    pub fn validate(&self, config: &PoolConfig) -> Result<TickTerms, TickError> {
        let terms = self.decode()?;
        if terms.duration_index as usize >= config.durations.len() {
            return Err(TickError::InvalidDuration(terms.duration_index));
        }
        if terms.rate_index as usize >= config.rates.len() {
            return Err(TickError::InvalidRate(terms.rate_index));
        }
        Ok(terms)
    }

    /// Validate a borrower-supplied path: strictly increasing, every tick
    /// valid and long enough for a loan at `loan_duration_index`.
    pub fn validate_path(
        ticks: &[Tick],
        loan_duration_index: u8,
        config: &PoolConfig,
    ) -> Result<Vec<TickTerms>, TickError> {
        let mut terms = Vec::with_capacity(ticks.len());
        for (i, tick) in ticks.iter().enumerate() {
            if i > 0 && *tick <= ticks[i - 1] {
                return Err(TickError::NotIncreasing);
            }
            let t = tick.validate(config)?;
            if t.duration_index > loan_duration_index {
                return Err(TickError::DurationTooShort);
            }
            terms.push(t);
        }
        Ok(terms)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Amount::from_wad(self.limit_wad()) {
            Some(limit) => write!(
                f,
                "{}/{}/{}",
                limit,
                self.duration_index(),
                self.rate_index()
            ),
            None => write!(f, "{:#x}", self.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn encode_decode_fields() {
        let tick = Tick::encode(Amount(dec!(12.5)), 2, 1).expect("test: valid tick");
        let terms = tick.decode().expect("test: decodes");
        assert_eq!(terms.limit, Amount(dec!(12.5)));
        assert_eq!(terms.duration_index, 2);
        assert_eq!(terms.rate_index, 1);
    }

    #[test]
    fn ordering_is_limit_first() {
        let low = Tick::encode(Amount::from_units(10), 7, 7).expect("test: valid");
        let high = Tick::encode(Amount::from_units(11), 0, 0).expect("test: valid");
        assert!(low < high);

        let a = Tick::encode(Amount::from_units(10), 0, 1).expect("test: valid");
        let b = Tick::encode(Amount::from_units(10), 1, 0).expect("test: valid");
        assert!(a < b, "same limit orders by duration index");
    }

    #[test]
    fn zero_limit_rejected() {
        assert_eq!(
            Tick::encode(Amount::ZERO, 0, 0),
            Err(TickError::InvalidLimit)
        );
        assert_eq!(Tick(0).decode(), Err(TickError::InvalidLimit));
    }

    #[test]
    fn limit_beyond_wad_range_rejected() {
        assert_eq!(
            Tick::encode(Amount::from_units(100_000_000_000), 0, 0),
            Err(TickError::InvalidLimit)
        );
        let max = Tick::encode(Amount::MAX, 0, 0).expect("test: largest limit encodes");
        assert_eq!(max.decode().expect("test: decodes").limit, Amount::MAX);
    }

    #[test]
    fn reserved_bits_rejected() {
        let tick = Tick::encode(Amount::ONE, 0, 0).expect("test: valid");
        assert_eq!(Tick(tick.0 | 1).decode(), Err(TickError::ReservedBits));
    }

    #[test]
    fn validate_checks_config_bounds() {
        let config = PoolConfig::default();
        let bad_duration = Tick::encode(Amount::ONE, 3, 0).expect("test: encodes");
        assert_eq!(
            bad_duration.validate(&config),
            Err(TickError::InvalidDuration(3))
        );
        let bad_rate = Tick::encode(Amount::ONE, 0, 5).expect("test: encodes");
        assert_eq!(bad_rate.validate(&config), Err(TickError::InvalidRate(5)));
    }

    #[test]
    fn path_must_increase() {
        let config = PoolConfig::default();
        let a = Tick::encode(Amount::from_units(10), 0, 0).expect("test: valid");
        let b = Tick::encode(Amount::from_units(20), 0, 0).expect("test: valid");
        assert!(Tick::validate_path(&[a, b], 2, &config).is_ok());
        assert_eq!(
            Tick::validate_path(&[b, a], 2, &config),
            Err(TickError::NotIncreasing)
        );
        assert_eq!(
            Tick::validate_path(&[a, a], 2, &config),
            Err(TickError::NotIncreasing)
        );
    }

    #[test]
    fn short_duration_tick_cannot_fund_long_loan() {
        let config = PoolConfig::default();
        // Index 2 is the 7 day duration; a 30 day loan has index 0.
        let short = Tick::encode(Amount::from_units(10), 2, 0).expect("test: valid");
        assert_eq!(
            Tick::validate_path(&[short], 0, &config),
            Err(TickError::DurationTooShort)
        );
        assert!(Tick::validate_path(&[short], 2, &config).is_ok());
    }
}
