// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Primitive value types shared by the ledger, the receipt codec and the
//! pool: account addresses, collateral token ids, receipt hashes and the
//! 18-decimal fixed-point [`Amount`].

use num_traits::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// 20-byte account or token contract address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Deterministic test/bench address whose last byte is `n`.
    pub fn from_low_u64(n: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&n.to_be_bytes());
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Parse a `0x`-prefixed (or bare) 40 character hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = parse_hex(s.trim_start_matches("0x"))?;
        let array: [u8; 20] = bytes.try_into().ok()?;
        Some(Self(array))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TokenId
// ---------------------------------------------------------------------------

/// Collateral token id (u256, big-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TokenId(pub [u8; 32]);

impl TokenId {
    pub fn new(data: [u8; 32]) -> Self {
        Self(data)
    }
}

impl From<u64> for TokenId {
    fn from(n: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&n.to_be_bytes());
        Self(bytes)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = self.0.iter().position(|b| *b != 0).unwrap_or(31);
        write!(f, "0x")?;
        for byte in &self.0[first..] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ReceiptHash
// ---------------------------------------------------------------------------

/// Keccak-256 digest of an encoded loan receipt; the loan's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReceiptHash(pub [u8; 32]);

impl ReceiptHash {
    pub fn new(data: [u8; 32]) -> Self {
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ReceiptHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "...")
    }
}

/// Lowercase hex without prefix.
pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub(crate) fn parse_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// Number of decimal places every stored amount is quantized to.
pub const AMOUNT_DECIMALS: u32 = 18;

/// 18-decimal fixed-point quantity used for currency and shares.
///
/// Arithmetic through `+`/`-` is exact. Anything involving a product or a
/// quotient goes through [`Amount::mul_div_down`] / [`Amount::mul_div_up`]
/// (or the `round_*` constructors) so the rounding direction is always
/// chosen explicitly: down for amounts paid out of the pool, up for amounts
/// owed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Amount(pub Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);
    pub const ONE: Amount = Amount(Decimal::ONE);
    /// Largest amount with an exact wad representation: a full 96-bit
    /// mantissa at 18 decimal places (about 7.9e10).
    pub const MAX: Amount = Amount(Decimal::from_parts(u32::MAX, u32::MAX, u32::MAX, false, AMOUNT_DECIMALS));

    /// Smallest representable unit (10^-18).
    pub fn unit() -> Self {
        Self(Decimal::new(1, AMOUNT_DECIMALS))
    }

    /// Quantize rounding toward zero.
    pub fn round_down(d: Decimal) -> Self {
        Self(d.round_dp_with_strategy(AMOUNT_DECIMALS, RoundingStrategy::ToZero))
    }

    /// Quantize rounding away from zero.
    pub fn round_up(d: Decimal) -> Self {
        Self(d.round_dp_with_strategy(AMOUNT_DECIMALS, RoundingStrategy::AwayFromZero))
    }

    /// Whole units, e.g. `Amount::from_units(10)` is 10.0.
    pub fn from_units(n: u64) -> Self {
        Self(Decimal::from(n))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// True when the amount fits the receipt and tick encodings.
    pub fn is_representable(&self) -> bool {
        !self.0.is_sign_negative() && *self <= Amount::MAX
    }

    /// `self * num / den`, rounded down. Zero when `den` is zero.
    pub fn mul_div_down(self, num: Amount, den: Amount) -> Amount {
        if den.is_zero() {
            return Amount::ZERO;
        }
        Amount::round_down(mul_div(self.0, num.0, den.0))
    }

    /// `self * num / den`, rounded up. Zero when `den` is zero.
    pub fn mul_div_up(self, num: Amount, den: Amount) -> Amount {
        if den.is_zero() {
            return Amount::ZERO;
        }
        Amount::round_up(mul_div(self.0, num.0, den.0))
    }

    pub fn saturating_sub(self, rhs: Amount) -> Amount {
        if rhs.0 >= self.0 {
            Amount::ZERO
        } else {
            Amount(self.0 - rhs.0)
        }
    }

    pub fn min(self, other: Amount) -> Amount {
        if self <= other { self } else { other }
    }

    pub fn max(self, other: Amount) -> Amount {
        if self >= other { self } else { other }
    }

    /// Integer count of 10^-18 units; `None` for negative values and for
    /// values too large to carry 18 decimal places.
    pub fn to_wad(&self) -> Option<u128> {
        let mut d = self.0;
        d.rescale(AMOUNT_DECIMALS);
        if d.scale() != AMOUNT_DECIMALS {
            return None;
        }
        u128::try_from(d.mantissa()).ok()
    }

    /// Inverse of [`Amount::to_wad`]; `None` when the value does not fit the
    /// decimal mantissa.
    pub fn from_wad(wad: u128) -> Option<Self> {
        let mantissa = i128::try_from(wad).ok()?;
        Decimal::try_from_i128_with_scale(mantissa, AMOUNT_DECIMALS)
            .ok()
            .map(|d| Self(d.normalize()))
    }

    /// Lossy conversion for reporting.
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }
}

/// `a * b / c` without overflowing on the intermediate product. Falls back
/// to dividing first when the product exceeds the decimal range, and
/// saturates when even the quotient does not fit.
fn mul_div(a: Decimal, b: Decimal, c: Decimal) -> Decimal {
    a.checked_mul(b)
        .and_then(|p| p.checked_div(c))
        .or_else(|| a.checked_div(c).and_then(|q| q.checked_mul(b)))
        .unwrap_or(Decimal::MAX)
}

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + *a)
    }
}

impl From<Decimal> for Amount {
    fn from(d: Decimal) -> Self {
        Amount::round_down(d)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Caller and block timestamp an operation executes under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub caller: Address,
    /// Unix seconds.
    pub timestamp: u64,
}

impl Context {
    pub fn new(caller: Address, timestamp: u64) -> Self {
        Self { caller, timestamp }
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
    fn rounding_directions() {
        let third = dec!(1) / dec!(3);
        assert_eq!(Amount::round_down(third).0, dec!(0.333333333333333333));
        assert_eq!(Amount::round_up(third).0, dec!(0.333333333333333334));
    }

    #[test]
    fn mul_div_by_zero_is_zero() {
        let a = Amount::from_units(5);
        assert_eq!(a.mul_div_down(Amount::ONE, Amount::ZERO), Amount::ZERO);
        assert_eq!(a.mul_div_up(Amount::ONE, Amount::ZERO), Amount::ZERO);
    }

    #[test]
    fn wad_conversion() {
        let a = Amount(dec!(1.5));
        assert_eq!(a.to_wad(), Some(1_500_000_000_000_000_000));
        assert_eq!(Amount::from_wad(1_500_000_000_000_000_000), Some(a));
        assert_eq!(Amount::unit().to_wad(), Some(1));
        assert_eq!(Amount(dec!(-1)).to_wad(), None);
        assert_eq!(Amount::from_wad(u128::MAX), None);
    }

    #[test]
    fn wad_conversion_refuses_values_without_18_places() {
        let large = Amount::from_units(100_000_000_000);
        assert!(!large.is_representable());
        assert_eq!(large.to_wad(), None);

        assert!(Amount::MAX.is_representable());
        let wad = Amount::MAX.to_wad().expect("test: max fits");
        assert_eq!(Amount::from_wad(wad), Some(Amount::MAX));
        assert_eq!(Amount::from_wad(wad + 1), None);
    }

    #[test]
    fn mul_div_survives_large_intermediate_products() {
        let big = Amount::from_units(1_000_000_000_000_000);
        assert_eq!(big.mul_div_down(big, big), big);
        assert_eq!(big.mul_div_up(Amount::from_units(3), Amount::from_units(3)), big);
    }

    #[test]
    fn saturating_sub_floors_at_zero() {
        let a = Amount::from_units(1);
        let b = Amount::from_units(2);
        assert_eq!(a.saturating_sub(b), Amount::ZERO);
        assert_eq!(b.saturating_sub(a), Amount::ONE);
    }

    #[test]
    fn address_hex_round_trip() {
        let a = Address::from_low_u64(0xabcd);
        let parsed = Address::from_hex(&a.to_string()).expect("test: valid hex");
        assert_eq!(parsed, a);
        assert!(Address::from_hex("0x1234").is_none());
        assert!(Address::ZERO.is_zero());
    }

    #[test]
    fn token_id_display_trims_leading_zeroes() {
        assert_eq!(TokenId::from(255).to_string(), "0xff");
    }
}
