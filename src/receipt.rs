// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Loan receipt codec.
//!
//! A receipt is the borrower-held proof of a loan's terms. Its canonical
//! big-endian encoding is hashed with Keccak-256 to give the loan's identity:
//!
//! ```text
//! offset  size  field
//!      0     1  version
//!      1    32  principal            (u256, wad)
//!     33    32  repayment            (u256, wad)
//!     65    32  admin_fee            (u256, wad)
//!     97    20  borrower
//!    117     8  maturity             (u64, unix seconds)
//!    125     8  duration             (u64, seconds)
//!    133    20  collateral_token
//!    153    32  collateral_token_id
//!    185     2  context length N     (u16)
//!    187     N  collateral wrapper context
//!  187+N  96*k  node receipts {tick, used, pending}, each u256
//! ```

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::tick::Tick;
use crate::types::{Address, Amount, ReceiptHash, TokenId};

pub const LOAN_RECEIPT_VERSION: u8 = 2;

const HEADER_SIZE: usize = 187;
const NODE_RECEIPT_SIZE: usize = 96;
const WORD: usize = 32;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReceiptError {
    #[error("receipt too short: {0} bytes")]
    TooShort(usize),

    #[error("unsupported receipt version {0}")]
    UnsupportedVersion(u8),

    #[error("collateral context overruns receipt")]
    ContextOverrun,

    #[error("collateral context of {0} bytes exceeds u16")]
    ContextTooLong(usize),

    #[error("node receipt section of {0} bytes is not a multiple of 96")]
    MalformedNodeReceipts(usize),

    #[error("receipt has no node receipts")]
    NoNodeReceipts,

    #[error("value does not fit a wad amount")]
    ValueTooLarge,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Liquidity one tick contributed to a loan and what it expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReceipt {
    pub tick: Tick,
    pub used: Amount,
    pub pending: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanReceipt {
    pub version: u8,
    pub principal: Amount,
    pub repayment: Amount,
    pub admin_fee: Amount,
    pub borrower: Address,
    pub maturity: u64,
    pub duration: u64,
    pub collateral_token: Address,
    pub collateral_token_id: TokenId,
    pub collateral_wrapper_context: Vec<u8>,
    pub node_receipts: Vec<NodeReceipt>,
}

impl LoanReceipt {
    /// Unix time the loan was originated.
    pub fn origination(&self) -> u64 {
        self.maturity.saturating_sub(self.duration)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ReceiptError> {
        let context_len = u16::try_from(self.collateral_wrapper_context.len())
            .map_err(|_| ReceiptError::ContextTooLong(self.collateral_wrapper_context.len()))?;

        let mut buf = Vec::with_capacity(
            HEADER_SIZE
                + self.collateral_wrapper_context.len()
                + NODE_RECEIPT_SIZE * self.node_receipts.len(),
        );
        buf.push(self.version);
        put_amount(&mut buf, self.principal)?;
        put_amount(&mut buf, self.repayment)?;
        put_amount(&mut buf, self.admin_fee)?;
        buf.extend_from_slice(&self.borrower.0);
        buf.extend_from_slice(&self.maturity.to_be_bytes());
        buf.extend_from_slice(&self.duration.to_be_bytes());
        buf.extend_from_slice(&self.collateral_token.0);
        buf.extend_from_slice(&self.collateral_token_id.0);
        buf.extend_from_slice(&context_len.to_be_bytes());
        buf.extend_from_slice(&self.collateral_wrapper_context);

        for node in &self.node_receipts {
            put_word(&mut buf, node.tick.raw());
            put_amount(&mut buf, node.used)?;
            put_amount(&mut buf, node.pending)?;
        }
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ReceiptError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ReceiptError::TooShort(bytes.len()));
        }
        let mut r = Reader { bytes, pos: 0 };

        let version = r.take(1)?[0];
        if version != LOAN_RECEIPT_VERSION {
            return Err(ReceiptError::UnsupportedVersion(version));
        }
        let principal = r.amount()?;
        let repayment = r.amount()?;
        let admin_fee = r.amount()?;
        let borrower = Address(r.array()?);
        let maturity = u64::from_be_bytes(r.array()?);
        let duration = u64::from_be_bytes(r.array()?);
        let collateral_token = Address(r.array()?);
        let collateral_token_id = TokenId(r.array()?);
        let context_len = u16::from_be_bytes(r.array()?) as usize;
        let collateral_wrapper_context = r
            .take(context_len)
            .map_err(|_| ReceiptError::ContextOverrun)?
            .to_vec();

        let rest = bytes.len() - r.pos;
        if rest % NODE_RECEIPT_SIZE != 0 {
            return Err(ReceiptError::MalformedNodeReceipts(rest));
        }
        if rest == 0 {
            return Err(ReceiptError::NoNodeReceipts);
        }

        let mut node_receipts = Vec::with_capacity(rest / NODE_RECEIPT_SIZE);
        while r.pos < bytes.len() {
            node_receipts.push(NodeReceipt {
                tick: Tick(r.word()?),
                used: r.amount()?,
                pending: r.amount()?,
            });
        }

        Ok(Self {
            version,
            principal,
            repayment,
            admin_fee,
            borrower,
            maturity,
            duration,
            collateral_token,
            collateral_token_id,
            collateral_wrapper_context,
            node_receipts,
        })
    }

    /// Keccak-256 of the canonical encoding.
    pub fn hash(&self) -> Result<ReceiptHash, ReceiptError> {
        Ok(hash_bytes(&self.encode()?))
    }
}

/// Keccak-256 of already encoded receipt bytes.
pub fn hash_bytes(encoded: &[u8]) -> ReceiptHash {
    let digest = Keccak256::digest(encoded);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    ReceiptHash(out)
}

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

fn put_word(buf: &mut Vec<u8>, value: u128) {
    buf.extend_from_slice(&[0u8; 16]);
    buf.extend_from_slice(&value.to_be_bytes());
}

fn put_amount(buf: &mut Vec<u8>, amount: Amount) -> Result<(), ReceiptError> {
    let wad = amount.to_wad().ok_or(ReceiptError::ValueTooLarge)?;
    put_word(buf, wad);
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], ReceiptError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(ReceiptError::TooShort(self.bytes.len()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ReceiptError> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    /// A u256 word whose value must fit in 128 bits.
    fn word(&mut self) -> Result<u128, ReceiptError> {
        let word: [u8; WORD] = self.array()?;
        if word[..16].iter().any(|b| *b != 0) {
            return Err(ReceiptError::ValueTooLarge);
        }
        let mut low = [0u8; 16];
        low.copy_from_slice(&word[16..]);
        Ok(u128::from_be_bytes(low))
    }

    fn amount(&mut self) -> Result<Amount, ReceiptError> {
        Amount::from_wad(self.word()?).ok_or(ReceiptError::ValueTooLarge)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> LoanReceipt {
        let t1 = Tick::encode(Amount::from_units(10), 0, 0).expect("test: valid");
        let t2 = Tick::encode(Amount::from_units(20), 0, 1).expect("test: valid");
        LoanReceipt {
            version: LOAN_RECEIPT_VERSION,
            principal: Amount::from_units(15),
            repayment: Amount(dec!(15.25)),
            admin_fee: Amount(dec!(0.01)),
            borrower: Address::from_low_u64(7),
            maturity: 1_700_000_000,
            duration: 30 * 86_400,
            collateral_token: Address::from_low_u64(99),
            collateral_token_id: TokenId::from(123),
            collateral_wrapper_context: vec![0xde, 0xad],
            node_receipts: vec![
                NodeReceipt {
                    tick: t1,
                    used: Amount::from_units(10),
                    pending: Amount(dec!(10.08)),
                },
                NodeReceipt {
                    tick: t2,
                    used: Amount::from_units(5),
                    pending: Amount(dec!(5.16)),
                },
            ],
        }
    }

    #[test]
    fn layout_and_round_trip() {
        let receipt = sample();
        let bytes = receipt.encode().expect("test: encodes");
        assert_eq!(bytes.len(), HEADER_SIZE + 2 + 2 * NODE_RECEIPT_SIZE);
        assert_eq!(bytes[0], LOAN_RECEIPT_VERSION);
        // principal: 15e18 in the low 16 bytes of the first word
        assert_eq!(&bytes[1..17], &[0u8; 16]);
        assert_eq!(
            u128::from_be_bytes(bytes[17..33].try_into().expect("test: 16 bytes")),
            15_000_000_000_000_000_000
        );
        assert_eq!(&bytes[185..187], &[0, 2]);

        let decoded = LoanReceipt::decode(&bytes).expect("test: decodes");
        assert_eq!(decoded, receipt);
        assert_eq!(decoded.encode().expect("test: encodes"), bytes);
    }

    #[test]
    fn hash_changes_with_any_field() {
        let a = sample();
        let mut b = sample();
        b.maturity += 1;
        assert_ne!(
            a.hash().expect("test: hash"),
            b.hash().expect("test: hash")
        );
        assert_eq!(
            a.hash().expect("test: hash"),
            hash_bytes(&a.encode().expect("test: encodes"))
        );
    }

    #[test]
    fn rejects_truncated_and_padded_input() {
        let bytes = sample().encode().expect("test: encodes");
        assert_eq!(
            LoanReceipt::decode(&bytes[..100]),
            Err(ReceiptError::TooShort(100))
        );
        assert_eq!(
            LoanReceipt::decode(&bytes[..bytes.len() - 1]),
            Err(ReceiptError::MalformedNodeReceipts(2 * NODE_RECEIPT_SIZE - 1))
        );
        let mut padded = bytes.clone();
        padded.push(0);
        assert!(matches!(
            LoanReceipt::decode(&padded),
            Err(ReceiptError::MalformedNodeReceipts(_))
        ));
    }

    #[test]
    fn rejects_wrong_version() {
        let mut bytes = sample().encode().expect("test: encodes");
        bytes[0] = 1;
        assert_eq!(
            LoanReceipt::decode(&bytes),
            Err(ReceiptError::UnsupportedVersion(1))
        );
    }

    #[test]
    fn rejects_context_overrun_and_empty_nodes() {
        let mut receipt = sample();
        receipt.node_receipts.clear();
        let bytes = receipt.encode().expect("test: encodes");
        assert_eq!(
            LoanReceipt::decode(&bytes),
            Err(ReceiptError::NoNodeReceipts)
        );

        let mut bytes = sample().encode().expect("test: encodes");
        bytes[185] = 0xff;
        assert_eq!(
            LoanReceipt::decode(&bytes),
            Err(ReceiptError::ContextOverrun)
        );
    }

    #[test]
    fn rejects_oversized_words() {
        let mut bytes = sample().encode().expect("test: encodes");
        bytes[1] = 1;
        assert_eq!(LoanReceipt::decode(&bytes), Err(ReceiptError::ValueTooLarge));
    }
}
