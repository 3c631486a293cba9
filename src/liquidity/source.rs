// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Greedy loan sourcing along a borrower-supplied tick path.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Ledger;
use crate::error::PoolError;
use crate::tick::{Tick, TickTerms};
use crate::types::Amount;

/// Principal drawn from one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSource {
    pub tick: Tick,
    pub used: Amount,
}

impl Ledger {
    /// Source `principal` from `ticks` in order.
    ///
    /// A tick's limit caps the cumulative principal drawn up to and including
    /// it, so each tick contributes at most `limit - taken`. Ticks with no
    /// node are skipped; an impaired or insolvent node fails the whole path.
    pub fn source(
        &self,
        principal: Amount,
        ticks: &[Tick],
        terms: &[TickTerms],
        impaired_threshold: Decimal,
    ) -> Result<Vec<NodeSource>, PoolError> {
        let mut sources = Vec::new();
        let mut taken = Amount::ZERO;

        for (tick, t) in ticks.iter().zip(terms) {
            if taken == principal {
                break;
            }
            let Some(node) = self.nodes.get(tick) else {
                continue;
            };
            if !node.is_active(impaired_threshold) {
                return Err(PoolError::InactiveLiquidity);
            }

            let take = t
                .limit
                .saturating_sub(taken)
                .min(node.available)
                .min(principal - taken);
            if take.is_zero() {
                continue;
            }

            sources.push(NodeSource {
                tick: *tick,
                used: take,
            });
            taken += take;
        }

        if taken < principal {
            return Err(PoolError::InsufficientLiquidity);
        }
        Ok(sources)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn funded(ledger: &mut Ledger, limit: u64, amount: u64) -> (Tick, TickTerms) {
        let tick = Tick::encode(Amount::from_units(limit), 0, 0).expect("test: valid");
        let terms = tick.decode().expect("test: decodes");
        ledger.insert(tick, &terms, dec!(0.1)).expect("test: insert");
        ledger.add(tick, Amount::from_units(amount), Amount::from_units(amount));
        (tick, terms)
    }

    #[test]
    fn limits_cap_cumulative_principal() {
        let mut ledger = Ledger::new();
        let (t10, terms10) = funded(&mut ledger, 10, 50);
        let (t20, terms20) = funded(&mut ledger, 20, 50);
        let (t30, terms30) = funded(&mut ledger, 30, 50);

        let sources = ledger
            .source(
                Amount::from_units(25),
                &[t10, t20, t30],
                &[terms10, terms20, terms30],
                dec!(0.05),
            )
            .expect("test: sources");

        let used: Vec<Amount> = sources.iter().map(|s| s.used).collect();
        assert_eq!(
            used,
            vec![
                Amount::from_units(10),
                Amount::from_units(10),
                Amount::from_units(5)
            ]
        );
    }

    #[test]
    fn available_cash_caps_each_tick() {
        let mut ledger = Ledger::new();
        let (t10, terms10) = funded(&mut ledger, 10, 3);
        let (t20, terms20) = funded(&mut ledger, 20, 50);

        let sources = ledger
            .source(
                Amount::from_units(15),
                &[t10, t20],
                &[terms10, terms20],
                dec!(0.05),
            )
            .expect("test: sources");
        assert_eq!(sources[0].used, Amount::from_units(3));
        assert_eq!(sources[1].used, Amount::from_units(12));
    }

    #[test]
    fn missing_ticks_are_skipped() {
        let mut ledger = Ledger::new();
        let ghost = Tick::encode(Amount::from_units(5), 0, 0).expect("test: valid");
        let ghost_terms = ghost.decode().expect("test: decodes");
        let (t20, terms20) = funded(&mut ledger, 20, 50);

        let sources = ledger
            .source(
                Amount::from_units(8),
                &[ghost, t20],
                &[ghost_terms, terms20],
                dec!(0.05),
            )
            .expect("test: sources");
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].tick, t20);
    }

    #[test]
    fn insufficient_liquidity() {
        let mut ledger = Ledger::new();
        let (t10, terms10) = funded(&mut ledger, 10, 50);
        let err = ledger.source(Amount::from_units(11), &[t10], &[terms10], dec!(0.05));
        assert!(matches!(err, Err(PoolError::InsufficientLiquidity)));
    }

    #[test]
    fn inactive_tick_fails_path() {
        let mut ledger = Ledger::new();
        let (t10, terms10) = funded(&mut ledger, 10, 10);
        ledger.use_liquidity(t10, Amount::from_units(10), Amount::from_units(10));
        ledger.restore(t10, Amount::from_units(10), Amount::from_units(10), Amount::ZERO);
        let (t20, terms20) = funded(&mut ledger, 20, 50);

        let err = ledger.source(
            Amount::from_units(5),
            &[t10, t20],
            &[terms10, terms20],
            dec!(0.05),
        );
        assert!(matches!(err, Err(PoolError::InactiveLiquidity)));
    }
}
