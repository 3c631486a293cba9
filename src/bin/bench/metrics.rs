// Per-Action Metric Trackers: share price monotonicity and utilization

use std::collections::BTreeMap;

use rust_decimal_macros::dec;
use tick_pool::{Amount, Pool, Tick};

// ─── Share Price Tracker ────────────────────────────────────────────────────

fn rounding_noise() -> Amount {
    Amount(dec!(0.000000000001))
}

/// Watches every tick's share price between actions. Without credit losses
/// a tick's share price never decreases while it has shares outstanding.
/// A tick whose shares reach zero starts over at 1.0 and is forgotten.
/// Decreases within rounding noise are ignored.
pub struct SharePriceTracker {
    last: BTreeMap<Tick, Amount>,
    pub observations: u64,
    pub drops: u32,
    pub worst_drop: f64,
}

impl SharePriceTracker {
    pub fn new() -> Self {
        Self {
            last: BTreeMap::new(),
            observations: 0,
            drops: 0,
            worst_drop: 0.0,
        }
    }

    pub fn observe(&mut self, pool: &Pool) {
        let mut current = BTreeMap::new();
        for (tick, node) in pool.liquidity_nodes(..) {
            if node.shares.is_zero() {
                continue;
            }
            let price = node.share_price();
            if let Some(previous) = self.last.get(tick) {
                if previous.saturating_sub(price) > rounding_noise() {
                    self.drops += 1;
                    self.worst_drop = self.worst_drop.max(previous.to_f64() - price.to_f64());
                    log::debug!("bench: share price of {tick} fell from {previous} to {price}");
                }
            }
            current.insert(*tick, price);
        }
        self.observations += 1;
        self.last = current;
    }
}

// ─── Utilization Tracker ────────────────────────────────────────────────────

/// Fraction of tick value lent out, sampled once per step.
pub struct UtilizationTracker {
    samples: Vec<f64>,
    pub peak: f64,
}

impl UtilizationTracker {
    pub fn new() -> Self {
        Self { samples: Vec::new(), peak: 0.0 }
    }

    pub fn record(&mut self, pool: &Pool) -> f64 {
        let pct = utilization_pct(pool);
        self.peak = self.peak.max(pct);
        self.samples.push(pct);
        pct
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }
}

pub fn utilization_pct(pool: &Pool) -> f64 {
    let (value, lent) = pool
        .liquidity_nodes(..)
        .fold((Amount::ZERO, Amount::ZERO), |(value, lent), (_, node)| {
            (value + node.value, lent + node.value.saturating_sub(node.available))
        });
    if value.is_zero() {
        return 0.0;
    }
    lent.to_f64() / value.to_f64() * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tick_pool::{Address, Context, PoolConfig};

    fn pool_with_deposit() -> (Pool, Tick) {
        let mut pool = Pool::new(PoolConfig::default()).expect("test: pool");
        let tick = Tick::encode(Amount::from_units(10), 0, 0).expect("test: tick");
        let ctx = Context::new(Address::from_low_u64(1), 0);
        pool.deposit(&ctx, tick, Amount::from_units(10), Amount::ZERO)
            .expect("test: deposit");
        (pool, tick)
    }

    #[test]
    fn idle_pool_has_no_utilization() {
        let (pool, _) = pool_with_deposit();
        assert_eq!(utilization_pct(&pool), 0.0);
    }

    #[test]
    fn repeated_observation_is_not_a_drop() {
        let (pool, _) = pool_with_deposit();
        let mut tracker = SharePriceTracker::new();
        tracker.observe(&pool);
        tracker.observe(&pool);
        assert_eq!(tracker.drops, 0);
        assert_eq!(tracker.observations, 2);
    }
}
