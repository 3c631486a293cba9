// Per-Step JSONL Time Series Recorder
// Outputs one JSON line per step for independent analysis

use serde::Serialize;
use std::io::Write;
use tick_pool::{Amount, Pool};

use crate::metrics::utilization_pct;

#[derive(Debug, Serialize)]
pub struct StepSnapshot {
    pub step: u64,
    pub timestamp: u64,
    pub cash: f64,
    pub unclaimed: f64,
    pub admin_fee_balance: f64,
    pub total_value: f64,
    pub total_available: f64,
    pub total_pending: f64,
    pub queued_redemption_shares: f64,
    pub utilization_pct: f64,
    pub node_count: usize,
    pub open_loans: usize,
    pub conservation_clean: bool,
}

impl StepSnapshot {
    pub fn from_pool(pool: &Pool, step: u64, timestamp: u64, open_loans: usize, conservation_clean: bool) -> Self {
        let mut value = Amount::ZERO;
        let mut available = Amount::ZERO;
        let mut pending = Amount::ZERO;
        let mut redemptions = Amount::ZERO;
        let mut node_count = 0;
        for (_, node) in pool.liquidity_nodes(..) {
            value += node.value;
            available += node.available;
            pending += node.pending;
            redemptions += node.redemptions;
            node_count += 1;
        }

        Self {
            step,
            timestamp,
            cash: pool.cash().to_f64(),
            unclaimed: pool.state().unclaimed().to_f64(),
            admin_fee_balance: pool.admin_fee_balance().to_f64(),
            total_value: value.to_f64(),
            total_available: available.to_f64(),
            total_pending: pending.to_f64(),
            queued_redemption_shares: redemptions.to_f64(),
            utilization_pct: utilization_pct(pool),
            node_count,
            open_loans,
            conservation_clean,
        }
    }
}

/// Time series recorder that accumulates snapshots and writes JSONL
pub struct TimeSeriesRecorder {
    snapshots: Vec<StepSnapshot>,
}

impl TimeSeriesRecorder {
    pub fn new() -> Self {
        Self { snapshots: Vec::new() }
    }

    pub fn record(&mut self, snapshot: StepSnapshot) {
        self.snapshots.push(snapshot);
    }

    /// Write all snapshots to a JSONL file
    pub fn write_jsonl(&self, path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(path)?;
        for snapshot in &self.snapshots {
            let line = serde_json::to_string(snapshot)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }
}
