// Benchmark Report Types
// Structured output for independent analysis of pool accounting under load

use serde::Serialize;

// ─── Statistics (per-metric Monte Carlo aggregation) ────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub mean: f64,
    pub std_dev: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub min: f64,
    pub max: f64,
    pub n: usize,
}

impl Stats {
    pub fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self { mean: 0.0, std_dev: 0.0, ci_lower: 0.0, ci_upper: 0.0, min: 0.0, max: 0.0, n: 0 };
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let variance = if n > 1 {
            samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };
        let std_dev = variance.sqrt();
        let stderr = std_dev / (n as f64).sqrt();
        let z = 1.96; // 95% CI
        Self {
            mean,
            std_dev,
            ci_lower: mean - z * stderr,
            ci_upper: mean + z * stderr,
            min: samples.iter().cloned().fold(f64::INFINITY, f64::min),
            max: samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            n,
        }
    }
}

// ─── Single-Run Result ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct BenchResult {
    pub scenario: String,
    pub name: String,
    pub category: String,
    pub seed: u64,
    pub pass: bool,
    pub steps: u64,
    pub action_count: u32,
    pub revert_count: u32,
    pub deposit_count: u32,
    pub borrows_attempted: u32,
    pub borrows_filled: u32,
    pub borrow_fill_rate: f64,
    pub repaid_count: u32,
    pub liquidated_count: u32,
    pub principal_originated: f64,
    pub interest_earned: f64,
    pub admin_fees: f64,
    pub liquidation_shortfall: f64,
    pub borrower_surplus: f64,
    pub conservation_checks: u64,
    pub conservation_violations: u64,
    pub share_price_drops: u32,
    pub peak_utilization_pct: f64,
    pub mean_utilization_pct: f64,
    pub residual_unclaimed: f64,
    pub full_exit: bool,
    pub elapsed_ms: u128,
    pub throughput_per_sec: f64,
}

// ─── Monte Carlo Report (per-scenario aggregation) ──────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct MonteCarloReport {
    pub scenario_name: String,
    pub label: String,
    pub category: String,
    pub n_runs: usize,
    pub pass_rate: f64,
    pub borrow_fill_rate: Stats,
    pub principal_originated: Stats,
    pub interest_earned: Stats,
    pub admin_fees: Stats,
    pub liquidation_shortfall: Stats,
    pub conservation_violations: Stats,
    pub share_price_drops: Stats,
    pub peak_utilization_pct: Stats,
    pub residual_unclaimed: Stats,
    pub elapsed_ms: Stats,
    pub throughput_per_sec: Stats,
    pub individual_runs: Vec<BenchResult>,
}

// ─── Invariant Validation Summary ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct InvariantValidation {
    /// No conservation violation in any run of any scenario.
    pub conservation_clean: bool,
    /// No share price decrease in any scenario without defaults.
    pub share_price_monotone: bool,
    /// Every drained scenario ended with an empty redemption queue.
    pub full_exit: bool,
    pub total_conservation_checks: u64,
}

impl InvariantValidation {
    pub fn all_pass(&self) -> bool {
        self.conservation_clean && self.share_price_monotone && self.full_exit
    }
}

// ─── Top-Level Report ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct BenchReport {
    pub timestamp: String,
    pub version: &'static str,
    pub prng: &'static str,
    pub n_runs_per_scenario: usize,
    pub summary: Summary,
    pub invariant_validation: InvariantValidation,
    pub scenarios: Vec<MonteCarloReport>,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_of_constant_samples_have_no_spread() {
        let stats = Stats::from_samples(&[2.0, 2.0, 2.0]);
        assert_eq!(stats.mean, 2.0);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.ci_lower, stats.ci_upper);
        assert_eq!(stats.n, 3);
    }

    #[test]
    fn stats_of_no_samples_are_zero() {
        let stats = Stats::from_samples(&[]);
        assert_eq!(stats.n, 0);
        assert_eq!(stats.mean, 0.0);
    }
}
