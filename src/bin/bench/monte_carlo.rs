// Monte Carlo Infrastructure: N runs per scenario with statistical aggregation
// Each scenario runs N times with seeds base..base+N, computing mean ± 95% CI

use std::collections::BTreeSet;
use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tick_pool::conservation::ConservationAudit;
use tick_pool::{Address, Amount, Context, LoanReceipt, Pool, PoolConfig, PoolError, Tick, TokenId};

use crate::metrics::{SharePriceTracker, UtilizationTracker};
use crate::report::*;
use crate::scenarios::Scenario;
use crate::time_series::{StepSnapshot, TimeSeriesRecorder};
use crate::traffic::{Action, TrafficGenerator};

const START: u64 = 1_700_000_000;
const DAY: u64 = 86_400;

const COLLATERAL: u64 = 0xc011;
const ADMIN: u64 = 0xad;
const LIQUIDATOR: u64 = 0x11;
const KEEPER: u64 = 0x4b;
const DEPOSITOR_BASE: u64 = 1_000;
const BORROWER_BASE: u64 = 2_000;

fn depositor(i: usize) -> Address {
    Address::from_low_u64(DEPOSITOR_BASE + i as u64)
}

fn borrower(i: usize) -> Address {
    Address::from_low_u64(BORROWER_BASE + i as u64)
}

/// Bench amounts carry six decimals.
fn amount(x: f64) -> Amount {
    Decimal::from_f64(x.max(0.0))
        .map(|d| Amount::round_down(d.round_dp(6)))
        .unwrap_or(Amount::ZERO)
}

fn build_ticks(limits: &[u64], config: &PoolConfig) -> Result<Vec<Tick>, PoolError> {
    let mut ticks = BTreeSet::new();
    for &limit in limits {
        for duration_index in 0..config.durations.len() {
            let rate_index = duration_index % config.rates.len();
            ticks.insert(Tick::encode(
                Amount::from_units(limit),
                duration_index as u8,
                rate_index as u8,
            )?);
        }
    }
    Ok(ticks.into_iter().collect())
}

// ─── Run State ──────────────────────────────────────────────────────────────

struct OpenLoan {
    borrower: Address,
    encoded: Vec<u8>,
    receipt: LoanReceipt,
    /// Never repaid; liquidated once past maturity.
    defaults: bool,
}

#[derive(Default)]
struct Counters {
    actions: u32,
    reverts: u32,
    deposits: u32,
    borrows_attempted: u32,
    borrows_filled: u32,
    repaid: u32,
    liquidated: u32,
    principal: f64,
    interest: f64,
    shortfall: f64,
    surplus: f64,
}

struct Runner<'a> {
    scenario: &'a Scenario,
    pool: Pool,
    ticks: Vec<Tick>,
    now: u64,
    next_token_id: u64,
    loans: Vec<OpenLoan>,
    redemptions: Vec<(Address, Tick, u64)>,
    audit: ConservationAudit,
    prices: SharePriceTracker,
    counters: Counters,
}

impl<'a> Runner<'a> {
    fn new(scenario: &'a Scenario) -> Result<Self, PoolError> {
        let config = PoolConfig {
            admin_fee_rate: scenario.admin_fee_rate,
            collateral_tokens: vec![Address::from_low_u64(COLLATERAL)],
            admin: Address::from_low_u64(ADMIN),
            liquidator: Address::from_low_u64(LIQUIDATOR),
            ..Default::default()
        };
        let ticks = build_ticks(scenario.tick_limits, &config)?;
        Ok(Self {
            scenario,
            pool: Pool::new(config)?,
            ticks,
            now: START,
            next_token_id: 1,
            loans: Vec::new(),
            redemptions: Vec::new(),
            audit: ConservationAudit::new(),
            prices: SharePriceTracker::new(),
            counters: Counters::default(),
        })
    }

    fn tick(&self, i: usize) -> Tick {
        self.ticks[i % self.ticks.len()]
    }

    fn repayable(&self) -> usize {
        self.loans.iter().filter(|l| !l.defaults).count()
    }

    fn record(&mut self, what: &str, result: Result<(), PoolError>) {
        self.counters.actions += 1;
        match result {
            Ok(()) => self.prices.observe(&self.pool),
            Err(e) => {
                self.counters.reverts += 1;
                log::debug!("bench: {what} reverted: {e}");
            }
        }
    }

    fn apply(&mut self, action: Action, rng: &mut ChaCha8Rng) {
        let result = match action {
            Action::Deposit { depositor: d, tick, amount: x } => {
                self.deposit(depositor(d), self.tick(tick), amount(x))
            }
            Action::Redeem { depositor: d, tick, fraction } => {
                self.redeem(depositor(d), self.tick(tick), fraction)
            }
            Action::Withdraw { depositor: d, tick } => self.withdraw(depositor(d), self.tick(tick)),
            Action::Borrow { borrower: b, principal, duration_days, path_start } => {
                let defaults = rng.gen::<f64>() < self.scenario.default_probability;
                self.borrow(borrower(b), amount(principal), duration_days * DAY, path_start, defaults)
            }
            Action::Repay { loan } => self.repay_nth(loan),
        };
        self.record("action", result);
    }

    // ─── Depositor Actions ──────────────────────────────────────────────

    fn deposit(&mut self, account: Address, tick: Tick, amount: Amount) -> Result<(), PoolError> {
        let ctx = Context::new(account, self.now);
        self.pool.deposit(&ctx, tick, amount, Amount::ZERO)?;
        self.counters.deposits += 1;
        Ok(())
    }

    fn redeem(&mut self, account: Address, tick: Tick, fraction: f64) -> Result<(), PoolError> {
        let held = self
            .pool
            .deposit_info(account, tick)
            .map_or(Amount::ZERO, |d| d.shares);
        let shares = if fraction >= 0.999 {
            held
        } else {
            Amount::round_down(held.0 * Decimal::from_f64(fraction).unwrap_or(Decimal::ONE))
        };
        let ctx = Context::new(account, self.now);
        let id = self.pool.redeem(&ctx, tick, shares)?;
        self.redemptions.push((account, tick, id));
        Ok(())
    }

    fn withdraw(&mut self, account: Address, tick: Tick) -> Result<(), PoolError> {
        let Some(position) = self
            .redemptions
            .iter()
            .position(|(a, t, _)| *a == account && *t == tick)
        else {
            return Ok(());
        };
        let (_, _, id) = self.redemptions[position];
        let ctx = Context::new(account, self.now);
        self.pool.withdraw(&ctx, tick, id)?;
        if self.pool.redemption(account, tick, id).is_none() {
            self.redemptions.swap_remove(position);
        }
        Ok(())
    }

    // ─── Borrower Actions ───────────────────────────────────────────────

    fn borrow(
        &mut self,
        account: Address,
        principal: Amount,
        duration: u64,
        path_start: usize,
        defaults: bool,
    ) -> Result<(), PoolError> {
        self.counters.borrows_attempted += 1;
        let duration_index = self
            .pool
            .config()
            .duration_index(duration)
            .ok_or(PoolError::UnsupportedLoanDuration)?;
        let eligible: Vec<Tick> = self
            .ticks
            .iter()
            .copied()
            .filter(|t| t.duration_index() <= duration_index)
            .collect();
        if eligible.is_empty() {
            return Err(PoolError::InsufficientLiquidity);
        }
        let path = &eligible[path_start % eligible.len()..];

        let token_id = TokenId::from(self.next_token_id);
        self.next_token_id += 1;
        let ctx = Context::new(account, self.now);
        let loan = self.pool.borrow(
            &ctx,
            principal,
            duration,
            Address::from_low_u64(COLLATERAL),
            token_id,
            principal + principal,
            path,
            &[],
        )?;

        let _ = self.audit.verify_receipt(&loan.receipt);
        self.counters.borrows_filled += 1;
        self.counters.principal += loan.receipt.principal.to_f64();
        self.loans.push(OpenLoan {
            borrower: account,
            encoded: loan.encoded_receipt,
            receipt: loan.receipt,
            defaults,
        });
        Ok(())
    }

    fn repay_nth(&mut self, n: usize) -> Result<(), PoolError> {
        let Some(position) = self
            .loans
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.defaults)
            .map(|(i, _)| i)
            .nth(n)
        else {
            return Ok(());
        };
        let loan = self.loans.swap_remove(position);
        self.settle(loan, None)
    }

    /// Repay or liquidate `loan`. A loan that fails to settle stays open.
    fn settle(&mut self, loan: OpenLoan, rng: Option<&mut ChaCha8Rng>) -> Result<(), PoolError> {
        let result = match (loan.defaults, rng) {
            (false, _) => self.repay(&loan),
            (true, Some(rng)) => self.liquidate(&loan, rng),
            (true, None) => Err(PoolError::LoanNotExpired),
        };
        if result.is_err() {
            self.loans.push(loan);
        }
        result
    }

    fn repay(&mut self, loan: &OpenLoan) -> Result<(), PoolError> {
        let ctx = Context::new(loan.borrower, self.now);
        let paid = self.pool.repay(&ctx, &loan.encoded)?;
        self.counters.repaid += 1;
        self.counters.interest += (paid - loan.receipt.principal).to_f64();
        Ok(())
    }

    fn liquidate(&mut self, loan: &OpenLoan, rng: &mut ChaCha8Rng) -> Result<(), PoolError> {
        let keeper = Context::new(Address::from_low_u64(KEEPER), self.now);
        self.pool.liquidate(&keeper, &loan.encoded)?;

        let (lo, hi) = self.scenario.recovery_range;
        let recovery = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
        let proceeds = amount(loan.receipt.repayment.to_f64() * recovery);
        let liquidator = Context::new(Address::from_low_u64(LIQUIDATOR), self.now);
        let surplus = self
            .pool
            .on_collateral_liquidated(&liquidator, &loan.encoded, proceeds)?;

        let owed: Amount = loan.receipt.node_receipts.iter().map(|n| n.pending).sum();
        self.counters.liquidated += 1;
        self.counters.shortfall += owed.saturating_sub(proceeds).to_f64();
        self.counters.surplus += surplus.to_f64();
        Ok(())
    }

    /// Liquidate defaulted loans past maturity.
    fn run_keeper(&mut self, rng: &mut ChaCha8Rng) {
        let now = self.now;
        let (expired, open): (Vec<_>, Vec<_>) = std::mem::take(&mut self.loans)
            .into_iter()
            .partition(|l| l.defaults && l.receipt.maturity < now);
        self.loans = open;
        for loan in expired {
            let result = self.settle(loan, Some(&mut *rng));
            self.record("liquidation", result);
        }
    }

    // ─── Accounting ─────────────────────────────────────────────────────

    fn audit(&mut self) -> bool {
        let state_ok = self.audit.verify_state(self.pool.state()).is_ok();
        let pending_ok = self
            .audit
            .verify_pending(self.pool.state(), self.loans.iter().map(|l| &l.receipt))
            .is_ok();
        state_ok && pending_ok
    }

    /// Close every loan, then redeem and withdraw every share.
    fn drain(&mut self, rng: &mut ChaCha8Rng) -> bool {
        let longest = self.pool.config().durations.iter().copied().max().unwrap_or(0);
        self.now += longest + DAY;

        for loan in std::mem::take(&mut self.loans) {
            let result = self.settle(loan, Some(&mut *rng));
            self.record("drain settlement", result);
        }

        for d in 0..self.scenario.depositors {
            for t in 0..self.ticks.len() {
                let result = self.redeem(depositor(d), self.ticks[t], 1.0);
                if result.is_ok() {
                    self.record("drain redeem", result);
                }
            }
        }

        for (account, tick, id) in std::mem::take(&mut self.redemptions) {
            let ctx = Context::new(account, self.now);
            let result = self.pool.withdraw(&ctx, tick, id).map(|_| ());
            if self.pool.redemption(account, tick, id).is_some() {
                self.redemptions.push((account, tick, id));
            }
            self.record("drain withdraw", result);
        }

        self.pool.state().redemptions().next().is_none()
            && self.pool.liquidity_nodes(..).all(|(_, n)| n.shares.is_zero())
    }
}

// ─── Single Run ─────────────────────────────────────────────────────────────

/// Run a single scenario iteration with a specific seed.
pub fn run_single(
    scenario: &Scenario,
    seed: u64,
    time_series_dir: Option<&std::path::Path>,
) -> Result<BenchResult, PoolError> {
    let start = Instant::now();
    let mut runner = Runner::new(scenario)?;

    let rng = ChaCha8Rng::seed_from_u64(seed);
    let mut traffic = TrafficGenerator::new(
        rng,
        scenario.depositors,
        scenario.borrowers,
        runner.ticks.len(),
        scenario.deposit_range,
        scenario.principal_range,
    );
    let mut utilization = UtilizationTracker::new();
    let mut time_series = time_series_dir.map(|_| TimeSeriesRecorder::new());

    if scenario.seed_liquidity > 0.0 {
        let seed_amount = amount(scenario.seed_liquidity);
        for d in 0..scenario.depositors {
            for t in 0..runner.ticks.len() {
                let result = runner.deposit(depositor(d), runner.ticks[t], seed_amount);
                runner.record("seed deposit", result);
            }
        }
    }

    for step in 0..scenario.steps {
        runner.now = START + step * scenario.step_seconds;

        let activity = match scenario.activity_curve {
            Some(curve) => curve(step),
            None => scenario.activity,
        };
        let lambda = TrafficGenerator::compute_lambda(activity, scenario.depositors);

        let actions = traffic.generate_step(lambda, runner.repayable());
        for action in actions {
            runner.apply(action, traffic.rng());
        }
        runner.run_keeper(traffic.rng());

        let clean = runner.audit();
        utilization.record(&runner.pool);
        if let Some(ts) = time_series.as_mut() {
            ts.record(StepSnapshot::from_pool(&runner.pool, step, runner.now, runner.loans.len(), clean));
        }
    }

    let full_exit = if scenario.drain_at_end {
        let exited = runner.drain(traffic.rng());
        runner.audit();
        exited
    } else {
        false
    };

    if let (Some(ts), Some(dir)) = (&time_series, time_series_dir) {
        let path = dir.join(format!("seed-{}.jsonl", seed));
        if let Err(e) = ts.write_jsonl(&path) {
            log::warn!("bench: failed to write time series: {}", e);
        }
    }

    let elapsed = start.elapsed();
    let elapsed_secs = elapsed.as_secs_f64().max(0.001);
    let counters = &runner.counters;
    let borrow_fill_rate = if counters.borrows_attempted > 0 {
        counters.borrows_filled as f64 / counters.borrows_attempted as f64
    } else {
        1.0
    };
    let residual_unclaimed = runner.pool.state().unclaimed().to_f64();

    // Evaluate pass/fail
    let criteria = &scenario.criteria;
    let mut pass = true;
    if criteria.require_conservation && !runner.audit.is_clean() {
        pass = false;
    }
    if let Some(min_rate) = criteria.min_borrow_fill_rate {
        if borrow_fill_rate < min_rate {
            pass = false;
        }
    }
    if criteria.require_monotone_share_price && runner.prices.drops > 0 {
        pass = false;
    }
    if criteria.require_full_exit && !full_exit {
        pass = false;
    }
    if let Some(max_residual) = criteria.max_residual_unclaimed {
        if residual_unclaimed > max_residual {
            pass = false;
        }
    }

    Ok(BenchResult {
        scenario: scenario.label.to_string(),
        name: scenario.name.to_string(),
        category: scenario.category.to_string(),
        seed,
        pass,
        steps: scenario.steps,
        action_count: counters.actions,
        revert_count: counters.reverts,
        deposit_count: counters.deposits,
        borrows_attempted: counters.borrows_attempted,
        borrows_filled: counters.borrows_filled,
        borrow_fill_rate,
        repaid_count: counters.repaid,
        liquidated_count: counters.liquidated,
        principal_originated: counters.principal,
        interest_earned: counters.interest,
        admin_fees: runner.pool.admin_fee_balance().to_f64(),
        liquidation_shortfall: counters.shortfall,
        borrower_surplus: counters.surplus,
        conservation_checks: runner.audit.checks,
        conservation_violations: runner.audit.violations,
        share_price_drops: runner.prices.drops,
        peak_utilization_pct: utilization.peak,
        mean_utilization_pct: utilization.mean(),
        residual_unclaimed,
        full_exit,
        elapsed_ms: elapsed.as_millis(),
        throughput_per_sec: counters.actions as f64 / elapsed_secs,
    })
}

/// Run Monte Carlo: N runs of a scenario, aggregate stats.
pub fn run_monte_carlo(
    scenario: &Scenario,
    n_runs: usize,
    base_seed: u64,
    time_series_base: Option<&std::path::Path>,
) -> MonteCarloReport {
    let ts_dir = time_series_base.map(|base| base.join(scenario.name.to_lowercase()));

    let mut results = Vec::with_capacity(n_runs);
    for i in 0..n_runs {
        let seed = base_seed + i as u64;
        match run_single(scenario, seed, ts_dir.as_deref()) {
            Ok(result) => results.push(result),
            Err(e) => log::error!("bench: {} seed {} failed to start: {}", scenario.name, seed, e),
        }
    }

    aggregate(scenario, results)
}

/// Aggregate individual runs into a MonteCarloReport.
fn aggregate(scenario: &Scenario, results: Vec<BenchResult>) -> MonteCarloReport {
    let n = results.len();
    let passed = results.iter().filter(|r| r.pass).count();
    let pass_rate = if n > 0 { passed as f64 / n as f64 } else { 0.0 };

    let stats = |f: fn(&BenchResult) -> f64| {
        Stats::from_samples(&results.iter().map(f).collect::<Vec<_>>())
    };

    MonteCarloReport {
        scenario_name: scenario.name.to_string(),
        label: scenario.label.to_string(),
        category: scenario.category.to_string(),
        n_runs: n,
        pass_rate,
        borrow_fill_rate: stats(|r| r.borrow_fill_rate),
        principal_originated: stats(|r| r.principal_originated),
        interest_earned: stats(|r| r.interest_earned),
        admin_fees: stats(|r| r.admin_fees),
        liquidation_shortfall: stats(|r| r.liquidation_shortfall),
        conservation_violations: stats(|r| r.conservation_violations as f64),
        share_price_drops: stats(|r| r.share_price_drops as f64),
        peak_utilization_pct: stats(|r| r.peak_utilization_pct),
        residual_unclaimed: stats(|r| r.residual_unclaimed),
        elapsed_ms: stats(|r| r.elapsed_ms as f64),
        throughput_per_sec: stats(|r| r.throughput_per_sec),
        individual_runs: results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::scenarios;

    fn short(name: &str) -> Scenario {
        let mut scenario = scenarios()
            .into_iter()
            .find(|s| s.name == name)
            .expect("test: scenario exists");
        scenario.steps = 20;
        scenario
    }

    #[test]
    fn steady_state_run_is_conserved() {
        let result = run_single(&short("STEADY_STATE"), 1, None).expect("test: run");
        assert_eq!(result.conservation_violations, 0);
        assert!(result.conservation_checks > 0);
        assert_eq!(result.share_price_drops, 0);
    }

    #[test]
    fn total_loss_drains_completely() {
        let result = run_single(&short("TOTAL_LOSS"), 3, None).expect("test: run");
        assert_eq!(result.conservation_violations, 0);
        assert!(result.full_exit);
    }

    #[test]
    fn same_seed_same_result() {
        let scenario = short("DEFAULT_WAVE");
        let a = run_single(&scenario, 9, None).expect("test: run");
        let b = run_single(&scenario, 9, None).expect("test: run");
        assert_eq!(a.action_count, b.action_count);
        assert_eq!(a.borrows_filled, b.borrows_filled);
        assert_eq!(a.interest_earned, b.interest_earned);
    }
}
