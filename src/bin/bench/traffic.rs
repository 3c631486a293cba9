// Randomized Pool Traffic: seedable, Poisson-distributed actions per step
// Depositors, redeemers and borrowers drawn from fixed account sets

use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Action mix: deposit 40%, redeem 15%, withdraw 10%, borrow 20%, repay 15%
const ACTION_CDF: [f64; 5] = [0.40, 0.55, 0.65, 0.85, 1.00];

/// One randomly drawn call against the pool. Indices are resolved by the
/// runner against its own account/tick/loan tables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Deposit { depositor: usize, tick: usize, amount: f64 },
    Redeem { depositor: usize, tick: usize, fraction: f64 },
    Withdraw { depositor: usize, tick: usize },
    Borrow { borrower: usize, principal: f64, duration_days: u64, path_start: usize },
    Repay { loan: usize },
}

pub struct TrafficGenerator {
    rng: ChaCha8Rng,
    pub depositors: usize,
    pub borrowers: usize,
    pub ticks: usize,
    pub action_count: u32,
    pub action_counts: [u32; 5],
    deposit_range: (f64, f64),
    principal_range: (f64, f64),
}

impl TrafficGenerator {
    pub fn new(
        rng: ChaCha8Rng,
        depositors: usize,
        borrowers: usize,
        ticks: usize,
        deposit_range: (f64, f64),
        principal_range: (f64, f64),
    ) -> Self {
        Self {
            rng,
            depositors,
            borrowers,
            ticks,
            action_count: 0,
            action_counts: [0; 5],
            deposit_range,
            principal_range,
        }
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Generate Poisson-distributed actions for one step.
    /// `lambda` is the expected number of actions per step;
    /// `open_loans` bounds the loan index of repay actions.
    pub fn generate_step(&mut self, lambda: f64, open_loans: usize) -> Vec<Action> {
        if self.depositors == 0 || self.ticks == 0 || lambda <= 0.0 {
            return Vec::new();
        }

        let n_actions = poisson_sample(&mut self.rng, lambda);
        let mut actions = Vec::with_capacity(n_actions as usize);

        for _ in 0..n_actions {
            let kind = select_action(&mut self.rng);
            let action = match kind {
                0 => Action::Deposit {
                    depositor: self.rng.gen_range(0..self.depositors),
                    tick: self.rng.gen_range(0..self.ticks),
                    amount: self.rng.gen_range(self.deposit_range.0..self.deposit_range.1),
                },
                1 => Action::Redeem {
                    depositor: self.rng.gen_range(0..self.depositors),
                    tick: self.rng.gen_range(0..self.ticks),
                    fraction: self.rng.gen_range(0.1..=1.0),
                },
                2 => Action::Withdraw {
                    depositor: self.rng.gen_range(0..self.depositors),
                    tick: self.rng.gen_range(0..self.ticks),
                },
                3 if self.borrowers > 0 => Action::Borrow {
                    borrower: self.rng.gen_range(0..self.borrowers),
                    principal: self.rng.gen_range(self.principal_range.0..self.principal_range.1),
                    duration_days: *[7u64, 14, 30]
                        .get(self.rng.gen_range(0..3))
                        .unwrap_or(&30),
                    path_start: self.rng.gen_range(0..self.ticks),
                },
                4 if open_loans > 0 => Action::Repay {
                    loan: self.rng.gen_range(0..open_loans),
                },
                _ => continue,
            };
            self.action_counts[kind] += 1;
            self.action_count += 1;
            actions.push(action);
        }

        actions
    }

    /// Poisson lambda for a scenario activity level and account count.
    /// λ = activity × 4.0 × sqrt(depositors/8)
    pub fn compute_lambda(activity: f64, depositors: usize) -> f64 {
        activity * 4.0 * (depositors as f64 / 8.0).sqrt()
    }
}

/// Poisson sampling via Knuth algorithm.
/// For λ < 30, uses direct method. For larger λ, uses normal approximation.
pub fn poisson_sample(rng: &mut ChaCha8Rng, lambda: f64) -> u32 {
    if lambda < 30.0 {
        let l = (-lambda).exp();
        let mut k: u32 = 0;
        let mut p: f64 = 1.0;
        loop {
            k += 1;
            p *= rng.gen::<f64>();
            if p <= l {
                return k - 1;
            }
        }
    } else {
        let u1: f64 = rng.gen();
        let u2: f64 = rng.gen();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        let result = lambda + lambda.sqrt() * z;
        result.round().max(0.0) as u32
    }
}

fn select_action(rng: &mut ChaCha8Rng) -> usize {
    let r: f64 = rng.gen();
    for (i, &cdf) in ACTION_CDF.iter().enumerate() {
        if r < cdf {
            return i;
        }
    }
    ACTION_CDF.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_poisson_mean() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let lambda = 10.0;
        let n = 10000;
        let sum: u64 = (0..n).map(|_| poisson_sample(&mut rng, lambda) as u64).sum();
        let mean = sum as f64 / n as f64;
        assert!((mean - lambda).abs() < 0.5, "Poisson mean {} far from λ={}", mean, lambda);
    }

    #[test]
    fn test_action_mix() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let n = 10000;
        let mut counts = [0u32; 5];
        for _ in 0..n {
            counts[select_action(&mut rng)] += 1;
        }
        let deposit_pct = counts[0] as f64 / n as f64 * 100.0;
        let borrow_pct = counts[3] as f64 / n as f64 * 100.0;
        assert!((deposit_pct - 40.0).abs() < 3.0, "deposit: {:.1}% expected ~40%", deposit_pct);
        assert!((borrow_pct - 20.0).abs() < 3.0, "borrow: {:.1}% expected ~20%", borrow_pct);
    }

    #[test]
    fn test_same_seed_same_traffic() {
        let make = || {
            TrafficGenerator::new(ChaCha8Rng::seed_from_u64(7), 4, 2, 3, (1.0, 10.0), (1.0, 5.0))
        };
        let (mut a, mut b) = (make(), make());
        for _ in 0..20 {
            assert_eq!(a.generate_step(3.0, 2), b.generate_step(3.0, 2));
        }
    }
}
