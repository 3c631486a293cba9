// Scenario Definitions: liquidity depth, default waves and bank runs
// All scenario logic is data: tick layout, traffic mix, defaults and drain

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ─── Scenario Configuration ─────────────────────────────────────────────────

pub struct Scenario {
    pub name: &'static str,
    pub label: &'static str,
    pub category: &'static str,
    pub depositors: usize,
    pub borrowers: usize,
    /// Tick limits in whole units; each gets one tick per configured duration.
    pub tick_limits: &'static [u64],
    pub steps: u64,
    /// Seconds the clock advances per step.
    pub step_seconds: u64,
    pub activity: f64,
    pub activity_curve: Option<fn(u64) -> f64>,
    /// Deposited by every depositor into every tick before the first step.
    pub seed_liquidity: f64,
    pub deposit_range: (f64, f64),
    pub principal_range: (f64, f64),
    pub admin_fee_rate: Decimal,
    /// Chance a new loan is never repaid and goes to liquidation.
    pub default_probability: f64,
    /// Liquidation proceeds as a fraction of the loan's repayment.
    pub recovery_range: (f64, f64),
    /// Settle every loan and redeem every share after the last step.
    pub drain_at_end: bool,
    pub criteria: PassCriteria,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "",
            label: "",
            category: "",
            depositors: 8,
            borrowers: 4,
            tick_limits: &[10, 25, 50, 100],
            steps: 180,
            step_seconds: 86_400,
            activity: 0.6,
            activity_curve: None,
            seed_liquidity: 0.0,
            deposit_range: (5.0, 50.0),
            principal_range: (1.0, 20.0),
            admin_fee_rate: dec!(0.05),
            default_probability: 0.0,
            recovery_range: (1.0, 1.0),
            drain_at_end: false,
            criteria: PassCriteria::default(),
        }
    }
}

pub struct PassCriteria {
    pub require_conservation: bool,
    pub min_borrow_fill_rate: Option<f64>,
    pub require_monotone_share_price: bool,
    pub require_full_exit: bool,
    pub max_residual_unclaimed: Option<f64>,
}

impl Default for PassCriteria {
    fn default() -> Self {
        Self {
            require_conservation: true,
            min_borrow_fill_rate: None,
            require_monotone_share_price: false,
            require_full_exit: false,
            max_residual_unclaimed: None,
        }
    }
}

// ─── Curve Functions ────────────────────────────────────────────────────────

fn seasonal_activity(step: u64) -> f64 {
    (0.6 + 0.4 * (step as f64 / 14.0).sin()).clamp(0.1, 1.0)
}

fn panic_activity(step: u64) -> f64 {
    if (60..90).contains(&step) { 2.5 } else { 0.5 }
}

// ─── Scenario Table ─────────────────────────────────────────────────────────

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "STEADY_STATE",
            label: "Steady state, no defaults",
            category: "baseline",
            criteria: PassCriteria {
                require_monotone_share_price: true,
                ..Default::default()
            },
            ..Default::default()
        },
        Scenario {
            name: "DEEP_LIQUIDITY",
            label: "Deep seeded liquidity",
            category: "baseline",
            seed_liquidity: 100.0,
            criteria: PassCriteria {
                min_borrow_fill_rate: Some(0.9),
                require_monotone_share_price: true,
                ..Default::default()
            },
            ..Default::default()
        },
        Scenario {
            name: "SEASONAL_DEMAND",
            label: "Seasonal demand curve",
            category: "baseline",
            steps: 365,
            activity_curve: Some(seasonal_activity),
            criteria: PassCriteria {
                require_monotone_share_price: true,
                ..Default::default()
            },
            ..Default::default()
        },
        Scenario {
            name: "HIGH_CHURN",
            label: "High churn, 32 depositors",
            category: "stress",
            depositors: 32,
            borrowers: 16,
            activity: 2.0,
            step_seconds: 21_600,
            criteria: PassCriteria {
                require_monotone_share_price: true,
                ..Default::default()
            },
            ..Default::default()
        },
        Scenario {
            name: "FEE_HEAVY",
            label: "25% admin fee",
            category: "stress",
            admin_fee_rate: dec!(0.25),
            seed_liquidity: 20.0,
            criteria: PassCriteria {
                require_monotone_share_price: true,
                ..Default::default()
            },
            ..Default::default()
        },
        Scenario {
            name: "DEFAULT_WAVE",
            label: "30% defaults, partial recovery",
            category: "credit",
            seed_liquidity: 20.0,
            default_probability: 0.3,
            recovery_range: (0.2, 0.9),
            ..Default::default()
        },
        Scenario {
            name: "OVERCOLLATERALIZED_DEFAULTS",
            label: "Defaults with surplus proceeds",
            category: "credit",
            seed_liquidity: 20.0,
            default_probability: 0.5,
            recovery_range: (1.1, 2.0),
            criteria: PassCriteria {
                require_monotone_share_price: true,
                ..Default::default()
            },
            ..Default::default()
        },
        Scenario {
            name: "TOTAL_LOSS",
            label: "Every loan defaults, nothing recovered",
            category: "credit",
            seed_liquidity: 10.0,
            default_probability: 1.0,
            recovery_range: (0.0, 0.0),
            steps: 90,
            drain_at_end: true,
            criteria: PassCriteria {
                require_full_exit: true,
                ..Default::default()
            },
            ..Default::default()
        },
        Scenario {
            name: "BANK_RUN",
            label: "Panic redemptions, full drain",
            category: "liquidity",
            seed_liquidity: 50.0,
            activity_curve: Some(panic_activity),
            steps: 120,
            drain_at_end: true,
            criteria: PassCriteria {
                require_monotone_share_price: true,
                require_full_exit: true,
                max_residual_unclaimed: Some(1e-9),
                ..Default::default()
            },
            ..Default::default()
        },
        Scenario {
            name: "BANK_RUN_WITH_DEFAULTS",
            label: "Drain after a default wave",
            category: "liquidity",
            seed_liquidity: 50.0,
            default_probability: 0.25,
            recovery_range: (0.0, 1.2),
            steps: 120,
            drain_at_end: true,
            criteria: PassCriteria {
                require_full_exit: true,
                ..Default::default()
            },
            ..Default::default()
        },
    ]
}
