// Tick Pool Benchmark Runner: accounting invariants under randomized load
// Monte Carlo (N=30), Poisson traffic, seedable PRNG, per-step conservation audit
//
// Usage:
//   cargo run --release --bin bench                     # Run all scenarios (30 runs each)
//   cargo run --release --bin bench -- --runs 5         # Quick mode (5 runs each)
//   cargo run --release --bin bench -- BANK_RUN         # Filter by name
//   cargo run --release --bin bench -- --time-series    # Enable JSONL output
//   cargo run --release --bin bench -- --seed 42        # Custom base seed
//   RUST_LOG=debug cargo run --release --bin bench      # Log every revert

mod metrics;
mod monte_carlo;
mod report;
mod scenarios;
mod time_series;
mod traffic;

use report::*;
use scenarios::*;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

// ─── CLI Parsing ────────────────────────────────────────────────────────────

struct CliArgs {
    runs: usize,
    seed: u64,
    time_series: bool,
    filter: Option<String>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut cli = CliArgs {
        runs: 30,
        seed: 0,
        time_series: false,
        filter: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--runs" => {
                i += 1;
                if i < args.len() {
                    cli.runs = args[i].parse().unwrap_or(30);
                }
            }
            "--seed" => {
                i += 1;
                if i < args.len() {
                    cli.seed = args[i].parse().unwrap_or(0);
                }
            }
            "--time-series" => {
                cli.time_series = true;
            }
            arg if !arg.starts_with('-') => {
                cli.filter = Some(arg.to_string());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
            }
        }
        i += 1;
    }

    cli
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = parse_args();
    let all_scenarios = scenarios();

    let to_run: Vec<&Scenario> = match &cli.filter {
        Some(f) => {
            let f_lower = f.to_lowercase();
            all_scenarios.iter()
                .filter(|s| s.name.to_lowercase().contains(&f_lower)
                          || s.label.to_lowercase().contains(&f_lower)
                          || s.category.to_lowercase().contains(&f_lower))
                .collect()
        }
        None => all_scenarios.iter().collect(),
    };

    if to_run.is_empty() {
        eprintln!("No scenarios match filter: {:?}", cli.filter);
        std::process::exit(1);
    }

    let ts_dir = if cli.time_series {
        Some(std::path::Path::new("benchmark-results/time-series").to_path_buf())
    } else {
        None
    };

    println!("\n  Tick Pool Benchmark Runner v{}", env!("CARGO_PKG_VERSION"));
    println!("  PRNG: ChaCha8Rng | Runs/scenario: {} | Base seed: {}", cli.runs, cli.seed);
    println!("  Running {} scenario(s)...\n", to_run.len());
    println!("  {:<40} {:>5} {:>11} {:>10} {:>9} {:>6} {:>7}",
        "Scenario", "Pass%", "Fill%", "Interest", "PeakUtil", "Viol", "Time");
    println!("  {}", "-".repeat(96));

    let suite_start = Instant::now();
    let mut mc_reports = Vec::new();

    for scenario in &to_run {
        let report = monte_carlo::run_monte_carlo(
            scenario,
            cli.runs,
            cli.seed,
            ts_dir.as_deref(),
        );

        let pass_pct = report.pass_rate * 100.0;
        let fill_mean = report.borrow_fill_rate.mean * 100.0;
        let fill_ci = (report.borrow_fill_rate.ci_upper - report.borrow_fill_rate.ci_lower) / 2.0 * 100.0;
        let status = if report.pass_rate >= 1.0 { "PASS" } else { "FAIL" };

        println!("  {:<40} {:>4}% {:>6.1}±{:<4.1} {:>10.3} {:>8.1}% {:>6.0} {:>5.0}ms  {}",
            report.label,
            pass_pct as u32,
            fill_mean, fill_ci,
            report.interest_earned.mean,
            report.peak_utilization_pct.mean,
            report.conservation_violations.max,
            report.elapsed_ms.mean,
            status,
        );

        mc_reports.push(report);
    }

    let suite_elapsed = suite_start.elapsed();

    // ─── Invariant Validation ───────────────────────────────────────────

    let runs = || mc_reports.iter().flat_map(|r| r.individual_runs.iter());

    let validation = InvariantValidation {
        conservation_clean: runs().all(|r| r.conservation_violations == 0),
        share_price_monotone: to_run.iter()
            .filter(|s| s.default_probability == 0.0)
            .all(|s| runs().filter(|r| r.name == s.name).all(|r| r.share_price_drops == 0)),
        full_exit: to_run.iter()
            .filter(|s| s.drain_at_end)
            .all(|s| runs().filter(|r| r.name == s.name).all(|r| r.full_exit)),
        total_conservation_checks: runs().map(|r| r.conservation_checks).sum(),
    };

    // ─── Summary ────────────────────────────────────────────────────────

    let total = mc_reports.len();
    let passed = mc_reports.iter().filter(|r| r.pass_rate >= 1.0).count();
    let failed = total - passed;

    println!("  {}", "-".repeat(96));
    println!("  Total: {}  Passed: {}  Failed: {}  Suite time: {:.1}s\n",
        total, passed, failed, suite_elapsed.as_secs_f64());

    println!("  Invariant Validation:");
    println!("    Cash/queue/pending conservation: {}", if validation.conservation_clean { "PASS" } else { "FAIL" });
    println!("    Share price monotone (no loss):  {}", if validation.share_price_monotone { "PASS" } else { "FAIL" });
    println!("    Full exit after drain:           {}", if validation.full_exit { "PASS" } else { "FAIL" });
    println!("    Conservation checks run:         {}\n", validation.total_conservation_checks);

    let all_pass = validation.all_pass();

    // ─── Write JSON Report ──────────────────────────────────────────────

    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let timestamp = format!("{}", ts);

    let report = BenchReport {
        timestamp: timestamp.clone(),
        version: env!("CARGO_PKG_VERSION"),
        prng: "ChaCha8Rng",
        n_runs_per_scenario: cli.runs,
        summary: Summary {
            total,
            passed,
            failed,
            pass_rate: passed as f64 / total as f64,
        },
        invariant_validation: validation,
        scenarios: mc_reports,
    };

    let dir = std::path::Path::new("benchmark-results");
    if !dir.exists() {
        std::fs::create_dir_all(dir).expect("Failed to create benchmark-results/");
    }
    let path = dir.join(format!("bench-{}.json", timestamp));
    let json = serde_json::to_string_pretty(&report).expect("Failed to serialize");
    std::fs::write(&path, &json).expect("Failed to write benchmark file");
    println!("  Results saved to: {}\n", path.display());

    if failed > 0 || !all_pass {
        std::process::exit(1);
    }
}
