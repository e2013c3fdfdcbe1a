//! Monte Carlo simulation for strategy robustness testing.
//!
//! Paths are built from the realized per-trade P&L sequence:
//!
//! - **Reshuffle**: random permutation; total return is unchanged, only the
//!   path (drawdown, ruin) varies
//! - **Resample**: bootstrap with replacement
//! - **Skip**: a random subset of trades is zeroed out, keeping path length
//! - **Full**: all three plus a composite 0-100 robustness score and grade
//!
//! Every draw comes from a `StdRng` seeded with the configured seed, so the
//! same inputs give bit-identical statistics.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use rigor_backtest::Trade;
use rigor_core::stats::{coefficient_of_variation, mean, percentile_sorted, safe_div, sorted, std_dev};
use rigor_core::{MonteCarloConfig, MonteCarloMethod};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Maximum number of time steps kept in the fan chart.
pub const MAX_FAN_STEPS: usize = 200;

/// Summary statistics of one simulated quantity across paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionStats {
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation.
    pub std: f64,
    pub p5: f64,
    pub p25: f64,
    pub p75: f64,
    pub p95: f64,
}

impl DistributionStats {
    pub fn from_values(values: &[f64]) -> Self {
        let s = sorted(values);
        Self {
            mean: mean(values),
            median: percentile_sorted(&s, 50.0),
            std: std_dev(values),
            p5: percentile_sorted(&s, 5.0),
            p25: percentile_sorted(&s, 25.0),
            p75: percentile_sorted(&s, 75.0),
            p95: percentile_sorted(&s, 95.0),
        }
    }
}

/// Equity percentiles across paths at sampled trade counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FanChart {
    /// Number of trades applied at each sample (0 = initial balance).
    pub steps: Vec<usize>,
    pub p5: Vec<f64>,
    pub p25: Vec<f64>,
    pub p50: Vec<f64>,
    pub p75: Vec<f64>,
    pub p95: Vec<f64>,
}

/// Result of a Monte Carlo run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub method: MonteCarloMethod,
    pub num_simulations: usize,
    pub num_trades: usize,
    pub initial_balance: f64,
    /// Return of the realized sequence, in percent.
    pub original_return_pct: f64,
    /// Final return per path, in percent.
    pub final_return_pct: DistributionStats,
    /// Peak-to-trough drawdown per path, in percent of the running peak.
    pub max_drawdown_pct: DistributionStats,
    /// Percentage of paths whose equity fell below the ruin level.
    pub probability_of_ruin: f64,
    /// Percentage of paths ending above the initial balance.
    pub probability_of_profit: f64,
    pub equity_percentiles: FanChart,
    /// Composite score (0-100); `full` runs only.
    pub robustness_score: Option<f64>,
    /// Letter grade for `robustness_score`.
    pub robustness_grade: Option<String>,
    /// Per-method results of a `full` run, keyed by method name.
    pub sub_results: Option<BTreeMap<String, MonteCarloResult>>,
}

/// Outcome of one simulated path.
struct PathOutcome {
    final_return_pct: f64,
    max_drawdown_pct: f64,
    ruined: bool,
    profitable: bool,
    /// Equity at each fan-chart step.
    samples: Vec<f64>,
}

/// Monte Carlo simulator.
#[derive(Debug, Clone)]
pub struct MonteCarloSimulator {
    config: MonteCarloConfig,
}

impl MonteCarloSimulator {
    pub fn new(config: MonteCarloConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MonteCarloConfig {
        &self.config
    }

    /// Simulate from closed trades, using their net P&L.
    pub fn run_trades(&self, trades: &[Trade], initial_balance: f64) -> MonteCarloResult {
        let pnls: Vec<f64> = trades.iter().map(|t| t.net_pnl).collect();
        self.run(&pnls, initial_balance)
    }

    /// Simulate from per-trade P&L values in realized order.
    pub fn run(&self, pnls: &[f64], initial_balance: f64) -> MonteCarloResult {
        match self.config.method {
            MonteCarloMethod::Full => self.run_full(pnls, initial_balance),
            method => self.run_method(method, pnls, initial_balance),
        }
    }

    fn run_full(&self, pnls: &[f64], initial_balance: f64) -> MonteCarloResult {
        let ((reshuffle, resample), skip) = rayon::join(
            || {
                rayon::join(
                    || self.run_method(MonteCarloMethod::Reshuffle, pnls, initial_balance),
                    || self.run_method(MonteCarloMethod::Resample, pnls, initial_balance),
                )
            },
            || self.run_method(MonteCarloMethod::Skip, pnls, initial_balance),
        );

        let score = if pnls.is_empty() {
            0.0
        } else {
            robustness_score(&[&reshuffle, &resample, &skip])
        };
        let grade = robustness_grade(score);
        debug!(score, grade, "Monte Carlo robustness graded");

        let mut primary = reshuffle.clone();
        primary.method = MonteCarloMethod::Full;
        primary.robustness_score = Some(score);
        primary.robustness_grade = Some(grade.to_string());
        primary.sub_results = Some(BTreeMap::from([
            (MonteCarloMethod::Reshuffle.name().to_string(), reshuffle),
            (MonteCarloMethod::Resample.name().to_string(), resample),
            (MonteCarloMethod::Skip.name().to_string(), skip),
        ]));
        primary
    }

    fn run_method(
        &self,
        method: MonteCarloMethod,
        pnls: &[f64],
        initial_balance: f64,
    ) -> MonteCarloResult {
        let n = pnls.len();
        let sims = self.config.num_simulations;
        let original_return_pct = safe_div(pnls.iter().sum::<f64>(), initial_balance, 0.0) * 100.0;

        if n == 0 {
            warn!(method = method.name(), "No trades to simulate, returning neutral result");
            return neutral_result(method, sims, initial_balance);
        }

        let ruin_level = initial_balance * (1.0 - self.config.ruin_threshold_pct / 100.0);
        let steps = fan_steps(n);
        let skip_count = ((n as f64 * self.config.skip_pct / 100.0).floor() as usize).clamp(1, n);

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut path = pnls.to_vec();
        let mut outcomes = Vec::with_capacity(sims);

        for _ in 0..sims {
            match method {
                MonteCarloMethod::Reshuffle | MonteCarloMethod::Full => {
                    path.copy_from_slice(pnls);
                    path.shuffle(&mut rng);
                }
                MonteCarloMethod::Resample => {
                    for slot in path.iter_mut() {
                        *slot = pnls[rng.gen_range(0..n)];
                    }
                }
                MonteCarloMethod::Skip => {
                    path.copy_from_slice(pnls);
                    for i in index::sample(&mut rng, n, skip_count).iter() {
                        path[i] = 0.0;
                    }
                }
            }
            outcomes.push(simulate_path(&path, initial_balance, ruin_level, &steps));
        }

        let result = aggregate(method, initial_balance, original_return_pct, n, &steps, &outcomes);
        debug!(
            method = method.name(),
            simulations = sims,
            trades = n,
            median_return = result.final_return_pct.median,
            ruin = result.probability_of_ruin,
            "Monte Carlo method finished"
        );
        result
    }
}

/// Trade counts sampled by the fan chart: `0..=n`, thinned to at most
/// [`MAX_FAN_STEPS`] evenly spaced points including both ends.
fn fan_steps(n: usize) -> Vec<usize> {
    let total = n + 1;
    if total <= MAX_FAN_STEPS {
        return (0..total).collect();
    }
    (0..MAX_FAN_STEPS)
        .map(|i| i * n / (MAX_FAN_STEPS - 1))
        .collect()
}

fn simulate_path(pnls: &[f64], initial: f64, ruin_level: f64, steps: &[usize]) -> PathOutcome {
    let mut equity = initial;
    let mut peak = initial;
    let mut min_equity = initial;
    let mut max_dd_pct = 0.0_f64;
    let mut samples = Vec::with_capacity(steps.len());
    let mut next_step = steps.iter().peekable();

    for t in 0..=pnls.len() {
        if t > 0 {
            equity += pnls[t - 1];
            peak = peak.max(equity);
            min_equity = min_equity.min(equity);
            if peak > 0.0 {
                max_dd_pct = max_dd_pct.max((peak - equity) / peak * 100.0);
            }
        }
        if next_step.peek() == Some(&&t) {
            samples.push(equity);
            next_step.next();
        }
    }

    PathOutcome {
        final_return_pct: safe_div(equity - initial, initial, 0.0) * 100.0,
        max_drawdown_pct: max_dd_pct,
        ruined: min_equity < ruin_level,
        profitable: equity > initial,
        samples,
    }
}

fn aggregate(
    method: MonteCarloMethod,
    initial_balance: f64,
    original_return_pct: f64,
    num_trades: usize,
    steps: &[usize],
    outcomes: &[PathOutcome],
) -> MonteCarloResult {
    let sims = outcomes.len();
    let returns: Vec<f64> = outcomes.iter().map(|o| o.final_return_pct).collect();
    let drawdowns: Vec<f64> = outcomes.iter().map(|o| o.max_drawdown_pct).collect();
    let ruined = outcomes.iter().filter(|o| o.ruined).count();
    let profitable = outcomes.iter().filter(|o| o.profitable).count();

    let mut fan = FanChart {
        steps: steps.to_vec(),
        ..Default::default()
    };
    let mut column = Vec::with_capacity(sims);
    for k in 0..steps.len() {
        column.clear();
        column.extend(outcomes.iter().map(|o| o.samples[k]));
        let col = sorted(&column);
        fan.p5.push(percentile_sorted(&col, 5.0));
        fan.p25.push(percentile_sorted(&col, 25.0));
        fan.p50.push(percentile_sorted(&col, 50.0));
        fan.p75.push(percentile_sorted(&col, 75.0));
        fan.p95.push(percentile_sorted(&col, 95.0));
    }

    MonteCarloResult {
        method,
        num_simulations: sims,
        num_trades,
        initial_balance,
        original_return_pct,
        final_return_pct: DistributionStats::from_values(&returns),
        max_drawdown_pct: DistributionStats::from_values(&drawdowns),
        probability_of_ruin: safe_div(ruined as f64, sims as f64, 0.0) * 100.0,
        probability_of_profit: safe_div(profitable as f64, sims as f64, 0.0) * 100.0,
        equity_percentiles: fan,
        robustness_score: None,
        robustness_grade: None,
        sub_results: None,
    }
}

fn neutral_result(method: MonteCarloMethod, sims: usize, initial_balance: f64) -> MonteCarloResult {
    MonteCarloResult {
        method,
        num_simulations: sims,
        num_trades: 0,
        initial_balance,
        original_return_pct: 0.0,
        final_return_pct: DistributionStats::default(),
        max_drawdown_pct: DistributionStats::default(),
        probability_of_ruin: 0.0,
        probability_of_profit: 0.0,
        equity_percentiles: FanChart {
            steps: vec![0],
            p5: vec![initial_balance],
            p25: vec![initial_balance],
            p50: vec![initial_balance],
            p75: vec![initial_balance],
            p95: vec![initial_balance],
        },
        robustness_score: None,
        robustness_grade: None,
        sub_results: None,
    }
}

/// Composite 0-100 score over the per-method results.
///
/// - 40 points: mean probability of profit
/// - 30 points: one minus mean probability of ruin
/// - 20 points: stability of median returns across methods (CV capped at 1)
/// - 10 points: mean 95th-percentile drawdown, zero at 50% or worse
pub fn robustness_score(results: &[&MonteCarloResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let profit = mean(&results.iter().map(|r| r.probability_of_profit).collect::<Vec<_>>());
    let ruin = mean(&results.iter().map(|r| r.probability_of_ruin).collect::<Vec<_>>());
    let medians: Vec<f64> = results.iter().map(|r| r.final_return_pct.median).collect();
    let cv = coefficient_of_variation(&medians);
    let worst_dd = mean(
        &results
            .iter()
            .map(|r| r.max_drawdown_pct.p95 / 100.0)
            .collect::<Vec<_>>(),
    );

    let score = 40.0 * (profit / 100.0)
        + 30.0 * (1.0 - ruin / 100.0)
        + 20.0 * (1.0 - cv.min(1.0))
        + 10.0 * (1.0 - worst_dd.min(0.5) * 2.0);
    score.clamp(0.0, 100.0)
}

/// Letter grade for a 0-100 score, in 5-point steps from A+ (>= 95) to D- (>= 40).
pub fn robustness_grade(score: f64) -> &'static str {
    const LADDER: [(f64, &str); 12] = [
        (95.0, "A+"),
        (90.0, "A"),
        (85.0, "A-"),
        (80.0, "B+"),
        (75.0, "B"),
        (70.0, "B-"),
        (65.0, "C+"),
        (60.0, "C"),
        (55.0, "C-"),
        (50.0, "D+"),
        (45.0, "D"),
        (40.0, "D-"),
    ];
    LADDER
        .iter()
        .find(|(min, _)| score >= *min)
        .map_or("F", |(_, grade)| *grade)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn simulator(method: MonteCarloMethod) -> MonteCarloSimulator {
        MonteCarloSimulator::new(
            MonteCarloConfig::default()
                .with_seed(42)
                .with_simulations(1000)
                .with_method(method),
        )
    }

    #[test]
    fn test_same_seed_is_bit_identical() {
        let pnls = [100.0, -50.0, 200.0, -100.0];
        for method in [
            MonteCarloMethod::Reshuffle,
            MonteCarloMethod::Resample,
            MonteCarloMethod::Skip,
            MonteCarloMethod::Full,
        ] {
            let a = simulator(method).run(&pnls, 10_000.0);
            let b = simulator(method).run(&pnls, 10_000.0);
            assert_eq!(a, b, "{method}");
        }
    }

    #[test]
    fn test_reshuffle_preserves_total_return() {
        let pnls = [100.0, -50.0, 200.0, -100.0];
        let result = simulator(MonteCarloMethod::Reshuffle).run(&pnls, 10_000.0);

        assert_abs_diff_eq!(result.original_return_pct, 1.5, epsilon = 1e-12);
        let r = &result.final_return_pct;
        assert_abs_diff_eq!(r.p5, 1.5, epsilon = 1e-9);
        assert_abs_diff_eq!(r.p95, 1.5, epsilon = 1e-9);
        assert_abs_diff_eq!(r.std, 0.0, epsilon = 1e-9);
        assert_eq!(result.probability_of_profit, 100.0);
        // Drawdown depends on order
        assert!(result.max_drawdown_pct.p95 > result.max_drawdown_pct.p5);
    }

    #[test]
    fn test_resample_varies_total_return() {
        let pnls = [100.0, -50.0, 200.0, -100.0];
        let result = simulator(MonteCarloMethod::Resample).run(&pnls, 10_000.0);
        assert!(result.final_return_pct.std > 0.0);
        assert!(result.probability_of_profit < 100.0);
    }

    #[test]
    fn test_skip_zeroes_one_in_ten() {
        let pnls = [10.0; 10];
        let result = simulator(MonteCarloMethod::Skip).run(&pnls, 10_000.0);
        // 10% of 10 trades: exactly one dropped per path
        assert_abs_diff_eq!(result.final_return_pct.mean, 0.9, epsilon = 1e-9);
        assert_abs_diff_eq!(result.final_return_pct.std, 0.0, epsilon = 1e-9);
        // Path length is preserved
        assert_eq!(result.equity_percentiles.steps.len(), 11);
    }

    #[test]
    fn test_skip_drops_at_least_one_trade() {
        let pnls = [10.0; 4];
        for skip_pct in [10.0, 0.0] {
            let config = MonteCarloConfig {
                skip_pct,
                ..MonteCarloConfig::default().with_method(MonteCarloMethod::Skip)
            };
            let result = MonteCarloSimulator::new(config).run(&pnls, 10_000.0);
            // floor(4 * pct / 100) is 0, raised to one dropped trade per path
            assert_abs_diff_eq!(result.final_return_pct.mean, 0.3, epsilon = 1e-9);
            assert_abs_diff_eq!(result.final_return_pct.std, 0.0, epsilon = 1e-9);
            assert_eq!(result.probability_of_profit, 100.0);
        }
    }

    #[test]
    fn test_ruin_probability() {
        let pnls = [-6_000.0, 100.0];
        let result = simulator(MonteCarloMethod::Reshuffle).run(&pnls, 10_000.0);
        assert_eq!(result.probability_of_ruin, 100.0);
        assert_eq!(result.probability_of_profit, 0.0);
        assert_abs_diff_eq!(result.max_drawdown_pct.mean, 60.0, epsilon = 1.0);
    }

    #[test]
    fn test_fan_chart_is_thinned() {
        let pnls: Vec<f64> = (0..500).map(|i| if i % 3 == 0 { -40.0 } else { 30.0 }).collect();
        let result = simulator(MonteCarloMethod::Resample).run(&pnls, 10_000.0);
        let fan = &result.equity_percentiles;
        assert_eq!(fan.steps.len(), MAX_FAN_STEPS);
        assert_eq!(fan.steps[0], 0);
        assert_eq!(*fan.steps.last().unwrap(), 500);
        assert_eq!(fan.p5[0], 10_000.0);
        assert_eq!(fan.p95[0], 10_000.0);
        for k in 0..fan.steps.len() {
            assert!(fan.p5[k] <= fan.p50[k] && fan.p50[k] <= fan.p95[k]);
        }
    }

    #[test]
    fn test_full_mode_scores_and_nests() {
        let pnls = [100.0, 200.0, 150.0, 120.0];
        let result = simulator(MonteCarloMethod::Full).run(&pnls, 10_000.0);

        assert_eq!(result.method, MonteCarloMethod::Full);
        let score = result.robustness_score.unwrap();
        assert!((80.0..=100.0).contains(&score), "score {score}");
        assert_eq!(
            result.robustness_grade.as_deref(),
            Some(robustness_grade(score))
        );

        let subs = result.sub_results.as_ref().unwrap();
        assert_eq!(subs.len(), 3);
        assert_eq!(subs["reshuffle"].final_return_pct, result.final_return_pct);
        assert_eq!(subs["skip"].method, MonteCarloMethod::Skip);
        assert!(subs["reshuffle"].robustness_score.is_none());
    }

    #[test]
    fn test_zero_trades_is_neutral() {
        let result = simulator(MonteCarloMethod::Reshuffle).run(&[], 10_000.0);
        assert_eq!(result.num_trades, 0);
        assert_eq!(result.probability_of_ruin, 0.0);
        assert_eq!(result.equity_percentiles.p50, vec![10_000.0]);

        let full = simulator(MonteCarloMethod::Full).run(&[], 10_000.0);
        assert_eq!(full.robustness_score, Some(0.0));
        assert_eq!(full.robustness_grade.as_deref(), Some("F"));
    }

    #[test]
    fn test_grade_ladder() {
        assert_eq!(robustness_grade(100.0), "A+");
        assert_eq!(robustness_grade(95.0), "A+");
        assert_eq!(robustness_grade(94.9), "A");
        assert_eq!(robustness_grade(72.0), "B-");
        assert_eq!(robustness_grade(50.0), "D+");
        assert_eq!(robustness_grade(40.0), "D-");
        assert_eq!(robustness_grade(39.9), "F");
    }

    #[test]
    fn test_result_serializes() {
        let result = simulator(MonteCarloMethod::Full).run(&[10.0, -5.0, 20.0], 1_000.0);
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"robustness_grade\""));
        assert!(json.contains("\"method\":\"full\""));
    }
}
