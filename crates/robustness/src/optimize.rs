//! Exhaustive grid search over strategy parameters.

use rayon::prelude::*;
use rigor_backtest::{BacktestMetrics, BacktestSimulator};
use rigor_core::{expand_grid, BacktestConfig, Bar, Metric, ParamGrid, ParamSet, Result, Strategy};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One evaluated parameter combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    pub params: ParamSet,
    /// Value of the objective metric.
    pub score: f64,
    pub metrics: BacktestMetrics,
}

/// Evaluate every combination of `grid` on `bars` in parallel.
///
/// `factory` builds a fresh strategy per combination; combinations it rejects
/// (e.g. a fast period above the slow one) are skipped. Results are sorted by
/// `metric`, best first, with ties kept in grid order.
pub fn grid_search<S, F>(
    bars: &[Bar],
    grid: &ParamGrid,
    factory: F,
    config: &BacktestConfig,
    metric: Metric,
) -> Result<Vec<SweepResult>>
where
    S: Strategy,
    F: Fn(&ParamSet) -> anyhow::Result<S> + Sync,
{
    let combos = expand_grid(grid);
    let simulator = BacktestSimulator::new(config.clone());

    let evaluated: Vec<Option<SweepResult>> = combos
        .into_par_iter()
        .map(|params| -> Result<Option<SweepResult>> {
            let mut strategy = match factory(&params) {
                Ok(s) => s,
                Err(e) => {
                    debug!(?params, error = %e, "Skipping rejected parameter combination");
                    return Ok(None);
                }
            };
            let result = simulator.run(&mut strategy, bars)?;
            Ok(Some(SweepResult {
                score: result.metrics.value(metric),
                metrics: result.metrics,
                params,
            }))
        })
        .collect::<Result<_>>()?;

    let mut results: Vec<SweepResult> = evaluated.into_iter().flatten().collect();
    results.sort_by(|a, b| b.score.total_cmp(&a.score));

    debug!(
        combinations = results.len(),
        metric = metric.name(),
        best = results.first().map(|r| r.score),
        "Grid search finished"
    );
    Ok(results)
}
