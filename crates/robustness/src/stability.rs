//! Parameter stability across walk-forward windows.
//!
//! A parameter whose optimal value jumps around from window to window is a
//! sign of curve fitting. Stability is judged by the coefficient of variation
//! of each numeric parameter's best value, together with the share of
//! out-of-sample windows that lost money.

use std::collections::BTreeSet;
use std::fmt;

use rigor_core::stats::{coefficient_of_variation, mean, std_dev};
use rigor_core::ParamSet;
use serde::{Deserialize, Serialize};

/// Worst CV above which the parameters are considered unstable.
pub const FAIL_CV: f64 = 0.5;
/// Worst CV above which the parameters need a closer look.
pub const CAUTION_CV: f64 = 0.3;

/// Overall verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Pass,
    Caution,
    Fail,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Recommendation::Pass => "PASS",
            Recommendation::Caution => "CAUTION",
            Recommendation::Fail => "FAIL",
        })
    }
}

/// Dispersion of one parameter's best value across windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDispersion {
    pub name: String,
    /// Best value per window, in window order.
    pub values: Vec<f64>,
    pub mean: f64,
    pub std: f64,
    pub cv: f64,
}

/// Stability verdict for a walk-forward run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamStability {
    pub parameters: Vec<ParameterDispersion>,
    /// Largest CV over all numeric parameters (0 when there are none).
    pub worst_cv: f64,
    pub total_windows: usize,
    /// Windows whose out-of-sample profit factor is below 1.
    pub unprofitable_windows: usize,
    pub recommendation: Recommendation,
    pub reasons: Vec<String>,
    /// Fewer than two windows were available.
    pub low_confidence: bool,
}

impl ParamStability {
    /// Assess the best parameters and OOS profit factors of each window.
    ///
    /// Both slices are in window order and have one entry per window.
    pub fn assess(best_params: &[ParamSet], oos_profit_factors: &[f64]) -> Self {
        let total_windows = best_params.len().min(oos_profit_factors.len());
        let best_params = &best_params[..total_windows];
        let oos_profit_factors = &oos_profit_factors[..total_windows];

        let parameters = dispersions(best_params);
        let worst_cv = parameters.iter().map(|p| p.cv).fold(0.0, f64::max);
        let unprofitable_windows = oos_profit_factors.iter().filter(|pf| **pf < 1.0).count();

        let mut reasons = Vec::new();
        let recommendation = match total_windows {
            0 => {
                reasons.push("insufficient data: no walk-forward window completed".to_string());
                Recommendation::Fail
            }
            1 => {
                reasons.push(
                    "only one walk-forward window: parameter stability cannot be measured, low confidence"
                        .to_string(),
                );
                Recommendation::Caution
            }
            n => {
                let unprofitable_share = unprofitable_windows as f64 / n as f64;
                let mut verdict = Recommendation::Pass;

                if worst_cv > FAIL_CV {
                    reasons.push(format!("worst parameter CV {worst_cv:.2} exceeds {FAIL_CV}"));
                    verdict = Recommendation::Fail;
                } else if worst_cv > CAUTION_CV {
                    reasons.push(format!("worst parameter CV {worst_cv:.2} exceeds {CAUTION_CV}"));
                    verdict = Recommendation::Caution;
                }

                if unprofitable_share > 0.5 {
                    reasons.push(format!(
                        "{unprofitable_windows} of {n} out-of-sample windows unprofitable"
                    ));
                    verdict = Recommendation::Fail;
                } else if unprofitable_share > 0.25 {
                    reasons.push(format!(
                        "{unprofitable_windows} of {n} out-of-sample windows unprofitable"
                    ));
                    if verdict == Recommendation::Pass {
                        verdict = Recommendation::Caution;
                    }
                }

                if verdict == Recommendation::Pass {
                    reasons.push("parameters stable and out-of-sample windows profitable".to_string());
                }
                verdict
            }
        };

        Self {
            parameters,
            worst_cv,
            total_windows,
            unprofitable_windows,
            recommendation,
            reasons,
            low_confidence: total_windows < 2,
        }
    }
}

/// CV of every parameter that is numeric in all windows.
fn dispersions(best_params: &[ParamSet]) -> Vec<ParameterDispersion> {
    let names: BTreeSet<&String> = best_params.iter().flat_map(|p| p.keys()).collect();

    names
        .into_iter()
        .filter_map(|name| {
            let values: Option<Vec<f64>> = best_params
                .iter()
                .map(|p| p.get(name).and_then(|v| v.as_f64()))
                .collect();
            let values = values?;
            Some(ParameterDispersion {
                name: name.clone(),
                mean: mean(&values),
                std: std_dev(&values),
                cv: coefficient_of_variation(&values),
                values,
            })
        })
        .collect()
}
