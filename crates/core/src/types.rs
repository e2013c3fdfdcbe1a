//! Core data types for the rigor backtesting engine.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Timestamp in seconds since Unix epoch (UTC).
pub type Timestamp = i64;

/// Format a timestamp as an ISO-8601 date (`YYYY-MM-DD`).
///
/// Out-of-range timestamps fall back to the raw number.
pub fn format_date(ts: Timestamp) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar timestamp (seconds).
    pub time: Timestamp,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Total volume.
    pub volume: f64,
}

impl Bar {
    /// Full bar range.
    #[inline]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// True range relative to the previous close.
    #[inline]
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        match prev_close {
            Some(pc) => self
                .range()
                .max((self.high - pc).abs())
                .max((self.low - pc).abs()),
            None => self.range(),
        }
    }
}

/// Check that bars are ordered by strictly increasing timestamp.
///
/// Duplicate or out-of-order timestamps are rejected with [`Error::Data`].
pub fn validate_bars(bars: &[Bar]) -> Result<()> {
    for (i, pair) in bars.windows(2).enumerate() {
        if pair[1].time <= pair[0].time {
            return Err(Error::data(format!(
                "bar {} has timestamp {} which does not follow {}",
                i + 1,
                pair[1].time,
                pair[0].time
            )));
        }
    }
    Ok(())
}

/// Position side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Get sign: +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    /// The other side.
    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Action requested by a strategy for the current bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    /// Go long (or flip a short to long).
    Buy,
    /// Go short (or flip a long to short).
    Sell,
    /// Exit the current position.
    Close,
    /// Do nothing.
    None,
}

impl SignalAction {
    /// The side an entry action opens, if any.
    pub fn entry_side(self) -> Option<Side> {
        match self {
            SignalAction::Buy => Some(Side::Long),
            SignalAction::Sell => Some(Side::Short),
            SignalAction::Close | SignalAction::None => None,
        }
    }
}

/// Trading decision emitted by an incremental strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Action to take.
    pub action: SignalAction,
    /// Position size (contracts, > 0).
    pub size: f64,
    /// Protective stop price.
    pub stop_loss: Option<f64>,
    /// Profit target price.
    pub take_profit: Option<f64>,
}

impl Signal {
    fn new(action: SignalAction, size: f64) -> Self {
        Self {
            action,
            size,
            stop_loss: None,
            take_profit: None,
        }
    }

    /// Open (or flip to) a long position.
    pub fn buy(size: f64) -> Self {
        Self::new(SignalAction::Buy, size)
    }

    /// Open (or flip to) a short position.
    pub fn sell(size: f64) -> Self {
        Self::new(SignalAction::Sell, size)
    }

    /// Close the open position.
    pub fn close() -> Self {
        Self::new(SignalAction::Close, 1.0)
    }

    /// Attach a stop-loss price.
    pub fn with_stop_loss(mut self, price: f64) -> Self {
        self.stop_loss = Some(price);
        self
    }

    /// Attach a take-profit price.
    pub fn with_take_profit(mut self, price: f64) -> Self {
        self.take_profit = Some(price);
        self
    }
}

/// Whole-series boolean signals produced by a vectorized strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSet {
    /// Long entries.
    pub entries: Vec<bool>,
    /// Long exits.
    pub exits: Vec<bool>,
    /// Short entries.
    pub short_entries: Option<Vec<bool>>,
    /// Short exits.
    pub short_exits: Option<Vec<bool>>,
}

impl SignalSet {
    /// Long-only signal set.
    pub fn long_only(entries: Vec<bool>, exits: Vec<bool>) -> Self {
        Self {
            entries,
            exits,
            short_entries: None,
            short_exits: None,
        }
    }

    /// Check every present array has exactly `len` elements.
    pub fn validate(&self, len: usize) -> Result<()> {
        let arrays = [
            ("entries", Some(&self.entries)),
            ("exits", Some(&self.exits)),
            ("short_entries", self.short_entries.as_ref()),
            ("short_exits", self.short_exits.as_ref()),
        ];
        for (name, array) in arrays {
            if let Some(values) = array {
                if values.len() != len {
                    return Err(Error::shape_mismatch(name, len, values.len()));
                }
            }
        }
        Ok(())
    }

    /// Whether any short arrays are present.
    pub fn has_shorts(&self) -> bool {
        self.short_entries.is_some() || self.short_exits.is_some()
    }
}

/// Equity curve point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: Timestamp,
    pub value: f64,
}

/// Named scalar performance metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    TotalTrades,
    WinningTrades,
    LosingTrades,
    WinRate,
    LossRate,
    TotalReturn,
    TotalReturnPct,
    MaxDrawdown,
    MaxDrawdownPct,
    MaxConsecutiveWins,
    MaxConsecutiveLosses,
    GrossProfit,
    GrossLoss,
    ProfitFactor,
    SharpeRatio,
    SortinoRatio,
    CalmarRatio,
    RecoveryFactor,
    Expectancy,
    ExpectancyRatio,
    PayoffRatio,
    AvgWin,
    AvgLoss,
    LargestWin,
    LargestLoss,
    TotalCommission,
    AvgTradeDuration,
    AvgMae,
    AvgMfe,
    FinalEquity,
}

impl Metric {
    /// Every metric, in report order.
    pub const ALL: [Metric; 30] = [
        Metric::TotalTrades,
        Metric::WinningTrades,
        Metric::LosingTrades,
        Metric::WinRate,
        Metric::LossRate,
        Metric::TotalReturn,
        Metric::TotalReturnPct,
        Metric::MaxDrawdown,
        Metric::MaxDrawdownPct,
        Metric::MaxConsecutiveWins,
        Metric::MaxConsecutiveLosses,
        Metric::GrossProfit,
        Metric::GrossLoss,
        Metric::ProfitFactor,
        Metric::SharpeRatio,
        Metric::SortinoRatio,
        Metric::CalmarRatio,
        Metric::RecoveryFactor,
        Metric::Expectancy,
        Metric::ExpectancyRatio,
        Metric::PayoffRatio,
        Metric::AvgWin,
        Metric::AvgLoss,
        Metric::LargestWin,
        Metric::LargestLoss,
        Metric::TotalCommission,
        Metric::AvgTradeDuration,
        Metric::AvgMae,
        Metric::AvgMfe,
        Metric::FinalEquity,
    ];

    /// Snake-case name used in result maps.
    pub fn name(self) -> &'static str {
        match self {
            Metric::TotalTrades => "total_trades",
            Metric::WinningTrades => "winning_trades",
            Metric::LosingTrades => "losing_trades",
            Metric::WinRate => "win_rate",
            Metric::LossRate => "loss_rate",
            Metric::TotalReturn => "total_return",
            Metric::TotalReturnPct => "total_return_pct",
            Metric::MaxDrawdown => "max_drawdown",
            Metric::MaxDrawdownPct => "max_drawdown_pct",
            Metric::MaxConsecutiveWins => "max_consecutive_wins",
            Metric::MaxConsecutiveLosses => "max_consecutive_losses",
            Metric::GrossProfit => "gross_profit",
            Metric::GrossLoss => "gross_loss",
            Metric::ProfitFactor => "profit_factor",
            Metric::SharpeRatio => "sharpe_ratio",
            Metric::SortinoRatio => "sortino_ratio",
            Metric::CalmarRatio => "calmar_ratio",
            Metric::RecoveryFactor => "recovery_factor",
            Metric::Expectancy => "expectancy",
            Metric::ExpectancyRatio => "expectancy_ratio",
            Metric::PayoffRatio => "payoff_ratio",
            Metric::AvgWin => "avg_win",
            Metric::AvgLoss => "avg_loss",
            Metric::LargestWin => "largest_win",
            Metric::LargestLoss => "largest_loss",
            Metric::TotalCommission => "total_commission",
            Metric::AvgTradeDuration => "avg_trade_duration",
            Metric::AvgMae => "avg_mae",
            Metric::AvgMfe => "avg_mfe",
            Metric::FinalEquity => "final_equity",
        }
    }

    /// Look a metric up by its snake-case name.
    pub fn from_name(name: &str) -> Option<Metric> {
        Metric::ALL.iter().copied().find(|m| m.name() == name)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single strategy parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl ParamValue {
    /// Numeric view, if the value is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            ParamValue::Bool(_) | ParamValue::Text(_) => None,
        }
    }

    /// Integer view; floats with no fractional part convert too.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

/// One concrete parameter combination, keyed by parameter name.
pub type ParamSet = BTreeMap<String, ParamValue>;

/// Candidate values per parameter name.
pub type ParamGrid = BTreeMap<String, Vec<ParamValue>>;

/// Read a numeric parameter, falling back to `default` when absent.
pub fn param_f64(params: &ParamSet, name: &str, default: f64) -> Result<f64> {
    match params.get(name) {
        None => Ok(default),
        Some(v) => v
            .as_f64()
            .ok_or_else(|| Error::config(format!("parameter '{name}' must be numeric, got {v}"))),
    }
}

/// Read a positive integer parameter, falling back to `default` when absent.
pub fn param_usize(params: &ParamSet, name: &str, default: usize) -> Result<usize> {
    match params.get(name) {
        None => Ok(default),
        Some(v) => v
            .as_i64()
            .filter(|n| *n > 0)
            .map(|n| n as usize)
            .ok_or_else(|| {
                Error::config(format!("parameter '{name}' must be a positive integer, got {v}"))
            }),
    }
}

/// Expand a grid into every combination (Cartesian product).
///
/// Parameters vary in key order with the last key changing fastest. An empty
/// grid yields a single empty combination; a parameter with no candidates
/// yields none.
pub fn expand_grid(grid: &ParamGrid) -> Vec<ParamSet> {
    let mut combos = vec![ParamSet::new()];
    for (name, values) in grid {
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in values {
                let mut extended = combo.clone();
                extended.insert(name.clone(), value.clone());
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bar(time: Timestamp, close: f64) -> Bar {
        Bar {
            time,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
        }
    }

    #[test]
    fn test_validate_bars_ordering() {
        let bars = vec![make_bar(60, 1.0), make_bar(120, 2.0), make_bar(180, 3.0)];
        assert!(validate_bars(&bars).is_ok());
        assert!(validate_bars(&[]).is_ok());

        let dup = vec![make_bar(60, 1.0), make_bar(60, 2.0)];
        assert!(matches!(validate_bars(&dup), Err(Error::Data(_))));

        let backwards = vec![make_bar(120, 1.0), make_bar(60, 2.0)];
        assert!(validate_bars(&backwards).is_err());
    }

    #[test]
    fn test_true_range() {
        let bar = make_bar(0, 100.0);
        assert_eq!(bar.true_range(None), 2.0);
        // Gap up from 95: high - prev close dominates
        assert_eq!(bar.true_range(Some(95.0)), 6.0);
    }

    #[test]
    fn test_signal_set_shape() {
        let set = SignalSet::long_only(vec![false; 5], vec![false; 5]);
        assert!(set.validate(5).is_ok());
        assert!(!set.has_shorts());

        let err = set.validate(6).unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch { expected: 6, actual: 5, .. }
        ));

        let bad_short = SignalSet {
            short_entries: Some(vec![true; 4]),
            ..SignalSet::long_only(vec![false; 5], vec![false; 5])
        };
        assert!(bad_short.has_shorts());
        match bad_short.validate(5) {
            Err(Error::ShapeMismatch { name, .. }) => assert_eq!(name, "short_entries"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_metric_names_round_trip() {
        for metric in Metric::ALL {
            assert_eq!(Metric::from_name(metric.name()), Some(metric));
        }
        assert_eq!(Metric::from_name("nope"), None);
        let json = serde_json::to_string(&Metric::ProfitFactor).unwrap();
        assert_eq!(json, "\"profit_factor\"");
    }

    #[test]
    fn test_expand_grid() {
        let mut grid = ParamGrid::new();
        grid.insert("fast".into(), vec![5.into(), 10.into()]);
        grid.insert("slow".into(), vec![20.into(), 30.into(), 40.into()]);

        let combos = expand_grid(&grid);
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0]["fast"], ParamValue::Int(5));
        assert_eq!(combos[0]["slow"], ParamValue::Int(20));
        assert_eq!(combos[1]["slow"], ParamValue::Int(30));
        assert_eq!(combos[5]["fast"], ParamValue::Int(10));

        assert_eq!(expand_grid(&ParamGrid::new()).len(), 1);
    }

    #[test]
    fn test_param_readers() {
        let mut params = ParamSet::new();
        params.insert("period".into(), ParamValue::Float(14.0));
        params.insert("mult".into(), ParamValue::Float(2.5));
        params.insert("name".into(), "x".into());

        assert_eq!(param_usize(&params, "period", 3).unwrap(), 14);
        assert_eq!(param_usize(&params, "missing", 3).unwrap(), 3);
        assert!(param_usize(&params, "mult", 3).is_err());
        assert_eq!(param_f64(&params, "mult", 1.0).unwrap(), 2.5);
        assert!(param_f64(&params, "name", 1.0).is_err());
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date(1_704_067_200), "2024-01-01");
    }
}
