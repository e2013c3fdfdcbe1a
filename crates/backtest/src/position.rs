//! Position tracking for backtesting.
//!
//! Tracks the open position, cash balance and closed trades.

use rigor_core::{Bar, Side, Timestamp};
use serde::{Deserialize, Serialize};

use crate::fill_model::Fill;

/// An open position.
#[derive(Debug, Clone)]
pub struct Position {
    /// Position side.
    pub side: Side,
    /// Size in contracts.
    pub size: f64,
    /// Entry fill price.
    pub entry_price: f64,
    /// Entry timestamp.
    pub entry_time: Timestamp,
    /// Index of the entry bar.
    pub entry_index: usize,
    /// Protective stop.
    pub stop_loss: Option<f64>,
    /// Profit target.
    pub take_profit: Option<f64>,
    /// Commission paid on entry.
    pub entry_commission: f64,
    /// Most negative unrealized P&L seen so far (<= 0).
    pub mae: f64,
    /// Most positive unrealized P&L seen so far (>= 0).
    pub mfe: f64,
}

impl Position {
    /// Price move in the position's favour.
    #[inline]
    pub fn points(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price)
    }

    /// Unrealized P&L at `price`, before commissions.
    pub fn unrealized_pnl(&self, price: f64, point_value: f64) -> f64 {
        self.points(price) * point_value * self.size
    }

    /// Check if the stop traded within the bar.
    pub fn is_stopped(&self, bar: &Bar) -> bool {
        match (self.side, self.stop_loss) {
            (Side::Long, Some(stop)) => bar.low <= stop,
            (Side::Short, Some(stop)) => bar.high >= stop,
            _ => false,
        }
    }

    /// Check if the target traded within the bar.
    pub fn is_target_hit(&self, bar: &Bar) -> bool {
        match (self.side, self.take_profit) {
            (Side::Long, Some(tp)) => bar.high >= tp,
            (Side::Short, Some(tp)) => bar.low <= tp,
            _ => false,
        }
    }

    /// Fold the unrealized P&L at `price` into MAE/MFE.
    pub fn update_excursions(&mut self, price: f64, point_value: f64) {
        let pnl = self.unrealized_pnl(price, point_value);
        self.mae = self.mae.min(pnl);
        self.mfe = self.mfe.max(pnl);
    }
}

/// Reason for exiting a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Strategy requested a close (or an exit array fired).
    Signal,
    /// Stop loss traded.
    StopLoss,
    /// Take profit traded.
    TakeProfit,
    /// Closed to reverse into the opposite side.
    Flip,
    /// Force-closed on the final bar.
    EndOfData,
}

/// Closed trade record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Monotonic per-run identifier, starting at 1.
    pub id: u64,
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: Timestamp,
    pub exit_time: Timestamp,
    /// Bar index of the entry.
    pub entry_index: usize,
    /// Bar index of the exit.
    pub exit_index: usize,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    /// Gross P&L: `pnl_points * point_value * size`.
    pub pnl: f64,
    /// Price move in the trade's favour.
    pub pnl_points: f64,
    /// Commission for both sides.
    pub commission: f64,
    /// `pnl - commission`.
    pub net_pnl: f64,
    /// Maximum adverse excursion (<= 0).
    pub mae: f64,
    /// Maximum favorable excursion (>= 0).
    pub mfe: f64,
    pub exit_reason: ExitReason,
}

impl Trade {
    /// Holding time in seconds.
    pub fn duration(&self) -> i64 {
        self.exit_time - self.entry_time
    }
}

/// Cash, open position and closed trades of one run.
#[derive(Debug, Clone)]
pub struct Ledger {
    /// Realized cash balance.
    cash: f64,
    /// Currency value of one point per contract.
    point_value: f64,
    /// Current open position.
    position: Option<Position>,
    /// Closed trades.
    trades: Vec<Trade>,
    next_id: u64,
}

impl Ledger {
    /// Create a new ledger.
    pub fn new(initial_balance: f64, point_value: f64) -> Self {
        Self {
            cash: initial_balance,
            point_value,
            position: None,
            trades: Vec::new(),
            next_id: 1,
        }
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn side(&self) -> Option<Side> {
        self.position.as_ref().map(|p| p.side)
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// Open a position from an entry fill. Ignored if one is already open.
    pub fn open_position(
        &mut self,
        fill: Fill,
        entry_index: usize,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) {
        if self.position.is_some() {
            return;
        }
        self.position = Some(Position {
            side: fill.side,
            size: fill.size,
            entry_price: fill.price,
            entry_time: fill.time,
            entry_index,
            stop_loss,
            take_profit,
            entry_commission: fill.commission,
            mae: 0.0,
            mfe: 0.0,
        });
    }

    /// Close the open position with an exit fill and book the trade.
    pub fn close_position(
        &mut self,
        fill: Fill,
        exit_index: usize,
        reason: ExitReason,
    ) -> Option<&Trade> {
        let position = self.position.take()?;

        let pnl_points = position.points(fill.price);
        let pnl = pnl_points * self.point_value * position.size;
        let commission = position.entry_commission + fill.commission;
        let net_pnl = pnl - commission;

        self.cash += net_pnl;
        self.trades.push(Trade {
            id: self.next_id,
            side: position.side,
            size: position.size,
            entry_price: position.entry_price,
            exit_price: fill.price,
            entry_time: position.entry_time,
            exit_time: fill.time,
            entry_index: position.entry_index,
            exit_index,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            pnl,
            pnl_points,
            commission,
            net_pnl,
            mae: position.mae,
            mfe: position.mfe,
            exit_reason: reason,
        });
        self.next_id += 1;
        self.trades.last()
    }

    /// Update MAE/MFE of the open position at `price`.
    pub fn update_excursions(&mut self, price: f64) {
        let point_value = self.point_value;
        if let Some(pos) = self.position.as_mut() {
            pos.update_excursions(price, point_value);
        }
    }

    /// Mark-to-market equity: cash plus unrealized P&L, net of the entry
    /// commission already paid on the open position.
    pub fn equity(&self, mark_price: f64) -> f64 {
        match &self.position {
            Some(pos) => {
                self.cash + pos.unrealized_pnl(mark_price, self.point_value) - pos.entry_commission
            }
            None => self.cash,
        }
    }

    /// Consume the ledger, returning the closed trades.
    pub fn into_trades(self) -> Vec<Trade> {
        self.trades
    }
}
