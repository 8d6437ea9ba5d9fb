//! Performance metrics over a finished trade ledger.

use std::collections::BTreeMap;

use super::position::Trade;
use super::simulator::EquityPoint;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percentage of trades with positive P&L.
    pub win_rate: f64,
    pub total_pnl: f64,
    /// Percent return on the initial balance.
    pub total_return: f64,
    /// Named extras: `avg_win`, `avg_loss`, `profit_factor`, `expectancy`,
    /// `largest_win`, `largest_loss`, `max_drawdown`. Keys are present only
    /// when they are defined for the ledger.
    pub named: BTreeMap<String, f64>,
}

impl Metrics {
    /// Breakeven trades count as losses. A ledger with no trades yields the
    /// all-zero default with an empty metric map.
    pub fn compute(
        trades: &[Trade],
        initial_balance: f64,
        final_balance: f64,
        equity_curve: &[EquityPoint],
    ) -> Self {
        if trades.is_empty() {
            return Metrics::default();
        }

        let mut winning_trades = 0usize;
        let mut losing_trades = 0usize;
        let mut total_profit = 0.0_f64;
        let mut total_loss = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;

        for trade in trades {
            let pnl = trade.pnl;
            if pnl > 0.0 {
                winning_trades += 1;
                total_profit += pnl;
                largest_win = largest_win.max(pnl);
            } else {
                losing_trades += 1;
                total_loss += pnl;
                largest_loss = largest_loss.min(pnl);
            }
        }

        let total_trades = trades.len();
        let mut named = BTreeMap::new();

        if winning_trades > 0 {
            named.insert("avg_win".to_string(), total_profit / winning_trades as f64);
            named.insert("largest_win".to_string(), largest_win);
        }
        let avg_loss = if losing_trades > 0 {
            total_loss / losing_trades as f64
        } else {
            0.0
        };
        if losing_trades > 0 {
            named.insert("avg_loss".to_string(), avg_loss);
            named.insert("largest_loss".to_string(), largest_loss);
        }
        if avg_loss != 0.0 {
            named.insert("profit_factor".to_string(), total_profit / -total_loss);
        }
        named.insert(
            "expectancy".to_string(),
            (total_profit + total_loss) / total_trades as f64,
        );
        named.insert("max_drawdown".to_string(), max_drawdown(equity_curve));

        let total_return = if initial_balance != 0.0 {
            (final_balance / initial_balance - 1.0) * 100.0
        } else {
            0.0
        };

        Metrics {
            total_trades,
            winning_trades,
            losing_trades,
            win_rate: winning_trades as f64 / total_trades as f64 * 100.0,
            total_pnl: final_balance - initial_balance,
            total_return,
            named,
        }
    }
}

/// Largest peak-to-trough decline of the equity curve, in percent of the peak.
fn max_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    let Some(first) = equity_curve.first() else {
        return 0.0;
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak * 100.0);
        }
    }
    max_dd
}
