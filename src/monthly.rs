//! Month-by-month breakdown of a cell's trade log
//!
//! Trades are grouped by entry month. Returns are summed as fractions, so a
//! month's total is the cost-adjusted return of its trades added together,
//! not compounded.

use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

use crate::TradeOutcome;

/// Stats for one calendar month
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlyStats {
    pub trades: usize,
    pub wins: usize,
    pub total_return: f64,
}

impl MonthlyStats {
    fn add_trade(&mut self, trade: &TradeOutcome) {
        self.trades += 1;
        if trade.is_win() {
            self.wins += 1;
        }
        self.total_return += trade.return_pct;
    }

    /// Fraction in [0, 1]; zero for an empty month
    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            0.0
        } else {
            self.wins as f64 / self.trades as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl std::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// Trade stats keyed by entry month, oldest first
#[derive(Debug, Clone, Default)]
pub struct MonthlyBreakdown {
    data: BTreeMap<YearMonth, MonthlyStats>,
}

impl MonthlyBreakdown {
    pub fn from_trades(trades: &[TradeOutcome]) -> Self {
        let mut data = BTreeMap::new();
        for trade in trades {
            data.entry(YearMonth::from_date(trade.entry_date))
                .or_insert_with(MonthlyStats::default)
                .add_trade(trade);
        }
        Self { data }
    }

    pub fn get(&self, year: i32, month: u32) -> Option<&MonthlyStats> {
        self.data.get(&YearMonth { year, month })
    }

    pub fn months(&self) -> impl Iterator<Item = (&YearMonth, &MonthlyStats)> {
        self.data.iter()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Share of months with a positive summed return
    pub fn positive_month_rate(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let positive = self.data.values().filter(|m| m.total_return > 0.0).count();
        positive as f64 / self.data.len() as f64
    }

    pub fn render(&self) -> String {
        if self.data.is_empty() {
            return "No trades to display monthly breakdown.".to_string();
        }

        let mut output = String::new();
        output.push_str(&format!("\n{}\n", "=".repeat(52)));
        output.push_str("MONTHLY BREAKDOWN (by entry month)\n");
        output.push_str(&format!("{}\n", "=".repeat(52)));
        output.push_str(&format!(
            "{:>8} │ {:>7} │ {:>6} │ {:>7} │ {:>12}\n",
            "Month", "Trades", "Wins", "Win%", "Sum Return"
        ));
        output.push_str(&format!("{}\n", "-".repeat(52)));

        for (ym, stats) in &self.data {
            output.push_str(&format!(
                "{:>8} │ {:>7} │ {:>6} │ {:>7.1} │ {:>11.2}%\n",
                ym.to_string(),
                stats.trades,
                stats.wins,
                stats.win_rate() * 100.0,
                stats.total_return * 100.0
            ));
        }

        output.push_str(&format!("{}\n", "=".repeat(52)));
        output.push_str(&format!(
            "Positive months: {:.1}% ({} months)\n",
            self.positive_month_rate() * 100.0,
            self.data.len()
        ));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Direction, ExitReason, Ticker};
    use approx::assert_relative_eq;

    fn trade(y: i32, m: u32, d: u32, return_pct: f64) -> TradeOutcome {
        TradeOutcome {
            ticker: Ticker::new("AAPL"),
            direction: Direction::Long,
            entry_date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            entry_price: 100.0,
            exit_price: 100.0 * (1.0 + return_pct),
            return_pct,
            exit_reason: ExitReason::TimeExit,
            bars_held: 5,
        }
    }

    #[test]
    fn test_groups_by_entry_month() {
        let trades = vec![
            trade(2024, 1, 3, 0.02),
            trade(2024, 1, 20, -0.01),
            trade(2024, 2, 1, -0.03),
        ];
        let breakdown = MonthlyBreakdown::from_trades(&trades);

        assert_eq!(breakdown.len(), 2);
        let jan = breakdown.get(2024, 1).unwrap();
        assert_eq!(jan.trades, 2);
        assert_eq!(jan.wins, 1);
        assert_relative_eq!(jan.total_return, 0.01, epsilon = 1e-12);
        assert_relative_eq!(jan.win_rate(), 0.5);
        assert_relative_eq!(breakdown.positive_month_rate(), 0.5);
    }

    #[test]
    fn test_render_lists_months_in_order() {
        let trades = vec![trade(2024, 3, 1, 0.01), trade(2023, 12, 1, 0.01)];
        let text = MonthlyBreakdown::from_trades(&trades).render();
        let dec = text.find("2023-12").unwrap();
        let mar = text.find("2024-03").unwrap();
        assert!(dec < mar);
    }
}
