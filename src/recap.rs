//! End-of-day movers recap

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::config::Config;
use crate::data;
use crate::{Candle, Ticker};

/// Day-over-day change of one ticker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mover {
    pub ticker: Ticker,
    pub close: f64,
    /// Percent, not fraction
    pub change_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MoversReport {
    pub gainers: Vec<Mover>,
    pub losers: Vec<Mover>,
}

/// Percent change between the last two closes; `None` with fewer than two
/// candles or a non-positive previous close
pub fn last_change(candles: &[Candle]) -> Option<f64> {
    let [.., prev, last] = candles else {
        return None;
    };
    (prev.close > 0.0).then(|| (last.close - prev.close) / prev.close * 100.0)
}

impl MoversReport {
    /// Top `n` gainers (best first) and `n` losers (worst first). A ticker
    /// never appears on both sides.
    pub fn from_universe(universe: &BTreeMap<Ticker, Vec<Candle>>, n: usize) -> Self {
        let mut movers: Vec<Mover> = universe
            .iter()
            .filter_map(|(ticker, candles)| {
                let change_pct = last_change(candles)?;
                Some(Mover {
                    ticker: ticker.clone(),
                    close: candles.last()?.close,
                    change_pct,
                })
            })
            .collect();

        movers.sort_by(|a, b| b.change_pct.total_cmp(&a.change_pct));

        let gainer_count = n.min(movers.len());
        let mut losers = movers.split_off(gainer_count);
        losers.reverse();
        losers.truncate(n);

        MoversReport {
            gainers: movers,
            losers,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.gainers.is_empty() && self.losers.is_empty()
    }
}

/// Movers across the configured universe
pub fn recap_from_config(config: &Config) -> anyhow::Result<MoversReport> {
    let universe = data::load_universe(&config.data.candles_dir, &config.data.tickers());
    if universe.is_empty() {
        anyhow::bail!("No candle files found in {}", config.data.candles_dir);
    }
    Ok(MoversReport::from_universe(&universe, config.bot.recap_size))
}

impl fmt::Display for MoversReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "No recap data available.");
        }

        writeln!(f, "END OF DAY – MOVERS")?;
        writeln!(f)?;
        writeln!(f, "Top {} Gainers:", self.gainers.len())?;
        for m in &self.gainers {
            writeln!(f, "{}: {:.2}%", m.ticker, m.change_pct)?;
        }
        writeln!(f)?;
        write!(f, "Top {} Losers:", self.losers.len())?;
        for m in &self.losers {
            write!(f, "\n{}: {:.2}%", m.ticker, m.change_pct)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn two_day(prev: f64, last: f64) -> Vec<Candle> {
        let d = |day| NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        vec![
            Candle::new(d(1), prev, prev, prev, prev, 0.0).unwrap(),
            Candle::new(d(2), last, last, last, last, 0.0).unwrap(),
        ]
    }

    fn universe() -> BTreeMap<Ticker, Vec<Candle>> {
        [
            ("AAA", 100.0, 110.0),
            ("BBB", 100.0, 95.0),
            ("CCC", 100.0, 102.0),
            ("DDD", 100.0, 80.0),
        ]
        .into_iter()
        .map(|(t, p, l)| (Ticker::new(t), two_day(p, l)))
        .collect()
    }

    #[test]
    fn test_last_change() {
        assert_relative_eq!(last_change(&two_day(50.0, 55.0)).unwrap(), 10.0, epsilon = 1e-9);
        assert_eq!(last_change(&two_day(50.0, 55.0)[..1]), None);
    }

    #[test]
    fn test_gainers_and_losers_do_not_overlap() {
        let report = MoversReport::from_universe(&universe(), 2);
        let gainers: Vec<_> = report.gainers.iter().map(|m| m.ticker.as_str()).collect();
        let losers: Vec<_> = report.losers.iter().map(|m| m.ticker.as_str()).collect();
        assert_eq!(gainers, vec!["AAA", "CCC"]);
        assert_eq!(losers, vec!["DDD", "BBB"]);

        let small = MoversReport::from_universe(&universe(), 3);
        assert_eq!(small.gainers.len(), 3);
        assert_eq!(small.losers.len(), 1);
    }

    #[test]
    fn test_render() {
        let text = MoversReport::from_universe(&universe(), 1).to_string();
        assert!(text.starts_with("END OF DAY – MOVERS"));
        assert!(text.contains("AAA: 10.00%"));
        assert!(text.ends_with("DDD: -20.00%"));
        assert_eq!(MoversReport::default().to_string(), "No recap data available.");
    }
}
