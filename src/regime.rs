//! Market regime classification from a benchmark index
//!
//! The benchmark closing above its moving average is a bull regime,
//! otherwise bear. Dates inside the moving-average warm-up have no regime.

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::indicators;
use crate::{Candle, MarketBar, Regime};

/// Default benchmark moving-average length
pub const DEFAULT_REGIME_SMA: usize = 50;

/// Regime per benchmark date
#[derive(Debug, Clone, Default)]
pub struct RegimeSeries {
    by_date: HashMap<NaiveDate, Regime>,
    latest: Option<(NaiveDate, Regime)>,
}

impl RegimeSeries {
    /// Classify every benchmark candle past the SMA warm-up
    pub fn from_benchmark(candles: &[Candle], sma_period: usize) -> Self {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let sma = indicators::sma(&closes, sma_period);

        let mut series = RegimeSeries::default();
        for (candle, avg) in candles.iter().zip(sma) {
            let Some(avg) = avg else { continue };
            let regime = classify(candle.close, avg);
            series.by_date.insert(candle.date, regime);
            if series.latest.map_or(true, |(d, _)| candle.date >= d) {
                series.latest = Some((candle.date, regime));
            }
        }
        series
    }

    /// Overwrite each bar's regime with the benchmark regime on its date
    pub fn attach(&self, bars: &mut [MarketBar]) {
        for bar in bars.iter_mut() {
            bar.regime = self.get(bar.date);
        }
    }

    pub fn get(&self, date: NaiveDate) -> Option<Regime> {
        self.by_date.get(&date).copied()
    }

    /// Regime on the most recent benchmark date
    pub fn latest(&self) -> Option<(NaiveDate, Regime)> {
        self.latest
    }

    pub fn len(&self) -> usize {
        self.by_date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }
}

/// Close strictly above the moving average is bullish
pub fn classify(close: f64, moving_average: f64) -> Regime {
    if close > moving_average {
        Regime::Bull
    } else {
        Regime::Bear
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn candles(closes: &[f64]) -> Vec<Candle> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                date: start + Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1_000.0,
            })
            .collect()
    }

    #[test]
    fn test_warmup_has_no_regime() {
        let bench = candles(&[10.0, 11.0, 12.0, 9.0]);
        let series = RegimeSeries::from_benchmark(&bench, 3);

        assert_eq!(series.len(), 2);
        assert_eq!(series.get(bench[1].date), None);
        assert_eq!(series.get(bench[2].date), Some(Regime::Bull));
        assert_eq!(series.get(bench[3].date), Some(Regime::Bear));
        assert_eq!(series.latest(), Some((bench[3].date, Regime::Bear)));
    }

    #[test]
    fn test_attach_by_date() {
        let bench = candles(&[10.0, 11.0, 12.0]);
        let series = RegimeSeries::from_benchmark(&bench, 2);
        let mut bars: Vec<MarketBar> = [bench[0].date, bench[2].date]
            .iter()
            .map(|&date| MarketBar {
                date,
                ticker: crate::Ticker::new("AAPL"),
                close: 1.0,
                high: 1.0,
                low: 1.0,
                long_prob: 0.0,
                short_prob: 0.0,
                regime: Some(Regime::Bear),
            })
            .collect();

        series.attach(&mut bars);
        assert_eq!(bars[0].regime, None);
        assert_eq!(bars[1].regime, Some(Regime::Bull));
    }

    #[test]
    fn test_close_equal_to_average_is_bear() {
        assert_eq!(classify(100.0, 100.0), Regime::Bear);
    }
}
