//! Technical indicators for daily feature construction
//!
//! Moving averages go through the `ta` crate. Rolling-window statistics the
//! dataset needs in their simple (non-smoothed) form are implemented here:
//! the RSI and ATR below use plain rolling means, not Wilder smoothing.
//!
//! Every function returns one entry per input value; `None` marks warm-up.

use ta::indicators::SimpleMovingAverage;
use ta::Next;

/// RSI reported when the average loss over the window is zero
pub const RSI_MAX: f64 = 100.0;

// =============================================================================
// Moving Averages
// =============================================================================

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let sma_val = indicator.next(value);
            (i + 1 >= period).then_some(sma_val)
        })
        .collect()
}

// =============================================================================
// Returns and Windows
// =============================================================================

/// Fractional change over `periods` bars: `v[i] / v[i - periods] - 1`
pub fn pct_change(values: &[f64], periods: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if periods == 0 || i < periods || values[i - periods] == 0.0 {
                None
            } else {
                Some(values[i] / values[i - periods] - 1.0)
            }
        })
        .collect()
}

/// Maximum over the trailing window ending at each index (inclusive)
pub fn rolling_max(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, |w| w.iter().copied().fold(f64::MIN, f64::max))
}

/// Minimum over the trailing window ending at each index (inclusive)
pub fn rolling_min(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, |w| w.iter().copied().fold(f64::MAX, f64::min))
}

fn rolling(values: &[f64], period: usize, f: impl Fn(&[f64]) -> f64) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if period == 0 || i + 1 < period {
                None
            } else {
                Some(f(&values[i + 1 - period..=i]))
            }
        })
        .collect()
}

// =============================================================================
// Momentum
// =============================================================================

/// Relative Strength Index over simple rolling means of gains and losses.
///
/// The first value is available at index `period` (one bar is consumed by
/// the first difference). A window with no losses yields [`RSI_MAX`].
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let deltas: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();

    let mut result = vec![None; values.len()];
    for i in period..values.len() {
        // deltas[j] is the change into values[j + 1]
        let window = &deltas[i - period..i];
        let avg_gain = window.iter().map(|d| d.max(0.0)).sum::<f64>() / period as f64;
        let avg_loss = window.iter().map(|d| (-d).max(0.0)).sum::<f64>() / period as f64;

        result[i] = Some(if avg_loss == 0.0 {
            RSI_MAX
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - 100.0 / (1.0 + rs)
        });
    }

    result
}

// =============================================================================
// Volatility
// =============================================================================

/// Calculate True Range
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..high.len())
        .map(|i| {
            let hl = high[i] - low[i];
            if i == 0 {
                hl
            } else {
                let hc = (high[i] - close[i - 1]).abs();
                let lc = (low[i] - close[i - 1]).abs();
                hl.max(hc).max(lc)
            }
        })
        .collect()
}

/// Average True Range as a simple rolling mean of the true range
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    if high.is_empty() || period == 0 || high.len() != low.len() || high.len() != close.len() {
        return vec![];
    }

    sma(&true_range(high, low, close), period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sma() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert_relative_eq!(result[2].unwrap(), 2.0);
        assert_relative_eq!(result[4].unwrap(), 4.0);
    }

    #[test]
    fn test_pct_change() {
        let values = vec![100.0, 110.0, 121.0];
        let result = pct_change(&values, 1);
        assert_eq!(result[0], None);
        assert_relative_eq!(result[1].unwrap(), 0.10, epsilon = 1e-12);
        assert_relative_eq!(pct_change(&values, 2)[2].unwrap(), 0.21, epsilon = 1e-12);
    }

    #[test]
    fn test_rolling_extremes() {
        let values = vec![3.0, 1.0, 4.0, 1.0, 5.0];
        assert_eq!(rolling_max(&values, 3), vec![None, None, Some(4.0), Some(4.0), Some(5.0)]);
        assert_eq!(rolling_min(&values, 2), vec![None, Some(1.0), Some(1.0), Some(1.0), Some(1.0)]);
    }

    #[test]
    fn test_rsi_all_gains_hits_sentinel() {
        let values: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let result = rsi(&values, 14);
        assert_eq!(result[13], None);
        assert_eq!(result[14], Some(RSI_MAX));
    }

    #[test]
    fn test_rsi_balanced_moves() {
        // Alternating +1 / -1: equal average gain and loss
        let values: Vec<f64> = (0..16).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
        let result = rsi(&values, 14);
        assert_relative_eq!(result[14].unwrap(), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_atr_rolling_mean() {
        let high = vec![10.0, 11.0, 12.0, 11.0];
        let low = vec![9.0, 10.0, 11.0, 10.0];
        let close = vec![9.5, 10.5, 11.5, 10.5];

        let tr = true_range(&high, &low, &close);
        assert_relative_eq!(tr[0], 1.0);
        // Gap from the previous close dominates the bar range
        assert_relative_eq!(tr[1], 1.5);

        let result = atr(&high, &low, &close, 3);
        assert_eq!(result[1], None);
        assert_relative_eq!(result[2].unwrap(), (1.0 + 1.5 + 1.5) / 3.0, epsilon = 1e-9);
    }
}
