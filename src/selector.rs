//! Trade candidate selection
//!
//! Regime-gated threshold rule: a bull market only ever opens longs, a bear
//! market only ever opens shorts, and a bar without a regime never trades.

use crate::{MarketBar, Regime, Signal};

/// Decide whether a bar opens a position at the given probability threshold.
///
/// Ties at exactly `threshold` count as a hit.
pub fn select(regime: Option<Regime>, long_prob: f64, short_prob: f64, threshold: f64) -> Signal {
    match regime {
        Some(Regime::Bull) if long_prob >= threshold => Signal::Long,
        Some(Regime::Bear) if short_prob >= threshold => Signal::Short,
        _ => Signal::NoTrade,
    }
}

/// [`select`] applied to a scored bar
pub fn select_bar(bar: &MarketBar, threshold: f64) -> Signal {
    select(bar.regime, bar.long_prob, bar.short_prob, threshold)
}

/// Probability backing the signal, used to rank candidates
pub fn signal_probability(bar: &MarketBar, signal: Signal) -> Option<f64> {
    match signal {
        Signal::Long => Some(bar.long_prob),
        Signal::Short => Some(bar.short_prob),
        Signal::NoTrade => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bear_regime_opens_short() {
        assert_eq!(select(Some(Regime::Bear), 0.77, 0.77, 0.75), Signal::Short);
    }

    #[test]
    fn test_bull_regime_never_shorts() {
        assert_eq!(select(Some(Regime::Bull), 0.10, 0.77, 0.75), Signal::NoTrade);
        assert_eq!(select(Some(Regime::Bull), 0.77, 0.77, 0.75), Signal::Long);
    }

    #[test]
    fn test_bear_regime_never_longs() {
        assert_eq!(select(Some(Regime::Bear), 0.99, 0.10, 0.75), Signal::NoTrade);
    }

    #[test]
    fn test_missing_regime_is_no_trade() {
        assert_eq!(select(None, 1.0, 1.0, 0.5), Signal::NoTrade);
    }

    #[test]
    fn test_threshold_tie_is_a_hit() {
        assert_eq!(select(Some(Regime::Bull), 0.70, 0.0, 0.70), Signal::Long);
        assert_eq!(select(Some(Regime::Bear), 0.0, 0.70, 0.70), Signal::Short);
        assert_eq!(select(Some(Regime::Bull), 0.6999, 0.0, 0.70), Signal::NoTrade);
    }
}
