pub mod backtest;
pub mod bot;
pub mod dataset;
pub mod recap;
pub mod scan;

/// Parse comma-separated floats, rejecting anything unparsable
pub fn parse_float_list(s: &str) -> anyhow::Result<Vec<f64>> {
    s.split(',')
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .map(|x| {
            x.parse::<f64>()
                .map_err(|e| anyhow::anyhow!("invalid number '{}': {}", x, e))
        })
        .collect()
}
