use super::moving_average::ema_series;

/// MACD line, signal line and histogram at the latest price
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdOutput {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Calculate MACD (Moving Average Convergence Divergence)
///
/// MACD line = EMA(fast) - EMA(slow); signal line = EMA(signal_period) of
/// the MACD line; histogram = MACD - signal. The histogram sign and
/// magnitude are what the strategies consume.
pub fn calculate_macd(
    prices: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> Option<MacdOutput> {
    if fast_period == 0 || slow_period <= fast_period || signal_period == 0 {
        return None;
    }
    if prices.len() < slow_period + signal_period {
        return None;
    }

    let fast = ema_series(prices, fast_period)?;
    let slow = ema_series(prices, slow_period)?;

    // Align the two series on their shared tail
    let offset = fast.len() - slow.len();
    let macd_line: Vec<f64> = slow
        .iter()
        .enumerate()
        .map(|(i, s)| fast[i + offset] - s)
        .collect();

    let signal_line = ema_series(&macd_line, signal_period)?;

    let macd = *macd_line.last()?;
    let signal = *signal_line.last()?;

    Some(MacdOutput {
        macd,
        signal,
        histogram: macd - signal,
    })
}
