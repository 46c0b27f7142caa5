use super::moving_average::calculate_sma;

/// Bollinger Bands at the latest price
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl BollingerBands {
    /// Band width as a percentage of the middle band.
    /// The regime detectors use this as their volatility proxy.
    pub fn width_pct(&self) -> f64 {
        if self.middle == 0.0 {
            return 0.0;
        }
        (self.upper - self.lower) / self.middle * 100.0
    }
}

/// Calculate Bollinger Bands: SMA(period) ± k standard deviations
/// over the trailing window.
pub fn calculate_bollinger(prices: &[f64], period: usize, k: f64) -> Option<BollingerBands> {
    if period < 2 || prices.len() < period {
        return None;
    }

    let middle = calculate_sma(prices, period)?;
    let window = &prices[prices.len() - period..];

    let variance =
        window.iter().map(|p| (p - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    Some(BollingerBands {
        upper: middle + k * std_dev,
        middle,
        lower: middle - k * std_dev,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bollinger_flat_series_collapses() {
        let prices = vec![100.0; 25];
        let bands = calculate_bollinger(&prices, 20, 2.0).unwrap();
        assert_eq!(bands.middle, 100.0);
        assert!((bands.upper - bands.lower).abs() < 1e-9);
        assert!(bands.width_pct() < 1e-9);
    }

    #[test]
    fn test_bollinger_bands_bracket_mean() {
        let prices: Vec<f64> = (0..30)
            .map(|i| 100.0 + if i % 2 == 0 { 2.0 } else { -2.0 })
            .collect();
        let bands = calculate_bollinger(&prices, 20, 2.0).unwrap();
        assert!(bands.upper > bands.middle);
        assert!(bands.lower < bands.middle);
        assert!(bands.width_pct() > 0.0);
    }

    #[test]
    fn test_bollinger_insufficient_data() {
        let prices = vec![100.0; 5];
        assert!(calculate_bollinger(&prices, 20, 2.0).is_none());
        assert!(calculate_bollinger(&prices, 1, 2.0).is_none());
    }
}
