//! Technical indicators
//!
//! Moving averages used by the entry-point policies.

/// Calculate Simple Moving Average over a trailing window.
///
/// The first `period - 1` slots are `None`. A window containing a NaN yields
/// `None` rather than poisoning later values.
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());

    if period == 0 {
        result.resize(values.len(), None);
        return result;
    }

    for i in 0..values.len() {
        if i + 1 < period {
            result.push(None);
        } else {
            let window = &values[i + 1 - period..=i];
            if window.iter().any(|v| !v.is_finite()) {
                result.push(None);
            } else {
                let sum: f64 = window.iter().sum();
                result.push(Some(sum / period as f64));
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_calculation() {
        let values = vec![10.0, 11.0, 12.0, 13.0, 14.0];
        let sma = sma(&values, 3);

        assert_eq!(sma[0], None);
        assert_eq!(sma[1], None);
        assert_eq!(sma[2], Some(11.0)); // (10+11+12)/3
        assert_eq!(sma[3], Some(12.0));
        assert_eq!(sma[4], Some(13.0));
    }

    #[test]
    fn test_sma_skips_windows_with_nan() {
        let values = vec![1.0, f64::NAN, 3.0, 4.0, 5.0];
        let sma = sma(&values, 2);

        assert_eq!(sma, vec![None, None, None, Some(3.5), Some(4.5)]);
    }

    #[test]
    fn test_sma_zero_period() {
        assert_eq!(sma(&[1.0, 2.0], 0), vec![None, None]);
    }
}
