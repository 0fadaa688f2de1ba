pub struct StatsHelper;

impl StatsHelper {
    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    pub fn rms(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|&v| v * v).sum();
        (sum_sq / samples.len() as f64).sqrt()
    }

    /// Largest absolute value.
    pub fn peak(samples: &[f64]) -> f64 {
        samples.iter().fold(0.0, |peak, &v| peak.max(v.abs()))
    }

    /// `(min, max)` of the finite samples, `None` when there are none.
    pub fn bounds(samples: &[f64]) -> Option<(f64, f64)> {
        samples
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_zero_sequence_yields_zero() {
        assert_eq!(StatsHelper::rms(&[]), 0.0);
        assert_eq!(StatsHelper::rms(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn rms_handles_single_value() {
        assert_eq!(StatsHelper::rms(&[4.0]), 4.0);
    }

    #[test]
    fn mean_and_peak() {
        assert_eq!(StatsHelper::mean(&[1.0, 2.0, 6.0]), 3.0);
        assert_eq!(StatsHelper::peak(&[1.0, -7.5, 6.0]), 7.5);
    }

    #[test]
    fn bounds_skip_non_finite() {
        assert_eq!(StatsHelper::bounds(&[]), None);
        assert_eq!(
            StatsHelper::bounds(&[2.0, f64::NAN, -1.0, 5.0]),
            Some((-1.0, 5.0))
        );
    }
}
