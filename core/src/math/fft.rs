use num_complex::Complex64;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;

/// Helper that wraps the `rustfft` planner for a fixed transform length.
pub struct FftHelper {
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    size: usize,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        Self {
            forward,
            inverse,
            size,
        }
    }

    /// Smallest power of two that holds at least `length` samples.
    pub fn padded_length(length: usize) -> usize {
        length.max(1).next_power_of_two()
    }

    /// Zero-padded forward transform of a real sequence.
    pub fn forward(&self, input: &[f64]) -> Vec<Complex64> {
        let mut buffer: Vec<Complex64> = input
            .iter()
            .take(self.size)
            .map(|&value| Complex64::new(value, 0.0))
            .collect();
        buffer.resize(self.size, Complex64::zero());
        self.forward.process(&mut buffer);
        buffer
    }

    /// Inverse transform, normalized by the length, keeping the real part.
    pub fn inverse_real(&self, mut spectrum: Vec<Complex64>) -> Vec<f64> {
        spectrum.resize(self.size, Complex64::zero());
        self.inverse.process(&mut spectrum);
        let scale = 1.0 / self.size as f64;
        spectrum.iter().map(|value| value.re * scale).collect()
    }
}
