//! Butterworth bandpass design as cascaded second-order sections.
//!
//! The analog prototype is prewarped, shifted to a bandpass, mapped through
//! the bilinear transform and split into biquads. Every biquad is scaled to
//! unit gain at the geometric centre of the band.

use crate::prelude::{PipelineError, StageResult};
use num_complex::Complex64;
use std::f64::consts::PI;

const REAL_TOLERANCE: f64 = 1e-12;

/// One biquad: `b0 + b1 z^-1 + b2 z^-2` over `1 + a1 z^-1 + a2 z^-2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Section {
    pub b: [f64; 3],
    pub a: [f64; 2],
}

impl Section {
    fn response(&self, z_inv: Complex64) -> Complex64 {
        let z2 = z_inv * z_inv;
        let numerator = self.b[0] + z_inv * self.b[1] + z2 * self.b[2];
        let denominator = Complex64::new(1.0, 0.0) + z_inv * self.a[0] + z2 * self.a[1];
        numerator / denominator
    }

    /// Transposed direct form II, in place.
    fn run(&self, samples: &mut [f64]) {
        let (mut s1, mut s2) = (0.0, 0.0);
        for sample in samples.iter_mut() {
            let x = *sample;
            let y = self.b[0] * x + s1;
            s1 = self.b[1] * x - self.a[0] * y + s2;
            s2 = self.b[2] * x - self.a[1] * y;
            *sample = y;
        }
    }
}

/// Cascade of second-order sections.
#[derive(Debug, Clone, PartialEq)]
pub struct SosFilter {
    sections: Vec<Section>,
    sampling_rate: f64,
}

impl SosFilter {
    /// Designs an `order`-pole Butterworth bandpass between `low_hz` and `high_hz`.
    pub fn bandpass(order: usize, low_hz: f64, high_hz: f64, sampling_rate: f64) -> StageResult<Self> {
        let nyquist = sampling_rate / 2.0;
        if order == 0 {
            return Err(PipelineError::InvalidFilter("order must be at least 1".into()));
        }
        if !(low_hz > 0.0 && low_hz < high_hz && high_hz < nyquist) {
            return Err(PipelineError::InvalidFilter(format!(
                "corners must satisfy 0 < {low_hz} < {high_hz} < {nyquist} (Nyquist)"
            )));
        }

        let warp = |f: f64| 4.0 * (PI * f / sampling_rate).tan();
        let (w1, w2) = (warp(low_hz), warp(high_hz));
        let bandwidth = w2 - w1;
        let centre = (w1 * w2).sqrt();

        let mut upper = Vec::new();
        let mut real = Vec::new();
        for k in 0..order {
            let m = 2.0 * k as f64 + 1.0 - order as f64;
            let prototype = -Complex64::from_polar(1.0, PI * m / (2.0 * order as f64));
            let shifted = prototype * (bandwidth / 2.0);
            let offset = (shifted * shifted - centre * centre).sqrt();
            for analog in [shifted + offset, shifted - offset] {
                let digital = (4.0 + analog) / (4.0 - analog);
                if digital.im > REAL_TOLERANCE {
                    upper.push(digital);
                } else if digital.im.abs() <= REAL_TOLERANCE {
                    real.push(digital.re);
                }
            }
        }
        upper.sort_by(|a, b| a.norm().total_cmp(&b.norm()));

        let mut sections: Vec<Section> = upper
            .iter()
            .map(|pole| Section {
                b: [1.0, 0.0, -1.0],
                a: [-2.0 * pole.re, pole.norm_sqr()],
            })
            .collect();
        sections.extend(real.chunks_exact(2).map(|pair| Section {
            b: [1.0, 0.0, -1.0],
            a: [-(pair[0] + pair[1]), pair[0] * pair[1]],
        }));

        let centre_digital = 2.0 * (centre / 4.0).atan();
        let z_inv = Complex64::from_polar(1.0, -centre_digital);
        for section in sections.iter_mut() {
            let gain = section.response(z_inv).norm();
            for coefficient in section.b.iter_mut() {
                *coefficient /= gain;
            }
        }

        Ok(Self {
            sections,
            sampling_rate,
        })
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Magnitude response at `frequency` Hz.
    pub fn gain_at(&self, frequency: f64) -> f64 {
        let z_inv = Complex64::from_polar(1.0, -2.0 * PI * frequency / self.sampling_rate);
        self.sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, section| acc * section.response(z_inv))
            .norm()
    }

    /// Causal single pass.
    pub fn apply(&self, samples: &mut [f64]) {
        for section in &self.sections {
            section.run(samples);
        }
    }

    /// Forward then time-reversed pass; squares the magnitude, cancels the phase.
    pub fn apply_zero_phase(&self, samples: &mut [f64]) {
        self.apply(samples);
        samples.reverse();
        self.apply(samples);
        samples.reverse();
    }
}
