use crate::math::fft::FftHelper;
use crate::prelude::{
    PipelineError, ProcessingStage, StageConfig, StageInput, StageMetadata, StageOutput,
    StageResult,
};
use crate::telemetry::log::LogManager;
use crate::waveform::{InstrumentResponse, TransferFunction};
use num_complex::Complex64;
use std::f64::consts::PI;

/// Deconvolves the instrument response, leaving ground velocity in m/s.
pub struct ResponseStage {
    config: Option<StageConfig>,
    logger: LogManager,
}

impl ResponseStage {
    pub fn new() -> Self {
        Self {
            config: None,
            logger: LogManager::new(),
        }
    }
}

impl Default for ResponseStage {
    fn default() -> Self {
        Self::new()
    }
}

/// Cosine taper over `fraction / 2` of the samples at each end.
pub fn cosine_taper(samples: &mut [f64], fraction: f64) {
    let width = ((samples.len() as f64) * fraction / 2.0).floor() as usize;
    if width == 0 {
        return;
    }
    let last = samples.len() - 1;
    for index in 0..width {
        let weight = 0.5 * (1.0 - (PI * index as f64 / width as f64).cos());
        samples[index] *= weight;
        samples[last - index] *= weight;
    }
}

/// Velocity response at each positive-frequency bin `1..=nfft/2`.
fn velocity_response(
    response: &InstrumentResponse,
    order: i32,
    nfft: usize,
    sampling_rate: f64,
) -> Vec<Complex64> {
    (1..=nfft / 2)
        .map(|bin| {
            let frequency = bin as f64 * sampling_rate / nfft as f64;
            let derivative = Complex64::new(0.0, 2.0 * PI * frequency).powi(order - 1);
            response.evaluate(frequency) * derivative
        })
        .collect()
}

impl ProcessingStage for ResponseStage {
    fn name(&self) -> &'static str {
        "response"
    }

    fn initialize(&mut self, config: &StageConfig) -> StageResult<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput> {
        let config = self
            .config
            .as_ref()
            .ok_or(PipelineError::Uninitialized("response"))?;
        let mut trace = input.trace;
        let failure = |reason: String| PipelineError::ResponseRemoval {
            id: trace.id.to_string(),
            reason,
        };

        let response = trace.response.as_ref().ok_or_else(|| {
            failure(
                trace
                    .missing_response
                    .clone()
                    .unwrap_or_else(|| "no instrument response available".into()),
            )
        })?;
        if response.paz.transfer == TransferFunction::Digital {
            return Err(failure(
                "digital (z-transform) poles/zeros stages are not supported".into(),
            ));
        }
        let units = response.ground_units().ok_or_else(|| {
            failure(format!("unsupported input units {:?}", response.input_units))
        })?;
        if trace.samples.is_empty() {
            return Err(failure("trace holds no samples".into()));
        }

        let count = trace.samples.len();
        let nfft = FftHelper::padded_length(2 * count);
        let fft = FftHelper::new(nfft);

        let mut samples = trace.samples.clone();
        cosine_taper(&mut samples, config.taper_fraction);
        let mut spectrum = fft.forward(&samples);

        let mut gains = velocity_response(response, units.order(), nfft, trace.sampling_rate);
        if gains.iter().any(|gain| !gain.re.is_finite() || !gain.im.is_finite()) {
            return Err(failure("response evaluates to a non-finite value".into()));
        }
        let peak = gains.iter().fold(0.0f64, |peak, gain| peak.max(gain.norm()));
        if peak <= 0.0 {
            return Err(failure("response is zero at every frequency".into()));
        }

        let floor = peak * 10f64.powf(-config.water_level_db / 20.0);
        let mut clipped = 0usize;
        for gain in gains.iter_mut() {
            let magnitude = gain.norm();
            if magnitude < floor {
                *gain = if magnitude > 0.0 {
                    *gain * (floor / magnitude)
                } else {
                    Complex64::new(floor, 0.0)
                };
                clipped += 1;
            }
        }

        spectrum[0] = Complex64::new(0.0, 0.0);
        for (offset, gain) in gains.iter().enumerate() {
            let bin = offset + 1;
            spectrum[bin] /= *gain;
            let mirror = nfft - bin;
            if mirror != bin {
                spectrum[mirror] /= gain.conj();
            }
        }

        let mut restored = fft.inverse_real(spectrum);
        restored.truncate(count);
        trace.samples = restored;
        trace.response = None;

        self.logger.record(
            self.name(),
            &format!(
                "deconvolved {} samples ({} bins, {} under water level)",
                count,
                nfft,
                clipped
            ),
        );

        Ok(StageOutput {
            trace,
            metadata: StageMetadata {
                notes: vec![format!("water level clipped {} bins", clipped)],
            },
        })
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::stats::StatsHelper;
    use crate::processing::fixtures;

    #[test]
    fn flat_response_divides_by_sensitivity() {
        let config = fixtures::config(0.0, 10.0);
        let mut stage = ResponseStage::new();
        stage.initialize(&config).unwrap();

        let counts = fixtures::sine(1.0, 100.0, 1000, 5000.0);
        let output = stage
            .execute(StageInput {
                trace: fixtures::trace(counts.clone(), 100.0),
            })
            .unwrap();
        assert!(output.trace.response.is_none());
        for index in 100..900 {
            let expected = counts[index] / 1000.0;
            assert!((output.trace.samples[index] - expected).abs() < 1e-3);
        }
        stage.cleanup();
    }

    #[test]
    fn missing_response_is_an_error() {
        let config = fixtures::config(0.0, 10.0);
        let mut stage = ResponseStage::new();
        stage.initialize(&config).unwrap();
        let mut trace = fixtures::trace(vec![1.0; 16], 1.0);
        trace.response = None;
        let err = stage.execute(StageInput { trace }).unwrap_err();
        assert!(matches!(err, PipelineError::ResponseRemoval { .. }));
    }

    #[test]
    fn missing_response_reports_the_lookup_failure() {
        let config = fixtures::config(0.0, 10.0);
        let mut stage = ResponseStage::new();
        stage.initialize(&config).unwrap();
        let mut trace = fixtures::trace(vec![1.0; 16], 1.0);
        trace.response = None;
        trace.missing_response = Some("station metadata request failed: HTTP 500".into());
        match stage.execute(StageInput { trace }).unwrap_err() {
            PipelineError::ResponseRemoval { id, reason } => {
                assert_eq!(id, "AM.RAEBE.00.EHZ");
                assert!(reason.contains("HTTP 500"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn digital_stage_is_rejected() {
        let config = fixtures::config(0.0, 10.0);
        let mut stage = ResponseStage::new();
        stage.initialize(&config).unwrap();
        let mut trace = fixtures::trace(vec![1.0; 16], 1.0);
        let mut response = InstrumentResponse::flat_velocity(1000.0);
        response.paz.transfer = TransferFunction::from_station_xml("DIGITAL (Z-TRANSFORM)");
        trace.response = Some(response);
        match stage.execute(StageInput { trace }).unwrap_err() {
            PipelineError::ResponseRemoval { reason, .. } => assert!(reason.contains("digital")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn zero_response_is_an_error() {
        let config = fixtures::config(0.0, 10.0);
        let mut stage = ResponseStage::new();
        stage.initialize(&config).unwrap();
        let mut trace = fixtures::trace(vec![1.0; 16], 1.0);
        trace.response = Some(InstrumentResponse::flat_velocity(0.0));
        let err = stage.execute(StageInput { trace }).unwrap_err();
        assert!(matches!(err, PipelineError::ResponseRemoval { .. }));
    }

    #[test]
    fn taper_touches_only_the_edges() {
        let mut samples = vec![1.0; 200];
        cosine_taper(&mut samples, 0.05);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[199], 0.0);
        assert!(samples[3] < 1.0);
        assert_eq!(StatsHelper::mean(&samples[5..195]), 1.0);
    }

    #[test]
    fn execute_requires_initialize() {
        let mut stage = ResponseStage::new();
        let err = stage
            .execute(StageInput {
                trace: fixtures::trace(vec![1.0; 4], 1.0),
            })
            .unwrap_err();
        assert!(matches!(err, PipelineError::Uninitialized(_)));
    }
}
