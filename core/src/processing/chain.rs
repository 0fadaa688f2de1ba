use crate::prelude::{ProcessingStage, StageConfig, StageInput, StageResult};
use crate::processing::{BandpassStage, DemeanStage, ResponseStage, TrimStage};
use crate::telemetry::log::LogManager;
use crate::waveform::{ConditionedTrace, MergedTrace};

/// Demean, response removal, bandpass and trim, always in that order.
pub struct ConditioningChain {
    stages: Vec<Box<dyn ProcessingStage>>,
    logger: LogManager,
}

impl ConditioningChain {
    pub fn new() -> Self {
        Self {
            stages: vec![
                Box::new(DemeanStage::new()),
                Box::new(ResponseStage::new()),
                Box::new(BandpassStage::new()),
                Box::new(TrimStage::new()),
            ],
            logger: LogManager::new(),
        }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn run(&mut self, config: &StageConfig, trace: MergedTrace) -> StageResult<ConditionedTrace> {
        let id = trace.id.to_string();
        let mut current = trace;
        for stage in self.stages.iter_mut() {
            stage.initialize(config)?;
            let result = stage.execute(StageInput { trace: current });
            stage.cleanup();
            current = result?.trace;
        }
        self.logger.record(
            "conditioning",
            &format!(
                "{} conditioned to {} samples ({})",
                id,
                current.samples.len(),
                self.stage_names().join(" > ")
            ),
        );
        Ok(current.into_conditioned())
    }
}

impl Default for ConditioningChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::stats::StatsHelper;
    use crate::prelude::PipelineError;
    use crate::processing::fixtures;
    use crate::window::shift;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn stages_run_in_fixed_order() {
        let chain = ConditioningChain::new();
        assert_eq!(
            chain.stage_names(),
            vec!["demean", "response", "bandpass", "trim"]
        );
    }

    #[test]
    fn chain_produces_velocity_over_window() {
        let config = fixtures::config(10.0, 100.0);
        let mut trace = fixtures::trace(fixtures::sine(0.5, 20.0, 2600, 2000.0), 20.0);
        trace.start = shift(fixtures::origin(), -15.0);
        let mut rng = StdRng::seed_from_u64(42);
        for sample in trace.samples.iter_mut() {
            *sample += 300.0 + rng.gen_range(-50.0..50.0);
        }

        let conditioned = ConditioningChain::new().run(&config, trace).unwrap();
        assert_eq!(conditioned.samples.len(), 2201);
        assert_eq!(conditioned.start, config.window.start);
        let peak = conditioned.samples[1000..]
            .iter()
            .fold(0.0f64, |peak, v| peak.max(v.abs()));
        assert!((peak - 2.0).abs() < 0.1);
    }

    fn conditioned_rms(frequency: f64) -> f64 {
        let config = fixtures::config(0.0, 400.0);
        let trace = fixtures::trace(fixtures::sine(frequency, 20.0, 8001, 1000.0), 20.0);
        let conditioned = ConditioningChain::new().run(&config, trace).unwrap();
        assert_eq!(conditioned.samples.len(), 8001);
        StatsHelper::rms(&conditioned.samples[3000..7500])
    }

    #[test]
    fn conditioning_keeps_the_passband_only() {
        let pass = conditioned_rms(0.5);
        assert!((pass - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.05);
        assert!(conditioned_rms(0.01) < 0.01 * pass);
        assert!(conditioned_rms(5.0) < 0.01 * pass);
    }

    #[test]
    fn missing_response_aborts_chain() {
        let config = fixtures::config(0.0, 10.0);
        let mut trace = fixtures::trace(vec![0.0; 400], 20.0);
        trace.response = None;
        let err = ConditioningChain::new().run(&config, trace).unwrap_err();
        assert!(matches!(err, PipelineError::ResponseRemoval { .. }));
    }
}
