use crate::math::butterworth::SosFilter;
use crate::prelude::{
    PipelineError, ProcessingStage, StageConfig, StageInput, StageMetadata, StageOutput,
    StageResult,
};
use crate::telemetry::log::LogManager;
use serde::{Deserialize, Serialize};

/// Butterworth bandpass parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub low_hz: f64,
    pub high_hz: f64,
    #[serde(default = "FilterSpec::default_order")]
    pub order: usize,
    /// Run forward and backward instead of a single causal pass.
    #[serde(default)]
    pub zerophase: bool,
}

impl FilterSpec {
    pub fn new(low_hz: f64, high_hz: f64, order: usize) -> Self {
        Self {
            low_hz,
            high_hz,
            order,
            zerophase: false,
        }
    }

    fn default_order() -> usize {
        4
    }

    /// Checks what can be checked before the sampling rate is known.
    pub fn validate(&self) -> StageResult<()> {
        if self.order == 0 {
            return Err(PipelineError::InvalidFilter("order must be at least 1".into()));
        }
        if !(self.low_hz.is_finite() && self.high_hz.is_finite())
            || self.low_hz <= 0.0
            || self.low_hz >= self.high_hz
        {
            return Err(PipelineError::InvalidFilter(format!(
                "corners must satisfy 0 < low < high, got {} and {}",
                self.low_hz, self.high_hz
            )));
        }
        Ok(())
    }

    pub fn design(&self, sampling_rate: f64) -> StageResult<SosFilter> {
        self.validate()?;
        SosFilter::bandpass(self.order, self.low_hz, self.high_hz, sampling_rate)
    }
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self::new(0.3, 0.7, 4)
    }
}

pub struct BandpassStage {
    spec: Option<FilterSpec>,
    logger: LogManager,
}

impl BandpassStage {
    pub fn new() -> Self {
        Self {
            spec: None,
            logger: LogManager::new(),
        }
    }
}

impl Default for BandpassStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for BandpassStage {
    fn name(&self) -> &'static str {
        "bandpass"
    }

    fn initialize(&mut self, config: &StageConfig) -> StageResult<()> {
        config.filter.validate()?;
        self.spec = Some(config.filter);
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput> {
        let spec = self.spec.ok_or(PipelineError::Uninitialized("bandpass"))?;
        let mut trace = input.trace;
        let filter = spec.design(trace.sampling_rate)?;

        if spec.zerophase {
            filter.apply_zero_phase(&mut trace.samples);
        } else {
            filter.apply(&mut trace.samples);
        }

        let note = format!(
            "{}-{} Hz order {} ({})",
            spec.low_hz,
            spec.high_hz,
            spec.order,
            if spec.zerophase { "zero-phase" } else { "causal" }
        );
        self.logger.record(self.name(), &note);

        Ok(StageOutput {
            trace,
            metadata: StageMetadata { notes: vec![note] },
        })
    }

    fn cleanup(&mut self) {
        self.spec = None;
    }
}
