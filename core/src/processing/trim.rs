use crate::prelude::{
    PipelineError, ProcessingStage, StageConfig, StageInput, StageMetadata, StageOutput,
    StageResult,
};
use crate::telemetry::log::LogManager;
use crate::waveform::MergedTrace;
use crate::window::{format_timestamp, seconds_between, shift, AcquisitionWindow};

/// Largest distance, in samples, a trace edge may fall short of the window.
const EDGE_TOLERANCE_SAMPLES: f64 = 1.0;

/// Cuts `trace` to the samples nearest `window.start` and `window.end`, both inclusive.
pub fn trim_to_window(trace: MergedTrace, window: &AcquisitionWindow) -> StageResult<MergedTrace> {
    let incomplete = |reason: String| PipelineError::IncompleteTrace {
        id: trace.id.to_string(),
        reason,
    };
    if trace.samples.is_empty() {
        return Err(incomplete("trace holds no samples".into()));
    }

    let delta = trace.delta();
    let last_index = (trace.samples.len() - 1) as f64;
    let first = seconds_between(window.start, trace.start) / delta;
    let last = seconds_between(window.end, trace.start) / delta;

    if first < -EDGE_TOLERANCE_SAMPLES {
        return Err(incomplete(format!(
            "data starts at {}, after the window start {}",
            format_timestamp(&trace.start),
            format_timestamp(&window.start)
        )));
    }
    if last > last_index + EDGE_TOLERANCE_SAMPLES {
        return Err(incomplete(format!(
            "data ends at {}, before the window end {}",
            format_timestamp(&trace.end()),
            format_timestamp(&window.end)
        )));
    }

    let first = first.round().max(0.0) as usize;
    let last = last.round().min(last_index) as usize;
    if first > last {
        return Err(incomplete("window selects no samples".into()));
    }

    let start = shift(trace.start, first as f64 * delta);
    let samples = trace.samples[first..=last].to_vec();
    Ok(MergedTrace {
        start,
        samples,
        ..trace
    })
}

pub struct TrimStage {
    window: Option<AcquisitionWindow>,
    logger: LogManager,
}

impl TrimStage {
    pub fn new() -> Self {
        Self {
            window: None,
            logger: LogManager::new(),
        }
    }
}

impl Default for TrimStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for TrimStage {
    fn name(&self) -> &'static str {
        "trim"
    }

    fn initialize(&mut self, config: &StageConfig) -> StageResult<()> {
        self.window = Some(config.window);
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput> {
        let window = self.window.ok_or(PipelineError::Uninitialized("trim"))?;
        let before = input.trace.samples.len();
        let trace = trim_to_window(input.trace, &window)?;
        let note = format!("kept {} of {} samples", trace.samples.len(), before);
        self.logger.record(self.name(), &note);
        Ok(StageOutput {
            trace,
            metadata: StageMetadata { notes: vec![note] },
        })
    }

    fn cleanup(&mut self) {
        self.window = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::fixtures;

    fn ramp(count: usize, sampling_rate: f64, lead_seconds: f64) -> MergedTrace {
        let mut trace = fixtures::trace((0..count).map(|i| i as f64).collect(), sampling_rate);
        trace.start = shift(fixtures::origin(), -lead_seconds);
        trace
    }

    #[test]
    fn trim_keeps_inclusive_nearest_samples() {
        let window = fixtures::config(0.0, 2.0).window;
        let trimmed = trim_to_window(ramp(60, 10.0, 1.0), &window).unwrap();
        assert_eq!(trimmed.samples.len(), 21);
        assert_eq!(trimmed.samples[0], 10.0);
        assert_eq!(trimmed.samples[20], 30.0);
        assert_eq!(trimmed.start, window.start);
    }

    #[test]
    fn trim_is_idempotent() {
        let window = fixtures::config(0.5, 2.0).window;
        let once = trim_to_window(ramp(60, 10.0, 1.03), &window).unwrap();
        let twice = trim_to_window(once.clone(), &window).unwrap();
        assert_eq!(once.samples, twice.samples);
        assert_eq!(once.start, twice.start);
    }

    #[test]
    fn trim_tolerates_one_sample_at_the_edges() {
        let window = fixtures::config(0.0, 2.0).window;
        let trimmed = trim_to_window(ramp(20, 10.0, 0.0), &window).unwrap();
        assert_eq!(trimmed.samples.len(), 20);
    }

    #[test]
    fn short_trace_is_incomplete() {
        let window = fixtures::config(5.0, 2.0).window;
        let err = trim_to_window(ramp(60, 10.0, 1.0), &window).unwrap_err();
        assert!(matches!(err, PipelineError::IncompleteTrace { .. }));

        let window = fixtures::config(0.0, 20.0).window;
        let err = trim_to_window(ramp(60, 10.0, 1.0), &window).unwrap_err();
        assert!(matches!(err, PipelineError::IncompleteTrace { .. }));
    }
}
