use crate::math::stats::StatsHelper;
use crate::prelude::{
    ProcessingStage, StageConfig, StageInput, StageMetadata, StageOutput, StageResult,
};
use crate::telemetry::log::LogManager;

/// Removes the arithmetic mean.
pub struct DemeanStage {
    logger: LogManager,
}

impl DemeanStage {
    pub fn new() -> Self {
        Self {
            logger: LogManager::new(),
        }
    }
}

impl Default for DemeanStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for DemeanStage {
    fn name(&self) -> &'static str {
        "demean"
    }

    fn initialize(&mut self, _config: &StageConfig) -> StageResult<()> {
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput> {
        let mut trace = input.trace;
        let mean = StatsHelper::mean(&trace.samples);
        for sample in trace.samples.iter_mut() {
            *sample -= mean;
        }
        self.logger
            .record(self.name(), &format!("removed mean {:.4}", mean));

        Ok(StageOutput {
            trace,
            metadata: StageMetadata {
                notes: vec![format!("mean {:.4}", mean)],
            },
        })
    }

    fn cleanup(&mut self) {}
}
