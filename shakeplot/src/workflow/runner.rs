use crate::workflow::config::ValidatedConfig;
use anyhow::Context;
use log::info;
use seiscore::geodesy::{epicentral_distance, EpicentralDistance};
use seiscore::math::StatsHelper;
use seiscore::prelude::StageConfig;
use seiscore::processing::ConditioningChain;
use seiscore::taup::{PhaseArrival, PhasePredictor};
use seiscore::waveform::{merge_runs, ConditionedTrace, WaveformService};
use seiscore::window::format_timestamp;
use std::path::PathBuf;
use visualizer::{FigureComposer, FigureRequest};

/// Distance and arrivals for the configured event/station pair.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub distance: EpicentralDistance,
    pub arrivals: Vec<PhaseArrival>,
}

pub struct WorkflowResult {
    pub trace: ConditionedTrace,
    pub prediction: Prediction,
    pub output: PathBuf,
}

/// Runs the trace branch and the prediction branch, then draws both.
pub struct Runner {
    config: ValidatedConfig,
    predictor: PhasePredictor,
}

impl Runner {
    pub fn new(config: ValidatedConfig, predictor: PhasePredictor) -> Self {
        Self { config, predictor }
    }

    pub fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    /// Fetch, merge and condition the station trace.
    pub fn condition(&self, service: &dyn WaveformService) -> anyhow::Result<ConditionedTrace> {
        let config = &self.config;
        let raw = service
            .fetch(&config.id, &config.window)
            .with_context(|| format!("fetching {} for {}", config.id, config.window))?;
        info!(
            "{} runs, {} samples for {}",
            raw.runs.len(),
            raw.sample_count(),
            config.id
        );
        let merged = merge_runs(raw).context("merging waveform runs")?;
        let stage_config = StageConfig::new(config.window, config.filter);
        let trace = ConditioningChain::new()
            .run(&stage_config, merged)
            .context("conditioning waveform")?;
        info!(
            "{} conditioned from {} to {}, peak {:.4} mm/s",
            trace.id,
            format_timestamp(&trace.start),
            format_timestamp(&trace.end()),
            StatsHelper::peak(&trace.samples) * 1000.0
        );
        Ok(trace)
    }

    pub fn predict(&self) -> anyhow::Result<Prediction> {
        let config = &self.config;
        let distance = epicentral_distance(&config.event, &config.station)
            .context("computing epicentral distance")?;
        info!("epicentral distance {} ({:.0} km)", distance, distance.km());
        let arrivals = self
            .predictor
            .predict(config.event.depth_km, distance, &config.request)
            .context("predicting phase arrivals")?;
        Ok(Prediction { distance, arrivals })
    }

    pub fn execute(&self, service: &dyn WaveformService) -> anyhow::Result<WorkflowResult> {
        let prediction = self.predict()?;
        self.finish(service, prediction)
    }

    /// Conditions the trace and renders it against an existing prediction.
    pub fn finish(
        &self,
        service: &dyn WaveformService,
        prediction: Prediction,
    ) -> anyhow::Result<WorkflowResult> {
        let trace = self.condition(service)?;
        let config = &self.config;
        let request = FigureRequest {
            trace: &trace,
            origin: config.window.origin,
            arrivals: &prediction.arrivals,
            distance: prediction.distance,
            source_depth_km: config.event.depth_km,
            filter: &config.filter,
            model: self.predictor.model(),
            label: &config.label,
        };
        FigureComposer::new(config.width, config.height)
            .render(&request, &config.output)
            .with_context(|| format!("rendering {}", config.output.display()))?;

        Ok(WorkflowResult {
            trace,
            prediction,
            output: config.output.clone(),
        })
    }
}
