use crate::processing::bandpass::FilterSpec;
use crate::waveform::MergedTrace;
use crate::window::AcquisitionWindow;
use serde::{Deserialize, Serialize};

/// Shared configuration for each conditioning stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub window: AcquisitionWindow,
    pub filter: FilterSpec,
    /// Water level below the peak response magnitude, in dB.
    pub water_level_db: f64,
    /// Total fraction of the trace tapered before deconvolution (half per side).
    pub taper_fraction: f64,
}

impl StageConfig {
    pub fn new(window: AcquisitionWindow, filter: FilterSpec) -> Self {
        Self {
            window,
            filter,
            water_level_db: 60.0,
            taper_fraction: 0.05,
        }
    }
}

/// Input payload for a conditioning stage.
#[derive(Debug, Clone)]
pub struct StageInput {
    pub trace: MergedTrace,
}

/// Output produced by each stage.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub trace: MergedTrace,
    pub metadata: StageMetadata,
}

/// Metadata used for chaining stages and logging.
#[derive(Debug, Clone, Default)]
pub struct StageMetadata {
    pub notes: Vec<String>,
}

/// Every failure a run can surface. All of them abort the run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("invalid acquisition window: {0}")]
    InvalidWindow(String),
    #[error("no data available for {id} between {window}")]
    DataUnavailable { id: String, window: String },
    #[error("incomplete trace for {id}: {reason}")]
    IncompleteTrace { id: String, reason: String },
    #[error("instrument response removal failed for {id}: {reason}")]
    ResponseRemoval { id: String, reason: String },
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),
    #[error("rendering failed: {0}")]
    Rendering(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("invalid phase {phase:?}: {reason}")]
    InvalidPhase { phase: String, reason: String },
    #[error("invalid source depth: {0}")]
    InvalidDepth(String),
    #[error("unknown velocity model: {0}")]
    UnknownModel(String),
    #[error("decode failure: {0}")]
    Decode(String),
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("stage {0} executed before initialize")]
    Uninitialized(&'static str),
}

pub type StageResult<T> = Result<T, PipelineError>;

/// A single step of the conditioning chain.
pub trait ProcessingStage {
    fn name(&self) -> &'static str;
    fn initialize(&mut self, config: &StageConfig) -> StageResult<()>;
    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput>;
    fn cleanup(&mut self);
}
