//! Core waveform conditioning, geodesy and travel-time prediction for
//! single-station earthquake plots.
//!
//! The crate is split along the two independent branches of a run: the
//! trace branch (`window` → `waveform` → `processing`) and the prediction
//! branch (`geodesy` → `taup`). Both only meet again when a figure is drawn.

pub mod codec;
pub mod geodesy;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod taup;
pub mod telemetry;
pub mod waveform;
pub mod window;

pub use prelude::{PipelineError, ProcessingStage, StageInput, StageOutput, StageResult};
