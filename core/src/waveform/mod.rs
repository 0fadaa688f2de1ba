pub mod merge;
pub mod response;
pub mod trace;

pub use merge::merge_runs;
pub use response::{GroundUnits, InstrumentResponse, PolesZeros, TransferFunction};
pub use trace::{ConditionedTrace, MergedTrace, RawTrace, SampleRun, StationChannelId};

use crate::prelude::StageResult;
use crate::window::AcquisitionWindow;

/// Source of raw samples and response metadata for one station channel.
///
/// A fetch is a single blocking call; implementations never retry.
pub trait WaveformService {
    fn fetch(&self, id: &StationChannelId, window: &AcquisitionWindow) -> StageResult<RawTrace>;
}
