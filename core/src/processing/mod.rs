pub mod bandpass;
pub mod chain;
pub mod demean;
pub mod response;
pub mod trim;

pub use bandpass::{BandpassStage, FilterSpec};
pub use chain::ConditioningChain;
pub use demean::DemeanStage;
pub use response::ResponseStage;
pub use trim::{trim_to_window, TrimStage};

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::prelude::StageConfig;
    use crate::processing::FilterSpec;
    use crate::waveform::{InstrumentResponse, MergedTrace, StationChannelId};
    use crate::window::{parse_timestamp, AcquisitionWindow};
    use std::f64::consts::PI;

    pub fn origin() -> crate::window::Timestamp {
        parse_timestamp("2020-01-07T08:24:26").unwrap()
    }

    pub fn sine(frequency: f64, sampling_rate: f64, count: usize, amplitude: f64) -> Vec<f64> {
        (0..count)
            .map(|i| amplitude * (2.0 * PI * frequency * i as f64 / sampling_rate).sin())
            .collect()
    }

    pub fn trace(samples: Vec<f64>, sampling_rate: f64) -> MergedTrace {
        MergedTrace {
            id: StationChannelId::new("AM", "RAEBE", "00", "EHZ"),
            start: origin(),
            sampling_rate,
            samples,
            response: Some(InstrumentResponse::flat_velocity(1000.0)),
            missing_response: None,
        }
    }

    pub fn config(pre: f64, post: f64) -> StageConfig {
        let window = AcquisitionWindow::resolve(origin(), pre, post).unwrap();
        StageConfig::new(window, FilterSpec::new(0.3, 0.7, 4))
    }
}
