use crate::waveform::response::InstrumentResponse;
use crate::window::{seconds_between, shift, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Network/station/location/channel key used to address the data service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StationChannelId {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
}

impl StationChannelId {
    pub fn new(network: &str, station: &str, location: &str, channel: &str) -> Self {
        Self {
            network: network.to_string(),
            station: station.to_string(),
            location: location.to_string(),
            channel: channel.to_string(),
        }
    }
}

impl fmt::Display for StationChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }
}

/// Contiguous samples as delivered by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRun {
    pub start: Timestamp,
    pub sampling_rate: f64,
    pub samples: Vec<f64>,
}

impl SampleRun {
    pub fn new(start: Timestamp, sampling_rate: f64, samples: Vec<f64>) -> Self {
        Self {
            start,
            sampling_rate,
            samples,
        }
    }
}

/// Unmerged service response: possibly gapped or overlapping runs.
#[derive(Debug, Clone)]
pub struct RawTrace {
    pub id: StationChannelId,
    pub runs: Vec<SampleRun>,
    pub response: Option<InstrumentResponse>,
    /// Why `response` is absent, when the metadata lookup said so.
    pub missing_response: Option<String>,
}

impl RawTrace {
    pub fn sample_count(&self) -> usize {
        self.runs.iter().map(|run| run.samples.len()).sum()
    }
}

/// One gap-free run on a single sample grid; the working form during conditioning.
#[derive(Debug, Clone)]
pub struct MergedTrace {
    pub id: StationChannelId,
    pub start: Timestamp,
    pub sampling_rate: f64,
    pub samples: Vec<f64>,
    pub response: Option<InstrumentResponse>,
    pub missing_response: Option<String>,
}

impl MergedTrace {
    pub fn delta(&self) -> f64 {
        1.0 / self.sampling_rate
    }

    pub fn end(&self) -> Timestamp {
        let count = self.samples.len().saturating_sub(1);
        shift(self.start, count as f64 * self.delta())
    }

    pub fn into_conditioned(self) -> ConditionedTrace {
        ConditionedTrace {
            id: self.id,
            start: self.start,
            sampling_rate: self.sampling_rate,
            samples: self.samples,
        }
    }
}

/// Ground velocity in m/s covering the acquisition window.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionedTrace {
    pub id: StationChannelId,
    pub start: Timestamp,
    pub sampling_rate: f64,
    pub samples: Vec<f64>,
}

impl ConditionedTrace {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn end(&self) -> Timestamp {
        let count = self.samples.len().saturating_sub(1);
        shift(self.start, count as f64 / self.sampling_rate)
    }

    /// Sample times in seconds after `origin`.
    pub fn times_relative_to(&self, origin: Timestamp) -> Vec<f64> {
        let offset = seconds_between(self.start, origin);
        (0..self.samples.len())
            .map(|index| offset + index as f64 / self.sampling_rate)
            .collect()
    }
}
