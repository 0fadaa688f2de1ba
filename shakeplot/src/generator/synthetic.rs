use rand::{rngs::StdRng, Rng, SeedableRng};
use seiscore::prelude::StageResult;
use seiscore::taup::PhaseArrival;
use seiscore::waveform::{
    InstrumentResponse, RawTrace, SampleRun, StationChannelId, WaveformService,
};
use seiscore::window::{seconds_between, shift, AcquisitionWindow};
use std::f64::consts::PI;

/// Counts per m/s of a Raspberry Shake geophone channel.
const SENSITIVITY: f64 = 3.99e8;
/// Samples shared by the two runs the trace is delivered in.
const RUN_OVERLAP: usize = 25;

/// A wavelet placed at a fixed time after origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wavelet {
    pub offset_seconds: f64,
    /// Peak ground velocity, m/s.
    pub amplitude: f64,
    pub frequency_hz: f64,
}

/// Offline waveform source: seeded noise plus wavelets, recorded by a flat
/// velocity sensor and served as two overlapping runs.
#[derive(Debug, Clone)]
pub struct SyntheticService {
    pub sampling_rate: f64,
    pub seed: u64,
    /// Noise amplitude, m/s.
    pub noise: f64,
    pub wavelets: Vec<Wavelet>,
}

impl SyntheticService {
    pub fn new(seed: u64) -> Self {
        Self {
            sampling_rate: 20.0,
            seed,
            noise: 2e-7,
            wavelets: Vec::new(),
        }
    }

    /// One wavelet per predicted arrival; later phases are drawn larger, like S
    /// after P.
    pub fn with_arrivals(seed: u64, arrivals: &[PhaseArrival]) -> Self {
        let mut service = Self::new(seed);
        service.wavelets = arrivals
            .iter()
            .enumerate()
            .map(|(index, arrival)| Wavelet {
                offset_seconds: arrival.time,
                amplitude: 2e-6 * (index + 1) as f64,
                frequency_hz: 0.5,
            })
            .collect();
        service
    }

    fn ground_velocity(&self, seconds_after_origin: f64) -> f64 {
        self.wavelets
            .iter()
            .map(|wavelet| {
                let t = seconds_after_origin - wavelet.offset_seconds;
                let envelope = (-(t * wavelet.frequency_hz / 2.0).powi(2)).exp();
                wavelet.amplitude * envelope * (2.0 * PI * wavelet.frequency_hz * t).sin()
            })
            .sum()
    }
}

impl WaveformService for SyntheticService {
    fn fetch(&self, id: &StationChannelId, window: &AcquisitionWindow) -> StageResult<RawTrace> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let delta = 1.0 / self.sampling_rate;
        let count = (window.duration_seconds() * self.sampling_rate).round() as usize + 1;
        let lead = seconds_between(window.start, window.origin);

        let counts: Vec<f64> = (0..count)
            .map(|index| {
                let t = lead + index as f64 * delta;
                let noise = rng.gen_range(-1.0..1.0) * self.noise;
                ((self.ground_velocity(t) + noise) * SENSITIVITY).round()
            })
            .collect();

        let split = (count / 2).max(1).min(count);
        let second_start = split.saturating_sub(RUN_OVERLAP);
        let mut runs = vec![SampleRun::new(
            window.start,
            self.sampling_rate,
            counts[..split].to_vec(),
        )];
        if split < count {
            runs.push(SampleRun::new(
                shift(window.start, second_start as f64 * delta),
                self.sampling_rate,
                counts[second_start..].to_vec(),
            ));
        }

        Ok(RawTrace {
            id: id.clone(),
            runs,
            response: Some(InstrumentResponse::flat_velocity(SENSITIVITY)),
            missing_response: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seiscore::waveform::merge_runs;
    use seiscore::window::parse_timestamp;

    fn window() -> AcquisitionWindow {
        let origin = parse_timestamp("2020-01-07T08:24:26").unwrap();
        AcquisitionWindow::resolve(origin, 0.0, 100.0).unwrap()
    }

    #[test]
    fn runs_overlap_and_merge_cleanly() {
        let id = StationChannelId::new("AM", "RAEBE", "00", "EHZ");
        let raw = SyntheticService::new(7).fetch(&id, &window()).unwrap();
        assert_eq!(raw.runs.len(), 2);
        assert_eq!(raw.sample_count(), 2001 + RUN_OVERLAP);
        let merged = merge_runs(raw).unwrap();
        assert_eq!(merged.samples.len(), 2001);
        assert_eq!(merged.start, window().start);
    }

    #[test]
    fn same_seed_same_samples() {
        let id = StationChannelId::new("AM", "RAEBE", "00", "EHZ");
        let a = SyntheticService::new(3).fetch(&id, &window()).unwrap();
        let b = SyntheticService::new(3).fetch(&id, &window()).unwrap();
        assert_eq!(a.runs, b.runs);
    }

    #[test]
    fn wavelet_peaks_near_its_offset() {
        let mut service = SyntheticService::new(0);
        service.noise = 0.0;
        service.wavelets.push(Wavelet {
            offset_seconds: 40.0,
            amplitude: 1e-5,
            frequency_hz: 0.5,
        });
        assert!(service.ground_velocity(10.0).abs() < 1e-12);
        let near = (0..40)
            .map(|i| service.ground_velocity(38.0 + i as f64 * 0.1).abs())
            .fold(0.0f64, f64::max);
        assert!(near > 5e-6);
    }
}
