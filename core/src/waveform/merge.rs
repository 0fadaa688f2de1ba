use crate::prelude::{PipelineError, StageResult};
use crate::waveform::trace::{MergedTrace, RawTrace};
use crate::window::{format_timestamp, seconds_between, shift};
use log::debug;

/// Relative sampling-rate mismatch tolerated between runs.
const RATE_TOLERANCE: f64 = 1e-6;

/// Stitches the runs of a raw trace onto one sample grid.
///
/// The grid is anchored at the earliest run start and every run is snapped to
/// its nearest slot. Runs are placed in order of arrival and a slot keeps the
/// first value written to it, so overlapping data resolves to the first-seen
/// samples. Any slot left empty is a gap and fails the merge.
pub fn merge_runs(raw: RawTrace) -> StageResult<MergedTrace> {
    let RawTrace {
        id,
        runs,
        response,
        missing_response,
    } = raw;
    let incomplete = |reason: String| PipelineError::IncompleteTrace {
        id: id.to_string(),
        reason,
    };

    let runs: Vec<_> = runs.into_iter().filter(|run| !run.samples.is_empty()).collect();
    let first = runs
        .first()
        .ok_or_else(|| incomplete("trace holds no samples".into()))?;
    let rate = first.sampling_rate;
    if !rate.is_finite() || rate <= 0.0 {
        return Err(incomplete(format!("invalid sampling rate {rate}")));
    }
    if let Some(run) = runs
        .iter()
        .find(|run| ((run.sampling_rate - rate) / rate).abs() > RATE_TOLERANCE)
    {
        return Err(incomplete(format!(
            "run at {} sampled at {} Hz, expected {} Hz",
            format_timestamp(&run.start),
            run.sampling_rate,
            rate
        )));
    }

    let anchor = runs
        .iter()
        .map(|run| run.start)
        .min()
        .unwrap_or(first.start);
    let mut slots: Vec<Option<f64>> = Vec::new();
    let mut overlapped = 0usize;
    for run in &runs {
        let offset = (seconds_between(run.start, anchor) * rate).round() as usize;
        let end = offset + run.samples.len();
        if slots.len() < end {
            slots.resize(end, None);
        }
        for (slot, &value) in slots[offset..end].iter_mut().zip(&run.samples) {
            match slot {
                Some(_) => overlapped += 1,
                None => *slot = Some(value),
            }
        }
    }
    if overlapped > 0 {
        debug!("{id}: dropped {overlapped} overlapping samples, keeping first-seen values");
    }

    if let Some(gap_start) = slots.iter().position(Option::is_none) {
        let gap_len = slots[gap_start..]
            .iter()
            .take_while(|slot| slot.is_none())
            .count();
        return Err(incomplete(format!(
            "gap of {} samples ({:.3} s) at {}",
            gap_len,
            gap_len as f64 / rate,
            format_timestamp(&shift(anchor, gap_start as f64 / rate))
        )));
    }

    let samples = slots.into_iter().flatten().collect();
    Ok(MergedTrace {
        id,
        start: anchor,
        sampling_rate: rate,
        samples,
        response,
        missing_response,
    })
}
