//! Pure geometry shared by the two panels.

use seiscore::math::StatsHelper;
use seiscore::taup::PhaseArrival;

const PADDING_FRACTION: f64 = 0.05;

/// `(min, max)` of `values` widened by 5 % of the span on each side.
/// A flat or single-valued series is widened by one unit instead.
pub fn padded_range(values: &[f64]) -> Option<(f64, f64)> {
    let (low, high) = StatsHelper::bounds(values)?;
    let span = high - low;
    if span <= 0.0 {
        return Some((low - 1.0, high + 1.0));
    }
    Some((low - span * PADDING_FRACTION, high + span * PADDING_FRACTION))
}

/// Arrivals whose time falls inside the plotted time range.
pub fn visible_arrivals(
    arrivals: &[PhaseArrival],
    range: (f64, f64),
) -> impl Iterator<Item = &PhaseArrival> {
    arrivals
        .iter()
        .filter(move |arrival| arrival.time >= range.0 && arrival.time <= range.1)
}

/// Maps Earth cross-section coordinates to pixels. The source sits straight
/// above the centre; angles grow clockwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossSection {
    pub center: (i32, i32),
    pub pixels_per_km: f64,
}

impl CrossSection {
    /// Largest disc of `radius_km` that fits `width` × `height` inside `margin`.
    pub fn fit(width: u32, height: u32, radius_km: f64, margin: u32) -> Self {
        let usable = width.min(height).saturating_sub(2 * margin).max(1);
        Self {
            center: ((width / 2) as i32, (height / 2) as i32),
            pixels_per_km: f64::from(usable) / 2.0 / radius_km,
        }
    }

    pub fn radius_px(&self, radius_km: f64) -> i32 {
        (radius_km * self.pixels_per_km).round() as i32
    }

    pub fn project(&self, radius_km: f64, angle_rad: f64) -> (i32, i32) {
        let scaled = radius_km * self.pixels_per_km;
        (
            self.center.0 + (scaled * angle_rad.sin()).round() as i32,
            self.center.1 - (scaled * angle_rad.cos()).round() as i32,
        )
    }
}
