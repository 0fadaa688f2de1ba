//! Closed-form distance and time integrals through Bullen-law layers.

use crate::taup::model::{Layer, Region, VelocityModel, Wave};
use crate::taup::phase::{Bottom, HalfLeg};
use std::f64::consts::FRAC_PI_2;

const RADIUS_EPS: f64 = 1e-9;
const FLAT_ZETA: f64 = 1e-10;
/// Relative slack for a ray leaving the source exactly horizontally.
const TAKEOFF_SLACK: f64 = 1e-12;
/// Largest radial step between recorded path points.
const PATH_STEP_KM: f64 = 50.0;

/// `eta(r) = r / v(r) = eta_top (r / r_top)^zeta` inside one layer.
#[derive(Debug, Clone, Copy)]
struct Bullen {
    r_top: f64,
    eta_top: f64,
    zeta: f64,
}

impl Bullen {
    fn new(layer: &Layer, wave: Wave) -> Option<Self> {
        let (v_top, v_bottom) = layer.velocity(wave);
        if v_top <= 0.0 || v_bottom <= 0.0 {
            return None;
        }
        let zeta = if layer.is_center() {
            1.0
        } else {
            1.0 - (v_top / v_bottom).ln() / (layer.top_radius / layer.bottom_radius).ln()
        };
        Some(Self {
            r_top: layer.top_radius,
            eta_top: layer.top_radius / v_top,
            zeta,
        })
    }

    fn eta(&self, radius: f64) -> f64 {
        self.eta_top * (radius / self.r_top).powf(self.zeta)
    }

    fn turning_radius(&self, p: f64) -> f64 {
        if self.zeta.abs() < FLAT_ZETA {
            return self.r_top;
        }
        self.r_top * (p / self.eta_top).powf(1.0 / self.zeta)
    }

    /// Distance and time between `upper` and `lower`, both above the turning point.
    fn between(&self, p: f64, upper: f64, lower: f64) -> (f64, f64) {
        let (eta_a, eta_b) = (self.eta(upper), self.eta(lower));
        if self.zeta.abs() < FLAT_ZETA {
            let q = (eta_a * eta_a - p * p).max(0.0).sqrt();
            if q == 0.0 {
                return (0.0, 0.0);
            }
            let log_ratio = (upper / lower).ln();
            return (p * log_ratio / q, eta_a * eta_a * log_ratio / q);
        }
        let distance = ((p / eta_a).min(1.0).acos() - (p / eta_b).min(1.0).acos()) / self.zeta;
        let time = ((eta_a * eta_a - p * p).max(0.0).sqrt()
            - (eta_b * eta_b - p * p).max(0.0).sqrt())
            / self.zeta;
        (distance, time)
    }

    /// Distance and time from `upper` down to the turning point.
    fn to_turn(&self, p: f64, upper: f64) -> (f64, f64) {
        let eta_a = self.eta(upper);
        if self.zeta.abs() < FLAT_ZETA {
            return (0.0, 0.0);
        }
        if p == 0.0 {
            // Straight through the centre.
            return (FRAC_PI_2, eta_a / self.zeta);
        }
        (
            (p / eta_a).min(1.0).acos() / self.zeta,
            (eta_a * eta_a - p * p).max(0.0).sqrt() / self.zeta,
        )
    }
}

/// Integrated half-leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegSpan {
    pub distance: f64,
    pub time: f64,
}

/// Records `(radius, cumulative distance)` points from the top of a half-leg down.
struct Recorder<'a> {
    points: Option<&'a mut Vec<(f64, f64)>>,
    distance: f64,
}

impl Recorder<'_> {
    fn push(&mut self, radius: f64) {
        if let Some(points) = self.points.as_mut() {
            points.push((radius, self.distance));
        }
    }

    fn active(&self) -> bool {
        self.points.is_some()
    }
}

fn pieces(upper: f64, lower: f64) -> usize {
    ((upper - lower) / PATH_STEP_KM).ceil().max(1.0) as usize
}

/// Integrates one half-leg at ray parameter `p` (s/rad).
///
/// Returns `None` when the ray cannot travel the leg as named: it turns
/// where it must not, fails to turn where it must, or cannot leave `top`.
/// With `path` set, the sampled `(radius, distance)` points are appended.
pub fn walk(
    model: &VelocityModel,
    leg: &HalfLeg,
    p: f64,
    path: Option<&mut Vec<(f64, f64)>>,
) -> Option<LegSpan> {
    let floor = match leg.bottom {
        Bottom::Turn | Bottom::Boundary => model.region_bounds(leg.region).1,
        Bottom::Radius(radius) => radius,
    };
    let mut recorder = Recorder {
        points: path,
        distance: 0.0,
    };
    recorder.push(leg.top);

    let mut time = 0.0;
    let mut turned = false;
    let mut first = true;
    for layer in model.layers().iter().filter(|layer| layer.region == leg.region) {
        if layer.bottom_radius >= leg.top - RADIUS_EPS {
            continue;
        }
        if layer.top_radius <= floor + RADIUS_EPS {
            break;
        }
        let bullen = Bullen::new(layer, leg.wave)?;
        let upper = layer.top_radius.min(leg.top);
        let lower = layer.bottom_radius.max(floor);
        let eta_upper = bullen.eta(upper);

        if p > eta_upper {
            if first && p > eta_upper * (1.0 + TAKEOFF_SLACK) {
                return None;
            }
            turned = true;
            break;
        }
        first = false;

        let base = recorder.distance;
        if layer.is_center() || p > bullen.eta(lower) {
            let turning = if p == 0.0 { 0.0 } else { bullen.turning_radius(p) };
            if recorder.active() {
                let count = pieces(upper, turning);
                for piece in 1..count {
                    let radius = upper - (upper - turning) * piece as f64 / count as f64;
                    recorder.distance = base + bullen.between(p, upper, radius).0;
                    recorder.push(radius);
                }
            }
            let (distance, span_time) = bullen.to_turn(p, upper);
            recorder.distance = base + distance;
            recorder.push(turning);
            time += span_time;
            turned = true;
            break;
        }

        if recorder.active() {
            let count = pieces(upper, lower);
            for piece in 1..count {
                let radius = upper - (upper - lower) * piece as f64 / count as f64;
                recorder.distance = base + bullen.between(p, upper, radius).0;
                recorder.push(radius);
            }
        }
        let (distance, span_time) = bullen.between(p, upper, lower);
        recorder.distance = base + distance;
        recorder.push(lower);
        time += span_time;
    }

    match leg.bottom {
        Bottom::Turn if !turned && leg.region != Region::InnerCore => return None,
        Bottom::Boundary | Bottom::Radius(_) if turned => return None,
        _ => {}
    }
    Some(LegSpan {
        distance: recorder.distance,
        time,
    })
}
