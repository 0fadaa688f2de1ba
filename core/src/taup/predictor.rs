use crate::geodesy::EpicentralDistance;
use crate::prelude::{PipelineError, StageResult};
use crate::taup::model::VelocityModel;
use crate::taup::phase::{parse_phase, Direction, HalfLeg};
use crate::taup::ray::walk;
use crate::telemetry::log::LogManager;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

const GRID_STEPS: usize = 2000;
const BISECTION_STEPS: usize = 60;
/// Largest accepted miss of the target distance, in radians.
const DISTANCE_TOLERANCE: f64 = 1e-5;

/// Ordered list of phase names to predict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRequest {
    pub phases: Vec<String>,
}

impl PhaseRequest {
    pub fn new<I, S>(phases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            phases: phases.into_iter().map(Into::into).collect(),
        }
    }
}

/// Point on a ray: radius and angle from the source, measured towards the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RayPoint {
    pub radius_km: f64,
    pub angle_rad: f64,
}

/// Earliest ray of one phase at the requested distance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseArrival {
    pub phase: String,
    /// Seconds after origin.
    pub time: f64,
    /// Seconds per degree.
    pub ray_param: f64,
    /// Angle travelled, degrees; exceeds 180 for major-arc arrivals.
    pub distance_deg: f64,
    pub path: Vec<RayPoint>,
}

#[derive(Debug, Clone, Copy)]
struct Root {
    ray_param: f64,
    distance: f64,
    time: f64,
}

/// Travel-time predictor over a preloaded velocity model.
pub struct PhasePredictor {
    model: VelocityModel,
    logger: LogManager,
}

impl PhasePredictor {
    pub fn new(model: VelocityModel) -> Self {
        Self {
            model,
            logger: LogManager::new(),
        }
    }

    pub fn model(&self) -> &VelocityModel {
        &self.model
    }

    fn source_radius(&self, depth_km: f64) -> StageResult<f64> {
        let mantle = self.model.radius() - self.model.cmb_radius();
        if !depth_km.is_finite() || depth_km < 0.0 || depth_km >= mantle {
            return Err(PipelineError::InvalidDepth(format!(
                "{depth_km} km must lie in [0, {mantle}) for {}",
                self.model.name()
            )));
        }
        Ok(self.model.radius() - depth_km)
    }

    /// Checks the depth and every phase name without tracing any rays.
    pub fn validate(&self, depth_km: f64, request: &PhaseRequest) -> StageResult<()> {
        let source = self.source_radius(depth_km)?;
        for phase in &request.phases {
            parse_phase(phase, &self.model, source)?;
        }
        Ok(())
    }

    /// Earliest arrival of each requested phase, in request order. Phases
    /// with no ray at this distance are left out.
    pub fn predict(
        &self,
        depth_km: f64,
        distance: EpicentralDistance,
        request: &PhaseRequest,
    ) -> StageResult<Vec<PhaseArrival>> {
        let source = self.source_radius(depth_km)?;
        let target = distance.radians();
        let mut arrivals = Vec::with_capacity(request.phases.len());
        for phase in &request.phases {
            let legs = parse_phase(phase, &self.model, source)?;
            match self.earliest(&legs, target) {
                Some(root) => {
                    let arrival = PhaseArrival {
                        phase: phase.clone(),
                        time: root.time,
                        ray_param: root.ray_param * PI / 180.0,
                        distance_deg: root.distance.to_degrees(),
                        path: self.trace(&legs, root),
                    };
                    self.logger.record(
                        "predict",
                        &format!("{} at {:.1} s, p = {:.3} s/deg", phase, arrival.time, arrival.ray_param),
                    );
                    arrivals.push(arrival);
                }
                None => self.logger.record(
                    "predict",
                    &format!("{} does not arrive at {}", phase, distance),
                ),
            }
        }
        Ok(arrivals)
    }

    fn integrate(&self, legs: &[HalfLeg], p: f64) -> Option<(f64, f64)> {
        legs.iter().try_fold((0.0, 0.0), |(distance, time), leg| {
            walk(&self.model, leg, p, None).map(|span| (distance + span.distance, time + span.time))
        })
    }

    fn earliest(&self, legs: &[HalfLeg], target: f64) -> Option<Root> {
        let p_max = self.model.max_ray_parameter();
        let grid: Vec<(f64, Option<(f64, f64)>)> = (0..=GRID_STEPS)
            .map(|step| {
                let p = p_max * step as f64 / GRID_STEPS as f64;
                (p, self.integrate(legs, p))
            })
            .collect();

        let mut targets = vec![target];
        if target > 0.0 && target < PI {
            targets.push(TAU - target);
        }

        let mut roots = Vec::new();
        for goal in targets {
            for pair in grid.windows(2) {
                let ((p_lo, Some(lo)), (p_hi, Some(hi))) = (pair[0], pair[1]) else {
                    continue;
                };
                let f_lo = lo.0 - goal;
                let f_hi = hi.0 - goal;
                if f_lo.abs() < 1e-12 {
                    roots.push(Root {
                        ray_param: p_lo,
                        distance: lo.0,
                        time: lo.1,
                    });
                } else if f_lo * f_hi < 0.0 {
                    roots.extend(self.bisect(legs, goal, p_lo, p_hi, f_lo));
                }
            }
        }
        roots.into_iter().min_by(|a, b| a.time.total_cmp(&b.time))
    }

    fn bisect(&self, legs: &[HalfLeg], goal: f64, mut lo: f64, mut hi: f64, f_lo: f64) -> Option<Root> {
        for _ in 0..BISECTION_STEPS {
            let mid = 0.5 * (lo + hi);
            let (distance, _) = self.integrate(legs, mid)?;
            if (distance - goal) * f_lo < 0.0 {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        let p = 0.5 * (lo + hi);
        let (distance, time) = self.integrate(legs, p)?;
        ((distance - goal).abs() < DISTANCE_TOLERANCE).then_some(Root {
            ray_param: p,
            distance,
            time,
        })
    }

    /// Samples the ray of `root` from source to receiver.
    fn trace(&self, legs: &[HalfLeg], root: Root) -> Vec<RayPoint> {
        // Major-arc rays reach the receiver going the other way round.
        let sense = if root.distance > PI { -1.0 } else { 1.0 };
        let mut points = Vec::new();
        let mut offset = 0.0;
        for leg in legs {
            let mut samples = Vec::new();
            let Some(span) = walk(&self.model, leg, root.ray_param, Some(&mut samples)) else {
                break;
            };
            let ordered: Vec<(f64, f64)> = match leg.direction {
                Direction::Down => samples,
                Direction::Up => samples
                    .iter()
                    .rev()
                    .map(|(radius, distance)| (*radius, span.distance - distance))
                    .collect(),
            };
            points.extend(ordered.into_iter().map(|(radius, distance)| RayPoint {
                radius_km: radius,
                angle_rad: sense * (offset + distance),
            }));
            offset += span.distance;
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predictor() -> PhasePredictor {
        PhasePredictor::new(VelocityModel::iasp91())
    }

    fn time_of(arrivals: &[PhaseArrival], phase: &str) -> Option<f64> {
        arrivals.iter().find(|a| a.phase == phase).map(|a| a.time)
    }

    #[test]
    fn p_and_s_at_teleseismic_distance() {
        let request = PhaseRequest::new(["P", "S"]);
        let arrivals = predictor()
            .predict(10.0, EpicentralDistance(61.384), &request)
            .unwrap();
        assert_eq!(arrivals.len(), 2);
        let p = time_of(&arrivals, "P").unwrap();
        let s = time_of(&arrivals, "S").unwrap();
        assert!(p > 580.0 && p < 660.0, "P at {p}");
        assert!(s > 1080.0 && s < 1180.0, "S at {s}");
        assert!(s > p);
        assert!((arrivals[0].distance_deg - 61.384).abs() < 1e-3);
    }

    #[test]
    fn arrivals_keep_request_order_and_skip_missing() {
        let request = PhaseRequest::new(["PcP", "SKS", "pP", "P", "PKP"]);
        let arrivals = predictor()
            .predict(10.0, EpicentralDistance(61.384), &request)
            .unwrap();
        let names: Vec<&str> = arrivals.iter().map(|a| a.phase.as_str()).collect();
        assert_eq!(names, vec!["PcP", "pP", "P"]);
        assert!(arrivals.len() <= request.phases.len());
        let pcp = time_of(&arrivals, "PcP").unwrap();
        assert!(pcp > 640.0 && pcp < 680.0, "PcP at {pcp}");
        assert!(time_of(&arrivals, "pP").unwrap() > time_of(&arrivals, "P").unwrap());
    }

    #[test]
    fn core_phases_appear_at_long_range() {
        let predictor = predictor();
        let near = predictor
            .predict(10.0, EpicentralDistance(30.0), &PhaseRequest::new(["PKP", "PKIKP"]))
            .unwrap();
        assert!(near.is_empty());

        let far = predictor
            .predict(10.0, EpicentralDistance(150.0), &PhaseRequest::new(["PKIKP", "P"]))
            .unwrap();
        assert_eq!(far.len(), 1);
        assert!(far[0].time > 1150.0 && far[0].time < 1230.0, "PKIKP at {}", far[0].time);
    }

    #[test]
    fn boundary_distances_do_not_fail() {
        let predictor = predictor();
        let request = PhaseRequest::new(["P", "PcP", "PKIKP"]);
        let zero = predictor.predict(10.0, EpicentralDistance(0.0), &request).unwrap();
        assert!(time_of(&zero, "PcP").is_some());
        let antipode = predictor.predict(10.0, EpicentralDistance(180.0), &request).unwrap();
        assert!(time_of(&antipode, "PKIKP").is_some());
        assert!(time_of(&antipode, "P").is_none());
    }

    #[test]
    fn path_runs_from_source_to_receiver() {
        let arrivals = predictor()
            .predict(10.0, EpicentralDistance(61.384), &PhaseRequest::new(["PcP"]))
            .unwrap();
        let path = &arrivals[0].path;
        let first = path.first().unwrap();
        let last = path.last().unwrap();
        assert!((first.radius_km - 6361.0).abs() < 1e-9);
        assert_eq!(first.angle_rad, 0.0);
        assert!((last.radius_km - 6371.0).abs() < 1e-9);
        assert!((last.angle_rad.to_degrees() - 61.384).abs() < 1e-3);
        let deepest = path.iter().fold(f64::MAX, |min, p| min.min(p.radius_km));
        assert!((deepest - 3482.0).abs() < 1e-6);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let predictor = predictor();
        let err = predictor
            .validate(10.0, &PhaseRequest::new(["P", "Q"]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPhase { .. }));
        let err = predictor
            .validate(3000.0, &PhaseRequest::new(["P"]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidDepth(_)));
        assert!(predictor.validate(-1.0, &PhaseRequest::new(["P"])).is_err());
    }
}
