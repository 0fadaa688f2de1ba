//! Travel times and ray paths of named seismic phases in a spherically
//! symmetric Earth.
//!
//! Velocities between knots follow `v = A r^B`, which keeps every distance
//! and time integral in closed form. Ray parameters are in seconds per
//! radian internally and reported in seconds per degree.

pub mod model;
pub mod phase;
pub mod predictor;
pub mod ray;

pub use model::{Layer, Region, VelocityModel, Wave};
pub use phase::{parse_phase, Bottom, Direction, HalfLeg};
pub use predictor::{PhaseArrival, PhasePredictor, PhaseRequest, RayPoint};
