//! Great-circle geometry on a spherical Earth.

use crate::prelude::{PipelineError, StageResult};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Surface position in decimal degrees; `depth_km` is 0 for stations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub depth_km: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64, depth_km: f64) -> Self {
        Self {
            latitude,
            longitude,
            depth_km,
        }
    }

    pub fn validate(&self) -> StageResult<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(PipelineError::InvalidCoordinate(format!(
                "latitude {} outside [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(PipelineError::InvalidCoordinate(format!(
                "longitude {} outside [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }
}

/// Angular separation along the great circle, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct EpicentralDistance(pub f64);

impl EpicentralDistance {
    pub fn degrees(self) -> f64 {
        self.0
    }

    pub fn radians(self) -> f64 {
        self.0.to_radians()
    }

    pub fn km(self) -> f64 {
        self.radians() * EARTH_RADIUS_KM
    }
}

impl fmt::Display for EpicentralDistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}°", self.0)
    }
}

/// Distance between the surface projections of `a` and `b`.
///
/// Uses the atan2 (Vincenty sphere) form, which stays accurate at 0° and 180°.
pub fn epicentral_distance(a: &GeoPoint, b: &GeoPoint) -> StageResult<EpicentralDistance> {
    a.validate()?;
    b.validate()?;
    let (phi1, phi2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlambda = (b.longitude - a.longitude).to_radians();

    let y = ((phi2.cos() * dlambda.sin()).powi(2)
        + (phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos()).powi(2))
    .sqrt();
    let x = phi1.sin() * phi2.sin() + phi1.cos() * phi2.cos() * dlambda.cos();
    Ok(EpicentralDistance(y.atan2(x).to_degrees()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn puerto_rico_to_surrey() {
        let event = GeoPoint::new(17.916, -66.813, 10.0);
        let station = GeoPoint::new(51.33, -0.49, 0.0);
        let distance = epicentral_distance(&event, &station).unwrap();
        assert!((distance.degrees() - 61.4).abs() < 0.5);
        assert_eq!(distance.to_string(), "61.4°");
    }

    #[test]
    fn distance_is_symmetric_and_zero_on_self() {
        let a = GeoPoint::new(-33.9, 18.4, 0.0);
        let b = GeoPoint::new(35.7, 139.7, 0.0);
        let ab = epicentral_distance(&a, &b).unwrap().degrees();
        let ba = epicentral_distance(&b, &a).unwrap().degrees();
        assert!((ab - ba).abs() < 1e-12);
        assert_eq!(epicentral_distance(&a, &a).unwrap().degrees(), 0.0);
    }

    #[test]
    fn antipodes_and_poles_are_valid() {
        let north = GeoPoint::new(90.0, 0.0, 0.0);
        let south = GeoPoint::new(-90.0, 180.0, 0.0);
        let distance = epicentral_distance(&north, &south).unwrap();
        assert!((distance.degrees() - 180.0).abs() < 1e-9);

        let a = GeoPoint::new(0.0, -180.0, 0.0);
        let b = GeoPoint::new(0.0, 180.0, 0.0);
        assert!(epicentral_distance(&a, &b).unwrap().degrees() < 1e-9);
        assert!((EpicentralDistance(180.0).km() - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_coordinates_fail() {
        let good = GeoPoint::new(0.0, 0.0, 0.0);
        for bad in [
            GeoPoint::new(90.5, 0.0, 0.0),
            GeoPoint::new(0.0, -181.0, 0.0),
            GeoPoint::new(f64::NAN, 0.0, 0.0),
        ] {
            let err = epicentral_distance(&good, &bad).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidCoordinate(_)));
        }
    }
}
