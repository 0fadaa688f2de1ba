use num_complex::Complex64;
use std::f64::consts::PI;

/// Laplace variable convention of a poles/zeros stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferFunction {
    LaplaceRadians,
    LaplaceHertz,
    Digital,
}

impl TransferFunction {
    pub fn from_station_xml(text: &str) -> Self {
        let upper = text.to_ascii_uppercase();
        if upper.contains("RADIANS") {
            Self::LaplaceRadians
        } else if upper.contains("HERTZ") {
            Self::LaplaceHertz
        } else {
            Self::Digital
        }
    }
}

/// Physical quantity a sensor responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundUnits {
    Displacement,
    Velocity,
    Acceleration,
}

impl GroundUnits {
    pub fn parse(units: &str) -> Option<Self> {
        match units.trim().to_ascii_uppercase().as_str() {
            "M" => Some(Self::Displacement),
            "M/S" => Some(Self::Velocity),
            "M/S**2" | "M/S2" | "M/S/S" | "M/S^2" => Some(Self::Acceleration),
            _ => None,
        }
    }

    /// Number of time derivatives relative to displacement.
    pub fn order(self) -> i32 {
        match self {
            Self::Displacement => 0,
            Self::Velocity => 1,
            Self::Acceleration => 2,
        }
    }
}

/// Analog poles/zeros stage of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct PolesZeros {
    pub transfer: TransferFunction,
    pub normalization_factor: f64,
    pub normalization_frequency: f64,
    pub zeros: Vec<Complex64>,
    pub poles: Vec<Complex64>,
}

impl PolesZeros {
    pub fn evaluate(&self, frequency: f64) -> Complex64 {
        let s = match self.transfer {
            TransferFunction::LaplaceRadians => Complex64::new(0.0, 2.0 * PI * frequency),
            _ => Complex64::new(0.0, frequency),
        };
        let numerator = self
            .zeros
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, zero| acc * (s - zero));
        let denominator = self
            .poles
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, pole| acc * (s - pole));
        numerator / denominator * self.normalization_factor
    }
}

/// Response descriptor: overall sensitivity plus the shape of the analog stage.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentResponse {
    /// Counts per input unit at `sensitivity_frequency`.
    pub sensitivity: f64,
    pub sensitivity_frequency: f64,
    pub input_units: String,
    pub paz: PolesZeros,
}

impl InstrumentResponse {
    /// A response that is flat at `sensitivity` counts per m/s.
    pub fn flat_velocity(sensitivity: f64) -> Self {
        Self {
            sensitivity,
            sensitivity_frequency: 1.0,
            input_units: "M/S".into(),
            paz: PolesZeros {
                transfer: TransferFunction::LaplaceRadians,
                normalization_factor: 1.0,
                normalization_frequency: 1.0,
                zeros: Vec::new(),
                poles: Vec::new(),
            },
        }
    }

    pub fn ground_units(&self) -> Option<GroundUnits> {
        GroundUnits::parse(&self.input_units)
    }

    /// Complex gain in counts per input unit.
    ///
    /// The poles/zeros shape is rescaled so that its magnitude equals the
    /// overall sensitivity at the sensitivity frequency.
    pub fn evaluate(&self, frequency: f64) -> Complex64 {
        let reference = self.paz.evaluate(self.sensitivity_frequency).norm();
        self.paz.evaluate(frequency) * (self.sensitivity / reference)
    }
}
