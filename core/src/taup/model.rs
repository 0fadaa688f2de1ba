use crate::prelude::{PipelineError, StageResult};
use std::fs;
use std::path::Path;

/// Body-wave type on a leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wave {
    P,
    S,
}

/// Shell of the Earth a leg travels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Mantle,
    OuterCore,
    InnerCore,
}

/// Shell between two radii with velocities given at both ends.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub top_radius: f64,
    pub bottom_radius: f64,
    pub vp: (f64, f64),
    pub vs: (f64, f64),
    pub region: Region,
}

impl Layer {
    /// `(top, bottom)` velocities of `wave`.
    pub fn velocity(&self, wave: Wave) -> (f64, f64) {
        match wave {
            Wave::P => self.vp,
            Wave::S => self.vs,
        }
    }

    pub fn is_center(&self) -> bool {
        self.bottom_radius <= 0.0
    }
}

#[derive(Debug, Clone, Copy)]
struct Knot {
    depth: f64,
    vp: f64,
    vs: f64,
}

/// Layered spherical velocity model.
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityModel {
    name: String,
    radius: f64,
    cmb_radius: f64,
    icb_radius: f64,
    layers: Vec<Layer>,
}

/// Upper bound on layer thickness when sampling polynomial models.
const SAMPLE_KM: f64 = 25.0;
const BOUNDARY_EPS: f64 = 1e-6;

/// iasp91 (Kennett & Engdahl 1991): `(top depth, bottom depth, vp, vs)` with
/// velocities as polynomials in normalized radius.
const IASP91: [(f64, f64, &[f64], &[f64]); 11] = [
    (0.0, 20.0, &[5.8], &[3.36]),
    (20.0, 35.0, &[6.5], &[3.75]),
    (35.0, 120.0, &[8.78541, -0.74953], &[6.706231, -2.248585]),
    (120.0, 210.0, &[8.78541, -0.74953], &[6.706231, -2.248585]),
    (210.0, 410.0, &[25.41389, -17.69722], &[5.75020, -1.27420]),
    (410.0, 660.0, &[30.78765, -23.25415], &[15.24213, -11.08552]),
    (660.0, 760.0, &[29.38896, -21.40656], &[17.70732, -13.50652]),
    (
        760.0,
        2740.0,
        &[25.1486, -41.1538, 51.9932, -26.6083],
        &[12.9303, -21.2590, 27.8988, -14.1080],
    ),
    (2740.0, 2889.0, &[14.49470, -1.47089], &[8.16616, -1.58206]),
    (2889.0, 5153.9, &[10.03904, 3.75665, -13.67046], &[0.0]),
    (5153.9, 6371.0, &[11.24094, 0.0, -4.09689], &[3.56454, 0.0, -3.45241]),
];

fn polynomial(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

fn build_layers(knots: &[Knot], radius: f64, cmb_radius: f64, icb_radius: f64) -> Vec<Layer> {
    knots
        .windows(2)
        .filter(|pair| pair[1].depth > pair[0].depth)
        .map(|pair| {
            let top_radius = radius - pair[0].depth;
            let bottom_radius = (radius - pair[1].depth).max(0.0);
            let region = if bottom_radius >= cmb_radius - BOUNDARY_EPS {
                Region::Mantle
            } else if bottom_radius >= icb_radius - BOUNDARY_EPS {
                Region::OuterCore
            } else {
                Region::InnerCore
            };
            Layer {
                top_radius,
                bottom_radius,
                vp: (pair[0].vp, pair[1].vp),
                vs: (pair[0].vs, pair[1].vs),
                region,
            }
        })
        .collect()
}

impl VelocityModel {
    pub fn iasp91() -> Self {
        let radius = 6371.0;
        let mut knots = Vec::new();
        for (top, bottom, vp, vs) in IASP91.iter() {
            let steps = ((bottom - top) / SAMPLE_KM).ceil().max(1.0) as usize;
            for step in 0..=steps {
                let depth = top + (bottom - top) * step as f64 / steps as f64;
                let x = (radius - depth) / radius;
                knots.push(Knot {
                    depth,
                    vp: polynomial(vp, x),
                    vs: polynomial(vs, x),
                });
            }
        }
        let (cmb_radius, icb_radius) = (radius - 2889.0, radius - 5153.9);
        Self {
            name: "iasp91".into(),
            radius,
            cmb_radius,
            icb_radius,
            layers: build_layers(&knots, radius, cmb_radius, icb_radius),
        }
    }

    /// Parses the TauP "named discontinuities" format: `depth vp vs [rho ...]`
    /// rows plus optional `mantle`, `outer-core` and `inner-core` markers.
    pub fn from_nd_str(name: &str, text: &str) -> StageResult<Self> {
        let mut knots = Vec::new();
        let mut cmb_depth = None;
        let mut icb_depth = None;
        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            match line.to_ascii_lowercase().as_str() {
                "outer-core" | "cmb" => {
                    cmb_depth = knots.last().map(|k: &Knot| k.depth);
                    continue;
                }
                "inner-core" | "icb" => {
                    icb_depth = knots.last().map(|k: &Knot| k.depth);
                    continue;
                }
                "mantle" | "moho" | "crust" => continue,
                _ => {}
            }
            let values: Vec<f64> = line
                .split_whitespace()
                .map(str::parse)
                .collect::<Result<_, _>>()
                .map_err(|err| {
                    PipelineError::UnknownModel(format!("{name} line {}: {err}", line_no + 1))
                })?;
            if values.len() < 3 {
                return Err(PipelineError::UnknownModel(format!(
                    "{name} line {}: expected depth, vp and vs",
                    line_no + 1
                )));
            }
            knots.push(Knot {
                depth: values[0],
                vp: values[1],
                vs: values[2],
            });
        }
        Self::from_knots(name, knots, cmb_depth, icb_depth)
    }

    pub fn from_nd_file(path: &Path) -> StageResult<Self> {
        let text = fs::read_to_string(path).map_err(|err| {
            PipelineError::UnknownModel(format!("{}: {err}", path.display()))
        })?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_nd_str(&name, &text)
    }

    /// Resolves a built-in model name or a path to a `.nd` file.
    pub fn named(name: &str) -> StageResult<Self> {
        if name.eq_ignore_ascii_case("iasp91") {
            return Ok(Self::iasp91());
        }
        let path = Path::new(name);
        if path.is_file() {
            return Self::from_nd_file(path);
        }
        Err(PipelineError::UnknownModel(format!(
            "{name} is neither a built-in model nor a readable .nd file"
        )))
    }

    fn from_knots(
        name: &str,
        knots: Vec<Knot>,
        cmb_depth: Option<f64>,
        icb_depth: Option<f64>,
    ) -> StageResult<Self> {
        let invalid = |reason: String| PipelineError::UnknownModel(format!("{name}: {reason}"));
        let radius = knots
            .last()
            .map(|knot| knot.depth)
            .filter(|depth| *depth > 0.0)
            .ok_or_else(|| invalid("no depth samples".into()))?;
        if knots.windows(2).any(|pair| pair[1].depth < pair[0].depth) {
            return Err(invalid("depths must not decrease".into()));
        }

        // Without markers the outer core is the first fluid (vs = 0) shell.
        let cmb_depth = cmb_depth
            .or_else(|| knots.iter().find(|knot| knot.vs <= 0.0).map(|knot| knot.depth))
            .ok_or_else(|| invalid("no core-mantle boundary".into()))?;
        let icb_depth = icb_depth
            .or_else(|| {
                knots
                    .iter()
                    .filter(|knot| knot.depth > cmb_depth)
                    .find(|knot| knot.vs > 0.0)
                    .map(|knot| knot.depth)
            })
            .ok_or_else(|| invalid("no inner-core boundary".into()))?;
        let cmb_radius = radius - cmb_depth;
        let icb_radius = radius - icb_depth;
        if !(icb_radius > 0.0 && icb_radius < cmb_radius && cmb_radius < radius) {
            return Err(invalid("core boundaries are out of order".into()));
        }

        let layers = build_layers(&knots, radius, cmb_radius, icb_radius);
        if layers.iter().any(|layer| layer.vp.0 <= 0.0 || layer.vp.1 <= 0.0) {
            return Err(invalid("P velocity must be positive everywhere".into()));
        }

        Ok(Self {
            name: name.to_string(),
            radius,
            cmb_radius,
            icb_radius,
            layers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn cmb_radius(&self) -> f64 {
        self.cmb_radius
    }

    pub fn icb_radius(&self) -> f64 {
        self.icb_radius
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// `(top, bottom)` radii of a region.
    pub fn region_bounds(&self, region: Region) -> (f64, f64) {
        match region {
            Region::Mantle => (self.radius, self.cmb_radius),
            Region::OuterCore => (self.cmb_radius, self.icb_radius),
            Region::InnerCore => (self.icb_radius, 0.0),
        }
    }

    /// Largest `r / v` anywhere in the model, in s/rad.
    pub fn max_ray_parameter(&self) -> f64 {
        self.layers
            .iter()
            .flat_map(|layer| {
                [
                    (layer.top_radius, layer.vp.0),
                    (layer.top_radius, layer.vs.0),
                    (layer.bottom_radius, layer.vp.1),
                    (layer.bottom_radius, layer.vs.1),
                ]
            })
            .filter(|(_, velocity)| *velocity > 0.0)
            .fold(0.0, |max, (radius, velocity)| max.max(radius / velocity))
    }
}
