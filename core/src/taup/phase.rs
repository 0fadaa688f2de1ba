//! Phase-name parsing into half-legs.
//!
//! A half-leg is the downgoing or upgoing half of one excursion in a single
//! region: a P leg that turns in the mantle is one downgoing half-leg from the
//! source plus one upgoing half-leg back to the surface.

use crate::prelude::{PipelineError, StageResult};
use crate::taup::model::{Region, VelocityModel, Wave};

/// Where a half-leg ends at depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bottom {
    /// Turns inside the region.
    Turn,
    /// Reaches the bottom of the region without turning.
    Boundary,
    /// Stops at a fixed radius (the source, for upgoing starts).
    Radius(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalfLeg {
    pub wave: Wave,
    pub region: Region,
    /// Radius where the half-leg's integration starts.
    pub top: f64,
    pub bottom: Bottom,
    pub direction: Direction,
}

impl HalfLeg {
    fn new(wave: Wave, region: Region, top: f64, bottom: Bottom, direction: Direction) -> Self {
        Self {
            wave,
            region,
            top,
            bottom,
            direction,
        }
    }
}

fn mantle_wave(symbol: char) -> Option<Wave> {
    match symbol {
        'P' => Some(Wave::P),
        'S' => Some(Wave::S),
        _ => None,
    }
}

/// Expands `name` (e.g. `PKiKP`, `sS`, `ScP`) for a source at `source_radius`.
pub fn parse_phase(name: &str, model: &VelocityModel, source_radius: f64) -> StageResult<Vec<HalfLeg>> {
    let invalid = |reason: &str| PipelineError::InvalidPhase {
        phase: name.to_string(),
        reason: reason.to_string(),
    };
    let symbols: Vec<char> = name.trim().chars().collect();
    if symbols.is_empty() {
        return Err(invalid("empty phase name"));
    }

    let surface = model.radius();
    let cmb = model.cmb_radius();
    let icb = model.icb_radius();
    let mut legs = Vec::new();
    let mut start = source_radius;
    let mut index = 0;

    if let Some(wave) = match symbols[0] {
        'p' => Some(Wave::P),
        's' => Some(Wave::S),
        _ => None,
    } {
        legs.push(HalfLeg::new(
            wave,
            Region::Mantle,
            surface,
            Bottom::Radius(source_radius),
            Direction::Up,
        ));
        start = surface;
        index = 1;
    }

    while index < symbols.len() {
        let wave = mantle_wave(symbols[index])
            .ok_or_else(|| invalid(&format!("unexpected {:?} at position {}", symbols[index], index)))?;
        match symbols.get(index + 1) {
            Some('c') => {
                let up = symbols
                    .get(index + 2)
                    .copied()
                    .and_then(mantle_wave)
                    .ok_or_else(|| invalid("core reflection must be followed by P or S"))?;
                legs.push(HalfLeg::new(wave, Region::Mantle, start, Bottom::Boundary, Direction::Down));
                legs.push(HalfLeg::new(up, Region::Mantle, surface, Bottom::Boundary, Direction::Up));
                index += 3;
            }
            Some('K') => {
                legs.push(HalfLeg::new(wave, Region::Mantle, start, Bottom::Boundary, Direction::Down));
                index += 1;
                match symbols.get(index + 1) {
                    Some(inner @ ('I' | 'J')) => {
                        if symbols.get(index + 2) != Some(&'K') {
                            return Err(invalid("inner-core leg must return through K"));
                        }
                        let inner_wave = if *inner == 'I' { Wave::P } else { Wave::S };
                        legs.push(HalfLeg::new(Wave::P, Region::OuterCore, cmb, Bottom::Boundary, Direction::Down));
                        legs.push(HalfLeg::new(inner_wave, Region::InnerCore, icb, Bottom::Turn, Direction::Down));
                        legs.push(HalfLeg::new(inner_wave, Region::InnerCore, icb, Bottom::Turn, Direction::Up));
                        legs.push(HalfLeg::new(Wave::P, Region::OuterCore, cmb, Bottom::Boundary, Direction::Up));
                        index += 3;
                    }
                    Some('i') => {
                        if symbols.get(index + 2) != Some(&'K') {
                            return Err(invalid("inner-core reflection must return through K"));
                        }
                        legs.push(HalfLeg::new(Wave::P, Region::OuterCore, cmb, Bottom::Boundary, Direction::Down));
                        legs.push(HalfLeg::new(Wave::P, Region::OuterCore, cmb, Bottom::Boundary, Direction::Up));
                        index += 3;
                    }
                    Some('K') => {
                        return Err(invalid("multiple outer-core legs are not supported"));
                    }
                    _ => {
                        legs.push(HalfLeg::new(Wave::P, Region::OuterCore, cmb, Bottom::Turn, Direction::Down));
                        legs.push(HalfLeg::new(Wave::P, Region::OuterCore, cmb, Bottom::Turn, Direction::Up));
                        index += 1;
                    }
                }
                let up = symbols
                    .get(index)
                    .copied()
                    .and_then(mantle_wave)
                    .ok_or_else(|| invalid("outer-core leg must exit through P or S"))?;
                legs.push(HalfLeg::new(up, Region::Mantle, surface, Bottom::Boundary, Direction::Up));
                index += 1;
            }
            _ => {
                legs.push(HalfLeg::new(wave, Region::Mantle, start, Bottom::Turn, Direction::Down));
                legs.push(HalfLeg::new(wave, Region::Mantle, surface, Bottom::Turn, Direction::Up));
                index += 1;
            }
        }
        start = surface;
    }
    Ok(legs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legs(name: &str) -> StageResult<Vec<HalfLeg>> {
        let model = VelocityModel::iasp91();
        parse_phase(name, &model, model.radius() - 10.0)
    }

    #[test]
    fn direct_phase_turns_once() {
        let legs = legs("P").unwrap();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].top, 6361.0);
        assert_eq!(legs[0].direction, Direction::Down);
        assert_eq!(legs[1].top, 6371.0);
        assert_eq!(legs[1].bottom, Bottom::Turn);
    }

    #[test]
    fn depth_phase_starts_upgoing() {
        let legs = legs("sP").unwrap();
        assert_eq!(legs.len(), 3);
        assert_eq!(legs[0].wave, Wave::S);
        assert_eq!(legs[0].bottom, Bottom::Radius(6361.0));
        assert_eq!(legs[1].top, 6371.0);
    }

    #[test]
    fn core_phases_expand() {
        assert_eq!(legs("PcS").unwrap().len(), 2);
        assert_eq!(legs("SKS").unwrap().len(), 4);
        assert_eq!(legs("PKiKP").unwrap().len(), 4);
        let pkikp = legs("PKIKP").unwrap();
        assert_eq!(pkikp.len(), 6);
        assert_eq!(pkikp[2].region, Region::InnerCore);
        assert_eq!(legs("PKJKP").unwrap()[2].wave, Wave::S);
        assert_eq!(legs("PP").unwrap().len(), 4);
    }

    #[test]
    fn malformed_names_are_rejected() {
        for name in ["", "X", "Pc", "PK", "PKKP", "PKIP", "Pp", "PcX", "SKiS"] {
            let err = legs(name).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidPhase { .. }), "{name}");
        }
    }
}
