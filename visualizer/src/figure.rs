use crate::layout::{padded_range, visible_arrivals, CrossSection};
use log::info;
use plotters::coord::Shift;
use plotters::prelude::*;
use seiscore::geodesy::EpicentralDistance;
use seiscore::prelude::{PipelineError, StageResult};
use seiscore::processing::FilterSpec;
use seiscore::taup::{PhaseArrival, VelocityModel};
use seiscore::waveform::ConditionedTrace;
use seiscore::window::Timestamp;
use std::path::Path;

const TRACE_COLOR: RGBColor = RGBColor(139, 0, 0);
const EARTH_FILL: RGBColor = RGBColor(236, 236, 236);
const BOUNDARY_COLOR: RGBColor = RGBColor(120, 120, 120);
const WAVEFORM_SHARE: f64 = 0.6;
const DASH: f64 = 0.03;
const SECTION_MARGIN: u32 = 20;
const MM_PER_M: f64 = 1000.0;

/// Everything drawn in one figure.
pub struct FigureRequest<'a> {
    pub trace: &'a ConditionedTrace,
    pub origin: Timestamp,
    pub arrivals: &'a [PhaseArrival],
    pub distance: EpicentralDistance,
    pub source_depth_km: f64,
    pub filter: &'a FilterSpec,
    pub model: &'a VelocityModel,
    pub label: &'a str,
}

/// Renders the waveform panel beside the ray-path cross-section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FigureComposer {
    pub width: u32,
    pub height: u32,
}

impl Default for FigureComposer {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
        }
    }
}

type DrawResult<DB> = Result<(), DrawingAreaErrorKind<<DB as DrawingBackend>::ErrorType>>;

impl FigureComposer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Fails for targets whose text this build cannot draw. Bitmap glyphs
    /// need the `ttf` feature; SVG text is always written.
    pub fn check_target(path: &Path) -> StageResult<()> {
        if is_vector(path) || cfg!(feature = "ttf") {
            return Ok(());
        }
        Err(PipelineError::Rendering(format!(
            "{} needs a font backend for its labels; write .svg or build with the ttf feature",
            path.display()
        )))
    }

    /// Writes the figure to `path`; `.svg` selects vector output, anything
    /// else a bitmap whose format follows the extension.
    pub fn render(&self, request: &FigureRequest<'_>, path: &Path) -> StageResult<()> {
        if request.trace.is_empty() {
            return Err(PipelineError::Rendering(format!(
                "{} holds no samples to plot",
                request.trace.id
            )));
        }
        Self::check_target(path)?;

        let size = (self.width, self.height);
        let outcome = if is_vector(path) {
            let root = SVGBackend::new(path, size).into_drawing_area();
            compose(root, request).map_err(|err| err.to_string())
        } else {
            let root = BitMapBackend::new(path, size).into_drawing_area();
            compose(root, request).map_err(|err| err.to_string())
        };
        outcome.map_err(PipelineError::Rendering)?;
        info!("figure written to {}", path.display());
        Ok(())
    }
}

fn is_vector(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("svg"))
        .unwrap_or(false)
}

fn compose<DB: DrawingBackend>(root: DrawingArea<DB, Shift>, request: &FigureRequest<'_>) -> DrawResult<DB> {
    root.fill(&WHITE)?;
    let body = root.titled(request.label, ("sans-serif", 28))?;
    let (width, _) = body.dim_in_pixel();
    let split = (f64::from(width) * WAVEFORM_SHARE) as u32;
    let (waveform, section) = body.split_horizontally(split);
    draw_waveform(&waveform, request)?;
    draw_section(&section, request)?;
    root.present()
}

fn draw_waveform<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, request: &FigureRequest<'_>) -> DrawResult<DB> {
    let trace = request.trace;
    let times = trace.times_relative_to(request.origin);
    let amplitudes: Vec<f64> = trace.samples.iter().map(|v| v * MM_PER_M).collect();

    let (t_min, t_max) = match (times.first(), times.last()) {
        (Some(first), Some(last)) if last > first => (*first, *last),
        (Some(first), _) => (first - 1.0, first + 1.0),
        _ => (0.0, 1.0),
    };
    let (y_min, y_max) = padded_range(&amplitudes).unwrap_or((-1.0, 1.0));

    let caption = format!(
        "{}  Bandpass filter: {}-{} Hz",
        trace.id, request.filter.low_hz, request.filter.high_hz
    );
    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 18))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(t_min..t_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Time after earthquake (s)")
        .y_desc("Ground velocity (mm/s)")
        .draw()?;

    chart.draw_series(LineSeries::new(
        times.iter().copied().zip(amplitudes.iter().copied()),
        TRACE_COLOR.stroke_width(1),
    ))?;

    let marker = BLUE.mix(0.5).stroke_width(1);
    let dash = (y_max - y_min) * DASH;
    for arrival in visible_arrivals(request.arrivals, (t_min, t_max)) {
        let t = arrival.time;
        let mut dashes = Vec::new();
        let mut y = y_min;
        while y < y_max {
            dashes.push(PathElement::new(vec![(t, y), (t, (y + dash).min(y_max))], marker));
            y += 2.0 * dash;
        }
        chart.draw_series(dashes)?;
        chart.draw_series(std::iter::once(Text::new(
            arrival.phase.clone(),
            (1.02 * t, y_max),
            ("sans-serif", 14).into_font().color(&BLUE),
        )))?;
    }
    Ok(())
}

fn draw_section<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, request: &FigureRequest<'_>) -> DrawResult<DB> {
    let title = format!("Epicentral distance: {:.1}°", request.distance.degrees());
    let area = area.titled(&title, ("sans-serif", 18))?;
    let (width, height) = area.dim_in_pixel();
    let model = request.model;
    let section = CrossSection::fit(width, height, model.radius(), SECTION_MARGIN);

    area.draw(&Circle::new(
        section.center,
        section.radius_px(model.radius()),
        EARTH_FILL.filled(),
    ))?;
    for (radius, color) in [
        (model.radius(), BLACK),
        (model.cmb_radius(), BOUNDARY_COLOR),
        (model.icb_radius(), BOUNDARY_COLOR),
    ] {
        area.draw(&Circle::new(
            section.center,
            section.radius_px(radius),
            color.stroke_width(1),
        ))?;
    }

    for (index, arrival) in request.arrivals.iter().enumerate() {
        let color = Palette99::pick(index);
        let points: Vec<(i32, i32)> = arrival
            .path
            .iter()
            .map(|point| section.project(point.radius_km, point.angle_rad))
            .collect();
        area.draw(&PathElement::new(points.clone(), color.stroke_width(2)))?;
        if let Some(&(x, y)) = points.last() {
            area.draw(&Text::new(
                arrival.phase.clone(),
                (x + 6, y - 6 - 14 * index as i32),
                ("sans-serif", 14).into_font().color(&color),
            ))?;
        }
    }

    let source_radius = model.radius() - request.source_depth_km;
    area.draw(&Circle::new(
        section.project(source_radius, 0.0),
        5,
        RED.filled(),
    ))?;
    area.draw(&TriangleMarker::new(
        section.project(model.radius(), request.distance.radians()),
        8,
        BLACK.filled(),
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use seiscore::taup::RayPoint;
    use seiscore::waveform::StationChannelId;
    use seiscore::window::parse_timestamp;
    use std::fs;

    fn trace(samples: Vec<f64>) -> ConditionedTrace {
        ConditionedTrace {
            id: StationChannelId::new("AM", "RAEBE", "00", "EHZ"),
            start: parse_timestamp("2020-01-07T08:24:26").unwrap(),
            sampling_rate: 10.0,
            samples,
        }
    }

    fn arrival(phase: &str, time: f64) -> PhaseArrival {
        PhaseArrival {
            phase: phase.into(),
            time,
            ray_param: 8.0,
            distance_deg: 61.4,
            path: vec![
                RayPoint {
                    radius_km: 6361.0,
                    angle_rad: 0.0,
                },
                RayPoint {
                    radius_km: 4500.0,
                    angle_rad: 0.5,
                },
                RayPoint {
                    radius_km: 6371.0,
                    angle_rad: 61.4f64.to_radians(),
                },
            ],
        }
    }

    fn render(trace: &ConditionedTrace, arrivals: &[PhaseArrival], path: &Path) -> StageResult<()> {
        let model = VelocityModel::iasp91();
        let filter = FilterSpec::new(0.3, 0.7, 4);
        let request = FigureRequest {
            trace,
            origin: trace.start,
            arrivals,
            distance: EpicentralDistance(61.384),
            source_depth_km: 10.0,
            filter: &filter,
            model: &model,
            label: "M 6.4 Puerto Rico",
        };
        FigureComposer::default().render(&request, path)
    }

    #[test]
    fn svg_figure_carries_titles_and_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traces.svg");
        let samples = (0..200).map(|i| (i as f64 * 0.1).sin() * 1e-4).collect();
        render(&trace(samples), &[arrival("P", 6.2), arrival("S", 11.3)], &path).unwrap();

        let svg = fs::read_to_string(&path).unwrap();
        assert!(svg.contains("M 6.4 Puerto Rico"));
        assert!(svg.contains("Epicentral distance: 61.4°"));
        assert!(svg.contains("AM.RAEBE.00.EHZ"));
        assert!(svg.contains("Ground velocity (mm/s)"));
        assert!(svg.contains(">P<"));
    }

    #[test]
    fn flat_trace_without_arrivals_still_renders() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.svg");
        render(&trace(vec![0.0; 50]), &[], &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn empty_trace_is_a_rendering_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = render(&trace(Vec::new()), &[], &dir.path().join("empty.svg")).unwrap_err();
        assert!(matches!(err, PipelineError::Rendering(_)));
    }

    #[test]
    fn unwritable_target_is_a_rendering_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("traces.svg");
        let err = render(&trace(vec![1e-5; 20]), &[], &path).unwrap_err();
        assert!(matches!(err, PipelineError::Rendering(_)));
    }

    #[cfg(not(feature = "ttf"))]
    #[test]
    fn bitmap_without_font_backend_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traces.png");
        let err = render(&trace(vec![1e-5; 20]), &[arrival("P", 0.5)], &path).unwrap_err();
        match err {
            PipelineError::Rendering(reason) => assert!(reason.contains("ttf")),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!path.exists());
        assert!(FigureComposer::check_target(Path::new("traces.SVG")).is_ok());
    }
}
