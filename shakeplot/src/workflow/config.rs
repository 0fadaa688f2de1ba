use anyhow::{ensure, Context};
use seiscore::geodesy::GeoPoint;
use seiscore::processing::FilterSpec;
use seiscore::taup::{PhasePredictor, PhaseRequest, VelocityModel};
use seiscore::waveform::StationChannelId;
use seiscore::window::{parse_timestamp, AcquisitionWindow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use visualizer::FigureComposer;

pub const DEFAULT_SERVICE_URL: &str = "http://fdsnws.raspberryshakedata.com";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub depth_km: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StationLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Everything one run needs, as read from YAML. Missing keys fall back to
/// the Puerto Rico M6.4 recording at AM.RAEBE.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub origin_time: String,
    pub pre_seconds: f64,
    pub post_seconds: f64,
    pub phases: Vec<String>,
    pub event: EventConfig,
    pub station_location: StationLocation,
    pub filter: FilterSpec,
    pub label: String,
    pub model: String,
    pub output: PathBuf,
    pub service_url: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            network: "AM".into(),
            station: "RAEBE".into(),
            location: "00".into(),
            channel: "EHZ".into(),
            origin_time: "2020-01-07T08:24:26".into(),
            pre_seconds: 0.0,
            post_seconds: 1250.0,
            phases: vec!["P".into(), "S".into()],
            event: EventConfig {
                latitude: 17.916,
                longitude: -66.813,
                depth_km: 10.0,
            },
            station_location: StationLocation {
                latitude: 51.33,
                longitude: -0.49,
            },
            filter: FilterSpec::new(0.3, 0.7, 4),
            label: "M 6.4 Puerto Rico".into(),
            model: "iasp91".into(),
            output: PathBuf::from("traces.svg"),
            service_url: DEFAULT_SERVICE_URL.into(),
            width: 1200,
            height: 800,
        }
    }
}

/// Checked, typed form of [`WorkflowConfig`].
#[derive(Clone, Debug)]
pub struct ValidatedConfig {
    pub id: StationChannelId,
    pub window: AcquisitionWindow,
    pub event: GeoPoint,
    pub station: GeoPoint,
    pub filter: FilterSpec,
    pub request: PhaseRequest,
    pub label: String,
    pub output: PathBuf,
    pub service_url: String,
    pub width: u32,
    pub height: u32,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn load_model(&self) -> anyhow::Result<VelocityModel> {
        VelocityModel::named(&self.model)
            .with_context(|| format!("loading velocity model {}", self.model))
    }

    /// Checks every value once, before any request is made.
    pub fn validate(&self, predictor: &PhasePredictor) -> anyhow::Result<ValidatedConfig> {
        let origin = parse_timestamp(&self.origin_time).context("parsing origin_time")?;
        let window = AcquisitionWindow::resolve(origin, self.pre_seconds, self.post_seconds)
            .context("resolving acquisition window")?;

        let event = GeoPoint::new(self.event.latitude, self.event.longitude, self.event.depth_km);
        event.validate().context("validating event location")?;
        let station = GeoPoint::new(
            self.station_location.latitude,
            self.station_location.longitude,
            0.0,
        );
        station.validate().context("validating station location")?;

        self.filter.validate().context("validating filter")?;
        ensure!(!self.phases.is_empty(), "at least one phase must be requested");
        let request = PhaseRequest::new(self.phases.iter().map(|phase| phase.trim()));
        predictor
            .validate(event.depth_km, &request)
            .context("validating phase list")?;
        ensure!(
            self.width > 0 && self.height > 0,
            "figure size {}x{} must be positive",
            self.width,
            self.height
        );
        FigureComposer::check_target(&self.output).context("validating output path")?;

        Ok(ValidatedConfig {
            id: StationChannelId::new(&self.network, &self.station, &self.location, &self.channel),
            window,
            event,
            station,
            filter: self.filter,
            request,
            label: self.label.clone(),
            output: self.output.clone(),
            service_url: self.service_url.trim_end_matches('/').to_string(),
            width: self.width,
            height: self.height,
        })
    }
}
