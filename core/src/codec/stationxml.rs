//! FDSN StationXML response extraction.

use crate::prelude::{PipelineError, StageResult};
use crate::waveform::{InstrumentResponse, PolesZeros, StationChannelId, TransferFunction};
use num_complex::Complex64;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(rename = "Network", default)]
    networks: Vec<Network>,
}

#[derive(Debug, Deserialize)]
struct Network {
    #[serde(rename = "@code")]
    code: String,
    #[serde(rename = "Station", default)]
    stations: Vec<Station>,
}

#[derive(Debug, Deserialize)]
struct Station {
    #[serde(rename = "@code")]
    code: String,
    #[serde(rename = "Channel", default)]
    channels: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "@code")]
    code: String,
    #[serde(rename = "@locationCode", default)]
    location: String,
    #[serde(rename = "Response")]
    response: Option<Response>,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(rename = "InstrumentSensitivity")]
    sensitivity: Option<Sensitivity>,
    #[serde(rename = "Stage", default)]
    stages: Vec<Stage>,
}

#[derive(Debug, Deserialize)]
struct Sensitivity {
    #[serde(rename = "Value")]
    value: Float,
    #[serde(rename = "Frequency")]
    frequency: Float,
    #[serde(rename = "InputUnits")]
    input_units: Units,
}

#[derive(Debug, Deserialize)]
struct Float {
    #[serde(rename = "$text")]
    value: f64,
}

#[derive(Debug, Deserialize)]
struct Units {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Stage {
    #[serde(rename = "PolesZeros")]
    poles_zeros: Option<PzStage>,
}

#[derive(Debug, Deserialize)]
struct PzStage {
    #[serde(rename = "PzTransferFunctionType")]
    transfer: String,
    #[serde(rename = "NormalizationFactor")]
    normalization_factor: Float,
    #[serde(rename = "NormalizationFrequency")]
    normalization_frequency: Float,
    #[serde(rename = "Zero", default)]
    zeros: Vec<Root>,
    #[serde(rename = "Pole", default)]
    poles: Vec<Root>,
}

#[derive(Debug, Deserialize)]
struct Root {
    #[serde(rename = "Real")]
    real: Float,
    #[serde(rename = "Imaginary")]
    imaginary: Float,
}

impl Root {
    fn complex(&self) -> Complex64 {
        Complex64::new(self.real.value, self.imaginary.value)
    }
}

fn location_matches(served: &str, requested: &str) -> bool {
    let normalize = |code: &str| if code == "--" { String::new() } else { code.trim().to_string() };
    normalize(served) == normalize(requested)
}

/// Pulls the response of `id` out of a `level=response` station document.
///
/// Returns `Ok(None)` when the document does not describe the channel or the
/// channel carries no overall sensitivity.
pub fn parse_response(xml: &str, id: &StationChannelId) -> StageResult<Option<InstrumentResponse>> {
    let document: Document = quick_xml::de::from_str(xml)
        .map_err(|err| PipelineError::Decode(format!("StationXML: {err}")))?;

    let response = document
        .networks
        .into_iter()
        .filter(|network| network.code == id.network)
        .flat_map(|network| network.stations)
        .filter(|station| station.code == id.station)
        .flat_map(|station| station.channels)
        .filter(|channel| channel.code == id.channel && location_matches(&channel.location, &id.location))
        .filter_map(|channel| channel.response)
        .find(|response| response.sensitivity.is_some());

    let Some(response) = response else {
        return Ok(None);
    };
    let Some(sensitivity) = response.sensitivity else {
        return Ok(None);
    };

    let mut instrument = InstrumentResponse::flat_velocity(sensitivity.value.value);
    instrument.sensitivity_frequency = sensitivity.frequency.value;
    instrument.input_units = sensitivity.input_units.name.trim().to_string();
    if let Some(stage) = response.stages.into_iter().find_map(|stage| stage.poles_zeros) {
        instrument.paz = PolesZeros {
            transfer: TransferFunction::from_station_xml(&stage.transfer),
            normalization_factor: stage.normalization_factor.value,
            normalization_frequency: stage.normalization_frequency.value,
            zeros: stage.zeros.iter().map(Root::complex).collect(),
            poles: stage.poles.iter().map(Root::complex).collect(),
        };
    }
    Ok(Some(instrument))
}
