use log::{info, warn};
use reqwest::{StatusCode, Url};
use seiscore::codec::{decode_records, parse_response, records_to_runs};
use seiscore::prelude::{PipelineError, StageResult};
use seiscore::waveform::{InstrumentResponse, RawTrace, StationChannelId, WaveformService};
use seiscore::window::{AcquisitionWindow, Timestamp};
use tokio::runtime::{Builder, Runtime};

const QUERY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Blocking FDSN web-service client for `dataselect` and `station`.
pub struct FdsnClient {
    base_url: String,
    client: reqwest::Client,
    runtime: Runtime,
}

fn transport(url: &str, reason: impl ToString) -> PipelineError {
    PipelineError::Transport {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

fn query_time(time: &Timestamp) -> String {
    time.format(QUERY_TIME_FORMAT).to_string()
}

impl FdsnClient {
    pub fn new(base_url: &str) -> StageResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| transport(base_url, err))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("shakeplot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| transport(base_url, err))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            runtime,
        })
    }

    /// Builds `{base}/fdsnws/{service}/1/query?...` for one channel and window.
    pub fn query_url(
        &self,
        service: &str,
        id: &StationChannelId,
        window: &AcquisitionWindow,
        extra: &[(&str, &str)],
    ) -> StageResult<Url> {
        let endpoint = format!("{}/fdsnws/{}/1/query", self.base_url, service);
        let location = if id.location.is_empty() {
            "--"
        } else {
            id.location.as_str()
        };
        let (start, end) = (query_time(&window.start), query_time(&window.end));
        let mut params = vec![
            ("net", id.network.as_str()),
            ("sta", id.station.as_str()),
            ("loc", location),
            ("cha", id.channel.as_str()),
            ("start", start.as_str()),
            ("end", end.as_str()),
        ];
        params.extend_from_slice(extra);
        Url::parse_with_params(&endpoint, &params).map_err(|err| transport(&endpoint, err))
    }

    /// Body of a successful GET, or `None` when the service has no data.
    fn get(&self, url: &Url) -> StageResult<Option<Vec<u8>>> {
        info!("GET {}", url);
        self.runtime.block_on(async {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|err| transport(url.as_str(), err))?;
            let status = response.status();
            let body = response
                .bytes()
                .await
                .map_err(|err| transport(url.as_str(), err))?;
            service_body(url, status, body.to_vec())
        })
    }

    fn fetch_response(
        &self,
        id: &StationChannelId,
        window: &AcquisitionWindow,
    ) -> StageResult<Option<InstrumentResponse>> {
        let url = self.query_url("station", id, window, &[("level", "response")])?;
        let Some(body) = self.get(&url)? else {
            return Ok(None);
        };
        let xml = String::from_utf8_lossy(&body);
        parse_response(&xml, id)
    }
}

/// Interprets an FDSN reply: 204 and 404 mean no data, other non-2xx
/// statuses are transport failures.
fn service_body(url: &Url, status: StatusCode, body: Vec<u8>) -> StageResult<Option<Vec<u8>>> {
    if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(transport(url.as_str(), format!("HTTP {status}")));
    }
    Ok((!body.is_empty()).then_some(body))
}

/// Builds the raw trace from a dataselect body. Station metadata is only
/// requested once data is known to exist; its failure is kept on the trace.
fn assemble_trace(
    id: &StationChannelId,
    window: &AcquisitionWindow,
    body: Option<Vec<u8>>,
    metadata: impl FnOnce() -> StageResult<Option<InstrumentResponse>>,
) -> StageResult<RawTrace> {
    let unavailable = || PipelineError::DataUnavailable {
        id: id.to_string(),
        window: window.to_string(),
    };
    let body = body.ok_or_else(unavailable)?;
    let records = decode_records(&body)?;
    info!("{} miniSEED records for {}", records.len(), id);

    let runs = records_to_runs(records, id);
    if runs.iter().all(|run| run.samples.is_empty()) {
        return Err(unavailable());
    }

    let (response, missing_response) = match metadata() {
        Ok(Some(response)) => (Some(response), None),
        Ok(None) => (None, Some(format!("station metadata holds no response for {id}"))),
        Err(err) => (None, Some(format!("station metadata unavailable: {err}"))),
    };
    if let Some(reason) = &missing_response {
        warn!("{}", reason);
    }

    Ok(RawTrace {
        id: id.clone(),
        runs,
        response,
        missing_response,
    })
}

impl WaveformService for FdsnClient {
    fn fetch(&self, id: &StationChannelId, window: &AcquisitionWindow) -> StageResult<RawTrace> {
        let url = self.query_url("dataselect", id, window, &[])?;
        let body = self.get(&url)?;
        assemble_trace(id, window, body, || self.fetch_response(id, window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seiscore::prelude::StageConfig;
    use seiscore::processing::{ConditioningChain, FilterSpec};
    use seiscore::waveform::merge_runs;
    use seiscore::window::parse_timestamp;

    #[test]
    fn query_url_carries_channel_and_window() {
        let client = FdsnClient::new("http://fdsnws.raspberryshakedata.com/").unwrap();
        let origin = parse_timestamp("2020-01-07T08:24:26").unwrap();
        let window = AcquisitionWindow::resolve(origin, 0.0, 1250.0).unwrap();
        let id = StationChannelId::new("AM", "RAEBE", "00", "EHZ");

        let url = client.query_url("dataselect", &id, &window, &[]).unwrap();
        assert_eq!(url.path(), "/fdsnws/dataselect/1/query");
        let query = url.query().unwrap();
        assert!(query.contains("net=AM&sta=RAEBE&loc=00&cha=EHZ"));
        assert!(query.contains("start=2020-01-07T08%3A24%3A26.000000"));
        assert!(query.contains("end=2020-01-07T08%3A45%3A16.000000"));
    }

    #[test]
    fn blank_location_is_sent_as_dashes() {
        let client = FdsnClient::new("http://localhost:8080").unwrap();
        let origin = parse_timestamp("2020-01-07T08:24:26").unwrap();
        let window = AcquisitionWindow::resolve(origin, 10.0, 10.0).unwrap();
        let id = StationChannelId::new("IU", "ANMO", "", "BHZ");
        let url = client
            .query_url("station", &id, &window, &[("level", "response")])
            .unwrap();
        let query = url.query().unwrap();
        assert!(query.contains("loc=--"));
        assert!(query.ends_with("level=response"));
    }

    fn window() -> AcquisitionWindow {
        let origin = parse_timestamp("2020-01-07T08:24:26").unwrap();
        AcquisitionWindow::resolve(origin, 0.0, 1.0).unwrap()
    }

    /// One 512-byte big-endian INT32 record at 100 Hz.
    fn int32_record(channel: &[u8; 3], samples: &[i32]) -> Vec<u8> {
        let mut bytes = vec![0u8; 512];
        bytes[..6].copy_from_slice(b"000001");
        bytes[6] = b'D';
        bytes[8..13].copy_from_slice(b"RAEBE");
        bytes[13..15].copy_from_slice(b"00");
        bytes[15..18].copy_from_slice(channel);
        bytes[18..20].copy_from_slice(b"AM");
        let mut put = |at: usize, value: u16| bytes[at..at + 2].copy_from_slice(&value.to_be_bytes());
        put(20, 2020);
        put(22, 7);
        put(30, samples.len() as u16);
        put(32, 100);
        put(34, 1);
        put(44, 64);
        put(46, 48);
        put(48, 1000);
        bytes[24] = 8;
        bytes[25] = 24;
        bytes[26] = 26;
        bytes[39] = 1;
        bytes[52] = 3;
        bytes[53] = 1;
        bytes[54] = 9;
        for (index, value) in samples.iter().enumerate() {
            let at = 64 + 4 * index;
            bytes[at..at + 4].copy_from_slice(&value.to_be_bytes());
        }
        bytes
    }

    fn ehz() -> StationChannelId {
        StationChannelId::new("AM", "RAEBE", "00", "EHZ")
    }

    #[test]
    fn no_content_and_not_found_mean_no_data() {
        let url = Url::parse("http://localhost/fdsnws/dataselect/1/query").unwrap();
        assert_eq!(service_body(&url, StatusCode::NO_CONTENT, Vec::new()).unwrap(), None);
        assert_eq!(service_body(&url, StatusCode::NOT_FOUND, b"none".to_vec()).unwrap(), None);
        assert_eq!(service_body(&url, StatusCode::OK, Vec::new()).unwrap(), None);
        assert_eq!(
            service_body(&url, StatusCode::OK, vec![1, 2]).unwrap(),
            Some(vec![1, 2])
        );
    }

    #[test]
    fn server_errors_are_transport_failures() {
        let url = Url::parse("http://localhost/fdsnws/station/1/query?sta=RAEBE").unwrap();
        match service_body(&url, StatusCode::INTERNAL_SERVER_ERROR, Vec::new()).unwrap_err() {
            PipelineError::Transport { url, reason } => {
                assert!(url.contains("sta=RAEBE"));
                assert!(reason.contains("500"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_body_is_unavailable_without_metadata_lookup() {
        let mut asked = false;
        let err = assemble_trace(&ehz(), &window(), None, || {
            asked = true;
            Ok(None)
        })
        .unwrap_err();
        assert!(matches!(err, PipelineError::DataUnavailable { .. }));
        assert!(!asked);
    }

    #[test]
    fn records_for_other_channels_are_unavailable() {
        let body = int32_record(b"EHN", &[1, 2, 3]);
        let err = assemble_trace(&ehz(), &window(), Some(body), || Ok(None)).unwrap_err();
        assert!(matches!(err, PipelineError::DataUnavailable { .. }));
    }

    #[test]
    fn decoded_trace_carries_station_response() {
        let body = int32_record(b"EHZ", &[5, -5, 10]);
        let trace = assemble_trace(&ehz(), &window(), Some(body), || {
            Ok(Some(InstrumentResponse::flat_velocity(3.99e8)))
        })
        .unwrap();
        assert_eq!(trace.runs.len(), 1);
        assert_eq!(trace.runs[0].samples, vec![5.0, -5.0, 10.0]);
        assert!(trace.response.is_some());
        assert!(trace.missing_response.is_none());

        let trace = assemble_trace(&ehz(), &window(), Some(int32_record(b"EHZ", &[1])), || {
            Ok(None)
        })
        .unwrap();
        assert!(trace.missing_response.unwrap().contains("AM.RAEBE.00.EHZ"));
    }

    #[test]
    fn station_failure_reaches_response_removal() {
        let station_url = "http://localhost/fdsnws/station/1/query?sta=RAEBE&level=response";
        let samples: Vec<i32> = (0..101).map(|i| (i % 7) * 100).collect();
        let body = int32_record(b"EHZ", &samples);
        let raw = assemble_trace(&ehz(), &window(), Some(body), || {
            Err(transport(station_url, "HTTP 500 Internal Server Error"))
        })
        .unwrap();
        assert!(raw.response.is_none());

        let merged = merge_runs(raw).unwrap();
        let config = StageConfig::new(window(), FilterSpec::new(0.3, 0.7, 4));
        match ConditioningChain::new().run(&config, merged).unwrap_err() {
            PipelineError::ResponseRemoval { id, reason } => {
                assert_eq!(id, "AM.RAEBE.00.EHZ");
                assert!(reason.contains(station_url));
                assert!(reason.contains("HTTP 500"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
