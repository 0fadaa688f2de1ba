pub mod mseed;
pub mod stationxml;

pub use mseed::{decode_records, records_to_runs, MseedRecord};
pub use stationxml::parse_response;
