pub mod butterworth;
pub mod fft;
pub mod stats;

pub use butterworth::SosFilter;
pub use fft::FftHelper;
pub use stats::StatsHelper;
