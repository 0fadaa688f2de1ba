pub mod client;

pub use client::FdsnClient;
