//! Figure composition for a conditioned trace and its predicted arrivals.

pub mod figure;
pub mod layout;

pub use figure::{FigureComposer, FigureRequest};
