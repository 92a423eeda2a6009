pub mod assignment;
pub mod engine;

pub use assignment::BandAssignment;
pub use engine::{EpochHandle, ScanEngine, SpectrumSample};
