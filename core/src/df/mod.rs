pub mod geometry;
pub mod music;
pub mod sync;

pub use geometry::ArrayGeometry;
pub use music::{Bearing, MusicEstimate};
pub use sync::{CalibrationReport, DfEngine};
