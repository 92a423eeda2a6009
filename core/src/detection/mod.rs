pub mod anomaly;
pub mod baseline;

pub use anomaly::{Anomaly, AnomalyCategory, AnomalyEngine};
pub use baseline::{BaselineEntry, BaselineMap};
