use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CoreResult;

/// Health of one physical receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Idle,
    Tuning,
    Sampling,
    Faulted,
}

/// What a leased receiver is currently doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Sweeping one named frequency band.
    Scan(String),
    /// Serving as one element of the phase-coherent DF array.
    ArrayElement(usize),
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Scan(band) => write!(f, "scan:{band}"),
            Role::ArrayElement(index) => write!(f, "array-element:{index}"),
        }
    }
}

/// Static description reported by the transport for one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverDescriptor {
    pub serial: String,
    pub min_freq_hz: f64,
    pub max_freq_hz: f64,
    pub sample_rate_hz: f64,
}

/// One physical SDR receiver tracked by the resource manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverUnit {
    pub id: usize,
    pub descriptor: ReceiverDescriptor,
    pub center_freq_hz: f64,
    pub gain_db: f64,
    pub role: Option<Role>,
    pub health: HealthState,
}

/// One capture from a single receiver.
#[derive(Debug, Clone)]
pub struct SampleBlock {
    pub iq: Vec<Complex64>,
    pub sample_rate_hz: f64,
    /// Seconds on the backend's capture clock at the first sample.
    pub start_timestamp: f64,
}

impl SampleBlock {
    /// Duration of one sample in seconds.
    pub fn sample_period(&self) -> f64 {
        if self.sample_rate_hz > 0.0 {
            1.0 / self.sample_rate_hz
        } else {
            0.0
        }
    }
}

/// Transport-level access to the physical receivers.
///
/// Implementations block the calling task on device I/O; `read_samples`
/// returns after one block of IQ data. Blocks captured by different units
/// while tuned together must share the backend's capture clock, since the
/// DF engine compares their start timestamps.
pub trait ReceiverBackend: Send + Sync {
    fn enumerate(&self) -> CoreResult<Vec<ReceiverDescriptor>>;
    fn tune(&self, index: usize, freq_hz: f64, gain_db: f64) -> CoreResult<()>;
    fn read_samples(&self, index: usize, count: usize) -> CoreResult<SampleBlock>;
    /// Re-probe a unit previously marked faulted.
    fn probe(&self, index: usize) -> CoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_display_matches_wire_form() {
        assert_eq!(Role::Scan("2m".into()).to_string(), "scan:2m");
        assert_eq!(Role::ArrayElement(3).to_string(), "array-element:3");
    }
}
