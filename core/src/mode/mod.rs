pub mod controller;

pub use controller::ModeController;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine-wide operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeState {
    /// All receivers sweeping their assigned bands.
    ParallelScan,
    /// Tearing down one arrangement of receivers to build the other.
    Transitioning,
    /// All receivers grouped into the phase-coherent array.
    DirectionFinding,
}

impl fmt::Display for ModeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModeState::ParallelScan => "parallel_scan",
            ModeState::Transitioning => "transitioning",
            ModeState::DirectionFinding => "direction_finding",
        };
        f.write_str(name)
    }
}
