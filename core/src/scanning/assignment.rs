use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

/// One frequency band handed to a single scan worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandAssignment {
    pub band_name: String,
    pub start_hz: f64,
    pub end_hz: f64,
    pub step_hz: f64,
    /// Higher priority bands break score ties in the controller.
    pub priority: u8,
}

impl BandAssignment {
    pub fn validate(&self) -> CoreResult<()> {
        if self.band_name.is_empty() {
            return Err(CoreError::InvalidConfig("band with empty name".into()));
        }
        if self.step_hz <= 0.0 {
            return Err(CoreError::InvalidConfig(format!(
                "band {}: step {} Hz must be positive",
                self.band_name, self.step_hz
            )));
        }
        if self.end_hz <= self.start_hz {
            return Err(CoreError::InvalidConfig(format!(
                "band {}: end {} Hz not above start {} Hz",
                self.band_name, self.end_hz, self.start_hz
            )));
        }
        Ok(())
    }

    /// Number of dwell frequencies in one sweep of this band.
    pub fn steps(&self) -> usize {
        (((self.end_hz - self.start_hz) / self.step_hz).floor() as usize) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(start: f64, end: f64, step: f64) -> BandAssignment {
        BandAssignment {
            band_name: "test".into(),
            start_hz: start,
            end_hz: end,
            step_hz: step,
            priority: 3,
        }
    }

    #[test]
    fn step_count_includes_both_ends() {
        assert_eq!(band(100.0e6, 101.0e6, 250.0e3).steps(), 5);
    }

    #[test]
    fn inverted_band_rejected() {
        assert!(band(101.0e6, 100.0e6, 250.0e3).validate().is_err());
    }

    #[test]
    fn zero_step_rejected() {
        assert!(band(100.0e6, 101.0e6, 0.0).validate().is_err());
    }
}
