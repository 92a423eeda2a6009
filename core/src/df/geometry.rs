use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

/// Physical layout of the DF antenna array, in meters, east/north axes.
///
/// `phase_offsets_rad` holds per-element cable and frontend corrections from
/// the last calibration; empty means uncalibrated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrayGeometry {
    pub elements: Vec<[f64; 2]>,
    pub phase_offsets_rad: Vec<f64>,
}

impl Default for ArrayGeometry {
    fn default() -> Self {
        Self::square(0.5)
    }
}

impl ArrayGeometry {
    /// Four elements on the corners of an axis-aligned square.
    pub fn square(spacing_m: f64) -> Self {
        Self {
            elements: vec![
                [0.0, 0.0],
                [spacing_m, 0.0],
                [spacing_m, spacing_m],
                [0.0, spacing_m],
            ],
            phase_offsets_rad: Vec::new(),
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.elements.len() < 2 {
            return Err(CoreError::InvalidConfig(
                "array needs at least 2 elements".into(),
            ));
        }
        if !self.phase_offsets_rad.is_empty()
            && self.phase_offsets_rad.len() != self.elements.len()
        {
            return Err(CoreError::InvalidConfig(format!(
                "{} phase offsets for {} elements",
                self.phase_offsets_rad.len(),
                self.elements.len()
            )));
        }
        Ok(())
    }

    /// Calibration offset for one element; zero when uncalibrated.
    pub fn offset(&self, index: usize) -> f64 {
        self.phase_offsets_rad.get(index).copied().unwrap_or(0.0)
    }

    /// A collinear array cannot resolve a full 360-degree bearing.
    pub fn is_collinear(&self) -> bool {
        if self.elements.len() < 3 {
            return true;
        }
        let [x0, y0] = self.elements[0];
        let [x1, y1] = self.elements[1];
        self.elements[2..].iter().all(|&[x, y]| {
            let cross = (x1 - x0) * (y - y0) - (y1 - y0) * (x - x0);
            cross.abs() < 1e-9
        })
    }
}
