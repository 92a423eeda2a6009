//! Engine configuration. Every knob has a default matching the deployed
//! station profile, so `EngineConfig::default()` is a runnable setup.

use serde::{Deserialize, Serialize};

use crate::df::ArrayGeometry;
use crate::scanning::BandAssignment;
use crate::{CoreError, CoreResult};

/// Top-level configuration for the sweep engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bands: Vec<BandAssignment>,
    pub scan: ScanConfig,
    pub anomaly: AnomalyConfig,
    pub df: DfConfig,
    pub controller: ControllerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bands: default_bands(),
            scan: ScanConfig::default(),
            anomaly: AnomalyConfig::default(),
            df: DfConfig::default(),
            controller: ControllerConfig::default(),
        }
    }
}

fn default_bands() -> Vec<BandAssignment> {
    vec![
        BandAssignment {
            band_name: "2m".into(),
            start_hz: 144.0e6,
            end_hz: 148.0e6,
            step_hz: 25.0e3,
            priority: 3,
        },
        BandAssignment {
            band_name: "70cm".into(),
            start_hz: 420.0e6,
            end_hz: 450.0e6,
            step_hz: 25.0e3,
            priority: 3,
        },
        BandAssignment {
            band_name: "ism433".into(),
            start_hz: 433.05e6,
            end_hz: 434.79e6,
            step_hz: 25.0e3,
            priority: 3,
        },
        BandAssignment {
            band_name: "ism915".into(),
            start_hz: 902.0e6,
            end_hz: 928.0e6,
            step_hz: 25.0e3,
            priority: 4,
        },
    ]
}

/// Sweep worker behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Dwell per step, in seconds of IQ capture.
    pub integration_window_s: f64,
    /// How long `stop_epoch` waits for each worker before declaring it wedged.
    pub stop_timeout_s: f64,
    pub fft_size: usize,
    pub gain_db: f64,
    /// Capacity of the sample aggregation queue shared by all workers.
    pub queue_depth: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            integration_window_s: 0.1,
            stop_timeout_s: 2.0,
            fft_size: 1024,
            gain_db: 30.0,
            queue_depth: 1024,
        }
    }
}

/// Relative contribution of each anomaly signal to the priority score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityWeights {
    pub strong: f64,
    pub new: f64,
    pub burst: f64,
    pub hopping: f64,
    pub surge: f64,
    /// Points per dB of excess over baseline.
    pub delta: f64,
    /// Extra points for a bin flagged within `recency_window_s`.
    pub recency: f64,
    pub recency_window_s: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            strong: 5.0,
            new: 3.0,
            burst: 4.0,
            hopping: 5.0,
            surge: 4.0,
            delta: 0.5,
            recency: 2.0,
            recency_window_s: 60.0,
        }
    }
}

/// Baseline learning and anomaly classification thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Baseline resolution. Observations quantize to bins of this width.
    pub bin_hz: f64,
    /// EMA weight given to the newest observation, in (0, 1].
    pub ema_weight: f64,
    /// Baseline entries unseen for this long are evicted.
    pub retention_s: f64,
    /// Absolute power above which a signal is flagged strong.
    pub strong_dbm: f64,
    /// Rise over baseline that flags a surge.
    pub surge_db: f64,
    /// Assumed baseline power for bins never seen before.
    pub floor_estimate_dbm: f64,
    /// Rise over baseline that counts the bin as active for burst/hop logic.
    pub activity_delta_db: f64,
    /// Activity tracker window.
    pub window_s: f64,
    /// Hop neighborhood half-width around the observed bin.
    pub neighborhood_hz: f64,
    /// Distinct active bins in the neighborhood to call it a hopper.
    pub hop_min_bins: usize,
    /// Hits in one bin to call it a burster.
    pub burst_min_hits: usize,
    /// Maximum gap between consecutive hits of one burst.
    pub burst_max_gap_s: f64,
    /// Bound on the retained anomaly history.
    pub history_cap: usize,
    pub weights: PriorityWeights,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            bin_hz: 10_000.0,
            ema_weight: 0.1,
            retention_s: 86_400.0,
            strong_dbm: -40.0,
            surge_db: 15.0,
            floor_estimate_dbm: -100.0,
            activity_delta_db: 6.0,
            window_s: 300.0,
            neighborhood_hz: 100_000.0,
            hop_min_bins: 3,
            burst_min_hits: 4,
            burst_max_gap_s: 2.0,
            history_cap: 256,
            weights: PriorityWeights::default(),
        }
    }
}

/// Direction-finding array and capture parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DfConfig {
    pub geometry: ArrayGeometry,
    /// Signal-subspace dimension assumed by the estimator.
    pub num_sources: usize,
    /// Bearings from captures below this SNR are reported with zero confidence.
    pub snr_gate_db: f64,
    pub capture_samples: usize,
    pub gain_db: f64,
    /// Allowed start-time skew between element captures, in sample periods.
    pub max_skew_periods: f64,
}

impl Default for DfConfig {
    fn default() -> Self {
        Self {
            geometry: ArrayGeometry::square(0.5),
            num_sources: 1,
            snr_gate_db: 10.0,
            capture_samples: 16_384,
            gain_db: 30.0,
            max_skew_periods: 1.0,
        }
    }
}

/// Mode-switch policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Anomalies scoring at or above this trigger a DF cycle.
    pub trigger_threshold: f64,
    /// Samples drained from the queue per `pump` call.
    pub pump_budget: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: 10.0,
            pump_budget: 512,
        }
    }
}

impl EngineConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.bands.is_empty() {
            return Err(CoreError::InvalidConfig("no bands assigned".into()));
        }
        for band in &self.bands {
            band.validate()?;
        }
        if !(self.anomaly.ema_weight > 0.0 && self.anomaly.ema_weight <= 1.0) {
            return Err(CoreError::InvalidConfig(format!(
                "ema_weight {} outside (0, 1]",
                self.anomaly.ema_weight
            )));
        }
        if self.anomaly.bin_hz <= 0.0 {
            return Err(CoreError::InvalidConfig("bin_hz must be positive".into()));
        }
        if self.scan.integration_window_s <= 0.0 {
            return Err(CoreError::InvalidConfig(
                "integration_window_s must be positive".into(),
            ));
        }
        if self.scan.queue_depth == 0 {
            return Err(CoreError::InvalidConfig("queue_depth must be nonzero".into()));
        }
        self.df.geometry.validate()?;
        if self.df.geometry.is_collinear() {
            log::warn!("array geometry is collinear; bearings will be ambiguous");
        }
        if self.df.num_sources == 0 || self.df.num_sources >= self.df.geometry.elements.len() {
            return Err(CoreError::InvalidConfig(format!(
                "num_sources {} needs at least {} array elements",
                self.df.num_sources,
                self.df.num_sources + 1
            )));
        }
        if self.df.capture_samples == 0 {
            return Err(CoreError::InvalidConfig(
                "capture_samples must be nonzero".into(),
            ));
        }
        Ok(())
    }
}
