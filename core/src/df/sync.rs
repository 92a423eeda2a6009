//! Coherent capture handling: skew and SNR gating, phase calibration, and
//! the wrapper that turns a set of element captures into a bearing.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::config::DfConfig;
use crate::df::music::{self, Bearing};
use crate::hardware::{LeaseHandle, ResourceManager, SampleBlock};
use crate::math::{FftHelper, SpectralStats};
use crate::{CoreError, CoreResult};

/// Result of one phase calibration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub phase_offsets_rad: Vec<f64>,
    /// Mean normalized pairwise correlation across elements, 0 to 1.
    pub coherence: f64,
    pub snr_db: f64,
    pub frequency_hz: f64,
}

impl CalibrationReport {
    /// Below this the array is not usably phase locked.
    pub fn is_good(&self) -> bool {
        self.coherence > 0.7
    }
}

pub struct DfEngine {
    config: DfConfig,
}

impl DfEngine {
    pub fn new(config: DfConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DfConfig {
        &self.config
    }

    /// Install calibration offsets, replacing any previous set.
    pub fn set_phase_offsets(&mut self, offsets: Vec<f64>) -> CoreResult<()> {
        if offsets.len() != self.config.geometry.elements.len() {
            return Err(CoreError::InvalidConfig(format!(
                "{} offsets for {} elements",
                offsets.len(),
                self.config.geometry.elements.len()
            )));
        }
        self.config.geometry.phase_offsets_rad = offsets;
        Ok(())
    }

    /// Read one capture from every array lease. Failed reads are dropped;
    /// the caller decides whether what remains is enough.
    pub fn collect_blocks(
        &self,
        manager: &ResourceManager,
        leases: &[LeaseHandle],
    ) -> Vec<SampleBlock> {
        let mut blocks = Vec::with_capacity(leases.len());
        for lease in leases {
            match manager.sample(lease, self.config.capture_samples) {
                Ok(block) => blocks.push(block),
                Err(err) => log::warn!("array capture on unit {} lost: {err}", lease.unit_id()),
            }
        }
        blocks
    }

    /// Turn element captures into a bearing. Never errors: a capture that
    /// fails the element-count, skew, or SNR gate produces a bearing with
    /// zero confidence so the event stream still records the attempt.
    pub fn resolve_bearing(&self, frequency_hz: f64, blocks: &[SampleBlock]) -> Bearing {
        let timestamp = blocks.first().map(|block| block.start_timestamp).unwrap_or(0.0);
        if blocks.len() < 2 {
            log::warn!("bearing at {frequency_hz} Hz skipped: {} capture(s)", blocks.len());
            return self.rejected(frequency_hz, timestamp, 0.0);
        }
        let starts: Vec<f64> = blocks.iter().map(|block| block.start_timestamp).collect();
        let skew = starts.iter().copied().fold(f64::MIN, f64::max)
            - starts.iter().copied().fold(f64::MAX, f64::min);
        let allowed = self.config.max_skew_periods * blocks[0].sample_period();
        if skew > allowed {
            log::warn!("bearing at {frequency_hz} Hz skipped: skew {skew:.3e} s over budget");
            return self.rejected(frequency_hz, timestamp, 0.0);
        }
        let mut fft = FftHelper::new(blocks[0].iq.len());
        let snr_db = SpectralStats::estimate_snr_db(&mut fft, &blocks[0].iq);
        if snr_db < self.config.snr_gate_db {
            log::debug!("bearing at {frequency_hz} Hz gated: SNR {snr_db:.1} dB");
            return self.rejected(frequency_hz, timestamp, snr_db);
        }
        self.bearing_from_blocks(frequency_hz, blocks, snr_db)
    }

    fn rejected(&self, frequency_hz: f64, timestamp: f64, snr_db: f64) -> Bearing {
        Bearing {
            frequency_hz,
            degrees: 0.0,
            confidence: 0.0,
            snr_db,
            timestamp,
        }
    }

    fn bearing_from_blocks(
        &self,
        frequency_hz: f64,
        blocks: &[SampleBlock],
        snr_db: f64,
    ) -> Bearing {
        let channels = self.corrected_channels(blocks);
        let r = music::covariance(&channels);
        let estimate = music::music_bearing(
            &r,
            &self.config.geometry,
            frequency_hz,
            self.config.num_sources,
        );
        Bearing {
            frequency_hz,
            degrees: estimate.degrees,
            confidence: estimate.confidence,
            snr_db,
            timestamp: blocks[0].start_timestamp,
        }
    }

    /// Equal-length channels with calibration offsets removed.
    fn corrected_channels(&self, blocks: &[SampleBlock]) -> Vec<Vec<Complex64>> {
        let shortest = blocks.iter().map(|block| block.iq.len()).min().unwrap_or(0);
        blocks
            .iter()
            .enumerate()
            .map(|(index, block)| {
                let correction =
                    Complex64::from_polar(1.0, -self.config.geometry.offset(index));
                block.iq[..shortest]
                    .iter()
                    .map(|sample| sample * correction)
                    .collect()
            })
            .collect()
    }

    /// Estimate per-element phase offsets from a capture of one emitter.
    ///
    /// With `known_bearing` the geometric phase expected from that direction
    /// is subtracted, leaving only the cable and frontend error. Without it
    /// the emitter is assumed equidistant from all elements.
    pub fn calibrate_from_blocks(
        &mut self,
        blocks: &[SampleBlock],
        frequency_hz: f64,
        known_bearing_deg: Option<f64>,
    ) -> CoreResult<CalibrationReport> {
        if blocks.len() < 2 {
            return Err(CoreError::Sync(format!(
                "calibration needs at least 2 captures, got {}",
                blocks.len()
            )));
        }
        let shortest = blocks.iter().map(|block| block.iq.len()).min().unwrap_or(0);
        if shortest == 0 {
            return Err(CoreError::Sync("empty calibration capture".into()));
        }
        let channels: Vec<&[Complex64]> =
            blocks.iter().map(|block| &block.iq[..shortest]).collect();

        let expected = self.expected_phases(frequency_hz, known_bearing_deg, channels.len());
        let mut fft = FftHelper::new(shortest);
        let reference_spectrum = fft.forward(channels[0]);
        let mut offsets = Vec::with_capacity(channels.len());
        for (index, channel) in channels.iter().enumerate() {
            if index == 0 {
                offsets.push(0.0);
                continue;
            }
            let measured = xcorr_phase(&mut fft, channel, &reference_spectrum);
            offsets.push(wrap_phase(measured - expected[index]));
        }

        let report = CalibrationReport {
            phase_offsets_rad: offsets.clone(),
            coherence: coherence(&channels),
            snr_db: SpectralStats::estimate_snr_db(&mut fft, channels[0]),
            frequency_hz,
        };
        log::info!(
            "calibration at {:.3} MHz: coherence {:.3}, SNR {:.1} dB",
            frequency_hz / 1.0e6,
            report.coherence,
            report.snr_db
        );
        self.config.geometry.phase_offsets_rad = offsets;
        Ok(report)
    }

    /// Geometric phase of each element relative to element 0 for a plane
    /// wave from the known bearing; zeros when the bearing is unknown.
    fn expected_phases(
        &self,
        frequency_hz: f64,
        known_bearing_deg: Option<f64>,
        count: usize,
    ) -> Vec<f64> {
        let bearing = match known_bearing_deg {
            Some(bearing) => bearing,
            None => return vec![0.0; count],
        };
        let wavelength = music::SPEED_OF_LIGHT / frequency_hz;
        let k = 2.0 * std::f64::consts::PI / wavelength;
        let theta = bearing.to_radians();
        let (kx, ky) = (k * theta.sin(), k * theta.cos());
        let phase = |index: usize| {
            let [x, y] = self.config.geometry.elements[index];
            kx * x + ky * y
        };
        let origin = phase(0);
        (0..count).map(|index| phase(index) - origin).collect()
    }
}

/// Phase of the cross-correlation peak between a channel and the reference.
///
/// The peak search is confined to small lags; the captures come from one
/// shared trigger, so a distant peak is a harmonic, not the alignment.
fn xcorr_phase(fft: &mut FftHelper, channel: &[Complex64], reference_spectrum: &[Complex64]) -> f64 {
    let spectrum = fft.forward(channel);
    let cross: Vec<Complex64> = spectrum
        .iter()
        .zip(reference_spectrum.iter())
        .map(|(a, b)| a * b.conj())
        .collect();
    let correlation = fft.inverse(&cross);
    let n = correlation.len();
    let window = 4.min(n / 2);
    let mut best = correlation[0];
    for lag in 1..=window {
        for candidate in [correlation[lag], correlation[n - lag]] {
            if candidate.norm_sqr() > best.norm_sqr() {
                best = candidate;
            }
        }
    }
    best.arg()
}

fn wrap_phase(phase: f64) -> f64 {
    let mut wrapped = phase;
    while wrapped > std::f64::consts::PI {
        wrapped -= 2.0 * std::f64::consts::PI;
    }
    while wrapped < -std::f64::consts::PI {
        wrapped += 2.0 * std::f64::consts::PI;
    }
    wrapped
}

/// Mean normalized pairwise correlation magnitude across the channels.
fn coherence(channels: &[&[Complex64]]) -> f64 {
    let m = channels.len();
    if m < 2 {
        return 0.0;
    }
    let energies: Vec<f64> = channels
        .iter()
        .map(|channel| channel.iter().map(|sample| sample.norm_sqr()).sum::<f64>())
        .collect();
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..m {
        for j in i + 1..m {
            let cross: Complex64 = channels[i]
                .iter()
                .zip(channels[j].iter())
                .map(|(a, b)| a * b.conj())
                .sum();
            let scale = (energies[i] * energies[j]).sqrt();
            if scale > 1e-30 {
                total += cross.norm() / scale;
                pairs += 1;
            }
        }
    }
    if pairs == 0 {
        0.0
    } else {
        total / pairs as f64
    }
}
