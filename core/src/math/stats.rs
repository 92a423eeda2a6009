use num_complex::Complex64;

use crate::math::fft::FftHelper;

/// Spectral power and SNR estimates shared by the scan and DF paths.
pub struct SpectralStats;

impl SpectralStats {
    /// Linear power to dB with a small guard against log(0).
    pub fn power_db(power: f64) -> f64 {
        10.0 * (power + 1e-20).log10()
    }

    /// Peak-bin power estimate in dBm for one integration window.
    ///
    /// A full-scale tone of amplitude `a` reports `20*log10(a)`; the dBm
    /// reference point is whatever the backend's sample scaling makes it.
    pub fn peak_power_dbm(fft: &mut FftHelper, iq: &[Complex64]) -> f64 {
        let n = fft.size() as f64;
        let peak = fft
            .forward(iq)
            .iter()
            .map(|bin| bin.norm_sqr())
            .fold(0.0, f64::max);
        Self::power_db(peak / (n * n))
    }

    /// Spectrum SNR: peak bin against the median of the quieter half of the
    /// bins. A capture with no measurable floor (synthetic, noise-free data)
    /// reports 100 dB.
    pub fn estimate_snr_db(fft: &mut FftHelper, iq: &[Complex64]) -> f64 {
        let mut powers: Vec<f64> = fft.forward(iq).iter().map(|bin| bin.norm_sqr()).collect();
        let peak = powers.iter().copied().fold(0.0, f64::max);
        powers.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let noise = powers[powers.len() / 4];
        if noise <= 1e-30 {
            return 100.0;
        }
        10.0 * (peak / noise).log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(n: usize, cycles: f64, amplitude: f64) -> Vec<Complex64> {
        (0..n)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * cycles * i as f64 / n as f64;
                Complex64::from_polar(amplitude, phase)
            })
            .collect()
    }

    #[test]
    fn unit_tone_reports_zero_db() {
        let mut fft = FftHelper::new(256);
        let dbm = SpectralStats::peak_power_dbm(&mut fft, &tone(256, 8.0, 1.0));
        assert!(dbm.abs() < 0.5, "got {dbm}");
    }

    #[test]
    fn quarter_amplitude_tone_is_12_db_down() {
        let mut fft = FftHelper::new(256);
        let dbm = SpectralStats::peak_power_dbm(&mut fft, &tone(256, 8.0, 0.25));
        assert!((dbm + 12.0).abs() < 0.5, "got {dbm}");
    }

    #[test]
    fn clean_tone_snr_is_pegged_high() {
        let mut fft = FftHelper::new(128);
        let snr = SpectralStats::estimate_snr_db(&mut fft, &tone(128, 4.0, 1.0));
        assert!(snr >= 100.0);
    }
}
