//! MUSIC bearing estimation.
//!
//! Covariance of the element captures, Hermitian eigendecomposition by QR
//! iteration, then a pseudospectrum sweep over 360 one-degree steps. Bearing
//! convention: 0 degrees is north (+y), increasing clockwise, so the wave
//! vector is `k*(sin t, cos t)`.

use ndarray::{Array1, Array2};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::df::ArrayGeometry;

pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

const QR_ITERATIONS: usize = 60;

/// One line of bearing output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bearing {
    pub frequency_hz: f64,
    pub degrees: f64,
    /// 0 for an unusable capture, approaching 1 for a sharp single peak.
    pub confidence: f64,
    pub snr_db: f64,
    pub timestamp: f64,
}

/// Raw estimator output before capture-quality gating.
#[derive(Debug, Clone)]
pub struct MusicEstimate {
    pub degrees: f64,
    pub confidence: f64,
    pub spectrum: Vec<f64>,
}

/// Sample covariance of the element channels. Channels must be equal length.
pub fn covariance(channels: &[Vec<Complex64>]) -> Array2<Complex64> {
    let m = channels.len();
    let n = channels.first().map(Vec::len).unwrap_or(0).max(1);
    let mut r = Array2::zeros((m, m));
    for i in 0..m {
        for j in 0..m {
            let mut acc = Complex64::new(0.0, 0.0);
            for (a, b) in channels[i].iter().zip(channels[j].iter()) {
                acc += a * b.conj();
            }
            r[(i, j)] = acc / n as f64;
        }
    }
    r
}

/// Eigendecomposition of a Hermitian matrix by unshifted QR iteration.
///
/// Returns eigenvalues in descending order with matching eigenvector
/// columns. Accuracy degrades for near-equal eigenvalues, which is
/// acceptable here: those captures produce a flat pseudospectrum and are
/// reported with low confidence anyway.
pub fn eigen_hermitian(
    matrix: &Array2<Complex64>,
    iterations: usize,
) -> (Vec<f64>, Array2<Complex64>) {
    let m = matrix.nrows();
    let mut a = matrix.clone();
    let mut v = Array2::eye(m);
    for _ in 0..iterations {
        let (q, r) = qr_decompose(&a);
        a = r.dot(&q);
        v = v.dot(&q);
    }
    let mut order: Vec<usize> = (0..m).collect();
    let diag: Vec<f64> = (0..m).map(|i| a[(i, i)].re).collect();
    order.sort_by(|&i, &j| diag[j].partial_cmp(&diag[i]).unwrap_or(std::cmp::Ordering::Equal));
    let eigenvalues = order.iter().map(|&i| diag[i]).collect();
    let mut vectors = Array2::zeros((m, m));
    for (column, &source) in order.iter().enumerate() {
        for row in 0..m {
            vectors[(row, column)] = v[(row, source)];
        }
    }
    (eigenvalues, vectors)
}

/// QR by modified Gram-Schmidt on columns.
fn qr_decompose(a: &Array2<Complex64>) -> (Array2<Complex64>, Array2<Complex64>) {
    let m = a.nrows();
    let mut q: Array2<Complex64> = Array2::zeros((m, m));
    let mut r: Array2<Complex64> = Array2::zeros((m, m));
    for j in 0..m {
        let mut column: Vec<Complex64> = (0..m).map(|row| a[(row, j)]).collect();
        for i in 0..j {
            let mut proj = Complex64::new(0.0, 0.0);
            for row in 0..m {
                proj += q[(row, i)].conj() * column[row];
            }
            r[(i, j)] = proj;
            for row in 0..m {
                column[row] -= proj * q[(row, i)];
            }
        }
        let norm = column.iter().map(|value| value.norm_sqr()).sum::<f64>().sqrt();
        r[(j, j)] = Complex64::new(norm, 0.0);
        if norm > 1e-30 {
            for row in 0..m {
                q[(row, j)] = column[row] / norm;
            }
        } else {
            // degenerate column, keep Q unitary with a basis vector
            q[(j, j)] = Complex64::new(1.0, 0.0);
        }
    }
    (q, r)
}

/// Unit-norm steering vector for a plane wave from bearing `theta_deg`.
pub fn steering_vector(
    theta_deg: f64,
    geometry: &ArrayGeometry,
    count: usize,
    wavelength_m: f64,
) -> Array1<Complex64> {
    let theta = theta_deg.to_radians();
    let k = 2.0 * std::f64::consts::PI / wavelength_m;
    let kx = k * theta.sin();
    let ky = k * theta.cos();
    let scale = 1.0 / (count as f64).sqrt();
    Array1::from_iter(geometry.elements.iter().take(count).map(|&[x, y]| {
        Complex64::from_polar(scale, kx * x + ky * y)
    }))
}

/// MUSIC pseudospectrum sweep over the covariance `r`.
///
/// The denominator is formed with the signal-subspace projector
/// `1 - |Es^H a|^2` rather than the noise eigenvectors, which stays stable
/// when the loaded covariance is nearly rank deficient.
pub fn music_bearing(
    r: &Array2<Complex64>,
    geometry: &ArrayGeometry,
    frequency_hz: f64,
    num_sources: usize,
) -> MusicEstimate {
    let m = r.nrows();
    let mut loaded = r.clone();
    let trace: f64 = (0..m).map(|i| r[(i, i)].re).sum();
    let epsilon = (trace / m as f64).max(1e-12) * 1e-6;
    for i in 0..m {
        loaded[(i, i)] += Complex64::new(epsilon, 0.0);
    }
    let (_, vectors) = eigen_hermitian(&loaded, QR_ITERATIONS);
    let sources = num_sources.min(m.saturating_sub(1)).max(1);

    let wavelength = SPEED_OF_LIGHT / frequency_hz;
    let mut spectrum = Vec::with_capacity(360);
    for degree in 0..360 {
        let a = steering_vector(degree as f64, geometry, m, wavelength);
        let mut projected = 0.0;
        for source in 0..sources {
            let mut dot = Complex64::new(0.0, 0.0);
            for row in 0..m {
                dot += vectors[(row, source)].conj() * a[row];
            }
            projected += dot.norm_sqr();
        }
        let denom = (1.0 - projected).max(1e-12);
        spectrum.push(1.0 / denom);
    }

    let (best, peak) = spectrum
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |acc, (index, value)| {
            if value > acc.1 {
                (index, value)
            } else {
                acc
            }
        });
    let mean = spectrum.iter().sum::<f64>() / spectrum.len() as f64;
    let confidence = if mean > 0.0 {
        ((peak / mean - 1.0) / 9.0).clamp(0.0, 1.0)
    } else {
        0.0
    };
    MusicEstimate {
        degrees: best as f64,
        confidence,
        spectrum,
    }
}
