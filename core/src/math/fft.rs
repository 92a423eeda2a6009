use num_complex::Complex64;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;

/// Helper that wraps the `rustfft` planner for reuse.
///
/// Keeps one forward and one inverse plan of a fixed size plus a shared
/// scratch buffer, so hot loops do not re-plan or re-allocate.
pub struct FftHelper {
    fwd: Arc<dyn Fft<f64>>,
    inv: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
    size: usize,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fwd = planner.plan_fft_forward(size);
        let inv = planner.plan_fft_inverse(size);
        let scratch_len = fwd
            .get_inplace_scratch_len()
            .max(inv.get_inplace_scratch_len());
        let scratch = vec![Complex64::zero(); scratch_len];
        Self {
            fwd,
            inv,
            scratch,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Forward transform. Short input is zero-padded to the plan size, long
    /// input is truncated.
    pub fn forward(&mut self, input: &[Complex64]) -> Vec<Complex64> {
        let mut buffer = vec![Complex64::zero(); self.size];
        let n = input.len().min(self.size);
        buffer[..n].copy_from_slice(&input[..n]);
        self.fwd.process_with_scratch(&mut buffer, &mut self.scratch);
        buffer
    }

    /// Inverse transform with 1/N normalization, so
    /// `inverse(forward(x)) == x`.
    pub fn inverse(&mut self, input: &[Complex64]) -> Vec<Complex64> {
        let mut buffer = vec![Complex64::zero(); self.size];
        let n = input.len().min(self.size);
        buffer[..n].copy_from_slice(&input[..n]);
        self.inv.process_with_scratch(&mut buffer, &mut self.scratch);
        let scale = 1.0 / self.size as f64;
        for value in &mut buffer {
            *value *= scale;
        }
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_returns_plan_length() {
        let mut helper = FftHelper::new(8);
        let output = helper.forward(&[Complex64::new(1.0, 0.0); 4]);
        assert_eq!(output.len(), 8);
    }

    #[test]
    fn inverse_undoes_forward() {
        let mut helper = FftHelper::new(4);
        let input = vec![
            Complex64::new(1.0, 0.5),
            Complex64::new(-0.5, 0.0),
            Complex64::new(0.25, -1.0),
            Complex64::new(0.0, 0.0),
        ];
        let spectrum = helper.forward(&input);
        let restored = helper.inverse(&spectrum);
        for (a, b) in input.iter().zip(restored.iter()) {
            assert!((a - b).norm() < 1e-12);
        }
    }
}
