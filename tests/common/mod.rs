//! Common test utilities for pics-core integration tests

use num_complex::Complex64;

/// Magnitude image of a complex array
pub fn magnitude(a: &[Complex64]) -> Vec<f64> {
    a.iter().map(|v| v.norm()).collect()
}

/// Root-mean-square error between two real arrays
pub fn rmse(a: &[f64], b: &[f64]) -> f64 {
    let mut sum_sq = 0.0;
    for i in 0..a.len() {
        let diff = a[i] - b[i];
        sum_sq += diff * diff;
    }
    (sum_sq / a.len() as f64).sqrt()
}

/// NRMSE normalized by the RMS of the reference
pub fn nrmse(a: &[f64], reference: &[f64]) -> f64 {
    let rmse_val = rmse(a, reference);
    let ref_rms =
        (reference.iter().map(|&v| v * v).sum::<f64>() / reference.len() as f64).sqrt();
    if ref_rms == 0.0 {
        return 0.0;
    }
    rmse_val / ref_rms
}

/// Iterations needed to bring the objective at or below `threshold`;
/// the sequence length if it never does.
pub fn iters_to_threshold(objectives: &[f64], threshold: f64) -> usize {
    for (i, &obj) in objectives.iter().enumerate() {
        if obj <= threshold {
            return i + 1;
        }
    }
    objectives.len()
}
