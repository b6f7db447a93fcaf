//! Synthetic data for demos and tests
//!
//! Closed-form, deterministic evaluations: a Shepp-Logan ellipse phantom
//! and birdcage coil sensitivity profiles. Both return plain coil-major
//! complex arrays matching the conventions of the rest of the crate.

use num_complex::Complex64;

use crate::utils::{idx2d, rss};

/// Modified Shepp-Logan ellipse table: (intensity, a, b, x0, y0, phi_deg).
const ELLIPSES: [(f64, f64, f64, f64, f64, f64); 10] = [
    (1.0, 0.69, 0.92, 0.0, 0.0, 0.0),
    (-0.8, 0.6624, 0.8740, 0.0, -0.0184, 0.0),
    (-0.2, 0.1100, 0.3100, 0.22, 0.0, -18.0),
    (-0.2, 0.1600, 0.4100, -0.22, 0.0, 18.0),
    (0.1, 0.2100, 0.2500, 0.0, 0.35, 0.0),
    (0.1, 0.0460, 0.0460, 0.0, 0.1, 0.0),
    (0.1, 0.0460, 0.0460, 0.0, -0.1, 0.0),
    (0.1, 0.0460, 0.0230, -0.08, -0.605, 0.0),
    (0.1, 0.0230, 0.0230, 0.0, -0.606, 0.0),
    (0.1, 0.0230, 0.0460, 0.06, -0.605, 0.0),
];

/// Shepp-Logan phantom over an (nx, ny) grid, unit peak intensity.
pub fn shepp_logan(nx: usize, ny: usize) -> Vec<Complex64> {
    let mut img = vec![Complex64::new(0.0, 0.0); nx * ny];
    for j in 0..ny {
        for i in 0..nx {
            let x = 2.0 * (i as f64 + 0.5) / nx as f64 - 1.0;
            let y = 2.0 * (j as f64 + 0.5) / ny as f64 - 1.0;
            let mut val = 0.0;
            for &(inten, a, b, x0, y0, phi_deg) in ELLIPSES.iter() {
                let phi = phi_deg.to_radians();
                let dx = x - x0;
                let dy = y - y0;
                let xr = dx * phi.cos() + dy * phi.sin();
                let yr = -dx * phi.sin() + dy * phi.cos();
                if (xr / a).powi(2) + (yr / b).powi(2) <= 1.0 {
                    val += inten;
                }
            }
            img[idx2d(i, j, nx)] = Complex64::new(val, 0.0);
        }
    }
    img
}

/// Birdcage coil sensitivity maps: inverse-distance magnitude from coil
/// centers placed on a circle of radius `r`, rotating receive phase,
/// normalized to unit root-sum-of-squares at every position.
pub fn birdcage_maps(ncoils: usize, nx: usize, ny: usize, r: f64) -> Vec<Complex64> {
    let n = nx * ny;
    let mut mps = vec![Complex64::new(0.0, 0.0); ncoils * n];
    for c in 0..ncoils {
        let angle = 2.0 * std::f64::consts::PI * c as f64 / ncoils as f64;
        let coil_x = r * angle.cos();
        let coil_y = r * angle.sin();
        for j in 0..ny {
            for i in 0..nx {
                let x = (i as f64 - nx as f64 / 2.0) / (nx as f64 / 2.0) - coil_x;
                let y = (j as f64 - ny as f64 / 2.0) / (ny as f64 / 2.0) - coil_y;
                let rr = (x * x + y * y).sqrt().max(1e-6);
                let phi = x.atan2(-y) - angle;
                mps[c * n + idx2d(i, j, nx)] = Complex64::from_polar(1.0 / rr, phi);
            }
        }
    }
    // Unit RSS combination everywhere
    let combined = rss(&mps, ncoils);
    for c in 0..ncoils {
        for p in 0..n {
            mps[c * n + p] /= combined[p];
        }
    }
    mps
}
