//! Non-uniform Fourier transform by Kaiser-Bessel gridding
//!
//! Evaluates the Fourier transform of a Cartesian image at arbitrary
//! k-space coordinates: de-apodize, zero-pad onto a 2x oversampled grid,
//! centered FFT, then kernel interpolation at the scaled trajectory. The
//! adjoint runs the exact transpose (conjugate accumulation onto the grid,
//! inverse FFT, crop, de-apodize): interpolation weights are precomputed
//! once at plan time and shared by both directions, so the adjoint law
//! holds to machine precision even though forward-then-adjoint is not the
//! identity.
//!
//! Reference:
//! Beatty, P. J., Nishimura, D. G., Pauly, J. M. (2005). "Rapid gridding
//! reconstruction with a minimal oversampling ratio."
//! IEEE Transactions on Medical Imaging, 24(6):799-808.

use num_complex::Complex64;

use crate::error::{PicsError, Result};
use crate::fft::{fftc2d, ifftc2d};
use crate::utils::{crop2d_center, idx2d, zpad2d_center};

/// Oversampling ratio of the gridding grid.
const OVERSAMP: f64 = 2.0;
/// Kernel width in oversampled grid units.
const WIDTH: usize = 4;

/// Modified Bessel function of the first kind, order zero.
///
/// Power-series evaluation, accurate over the argument range the
/// Kaiser-Bessel kernel produces (0 <= x <= beta ~ 9).
fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut sum = 1.0;
    let mut term = 1.0;
    for k in 1..=64 {
        let f = half / k as f64;
        term *= f * f;
        sum += term;
        if term < 1e-16 * sum {
            break;
        }
    }
    sum
}

/// Kaiser-Bessel interpolation kernel at distance `d` from a sample,
/// full width `w`, shape parameter `beta`.
fn kb_kernel(d: f64, w: f64, beta: f64) -> f64 {
    let x = 2.0 * d / w;
    let arg = 1.0 - x * x;
    if arg < 0.0 {
        return 0.0;
    }
    bessel_i0(beta * arg.sqrt()) / w
}

/// Precomputed gridding plan for one trajectory over an (nx, ny) image.
///
/// The trajectory is interleaved (kx, ky) pairs in grid units spanning
/// [-n/2, n/2) per axis; coordinates outside that range wrap periodically.
pub struct Nufft {
    nx: usize,
    ny: usize,
    osx: usize,
    osy: usize,
    nsamp: usize,
    /// Wrapped oversampled-grid indices, nsamp * WIDTH per axis.
    idx_x: Vec<usize>,
    idx_y: Vec<usize>,
    /// Kernel weights matching idx_x / idx_y.
    wts_x: Vec<f64>,
    wts_y: Vec<f64>,
    /// Per-axis de-apodization (reciprocal kernel transform), image domain.
    apod_x: Vec<f64>,
    apod_y: Vec<f64>,
}

impl Nufft {
    /// Plan a transform for the given image extents and trajectory.
    ///
    /// Fails with `Config` if the trajectory length is not an even number
    /// of interleaved (kx, ky) values.
    pub fn new(nx: usize, ny: usize, coord: &[f64]) -> Result<Self> {
        if coord.len() % 2 != 0 {
            return Err(PicsError::Config(format!(
                "trajectory length {} is not interleaved (kx, ky) pairs",
                coord.len()
            )));
        }
        let nsamp = coord.len() / 2;
        let osx = (OVERSAMP * nx as f64).ceil() as usize;
        let osy = (OVERSAMP * ny as f64).ceil() as usize;
        let w = WIDTH as f64;
        // Beatty's minimal-aliasing shape parameter
        let beta = std::f64::consts::PI
            * (((w / OVERSAMP) * (OVERSAMP - 0.5)).powi(2) - 0.8).sqrt();

        let mut idx_x = vec![0usize; nsamp * WIDTH];
        let mut idx_y = vec![0usize; nsamp * WIDTH];
        let mut wts_x = vec![0.0; nsamp * WIDTH];
        let mut wts_y = vec![0.0; nsamp * WIDTH];

        for s in 0..nsamp {
            let kx = coord[2 * s];
            let ky = coord[2 * s + 1];
            // Scale to the oversampled grid, center at osn/2
            let gx = kx * osx as f64 / nx as f64 + osx as f64 / 2.0;
            let gy = ky * osy as f64 / ny as f64 + osy as f64 / 2.0;

            let bx = gx.floor() as i64 - (WIDTH as i64 / 2 - 1);
            let by = gy.floor() as i64 - (WIDTH as i64 / 2 - 1);
            for m in 0..WIDTH {
                let ix = bx + m as i64;
                let iy = by + m as i64;
                idx_x[s * WIDTH + m] = ix.rem_euclid(osx as i64) as usize;
                idx_y[s * WIDTH + m] = iy.rem_euclid(osy as i64) as usize;
                wts_x[s * WIDTH + m] = kb_kernel(gx - ix as f64, w, beta);
                wts_y[s * WIDTH + m] = kb_kernel(gy - iy as f64, w, beta);
            }
        }

        let apod_x = Self::apodization(nx, osx, w, beta);
        let apod_y = Self::apodization(ny, osy, w, beta);

        Ok(Self {
            nx, ny, osx, osy, nsamp,
            idx_x, idx_y, wts_x, wts_y,
            apod_x, apod_y,
        })
    }

    /// Number of trajectory samples.
    pub fn nsamp(&self) -> usize {
        self.nsamp
    }

    /// Image extent along x.
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Image extent along y.
    pub fn ny(&self) -> usize {
        self.ny
    }

    /// Reciprocal of the kernel's Fourier transform along one axis:
    /// t / sinh(t) with t = sqrt(beta^2 - (pi * w * x / os_n)^2), x the
    /// signed distance from the image center.
    fn apodization(n: usize, os_n: usize, w: f64, beta: f64) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let x = i as f64 - (n / 2) as f64;
                let arg = beta * beta - (std::f64::consts::PI * w * x / os_n as f64).powi(2);
                let t = arg.max(0.0).sqrt();
                if t < 1e-12 {
                    1.0
                } else {
                    t / t.sinh()
                }
            })
            .collect()
    }

    fn apodize(&self, img: &[Complex64]) -> Vec<Complex64> {
        let mut out = img.to_vec();
        for j in 0..self.ny {
            for i in 0..self.nx {
                out[idx2d(i, j, self.nx)] *= self.apod_x[i] * self.apod_y[j];
            }
        }
        out
    }

    /// Forward transform: image (nx * ny) -> k-space samples (nsamp).
    pub fn forward(&self, img: &[Complex64]) -> Result<Vec<Complex64>> {
        if img.len() != self.nx * self.ny {
            return Err(PicsError::Shape(format!(
                "nufft forward operand has {} elements, domain is {}x{}",
                img.len(), self.nx, self.ny
            )));
        }

        let apodized = self.apodize(img);
        let padded = zpad2d_center(&apodized, 1, self.nx, self.ny, self.osx, self.osy)?;
        let grid = fftc2d(&padded, self.osx, self.osy);

        // Rescale so the evaluation approximately matches the unitary
        // Cartesian centered transform (os^{ndim/2} for the grid change).
        let scale = OVERSAMP;
        let mut out = vec![Complex64::new(0.0, 0.0); self.nsamp];
        for s in 0..self.nsamp {
            let mut acc = Complex64::new(0.0, 0.0);
            for my in 0..WIDTH {
                let wy = self.wts_y[s * WIDTH + my];
                let row = self.idx_y[s * WIDTH + my] * self.osx;
                for mx in 0..WIDTH {
                    let wx = self.wts_x[s * WIDTH + mx];
                    acc += grid[self.idx_x[s * WIDTH + mx] + row] * (wx * wy);
                }
            }
            out[s] = acc * scale;
        }
        Ok(out)
    }

    /// Adjoint transform: k-space samples (nsamp) -> image (nx * ny).
    /// Exact transpose of [`Nufft::forward`].
    pub fn adjoint(&self, data: &[Complex64]) -> Result<Vec<Complex64>> {
        if data.len() != self.nsamp {
            return Err(PicsError::Shape(format!(
                "nufft adjoint operand has {} elements, trajectory has {}",
                data.len(), self.nsamp
            )));
        }

        let mut grid = vec![Complex64::new(0.0, 0.0); self.osx * self.osy];
        for s in 0..self.nsamp {
            let v = data[s];
            for my in 0..WIDTH {
                let wy = self.wts_y[s * WIDTH + my];
                let row = self.idx_y[s * WIDTH + my] * self.osx;
                for mx in 0..WIDTH {
                    let wx = self.wts_x[s * WIDTH + mx];
                    grid[self.idx_x[s * WIDTH + mx] + row] += v * (wx * wy);
                }
            }
        }

        let img_os = ifftc2d(&grid, self.osx, self.osy);
        let cropped = crop2d_center(&img_os, 1, self.osx, self.osy, self.nx, self.ny)?;
        let mut out = self.apodize(&cropped);
        for v in out.iter_mut() {
            *v *= OVERSAMP;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::cdot;

    fn radial_coord(nx: usize, nspokes: usize, nread: usize) -> Vec<f64> {
        let mut coord = Vec::with_capacity(2 * nspokes * nread);
        for s in 0..nspokes {
            let theta = std::f64::consts::PI * s as f64 / nspokes as f64;
            for r in 0..nread {
                let k = (r as f64 - nread as f64 / 2.0) * nx as f64 / nread as f64 / 2.0;
                coord.push(k * theta.cos());
                coord.push(k * theta.sin());
            }
        }
        coord
    }

    fn test_image(nx: usize, ny: usize) -> Vec<Complex64> {
        (0..nx * ny)
            .map(|i| {
                Complex64::new(
                    (i as f64 * 0.19).sin() * 0.5 + 0.2,
                    (i as f64 * 0.37).cos() * 0.3,
                )
            })
            .collect()
    }

    #[test]
    fn test_bessel_i0_known_values() {
        assert!((bessel_i0(0.0) - 1.0).abs() < 1e-14);
        // I0(1) = 1.2660658...
        assert!((bessel_i0(1.0) - 1.2660658777520084).abs() < 1e-12);
        // I0(5) = 27.2398718...
        assert!((bessel_i0(5.0) - 27.239871823604442).abs() < 1e-9);
    }

    #[test]
    fn test_adjoint_law() {
        let nx = 16;
        let ny = 16;
        let coord = radial_coord(nx, 8, 16);
        let plan = Nufft::new(nx, ny, &coord).unwrap();

        let u = test_image(nx, ny);
        let v: Vec<Complex64> = (0..plan.nsamp())
            .map(|i| Complex64::new((i as f64 * 0.11).cos(), (i as f64 * 0.57).sin()))
            .collect();

        let lhs = cdot(&plan.forward(&u).unwrap(), &v);
        let rhs = cdot(&u, &plan.adjoint(&v).unwrap());
        assert!(
            (lhs - rhs).norm() < 1e-10 * (1.0 + lhs.norm()),
            "nufft adjoint law violated: {} vs {}",
            lhs, rhs
        );
    }

    #[test]
    fn test_forward_matches_direct_dft() {
        // The gridded evaluation should agree with the direct non-uniform
        // DFT up to a single global scale factor.
        let nx = 16;
        let ny = 16;
        let coord = radial_coord(nx, 4, 16);
        let plan = Nufft::new(nx, ny, &coord).unwrap();
        let img = test_image(nx, ny);

        let approx = plan.forward(&img).unwrap();

        let nsamp = coord.len() / 2;
        let mut direct = vec![Complex64::new(0.0, 0.0); nsamp];
        for s in 0..nsamp {
            let kx = coord[2 * s];
            let ky = coord[2 * s + 1];
            let mut acc = Complex64::new(0.0, 0.0);
            for j in 0..ny {
                for i in 0..nx {
                    let phase = -2.0 * std::f64::consts::PI
                        * (kx * (i as f64 - (nx / 2) as f64) / nx as f64
                            + ky * (j as f64 - (ny / 2) as f64) / ny as f64);
                    acc += img[idx2d(i, j, nx)] * Complex64::new(0.0, phase).exp();
                }
            }
            direct[s] = acc;
        }

        // Least-squares global scale between the two evaluations
        let num = cdot(&approx, &direct);
        let den: f64 = approx.iter().map(|c| c.norm_sqr()).sum();
        let alpha = num / den;

        let mut err = 0.0;
        let mut ref_norm = 0.0;
        for s in 0..nsamp {
            err += (direct[s] - approx[s] * alpha).norm_sqr();
            ref_norm += direct[s].norm_sqr();
        }
        let rel = (err / ref_norm).sqrt();
        assert!(rel < 1e-2, "gridding error too large: {}", rel);
    }

    #[test]
    fn test_odd_coord_length_fails() {
        let err = Nufft::new(8, 8, &[0.0, 1.0, 2.0]);
        assert!(matches!(err, Err(PicsError::Config(_))));
    }

    #[test]
    fn test_shape_mismatch_fails() {
        let coord = radial_coord(8, 2, 8);
        let plan = Nufft::new(8, 8, &coord).unwrap();
        let bad = vec![Complex64::new(0.0, 0.0); 7];
        assert!(matches!(plan.forward(&bad), Err(PicsError::Shape(_))));
        assert!(matches!(plan.adjoint(&bad[..3]), Err(PicsError::Shape(_))));
    }

    #[test]
    fn test_deterministic() {
        let nx = 8;
        let ny = 8;
        let coord = radial_coord(nx, 4, 8);
        let plan = Nufft::new(nx, ny, &coord).unwrap();
        let img = test_image(nx, ny);

        let a = plan.forward(&img).unwrap();
        let b = plan.forward(&img).unwrap();
        assert_eq!(a, b, "repeated evaluations must be bit-identical");
    }
}
