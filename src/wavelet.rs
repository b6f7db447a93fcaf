//! Orthogonal 2D discrete wavelet transform
//!
//! Periodized multi-level DWT over complex images, used as the sparsifying
//! transform of the regularized reconstruction. The filter banks are
//! orthonormal (QMF-derived high-pass), so the transform preserves the
//! 2-norm exactly and its adjoint equals its inverse, which the proximal
//! steps of the solvers rely on.

use num_complex::Complex64;

use crate::error::{PicsError, Result};
use crate::utils::idx2d;

/// Wavelet family selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveletKind {
    /// Haar wavelet (db1). Taps: [1/√2, 1/√2].
    Haar,
    /// Daubechies 4-tap wavelet. Good default for smooth images.
    Daub4,
}

impl WaveletKind {
    /// Orthonormal low-pass decomposition filter.
    fn lowpass(self) -> Vec<f64> {
        match self {
            WaveletKind::Haar => {
                let v = std::f64::consts::FRAC_1_SQRT_2;
                vec![v, v]
            }
            WaveletKind::Daub4 => {
                let s3 = 3.0_f64.sqrt();
                let norm = 4.0 * 2.0_f64.sqrt();
                vec![
                    (1.0 + s3) / norm,
                    (3.0 + s3) / norm,
                    (3.0 - s3) / norm,
                    (1.0 - s3) / norm,
                ]
            }
        }
    }
}

/// Multi-level periodized 2D wavelet transform over an (nx, ny) grid.
///
/// Coefficients are stored in the standard Mallat layout: each level
/// leaves its approximation band in the low-index corner of the array,
/// which the next level decomposes in place.
pub struct WaveletOp {
    nx: usize,
    ny: usize,
    levels: usize,
    lo: Vec<f64>,
    hi: Vec<f64>,
}

impl WaveletOp {
    /// Create a transform with the requested decomposition depth.
    ///
    /// The depth is capped to the number of times both extents halve
    /// cleanly while staying at least one filter length wide. Fails with
    /// `Shape` if no decomposition level is possible (odd extents).
    pub fn new(nx: usize, ny: usize, kind: WaveletKind, levels: usize) -> Result<Self> {
        let lo = kind.lowpass();
        let flen = lo.len();
        // QMF relation: hi[k] = (-1)^k * lo[flen-1-k]
        let hi: Vec<f64> = (0..flen)
            .map(|k| {
                let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                sign * lo[flen - 1 - k]
            })
            .collect();

        let feasible = Self::max_levels(nx, ny, flen);
        if levels > 0 && feasible == 0 {
            return Err(PicsError::Shape(format!(
                "image extents ({}, {}) admit no wavelet level with a {}-tap filter",
                nx, ny, flen
            )));
        }

        Ok(Self {
            nx,
            ny,
            levels: levels.min(feasible),
            lo,
            hi,
        })
    }

    /// Number of decomposition levels actually used.
    pub fn levels(&self) -> usize {
        self.levels
    }

    fn max_levels(nx: usize, ny: usize, flen: usize) -> usize {
        let mut lx = nx;
        let mut ly = ny;
        let mut levels = 0;
        while lx % 2 == 0 && ly % 2 == 0 && lx >= flen && ly >= flen && lx >= 2 && ly >= 2 {
            lx /= 2;
            ly /= 2;
            levels += 1;
        }
        levels
    }

    fn check_len(&self, data: &[Complex64]) -> Result<()> {
        if data.len() != self.nx * self.ny {
            return Err(PicsError::Shape(format!(
                "wavelet operand has {} elements, domain is {}x{}",
                data.len(),
                self.nx,
                self.ny
            )));
        }
        Ok(())
    }

    /// Forward transform: image -> coefficient array of the same length.
    pub fn forward(&self, img: &[Complex64]) -> Result<Vec<Complex64>> {
        self.check_len(img)?;
        let mut out = img.to_vec();
        let mut lx = self.nx;
        let mut ly = self.ny;
        for _ in 0..self.levels {
            self.dwt_rows(&mut out, lx, ly);
            self.dwt_cols(&mut out, lx, ly);
            lx /= 2;
            ly /= 2;
        }
        Ok(out)
    }

    /// Inverse transform: coefficients -> image. Exact adjoint of
    /// [`WaveletOp::forward`] since the filter bank is orthonormal.
    pub fn inverse(&self, coeffs: &[Complex64]) -> Result<Vec<Complex64>> {
        self.check_len(coeffs)?;
        let mut out = coeffs.to_vec();
        // Reconstruct coarsest level first
        let mut extents = Vec::with_capacity(self.levels);
        let mut lx = self.nx;
        let mut ly = self.ny;
        for _ in 0..self.levels {
            extents.push((lx, ly));
            lx /= 2;
            ly /= 2;
        }
        for &(lx, ly) in extents.iter().rev() {
            self.idwt_cols(&mut out, lx, ly);
            self.idwt_rows(&mut out, lx, ly);
        }
        Ok(out)
    }

    /// One analysis step along a line of length n (periodic boundary):
    /// a[k] = sum_m lo[m] x[(2k+m) mod n], d[k] = sum_m hi[m] x[(2k+m) mod n]
    fn dwt_line(&self, line: &[Complex64], out: &mut [Complex64]) {
        let n = line.len();
        let half = n / 2;
        for k in 0..half {
            let mut a = Complex64::new(0.0, 0.0);
            let mut d = Complex64::new(0.0, 0.0);
            for (m, (&l, &h)) in self.lo.iter().zip(self.hi.iter()).enumerate() {
                let x = line[(2 * k + m) % n];
                a += x * l;
                d += x * h;
            }
            out[k] = a;
            out[half + k] = d;
        }
    }

    /// One synthesis step along a line, the exact transpose of [`dwt_line`]:
    /// x[(2k+m) mod n] += lo[m] a[k] + hi[m] d[k]
    fn idwt_line(&self, coeffs: &[Complex64], out: &mut [Complex64]) {
        let n = coeffs.len();
        let half = n / 2;
        for v in out.iter_mut() {
            *v = Complex64::new(0.0, 0.0);
        }
        for k in 0..half {
            let a = coeffs[k];
            let d = coeffs[half + k];
            for (m, (&l, &h)) in self.lo.iter().zip(self.hi.iter()).enumerate() {
                out[(2 * k + m) % n] += a * l + d * h;
            }
        }
    }

    fn dwt_rows(&self, data: &mut [Complex64], lx: usize, ly: usize) {
        let mut line = vec![Complex64::new(0.0, 0.0); lx];
        let mut coeffs = vec![Complex64::new(0.0, 0.0); lx];
        for j in 0..ly {
            for i in 0..lx {
                line[i] = data[idx2d(i, j, self.nx)];
            }
            self.dwt_line(&line, &mut coeffs);
            for i in 0..lx {
                data[idx2d(i, j, self.nx)] = coeffs[i];
            }
        }
    }

    fn dwt_cols(&self, data: &mut [Complex64], lx: usize, ly: usize) {
        let mut line = vec![Complex64::new(0.0, 0.0); ly];
        let mut coeffs = vec![Complex64::new(0.0, 0.0); ly];
        for i in 0..lx {
            for j in 0..ly {
                line[j] = data[idx2d(i, j, self.nx)];
            }
            self.dwt_line(&line, &mut coeffs);
            for j in 0..ly {
                data[idx2d(i, j, self.nx)] = coeffs[j];
            }
        }
    }

    fn idwt_rows(&self, data: &mut [Complex64], lx: usize, ly: usize) {
        let mut coeffs = vec![Complex64::new(0.0, 0.0); lx];
        let mut line = vec![Complex64::new(0.0, 0.0); lx];
        for j in 0..ly {
            for i in 0..lx {
                coeffs[i] = data[idx2d(i, j, self.nx)];
            }
            self.idwt_line(&coeffs, &mut line);
            for i in 0..lx {
                data[idx2d(i, j, self.nx)] = line[i];
            }
        }
    }

    fn idwt_cols(&self, data: &mut [Complex64], lx: usize, ly: usize) {
        let mut coeffs = vec![Complex64::new(0.0, 0.0); ly];
        let mut line = vec![Complex64::new(0.0, 0.0); ly];
        for i in 0..lx {
            for j in 0..ly {
                coeffs[j] = data[idx2d(i, j, self.nx)];
            }
            self.idwt_line(&coeffs, &mut line);
            for j in 0..ly {
                data[idx2d(i, j, self.nx)] = line[j];
            }
        }
    }
}
