//! Array helpers shared across the crate
//!
//! Flat complex arrays in Fortran (column-major) order with explicit
//! dimensions: index = i + j*nx, coil-major outer axis where applicable.

use num_complex::Complex64;

use crate::error::{PicsError, Result};

/// Index into a 2D array stored in Fortran order (column-major)
/// index = i + j*nx
#[inline(always)]
pub fn idx2d(i: usize, j: usize, nx: usize) -> usize {
    i + j * nx
}

/// Complex inner product ⟨a, b⟩ = Σ conj(a_i) * b_i
pub fn cdot(a: &[Complex64], b: &[Complex64]) -> Complex64 {
    a.iter().zip(b.iter()).map(|(&ai, &bi)| ai.conj() * bi).sum()
}

/// Euclidean norm of a complex vector
pub fn norm2(a: &[Complex64]) -> f64 {
    a.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt()
}

/// L1 norm of a complex vector (sum of magnitudes)
pub fn norm1(a: &[Complex64]) -> f64 {
    a.iter().map(|c| c.norm()).sum()
}

/// Root-sum-of-squares combination across the coil axis
///
/// # Arguments
/// * `data` - Coil-major array of length ncoils * n
/// * `ncoils` - Number of coils
///
/// # Returns
/// Per-position RSS magnitude of length n
pub fn rss(data: &[Complex64], ncoils: usize) -> Vec<f64> {
    let n = data.len() / ncoils;
    let mut out = vec![0.0; n];
    for c in 0..ncoils {
        let block = &data[c * n..(c + 1) * n];
        for (o, v) in out.iter_mut().zip(block.iter()) {
            *o += v.norm_sqr();
        }
    }
    for o in out.iter_mut() {
        *o = o.sqrt();
    }
    out
}

/// Complex soft-thresholding: shrink the magnitude by `thresh`, keep the phase
///
/// Proximal operator of thresh * ||.||_1 applied element-wise.
#[inline]
pub fn soft_thresh(v: Complex64, thresh: f64) -> Complex64 {
    let mag = v.norm();
    if mag <= thresh {
        Complex64::new(0.0, 0.0)
    } else {
        v * ((mag - thresh) / mag)
    }
}

/// Center-crop a coil-major stack of 2D planes
///
/// Extracts the central (cx, cy) window of each (nx, ny) plane, matching
/// the centering convention of the centered FFT (offset = (n - c) / 2).
///
/// # Arguments
/// * `data` - Input of length ncoils * nx * ny
/// * `ncoils`, `nx`, `ny` - Input dimensions
/// * `cx`, `cy` - Crop extents
///
/// # Returns
/// Cropped array of length ncoils * cx * cy, or a `Shape` error if the
/// crop extent exceeds the array extent in any dimension.
pub fn crop2d_center(
    data: &[Complex64],
    ncoils: usize, nx: usize, ny: usize,
    cx: usize, cy: usize,
) -> Result<Vec<Complex64>> {
    if cx > nx || cy > ny {
        return Err(PicsError::Shape(format!(
            "crop extent ({}, {}) exceeds array extent ({}, {})",
            cx, cy, nx, ny
        )));
    }
    if data.len() != ncoils * nx * ny {
        return Err(PicsError::Shape(format!(
            "expected {} elements, got {}",
            ncoils * nx * ny,
            data.len()
        )));
    }

    let ox = (nx - cx) / 2;
    let oy = (ny - cy) / 2;
    let mut out = vec![Complex64::new(0.0, 0.0); ncoils * cx * cy];
    for c in 0..ncoils {
        let src = &data[c * nx * ny..(c + 1) * nx * ny];
        let dst = &mut out[c * cx * cy..(c + 1) * cx * cy];
        for j in 0..cy {
            for i in 0..cx {
                dst[idx2d(i, j, cx)] = src[idx2d(i + ox, j + oy, nx)];
            }
        }
    }
    Ok(out)
}

/// Zero-pad a coil-major stack of 2D planes to a larger centered extent
///
/// Adjoint of [`crop2d_center`] for matching extents.
pub fn zpad2d_center(
    data: &[Complex64],
    ncoils: usize, cx: usize, cy: usize,
    nx: usize, ny: usize,
) -> Result<Vec<Complex64>> {
    if cx > nx || cy > ny {
        return Err(PicsError::Shape(format!(
            "pad target ({}, {}) smaller than input ({}, {})",
            nx, ny, cx, cy
        )));
    }
    if data.len() != ncoils * cx * cy {
        return Err(PicsError::Shape(format!(
            "expected {} elements, got {}",
            ncoils * cx * cy,
            data.len()
        )));
    }

    let ox = (nx - cx) / 2;
    let oy = (ny - cy) / 2;
    let mut out = vec![Complex64::new(0.0, 0.0); ncoils * nx * ny];
    for c in 0..ncoils {
        let src = &data[c * cx * cy..(c + 1) * cx * cy];
        let dst = &mut out[c * nx * ny..(c + 1) * nx * ny];
        for j in 0..cy {
            for i in 0..cx {
                dst[idx2d(i + ox, j + oy, nx)] = src[idx2d(i, j, cx)];
            }
        }
    }
    Ok(out)
}
