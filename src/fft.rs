//! FFT wrapper for 2D transforms using rustfft
//!
//! Provides 2D FFT/IFFT operations compatible with NumPy's FFT conventions,
//! plus centered unitary variants (fftc/ifftc) used by the measurement
//! operators. Uses Fortran (column-major) order indexing: index = i + j*nx.

use num_complex::Complex64;
use rustfft::{FftDirection, FftPlanner};

use crate::utils::idx2d;

/// 2D FFT (in-place, complex-to-complex)
///
/// Transforms data in Fortran order with shape (nx, ny).
/// Matches numpy.fft.fft2 behavior (no normalization).
pub fn fft2d(data: &mut [Complex64], nx: usize, ny: usize) {
    let mut planner = FftPlanner::new();

    // Transform along x-axis (innermost in Fortran order, stride 1)
    let fft_x = planner.plan_fft(nx, FftDirection::Forward);
    let mut scratch_x = vec![Complex64::new(0.0, 0.0); fft_x.get_inplace_scratch_len()];
    for j in 0..ny {
        let start = idx2d(0, j, nx);
        fft_x.process_with_scratch(&mut data[start..start + nx], &mut scratch_x);
    }

    // Transform along y-axis (stride nx)
    let fft_y = planner.plan_fft(ny, FftDirection::Forward);
    let mut scratch_y = vec![Complex64::new(0.0, 0.0); fft_y.get_inplace_scratch_len()];
    let mut buffer_y = vec![Complex64::new(0.0, 0.0); ny];
    for i in 0..nx {
        // Gather data along y
        for j in 0..ny {
            buffer_y[j] = data[idx2d(i, j, nx)];
        }
        fft_y.process_with_scratch(&mut buffer_y, &mut scratch_y);
        // Scatter back
        for j in 0..ny {
            data[idx2d(i, j, nx)] = buffer_y[j];
        }
    }
}

/// 2D IFFT (in-place, complex-to-complex)
///
/// Transforms data in Fortran order with shape (nx, ny).
/// Matches numpy.fft.ifft2 behavior (includes 1/N normalization).
pub fn ifft2d(data: &mut [Complex64], nx: usize, ny: usize) {
    let mut planner = FftPlanner::new();
    let n_total = (nx * ny) as f64;

    // Transform along x-axis (innermost in Fortran order, stride 1)
    let ifft_x = planner.plan_fft(nx, FftDirection::Inverse);
    let mut scratch_x = vec![Complex64::new(0.0, 0.0); ifft_x.get_inplace_scratch_len()];
    for j in 0..ny {
        let start = idx2d(0, j, nx);
        ifft_x.process_with_scratch(&mut data[start..start + nx], &mut scratch_x);
    }

    // Transform along y-axis (stride nx)
    let ifft_y = planner.plan_fft(ny, FftDirection::Inverse);
    let mut scratch_y = vec![Complex64::new(0.0, 0.0); ifft_y.get_inplace_scratch_len()];
    let mut buffer_y = vec![Complex64::new(0.0, 0.0); ny];
    for i in 0..nx {
        for j in 0..ny {
            buffer_y[j] = data[idx2d(i, j, nx)];
        }
        ifft_y.process_with_scratch(&mut buffer_y, &mut scratch_y);
        for j in 0..ny {
            data[idx2d(i, j, nx)] = buffer_y[j];
        }
    }

    // Normalize by 1/N (numpy convention)
    for val in data.iter_mut() {
        *val /= n_total;
    }
}

/// 2D FFT shift: swap quadrants so zero-frequency is at center
///
/// Returns a new array with the zero-frequency component shifted to the
/// center. Matches numpy.fft.fftshift behavior for 2D data in Fortran order.
pub fn fftshift2d(data: &[Complex64], nx: usize, ny: usize) -> Vec<Complex64> {
    let mut out = vec![Complex64::new(0.0, 0.0); nx * ny];

    let hx = nx / 2;
    let hy = ny / 2;

    for j in 0..ny {
        for i in 0..nx {
            let si = (i + hx) % nx;
            let sj = (j + hy) % ny;
            out[idx2d(si, sj, nx)] = data[idx2d(i, j, nx)];
        }
    }

    out
}

/// 2D inverse FFT shift: undo fftshift
///
/// Matches numpy.fft.ifftshift behavior for 2D data in Fortran order.
pub fn ifftshift2d(data: &[Complex64], nx: usize, ny: usize) -> Vec<Complex64> {
    let mut out = vec![Complex64::new(0.0, 0.0); nx * ny];

    let hx = (nx + 1) / 2;
    let hy = (ny + 1) / 2;

    for j in 0..ny {
        for i in 0..nx {
            let si = (i + hx) % nx;
            let sj = (j + hy) % ny;
            out[idx2d(si, sj, nx)] = data[idx2d(i, j, nx)];
        }
    }

    out
}

/// Centered unitary 2D FFT: fftshift(fft(ifftshift(x))) / sqrt(N)
///
/// The unitary scaling makes the exact adjoint equal to [`ifftc2d`],
/// which the solvers rely on for gradient correctness.
pub fn fftc2d(data: &[Complex64], nx: usize, ny: usize) -> Vec<Complex64> {
    let scale = 1.0 / ((nx * ny) as f64).sqrt();
    let mut tmp = ifftshift2d(data, nx, ny);
    fft2d(&mut tmp, nx, ny);
    let mut out = fftshift2d(&tmp, nx, ny);
    for v in out.iter_mut() {
        *v *= scale;
    }
    out
}

/// Centered unitary 2D IFFT: exact inverse and adjoint of [`fftc2d`]
pub fn ifftc2d(data: &[Complex64], nx: usize, ny: usize) -> Vec<Complex64> {
    let scale = ((nx * ny) as f64).sqrt();
    let mut tmp = ifftshift2d(data, nx, ny);
    ifft2d(&mut tmp, nx, ny);
    let mut out = fftshift2d(&tmp, nx, ny);
    for v in out.iter_mut() {
        *v *= scale;
    }
    out
}
