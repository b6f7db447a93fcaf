//! Sampling-pattern generation
//!
//! Variable-density Poisson-disc masks for simulating under-sampled
//! Cartesian acquisitions: Bridson dart throwing with a minimum spacing
//! that grows linearly with distance from the k-space center, a bisection
//! on the density slope to land near the requested acceleration, and a
//! fully-sampled calibration box stamped in last. Deterministic for a
//! fixed seed.
//!
//! Reference:
//! Bridson, R. (2007). "Fast Poisson disk sampling in arbitrary
//! dimensions." SIGGRAPH sketches.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{PicsError, Result};
use crate::utils::idx2d;

/// Poisson-disc generation parameters.
#[derive(Debug, Clone, Copy)]
pub struct PoissonParams {
    /// Fully-sampled calibration box extents (cx, cy), centered.
    pub calib: (usize, usize),
    /// Zero out samples outside the inscribed ellipse.
    pub crop_corner: bool,
    /// Dart-throwing attempts per active point.
    pub max_attempts: usize,
    /// Acceptable deviation of the achieved acceleration.
    pub tol: f64,
    /// RNG seed; identical seeds reproduce identical masks.
    pub seed: u64,
}

impl Default for PoissonParams {
    fn default() -> Self {
        Self {
            calib: (0, 0),
            crop_corner: true,
            max_attempts: 30,
            tol: 0.1,
            seed: 0,
        }
    }
}

/// Generate a variable-density Poisson-disc mask.
///
/// # Arguments
/// * `nx`, `ny` - Mask extents
/// * `accel` - Target acceleration factor (total / acquired samples)
///
/// # Returns
/// Binary mask of length nx * ny with values in {0, 1}; the calibration
/// box is always fully sampled.
pub fn poisson(nx: usize, ny: usize, accel: f64, params: PoissonParams) -> Result<Vec<f64>> {
    if accel <= 1.0 {
        return Err(PicsError::Config(format!(
            "acceleration must exceed 1, got {}",
            accel
        )));
    }
    let (cal_x, cal_y) = params.calib;
    if cal_x > nx || cal_y > ny {
        return Err(PicsError::Config(format!(
            "calibration box ({}, {}) exceeds mask extent ({}, {})",
            cal_x, cal_y, nx, ny
        )));
    }

    // Bisection on the density slope: larger slope spreads samples
    // farther apart away from the center, raising the acceleration.
    let mut slope_min = 0.0;
    let mut slope_max = nx.max(ny) as f64;
    let mut mask = vec![0.0; nx * ny];
    for _ in 0..20 {
        let slope = 0.5 * (slope_min + slope_max);
        mask = darts(nx, ny, slope, &params);

        if params.crop_corner {
            crop_ellipse(&mut mask, nx, ny);
        }
        stamp_calib(&mut mask, nx, ny, cal_x, cal_y);

        let count: f64 = mask.iter().sum();
        let actual = (nx * ny) as f64 / count;
        log::debug!("poisson slope {:.3}: acceleration {:.3}", slope, actual);
        if (actual - accel).abs() < params.tol {
            break;
        }
        if actual < accel {
            slope_min = slope;
        } else {
            slope_max = slope;
        }
    }
    Ok(mask)
}

/// Minimum spacing at a point: 1 at the center, growing linearly.
fn radius_at(x: f64, y: f64, nx: usize, ny: usize, slope: f64) -> f64 {
    let rx = (x - nx as f64 / 2.0) / (nx as f64 / 2.0);
    let ry = (y - ny as f64 / 2.0) / (ny as f64 / 2.0);
    1.0 + slope * (rx * rx + ry * ry).sqrt()
}

/// Bridson dart throwing with spatially varying minimum spacing.
fn darts(nx: usize, ny: usize, slope: f64, params: &PoissonParams) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(params.seed);
    // One point at most per unit cell
    let mut cells: Vec<Option<(f64, f64)>> = vec![None; nx * ny];
    let mut points: Vec<(f64, f64)> = Vec::new();
    let mut active: Vec<usize> = Vec::new();

    let start = (nx as f64 / 2.0, ny as f64 / 2.0);
    cells[idx2d(start.0 as usize, start.1 as usize, nx)] = Some(start);
    points.push(start);
    active.push(0);

    while !active.is_empty() {
        let ai = rng.gen_range(0..active.len());
        let (px, py) = points[active[ai]];
        let rad = radius_at(px, py, nx, ny, slope);

        let mut found = false;
        for _ in 0..params.max_attempts {
            let d = rad * (1.0 + rng.gen::<f64>());
            let th = 2.0 * std::f64::consts::PI * rng.gen::<f64>();
            let qx = px + d * th.cos();
            let qy = py + d * th.sin();
            if qx < 0.0 || qx >= nx as f64 || qy < 0.0 || qy >= ny as f64 {
                continue;
            }
            let rq = radius_at(qx, qy, nx, ny, slope);
            if is_free(&cells, nx, ny, qx, qy, rq) {
                let cell = idx2d(qx as usize, qy as usize, nx);
                cells[cell] = Some((qx, qy));
                points.push((qx, qy));
                active.push(points.len() - 1);
                found = true;
                break;
            }
        }
        if !found {
            active.swap_remove(ai);
        }
    }

    let mut mask = vec![0.0; nx * ny];
    for (i, c) in cells.iter().enumerate() {
        if c.is_some() {
            mask[i] = 1.0;
        }
    }
    mask
}

/// No accepted point within `rad` of (qx, qy)?
fn is_free(cells: &[Option<(f64, f64)>], nx: usize, ny: usize, qx: f64, qy: f64, rad: f64) -> bool {
    let r = rad.ceil() as i64;
    let cx = qx as i64;
    let cy = qy as i64;
    for dy in -r..=r {
        for dx in -r..=r {
            let ix = cx + dx;
            let iy = cy + dy;
            if ix < 0 || iy < 0 || ix >= nx as i64 || iy >= ny as i64 {
                continue;
            }
            if let Some((ox, oy)) = cells[idx2d(ix as usize, iy as usize, nx)] {
                let dist = ((qx - ox).powi(2) + (qy - oy).powi(2)).sqrt();
                if dist < rad {
                    return false;
                }
            }
        }
    }
    true
}

fn crop_ellipse(mask: &mut [f64], nx: usize, ny: usize) {
    for j in 0..ny {
        for i in 0..nx {
            let rx = (i as f64 - nx as f64 / 2.0) / (nx as f64 / 2.0);
            let ry = (j as f64 - ny as f64 / 2.0) / (ny as f64 / 2.0);
            if rx * rx + ry * ry >= 1.0 {
                mask[idx2d(i, j, nx)] = 0.0;
            }
        }
    }
}

fn stamp_calib(mask: &mut [f64], nx: usize, ny: usize, cal_x: usize, cal_y: usize) {
    let ox = (nx - cal_x) / 2;
    let oy = (ny - cal_y) / 2;
    for j in 0..cal_y {
        for i in 0..cal_x {
            mask[idx2d(i + ox, j + oy, nx)] = 1.0;
        }
    }
}
