//! FISTA: proximal gradient descent with Nesterov acceleration
//!
//! Reference:
//! Beck, A., Teboulle, M. (2009). "A fast iterative shrinkage-thresholding
//! algorithm for linear inverse problems." SIAM Journal on Imaging
//! Sciences, 2(1):183-202.

use num_complex::Complex64;

use crate::error::{PicsError, Result};
use crate::linop::LinearOperator;
use crate::utils::soft_thresh;
use crate::wavelet::WaveletOp;

use super::{converged, objective, IterRecord};

/// FISTA state machine for 0.5 ||E x - y||^2 + lamda ||W x||_1.
///
/// State: current image, momentum image, step counter. The step size must
/// satisfy alpha <= 1/L with L the largest eigenvalue of E^H E; a larger
/// step diverges, which surfaces as a `NumericalInstability` error rather
/// than being silently corrected.
pub struct Fista<'a, E: LinearOperator> {
    encode: &'a E,
    wavelet: &'a WaveletOp,
    ksp: &'a [Complex64],
    lamda: f64,
    alpha: f64,
    x: Vec<Complex64>,
    z: Vec<Complex64>,
    t: f64,
    iter: usize,
    obj: f64,
}

impl<'a, E: LinearOperator> Fista<'a, E> {
    /// Set up a solve with step size `alpha`, zero-initialized image.
    pub fn new(
        encode: &'a E,
        wavelet: &'a WaveletOp,
        ksp: &'a [Complex64],
        lamda: f64,
        alpha: f64,
    ) -> Result<Self> {
        if ksp.len() != encode.codomain_len() {
            return Err(PicsError::Shape(format!(
                "k-space has {} elements, measurement operator produces {}",
                ksp.len(),
                encode.codomain_len()
            )));
        }
        let n = encode.domain_len();
        Ok(Self {
            encode,
            wavelet,
            ksp,
            lamda,
            alpha,
            x: vec![Complex64::new(0.0, 0.0); n],
            z: vec![Complex64::new(0.0, 0.0); n],
            t: 1.0,
            iter: 0,
            obj: f64::INFINITY,
        })
    }

    /// Current image estimate.
    pub fn image(&self) -> &[Complex64] {
        &self.x
    }

    /// Objective value after the last completed iteration.
    pub fn objective_value(&self) -> f64 {
        self.obj
    }

    /// One deterministic iteration: gradient step at the momentum point,
    /// wavelet-domain soft-threshold, two-point extrapolation.
    pub fn step(&mut self) -> Result<()> {
        // Gradient of the data term at the momentum point
        let mut r = self.encode.forward(&self.z)?;
        for (ri, yi) in r.iter_mut().zip(self.ksp.iter()) {
            *ri -= yi;
        }
        let grad = self.encode.adjoint(&r)?;

        // Proximal step on the wavelet L1 term
        let stepped: Vec<Complex64> = self
            .z
            .iter()
            .zip(grad.iter())
            .map(|(&zi, &gi)| zi - gi * self.alpha)
            .collect();
        let mut coeffs = self.wavelet.forward(&stepped)?;
        let thresh = self.alpha * self.lamda;
        for c in coeffs.iter_mut() {
            *c = soft_thresh(*c, thresh);
        }
        let x_next = self.wavelet.inverse(&coeffs)?;

        // Two-point Nesterov extrapolation
        let t_next = 0.5 * (1.0 + (1.0 + 4.0 * self.t * self.t).sqrt());
        let beta = (self.t - 1.0) / t_next;
        for p in 0..self.z.len() {
            self.z[p] = x_next[p] + (x_next[p] - self.x[p]) * beta;
        }
        self.x = x_next;
        self.t = t_next;
        self.iter += 1;

        self.obj = objective(self.encode, self.wavelet, &self.x, self.ksp, self.lamda)?;
        if !self.obj.is_finite() {
            return Err(PicsError::NumericalInstability(format!(
                "objective is {} at iteration {}; step size {} likely exceeds 1/L",
                self.obj, self.iter, self.alpha
            )));
        }
        Ok(())
    }

    /// Run up to `max_iter` iterations, optionally stopping early when the
    /// relative objective change falls below `tol`. Diagnostics flush into
    /// `record` only on successful completion.
    pub fn run(
        &mut self,
        max_iter: usize,
        tol: Option<f64>,
        record: Option<&mut IterRecord>,
    ) -> Result<Vec<Complex64>> {
        let mut objs = Vec::new();
        let mut iterates = Vec::new();
        let want_obj = record.as_ref().map_or(false, |r| r.record_objective);
        let want_img = record.as_ref().map_or(false, |r| r.record_iterate);

        for it in 0..max_iter {
            let prev = self.obj;
            self.step()?;
            log::debug!("fista iter {}/{}: objective {:.6e}", it + 1, max_iter, self.obj);
            if want_obj {
                objs.push(self.obj);
            }
            if want_img {
                iterates.push(self.x.clone());
            }
            if converged(prev, self.obj, tol) {
                break;
            }
        }

        if let Some(r) = record {
            r.objective.extend(objs);
            r.iterate.extend(iterates);
        }
        Ok(self.x.clone())
    }
}
