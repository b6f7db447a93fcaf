//! First-order primal-dual splitting (Chambolle-Pock)
//!
//! Dualizes the data-consistency term in k-space: the dual variable lives
//! on the acquisition sample space and is updated through the proximal
//! operator of the conjugate data term, optionally rescaled per sample by
//! an external preconditioner. The preconditioner changes the convergence
//! rate, not the fixed point.
//!
//! Reference:
//! Chambolle, A., Pock, T. (2011). "A first-order primal-dual algorithm
//! for convex problems with applications to imaging."
//! Journal of Mathematical Imaging and Vision, 40(1):120-145.

use num_complex::Complex64;

use crate::error::{PicsError, Result};
use crate::linop::LinearOperator;
use crate::utils::soft_thresh;
use crate::wavelet::WaveletOp;

use super::{converged, objective, IterRecord};

/// Primal-dual state machine for 0.5 ||E x - y||^2 + lamda ||W x||_1.
///
/// State: primal image, k-space dual variable, extrapolated primal. The
/// step sizes must satisfy sigma * tau * L <= 1 (L the largest eigenvalue
/// of E^H E) for guaranteed convergence; the implementation does not
/// validate the bound, and misconfiguration legitimately diverges.
pub struct PrimalDual<'a, E: LinearOperator> {
    encode: &'a E,
    wavelet: &'a WaveletOp,
    ksp: &'a [Complex64],
    lamda: f64,
    sigma: f64,
    tau: f64,
    theta: f64,
    precond: Option<&'a [f64]>,
    x: Vec<Complex64>,
    x_bar: Vec<Complex64>,
    u: Vec<Complex64>,
    iter: usize,
    obj: f64,
}

impl<'a, E: LinearOperator> PrimalDual<'a, E> {
    /// Set up a solve. `precond` scales the dual update per sample and
    /// must cover the full multi-coil sample space.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        encode: &'a E,
        wavelet: &'a WaveletOp,
        ksp: &'a [Complex64],
        lamda: f64,
        sigma: f64,
        tau: f64,
        theta: f64,
        precond: Option<&'a [f64]>,
    ) -> Result<Self> {
        if ksp.len() != encode.codomain_len() {
            return Err(PicsError::Shape(format!(
                "k-space has {} elements, measurement operator produces {}",
                ksp.len(),
                encode.codomain_len()
            )));
        }
        if let Some(p) = precond {
            if p.len() != encode.codomain_len() {
                return Err(PicsError::Shape(format!(
                    "dual preconditioner has {} elements, sample space has {}",
                    p.len(),
                    encode.codomain_len()
                )));
            }
        }
        let n = encode.domain_len();
        Ok(Self {
            encode,
            wavelet,
            ksp,
            lamda,
            sigma,
            tau,
            theta,
            precond,
            x: vec![Complex64::new(0.0, 0.0); n],
            x_bar: vec![Complex64::new(0.0, 0.0); n],
            u: vec![Complex64::new(0.0, 0.0); encode.codomain_len()],
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

    /// One deterministic iteration: preconditioned dual proximal step on
    /// the conjugate data term, primal wavelet soft-threshold step,
    /// theta-extrapolation.
    pub fn step(&mut self) -> Result<()> {
        // Dual ascent: u = (u + sigma p (E x_bar - y)) / (1 + sigma p)
        let ex = self.encode.forward(&self.x_bar)?;
        for s in 0..self.u.len() {
            let p = self.precond.map_or(1.0, |p| p[s]);
            let sp = self.sigma * p;
            self.u[s] = (self.u[s] + (ex[s] - self.ksp[s]) * sp) / (1.0 + sp);
        }

        // Primal descent with the wavelet L1 proximal operator
        let grad = self.encode.adjoint(&self.u)?;
        let stepped: Vec<Complex64> = self
            .x
            .iter()
            .zip(grad.iter())
            .map(|(&xi, &gi)| xi - gi * self.tau)
            .collect();
        let mut coeffs = self.wavelet.forward(&stepped)?;
        let thresh = self.tau * self.lamda;
        for c in coeffs.iter_mut() {
            *c = soft_thresh(*c, thresh);
        }
        let x_next = self.wavelet.inverse(&coeffs)?;

        // Extrapolate
        for p in 0..self.x.len() {
            self.x_bar[p] = x_next[p] + (x_next[p] - self.x[p]) * self.theta;
        }
        self.x = x_next;
        self.iter += 1;

        self.obj = objective(self.encode, self.wavelet, &self.x, self.ksp, self.lamda)?;
        if !self.obj.is_finite() {
            return Err(PicsError::NumericalInstability(format!(
                "objective is {} at iteration {}; sigma * tau likely violates the step bound",
                self.obj, self.iter
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
            log::debug!(
                "primal-dual iter {}/{}: objective {:.6e}",
                it + 1, max_iter, self.obj
            );
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
