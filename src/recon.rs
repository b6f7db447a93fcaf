//! Wavelet-regularized multi-coil reconstruction
//!
//! The application surface tying the pieces together: builds the SENSE
//! measurement operator from k-space, maps, and optional trajectory /
//! mask / dual preconditioner, then runs the selected solver for the
//! problem
//!
//!   min_x 0.5 ||mask (F S x) - y||^2 + lamda ||W x||_1
//!
//! All structural inputs are validated at construction; solver state is
//! created at run time, owned exclusively by the solver, and discarded
//! (or exported through the diagnostics sink) when the iteration budget
//! is exhausted.

use std::str::FromStr;

use num_complex::Complex64;

use crate::error::{PicsError, Result};
use crate::linop::{FourierVariant, LinearOperator, SenseOp};
use crate::nufft::Nufft;
use crate::solvers::{max_eig, Fista, IterRecord, PrimalDual};
use crate::wavelet::{WaveletKind, WaveletOp};

/// Measurement operator with its codomain rescaled by the square root of
/// a dual preconditioner. Only used to estimate the operator norm that
/// sizes the primal step in the preconditioned dual metric.
struct DualScaled<'b, E: LinearOperator> {
    inner: &'b E,
    p_sqrt: Vec<f64>,
}

impl<E: LinearOperator> LinearOperator for DualScaled<'_, E> {
    fn domain_len(&self) -> usize {
        self.inner.domain_len()
    }

    fn codomain_len(&self) -> usize {
        self.inner.codomain_len()
    }

    fn forward(&self, x: &[Complex64]) -> Result<Vec<Complex64>> {
        let mut y = self.inner.forward(x)?;
        for (yi, &p) in y.iter_mut().zip(self.p_sqrt.iter()) {
            *yi *= p;
        }
        Ok(y)
    }

    fn adjoint(&self, y: &[Complex64]) -> Result<Vec<Complex64>> {
        let scaled: Vec<Complex64> = y
            .iter()
            .zip(self.p_sqrt.iter())
            .map(|(&yi, &p)| yi * p)
            .collect();
        self.inner.adjoint(&scaled)
    }
}

/// Solver selection, fixed at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Proximal gradient with Nesterov acceleration.
    Fista,
    /// First-order primal-dual splitting, optionally dual-preconditioned.
    PrimalDual,
}

impl FromStr for Algorithm {
    type Err = PicsError;

    /// Parse an algorithm name at the boundary for string-configured
    /// callers. Unknown names fail with `Config`.
    fn from_str(name: &str) -> Result<Self> {
        match name {
            "Fista" | "FISTA" | "fista" => Ok(Algorithm::Fista),
            "FirstOrderPrimalDual" | "PrimalDual" | "primal_dual" => Ok(Algorithm::PrimalDual),
            other => Err(PicsError::Config(format!(
                "unknown algorithm name '{}'",
                other
            ))),
        }
    }
}

/// Reconstruction parameters with the defaults the drivers use.
#[derive(Debug, Clone, Copy)]
pub struct WaveletReconParams {
    /// Regularization weight on the wavelet L1 term.
    pub lamda: f64,
    /// Solver selection.
    pub algorithm: Algorithm,
    /// Iteration budget; normal termination is exhausting it.
    pub max_iter: usize,
    /// Optional relative-objective tolerance for early stopping.
    pub tol: Option<f64>,
    /// Sparsifying wavelet family.
    pub wavelet: WaveletKind,
    /// Wavelet decomposition depth (capped by the image extents).
    pub wavelet_levels: usize,
    /// Dual step size (primal-dual only).
    pub sigma: f64,
    /// Primal extrapolation factor (primal-dual only).
    pub theta: f64,
    /// Optional FISTA step-size override; honored unvalidated, so an
    /// oversized value diverges and surfaces as numerical instability.
    pub step: Option<f64>,
    /// Power-iteration budget for the operator-norm estimate.
    pub max_power_iter: usize,
}

impl Default for WaveletReconParams {
    fn default() -> Self {
        Self {
            lamda: 1e-3,
            algorithm: Algorithm::Fista,
            max_iter: 100,
            tol: None,
            wavelet: WaveletKind::Daub4,
            wavelet_levels: 3,
            sigma: 1.0,
            theta: 1.0,
            step: None,
            max_power_iter: 30,
        }
    }
}

/// A configured reconstruction.
pub struct WaveletRecon<'a> {
    ksp: &'a [Complex64],
    mps: &'a [Complex64],
    ncoils: usize,
    nx: usize,
    ny: usize,
    mask: Option<&'a [f64]>,
    dual_precond: Option<&'a [f64]>,
    plan: Option<Nufft>,
    params: WaveletReconParams,
}

impl<'a> WaveletRecon<'a> {
    /// Validate inputs and build the acquisition plan.
    ///
    /// # Arguments
    /// * `ksp` - Under-sampled k-space, coil-major, O(1)-scaled by the caller
    /// * `mps` - Sensitivity maps, coil-major, ncoils * nx * ny
    /// * `shape` - (coils, nx, ny) of the maps / target image
    /// * `coord` - Optional trajectory, interleaved (kx, ky), selecting the
    ///   non-Cartesian acquisition model
    /// * `mask` - Optional sampling mask or per-sample density weighting
    ///   on the per-coil sample space
    /// * `dual_precond` - Optional dual preconditioner over the full
    ///   multi-coil sample space (primal-dual only)
    pub fn new(
        ksp: &'a [Complex64],
        mps: &'a [Complex64],
        shape: (usize, usize, usize),
        coord: Option<&'a [f64]>,
        mask: Option<&'a [f64]>,
        dual_precond: Option<&'a [f64]>,
        params: WaveletReconParams,
    ) -> Result<Self> {
        let (ncoils, nx, ny) = shape;
        if mps.len() != ncoils * nx * ny {
            return Err(PicsError::Shape(format!(
                "maps have {} elements, shape says {}x{}x{}",
                mps.len(), ncoils, nx, ny
            )));
        }

        let (plan, samples) = match coord {
            Some(c) => {
                if c.len() % 2 != 0 || ksp.len() != ncoils * (c.len() / 2) {
                    return Err(PicsError::Config(format!(
                        "trajectory with {} values is inconsistent with {} k-space \
                         elements over {} coils",
                        c.len(), ksp.len(), ncoils
                    )));
                }
                let plan = Nufft::new(nx, ny, c)?;
                let samples = plan.nsamp();
                (Some(plan), samples)
            }
            None => {
                if ksp.len() != ncoils * nx * ny {
                    return Err(PicsError::Config(format!(
                        "Cartesian k-space has {} elements, expected {}x{}x{}",
                        ksp.len(), ncoils, nx, ny
                    )));
                }
                (None, nx * ny)
            }
        };

        if let Some(m) = mask {
            if m.len() != samples {
                return Err(PicsError::Config(format!(
                    "mask has {} elements, sampling index space has {}",
                    m.len(), samples
                )));
            }
        }
        if let Some(p) = dual_precond {
            if p.len() != ncoils * samples {
                return Err(PicsError::Config(format!(
                    "dual preconditioner has {} elements, sample space has {}",
                    p.len(), ncoils * samples
                )));
            }
            if params.algorithm != Algorithm::PrimalDual {
                return Err(PicsError::Config(
                    "dual preconditioner requires the primal-dual algorithm".to_string(),
                ));
            }
        }

        Ok(Self {
            ksp,
            mps,
            ncoils,
            nx,
            ny,
            mask,
            dual_precond,
            plan,
            params,
        })
    }

    /// Run the configured solver and return the final image estimate.
    ///
    /// Per-iteration diagnostics append to `record` in iteration order on
    /// successful completion; failed runs contribute no entries.
    pub fn run(&self, record: Option<&mut IterRecord>) -> Result<Vec<Complex64>> {
        let fourier = match &self.plan {
            Some(plan) => FourierVariant::NonCartesian(plan),
            None => FourierVariant::Cartesian,
        };
        let encode = SenseOp::new(
            self.mps,
            self.ncoils,
            self.nx,
            self.ny,
            fourier,
            self.mask,
        )?;
        let wavelet = WaveletOp::new(
            self.nx,
            self.ny,
            self.params.wavelet,
            self.params.wavelet_levels,
        )?;

        // Operator norm in the metric the dual update actually runs in:
        // with a preconditioner the relevant bound is on P^(1/2) E.
        let lmax = match self.dual_precond {
            Some(p) => {
                let scaled = DualScaled {
                    inner: &encode,
                    p_sqrt: p.iter().map(|&v| v.sqrt()).collect(),
                };
                max_eig(&scaled, self.params.max_power_iter)?
            }
            None => max_eig(&encode, self.params.max_power_iter)?,
        };
        if lmax <= 0.0 {
            return Err(PicsError::Config(
                "measurement operator has zero norm; nothing to reconstruct".to_string(),
            ));
        }
        log::info!(
            "wavelet recon: {:?}, {} coils, {}x{}, |E|^2 ~ {:.3e}",
            self.params.algorithm, self.ncoils, self.nx, self.ny, lmax
        );

        match self.params.algorithm {
            Algorithm::Fista => {
                let alpha = self.params.step.unwrap_or(1.0 / lmax);
                Fista::new(&encode, &wavelet, self.ksp, self.params.lamda, alpha)?
                    .run(self.params.max_iter, self.params.tol, record)
            }
            Algorithm::PrimalDual => {
                let tau = 1.0 / (self.params.sigma * lmax);
                PrimalDual::new(
                    &encode,
                    &wavelet,
                    self.ksp,
                    self.params.lamda,
                    self.params.sigma,
                    tau,
                    self.params.theta,
                    self.dual_precond,
                )?
                .run(self.params.max_iter, self.params.tol, record)
            }
        }
    }
}
