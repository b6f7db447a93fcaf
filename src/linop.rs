//! Composable linear measurement operators
//!
//! Every operator exposes an exact forward/adjoint pair; solver gradient
//! correctness depends on the adjoint being the true mathematical
//! transpose, so no operator ever broadcasts or pads silently: shape
//! mismatches fail immediately with a `Shape` error.

use num_complex::Complex64;

use crate::error::{PicsError, Result};
use crate::fft::{fftc2d, ifftc2d};
use crate::nufft::Nufft;

/// A linear operator with an exact adjoint.
pub trait LinearOperator {
    /// Length of the operator input.
    fn domain_len(&self) -> usize;

    /// Length of the operator output.
    fn codomain_len(&self) -> usize;

    /// Apply the operator.
    fn forward(&self, x: &[Complex64]) -> Result<Vec<Complex64>>;

    /// Apply the conjugate transpose of the operator.
    fn adjoint(&self, y: &[Complex64]) -> Result<Vec<Complex64>>;
}

fn check_len(what: &str, got: usize, want: usize) -> Result<()> {
    if got != want {
        return Err(PicsError::Shape(format!(
            "{} has {} elements, operator expects {}",
            what, got, want
        )));
    }
    Ok(())
}

/// Centered unitary Fourier transform applied per coil over a Cartesian
/// (nx, ny) grid. Self-inverse pair: adjoint = centered inverse DFT.
pub struct CartesianFt {
    pub ncoils: usize,
    pub nx: usize,
    pub ny: usize,
}

impl LinearOperator for CartesianFt {
    fn domain_len(&self) -> usize {
        self.ncoils * self.nx * self.ny
    }

    fn codomain_len(&self) -> usize {
        self.ncoils * self.nx * self.ny
    }

    fn forward(&self, x: &[Complex64]) -> Result<Vec<Complex64>> {
        check_len("image stack", x.len(), self.domain_len())?;
        let n = self.nx * self.ny;
        let mut out = Vec::with_capacity(x.len());
        for c in 0..self.ncoils {
            out.extend(fftc2d(&x[c * n..(c + 1) * n], self.nx, self.ny));
        }
        Ok(out)
    }

    fn adjoint(&self, y: &[Complex64]) -> Result<Vec<Complex64>> {
        check_len("k-space stack", y.len(), self.codomain_len())?;
        let n = self.nx * self.ny;
        let mut out = Vec::with_capacity(y.len());
        for c in 0..self.ncoils {
            out.extend(ifftc2d(&y[c * n..(c + 1) * n], self.nx, self.ny));
        }
        Ok(out)
    }
}

/// Non-uniform Fourier transform applied per coil at a shared trajectory.
pub struct NuFt<'a> {
    plan: &'a Nufft,
    ncoils: usize,
}

impl<'a> NuFt<'a> {
    pub fn new(plan: &'a Nufft, ncoils: usize) -> Self {
        Self { plan, ncoils }
    }
}

impl LinearOperator for NuFt<'_> {
    fn domain_len(&self) -> usize {
        self.ncoils * self.plan.nx() * self.plan.ny()
    }

    fn codomain_len(&self) -> usize {
        self.ncoils * self.plan.nsamp()
    }

    fn forward(&self, x: &[Complex64]) -> Result<Vec<Complex64>> {
        check_len("image stack", x.len(), self.domain_len())?;
        let n = self.plan.nx() * self.plan.ny();
        let mut out = Vec::with_capacity(self.codomain_len());
        for c in 0..self.ncoils {
            out.extend(self.plan.forward(&x[c * n..(c + 1) * n])?);
        }
        Ok(out)
    }

    fn adjoint(&self, y: &[Complex64]) -> Result<Vec<Complex64>> {
        check_len("sample stack", y.len(), self.codomain_len())?;
        let m = self.plan.nsamp();
        let mut out = Vec::with_capacity(self.domain_len());
        for c in 0..self.ncoils {
            out.extend(self.plan.adjoint(&y[c * m..(c + 1) * m])?);
        }
        Ok(out)
    }
}

/// Coil-combination operator: forward synthesizes per-coil images by
/// multiplying with each sensitivity map; adjoint collapses coil images
/// back into one image with conjugate-map weighting. Adjoint-forward is
/// the identity wherever the maps have unit root-sum-of-squares.
pub struct CoilCombine<'a> {
    mps: &'a [Complex64],
    ncoils: usize,
    nx: usize,
    ny: usize,
}

impl<'a> CoilCombine<'a> {
    pub fn new(mps: &'a [Complex64], ncoils: usize, nx: usize, ny: usize) -> Result<Self> {
        check_len("sensitivity maps", mps.len(), ncoils * nx * ny)?;
        Ok(Self { mps, ncoils, nx, ny })
    }
}

impl LinearOperator for CoilCombine<'_> {
    fn domain_len(&self) -> usize {
        self.nx * self.ny
    }

    fn codomain_len(&self) -> usize {
        self.ncoils * self.nx * self.ny
    }

    fn forward(&self, x: &[Complex64]) -> Result<Vec<Complex64>> {
        check_len("image", x.len(), self.domain_len())?;
        let n = self.nx * self.ny;
        let mut out = vec![Complex64::new(0.0, 0.0); self.ncoils * n];
        for c in 0..self.ncoils {
            for p in 0..n {
                out[c * n + p] = self.mps[c * n + p] * x[p];
            }
        }
        Ok(out)
    }

    fn adjoint(&self, y: &[Complex64]) -> Result<Vec<Complex64>> {
        check_len("coil images", y.len(), self.codomain_len())?;
        let n = self.nx * self.ny;
        let mut out = vec![Complex64::new(0.0, 0.0); n];
        for c in 0..self.ncoils {
            for p in 0..n {
                out[p] += self.mps[c * n + p].conj() * y[c * n + p];
            }
        }
        Ok(out)
    }
}

/// Point-wise sampling / density weighting, broadcast over coils.
/// Real weights, so the operator is self-adjoint.
pub struct Sampling<'a> {
    weights: &'a [f64],
    ncoils: usize,
}

impl<'a> Sampling<'a> {
    pub fn new(weights: &'a [f64], ncoils: usize) -> Self {
        Self { weights, ncoils }
    }

    fn apply(&self, x: &[Complex64]) -> Result<Vec<Complex64>> {
        check_len("sample stack", x.len(), self.domain_len())?;
        let n = self.weights.len();
        let mut out = x.to_vec();
        for c in 0..self.ncoils {
            for p in 0..n {
                out[c * n + p] *= self.weights[p];
            }
        }
        Ok(out)
    }
}

impl LinearOperator for Sampling<'_> {
    fn domain_len(&self) -> usize {
        self.ncoils * self.weights.len()
    }

    fn codomain_len(&self) -> usize {
        self.ncoils * self.weights.len()
    }

    fn forward(&self, x: &[Complex64]) -> Result<Vec<Complex64>> {
        self.apply(x)
    }

    fn adjoint(&self, y: &[Complex64]) -> Result<Vec<Complex64>> {
        self.apply(y)
    }
}

/// Fourier variant of the measurement model, selected explicitly by
/// whether a trajectory is supplied.
pub enum FourierVariant<'a> {
    /// Regular grid acquisition: centered unitary DFT.
    Cartesian,
    /// Arbitrary-trajectory acquisition through a precomputed plan.
    NonCartesian(&'a Nufft),
}

/// The full multi-coil measurement operator:
/// sampling ∘ Fourier ∘ coil-combination.
///
/// Maps a single image (nx * ny) to the acquired multi-coil sample stack.
/// The optional `weights` are the sampling mask (Cartesian) and/or a soft
/// per-sample density weighting; both live on the per-coil sample space
/// and are broadcast over coils.
pub struct SenseOp<'a> {
    mps: &'a [Complex64],
    ncoils: usize,
    nx: usize,
    ny: usize,
    fourier: FourierVariant<'a>,
    weights: Option<&'a [f64]>,
}

impl<'a> SenseOp<'a> {
    pub fn new(
        mps: &'a [Complex64],
        ncoils: usize,
        nx: usize,
        ny: usize,
        fourier: FourierVariant<'a>,
        weights: Option<&'a [f64]>,
    ) -> Result<Self> {
        check_len("sensitivity maps", mps.len(), ncoils * nx * ny)?;
        if let FourierVariant::NonCartesian(plan) = &fourier {
            if plan.nx() != nx || plan.ny() != ny {
                return Err(PicsError::Shape(format!(
                    "nufft plan grid ({}, {}) disagrees with image extent ({}, {})",
                    plan.nx(), plan.ny(), nx, ny
                )));
            }
        }
        let op = Self { mps, ncoils, nx, ny, fourier, weights };
        if let Some(w) = weights {
            check_len("sampling weights", w.len(), op.samples_per_coil())?;
        }
        Ok(op)
    }

    /// Per-coil sample count of the acquisition index space.
    pub fn samples_per_coil(&self) -> usize {
        match &self.fourier {
            FourierVariant::Cartesian => self.nx * self.ny,
            FourierVariant::NonCartesian(plan) => plan.nsamp(),
        }
    }
}

impl LinearOperator for SenseOp<'_> {
    fn domain_len(&self) -> usize {
        self.nx * self.ny
    }

    fn codomain_len(&self) -> usize {
        self.ncoils * self.samples_per_coil()
    }

    fn forward(&self, x: &[Complex64]) -> Result<Vec<Complex64>> {
        let combine = CoilCombine::new(self.mps, self.ncoils, self.nx, self.ny)?;
        let coil_imgs = combine.forward(x)?;
        let ksp = match &self.fourier {
            FourierVariant::Cartesian => {
                CartesianFt { ncoils: self.ncoils, nx: self.nx, ny: self.ny }
                    .forward(&coil_imgs)?
            }
            FourierVariant::NonCartesian(plan) => {
                NuFt::new(plan, self.ncoils).forward(&coil_imgs)?
            }
        };
        match self.weights {
            Some(w) => Sampling::new(w, self.ncoils).forward(&ksp),
            None => Ok(ksp),
        }
    }

    fn adjoint(&self, y: &[Complex64]) -> Result<Vec<Complex64>> {
        check_len("sample stack", y.len(), self.codomain_len())?;
        let weighted = match self.weights {
            Some(w) => Sampling::new(w, self.ncoils).adjoint(y)?,
            None => y.to_vec(),
        };
        let coil_imgs = match &self.fourier {
            FourierVariant::Cartesian => {
                CartesianFt { ncoils: self.ncoils, nx: self.nx, ny: self.ny }
                    .adjoint(&weighted)?
            }
            FourierVariant::NonCartesian(plan) => {
                NuFt::new(plan, self.ncoils).adjoint(&weighted)?
            }
        };
        CoilCombine::new(self.mps, self.ncoils, self.nx, self.ny)?.adjoint(&coil_imgs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{cdot, idx2d, rss};

    fn pseudo_random(n: usize, fa: f64, fb: f64) -> Vec<Complex64> {
        (0..n)
            .map(|i| Complex64::new((i as f64 * fa).sin(), (i as f64 * fb).cos()))
            .collect()
    }

    fn smooth_maps(ncoils: usize, nx: usize, ny: usize) -> Vec<Complex64> {
        let mut mps = vec![Complex64::new(0.0, 0.0); ncoils * nx * ny];
        for c in 0..ncoils {
            for j in 0..ny {
                for i in 0..nx {
                    let phase = 2.0 * std::f64::consts::PI * c as f64 / ncoils as f64;
                    let wx = (std::f64::consts::PI * (i as f64 + 0.5) / nx as f64
                        + phase)
                        .sin();
                    let wy = (std::f64::consts::PI * (j as f64 + 0.5) / ny as f64).cos();
                    mps[c * nx * ny + idx2d(i, j, nx)] =
                        Complex64::new(wx, 0.3 * wy);
                }
            }
        }
        // Normalize to unit RSS
        let r = rss(&mps, ncoils);
        for c in 0..ncoils {
            for p in 0..nx * ny {
                mps[c * nx * ny + p] /= r[p].max(1e-12);
            }
        }
        mps
    }

    fn assert_adjoint_law<O: LinearOperator>(op: &O, tol: f64) {
        let u = pseudo_random(op.domain_len(), 0.17, 0.31);
        let v = pseudo_random(op.codomain_len(), 0.47, 0.23);
        let lhs = cdot(&op.forward(&u).unwrap(), &v);
        let rhs = cdot(&u, &op.adjoint(&v).unwrap());
        assert!(
            (lhs - rhs).norm() < tol * (1.0 + lhs.norm()),
            "adjoint law violated: {} vs {}",
            lhs, rhs
        );
    }

    #[test]
    fn test_cartesian_ft_adjoint() {
        let op = CartesianFt { ncoils: 3, nx: 8, ny: 8 };
        assert_adjoint_law(&op, 1e-10);
    }

    #[test]
    fn test_coil_combine_adjoint() {
        let mps = smooth_maps(4, 8, 8);
        let op = CoilCombine::new(&mps, 4, 8, 8).unwrap();
        assert_adjoint_law(&op, 1e-10);
    }

    #[test]
    fn test_sampling_adjoint() {
        let weights: Vec<f64> = (0..64).map(|i| if i % 3 == 0 { 0.0 } else { 0.7 }).collect();
        let op = Sampling::new(&weights, 2);
        assert_adjoint_law(&op, 1e-12);
    }

    #[test]
    fn test_sense_op_adjoint_cartesian() {
        let mps = smooth_maps(4, 8, 8);
        let weights: Vec<f64> = (0..64).map(|i| (i % 2) as f64).collect();
        let op = SenseOp::new(&mps, 4, 8, 8, FourierVariant::Cartesian, Some(&weights)).unwrap();
        assert_adjoint_law(&op, 1e-10);
    }

    #[test]
    fn test_sense_op_adjoint_noncartesian() {
        let nx = 8;
        let ny = 8;
        let mut coord = Vec::new();
        for s in 0..4 {
            let theta = std::f64::consts::PI * s as f64 / 4.0;
            for r in 0..8 {
                let k = r as f64 - 4.0;
                coord.push(k * theta.cos());
                coord.push(k * theta.sin());
            }
        }
        let plan = Nufft::new(nx, ny, &coord).unwrap();
        let mps = smooth_maps(3, nx, ny);
        let op = SenseOp::new(&mps, 3, nx, ny, FourierVariant::NonCartesian(&plan), None).unwrap();
        assert_adjoint_law(&op, 1e-10);
    }

    #[test]
    fn test_coil_combine_unit_rss_inverts() {
        // With unit-RSS maps, adjoint(forward(x)) == x
        let nx = 8;
        let ny = 8;
        let mps = smooth_maps(4, nx, ny);
        let op = CoilCombine::new(&mps, 4, nx, ny).unwrap();

        let x = pseudo_random(nx * ny, 0.29, 0.53);
        let back = op.adjoint(&op.forward(&x).unwrap()).unwrap();
        for p in 0..nx * ny {
            assert!(
                (back[p] - x[p]).norm() < 1e-10,
                "unit-RSS maps must invert at {}",
                p
            );
        }
    }

    #[test]
    fn test_shape_mismatch_fails() {
        let op = CartesianFt { ncoils: 1, nx: 4, ny: 4 };
        let bad = vec![Complex64::new(0.0, 0.0); 15];
        assert!(matches!(op.forward(&bad), Err(PicsError::Shape(_))));

        let mps = smooth_maps(2, 4, 4);
        let short_weights = vec![1.0; 9];
        let err = SenseOp::new(&mps, 2, 4, 4, FourierVariant::Cartesian, Some(&short_weights));
        assert!(matches!(err, Err(PicsError::Shape(_))));
    }
}
