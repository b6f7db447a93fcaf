//! PICS-Core: parallel-imaging compressed-sensing reconstruction
//!
//! This crate recovers a single complex image from under-sampled,
//! multi-coil MR k-space by solving a wavelet-regularized convex inverse
//! problem.
//!
//! # Modules
//! - `fft`: 2D FFT operations using rustfft, plus centered unitary variants
//! - `linop`: composable forward/adjoint measurement operators
//! - `nufft`: non-uniform Fourier transform by Kaiser-Bessel gridding
//! - `wavelet`: orthogonal 2D discrete wavelet transform
//! - `calib`: joint sensitivity-map estimation from a calibration region
//! - `precond`: k-space preconditioner for dual-domain updates
//! - `solvers`: FISTA and primal-dual iterative solvers
//! - `recon`: wavelet-regularized reconstruction driver
//! - `samp`: Poisson-disc sampling-mask generation
//! - `sim`: synthetic phantoms and coil profiles
//! - `utils`: array helpers, cropping, norms

// Core modules
pub mod error;
pub mod fft;
pub mod utils;

// Operator modules
pub mod linop;
pub mod nufft;
pub mod wavelet;

// Algorithm modules
pub mod calib;
pub mod precond;
pub mod recon;
pub mod solvers;

// Simulation helpers
pub mod samp;
pub mod sim;
