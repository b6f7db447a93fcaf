//! l1-wavelet regularized non-Cartesian reconstruction demo
//!
//! Synthetic radial acquisition: the trajectory is undersampled by
//! dropping spokes, sensitivity maps are estimated from the gridded
//! low-frequency samples, and four reconstructions are compared: FISTA,
//! plain primal-dual, primal-dual with the density compensation factors
//! as the dual scaling, and primal-dual with the proposed k-space
//! preconditioner.
//!
//! Usage: RUST_LOG=debug cargo run --release --example radial_wavelet

use std::time::Instant;

use num_complex::Complex64;

use pics_core::calib::{JointSense, JointSenseParams};
use pics_core::nufft::Nufft;
use pics_core::precond::kspace_precond;
use pics_core::recon::{Algorithm, WaveletRecon, WaveletReconParams};
use pics_core::sim::{birdcage_maps, shepp_logan};
use pics_core::solvers::IterRecord;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Set parameters
    let ncoils = 8;
    let nx = 64;
    let ny = 64;
    let accel: usize = 4;
    let nspokes = 192;
    let nread = 64;
    let mps_ker_width = 8;
    let lamda = 1e-3;
    let max_iter = 50;

    // Fully-sampled radial trajectory
    let mut coord_full = Vec::with_capacity(2 * nspokes * nread);
    for spoke in 0..nspokes {
        let theta = std::f64::consts::PI * spoke as f64 / nspokes as f64;
        for r in 0..nread {
            let k = 0.5 * (r as f64 - nread as f64 / 2.0);
            coord_full.push(k * theta.cos());
            coord_full.push(k * theta.sin());
        }
    }

    // Simulate the acquisition
    println!("[INFO] Simulating {}-coil radial acquisition, {} spokes...", ncoils, nspokes);
    let start = Instant::now();
    let img = shepp_logan(nx, ny);
    let mps_true = birdcage_maps(ncoils, nx, ny, 1.5);
    let n = nx * ny;
    let plan_full = Nufft::new(nx, ny, &coord_full)?;
    let mut ksp = Vec::new();
    for c in 0..ncoils {
        let coil_img: Vec<Complex64> = (0..n).map(|p| mps_true[c * n + p] * img[p]).collect();
        ksp.extend(plan_full.forward(&coil_img)?);
    }
    let peak = ksp.iter().fold(0.0_f64, |m, v| m.max(v.norm()));
    for v in ksp.iter_mut() {
        *v /= peak;
    }
    println!("[INFO] Simulated in {:.2?}", start.elapsed());

    // Simulate undersampling by dropping spokes
    let nspokes_under = nspokes / accel;
    let nsamp_full = nspokes * nread;
    let nsamp = nspokes_under * nread;
    let mut coord = Vec::with_capacity(2 * nsamp);
    let mut ksp_under = vec![Complex64::new(0.0, 0.0); ncoils * nsamp];
    for (si, spoke) in (0..nspokes).step_by(accel).enumerate() {
        for r in 0..nread {
            let s_full = spoke * nread + r;
            let s = si * nread + r;
            coord.push(coord_full[2 * s_full]);
            coord.push(coord_full[2 * s_full + 1]);
            for c in 0..ncoils {
                ksp_under[c * nsamp + s] = ksp[c * nsamp_full + s_full];
            }
        }
    }

    // Ramp density compensation factors
    let dcf: Vec<f64> = (0..nsamp)
        .map(|s| {
            let kx = coord[2 * s];
            let ky = coord[2 * s + 1];
            (kx * kx + ky * ky).sqrt().max(0.5)
        })
        .collect();

    // Estimate maps from the low-frequency readout centers
    let start = Instant::now();
    let calib_read = 16;
    let read_off = (nread - calib_read) / 2;
    let mut ksp_calib = vec![Complex64::new(0.0, 0.0); ncoils * nspokes_under * calib_read];
    let mut coord_calib = Vec::with_capacity(2 * nspokes_under * calib_read);
    for spoke in 0..nspokes_under {
        for r in 0..calib_read {
            let s = spoke * nread + read_off + r;
            let sc = spoke * calib_read + r;
            coord_calib.push(coord[2 * s]);
            coord_calib.push(coord[2 * s + 1]);
            for c in 0..ncoils {
                ksp_calib[c * nspokes_under * calib_read + sc] = ksp_under[c * nsamp + s];
            }
        }
    }
    let mps = JointSense::new(
        &ksp_calib,
        (ncoils, nspokes_under, calib_read),
        mps_ker_width,
        (ncoils, nx, ny),
        Some(&coord_calib),
        JointSenseParams::default(),
    )?
    .run()?;
    println!("[INFO] Estimated sensitivity maps in {:.2?}", start.elapsed());

    // Generate kspace preconditioner
    let dual_precond = kspace_precond(&mps, (ncoils, nx, ny), None, Some(&coord), lamda)?;
    // DCF as a dual scaling, tiled over coils
    let dcf_precond: Vec<f64> = (0..ncoils * nsamp).map(|i| dcf[i % nsamp]).collect();

    // Run reconstructions
    let runs: [(&str, Algorithm, Option<&[f64]>); 4] = [
        ("FISTA", Algorithm::Fista, None),
        ("Primal Dual", Algorithm::PrimalDual, None),
        ("Primal Dual + DCF", Algorithm::PrimalDual, Some(&dcf_precond)),
        ("Primal Dual + Precond", Algorithm::PrimalDual, Some(&dual_precond)),
    ];

    for (name, algorithm, precond) in runs {
        let start = Instant::now();
        let mut record = IterRecord::objectives();
        let recon = WaveletRecon::new(
            &ksp_under,
            &mps,
            (ncoils, nx, ny),
            Some(&coord),
            None,
            precond,
            WaveletReconParams {
                lamda,
                algorithm,
                max_iter,
                ..Default::default()
            },
        )?;
        recon.run(Some(&mut record))?;

        let final_obj = record.objective.last().copied().unwrap_or(f64::NAN);
        println!(
            "[INFO] {:<22} {} iters in {:>8.2?}, objective {:.6e}",
            name, max_iter, start.elapsed(), final_obj
        );
    }

    Ok(())
}
