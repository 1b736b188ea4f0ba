//! Register one NIfTI volume to another
//!
//! Usage: cargo run --release --example coreg_nifti -- <reference.nii> <source.nii> [mi|nmi|ecc] [out.nii]
//!
//! Prints the rigid parameters and, when an output path is given, writes the
//! source with its header moved into register with the reference.
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::error::Error;
use std::path::Path;
use std::time::Instant;

use coreg_core::nifti_io::{read_nifti_file, save_nifti_to_file};
use coreg_core::rigid::realigned_affine;
use coreg_core::{register_rigid_with_progress, CoregParams, CostFunction, Volume};
use flexi_logger::Logger;

fn main() -> Result<(), Box<dyn Error>> {
    let _logger = Logger::try_with_env_or_str("info")?.start()?;

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: {} <reference.nii> <source.nii> [mi|nmi|ecc] [out.nii]", args[0]);
        std::process::exit(2);
    }

    let mut params = CoregParams::default();
    if let Some(cost) = args.get(3) {
        params.cost_function = cost.parse::<CostFunction>()?;
    }

    let start = Instant::now();
    let reference = read_nifti_file(Path::new(&args[1]))?;
    let source = read_nifti_file(Path::new(&args[2]))?;
    println!(
        "[INFO] reference {:?} ({:.2?} mm), source {:?} ({:.2?} mm), loaded in {:.2?}",
        reference.dims,
        reference.voxel_size(),
        source.dims,
        source.voxel_size(),
        start.elapsed()
    );

    let start = Instant::now();
    let result = register_rigid_with_progress(&reference, &source, &params, |p| {
        println!("[INFO] level {}/{}: cost {:.6}, params {:?}", p.level, p.levels, p.cost, p.params);
    })?;
    println!("[INFO] {} finished in {:.2?}", params.cost_function, start.elapsed());

    let p = result.params;
    println!("translation (mm):   {:>9.4} {:>9.4} {:>9.4}", p[0], p[1], p[2]);
    println!("rotation (rad):     {:>9.5} {:>9.5} {:>9.5}", p[3], p[4], p[5]);
    println!("cost: {:.6}, converged: {}", result.cost, result.converged);

    if let Some(out) = args.get(4) {
        let realigned = Volume::new(source.data, source.dims, realigned_affine(&p, &source.affine))?;
        save_nifti_to_file(Path::new(out), &realigned)?;
        println!("[INFO] wrote {}", out);
    }

    Ok(())
}
