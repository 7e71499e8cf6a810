//! Hand-off of the controller circuit to an external AIG optimizer.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use fs_err as fs;
use log::{info, warn};

use crate::aig::{Aig, AigerMode};

/// Runs the external optimizer on the controller circuit.
///
/// Temporary files are created in the given directory (or the system
/// temporary directory) with unique names and removed on success and
/// failure. Any failure of the external tool degrades to the unoptimized
/// circuit with a warning; it is never an error.
pub fn optimize(controller: &Aig, optimizer: &Path, temp_dir: Option<&Path>) -> Aig {
    match run_optimizer(controller, optimizer, temp_dir) {
        Ok(optimized) => {
            if optimized.num_ands() < controller.num_ands() {
                info!(
                    "External optimizer reduced the controller from {} to {} gates",
                    controller.num_ands(),
                    optimized.num_ands()
                );
                optimized
            } else {
                controller.clone()
            }
        }
        Err(error) => {
            warn!(
                "External optimizer failed ({}), keeping the unoptimized circuit",
                error
            );
            controller.clone()
        }
    }
}

fn run_optimizer(controller: &Aig, optimizer: &Path, temp_dir: Option<&Path>) -> io::Result<Aig> {
    let dir: PathBuf = match temp_dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::temp_dir(),
    };
    let mut input = tempfile::Builder::new()
        .prefix("otus-ctrl-")
        .suffix(".aag")
        .tempfile_in(&dir)?;
    controller.write(&mut input, AigerMode::Ascii)?;
    input.flush()?;
    let output = tempfile::Builder::new()
        .prefix("otus-opt-")
        .suffix(".aag")
        .tempfile_in(&dir)?;

    let status = Command::new(optimizer)
        .arg(input.path())
        .arg(output.path())
        .status()?;
    if !status.success() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("optimizer exited with {}", status),
        ));
    }

    let data = fs::read(output.path())?;
    let optimized = Aig::parse(&data)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    if optimized.inputs().len() != controller.inputs().len()
        || optimized.outputs().len() != controller.outputs().len()
    {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "optimizer changed the circuit interface",
        ));
    }
    Ok(optimized)
}
