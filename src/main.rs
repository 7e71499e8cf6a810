//! Otus binary crate.

use std::error::Error;
use std::io::{self, Write};
use std::process;

use clap::Parser;
use fs_err as fs;

use otus::aig::Aig;
use otus::options::{CliOptions, OutputFormat, SynthesisOptions, TraceLevel};
use otus::{synthesize_with, Status};

fn main() {
    match otus_main() {
        Ok(code) => process::exit(code),
        Err(error) => {
            // discard result as we cannot further propagate a write error
            let _ = writeln!(io::stderr(), "Error: {}", error);
            process::exit(1);
        }
    }
}

/// Initialize the logging framework with the given trace level.
///
/// # Errors
///
/// Returns an error if the logging framework has already been initialized.
fn initialize_logging(level: TraceLevel) -> io::Result<()> {
    env_logger::builder()
        .filter(None, level.into())
        .format_timestamp_millis()
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))
}

/// Main function that parses the options, reads the input, calls the
/// synthesis procedure and writes the output.
///
/// Returns the exit code: 0 for a realizable specification, 10 when a
/// circuit was also written, 20 for an unrealizable specification.
fn otus_main() -> Result<i32, Box<dyn Error>> {
    let options = CliOptions::parse();
    initialize_logging(options.trace_level)?;

    let data = fs::read(&options.input_file)?;
    let aig = Aig::parse(&data)?;

    let synthesis_options = SynthesisOptions::from(&options);
    let result = synthesize_with(&aig, &synthesis_options)?;

    writeln!(io::stdout(), "{}", result.status())?;
    match result.status() {
        Status::Unrealizable => Ok(20),
        Status::Realizable => {
            if let Some(controller) = result.controller() {
                let binary = synthesis_options.output_format == OutputFormat::Aig;
                if let Some(output_file) = &options.output_file {
                    let file = fs::File::create(output_file)?;
                    controller.write(file, binary)?;
                } else {
                    controller.write(io::stdout(), binary)?;
                }
                Ok(10)
            } else {
                Ok(0)
            }
        }
    }
}
