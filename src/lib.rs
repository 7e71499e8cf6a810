//! Otus library crate for SAT-based synthesis of safety controllers from
//! AIGER specifications.
//!
//! The input is a sequential circuit with one designated error output and a
//! partition of the primary inputs into uncontrollable and controllable
//! signals. The synthesizer computes an inductive winning region with a
//! counterexample-guided fixpoint over incremental SAT queries and, if the
//! specification is realizable, extracts a combinational implementation of
//! the controllable signals that is inserted back into the circuit.

pub mod aig;
pub mod cancel;
pub mod cnf;
pub mod encode;
pub mod expand;
pub mod extract;
pub mod learn;
pub mod optimize;
pub mod options;
pub mod sat;
pub mod vars;

use std::fmt::{self, Display};
use std::io::{self, Write};
use std::path::Path;

use log::{debug, info};

use aig::{Aig, AigerError, AigerMode};
use cancel::CancelToken;
use encode::Problem;
use extract::{extract_controller, extract_parallel, insert_into_spec};
use learn::LearnSynth;
use options::SynthesisOptions;

/// The realizability status for a specification.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Status {
    /// The specification is realizable.
    Realizable,
    /// The specification is unrealizable.
    Unrealizable,
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Realizable => "REALIZABLE",
                Self::Unrealizable => "UNREALIZABLE",
            }
        )
    }
}

/// A synthesized controller as an aiger circuit: the original specification
/// with the controllable inputs turned into internal signals driven by new
/// AND gates.
pub struct AigerController {
    aig: Aig,
}

impl AigerController {
    fn new(aig: Aig) -> Self {
        Self { aig }
    }

    /// The combined circuit.
    pub fn aig(&self) -> &Aig {
        &self.aig
    }

    /// The number of AND gates of the combined circuit.
    pub fn size(&self) -> usize {
        self.aig.num_ands()
    }

    /// Writes the circuit to the given writer. The circuit is written in
    /// binary mode if the binary flag is true, and otherwise in ASCII mode.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs during the write operation.
    pub fn write<W: Write>(&self, writer: W, binary: bool) -> io::Result<()> {
        self.aig.write(
            writer,
            if binary {
                AigerMode::Binary
            } else {
                AigerMode::Ascii
            },
        )
    }
}

impl Display for AigerController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.aig)
    }
}

/// A result of the synthesis procedure.
pub struct SynthesisResult {
    /// The realizability status for the specification.
    status: Status,
    /// A controller circuit, if one has been produced.
    controller: Option<AigerController>,
}

impl SynthesisResult {
    /// Returns the realizability status for the specification in this
    /// result.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Returns the controller circuit in this result, if one has been
    /// produced.
    pub fn controller(&self) -> &Option<AigerController> {
        &self.controller
    }

    fn only_status(status: Status) -> Self {
        Self {
            status,
            controller: None,
        }
    }

    fn with_controller(status: Status, controller: AigerController) -> Self {
        Self {
            status,
            controller: Some(controller),
        }
    }
}

/// Synthesizes a controller for the given specification circuit.
///
/// This function uses the default values for [`SynthesisOptions`].
///
/// # Errors
///
/// Returns an error if the circuit is not a valid synthesis specification.
pub fn synthesize(aig: &Aig) -> Result<SynthesisResult, AigerError> {
    synthesize_with(aig, &SynthesisOptions::default())
}

/// Synthesizes a controller for the given specification circuit, using the
/// given synthesis options.
///
/// # Errors
///
/// Returns an error if the circuit is not a valid synthesis specification.
pub fn synthesize_with(
    aig: &Aig,
    options: &SynthesisOptions,
) -> Result<SynthesisResult, AigerError> {
    let mut problem = Problem::from_aig(aig)?;
    debug!("Problem: {}", problem.vars);

    info!("Starting to compute a winning region");
    let mut engine = LearnSynth::new(&mut problem, options);
    let realizable = engine.compute_winning_region(&mut problem);
    if !realizable {
        info!("The specification is unrealizable");
        return Ok(SynthesisResult::only_status(Status::Unrealizable));
    }
    info!("The specification is realizable");
    if options.only_realizability {
        return Ok(SynthesisResult::only_status(Status::Realizable));
    }

    let win = engine.into_winning_region();
    debug_assert!(
        learn::check_winning_region(&mut problem, &win),
        "winning region failed validation"
    );

    let controller = if options.parallel > 1 {
        extract_parallel(aig, &mut problem, &win, options.parallel)
    } else {
        None
    };
    let controller = match controller {
        Some(circuit) => circuit,
        None => extract_controller(
            aig,
            &mut problem,
            &win,
            options.extraction_config(),
            &CancelToken::new(),
        )
        .expect("sequential extraction cannot be cancelled"),
    };

    let controller = match &options.optimizer {
        Some(path) => optimize::optimize(
            &controller,
            Path::new(path),
            options.temp_dir.as_deref().map(Path::new),
        ),
        None => controller,
    };

    let combined = insert_into_spec(aig, &controller, &problem.vars);
    info!("Synthesis done");
    Ok(SynthesisResult::with_controller(
        Status::Realizable,
        AigerController::new(combined),
    ))
}
