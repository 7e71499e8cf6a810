//! Options for the synthesis procedure.

use clap::{ArgEnum, Args, Parser};

use crate::extract::{ExtractionConfig, Incrementality};

/// Implement [`Display`](std::fmt::Display) with the information in
/// [`clap::ArgEnum`].
///
/// This ensures consistent names for parsing of the default argument.
macro_rules! arg_enum_display {
    ($t:ty) => {
        impl std::fmt::Display for $t {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                use clap::ArgEnum as _;
                let value = self.to_possible_value().expect("no skipped variants");
                write!(f, "{}", value.get_name())
            }
        }
    };
}

/// The back-end of the winning-region engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ArgEnum)]
pub enum Backend {
    /// The plain CEGAR fixpoint with unsat-core generalization.
    #[clap(name = "plain")]
    Plain,
    /// Reachability-refined generalization using a previous-step copy of
    /// the transition relation.
    #[clap(name = "reach")]
    Reach,
    /// Universal expansion of the controllables so a single SAT call
    /// decides whether the adversary can leave the candidate region.
    #[clap(name = "expand")]
    Expand,
    /// Extraction sets extended with transition-relation temporaries of
    /// suitable dependencies.
    #[clap(name = "dep")]
    Dep,
}
impl Default for Backend {
    fn default() -> Self {
        Self::Plain
    }
}
arg_enum_display!(Backend);

/// The method used to extract the controller circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ArgEnum)]
pub enum ExtractionMethod {
    /// Clause learning with fresh solver sessions per signal.
    #[clap(name = "learn")]
    Learn,
    /// Clause learning with implementations that may depend on transition
    /// temporaries and earlier signals.
    #[clap(name = "dep")]
    Dep,
    /// Clause learning sharing one pair of solver sessions across all
    /// signals via activation literals.
    #[clap(name = "inc")]
    Inc,
    /// Clause learning sharing a single solver session across all signals
    /// and both learning formulas.
    #[clap(name = "incfull")]
    IncFull,
}
impl Default for ExtractionMethod {
    fn default() -> Self {
        Self::Learn
    }
}
arg_enum_display!(ExtractionMethod);

/// The output format for the synthesized circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ArgEnum)]
pub enum OutputFormat {
    /// AIGER circuit in ASCII format.
    #[clap(name = "aag")]
    Aag,
    /// AIGER circuit in binary format.
    #[clap(name = "aig")]
    Aig,
}
impl Default for OutputFormat {
    fn default() -> Self {
        Self::Aag
    }
}
arg_enum_display!(OutputFormat);

/// The trace level / verbosity for the logging framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ArgEnum)]
pub enum TraceLevel {
    /// Turn logging off.
    #[clap(name = "off")]
    Off,
    /// Only print errors.
    #[clap(name = "error")]
    Error,
    /// Print errors and warnings.
    #[clap(name = "warn")]
    Warn,
    /// Print errors, warnings and useful information.
    #[clap(name = "info")]
    Info,
    /// Print errors, warnings, useful and debug information.
    #[clap(name = "debug")]
    Debug,
    /// Print all information, including very verbose output.
    #[clap(name = "trace")]
    Trace,
}
impl Default for TraceLevel {
    fn default() -> Self {
        Self::Error
    }
}
arg_enum_display!(TraceLevel);

impl From<TraceLevel> for log::LevelFilter {
    fn from(level: TraceLevel) -> Self {
        match level {
            TraceLevel::Off => Self::Off,
            TraceLevel::Error => Self::Error,
            TraceLevel::Warn => Self::Warn,
            TraceLevel::Info => Self::Info,
            TraceLevel::Debug => Self::Debug,
            TraceLevel::Trace => Self::Trace,
        }
    }
}

/// Options to control the synthesis procedure and the generation of the
/// controller circuit.
///
/// These options can be used with [`synthesize_with`](crate::synthesize_with).
///
/// # Examples
///
/// ```
/// use otus::options::*;
/// let options = SynthesisOptions {
///     backend: Backend::Expand,
///     extraction: ExtractionMethod::Dep,
///     second_pass: true,
///     ..SynthesisOptions::default()
/// };
/// ```
#[derive(Debug, Clone, Args)]
pub struct SynthesisOptions {
    /// Only check realizability of the specification.
    ///
    /// Setting this option to `true` results in an early return as soon as
    /// realizability is determined; no circuit is produced.
    #[clap(
        short = 'r',
        long = "realizability",
        help = "Only check realizability",
        display_order = 0
    )]
    pub only_realizability: bool,
    /// The back-end of the winning-region engine.
    #[clap(
        arg_enum,
        short = 'b',
        long = "backend",
        name = "backend",
        default_value_t,
        help = "Back-end for the winning region computation",
        display_order = 1
    )]
    pub backend: Backend,
    /// The extraction method for the controller circuit.
    #[clap(
        arg_enum,
        short = 'x',
        long = "extraction",
        name = "method",
        default_value_t,
        help = "Extraction method for the controller circuit",
        display_order = 2
    )]
    pub extraction: ExtractionMethod,
    /// Refine the extracted implementations in a second
    /// clause-minimization pass.
    #[clap(
        long = "second-pass",
        help = "Refine extracted implementations in a second pass",
        display_order = 3
    )]
    pub second_pass: bool,
    /// The number of portfolio workers for extraction; 1 runs sequentially.
    #[clap(
        short = 'p',
        long = "parallel",
        name = "workers",
        default_value_t = 1,
        help = "Number of parallel extraction workers",
        display_order = 4
    )]
    pub parallel: usize,
    /// The size limit for universal expansion, in kilobytes.
    #[clap(
        long = "expansion-limit",
        name = "kb",
        default_value_t = 1_048_576,
        help = "Size limit for universal expansion in kilobytes",
        display_order = 5
    )]
    pub expansion_limit_kb: u64,
    /// A path to an external AIG optimizer invoked on the controller
    /// circuit before it is inserted into the specification.
    #[clap(
        long = "optimizer",
        name = "path",
        help = "External AIG optimizer for the controller circuit",
        display_order = 6
    )]
    pub optimizer: Option<String>,
    /// The directory for temporary files of the external optimizer.
    #[clap(
        long = "temp-dir",
        name = "dir",
        help = "Directory for temporary files of the external optimizer",
        display_order = 7
    )]
    pub temp_dir: Option<String>,
    /// The output format for the synthesized circuit.
    #[clap(
        arg_enum,
        short = 'o',
        long = "output-format",
        name = "format",
        default_value_t,
        help = "Output format for the synthesized circuit",
        display_order = 8
    )]
    pub output_format: OutputFormat,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        SynthesisOptions {
            only_realizability: false,
            backend: Backend::default(),
            extraction: ExtractionMethod::default(),
            second_pass: false,
            parallel: 1,
            expansion_limit_kb: 1_048_576,
            optimizer: None,
            temp_dir: None,
            output_format: OutputFormat::default(),
        }
    }
}

impl SynthesisOptions {
    /// The extraction configuration selected by these options.
    pub fn extraction_config(&self) -> ExtractionConfig {
        let (dependency_mode, incremental) = match self.extraction {
            ExtractionMethod::Learn => (false, Incrementality::None),
            ExtractionMethod::Dep => (true, Incrementality::None),
            ExtractionMethod::Inc => (false, Incrementality::Signals),
            ExtractionMethod::IncFull => (false, Incrementality::Full),
        };
        ExtractionConfig {
            dependency_mode,
            incremental,
            second_pass: self.second_pass,
            min_cores: self.second_pass,
        }
    }
}

/// A group of options used for parsing the arguments of the command-line
/// interface.
///
/// This struct should mainly be used with [`clap`] and not instantiated
/// manually. For using this crate as a library, please use
/// [`SynthesisOptions`] directly instead. This struct only includes
/// additional fields for specifying input and output options.
#[derive(Debug, Clone, Parser)]
#[clap(version, about)]
pub struct CliOptions {
    /// The AIGER input file with the safety specification.
    #[clap(name = "INPUT", help = "AIGER input file with the safety specification")]
    pub input_file: String,
    /// The output file where the synthesized circuit should be written to.
    #[clap(
        short = 'O',
        long = "output-file",
        name = "file",
        help = "Write the synthesized circuit to the given file",
        display_order = 9
    )]
    pub output_file: Option<String>,
    /// The trace level to use for instantiating the logging framework.
    #[clap(
        arg_enum,
        short = 't',
        long = "trace",
        name = "trace-level",
        default_value_t,
        help = "Trace level",
        display_order = 10
    )]
    pub trace_level: TraceLevel,
    /// The set of options for the synthesis process.
    #[clap(flatten)]
    pub synthesis_options: SynthesisOptions,
}

impl From<&CliOptions> for SynthesisOptions {
    fn from(options: &CliOptions) -> Self {
        options.synthesis_options.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_enums_display_their_clap_names() {
        assert_eq!(Backend::Reach.to_string(), "reach");
        assert_eq!(ExtractionMethod::IncFull.to_string(), "incfull");
        assert_eq!(OutputFormat::Aag.to_string(), "aag");
        assert_eq!(TraceLevel::Debug.to_string(), "debug");
    }

    #[test]
    fn extraction_config_mapping() {
        let mut options = SynthesisOptions::default();
        options.extraction = ExtractionMethod::Dep;
        assert!(options.extraction_config().dependency_mode);
        options.extraction = ExtractionMethod::Inc;
        assert_eq!(
            options.extraction_config().incremental,
            Incrementality::Signals
        );
    }
}
