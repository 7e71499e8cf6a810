//! Integration tests that verify synthesized circuits by exhaustive model
//! checking against an independent game-solving oracle.

use std::collections::BTreeSet;

use otus::aig::Aig;
use otus::encode::Problem;
use otus::learn::{check_winning_region, LearnSynth};
use otus::options::*;
use otus::{
    synthesize_with,
    Status::{self, Realizable, Unrealizable},
};

/// No latches, one uncontrollable input `i`, error = `i`. The adversary
/// raises the error immediately.
const INPUT_ERROR: &str = "aag 1 1 0 1 0\n2\n2\ni0 i\n";

/// No latches, one controllable input `c`, error = `c`. The controller
/// holds the signal low.
const CTRL_ERROR: &str = "aag 1 1 0 1 0\n2\n2\ni0 controllable_c\n";

/// One latch `x` loading `c`, error = `x`.
const LATCHED_CTRL: &str = "aag 2 1 1 1 0\n2\n4 2\n4\ni0 controllable_c\nl0 x\n";

/// One latch `x` loading `i & !c`, error = `x`. The controller mirrors the
/// input.
const MASKED_INPUT: &str =
    "aag 4 2 1 1 1\n2\n4\n6 8\n6\n8 2 5\ni0 i\ni1 controllable_c\nl0 x\n";

/// A one-bit buffer: the adversary injects into stage 0, the controller
/// decides whether stage 1 latches the error. Needs a one-step-delay
/// controller and at least two fixpoint iterations.
const BUFFER: &str =
    "aag 5 2 2 1 1\n2\n4\n6 2\n8 10\n8\n10 6 5\ni0 i\ni1 controllable_c\nl0 x0\nl1 x1\n";

/// A three-latch countdown with an escape condition the controller cannot
/// falsify: every controller deadlocks.
const ESCAPE_ROOM: &str = "aag 7 2 3 1 2\n2\n4\n6 1\n8 6\n10 14\n10\n12 3 5\n14 8 13\n\
                           i0 i\ni1 controllable_c\nl0 x0\nl1 x1\nl2 x2\n";

fn parse(spec: &str) -> Aig {
    Aig::parse(spec.as_bytes()).expect("scenario must parse")
}

/// Decides the safety game by exhaustive backward induction: returns
/// whether the adversary can force the error output to 1 from the initial
/// state. Used as an independent oracle for the engine's verdicts.
fn adversary_wins(aig: &Aig) -> bool {
    let num_latches = aig.latches().len();
    assert!(num_latches <= 12, "oracle only handles small state spaces");
    let controllable: BTreeSet<usize> = aig.controllable_inputs().into_iter().collect();
    let uncontrollable: Vec<usize> = (0..aig.inputs().len())
        .filter(|idx| !controllable.contains(idx))
        .collect();
    let controllable: Vec<usize> = controllable.into_iter().collect();

    let num_states = 1usize << num_latches;
    let decode = |code: usize| -> Vec<bool> {
        (0..num_latches).map(|bit| code & (1 << bit) != 0).collect()
    };
    let encode = |state: &[bool]| -> usize {
        state
            .iter()
            .enumerate()
            .fold(0, |acc, (bit, &v)| if v { acc | (1 << bit) } else { acc })
    };

    let mut losing = vec![false; num_states];
    loop {
        let mut changed = false;
        for code in 0..num_states {
            if losing[code] {
                continue;
            }
            let state = decode(code);
            let mut adversary_can_force = false;
            for in_bits in 0..(1usize << uncontrollable.len()) {
                let mut all_ctrl_lose = true;
                for ctrl_bits in 0..(1usize << controllable.len()) {
                    let mut inputs = vec![false; aig.inputs().len()];
                    for (bit, &idx) in uncontrollable.iter().enumerate() {
                        inputs[idx] = in_bits & (1 << bit) != 0;
                    }
                    for (bit, &idx) in controllable.iter().enumerate() {
                        inputs[idx] = ctrl_bits & (1 << bit) != 0;
                    }
                    let (outputs, next) = aig.step(&state, &inputs);
                    if !outputs[0] && !losing[encode(&next)] {
                        all_ctrl_lose = false;
                        break;
                    }
                }
                if all_ctrl_lose {
                    adversary_can_force = true;
                    break;
                }
            }
            if adversary_can_force {
                losing[code] = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    losing[0]
}

/// Exhaustively model-checks the synthesized circuit: no reachable state
/// under any adversary input sequence may raise the error output.
fn assert_no_reachable_error(combined: &Aig) {
    let num_latches = combined.latches().len();
    let num_inputs = combined.inputs().len();
    let mut visited: BTreeSet<Vec<bool>> = BTreeSet::new();
    let mut queue = vec![vec![false; num_latches]];
    visited.insert(queue[0].clone());
    while let Some(state) = queue.pop() {
        for in_bits in 0..(1usize << num_inputs) {
            let inputs: Vec<bool> = (0..num_inputs).map(|bit| in_bits & (1 << bit) != 0).collect();
            let (outputs, next) = combined.step(&state, &inputs);
            assert!(
                !outputs[0],
                "error raised in state {:?} under inputs {:?}",
                state, inputs
            );
            if visited.insert(next.clone()) {
                queue.push(next);
            }
        }
    }
}

fn verify_realizability_with(spec: &str, expected: Status, options: &SynthesisOptions) {
    let aig = parse(spec);
    let result = synthesize_with(&aig, options).expect("synthesis must not fail");
    assert_eq!(result.status(), expected);
}

fn verify_synthesis_with(spec: &str, expected: Status, options: &SynthesisOptions) {
    let aig = parse(spec);
    assert_eq!(
        adversary_wins(&aig),
        expected == Unrealizable,
        "oracle disagrees with the scenario expectation"
    );
    let result = synthesize_with(&aig, options).expect("synthesis must not fail");
    assert_eq!(result.status(), expected);
    if expected == Realizable {
        let controller = result
            .controller()
            .as_ref()
            .expect("no circuit produced for a realizable specification");
        // the controllable inputs have become internal signals
        assert_eq!(
            controller.aig().controllable_inputs(),
            Vec::<usize>::new()
        );
        assert_no_reachable_error(controller.aig());
    } else {
        assert!(result.controller().is_none());
    }
}

fn verify_winning_region_with(spec: &str, expected: Status, options: &SynthesisOptions) {
    let aig = parse(spec);
    let mut problem = Problem::from_aig(&aig).unwrap();
    let mut engine = LearnSynth::new(&mut problem, options);
    let realizable = engine.compute_winning_region(&mut problem);
    assert_eq!(realizable, expected == Realizable);
    if realizable {
        let win = engine.into_winning_region();
        assert!(
            check_winning_region(&mut problem, &win),
            "winning region violates its invariants"
        );
    }
}

/// Generate tests for the given list of scenarios, testing realizability,
/// full synthesis with model checking, and the winning-region invariants.
macro_rules! synt_tests {
    ($($name:ident: ($spec:expr, $expected:expr),)*) => {
        mod realizability {
            use super::*;
            $(
                #[test]
                fn $name() {
                    let options = SynthesisOptions {
                        only_realizability: true,
                        ..SynthesisOptions::default()
                    };
                    verify_realizability_with($spec, $expected, &options);
                }
            )*
        }

        mod synthesis {
            use super::*;
            $(
                #[test]
                fn $name() {
                    verify_synthesis_with($spec, $expected, &SynthesisOptions::default());
                }
            )*
        }

        mod winning_region {
            use super::*;
            $(
                #[test]
                fn $name() {
                    verify_winning_region_with($spec, $expected, &SynthesisOptions::default());
                }
            )*
        }
    }
}

/// Generate tests for the given list of scenarios, testing synthesis with
/// various synthesis options. Generally, only one option is changed and the
/// remaining ones are set to their defaults.
macro_rules! option_tests {
    ($($name:ident: ($spec:expr, $expected:expr),)*) => {
        mod backend_plain {
            use super::*;
            $(
                #[test]
                fn $name() {
                    let options = SynthesisOptions {
                        backend: Backend::Plain,
                        ..SynthesisOptions::default()
                    };
                    verify_synthesis_with($spec, $expected, &options);
                }
            )*
        }
        mod backend_reach {
            use super::*;
            $(
                #[test]
                fn $name() {
                    let options = SynthesisOptions {
                        backend: Backend::Reach,
                        ..SynthesisOptions::default()
                    };
                    verify_synthesis_with($spec, $expected, &options);
                }
            )*
        }
        mod backend_expand {
            use super::*;
            $(
                #[test]
                fn $name() {
                    let options = SynthesisOptions {
                        backend: Backend::Expand,
                        ..SynthesisOptions::default()
                    };
                    verify_synthesis_with($spec, $expected, &options);
                }
            )*
        }
        mod backend_dep {
            use super::*;
            $(
                #[test]
                fn $name() {
                    let options = SynthesisOptions {
                        backend: Backend::Dep,
                        ..SynthesisOptions::default()
                    };
                    verify_synthesis_with($spec, $expected, &options);
                }
            )*
        }
        mod extraction_dep {
            use super::*;
            $(
                #[test]
                fn $name() {
                    let options = SynthesisOptions {
                        extraction: ExtractionMethod::Dep,
                        ..SynthesisOptions::default()
                    };
                    verify_synthesis_with($spec, $expected, &options);
                }
            )*
        }
        mod extraction_inc {
            use super::*;
            $(
                #[test]
                fn $name() {
                    let options = SynthesisOptions {
                        extraction: ExtractionMethod::Inc,
                        ..SynthesisOptions::default()
                    };
                    verify_synthesis_with($spec, $expected, &options);
                }
            )*
        }
        mod extraction_incfull {
            use super::*;
            $(
                #[test]
                fn $name() {
                    let options = SynthesisOptions {
                        extraction: ExtractionMethod::IncFull,
                        ..SynthesisOptions::default()
                    };
                    verify_synthesis_with($spec, $expected, &options);
                }
            )*
        }
        mod extraction_second_pass {
            use super::*;
            $(
                #[test]
                fn $name() {
                    let options = SynthesisOptions {
                        second_pass: true,
                        ..SynthesisOptions::default()
                    };
                    verify_synthesis_with($spec, $expected, &options);
                }
            )*
        }
        mod extraction_portfolio {
            use super::*;
            $(
                #[test]
                fn $name() {
                    let options = SynthesisOptions {
                        parallel: 3,
                        ..SynthesisOptions::default()
                    };
                    verify_synthesis_with($spec, $expected, &options);
                }
            )*
        }
        mod output_binary {
            use super::*;
            $(
                #[test]
                fn $name() {
                    let options = SynthesisOptions {
                        output_format: OutputFormat::Aig,
                        ..SynthesisOptions::default()
                    };
                    verify_synthesis_with($spec, $expected, &options);
                }
            )*
        }
    }
}

synt_tests! {
    input_error: (INPUT_ERROR, Unrealizable),
    ctrl_error: (CTRL_ERROR, Realizable),
    latched_ctrl: (LATCHED_CTRL, Realizable),
    masked_input: (MASKED_INPUT, Realizable),
    buffer: (BUFFER, Realizable),
    escape_room: (ESCAPE_ROOM, Unrealizable),
}

option_tests! {
    ctrl_error: (CTRL_ERROR, Realizable),
    masked_input: (MASKED_INPUT, Realizable),
    buffer: (BUFFER, Realizable),
    escape_room: (ESCAPE_ROOM, Unrealizable),
}

#[test]
fn buffer_needs_multiple_fixpoint_iterations() {
    let aig = parse(BUFFER);
    let mut problem = Problem::from_aig(&aig).unwrap();
    let options = SynthesisOptions::default();
    let mut engine = LearnSynth::new(&mut problem, &options);
    assert!(engine.compute_winning_region(&mut problem));
    assert!(engine.stats().iterations >= 2);
    assert!(engine.stats().blocking_clauses >= 1);
}

#[test]
fn latched_ctrl_winning_region_keeps_the_latch_low() {
    let aig = parse(LATCHED_CTRL);
    let mut problem = Problem::from_aig(&aig).unwrap();
    let options = SynthesisOptions::default();
    let mut engine = LearnSynth::new(&mut problem, &options);
    assert!(engine.compute_winning_region(&mut problem));
    // W = {err = 0, x = 0}: no state with the latch set remains
    let win = engine.winning_region();
    let latch = otus::cnf::Lit::positive(
        problem.vars.vars_of(otus::vars::VarKind::PresState)[1],
    );
    assert!(win.contains(!latch));
}

#[test]
fn roundtrip_through_written_output() {
    let aig = parse(MASKED_INPUT);
    let result = synthesize_with(&aig, &SynthesisOptions::default()).unwrap();
    let controller = result.controller().as_ref().unwrap();
    let mut ascii = Vec::new();
    controller.write(&mut ascii, false).unwrap();
    let reparsed = Aig::parse(&ascii).unwrap();
    assert_no_reachable_error(&reparsed);
    let mut binary = Vec::new();
    controller.write(&mut binary, true).unwrap();
    let reparsed = Aig::parse(&binary).unwrap();
    assert_no_reachable_error(&reparsed);
}

#[test]
fn rejects_multiple_outputs() {
    let spec = "aag 1 1 0 2 0\n2\n2\n3\n";
    let aig = Aig::parse(spec.as_bytes()).unwrap();
    assert!(synthesize_with(&aig, &SynthesisOptions::default()).is_err());
}
