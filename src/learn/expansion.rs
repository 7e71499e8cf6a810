//! The expansion backend: Solver-E is loaded with the universal expansion of
//! the transition relation over all controllables, so a single SAT call
//! decides whether the adversary can leave the candidate region. Solver-C is
//! expanded over one uncontrollable input. If the expander exceeds its size
//! limit, the engine falls back to the non-expanded path.

use log::{debug, info};

use crate::cnf::{compress_state_cnf, Cnf, Lit};
use crate::encode::Problem;
use crate::expand::Expander;
use crate::sat::{SatResponse, SatSession};
use crate::vars::VarKind;

use super::{contains_init, extract_kind, LearnSynth};

/// Number of uncontrollable inputs expanded into Solver-C. Expansion there
/// is far more costly than for Solver-E, so low values are recommended.
const SOLVER_C_EXPANSIONS: usize = 1;

fn load_solver_e_plain(problem: &mut Problem, win: &Cnf) -> SatSession {
    let mut solver_e = SatSession::new();
    solver_e.set_min_cores(true);
    let mut leave_win = win.clone();
    leave_win.swap_present_next(&problem.vars);
    leave_win.negate(&mut problem.vars);
    leave_win.append(&problem.enc.trans);
    leave_win.append(win);
    solver_e.add_cnf(&leave_win);
    solver_e
}

fn load_solver_c_plain(problem: &Problem, win: &Cnf) -> SatSession {
    let mut solver_c = SatSession::new();
    solver_c.set_min_cores(true);
    let mut next_win = win.clone();
    next_win.swap_present_next(&problem.vars);
    solver_c.add_cnf(win);
    solver_c.add_cnf(&problem.enc.trans);
    solver_c.add_cnf(&next_win);
    solver_c
}

pub(super) fn run(ls: &mut LearnSynth, problem: &mut Problem) -> bool {
    let mut si = problem.vars.lits_of(VarKind::PresState);
    si.extend(problem.vars.lits_of(VarKind::Input));
    let c_lits = problem.vars.lits_of(VarKind::Ctrl);

    ls.win = problem.enc.safe.clone();
    let mut expander = Expander::new(
        &problem.enc,
        &problem.vars,
        ls.expansion_limit_kb,
        ls.cancel.clone(),
    );
    let mark = problem.vars.mark();

    // try to expand Solver-E over all controllables; degrade to the plain
    // encoding if the expansion exceeds the size limit
    let mut expanded = true;
    let mut solver_e = SatSession::new();
    solver_e.set_min_cores(true);
    if let Err(stop) = expander.load_solver_e(
        &ls.win,
        &problem.enc,
        &problem.vars,
        &mut solver_e,
        true,
    ) {
        info!("Expansion aborted ({:?}), using the non-expanded path", stop);
        expanded = false;
        solver_e = load_solver_e_plain(problem, &ls.win);
    }

    let mut solver_c;
    if expanded {
        solver_c = SatSession::new();
        solver_c.set_min_cores(true);
        expander.init_solver_c(&problem.enc, &problem.vars, SOLVER_C_EXPANSIONS, &mut solver_c);
        solver_c.add_cnf(&problem.enc.safe);
        let safe_clause = [Lit::negative(problem.vars.pres_error_var())];
        expander.add_exp_next_clause(&safe_clause, &mut solver_c);
    } else {
        solver_c = load_solver_c_plain(problem, &ls.win);
    }

    let mut precise = true;
    let mut clauses_added = 0;
    let mut rebuilds = 0;

    loop {
        ls.stats.iterations += 1;

        let state_input = match solver_e.model_or_core(&[], &[], &si) {
            SatResponse::Unsat(_) => {
                if precise {
                    problem.vars.release(mark);
                    return true;
                }
                ls.stats.restarts += 1;
                debug!(
                    "Restarting solver-E with a fresh winning region (iteration {})",
                    ls.stats.iterations
                );
                problem.vars.release(mark);
                compress_state_cnf(&mut ls.win, false);
                if expanded {
                    solver_e = SatSession::new();
                    solver_e.set_min_cores(true);
                    if let Err(stop) = expander.load_solver_e(
                        &ls.win,
                        &problem.enc,
                        &problem.vars,
                        &mut solver_e,
                        true,
                    ) {
                        info!(
                            "Expansion aborted on restart ({:?}), degrading to the non-expanded path",
                            stop
                        );
                        expanded = false;
                        solver_e = load_solver_e_plain(problem, &ls.win);
                        solver_c = load_solver_c_plain(problem, &ls.win);
                        clauses_added = ls.win.len();
                    }
                } else {
                    solver_e = load_solver_e_plain(problem, &ls.win);
                }
                precise = true;
                continue;
            }
            SatResponse::Sat(model) => model,
        };
        let state = extract_kind(&state_input, &problem.vars, VarKind::PresState);
        let input = extract_kind(&state_input, &problem.vars, VarKind::Input);

        match solver_c.model_or_core(&state, &input, &c_lits) {
            SatResponse::Unsat(core) => {
                if contains_init(&core, &problem.vars) {
                    problem.vars.release(mark);
                    return false;
                }
                let blocking: Vec<Lit> = core.iter().map(|&l| !l).collect();
                ls.win.add_clause_and_simplify(&blocking);
                solver_e.add_clause(&blocking);
                ls.stats.blocking_clauses += 1;

                if clauses_added > ls.win.len() + 100 {
                    if rebuilds % 1000 == 999 {
                        compress_state_cnf(&mut ls.win, true);
                    } else if rebuilds % 100 == 99 {
                        compress_state_cnf(&mut ls.win, false);
                    }
                    if expanded {
                        solver_c = SatSession::new();
                        solver_c.set_min_cores(true);
                        expander.reset_solver_c(&mut solver_c);
                        solver_c.add_cnf(&ls.win);
                        for clause in ls.win.clauses() {
                            expander.add_exp_next_clause(clause, &mut solver_c);
                        }
                    } else {
                        solver_c = load_solver_c_plain(problem, &ls.win);
                    }
                    clauses_added = ls.win.len();
                    rebuilds += 1;
                    ls.stats.rebuilds += 1;
                } else {
                    solver_c.add_clause(&blocking);
                    if expanded {
                        expander.add_exp_next_clause(&blocking, &mut solver_c);
                    } else {
                        let map = problem.vars.present_next_map();
                        let next_blocking: Vec<Lit> =
                            blocking.iter().map(|&l| l.apply(&map)).collect();
                        solver_c.add_clause(&next_blocking);
                    }
                    clauses_added += 1;
                }
                precise = false;
            }
            SatResponse::Sat(ctrl) => {
                if expanded {
                    // Solver-E is expanded over all controllables, so every
                    // candidate it produces is a true counterexample
                    unreachable!("candidate with a control response under full expansion");
                }
                ls.stats.refinements += 1;
                match solver_e.model_or_core(&state_input, &ctrl, &[]) {
                    SatResponse::Unsat(core) => solver_e.add_neg_cube_as_clause(&core),
                    SatResponse::Sat(_) => {
                        unreachable!("control response must refute the candidate")
                    }
                }
            }
        }
    }
}
