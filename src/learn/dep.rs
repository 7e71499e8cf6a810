//! The dependency backend: like the plain backend, but the model extraction
//! sets are extended with transition-relation temporaries whose transitive
//! dependencies are state-only, input-only, or state-and-input-only. Cores
//! over these richer sets generalize candidate refutations further.

use std::collections::BTreeSet;

use log::debug;

use crate::cnf::{compress_state_cnf, Lit, Var};
use crate::encode::Problem;
use crate::sat::{SatResponse, SatSession};
use crate::vars::VarKind;

use super::{contains_init, extract_kind, LearnSynth};

pub(super) fn run(ls: &mut LearnSynth, problem: &mut Problem) -> bool {
    let Problem { vars, enc } = problem;
    debug!(
        "Problem size: {} state vars, {} inputs, {} controllables",
        vars.vars_of(VarKind::PresState).len(),
        vars.vars_of(VarKind::Input).len(),
        vars.vars_of(VarKind::Ctrl).len()
    );

    let s = vars.vars_of(VarKind::PresState).to_vec();
    let i = vars.vars_of(VarKind::Input).to_vec();
    let c_lits = vars.lits_of(VarKind::Ctrl);

    // extend the extraction sets with temporaries of suitable dependencies
    let deps = enc.tmp_deps_trans(vars);
    let mut ext_si: Vec<Lit> = s.iter().chain(i.iter()).map(|&v| Lit::positive(v)).collect();
    let mut ext_i_vars: BTreeSet<Var> = i.iter().copied().collect();
    for (&tmp, dset) in deps {
        let only_si = dset
            .iter()
            .all(|&d| matches!(vars.kind(d), VarKind::PresState | VarKind::Input));
        let only_i = dset.iter().all(|&d| vars.kind(d) == VarKind::Input);
        if only_si {
            ext_si.push(Lit::positive(tmp));
        }
        if only_i {
            ext_i_vars.insert(tmp);
        }
    }

    ls.win = enc.safe.clone();
    let mark = vars.mark();

    let mut solver_e = SatSession::new();
    solver_e.set_min_cores(true);
    solver_e.add_cnf(&enc.next_unsafe);
    solver_e.add_cnf(&enc.trans);
    solver_e.add_cnf(&enc.safe);

    let mut solver_c = SatSession::new();
    solver_c.set_min_cores(true);
    solver_c.add_cnf(&enc.next_safe);
    solver_c.add_cnf(&enc.trans);
    solver_c.add_cnf(&enc.safe);

    let mut precise = true;
    let mut clauses_added = 0;
    let mut rebuilds = 0;

    loop {
        ls.stats.iterations += 1;

        let state_input = match solver_e.model_or_core(&[], &[], &ext_si) {
            SatResponse::Unsat(_) => {
                if precise {
                    vars.release(mark);
                    return true;
                }
                ls.stats.restarts += 1;
                debug!(
                    "Restarting solver-E with a fresh winning region (iteration {})",
                    ls.stats.iterations
                );
                vars.release(mark);
                compress_state_cnf(&mut ls.win, false);
                let mut leave_win = ls.win.clone();
                leave_win.swap_present_next(vars);
                leave_win.negate(vars);
                leave_win.append(&enc.trans);
                leave_win.append(&ls.win);
                solver_e = SatSession::new();
                solver_e.set_min_cores(true);
                solver_e.add_cnf(&leave_win);
                precise = true;
                continue;
            }
            SatResponse::Sat(model) => model,
        };
        // the core block for Solver-C stays over pure state variables; the
        // input-like temporaries travel in the auxiliary assumptions
        let state = extract_kind(&state_input, vars, VarKind::PresState);
        let input: Vec<Lit> = state_input
            .iter()
            .copied()
            .filter(|l| ext_i_vars.contains(&l.var()))
            .collect();

        match solver_c.model_or_core(&state, &input, &c_lits) {
            SatResponse::Unsat(core) => {
                if contains_init(&core, vars) {
                    vars.release(mark);
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
                    solver_c = SatSession::new();
                    solver_c.set_min_cores(true);
                    let mut next_win = ls.win.clone();
                    next_win.swap_present_next(vars);
                    solver_c.add_cnf(&ls.win);
                    solver_c.add_cnf(&enc.trans);
                    solver_c.add_cnf(&next_win);
                    clauses_added = ls.win.len();
                    rebuilds += 1;
                    ls.stats.rebuilds += 1;
                } else {
                    solver_c.add_clause(&blocking);
                    let map = vars.present_next_map();
                    let next_blocking: Vec<Lit> =
                        blocking.iter().map(|&l| l.apply(&map)).collect();
                    solver_c.add_clause(&next_blocking);
                    clauses_added += 1;
                }
                precise = false;
            }
            SatResponse::Sat(ctrl) => {
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
