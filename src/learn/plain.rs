//! The plain CEGAR backend: two incremental SAT sessions and unsat-core
//! generalization on both of them.

use log::debug;

use crate::cnf::{compress_state_cnf, Lit};
use crate::encode::Problem;
use crate::sat::{SatResponse, SatSession};
use crate::vars::VarKind;

use super::{contains_init, extract_kind, LearnSynth};

pub(super) fn run(ls: &mut LearnSynth, problem: &mut Problem) -> bool {
    let mut si = problem.vars.lits_of(VarKind::PresState);
    si.extend(problem.vars.lits_of(VarKind::Input));
    let c_lits = problem.vars.lits_of(VarKind::Ctrl);

    ls.win = problem.enc.safe.clone();
    let mark = problem.vars.mark();

    // Solver-E searches a transition from W to !G', where G is a lazy copy
    // of W that is refreshed only on restart
    let mut solver_e = SatSession::new();
    solver_e.set_min_cores(true);
    solver_e.add_cnf(&problem.enc.next_unsafe);
    solver_e.add_cnf(&problem.enc.trans);
    solver_e.add_cnf(&problem.enc.safe);

    // Solver-C searches a control response leading back into W
    let mut solver_c = SatSession::new();
    solver_c.set_min_cores(true);
    solver_c.add_cnf(&problem.enc.next_safe);
    solver_c.add_cnf(&problem.enc.trans);
    solver_c.add_cnf(&problem.enc.safe);

    let mut precise = true;
    let mut clauses_added = 0;
    let mut rebuilds = 0;

    loop {
        ls.stats.iterations += 1;

        let state_input = match solver_e.model_or_core(&[], &[], &si) {
            SatResponse::Unsat(_) => {
                if precise {
                    // G = W: the adversary cannot leave W, we are done
                    problem.vars.release(mark);
                    return true;
                }
                // G != W: reload Solver-E with a fresh copy of W
                ls.stats.restarts += 1;
                debug!(
                    "Restarting solver-E with a fresh winning region (iteration {})",
                    ls.stats.iterations
                );
                problem.vars.release(mark);
                compress_state_cnf(&mut ls.win, false);
                let mut leave_win = ls.win.clone();
                leave_win.swap_present_next(&problem.vars);
                leave_win.negate(&mut problem.vars);
                leave_win.append(&problem.enc.trans);
                leave_win.append(&ls.win);
                solver_e = SatSession::new();
                solver_e.set_min_cores(true);
                solver_e.add_cnf(&leave_win);
                precise = true;
                continue;
            }
            SatResponse::Sat(model) => model,
        };
        let state = extract_kind(&state_input, &problem.vars, VarKind::PresState);
        let input = extract_kind(&state_input, &problem.vars, VarKind::Input);

        match solver_c.model_or_core(&state, &input, &c_lits) {
            SatResponse::Unsat(core) => {
                // no response exists: the core is a set of states from which
                // this input forces the system out of W
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
                    solver_c = SatSession::new();
                    solver_c.set_min_cores(true);
                    let mut next_win = ls.win.clone();
                    next_win.swap_present_next(&problem.vars);
                    solver_c.add_cnf(&ls.win);
                    solver_c.add_cnf(&problem.enc.trans);
                    solver_c.add_cnf(&next_win);
                    clauses_added = ls.win.len();
                    rebuilds += 1;
                    ls.stats.rebuilds += 1;
                } else {
                    solver_c.add_clause(&blocking);
                    let map = problem.vars.present_next_map();
                    let next_blocking: Vec<Lit> =
                        blocking.iter().map(|&l| l.apply(&map)).collect();
                    solver_c.add_clause(&next_blocking);
                    clauses_added += 1;
                }
                precise = false;
            }
            SatResponse::Sat(ctrl) => {
                // this input is useless for the adversary; exclude the whole
                // set of situations in which the found response works
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
