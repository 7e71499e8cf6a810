//! The reachability-refined backend: after an unsat core is obtained from
//! Solver-C, a third session with a previous-step premise (the state is
//! reachable in one step from a different winning state, or is initial) is
//! used to drop further literals from the core, yielding strictly smaller
//! blocking clauses.

use log::debug;

use crate::cnf::{compress_state_cnf, Cnf, Lit, Var};
use crate::encode::Problem;
use crate::sat::{SatResponse, SatSession};
use crate::vars::VarKind;

use super::{contains_init, extract_kind, LearnSynth, PrevShadow};

/// Loads the inductive session `(I ∨ (T* ∧ W*)) ∧ W ∧ T ∧ W'`, where starred
/// copies refer to the previous-step shadow. Before the first blocking
/// clause exists, `W` is just the safe set.
fn load_ind(problem: &Problem, shadow: &PrevShadow, win: &Cnf, with_win: bool) -> SatSession {
    let mut ind = SatSession::new();
    if with_win {
        ind.add_cnf(win);
        let mut next_win = win.clone();
        next_win.swap_present_next(&problem.vars);
        ind.add_cnf(&next_win);
        ind.add_cnf(&shadow.prev_cnf(win));
    } else {
        ind.add_cnf(&problem.enc.safe);
        ind.add_cnf(&problem.enc.next_safe);
    }
    ind.add_cnf(&problem.enc.trans);
    ind.add_cnf(&shadow.prev_trans_or_initial);
    ind.add_cnf(&shadow.different_from_prev_or_initial);
    ind.add_unit(!shadow.prev_lit(Lit::positive(problem.vars.pres_error_var())));
    ind
}

/// Adds the activation clauses that let a previous-step copy of an arbitrary
/// state cube be selected purely through assumptions: per state bit,
/// `unused` deactivates the bit and `neg` selects the polarity the previous
/// state has to differ from.
fn add_px_clauses(
    ind: &mut SatSession,
    shadow: &PrevShadow,
    s_vars: &[Var],
    px_unused: &[Lit],
    px_neg: &[Lit],
    px_act: &[Lit],
) {
    let mut act_clause = px_act.to_vec();
    act_clause.push(shadow.state_is_initial);
    ind.add_clause(&act_clause);
    for (idx, &sv) in s_vars.iter().enumerate() {
        let prev = shadow.prev_lit(Lit::positive(sv));
        ind.add_2lit(!px_unused[idx], !px_act[idx]);
        ind.add_4lit(px_unused[idx], px_neg[idx], prev, !px_act[idx]);
        ind.add_4lit(px_unused[idx], px_neg[idx], !prev, px_act[idx]);
        ind.add_4lit(px_unused[idx], !px_neg[idx], prev, px_act[idx]);
        ind.add_4lit(px_unused[idx], !px_neg[idx], !prev, !px_act[idx]);
    }
}

pub(super) fn run(ls: &mut LearnSynth, problem: &mut Problem) -> bool {
    let s_vars = problem.vars.vars_of(VarKind::PresState).to_vec();
    let mut si = problem.vars.lits_of(VarKind::PresState);
    si.extend(problem.vars.lits_of(VarKind::Input));
    let c_lits = problem.vars.lits_of(VarKind::Ctrl);

    ls.win = problem.enc.safe.clone();

    // activation triples encoding the previous-step copy of a candidate
    // cube purely through assumptions
    let mut px_unused = Vec::with_capacity(s_vars.len());
    let mut px_neg = Vec::with_capacity(s_vars.len());
    let mut px_act = Vec::with_capacity(s_vars.len());
    for _ in &s_vars {
        px_unused.push(Lit::positive(problem.vars.fresh_prev()));
        px_neg.push(Lit::positive(problem.vars.fresh_prev()));
        px_act.push(Lit::positive(problem.vars.fresh_prev()));
    }
    let mark = problem.vars.mark();

    let mut solver_e = SatSession::new();
    solver_e.set_min_cores(true);
    solver_e.add_cnf(&problem.enc.next_unsafe);
    solver_e.add_cnf(&problem.enc.trans);
    solver_e.add_cnf(&problem.enc.safe);

    // cores from Solver-C are minimized against the reachability premise
    // anyway, so plain minimization is turned off here
    let mut solver_c = SatSession::new();
    solver_c.set_min_cores(false);
    solver_c.add_cnf(&problem.enc.next_safe);
    solver_c.add_cnf(&problem.enc.trans);
    solver_c.add_cnf(&problem.enc.safe);

    let mut solver_c_ind = load_ind(problem, &ls.shadow, &ls.win, false);
    add_px_clauses(
        &mut solver_c_ind,
        &ls.shadow,
        &s_vars,
        &px_unused,
        &px_neg,
        &px_act,
    );

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
                // minimize the core further using reachability information
                let mut core = core;
                let mut changed = true;
                while changed {
                    changed = false;
                    // the current core is already a sound blocking clause,
                    // so the refinement may use it immediately
                    let blocking: Vec<Lit> = core.iter().map(|&l| !l).collect();
                    solver_c_ind.add_clause(&blocking);
                    let map = problem.vars.present_next_map();
                    let next_blocking: Vec<Lit> =
                        blocking.iter().map(|&l| l.apply(&map)).collect();
                    solver_c_ind.add_clause(&next_blocking);
                    solver_c_ind.add_clause(&ls.shadow.prev_lits(&blocking));

                    let snapshot = core.clone();
                    for &lit in &snapshot {
                        if !core.contains(&lit) {
                            continue;
                        }
                        let tmp: Vec<Lit> =
                            core.iter().copied().filter(|&l| l != lit).collect();
                        // literals of the initial state are never dropped
                        if contains_init(&tmp, &problem.vars) {
                            continue;
                        }
                        let mut assumps = input.clone();
                        assumps.extend_from_slice(&tmp);
                        for (idx, &sv) in s_vars.iter().enumerate() {
                            if tmp.contains(&Lit::positive(sv)) {
                                assumps.push(px_neg[idx]);
                            } else if tmp.contains(&Lit::negative(sv)) {
                                assumps.push(!px_neg[idx]);
                            } else {
                                assumps.push(px_unused[idx]);
                            }
                        }
                        if !solver_c_ind.is_sat(&assumps) {
                            core = tmp;
                            changed = true;
                        }
                    }
                }

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
                    solver_c.set_min_cores(false);
                    let mut next_win = ls.win.clone();
                    next_win.swap_present_next(&problem.vars);
                    solver_c.add_cnf(&ls.win);
                    solver_c.add_cnf(&problem.enc.trans);
                    solver_c.add_cnf(&next_win);

                    solver_c_ind = load_ind(problem, &ls.shadow, &ls.win, true);
                    add_px_clauses(
                        &mut solver_c_ind,
                        &ls.shadow,
                        &s_vars,
                        &px_unused,
                        &px_neg,
                        &px_act,
                    );
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
