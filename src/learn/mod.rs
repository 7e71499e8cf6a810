//! The winning-region engine: a counterexample-guided fixpoint loop that
//! computes an inductive winning region using incremental SAT queries.

mod dep;
mod expansion;
mod plain;
mod reach;

use std::fmt;

use log::{debug, info};

use crate::cancel::CancelToken;
use crate::cnf::{identity_map, negate_via_learning, Cnf, Lit, Var};
use crate::encode::Problem;
use crate::options::{Backend, SynthesisOptions};
use crate::sat::{SatResponse, SatSession};
use crate::vars::{VarKind, VarStore};

/// Statistics of one winning-region computation.
#[derive(Debug, Default, Clone)]
pub struct LearnStats {
    /// Fixpoint iterations.
    pub iterations: u64,
    /// Solver-E restarts with a fresh winning-region copy.
    pub restarts: u64,
    /// Solver-C rebuilds due to accumulated learnt clauses.
    pub rebuilds: u64,
    /// Blocking clauses added to the winning region.
    pub blocking_clauses: u64,
    /// Candidate counterexamples refuted by the controller.
    pub refinements: u64,
}

impl fmt::Display for LearnStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "iterations: {}, restarts: {}, rebuilds: {}, blocking clauses: {}, refinements: {}",
            self.iterations, self.restarts, self.rebuilds, self.blocking_clauses, self.refinements
        )
    }
}

/// The previous-time-step shadow of the problem: a renaming of the current
/// step into fresh copies, used by the reachability-refined generalization.
pub(crate) struct PrevShadow {
    map: Vec<Lit>,
    state_is_initial: Lit,
    prev_trans_or_initial: Cnf,
    different_from_prev_or_initial: Cnf,
}

impl PrevShadow {
    /// Builds the shadow copies: fresh previous-state variables for the
    /// state, fresh temporaries for inputs, controls and transition
    /// temporaries, and the aliasing of next-state onto present-state.
    fn build(problem: &mut Problem) -> Self {
        let Problem { vars, enc } = problem;
        let s = vars.vars_of(VarKind::PresState).to_vec();
        let i = vars.vars_of(VarKind::Input).to_vec();
        let c = vars.vars_of(VarKind::Ctrl).to_vec();
        let n = vars.vars_of(VarKind::NextState).to_vec();
        let t = vars.vars_of(VarKind::Tmp).to_vec();

        let mut pairs: Vec<(Var, Lit)> = Vec::new();
        for &v in &s {
            pairs.push((v, Lit::positive(vars.fresh_prev())));
        }
        for &v in c.iter().chain(i.iter()).chain(t.iter()) {
            pairs.push((v, Lit::positive(vars.fresh_tmp())));
        }
        for (idx, &v) in n.iter().enumerate() {
            pairs.push((v, Lit::positive(s[idx])));
        }
        let state_is_initial = Lit::positive(vars.fresh_tmp());

        let mut map = identity_map(vars.max_var());
        for &(var, target) in &pairs {
            map[var as usize] = target;
        }

        // the previous-step transition relation, enabled unless the current
        // state is the initial one
        let mut prev_trans_or_initial = Cnf::new();
        for clause in enc.trans.clauses() {
            let mut lits: Vec<Lit> = clause.iter().map(|&l| l.apply(&map)).collect();
            lits.push(state_is_initial);
            prev_trans_or_initial.add_clause(&lits);
        }
        for &v in &s {
            prev_trans_or_initial.add_2lit(Lit::negative(v), !state_is_initial);
        }

        // the current state differs from its previous copy, or is initial
        let mut different_from_prev_or_initial = Cnf::new();
        let mut one_is_diff = vec![state_is_initial];
        for &v in &s {
            let diff = Lit::positive(vars.fresh_tmp());
            one_is_diff.push(diff);
            let curr = Lit::positive(v);
            let prev = curr.apply(&map);
            different_from_prev_or_initial.add_3lit(curr, prev, !diff);
            different_from_prev_or_initial.add_3lit(!curr, !prev, !diff);
        }
        different_from_prev_or_initial.add_clause(&one_is_diff);

        PrevShadow {
            map,
            state_is_initial,
            prev_trans_or_initial,
            different_from_prev_or_initial,
        }
    }

    /// Renames a current-step literal to its previous-step copy.
    pub(crate) fn prev_lit(&self, lit: Lit) -> Lit {
        lit.apply(&self.map)
    }

    /// Renames a cube or clause to the previous step.
    pub(crate) fn prev_lits(&self, lits: &[Lit]) -> Vec<Lit> {
        lits.iter().map(|&l| l.apply(&self.map)).collect()
    }

    /// Renames a CNF to the previous step.
    pub(crate) fn prev_cnf(&self, cnf: &Cnf) -> Cnf {
        let mut renamed = cnf.clone();
        renamed.rename_vars(&self.map);
        renamed
    }
}

/// Returns the literals of the cube whose variable has the given kind.
pub(crate) fn extract_kind(cube: &[Lit], vars: &VarStore, kind: VarKind) -> Vec<Lit> {
    cube.iter()
        .copied()
        .filter(|l| vars.kind(l.var()) == kind)
        .collect()
}

/// Returns whether the cube contains the initial all-zeros state, i.e. has
/// no positive present-state literal.
pub(crate) fn contains_init(cube: &[Lit], vars: &VarStore) -> bool {
    !cube
        .iter()
        .any(|l| l.is_positive() && vars.kind(l.var()) == VarKind::PresState)
}

/// The engine computing a monotonically shrinking winning region until it is
/// inductive.
pub struct LearnSynth {
    backend: Backend,
    expansion_limit_kb: u64,
    cancel: CancelToken,
    shadow: PrevShadow,
    win: Cnf,
    stats: LearnStats,
}

impl LearnSynth {
    /// Creates the engine and builds the previous-step shadow.
    pub fn new(problem: &mut Problem, options: &SynthesisOptions) -> Self {
        let shadow = PrevShadow::build(problem);
        LearnSynth {
            backend: options.backend,
            expansion_limit_kb: options.expansion_limit_kb,
            cancel: CancelToken::new(),
            shadow,
            win: Cnf::new(),
            stats: LearnStats::default(),
        }
    }

    /// Runs the fixpoint loop. Returns whether the specification is
    /// realizable; on success the winning region is available through
    /// [`LearnSynth::winning_region`].
    pub fn compute_winning_region(&mut self, problem: &mut Problem) -> bool {
        info!("Computing winning region with {} backend", self.backend);
        let realizable = match self.backend {
            Backend::Plain => plain::run(self, problem),
            Backend::Reach => reach::run(self, problem),
            Backend::Expand => expansion::run(self, problem),
            Backend::Dep => dep::run(self, problem),
        };
        debug!("Winning region stats: {}", self.stats);
        if realizable {
            info!(
                "Found a winning region with {} clauses",
                self.win.len()
            );
        }
        realizable
    }

    /// The current winning region.
    pub fn winning_region(&self) -> &Cnf {
        &self.win
    }

    /// Consumes the engine and returns the winning region.
    pub fn into_winning_region(self) -> Cnf {
        self.win
    }

    /// The statistics of the computation.
    pub fn stats(&self) -> &LearnStats {
        &self.stats
    }
}

/// Validates a winning region with SAT queries only: the initial state is
/// contained, every state is safe, and from every state the controller can
/// force the successor back into the region.
pub fn check_winning_region(problem: &mut Problem, win: &Cnf) -> bool {
    let Problem { vars, enc } = problem;

    let mut initial = SatSession::new();
    initial.add_cnf(win);
    initial.add_cnf(&enc.initial);
    if !initial.is_sat(&[]) {
        return false;
    }

    let mut safety = SatSession::new();
    safety.add_cnf(win);
    safety.add_cnf(&enc.unsafe_states);
    if safety.is_sat(&[]) {
        return false;
    }

    // induction: every counterexample candidate must have a response
    let mark = vars.mark();
    let neg_win = negate_via_learning(win, vars);
    let mut neg_next = neg_win;
    neg_next.swap_present_next(vars);

    let mut check = SatSession::new();
    check.add_cnf(win);
    check.add_cnf(&enc.trans);
    check.add_cnf(&neg_next);

    let mut respond = SatSession::new();
    respond.add_cnf(win);
    respond.add_cnf(&enc.trans);
    let mut next_win = win.clone();
    next_win.swap_present_next(vars);
    respond.add_cnf(&next_win);

    let mut si = vars.lits_of(VarKind::PresState);
    si.extend(vars.lits_of(VarKind::Input));

    let result = loop {
        let model = match check.model_or_core(&[], &[], &si) {
            SatResponse::Unsat(_) => break true,
            SatResponse::Sat(model) => model,
        };
        if !respond.is_sat(&model) {
            break false;
        }
        check.add_neg_cube_as_clause(&model);
    };
    vars.release(mark);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aig::{aiger_not, Aig};

    fn example() -> Problem {
        // next(x) = i & !c, error = x
        let mut aig = Aig::new();
        aig.add_input(2, Some("i".to_string()));
        aig.add_input(4, Some("controllable_c".to_string()));
        aig.add_latch(6, 8, Some("x".to_string()));
        aig.add_and(8, 2, aiger_not(4));
        aig.add_output(6, Some("err".to_string()));
        Problem::from_aig(&aig).unwrap()
    }

    #[test]
    fn initial_state_detection() {
        let problem = example();
        let vars = &problem.vars;
        let err = vars.pres_error_var();
        let latch = vars.vars_of(VarKind::PresState)[1];
        assert!(contains_init(&[Lit::negative(err)], vars));
        assert!(contains_init(&[], vars));
        assert!(!contains_init(
            &[Lit::negative(err), Lit::positive(latch)],
            vars
        ));
    }

    #[test]
    fn kind_extraction_splits_models() {
        let problem = example();
        let vars = &problem.vars;
        let err = Lit::negative(vars.pres_error_var());
        let input = Lit::positive(vars.vars_of(VarKind::Input)[0]);
        let cube = vec![err, input];
        assert_eq!(extract_kind(&cube, vars, VarKind::PresState), vec![err]);
        assert_eq!(extract_kind(&cube, vars, VarKind::Input), vec![input]);
        assert!(extract_kind(&cube, vars, VarKind::Ctrl).is_empty());
    }

    #[test]
    fn engine_finds_the_winning_region() {
        let mut problem = example();
        let options = crate::options::SynthesisOptions::default();
        let mut engine = LearnSynth::new(&mut problem, &options);
        assert!(engine.compute_winning_region(&mut problem));
        let win = engine.into_winning_region();
        assert!(check_winning_region(&mut problem, &win));
    }

    #[test]
    fn every_backend_agrees() {
        use crate::options::Backend;
        for &backend in &[Backend::Plain, Backend::Reach, Backend::Expand, Backend::Dep] {
            let mut problem = example();
            let mut options = crate::options::SynthesisOptions::default();
            options.backend = backend;
            let mut engine = LearnSynth::new(&mut problem, &options);
            assert!(
                engine.compute_winning_region(&mut problem),
                "backend {} disagrees",
                backend
            );
        }
    }
}
