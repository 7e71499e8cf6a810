//! Circuit extraction: synthesizes each controllable signal as a
//! CNF-defined function via counterexample-guided clause learning, and
//! rewrites the result as an and-inverter graph fragment that is inserted
//! into the original circuit.

mod parallel;

pub use parallel::extract_parallel;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::{debug, info};

use crate::aig::{aiger_lit2var, aiger_not, Aig};
use crate::cancel::CancelToken;
use crate::cnf::{identity_map, negate_via_learning, Cnf, Lit, Var};
use crate::encode::{Encoding, Problem};
use crate::sat::{SatResponse, SatSession};
use crate::vars::{VarKind, VarStore};

/// How much solver state is shared across the per-signal learning loops.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Incrementality {
    /// Fresh sessions for every signal.
    None,
    /// One pair of sessions shared across all signals, with per-signal
    /// activation literals.
    Signals,
    /// A single session shared across all signals and across the two
    /// learning CNFs.
    Full,
}

/// Configuration record for the extraction strategy.
#[derive(Debug, Copy, Clone)]
pub struct ExtractionConfig {
    /// Allow implementations to depend on transition-relation temporaries
    /// and on earlier controllables.
    pub dependency_mode: bool,
    /// Solver sharing across learning loops.
    pub incremental: Incrementality,
    /// Refine the learned CNFs in a second clause-minimization pass.
    pub second_pass: bool,
    /// Minimize the generalization cores. Slower, but smaller circuits.
    pub min_cores: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        ExtractionConfig {
            dependency_mode: false,
            incremental: Incrementality::None,
            second_pass: false,
            min_cores: false,
        }
    }
}

/// Statistics of one extraction run.
#[derive(Debug, Default, Clone)]
pub struct ExtractStats {
    /// Signals synthesized.
    pub signals: u64,
    /// Clauses learned in the first pass.
    pub learned_clauses: u64,
    /// Clauses kept after the second pass.
    pub refined_clauses: u64,
}

impl fmt::Display for ExtractStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "signals: {}, learned clauses: {}, refined clauses: {}",
            self.signals, self.learned_clauses, self.refined_clauses
        )
    }
}

/// The solver sessions of the learning loop, shared according to the
/// configured incrementality.
struct LearnSessions {
    mode: Incrementality,
    check: SatSession,
    gen: SatSession,
}

impl LearnSessions {
    fn new(config: &ExtractionConfig) -> Self {
        let mut gen = SatSession::new();
        gen.set_min_cores(config.min_cores);
        let mut check = SatSession::new();
        if config.incremental == Incrementality::Full {
            check.set_min_cores(config.min_cores);
        }
        LearnSessions {
            mode: config.incremental,
            check,
            gen,
        }
    }

    /// Prepares the sessions for one signal. Returns the activation
    /// assumptions for the checking and the generalization queries.
    fn begin_signal(
        &mut self,
        config: &ExtractionConfig,
        must_be_0: &Cnf,
        must_be_1: &Cnf,
        next_free: &mut Var,
    ) -> (Vec<Lit>, Vec<Lit>) {
        match self.mode {
            Incrementality::None => {
                self.check = SatSession::new();
                self.check.add_cnf(must_be_0);
                self.gen = SatSession::new();
                self.gen.set_min_cores(config.min_cores);
                self.gen.add_cnf(must_be_1);
                (Vec::new(), Vec::new())
            }
            Incrementality::Signals | Incrementality::Full => {
                *next_free += 1;
                let act0 = Lit::positive(*next_free);
                *next_free += 1;
                let act1 = Lit::positive(*next_free);
                add_group(&mut self.check, must_be_0, act0);
                let gen = if self.mode == Incrementality::Full {
                    &mut self.check
                } else {
                    &mut self.gen
                };
                add_group(gen, must_be_1, act1);
                (vec![act0], vec![act1])
            }
        }
    }

    fn check(&mut self) -> &mut SatSession {
        &mut self.check
    }

    fn gen(&mut self) -> &mut SatSession {
        if self.mode == Incrementality::Full {
            &mut self.check
        } else {
            &mut self.gen
        }
    }

    /// Permanently retires the activation groups of the current signal.
    fn end_signal(&mut self, act0: &[Lit], act1: &[Lit]) {
        for &act in act0 {
            self.check.add_unit(!act);
        }
        for &act in act1 {
            self.gen().add_unit(!act);
        }
    }
}

/// Adds all clauses of a CNF under an activation literal: the clauses only
/// bind while the literal is assumed.
fn add_group(session: &mut SatSession, cnf: &Cnf, act: Lit) {
    for clause in cnf.clauses() {
        let mut lits = clause.to_vec();
        lits.push(!act);
        session.add_clause(&lits);
    }
}

/// Encodes `var_lit <-> implementation` for re-substitution into the
/// transition relation. The equivalence literal is added only to the final
/// disjunction of the structural negation, which works better for the
/// solver than adding it to every clause.
fn make_eq(var_lit: Lit, implementation: &Cnf, vars: &mut VarStore) -> Cnf {
    let mut result = Cnf::new();
    for clause in implementation.clauses() {
        let mut lits = clause.to_vec();
        lits.push(!var_lit);
        result.add_clause(&lits);
    }
    let mut negated = implementation.clone();
    negated.negate(vars);
    let total = negated.len();
    for (idx, clause) in negated.clauses().iter().enumerate() {
        if idx + 1 == total {
            let mut lits = clause.to_vec();
            lits.push(var_lit);
            result.add_clause(&lits);
        } else {
            result.add_clause(clause);
        }
    }
    result
}

/// The transitive variables an implementation depends on, through
/// transition temporaries and earlier signals.
fn solution_deps(
    solution: &Cnf,
    deps: &BTreeMap<Var, BTreeSet<Var>>,
    signal_deps: &BTreeMap<Var, BTreeSet<Var>>,
) -> BTreeSet<Var> {
    let mut set = BTreeSet::new();
    for var in solution.vars() {
        set.insert(var);
        if let Some(transitive) = deps.get(&var) {
            set.extend(transitive.iter().copied());
        }
        if let Some(earlier) = signal_deps.get(&var) {
            set.extend(earlier.iter().copied());
        }
    }
    set
}

/// Extracts a standalone controller circuit implementing every controllable
/// signal, given the winning region and its learned negation.
///
/// Returns `None` if the cancel token was raised.
pub fn extract_circuit(
    spec: &Aig,
    vars: &mut VarStore,
    enc: &Encoding,
    deps: &BTreeMap<Var, BTreeSet<Var>>,
    win: &Cnf,
    neg_win: &Cnf,
    config: ExtractionConfig,
    cancel: &CancelToken,
) -> Option<Aig> {
    let ctrl = vars.vars_of(VarKind::Ctrl).to_vec();
    let mut stats = ExtractStats::default();

    let mut trans = enc.trans.clone();
    let mut next_win = win.clone();
    next_win.swap_present_next(vars);
    let mut leave_win = neg_win.clone();
    leave_win.swap_present_next(vars);
    leave_win.append(win);

    let mut builder = AigBuilder::new(vars, enc);

    // base of dependable variables: states and uncontrollable inputs;
    // earlier signals enter through re-substitution
    let base_vars: Vec<Var> = vars
        .vars_of(VarKind::PresState)
        .iter()
        .chain(vars.vars_of(VarKind::Input).iter())
        .copied()
        .collect();
    let mut signal_deps: BTreeMap<Var, BTreeSet<Var>> = BTreeMap::new();

    let mut impls: Vec<Cnf> = Vec::new();
    let mut c_eq_impls: Vec<Cnf> = Vec::new();

    let mut sessions = LearnSessions::new(&config);
    let mut next_free: Var = vars.max_var();

    for (idx, &current) in ctrl.iter().enumerate() {
        // between signals
        if cancel.is_cancelled() {
            return None;
        }
        stats.signals += 1;

        let mut admissible = base_vars.clone();
        if config.dependency_mode {
            let unsynthesized: BTreeSet<Var> = ctrl[idx..].iter().copied().collect();
            for (&tmp, transitive) in deps {
                let clean = transitive.iter().all(|d| !unsynthesized.contains(d));
                if clean {
                    admissible.push(tmp);
                }
            }
            for &earlier in &ctrl[..idx] {
                let acyclic = signal_deps
                    .get(&earlier)
                    .map_or(true, |d| !d.contains(&current));
                if acyclic {
                    admissible.push(earlier);
                }
            }
        }
        admissible.sort_unstable();
        admissible.dedup();
        let admissible_set: BTreeSet<Var> = admissible.iter().copied().collect();
        let interest: Vec<Lit> = admissible.iter().map(|&v| Lit::positive(v)).collect();

        // rename everything that the implementation may not depend on
        if next_free < vars.max_var() {
            next_free = vars.max_var();
        }
        let mut rename = identity_map(vars.max_var());
        for var in 1..=vars.max_var() {
            if !admissible_set.contains(&var) {
                next_free += 1;
                rename[var as usize] = Lit::positive(next_free);
            }
        }

        // MustBe0: setting the signal high leaves W while setting it low
        // would not; MustBe1 is the symmetric formula
        let mut can_be_1 = trans.clone();
        can_be_1.set_var_value(current, true);
        can_be_1.append(&next_win);
        can_be_1.rename_vars(&rename);
        let mut must_be_1 = trans.clone();
        must_be_1.set_var_value(current, false);
        must_be_1.append(&leave_win);
        must_be_1.append(&can_be_1);
        must_be_1.set_var_value(vars.pres_error_var(), false);

        let mut can_be_0 = trans.clone();
        can_be_0.set_var_value(current, false);
        can_be_0.append(&next_win);
        can_be_0.rename_vars(&rename);
        let mut must_be_0 = trans.clone();
        must_be_0.set_var_value(current, true);
        must_be_0.append(&leave_win);
        must_be_0.append(&can_be_0);
        must_be_0.set_var_value(vars.pres_error_var(), false);

        let (act0, act1) = sessions.begin_signal(&config, &must_be_0, &must_be_1, &mut next_free);

        let mut solution = Cnf::new();
        loop {
            // before each SAT call
            if cancel.is_cancelled() {
                return None;
            }
            // a false positive: the signal is high although it must not be
            let false_pos = match sessions.check().model_or_core(&[], &act0, &interest) {
                SatResponse::Unsat(_) => break,
                SatResponse::Sat(model) => model,
            };
            // generalize to the largest set of situations in which setting
            // the signal low is allowed
            let core = match sessions.gen().model_or_core(&false_pos, &act1, &[]) {
                SatResponse::Unsat(core) => core,
                SatResponse::Sat(_) => {
                    unreachable!("false positive must be excluded with the signal low")
                }
            };
            solution.add_neg_cube_as_clause(&core);
            stats.learned_clauses += 1;
            let mut learned: Vec<Lit> = core.iter().map(|&l| !l).collect();
            for &act in &act0 {
                learned.push(!act);
            }
            sessions.check().add_clause(&learned);
        }
        sessions.end_signal(&act0, &act1);

        // re-substitution: later signals see this one as a fixed function
        let eq = make_eq(Lit::positive(current), &solution, vars);
        trans.append(&eq);
        let current_deps = solution_deps(&solution, deps, &signal_deps);
        signal_deps.insert(current, current_deps);

        if config.second_pass {
            impls.push(solution);
            c_eq_impls.push(eq);
        } else {
            builder.add_solution(vars, current, &solution);
        }
    }

    if config.second_pass {
        second_pass(
            vars,
            enc,
            &ctrl,
            &leave_win,
            &mut impls,
            &mut c_eq_impls,
            &mut builder,
            &mut stats,
            cancel,
        )?;
    }

    builder.insert_missing_ands(spec, vars, enc);
    debug!("Extraction stats: {}", stats);
    Some(builder.into_aig())
}

/// Rebuilds each implementation by repeatedly taking the smallest remaining
/// clause, negating it to a cube, and shrinking that cube against a session
/// in which all other signals are fixed.
#[allow(clippy::too_many_arguments)]
fn second_pass(
    vars: &mut VarStore,
    enc: &Encoding,
    ctrl: &[Var],
    leave_win: &Cnf,
    impls: &mut Vec<Cnf>,
    c_eq_impls: &mut Vec<Cnf>,
    builder: &mut AigBuilder,
    stats: &mut ExtractStats,
    cancel: &CancelToken,
) -> Option<()> {
    let mut neg_rel = leave_win.clone();
    neg_rel.append(&enc.trans);
    neg_rel.set_var_value(vars.pres_error_var(), false);

    for (idx, &current) in ctrl.iter().enumerate() {
        if cancel.is_cancelled() {
            return None;
        }
        let mut fixed = neg_rel.clone();
        for (other, eq) in c_eq_impls.iter().enumerate() {
            if other != idx {
                fixed.append(eq);
            }
        }
        let mut check = SatSession::new();
        check.add_cnf(&fixed);
        check.add_unit(Lit::positive(current));
        let mut gen = SatSession::new();
        gen.set_min_cores(true);
        gen.add_cnf(&fixed);
        gen.add_unit(Lit::negative(current));

        let mut solution = Cnf::new();
        let mut remaining = impls[idx].clone();
        while !remaining.is_empty() {
            if cancel.is_cancelled() {
                return None;
            }
            let clause = remaining.remove_smallest();
            let cube: Vec<Lit> = clause.iter().map(|&l| !l).collect();
            let core = match gen.model_or_core(&cube, &[], &[]) {
                SatResponse::Unsat(core) => core,
                SatResponse::Sat(_) => unreachable!("kept clause must remain justified"),
            };
            solution.add_neg_cube_as_clause(&core);
            check.add_neg_cube_as_clause(&core);
            stats.refined_clauses += 1;
            if !check.is_sat(&[]) {
                break;
            }
        }
        impls[idx] = solution.clone();
        builder.add_solution(vars, current, &solution);
        c_eq_impls[idx] = make_eq(Lit::positive(current), &solution, vars);
    }
    Some(())
}

/// Incrementally assembles the standalone controller circuit. Inputs are
/// the present-state variables and the uncontrollable inputs; each
/// controllable signal becomes one output.
struct AigBuilder {
    aig: Aig,
    cnf_to_aig: Vec<u32>,
}

const UNMAPPED: u32 = u32::MAX;

impl AigBuilder {
    fn new(vars: &VarStore, enc: &Encoding) -> Self {
        let mut aig = Aig::new();
        let mut cnf_to_aig = vec![UNMAPPED; vars.max_var() as usize + 1];
        cnf_to_aig[Lit::TRUE.var() as usize] = 1;
        for &sv in vars.vars_of(VarKind::PresState) {
            let lit = aig.new_lit();
            aig.add_input(lit, vars.info(sv).name.clone());
            cnf_to_aig[sv as usize] = lit;
        }
        for &iv in vars.vars_of(VarKind::Input) {
            let lit = aig.new_lit();
            aig.add_input(lit, vars.info(iv).name.clone());
            cnf_to_aig[iv as usize] = lit;
        }
        // reserve variables for the signals and the transition temporaries;
        // the latter are only defined when actually referenced
        for &cv in vars.vars_of(VarKind::Ctrl) {
            cnf_to_aig[cv as usize] = aig.new_lit();
        }
        for &tmp in enc.tmp_deps().keys() {
            if cnf_to_aig[tmp as usize] == UNMAPPED {
                cnf_to_aig[tmp as usize] = aig.new_lit();
            }
        }
        AigBuilder { aig, cnf_to_aig }
    }

    fn lit(&self, lit: Lit) -> u32 {
        let base = self.cnf_to_aig[lit.var() as usize];
        debug_assert_ne!(base, UNMAPPED, "unmapped variable in implementation");
        if lit.is_negative() {
            aiger_not(base)
        } else {
            base
        }
    }

    fn make_and(&mut self, in1: u32, in2: u32) -> u32 {
        let lit = self.aig.new_lit();
        self.aig.add_and(lit, in1, in2);
        lit
    }

    fn make_or(&mut self, in1: u32, in2: u32) -> u32 {
        let lit = self.aig.new_lit();
        self.aig.add_and(lit, aiger_not(in1), aiger_not(in2));
        aiger_not(lit)
    }

    /// Converts the CNF implementing a signal into AND-OR gates and declares
    /// the signal's reserved literal equal to the result.
    fn add_solution(&mut self, vars: &VarStore, ctrl: Var, solution: &Cnf) {
        let out = self.cnf_to_aig[ctrl as usize];
        let name = vars.info(ctrl).name.clone();
        if solution.is_empty() {
            self.aig.add_and(out, 1, 1);
        } else if solution.clauses().iter().any(|c| c.is_empty()) {
            self.aig.add_and(out, 0, 0);
        } else {
            let mut and_res = 0;
            for (idx, clause) in solution.clauses().iter().enumerate() {
                let mut or_res = self.lit(clause[0]);
                for &lit in clause.iter().skip(1) {
                    let mapped = self.lit(lit);
                    or_res = self.make_or(or_res, mapped);
                }
                and_res = if idx == 0 {
                    or_res
                } else {
                    self.make_and(and_res, or_res)
                };
            }
            self.aig.add_and(out, and_res, 1);
        }
        self.aig.add_output(out, name);
    }

    /// Copies the definitions of all referenced transition temporaries from
    /// the specification circuit, following the dependency map transitively.
    fn insert_missing_ands(&mut self, spec: &Aig, vars: &VarStore, enc: &Encoding) {
        let defined: BTreeSet<u32> = self
            .aig
            .ands()
            .iter()
            .map(|and| aiger_lit2var(and.lhs))
            .collect();
        let referenced: BTreeSet<u32> = self
            .aig
            .ands()
            .iter()
            .flat_map(|and| {
                vec![aiger_lit2var(and.rhs0), aiger_lit2var(and.rhs1)].into_iter()
            })
            .collect();

        let mut missing: BTreeSet<Var> = BTreeSet::new();
        let mut queue: Vec<Var> = Vec::new();
        for &tmp in enc.tmp_deps().keys() {
            if tmp == Lit::TRUE.var() {
                continue;
            }
            let aig_var = aiger_lit2var(self.cnf_to_aig[tmp as usize]);
            if referenced.contains(&aig_var) && !defined.contains(&aig_var) {
                missing.insert(tmp);
                queue.push(tmp);
            }
        }
        while let Some(tmp) = queue.pop() {
            if let Some(direct) = enc.tmp_deps().get(&tmp) {
                for &dep in direct {
                    if dep != Lit::TRUE.var()
                        && vars.kind(dep) == VarKind::Tmp
                        && enc.tmp_deps().contains_key(&dep)
                        && missing.insert(dep)
                    {
                        queue.push(dep);
                    }
                }
            }
        }

        for and in spec.ands() {
            let lhs = match vars.try_aig_to_cnf_lit(and.lhs) {
                Some(lit) => lit,
                None => continue,
            };
            if missing.contains(&lhs.var()) {
                let rhs0 = self.lit(vars.aig_to_cnf_lit(and.rhs0));
                let rhs1 = self.lit(vars.aig_to_cnf_lit(and.rhs1));
                let out = self.lit(lhs);
                self.aig.add_and(out, rhs0, rhs1);
            }
        }
    }

    fn into_aig(self) -> Aig {
        self.aig
    }
}

/// Merges the standalone controller circuit back into the specification:
/// the controllable inputs become internal signals defined by new AND
/// gates, preserving their variable indices.
pub fn insert_into_spec(spec: &Aig, controller: &Aig, vars: &VarStore) -> Aig {
    let mut result = spec.clone();

    // map controller literals into the combined circuit: inputs by
    // position, gates to fresh variables
    let mut map = vec![0u32; controller.maxvar() as usize + 1];
    let state_count = vars.vars_of(VarKind::PresState).len();
    for (pos, input) in controller.inputs().iter().enumerate() {
        let target = if pos < state_count {
            let sv = vars.vars_of(VarKind::PresState)[pos];
            let aig_lit = vars.info(sv).aig_lit;
            if aig_lit == 0 {
                // the synthetic error latch does not exist in the original
                // circuit; it is never referenced by the controller
                continue;
            }
            aig_lit
        } else {
            let iv = vars.vars_of(VarKind::Input)[pos - state_count];
            vars.info(iv).aig_lit
        };
        map[aiger_lit2var(input.lit) as usize] = target;
    }
    for and in controller.ands() {
        map[aiger_lit2var(and.lhs) as usize] = result.new_lit();
    }
    let ren = |map: &[u32], lit: u32| -> u32 {
        if lit <= 1 {
            lit
        } else {
            map[aiger_lit2var(lit) as usize] | (lit & 1)
        }
    };
    for and in controller.ands() {
        result.add_and(
            ren(&map, and.lhs),
            ren(&map, and.rhs0),
            ren(&map, and.rhs1),
        );
    }

    // redefine each controllable input by its synthesized function
    for (pos, &cv) in vars.vars_of(VarKind::Ctrl).iter().enumerate() {
        let ctrl_lit = vars.info(cv).aig_lit;
        let function = ren(&map, controller.outputs()[pos].lit);
        result.remove_input(ctrl_lit);
        result.add_and(ctrl_lit, function, 1);
    }
    result
}

/// Runs the configured extraction on a problem and merges the result into
/// the specification circuit.
pub fn extract_controller(
    spec: &Aig,
    problem: &mut Problem,
    win: &Cnf,
    config: ExtractionConfig,
    cancel: &CancelToken,
) -> Option<Aig> {
    let Problem { vars, enc } = problem;
    info!("Extracting a controller circuit");
    let neg_win = negate_via_learning(win, vars);
    enc.tmp_deps_trans(vars);
    let controller = extract_circuit(
        spec,
        vars,
        enc,
        enc.tmp_deps_trans_ref(),
        win,
        &neg_win,
        config,
        cancel,
    )?;
    Some(controller)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_eq_encodes_the_equivalence() {
        let mut vars = VarStore::new();
        let a = Lit::positive(vars.fresh_tmp());
        let b = Lit::positive(vars.fresh_tmp());
        let c = Lit::positive(vars.fresh_tmp());

        let mut implementation = Cnf::new();
        implementation.add_clause(&[a, b]);
        let eq = make_eq(c, &implementation, &mut vars);

        let mut session = SatSession::new();
        session.add_cnf(&eq);
        for bits in 0..8u32 {
            let assign = |lit: Lit, set: bool| if set { lit } else { !lit };
            let va = bits & 1 != 0;
            let vb = bits & 2 != 0;
            let vc = bits & 4 != 0;
            let assumps = vec![assign(a, va), assign(b, vb), assign(c, vc)];
            assert_eq!(session.is_sat(&assumps), vc == (va || vb));
        }
    }

    #[test]
    fn make_eq_handles_constant_implementations() {
        let mut vars = VarStore::new();
        let c = Lit::positive(vars.fresh_tmp());

        // the empty CNF is true
        let eq = make_eq(c, &Cnf::new(), &mut vars);
        let mut session = SatSession::new();
        session.add_cnf(&eq);
        assert!(session.is_sat(&[c]));
        assert!(!session.is_sat(&[!c]));

        // a CNF with an empty clause is false
        let mut falsum = Cnf::new();
        falsum.add_clause(&[]);
        let eq = make_eq(c, &falsum, &mut vars);
        let mut session = SatSession::new();
        session.add_cnf(&eq);
        assert!(session.is_sat(&[!c]));
        assert!(!session.is_sat(&[c]));
    }
}
