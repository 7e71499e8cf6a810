//! Bridge from and-inverter graphs to the CNF formulas of the synthesis
//! problem.

use std::collections::{BTreeMap, BTreeSet};

use fixedbitset::FixedBitSet;

use crate::aig::{aiger_not, Aig, AigerError};
use crate::cnf::{Cnf, Lit, Var};
use crate::vars::{VarKind, VarStore};

/// A synthesis problem: the variable registry together with the CNF
/// encodings derived from the specification circuit.
#[derive(Debug)]
pub struct Problem {
    /// The variable registry.
    pub vars: VarStore,
    /// The CNF encodings.
    pub enc: Encoding,
}

impl Problem {
    /// Builds the problem encoding from a specification circuit.
    ///
    /// # Errors
    ///
    /// Returns an error if the circuit is not a valid synthesis
    /// specification.
    pub fn from_aig(aig: &Aig) -> Result<Self, AigerError> {
        aig.check_synthesis_input()?;
        let refs = referenced_literals(aig);
        let mut vars = VarStore::init_from_aig(aig, &refs);
        let enc = Encoding::build(aig, &refs, &mut vars);
        Ok(Problem { vars, enc })
    }
}

/// The CNF formulas produced by the bridge.
#[derive(Debug, Clone)]
pub struct Encoding {
    /// The transition relation `T(x, i, c, x')`, complete and deterministic
    /// in `x'` given `x`, `i` and `c`.
    pub trans: Cnf,
    /// The reified transition relation `T <-> t`.
    pub trans_eq_t: Cnf,
    /// The reification literal of `trans_eq_t`.
    pub t: Lit,
    /// The safe states: the error bit is low.
    pub safe: Cnf,
    /// The unsafe states: the error bit is high.
    pub unsafe_states: Cnf,
    /// The safe states over next-state variables.
    pub next_safe: Cnf,
    /// The unsafe states over next-state variables.
    pub next_unsafe: Cnf,
    /// The initial state: all state variables are low.
    pub initial: Cnf,
    /// Whether the transition relation contains the constant-true unit
    /// clause.
    pub true_in_trans: bool,
    tmp_deps: BTreeMap<Var, Vec<Var>>,
    tmp_deps_trans: Option<BTreeMap<Var, BTreeSet<Var>>>,
}

/// Marks which AIGER literals are transitively referenced by the output and
/// the next-state functions, per polarity.
fn referenced_literals(aig: &Aig) -> FixedBitSet {
    let mut refs = FixedBitSet::with_capacity(2 * (aig.maxvar() as usize + 1));
    let output = aig.outputs()[0].lit;
    refs.insert(output as usize);
    refs.insert(aiger_not(output) as usize);
    for latch in aig.latches() {
        refs.insert(latch.next as usize);
        refs.insert(aiger_not(latch.next) as usize);
        refs.insert(latch.lit as usize);
        refs.insert(aiger_not(latch.lit) as usize);
    }

    let mut changed = true;
    while changed {
        changed = false;
        for and in aig.ands().iter().rev() {
            if refs[and.lhs as usize] {
                if !refs[and.rhs0 as usize] || !refs[and.rhs1 as usize] {
                    changed = true;
                }
                refs.insert(and.rhs0 as usize);
                refs.insert(and.rhs1 as usize);
            }
            if refs[aiger_not(and.lhs) as usize] {
                if !refs[aiger_not(and.rhs0) as usize] || !refs[aiger_not(and.rhs1) as usize] {
                    changed = true;
                }
                refs.insert(aiger_not(and.rhs0) as usize);
                refs.insert(aiger_not(and.rhs1) as usize);
            }
        }
    }
    refs
}

impl Encoding {
    fn build(aig: &Aig, refs: &FixedBitSet, vars: &mut VarStore) -> Self {
        let mut trans = Cnf::new();
        let mut tmp_deps = BTreeMap::new();

        let true_in_trans = refs[0] || refs[1];
        if true_in_trans {
            trans.add_unit(Lit::TRUE);
            tmp_deps.insert(Lit::TRUE.var(), Vec::new());
        }

        // clauses defining the outputs of the AND gates, restricted to the
        // referenced polarities
        for and in aig.ands() {
            let pos = refs[and.lhs as usize];
            let neg = refs[aiger_not(and.lhs) as usize];
            if !pos && !neg {
                continue;
            }
            let out = vars.aig_to_cnf_lit(and.lhs);
            let rhs1 = vars.aig_to_cnf_lit(and.rhs1);
            let rhs0 = vars.aig_to_cnf_lit(and.rhs0);
            if pos {
                trans.add_2lit(!out, rhs1);
                trans.add_2lit(!out, rhs0);
            }
            if neg {
                trans.add_3lit(out, !rhs1, !rhs0);
            }
            tmp_deps.insert(out.var(), vec![rhs1.var(), rhs0.var()]);
        }
        let mut trans_eq_t = trans.clone();

        // the inputs to the latches form the next states; state variable 0
        // latches the error output
        let error_lit = vars.aig_to_cnf_lit(aig.outputs()[0].lit);
        let next_error = Lit::positive(vars.next_error_var());
        trans.add_2lit(next_error, !error_lit);
        trans.add_2lit(!next_error, error_lit);
        let next_vars: Vec<Var> = vars.vars_of(VarKind::NextState).to_vec();
        for (idx, latch) in aig.latches().iter().enumerate() {
            let next_fn = vars.aig_to_cnf_lit(latch.next);
            let x_prime = Lit::positive(next_vars[idx + 1]);
            trans.add_2lit(next_fn, !x_prime);
            trans.add_2lit(!next_fn, x_prime);
        }

        // for trans_eq_t, the next-state equalities hold iff t is true
        let t = Lit::positive(vars.fresh_tmp_named("t"));
        let mut all_equal = Vec::with_capacity(aig.num_latches() + 2);
        all_equal.push(t);
        let err_eq = Lit::positive(vars.fresh_tmp_named("x_eq_x'"));
        trans_eq_t.add_3lit(error_lit, next_error, err_eq);
        trans_eq_t.add_3lit(error_lit, !next_error, !err_eq);
        trans_eq_t.add_3lit(!error_lit, next_error, !err_eq);
        trans_eq_t.add_3lit(!error_lit, !next_error, err_eq);
        all_equal.push(!err_eq);
        trans_eq_t.add_2lit(err_eq, !t);
        for (idx, latch) in aig.latches().iter().enumerate() {
            let next_fn = vars.aig_to_cnf_lit(latch.next);
            let x_prime = Lit::positive(next_vars[idx + 1]);
            let equal = Lit::positive(vars.fresh_tmp_named("x_eq_x'"));
            all_equal.push(!equal);
            trans_eq_t.add_3lit(next_fn, x_prime, equal);
            trans_eq_t.add_3lit(next_fn, !x_prime, !equal);
            trans_eq_t.add_3lit(!next_fn, x_prime, !equal);
            trans_eq_t.add_3lit(!next_fn, !x_prime, equal);
            trans_eq_t.add_2lit(equal, !t);
        }
        trans_eq_t.add_clause(&all_equal);

        // good, bad and initial states
        let mut safe = Cnf::new();
        safe.add_unit(Lit::negative(vars.pres_error_var()));
        let mut unsafe_states = Cnf::new();
        unsafe_states.add_unit(Lit::positive(vars.pres_error_var()));
        let mut next_safe = Cnf::new();
        next_safe.add_unit(Lit::negative(vars.next_error_var()));
        let mut next_unsafe = Cnf::new();
        next_unsafe.add_unit(Lit::positive(vars.next_error_var()));
        let mut initial = Cnf::new();
        for &var in vars.vars_of(VarKind::PresState) {
            initial.add_unit(Lit::negative(var));
        }

        Encoding {
            trans,
            trans_eq_t,
            t,
            safe,
            unsafe_states,
            next_safe,
            next_unsafe,
            initial,
            true_in_trans,
            tmp_deps,
            tmp_deps_trans: None,
        }
    }

    /// The direct dependencies of every temporary defined in the transition
    /// relation: the variables its defining gate reads.
    pub fn tmp_deps(&self) -> &BTreeMap<Var, Vec<Var>> {
        &self.tmp_deps
    }

    /// The transitive dependencies of every temporary, flattened to
    /// non-temporary variables. Computed lazily and memoized.
    pub fn tmp_deps_trans(&mut self, vars: &VarStore) -> &BTreeMap<Var, BTreeSet<Var>> {
        if self.tmp_deps_trans.is_none() {
            let mut closed: BTreeMap<Var, BTreeSet<Var>> = BTreeMap::new();
            while closed.len() != self.tmp_deps.len() {
                for (&var, deps) in &self.tmp_deps {
                    if closed.contains_key(&var) {
                        continue;
                    }
                    let mut transitive = BTreeSet::new();
                    let mut incomplete = false;
                    for &dep in deps {
                        if vars.kind(dep) == VarKind::Tmp && self.tmp_deps.contains_key(&dep) {
                            match closed.get(&dep) {
                                Some(set) => transitive.extend(set.iter().copied()),
                                None => {
                                    incomplete = true;
                                    break;
                                }
                            }
                        } else {
                            transitive.insert(dep);
                        }
                    }
                    if !incomplete {
                        closed.insert(var, transitive);
                    }
                }
            }
            self.tmp_deps_trans = Some(closed);
        }
        self.tmp_deps_trans.as_ref().unwrap()
    }

    /// Returns the memoized transitive dependency map.
    ///
    /// Panics if [`Encoding::tmp_deps_trans`] has not been called yet.
    pub fn tmp_deps_trans_ref(&self) -> &BTreeMap<Var, BTreeSet<Var>> {
        self.tmp_deps_trans
            .as_ref()
            .expect("transitive dependencies not yet computed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aig::aiger_not;

    fn example() -> Aig {
        // next(x) = i & !c, error = x
        let mut aig = Aig::new();
        aig.add_input(2, Some("i".to_string()));
        aig.add_input(4, Some("controllable_c".to_string()));
        aig.add_latch(6, 8, Some("x".to_string()));
        aig.add_and(8, 2, aiger_not(4));
        aig.add_output(6, Some("err".to_string()));
        aig
    }

    /// Exhaustively checks whether an assignment of the given variables can
    /// be extended over the remaining variables of the CNF to a model.
    fn extendable(cnf: &Cnf, fixed: &[(Var, bool)], max_var: Var) -> bool {
        let free: Vec<Var> = cnf
            .vars()
            .into_iter()
            .filter(|v| fixed.iter().all(|(w, _)| w != v))
            .collect();
        let mut assignment = vec![false; max_var as usize + 1];
        for &(var, value) in fixed {
            assignment[var as usize] = value;
        }
        extend(cnf, &mut assignment, &free)
    }

    fn extend(cnf: &Cnf, assignment: &mut Vec<bool>, free: &[Var]) -> bool {
        match free.split_first() {
            None => cnf.clauses().iter().all(|c| {
                c.iter().any(|l| assignment[l.var() as usize] == l.is_positive())
            }),
            Some((&var, rest)) => {
                for &value in &[false, true] {
                    assignment[var as usize] = value;
                    if extend(cnf, assignment, rest) {
                        return true;
                    }
                }
                false
            }
        }
    }

    #[test]
    fn transition_relation_is_total_and_deterministic() {
        let aig = example();
        let problem = Problem::from_aig(&aig).unwrap();
        let vars = &problem.vars;
        let pres: Vec<Var> = vars.vars_of(VarKind::PresState).to_vec();
        let next: Vec<Var> = vars.vars_of(VarKind::NextState).to_vec();
        let input = vars.vars_of(VarKind::Input)[0];
        let ctrl = vars.vars_of(VarKind::Ctrl)[0];
        let max = vars.max_var();

        // the constant-true variable must hold whenever it is constrained
        let base = vec![(Lit::TRUE.var(), true)];
        for state_bits in 0..4u32 {
            for in_bits in 0..4u32 {
                let mut fixed = base.clone();
                fixed.push((pres[0], state_bits & 1 != 0));
                fixed.push((pres[1], state_bits & 2 != 0));
                fixed.push((input, in_bits & 1 != 0));
                fixed.push((ctrl, in_bits & 2 != 0));
                let mut successors = 0;
                for next_bits in 0..4u32 {
                    let mut all = fixed.clone();
                    all.push((next[0], next_bits & 1 != 0));
                    all.push((next[1], next_bits & 2 != 0));
                    if extendable(&problem.enc.trans, &all, max) {
                        successors += 1;
                    }
                }
                assert_eq!(successors, 1, "transition relation must be a function");
            }
        }
    }

    #[test]
    fn state_sets_have_expected_shape() {
        let aig = example();
        let problem = Problem::from_aig(&aig).unwrap();
        let vars = &problem.vars;
        assert_eq!(problem.enc.safe.len(), 1);
        assert!(problem
            .enc
            .safe
            .contains(Lit::negative(vars.pres_error_var())));
        assert!(problem
            .enc
            .next_unsafe
            .contains(Lit::positive(vars.next_error_var())));
        // two state bits: the error bit and the latch
        assert_eq!(problem.enc.initial.len(), 2);
    }

    #[test]
    fn transitive_deps_flatten_to_leaves() {
        let aig = example();
        let mut problem = Problem::from_aig(&aig).unwrap();
        let input = problem.vars.vars_of(VarKind::Input)[0];
        let ctrl = problem.vars.vars_of(VarKind::Ctrl)[0];
        let and_var = problem.vars.aig_to_cnf_lit(8).var();
        let vars = problem.vars.clone();
        let deps = problem.enc.tmp_deps_trans(&vars);
        let and_deps = deps.get(&and_var).unwrap();
        assert!(and_deps.contains(&input));
        assert!(and_deps.contains(&ctrl));
    }

    #[test]
    fn reified_transition_relation_tracks_trans() {
        let aig = example();
        let problem = Problem::from_aig(&aig).unwrap();
        let vars = &problem.vars;
        let max = vars.max_var();
        let pres: Vec<Var> = vars.vars_of(VarKind::PresState).to_vec();
        let next: Vec<Var> = vars.vars_of(VarKind::NextState).to_vec();
        let input = vars.vars_of(VarKind::Input)[0];
        let ctrl = vars.vars_of(VarKind::Ctrl)[0];

        // under t, the reified relation admits exactly the transitions of
        // the plain relation
        for bits in 0..64u32 {
            let fixed = vec![
                (pres[0], bits & 1 != 0),
                (pres[1], bits & 2 != 0),
                (input, bits & 4 != 0),
                (ctrl, bits & 8 != 0),
                (next[0], bits & 16 != 0),
                (next[1], bits & 32 != 0),
            ];
            let mut reified = fixed.clone();
            reified.push((problem.enc.t.var(), true));
            assert_eq!(
                extendable(&problem.enc.trans, &fixed, max),
                extendable(&problem.enc.trans_eq_t, &reified, max)
            );
        }
    }

    #[test]
    fn rejects_multiple_outputs() {
        let mut aig = example();
        aig.add_output(2, None);
        assert!(Problem::from_aig(&aig).is_err());
    }
}
