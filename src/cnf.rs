//! Literals, clauses and CNF formulas.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Not;

use log::trace;
use tinyvec::TinyVec;

use crate::sat::{SatResponse, SatSession};
use crate::vars::VarStore;

/// A Boolean variable, identified by a positive integer.
///
/// Variable 1 is reserved for the constant true.
pub type Var = u32;

/// A literal in DIMACS convention: a non-zero signed integer whose absolute
/// value is the variable and whose sign is the polarity.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lit(i32);

impl Lit {
    /// The literal of the reserved constant-true variable.
    pub const TRUE: Lit = Lit(1);
    /// The negation of [`Lit::TRUE`].
    pub const FALSE: Lit = Lit(-1);

    /// Returns the positive literal of the given variable.
    pub fn positive(var: Var) -> Self {
        Lit(var as i32)
    }

    /// Returns the negative literal of the given variable.
    pub fn negative(var: Var) -> Self {
        Lit(-(var as i32))
    }

    /// Constructs a literal from its DIMACS integer representation.
    pub fn from_dimacs(value: i32) -> Self {
        debug_assert!(value != 0);
        Lit(value)
    }

    /// Returns the DIMACS integer representation of this literal.
    pub fn to_dimacs(self) -> i32 {
        self.0
    }

    /// Returns the variable of this literal.
    pub fn var(self) -> Var {
        self.0.unsigned_abs()
    }

    /// Returns whether this literal has positive polarity.
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Returns whether this literal has negative polarity.
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Transports this literal through a variable map indexed by variable.
    ///
    /// The sign of the literal is carried over to the mapped literal.
    /// Variables beyond the end of the map are left unchanged.
    pub fn apply(self, map: &[Lit]) -> Lit {
        let v = self.var() as usize;
        if v >= map.len() {
            return self;
        }
        let mapped = map[v];
        if self.is_negative() {
            !mapped
        } else {
            mapped
        }
    }
}

impl Not for Lit {
    type Output = Lit;

    fn not(self) -> Lit {
        Lit(-self.0)
    }
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A clause: a sorted sequence of distinct literals.
///
/// Clauses are mostly short, so they are kept inline up to six literals.
pub type Clause = TinyVec<[Lit; 6]>;

/// Returns an identity variable map covering variables `0..=max_var`.
pub fn identity_map(max_var: Var) -> Vec<Lit> {
    let mut map = Vec::with_capacity(max_var as usize + 1);
    map.push(Lit::default());
    for v in 1..=max_var {
        map.push(Lit::positive(v));
    }
    map
}

/// Sorts and deduplicates the given literals into a well-formed clause.
/// Returns `None` if the clause is a tautology.
pub(crate) fn normalize(lits: &[Lit]) -> Option<Clause> {
    let mut sorted: Clause = lits.iter().copied().collect();
    sorted.sort_unstable();
    let mut clause = Clause::default();
    for &lit in sorted.iter() {
        if clause.last() == Some(&lit) {
            continue;
        }
        clause.push(lit);
    }
    for &lit in clause.iter() {
        if clause.binary_search(&!lit).is_ok() {
            return None;
        }
    }
    Some(clause)
}

/// Returns whether the sorted clause `sub` subsumes the sorted clause `sup`,
/// i.e. whether every literal of `sub` also occurs in `sup`.
fn subsumes(sub: &Clause, sup: &Clause) -> bool {
    if sub.len() > sup.len() {
        return false;
    }
    let mut iter = sup.iter();
    'outer: for &lit in sub.iter() {
        for &other in iter.by_ref() {
            if other == lit {
                continue 'outer;
            }
            if other > lit {
                return false;
            }
        }
        return false;
    }
    true
}

/// A formula in conjunctive normal form: an insertion-ordered list of clauses.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Cnf {
    clauses: Vec<Clause>,
}

impl Cnf {
    /// Returns a new, empty CNF (the constant true).
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the clauses of this CNF.
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Returns the number of clauses.
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// Returns whether this CNF has no clauses.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Returns the total number of literal occurrences.
    pub fn num_lits(&self) -> usize {
        self.clauses.iter().map(|c| c.len()).sum()
    }

    /// Removes all clauses.
    pub fn clear(&mut self) {
        self.clauses.clear();
    }

    /// Adds a clause. Duplicate literals are collapsed and tautologies are
    /// silently dropped.
    pub fn add_clause(&mut self, lits: &[Lit]) {
        if let Some(clause) = normalize(lits) {
            self.clauses.push(clause);
        }
    }

    /// Adds a unit clause.
    pub fn add_unit(&mut self, a: Lit) {
        self.add_clause(&[a]);
    }

    /// Adds a clause with two literals.
    pub fn add_2lit(&mut self, a: Lit, b: Lit) {
        self.add_clause(&[a, b]);
    }

    /// Adds a clause with three literals.
    pub fn add_3lit(&mut self, a: Lit, b: Lit, c: Lit) {
        self.add_clause(&[a, b, c]);
    }

    /// Adds a clause with four literals.
    pub fn add_4lit(&mut self, a: Lit, b: Lit, c: Lit, d: Lit) {
        self.add_clause(&[a, b, c, d]);
    }

    /// Adds the clause whose literals are the negations of the given cube.
    pub fn add_neg_cube_as_clause(&mut self, cube: &[Lit]) {
        let negated: Vec<Lit> = cube.iter().map(|&l| !l).collect();
        self.add_clause(&negated);
    }

    /// Adds a clause unless it is subsumed by an existing clause, and drops
    /// all existing clauses that are subsumed by the new one.
    pub fn add_clause_and_simplify(&mut self, lits: &[Lit]) {
        let clause = match normalize(lits) {
            Some(clause) => clause,
            None => return,
        };
        if self.clauses.iter().any(|c| subsumes(c, &clause)) {
            return;
        }
        self.clauses.retain(|c| !subsumes(&clause, c));
        self.clauses.push(clause);
    }

    /// Appends all clauses of another CNF.
    pub fn append(&mut self, other: &Cnf) {
        self.clauses.extend(other.clauses.iter().cloned());
    }

    /// Returns whether some clause contains the given literal.
    pub fn contains(&self, lit: Lit) -> bool {
        self.clauses.iter().any(|c| c.binary_search(&lit).is_ok())
    }

    /// Returns whether the given cube satisfies every clause.
    pub fn is_satisfied_by(&self, cube: &[Lit]) -> bool {
        self.clauses
            .iter()
            .all(|c| c.iter().any(|l| cube.contains(l)))
    }

    /// Extracts the shortest clause, breaking ties by insertion order.
    ///
    /// Must not be called on an empty CNF.
    pub fn remove_smallest(&mut self) -> Clause {
        let mut best = 0;
        for (idx, clause) in self.clauses.iter().enumerate() {
            if clause.len() < self.clauses[best].len() {
                best = idx;
            }
        }
        self.clauses.remove(best)
    }

    /// Returns the set of variables occurring in this CNF.
    pub fn vars(&self) -> BTreeSet<Var> {
        let mut vars = BTreeSet::new();
        for clause in &self.clauses {
            for &lit in clause.iter() {
                vars.insert(lit.var());
            }
        }
        vars
    }

    /// Returns the largest variable occurring in this CNF, or 0 if none.
    pub fn max_var(&self) -> Var {
        self.clauses
            .iter()
            .flat_map(|c| c.iter().map(|l| l.var()))
            .max()
            .unwrap_or(0)
    }

    /// Renames all variables through the given map. Clauses that become
    /// tautological are dropped and duplicate literals are collapsed.
    pub fn rename_vars(&mut self, map: &[Lit]) {
        let mut renamed = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            let lits: Vec<Lit> = clause.iter().map(|&l| l.apply(map)).collect();
            if let Some(clause) = normalize(&lits) {
                renamed.push(clause);
            }
        }
        self.clauses = renamed;
    }

    /// Exchanges present-state and next-state variables.
    pub fn swap_present_next(&mut self, vars: &VarStore) {
        self.rename_vars(&vars.present_next_map());
    }

    /// Fixes a variable to a constant: satisfied clauses are removed and
    /// falsified literals are dropped from the remaining clauses.
    pub fn set_var_value(&mut self, var: Var, value: bool) {
        let satisfied = if value {
            Lit::positive(var)
        } else {
            Lit::negative(var)
        };
        self.clauses.retain(|c| c.binary_search(&satisfied).is_err());
        for clause in &mut self.clauses {
            if clause.iter().any(|l| l.var() == var) {
                *clause = clause.iter().copied().filter(|l| l.var() != var).collect();
            }
        }
    }

    /// Replaces this CNF with its structural negation.
    ///
    /// One fresh literal per clause is introduced, representing "this clause
    /// is false"; the final clause asserts that at least one of them holds.
    /// The satisfying assignments of the result, projected onto the original
    /// variables, are exactly the complement of the input's assignments.
    ///
    /// The disjunction over the clause-false literals is guaranteed to be the
    /// last clause of the result.
    pub fn negate(&mut self, vars: &mut VarStore) {
        // A false clause makes the formula false, so the negation is true.
        if self.clauses.iter().any(|c| c.is_empty()) {
            self.clauses.clear();
            return;
        }
        // The empty CNF is true, so the negation is false.
        if self.clauses.is_empty() {
            self.clauses.push(Clause::default());
            return;
        }
        let mut negated = Vec::with_capacity(self.num_lits() + 1);
        let mut one_clause_false = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            let false_lit = Lit::positive(vars.fresh_tmp());
            for &lit in clause.iter() {
                if let Some(bin) = normalize(&[!false_lit, !lit]) {
                    negated.push(bin);
                }
            }
            one_clause_false.push(false_lit);
        }
        self.clauses = negated;
        self.add_clause(&one_clause_false);
    }
}

impl fmt::Display for Cnf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for clause in &self.clauses {
            for &lit in clause.iter() {
                write!(f, "{} ", lit)?;
            }
            writeln!(f, "0")?;
        }
        Ok(())
    }
}

/// Compresses a present-state CNF by removing clauses that are implied by the
/// remaining ones. With `hardcore`, literals are additionally dropped from
/// individual clauses via unsat cores before the clause-level pass.
///
/// Returns whether the CNF changed.
pub fn compress_state_cnf(cnf: &mut Cnf, hardcore: bool) -> bool {
    if cnf.is_empty() {
        return false;
    }

    let mut changed = false;

    if hardcore {
        let mut shrink = SatSession::new();
        shrink.set_min_cores(true);
        shrink.add_cnf(cnf);
        let clauses: Vec<Clause> = cnf.clauses().to_vec();
        cnf.clear();
        for clause in clauses {
            let cube: Vec<Lit> = clause.iter().map(|&l| !l).collect();
            match shrink.model_or_core(&cube, &[], &[]) {
                SatResponse::Unsat(core) => {
                    if core.len() < cube.len() {
                        changed = true;
                    }
                    cnf.add_neg_cube_as_clause(&core);
                }
                SatResponse::Sat(_) => unreachable!("clause not implied by its own formula"),
            }
        }
    }

    let mut session = SatSession::new();
    let mut still_to_process = cnf.clone();
    cnf.clear();
    let first = still_to_process.remove_smallest();
    session.add_clause(&first);
    cnf.clauses.push(first);
    while !still_to_process.is_empty() {
        let clause = still_to_process.remove_smallest();
        let cube: Vec<Lit> = clause.iter().map(|&l| !l).collect();
        if session.is_sat(&cube) {
            session.add_clause(&clause);
            cnf.clauses.push(clause);
        } else {
            changed = true;
        }
    }
    if changed {
        trace!("compressed state CNF down to {} clauses", cnf.len());
    }
    changed
}

/// Computes a CNF over the present-state variables that is equivalent to the
/// negation of the given present-state CNF, by counterexample-guided clause
/// learning. All temporary variables introduced on the way are discarded.
pub fn negate_via_learning(cnf: &Cnf, vars: &mut VarStore) -> Cnf {
    let mark = vars.mark();
    let mut to_learn = cnf.clone();
    to_learn.negate(vars);

    let state_lits = vars.pres_lits();
    let mut find = SatSession::new();
    find.add_cnf(cnf);
    let mut gen = SatSession::new();
    gen.set_min_cores(true);
    gen.add_cnf(&to_learn);

    let mut result = Cnf::new();
    loop {
        let model = match find.model_or_core(&[], &[], &state_lits) {
            SatResponse::Sat(model) => model,
            SatResponse::Unsat(_) => break,
        };
        match gen.model_or_core(&model, &[], &[]) {
            SatResponse::Unsat(core) => {
                result.add_neg_cube_as_clause(&core);
                find.add_neg_cube_as_clause(&core);
            }
            SatResponse::Sat(_) => unreachable!("model satisfies the formula and its negation"),
        }
    }
    vars.release(mark);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::VarStore;

    fn lits(values: &[i32]) -> Vec<Lit> {
        values.iter().map(|&v| Lit::from_dimacs(v)).collect()
    }

    /// Checks whether the assignment (indexed by variable, `true` at index 0
    /// unused) can be extended over `free_vars` to satisfy the CNF.
    fn satisfiable_with(cnf: &Cnf, assignment: &mut Vec<bool>, free_vars: &[Var]) -> bool {
        match free_vars.split_first() {
            None => cnf.clauses().iter().all(|c| {
                c.iter().any(|l| {
                    let value = assignment[l.var() as usize];
                    if l.is_positive() {
                        value
                    } else {
                        !value
                    }
                })
            }),
            Some((&var, rest)) => {
                for &value in &[false, true] {
                    assignment[var as usize] = value;
                    if satisfiable_with(cnf, assignment, rest) {
                        return true;
                    }
                }
                false
            }
        }
    }

    fn models_over(cnf: &Cnf, over: &[Var], max_var: Var) -> Vec<Vec<bool>> {
        let aux: Vec<Var> = cnf
            .vars()
            .into_iter()
            .filter(|v| !over.contains(v))
            .collect();
        let mut result = Vec::new();
        let num = over.len();
        for bits in 0..(1u32 << num) {
            let mut assignment = vec![false; max_var as usize + 1];
            for (idx, &var) in over.iter().enumerate() {
                assignment[var as usize] = bits & (1 << idx) != 0;
            }
            if satisfiable_with(cnf, &mut assignment, &aux) {
                result.push((0..num).map(|idx| bits & (1 << idx) != 0).collect());
            }
        }
        result
    }

    #[test]
    fn clause_normalization() {
        let mut cnf = Cnf::new();
        cnf.add_clause(&lits(&[3, -2, 3]));
        assert_eq!(cnf.len(), 1);
        assert_eq!(cnf.clauses()[0][..], lits(&[-2, 3])[..]);
        // tautologies are dropped
        cnf.add_clause(&lits(&[4, -4, 2]));
        assert_eq!(cnf.len(), 1);
    }

    #[test]
    fn subsumption_simplify() {
        let mut cnf = Cnf::new();
        cnf.add_clause(&lits(&[2, 3, 4]));
        cnf.add_clause(&lits(&[2, 5]));
        cnf.add_clause_and_simplify(&lits(&[2, 3]));
        // (2 3) removes (2 3 4) but not (2 5)
        assert_eq!(cnf.len(), 2);
        cnf.add_clause_and_simplify(&lits(&[2, 3, 6]));
        // subsumed by (2 3), not added
        assert_eq!(cnf.len(), 2);
    }

    #[test]
    fn remove_smallest_is_stable() {
        let mut cnf = Cnf::new();
        cnf.add_clause(&lits(&[2, 3]));
        cnf.add_clause(&lits(&[4, 5]));
        cnf.add_clause(&lits(&[6]));
        assert_eq!(cnf.remove_smallest()[..], lits(&[6])[..]);
        assert_eq!(cnf.remove_smallest()[..], lits(&[2, 3])[..]);
        assert_eq!(cnf.remove_smallest()[..], lits(&[4, 5])[..]);
    }

    #[test]
    fn double_negation_roundtrip() {
        let mut vars = VarStore::new();
        let a = Lit::positive(vars.fresh_tmp());
        let b = Lit::positive(vars.fresh_tmp());
        let c = Lit::positive(vars.fresh_tmp());
        let over = vec![a.var(), b.var(), c.var()];

        let mut cnf = Cnf::new();
        cnf.add_clause(&[a, !b]);
        cnf.add_clause(&[b, c]);
        cnf.add_clause(&[!a, !c]);

        let mut twice = cnf.clone();
        twice.negate(&mut vars);
        twice.negate(&mut vars);

        let max = vars.max_var();
        assert_eq!(
            models_over(&cnf, &over, max),
            models_over(&twice, &over, max)
        );
    }

    #[test]
    fn negation_complements_models() {
        let mut vars = VarStore::new();
        let a = Lit::positive(vars.fresh_tmp());
        let b = Lit::positive(vars.fresh_tmp());
        let over = vec![a.var(), b.var()];

        let mut cnf = Cnf::new();
        cnf.add_clause(&[a, b]);
        let mut negated = cnf.clone();
        negated.negate(&mut vars);

        let max = vars.max_var();
        let pos = models_over(&cnf, &over, max);
        let neg = models_over(&negated, &over, max);
        assert_eq!(pos.len() + neg.len(), 4);
        for model in &pos {
            assert!(!neg.contains(model));
        }
    }

    #[test]
    fn set_var_value_propagates() {
        let mut cnf = Cnf::new();
        cnf.add_clause(&lits(&[2, 3]));
        cnf.add_clause(&lits(&[-2, 4]));
        cnf.set_var_value(2, true);
        // (2 3) satisfied, (-2 4) reduced to (4)
        assert_eq!(cnf.len(), 1);
        assert_eq!(cnf.clauses()[0][..], lits(&[4])[..]);
    }

    #[test]
    fn compression_is_idempotent() {
        let mut cnf = Cnf::new();
        cnf.add_clause(&lits(&[2]));
        cnf.add_clause(&lits(&[2, 3]));
        cnf.add_clause(&lits(&[3, 4]));
        cnf.add_clause(&lits(&[-2, 3, 4]));
        compress_state_cnf(&mut cnf, false);
        let once = cnf.clone();
        let changed = compress_state_cnf(&mut cnf, false);
        assert!(!changed);
        assert_eq!(once, cnf);
    }

    #[test]
    fn learned_negation_is_complement() {
        let mut vars = VarStore::new();
        let x0 = Lit::positive(vars.new_state_pair().0);
        let x1 = Lit::positive(vars.new_state_pair().0);

        let mut cnf = Cnf::new();
        cnf.add_clause(&[!x0, x1]);
        let negated = negate_via_learning(&cnf, &mut vars);

        let over = vec![x0.var(), x1.var()];
        let max = vars.max_var();
        let pos = models_over(&cnf, &over, max);
        let neg = models_over(&negated, &over, max);
        assert_eq!(pos.len() + neg.len(), 4);
        for model in &pos {
            assert!(!neg.contains(model));
        }
    }
}
