//! Incremental SAT solver sessions.

use std::collections::HashSet;

use varisat::{ExtendFormula, Solver};

use crate::cnf::{Cnf, Lit};

/// The answer of a SAT query.
#[derive(Debug, Clone)]
pub enum SatResponse {
    /// The formula is satisfiable; carries the model values of the requested
    /// variables, as signed literals.
    Sat(Vec<Lit>),
    /// The formula is unsatisfiable under the assumptions; carries an unsat
    /// core that is a subset of the first assumption block.
    Unsat(Vec<Lit>),
}

/// An incremental SAT session exclusively owning one solver instance.
///
/// The solver is released when the session is dropped. Sessions are rebuilt
/// by replacing them with a fresh value; there is no clause removal.
pub struct SatSession {
    solver: Solver<'static>,
    min_cores: bool,
    queries: u64,
}

impl SatSession {
    /// Returns a new session with an empty clause database.
    pub fn new() -> Self {
        Self {
            solver: Solver::new(),
            min_cores: false,
            queries: 0,
        }
    }

    /// Enables or disables iterative minimization of unsat cores.
    ///
    /// Minimal cores are more expensive to compute but give stronger
    /// generalizations.
    pub fn set_min_cores(&mut self, min_cores: bool) {
        self.min_cores = min_cores;
    }

    /// The number of solve calls issued on this session.
    pub fn num_queries(&self) -> u64 {
        self.queries
    }

    fn to_solver(lit: Lit) -> varisat::Lit {
        varisat::Lit::from_dimacs(lit.to_dimacs() as isize)
    }

    /// Adds a clause to the session.
    pub fn add_clause(&mut self, lits: &[Lit]) {
        let clause: Vec<varisat::Lit> = lits.iter().map(|&l| Self::to_solver(l)).collect();
        self.solver.add_clause(&clause);
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

    /// Adds all clauses of the given CNF.
    pub fn add_cnf(&mut self, cnf: &Cnf) {
        for clause in cnf.clauses() {
            self.add_clause(clause);
        }
    }

    /// Adds the clause whose literals are the negations of the given cube.
    pub fn add_neg_cube_as_clause(&mut self, cube: &[Lit]) {
        let clause: Vec<Lit> = cube.iter().map(|&l| !l).collect();
        self.add_clause(&clause);
    }

    /// Solver calls are assumed total; inability to answer is a programming
    /// error.
    fn solve_checked(&mut self) -> bool {
        self.queries += 1;
        match self.solver.solve() {
            Ok(result) => result,
            Err(error) => panic!("sat solver failure: {}", error),
        }
    }

    /// Returns whether the session is satisfiable under the given cube of
    /// assumptions.
    pub fn is_sat(&mut self, assumps: &[Lit]) -> bool {
        let assumptions: Vec<varisat::Lit> =
            assumps.iter().map(|&l| Self::to_solver(l)).collect();
        self.solver.assume(&assumptions);
        let result = self.solve_checked();
        self.solver.assume(&[]);
        result
    }

    /// Solves under `core_assumps ∪ extra_assumps`.
    ///
    /// If satisfiable, returns the model values of the `interest` variables
    /// (given as positive literals; a variable unknown to the solver counts
    /// as false). If unsatisfiable, returns an unsat core restricted to
    /// `core_assumps`; `extra_assumps` never enter the core.
    pub fn model_or_core(
        &mut self,
        core_assumps: &[Lit],
        extra_assumps: &[Lit],
        interest: &[Lit],
    ) -> SatResponse {
        let assumptions: Vec<varisat::Lit> = core_assumps
            .iter()
            .chain(extra_assumps.iter())
            .map(|&l| Self::to_solver(l))
            .collect();
        self.solver.assume(&assumptions);
        if self.solve_checked() {
            let model = self.solver.model().expect("no model for satisfiable formula");
            let positive: HashSet<isize> = model
                .iter()
                .filter(|l| l.is_positive())
                .map(|l| l.to_dimacs())
                .collect();
            let values = interest
                .iter()
                .map(|&l| {
                    if positive.contains(&(l.var() as isize)) {
                        Lit::positive(l.var())
                    } else {
                        Lit::negative(l.var())
                    }
                })
                .collect();
            self.solver.assume(&[]);
            SatResponse::Sat(values)
        } else {
            let mut core = self.failed_subset(core_assumps);
            if self.min_cores {
                self.minimize_core(&mut core, extra_assumps);
            }
            self.solver.assume(&[]);
            SatResponse::Unsat(core)
        }
    }

    fn failed_subset(&mut self, from: &[Lit]) -> Vec<Lit> {
        let failed: HashSet<i32> = self
            .solver
            .failed_core()
            .unwrap_or(&[])
            .iter()
            .map(|l| l.to_dimacs() as i32)
            .collect();
        from.iter()
            .copied()
            .filter(|l| failed.contains(&l.to_dimacs()))
            .collect()
    }

    /// Shrinks the core literal by literal, keeping a drop whenever the
    /// remaining assumptions are still unsatisfiable.
    fn minimize_core(&mut self, core: &mut Vec<Lit>, extra_assumps: &[Lit]) {
        let snapshot = core.clone();
        for candidate in snapshot {
            if !core.contains(&candidate) {
                continue;
            }
            let trial: Vec<Lit> = core
                .iter()
                .copied()
                .filter(|&l| l != candidate)
                .collect();
            let assumptions: Vec<varisat::Lit> = trial
                .iter()
                .chain(extra_assumps.iter())
                .map(|&l| Self::to_solver(l))
                .collect();
            self.solver.assume(&assumptions);
            if !self.solve_checked() {
                *core = self.failed_subset(&trial);
            }
        }
    }
}

impl Default for SatSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(value: i32) -> Lit {
        Lit::from_dimacs(value)
    }

    #[test]
    fn sat_and_model() {
        let mut session = SatSession::new();
        session.add_2lit(lit(2), lit(3));
        session.add_unit(lit(-2));
        match session.model_or_core(&[], &[], &[lit(2), lit(3)]) {
            SatResponse::Sat(model) => assert_eq!(model, vec![lit(-2), lit(3)]),
            SatResponse::Unsat(_) => panic!("expected sat"),
        }
    }

    #[test]
    fn core_is_restricted_to_first_block() {
        let mut session = SatSession::new();
        session.set_min_cores(true);
        // 2 and 3 together are contradictory with the clauses
        session.add_2lit(lit(-2), lit(-3));
        match session.model_or_core(&[lit(2)], &[lit(3)], &[]) {
            SatResponse::Unsat(core) => assert_eq!(core, vec![lit(2)]),
            SatResponse::Sat(_) => panic!("expected unsat"),
        }
    }

    #[test]
    fn minimal_core_drops_irrelevant_assumptions() {
        let mut session = SatSession::new();
        session.set_min_cores(true);
        session.add_unit(lit(-4));
        match session.model_or_core(&[lit(2), lit(3), lit(4)], &[], &[]) {
            SatResponse::Unsat(core) => assert_eq!(core, vec![lit(4)]),
            SatResponse::Sat(_) => panic!("expected unsat"),
        }
    }

    #[test]
    fn assumptions_do_not_leak() {
        let mut session = SatSession::new();
        session.add_unit(lit(-2));
        assert!(!session.is_sat(&[lit(2)]));
        assert!(session.is_sat(&[]));
    }
}
