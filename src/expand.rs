//! Universal expansion of quantified formulas into purely existential form.
//!
//! Quantified queries of the shape `∃Q1. ∀V. ∃Q2. φ` are compiled into
//! equisatisfiable propositional formulas by replacing every universal
//! variable `v` with the conjunction `φ[v=0] ∧ φ[v=1]`, duplicating the
//! existentially nested variables. The expansion works on the AND gates
//! recovered from the transition relation, with on-the-fly constant
//! propagation and structural sharing.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::debug;
use min_max_heap::MinMaxHeap;

use crate::cancel::CancelToken;
use crate::cnf::{identity_map, normalize, Clause, Cnf, Lit, Var};
use crate::encode::Encoding;
use crate::sat::SatSession;
use crate::vars::{VarKind, VarStore};

/// Why an expansion run stopped early.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpansionStop {
    /// The configured size limit was exceeded.
    SizeLimit,
    /// The external cancel flag was raised.
    Cancelled,
}

/// An AND gate recovered from the transition relation.
#[derive(Debug, Copy, Clone)]
struct Gate {
    l: Lit,
    r0: Lit,
    r1: Lit,
}

/// Budget for the table of next-state rename maps before the expander
/// switches to cascaded copy maps.
const MAP_ENTRY_BUDGET: usize = 4_000_000;
/// Hard cap on the number of next-state copies.
const MAX_COPIES: u64 = 10_000_000;

#[cfg(target_os = "linux")]
fn current_mem_kb() -> Option<u64> {
    let statm = fs_err::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().next()?.parse().ok()?;
    Some(pages * 4)
}

#[cfg(not(target_os = "linux"))]
fn current_mem_kb() -> Option<u64> {
    None
}

/// Recovers the AND gates underlying the transition relation by pattern
/// matching the clause shapes emitted by the bridge. Returns the gates and a
/// variable map sending every next-state variable to the literal defining
/// its next-state function.
fn reconstruct_gates(enc: &Encoding, vars: &VarStore) -> (Vec<Gate>, Vec<Lit>) {
    let deps = enc.tmp_deps();
    let mut map = identity_map(vars.max_var());
    let mut gates = Vec::new();
    let clauses = enc.trans.clauses();

    let matches_gate = |l: Lit, a: Var, b: Var| -> bool {
        deps.get(&l.var()).map_or(false, |ins| {
            let mut expected: Vec<Var> = ins.clone();
            expected.sort_unstable();
            expected.dedup();
            let mut actual = vec![a, b];
            actual.sort_unstable();
            actual.dedup();
            expected == actual
        })
    };

    let mut idx = 0;
    while idx < clauses.len() {
        let c = &clauses[idx];
        // the constant-true unit clause
        if c.len() == 1 && c[0] == Lit::TRUE {
            idx += 1;
            continue;
        }
        if c.len() == 2 && idx + 1 < clauses.len() && clauses[idx + 1].len() == 2 {
            let d = &clauses[idx + 1];
            // two binary clauses sharing the negated output: an AND gate
            let mut found = None;
            for &lit in c.iter() {
                if lit.is_negative() && d.binary_search(&lit).is_ok() {
                    let l = !lit;
                    let r1 = other_lit(c, lit);
                    let r0 = other_lit(d, lit);
                    if matches_gate(l, r1.var(), r0.var()) {
                        found = Some((l, r0, r1));
                        break;
                    }
                }
            }
            if let Some((l, r0, r1)) = found {
                let mut used = 2;
                if idx + 2 < clauses.len() {
                    if let Some(expected) = normalize(&[l, !r0, !r1]) {
                        if clauses[idx + 2] == expected {
                            used = 3;
                        }
                    }
                }
                gates.push(Gate { l, r0, r1 });
                idx += used;
                continue;
            }
            // two complementary binary clauses: a next-state equivalence
            if is_negation_pair(c, d) {
                if let Some((n, f)) = next_state_equivalence(c, vars) {
                    map[n as usize] = f;
                    idx += 2;
                    continue;
                }
            }
        }
        // a gate that is only referenced negatively
        if c.len() == 3 {
            let mut found = None;
            for &lit in c.iter() {
                if lit.is_positive() {
                    let others: Vec<Lit> = c.iter().copied().filter(|&o| o != lit).collect();
                    if matches_gate(lit, others[0].var(), others[1].var()) {
                        found = Some(Gate {
                            l: lit,
                            r0: !others[0],
                            r1: !others[1],
                        });
                        break;
                    }
                }
            }
            if let Some(gate) = found {
                gates.push(gate);
                idx += 1;
                continue;
            }
        }
        panic!("unknown construction in transition relation");
    }
    (gates, map)
}

fn other_lit(clause: &Clause, not_this: Lit) -> Lit {
    clause
        .iter()
        .copied()
        .find(|&l| l != not_this)
        .unwrap_or(not_this)
}

fn is_negation_pair(c: &Clause, d: &Clause) -> bool {
    c.len() == d.len() && c.iter().all(|&l| d.binary_search(&!l).is_ok())
}

/// Decodes `(f ∨ ¬n) ∧ (¬f ∨ n)` into `n ↔ f`, where `n` is the unique
/// next-state variable of the pair.
fn next_state_equivalence(c: &Clause, vars: &VarStore) -> Option<(Var, Lit)> {
    let ln = c
        .iter()
        .copied()
        .find(|l| vars.kind(l.var()) == VarKind::NextState)?;
    let other = other_lit(c, ln);
    if vars.kind(other.var()) == VarKind::NextState {
        return None;
    }
    let f = if ln.is_positive() { !other } else { other };
    Some((ln.var(), f))
}

/// Constant propagation and structural sharing for a freshly renamed gate.
fn propagate(
    a: Lit,
    b: Lit,
    cache: &mut HashMap<(Lit, Lit), Lit>,
    gates: &mut Vec<Gate>,
    next_var: &mut Var,
) -> Lit {
    if a == Lit::FALSE || b == Lit::FALSE {
        return Lit::FALSE;
    }
    if a == Lit::TRUE {
        return b;
    }
    if b == Lit::TRUE {
        return a;
    }
    if a == b {
        return a;
    }
    if a == !b {
        return Lit::FALSE;
    }
    let (x, y) = if a <= b { (a, b) } else { (b, a) };
    if let Some(&l) = cache.get(&(x, y)) {
        return l;
    }
    *next_var += 1;
    let l = Lit::positive(*next_var);
    cache.insert((x, y), l);
    gates.push(Gate { l, r0: x, r1: y });
    l
}

/// The universal expander.
///
/// One expander instance serves one winning-region computation. It never
/// mutates caller CNFs: all expansion state lives in private gate vectors
/// and rename maps, and results are only ever appended to the target
/// session.
pub struct Expander {
    s: Vec<Var>,
    i: Vec<Var>,
    c: Vec<Var>,
    n: Vec<Var>,
    true_in_trans: bool,
    limit_kb: u64,
    cancel: CancelToken,

    // solver-E data: expansion over all controllables
    i_gates: Vec<Gate>,
    i_rename_maps: Vec<Vec<Lit>>,
    i_copy_maps: Vec<Vec<Lit>>,
    i_orig_prop_maps: Vec<Vec<Lit>>,
    i_occ: Vec<Var>,
    i_max_trans_var: Var,
    i_ready: bool,

    // solver-C data: expansion over selected uncontrollable inputs
    c_rename_maps: Vec<Vec<Lit>>,
    c_cnf: Cnf,
}

impl Expander {
    /// Returns a new expander for the given problem.
    pub fn new(enc: &Encoding, vars: &VarStore, limit_kb: u64, cancel: CancelToken) -> Self {
        Expander {
            s: vars.vars_of(VarKind::PresState).to_vec(),
            i: vars.vars_of(VarKind::Input).to_vec(),
            c: vars.vars_of(VarKind::Ctrl).to_vec(),
            n: vars.vars_of(VarKind::NextState).to_vec(),
            true_in_trans: enc.true_in_trans,
            limit_kb,
            cancel,
            i_gates: Vec::new(),
            i_rename_maps: Vec::new(),
            i_copy_maps: Vec::new(),
            i_orig_prop_maps: Vec::new(),
            i_occ: Vec::new(),
            i_max_trans_var: 0,
            i_ready: false,
            c_rename_maps: Vec::new(),
            c_cnf: Cnf::new(),
        }
    }

    fn check_cancelled(&self) -> Result<(), ExpansionStop> {
        if self.cancel.is_cancelled() {
            Err(ExpansionStop::Cancelled)
        } else {
            Ok(())
        }
    }

    fn check_memory(&self) -> Result<(), ExpansionStop> {
        if let Some(mem) = current_mem_kb() {
            if mem > self.limit_kb {
                return Err(ExpansionStop::SizeLimit);
            }
        }
        Ok(())
    }

    /// Orders the variables so that those whose elimination renames the
    /// fewest dependent temporaries come first.
    fn expansion_order(
        to_expand: &[Var],
        extra_seed: &[Var],
        deps: &BTreeMap<Var, Vec<Var>>,
    ) -> Vec<Var> {
        let mut heap = MinMaxHeap::with_capacity(to_expand.len());
        for &var in to_expand {
            let mut reached: BTreeSet<Var> = extra_seed.iter().copied().collect();
            reached.insert(var);
            loop {
                let before = reached.len();
                for (&out, ins) in deps {
                    if ins.iter().any(|v| reached.contains(v)) {
                        reached.insert(out);
                    }
                }
                if reached.len() == before {
                    break;
                }
            }
            heap.push((reached.len(), var));
        }
        let mut order = Vec::with_capacity(to_expand.len());
        while let Some((_, var)) = heap.pop_min() {
            order.push(var);
        }
        order
    }

    fn cleanup_i_data(&mut self) {
        self.i_gates.clear();
        self.i_rename_maps.clear();
        self.i_copy_maps.clear();
        self.i_orig_prop_maps.clear();
        self.i_occ.clear();
        self.i_ready = false;
    }

    /// Expands the transition relation over all controllable inputs, leaving
    /// a shared gate list and one next-state rename map per expansion copy.
    fn init_solver_e_data(
        &mut self,
        enc: &Encoding,
        vars: &VarStore,
        limit_size: bool,
    ) -> Result<(), ExpansionStop> {
        let (gates, n_to_def) = reconstruct_gates(enc, vars);
        self.i_gates = gates;

        let mut base = Vec::with_capacity(self.s.len());
        for (idx, _) in self.s.iter().enumerate() {
            base.push(Lit::positive(self.n[idx]).apply(&n_to_def));
        }
        self.i_rename_maps = vec![base];

        let max_keep = self
            .s
            .iter()
            .chain(self.i.iter())
            .chain(self.c.iter())
            .copied()
            .max()
            .unwrap_or(1);
        self.i_max_trans_var = vars.max_var();

        let order = Self::expansion_order(&self.c, &[], enc.tmp_deps());
        for ex in order {
            self.check_cancelled().map_err(|stop| {
                self.cleanup_i_data();
                stop
            })?;
            if limit_size {
                if let Err(stop) = self.check_memory() {
                    self.cleanup_i_data();
                    return Err(stop);
                }
                let mut copies = self.i_rename_maps.len() as u64;
                for _ in &self.i_copy_maps {
                    copies = copies.saturating_mul(2);
                }
                if copies.saturating_mul(2) > MAX_COPIES {
                    self.cleanup_i_data();
                    return Err(ExpansionStop::SizeLimit);
                }
            }

            let old_max = self.i_max_trans_var;
            let mut orig_map = identity_map(old_max);
            let mut ren_map = identity_map(old_max);
            orig_map[ex as usize] = Lit::FALSE;
            ren_map[ex as usize] = Lit::TRUE;

            // renumber the surviving gates densely, sharing structurally
            // equal gates between the two branches
            let mut next_var = max_keep;
            let mut new_gates = Vec::with_capacity(2 * self.i_gates.len());
            let mut cache = HashMap::new();
            let old_gates = std::mem::take(&mut self.i_gates);
            for gate in &old_gates {
                if self.cancel.is_cancelled() {
                    self.cleanup_i_data();
                    return Err(ExpansionStop::Cancelled);
                }
                let out = gate.l.var() as usize;
                let o = propagate(
                    gate.r0.apply(&orig_map),
                    gate.r1.apply(&orig_map),
                    &mut cache,
                    &mut new_gates,
                    &mut next_var,
                );
                orig_map[out] = o;
                let r = propagate(
                    gate.r0.apply(&ren_map),
                    gate.r1.apply(&ren_map),
                    &mut cache,
                    &mut new_gates,
                    &mut next_var,
                );
                ren_map[out] = r;
            }
            self.i_gates = new_gates;
            self.i_max_trans_var = next_var;

            let doubled_entries = self.i_rename_maps.len() * 2 * self.s.len();
            if self.i_copy_maps.is_empty() && doubled_entries <= MAP_ENTRY_BUDGET {
                let existing = self.i_rename_maps.len();
                for idx in 0..existing {
                    let copy: Vec<Lit> = self.i_rename_maps[idx]
                        .iter()
                        .map(|&l| l.apply(&ren_map))
                        .collect();
                    for value in self.i_rename_maps[idx].iter_mut() {
                        *value = value.apply(&orig_map);
                    }
                    self.i_rename_maps.push(copy);
                }
            } else {
                if self.i_copy_maps.len() >= 63 {
                    self.cleanup_i_data();
                    return Err(ExpansionStop::SizeLimit);
                }
                self.i_orig_prop_maps.push(orig_map);
                self.i_copy_maps.push(ren_map);
            }
        }

        let mut occ = BTreeSet::new();
        for map in &self.i_rename_maps {
            for value in map {
                occ.insert(value.var());
            }
        }
        self.i_occ = occ.into_iter().collect();
        self.i_ready = true;
        debug!(
            "expanded {} controllables into {} maps and {} copy maps, {} gates",
            self.c.len(),
            self.i_rename_maps.len(),
            self.i_copy_maps.len(),
            self.i_gates.len()
        );
        Ok(())
    }

    /// Composes the cascaded copy maps selected by the given bitmask.
    fn composed_cascade(&self, mask: u64) -> Option<Vec<Lit>> {
        if self.i_copy_maps.is_empty() {
            return None;
        }
        let mut composed = if mask & 1 == 1 {
            self.i_copy_maps[0].clone()
        } else {
            self.i_orig_prop_maps[0].clone()
        };
        for idx in 1..self.i_copy_maps.len() {
            let map = if mask >> idx & 1 == 1 {
                &self.i_copy_maps[idx]
            } else {
                &self.i_orig_prop_maps[idx]
            };
            for &var in &self.i_occ {
                if (var as usize) < composed.len() {
                    let old = composed[var as usize];
                    composed[var as usize] = old.apply(map);
                }
            }
        }
        Some(composed)
    }

    /// Loads a fresh Solver-E session with the expansion of
    /// `W(x) ∧ T(x,i,c,x') ∧ ¬W(x')` over all controllable inputs, so a
    /// single SAT call decides whether the adversary can leave `W`.
    pub fn load_solver_e(
        &mut self,
        win: &Cnf,
        enc: &Encoding,
        vars: &VarStore,
        session: &mut SatSession,
        limit_size: bool,
    ) -> Result<(), ExpansionStop> {
        if !self.i_ready {
            self.init_solver_e_data(enc, vars, limit_size)?;
        }

        let mut next_win = win.clone();
        crate::cnf::compress_state_cnf(&mut next_win, false);
        next_win.swap_present_next(vars);

        if self.true_in_trans {
            session.add_unit(Lit::TRUE);
        }
        session.add_cnf(win);
        for gate in &self.i_gates {
            session.add_2lit(!gate.l, gate.r1);
            session.add_2lit(!gate.l, gate.r0);
            session.add_3lit(gate.l, !gate.r1, !gate.r0);
        }
        let mut literals = 6 * self.i_gates.len() as u64;
        let budget = self.limit_kb.saturating_mul(128);

        // position of each next-state variable in the rename maps
        let mut n_pos = vec![usize::MAX; vars.max_var() as usize + 1];
        for (idx, &nv) in self.n.iter().enumerate() {
            n_pos[nv as usize] = idx;
        }

        let mut clause_false: HashMap<Clause, Lit> = HashMap::new();
        let mut max_var = self.i_max_trans_var;

        let num_masks = 1u64 << self.i_copy_maps.len();
        for mask in 0..num_masks {
            let cascade = self.composed_cascade(mask);
            'maps: for base in &self.i_rename_maps {
                self.check_cancelled()?;
                if limit_size && literals > budget {
                    return Err(ExpansionStop::SizeLimit);
                }

                // rename the next-state clauses of W' into this copy
                let mut renamed = Vec::with_capacity(next_win.len());
                for clause in next_win.clauses() {
                    let mut out = Vec::with_capacity(clause.len());
                    let mut clause_true = false;
                    for &lit in clause.iter() {
                        let pos = n_pos[lit.var() as usize];
                        let mut value = base[pos];
                        if lit.is_negative() {
                            value = !value;
                        }
                        if let Some(map) = &cascade {
                            value = value.apply(map);
                        }
                        if value == Lit::TRUE {
                            clause_true = true;
                            break;
                        }
                        if value != Lit::FALSE {
                            out.push(value);
                        }
                    }
                    if clause_true {
                        continue;
                    }
                    match normalize(&out) {
                        Some(clause) => renamed.push(clause),
                        None => continue, // tautology
                    }
                }

                // constant and unit simplification of the copy
                let (surviving, units) = match simplify_copy(renamed) {
                    Some(result) => result,
                    // the copy of W' is unsatisfiable, its negation is true
                    None => continue 'maps,
                };

                // negate the copy on the fly: one clause-false literal per
                // surviving clause, shared across copies
                let mut one_clause_false: Vec<Lit> = units.iter().map(|&l| !l).collect();
                for clause in surviving {
                    let false_lit = match clause_false.entry(clause) {
                        Entry::Occupied(entry) => *entry.get(),
                        Entry::Vacant(entry) => {
                            max_var += 1;
                            let lit = Lit::positive(max_var);
                            for &l in entry.key().iter() {
                                session.add_2lit(!lit, !l);
                            }
                            literals += 2 * entry.key().len() as u64;
                            entry.insert(lit);
                            lit
                        }
                    };
                    one_clause_false.push(false_lit);
                }
                literals += one_clause_false.len() as u64;
                session.add_clause(&one_clause_false);
            }
        }
        Ok(())
    }

    /// Initializes a Solver-C session with the transition relation expanded
    /// over `max_expand` uncontrollable inputs, so the solver can answer
    /// "can the controller force `W` next" with minimal quantifier
    /// alternation. Next-state copies of present-state clauses are added
    /// later through [`Expander::add_exp_next_clause`].
    pub fn init_solver_c(
        &mut self,
        enc: &Encoding,
        vars: &VarStore,
        max_expand: usize,
        session: &mut SatSession,
    ) {
        let (mut gates, n_to_def) = reconstruct_gates(enc, vars);
        let mut c_max_var = vars.max_var();
        let mut rename_to_fresh: Vec<Var> = self.c.clone();

        let mut base = identity_map(vars.max_var());
        for (idx, &sv) in self.s.iter().enumerate() {
            base[sv as usize] = Lit::positive(self.n[idx]).apply(&n_to_def);
        }
        self.c_rename_maps = vec![base];

        let order = Self::expansion_order(&self.i, &self.c, enc.tmp_deps());
        for &ex in order.iter().take(max_expand.min(self.i.len())) {
            let old_max = c_max_var;
            let mut orig_map = identity_map(old_max);
            let mut ren_map = identity_map(old_max);

            // the control signals and their earlier copies are always
            // renamed to fresh variables in the copy
            let fresh_base = rename_to_fresh.len();
            for idx in 0..fresh_base {
                c_max_var += 1;
                ren_map[rename_to_fresh[idx] as usize] = Lit::positive(c_max_var);
                rename_to_fresh.push(c_max_var);
            }
            orig_map[ex as usize] = Lit::FALSE;
            ren_map[ex as usize] = Lit::TRUE;

            let mut kept = Vec::with_capacity(2 * gates.len());
            let mut copies = Vec::new();
            for gate in &gates {
                let out = gate.l.var() as usize;
                let o_r0 = gate.r0.apply(&orig_map);
                let o_r1 = gate.r1.apply(&orig_map);
                let mut keep_orig = false;
                if o_r0 == Lit::FALSE || o_r1 == Lit::FALSE || o_r0 == !o_r1 {
                    orig_map[out] = Lit::FALSE;
                } else if o_r0 == Lit::TRUE {
                    orig_map[out] = o_r1;
                } else if o_r1 == Lit::TRUE {
                    orig_map[out] = o_r0;
                } else if o_r0 == o_r1 {
                    orig_map[out] = o_r0;
                } else {
                    keep_orig = true;
                    kept.push(Gate {
                        l: gate.l,
                        r0: o_r0,
                        r1: o_r1,
                    });
                }

                let c_r0 = gate.r0.apply(&ren_map);
                let c_r1 = gate.r1.apply(&ren_map);
                if c_r0 == Lit::FALSE || c_r1 == Lit::FALSE || c_r0 == !c_r1 {
                    ren_map[out] = Lit::FALSE;
                } else if c_r0 == Lit::TRUE {
                    ren_map[out] = c_r1;
                } else if c_r1 == Lit::TRUE {
                    ren_map[out] = c_r0;
                } else if c_r0 == c_r1 {
                    ren_map[out] = c_r0;
                } else if keep_orig && (o_r0 == c_r0 && o_r1 == c_r1 || o_r0 == c_r1 && o_r1 == c_r0)
                {
                    // the copy coincides with the original gate
                    ren_map[out] = gate.l;
                } else {
                    c_max_var += 1;
                    let l = Lit::positive(c_max_var);
                    ren_map[out] = l;
                    copies.push(Gate {
                        l,
                        r0: c_r0,
                        r1: c_r1,
                    });
                }
            }
            kept.extend(copies);
            gates = kept;

            // double the present-to-next rename maps
            let existing = self.c_rename_maps.len();
            for idx in 0..existing {
                let copy: Vec<Lit> = self.c_rename_maps[idx]
                    .iter()
                    .map(|&l| l.apply(&ren_map))
                    .collect();
                for value in self.c_rename_maps[idx].iter_mut() {
                    *value = value.apply(&orig_map);
                }
                self.c_rename_maps.push(copy);
            }
        }

        self.c_cnf = Cnf::new();
        if self.true_in_trans {
            self.c_cnf.add_unit(Lit::TRUE);
        }
        for gate in &gates {
            self.c_cnf.add_2lit(!gate.l, gate.r1);
            self.c_cnf.add_2lit(!gate.l, gate.r0);
            self.c_cnf.add_3lit(gate.l, !gate.r1, !gate.r0);
        }
        session.add_cnf(&self.c_cnf);
        debug!(
            "solver-C expansion: {} copies, {} gates",
            self.c_rename_maps.len(),
            gates.len()
        );
    }

    /// Adds a present-state clause as a next-state clause in every expansion
    /// copy of a Solver-C session.
    pub fn add_exp_next_clause(&self, clause: &[Lit], session: &mut SatSession) {
        for map in &self.c_rename_maps {
            let mut renamed = Vec::with_capacity(clause.len());
            let mut clause_true = false;
            for &lit in clause {
                let value = lit.apply(map);
                if value == Lit::TRUE {
                    clause_true = true;
                    break;
                }
                if value != Lit::FALSE {
                    renamed.push(value);
                }
            }
            if !clause_true {
                session.add_clause(&renamed);
            }
        }
    }

    /// Reloads a fresh Solver-C session with the expanded transition
    /// relation computed by [`Expander::init_solver_c`].
    pub fn reset_solver_c(&self, session: &mut SatSession) {
        session.add_cnf(&self.c_cnf);
    }
}

/// Unit-propagates the renamed clause set of one expansion copy.
///
/// Returns the surviving multi-literal clauses and the implied unit
/// literals, or `None` if the set is unsatisfiable.
fn simplify_copy(clauses: Vec<Clause>) -> Option<(Vec<Clause>, Vec<Lit>)> {
    let mut units: BTreeMap<Var, bool> = BTreeMap::new();
    let mut unit_lits = Vec::new();
    let mut pending = clauses;
    loop {
        let mut remaining = Vec::with_capacity(pending.len());
        let mut new_units = false;
        for clause in pending {
            let mut out = Clause::default();
            let mut clause_true = false;
            for &lit in clause.iter() {
                match units.get(&lit.var()) {
                    Some(&value) if value == lit.is_positive() => {
                        clause_true = true;
                        break;
                    }
                    Some(_) => {} // literal is false, drop it
                    None => out.push(lit),
                }
            }
            if clause_true {
                continue;
            }
            match out.len() {
                0 => return None,
                1 => {
                    let lit = out[0];
                    match units.get(&lit.var()) {
                        Some(&value) if value != lit.is_positive() => return None,
                        Some(_) => {}
                        None => {
                            units.insert(lit.var(), lit.is_positive());
                            unit_lits.push(lit);
                            new_units = true;
                        }
                    }
                }
                _ => remaining.push(out),
            }
        }
        if !new_units {
            return Some((remaining, unit_lits));
        }
        pending = remaining;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aig::{aiger_not, Aig};
    use crate::encode::Problem;
    use crate::sat::SatSession;

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
    fn gates_are_recovered_from_the_bridge() {
        let problem = example();
        let (gates, map) = reconstruct_gates(&problem.enc, &problem.vars);
        assert_eq!(gates.len(), 1);
        let and_out = problem.vars.aig_to_cnf_lit(8);
        assert_eq!(gates[0].l, and_out);
        // the latch's next-state variable resolves to the gate output
        let latch_next = problem.vars.vars_of(VarKind::NextState)[1];
        assert_eq!(Lit::positive(latch_next).apply(&map), and_out);
    }

    #[test]
    fn solver_e_expansion_is_equisatisfiable() {
        let problem = example();
        let vars = &problem.vars;
        let mut expander = Expander::new(&problem.enc, vars, 1 << 30, CancelToken::new());

        // with W = safe states, the adversary can leave W (via x = 1)
        let win = problem.enc.safe.clone();
        let mut session = SatSession::new();
        expander
            .load_solver_e(&win, &problem.enc, vars, &mut session, false)
            .unwrap();
        assert!(session.is_sat(&[]));

        // with W = {err = 0, x = 0}, the controller always has an answer,
        // so the expansion over all controllables must be unsatisfiable
        let mut win = problem.enc.safe.clone();
        let latch = vars.vars_of(VarKind::PresState)[1];
        win.add_unit(Lit::negative(latch));
        let mut session = SatSession::new();
        expander
            .load_solver_e(&win, &problem.enc, vars, &mut session, false)
            .unwrap();
        assert!(!session.is_sat(&[]));
    }

    #[test]
    fn solver_c_expansion_doubles_the_copies() {
        let problem = example();
        let vars = &problem.vars;
        let mut expander = Expander::new(&problem.enc, vars, 1 << 30, CancelToken::new());
        let mut session = SatSession::new();
        expander.init_solver_c(&problem.enc, vars, 1, &mut session);
        assert_eq!(expander.c_rename_maps.len(), 2);
    }

    #[test]
    fn cancellation_aborts_expansion() {
        let problem = example();
        let vars = &problem.vars;
        let token = CancelToken::new();
        token.cancel();
        let mut expander = Expander::new(&problem.enc, vars, 1 << 30, token);
        let mut session = SatSession::new();
        let result = expander.load_solver_e(
            &problem.enc.safe,
            &problem.enc,
            vars,
            &mut session,
            true,
        );
        assert_eq!(result, Err(ExpansionStop::Cancelled));
    }
}
