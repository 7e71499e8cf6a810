//! Registry for all Boolean variables of a synthesis problem.

use std::fmt;

use fixedbitset::FixedBitSet;

use crate::aig::{aiger_strip, Aig};
use crate::cnf::{identity_map, Lit, Var};

/// The role of a variable. Kinds drive quantifier placement and the decisions
/// of the universal expander.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VarKind {
    /// A present-state variable.
    PresState,
    /// A next-state variable.
    NextState,
    /// An uncontrollable input.
    Input,
    /// A controllable input.
    Ctrl,
    /// A temporary variable.
    Tmp,
    /// A template parameter.
    Param,
    /// A previous-time-step copy of a state variable.
    Prev,
}

/// Descriptor of a single variable.
#[derive(Debug, Clone)]
pub struct VarInfo {
    /// The variable itself.
    pub var: Var,
    /// The kind of the variable.
    pub kind: VarKind,
    /// The AIGER literal this variable was created for, or 0.
    pub aig_lit: u32,
    /// A display name, if any.
    pub name: Option<String>,
}

/// A checkpoint of the registry. All variables created after the mark can be
/// discarded with [`VarStore::release`].
#[derive(Debug, Copy, Clone)]
pub struct Mark {
    max_var: Var,
}

/// Stores every variable that has been created, with dense ids starting at 1.
///
/// Variable 1 is always the constant-true variable. The store is an
/// explicitly passed context value; procedures that create many short-lived
/// temporaries bracket themselves with [`VarStore::mark`] and
/// [`VarStore::release`].
#[derive(Debug, Clone)]
pub struct VarStore {
    infos: Vec<VarInfo>,
    aig_to_cnf: Vec<Lit>,
    pres: Vec<Var>,
    next: Vec<Var>,
    inputs: Vec<Var>,
    ctrl: Vec<Var>,
    tmp: Vec<Var>,
    params: Vec<Var>,
    prev: Vec<Var>,
}

impl VarStore {
    /// Returns a new store containing only the constant-true variable.
    pub fn new() -> Self {
        let mut store = VarStore {
            infos: Vec::new(),
            aig_to_cnf: Vec::new(),
            pres: Vec::new(),
            next: Vec::new(),
            inputs: Vec::new(),
            ctrl: Vec::new(),
            tmp: Vec::new(),
            params: Vec::new(),
            prev: Vec::new(),
        };
        let t = store.alloc(VarKind::Tmp, 1, Some("TRUE".to_string()));
        debug_assert_eq!(Lit::positive(t), Lit::TRUE);
        store
    }

    fn alloc(&mut self, kind: VarKind, aig_lit: u32, name: Option<String>) -> Var {
        let var = self.infos.len() as Var + 1;
        self.infos.push(VarInfo {
            var,
            kind,
            aig_lit,
            name,
        });
        self.kind_list_mut(kind).push(var);
        var
    }

    fn kind_list_mut(&mut self, kind: VarKind) -> &mut Vec<Var> {
        match kind {
            VarKind::PresState => &mut self.pres,
            VarKind::NextState => &mut self.next,
            VarKind::Input => &mut self.inputs,
            VarKind::Ctrl => &mut self.ctrl,
            VarKind::Tmp => &mut self.tmp,
            VarKind::Param => &mut self.params,
            VarKind::Prev => &mut self.prev,
        }
    }

    fn set_kind(&mut self, var: Var, kind: VarKind) {
        let old = self.infos[var as usize - 1].kind;
        if old == kind {
            return;
        }
        self.kind_list_mut(old).retain(|&v| v != var);
        self.infos[var as usize - 1].kind = kind;
        self.kind_list_mut(kind).push(var);
    }

    fn set_name(&mut self, var: Var, name: String) {
        self.infos[var as usize - 1].name = Some(name);
    }

    /// Initializes a store from an AIGER circuit and the set of referenced
    /// AIGER literals (both polarities).
    ///
    /// A synthetic error-bit state variable becomes the first state variable;
    /// its next-state function is wired to the circuit output by the bridge.
    pub fn init_from_aig(aig: &Aig, refs: &FixedBitSet) -> Self {
        let mut store = VarStore::new();
        store.aig_to_cnf = vec![Lit::default(); 2 * (aig.maxvar() as usize + 1)];
        store.aig_to_cnf[0] = Lit::FALSE;
        store.aig_to_cnf[1] = Lit::TRUE;

        // one variable per referenced AIGER variable
        for var in 1..=aig.maxvar() {
            let lit = 2 * var;
            if refs[lit as usize] || refs[lit as usize + 1] {
                let cnf = store.alloc(VarKind::Tmp, lit, None);
                store.aig_to_cnf[lit as usize] = Lit::positive(cnf);
                store.aig_to_cnf[lit as usize + 1] = Lit::negative(cnf);
            }
        }

        // partition the inputs by their symbol name
        for (idx, input) in aig.inputs().iter().enumerate() {
            let lit = input.lit;
            if !refs[lit as usize] && !refs[lit as usize + 1] {
                continue;
            }
            let var = store.aig_to_cnf[lit as usize].var();
            let aig_name = input.name.clone().unwrap_or_default();
            if Aig::is_controllable_name(&aig_name) {
                store.set_kind(var, VarKind::Ctrl);
                store.set_name(var, format!("c_{}({})", idx, aig_name));
            } else {
                store.set_kind(var, VarKind::Input);
                store.set_name(var, format!("i_{}({})", idx, aig_name));
            }
        }

        let output_lit = aig.outputs()[0].lit;
        let output_var = store.aig_to_cnf[aiger_strip(output_lit) as usize].var();
        if output_lit & 1 == 0 {
            store.set_name(output_var, "error_output".to_string());
        } else {
            store.set_name(output_var, "neg_error_output".to_string());
        }

        // the error output is latched to make it part of the state space
        store.alloc(VarKind::PresState, 0, Some("pres_error".to_string()));
        store.alloc(VarKind::NextState, 0, Some("next_error".to_string()));

        for (idx, latch) in aig.latches().iter().enumerate() {
            let var = store.aig_to_cnf[latch.lit as usize].var();
            store.set_kind(var, VarKind::PresState);
            let name = match &latch.name {
                Some(name) => format!("x_{}({})", idx, name),
                None => format!("x_{}", idx),
            };
            store.set_name(var, name);

            let next_name = match &latch.name {
                Some(name) => format!("x'_{}({})", idx, name),
                None => format!("x'_{}", idx),
            };
            store.alloc(VarKind::NextState, latch.next, Some(next_name));
        }

        store
    }

    /// Returns the largest variable created so far.
    pub fn max_var(&self) -> Var {
        self.infos.len() as Var
    }

    /// Returns the descriptor of a variable.
    pub fn info(&self, var: Var) -> &VarInfo {
        &self.infos[var as usize - 1]
    }

    /// Returns the kind of a variable.
    pub fn kind(&self, var: Var) -> VarKind {
        self.infos[var as usize - 1].kind
    }

    /// Returns the CNF literal for an AIGER literal.
    ///
    /// The AIGER literal must have been referenced when the store was built.
    pub fn aig_to_cnf_lit(&self, aig_lit: u32) -> Lit {
        self.try_aig_to_cnf_lit(aig_lit)
            .expect("unreferenced aiger literal")
    }

    /// Returns the CNF literal for an AIGER literal, or `None` if the
    /// literal was never referenced.
    pub fn try_aig_to_cnf_lit(&self, aig_lit: u32) -> Option<Lit> {
        let lit = self.aig_to_cnf.get(aig_lit as usize).copied()?;
        if lit == Lit::default() {
            None
        } else {
            Some(lit)
        }
    }

    /// Returns all variables of the given kind, in creation order.
    pub fn vars_of(&self, kind: VarKind) -> &[Var] {
        match kind {
            VarKind::PresState => &self.pres,
            VarKind::NextState => &self.next,
            VarKind::Input => &self.inputs,
            VarKind::Ctrl => &self.ctrl,
            VarKind::Tmp => &self.tmp,
            VarKind::Param => &self.params,
            VarKind::Prev => &self.prev,
        }
    }

    /// Returns the positive literals of all variables of the given kind.
    pub fn lits_of(&self, kind: VarKind) -> Vec<Lit> {
        self.vars_of(kind).iter().map(|&v| Lit::positive(v)).collect()
    }

    /// Returns the positive literals of all present-state variables.
    pub fn pres_lits(&self) -> Vec<Lit> {
        self.lits_of(VarKind::PresState)
    }

    /// Returns all variables that are not temporaries.
    pub fn all_non_tmp_vars(&self) -> Vec<Var> {
        let mut vars = Vec::new();
        vars.extend_from_slice(&self.pres);
        vars.extend_from_slice(&self.next);
        vars.extend_from_slice(&self.inputs);
        vars.extend_from_slice(&self.ctrl);
        vars.extend_from_slice(&self.params);
        vars.extend_from_slice(&self.prev);
        vars
    }

    /// The present-state variable of the error bit.
    pub fn pres_error_var(&self) -> Var {
        self.pres[0]
    }

    /// The next-state variable of the error bit.
    pub fn next_error_var(&self) -> Var {
        self.next[0]
    }

    /// Creates a fresh temporary variable.
    pub fn fresh_tmp(&mut self) -> Var {
        self.alloc(VarKind::Tmp, 0, None)
    }

    /// Creates a fresh named temporary variable.
    pub fn fresh_tmp_named(&mut self, name: &str) -> Var {
        self.alloc(VarKind::Tmp, 0, Some(name.to_string()))
    }

    /// Creates a fresh previous-time-step variable.
    pub fn fresh_prev(&mut self) -> Var {
        self.alloc(VarKind::Prev, 0, None)
    }

    /// Creates a fresh template parameter variable.
    pub fn fresh_param(&mut self) -> Var {
        self.alloc(VarKind::Param, 0, None)
    }

    /// Creates a fresh present-state/next-state variable pair.
    ///
    /// Mainly useful for constructing problems programmatically in tests.
    pub fn new_state_pair(&mut self) -> (Var, Var) {
        let pres = self.alloc(VarKind::PresState, 0, None);
        let next = self.alloc(VarKind::NextState, 0, None);
        (pres, next)
    }

    /// Returns the map that exchanges present-state and next-state variables
    /// and leaves everything else unchanged.
    pub fn present_next_map(&self) -> Vec<Lit> {
        let mut map = identity_map(self.max_var());
        for (&p, &n) in self.pres.iter().zip(self.next.iter()) {
            map[p as usize] = Lit::positive(n);
            map[n as usize] = Lit::positive(p);
        }
        map
    }

    /// Takes a checkpoint of the registry.
    pub fn mark(&self) -> Mark {
        Mark {
            max_var: self.max_var(),
        }
    }

    /// Discards all variables created after the given mark. Can be called
    /// repeatedly for the same mark.
    pub fn release(&mut self, mark: Mark) {
        let keep = mark.max_var;
        if self.max_var() <= keep {
            return;
        }
        self.infos.truncate(keep as usize);
        self.pres.retain(|&v| v <= keep);
        self.next.retain(|&v| v <= keep);
        self.inputs.retain(|&v| v <= keep);
        self.ctrl.retain(|&v| v <= keep);
        self.tmp.retain(|&v| v <= keep);
        self.params.retain(|&v| v <= keep);
        self.prev.retain(|&v| v <= keep);
    }
}

impl Default for VarStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VarStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} vars: {} state, {} input, {} ctrl, {} tmp",
            self.max_var(),
            self.pres.len(),
            self.inputs.len(),
            self.ctrl.len(),
            self.tmp.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_true_is_var_one() {
        let store = VarStore::new();
        assert_eq!(store.max_var(), 1);
        assert_eq!(store.kind(1), VarKind::Tmp);
    }

    #[test]
    fn mark_release_discards_temporaries() {
        let mut store = VarStore::new();
        let (pres, next) = store.new_state_pair();
        let mark = store.mark();
        store.fresh_tmp();
        store.fresh_prev();
        assert_eq!(store.max_var(), 5);
        store.release(mark);
        assert_eq!(store.max_var(), 3);
        assert_eq!(store.vars_of(VarKind::Prev), &[] as &[Var]);
        assert_eq!(store.vars_of(VarKind::PresState), &[pres]);
        assert_eq!(store.vars_of(VarKind::NextState), &[next]);
        // a release is repeatable
        store.fresh_tmp();
        store.release(mark);
        assert_eq!(store.max_var(), 3);
    }

    #[test]
    fn present_next_swap_is_an_involution() {
        let mut store = VarStore::new();
        let (p, n) = store.new_state_pair();
        let map = store.present_next_map();
        assert_eq!(Lit::positive(p).apply(&map), Lit::positive(n));
        assert_eq!(Lit::negative(n).apply(&map), Lit::negative(p));
        assert_eq!(Lit::positive(n).apply(&map).apply(&map), Lit::positive(n));
    }
}
