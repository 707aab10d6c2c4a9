use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use itertools::Itertools;
use log::{debug, warn};
use thiserror::Error;
use varisat::{ExtendFormula, Lit, Solver};

use super::{Backend, CheckResult};
use crate::logic::{and_gate, Totalizer};

/// Reasons a [`VarisatBackend`] may fail.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The underlying solver reported an internal failure.
    #[error("solver failure: {0}")]
    Solver(String),
    /// A name was declared twice on one backend.
    #[error("symbol {0} declared twice")]
    DuplicateSymbol(String),
    /// A model was requested before a satisfiable check.
    #[error("no model available")]
    NoModel,
}

/// [`Backend`] over the `varisat` CDCL solver.
///
/// Every connective is Tseitin-encoded as soon as it is built, folding constants on the way,
/// and every cardinality term is reified through a [`Totalizer`].
/// Minimization tightens the objective one step at a time under assumptions, keeping the best model found.
pub struct VarisatBackend(RefCell<SatState>);

struct SatState {
    solver: Solver<'static>,
    // asserted at construction; its negation is the constant false
    truth: Lit,
    declares: BTreeSet<String>,
    objective: Option<Vec<Lit>>,
    budget: Option<Duration>,
    model: Option<Vec<Lit>>,
}

impl Default for VarisatBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl VarisatBackend {
    /// A backend with nothing asserted.
    pub fn new() -> Self {
        let mut solver = Solver::new();
        let truth = solver.new_lit();
        solver.add_clause(&[truth]);

        Self(RefCell::new(SatState {
            solver,
            truth,
            declares: BTreeSet::new(),
            objective: None,
            budget: None,
            model: None,
        }))
    }

    fn state(&self) -> Ref<'_, SatState> {
        self.0.borrow()
    }

    fn state_mut(&self) -> RefMut<'_, SatState> {
        self.0.borrow_mut()
    }

    fn truth(&self) -> Lit {
        self.state().truth
    }

    /// Split `args` into the non-constant literals and the number of constant truths among them.
    fn fold(&self, args: &[Lit]) -> (Vec<Lit>, usize) {
        let truth = self.truth();
        let trues = args.iter().filter(|arg| **arg == truth).count();
        let live = args.iter().filter(|arg| arg.var() != truth.var()).copied().collect_vec();
        (live, trues)
    }

    fn totalizer(&self, inputs: &[Lit], cap: usize) -> Totalizer {
        Totalizer::encode(&mut self.state_mut().solver, inputs, cap)
    }
}

fn value(model: &[Lit], lit: Lit) -> bool {
    // variables the solver never saw are unconstrained; read them as false
    model.get(lit.var().index()).map_or(lit.is_negative(), |assigned| *assigned == lit)
}

fn solver_error(error: impl std::fmt::Display) -> BackendError {
    BackendError::Solver(error.to_string())
}

impl Backend for VarisatBackend {
    type Bool = Lit;
    type Int = Vec<Lit>;
    type Error = BackendError;

    fn build_bool_lit(&self, value: bool) -> Self::Bool {
        let truth = self.truth();
        if value { truth } else { !truth }
    }

    fn build_not(&self, arg: Self::Bool) -> Self::Bool {
        !arg
    }

    fn build_and(&self, args: &[Self::Bool]) -> Self::Bool {
        let truth = self.truth();
        if args.contains(&!truth) {
            return !truth;
        }

        let inputs = args.iter().filter(|arg| **arg != truth).copied().sorted().dedup().collect_vec();
        // complementary literals sort next to each other
        if inputs.iter().tuple_windows().any(|(a, b)| a.var() == b.var()) {
            return !truth;
        }

        match inputs.as_slice() {
            [] => truth,
            [single] => *single,
            _ => {
                let mut state = self.state_mut();
                let output = state.solver.new_lit();
                for clause in and_gate(output, &inputs) {
                    state.solver.add_clause(&clause);
                }
                output
            }
        }
    }

    fn build_or(&self, args: &[Self::Bool]) -> Self::Bool {
        !self.build_and(&args.iter().map(|arg| !*arg).collect_vec())
    }

    fn build_at_most(&self, args: &[Self::Bool], k: usize) -> Self::Bool {
        let (live, trues) = self.fold(args);
        let Some(k) = k.checked_sub(trues) else {
            return self.build_bool_lit(false);
        };

        if k >= live.len() {
            self.build_bool_lit(true)
        } else if k == 0 {
            self.build_and(&live.iter().map(|arg| !*arg).collect_vec())
        } else {
            match self.totalizer(&live, k + 1).at_least(k + 1) {
                Some(over) => !over,
                None => self.build_bool_lit(true),
            }
        }
    }

    fn build_at_least(&self, args: &[Self::Bool], k: usize) -> Self::Bool {
        let (live, trues) = self.fold(args);
        if k <= trues {
            return self.build_bool_lit(true);
        }

        let k = k - trues;
        if k > live.len() {
            self.build_bool_lit(false)
        } else if k == 1 {
            self.build_or(&live)
        } else if k == live.len() {
            self.build_and(&live)
        } else {
            self.totalizer(&live, k).at_least(k).unwrap_or_else(|| self.build_bool_lit(false))
        }
    }

    fn declare_bool_const(&self, name: &str) -> Result<Self::Bool, Self::Error> {
        let mut state = self.state_mut();
        if !state.declares.insert(name.to_owned()) {
            return Err(BackendError::DuplicateSymbol(name.to_owned()));
        }
        Ok(state.solver.new_lit())
    }

    fn declare_counter(&self, name: &str, terms: &[Self::Bool]) -> Result<Self::Int, Self::Error> {
        let falsity = !self.truth();
        let mut state = self.state_mut();
        if !state.declares.insert(name.to_owned()) {
            return Err(BackendError::DuplicateSymbol(name.to_owned()));
        }
        Ok(terms.iter().filter(|term| **term != falsity).copied().collect())
    }

    fn assert(&mut self, term: Self::Bool) -> Result<(), Self::Error> {
        let mut state = self.state_mut();
        if term != state.truth {
            state.solver.add_clause(&[term]);
        }
        Ok(())
    }

    fn minimize(&mut self, counter: &Self::Int) -> Result<(), Self::Error> {
        self.state_mut().objective = Some(counter.clone());
        Ok(())
    }

    fn set_time_budget(&mut self, budget: Option<Duration>) {
        self.state_mut().budget = budget;
    }

    fn check(&mut self) -> Result<CheckResult, Self::Error> {
        let started = Instant::now();
        let mut state = self.state_mut();
        let state = &mut *state;
        state.model = None;

        state.solver.assume(&[]);
        if !state.solver.solve().map_err(solver_error)? {
            return Ok(CheckResult::Unsat);
        }
        let mut model = state.solver.model().ok_or(BackendError::NoModel)?;

        if let Some(objective) = &state.objective {
            let mut best = objective.iter().filter(|lit| value(&model, **lit)).count();
            debug!("first model has objective {best}");

            if best > 0 {
                let totalizer = Totalizer::encode(&mut state.solver, objective, best);
                while let Some(bound) = totalizer.at_least(best) {
                    if let Some(budget) = state.budget.filter(|budget| started.elapsed() >= *budget) {
                        warn!("time budget of {}ms spent, keeping objective {best}", budget.as_millis());
                        break;
                    }

                    // strictly fewer than the best so far
                    state.solver.assume(&[!bound]);
                    if !state.solver.solve().map_err(solver_error)? {
                        break;
                    }
                    model = state.solver.model().ok_or(BackendError::NoModel)?;
                    best = objective.iter().filter(|lit| value(&model, **lit)).count();
                    debug!("improved objective to {best}");
                }
                state.solver.assume(&[]);
            }
        }

        state.model = Some(model);
        Ok(CheckResult::Sat)
    }

    fn get_bool(&self, term: &Self::Bool) -> Result<bool, Self::Error> {
        let state = self.state();
        let model = state.model.as_ref().ok_or(BackendError::NoModel)?;
        Ok(value(model, *term))
    }

    fn get_int(&self, counter: &Self::Int) -> Result<usize, Self::Error> {
        let state = self.state();
        let model = state.model.as_ref().ok_or(BackendError::NoModel)?;
        Ok(counter.iter().filter(|lit| value(model, **lit)).count())
    }
}
