//! The satisfiability boundary.
//!
//! Everything above this module speaks in terms of [`Backend`]: declare named boolean constants,
//! combine them with the usual connectives and cardinality builders, assert, check and read back a model.
//! [`VarisatBackend`] discharges the formulas with the `varisat` CDCL solver.

use std::fmt::Display;
use std::time::Duration;

pub use sat::{BackendError, VarisatBackend};

mod sat;
#[cfg(test)]
pub(crate) mod recording;

/// Outcome of [`Backend::check`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CheckResult {
    /// A model exists and can be read back.
    Sat,
    /// No model exists.
    Unsat,
    /// The backend gave up without deciding; treated like an unsatisfiable trial by the search.
    Unknown,
}

/// A boolean satisfiability engine with reified cardinality terms and a sum-of-booleans objective.
///
/// Term builders take `&self` so that a formula can be assembled while the backend is shared;
/// anything that changes what is asserted takes `&mut self`.
pub trait Backend {
    /// A boolean term.
    type Bool: Clone;
    /// A sum of boolean terms.
    type Int: Clone;
    /// What a failing call reports.
    type Error: Display;

    /// The constant `value`.
    fn build_bool_lit(&self, value: bool) -> Self::Bool;
    /// Negation.
    fn build_not(&self, arg: Self::Bool) -> Self::Bool;
    /// Conjunction; true when `args` is empty.
    fn build_and(&self, args: &[Self::Bool]) -> Self::Bool;
    /// Disjunction; false when `args` is empty.
    fn build_or(&self, args: &[Self::Bool]) -> Self::Bool;

    /// `premise -> conclusion`.
    fn build_implies(&self, premise: Self::Bool, conclusion: Self::Bool) -> Self::Bool {
        self.build_or(&[self.build_not(premise), conclusion])
    }

    /// True iff at most `k` of `args` hold.
    fn build_at_most(&self, args: &[Self::Bool], k: usize) -> Self::Bool;
    /// True iff at least `k` of `args` hold.
    fn build_at_least(&self, args: &[Self::Bool], k: usize) -> Self::Bool;

    /// True iff exactly `k` of `args` hold.
    fn build_exactly(&self, args: &[Self::Bool], k: usize) -> Self::Bool {
        self.build_and(&[self.build_at_most(args, k), self.build_at_least(args, k)])
    }

    /// Declare a fresh boolean constant. Names are unique per backend.
    fn declare_bool_const(&self, name: &str) -> Result<Self::Bool, Self::Error>;
    /// Declare an integer equal to the number of `terms` that hold.
    fn declare_counter(&self, name: &str, terms: &[Self::Bool]) -> Result<Self::Int, Self::Error>;

    /// Require `term` to hold in every model.
    fn assert(&mut self, term: Self::Bool) -> Result<(), Self::Error>;
    /// Ask [`Self::check`] to return a model minimizing `counter` rather than any model.
    fn minimize(&mut self, counter: &Self::Int) -> Result<(), Self::Error>;
    /// Wall-clock allowance for one [`Self::check`]. Backends may overrun it; it is never preemptive.
    fn set_time_budget(&mut self, budget: Option<Duration>);

    /// Decide whether everything asserted so far can hold at once.
    fn check(&mut self) -> Result<CheckResult, Self::Error>;
    /// Value of `term` in the model found by the last satisfiable [`Self::check`].
    fn get_bool(&self, term: &Self::Bool) -> Result<bool, Self::Error>;
    /// Value of `counter` in the model found by the last satisfiable [`Self::check`].
    fn get_int(&self, counter: &Self::Int) -> Result<usize, Self::Error>;
}
