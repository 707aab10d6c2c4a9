use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use super::{Backend, CheckResult};

/// A formula kept as a tree, to be evaluated against a hand-written assignment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Term {
    Const(bool),
    Var(String),
    Not(Box<Term>),
    And(Vec<Term>),
    Or(Vec<Term>),
    AtMost(Vec<Term>, usize),
    AtLeast(Vec<Term>, usize),
}

impl Term {
    /// Unassigned variables are false.
    pub(crate) fn eval(&self, assignment: &HashMap<String, bool>) -> bool {
        let holding = |args: &[Term]| args.iter().filter(|arg| arg.eval(assignment)).count();
        match self {
            Term::Const(value) => *value,
            Term::Var(name) => assignment.get(name).copied().unwrap_or(false),
            Term::Not(arg) => !arg.eval(assignment),
            Term::And(args) => args.iter().all(|arg| arg.eval(assignment)),
            Term::Or(args) => args.iter().any(|arg| arg.eval(assignment)),
            Term::AtMost(args, k) => holding(args) <= *k,
            Term::AtLeast(args, k) => holding(args) >= *k,
        }
    }
}

/// A [`Backend`] that solves nothing: it records what is asserted and answers queries from a fixed assignment.
#[derive(Default)]
pub(crate) struct RecordingBackend {
    pub(crate) declares: RefCell<BTreeSet<String>>,
    pub(crate) assertions: Vec<Term>,
    pub(crate) objective: Option<Vec<Term>>,
    pub(crate) assignment: HashMap<String, bool>,
    pub(crate) response: Option<CheckResult>,
}

impl RecordingBackend {
    pub(crate) fn declared(&self) -> BTreeSet<String> {
        self.declares.borrow().clone()
    }

    /// Make the named variables true; everything else reads false.
    pub(crate) fn set_true<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        self.assignment.extend(names.into_iter().map(|name| (name.to_string(), true)));
    }

    pub(crate) fn violated(&self) -> Vec<&Term> {
        self.assertions.iter().filter(|term| !term.eval(&self.assignment)).collect()
    }
}

impl Backend for RecordingBackend {
    type Bool = Term;
    type Int = Vec<Term>;
    type Error = String;

    fn build_bool_lit(&self, value: bool) -> Self::Bool {
        Term::Const(value)
    }

    fn build_not(&self, arg: Self::Bool) -> Self::Bool {
        Term::Not(Box::new(arg))
    }

    fn build_and(&self, args: &[Self::Bool]) -> Self::Bool {
        Term::And(args.to_vec())
    }

    fn build_or(&self, args: &[Self::Bool]) -> Self::Bool {
        Term::Or(args.to_vec())
    }

    fn build_at_most(&self, args: &[Self::Bool], k: usize) -> Self::Bool {
        Term::AtMost(args.to_vec(), k)
    }

    fn build_at_least(&self, args: &[Self::Bool], k: usize) -> Self::Bool {
        Term::AtLeast(args.to_vec(), k)
    }

    fn declare_bool_const(&self, name: &str) -> Result<Self::Bool, Self::Error> {
        if !self.declares.borrow_mut().insert(name.to_string()) {
            return Err(format!("{name} declared twice"));
        }
        Ok(Term::Var(name.to_string()))
    }

    fn declare_counter(&self, name: &str, terms: &[Self::Bool]) -> Result<Self::Int, Self::Error> {
        if !self.declares.borrow_mut().insert(name.to_string()) {
            return Err(format!("{name} declared twice"));
        }
        Ok(terms.to_vec())
    }

    fn assert(&mut self, term: Self::Bool) -> Result<(), Self::Error> {
        self.assertions.push(term);
        Ok(())
    }

    fn minimize(&mut self, counter: &Self::Int) -> Result<(), Self::Error> {
        self.objective = Some(counter.clone());
        Ok(())
    }

    fn set_time_budget(&mut self, _budget: Option<Duration>) {}

    fn check(&mut self) -> Result<CheckResult, Self::Error> {
        self.response.ok_or_else(|| "no response configured".to_string())
    }

    fn get_bool(&self, term: &Self::Bool) -> Result<bool, Self::Error> {
        Ok(term.eval(&self.assignment))
    }

    fn get_int(&self, counter: &Self::Int) -> Result<usize, Self::Error> {
        Ok(counter.iter().filter(|term| term.eval(&self.assignment)).count())
    }
}
