//! The outer search over chip sizes and horizons.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::backend::{Backend, CheckResult, VarisatBackend};
use crate::constraints::Encoder;
use crate::dag::Dag;
use crate::error::SynthesisError;
use crate::extract::{Schedule, Solved};
use crate::grid::Geometry;
use crate::location::Coord;
use crate::variables::VariableModel;

/// Bounds and knobs for a [`Synthesizer`].
///
/// Missing upper bounds fall back to the limits of the [`Dag`] being searched.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Narrowest chip to try.
    pub min_width: Coord,
    /// Shortest chip to try.
    pub min_height: Coord,
    /// Shortest horizon to try.
    pub min_time: Coord,
    /// Widest chip to try, if not the graph's limit.
    pub max_width: Option<Coord>,
    /// Tallest chip to try, if not the graph's limit.
    pub max_height: Option<Coord>,
    /// Longest horizon to try, if not the graph's limit.
    pub max_time: Option<Coord>,
    /// Ask the backend for a model with as few actions as it can find in the time budget.
    pub minimize_actions: bool,
    /// Handed to the backend for every trial; never preempts a running check.
    pub trial_time_budget: Option<Duration>,
    /// Give up as exhausted after this many trials.
    pub max_trials: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_width: 1,
            min_height: 1,
            min_time: 1,
            max_width: None,
            max_height: None,
            max_time: None,
            minimize_actions: true,
            trial_time_budget: None,
            max_trials: None,
        }
    }
}

impl SearchConfig {
    /// Search from `geometry` up to twice its width and height and up to 30 timesteps.
    pub fn starting_from(geometry: Geometry) -> Self {
        Self {
            min_width: geometry.w(),
            min_height: geometry.h(),
            min_time: geometry.t(),
            max_width: Some(2 * geometry.w()),
            max_height: Some(2 * geometry.h()),
            max_time: Some(geometry.t().max(30)),
            ..Self::default()
        }
    }

    /// The smallest and largest geometries to try for `dag`.
    fn bounds(&self, dag: &Dag) -> Result<(Geometry, Geometry), SynthesisError> {
        let limits = dag.limits();
        let lower = Geometry::from_extents(self.min_width, self.min_height, self.min_time)
            .ok_or_else(|| SynthesisError::InvalidConfig("lower bounds must be positive".to_string()))?;
        let upper = Geometry::from_extents(
            self.max_width.unwrap_or(limits.w()),
            self.max_height.unwrap_or(limits.h()),
            self.max_time.unwrap_or(limits.t()),
        ).ok_or_else(|| SynthesisError::InvalidConfig("upper bounds must be positive".to_string()))?;

        if lower.w() > upper.w() || lower.h() > upper.h() || lower.t() > upper.t() {
            return Err(SynthesisError::InvalidConfig(format!("lower bound ({lower}) exceeds upper bound ({upper})")));
        }

        Ok((lower, upper))
    }
}

/// Terminal states of [`Synthesizer::search`].
pub enum SearchOutcome<'a, B: Backend> {
    /// The first satisfiable trial.
    Solved(Solved<'a, B>),
    /// Every trial within bounds was unsatisfiable or undecided.
    Exhausted { trials: usize },
}

impl<'a, B: Backend> SearchOutcome<'a, B> {
    /// The winning trial, if any.
    pub fn solved(self) -> Option<Solved<'a, B>> {
        match self {
            Self::Solved(solved) => Some(solved),
            Self::Exhausted { .. } => None,
        }
    }

    /// The winning schedule, or the unsolved [`Schedule::default`] if the search ran dry.
    pub fn schedule(&self) -> Result<Schedule, SynthesisError> {
        match self {
            Self::Solved(solved) => solved.schedule(),
            Self::Exhausted { .. } => Ok(Schedule::default()),
        }
    }
}

/// Drives trials over growing chips until one is satisfiable.
///
/// Each trial gets a fresh backend from `make_backend`, so nothing leaks between trials
/// except the [`Dag`], which is only ever read.
pub struct Synthesizer<'a, B, F>
where
    B: Backend,
    F: FnMut() -> B,
{
    dag: &'a Dag,
    config: SearchConfig,
    make_backend: F,
}

impl<'a> Synthesizer<'a, VarisatBackend, fn() -> VarisatBackend> {
    /// Search `dag` with a fresh [`VarisatBackend`] per trial.
    pub fn with_varisat(dag: &'a Dag, config: SearchConfig) -> Self {
        Self::new(dag, config, VarisatBackend::new)
    }
}

impl<'a, B, F> Synthesizer<'a, B, F>
where
    B: Backend,
    F: FnMut() -> B,
{
    /// Search `dag` within `config`, calling `make_backend` once per trial.
    pub fn new(dag: &'a Dag, config: SearchConfig, make_backend: F) -> Self {
        Self { dag, config, make_backend }
    }

    /// The bounds this synthesizer searches within.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Try geometries width-major, then height, then time, and stop at the first satisfiable one.
    pub fn search(&mut self) -> Result<SearchOutcome<'a, B>, SynthesisError> {
        let (lower, upper) = self.config.bounds(self.dag)?;
        info!("searching {} from ({lower}) to ({upper})", self.dag.name());

        let mut trials = 0;
        for width in lower.w()..=upper.w() {
            for height in lower.h()..=upper.h() {
                for time in lower.t()..=upper.t() {
                    if self.config.max_trials.is_some_and(|max| trials >= max) {
                        warn!("giving up after {trials} trials");
                        return Ok(SearchOutcome::Exhausted { trials });
                    }
                    trials += 1;

                    let geometry = Geometry::from_extents(width, height, time)
                        .ok_or_else(|| SynthesisError::InvalidConfig(format!("empty trial w={width}, h={height}, t={time}")))?;
                    if let Some(solved) = self.solve_fixed(geometry)? {
                        return Ok(SearchOutcome::Solved(solved));
                    }
                }
            }
        }

        info!("no solution for {} within ({upper}) after {trials} trials", self.dag.name());
        Ok(SearchOutcome::Exhausted { trials })
    }

    /// Run exactly one trial on `geometry`.
    pub fn solve_fixed(&mut self, geometry: Geometry) -> Result<Option<Solved<'a, B>>, SynthesisError> {
        let started = Instant::now();
        let mut backend = (self.make_backend)();
        backend.set_time_budget(self.config.trial_time_budget);

        let vars = VariableModel::build(&backend, self.dag, geometry)?;
        let terms = Encoder::new(self.dag, &vars, &backend).encode();
        debug!("asserting {} terms for trial ({geometry})", terms.len());
        for term in terms {
            backend.assert(term).map_err(|e| SynthesisError::backend(geometry, e))?;
        }
        if self.config.minimize_actions {
            backend.minimize(vars.action_count()).map_err(|e| SynthesisError::backend(geometry, e))?;
        }

        let result = backend.check().map_err(|e| SynthesisError::backend(geometry, e))?;
        let elapsed = started.elapsed();
        if let Some(budget) = self.config.trial_time_budget.filter(|budget| elapsed > *budget) {
            warn!("trial ({geometry}) overran its budget of {}ms", budget.as_millis());
        }

        match result {
            CheckResult::Sat => {
                info!("sat ({geometry}) in {}ms", elapsed.as_millis());
                Ok(Some(Solved::new(backend, vars, geometry, self.dag)))
            }
            CheckResult::Unsat => {
                info!("unsat ({geometry}) in {}ms", elapsed.as_millis());
                Ok(None)
            }
            CheckResult::Unknown => {
                warn!("unknown ({geometry}) after {}ms, moving on", elapsed.as_millis());
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use rstest::rstest;

    use crate::backend::recording::RecordingBackend;
    use crate::backend::CheckResult;
    use crate::builder::{DagBuilder, Operation};
    use crate::dag::Dag;
    use crate::error::SynthesisError;
    use crate::grid::Geometry;

    use super::{SearchConfig, SearchOutcome, Synthesizer};

    fn straight(limits: (usize, usize, usize)) -> Dag {
        DagBuilder::new("straight")
            .with_limits(limits.0, limits.1, limits.2)
            .add_node(0, Operation::Dispense { label: "D".to_string(), fluid: "water".to_string(), volume: 1 })
            .add_node(1, Operation::Output { label: "S".to_string(), sink_name: "waste".to_string() })
            .add_edge(0, 1)
            .build()
            .unwrap()
    }

    /// A backend factory answering `answers` in order and recording the trial count.
    fn scripted(answers: Vec<CheckResult>, seen: &RefCell<usize>) -> impl FnMut() -> RecordingBackend + '_ {
        let mut answers = answers.into_iter();
        move || {
            *seen.borrow_mut() += 1;
            RecordingBackend { response: Some(answers.next().unwrap_or(CheckResult::Unsat)), ..Default::default() }
        }
    }

    #[test]
    fn trials_run_width_then_height_then_time() {
        let _ = env_logger::try_init();
        let dag = straight((2, 2, 2));
        let seen = RefCell::new(0);
        let answers = vec![CheckResult::Unsat, CheckResult::Unknown, CheckResult::Unsat, CheckResult::Sat];
        let mut synthesizer = Synthesizer::new(&dag, SearchConfig::default(), scripted(answers, &seen));

        let solved = synthesizer.search().unwrap().solved().unwrap();
        // (1,1,1) (1,1,2) (1,2,1) then (1,2,2)
        assert_eq!(solved.geometry(), Geometry::from_extents(1, 2, 2).unwrap());
        assert_eq!(*seen.borrow(), 4);
    }

    #[test]
    fn exhaustion_is_not_an_error() {
        let dag = straight((2, 1, 3));
        let seen = RefCell::new(0);
        let mut synthesizer = Synthesizer::new(&dag, SearchConfig::default(), scripted(vec![], &seen));
        assert!(matches!(synthesizer.search().unwrap(), SearchOutcome::Exhausted { trials: 6 }));
        assert_eq!(*seen.borrow(), 6);
    }

    #[test]
    fn trial_limit_ends_the_search() {
        let dag = straight((5, 5, 5));
        let seen = RefCell::new(0);
        let config = SearchConfig { max_trials: Some(3), ..Default::default() };
        let mut synthesizer = Synthesizer::new(&dag, config, scripted(vec![], &seen));
        assert!(matches!(synthesizer.search().unwrap(), SearchOutcome::Exhausted { trials: 3 }));
        assert_eq!(*seen.borrow(), 3);
    }

    #[test]
    fn minimization_is_requested_on_demand() {
        let dag = straight((2, 2, 2));
        let geometry = Geometry::from_extents(2, 1, 2).unwrap();
        for minimize_actions in [true, false] {
            let config = SearchConfig { minimize_actions, ..Default::default() };
            let make = || RecordingBackend { response: Some(CheckResult::Sat), ..Default::default() };
            let solved = Synthesizer::new(&dag, config, make).solve_fixed(geometry).unwrap().unwrap();
            assert_eq!(solved.backend().objective.is_some(), minimize_actions);
            assert!(!solved.backend().assertions.is_empty());
        }
    }

    #[test]
    fn backend_faults_abort_with_the_trial() {
        let dag = straight((2, 2, 2));
        let make = || RecordingBackend::default();
        let error = Synthesizer::new(&dag, SearchConfig::default(), make).search().err().unwrap();
        assert!(matches!(error, SynthesisError::Backend { geometry, .. } if geometry == Geometry::from_extents(1, 1, 1).unwrap()));
    }

    #[rstest]
    #[case(SearchConfig { min_width: 0, ..Default::default() })]
    #[case(SearchConfig { min_time: 4, max_time: Some(3), ..Default::default() })]
    #[case(SearchConfig { max_height: Some(0), ..Default::default() })]
    fn rejects_inverted_or_empty_bounds(#[case] config: SearchConfig) {
        let dag = straight((2, 2, 2));
        let make = || RecordingBackend::default();
        assert!(matches!(Synthesizer::new(&dag, config, make).search(), Err(SynthesisError::InvalidConfig(_))));
    }

    #[test]
    fn starting_from_doubles_the_chip() {
        let config = SearchConfig::starting_from(Geometry::from_extents(3, 2, 5).unwrap());
        assert_eq!((config.min_width, config.min_height, config.min_time), (3, 2, 5));
        assert_eq!((config.max_width, config.max_height, config.max_time), (Some(6), Some(4), Some(30)));
        assert!(config.minimize_actions);
    }
}
