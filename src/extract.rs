//! Reading a satisfying model back as a schedule.

use std::fmt::{Display, Formatter};

use itertools::{iproduct, Itertools};
use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::cell::{CellState, SlotState};
use crate::dag::{Dag, DropletId, OperationKind};
use crate::error::SynthesisError;
use crate::grid::{Geometry, Slot};
use crate::location::Location;
use crate::variables::VariableModel;

/// A satisfiable trial: the backend holding the model and the variables it was asked about.
///
/// Every view is read straight from the model and leaves the backend untouched, so they may be taken any number of times.
pub struct Solved<'a, B: Backend> {
    backend: B,
    vars: VariableModel<B>,
    geometry: Geometry,
    dag: &'a Dag,
}

impl<'a, B: Backend> Solved<'a, B> {
    pub(crate) fn new(backend: B, vars: VariableModel<B>, geometry: Geometry, dag: &'a Dag) -> Self {
        Self { backend, vars, geometry, dag }
    }

    /// The chip and horizon of the winning trial.
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// The graph that was synthesized.
    pub fn dag(&self) -> &'a Dag {
        self.dag
    }

    /// The backend holding the model.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub(crate) fn variables(&self) -> &VariableModel<B> {
        &self.vars
    }

    fn value(&self, term: &B::Bool) -> Result<bool, SynthesisError> {
        self.backend.get_bool(term).map_err(|e| SynthesisError::backend(self.geometry, e))
    }

    /// The number of busy presence, mixing and detecting variables in the model.
    pub fn action_count(&self) -> Result<usize, SynthesisError> {
        self.backend.get_int(self.vars.action_count()).map_err(|e| SynthesisError::backend(self.geometry, e))
    }

    /// The cell at `location` at time `t`, or [`SynthesisError::OutOfBounds`] if either lies outside the trial.
    pub fn cell(&self, t: usize, location: Location) -> Result<CellState, SynthesisError> {
        if t > self.geometry.t() || !self.geometry.contains(location) {
            return Err(SynthesisError::OutOfBounds { geometry: self.geometry, t, location });
        }

        for node in self.dag.nodes_of_kind(OperationKind::Detector) {
            if self.value(self.vars.detecting(t, node))? && self.value(self.vars.detector(location, self.dag.node(node).module))? {
                return Ok(CellState::Detecting);
            }
        }

        for node in self.dag.nodes_of_kind(OperationKind::Mixer) {
            if self.value(self.vars.mixing(t, location, node))? {
                return Ok(CellState::Mixing);
            }
        }

        for droplet in self.dag.droplets() {
            if self.value(self.vars.presence(t, location, droplet))? {
                return Ok(CellState::Droplet(droplet));
            }
        }

        Ok(CellState::Empty)
    }

    /// Every cell at every timestep, indexed `[t][y][x]`.
    pub fn grid(&self) -> Result<Array3<CellState>, SynthesisError> {
        let (w, h, t) = (self.geometry.w(), self.geometry.h(), self.geometry.t());
        let states = iproduct!(0..=t, 0..h, 0..w)
            .map(|(t, y, x)| self.cell(t, Location(x, y)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Array3::from_shape_vec((t + 1, h, w), states)?)
    }

    /// The module placed at each perimeter slot, clockwise from the top left corner.
    pub fn perimeter(&self) -> Result<Vec<SlotState>, SynthesisError> {
        let mut slots = vec![SlotState::Empty; self.geometry.perimeter()];

        for (slot, state) in self.geometry.slots().zip(slots.iter_mut()) {
            for module in self.dag.module_ids() {
                let label = &self.dag.module(module).label;
                if self.value(self.vars.dispenser(slot, module))? {
                    *state = SlotState::Dispenser(label.clone());
                    break;
                }
                if self.value(self.vars.sink(slot, module))? {
                    *state = SlotState::Sink(label.clone());
                    break;
                }
            }
        }

        Ok(slots)
    }

    /// The label of the detector placed on each cell, indexed `[x][y]`.
    pub fn detector_grid(&self) -> Result<Array2<Option<String>>, SynthesisError> {
        let mut detectors = Array2::from_elem((self.geometry.w(), self.geometry.h()), None);

        for (location, module) in iproduct!(self.geometry.cells(), self.dag.modules_of_kind(OperationKind::Detector).collect_vec()) {
            if self.value(self.vars.detector(location, module))? {
                detectors[[location.0, location.1]] = Some(self.dag.module(module).label.clone());
            }
        }

        Ok(detectors)
    }

    /// Freeze every view into an owned [`Schedule`].
    pub fn schedule(&self) -> Result<Schedule, SynthesisError> {
        Ok(Schedule {
            name: self.dag.name().to_string(),
            geometry: Some(self.geometry),
            grid: self.grid()?,
            perimeter: self.perimeter()?,
            detectors: self.detector_grid()?,
            actions: self.action_count()?,
        })
    }
}

/// An owned, serializable solution.
///
/// The default value stands for "no solution"; see [`Self::is_solved`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Name of the synthesized graph.
    pub name: String,
    /// The winning trial; `None` when there is no solution.
    pub geometry: Option<Geometry>,
    /// `[t][y][x]`
    pub grid: Array3<CellState>,
    /// Clockwise from the top left corner.
    pub perimeter: Vec<SlotState>,
    /// `[x][y]`
    pub detectors: Array2<Option<String>>,
    /// Busy presence, mixing and detecting variables.
    pub actions: usize,
}

impl Schedule {
    /// Whether this holds a solution rather than the sentinel.
    pub fn is_solved(&self) -> bool {
        self.geometry.is_some()
    }

    /// Where `droplet` is at each timestep, if anywhere.
    pub fn trajectory(&self, droplet: DropletId) -> Vec<Option<Location>> {
        self.grid.axis_iter(Axis(0))
            .map(|frame| frame.indexed_iter()
                .find(|(_, state)| **state == CellState::Droplet(droplet))
                .map(|((y, x), _)| Location(x, y)))
            .collect()
    }

    fn slots_holding(&self, matches: impl Fn(&SlotState) -> Option<&String>) -> Vec<(&String, Slot)> {
        self.perimeter.iter()
            .enumerate()
            .filter_map(|(p, state)| matches(state).map(|label| (label, Slot(p))))
            .sorted()
            .collect()
    }
}

impl Display for Schedule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if !self.is_solved() {
            return writeln!(f, "No solution for {}", self.name);
        }

        writeln!(f, "Solution to {}", self.name)?;

        writeln!(f, "Dispenser position(s):")?;
        for (label, slot) in self.slots_holding(|state| match state {
            SlotState::Dispenser(label) => Some(label),
            _ => None,
        }) {
            writeln!(f, "{label} at {}", slot.0)?;
        }
        writeln!(f)?;

        writeln!(f, "Sink position(s):")?;
        for (label, slot) in self.slots_holding(|state| match state {
            SlotState::Sink(label) => Some(label),
            _ => None,
        }) {
            writeln!(f, "{label} at {}", slot.0)?;
        }
        writeln!(f)?;

        writeln!(f, "Detector position(s):")?;
        for ((x, y), label) in self.detectors.indexed_iter() {
            if let Some(label) = label {
                writeln!(f, "{label} at {}", Location(x, y))?;
            }
        }
        writeln!(f)?;

        for (t, frame) in self.grid.axis_iter(Axis(0)).enumerate() {
            writeln!(f, "time = {t}")?;
            for row in frame.rows() {
                writeln!(f, "{}", row.iter().join(" "))?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::recording::RecordingBackend;
    use crate::builder::{DagBuilder, Operation};
    use crate::cell::{CellState, SlotState};
    use crate::dag::{Dag, DropletId};
    use crate::error::SynthesisError;
    use crate::grid::Geometry;
    use crate::location::Location;
    use crate::variables::VariableModel;

    use super::{Schedule, Solved};

    fn detect_chain() -> Dag {
        DagBuilder::new("detect")
            .add_node(0, Operation::Dispense { label: "D".to_string(), fluid: "sample".to_string(), volume: 5 })
            .add_node(1, Operation::Detect { label: "X".to_string(), drops: 1, duration: 1 })
            .add_node(2, Operation::Output { label: "S".to_string(), sink_name: "waste".to_string() })
            .add_edge(0, 1)
            .add_edge(1, 2)
            .build()
            .unwrap()
    }

    fn solved<'a>(dag: &'a Dag, geometry: Geometry, truths: &[&str]) -> Solved<'a, RecordingBackend> {
        let mut backend = RecordingBackend::default();
        let vars = VariableModel::build(&backend, dag, geometry).unwrap();
        backend.set_true(truths.iter().copied());
        Solved::new(backend, vars, geometry, dag)
    }

    // 2x2 chip, perimeter 8: detector on (1, 0); dispenser at slot 7 next to (0, 0), sink at slot 3 next to (1, 1)
    const DETECTION: &[&str] = &[
        "dispenser_(7,0)", "sink_(3,2)", "detector_(1,0,1)",
        "c^1_(0,0,0)", "c^2_(1,0,0)", "detecting^3_(1)", "c^4_(1,0,1)", "c^5_(1,1,1)",
    ];

    #[test]
    fn grid_follows_the_model() {
        let dag = detect_chain();
        let solved = solved(&dag, Geometry::from_extents(2, 2, 6).unwrap(), DETECTION);
        let grid = solved.grid().unwrap();

        assert_eq!(grid.shape(), &[7, 2, 2]);
        assert_eq!(grid[[1, 0, 0]], CellState::Droplet(DropletId(0)));
        assert_eq!(grid[[2, 0, 1]], CellState::Droplet(DropletId(0)));
        assert_eq!(grid[[3, 0, 1]], CellState::Detecting);
        assert_eq!(grid[[5, 1, 1]], CellState::Droplet(DropletId(1)));
        assert_eq!(grid[[6, 1, 1]], CellState::Empty);
        // detecting is tied to the detector cell only
        assert_eq!(grid[[3, 0, 0]], CellState::Empty);
        assert_eq!(grid, solved.grid().unwrap());
    }

    #[test]
    fn detecting_outranks_mixing_outranks_droplets() {
        let dag = detect_chain();
        let mut truths = DETECTION.to_vec();
        truths.push("c^3_(1,0,0)");
        let solved = solved(&dag, Geometry::from_extents(2, 2, 6).unwrap(), &truths);
        assert_eq!(solved.cell(3, Location(1, 0)).unwrap(), CellState::Detecting);
    }

    #[test]
    fn cells_outside_the_trial_are_errors() {
        let dag = detect_chain();
        let solved = solved(&dag, Geometry::from_extents(2, 2, 6).unwrap(), DETECTION);
        assert!(matches!(solved.cell(7, Location(0, 0)), Err(SynthesisError::OutOfBounds { t: 7, .. })));
        assert!(matches!(solved.cell(1, Location(2, 0)), Err(SynthesisError::OutOfBounds { .. })));
        assert_eq!(solved.cell(6, Location(1, 1)).unwrap(), CellState::Empty);
    }

    #[test]
    fn placements_are_read_back() {
        let dag = detect_chain();
        let solved = solved(&dag, Geometry::from_extents(2, 2, 6).unwrap(), DETECTION);

        let perimeter = solved.perimeter().unwrap();
        assert_eq!(perimeter.len(), 8);
        assert_eq!(perimeter[7], SlotState::Dispenser("D".to_string()));
        assert_eq!(perimeter[3], SlotState::Sink("S".to_string()));
        assert_eq!(perimeter.iter().filter(|s| **s == SlotState::Empty).count(), 6);

        let detectors = solved.detector_grid().unwrap();
        assert_eq!(detectors[[1, 0]], Some("X".to_string()));
        assert_eq!(detectors.iter().flatten().count(), 1);
    }

    #[test]
    fn schedule_prints_like_a_solution_dump() {
        let dag = detect_chain();
        let schedule = solved(&dag, Geometry::from_extents(2, 2, 6).unwrap(), DETECTION).schedule().unwrap();
        assert!(schedule.is_solved());
        // presence 4, detecting 1
        assert_eq!(schedule.actions, 5);
        assert_eq!(schedule.trajectory(DropletId(0))[..4], [None, Some(Location(0, 0)), Some(Location(1, 0)), None]);

        let dump = schedule.to_string();
        assert!(dump.starts_with("Solution to detect\n"));
        assert!(dump.contains("Dispenser position(s):\nD at 7\n"));
        assert!(dump.contains("Sink position(s):\nS at 3\n"));
        assert!(dump.contains("Detector position(s):\nX at (1, 0)\n"));
        assert!(dump.contains("time = 3\n. d\n. .\n"));
        assert!(dump.contains("time = 5\n. .\n. 1\n"));
    }

    #[test]
    fn default_schedule_means_no_solution() {
        let schedule = Schedule::default();
        assert!(!schedule.is_solved());
        assert!(schedule.grid.is_empty());
        assert!(schedule.to_string().starts_with("No solution"));
    }
}
