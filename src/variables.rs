//! The decision variables of one trial.

use itertools::iproduct;
use log::debug;
use ndarray::{Array2, Array3, Array4};

use crate::backend::Backend;
use crate::dag::{Dag, DropletId, ModuleId, NodeId, OperationKind};
use crate::error::SynthesisError;
use crate::grid::{Geometry, Slot};
use crate::location::Location;

/// Every decision variable of one trial.
///
/// Rebuilt from scratch for each trial geometry and dropped with it.
/// Variables that can never hold are the backend's constant false rather than fresh symbols:
/// anything time-indexed at t = 0, activity of a node of the wrong kind, and placement of a module of the wrong kind.
pub struct VariableModel<B: Backend> {
    pub(crate) geometry: Geometry,
    /// `[t][x][y][droplet]`
    pub(crate) presence: Array4<B::Bool>,
    /// `[t][x][y][node]`
    pub(crate) mixing: Array4<B::Bool>,
    /// `[t][node]`
    pub(crate) detecting: Array2<B::Bool>,
    /// `[x][y][module]`
    pub(crate) detector: Array3<B::Bool>,
    /// `[slot][module]`
    pub(crate) dispenser: Array2<B::Bool>,
    /// `[slot][module]`
    pub(crate) sink: Array2<B::Bool>,
    pub(crate) action_count: B::Int,
}

impl<B: Backend> VariableModel<B> {
    /// Declare the variables of `dag` on a chip of `geometry` with `backend`, along with the action counter.
    pub fn build(backend: &B, dag: &Dag, geometry: Geometry) -> Result<Self, SynthesisError> {
        let (w, h, t) = (geometry.w(), geometry.h(), geometry.t());
        let (droplets, nodes, modules, perimeter) = (dag.droplet_count(), dag.node_count(), dag.module_count(), geometry.perimeter());

        let declare = |name: String, live: bool| -> Result<B::Bool, SynthesisError> {
            if live {
                backend.declare_bool_const(&name).map_err(|e| SynthesisError::backend(geometry, e))
            } else {
                Ok(backend.build_bool_lit(false))
            }
        };
        let is_node = |n: usize, kind: OperationKind| dag.node(NodeId(n)).kind == kind;
        let is_module = |m: usize, kind: OperationKind| dag.module(ModuleId(m)).kind() == kind;

        let presence = iproduct!(0..=t, 0..w, 0..h, 0..droplets)
            .map(|(t, x, y, i)| declare(format!("c^{t}_({x},{y},{i})"), t > 0))
            .collect::<Result<Vec<_>, _>>()?;
        let mixing = iproduct!(0..=t, 0..w, 0..h, 0..nodes)
            .map(|(t, x, y, n)| declare(format!("mixing^{t}_({x},{y},{n})"), t > 0 && is_node(n, OperationKind::Mixer)))
            .collect::<Result<Vec<_>, _>>()?;
        let detecting = iproduct!(0..=t, 0..nodes)
            .map(|(t, n)| declare(format!("detecting^{t}_({n})"), t > 0 && is_node(n, OperationKind::Detector)))
            .collect::<Result<Vec<_>, _>>()?;
        let detector = iproduct!(0..w, 0..h, 0..modules)
            .map(|(x, y, m)| declare(format!("detector_({x},{y},{m})"), is_module(m, OperationKind::Detector)))
            .collect::<Result<Vec<_>, _>>()?;
        let dispenser = iproduct!(0..perimeter, 0..modules)
            .map(|(p, m)| declare(format!("dispenser_({p},{m})"), is_module(m, OperationKind::Dispenser)))
            .collect::<Result<Vec<_>, _>>()?;
        let sink = iproduct!(0..perimeter, 0..modules)
            .map(|(p, m)| declare(format!("sink_({p},{m})"), is_module(m, OperationKind::Sink)))
            .collect::<Result<Vec<_>, _>>()?;

        let presence = Array4::from_shape_vec((t + 1, w, h, droplets), presence)?;
        let mixing = Array4::from_shape_vec((t + 1, w, h, nodes), mixing)?;
        let detecting = Array2::from_shape_vec((t + 1, nodes), detecting)?;
        let detector = Array3::from_shape_vec((w, h, modules), detector)?;
        let dispenser = Array2::from_shape_vec((perimeter, modules), dispenser)?;
        let sink = Array2::from_shape_vec((perimeter, modules), sink)?;

        let actions = presence.iter().chain(mixing.iter()).chain(detecting.iter()).cloned().collect::<Vec<_>>();
        debug!("declared {} time-indexed variables for trial ({geometry})", actions.len());
        let action_count = backend.declare_counter("no_of_actions", &actions)
            .map_err(|e| SynthesisError::backend(geometry, e))?;

        Ok(Self { geometry, presence, mixing, detecting, detector, dispenser, sink, action_count })
    }

    /// The trial these variables belong to.
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Droplet `droplet` sits on `location` at `t`.
    ///
    /// # Panics
    /// Like the accessors below, if any index lies outside the trial or the graph.
    pub fn presence(&self, t: usize, location: Location, droplet: DropletId) -> &B::Bool {
        &self.presence[[t, location.0, location.1, droplet.0]]
    }

    /// Mixer occurrence `node` is mixing on `location` at `t`.
    pub fn mixing(&self, t: usize, location: Location, node: NodeId) -> &B::Bool {
        &self.mixing[[t, location.0, location.1, node.0]]
    }

    /// Detector occurrence `node` is detecting at `t`, on whichever cell carries its module.
    pub fn detecting(&self, t: usize, node: NodeId) -> &B::Bool {
        &self.detecting[[t, node.0]]
    }

    /// Detector `module` is placed on `location`.
    pub fn detector(&self, location: Location, module: ModuleId) -> &B::Bool {
        &self.detector[[location.0, location.1, module.0]]
    }

    /// Dispenser `module` is attached to `slot`.
    pub fn dispenser(&self, slot: Slot, module: ModuleId) -> &B::Bool {
        &self.dispenser[[slot.0, module.0]]
    }

    /// Sink `module` is attached to `slot`.
    pub fn sink(&self, slot: Slot, module: ModuleId) -> &B::Bool {
        &self.sink[[slot.0, module.0]]
    }

    /// Sum of every presence, mixing and detecting variable; the objective to minimize.
    pub fn action_count(&self) -> &B::Int {
        &self.action_count
    }
}
