//! The constraint families of one trial.
//!
//! Each family is a method of [`Encoder`] returning the terms it would assert; nothing here touches
//! what the backend has asserted, so families can be inspected on their own.

use std::collections::{BTreeMap, HashSet};

use itertools::{iproduct, Itertools};
use log::debug;
use ndarray::Array2;
use unordered_pair::UnorderedPair;

use crate::backend::Backend;
use crate::dag::{Dag, DropletId, NodeId, OperationKind};
use crate::grid::Geometry;
use crate::location::Location;
use crate::variables::VariableModel;

/// Turns a [`VariableModel`] into the terms one trial asserts.
///
/// Shared subterms are built once, up front: whether a droplet is anywhere on the chip at a timestep,
/// and whether a mixing or detecting operation completes at a timestep on a given block.
pub struct Encoder<'a, B: Backend> {
    dag: &'a Dag,
    vars: &'a VariableModel<B>,
    backend: &'a B,
    geometry: Geometry,
    // [t][droplet]: the droplet is somewhere on the chip
    present: Array2<B::Bool>,
    // (node, t, origin): the operation finishes at t on the block with top left corner origin
    events: BTreeMap<(NodeId, usize, Location), B::Bool>,
}

impl<'a, B: Backend> Encoder<'a, B> {
    /// Prepare to encode `dag` over the variables of `vars`, building terms with `backend`.
    pub fn new(dag: &'a Dag, vars: &'a VariableModel<B>, backend: &'a B) -> Self {
        let geometry = vars.geometry();
        let present = Array2::from_shape_fn((geometry.t() + 1, dag.droplet_count()), |(t, i)| {
            backend.build_or(&geometry.cells().map(|cell| vars.presence(t, cell, DropletId(i)).clone()).collect_vec())
        });

        let mut encoder = Self { dag, vars, backend, geometry, present, events: BTreeMap::new() };
        encoder.events = encoder.completions();
        encoder
    }

    /// Every hard constraint of the trial, family by family.
    pub fn encode(&self) -> Vec<B::Bool> {
        let families = [
            ("consistency", self.consistency()),
            ("placement", self.placement()),
            ("movement", self.movement()),
            ("activity", self.activity()),
            ("isolation", self.isolation()),
            ("objective", self.objective()),
        ];

        let mut terms = Vec::new();
        for (name, family) in families {
            debug!("{name}: {} terms", family.len());
            terms.extend(family);
        }
        terms
    }

    fn c(&self, t: usize, location: Location, droplet: DropletId) -> B::Bool {
        self.vars.presence(t, location, droplet).clone()
    }

    fn present(&self, t: usize, droplet: DropletId) -> B::Bool {
        self.present[[t, droplet.0]].clone()
    }

    fn all(&self, args: impl IntoIterator<Item = B::Bool>) -> B::Bool {
        self.backend.build_and(&args.into_iter().collect_vec())
    }

    fn any(&self, args: impl IntoIterator<Item = B::Bool>) -> B::Bool {
        self.backend.build_or(&args.into_iter().collect_vec())
    }

    fn not(&self, arg: B::Bool) -> B::Bool {
        self.backend.build_not(arg)
    }

    /// Every way each mixer and detector occurrence could finish on this chip.
    /// An operation of duration `d` finishing at `t` runs over `[t - d, t)`, so `t >= d + 2`.
    fn completions(&self) -> BTreeMap<(NodeId, usize, Location), B::Bool> {
        let mut events = BTreeMap::new();
        let horizon = self.geometry.t();

        for node in self.dag.nodes_of_kind(OperationKind::Mixer) {
            let duration = self.dag.node(node).duration;
            let origins = self.geometry.origins(self.dag.module_of(node).footprint());
            for (t, origin) in iproduct!(duration + 2..=horizon, origins) {
                events.insert((node, t, origin), self.mix(node, t, origin));
            }
        }

        for node in self.dag.nodes_of_kind(OperationKind::Detector) {
            let duration = self.dag.node(node).duration;
            // the first input is the one under test
            let Some(input) = self.dag.inputs(node).first().copied() else {
                continue;
            };
            for (t, cell) in iproduct!(duration + 2..=horizon, self.geometry.cells()) {
                events.insert((node, t, cell), self.detection(node, input, t, cell));
            }
        }

        events
    }

    /// Mixer `node` finishes at `t` on the block at `origin`: its inputs gathered around the block and left the chip,
    /// the block was mixing for the whole duration, and every output appears inside the block for the first time.
    fn mix(&self, node: NodeId, t: usize, origin: Location) -> B::Bool {
        let duration = self.dag.node(node).duration;
        let footprint = self.dag.module_of(node).footprint();
        let (started, gathered) = (t - duration, t - duration - 1);
        let block = self.geometry.block(origin, footprint);
        let ring = self.geometry.ring(origin, footprint);
        let mut requirements = Vec::new();

        for input in self.dag.inputs(node) {
            requirements.push(self.any(ring.iter().map(|p| self.c(gathered, *p, *input))));
            requirements.push(self.not(self.present(started, *input)));
        }

        requirements.extend(iproduct!(started..t, block.iter()).map(|(s, p)| self.vars.mixing(s, *p, node).clone()));

        for output in self.dag.outputs(node) {
            requirements.push(self.any(block.iter().map(|p| self.c(t, *p, *output))));
            requirements.push(self.not(self.any((1..t).map(|s| self.present(s, *output)))));
        }

        self.all(requirements)
    }

    /// Detector `node` finishes at `t` on `cell`: `input` sat on the detector cell, left the chip,
    /// and detection held for the whole duration.
    fn detection(&self, node: NodeId, input: DropletId, t: usize, cell: Location) -> B::Bool {
        let detection = self.dag.node(node);
        let duration = detection.duration;

        let mut requirements = vec![
            self.c(t - duration - 1, cell, input),
            self.not(self.present(t - duration, input)),
            self.vars.detector(cell, detection.module).clone(),
        ];
        requirements.extend((t - duration..t).map(|s| self.vars.detecting(s, node).clone()));

        self.all(requirements)
    }

    /// Nothing overlaps: one occupant per cell, one cell per droplet, one module per slot, one detector per cell.
    pub fn consistency(&self) -> Vec<B::Bool> {
        let mut terms = Vec::new();
        let mixers = self.dag.nodes_of_kind(OperationKind::Mixer).collect_vec();
        let detectors = self.dag.nodes_of_kind(OperationKind::Detector).collect_vec();

        for (t, cell) in iproduct!(self.geometry.active_steps(), self.geometry.cells()) {
            let mut occupants = mixers.iter().map(|n| self.vars.mixing(t, cell, *n).clone()).collect_vec();
            occupants.extend(detectors.iter().map(|n| self.all([
                self.vars.detecting(t, *n).clone(),
                self.vars.detector(cell, self.dag.node(*n).module).clone(),
            ])));
            occupants.extend(self.dag.droplets().map(|i| self.c(t, cell, i)));
            terms.push(self.backend.build_at_most(&occupants, 1));
        }

        for (t, i) in iproduct!(self.geometry.active_steps(), self.dag.droplets()) {
            let cells = self.geometry.cells().map(|cell| self.c(t, cell, i)).collect_vec();
            terms.push(self.backend.build_at_most(&cells, 1));
        }

        for slot in self.geometry.slots() {
            let modules = self.dag.module_ids()
                .flat_map(|m| [self.vars.dispenser(slot, m).clone(), self.vars.sink(slot, m).clone()])
                .collect_vec();
            terms.push(self.backend.build_at_most(&modules, 1));
        }

        for cell in self.geometry.cells() {
            let modules = self.dag.module_ids().map(|m| self.vars.detector(cell, m).clone()).collect_vec();
            terms.push(self.backend.build_at_most(&modules, 1));
        }

        terms
    }

    /// Each detector sits on exactly one cell; each dispenser and sink on exactly its desired number of slots.
    pub fn placement(&self) -> Vec<B::Bool> {
        let mut terms = Vec::new();

        for m in self.dag.modules_of_kind(OperationKind::Detector) {
            let cells = self.geometry.cells().map(|cell| self.vars.detector(cell, m).clone()).collect_vec();
            terms.push(self.backend.build_exactly(&cells, 1));
        }

        for m in self.dag.modules_of_kind(OperationKind::Dispenser) {
            let slots = self.geometry.slots().map(|slot| self.vars.dispenser(slot, m).clone()).collect_vec();
            terms.push(self.backend.build_exactly(&slots, self.dag.module(m).desired_amount()));
        }

        for m in self.dag.modules_of_kind(OperationKind::Sink) {
            let slots = self.geometry.slots().map(|slot| self.vars.sink(slot, m).clone()).collect_vec();
            terms.push(self.backend.build_exactly(&slots, self.dag.module(m).desired_amount()));
        }

        terms
    }

    /// A droplet is on a cell only for exactly one reason, and leaves the chip only through a sink.
    pub fn movement(&self) -> Vec<B::Bool> {
        let mut terms = Vec::new();

        for (t, cell, i) in iproduct!(self.geometry.active_steps(), self.geometry.cells(), self.dag.droplets()) {
            let here = self.c(t, cell, i);
            let causes = self.causes(t, cell, i);
            terms.push(if causes.is_empty() {
                self.not(here)
            } else {
                self.backend.build_implies(here, self.backend.build_exactly(&causes, 1))
            });
        }

        terms.extend(self.disappearance());
        terms.extend(self.lifetime());
        terms
    }

    fn causes(&self, t: usize, cell: Location, droplet: DropletId) -> Vec<B::Bool> {
        let producer = self.dag.producer(droplet);
        let node = self.dag.node(producer);
        let mut causes = Vec::with_capacity(2);

        // moved in from a neighbor or stayed put; the board is empty at t = 0
        if t > 1 {
            causes.push(self.any(self.geometry.stencil(cell).into_iter().map(|from| self.c(t - 1, from, droplet))));
        }

        match node.kind {
            OperationKind::Dispenser => {
                let slots = self.geometry.slots_touching(cell);
                if !slots.is_empty() {
                    causes.push(self.any(slots.into_iter().map(|slot| self.vars.dispenser(slot, node.module).clone())));
                }
            }
            OperationKind::Mixer | OperationKind::Detector => causes.extend(self.finished(t, cell, producer)),
            OperationKind::Sink => {}
        }

        causes
    }

    /// Operation `node` finished at `t` on a block containing `cell`.
    fn finished(&self, t: usize, cell: Location, node: NodeId) -> Option<B::Bool> {
        let footprint = self.dag.module_of(node).footprint();
        let events = self.geometry.placements(cell, footprint)
            .into_iter()
            .filter_map(|origin| self.events.get(&(node, t, origin)).cloned())
            .collect_vec();

        (!events.is_empty()).then(|| self.backend.build_or(&events))
    }

    fn disappearance(&self) -> Vec<B::Bool> {
        let mut terms = Vec::new();
        let horizon = self.geometry.t();

        for droplet in self.dag.droplets() {
            let consumer = self.dag.node(self.dag.consumer(droplet));
            if consumer.kind != OperationKind::Sink {
                continue;
            }

            for (t, cell) in iproduct!(2..=horizon, self.geometry.cells()) {
                let vanished = self.all([
                    self.c(t - 1, cell, droplet),
                    self.not(self.any(self.geometry.stencil(cell).into_iter().map(|to| self.c(t, to, droplet)))),
                ]);
                let sinks = self.any(
                    self.geometry.slots_touching(cell).into_iter().map(|slot| self.vars.sink(slot, consumer.module).clone())
                );
                terms.push(self.backend.build_implies(vanished, sinks));
            }

            // consumed before the horizon ends
            terms.extend(self.geometry.cells().map(|cell| self.not(self.c(horizon, cell, droplet))));
        }

        terms
    }

    /// A droplet that has left the chip never comes back.
    fn lifetime(&self) -> Vec<B::Bool> {
        let horizon = self.geometry.t();

        iproduct!(self.dag.droplets(), 2..horizon)
            .map(|(i, t)| {
                let left = self.all([self.present(t - 1, i), self.not(self.present(t, i))]);
                let back = self.any((t + 1..=horizon).map(|s| self.present(s, i)));
                self.backend.build_implies(left, self.not(back))
            })
            .collect()
    }

    /// Mixing and detecting hold only inside the block and window of an operation that completes,
    /// and each occurrence completes at most once.
    pub fn activity(&self) -> Vec<B::Bool> {
        let mut terms = Vec::new();

        // (node, t, cell) -> completions whose block and window cover it
        let mut covering: BTreeMap<(NodeId, usize, Location), Vec<B::Bool>> = BTreeMap::new();
        for (&(node, finish, origin), holds) in &self.events {
            let duration = self.dag.node(node).duration;
            let block = self.geometry.block(origin, self.dag.module_of(node).footprint());
            for (s, p) in iproduct!(finish - duration..finish, block) {
                covering.entry((node, s, p)).or_default().push(holds.clone());
            }
        }
        let covered = |node: NodeId, t: usize, cell: Location| covering.get(&(node, t, cell)).into_iter().flatten().cloned();

        for node in self.dag.nodes_of_kind(OperationKind::Mixer) {
            for (t, cell) in iproduct!(self.geometry.active_steps(), self.geometry.cells()) {
                let mixing = self.vars.mixing(t, cell, node).clone();
                terms.push(self.backend.build_implies(mixing, self.any(covered(node, t, cell))));
            }
        }

        for node in self.dag.nodes_of_kind(OperationKind::Detector) {
            for t in self.geometry.active_steps() {
                let detecting = self.vars.detecting(t, node).clone();
                let windows = self.geometry.cells().flat_map(|cell| covered(node, t, cell)).collect_vec();
                terms.push(self.backend.build_implies(detecting, self.backend.build_or(&windows)));
            }
        }

        for node in self.dag.nodes_of_kind(OperationKind::Mixer).chain(self.dag.nodes_of_kind(OperationKind::Detector)) {
            let completions = self.events.range((node, 0, Location(0, 0))..(NodeId(node.0 + 1), 0, Location(0, 0)))
                .map(|(_, holds)| holds.clone())
                .collect_vec();
            terms.push(self.backend.build_at_most(&completions, 1));
        }

        terms
    }

    /// No two distinct droplets come within one cell of each other, now or one step later.
    ///
    /// Outputs of one mixing event are exempt from each other only at the step they appear together
    /// inside its footprint; from the next step on they must be apart.
    pub fn isolation(&self) -> Vec<B::Bool> {
        let mut terms = Vec::new();
        let horizon = self.geometry.t();

        let siblings: HashSet<UnorderedPair<DropletId>> = self.dag.nodes_of_kind(OperationKind::Mixer)
            .flat_map(|n| self.dag.outputs(n).iter().tuple_combinations().map(|(a, b)| UnorderedPair(*a, *b)))
            .collect();

        for (t, cell, i) in iproduct!(self.geometry.active_steps(), self.geometry.cells(), self.dag.droplets()) {
            let near = self.geometry.moore(cell);
            let steps = t..=(t + 1).min(horizon);

            let mut crowd = Vec::new();
            for j in self.dag.droplets().filter(|j| *j != i) {
                let nearby = iproduct!(steps.clone(), near.iter()).map(|(s, p)| self.c(s, *p, j));
                if siblings.contains(&UnorderedPair(i, j)) {
                    // both fresh at t: they are still the mixture that just split
                    let settled = self.any([self.present(t - 1, i), self.present(t - 1, j)]);
                    crowd.push(self.all([self.any(nearby), settled]));
                } else {
                    crowd.extend(nearby);
                }
            }
            if crowd.is_empty() {
                continue;
            }

            terms.push(self.backend.build_implies(self.c(t, cell, i), self.not(self.backend.build_or(&crowd))));
        }

        terms
    }

    /// Every droplet shows up at least once.
    pub fn objective(&self) -> Vec<B::Bool> {
        self.dag.droplets()
            .map(|i| self.any(self.geometry.active_steps().map(|t| self.present(t, i))))
            .collect()
    }
}
