//! Directive-by-directive construction of a [`Dag`].

use std::collections::HashMap;
use std::num::NonZero;

use itertools::Itertools;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::dag::{Dag, Module, ModuleAttributes, ModuleId, Node, OperationKind};
use crate::grid::{Footprint, Geometry};
use crate::location::Dimension;

/// Reasons a [`DagBuilder`] may become invalid while building.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DagInvalidReason {
    /// A node id was added twice.
    DuplicateNode(usize),
    /// Node ids must cover `0..n` without gaps once building finishes.
    MissingNode(usize),
    /// An edge or module attribute referenced something that was never added.
    UnknownReference(String),
    /// A label was reused for an operation of another kind.
    LabelKindMismatch {
        /// The shared label.
        label: String,
        /// Kind of the first occurrence.
        expected: OperationKind,
        /// Kind of the offending occurrence.
        found: OperationKind,
    },
    /// A dispenser consumes droplets or a sink produces them.
    BadDirection {
        /// The offending node id.
        node: usize,
        /// Its operation kind.
        kind: OperationKind,
    },
    /// A mixer or detector has nothing to work on.
    MissingInput(usize),
    /// A duration, amount or footprint extent of zero.
    ZeroQuantity(String),
    /// Width, height and time limits must all be non-zero.
    ZeroLimit,
    /// Droplets must not flow in a circle.
    Cycle(usize),
}

/// One operation as it appears in a dataflow description, before labels are resolved to modules.
#[derive(Clone, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum Operation {
    /// Release a droplet of `fluid` from a perimeter slot.
    Dispense { label: String, fluid: String, volume: u32 },
    /// Merge the input droplets inside the module footprint for `duration` timesteps.
    Mix { label: String, drops: usize, duration: usize },
    /// Hold the first input droplet on the detector cell for `duration` timesteps.
    Detect { label: String, drops: usize, duration: usize },
    /// Drain droplets into a sink on the perimeter.
    Output { label: String, sink_name: String },
}

impl Operation {
    fn label(&self) -> &str {
        match self {
            Self::Dispense { label, .. } | Self::Mix { label, .. } | Self::Detect { label, .. } | Self::Output { label, .. } => label,
        }
    }

    fn kind(&self) -> OperationKind {
        match self {
            Self::Dispense { .. } => OperationKind::Dispenser,
            Self::Mix { .. } => OperationKind::Mixer,
            Self::Detect { .. } => OperationKind::Detector,
            Self::Output { .. } => OperationKind::Sink,
        }
    }

    fn duration(&self) -> usize {
        match self {
            Self::Mix { duration, .. } | Self::Detect { duration, .. } => *duration,
            _ => 0,
        }
    }

    fn module(&self) -> Module {
        let attributes = match self {
            Self::Dispense { fluid, volume, .. } => ModuleAttributes::Dispenser { fluid: fluid.clone(), volume: *volume, amount: 1 },
            Self::Mix { drops, .. } => ModuleAttributes::Mixer { footprint: Footprint::default(), drops: *drops },
            Self::Detect { drops, .. } => ModuleAttributes::Detector { drops: *drops },
            Self::Output { sink_name, .. } => ModuleAttributes::Sink { name: sink_name.clone(), amount: 1 },
        };
        Module { label: self.label().to_string(), attributes }
    }
}

/// Builds a [`Dag`] directive by directive, in any order.
///
/// Builders mutate themselves while building but can be [`Clone`]d to save their state at some point.
/// Once a builder is invalid, every further call does nothing; [`Self::build`] reports why.
#[derive(Clone)]
pub struct DagBuilder {
    name: String,
    limits: (usize, usize, usize),
    nodes: HashMap<usize, Operation>,
    edges: Vec<(usize, usize)>,
    amounts: Vec<(String, usize)>,
    footprints: Vec<(String, usize, usize)>,
    invalid_reasons: Vec<DagInvalidReason>,
}

impl Default for DagBuilder {
    fn default() -> Self {
        Self::new("dag")
    }
}

impl DagBuilder {
    /// An empty builder with the default limits of a 10x10 chip over 30 timesteps.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            limits: (10, 10, 30),
            nodes: Default::default(),
            edges: Default::default(),
            amounts: Default::default(),
            footprints: Default::default(),
            invalid_reasons: Default::default(),
        }
    }

    /// Rename the graph being built.
    pub fn with_name(&mut self, name: &str) -> &mut Self {
        if !self.invalid_reasons.is_empty() {
            return self;
        }

        self.name = name.to_string();
        self
    }

    /// Largest chip and longest horizon a search may try.
    pub fn with_limits(&mut self, width: usize, height: usize, time: usize) -> &mut Self {
        if !self.invalid_reasons.is_empty() {
            return self;
        }

        if width == 0 || height == 0 || time == 0 {
            self.invalid_reasons.push(DagInvalidReason::ZeroLimit);
            return self;
        }

        self.limits = (width, height, time);
        self
    }

    /// Add an operation occurrence with a 0-based id.
    /// Occurrences sharing a label share one module; the first occurrence decides the module's attributes.
    pub fn add_node(&mut self, id: usize, operation: Operation) -> &mut Self {
        if !self.invalid_reasons.is_empty() {
            return self;
        }

        if self.nodes.contains_key(&id) {
            self.invalid_reasons.push(DagInvalidReason::DuplicateNode(id));
            return self;
        }

        if operation.duration() == 0 && matches!(operation.kind(), OperationKind::Mixer | OperationKind::Detector) {
            self.invalid_reasons.push(DagInvalidReason::ZeroQuantity(format!("duration of node {id}")));
            return self;
        }

        self.nodes.insert(id, operation);
        self
    }

    /// Add a droplet flowing from `from` to `to`. Droplets are numbered in the order their edges are added.
    pub fn add_edge(&mut self, from: usize, to: usize) -> &mut Self {
        if !self.invalid_reasons.is_empty() {
            return self;
        }

        self.edges.push((from, to));
        self
    }

    /// Set how many perimeter slots a dispenser or sink module occupies.
    pub fn set_amount(&mut self, label: &str, amount: usize) -> &mut Self {
        if !self.invalid_reasons.is_empty() {
            return self;
        }

        if amount == 0 {
            self.invalid_reasons.push(DagInvalidReason::ZeroQuantity(format!("amount of {label}")));
            return self;
        }

        self.amounts.push((label.to_string(), amount));
        self
    }

    /// Set the block of cells a mixer module occupies while mixing.
    pub fn set_footprint(&mut self, label: &str, width: usize, height: usize) -> &mut Self {
        if !self.invalid_reasons.is_empty() {
            return self;
        }

        if width == 0 || height == 0 {
            self.invalid_reasons.push(DagInvalidReason::ZeroQuantity(format!("footprint of {label}")));
            return self;
        }

        self.footprints.push((label.to_string(), width, height));
        self
    }

    /// Check the validity of this builder so far.
    ///
    /// Returns `None` if no directive has failed, `Some(&Vec<DagInvalidReason>)` otherwise.
    /// Structural problems spanning several directives are only found by [`Self::build`].
    pub fn is_valid(&self) -> Option<&Vec<DagInvalidReason>> {
        if self.invalid_reasons.is_empty() {
            None
        } else {
            Some(&self.invalid_reasons)
        }
    }

    /// Resolve labels, check the graph as a whole and freeze it into a [`Dag`].
    pub fn build(&self) -> Result<Dag, Vec<DagInvalidReason>> {
        if !self.invalid_reasons.is_empty() {
            return Err(self.invalid_reasons.clone());
        }

        let mut reasons = Vec::new();
        let node_count = self.nodes.len();
        reasons.extend((0..node_count).filter(|id| !self.nodes.contains_key(id)).map(DagInvalidReason::MissingNode));

        let mut modules: Vec<Module> = Vec::new();
        let mut labels: HashMap<&str, ModuleId> = HashMap::new();
        let mut graph = DiGraph::with_capacity(node_count, self.edges.len());

        for (_, operation) in self.nodes.iter().sorted_by_key(|(id, _)| **id) {
            let module = match labels.get(operation.label()) {
                Some(module) => {
                    let expected = modules[module.0].kind();
                    if expected != operation.kind() {
                        reasons.push(DagInvalidReason::LabelKindMismatch {
                            label: operation.label().to_string(),
                            expected,
                            found: operation.kind(),
                        });
                    }
                    *module
                }
                None => {
                    let module = ModuleId(modules.len());
                    modules.push(operation.module());
                    labels.insert(operation.label(), module);
                    module
                }
            };

            graph.add_node(Node { module, kind: operation.kind(), duration: operation.duration() });
        }

        for (label, amount) in &self.amounts {
            match labels.get(label.as_str()).map(|m| &mut modules[m.0].attributes) {
                Some(ModuleAttributes::Dispenser { amount: slot, .. } | ModuleAttributes::Sink { amount: slot, .. }) => *slot = *amount,
                _ => reasons.push(DagInvalidReason::UnknownReference(format!("amount for {label}"))),
            }
        }

        for (label, width, height) in &self.footprints {
            match labels.get(label.as_str()).map(|m| &mut modules[m.0].attributes) {
                Some(ModuleAttributes::Mixer { footprint, .. }) => {
                    *footprint = Footprint { width: nonzero(*width), height: nonzero(*height) }
                }
                _ => reasons.push(DagInvalidReason::UnknownReference(format!("footprint for {label}"))),
            }
        }

        if !reasons.is_empty() {
            return Err(reasons);
        }

        for (from, to) in &self.edges {
            if *from >= node_count || *to >= node_count {
                reasons.push(DagInvalidReason::UnknownReference(format!("edge {from} -> {to}")));
                continue;
            }
            graph.add_edge(NodeIndex::new(*from), NodeIndex::new(*to), ());
        }

        for node in graph.node_indices() {
            let kind = graph[node].kind;
            let has_inputs = graph.neighbors_directed(node, petgraph::Incoming).next().is_some();
            let has_outputs = graph.neighbors_directed(node, petgraph::Outgoing).next().is_some();
            match kind {
                OperationKind::Dispenser if has_inputs => reasons.push(DagInvalidReason::BadDirection { node: node.index(), kind }),
                OperationKind::Sink if has_outputs => reasons.push(DagInvalidReason::BadDirection { node: node.index(), kind }),
                OperationKind::Mixer | OperationKind::Detector if !has_inputs => reasons.push(DagInvalidReason::MissingInput(node.index())),
                _ => {}
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            reasons.push(DagInvalidReason::Cycle(cycle.node_id().index()));
        }

        if !reasons.is_empty() {
            return Err(reasons);
        }

        let (width, height, time) = self.limits;
        let limits = Geometry::new(nonzero(width), nonzero(height), nonzero(time));

        Ok(Dag::new(self.name.clone(), graph, modules, limits))
    }
}

// zero extents are rejected before any Dimension is made
fn nonzero(value: usize) -> Dimension {
    NonZero::new(value).unwrap_or(NonZero::<usize>::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{DropletId, NodeId};

    fn dispense(label: &str) -> Operation {
        Operation::Dispense { label: label.to_string(), fluid: "water".to_string(), volume: 10 }
    }

    fn output(label: &str) -> Operation {
        Operation::Output { label: label.to_string(), sink_name: "waste".to_string() }
    }

    fn mix(label: &str, duration: usize) -> Operation {
        Operation::Mix { label: label.to_string(), drops: 2, duration }
    }

    #[test]
    fn builds_adjacency_in_edge_order() {
        let dag = DagBuilder::new("mix")
            .add_node(0, dispense("D1"))
            .add_node(1, dispense("D2"))
            .add_node(2, mix("M", 2))
            .add_node(3, output("S"))
            .add_edge(0, 2)
            .add_edge(1, 2)
            .add_edge(2, 3)
            .set_footprint("M", 2, 2)
            .build()
            .unwrap();

        assert_eq!(dag.droplet_count(), 3);
        assert_eq!(dag.inputs(NodeId(2)), &[DropletId(0), DropletId(1)]);
        assert_eq!(dag.outputs(NodeId(2)), &[DropletId(2)]);
        assert_eq!(dag.producer(DropletId(1)), NodeId(1));
        assert_eq!(dag.consumer(DropletId(2)), NodeId(3));
        assert_eq!(dag.predecessors(NodeId(2)).collect_vec(), vec![NodeId(0), NodeId(1)]);
        assert_eq!(dag.module_of(NodeId(2)).footprint().width.get(), 2);
        assert_eq!(dag.node(NodeId(2)).duration, 2);
    }

    #[test]
    fn shared_labels_share_a_module() {
        let dag = DagBuilder::new("shared")
            .add_node(0, dispense("D"))
            .add_node(1, dispense("D"))
            .add_node(2, output("S"))
            .add_edge(0, 2)
            .add_edge(1, 2)
            .set_amount("D", 2)
            .build()
            .unwrap();

        assert_eq!(dag.node_count(), 3);
        assert_eq!(dag.module_count(), 2);
        let module = dag.module_by_label("D").unwrap();
        assert_eq!(dag.node(NodeId(0)).module, module);
        assert_eq!(dag.node(NodeId(1)).module, module);
        assert_eq!(dag.module(module).desired_amount(), 2);
    }

    #[test]
    fn invalid_builder_ignores_further_directives() {
        let mut builder = DagBuilder::new("broken");
        builder.add_node(0, dispense("D")).add_node(0, dispense("D")).add_node(1, output("S"));
        assert_eq!(builder.is_valid(), Some(&vec![DagInvalidReason::DuplicateNode(0)]));
        assert_eq!(builder.build().unwrap_err(), vec![DagInvalidReason::DuplicateNode(0)]);
    }

    #[test]
    fn rejects_structural_mistakes() {
        let reasons = DagBuilder::new("bad")
            .add_node(0, dispense("D"))
            .add_node(1, Operation::Detect { label: "X".to_string(), drops: 1, duration: 1 })
            .add_node(2, output("S"))
            .add_edge(2, 0)
            .build()
            .unwrap_err();

        assert!(reasons.contains(&DagInvalidReason::BadDirection { node: 0, kind: OperationKind::Dispenser }));
        assert!(reasons.contains(&DagInvalidReason::BadDirection { node: 2, kind: OperationKind::Sink }));
        assert!(reasons.contains(&DagInvalidReason::MissingInput(1)));
    }

    #[test]
    fn rejects_label_reuse_across_kinds() {
        let reasons = DagBuilder::new("clash")
            .add_node(0, dispense("A"))
            .add_node(1, output("A"))
            .add_edge(0, 1)
            .build()
            .unwrap_err();

        assert_eq!(reasons, vec![DagInvalidReason::LabelKindMismatch {
            label: "A".to_string(),
            expected: OperationKind::Dispenser,
            found: OperationKind::Sink,
        }]);
    }

    #[test]
    fn rejects_zero_quantities_and_gaps() {
        let mut zero = DagBuilder::new("zero");
        zero.add_node(0, mix("M", 0));
        assert!(matches!(zero.is_valid().unwrap()[0], DagInvalidReason::ZeroQuantity(_)));

        let mut footprint = DagBuilder::new("footprint");
        footprint.set_footprint("M", 0, 2);
        assert!(footprint.is_valid().is_some());

        let gap = DagBuilder::new("gap").add_node(1, dispense("D")).build().unwrap_err();
        assert_eq!(gap, vec![DagInvalidReason::MissingNode(0)]);
    }

    #[test]
    fn rejects_cycles() {
        let reasons = DagBuilder::new("loop")
            .add_node(0, dispense("D"))
            .add_node(1, mix("M", 1))
            .add_node(2, mix("N", 1))
            .add_edge(0, 1)
            .add_edge(1, 2)
            .add_edge(2, 1)
            .build()
            .unwrap_err();

        assert!(matches!(reasons[0], DagInvalidReason::Cycle(_)));
    }
}
