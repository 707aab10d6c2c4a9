//! The dataflow graph a chip is synthesized for: operation occurrences, the modules they run on,
//! and the droplets flowing between them.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use strum::{EnumString, VariantArray};

use crate::grid::{Footprint, Geometry};

/// Index of an operation occurrence in the dataflow graph.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Index of an edge of the dataflow graph, i.e. of the droplet flowing along it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct DropletId(pub usize);

/// Index of a canonical, label-keyed module.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ModuleId(pub usize);

impl Display for DropletId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four fluidic operations a chip can perform.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, strum::Display, EnumString, VariantArray, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
pub enum OperationKind {
    /// Sits on the perimeter and releases droplets.
    Dispenser,
    /// Merges droplets over a block of cells.
    Mixer,
    /// Sits on one cell and holds a droplet under test.
    Detector,
    /// Sits on the perimeter and drains droplets.
    Sink,
}

/// Static attributes shared by every occurrence of a module.
#[derive(Clone, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum ModuleAttributes {
    Dispenser { fluid: String, volume: u32, amount: usize },
    Mixer { footprint: Footprint, drops: usize },
    Detector { drops: usize },
    Sink { name: String, amount: usize },
}

/// A canonical, label-keyed instance of an operation, shared by every occurrence with that label.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Module {
    /// Unique across the graph.
    pub label: String,
    /// Fixed for the whole schedule.
    pub attributes: ModuleAttributes,
}

impl Module {
    /// What kind of operation this module performs.
    pub fn kind(&self) -> OperationKind {
        match self.attributes {
            ModuleAttributes::Dispenser { .. } => OperationKind::Dispenser,
            ModuleAttributes::Mixer { .. } => OperationKind::Mixer,
            ModuleAttributes::Detector { .. } => OperationKind::Detector,
            ModuleAttributes::Sink { .. } => OperationKind::Sink,
        }
    }

    /// How many perimeter slots this module must occupy; zero for modules that do not sit on the perimeter.
    pub fn desired_amount(&self) -> usize {
        match self.attributes {
            ModuleAttributes::Dispenser { amount, .. } | ModuleAttributes::Sink { amount, .. } => amount,
            _ => 0,
        }
    }

    /// The block a mixer occupies while mixing; a single cell for everything else.
    pub fn footprint(&self) -> Footprint {
        match self.attributes {
            ModuleAttributes::Mixer { footprint, .. } => footprint,
            _ => Footprint::default(),
        }
    }
}

/// One occurrence of a module in the dataflow graph.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    /// The module this occurrence runs on.
    pub module: ModuleId,
    /// Always the kind of [`Self::module`].
    pub kind: OperationKind,
    /// Mixing or detection duration in timesteps; zero for dispensers and sinks.
    pub duration: usize,
}

/// The immutable dataflow graph a chip is synthesized for.
///
/// Build one with a [`DagBuilder`](crate::builder::DagBuilder).
/// Node weights are [`Node`]s and the `i`-th edge carries droplet `i`.
#[derive(Clone, Debug)]
pub struct Dag {
    pub(crate) name: String,
    pub(crate) graph: DiGraph<Node, ()>,
    pub(crate) modules: Vec<Module>,
    pub(crate) labels: HashMap<String, ModuleId>,
    // droplets entering and leaving each node, in edge order
    pub(crate) inputs: Vec<Vec<DropletId>>,
    pub(crate) outputs: Vec<Vec<DropletId>>,
    pub(crate) limits: Geometry,
}

impl Dag {
    pub(crate) fn new(name: String, graph: DiGraph<Node, ()>, modules: Vec<Module>, limits: Geometry) -> Self {
        let labels = modules.iter()
            .enumerate()
            .map(|(index, module)| (module.label.clone(), ModuleId(index)))
            .collect();

        let adjacency = |direction: Direction| graph.node_indices()
            .map(|node| {
                let mut droplets: Vec<DropletId> = graph.edges_directed(node, direction)
                    .map(|edge| DropletId(edge.id().index()))
                    .collect();
                droplets.sort();
                droplets
            })
            .collect::<Vec<_>>();
        let inputs = adjacency(Direction::Incoming);
        let outputs = adjacency(Direction::Outgoing);

        Self { name, graph, modules, labels, inputs, outputs, limits }
    }

    /// The name given to the builder, used in solution dumps.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Upper bounds for the search: the largest chip and longest horizon worth trying.
    pub fn limits(&self) -> Geometry {
        self.limits
    }

    /// Number of operation occurrences.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges, hence of droplets.
    pub fn droplet_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Number of distinct labels.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Every node id, in order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + Clone {
        (0..self.node_count()).map(NodeId)
    }

    /// Every droplet id, in edge order.
    pub fn droplets(&self) -> impl Iterator<Item = DropletId> + Clone {
        (0..self.droplet_count()).map(DropletId)
    }

    /// Every module id, in order of first occurrence.
    pub fn module_ids(&self) -> impl Iterator<Item = ModuleId> + Clone {
        (0..self.modules.len()).map(ModuleId)
    }

    /// # Panics
    /// If `id` is not a node of this graph.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.graph[NodeIndex::new(id.0)]
    }

    /// # Panics
    /// If `id` is not a module of this graph.
    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0]
    }

    /// The module an occurrence belongs to.
    pub fn module_of(&self, id: NodeId) -> &Module {
        self.module(self.node(id).module)
    }

    /// Resolve a label to its module.
    pub fn module_by_label(&self, label: &str) -> Option<ModuleId> {
        self.labels.get(label).copied()
    }

    /// Modules of one kind, in id order.
    pub fn modules_of_kind(&self, kind: OperationKind) -> impl Iterator<Item = ModuleId> + '_ {
        self.module_ids().filter(move |m| self.module(*m).kind() == kind)
    }

    /// Occurrences of one kind, in id order.
    pub fn nodes_of_kind(&self, kind: OperationKind) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes().filter(move |n| self.node(*n).kind == kind)
    }

    /// The node producing `droplet`.
    pub fn producer(&self, droplet: DropletId) -> NodeId {
        NodeId(self.endpoints(droplet).0.index())
    }

    /// The node consuming `droplet`.
    pub fn consumer(&self, droplet: DropletId) -> NodeId {
        NodeId(self.endpoints(droplet).1.index())
    }

    /// Droplets consumed by `node`, in edge order.
    pub fn inputs(&self, node: NodeId) -> &[DropletId] {
        &self.inputs[node.0]
    }

    /// Droplets produced by `node`, in edge order.
    pub fn outputs(&self, node: NodeId) -> &[DropletId] {
        &self.outputs[node.0]
    }

    /// Node ids feeding `node`, one per incoming droplet.
    pub fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.inputs(node).iter().map(|d| self.producer(*d))
    }

    /// Node ids fed by `node`, one per outgoing droplet.
    pub fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.outputs(node).iter().map(|d| self.consumer(*d))
    }

    fn endpoints(&self, droplet: DropletId) -> (NodeIndex, NodeIndex) {
        // every DropletId handed out by this graph indexes one of its edges
        self.graph.edge_endpoints(EdgeIndex::new(droplet.0))
            .unwrap_or_else(|| panic!("droplet {} is not an edge of {}", droplet.0, self.name))
    }
}
