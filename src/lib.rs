#![warn(missing_docs)]

//! # `dropsynth`
//!
//! Layout and droplet routing synthesis for digital microfluidic biochips (DMFBs).
//! Describe a bioassay as a dataflow graph of dispense, mix, detect and output operations with a [`DagBuilder`](builder::DagBuilder),
//! hand the resulting [`Dag`] to a [`Synthesizer`](search::Synthesizer), and read the [`Schedule`](extract::Schedule) it finds:
//! where dispensers and sinks sit on the chip border, where detectors sit on the chip, and where every droplet is at every timestep.
//!
//! # Internals
//! Each candidate chip of some width, height and time horizon (a "trial") is expressed as a Boolean satisfiability problem.
//! Droplets are identified with the *edges* of the dataflow graph, so one unit of fluid keeps one identity from the operation
//! producing it to the operation consuming it, however often a module is reused along the way.
//!
//! For every trial we declare:
//! - `c[t][x][y][i]`: droplet `i` sits on cell `(x, y)` at time `t`;
//! - `mixing[t][x][y][n]` and `detecting[t][n]`: mixer or detector occurrence `n` is busy at time `t`;
//! - `detector[x][y][m]`, `dispenser[p][m]` and `sink[p][m]`: where module `m` is placed, on a cell or a perimeter slot.
//!
//! and assert, in SAT form:
//! 1. Consistency. A cell holds at most one of a mixing operation, a detecting operation or a droplet.
//!    A droplet is on at most one cell, a slot carries at most one module and a cell at most one detector.
//! 2. Placement. Every detector is on exactly one cell; every dispenser and sink is on exactly its desired number of slots.
//! 3. Movement. A droplet is on a cell for exactly one reason: it was on that cell or a neighbor one step earlier,
//!    a dispenser next to the cell released it, a mixer finished with it, or a detector finished with it.
//!    Droplets bound for a sink leave the chip only through one, and before the horizon. A droplet that left never returns.
//! 4. Activity. Mixing and detecting hold exactly over the block and window of an operation that completes, once per occurrence.
//! 5. Isolation. Two distinct droplets never come within one cell of each other, at the same time or one step apart.
//!    The outputs of one mixer are exempt from each other only at the step they appear.
//! 6. Every droplet appears at some point.
//!
//! The number of busy variables, the "actions", is minimized on top.
//! Trials are tried in order of width, then height, then time, and the first satisfiable one wins.
//!
//! The solver sits behind the [`Backend`](backend::Backend) trait; [`VarisatBackend`](backend::VarisatBackend) uses `varisat`.

pub use backend::{Backend, CheckResult, VarisatBackend};
pub use cell::{CellState, SlotState};
pub use builder::{DagBuilder, DagInvalidReason, Operation};
pub use dag::Dag;
pub use error::SynthesisError;
pub use extract::{Schedule, Solved};
pub use grid::Geometry;
pub use location::Location;
pub use search::{SearchConfig, SearchOutcome, Synthesizer};

pub mod backend;
pub mod builder;
pub(crate) mod cell;
pub(crate) mod constraints;
pub mod dag;
pub mod error;
pub mod extract;
pub mod grid;
pub mod location;
pub(crate) mod logic;
pub mod search;
pub(crate) mod variables;
