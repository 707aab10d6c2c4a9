//! Frozen views of a cell and a perimeter slot.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::dag::DropletId;

/// What one cell holds at one timestep, frozen for output or printing.
///
/// When several could apply, detecting wins over mixing, which wins over a droplet.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum CellState {
    /// A detector on this cell is holding a droplet under test.
    Detecting,
    /// Part of a mixer footprint that is mixing.
    Mixing,
    /// Holds this droplet.
    Droplet(DropletId),
    /// Holds nothing.
    #[default]
    Empty,
}

impl Display for CellState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Detecting => write!(f, "d"),
            Self::Mixing => write!(f, "m"),
            Self::Droplet(droplet) => write!(f, "{droplet}"),
            Self::Empty => write!(f, "."),
        }
    }
}

/// The module attached to one perimeter slot, by label.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum SlotState {
    /// Nothing attached.
    #[default]
    Empty,
    /// The sink module with this label.
    Sink(String),
    /// The dispenser module with this label.
    Dispenser(String),
}
