//! Cell coordinates.

use std::fmt::{Display, Formatter};
use std::num::NonZero;

use serde::{Deserialize, Serialize};

/// One coordinate of a cell, or a count of cells or timesteps.
pub type Coord = usize;
/// A chip extent or time horizon; never zero.
pub type Dimension = NonZero<Coord>;

/// A cell `(x, y)` on the chip. The top left corner is `Location(0, 0)`, `x` grows to the right and `y` grows downward.
#[derive(Clone, Eq, Hash, Copy, PartialEq, Ord, PartialOrd, Debug, Serialize, Deserialize)]
pub struct Location(pub Coord, pub Coord);

impl Location {
    /// Offset by a signed step. Stepping off the top or left edge wraps to a huge coordinate, which every bounds check rejects.
    pub(crate) fn offset_by(self, rhs: (isize, isize)) -> Self {
        Self(self.0.wrapping_add_signed(rhs.0), self.1.wrapping_add_signed(rhs.1))
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

#[cfg(test)]
mod tests {
    use super::Location;

    #[test]
    fn offset_wraps_off_the_board() {
        assert_eq!(Location(1, 1).offset_by((-1, 1)), Location(0, 2));
        assert!(Location(0, 0).offset_by((-1, 0)).0 > 1_000_000);
    }
}
