//! Chip geometry: cells, perimeter slots, neighborhoods and module footprints.

use std::fmt::{Display, Formatter};
use std::num::NonZero;
use std::ops::RangeInclusive;

use itertools::{iproduct, Itertools};
use serde::{Deserialize, Serialize};
use strum::VariantArray;

use crate::location::{Coord, Dimension, Location};

/// A single step from one cell to one of its eight surrounding cells.
#[derive(Copy, Clone, VariantArray, Eq, PartialEq, Hash, Debug, Ord, PartialOrd)]
#[allow(missing_docs)]
pub enum Step {
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
}

impl Step {
    /// The four steps a droplet may take between two timesteps.
    pub const ORTHOGONAL: &'static [Self] = &[Self::Up, Self::Down, Self::Left, Self::Right];

    /// Attempt the step from `location`. The result may lie outside any chip; check it with [`Geometry::contains`].
    pub fn attempt_from(&self, location: Location) -> Location {
        match self {
            Self::Up => location.offset_by((0, -1)),
            Self::Down => location.offset_by((0, 1)),
            Self::Left => location.offset_by((-1, 0)),
            Self::Right => location.offset_by((1, 0)),
            Self::UpLeft => location.offset_by((-1, -1)),
            Self::UpRight => location.offset_by((1, -1)),
            Self::DownLeft => location.offset_by((-1, 1)),
            Self::DownRight => location.offset_by((1, 1)),
        }
    }
}

/// One of the `2 * (width + height)` attachment points around the chip, numbered clockwise from the top left corner.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Slot(pub usize);

/// The rectangular block of cells a module occupies while it operates.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Footprint {
    /// Cells across.
    pub width: Dimension,
    /// Cells down.
    pub height: Dimension,
}

impl Default for Footprint {
    fn default() -> Self {
        Self { width: NonZero::<Coord>::MIN, height: NonZero::<Coord>::MIN }
    }
}

/// A candidate chip: `width` by `height` cells, scheduled over timesteps `0..=time`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    /// Cells across.
    pub width: Dimension,
    /// Cells down.
    pub height: Dimension,
    /// The last timestep.
    pub time: Dimension,
}

impl Display for Geometry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "w={}, h={}, t={}", self.width, self.height, self.time)
    }
}

impl Geometry {
    /// A `width` by `height` chip scheduled over timesteps `0..=time`.
    pub fn new(width: Dimension, height: Dimension, time: Dimension) -> Self {
        Self { width, height, time }
    }

    /// Build a geometry from raw extents, or `None` if any of them is zero.
    pub fn from_extents(width: Coord, height: Coord, time: Coord) -> Option<Self> {
        Some(Self::new(NonZero::new(width)?, NonZero::new(height)?, NonZero::new(time)?))
    }

    /// Width.
    #[inline]
    pub fn w(&self) -> Coord {
        self.width.get()
    }

    /// Height.
    #[inline]
    pub fn h(&self) -> Coord {
        self.height.get()
    }

    /// The last timestep.
    #[inline]
    pub fn t(&self) -> Coord {
        self.time.get()
    }

    #[inline]
    /// Number of perimeter slots.
    pub fn perimeter(&self) -> usize {
        2 * (self.w() + self.h())
    }

    /// Timesteps at which the board may hold anything; t = 0 is always empty.
    #[inline]
    pub fn active_steps(&self) -> RangeInclusive<usize> {
        1..=self.t()
    }

    /// Whether `location` is a cell of this chip.
    #[inline]
    pub fn contains(&self, location: Location) -> bool {
        location.0 < self.w() && location.1 < self.h()
    }

    /// Every cell, column by column.
    pub fn cells(&self) -> impl Iterator<Item = Location> + Clone {
        iproduct!(0..self.w(), 0..self.h()).map(|(x, y)| Location(x, y))
    }

    /// Every perimeter slot, clockwise.
    pub fn slots(&self) -> impl Iterator<Item = Slot> + Clone {
        (0..self.perimeter()).map(Slot)
    }

    /// `location` itself followed by its in-bounds orthogonal neighbors.
    pub fn stencil(&self, location: Location) -> Vec<Location> {
        std::iter::once(location)
            .chain(Step::ORTHOGONAL.iter().map(|step| step.attempt_from(location)))
            .filter(|l| self.contains(*l))
            .collect_vec()
    }

    /// `location` itself followed by its in-bounds Moore neighborhood.
    pub fn moore(&self, location: Location) -> Vec<Location> {
        std::iter::once(location)
            .chain(Step::VARIANTS.iter().map(|step| step.attempt_from(location)))
            .filter(|l| self.contains(*l))
            .collect_vec()
    }

    /// Perimeter slots a border cell can exchange droplets with. Interior cells touch none; corners touch two.
    pub fn slots_touching(&self, location: Location) -> Vec<Slot> {
        let Location(x, y) = location;
        let (w, h) = (self.w(), self.h());
        let mut slots = Vec::with_capacity(4);
        if !self.contains(location) {
            return slots;
        }

        // clockwise from the top left corner
        if y == 0 {
            slots.push(Slot(x));
        }
        if x == w - 1 {
            slots.push(Slot(w + y));
        }
        if y == h - 1 {
            slots.push(Slot(2 * w + h - 1 - x));
        }
        if x == 0 {
            slots.push(Slot(self.perimeter() - 1 - y));
        }

        slots
    }

    /// Top left corners of every in-bounds placement of `footprint` covering `location`.
    pub fn placements(&self, location: Location, footprint: Footprint) -> Vec<Location> {
        let (fw, fh) = (footprint.width.get(), footprint.height.get());
        iproduct!(0..fh, 0..fw)
            .filter(|(dy, dx)| *dx <= location.0 && *dy <= location.1)
            .map(|(dy, dx)| Location(location.0 - dx, location.1 - dy))
            .filter(|origin| self.contains(*origin) && self.contains(Location(origin.0 + fw - 1, origin.1 + fh - 1)))
            .collect_vec()
    }

    /// Top left corners of every in-bounds placement of `footprint`.
    pub fn origins(&self, footprint: Footprint) -> Vec<Location> {
        let (fw, fh) = (footprint.width.get(), footprint.height.get());
        self.cells()
            .filter(|origin| self.contains(Location(origin.0 + fw - 1, origin.1 + fh - 1)))
            .collect_vec()
    }

    /// The cells of `footprint` placed with its top left corner at `origin`.
    pub fn block(&self, origin: Location, footprint: Footprint) -> Vec<Location> {
        iproduct!(0..footprint.width.get(), 0..footprint.height.get())
            .map(|(dx, dy)| Location(origin.0 + dx, origin.1 + dy))
            .filter(|l| self.contains(*l))
            .collect_vec()
    }

    /// The block plus every in-bounds cell edge-adjacent to it; the four diagonal corners are not part of the ring.
    pub fn ring(&self, origin: Location, footprint: Footprint) -> Vec<Location> {
        let (fw, fh) = (footprint.width.get() as isize, footprint.height.get() as isize);
        iproduct!(-1..=fw, -1..=fh)
            .filter(|(dx, dy)| !((*dx == -1 || *dx == fw) && (*dy == -1 || *dy == fh)))
            .map(|(dx, dy)| origin.offset_by((dx, dy)))
            .filter(|l| self.contains(*l))
            .collect_vec()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use itertools::Itertools;
    use rstest::rstest;

    use super::*;

    fn geometry(w: usize, h: usize) -> Geometry {
        Geometry::from_extents(w, h, 1).unwrap()
    }

    #[rstest]
    #[case(Location(0, 0), vec![Slot(0), Slot(13)])]
    #[case(Location(3, 0), vec![Slot(3), Slot(4)])]
    #[case(Location(3, 2), vec![Slot(6), Slot(7)])]
    #[case(Location(0, 2), vec![Slot(10), Slot(11)])]
    #[case(Location(1, 1), vec![])]
    #[case(Location(2, 2), vec![Slot(8)])]
    fn slots_run_clockwise(#[case] location: Location, #[case] expected: Vec<Slot>) {
        // 4 wide, 3 tall, perimeter 14
        assert_eq!(geometry(4, 3).slots_touching(location), expected);
    }

    #[test]
    fn every_slot_touches_exactly_one_cell() {
        let g = geometry(4, 3);
        let touched = g.cells().flat_map(|c| g.slots_touching(c)).collect_vec();
        assert_eq!(touched.len(), g.perimeter());
        assert_eq!(touched.iter().collect::<HashSet<_>>().len(), g.perimeter());
    }

    #[test]
    fn single_cell_touches_all_four_slots() {
        assert_eq!(geometry(1, 1).slots_touching(Location(0, 0)).len(), 4);
    }

    #[test]
    fn stencil_and_moore_clip_to_board() {
        let g = geometry(3, 3);
        assert_eq!(g.stencil(Location(0, 0)).len(), 3);
        assert_eq!(g.stencil(Location(1, 1)).len(), 5);
        assert_eq!(g.moore(Location(0, 0)).len(), 4);
        assert_eq!(g.moore(Location(1, 1)).len(), 9);
    }

    #[test]
    fn placements_keep_footprint_in_bounds() {
        let g = geometry(3, 3);
        let footprint = Footprint { width: NonZero::new(2).unwrap(), height: NonZero::new(2).unwrap() };
        let mut corner = g.placements(Location(0, 0), footprint);
        corner.sort();
        assert_eq!(corner, vec![Location(0, 0)]);
        let mut center = g.placements(Location(1, 1), footprint);
        center.sort();
        assert_eq!(center, vec![Location(0, 0), Location(0, 1), Location(1, 0), Location(1, 1)]);
        assert!(g.placements(Location(2, 2), footprint).contains(&Location(1, 1)));
    }

    #[test]
    fn origins_fit_the_whole_footprint() {
        let g = geometry(3, 2);
        let footprint = Footprint { width: NonZero::new(2).unwrap(), height: NonZero::new(2).unwrap() };
        assert_eq!(g.origins(footprint), vec![Location(0, 0), Location(1, 0)]);
        assert_eq!(g.origins(Footprint::default()).len(), 6);
        assert!(geometry(1, 1).origins(footprint).is_empty());
    }

    #[test]
    fn ring_skips_diagonal_corners() {
        let g = geometry(4, 4);
        let footprint = Footprint { width: NonZero::new(2).unwrap(), height: NonZero::new(2).unwrap() };
        let ring = g.ring(Location(1, 1), footprint);
        // 4 block cells + 8 edge-adjacent cells
        assert_eq!(ring.len(), 12);
        assert!(!ring.contains(&Location(0, 0)));
        assert!(ring.contains(&Location(0, 1)));
        assert!(ring.contains(&Location(3, 2)));
    }
}
