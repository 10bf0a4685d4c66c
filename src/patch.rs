//! Patch box and connectivity (§4.3): a rectangular index space with halo
//! rings, per-side neighbor descriptors, and the exchange contract the
//! grid uses to request halo data between stages.

use serde::{Serialize, Deserialize};

pub type PatchIndex = usize;

/// The eight cardinal and diagonal directions a patch side/corner can face.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum Direction {
    Right,
    Top,
    Left,
    Bottom,
    TopRight,
    TopLeft,
    BottomLeft,
    BottomRight,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::Right, Direction::Top, Direction::Left, Direction::Bottom,
        Direction::TopRight, Direction::TopLeft, Direction::BottomLeft, Direction::BottomRight,
    ];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Right => Direction::Left,
            Direction::Left => Direction::Right,
            Direction::Top => Direction::Bottom,
            Direction::Bottom => Direction::Top,
            Direction::TopRight => Direction::BottomLeft,
            Direction::BottomLeft => Direction::TopRight,
            Direction::TopLeft => Direction::BottomRight,
            Direction::BottomRight => Direction::TopLeft,
        }
    }

    pub fn is_edge(self) -> bool {
        matches!(self, Direction::Right | Direction::Top | Direction::Left | Direction::Bottom)
    }
}

/**
 * Describes the neighbor across one side or corner of a patch. The
 * Cartesian specialization always uses identity mappings (no flips, no
 * reversal); the flags exist to support the cubed-sphere variant, where
 * a patch edge can border a neighbor whose local (alpha, beta) axes are
 * rotated or mirrored relative to this patch's, and DSS must correct
 * velocity components accordingly before averaging.
 */
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct NeighborDescriptor {
    pub neighbor: PatchIndex,
    pub direction: Direction,

    /// Flips the sign of the velocity component parallel to this side
    /// under the neighbor's coordinate mapping.
    pub switch_parallel: bool,

    /// Flips the sign of the velocity component perpendicular to this
    /// side under the neighbor's coordinate mapping.
    pub switch_perpendicular: bool,

    /// Whether the neighbor's along-edge node ordering runs opposite to
    /// this patch's.
    pub reverse_order: bool,
}

impl NeighborDescriptor {
    /// The identity descriptor used by every interior Cartesian neighbor:
    /// no sign flips, no reordering.
    pub fn identity(neighbor: PatchIndex, direction: Direction) -> Self {
        Self { neighbor, direction, switch_parallel: false, switch_perpendicular: false, reverse_order: false }
    }
}

/**
 * A patch's interior index range `[a_begin, a_end) x [b_begin, b_end)` in
 * elements, plus a halo of `halo` elements on each side. Node and edge
 * coordinate queries are expressed in elements-since-origin, consistent
 * with the grid's GLL element mesh (§3).
 */
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatchBox {
    pub a_begin: i64,
    pub a_end: i64,
    pub b_begin: i64,
    pub b_end: i64,
    pub halo: usize,
    pub neighbors: Vec<NeighborDescriptor>,
}

impl PatchBox {
    pub fn new(a_begin: i64, a_end: i64, b_begin: i64, b_end: i64, halo: usize) -> Self {
        Self { a_begin, a_end, b_begin, b_end, halo, neighbors: Vec::new() }
    }

    pub fn elements_a(&self) -> i64 {
        self.a_end - self.a_begin
    }

    pub fn elements_b(&self) -> i64 {
        self.b_end - self.b_begin
    }

    /// Full index range including halo on both sides, along axis a.
    pub fn full_range_a(&self) -> (i64, i64) {
        (self.a_begin - self.halo as i64, self.a_end + self.halo as i64)
    }

    pub fn full_range_b(&self) -> (i64, i64) {
        (self.b_begin - self.halo as i64, self.b_end + self.halo as i64)
    }

    /// Whether an element index `(a, b)` lies in this patch's interior
    /// (excludes halo).
    pub fn is_interior(&self, a: i64, b: i64) -> bool {
        a >= self.a_begin && a < self.a_end && b >= self.b_begin && b < self.b_end
    }

    /// Whether an element index lies in the halo (inside the full range
    /// but outside the interior).
    pub fn is_halo(&self, a: i64, b: i64) -> bool {
        let (fa0, fa1) = self.full_range_a();
        let (fb0, fb1) = self.full_range_b();
        a >= fa0 && a < fa1 && b >= fb0 && b < fb1 && !self.is_interior(a, b)
    }

    pub fn neighbor_on(&self, direction: Direction) -> Option<&NeighborDescriptor> {
        self.neighbors.iter().find(|n| n.direction == direction)
    }

    pub fn set_neighbor(&mut self, descriptor: NeighborDescriptor) {
        self.neighbors.retain(|n| n.direction != descriptor.direction);
        self.neighbors.push(descriptor);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn interior_excludes_halo() {
        let patch = PatchBox::new(0, 4, 0, 4, 2);
        assert!(patch.is_interior(0, 0));
        assert!(!patch.is_interior(-1, 0));
        assert!(patch.is_halo(-1, 0));
        assert!(!patch.is_halo(-3, 0));
    }

    #[test]
    fn opposite_direction_is_involutive() {
        for d in Direction::ALL {
            assert_eq!(d.opposite().opposite(), d);
        }
    }
}
