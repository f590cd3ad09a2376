//! Strongly-typed axes and cell corners
//!
//! Everything in the octree and the dual hex mesh is phrased in terms of a
//! single corner-numbering convention, so it lives here rather than being
//! re-derived (and gotten subtly wrong) at each call site.

/// A single axis, represented as a `u8` with one bit (between 0 and 3) set
///
/// The invariant is enforced at construction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Axis(u8);

impl Axis {
    /// Builds a new axis
    ///
    /// # Panics
    /// If the input does not have exactly one set bit in the 0-2 range
    pub const fn new(i: u8) -> Self {
        assert!(i.count_ones() == 1);
        assert!(i.trailing_zeros() < 3);
        Self(i)
    }

    /// Converts from a bitmask to an index in the 0-2 range
    pub fn index(self) -> usize {
        self.0.trailing_zeros() as usize
    }

    /// Cycles through X-Y-Z axes, returning the next one
    pub const fn next(self) -> Self {
        let u = self.0 << 1;
        if u > Z.0 {
            X
        } else {
            Axis(u)
        }
    }
}

/// The X axis, i.e. `[1, 0, 0]`
pub const X: Axis = Axis(1);
/// The Y axis, i.e. `[0, 1, 0]`
pub const Y: Axis = Axis(2);
/// The Z axis, i.e. `[0, 0, 1]`
pub const Z: Axis = Axis(4);

/// Strongly-typed cell corner, in the `[0, 8)` range
///
/// Corners (and octree children, which are numbered equivalently) follow one
/// fixed convention throughout the crate:
///
/// ```text
///         6 -------- 7
///        /          /|       Z
///       / |        / |       ^  _ Y
///      4----------5  |       | /
///      |  |       |  |       |/
///      |  2-------|--3       ---> X
///      | /        | /
///      |/         |/
///      0----------1
/// ```
///
/// i.e. bit 0 is the +X side, bit 1 the +Y side, bit 2 the +Z side.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Corner(u8);

impl Corner {
    /// Builds a new corner
    ///
    /// # Panics
    /// If `i >= 8`, which is not a valid corner index
    pub const fn new(i: u8) -> Self {
        assert!(i < 8);
        Self(i)
    }

    /// Returns the value of this corner as an index
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterates over all 8 corners
    pub fn iter() -> impl Iterator<Item = Self> {
        (0..8).map(Corner)
    }

    /// Per-axis 0/1 offset of this corner within its cell
    pub fn offset(self) -> [u64; 3] {
        [
            u64::from(self & X),
            u64::from(self & Y),
            u64::from(self & Z),
        ]
    }
}

impl std::ops::BitAnd<Axis> for Corner {
    type Output = bool;
    fn bitand(self, rhs: Axis) -> bool {
        (self.0 & rhs.0) != 0
    }
}

impl std::ops::BitXor<Axis> for Corner {
    type Output = Corner;
    fn bitxor(self, rhs: Axis) -> Corner {
        Corner(self.0 ^ rhs.0)
    }
}

impl std::ops::BitOr<Axis> for Corner {
    type Output = Corner;
    fn bitor(self, rhs: Axis) -> Corner {
        Corner(self.0 | rhs.0)
    }
}

impl From<Axis> for Corner {
    fn from(a: Axis) -> Self {
        Corner(a.0)
    }
}

/// The six quad faces of a cell (or hexahedron), as corner loops
///
/// Indexed by `2 * axis + side`, where `side` is 1 on the positive side.
/// Each entry walks the quad's perimeter counter-clockwise as seen from
/// outside the cell, so `[a, b, c, d]` triangulates as `(a, b, c)` and
/// `(a, c, d)` with outward normals.
pub const FACES: [[usize; 4]; 6] = [
    [0, 4, 6, 2], // -X
    [1, 3, 7, 5], // +X
    [0, 1, 5, 4], // -Y
    [2, 6, 7, 3], // +Y
    [0, 2, 3, 1], // -Z
    [4, 5, 7, 6], // +Z
];
