//! Octree cell states and their packed representation
//!
//! The octree is an implicit-index arena, so each cell is a single byte:
//! a two-bit realization tag plus the intersect flag. Unpack to a [`Cell`]
//! to actually use it.

/// Raw cell data, as stored in the octree arena
#[derive(Copy, Clone, Default, Eq, PartialEq)]
pub struct CellData(u8);

const TAG_VACANT: u8 = 0b00;
const TAG_LEAF: u8 = 0b01;
const TAG_BRANCH: u8 = 0b10;
const INTERSECT_BIT: u8 = 0b100;

static_assertions::const_assert_eq!(std::mem::size_of::<CellData>(), 1);

impl CellData {
    /// Returns the raw byte, for persistence
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Rebuilds cell data from a persisted byte, rejecting invalid tags
    pub fn try_from_bits(i: u8) -> Option<Self> {
        if i & 0b11 == 0b11 || i & !(0b111) != 0 {
            None
        } else {
            Some(Self(i))
        }
    }
}

impl std::fmt::Debug for CellData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c: Cell = (*self).into();
        c.fmt(f)
    }
}

/// Unpacked form of [`CellData`]
///
/// A `Vacant` cell was never realized: its region is not subdivided and
/// lies entirely outside or entirely inside the surface (its nearest
/// realized ancestor says which).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Cell {
    Vacant,
    Leaf { intersect: bool },
    Branch { intersect: bool },
}

impl Cell {
    /// Whether this cell's volume intersects the surface
    pub fn intersect(self) -> bool {
        matches!(
            self,
            Cell::Leaf { intersect: true } | Cell::Branch { intersect: true }
        )
    }

    /// Whether this cell is realized (leaf or branch)
    pub fn is_realized(self) -> bool {
        !matches!(self, Cell::Vacant)
    }
}

impl From<Cell> for CellData {
    fn from(c: Cell) -> Self {
        let i = match c {
            Cell::Vacant => TAG_VACANT,
            Cell::Leaf { intersect } => {
                TAG_LEAF | if intersect { INTERSECT_BIT } else { 0 }
            }
            Cell::Branch { intersect } => {
                TAG_BRANCH | if intersect { INTERSECT_BIT } else { 0 }
            }
        };
        CellData(i)
    }
}

impl From<CellData> for Cell {
    fn from(c: CellData) -> Self {
        let intersect = c.0 & INTERSECT_BIT != 0;
        match c.0 & 0b11 {
            TAG_VACANT => Cell::Vacant,
            TAG_LEAF => Cell::Leaf { intersect },
            TAG_BRANCH => Cell::Branch { intersect },
            _ => unreachable!("invalid cell tag"),
        }
    }
}
