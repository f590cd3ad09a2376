//! Adaptive octree construction and strong (2:1) balancing
//!
//! The octree is implicit: a cell is addressed by an integer index computed
//! from its level and level-local `(x, y, z)` grid coordinate, and the whole
//! tree is a flat arena of one-byte [`CellData`] entries. This keeps
//! locality, makes parent/child arithmetic trivial, and makes persistence a
//! matter of dumping the arena.

use std::collections::{BTreeSet, HashMap};

use log::{debug, info};

use crate::cell::{Cell, CellData};
use crate::geometry::{triangles_intersect, Triangle};
use crate::surface::Surface;
use crate::types::{Corner, FACES};
use crate::{Error, Settings};

/// Maximum supported octree depth
///
/// The arena holds `(8^(d+1) - 1) / 7` cells, so depth 8 is ~19 MB of cell
/// data; deeper trees need a different storage strategy.
pub const MAX_DEPTH: u8 = 8;

/// Number of cells in all levels strictly above `level`
///
/// This is the series `8^0 + 8^1 + ... + 8^(level-1)`, i.e. the arena index
/// at which `level`'s cells begin.
pub fn level_offset(level: u8) -> usize {
    ((1usize << (3 * level as usize)) - 1) / 7
}

/// Arena index of the cell at level-local grid coordinate `(x, y, z)`
///
/// # Panics
/// If any coordinate is outside `[0, 2^level)`
pub fn xyz_to_index(level: u8, x: u64, y: u64, z: u64) -> usize {
    let n = 1u64 << level;
    assert!(x < n && y < n && z < n, "cell coordinate out of range");
    level_offset(level)
        + (x + (y << level) + (z << (2 * level as u64))) as usize
}

/// Level-local grid coordinate of the cell at `index`
///
/// Mutual inverse of [`xyz_to_index`] for every valid `(level, x, y, z)`.
///
/// # Panics
/// If `index` is not within `level`'s slice of the arena
pub fn index_to_xyz(index: usize, level: u8) -> (u64, u64, u64) {
    let base = level_offset(level);
    assert!(
        index >= base && index < level_offset(level + 1),
        "cell index out of range for level"
    );
    let local = (index - base) as u64;
    let mask = (1u64 << level) - 1;
    (
        local & mask,
        (local >> level) & mask,
        local >> (2 * level as u64),
    )
}

/// Level containing the given arena index
pub fn level_of(index: usize, depth: u8) -> u8 {
    for level in 0..=depth {
        if index < level_offset(level + 1) {
            return level;
        }
    }
    panic!("cell index out of range for octree of depth {depth}");
}

/// What lives at a same-level neighbor position
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Resolved {
    /// The position is outside the octree domain
    Outside,
    /// The position is subdivided more finely than the queried level
    Finer,
    /// The position is covered by a realized leaf at `level <=` the queried
    /// level
    Leaf { level: u8, index: usize },
}

/// A classified, adaptively-refined octree over one [`Surface`]
pub struct Octree {
    depth: u8,

    /// Cell arena, indexed by [`xyz_to_index`]
    cells: Vec<CellData>,

    /// Indices of all realized leaves, ascending (the authoritative leaf
    /// set consumed by later stages)
    leaves: Vec<usize>,

    /// Per-cell triangle association: the subset of surface triangles whose
    /// bounding region overlaps the cell, kept only for intersecting cells.
    /// A child only ever re-tests triangles inherited from its parent's
    /// list.
    cell_tris: HashMap<usize, Vec<u32>>,
}

impl Octree {
    /// Recursively classifies and subdivides cells against the surface
    pub fn build(surface: &Surface, settings: &Settings) -> Result<Self, Error> {
        if settings.depth > MAX_DEPTH {
            return Err(Error::BadDepth(settings.depth, MAX_DEPTH));
        }
        let mut out = Self {
            depth: settings.depth,
            cells: vec![CellData::default(); level_offset(settings.depth + 1)],
            leaves: vec![],
            cell_tris: HashMap::new(),
        };
        let all: Vec<u32> = (0..surface.triangles().len() as u32).collect();
        out.recurse(surface, settings, 0, 0, 0, 0, &all);
        out.leaves = out.collect_leaves();
        debug!(
            "built octree at depth {}: {} leaves, {} intersecting cells",
            out.depth,
            out.leaves.len(),
            out.cell_tris.len(),
        );
        Ok(out)
    }

    /// Rebuilds an octree from persisted parts (no triangle association)
    pub fn from_parts(
        depth: u8,
        cells: Vec<CellData>,
        leaves: Vec<usize>,
    ) -> Result<Self, Error> {
        if depth > MAX_DEPTH {
            return Err(Error::BadDepth(depth, MAX_DEPTH));
        }
        if cells.len() != level_offset(depth + 1) {
            return Err(Error::BadSnapshot("cell arena length mismatch"));
        }
        for &leaf in &leaves {
            if leaf >= cells.len()
                || !matches!(Cell::from(cells[leaf]), Cell::Leaf { .. })
            {
                return Err(Error::BadSnapshot("leaf list names a non-leaf cell"));
            }
        }
        Ok(Self {
            depth,
            cells,
            leaves,
            cell_tris: HashMap::new(),
        })
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Unpacked cell state at `index`
    pub fn cell(&self, index: usize) -> Cell {
        self.cells[index].into()
    }

    /// Raw cell arena, for persistence
    pub fn cells(&self) -> &[CellData] {
        &self.cells
    }

    /// The authoritative leaf-index list, ascending
    pub fn leaves(&self) -> &[usize] {
        &self.leaves
    }

    /// Triangles associated with an intersecting cell, if any
    pub fn cell_triangles(&self, index: usize) -> Option<&[u32]> {
        self.cell_tris.get(&index).map(|v| v.as_slice())
    }

    /// Finds the realized leaf covering the finest-level cell `(x, y, z)`,
    /// walking down from the root
    ///
    /// Returns `None` for positions outside the domain. In-domain positions
    /// always resolve: a branch realizes all 8 children, so the walk ends at
    /// a leaf at or above the finest level.
    pub fn leaf_at(&self, x: i64, y: i64, z: i64) -> Option<(u8, usize)> {
        match self.resolve(self.depth, x, y, z) {
            Resolved::Leaf { level, index } => Some((level, index)),
            Resolved::Outside => None,
            Resolved::Finer => unreachable!("no cells below the finest level"),
        }
    }

    fn resolve(&self, level: u8, x: i64, y: i64, z: i64) -> Resolved {
        let n = 1i64 << level;
        if x < 0 || y < 0 || z < 0 || x >= n || y >= n || z >= n {
            return Resolved::Outside;
        }
        let (x, y, z) = (x as u64, y as u64, z as u64);
        for lv in 0..=level {
            let shift = level - lv;
            let index = xyz_to_index(lv, x >> shift, y >> shift, z >> shift);
            match self.cell(index) {
                Cell::Leaf { .. } => return Resolved::Leaf { level: lv, index },
                Cell::Branch { .. } => continue,
                // Vacant below a leaf is unreachable (the walk stops at the
                // leaf); a vacant root means an empty tree
                Cell::Vacant => return Resolved::Outside,
            }
        }
        Resolved::Finer
    }

    /// Whether the grid vertex `(vx, vy, vz)` at `level` is shared by eight
    /// surrounding cells, each realized at `level` or subdivided deeper
    pub fn is_shared_by_eight_cells(
        &self,
        level: u8,
        vx: u64,
        vy: u64,
        vz: u64,
    ) -> bool {
        Corner::iter().all(|c| {
            let o = c.offset();
            let r = self.resolve(
                level,
                vx as i64 - 1 + o[0] as i64,
                vy as i64 - 1 + o[1] as i64,
                vz as i64 - 1 + o[2] as i64,
            );
            match r {
                Resolved::Outside => false,
                Resolved::Finer => true,
                Resolved::Leaf { level: lv, .. } => lv == level,
            }
        })
    }

    /// Enforces the strong balance invariant: any two leaves sharing a
    /// face, edge, or corner differ by at most one level
    ///
    /// Repeatedly sweeps the leaf set, refining any coarser neighbor that
    /// violates the invariant; each sweep strictly grows the realized set,
    /// so the loop reaches a fixed point unless the adjacency rule is
    /// broken, in which case it fails fast with [`Error::BalanceOverflow`].
    pub fn balance(
        &mut self,
        surface: &Surface,
        settings: &Settings,
    ) -> Result<(), Error> {
        for pass in 0..settings.max_balance_passes {
            let mut to_refine = BTreeSet::new();
            for &leaf in &self.leaves {
                let level = level_of(leaf, self.depth);
                if level < 2 {
                    // A violating neighbor would be at level < 0
                    continue;
                }
                let (x, y, z) = index_to_xyz(leaf, level);
                for corner in Corner::iter() {
                    let o = corner.offset();
                    let (vx, vy, vz) = (x + o[0], y + o[1], z + o[2]);
                    if self.is_shared_by_eight_cells(level, vx, vy, vz) {
                        continue;
                    }
                    for oct in Corner::iter() {
                        let oo = oct.offset();
                        let r = self.resolve(
                            level,
                            vx as i64 - 1 + oo[0] as i64,
                            vy as i64 - 1 + oo[1] as i64,
                            vz as i64 - 1 + oo[2] as i64,
                        );
                        if let Resolved::Leaf { level: lv, index } = r {
                            if lv + 1 < level {
                                to_refine.insert(index);
                            }
                        }
                    }
                }
            }
            if to_refine.is_empty() {
                info!("octree balanced after {pass} refinement sweeps");
                debug_assert!(self.check_balance());
                return Ok(());
            }
            debug!(
                "balance sweep {pass}: refining {} cells",
                to_refine.len()
            );
            for index in to_refine {
                self.refine_brothers(index, surface, settings);
            }
            self.leaves = self.collect_leaves();
        }
        Err(Error::BalanceOverflow(settings.max_balance_passes))
    }

    /// Subdivides a leaf by one level: realizes its 8 children, each
    /// inheriting (and re-filtering) the parent's triangle association and
    /// classifying its own intersect flag
    fn refine_brothers(&mut self, index: usize, surface: &Surface, settings: &Settings) {
        let level = level_of(index, self.depth);
        debug_assert!(level < self.depth);
        let (x, y, z) = index_to_xyz(index, level);
        let parent = self.cell(index);
        debug_assert!(matches!(parent, Cell::Leaf { .. }));

        let inherited = self.cell_tris.get(&index).cloned().unwrap_or_default();
        let margin = settings.feature_distance_ratio * surface.cell_size(level + 1);
        for corner in Corner::iter() {
            let o = corner.offset();
            let (cx, cy, cz) = (2 * x + o[0], 2 * y + o[1], 2 * z + o[2]);
            let child_tris =
                filter_triangles(surface, &inherited, level + 1, cx, cy, cz, margin);
            let intersect = !child_tris.is_empty()
                && cell_intersects(surface, &child_tris, level + 1, cx, cy, cz);
            let child = xyz_to_index(level + 1, cx, cy, cz);
            self.cells[child] = Cell::Leaf { intersect }.into();
            if intersect {
                self.cell_tris.insert(child, child_tris);
            }
        }
        self.cells[index] = Cell::Branch {
            intersect: parent.intersect(),
        }
        .into();
    }

    /// Verifies the strong balance invariant over all adjacency kinds
    /// (face, edge, and corner); used by tests and debug assertions
    pub fn check_balance(&self) -> bool {
        for &leaf in &self.leaves {
            let level = level_of(leaf, self.depth);
            let (x, y, z) = index_to_xyz(leaf, level);
            for dz in -1..=1i64 {
                for dy in -1..=1i64 {
                    for dx in -1..=1i64 {
                        if dx == 0 && dy == 0 && dz == 0 {
                            continue;
                        }
                        let r = self.resolve(
                            level,
                            x as i64 + dx,
                            y as i64 + dy,
                            z as i64 + dz,
                        );
                        if let Resolved::Leaf { level: lv, .. } = r {
                            if lv + 1 < level {
                                return false;
                            }
                        }
                    }
                }
            }
        }
        true
    }

    fn collect_leaves(&self) -> Vec<usize> {
        (0..self.cells.len())
            .filter(|&i| matches!(self.cell(i), Cell::Leaf { .. }))
            .collect()
    }

    fn recurse(
        &mut self,
        surface: &Surface,
        settings: &Settings,
        level: u8,
        x: u64,
        y: u64,
        z: u64,
        tris: &[u32],
    ) {
        let index = xyz_to_index(level, x, y, z);
        let intersect =
            !tris.is_empty() && cell_intersects(surface, tris, level, x, y, z);
        if intersect {
            self.cell_tris.insert(index, tris.to_vec());
        }

        // An intersecting cell below maximum depth always refines; a
        // non-intersecting cell refines only when the surface is closer
        // than the local-feature-size threshold
        let refine = level < self.depth
            && (intersect || near_feature(surface, settings, tris, level, x, y, z));
        if !refine {
            self.cells[index] = Cell::Leaf { intersect }.into();
            return;
        }

        self.cells[index] = Cell::Branch { intersect }.into();
        let margin = settings.feature_distance_ratio * surface.cell_size(level + 1);
        for corner in Corner::iter() {
            let o = corner.offset();
            let (cx, cy, cz) = (2 * x + o[0], 2 * y + o[1], 2 * z + o[2]);
            let child_tris =
                filter_triangles(surface, tris, level + 1, cx, cy, cz, margin);
            self.recurse(surface, settings, level + 1, cx, cy, cz, &child_tris);
        }
    }
}

/// Subset of `tris` whose bounding box overlaps the given cell's cube,
/// inflated by `margin`
///
/// Children never re-test triangles already proven irrelevant for their
/// parent, which is what keeps construction cost proportional to surface
/// complexity rather than to `triangle count x cell count`. The margin
/// (the local-feature-size threshold) keeps triangles *near* a cell in its
/// list, so the feature-distance test can see surfaces the cell does not
/// touch. A triangle within the child's margin is always within the
/// parent's larger one, so nothing is lost down the recursion.
fn filter_triangles(
    surface: &Surface,
    tris: &[u32],
    level: u8,
    x: u64,
    y: u64,
    z: u64,
    margin: f64,
) -> Vec<u32> {
    let lo = surface.cell_min(level, x, y, z);
    let s = surface.cell_size(level);
    let pad = margin + 1e-9 * s;
    tris.iter()
        .copied()
        .filter(|&t| {
            let (tlo, thi) = surface.triangle(t).aabb();
            (0..3).all(|i| tlo[i] <= lo[i] + s + pad && thi[i] >= lo[i] - pad)
        })
        .collect()
}

/// Whether any of the given triangles crosses the cell's boundary or lies
/// within its cube
fn cell_intersects(
    surface: &Surface,
    tris: &[u32],
    level: u8,
    x: u64,
    y: u64,
    z: u64,
) -> bool {
    let lo = surface.cell_min(level, x, y, z);
    let s = surface.cell_size(level);
    let eps = 1e-9 * s;

    let corners: Vec<_> = Corner::iter()
        .map(|c| {
            let o = c.offset();
            nalgebra::Point3::new(
                lo.x + s * o[0] as f64,
                lo.y + s * o[1] as f64,
                lo.z + s * o[2] as f64,
            )
        })
        .collect();

    for &t in tris {
        let tri = surface.triangle(t);
        // A triangle with a vertex inside the cube lies (partly) within it;
        // otherwise any true intersection crosses one of the 6 faces
        let inside = |p: &nalgebra::Point3<f64>| {
            (0..3).all(|i| p[i] >= lo[i] - eps && p[i] <= lo[i] + s + eps)
        };
        if inside(&tri.a) || inside(&tri.b) || inside(&tri.c) {
            return true;
        }
        for quad in FACES {
            let face =
                Triangle::new(corners[quad[0]], corners[quad[1]], corners[quad[2]]);
            if triangles_intersect(&face, &tri) {
                return true;
            }
            let face =
                Triangle::new(corners[quad[0]], corners[quad[2]], corners[quad[3]]);
            if triangles_intersect(&face, &tri) {
                return true;
            }
        }
    }
    false
}

/// Local-feature-size refinement test for non-intersecting cells: refine
/// when the nearest associated triangle is closer than
/// `feature_distance_ratio x cell size`
fn near_feature(
    surface: &Surface,
    settings: &Settings,
    tris: &[u32],
    level: u8,
    x: u64,
    y: u64,
    z: u64,
) -> bool {
    if tris.is_empty() {
        return false;
    }
    let center = surface.cell_center(level, x, y, z);
    let threshold = settings.feature_distance_ratio * surface.cell_size(level);
    surface
        .nearest_point(&center, tris.iter().copied(), threshold)
        .is_some()
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Point3;

    fn cube_surface(margin: f64) -> Surface {
        Surface::cube(Point3::new(0.5, 0.5, 0.5), 0.5, margin)
    }

    #[test]
    fn level_offset_series() {
        assert_eq!(level_offset(0), 0);
        assert_eq!(level_offset(1), 1);
        assert_eq!(level_offset(2), 9);
        assert_eq!(level_offset(3), 73);
        assert_eq!(level_offset(4), 585);
    }

    #[test]
    fn coordinate_round_trip() {
        for level in 0..=3u8 {
            let n = 1u64 << level;
            for z in 0..n {
                for y in 0..n {
                    for x in 0..n {
                        let index = xyz_to_index(level, x, y, z);
                        assert_eq!(level_of(index, 3), level);
                        assert_eq!(index_to_xyz(index, level), (x, y, z));
                    }
                }
            }
        }
    }

    #[test]
    fn build_refines_along_the_surface() {
        let surface = cube_surface(0.0);
        let settings = Settings {
            depth: 2,
            ..Settings::default()
        };
        let octree = Octree::build(&surface, &settings).unwrap();

        assert!(matches!(octree.cell(0), Cell::Branch { intersect: true }));
        for &leaf in octree.leaves() {
            assert!(level_of(leaf, 2) <= 2);
        }
        // With a tight bounding cube every cell touches the surface, so the
        // whole tree is refined to the bottom
        assert!(octree
            .leaves()
            .iter()
            .all(|&l| level_of(l, 2) == 2));
    }

    #[test]
    fn interior_cells_stay_coarse() {
        let surface = cube_surface(0.6);
        let settings = Settings {
            depth: 3,
            feature_distance_ratio: 0.5,
            ..Settings::default()
        };
        let octree = Octree::build(&surface, &settings).unwrap();

        let levels: Vec<u8> = octree
            .leaves()
            .iter()
            .map(|&l| level_of(l, 3))
            .collect();
        assert!(levels.iter().any(|&l| l < 3), "some cells must stay coarse");
        // Every intersecting leaf reached the maximum depth
        for &leaf in octree.leaves() {
            if octree.cell(leaf).intersect() {
                assert_eq!(level_of(leaf, 3), 3);
            }
        }
    }

    #[test]
    fn feature_refinement_reaches_nearby_cells() {
        // One small triangle to the left of the (1, 0, 0) octant, plus a
        // far one that pins the bounding cube to [0, 1]^3
        let surface = Surface::new(
            vec![
                Point3::new(0.45, 0.0, 0.0),
                Point3::new(0.45, 0.2, 0.0),
                Point3::new(0.45, 0.0, 0.2),
                Point3::new(0.0, 1.0, 1.0),
                Point3::new(1.0, 1.0, 1.0),
                Point3::new(1.0, 0.9, 1.0),
            ],
            vec![[0, 1, 2], [3, 4, 5]],
            0.0,
        )
        .unwrap();
        let settings = Settings {
            depth: 2,
            feature_distance_ratio: 1.0,
            ..Settings::default()
        };
        let octree = Octree::build(&surface, &settings).unwrap();

        // The octant spans [0.5, 1] x [0, 0.5] x [0, 0.5] and touches neither
        // triangle, but the first one sits within one cell size of its
        // center, so the feature-distance rule must subdivide it
        let index = xyz_to_index(1, 1, 0, 0);
        assert!(matches!(
            octree.cell(index),
            Cell::Branch { intersect: false }
        ));
    }

    #[test]
    fn balance_reaches_a_fixed_point() {
        let surface = cube_surface(0.6);
        let settings = Settings {
            depth: 3,
            feature_distance_ratio: 0.5,
            ..Settings::default()
        };
        let mut octree = Octree::build(&surface, &settings).unwrap();
        octree.balance(&surface, &settings).unwrap();
        assert!(octree.check_balance());

        // A second run is a no-op
        let leaves = octree.leaves().to_vec();
        octree.balance(&surface, &settings).unwrap();
        assert_eq!(octree.leaves(), leaves.as_slice());
    }

    #[test]
    fn balance_covers_all_adjacency_kinds() {
        let surface = cube_surface(0.6);
        let settings = Settings {
            depth: 3,
            feature_distance_ratio: 0.5,
            ..Settings::default()
        };
        let mut octree = Octree::build(&surface, &settings).unwrap();
        octree.balance(&surface, &settings).unwrap();

        for &leaf in octree.leaves() {
            let level = level_of(leaf, 3);
            let (x, y, z) = index_to_xyz(leaf, level);
            for dz in -1..=1i64 {
                for dy in -1..=1i64 {
                    for dx in -1..=1i64 {
                        if (dx, dy, dz) == (0, 0, 0) {
                            continue;
                        }
                        if let Resolved::Leaf { level: lv, .. } = octree.resolve(
                            level,
                            x as i64 + dx,
                            y as i64 + dy,
                            z as i64 + dz,
                        ) {
                            assert!(
                                level - lv <= 1,
                                "neighbor at ({dx},{dy},{dz}) differs by more \
                                 than one level"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn single_triangle_refines_its_own_lineage() {
        let surface = Surface::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.2, 0.0, 0.02),
                Point3::new(0.05, 0.18, 0.04),
            ],
            vec![[0, 1, 2]],
            1.0,
        )
        .unwrap();
        let settings = Settings {
            depth: 3,
            feature_distance_ratio: 0.5,
            ..Settings::default()
        };
        let octree = Octree::build(&surface, &settings).unwrap();

        // Cells crossing the triangle are refined to the bottom; cells far
        // from it stay coarse
        for &leaf in octree.leaves() {
            if octree.cell(leaf).intersect() {
                assert_eq!(level_of(leaf, 3), 3);
            }
        }
        assert!(octree
            .leaves()
            .iter()
            .any(|&l| level_of(l, 3) < 3));
    }

    #[test]
    fn shared_vertex_requires_eight_realized_cells() {
        let surface = cube_surface(0.0);
        let settings = Settings {
            depth: 2,
            ..Settings::default()
        };
        let octree = Octree::build(&surface, &settings).unwrap();

        // Fully-refined tree: every interior vertex at the finest level is
        // shared, domain-boundary vertices are not
        assert!(octree.is_shared_by_eight_cells(2, 1, 1, 1));
        assert!(octree.is_shared_by_eight_cells(2, 2, 3, 1));
        assert!(!octree.is_shared_by_eight_cells(2, 0, 1, 1));
        assert!(!octree.is_shared_by_eight_cells(2, 4, 1, 1));
    }

    #[test]
    fn rejects_excessive_depth() {
        let surface = cube_surface(0.0);
        let settings = Settings {
            depth: MAX_DEPTH + 1,
            ..Settings::default()
        };
        assert!(matches!(
            Octree::build(&surface, &settings),
            Err(Error::BadDepth(_, _))
        ));
    }
}
