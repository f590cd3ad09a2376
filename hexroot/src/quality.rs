//! Element filtering on the raw dual mesh
//!
//! The dual extraction deliberately over-generates: it emits elements for
//! every octree grid vertex, including those whose corners lie outside the
//! input surface and degenerate elements from 2:1 transitions. This module
//! drops the former and flags the latter.

use log::debug;

use crate::geometry::worst_corner;
use crate::hex::HexMesh;

/// Removes every element with a corner outside the surface (negative
/// isovalue), then compacts the vertex set
///
/// Corners exactly on the surface (isovalue zero) are kept.
pub fn remove_outside(mesh: &mut HexMesh) {
    let before = mesh.elems.len();
    let isovalues = &mesh.isovalues;
    mesh.elems
        .retain(|e| e.iter().all(|&v| isovalues[v] >= 0.0));
    debug!(
        "outside filter: {} of {before} elements kept",
        mesh.elems.len()
    );
    mesh.compact();
}

/// Per-element quality check: the index of the worst corner for every
/// element whose minimum scaled Jacobian falls at or below `threshold`,
/// `None` for elements that pass
///
/// Detection only; flagged elements are left in the mesh.
pub fn flag_poor_quality(mesh: &HexMesh, threshold: f64) -> Vec<Option<usize>> {
    let flags: Vec<_> = (0..mesh.elems.len())
        .map(|e| worst_corner(&mesh.element_corners(e), threshold))
        .collect();
    let bad = flags.iter().filter(|f| f.is_some()).count();
    if bad > 0 {
        debug!(
            "quality check: {bad} of {} elements at or below {threshold}",
            mesh.elems.len()
        );
    }
    flags
}
