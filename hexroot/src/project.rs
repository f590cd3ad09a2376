//! Boundary projection onto the input surface
//!
//! After outside elements are removed the mesh boundary hugs the surface
//! from the inside at roughly one cell's distance. This pass snaps every
//! boundary vertex to its closest point on the surface, using the octree's
//! per-cell triangle association to keep the nearest-point search local.

use std::collections::BTreeSet;

use log::debug;

use crate::hex::HexMesh;
use crate::octree::Octree;
use crate::surface::Surface;
use crate::types::FACES;

/// Moves every vertex on the mesh boundary to the nearest point of the
/// surface
///
/// Each vertex moves exactly once per call; a vertex already on the surface
/// is its own nearest point, so re-running is a no-op. Projected vertices
/// have their isovalue set to zero.
pub fn project_boundary(mesh: &mut HexMesh, surface: &Surface, octree: &Octree) {
    let mut boundary_vertices = BTreeSet::new();
    for (e, face) in mesh.boundary_faces() {
        for &c in &FACES[face] {
            boundary_vertices.insert(mesh.elems[e][c]);
        }
    }

    let full = 0..surface.triangles().len() as u32;
    for &v in &boundary_vertices {
        let p = mesh.vertices[v];
        // Prefer the triangles associated with the leaf containing the
        // vertex; a non-intersecting leaf has none, so fall back to a full
        // scan
        let [gx, gy, gz] = surface.grid_coord(&p, octree.depth());
        let local = octree
            .leaf_at(gx as i64, gy as i64, gz as i64)
            .and_then(|(_, leaf)| octree.cell_triangles(leaf));
        let nearest = match local {
            Some(tris) if !tris.is_empty() => {
                surface.nearest_point(&p, tris.iter().copied(), f64::INFINITY)
            }
            _ => surface.nearest_point(&p, full.clone(), f64::INFINITY),
        };
        if let Some((_, q, _)) = nearest {
            mesh.vertices[v] = q;
            mesh.isovalues[v] = 0.0;
        }
    }
    debug!("projected {} boundary vertices", boundary_vertices.len());
}
