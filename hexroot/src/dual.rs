//! Dual full-hex extraction from a balanced octree
//!
//! The dual mesh places one vertex at the center of every leaf cell and one
//! hexahedral element per octree grid vertex, connecting the centers of the
//! 8 leaves surrounding that vertex in [`Corner`] order. On a strongly
//! balanced octree this yields a conforming all-hex mesh; across 2:1
//! transitions a coarse leaf covers several octants and its center repeats,
//! producing degenerate elements that the quality pass flags downstream.

use std::collections::{BTreeSet, HashMap};

use log::debug;

use crate::hex::HexMesh;
use crate::octree::{index_to_xyz, level_of, Octree};
use crate::surface::Surface;
use crate::types::Corner;

/// Extracts the dual hex mesh of the octree's leaf set
///
/// Grid vertices on the domain boundary have fewer than 8 surrounding
/// cells and emit no element. The cells they would connect touch the domain
/// boundary, and the bounding cube's margin keeps the surface strictly
/// interior, so any such element would be removed as outside anyway.
///
/// Each mesh vertex also samples the signed distance to the surface at its
/// leaf center, positive inside.
pub fn extract_dual_hex(octree: &Octree, surface: &Surface) -> HexMesh {
    let depth = octree.depth();
    let n = 1u64 << depth;

    // Distinct leaf-corner positions in finest-level grid coordinates,
    // ordered for deterministic output
    let mut grid_vertices = BTreeSet::new();
    for &leaf in octree.leaves() {
        let level = level_of(leaf, depth);
        let shift = depth - level;
        let (x, y, z) = index_to_xyz(leaf, level);
        for corner in Corner::iter() {
            let o = corner.offset();
            grid_vertices.insert((
                (x + o[0]) << shift,
                (y + o[1]) << shift,
                (z + o[2]) << shift,
            ));
        }
    }

    let mut mesh = HexMesh::new();
    let mut leaf_vertex: HashMap<usize, usize> = HashMap::new();
    let mut vertex_for = |leaf: usize, mesh: &mut HexMesh| -> usize {
        *leaf_vertex.entry(leaf).or_insert_with(|| {
            let level = level_of(leaf, depth);
            let (x, y, z) = index_to_xyz(leaf, level);
            let center = surface.cell_center(level, x, y, z);
            mesh.vertices.push(center);
            mesh.isovalues.push(surface.signed_distance(&center));
            mesh.vertices.len() - 1
        })
    };

    for &(vx, vy, vz) in &grid_vertices {
        if [vx, vy, vz].iter().any(|&v| v == 0 || v == n) {
            continue;
        }
        let mut elem = [0usize; 8];
        for corner in Corner::iter() {
            let o = corner.offset();
            let Some((_, leaf)) = octree.leaf_at(
                vx as i64 - 1 + o[0] as i64,
                vy as i64 - 1 + o[1] as i64,
                vz as i64 - 1 + o[2] as i64,
            ) else {
                unreachable!("octants of an interior vertex are in-domain");
            };
            elem[corner.index()] = vertex_for(leaf, &mut mesh);
        }
        mesh.elems.push(elem);
    }
    debug!(
        "dual extraction: {} vertices, {} elements from {} grid vertices",
        mesh.vertices.len(),
        mesh.elems.len(),
        grid_vertices.len(),
    );
    mesh
}
