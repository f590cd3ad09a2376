//! All-hexahedral mesh container
//!
//! Element corners use the same bit-indexed numbering as [`Corner`]: bit 0
//! is +X, bit 1 is +Y, bit 2 is +Z. Faces of an element are therefore the
//! [`FACES`] table applied to its corner array.

use std::collections::HashMap;

use arrayvec::ArrayVec;
use nalgebra::Point3;

use crate::types::FACES;

/// A hexahedral mesh with a scalar value sampled at each vertex
///
/// `isovalues` runs parallel to `vertices`: a positive value marks a vertex
/// inside the input surface, negative outside, with magnitude equal to the
/// distance to the surface.
#[derive(Debug, Default)]
pub struct HexMesh {
    pub vertices: Vec<Point3<f64>>,
    pub elems: Vec<[usize; 8]>,
    pub isovalues: Vec<f64>,
}

impl HexMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Corner positions of element `e`, in corner-bit order
    pub fn element_corners(&self, e: usize) -> [Point3<f64>; 8] {
        self.elems[e].map(|v| self.vertices[v])
    }

    /// Canonical key for one face of element `e`: its four vertex ids,
    /// sorted, so that the two elements sharing a face produce equal keys
    pub fn face_key(&self, e: usize, face: usize) -> [usize; 4] {
        let mut key = FACES[face].map(|c| self.elems[e][c]);
        key.sort_unstable();
        key
    }

    /// All `(element, face)` pairs on the mesh boundary, i.e. faces with no
    /// partner element
    pub fn boundary_faces(&self) -> Vec<(usize, usize)> {
        let valence = build_valence(self);
        let mut out = vec![];
        for (e, v) in valence.iter().enumerate() {
            for face in 0..6 {
                if v.is_boundary(face) {
                    out.push((e, face));
                }
            }
        }
        out
    }

    /// Drops vertices not referenced by any element, remapping element
    /// corner ids (and the parallel isovalue array) to the packed order
    pub fn compact(&mut self) {
        let mut remap = vec![usize::MAX; self.vertices.len()];
        let mut next = 0;
        for e in &self.elems {
            for &v in e {
                if remap[v] == usize::MAX {
                    remap[v] = next;
                    next += 1;
                }
            }
        }
        let mut vertices = vec![Point3::origin(); next];
        let mut isovalues = vec![0.0; next];
        for (old, &new) in remap.iter().enumerate() {
            if new != usize::MAX {
                vertices[new] = self.vertices[old];
                isovalues[new] = self.isovalues[old];
            }
        }
        self.vertices = vertices;
        self.isovalues = isovalues;
        for e in &mut self.elems {
            *e = e.map(|v| remap[v]);
        }
    }
}

/// Face adjacency of one element: the ids of other elements sharing each
/// of its 6 faces, up to 4 per face
///
/// In a conforming mesh a face has at most one partner. Degenerate elements
/// from 2:1 dual transitions can stack more on a collapsed face key, so the
/// capacity is a reporting cap, not a structural limit.
#[derive(Debug, Default)]
pub struct ElementValence {
    pub neighbors: [ArrayVec<u32, 4>; 6],
}

impl ElementValence {
    /// Whether the given face lies on the mesh boundary
    pub fn is_boundary(&self, face: usize) -> bool {
        self.neighbors[face].is_empty()
    }
}

/// Builds the face-adjacency table for every element, keyed on canonical
/// face keys
pub fn build_valence(mesh: &HexMesh) -> Vec<ElementValence> {
    let mut by_key: HashMap<[usize; 4], Vec<(u32, u8)>> = HashMap::new();
    for e in 0..mesh.elems.len() {
        for face in 0..6 {
            by_key
                .entry(mesh.face_key(e, face))
                .or_default()
                .push((e as u32, face as u8));
        }
    }
    let mut out: Vec<ElementValence> = (0..mesh.elems.len())
        .map(|_| ElementValence::default())
        .collect();
    for users in by_key.values() {
        for &(e, face) in users {
            for &(other, _) in users {
                if other != e {
                    // Saturate at the cap; boundary detection only cares
                    // whether the list is empty
                    let _ = out[e as usize].neighbors[face as usize]
                        .try_push(other);
                }
            }
        }
    }
    out
}
