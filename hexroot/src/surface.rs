//! The input surface model
//!
//! A [`Surface`] is a watertight triangulated surface plus the bounding cube
//! that maps world coordinates into the octree's integer grid. It is built
//! once and read-only afterwards; every later pipeline stage borrows it.

use log::warn;
use nalgebra::{Point3, Vector3};

use crate::geometry::{
    axis_ray_hit, distance, point_triangle_distance, AxisRayHit, Triangle,
};
use crate::types::{Axis, Corner, FACES, X, Y, Z};
use crate::Error;

/// An immutable triangulated surface with its octree bounding cube
#[derive(Debug, Clone)]
pub struct Surface {
    vertices: Vec<Point3<f64>>,
    triangles: Vec<[u32; 3]>,

    /// Minimum corner of the bounding cube
    origin: Point3<f64>,
    /// Edge length of the bounding cube
    edge_length: f64,
}

impl Surface {
    /// Builds a surface from raw vertex and triangle lists
    ///
    /// The bounding cube is centered on the vertex bounding box and its edge
    /// is the largest extent scaled by `1 + margin_ratio`, so a positive
    /// margin keeps the surface strictly interior to the octree domain.
    pub fn new(
        vertices: Vec<Point3<f64>>,
        triangles: Vec<[u32; 3]>,
        margin_ratio: f64,
    ) -> Result<Self, Error> {
        if triangles.is_empty() {
            return Err(Error::EmptySurface);
        }
        for (i, t) in triangles.iter().enumerate() {
            for &v in t {
                if v as usize >= vertices.len() {
                    return Err(Error::BadTriangle(i, v));
                }
            }
        }

        let mut lo = vertices[triangles[0][0] as usize];
        let mut hi = lo;
        for t in &triangles {
            for &v in t {
                let p = vertices[v as usize];
                for i in 0..3 {
                    lo[i] = lo[i].min(p[i]);
                    hi[i] = hi[i].max(p[i]);
                }
            }
        }
        let extent = (hi - lo).max();
        if !(extent > 0.0) {
            return Err(Error::EmptySurface);
        }
        let edge_length = extent * (1.0 + margin_ratio);
        let center = nalgebra::center(&lo, &hi);
        let origin = center - Vector3::repeat(edge_length / 2.0);

        Ok(Self {
            vertices,
            triangles,
            origin,
            edge_length,
        })
    }

    /// Axis-aligned cube surface (8 vertices, 12 triangles, outward normals)
    ///
    /// Used by tests and demos as the canonical closed input.
    pub fn cube(center: Point3<f64>, half: f64, margin_ratio: f64) -> Self {
        let vertices: Vec<Point3<f64>> = Corner::iter()
            .map(|c| {
                let o = c.offset();
                Point3::new(
                    center.x + half * (2.0 * o[0] as f64 - 1.0),
                    center.y + half * (2.0 * o[1] as f64 - 1.0),
                    center.z + half * (2.0 * o[2] as f64 - 1.0),
                )
            })
            .collect();
        let mut triangles = Vec::with_capacity(12);
        for quad in FACES {
            let [a, b, c, d] = quad.map(|i| i as u32);
            triangles.push([a, b, c]);
            triangles.push([a, c, d]);
        }
        // Invariants guaranteed by construction
        Self::new(vertices, triangles, margin_ratio).unwrap()
    }

    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    /// Materializes triangle `i` as corner points
    pub fn triangle(&self, i: u32) -> Triangle {
        let [a, b, c] = self.triangles[i as usize];
        Triangle::new(
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        )
    }

    /// Minimum corner of the octree bounding cube
    pub fn origin(&self) -> Point3<f64> {
        self.origin
    }

    /// Edge length of the octree bounding cube
    pub fn edge_length(&self) -> f64 {
        self.edge_length
    }

    /// Edge length of one octree cell at the given level
    pub fn cell_size(&self, level: u8) -> f64 {
        self.edge_length / (1u64 << level) as f64
    }

    /// World position of the minimum corner of cell `(x, y, z)` at `level`
    pub fn cell_min(&self, level: u8, x: u64, y: u64, z: u64) -> Point3<f64> {
        let s = self.cell_size(level);
        self.origin + Vector3::new(x as f64, y as f64, z as f64) * s
    }

    /// World position of the center of cell `(x, y, z)` at `level`
    pub fn cell_center(&self, level: u8, x: u64, y: u64, z: u64) -> Point3<f64> {
        self.cell_min(level, x, y, z) + Vector3::repeat(self.cell_size(level) / 2.0)
    }

    /// Grid coordinate of the cell at `level` containing `p`, clamped to the
    /// domain
    pub fn grid_coord(&self, p: &Point3<f64>, level: u8) -> [u64; 3] {
        let s = self.cell_size(level);
        let n = (1u64 << level) - 1;
        let mut out = [0; 3];
        for i in 0..3 {
            let g = ((p[i] - self.origin[i]) / s).floor();
            out[i] = if g < 0.0 { 0 } else { (g as u64).min(n) };
        }
        out
    }

    /// Nearest point on a subset of triangles, with a running minimum
    ///
    /// Returns `None` when no candidate beats `current_best`.
    pub fn nearest_point(
        &self,
        p: &Point3<f64>,
        tris: impl IntoIterator<Item = u32>,
        current_best: f64,
    ) -> Option<(f64, Point3<f64>, u32)> {
        let mut best: Option<(f64, Point3<f64>, u32)> = None;
        let mut limit = current_best;
        for t in tris {
            if let Some((d, q)) =
                point_triangle_distance(&self.triangle(t), p, limit)
            {
                limit = d;
                best = Some((d, q, t));
            }
        }
        best
    }

    /// Whether `p` lies inside the closed surface
    ///
    /// Counts axis-ray crossings along +X, falling back to +Y and +Z when a
    /// triangle is parallel to the ray or the ray grazes a triangle edge
    /// (a grazing hit would be counted by both triangles sharing the edge).
    /// If all three axes are inconclusive, the sign of the nearest triangle's
    /// normal decides; a point on the surface counts as inside.
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        let tol = 1e-9 * self.edge_length;
        'axes: for axis in [X, Y, Z] {
            let mut count = 0;
            for t in 0..self.triangles.len() as u32 {
                let tri = self.triangle(t);
                match axis_ray_hit(&tri, p, axis) {
                    AxisRayHit::NeedOtherAxis => {
                        // Inconclusive only if the ray actually runs inside
                        // the triangle's plane; a parallel plane elsewhere
                        // simply contributes no crossing
                        let n = tri.normal();
                        if n.dot(&(p - tri.a)).abs() <= tol * n.norm() {
                            continue 'axes;
                        }
                    }
                    AxisRayHit::Hit { point, alpha } => {
                        if alpha.abs() <= tol {
                            return true; // on the surface
                        }
                        if alpha > 0.0 {
                            if self.grazes_edge(&tri, &point, tol) {
                                continue 'axes;
                            }
                            count += 1;
                        }
                    }
                    AxisRayHit::Miss => {}
                }
            }
            return count % 2 == 1;
        }
        self.contains_by_normal(p)
    }

    /// Signed distance from `p` to the surface: positive inside, negative
    /// outside (the isovalue convention used by the outside filter)
    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        let d = self
            .nearest_point(p, 0..self.triangles.len() as u32, f64::INFINITY)
            .map(|(d, _, _)| d)
            .unwrap_or(0.0);
        if self.contains(p) {
            d
        } else {
            -d
        }
    }

    /// Last-resort inside test: sign of the nearest triangle's outward normal
    fn contains_by_normal(&self, p: &Point3<f64>) -> bool {
        let Some((_, q, t)) =
            self.nearest_point(p, 0..self.triangles.len() as u32, f64::INFINITY)
        else {
            warn!("inside test fell through with no triangles");
            return false;
        };
        self.triangle(t).normal().dot(&(p - q)) <= 0.0
    }

    /// Whether `point` (known to be in the plane of `tri`) lies within `tol`
    /// of one of the triangle's edges
    fn grazes_edge(&self, tri: &Triangle, point: &Point3<f64>, tol: f64) -> bool {
        for (a, b) in [(tri.a, tri.b), (tri.b, tri.c), (tri.c, tri.a)] {
            let ab = b - a;
            let len2 = ab.norm_squared();
            if len2 <= 0.0 {
                continue;
            }
            let t = (ab.dot(&(point - a)) / len2).clamp(0.0, 1.0);
            if distance(&(a + ab * t), point) <= tol {
                return true;
            }
        }
        false
    }

}

/// Helper for tests and demos: cast an axis ray against one triangle with
/// the full three-axis retry loop
pub fn axis_ray_with_retry(
    tri: &Triangle,
    origin: &Point3<f64>,
    first: Axis,
) -> AxisRayHit {
    let mut axis = first;
    for _ in 0..3 {
        match axis_ray_hit(tri, origin, axis) {
            AxisRayHit::NeedOtherAxis => axis = axis.next(),
            other => return other,
        }
    }
    // All three axes were parallel: no intersection, not a fault
    AxisRayHit::Miss
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cube_is_outward_oriented() {
        let center = Point3::new(0.5, 0.5, 0.5);
        let s = Surface::cube(center, 0.5, 0.0);
        assert_eq!(s.triangles().len(), 12);
        for t in 0..12 {
            let tri = s.triangle(t);
            let centroid = nalgebra::center(
                &nalgebra::center(&tri.a, &tri.b),
                &tri.c,
            );
            assert!(tri.normal().dot(&(centroid - center)) > 0.0);
        }
    }

    #[test]
    fn bounding_cube_margin() {
        let s = Surface::cube(Point3::origin(), 1.0, 0.5);
        assert_relative_eq!(s.edge_length(), 3.0);
        assert_relative_eq!(s.origin(), Point3::new(-1.5, -1.5, -1.5));

        let tight = Surface::cube(Point3::origin(), 1.0, 0.0);
        assert_relative_eq!(tight.edge_length(), 2.0);
    }

    #[test]
    fn grid_round_trip() {
        let s = Surface::cube(Point3::new(0.5, 0.5, 0.5), 0.5, 0.0);
        for level in 0..4 {
            let n = 1u64 << level;
            for x in 0..n {
                let c = s.cell_center(level, x, 0, n - 1);
                assert_eq!(s.grid_coord(&c, level), [x, 0, n - 1]);
            }
        }
    }

    #[test]
    fn contains_classifies_cube_interior() {
        let s = Surface::cube(Point3::new(0.5, 0.5, 0.5), 0.5, 0.0);
        assert!(s.contains(&Point3::new(0.5, 0.5, 0.5)));
        assert!(s.contains(&Point3::new(0.1, 0.7, 0.3)));
        assert!(!s.contains(&Point3::new(1.5, 0.5, 0.5)));
        assert!(!s.contains(&Point3::new(-0.1, -0.1, -0.1)));
        // On the main diagonal every axis ray grazes a face diagonal, so
        // this exercises the nearest-normal fallback
        assert!(s.contains(&Point3::new(0.125, 0.125, 0.125)));
    }

    #[test]
    fn signed_distance_sign_and_magnitude() {
        let s = Surface::cube(Point3::new(0.5, 0.5, 0.5), 0.5, 0.0);
        assert_relative_eq!(
            s.signed_distance(&Point3::new(0.5, 0.5, 0.7)),
            0.3,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            s.signed_distance(&Point3::new(0.5, 0.5, 1.4)),
            -0.4,
            epsilon = 1e-9
        );
    }

    #[test]
    fn nearest_point_scans_with_running_minimum() {
        let s = Surface::cube(Point3::new(0.5, 0.5, 0.5), 0.5, 0.0);
        let p = Point3::new(0.5, 0.5, 2.0);
        let (d, q, _) = s
            .nearest_point(&p, 0..12, f64::INFINITY)
            .unwrap();
        assert_relative_eq!(d, 1.0);
        assert_relative_eq!(q, Point3::new(0.5, 0.5, 1.0));

        // A bound that nothing can beat yields no candidate
        assert!(s.nearest_point(&p, 0..12, 0.5).is_none());
    }

    #[test]
    fn ray_retry_falls_back_to_miss() {
        // Degenerate (collinear) triangle: never a hit, never a fault
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(2.0, 2.0, 2.0),
        );
        assert_eq!(
            axis_ray_with_retry(&tri, &Point3::new(0.3, 0.1, 0.2), X),
            AxisRayHit::Miss
        );
    }
}
