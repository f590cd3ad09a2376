//! Geometric predicates used throughout the meshing pipeline
//!
//! Everything here is `f64`; the quality metric and the intersection tests
//! are sensitive to cancellation, so no single-precision math is allowed
//! anywhere in the pipeline.
//!
//! Degenerate inputs (zero-area triangles, rays parallel to a triangle's
//! plane) are never faults: each predicate returns a defined sentinel
//! outcome, and callers decide what to do with it.

use nalgebra::{Point2, Point3, Vector3};

use crate::types::Axis;

/// Tolerance for near-zero determinants and signed areas
const EPS: f64 = 1e-12;

/// A triangle in 3D space
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Triangle {
    pub a: Point3<f64>,
    pub b: Point3<f64>,
    pub c: Point3<f64>,
}

impl Triangle {
    pub fn new(a: Point3<f64>, b: Point3<f64>, c: Point3<f64>) -> Self {
        Self { a, b, c }
    }

    /// Unnormalized plane normal, `(b - a) × (c - a)`
    pub fn normal(&self) -> Vector3<f64> {
        (self.b - self.a).cross(&(self.c - self.a))
    }

    /// Axis-aligned bounding box, as `(min, max)` corners
    pub fn aabb(&self) -> (Point3<f64>, Point3<f64>) {
        let mut lo = self.a;
        let mut hi = self.a;
        for p in [&self.b, &self.c] {
            for i in 0..3 {
                lo[i] = lo[i].min(p[i]);
                hi[i] = hi[i].max(p[i]);
            }
        }
        (lo, hi)
    }
}

/// Euclidean distance between two points
pub fn distance(p: &Point3<f64>, q: &Point3<f64>) -> f64 {
    (p - q).norm()
}

/// Twice the signed area of a 2D triangle (shoelace form)
///
/// Positive for counter-clockwise winding.
pub fn triangle_area_2d(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Index (0-2) of the axis along which `n` is largest in magnitude
fn dominant_axis(n: &Vector3<f64>) -> usize {
    let a = [n.x.abs(), n.y.abs(), n.z.abs()];
    if a[0] >= a[1] && a[0] >= a[2] {
        0
    } else if a[1] >= a[2] {
        1
    } else {
        2
    }
}

/// Projects a 3D point to 2D by dropping the given axis
fn drop_axis(p: &Point3<f64>, axis: usize) -> Point2<f64> {
    match axis {
        0 => Point2::new(p.y, p.z),
        1 => Point2::new(p.z, p.x),
        _ => Point2::new(p.x, p.y),
    }
}

/// Whether two 2D segments properly cross each other
fn segments_cross_2d(
    p1: &Point2<f64>,
    q1: &Point2<f64>,
    p2: &Point2<f64>,
    q2: &Point2<f64>,
) -> bool {
    let o1 = triangle_area_2d(p1, q1, p2);
    let o2 = triangle_area_2d(p1, q1, q2);
    let o3 = triangle_area_2d(p2, q2, p1);
    let o4 = triangle_area_2d(p2, q2, q1);
    o1 * o2 < 0.0 && o3 * o4 < 0.0
}

/// Whether `p` lies in (or on the boundary of) the 2D triangle `abc`
fn point_in_triangle_2d(
    p: &Point2<f64>,
    a: &Point2<f64>,
    b: &Point2<f64>,
    c: &Point2<f64>,
) -> bool {
    // Normalize to counter-clockwise winding first
    let (b, c) = if triangle_area_2d(a, b, c) < 0.0 {
        (c, b)
    } else {
        (b, c)
    };
    triangle_area_2d(a, b, p) >= -EPS
        && triangle_area_2d(b, c, p) >= -EPS
        && triangle_area_2d(c, a, p) >= -EPS
}

/// 2D triangle-triangle intersection test
///
/// Used as the coplanar fallback of [`triangles_intersect`]; triangles are
/// normalized to counter-clockwise winding internally, so either orientation
/// is accepted.
fn intersect_2d(t1: &[Point2<f64>; 3], t2: &[Point2<f64>; 3]) -> bool {
    for i in 0..3 {
        for j in 0..3 {
            if segments_cross_2d(
                &t1[i],
                &t1[(i + 1) % 3],
                &t2[j],
                &t2[(j + 1) % 3],
            ) {
                return true;
            }
        }
    }
    // No proper edge crossing: one triangle may still contain the other
    t1.iter().any(|p| point_in_triangle_2d(p, &t2[0], &t2[1], &t2[2]))
        || t2.iter().any(|p| point_in_triangle_2d(p, &t1[0], &t1[1], &t1[2]))
}

/// Whether the segment `pq` crosses the plane of `tri` inside the triangle
///
/// `n` is the (unnormalized) triangle normal, passed in so callers testing
/// many segments against one triangle don't recompute it.
fn segment_crosses_triangle(
    p: &Point3<f64>,
    q: &Point3<f64>,
    tri: &Triangle,
    n: &Vector3<f64>,
) -> bool {
    let dp = n.dot(&(p - tri.a));
    let dq = n.dot(&(q - tri.a));
    if dp * dq > 0.0 {
        return false;
    }
    let denom = dp - dq;
    if denom.abs() <= EPS * n.norm() {
        // Segment lies (nearly) in the plane; the coplanar path handles this
        return false;
    }
    let t = dp / denom;
    let hit = p + (q - p) * t;
    let axis = dominant_axis(n);
    point_in_triangle_2d(
        &drop_axis(&hit, axis),
        &drop_axis(&tri.a, axis),
        &drop_axis(&tri.b, axis),
        &drop_axis(&tri.c, axis),
    )
}

/// 3D triangle-triangle intersection test
///
/// Plane-side sign patterns give the cheap early-outs; coplanar triangles
/// fall back to a projected 2D test on the dominant normal axis. Degenerate
/// (near-zero-area) triangles never intersect anything.
///
/// The test is symmetric in its arguments.
pub fn triangles_intersect(t1: &Triangle, t2: &Triangle) -> bool {
    let n1 = t1.normal();
    let n2 = t2.normal();
    let l1 = n1.norm();
    let l2 = n2.norm();
    if l1 <= EPS || l2 <= EPS {
        return false;
    }

    // Signed distances (scaled by |n|) of each triangle's vertices to the
    // other's plane; one strict sign on all three is a separating plane.
    let d2 = [
        n1.dot(&(t2.a - t1.a)),
        n1.dot(&(t2.b - t1.a)),
        n1.dot(&(t2.c - t1.a)),
    ];
    let e1 = EPS * l1;
    if d2.iter().all(|&d| d > e1) || d2.iter().all(|&d| d < -e1) {
        return false;
    }
    let d1 = [
        n2.dot(&(t1.a - t2.a)),
        n2.dot(&(t1.b - t2.a)),
        n2.dot(&(t1.c - t2.a)),
    ];
    let e2 = EPS * l2;
    if d1.iter().all(|&d| d > e2) || d1.iter().all(|&d| d < -e2) {
        return false;
    }

    if d1.iter().all(|&d| d.abs() <= e2) && d2.iter().all(|&d| d.abs() <= e1) {
        // Coplanar: project on the dominant axis pair and solve in 2D
        let axis = dominant_axis(&n1);
        let p1 = [
            drop_axis(&t1.a, axis),
            drop_axis(&t1.b, axis),
            drop_axis(&t1.c, axis),
        ];
        let p2 = [
            drop_axis(&t2.a, axis),
            drop_axis(&t2.b, axis),
            drop_axis(&t2.c, axis),
        ];
        return intersect_2d(&p1, &p2);
    }

    // Any intersection segment of two non-coplanar triangles ends on an edge
    // of one of them, so testing all six edges is exhaustive.
    let e1 = [(t1.a, t1.b), (t1.b, t1.c), (t1.c, t1.a)];
    let e2 = [(t2.a, t2.b), (t2.b, t2.c), (t2.c, t2.a)];
    e1.iter().any(|(p, q)| segment_crosses_triangle(p, q, t2, &n2))
        || e2.iter().any(|(p, q)| segment_crosses_triangle(p, q, t1, &n1))
}

/// Outcome of [`axis_ray_hit`]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AxisRayHit {
    /// The ray does not meet the triangle
    Miss,
    /// The ray is (nearly) parallel to the triangle's plane along this axis;
    /// the test is inconclusive and the caller must retry another axis.
    /// Exhausting all three axes means "no intersection", not a fault.
    NeedOtherAxis,
    /// The ray meets the triangle at `point`, at signed parameter `alpha`
    /// along the axis (negative values are behind the origin)
    Hit { point: Point3<f64>, alpha: f64 },
}

/// Möller–Trumbore ray/triangle test restricted to a principal axis
pub fn axis_ray_hit(
    tri: &Triangle,
    origin: &Point3<f64>,
    axis: Axis,
) -> AxisRayHit {
    let e1 = tri.b - tri.a;
    let e2 = tri.c - tri.a;

    // Zero-area triangles contribute nothing (and would otherwise report
    // NeedOtherAxis for every axis, poisoning the caller's retry loop)
    let n = e1.cross(&e2);
    if n.norm_squared() <= EPS * EPS {
        return AxisRayHit::Miss;
    }

    let mut dir = Vector3::zeros();
    dir[axis.index()] = 1.0;

    let pvec = dir.cross(&e2);
    let det = e1.dot(&pvec);
    if det.abs() <= EPS * e1.norm() * e2.norm() {
        return AxisRayHit::NeedOtherAxis;
    }
    let inv_det = 1.0 / det;
    let tvec = origin - tri.a;
    let u = tvec.dot(&pvec) * inv_det;
    if !(-EPS..=1.0 + EPS).contains(&u) {
        return AxisRayHit::Miss;
    }
    let qvec = tvec.cross(&e1);
    let v = dir.dot(&qvec) * inv_det;
    if v < -EPS || u + v > 1.0 + EPS {
        return AxisRayHit::Miss;
    }
    let alpha = e2.dot(&qvec) * inv_det;
    AxisRayHit::Hit {
        point: origin + dir * alpha,
        alpha,
    }
}

/// Closest point to `p` on the segment `ab`
fn closest_on_segment(
    a: &Point3<f64>,
    b: &Point3<f64>,
    p: &Point3<f64>,
) -> Point3<f64> {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 <= EPS * EPS {
        return *a;
    }
    let t = (ab.dot(&(p - a)) / len2).clamp(0.0, 1.0);
    a + ab * t
}

/// Nearest distance from `p` to a triangle, with an early-exit contract
///
/// Returns `None` when the triangle provably cannot beat `current_best`, so
/// a scan over many triangles can carry a running minimum and skip the full
/// Voronoi-region case analysis for most of them. On `Some((d, q))`, `d` is
/// strictly less than `current_best` and `q` is the closest point.
pub fn point_triangle_distance(
    tri: &Triangle,
    p: &Point3<f64>,
    current_best: f64,
) -> Option<(f64, Point3<f64>)> {
    // Cheap lower bound: distance to the triangle's bounding box
    let (lo, hi) = tri.aabb();
    let mut bound2 = 0.0;
    for i in 0..3 {
        let d = (lo[i] - p[i]).max(p[i] - hi[i]).max(0.0);
        bound2 += d * d;
    }
    if bound2 >= current_best * current_best {
        return None;
    }

    let q = closest_on_triangle(tri, p);
    let d = distance(p, &q);
    if d < current_best {
        Some((d, q))
    } else {
        None
    }
}

/// Voronoi-region closest-point computation (vertex / edge / face cases)
fn closest_on_triangle(tri: &Triangle, p: &Point3<f64>) -> Point3<f64> {
    let (a, b, c) = (tri.a, tri.b, tri.c);
    let ab = b - a;
    let ac = c - a;

    if tri.normal().norm_squared() <= EPS * EPS {
        // Degenerate triangle: fall back to the closest of the three edges
        let candidates = [
            closest_on_segment(&a, &b, p),
            closest_on_segment(&b, &c, p),
            closest_on_segment(&c, &a, p),
        ];
        return candidates
            .into_iter()
            .min_by(|x, y| {
                distance(p, x).partial_cmp(&distance(p, y)).unwrap()
            })
            .unwrap();
    }

    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a; // Voronoi region of vertex a
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b; // Voronoi region of vertex b
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3)); // edge ab
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c; // Voronoi region of vertex c
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6)); // edge ac
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let t = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * t; // edge bc
    }

    // Interior projection
    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

/// Scaled Jacobian of one hexahedron corner
///
/// `c` indexes the corner per the numbering on [`crate::types::Corner`]; the
/// three edges meeting at the corner are towards `c ^ 1`, `c ^ 2`, `c ^ 4`.
/// A collapsed edge yields 0.0 (degenerate, not inverted).
fn corner_jacobian(corners: &[Point3<f64>; 8], c: usize) -> f64 {
    let p = corners[c];
    let ex = corners[c ^ 1] - p;
    let ey = corners[c ^ 2] - p;
    let ez = corners[c ^ 4] - p;
    let scale = ex.norm() * ey.norm() * ez.norm();
    if scale <= EPS {
        return 0.0;
    }
    // Odd-parity corners see flipped edge directions relative to corner 0
    let sign = if (c.count_ones()) % 2 == 1 { -1.0 } else { 1.0 };
    sign * ex.dot(&ey.cross(&ez)) / scale
}

/// Minimum scaled Jacobian over the 8 corners of a hexahedron
///
/// Size-independent, in `[-1, 1]`: exactly 1.0 for any axis-aligned cube,
/// and `<= 0.0` for inverted or degenerate elements.
pub fn scaled_jacobian(corners: &[Point3<f64>; 8]) -> f64 {
    (0..8)
        .map(|c| corner_jacobian(corners, c))
        .fold(f64::INFINITY, f64::min)
        .clamp(-1.0, 1.0)
}

/// Index of the worst corner of a hexahedron, if any falls at or below
/// `threshold`
///
/// Returns `None` when every corner's scaled Jacobian exceeds `threshold`.
pub fn worst_corner(
    corners: &[Point3<f64>; 8],
    threshold: f64,
) -> Option<usize> {
    let mut worst: Option<(usize, f64)> = None;
    for c in 0..8 {
        let sj = corner_jacobian(corners, c);
        if sj <= threshold && worst.map_or(true, |(_, w)| sj < w) {
            worst = Some((c, sj));
        }
    }
    worst.map(|(c, _)| c)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::{X, Y, Z};
    use approx::assert_relative_eq;

    fn p(x: f64, y: f64, z: f64) -> Point3<f64> {
        Point3::new(x, y, z)
    }

    fn unit_cube_corners(s: f64) -> [Point3<f64>; 8] {
        let mut out = [Point3::origin(); 8];
        for (i, o) in out.iter_mut().enumerate() {
            *o = p(
                (i & 1) as f64 * s,
                ((i >> 1) & 1) as f64 * s,
                ((i >> 2) & 1) as f64 * s,
            );
        }
        out
    }

    #[test]
    fn distance_is_euclidean() {
        assert_relative_eq!(distance(&p(0.0, 0.0, 0.0), &p(3.0, 4.0, 0.0)), 5.0);
    }

    #[test]
    fn shoelace_sign_tracks_winding() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(1.0, 0.0);
        let c = Point2::new(0.0, 1.0);
        assert!(triangle_area_2d(&a, &b, &c) > 0.0);
        assert!(triangle_area_2d(&a, &c, &b) < 0.0);
    }

    #[test]
    fn crossing_triangles_intersect() {
        let t1 = Triangle::new(p(0.0, 0.0, 0.0), p(2.0, 0.0, 0.0), p(0.0, 2.0, 0.0));
        let t2 = Triangle::new(p(0.5, 0.5, -1.0), p(0.5, 0.5, 1.0), p(1.5, 0.5, 1.0));
        assert!(triangles_intersect(&t1, &t2));
        assert!(triangles_intersect(&t2, &t1));
    }

    #[test]
    fn separated_triangles_do_not_intersect() {
        let t1 = Triangle::new(p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0));
        let t2 = Triangle::new(p(0.0, 0.0, 1.0), p(1.0, 0.0, 1.0), p(0.0, 1.0, 1.0));
        assert!(!triangles_intersect(&t1, &t2));
        assert!(!triangles_intersect(&t2, &t1));

        // Coplanar but disjoint
        let t3 = Triangle::new(p(5.0, 5.0, 0.0), p(6.0, 5.0, 0.0), p(5.0, 6.0, 0.0));
        assert!(!triangles_intersect(&t1, &t3));
    }

    #[test]
    fn coplanar_overlapping_triangles_intersect() {
        let t1 = Triangle::new(p(0.0, 0.0, 0.0), p(2.0, 0.0, 0.0), p(0.0, 2.0, 0.0));
        let t2 = Triangle::new(p(0.5, 0.5, 0.0), p(1.5, 0.5, 0.0), p(0.5, 1.5, 0.0));
        assert!(triangles_intersect(&t1, &t2));
        assert!(triangles_intersect(&t2, &t1));
    }

    #[test]
    fn degenerate_triangle_never_intersects() {
        let sliver = Triangle::new(p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(2.0, 0.0, 0.0));
        let t = Triangle::new(p(0.0, -1.0, -1.0), p(0.0, 1.0, -1.0), p(0.0, 0.0, 1.0));
        assert!(!triangles_intersect(&sliver, &t));
        assert!(!triangles_intersect(&t, &sliver));
    }

    #[test]
    fn axis_ray_hits_facing_triangle() {
        let tri = Triangle::new(p(1.0, -1.0, -1.0), p(1.0, 2.0, -1.0), p(1.0, 0.0, 2.0));
        match axis_ray_hit(&tri, &p(0.0, 0.1, 0.1), X) {
            AxisRayHit::Hit { point, alpha } => {
                assert_relative_eq!(alpha, 1.0);
                assert_relative_eq!(point.x, 1.0);
                assert_relative_eq!(point.y, 0.1);
            }
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[test]
    fn axis_ray_parallel_needs_other_axis() {
        // Triangle in a plane containing the X axis direction
        let tri = Triangle::new(p(0.0, 1.0, 0.0), p(1.0, 1.0, 0.0), p(0.0, 1.0, 1.0));
        assert_eq!(
            axis_ray_hit(&tri, &p(0.2, 0.0, 0.2), X),
            AxisRayHit::NeedOtherAxis
        );
        // Retrying along Y resolves it
        assert!(matches!(
            axis_ray_hit(&tri, &p(0.2, 0.0, 0.2), Y),
            AxisRayHit::Hit { .. }
        ));
    }

    #[test]
    fn axis_ray_misses_offset_triangle() {
        let tri = Triangle::new(p(1.0, 5.0, 5.0), p(1.0, 6.0, 5.0), p(1.0, 5.0, 6.0));
        assert_eq!(axis_ray_hit(&tri, &p(0.0, 0.0, 0.0), X), AxisRayHit::Miss);
    }

    #[test]
    fn axis_ray_reports_negative_alpha_behind_origin() {
        let tri = Triangle::new(p(-1.0, -1.0, -1.0), p(-1.0, 2.0, -1.0), p(-1.0, 0.0, 2.0));
        match axis_ray_hit(&tri, &p(0.0, 0.1, 0.1), X) {
            AxisRayHit::Hit { alpha, .. } => assert_relative_eq!(alpha, -1.0),
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[test]
    fn point_triangle_regions() {
        let tri = Triangle::new(p(0.0, 0.0, 0.0), p(2.0, 0.0, 0.0), p(0.0, 2.0, 0.0));

        // Interior projection
        let (d, q) = point_triangle_distance(&tri, &p(0.5, 0.5, 3.0), f64::MAX).unwrap();
        assert_relative_eq!(d, 3.0);
        assert_relative_eq!(q, p(0.5, 0.5, 0.0));

        // Vertex region
        let (d, q) = point_triangle_distance(&tri, &p(-1.0, -1.0, 0.0), f64::MAX).unwrap();
        assert_relative_eq!(d, 2.0_f64.sqrt());
        assert_relative_eq!(q, p(0.0, 0.0, 0.0));

        // Edge region (edge ab)
        let (d, q) = point_triangle_distance(&tri, &p(1.0, -2.0, 0.0), f64::MAX).unwrap();
        assert_relative_eq!(d, 2.0);
        assert_relative_eq!(q, p(1.0, 0.0, 0.0));
    }

    #[test]
    fn point_triangle_early_exit() {
        let tri = Triangle::new(p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0));
        // Bounding-box lower bound alone rules this triangle out
        assert!(point_triangle_distance(&tri, &p(10.0, 10.0, 10.0), 1.0).is_none());
        // And a candidate that matches but does not beat the running best
        assert!(point_triangle_distance(&tri, &p(0.2, 0.2, 1.0), 1.0).is_none());
    }

    #[test]
    fn scaled_jacobian_of_cubes_is_one() {
        for s in [1.0, 0.25, 17.0] {
            assert_relative_eq!(scaled_jacobian(&unit_cube_corners(s)), 1.0);
        }
    }

    #[test]
    fn scaled_jacobian_detects_inversion() {
        let mut corners = unit_cube_corners(1.0);
        // Push corner 7 through the opposite face
        corners[7] = p(-1.0, -1.0, -1.0);
        assert!(scaled_jacobian(&corners) < 0.0);
    }

    #[test]
    fn scaled_jacobian_is_bounded() {
        let corners = [
            p(0.0, 0.0, 0.0),
            p(1.0, 0.1, 0.0),
            p(0.3, 1.0, 0.0),
            p(1.2, 1.1, 0.1),
            p(0.0, 0.2, 1.0),
            p(1.0, 0.0, 1.3),
            p(0.1, 1.0, 0.9),
            p(1.0, 1.0, 1.0),
        ];
        let sj = scaled_jacobian(&corners);
        assert!((-1.0..=1.0).contains(&sj));
    }

    #[test]
    fn degenerate_hex_is_not_positive() {
        let mut corners = unit_cube_corners(1.0);
        // Collapse the +Z face onto the -Z face
        for c in 4..8 {
            corners[c][Z.index()] = 0.0;
        }
        assert!(scaled_jacobian(&corners) <= 0.0);
    }

    #[test]
    fn worst_corner_flags_the_minimum() {
        let corners = unit_cube_corners(1.0);
        assert_eq!(worst_corner(&corners, 0.9), None);

        let mut skewed = corners;
        skewed[7] = p(0.6, 0.6, 0.6);
        let idx = worst_corner(&skewed, 0.9).unwrap();
        assert_eq!(idx, 7);
    }
}
