//! 2D vector helpers and the geometric predicates the engine leans on:
//! segment intersection taxonomy, point-on-edge tests and ray casting.

pub type Vec2 = nalgebra::Vector2<f64>;

/// Tolerance for the segment intersection taxonomy.
pub const INTERSECTION_EPS: f64 = 0.01;
/// Tolerance for the vertex-on-edge test.
pub const ON_EDGE_EPS: f64 = 0.05;
/// Tolerance for ray/segment degeneracy detection.
pub const RAY_EPS: f64 = 1e-4;

pub trait Vec2Ext {
    fn rotated(&self, angle: f64) -> Vec2;
    /// Polar angle in `[0, 2π)`.
    fn polar_angle(&self) -> f64;
    /// 90° counterclockwise normal.
    fn normal(&self) -> Vec2;
}

impl Vec2Ext for Vec2 {
    fn rotated(&self, angle: f64) -> Vec2 {
        let (s, c) = angle.sin_cos();
        Vec2::new(self.x * c - self.y * s, self.x * s + self.y * c)
    }

    fn polar_angle(&self) -> f64 {
        let a = self.y.atan2(self.x);
        if a < 0.0 {
            a + std::f64::consts::TAU
        } else {
            a
        }
    }

    fn normal(&self) -> Vec2 {
        Vec2::new(-self.y, self.x)
    }
}

/// How two drawn segments relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegCross {
    None,
    /// Exactly one shared endpoint, no other contact.
    SharedEndpoint,
    /// Endpoint `0`/`1` of the first segment lies strictly inside the second.
    FirstEndpointOnSecond(usize),
    /// Endpoint `0`/`1` of the second segment lies strictly inside the first.
    SecondEndpointOnFirst(usize),
    /// A proper interior crossing.
    Interior,
    /// Collinear with partial overlap.
    Overlap,
    /// Same segment (up to endpoint order).
    Identical,
}

impl SegCross {
    pub fn is_touching(&self) -> bool {
        !matches!(self, SegCross::None)
    }
}

fn close(a: Vec2, b: Vec2) -> bool {
    (a - b).norm() < INTERSECTION_EPS
}

/// Distance from `p` to segment `(a, b)`.
pub fn point_segment_distance(p: Vec2, a: Vec2, b: Vec2) -> f64 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 < RAY_EPS * RAY_EPS {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

fn strictly_inside(p: Vec2, a: Vec2, b: Vec2) -> bool {
    !close(p, a) && !close(p, b) && point_segment_distance(p, a, b) < INTERSECTION_EPS
}

/// Classifies the intersection of segments `(a0, a1)` and `(b0, b1)`.
pub fn classify_intersection(a0: Vec2, a1: Vec2, b0: Vec2, b1: Vec2) -> SegCross {
    let a_same = (close(a0, b0) && close(a1, b1)) || (close(a0, b1) && close(a1, b0));
    if a_same {
        return SegCross::Identical;
    }

    let da = a1 - a0;
    let db = b1 - b0;
    let denom = da.perp(&db);

    let shared = close(a0, b0) || close(a0, b1) || close(a1, b0) || close(a1, b1);

    if denom.abs() < RAY_EPS {
        // Parallel: either apart or collinear overlap.
        if strictly_inside(b0, a0, a1)
            || strictly_inside(b1, a0, a1)
            || strictly_inside(a0, b0, b1)
            || strictly_inside(a1, b0, b1)
        {
            return SegCross::Overlap;
        }
        return if shared {
            SegCross::SharedEndpoint
        } else {
            SegCross::None
        };
    }

    if strictly_inside(b0, a0, a1) {
        return SegCross::SecondEndpointOnFirst(0);
    }
    if strictly_inside(b1, a0, a1) {
        return SegCross::SecondEndpointOnFirst(1);
    }
    if strictly_inside(a0, b0, b1) {
        return SegCross::FirstEndpointOnSecond(0);
    }
    if strictly_inside(a1, b0, b1) {
        return SegCross::FirstEndpointOnSecond(1);
    }
    if shared {
        return SegCross::SharedEndpoint;
    }

    let t = (b0 - a0).perp(&db) / denom;
    let s = (b0 - a0).perp(&da) / denom;
    if t > 0.0 && t < 1.0 && s > 0.0 && s < 1.0 {
        SegCross::Interior
    } else {
        SegCross::None
    }
}

/// Whether `p` lies on segment `(a, b)` away from both endpoints.
pub fn point_on_edge(p: Vec2, a: Vec2, b: Vec2) -> bool {
    (p - a).norm() > ON_EDGE_EPS
        && (p - b).norm() > ON_EDGE_EPS
        && point_segment_distance(p, a, b) < ON_EDGE_EPS
}

/// Intersects the ray `origin + t·dir, t ≥ 0` with segment `(a, b)`.
/// `Some(true)` hit, `Some(false)` miss, `None` degenerate (near-parallel or
/// passing too close to an endpoint) — the caller re-rolls the direction.
pub fn ray_hits_segment(origin: Vec2, dir: Vec2, a: Vec2, b: Vec2) -> Option<bool> {
    let ab = b - a;
    let denom = dir.perp(&ab);
    if denom.abs() < RAY_EPS {
        // Parallel; degenerate only when the lines nearly coincide.
        if point_segment_distance(a, origin, origin + dir * 1e6) < RAY_EPS {
            return None;
        }
        return Some(false);
    }
    let t = (a - origin).perp(&ab) / denom;
    let s = (a - origin).perp(&dir) / denom;
    if s.abs() < RAY_EPS || (s - 1.0).abs() < RAY_EPS {
        return None;
    }
    Some(t > 0.0 && s > 0.0 && s < 1.0)
}

/// Parametric intersection point of two non-parallel lines.
pub fn line_intersection(a0: Vec2, a1: Vec2, b0: Vec2, b1: Vec2) -> Option<Vec2> {
    let da = a1 - a0;
    let db = b1 - b0;
    let denom = da.perp(&db);
    if denom.abs() < RAY_EPS {
        return None;
    }
    let t = (b0 - a0).perp(&db) / denom;
    Some(a0 + da * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interior_crossing_is_classified() {
        let r = classify_intersection(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 0.0),
        );
        assert_eq!(r, SegCross::Interior);
    }

    #[test]
    fn shared_endpoint_is_not_a_crossing() {
        let r = classify_intersection(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 1.0),
        );
        assert_eq!(r, SegCross::SharedEndpoint);
    }

    #[test]
    fn endpoint_inside_other_segment_reports_which_side() {
        let r = classify_intersection(
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
        );
        assert_eq!(r, SegCross::SecondEndpointOnFirst(0));
        let r = classify_intersection(
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
        );
        assert_eq!(r, SegCross::FirstEndpointOnSecond(0));
    }

    #[test]
    fn collinear_overlap_and_identical_segments() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(2.0, 0.0);
        assert_eq!(
            classify_intersection(a, b, Vec2::new(1.0, 0.0), Vec2::new(3.0, 0.0)),
            SegCross::Overlap
        );
        assert_eq!(classify_intersection(a, b, b, a), SegCross::Identical);
    }

    #[test]
    fn ray_parity_distinguishes_inside_from_outside() {
        // Unit square; point at its center.
        let square = [
            (Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0)),
            (Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0)),
            (Vec2::new(1.0, 1.0), Vec2::new(0.0, 1.0)),
            (Vec2::new(0.0, 1.0), Vec2::new(0.0, 0.0)),
        ];
        let center = Vec2::new(0.5, 0.5);
        let dir = Vec2::new(0.7, 0.3);
        let hits: usize = square
            .iter()
            .filter(|(a, b)| ray_hits_segment(center, dir, *a, *b) == Some(true))
            .count();
        assert_eq!(hits % 2, 1);
    }

    #[test]
    fn point_on_edge_excludes_the_endpoints() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(1.0, 0.0);
        assert!(point_on_edge(Vec2::new(0.5, 0.01), a, b));
        assert!(!point_on_edge(Vec2::new(0.01, 0.0), a, b));
        assert!(!point_on_edge(Vec2::new(0.5, 0.2), a, b));
    }
}
