//! Small vector helpers shared by the feature extractors.
//!
//! Landmarks arrive in image-normalised coordinates, so everything here works on
//! plain `f64` triples and never allocates.

use crate::landmarks::types::Point3;

/// Guard value used wherever a zero length would otherwise divide.
pub const EPSILON: f64 = 1e-6;

/// Vector from `a` to `b`.
pub fn vector(a: Point3, b: Point3) -> Point3 {
    Point3::new(b.x - a.x, b.y - a.y, b.z - a.z)
}

pub fn dot(u: Point3, v: Point3) -> f64 {
    u.x * v.x + u.y * v.y + u.z * v.z
}

pub fn cross(u: Point3, v: Point3) -> Point3 {
    Point3::new(
        u.y * v.z - u.z * v.y,
        u.z * v.x - u.x * v.z,
        u.x * v.y - u.y * v.x,
    )
}

/// Euclidean length, never zero.
pub fn norm(u: Point3) -> f64 {
    let n = dot(u, u).sqrt();
    if n == 0.0 {
        EPSILON
    } else {
        n
    }
}

/// Unsigned angle between two vectors in radians, in `[0, π]`.
pub fn angle_between(u: Point3, v: Point3) -> f64 {
    let cos = dot(u, v) / (norm(u) * norm(v));
    cos.clamp(-1.0, 1.0).acos()
}

/// Planar (x/y) distance between two points.
pub fn distance_2d(a: Point3, b: Point3) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

pub fn midpoint(a: Point3, b: Point3) -> Point3 {
    Point3::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0, (a.z + b.z) / 2.0)
}

/// Mean of a set of points, `None` when the set is empty.
pub fn centroid<I>(points: I) -> Option<Point3>
where
    I: IntoIterator<Item = Point3>,
{
    let mut sum = Point3::default();
    let mut count = 0usize;
    for p in points {
        sum.x += p.x;
        sum.y += p.y;
        sum.z += p.z;
        count += 1;
    }
    if count == 0 {
        return None;
    }
    let n = count as f64;
    Some(Point3::new(sum.x / n, sum.y / n, sum.z / n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_angle_between_axes() {
        let x = Point3::new(1.0, 0.0, 0.0);
        let y = Point3::new(0.0, 1.0, 0.0);
        assert!((angle_between(x, y) - FRAC_PI_2).abs() < 1e-9);
        assert!((angle_between(x, Point3::new(-2.0, 0.0, 0.0)) - PI).abs() < 1e-9);
        assert!(angle_between(x, x).abs() < 1e-6);
    }

    #[test]
    fn test_cross_is_orthogonal() {
        let u = Point3::new(1.0, 2.0, 3.0);
        let v = Point3::new(-2.0, 0.5, 4.0);
        let w = cross(u, v);
        assert!(dot(w, u).abs() < 1e-9);
        assert!(dot(w, v).abs() < 1e-9);
    }

    #[test]
    fn test_zero_vector_norm_is_guarded() {
        assert_eq!(norm(Point3::default()), EPSILON);
        // Degenerate input must not produce NaN.
        assert!(angle_between(Point3::default(), Point3::new(1.0, 0.0, 0.0)).is_finite());
    }

    #[test]
    fn test_centroid() {
        assert!(centroid(Vec::<Point3>::new()).is_none());
        let c = centroid(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 4.0, 6.0)]).unwrap();
        assert_eq!(c, Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_distance_ignores_depth() {
        let a = Point3::new(0.0, 0.0, 10.0);
        let b = Point3::new(3.0, 4.0, -10.0);
        assert!((distance_2d(a, b) - 5.0).abs() < 1e-12);
    }
}
