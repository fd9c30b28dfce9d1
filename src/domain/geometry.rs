//! 3D points, boxes and segment proximity

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-12;

/// Point (or vector) in 3D space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const fn origin() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn dot(&self, other: &Point) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Point) -> Point {
        Point::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (*self - *other).norm()
    }

    /// Linear interpolation: `self` at `t = 0`, `other` at `t = 1`.
    pub fn lerp(&self, other: &Point, t: f64) -> Point {
        *self + (*other - *self) * t
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn component(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4}, {:.4})", self.x, self.y, self.z)
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Point {
    type Output = Point;
    fn neg(self) -> Point {
        Point::new(-self.x, -self.y, -self.z)
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point,
    pub max: Point,
}

impl BoundingBox {
    pub fn new(min: Point, max: Point) -> Self {
        Self {
            min: Point::new(min.x.min(max.x), min.y.min(max.y), min.z.min(max.z)),
            max: Point::new(min.x.max(max.x), min.y.max(max.y), min.z.max(max.z)),
        }
    }

    /// Cube of half-size `half` centred at `center`.
    pub fn around(center: &Point, half: f64) -> Self {
        let h = Point::new(half, half, half);
        Self::new(*center - h, *center + h)
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        Some(iter.fold(Self::new(first, first), |acc, p| acc.including(p)))
    }

    pub fn including(&self, p: &Point) -> Self {
        Self {
            min: Point::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z)),
            max: Point::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z)),
        }
    }

    pub fn expanded(&self, margin: f64) -> Self {
        let m = Point::new(margin, margin, margin);
        Self::new(self.min - m, self.max + m)
    }

    pub fn intersection(&self, other: &BoundingBox) -> Option<Self> {
        let min = Point::new(
            self.min.x.max(other.min.x),
            self.min.y.max(other.min.y),
            self.min.z.max(other.min.z),
        );
        let max = Point::new(
            self.max.x.min(other.max.x),
            self.max.y.min(other.max.y),
            self.max.z.min(other.max.z),
        );
        (min.x <= max.x && min.y <= max.y && min.z <= max.z).then_some(Self { min, max })
    }

    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    pub fn extent(&self) -> Point {
        self.max - self.min
    }

    pub fn center(&self) -> Point {
        self.min.lerp(&self.max, 0.5)
    }

    pub fn volume(&self) -> f64 {
        let e = self.extent();
        e.x * e.y * e.z
    }

    pub fn diagonal(&self) -> f64 {
        self.extent().norm()
    }
}

/// Parameter of the projection of `p` onto segment `a-b`, clamped to `[0, 1]`.
pub fn projection_parameter(a: &Point, b: &Point, p: &Point) -> f64 {
    let m = *b - *a;
    let len2 = m.dot(&m);
    if len2 < EPSILON {
        return 0.0;
    }
    (m.dot(&(*p - *a)) / len2).clamp(0.0, 1.0)
}

/// Distance from `p` to the segment `a-b`.
pub fn point_segment_distance(a: &Point, b: &Point, p: &Point) -> f64 {
    let t = projection_parameter(a, b, p);
    p.distance(&a.lerp(b, t))
}

/// Shortest distance between segments `p1-q1` and `p2-q2`.
///
/// Closest-point computation on clamped segment parameters.
pub fn segment_segment_distance(p1: &Point, q1: &Point, p2: &Point, q2: &Point) -> f64 {
    let d1 = *q1 - *p1;
    let d2 = *q2 - *p2;
    let r = *p1 - *p2;
    let a = d1.dot(&d1);
    let e = d2.dot(&d2);
    let f = d2.dot(&r);

    if a <= EPSILON && e <= EPSILON {
        return p1.distance(p2);
    }
    let (s, t) = if a <= EPSILON {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(&r);
        if e <= EPSILON {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(&d2);
            let denom = a * e - b * b;
            let mut s = if denom > EPSILON {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };
    let c1 = *p1 + d1 * s;
    let c2 = *p2 + d2 * t;
    c1.distance(&c2)
}

/// Angle between two vectors in radians, `0..=π`.
pub fn angle_between(u: &Point, v: &Point) -> f64 {
    let denom = (u.dot(u) * v.dot(v)).sqrt();
    if denom < EPSILON {
        return 0.0;
    }
    (u.dot(v) / denom).clamp(-1.0, 1.0).acos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_point_beyond_segment_end_when_measuring_then_uses_endpoint() {
        let a = Point::origin();
        let b = Point::new(1.0, 0.0, 0.0);
        let p = Point::new(2.0, 1.0, 0.0);
        assert!((point_segment_distance(&a, &b, &p) - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn given_crossing_segments_when_measuring_then_distance_is_zero() {
        let d = segment_segment_distance(
            &Point::new(-1.0, 0.0, 0.0),
            &Point::new(1.0, 0.0, 0.0),
            &Point::new(0.0, -1.0, 0.0),
            &Point::new(0.0, 1.0, 0.0),
        );
        assert!(d.abs() < 1e-12);
    }

    #[test]
    fn given_skew_segments_when_measuring_then_returns_gap() {
        let d = segment_segment_distance(
            &Point::new(-1.0, 0.0, 0.0),
            &Point::new(1.0, 0.0, 0.0),
            &Point::new(0.0, -1.0, 2.0),
            &Point::new(0.0, 1.0, 2.0),
        );
        assert!((d - 2.0).abs() < 1e-12);
    }

    #[test]
    fn given_parallel_segments_when_measuring_then_returns_offset() {
        let d = segment_segment_distance(
            &Point::new(0.0, 0.0, 0.0),
            &Point::new(1.0, 0.0, 0.0),
            &Point::new(0.0, 0.5, 0.0),
            &Point::new(1.0, 0.5, 0.0),
        );
        assert!((d - 0.5).abs() < 1e-12);
    }

    #[test]
    fn given_disjoint_boxes_when_intersecting_then_none() {
        let a = BoundingBox::around(&Point::origin(), 1.0);
        let b = BoundingBox::around(&Point::new(5.0, 0.0, 0.0), 1.0);
        assert!(a.intersection(&b).is_none());
        assert!(a.intersection(&a).is_some());
    }

    #[test]
    fn given_orthogonal_vectors_when_measuring_angle_then_half_pi() {
        let angle = angle_between(&Point::new(1.0, 0.0, 0.0), &Point::new(0.0, 3.0, 0.0));
        assert!((angle - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }
}
