//! Region shapes consumed by domains

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::geometry::{BoundingBox, Point};

/// Containment, extent and size of a spatial region.
///
/// Shape construction lives outside the growth core; anything that can
/// answer these three questions can host a tree.
pub trait Region: Send + Sync + fmt::Debug {
    fn contains(&self, p: &Point) -> bool;
    fn bounding_box(&self) -> BoundingBox;
    /// Volume of the region
    fn measure(&self) -> f64;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Point,
    pub radius: f64,
}

impl Sphere {
    pub fn new(center: Point, radius: f64) -> DomainResult<Self> {
        if !(radius >= 0.0 && radius.is_finite()) {
            return Err(DomainError::parameter("radius", format!("{radius} is not a valid sphere radius")));
        }
        Ok(Self { center, radius })
    }
}

impl Region for Sphere {
    fn contains(&self, p: &Point) -> bool {
        p.distance(&self.center) <= self.radius
    }

    fn bounding_box(&self) -> BoundingBox {
        BoundingBox::around(&self.center, self.radius)
    }

    fn measure(&self) -> f64 {
        4.0 / 3.0 * PI * self.radius.powi(3)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cuboid {
    pub min: Point,
    pub max: Point,
}

impl Cuboid {
    pub fn new(a: Point, b: Point) -> Self {
        let bounds = BoundingBox::new(a, b);
        Self {
            min: bounds.min,
            max: bounds.max,
        }
    }
}

impl Region for Cuboid {
    fn contains(&self, p: &Point) -> bool {
        BoundingBox::new(self.min, self.max).contains(p)
    }

    fn bounding_box(&self) -> BoundingBox {
        BoundingBox::new(self.min, self.max)
    }

    fn measure(&self) -> f64 {
        BoundingBox::new(self.min, self.max).volume()
    }
}

/// Serializable choice of built-in shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Shape {
    Sphere(Sphere),
    Cuboid(Cuboid),
}

impl Region for Shape {
    fn contains(&self, p: &Point) -> bool {
        match self {
            Shape::Sphere(s) => s.contains(p),
            Shape::Cuboid(c) => c.contains(p),
        }
    }

    fn bounding_box(&self) -> BoundingBox {
        match self {
            Shape::Sphere(s) => s.bounding_box(),
            Shape::Cuboid(c) => c.bounding_box(),
        }
    }

    fn measure(&self) -> f64 {
        match self {
            Shape::Sphere(s) => s.measure(),
            Shape::Cuboid(c) => c.measure(),
        }
    }
}
