use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("A box needs 4 (2D) or 6 (3D) components, got {0}")]
    WrongArity(usize),

    #[error("Box bounds must not be NaN")]
    NotANumber,

    #[error("Box minimum {min} exceeds maximum {max}")]
    Inverted { min: DVec3, max: DVec3 },
}

/// Axis-aligned bounding box. Boundaries are inclusive on every predicate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// A box whose z extent covers the whole representable range.
    pub fn new_2d(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::new(
            DVec3::new(min_x, min_y, -f64::MAX),
            DVec3::new(max_x, max_y, f64::MAX),
        )
    }

    pub fn from_cube(center: DVec3, halfsize: f64) -> Self {
        Self::new(center - DVec3::splat(halfsize), center + DVec3::splat(halfsize))
    }

    /// Degenerate box that contains and intersects nothing.
    pub const fn empty() -> Self {
        Self {
            min: DVec3::splat(f64::MAX),
            max: DVec3::splat(-f64::MAX),
        }
    }

    /// Box covering every representable coordinate.
    pub const fn max_box() -> Self {
        Self {
            min: DVec3::splat(-f64::MAX),
            max: DVec3::splat(f64::MAX),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.min.cmple(other.max).all()
            && self.max.cmpge(other.min).all()
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Aabb) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.min.cmple(other.min).all()
            && self.max.cmpge(other.max).all()
    }

    pub fn contains_point(&self, point: DVec3) -> bool {
        self.min.cmple(point).all() && self.max.cmpge(point).all()
    }

    pub fn within(&self, other: &Aabb) -> bool {
        other.contains(self)
    }

    fn validated(min: DVec3, max: DVec3) -> Result<Self, BoundsError> {
        if min.is_nan() || max.is_nan() {
            return Err(BoundsError::NotANumber);
        }
        if min.cmpgt(max).any() {
            return Err(BoundsError::Inverted { min, max });
        }
        Ok(Self::new(min, max))
    }
}

impl fmt::Display for Aabb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}) -> ({}, {}, {})",
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z
        )
    }
}

/// `[min_x, min_y, min_z, max_x, max_y, max_z]`
impl TryFrom<[f64; 6]> for Aabb {
    type Error = BoundsError;

    fn try_from([min_x, min_y, min_z, max_x, max_y, max_z]: [f64; 6]) -> Result<Self, Self::Error> {
        Aabb::validated(
            DVec3::new(min_x, min_y, min_z),
            DVec3::new(max_x, max_y, max_z),
        )
    }
}

/// `[min_x, min_y, max_x, max_y]`
impl TryFrom<[f64; 4]> for Aabb {
    type Error = BoundsError;

    fn try_from([min_x, min_y, max_x, max_y]: [f64; 4]) -> Result<Self, Self::Error> {
        let bounds = Aabb::new_2d(min_x, min_y, max_x, max_y);
        Aabb::validated(bounds.min, bounds.max)
    }
}

impl TryFrom<&[f64]> for Aabb {
    type Error = BoundsError;

    fn try_from(values: &[f64]) -> Result<Self, Self::Error> {
        match values.len() {
            4 => Aabb::try_from([values[0], values[1], values[2], values[3]]),
            6 => Aabb::try_from([values[0], values[1], values[2], values[3], values[4], values[5]]),
            len => Err(BoundsError::WrongArity(len)),
        }
    }
}
