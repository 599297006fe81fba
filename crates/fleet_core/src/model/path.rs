use bevy_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

use super::Point;
use crate::refs::{ObjectRef, TypedRef};

/// A directed connection between two points.
#[derive(Component, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub source: TypedRef<Point>,
    pub destination: TypedRef<Point>,
    /// Length in mm, always > 0.
    pub length: i64,
    /// Routing cost, always > 0. Dimensionless; only relative values matter.
    pub routing_cost: i64,
    /// Maximum forward velocity in mm/s. 0 means not navigable forward.
    pub max_velocity: i64,
    /// Maximum reverse velocity in mm/s. 0 means not navigable in reverse.
    pub max_reverse_velocity: i64,
    /// A locked path is not navigable in either direction.
    pub locked: bool,
    /// Resources a vehicle implicitly allocates together with this path.
    pub attached_resources: Vec<ObjectRef>,
}

impl Path {
    pub fn new(source: TypedRef<Point>, destination: TypedRef<Point>) -> Self {
        Self {
            source,
            destination,
            length: 1,
            routing_cost: 1,
            max_velocity: 1000,
            max_reverse_velocity: 1000,
            locked: false,
            attached_resources: Vec::new(),
        }
    }

    pub fn navigable_forward(&self) -> bool {
        !self.locked && self.max_velocity != 0
    }

    pub fn navigable_reverse(&self) -> bool {
        !self.locked && self.max_reverse_velocity != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refs::ObjectId;

    fn path() -> Path {
        Path::new(
            TypedRef::new(ObjectId(0), "Point-0001"),
            TypedRef::new(ObjectId(1), "Point-0002"),
        )
    }

    #[test]
    fn locking_blocks_both_directions() {
        let mut p = path();
        assert!(p.navigable_forward());
        assert!(p.navigable_reverse());

        p.locked = true;
        assert!(!p.navigable_forward());
        assert!(!p.navigable_reverse());
    }

    #[test]
    fn zero_velocity_blocks_one_direction() {
        let mut p = path();
        p.max_reverse_velocity = 0;
        assert!(p.navigable_forward());
        assert!(!p.navigable_reverse());
    }
}
