use std::collections::BTreeSet;

use bevy_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

use super::{Point, Triple};
use crate::refs::{ObjectRef, TypedRef};

/// A category of locations, declaring which operations are allowed at
/// locations of this type.
#[derive(Component, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationType {
    pub allowed_operations: BTreeSet<String>,
}

/// Connection between a location and a point. Stored on both sides; the
/// facade keeps the two copies identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub location: TypedRef<Location>,
    pub point: TypedRef<Point>,
    /// Operations allowed via this link. When empty, the location type's
    /// allowed operations apply instead.
    pub allowed_operations: BTreeSet<String>,
}

impl Link {
    pub fn new(location: TypedRef<Location>, point: TypedRef<Point>) -> Self {
        Self {
            location,
            point,
            allowed_operations: BTreeSet::new(),
        }
    }
}

/// A named station in the driving course, reachable via one or more linked
/// points.
#[derive(Component, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub kind: TypedRef<LocationType>,
    pub position: Triple,
    pub links: Vec<Link>,
    /// Resources a vehicle implicitly allocates together with this location.
    pub attached_resources: Vec<ObjectRef>,
}

impl Location {
    pub fn new(kind: TypedRef<LocationType>) -> Self {
        Self {
            kind,
            position: Triple::default(),
            links: Vec::new(),
            attached_resources: Vec::new(),
        }
    }
}
