use bevy_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

use super::Point;
use crate::refs::{ObjectRef, TypedRef};

/// A set of resources (points, paths, locations) treated as a unit: when a
/// vehicle allocates one member, resource expansion pulls in all of them.
/// Blocks may overlap.
#[derive(Component, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub members: Vec<ObjectRef>,
}

/// A free-form grouping of model objects of any kind.
#[derive(Component, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub members: Vec<ObjectRef>,
}

/// A pre-specified hop list. When its hops are connected by navigable paths,
/// the routing engine prefers it over computed routes between its endpoints.
#[derive(Component, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticRoute {
    pub hops: Vec<TypedRef<Point>>,
}
