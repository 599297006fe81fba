//! Pluggable route cost functions.
//!
//! A cost function scores a whole candidate route (start point + steps) for a
//! vehicle. Implementations must be `Send + Sync` so one boxed instance can
//! score routes for many vehicles concurrently.

use serde::{Deserialize, Serialize};

use super::{RoutingGraph, INFINITE_COSTS};
use crate::model::{Point, Step, Vehicle};

/// Path property holding the travel orientation used by the course-change
/// penalty, e.g. `"NORTH"`.
pub const PROP_TRAVEL_ORIENTATION: &str = "fleet:travelOrientation";

/// Trait for route cost functions.
///
/// The returned cost must be non-negative; [`INFINITE_COSTS`] marks an
/// unusable route. Costs are whole-route values, so functions are free to
/// score step interactions (e.g. course changes), not just sums over edges.
pub trait RouteCostFunction: Send + Sync {
    fn cost(&self, vehicle: &Vehicle, start: &Point, steps: &[Step], graph: &RoutingGraph) -> i64;
}

/// Which cost function to use. Stored in `RouterConfig` so it serializes with
/// the rest of the kernel configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum CostFunctionKind {
    /// Sum of path lengths over the steps.
    #[default]
    Distance,
    /// Number of steps.
    Hops,
    /// Distance plus a fixed penalty for every course change.
    DistanceCourseChange { penalty: i64 },
}

/// Construct a boxed [`RouteCostFunction`] from a [`CostFunctionKind`]
/// descriptor.
pub fn build_cost_function(kind: &CostFunctionKind) -> Box<dyn RouteCostFunction> {
    match kind {
        CostFunctionKind::Distance => Box::new(DistanceCost),
        CostFunctionKind::Hops => Box::new(HopsCost),
        CostFunctionKind::DistanceCourseChange { penalty } => {
            Box::new(DistanceCourseChangeCost::new(*penalty))
        }
    }
}

/// Scores a route by the summed length of its paths.
pub struct DistanceCost;

impl RouteCostFunction for DistanceCost {
    fn cost(&self, _vehicle: &Vehicle, _start: &Point, steps: &[Step], graph: &RoutingGraph) -> i64 {
        let mut total: i64 = 0;
        for step in steps {
            let Some(path) = graph.path(step.path.id) else {
                return INFINITE_COSTS;
            };
            total = total.saturating_add(path.data.length);
        }
        total
    }
}

/// Scores a route by its step count.
pub struct HopsCost;

impl RouteCostFunction for HopsCost {
    fn cost(
        &self,
        _vehicle: &Vehicle,
        _start: &Point,
        steps: &[Step],
        _graph: &RoutingGraph,
    ) -> i64 {
        steps.len() as i64
    }
}

/// Distance plus a fixed penalty for every consecutive step pair whose paths
/// disagree on the travel-orientation property.
pub struct DistanceCourseChangeCost {
    penalty: i64,
}

impl DistanceCourseChangeCost {
    pub fn new(penalty: i64) -> Self {
        Self { penalty }
    }
}

impl Default for DistanceCourseChangeCost {
    fn default() -> Self {
        Self::new(5000)
    }
}

impl RouteCostFunction for DistanceCourseChangeCost {
    fn cost(&self, vehicle: &Vehicle, start: &Point, steps: &[Step], graph: &RoutingGraph) -> i64 {
        let mut total = DistanceCost.cost(vehicle, start, steps, graph);
        for pair in steps.windows(2) {
            let previous = graph.path(pair[0].path.id).and_then(|p| p.travel_orientation.as_deref());
            let next = graph.path(pair[1].path.id).and_then(|p| p.travel_orientation.as_deref());
            if previous != next {
                total = total.saturating_add(self.penalty);
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::super::PathNode;
    use super::*;
    use crate::model::{Path, PointKind, StepOrientation};
    use crate::refs::{ObjectId, TypedRef};
    use std::collections::HashMap;

    fn graph_with_paths(paths: Vec<(ObjectId, i64, Option<&str>)>) -> RoutingGraph {
        let mut graph = RoutingGraph {
            points: HashMap::new(),
            paths: HashMap::new(),
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
            static_routes: Vec::new(),
            point_order: Vec::new(),
        };
        for (id, length, orientation) in paths {
            let source: TypedRef<Point> = TypedRef::new(ObjectId(100), "src");
            let destination: TypedRef<Point> = TypedRef::new(ObjectId(101), "dst");
            let mut data = Path::new(source, destination);
            data.length = length;
            graph.paths.insert(
                id,
                PathNode {
                    r: TypedRef::new(id, format!("Path-{id}")),
                    data,
                    travel_orientation: orientation.map(str::to_string),
                },
            );
        }
        graph
    }

    fn step(path_id: ObjectId, index: usize) -> Step {
        Step {
            path: TypedRef::new(path_id, format!("Path-{path_id}")),
            destination: TypedRef::new(ObjectId(101), "dst"),
            orientation: StepOrientation::Forward,
            index,
        }
    }

    fn start_point() -> Point {
        let mut p = Point::default();
        p.kind = PointKind::HaltPosition;
        p
    }

    #[test]
    fn distance_sums_path_lengths() {
        let graph = graph_with_paths(vec![
            (ObjectId(1), 1000, None),
            (ObjectId(2), 2500, None),
        ]);
        let steps = vec![step(ObjectId(1), 0), step(ObjectId(2), 1)];
        let cost = DistanceCost.cost(&Vehicle::default(), &start_point(), &steps, &graph);
        assert_eq!(cost, 3500);
    }

    #[test]
    fn hops_counts_steps() {
        let graph = graph_with_paths(vec![(ObjectId(1), 1, None), (ObjectId(2), 1, None)]);
        let steps = vec![step(ObjectId(1), 0), step(ObjectId(2), 1)];
        let cost = HopsCost.cost(&Vehicle::default(), &start_point(), &steps, &graph);
        assert_eq!(cost, 2);
    }

    #[test]
    fn course_change_penalty_applies_on_orientation_switch() {
        let graph = graph_with_paths(vec![
            (ObjectId(1), 1000, Some("NORTH")),
            (ObjectId(2), 1000, Some("NORTH")),
            (ObjectId(3), 1000, Some("EAST")),
        ]);
        let f = DistanceCourseChangeCost::new(500);

        let straight = vec![step(ObjectId(1), 0), step(ObjectId(2), 1)];
        assert_eq!(
            f.cost(&Vehicle::default(), &start_point(), &straight, &graph),
            2000
        );

        let turning = vec![step(ObjectId(1), 0), step(ObjectId(3), 1)];
        assert_eq!(
            f.cost(&Vehicle::default(), &start_point(), &turning, &graph),
            2500
        );
    }

    #[test]
    fn adding_a_hop_never_decreases_cost() {
        let graph = graph_with_paths(vec![
            (ObjectId(1), 1000, Some("NORTH")),
            (ObjectId(2), 1, Some("EAST")),
        ]);
        let f = DistanceCourseChangeCost::new(500);
        let short = vec![step(ObjectId(1), 0)];
        let long = vec![step(ObjectId(1), 0), step(ObjectId(2), 1)];
        let vehicle = Vehicle::default();
        assert!(
            f.cost(&vehicle, &start_point(), &long, &graph)
                >= f.cost(&vehicle, &start_point(), &short, &graph)
        );
    }
}
