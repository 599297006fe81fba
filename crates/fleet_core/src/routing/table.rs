//! Routing-table construction: best-first search over the frozen graph.
//!
//! From every source point the builder explores forward edges along paths
//! that are navigable forward and backward edges along paths navigable in
//! reverse. A point never appears twice on one candidate route, so every
//! candidate is a simple path and the search terminates in both completion
//! modes. Static routes are integrated after the search and overwrite the
//! searched entry for their endpoint pair unconditionally.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};

use super::cost::RouteCostFunction;
use super::{RoutingGraph, INFINITE_COSTS};
use crate::model::{Route, Step, StepOrientation, Vehicle};
use crate::refs::ObjectId;

/// How the per-source search decides it is done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    /// Stop relaxing through a node once its candidate cost is not strictly
    /// below the best known cost. Fast; admissible cost functions only.
    #[default]
    TerminateEarly,
    /// Drain the candidate queue. Correct for every cost function.
    Exhaustive,
}

#[derive(Debug, Clone)]
pub struct TableEntry {
    pub cost: i64,
    pub steps: Vec<Step>,
}

/// Mapping (source point, destination point) → cheapest known route. A
/// missing entry means no route exists ([`INFINITE_COSTS`]).
#[derive(Debug, Default)]
pub struct RoutingTable {
    entries: HashMap<(ObjectId, ObjectId), TableEntry>,
}

impl RoutingTable {
    pub fn costs(&self, from: ObjectId, to: ObjectId) -> i64 {
        self.entries
            .get(&(from, to))
            .map_or(INFINITE_COSTS, |entry| entry.cost)
    }

    pub fn entry(&self, from: ObjectId, to: ObjectId) -> Option<&TableEntry> {
        self.entries.get(&(from, to))
    }

    pub fn route(&self, from: ObjectId, to: ObjectId) -> Option<Route> {
        self.entries.get(&(from, to)).map(|entry| Route {
            steps: entry.steps.clone(),
            cost: entry.cost,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One queued candidate route of the best-first search.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    cost: i64,
    point: ObjectId,
    steps: Vec<Step>,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap by cost; ties broken by point id and route length for
        // deterministic tables.
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.point.cmp(&self.point))
            .then_with(|| other.steps.len().cmp(&self.steps.len()))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Builds the full routing table for one vehicle over a frozen graph.
pub(crate) fn build_table(
    graph: &RoutingGraph,
    vehicle: &Vehicle,
    cost_fn: &dyn RouteCostFunction,
    mode: SearchMode,
) -> RoutingTable {
    let mut table = RoutingTable::default();
    for source in &graph.point_order {
        search_from(graph, vehicle, cost_fn, mode, *source, &mut table.entries);
    }
    integrate_static_routes(graph, vehicle, cost_fn, &mut table.entries);
    table
}

fn search_from(
    graph: &RoutingGraph,
    vehicle: &Vehicle,
    cost_fn: &dyn RouteCostFunction,
    mode: SearchMode,
    source: ObjectId,
    entries: &mut HashMap<(ObjectId, ObjectId), TableEntry>,
) {
    let Some((_, source_point)) = graph.points.get(&source) else {
        return;
    };

    let mut best: HashMap<ObjectId, i64> = HashMap::new();
    best.insert(source, 0);
    entries.insert(
        (source, source),
        TableEntry {
            cost: 0,
            steps: Vec::new(),
        },
    );

    let mut queue = BinaryHeap::new();
    queue.push(Candidate {
        cost: 0,
        point: source,
        steps: Vec::new(),
    });

    while let Some(candidate) = queue.pop() {
        if candidate.point != source {
            let known = best.get(&candidate.point).copied().unwrap_or(INFINITE_COSTS);
            let improved = candidate.cost < known;
            if improved {
                best.insert(candidate.point, candidate.cost);
                entries.insert(
                    (source, candidate.point),
                    TableEntry {
                        cost: candidate.cost,
                        steps: candidate.steps.clone(),
                    },
                );
            } else if mode == SearchMode::TerminateEarly {
                continue;
            }
        }

        // Forward expansion.
        for path_id in graph.outgoing.get(&candidate.point).into_iter().flatten() {
            let Some(path) = graph.path(*path_id) else {
                continue;
            };
            if !path.data.navigable_forward() {
                continue;
            }
            let next = path.data.destination.id;
            if next == source || on_route(&candidate.steps, next) {
                continue;
            }
            push_candidate(
                graph,
                vehicle,
                cost_fn,
                source_point,
                &candidate,
                *path_id,
                next,
                StepOrientation::Forward,
                &mut queue,
            );
        }

        // Backward expansion.
        for path_id in graph.incoming.get(&candidate.point).into_iter().flatten() {
            let Some(path) = graph.path(*path_id) else {
                continue;
            };
            if !path.data.navigable_reverse() {
                continue;
            }
            let next = path.data.source.id;
            if next == source || on_route(&candidate.steps, next) {
                continue;
            }
            push_candidate(
                graph,
                vehicle,
                cost_fn,
                source_point,
                &candidate,
                *path_id,
                next,
                StepOrientation::Backward,
                &mut queue,
            );
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn push_candidate(
    graph: &RoutingGraph,
    vehicle: &Vehicle,
    cost_fn: &dyn RouteCostFunction,
    source_point: &crate::model::Point,
    candidate: &Candidate,
    path_id: ObjectId,
    next: ObjectId,
    orientation: StepOrientation,
    queue: &mut BinaryHeap<Candidate>,
) {
    let Some(path) = graph.path(path_id) else {
        return;
    };
    let Some(next_ref) = graph.point_ref(next) else {
        return;
    };
    let mut steps = candidate.steps.clone();
    steps.push(Step {
        path: path.r.clone(),
        destination: next_ref,
        orientation,
        index: steps.len(),
    });
    let cost = cost_fn.cost(vehicle, source_point, &steps, graph);
    if cost >= INFINITE_COSTS {
        return;
    }
    queue.push(Candidate {
        cost,
        point: next,
        steps,
    });
}

/// True when `point` is already visited by this candidate route.
fn on_route(steps: &[Step], point: ObjectId) -> bool {
    steps.iter().any(|step| step.destination.id == point)
}

/// Overwrites the (first, last) entry for every static route whose hops are
/// joined by navigable paths, regardless of the searched cost.
fn integrate_static_routes(
    graph: &RoutingGraph,
    vehicle: &Vehicle,
    cost_fn: &dyn RouteCostFunction,
    entries: &mut HashMap<(ObjectId, ObjectId), TableEntry>,
) {
    for static_route in &graph.static_routes {
        if static_route.hops.len() < 2 {
            continue;
        }
        let mut steps = Vec::with_capacity(static_route.hops.len() - 1);
        let mut connected = true;
        for pair in static_route.hops.windows(2) {
            match connecting_step(graph, pair[0].id, pair[1].id, steps.len()) {
                Some(step) => steps.push(step),
                None => {
                    connected = false;
                    break;
                }
            }
        }
        if !connected {
            continue;
        }

        let first = static_route.hops[0].id;
        let last = static_route.hops[static_route.hops.len() - 1].id;
        let Some((_, first_point)) = graph.points.get(&first) else {
            continue;
        };
        let cost = cost_fn.cost(vehicle, first_point, &steps, graph);
        entries.insert((first, last), TableEntry { cost, steps });
    }
}

/// A single step from `from` to `to`: a forward-navigable path from→to, or
/// failing that a reverse-navigable path to→from.
fn connecting_step(
    graph: &RoutingGraph,
    from: ObjectId,
    to: ObjectId,
    index: usize,
) -> Option<Step> {
    let to_ref = graph.point_ref(to)?;

    for path_id in graph.outgoing.get(&from).into_iter().flatten() {
        let Some(path) = graph.path(*path_id) else {
            continue;
        };
        if path.data.destination.id == to && path.data.navigable_forward() {
            return Some(Step {
                path: path.r.clone(),
                destination: to_ref,
                orientation: StepOrientation::Forward,
                index,
            });
        }
    }
    for path_id in graph.incoming.get(&from).into_iter().flatten() {
        let Some(path) = graph.path(*path_id) else {
            continue;
        };
        if path.data.source.id == to && path.data.navigable_reverse() {
            return Some(Step {
                path: path.r.clone(),
                destination: to_ref,
                orientation: StepOrientation::Backward,
                index,
            });
        }
    }
    None
}
