//! Route composition across multi-stop transport orders.
//!
//! Given a drive-order list and a start point, a depth-first search over the
//! admissible destination points of every drive order picks the cheapest
//! point sequence, pruning on the best total found so far.

use super::table::RoutingTable;
use super::INFINITE_COSTS;
use crate::facade::Model;
use crate::model::{
    Destination, DriveOrder, DriveOrderState, Link, Location, LocationType, Point, Route,
    OP_MOVE, OP_NOP, OP_PARK,
};
use crate::refs::TypedRef;

/// The points a drive order may legally end at.
///
/// For `MOVE`/`PARK` the destination is a dummy location whose name equals
/// the target point's name; otherwise every halting point linked to the
/// location where the operation is allowed qualifies.
pub(crate) fn admissible_destination_points(
    model: &Model,
    destination: &Destination,
) -> Vec<TypedRef<Point>> {
    let operation = destination.operation.as_str();

    if operation == OP_MOVE || operation == OP_PARK {
        if let Some(point_ref) = model.pool().ref_by_name::<Point>(&destination.location.name) {
            let halting = model
                .pool()
                .get(&point_ref)
                .is_some_and(|p| p.kind.is_halting());
            if halting {
                return vec![point_ref];
            }
        }
        return Vec::new();
    }

    let Some(location) = model.pool().get(&destination.location) else {
        return Vec::new();
    };
    let Some(location_type) = model.pool().get(&location.kind) else {
        return Vec::new();
    };

    location
        .links
        .iter()
        .filter(|link| operation_allowed(operation, link, location_type))
        .filter(|link| {
            model
                .pool()
                .get(&link.point)
                .is_some_and(|p| p.kind.is_halting())
        })
        .map(|link| link.point.clone())
        .collect()
}

/// An operation is allowed on a link when it is `NOP`, when the link lists
/// it, or when the link lists nothing and the location type allows it.
fn operation_allowed(operation: &str, link: &Link, location_type: &LocationType) -> bool {
    operation == OP_NOP
        || link.allowed_operations.contains(operation)
        || (link.allowed_operations.is_empty()
            && location_type.allowed_operations.contains(operation))
}

/// Computes routes for the whole drive-order list from `start`, returning the
/// drive orders with routes attached plus the total cost, or `None` when no
/// finite assignment exists.
pub(crate) fn compute_drive_order_routes(
    table: &RoutingTable,
    model: &Model,
    start: &TypedRef<Point>,
    drive_orders: &[DriveOrder],
    route_to_current_position: bool,
) -> Option<(Vec<DriveOrder>, i64)> {
    let candidate_sets: Vec<Vec<TypedRef<Point>>> = drive_orders
        .iter()
        .map(|order| admissible_destination_points(model, &order.destination))
        .collect();
    if candidate_sets.iter().any(Vec::is_empty) {
        return None;
    }

    let mut search = HopSearch {
        table,
        candidate_sets: &candidate_sets,
        route_to_current_position,
        best_total: INFINITE_COSTS,
        best_routes: None,
    };
    let mut chosen = Vec::with_capacity(drive_orders.len());
    search.descend(0, start, 0, &mut chosen);

    let routes = search.best_routes?;
    let total = search.best_total;
    let routed = drive_orders
        .iter()
        .zip(routes)
        .map(|(order, route)| DriveOrder {
            destination: order.destination.clone(),
            route: Some(route),
            state: DriveOrderState::Pristine,
        })
        .collect();
    Some((routed, total))
}

struct HopSearch<'a> {
    table: &'a RoutingTable,
    candidate_sets: &'a [Vec<TypedRef<Point>>],
    route_to_current_position: bool,
    best_total: i64,
    best_routes: Option<Vec<Route>>,
}

impl HopSearch<'_> {
    fn descend(
        &mut self,
        hop: usize,
        current: &TypedRef<Point>,
        total: i64,
        chosen: &mut Vec<Route>,
    ) {
        if hop == self.candidate_sets.len() {
            if total < self.best_total {
                self.best_total = total;
                self.best_routes = Some(chosen.clone());
            }
            return;
        }

        let candidates = &self.candidate_sets[hop];

        // Already standing at an admissible point: the hop costs nothing.
        if !self.route_to_current_position && candidates.iter().any(|c| c.id == current.id) {
            chosen.push(Route {
                steps: Vec::new(),
                cost: 0,
            });
            self.descend(hop + 1, current, total, chosen);
            chosen.pop();
            return;
        }

        for candidate in candidates {
            let cost = self.table.costs(current.id, candidate.id);
            if cost >= INFINITE_COSTS {
                continue;
            }
            let candidate_total = total.saturating_add(cost);
            if candidate_total >= self.best_total {
                continue;
            }
            let Some(route) = self.table.route(current.id, candidate.id) else {
                continue;
            };
            chosen.push(route);
            self.descend(hop + 1, candidate, candidate_total, chosen);
            chosen.pop();
        }
    }
}

/// True when the vehicle can reach every destination of the order with a
/// finite total cost.
pub(crate) fn order_routable(
    table: &RoutingTable,
    model: &Model,
    vehicle_position: Option<&TypedRef<Point>>,
    drive_orders: &[DriveOrder],
    route_to_current_position: bool,
) -> bool {
    // A vehicle that has not reported a position cannot take any order.
    let Some(position) = vehicle_position else {
        return false;
    };
    compute_drive_order_routes(
        table,
        model,
        position,
        drive_orders,
        route_to_current_position,
    )
    .is_some()
}

/// Minimum point-to-point cost over every pair of linked points.
pub(crate) fn location_travel_costs(
    table: &RoutingTable,
    model: &Model,
    source: &TypedRef<Location>,
    destination: &TypedRef<Location>,
) -> i64 {
    let Some(source_location) = model.pool().get(source) else {
        return INFINITE_COSTS;
    };
    let Some(destination_location) = model.pool().get(destination) else {
        return INFINITE_COSTS;
    };

    let mut minimum = INFINITE_COSTS;
    for source_link in &source_location.links {
        for destination_link in &destination_location.links {
            let cost = table.costs(source_link.point.id, destination_link.point.id);
            minimum = minimum.min(cost);
        }
    }
    minimum
}
