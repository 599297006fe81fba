//! The routing engine: per-vehicle shortest-path tables with pluggable cost
//! functions.
//!
//! A [`Router`] computes one [`RoutingTable`] per vehicle from a frozen
//! snapshot of the model ([`RoutingGraph`]) and caches it in an LRU keyed by
//! vehicle id. Any structural event touching a point, path, static route or
//! vehicle invalidates the whole cache; recomputation happens on demand, or
//! in bulk (one vehicle per worker) via [`Router::recompute_all`].

mod compose;
pub mod cost;
mod table;

pub use cost::{
    build_cost_function, CostFunctionKind, DistanceCost, DistanceCourseChangeCost, HopsCost,
    RouteCostFunction, PROP_TRAVEL_ORIENTATION,
};
pub use table::{RoutingTable, SearchMode, TableEntry};

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;
use rayon::prelude::*;
use tracing::debug;

use crate::config::RouterConfig;
use crate::error::{KernelError, Result};
use crate::events::{EventListener, ObjectEvent};
use crate::facade::Model;
use crate::model::{
    DriveOrder, Location, ObjectKind, Path, Point, Route, StaticRoute, TransportOrder, Vehicle,
};
use crate::refs::{ObjectId, TypedRef};

/// Sentinel cost: no route exists. All cost arithmetic saturates so sums
/// involving the sentinel cannot overflow.
pub const INFINITE_COSTS: i64 = i64::MAX;

/// One path of the frozen graph, with the property the course-change cost
/// function reads.
pub struct PathNode {
    pub r: TypedRef<Path>,
    pub data: Path,
    pub travel_orientation: Option<String>,
}

/// Frozen snapshot of the model's routing-relevant parts. Tables are computed
/// against this, never against the live pool.
pub struct RoutingGraph {
    pub points: HashMap<ObjectId, (TypedRef<Point>, Point)>,
    pub paths: HashMap<ObjectId, PathNode>,
    /// Point id → ids of paths starting there.
    pub outgoing: HashMap<ObjectId, Vec<ObjectId>>,
    /// Point id → ids of paths ending there.
    pub incoming: HashMap<ObjectId, Vec<ObjectId>>,
    pub static_routes: Vec<StaticRoute>,
    /// Point ids in pool insertion order, for deterministic iteration.
    pub point_order: Vec<ObjectId>,
}

impl RoutingGraph {
    pub fn capture(model: &Model) -> Self {
        let mut points = HashMap::new();
        let mut point_order = Vec::new();
        for (meta, point) in model.pool().objects_of_kind::<Point>() {
            let r: TypedRef<Point> = TypedRef::new(meta.id, meta.name.clone());
            point_order.push(meta.id);
            points.insert(meta.id, (r, point.clone()));
        }

        let mut paths = HashMap::new();
        let mut outgoing: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
        let mut incoming: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
        for (meta, path) in model.pool().objects_of_kind::<Path>() {
            outgoing.entry(path.source.id).or_default().push(meta.id);
            incoming
                .entry(path.destination.id)
                .or_default()
                .push(meta.id);
            paths.insert(
                meta.id,
                PathNode {
                    r: TypedRef::new(meta.id, meta.name.clone()),
                    data: path.clone(),
                    travel_orientation: meta
                        .properties
                        .get(cost::PROP_TRAVEL_ORIENTATION)
                        .cloned(),
                },
            );
        }

        let static_routes = model
            .pool()
            .objects_of_kind::<StaticRoute>()
            .into_iter()
            .map(|(_, route)| route.clone())
            .collect();

        Self {
            points,
            paths,
            outgoing,
            incoming,
            static_routes,
            point_order,
        }
    }

    pub fn path(&self, id: ObjectId) -> Option<&PathNode> {
        self.paths.get(&id)
    }

    pub fn point_ref(&self, id: ObjectId) -> Option<TypedRef<Point>> {
        self.points.get(&id).map(|(r, _)| r.clone())
    }
}

/// Cost of travelling to one destination location, as returned by
/// [`Router::travel_costs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TravelCosts {
    pub location: TypedRef<Location>,
    pub costs: i64,
}

pub struct Router {
    config: RouterConfig,
    cost_fn: Box<dyn RouteCostFunction>,
    tables: Mutex<LruCache<ObjectId, Arc<RoutingTable>>>,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        let cost_fn = build_cost_function(&config.cost_function);
        let capacity = NonZeroUsize::new(config.table_cache_capacity.max(1))
            .expect("cache capacity must be > 0");
        Self {
            config,
            cost_fn,
            tables: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The routing table for one vehicle, computed on demand and cached until
    /// the next invalidation.
    pub fn table_for(
        &self,
        model: &Model,
        vehicle: &TypedRef<Vehicle>,
    ) -> Result<Arc<RoutingTable>> {
        {
            let mut tables = self.lock_tables();
            if let Some(table) = tables.get(&vehicle.id) {
                return Ok(Arc::clone(table));
            }
        }

        let vehicle_data = model
            .pool()
            .get(vehicle)
            .cloned()
            .ok_or_else(|| KernelError::ObjectUnknown(vehicle.name.clone()))?;
        let graph = RoutingGraph::capture(model);
        let table = Arc::new(table::build_table(
            &graph,
            &vehicle_data,
            self.cost_fn.as_ref(),
            self.config.search_mode,
        ));
        debug!(vehicle = %vehicle.name, entries = table.len(), "routing table computed");

        self.lock_tables().put(vehicle.id, Arc::clone(&table));
        Ok(table)
    }

    /// Cheapest cost between two points, [`INFINITE_COSTS`] when unreachable.
    pub fn costs(
        &self,
        model: &Model,
        vehicle: &TypedRef<Vehicle>,
        from: &TypedRef<Point>,
        to: &TypedRef<Point>,
    ) -> Result<i64> {
        Ok(self.table_for(model, vehicle)?.costs(from.id, to.id))
    }

    /// Cheapest route between two points, `None` when unreachable.
    pub fn route(
        &self,
        model: &Model,
        vehicle: &TypedRef<Vehicle>,
        from: &TypedRef<Point>,
        to: &TypedRef<Point>,
    ) -> Result<Option<Route>> {
        Ok(self.table_for(model, vehicle)?.route(from.id, to.id))
    }

    /// Routes for the order's future drive orders from the vehicle's current
    /// position: the cheapest destination-point sequence, or `None` when the
    /// order is not routable for this vehicle.
    pub fn routes_for_order(
        &self,
        model: &Model,
        vehicle: &TypedRef<Vehicle>,
        order: &TypedRef<TransportOrder>,
    ) -> Result<Option<(Vec<DriveOrder>, i64)>> {
        let vehicle_data = model
            .pool()
            .get(vehicle)
            .cloned()
            .ok_or_else(|| KernelError::ObjectUnknown(vehicle.name.clone()))?;
        let order_data = model
            .pool()
            .get(order)
            .cloned()
            .ok_or_else(|| KernelError::ObjectUnknown(order.name.clone()))?;
        let Some(position) = vehicle_data.current_position else {
            return Ok(None);
        };

        let table = self.table_for(model, vehicle)?;
        Ok(compose::compute_drive_order_routes(
            &table,
            model,
            &position,
            &order_data.future_drive_orders,
            self.config.route_to_current_position,
        ))
    }

    /// Whether the vehicle can process the order with finite total cost.
    pub fn check_routability(
        &self,
        model: &Model,
        vehicle: &TypedRef<Vehicle>,
        order: &TypedRef<TransportOrder>,
    ) -> Result<bool> {
        let vehicle_data = model
            .pool()
            .get(vehicle)
            .cloned()
            .ok_or_else(|| KernelError::ObjectUnknown(vehicle.name.clone()))?;
        let order_data = model
            .pool()
            .get(order)
            .cloned()
            .ok_or_else(|| KernelError::ObjectUnknown(order.name.clone()))?;

        let table = self.table_for(model, vehicle)?;
        Ok(compose::order_routable(
            &table,
            model,
            vehicle_data.current_position.as_ref(),
            &order_data.future_drive_orders,
            self.config.route_to_current_position,
        ))
    }

    /// Travel costs from a source location to each destination location,
    /// sorted ascending (cheapest first).
    pub fn travel_costs(
        &self,
        model: &Model,
        vehicle: &TypedRef<Vehicle>,
        source: &TypedRef<Location>,
        destinations: &[TypedRef<Location>],
    ) -> Result<Vec<TravelCosts>> {
        let table = self.table_for(model, vehicle)?;
        let mut costs: Vec<TravelCosts> = destinations
            .iter()
            .map(|destination| TravelCosts {
                location: destination.clone(),
                costs: compose::location_travel_costs(&table, model, source, destination),
            })
            .collect();
        costs.sort_by(|a, b| {
            a.costs
                .cmp(&b.costs)
                .then_with(|| a.location.name.cmp(&b.location.name))
        });
        Ok(costs)
    }

    /// Recomputes tables for every vehicle in the model, one vehicle per
    /// worker, then swaps the results into the cache in one step. Returns the
    /// number of tables computed.
    pub fn recompute_all(&self, model: &Model) -> usize {
        let vehicles: Vec<(TypedRef<Vehicle>, Vehicle)> = model
            .pool()
            .objects_of_kind::<Vehicle>()
            .into_iter()
            .map(|(meta, vehicle)| {
                (
                    TypedRef::new(meta.id, meta.name.clone()),
                    vehicle.clone(),
                )
            })
            .collect();
        if vehicles.is_empty() {
            return 0;
        }

        let graph = RoutingGraph::capture(model);
        let tables: Vec<(ObjectId, Arc<RoutingTable>)> = vehicles
            .par_iter()
            .map(|(r, vehicle)| {
                let table = table::build_table(
                    &graph,
                    vehicle,
                    self.cost_fn.as_ref(),
                    self.config.search_mode,
                );
                (r.id, Arc::new(table))
            })
            .collect();

        let count = tables.len();
        let mut cache = self.lock_tables();
        for (vehicle_id, table) in tables {
            cache.put(vehicle_id, table);
        }
        count
    }

    /// Drops every cached table.
    pub fn invalidate(&self) {
        self.lock_tables().clear();
    }

    pub fn cached_table_count(&self) -> usize {
        self.lock_tables().len()
    }

    fn lock_tables(&self) -> std::sync::MutexGuard<'_, LruCache<ObjectId, Arc<RoutingTable>>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventListener for Router {
    fn on_event(&self, event: &ObjectEvent) {
        if matches!(
            event.object_kind(),
            ObjectKind::Point | ObjectKind::Path | ObjectKind::StaticRoute | ObjectKind::Vehicle
        ) {
            self.invalidate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Destination, DriveOrder, StepOrientation, OP_NOP};
    use crate::test_helpers::{location_with_links, triangle, vehicle_at};

    fn router() -> Router {
        Router::new(RouterConfig::default())
    }

    #[test]
    fn two_point_route_forward_and_backward() {
        let t = triangle();
        let router = router();

        let route = router
            .route(&t.model, &t.vehicle, &t.p1, &t.p2)
            .expect("query")
            .expect("route exists");
        assert_eq!(route.cost, 1000);
        assert_eq!(route.steps.len(), 1);
        assert_eq!(route.steps[0].path, t.p1_p2);
        assert_eq!(route.steps[0].orientation, StepOrientation::Forward);
        assert_eq!(route.steps[0].index, 0);

        // Reverse direction travels the same path backward.
        let back = router
            .route(&t.model, &t.vehicle, &t.p2, &t.p1)
            .expect("query")
            .expect("route exists");
        assert_eq!(back.cost, 1000);
        assert_eq!(back.steps[0].path, t.p1_p2);
        assert_eq!(back.steps[0].orientation, StepOrientation::Backward);
    }

    #[test]
    fn cheapest_route_wins_and_locking_invalidates_it() {
        let mut t = triangle();
        let router = router();

        assert_eq!(
            router
                .costs(&t.model, &t.vehicle, &t.p1, &t.p3)
                .expect("costs"),
            2000,
            "two hops at 1000 beat the direct 3000 path"
        );

        t.model.set_path_locked(&t.p1_p2, true).expect("lock");
        router.invalidate();
        let route = router
            .route(&t.model, &t.vehicle, &t.p1, &t.p3)
            .expect("query")
            .expect("direct route remains");
        assert_eq!(route.cost, 3000);
        assert_eq!(route.steps.len(), 1);
        assert_eq!(route.steps[0].path, t.p1_p3);
    }

    #[test]
    fn structural_events_invalidate_cached_tables() {
        let mut t = triangle();
        let router = Arc::new(router());
        t.model.pool().bus().subscribe(router.clone());

        assert_eq!(
            router
                .costs(&t.model, &t.vehicle, &t.p1, &t.p3)
                .expect("costs"),
            2000
        );
        assert_eq!(router.cached_table_count(), 1);

        // Mutating a path drops the cache; the next query sees the new model.
        t.model.set_path_locked(&t.p1_p2, true).expect("lock");
        assert_eq!(router.cached_table_count(), 0);
        assert_eq!(
            router
                .costs(&t.model, &t.vehicle, &t.p1, &t.p3)
                .expect("costs"),
            3000
        );
    }

    #[test]
    fn reverse_lock_blocks_backward_expansion() {
        let mut t = triangle();
        t.model
            .set_path_max_reverse_velocity(&t.p1_p2, 0)
            .expect("velocity");
        t.model
            .set_path_max_reverse_velocity(&t.p2_p3, 0)
            .expect("velocity");
        t.model
            .set_path_max_reverse_velocity(&t.p1_p3, 0)
            .expect("velocity");

        let router = router();
        assert_eq!(
            router
                .costs(&t.model, &t.vehicle, &t.p3, &t.p1)
                .expect("costs"),
            INFINITE_COSTS,
            "with reverse travel disabled there is no way back"
        );
    }

    #[test]
    fn static_route_overwrites_the_searched_entry() {
        let mut t = triangle();
        // Pin the direct path as a static route even though the search finds
        // the cheaper two-hop route.
        let static_route = t.model.create_static_route().expect("static route");
        t.model
            .add_static_route_hop(&static_route, &t.p1)
            .expect("hop");
        t.model
            .add_static_route_hop(&static_route, &t.p3)
            .expect("hop");

        let router = router();
        let route = router
            .route(&t.model, &t.vehicle, &t.p1, &t.p3)
            .expect("query")
            .expect("route exists");
        assert_eq!(route.cost, 3000, "the static route wins unconditionally");
        assert_eq!(route.steps.len(), 1);
        assert_eq!(route.steps[0].path, t.p1_p3);
    }

    #[test]
    fn exhaustive_mode_agrees_with_terminate_early_on_distance() {
        let t = triangle();
        let early = Router::new(RouterConfig::default());
        let exhaustive =
            Router::new(RouterConfig::default().with_search_mode(SearchMode::Exhaustive));

        for (from, to) in [
            (&t.p1, &t.p2),
            (&t.p1, &t.p3),
            (&t.p2, &t.p3),
            (&t.p3, &t.p1),
        ] {
            assert_eq!(
                early.costs(&t.model, &t.vehicle, from, to).expect("costs"),
                exhaustive
                    .costs(&t.model, &t.vehicle, from, to)
                    .expect("costs"),
            );
        }
    }

    #[test]
    fn multi_stop_routes_pick_the_cheaper_destination_point() {
        let mut t = triangle();
        // LA is reachable only via P2; LB is linked to both P2 and P3.
        let (_, la) = location_with_links(&mut t.model, &[&t.p2], "drop");
        let (_, lb) = location_with_links(&mut t.model, &[&t.p2, &t.p3], "pick");
        let vehicle = vehicle_at(&mut t.model, &t.p1);

        let router = router();
        let table = router.table_for(&t.model, &vehicle).expect("table");
        let drive_orders = vec![
            DriveOrder::new(Destination::new(la.clone(), "drop")),
            DriveOrder::new(Destination::new(lb.clone(), "pick")),
        ];
        let (routed, total) = compose::compute_drive_order_routes(
            &table,
            &t.model,
            &t.p1,
            &drive_orders,
            false,
        )
        .expect("routable");

        // P1 -> P2 costs 1000; already standing at LB's link point P2, the
        // second hop short-circuits to zero.
        assert_eq!(total, 1000);
        assert_eq!(routed.len(), 2);
        let first = routed[0].route.as_ref().expect("route");
        assert_eq!(first.cost, 1000);
        assert_eq!(first.final_point(), Some(&t.p2));
        let second = routed[1].route.as_ref().expect("route");
        assert_eq!(second.cost, 0);
        assert!(second.steps.is_empty());
    }

    #[test]
    fn unreachable_destination_makes_the_order_unroutable() {
        let mut t = triangle();
        let isolated = t.model.create_point().expect("isolated point");
        let (_, unreachable) = location_with_links(&mut t.model, &[&isolated], "pick");
        let vehicle = vehicle_at(&mut t.model, &t.p1);

        let router = router();
        let table = router.table_for(&t.model, &vehicle).expect("table");
        let drive_orders = vec![DriveOrder::new(Destination::new(unreachable, "pick"))];
        assert!(compose::compute_drive_order_routes(
            &table,
            &t.model,
            &t.p1,
            &drive_orders,
            false
        )
        .is_none());
    }

    #[test]
    fn nop_is_allowed_on_any_link() {
        let mut t = triangle();
        let (_, location) = location_with_links(&mut t.model, &[&t.p2], "pick");
        let destination = Destination::new(location, OP_NOP);
        let points = compose::admissible_destination_points(&t.model, &destination);
        assert_eq!(points, vec![t.p2.clone()]);
    }

    #[test]
    fn travel_costs_are_sorted_cheapest_first() {
        let mut t = triangle();
        let (_, source) = location_with_links(&mut t.model, &[&t.p1], "pick");
        let (_, near) = location_with_links(&mut t.model, &[&t.p2], "pick");
        let (_, far) = location_with_links(&mut t.model, &[&t.p3], "pick");
        let vehicle = vehicle_at(&mut t.model, &t.p1);

        let router = router();
        let costs = router
            .travel_costs(&t.model, &vehicle, &source, &[far.clone(), near.clone()])
            .expect("travel costs");
        assert_eq!(costs.len(), 2);
        assert_eq!(costs[0].location, near);
        assert_eq!(costs[0].costs, 1000);
        assert_eq!(costs[1].location, far);
        assert_eq!(costs[1].costs, 2000);
    }

    #[test]
    fn recompute_all_builds_one_table_per_vehicle() {
        let mut t = triangle();
        vehicle_at(&mut t.model, &t.p1);
        vehicle_at(&mut t.model, &t.p2);

        let router = router();
        // Three vehicles: the triangle's own plus the two placed ones.
        assert_eq!(router.recompute_all(&t.model), 3);
        assert_eq!(router.cached_table_count(), 3);
    }
}
