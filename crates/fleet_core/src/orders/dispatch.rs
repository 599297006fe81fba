//! The dispatcher: assigns dispatchable transport orders to idle vehicles.
//!
//! Candidate orders are scanned in priority order (earliest deadline first,
//! ties by creation time). The first order the vehicle can route wins; orders
//! no candidate vehicle can route are parked in `Unroutable`.

use std::cmp::Ordering;

use tracing::{debug, info, warn};

use super::OrderService;
use crate::error::{KernelError, Result};
use crate::facade::Model;
use crate::model::{
    DriveOrder, DriveOrderState, TransportOrder, TransportOrderState, Vehicle, VehicleProcState,
};
use crate::refs::{ObjectId, TypedRef};
use crate::routing::Router;

/// Dispatch priority: earliest deadline first, ties broken by earliest
/// creation time. A strict weak order because creation times are unique.
pub fn priority_order(a: &TransportOrder, b: &TransportOrder) -> Ordering {
    a.deadline
        .cmp(&b.deadline)
        .then_with(|| a.creation_time.cmp(&b.creation_time))
}

/// Age order: earliest creation time first, ties broken by smaller id.
pub fn age_order(a: &(ObjectId, TransportOrder), b: &(ObjectId, TransportOrder)) -> Ordering {
    a.1.creation_time
        .cmp(&b.1.creation_time)
        .then_with(|| a.0.cmp(&b.0))
}

impl OrderService {
    /// Tries to assign a dispatchable order to `vehicle`.
    ///
    /// The vehicle must be idle; `set_idle_if_unavailable` first converts an
    /// unavailable vehicle to idle. Returns the assigned order, or `None`
    /// when no dispatchable order is routable for this vehicle.
    pub fn dispatch_vehicle(
        &mut self,
        model: &mut Model,
        router: &Router,
        vehicle: &TypedRef<Vehicle>,
        set_idle_if_unavailable: bool,
    ) -> Result<Option<TypedRef<TransportOrder>>> {
        let data = model.require(vehicle)?;
        let mut proc_state = data.proc_state;
        if proc_state == VehicleProcState::Unavailable && set_idle_if_unavailable {
            model.set_vehicle_proc_state(vehicle, VehicleProcState::Idle)?;
            proc_state = VehicleProcState::Idle;
        }
        if proc_state != VehicleProcState::Idle {
            return Err(KernelError::IllegalArgument(format!(
                "vehicle {vehicle} is not idle ({proc_state:?})"
            )));
        }

        for order_ref in self.candidate_orders(model, vehicle) {
            match router.routes_for_order(model, vehicle, &order_ref)? {
                Some((drive_orders, total_cost)) => {
                    info!(
                        order = %order_ref.name,
                        vehicle = %vehicle.name,
                        cost = total_cost,
                        "assigning transport order"
                    );
                    self.assign_order(model, vehicle, &order_ref, drive_orders)?;
                    return Ok(Some(order_ref));
                }
                None => {
                    debug!(order = %order_ref.name, vehicle = %vehicle.name, "no route");
                    self.mark_unroutable_if_stuck(model, router, &order_ref)?;
                }
            }
        }
        Ok(None)
    }

    /// Dispatchable orders this vehicle may take, in priority order.
    fn candidate_orders(
        &self,
        model: &Model,
        vehicle: &TypedRef<Vehicle>,
    ) -> Vec<TypedRef<TransportOrder>> {
        let mut candidates: Vec<(TypedRef<TransportOrder>, TransportOrder)> = model
            .pool()
            .objects_of_kind::<TransportOrder>()
            .into_iter()
            .filter(|(_, order)| order.state == TransportOrderState::Dispatchable)
            .filter(|(_, order)| {
                order
                    .intended_vehicle
                    .as_ref()
                    .map_or(true, |intended| intended.id == vehicle.id)
            })
            .filter(|(_, order)| self.sequence_admits_vehicle(model, order, vehicle))
            .map(|(meta, order)| (TypedRef::new(meta.id, meta.name.clone()), order.clone()))
            .collect();
        candidates.sort_by(|a, b| priority_order(&a.1, &b.1));
        candidates.into_iter().map(|(r, _)| r).collect()
    }

    /// A sequence member may only go to the sequence's intended/processing
    /// vehicle once one is pinned.
    fn sequence_admits_vehicle(
        &self,
        model: &Model,
        order: &TransportOrder,
        vehicle: &TypedRef<Vehicle>,
    ) -> bool {
        let Some(sequence_ref) = &order.wrapping_sequence else {
            return true;
        };
        let Some(sequence) = model.pool().get(sequence_ref) else {
            return true;
        };
        if let Some(processing) = &sequence.processing_vehicle {
            return processing.id == vehicle.id;
        }
        if let Some(intended) = &sequence.intended_vehicle {
            return intended.id == vehicle.id;
        }
        true
    }

    /// Moves an order that no candidate vehicle can route to `Unroutable`.
    fn mark_unroutable_if_stuck(
        &mut self,
        model: &mut Model,
        router: &Router,
        order: &TypedRef<TransportOrder>,
    ) -> Result<()> {
        let routable_for_any = model
            .pool()
            .refs_of_kind::<Vehicle>()
            .iter()
            .any(|candidate| {
                router
                    .check_routability(model, candidate, order)
                    .unwrap_or(false)
            });
        if routable_for_any {
            return Ok(());
        }

        warn!(order = %order.name, "no candidate vehicle can route the order");
        let finished_time = super::now_ms();
        model.pool_mut().modify(order, move |o| {
            o.state = TransportOrderState::Unroutable;
            o.finished_time = Some(finished_time);
        })?;
        self.on_order_terminal(model, order)
    }

    /// Writes the assignment to both sides: the order gets its routes and
    /// becomes `BeingProcessed`, the vehicle gets the order and becomes
    /// `ProcessingOrder`.
    fn assign_order(
        &mut self,
        model: &mut Model,
        vehicle: &TypedRef<Vehicle>,
        order: &TypedRef<TransportOrder>,
        drive_orders: Vec<DriveOrder>,
    ) -> Result<()> {
        let vehicle_ref = vehicle.clone();
        model.pool_mut().modify(order, move |o| {
            o.future_drive_orders = drive_orders;
            let mut first = o.future_drive_orders.remove(0);
            first.state = DriveOrderState::Travelling;
            o.current_drive_order = Some(first);
            o.state = TransportOrderState::BeingProcessed;
            o.processing_vehicle = Some(vehicle_ref);
        })?;

        let order_data = model.require(order)?;
        if let Some(sequence_ref) = order_data.wrapping_sequence.clone() {
            let vehicle_ref = vehicle.clone();
            model.pool_mut().modify(&sequence_ref, move |s| {
                s.processing_vehicle = Some(vehicle_ref);
            })?;
            model.set_vehicle_order_sequence(vehicle, Some(&sequence_ref))?;
        }

        model.set_vehicle_transport_order(vehicle, Some(order))?;
        model.set_vehicle_proc_state(vehicle, VehicleProcState::ProcessingOrder)?;
        model.set_vehicle_route_progress_index(vehicle, -1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Destination;
    use crate::refs::TypedRef as Ref;

    fn order_with(deadline: i64, creation_time: i64) -> TransportOrder {
        let destination = Destination::new(Ref::new(ObjectId(0), "Location-0000"), "NOP");
        let mut order = TransportOrder::new(vec![destination], creation_time);
        order.deadline = deadline;
        order
    }

    #[test]
    fn priority_is_deadline_then_creation_time() {
        let urgent = order_with(1_000, 50);
        let urgent_older = order_with(1_000, 10);
        let relaxed = order_with(9_000, 1);

        assert_eq!(priority_order(&urgent_older, &urgent), Ordering::Less);
        assert_eq!(priority_order(&urgent, &relaxed), Ordering::Less);
        assert_eq!(priority_order(&relaxed, &urgent_older), Ordering::Greater);
    }

    #[test]
    fn priority_is_a_strict_weak_order() {
        let orders = vec![
            order_with(5_000, 3),
            order_with(1_000, 7),
            order_with(5_000, 1),
            order_with(1_000, 2),
        ];
        for a in &orders {
            assert_eq!(priority_order(a, a), Ordering::Equal);
            for b in &orders {
                assert_eq!(priority_order(a, b), priority_order(b, a).reverse());
                for c in &orders {
                    if priority_order(a, b) == Ordering::Less
                        && priority_order(b, c) == Ordering::Less
                    {
                        assert_eq!(priority_order(a, c), Ordering::Less);
                    }
                }
            }
        }
    }

    #[test]
    fn age_breaks_creation_ties_by_id() {
        let a = (ObjectId(3), order_with(i64::MAX, 100));
        let b = (ObjectId(1), order_with(i64::MAX, 100));
        let c = (ObjectId(2), order_with(i64::MAX, 50));
        assert_eq!(age_order(&b, &a), Ordering::Less);
        assert_eq!(age_order(&c, &b), Ordering::Less);
    }
}
