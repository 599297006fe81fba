//! Transport orders and their drive orders.
//!
//! A transport order is an ordered list of drive orders (destination +
//! operation), moved through the state machine below by the order service.
//! Routes are attached to drive orders by the dispatcher once a vehicle is
//! assigned.

use std::collections::BTreeSet;

use bevy_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

use super::{Location, OrderSequence, Path, Point, Vehicle};
use crate::refs::TypedRef;

/// Pseudo-operation: any operation is acceptable at the destination.
pub const OP_NOP: &str = "NOP";
/// Pseudo-operation: move to a point (dummy-location destination).
pub const OP_MOVE: &str = "MOVE";
/// Pseudo-operation: park at a point (dummy-location destination).
pub const OP_PARK: &str = "PARK";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportOrderState {
    /// Still being set up by the client.
    Raw,
    /// Parameters finalised; waiting on dependencies.
    Active,
    /// Dependencies satisfied; ready for dispatch.
    Dispatchable,
    /// Assigned to a vehicle and being executed.
    BeingProcessed,
    Finished,
    /// Withdrawal requested; the vehicle is still finishing committed
    /// movements.
    Withdrawn,
    Failed,
    /// No route exists for any candidate vehicle.
    Unroutable,
}

impl TransportOrderState {
    /// Terminal states admit no further mutation.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransportOrderState::Finished
                | TransportOrderState::Failed
                | TransportOrderState::Unroutable
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriveOrderState {
    Pristine,
    Travelling,
    Operating,
    Finished,
    Failed,
}

/// Travel direction of one route step relative to the path's definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOrientation {
    Forward,
    Backward,
}

/// One hop of a route: traverse `path`, arriving at `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub path: TypedRef<Path>,
    pub destination: TypedRef<Point>,
    pub orientation: StepOrientation,
    /// Position of this step in the route, starting at 0 and strictly
    /// increasing.
    pub index: usize,
}

/// A computed route: the steps to drive and the total cost the router
/// assigned to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub steps: Vec<Step>,
    pub cost: i64,
}

impl Route {
    /// The point this route ends at, if it has any steps.
    pub fn final_point(&self) -> Option<&TypedRef<Point>> {
        self.steps.last().map(|step| &step.destination)
    }
}

/// Where a drive order goes and what happens there.
///
/// For `MOVE`/`PARK` operations the location is a dummy reference whose name
/// equals the destination point's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub location: TypedRef<Location>,
    pub operation: String,
}

impl Destination {
    pub fn new(location: TypedRef<Location>, operation: impl Into<String>) -> Self {
        Self {
            location,
            operation: operation.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveOrder {
    pub destination: Destination,
    /// Set by the dispatcher when a vehicle is assigned.
    pub route: Option<Route>,
    pub state: DriveOrderState,
}

impl DriveOrder {
    pub fn new(destination: Destination) -> Self {
        Self {
            destination,
            route: None,
            state: DriveOrderState::Pristine,
        }
    }
}

/// A vehicle's refusal to process an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub vehicle: TypedRef<Vehicle>,
    pub reason: String,
    /// Epoch ms.
    pub timestamp: i64,
}

/// An ordered list of drive orders with a deadline, dependencies and an
/// execution state.
#[derive(Component, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportOrder {
    /// The destinations as originally created. Immutable; the union of past,
    /// current and future drive orders always equals this list.
    pub destinations: Vec<Destination>,
    pub future_drive_orders: Vec<DriveOrder>,
    /// Non-empty exactly while the order is being processed or withdrawn.
    pub current_drive_order: Option<DriveOrder>,
    pub past_drive_orders: Vec<DriveOrder>,
    pub rejections: Vec<Rejection>,
    /// Orders that must be finished before this one may be dispatched.
    pub dependencies: BTreeSet<TypedRef<TransportOrder>>,
    pub wrapping_sequence: Option<TypedRef<OrderSequence>>,
    pub intended_vehicle: Option<TypedRef<Vehicle>>,
    pub processing_vehicle: Option<TypedRef<Vehicle>>,
    pub state: TransportOrderState,
    /// Creation time, epoch ms. Unique and monotonically increasing across
    /// orders.
    pub creation_time: i64,
    /// Deadline, epoch ms. Defaults to the maximum representable instant.
    pub deadline: i64,
    pub finished_time: Option<i64>,
    /// A dispensable order may be silently dropped by the dispatcher.
    pub dispensable: bool,
}

impl TransportOrder {
    pub fn new(destinations: Vec<Destination>, creation_time: i64) -> Self {
        let future_drive_orders = destinations.iter().cloned().map(DriveOrder::new).collect();
        Self {
            destinations,
            future_drive_orders,
            current_drive_order: None,
            past_drive_orders: Vec::new(),
            rejections: Vec::new(),
            dependencies: BTreeSet::new(),
            wrapping_sequence: None,
            intended_vehicle: None,
            processing_vehicle: None,
            state: TransportOrderState::Raw,
            creation_time,
            deadline: i64::MAX,
            finished_time: None,
            dispensable: false,
        }
    }
}
