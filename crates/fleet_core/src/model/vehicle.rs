use bevy_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

use super::{angle_serde, angles_equal, OrderSequence, Point, TransportOrder, Triple};
use crate::refs::TypedRef;

/// What the vehicle is physically doing, as reported by its driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleState {
    Unknown,
    Unavailable,
    Error,
    Idle,
    Executing,
    Charging,
}

/// How the kernel is using the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleProcState {
    /// Not at the dispatcher's disposal.
    Unavailable,
    /// Available for transport orders.
    Idle,
    /// Reserved while a matching order is prepared.
    AwaitingOrder,
    /// Currently processing a transport order.
    ProcessingOrder,
}

/// Lifecycle state of the communication adapter attached to the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommAdapterState {
    Unknown,
    Initialized,
    Enabled,
    Connected,
}

/// One device the vehicle can pick up or set down loads with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadHandlingDevice {
    pub label: String,
    pub full: bool,
}

/// An automated guided vehicle known to the kernel.
#[derive(Component, Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    /// Vehicle length in mm.
    pub length: i64,
    /// Energy level (percent) below which recharging is urgent. Always less
    /// than `energy_level_good`.
    pub energy_level_critical: u32,
    /// Energy level (percent) above which the vehicle can take new orders.
    pub energy_level_good: u32,
    /// Current energy level in percent.
    pub energy_level: u32,
    pub max_velocity: i64,
    pub max_reverse_velocity: i64,
    /// Operation sent to the vehicle to make it recharge.
    pub recharge_operation: String,
    pub state: VehicleState,
    pub proc_state: VehicleProcState,
    pub adapter_state: CommAdapterState,
    pub current_position: Option<TypedRef<Point>>,
    pub next_position: Option<TypedRef<Point>>,
    /// Precise position in mm, when the driver reports one.
    pub precise_position: Option<Triple>,
    /// Orientation in degrees, or NaN when unknown.
    #[serde(with = "angle_serde")]
    pub orientation_angle: f64,
    pub transport_order: Option<TypedRef<TransportOrder>>,
    pub order_sequence: Option<TypedRef<OrderSequence>>,
    /// Index into the current drive order's route the vehicle has committed
    /// to; -1 when it has not started moving.
    pub route_progress_index: i32,
    pub load_handling_devices: Vec<LoadHandlingDevice>,
}

impl Default for Vehicle {
    fn default() -> Self {
        Self {
            length: 1000,
            energy_level_critical: 30,
            energy_level_good: 90,
            energy_level: 100,
            max_velocity: 1000,
            max_reverse_velocity: 1000,
            recharge_operation: "CHARGE".to_string(),
            state: VehicleState::Unknown,
            proc_state: VehicleProcState::Unavailable,
            adapter_state: CommAdapterState::Unknown,
            current_position: None,
            next_position: None,
            precise_position: None,
            orientation_angle: f64::NAN,
            transport_order: None,
            order_sequence: None,
            route_progress_index: -1,
            load_handling_devices: Vec::new(),
        }
    }
}

impl PartialEq for Vehicle {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length
            && self.energy_level_critical == other.energy_level_critical
            && self.energy_level_good == other.energy_level_good
            && self.energy_level == other.energy_level
            && self.max_velocity == other.max_velocity
            && self.max_reverse_velocity == other.max_reverse_velocity
            && self.recharge_operation == other.recharge_operation
            && self.state == other.state
            && self.proc_state == other.proc_state
            && self.adapter_state == other.adapter_state
            && self.current_position == other.current_position
            && self.next_position == other.next_position
            && self.precise_position == other.precise_position
            && angles_equal(self.orientation_angle, other.orientation_angle)
            && self.transport_order == other.transport_order
            && self.order_sequence == other.order_sequence
            && self.route_progress_index == other.route_progress_index
            && self.load_handling_devices == other.load_handling_devices
    }
}
