use bevy_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

use super::{TransportOrder, Vehicle};
use crate::refs::TypedRef;

/// An ordered group of transport orders that one vehicle must process in
/// insertion order.
#[derive(Component, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSequence {
    pub orders: Vec<TypedRef<TransportOrder>>,
    /// Index of the last member that reached `Finished`; -1 initially.
    pub finished_index: i32,
    /// Once set, no further orders may be added. Monotone.
    pub complete: bool,
    /// Set when the sequence is complete and every member is terminal.
    pub finished: bool,
    /// When true, a failed member fails all subsequent members.
    pub failure_fatal: bool,
    pub intended_vehicle: Option<TypedRef<Vehicle>>,
    pub processing_vehicle: Option<TypedRef<Vehicle>>,
}

impl Default for OrderSequence {
    fn default() -> Self {
        Self {
            orders: Vec::new(),
            finished_index: -1,
            complete: false,
            finished: false,
            failure_fatal: false,
            intended_vehicle: None,
            processing_vehicle: None,
        }
    }
}

impl OrderSequence {
    /// The member after the last finished one, i.e. the one a processing
    /// vehicle would work on next.
    pub fn next_unfinished(&self) -> Option<&TypedRef<TransportOrder>> {
        self.orders.get((self.finished_index + 1) as usize)
    }
}
