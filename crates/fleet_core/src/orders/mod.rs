//! The transport-order lifecycle: order and sequence state machines,
//! dependencies and withdrawal.
//!
//! Orders live in the object pool like every other entity; this service owns
//! the transition rules and the bookkeeping that spans entities (dependency
//! re-checks, sequence advancement, the withdrawal ledger). Terminal orders
//! are immutable: every mutating operation checks the state first and fails
//! with an illegal-state error.

mod dispatch;

pub use dispatch::{age_order, priority_order};

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::error::{KernelError, Result};
use crate::facade::Model;
use crate::model::{
    Destination, DriveOrder, DriveOrderState, OrderSequence, Point, Rejection, TransportOrder,
    TransportOrderState, Vehicle, VehicleProcState, OP_MOVE, OP_PARK,
};
use crate::refs::{ObjectId, TypedRef};

pub(crate) const NAME_SUFFIX_DIGITS: usize = crate::facade::NAME_SUFFIX_DIGITS;

/// Epoch ms from the system clock.
pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Owns the order/sequence state machines. All entity state lives in the
/// pool; the service only keeps the order clock and the withdrawal ledger.
#[derive(Default)]
pub struct OrderService {
    /// Creation timestamp of the most recently created order, for the
    /// unique-and-monotone guarantee.
    last_creation_time: i64,
    /// (vehicle id, order id) pairs with a pending graceful withdrawal. A
    /// second withdrawal for the same pair aborts immediately.
    withdrawals: HashSet<(ObjectId, ObjectId)>,
}

impl OrderService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unique, monotonically increasing creation timestamps even when the
    /// wall clock does not advance between two creations.
    fn next_creation_time(&mut self) -> i64 {
        let t = now_ms().max(self.last_creation_time + 1);
        self.last_creation_time = t;
        t
    }

    // -----------------------------------------------------------------------
    // Creation and setup (Raw/Active)
    // -----------------------------------------------------------------------

    pub fn create_transport_order(
        &mut self,
        model: &mut Model,
        destinations: Vec<Destination>,
    ) -> Result<TypedRef<TransportOrder>> {
        if destinations.is_empty() {
            return Err(KernelError::IllegalArgument(
                "a transport order needs at least one destination".to_string(),
            ));
        }
        for destination in &destinations {
            self.validate_destination(model, destination)?;
        }

        let creation_time = self.next_creation_time();
        let name = model
            .pool()
            .unique_name(crate::facade::NAME_PREFIX_TRANSPORT_ORDER, NAME_SUFFIX_DIGITS);
        model
            .pool_mut()
            .create(name, TransportOrder::new(destinations, creation_time))
    }

    /// A destination must name an existing location, or, for `MOVE`/`PARK`,
    /// an existing point of the same name (dummy location).
    fn validate_destination(&self, model: &Model, destination: &Destination) -> Result<()> {
        let operation = destination.operation.as_str();
        if operation == OP_MOVE || operation == OP_PARK {
            if model
                .pool()
                .ref_by_name::<Point>(&destination.location.name)
                .is_some()
            {
                return Ok(());
            }
            return Err(KernelError::ObjectUnknown(destination.location.name.clone()));
        }
        if model.pool().get(&destination.location).is_none() {
            return Err(KernelError::ObjectUnknown(destination.location.name.clone()));
        }
        Ok(())
    }

    pub fn set_transport_order_deadline(
        &mut self,
        model: &mut Model,
        order: &TypedRef<TransportOrder>,
        deadline: i64,
    ) -> Result<()> {
        self.require_not_terminal(model, order)?;
        model
            .pool_mut()
            .modify(order, |o| o.deadline = deadline)
    }

    pub fn set_transport_order_intended_vehicle(
        &mut self,
        model: &mut Model,
        order: &TypedRef<TransportOrder>,
        vehicle: Option<&TypedRef<Vehicle>>,
    ) -> Result<()> {
        self.require_not_terminal(model, order)?;
        if let Some(vehicle) = vehicle {
            model.require(vehicle)?;
        }
        let vehicle = vehicle.cloned();
        model
            .pool_mut()
            .modify(order, move |o| o.intended_vehicle = vehicle)
    }

    pub fn set_transport_order_dispensable(
        &mut self,
        model: &mut Model,
        order: &TypedRef<TransportOrder>,
        dispensable: bool,
    ) -> Result<()> {
        self.require_not_terminal(model, order)?;
        model
            .pool_mut()
            .modify(order, |o| o.dispensable = dispensable)
    }

    /// Dependencies may only be edited while the order is Raw or Active.
    pub fn add_transport_order_dependency(
        &mut self,
        model: &mut Model,
        order: &TypedRef<TransportOrder>,
        dependency: &TypedRef<TransportOrder>,
    ) -> Result<()> {
        self.require_editable_dependencies(model, order)?;
        model.require(dependency)?;
        if dependency.id == order.id {
            return Err(KernelError::IllegalArgument(format!(
                "order {order} cannot depend on itself"
            )));
        }
        let dependency = dependency.clone();
        model.pool_mut().modify(order, move |o| {
            o.dependencies.insert(dependency);
        })
    }

    pub fn remove_transport_order_dependency(
        &mut self,
        model: &mut Model,
        order: &TypedRef<TransportOrder>,
        dependency: &TypedRef<TransportOrder>,
    ) -> Result<()> {
        self.require_editable_dependencies(model, order)?;
        let dependency_id = dependency.id;
        model.pool_mut().modify(order, move |o| {
            o.dependencies.retain(|d| d.id != dependency_id);
        })?;
        self.maybe_dispatchable(model, order)
    }

    /// The future drive orders may be replaced while the order is not
    /// terminal, but only with a list of equal length and pointwise-equal
    /// destinations; only routes and drive-order states are taken over.
    pub fn set_transport_order_future_drive_orders(
        &mut self,
        model: &mut Model,
        order: &TypedRef<TransportOrder>,
        new_orders: Vec<DriveOrder>,
    ) -> Result<()> {
        let data = self.require_not_terminal(model, order)?;
        if new_orders.len() != data.future_drive_orders.len() {
            return Err(KernelError::IllegalArgument(format!(
                "expected {} future drive orders, got {}",
                data.future_drive_orders.len(),
                new_orders.len()
            )));
        }
        for (current, replacement) in data.future_drive_orders.iter().zip(&new_orders) {
            if current.destination != replacement.destination {
                return Err(KernelError::IllegalArgument(format!(
                    "destination mismatch: {} vs {}",
                    current.destination.location, replacement.destination.location
                )));
            }
        }
        model
            .pool_mut()
            .modify(order, move |o| o.future_drive_orders = new_orders)
    }

    pub fn add_transport_order_rejection(
        &mut self,
        model: &mut Model,
        order: &TypedRef<TransportOrder>,
        vehicle: &TypedRef<Vehicle>,
        reason: impl Into<String>,
    ) -> Result<()> {
        self.require_not_terminal(model, order)?;
        model.require(vehicle)?;
        let rejection = Rejection {
            vehicle: vehicle.clone(),
            reason: reason.into(),
            timestamp: now_ms(),
        };
        model.pool_mut().modify(order, move |o| {
            o.rejections.push(rejection);
        })
    }

    // -----------------------------------------------------------------------
    // Activation
    // -----------------------------------------------------------------------

    /// Finalises the order's parameters. For sequence members, activation is
    /// only allowed in insertion order and never once the sequence is
    /// complete.
    pub fn activate_transport_order(
        &mut self,
        model: &mut Model,
        order: &TypedRef<TransportOrder>,
    ) -> Result<()> {
        let data = model.require(order)?;
        if data.state != TransportOrderState::Raw {
            return Err(KernelError::IllegalState(format!(
                "order {order} has already been activated"
            )));
        }

        if let Some(sequence_ref) = &data.wrapping_sequence {
            let sequence = model.require(sequence_ref)?;
            if sequence.complete {
                return Err(KernelError::IllegalState(format!(
                    "sequence {sequence_ref} is already complete"
                )));
            }
            let next_pending = sequence.orders.iter().find(|member| {
                model
                    .pool()
                    .get(*member)
                    .is_some_and(|o| o.state == TransportOrderState::Raw)
            });
            if next_pending.map(|member| member.id) != Some(order.id) {
                return Err(KernelError::IllegalArgument(format!(
                    "order {order} is not the sequence's next pending member"
                )));
            }
        }

        model
            .pool_mut()
            .modify(order, |o| o.state = TransportOrderState::Active)?;
        self.maybe_dispatchable(model, order)
    }

    /// Active → Dispatchable once every dependency is finished and, for
    /// sequence members, all predecessors in the sequence are finished.
    fn maybe_dispatchable(
        &mut self,
        model: &mut Model,
        order: &TypedRef<TransportOrder>,
    ) -> Result<()> {
        let Some(data) = model.pool().get(order).cloned() else {
            return Ok(());
        };
        if data.state != TransportOrderState::Active {
            return Ok(());
        }

        for dependency in &data.dependencies {
            // A dependency that no longer resolves counts as fulfilled.
            let Some(dependency_data) = model.pool().get(dependency) else {
                continue;
            };
            match dependency_data.state {
                TransportOrderState::Finished => {}
                TransportOrderState::Failed | TransportOrderState::Unroutable => {
                    warn!(order = %order.name, dependency = %dependency.name, "dependency failed");
                    return self.fail_order(model, order);
                }
                _ => return Ok(()),
            }
        }

        if let Some(sequence_ref) = &data.wrapping_sequence {
            let sequence = model.require(sequence_ref)?;
            let is_next = sequence
                .next_unfinished()
                .is_some_and(|member| member.id == order.id);
            if !is_next {
                return Ok(());
            }
        }

        model
            .pool_mut()
            .modify(order, |o| o.state = TransportOrderState::Dispatchable)
    }

    // -----------------------------------------------------------------------
    // Processing
    // -----------------------------------------------------------------------

    /// Marks the current drive order finished and advances to the next one;
    /// finishing the last drive order finishes the whole order and releases
    /// the vehicle.
    pub fn set_transport_order_next_drive_order(
        &mut self,
        model: &mut Model,
        order: &TypedRef<TransportOrder>,
    ) -> Result<()> {
        let data = model.require(order)?;
        if data.state != TransportOrderState::BeingProcessed {
            return Err(KernelError::IllegalState(format!(
                "order {order} is not being processed"
            )));
        }
        if data.current_drive_order.is_none() {
            return Err(KernelError::IllegalState(format!(
                "order {order} has no current drive order"
            )));
        }

        let finished_time = now_ms();
        let finished = model.pool_mut().modify(order, move |o| {
            if let Some(mut current) = o.current_drive_order.take() {
                current.state = DriveOrderState::Finished;
                o.past_drive_orders.push(current);
            }
            if o.future_drive_orders.is_empty() {
                o.state = TransportOrderState::Finished;
                o.finished_time = Some(finished_time);
                true
            } else {
                let mut next = o.future_drive_orders.remove(0);
                next.state = DriveOrderState::Travelling;
                o.current_drive_order = Some(next);
                false
            }
        })?;

        if let Some(vehicle) = data.processing_vehicle.clone() {
            if finished {
                debug!(order = %order.name, vehicle = %vehicle.name, "transport order finished");
                self.release_vehicle(model, &vehicle, VehicleProcState::Idle)?;
            } else if model.pool().get(&vehicle).is_some() {
                model.set_vehicle_route_progress_index(&vehicle, -1)?;
            }
        }
        if finished {
            self.on_order_terminal(model, order)?;
        }
        Ok(())
    }

    /// Updates the current drive order's state. A failed drive order fails
    /// the whole transport order.
    pub fn set_current_drive_order_state(
        &mut self,
        model: &mut Model,
        order: &TypedRef<TransportOrder>,
        state: DriveOrderState,
    ) -> Result<()> {
        let data = model.require(order)?;
        if !matches!(
            data.state,
            TransportOrderState::BeingProcessed | TransportOrderState::Withdrawn
        ) {
            return Err(KernelError::IllegalState(format!(
                "order {order} has no active drive order"
            )));
        }
        if data.current_drive_order.is_none() {
            return Err(KernelError::IllegalState(format!(
                "order {order} has no current drive order"
            )));
        }

        model.pool_mut().modify(order, move |o| {
            if let Some(current) = o.current_drive_order.as_mut() {
                current.state = state;
            }
        })?;

        if state == DriveOrderState::Failed {
            self.fail_order(model, order)?;
        }
        Ok(())
    }

    /// Any non-terminal order can be failed, e.g. on an unrecoverable driver
    /// error. Releases the processing vehicle if one is attached.
    pub fn fail_order(
        &mut self,
        model: &mut Model,
        order: &TypedRef<TransportOrder>,
    ) -> Result<()> {
        let data = model.require(order)?;
        if data.state.is_terminal() {
            return Ok(());
        }

        let finished_time = now_ms();
        model.pool_mut().modify(order, move |o| {
            if let Some(mut current) = o.current_drive_order.take() {
                current.state = DriveOrderState::Failed;
                o.past_drive_orders.push(current);
            }
            o.state = TransportOrderState::Failed;
            o.finished_time = Some(finished_time);
        })?;

        if let Some(vehicle) = data.processing_vehicle.clone() {
            self.withdrawals.remove(&(vehicle.id, order.id));
            self.release_vehicle(model, &vehicle, VehicleProcState::Idle)?;
        }
        self.on_order_terminal(model, order)
    }

    // -----------------------------------------------------------------------
    // Withdrawal
    // -----------------------------------------------------------------------

    /// Withdraws an order. The first call on a processed order is graceful:
    /// the order goes to Withdrawn and the vehicle finishes its committed
    /// movements. A second call for the same (vehicle, order) pair aborts
    /// immediately. Withdrawing an order that no vehicle is processing fails
    /// it directly.
    pub fn withdraw_transport_order(
        &mut self,
        model: &mut Model,
        order: &TypedRef<TransportOrder>,
        disable_vehicle: bool,
    ) -> Result<()> {
        let data = model.require(order)?;
        match data.state {
            state if state.is_terminal() => Err(KernelError::IllegalState(format!(
                "order {order} is already in terminal state {state:?}"
            ))),
            TransportOrderState::BeingProcessed | TransportOrderState::Withdrawn => {
                let vehicle = data.processing_vehicle.clone().ok_or_else(|| {
                    KernelError::IllegalState(format!(
                        "order {order} is processed but has no vehicle"
                    ))
                })?;
                let key = (vehicle.id, order.id);
                let second_call =
                    data.state == TransportOrderState::Withdrawn || self.withdrawals.contains(&key);

                if second_call {
                    debug!(order = %order.name, vehicle = %vehicle.name, "aborting withdrawn order");
                    self.withdrawals.remove(&key);
                    let finished_time = now_ms();
                    model.pool_mut().modify(order, move |o| {
                        if let Some(mut current) = o.current_drive_order.take() {
                            current.state = DriveOrderState::Failed;
                            o.past_drive_orders.push(current);
                        }
                        o.state = TransportOrderState::Failed;
                        o.finished_time = Some(finished_time);
                    })?;
                    let proc_state = if disable_vehicle {
                        VehicleProcState::Unavailable
                    } else {
                        VehicleProcState::Idle
                    };
                    self.release_vehicle(model, &vehicle, proc_state)?;
                    self.on_order_terminal(model, order)
                } else {
                    debug!(order = %order.name, vehicle = %vehicle.name, "withdrawing order");
                    self.withdrawals.insert(key);
                    model
                        .pool_mut()
                        .modify(order, |o| o.state = TransportOrderState::Withdrawn)?;
                    if disable_vehicle {
                        model.set_vehicle_proc_state(&vehicle, VehicleProcState::Unavailable)?;
                    }
                    Ok(())
                }
            }
            // Not yet assigned to a vehicle: nothing to clean up.
            _ => self.fail_order(model, order),
        }
    }

    /// Withdraws whatever order the vehicle is currently processing.
    pub fn withdraw_transport_order_by_vehicle(
        &mut self,
        model: &mut Model,
        vehicle: &TypedRef<Vehicle>,
        disable_vehicle: bool,
    ) -> Result<()> {
        let data = model.require(vehicle)?;
        let order = data.transport_order.ok_or_else(|| {
            KernelError::IllegalArgument(format!(
                "vehicle {vehicle} is not processing a transport order"
            ))
        })?;
        self.withdraw_transport_order(model, &order, disable_vehicle)
    }

    /// Hook for driver-side proc-state changes: a vehicle leaving
    /// `ProcessingOrder` while its order is withdrawn completes the
    /// withdrawal (order → Failed).
    pub fn set_vehicle_proc_state(
        &mut self,
        model: &mut Model,
        vehicle: &TypedRef<Vehicle>,
        proc_state: VehicleProcState,
    ) -> Result<()> {
        let data = model.require(vehicle)?;
        let leaving_processing = data.proc_state == VehicleProcState::ProcessingOrder
            && proc_state != VehicleProcState::ProcessingOrder;
        model.set_vehicle_proc_state(vehicle, proc_state)?;

        if leaving_processing {
            if let Some(order) = data.transport_order.clone() {
                let withdrawn = model
                    .pool()
                    .get(&order)
                    .is_some_and(|o| o.state == TransportOrderState::Withdrawn);
                if withdrawn {
                    debug!(order = %order.name, vehicle = %vehicle.name, "vehicle stopped, completing withdrawal");
                    self.withdrawals.remove(&(vehicle.id, order.id));
                    let finished_time = now_ms();
                    model.pool_mut().modify(&order, move |o| {
                        if let Some(mut current) = o.current_drive_order.take() {
                            current.state = DriveOrderState::Failed;
                            o.past_drive_orders.push(current);
                        }
                        o.state = TransportOrderState::Failed;
                        o.finished_time = Some(finished_time);
                    })?;
                    model.set_vehicle_transport_order(vehicle, None)?;
                    model.set_vehicle_route_progress_index(vehicle, -1)?;
                    self.on_order_terminal(model, &order)?;
                }
            }
        }
        Ok(())
    }

    /// Unlinks the vehicle from its order after a terminal transition.
    fn release_vehicle(
        &mut self,
        model: &mut Model,
        vehicle: &TypedRef<Vehicle>,
        proc_state: VehicleProcState,
    ) -> Result<()> {
        if model.pool().get(vehicle).is_none() {
            return Ok(());
        }
        model.set_vehicle_transport_order(vehicle, None)?;
        model.set_vehicle_proc_state(vehicle, proc_state)?;
        model.set_vehicle_route_progress_index(vehicle, -1)
    }

    // -----------------------------------------------------------------------
    // Terminal bookkeeping
    // -----------------------------------------------------------------------

    /// Runs after an order reaches a terminal state: advances its sequence,
    /// cascades fatal failures, and re-checks dependent orders.
    fn on_order_terminal(
        &mut self,
        model: &mut Model,
        order: &TypedRef<TransportOrder>,
    ) -> Result<()> {
        let data = model.require(order)?;

        if let Some(sequence_ref) = data.wrapping_sequence.clone() {
            if data.state == TransportOrderState::Finished {
                self.advance_sequence_finished_index(model, &sequence_ref)?;
            }
            if data.state == TransportOrderState::Failed {
                let sequence = model.require(&sequence_ref)?;
                if sequence.failure_fatal {
                    self.fail_subsequent_members(model, &sequence_ref, order.id)?;
                }
            }
            self.maybe_finish_sequence(model, &sequence_ref)?;

            // The next member may have been waiting on this one.
            let sequence = model.require(&sequence_ref)?;
            if let Some(next) = sequence.next_unfinished().cloned() {
                self.maybe_dispatchable(model, &next)?;
            }
        }

        self.check_dependents(model, order, data.state)
    }

    fn advance_sequence_finished_index(
        &mut self,
        model: &mut Model,
        sequence: &TypedRef<OrderSequence>,
    ) -> Result<()> {
        let data = model.require(sequence)?;
        let mut finished_index = data.finished_index;
        while let Some(member) = data.orders.get((finished_index + 1) as usize) {
            let finished = model
                .pool()
                .get(member)
                .is_some_and(|o| o.state == TransportOrderState::Finished);
            if finished {
                finished_index += 1;
            } else {
                break;
            }
        }
        if finished_index != data.finished_index {
            model
                .pool_mut()
                .modify(sequence, move |s| s.finished_index = finished_index)?;
        }
        Ok(())
    }

    /// With failure-fatal set, every member after the failed one is failed
    /// without ever being dispatched.
    fn fail_subsequent_members(
        &mut self,
        model: &mut Model,
        sequence: &TypedRef<OrderSequence>,
        failed_member: ObjectId,
    ) -> Result<()> {
        let data = model.require(sequence)?;
        let position = data.orders.iter().position(|m| m.id == failed_member);
        let Some(position) = position else {
            return Ok(());
        };
        for member in data.orders.iter().skip(position + 1) {
            let terminal = model
                .pool()
                .get(member)
                .map_or(true, |o| o.state.is_terminal());
            if !terminal {
                self.fail_order(model, member)?;
            }
        }
        Ok(())
    }

    /// A sequence is finished once it is complete and every member is
    /// terminal; the processing vehicle is then released from it.
    fn maybe_finish_sequence(
        &mut self,
        model: &mut Model,
        sequence: &TypedRef<OrderSequence>,
    ) -> Result<()> {
        let data = model.require(sequence)?;
        if data.finished || !data.complete {
            return Ok(());
        }
        let all_terminal = data.orders.iter().all(|member| {
            model
                .pool()
                .get(member)
                .map_or(true, |o| o.state.is_terminal())
        });
        if !all_terminal {
            return Ok(());
        }

        model.pool_mut().modify(sequence, |s| s.finished = true)?;
        if let Some(vehicle) = data.processing_vehicle {
            if model.pool().get(&vehicle).is_some() {
                model.set_vehicle_order_sequence(&vehicle, None)?;
            }
        }
        Ok(())
    }

    /// Orders depending on `order` become dispatchable (dependency finished)
    /// or fail (dependency failed).
    fn check_dependents(
        &mut self,
        model: &mut Model,
        order: &TypedRef<TransportOrder>,
        state: TransportOrderState,
    ) -> Result<()> {
        let dependents: Vec<TypedRef<TransportOrder>> = model
            .pool()
            .objects_of_kind::<TransportOrder>()
            .into_iter()
            .filter(|(_, o)| o.dependencies.iter().any(|d| d.id == order.id))
            .map(|(meta, _)| TypedRef::new(meta.id, meta.name.clone()))
            .collect();

        for dependent in dependents {
            match state {
                TransportOrderState::Finished => self.maybe_dispatchable(model, &dependent)?,
                TransportOrderState::Failed | TransportOrderState::Unroutable => {
                    self.fail_order(model, &dependent)?
                }
                _ => {}
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Order sequences
    // -----------------------------------------------------------------------

    pub fn create_order_sequence(
        &mut self,
        model: &mut Model,
    ) -> Result<TypedRef<OrderSequence>> {
        let name = model
            .pool()
            .unique_name(crate::facade::NAME_PREFIX_ORDER_SEQUENCE, NAME_SUFFIX_DIGITS);
        model.pool_mut().create(name, OrderSequence::default())
    }

    /// Orders can only be appended while the sequence is incomplete, and only
    /// while they are Raw and not yet part of any sequence.
    pub fn add_order_sequence_order(
        &mut self,
        model: &mut Model,
        sequence: &TypedRef<OrderSequence>,
        order: &TypedRef<TransportOrder>,
    ) -> Result<()> {
        let sequence_data = model.require(sequence)?;
        if sequence_data.complete {
            return Err(KernelError::IllegalState(format!(
                "sequence {sequence} is already complete"
            )));
        }
        let order_data = model.require(order)?;
        if order_data.state != TransportOrderState::Raw {
            return Err(KernelError::IllegalArgument(format!(
                "order {order} has already been activated"
            )));
        }
        if order_data.wrapping_sequence.is_some() {
            return Err(KernelError::IllegalArgument(format!(
                "order {order} already belongs to a sequence"
            )));
        }

        let order_ref = order.clone();
        model.pool_mut().modify(sequence, move |s| {
            s.orders.push(order_ref);
        })?;
        let sequence_ref = sequence.clone();
        model.pool_mut().modify(order, move |o| {
            o.wrapping_sequence = Some(sequence_ref);
        })
    }

    pub fn remove_order_sequence_order(
        &mut self,
        model: &mut Model,
        sequence: &TypedRef<OrderSequence>,
        order: &TypedRef<TransportOrder>,
    ) -> Result<()> {
        let sequence_data = model.require(sequence)?;
        if !sequence_data.orders.iter().any(|m| m.id == order.id) {
            return Err(KernelError::IllegalArgument(format!(
                "order {order} is not a member of sequence {sequence}"
            )));
        }
        let order_data = model.require(order)?;
        if order_data.state.is_terminal()
            || matches!(
                order_data.state,
                TransportOrderState::BeingProcessed | TransportOrderState::Withdrawn
            )
        {
            return Err(KernelError::IllegalState(format!(
                "order {order} can no longer be removed from its sequence"
            )));
        }

        let order_id = order.id;
        model.pool_mut().modify(sequence, move |s| {
            s.orders.retain(|m| m.id != order_id);
        })?;
        model
            .pool_mut()
            .modify(order, |o| o.wrapping_sequence = None)
    }

    /// Completing a sequence is monotone and idempotent.
    pub fn set_order_sequence_complete(
        &mut self,
        model: &mut Model,
        sequence: &TypedRef<OrderSequence>,
    ) -> Result<()> {
        model.require(sequence)?;
        model.pool_mut().modify(sequence, |s| s.complete = true)?;
        self.maybe_finish_sequence(model, sequence)
    }

    pub fn set_order_sequence_failure_fatal(
        &mut self,
        model: &mut Model,
        sequence: &TypedRef<OrderSequence>,
        failure_fatal: bool,
    ) -> Result<()> {
        let data = model.require(sequence)?;
        if data.finished {
            return Err(KernelError::IllegalState(format!(
                "sequence {sequence} is already finished"
            )));
        }
        model
            .pool_mut()
            .modify(sequence, |s| s.failure_fatal = failure_fatal)
    }

    pub fn set_order_sequence_intended_vehicle(
        &mut self,
        model: &mut Model,
        sequence: &TypedRef<OrderSequence>,
        vehicle: Option<&TypedRef<Vehicle>>,
    ) -> Result<()> {
        let data = model.require(sequence)?;
        if data.finished {
            return Err(KernelError::IllegalState(format!(
                "sequence {sequence} is already finished"
            )));
        }
        if let Some(vehicle) = vehicle {
            model.require(vehicle)?;
        }
        let vehicle = vehicle.cloned();
        model
            .pool_mut()
            .modify(sequence, move |s| s.intended_vehicle = vehicle)
    }

    // -----------------------------------------------------------------------
    // Shared checks
    // -----------------------------------------------------------------------

    fn require_not_terminal(
        &self,
        model: &Model,
        order: &TypedRef<TransportOrder>,
    ) -> Result<TransportOrder> {
        let data = model.require(order)?;
        if data.state.is_terminal() {
            return Err(KernelError::IllegalState(format!(
                "order {order} is in terminal state {:?}",
                data.state
            )));
        }
        Ok(data)
    }

    fn require_editable_dependencies(
        &self,
        model: &Model,
        order: &TypedRef<TransportOrder>,
    ) -> Result<TransportOrder> {
        let data = model.require(order)?;
        if !matches!(
            data.state,
            TransportOrderState::Raw | TransportOrderState::Active
        ) {
            return Err(KernelError::IllegalState(format!(
                "dependencies of order {order} can only change while it is raw or active"
            )));
        }
        Ok(data)
    }
}
