//! Facade operations on vehicles.
//!
//! The occupying-vehicle relation between a vehicle and its current point is
//! kept consistent here: the old point is cleared before the new point is
//! set, and the vehicle itself is updated last, as one uninterrupted event
//! sequence.

use super::{Model, NAME_PREFIX_VEHICLE, NAME_SUFFIX_DIGITS};
use crate::error::{KernelError, Result};
use crate::model::{
    CommAdapterState, LoadHandlingDevice, OrderSequence, Point, TransportOrder, Triple, Vehicle,
    VehicleProcState, VehicleState,
};
use crate::refs::TypedRef;

impl Model {
    pub fn create_vehicle(&mut self) -> Result<TypedRef<Vehicle>> {
        let name = self
            .pool()
            .unique_name(NAME_PREFIX_VEHICLE, NAME_SUFFIX_DIGITS);
        self.pool_mut().create(name, Vehicle::default())
    }

    /// A vehicle that is processing an order cannot be removed.
    pub fn remove_vehicle(&mut self, vehicle: &TypedRef<Vehicle>) -> Result<()> {
        let data = self.require(vehicle)?;
        if data.proc_state == VehicleProcState::ProcessingOrder {
            return Err(KernelError::IllegalState(format!(
                "vehicle {vehicle} is still processing an order"
            )));
        }
        if data.current_position.is_some() {
            self.set_vehicle_position(vehicle, None)?;
        }
        self.pool_mut().remove(vehicle.id)?;
        Ok(())
    }

    pub fn set_vehicle_length(&mut self, vehicle: &TypedRef<Vehicle>, length: i64) -> Result<()> {
        if length <= 0 {
            return Err(KernelError::IllegalArgument(format!(
                "vehicle length {length} must be > 0"
            )));
        }
        self.require(vehicle)?;
        self.pool_mut().modify(vehicle, |v| v.length = length)
    }

    pub fn set_vehicle_energy_level(
        &mut self,
        vehicle: &TypedRef<Vehicle>,
        level: u32,
    ) -> Result<()> {
        if level > 100 {
            return Err(KernelError::IllegalArgument(format!(
                "energy level {level} outside 0..=100"
            )));
        }
        self.require(vehicle)?;
        self.pool_mut().modify(vehicle, |v| v.energy_level = level)
    }

    /// The critical threshold must stay below the good threshold.
    pub fn set_vehicle_energy_level_critical(
        &mut self,
        vehicle: &TypedRef<Vehicle>,
        level: u32,
    ) -> Result<()> {
        let data = self.require(vehicle)?;
        if level > 100 || level >= data.energy_level_good {
            return Err(KernelError::IllegalArgument(format!(
                "critical energy level {level} must be in 0..=100 and below the good level {}",
                data.energy_level_good
            )));
        }
        self.pool_mut()
            .modify(vehicle, |v| v.energy_level_critical = level)
    }

    pub fn set_vehicle_energy_level_good(
        &mut self,
        vehicle: &TypedRef<Vehicle>,
        level: u32,
    ) -> Result<()> {
        let data = self.require(vehicle)?;
        if level > 100 || level <= data.energy_level_critical {
            return Err(KernelError::IllegalArgument(format!(
                "good energy level {level} must be in 0..=100 and above the critical level {}",
                data.energy_level_critical
            )));
        }
        self.pool_mut()
            .modify(vehicle, |v| v.energy_level_good = level)
    }

    pub fn set_vehicle_max_velocity(
        &mut self,
        vehicle: &TypedRef<Vehicle>,
        velocity: i64,
    ) -> Result<()> {
        if velocity < 0 {
            return Err(KernelError::IllegalArgument(format!(
                "vehicle max velocity {velocity} must be >= 0"
            )));
        }
        self.require(vehicle)?;
        self.pool_mut().modify(vehicle, |v| v.max_velocity = velocity)
    }

    pub fn set_vehicle_max_reverse_velocity(
        &mut self,
        vehicle: &TypedRef<Vehicle>,
        velocity: i64,
    ) -> Result<()> {
        if velocity < 0 {
            return Err(KernelError::IllegalArgument(format!(
                "vehicle max reverse velocity {velocity} must be >= 0"
            )));
        }
        self.require(vehicle)?;
        self.pool_mut()
            .modify(vehicle, |v| v.max_reverse_velocity = velocity)
    }

    pub fn set_vehicle_recharge_operation(
        &mut self,
        vehicle: &TypedRef<Vehicle>,
        operation: &str,
    ) -> Result<()> {
        self.require(vehicle)?;
        let operation = operation.to_string();
        self.pool_mut()
            .modify(vehicle, move |v| v.recharge_operation = operation)
    }

    pub fn set_vehicle_state(
        &mut self,
        vehicle: &TypedRef<Vehicle>,
        state: VehicleState,
    ) -> Result<()> {
        self.require(vehicle)?;
        self.pool_mut().modify(vehicle, |v| v.state = state)
    }

    pub fn set_vehicle_proc_state(
        &mut self,
        vehicle: &TypedRef<Vehicle>,
        proc_state: VehicleProcState,
    ) -> Result<()> {
        self.require(vehicle)?;
        self.pool_mut()
            .modify(vehicle, |v| v.proc_state = proc_state)
    }

    pub fn set_vehicle_adapter_state(
        &mut self,
        vehicle: &TypedRef<Vehicle>,
        adapter_state: CommAdapterState,
    ) -> Result<()> {
        self.require(vehicle)?;
        self.pool_mut()
            .modify(vehicle, |v| v.adapter_state = adapter_state)
    }

    /// Moves the vehicle to `point` (or off the course with `None`).
    ///
    /// Event sequence: the old point's occupier is cleared, then the new
    /// point's occupier is set, then the vehicle's position is updated.
    pub fn set_vehicle_position(
        &mut self,
        vehicle: &TypedRef<Vehicle>,
        point: Option<&TypedRef<Point>>,
    ) -> Result<()> {
        let data = self.require(vehicle)?;
        if let Some(point) = point {
            self.require(point)?;
        }

        if let Some(old) = data.current_position {
            if self.pool().get(&old).is_some() {
                self.pool_mut().modify(&old, |p| p.occupying_vehicle = None)?;
            }
        }
        if let Some(new) = point {
            let occupier = vehicle.clone();
            self.pool_mut()
                .modify(new, move |p| p.occupying_vehicle = Some(occupier))?;
        }
        let new_position = point.cloned();
        self.pool_mut()
            .modify(vehicle, move |v| v.current_position = new_position)
    }

    pub fn set_vehicle_next_position(
        &mut self,
        vehicle: &TypedRef<Vehicle>,
        point: Option<&TypedRef<Point>>,
    ) -> Result<()> {
        self.require(vehicle)?;
        if let Some(point) = point {
            self.require(point)?;
        }
        let point = point.cloned();
        self.pool_mut()
            .modify(vehicle, move |v| v.next_position = point)
    }

    pub fn set_vehicle_precise_position(
        &mut self,
        vehicle: &TypedRef<Vehicle>,
        position: Option<Triple>,
    ) -> Result<()> {
        self.require(vehicle)?;
        self.pool_mut()
            .modify(vehicle, move |v| v.precise_position = position)
    }

    pub fn set_vehicle_orientation_angle(
        &mut self,
        vehicle: &TypedRef<Vehicle>,
        angle: f64,
    ) -> Result<()> {
        if !angle.is_nan() && !(-360.0..=360.0).contains(&angle) {
            return Err(KernelError::IllegalArgument(format!(
                "orientation angle {angle} outside [-360, 360]"
            )));
        }
        self.require(vehicle)?;
        self.pool_mut()
            .modify(vehicle, |v| v.orientation_angle = angle)
    }

    pub fn set_vehicle_transport_order(
        &mut self,
        vehicle: &TypedRef<Vehicle>,
        order: Option<&TypedRef<TransportOrder>>,
    ) -> Result<()> {
        self.require(vehicle)?;
        if let Some(order) = order {
            self.require(order)?;
        }
        let order = order.cloned();
        self.pool_mut()
            .modify(vehicle, move |v| v.transport_order = order)
    }

    pub fn set_vehicle_order_sequence(
        &mut self,
        vehicle: &TypedRef<Vehicle>,
        sequence: Option<&TypedRef<OrderSequence>>,
    ) -> Result<()> {
        self.require(vehicle)?;
        if let Some(sequence) = sequence {
            self.require(sequence)?;
        }
        let sequence = sequence.cloned();
        self.pool_mut()
            .modify(vehicle, move |v| v.order_sequence = sequence)
    }

    pub fn set_vehicle_route_progress_index(
        &mut self,
        vehicle: &TypedRef<Vehicle>,
        index: i32,
    ) -> Result<()> {
        self.require(vehicle)?;
        self.pool_mut()
            .modify(vehicle, |v| v.route_progress_index = index)
    }

    pub fn set_vehicle_load_handling_devices(
        &mut self,
        vehicle: &TypedRef<Vehicle>,
        devices: Vec<LoadHandlingDevice>,
    ) -> Result<()> {
        self.require(vehicle)?;
        self.pool_mut()
            .modify(vehicle, move |v| v.load_handling_devices = devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;

    fn model() -> Model {
        Model::new(EventBus::new())
    }

    #[test]
    fn position_change_moves_the_occupier() {
        let mut model = model();
        let vehicle = model.create_vehicle().expect("vehicle");
        let a = model.create_point().expect("point");
        let b = model.create_point().expect("point");

        model.set_vehicle_position(&vehicle, Some(&a)).expect("move");
        assert_eq!(
            model.pool().get(&a).expect("a").occupying_vehicle,
            Some(vehicle.clone())
        );

        model.set_vehicle_position(&vehicle, Some(&b)).expect("move");
        assert!(model.pool().get(&a).expect("a").occupying_vehicle.is_none());
        assert_eq!(
            model.pool().get(&b).expect("b").occupying_vehicle,
            Some(vehicle.clone())
        );

        model.set_vehicle_position(&vehicle, None).expect("move");
        assert!(model.pool().get(&b).expect("b").occupying_vehicle.is_none());
        assert!(model
            .pool()
            .get(&vehicle)
            .expect("vehicle")
            .current_position
            .is_none());
    }

    #[test]
    fn energy_thresholds_keep_their_ordering() {
        let mut model = model();
        let vehicle = model.create_vehicle().expect("vehicle");

        // Defaults: critical 30, good 90.
        assert!(matches!(
            model.set_vehicle_energy_level_critical(&vehicle, 95),
            Err(KernelError::IllegalArgument(_))
        ));
        assert!(matches!(
            model.set_vehicle_energy_level_good(&vehicle, 20),
            Err(KernelError::IllegalArgument(_))
        ));

        model
            .set_vehicle_energy_level_critical(&vehicle, 10)
            .expect("critical");
        model
            .set_vehicle_energy_level_good(&vehicle, 50)
            .expect("good");
        let data = model.pool().get(&vehicle).expect("vehicle");
        assert_eq!(data.energy_level_critical, 10);
        assert_eq!(data.energy_level_good, 50);
    }

    #[test]
    fn processing_vehicle_cannot_be_removed() {
        let mut model = model();
        let vehicle = model.create_vehicle().expect("vehicle");
        model
            .set_vehicle_proc_state(&vehicle, VehicleProcState::ProcessingOrder)
            .expect("proc state");
        assert!(matches!(
            model.remove_vehicle(&vehicle),
            Err(KernelError::IllegalState(_))
        ));
    }
}
