//! Transport-order lifecycle through the kernel: sequences, withdrawal and
//! drive-order progression.

mod support;

use fleet_core::error::KernelError;
use fleet_core::model::{Destination, TransportOrderState, VehicleProcState};

use support::{
    add_location, build_triangle, enter_operating, modelling_kernel, transport_order, vehicle,
};

#[test]
fn order_sequences_are_processed_in_insertion_order() {
    let tk = modelling_kernel();
    let kernel = &tk.kernel;
    let t = build_triangle(kernel);
    let (_, drop_off) = add_location(kernel, &[&t.p2], "drop");

    enter_operating(kernel);
    kernel
        .set_vehicle_position(&t.vehicle, Some(&t.p1))
        .expect("position");
    kernel
        .set_vehicle_proc_state(&t.vehicle, VehicleProcState::Idle)
        .expect("idle");

    let sequence = kernel.create_order_sequence().expect("sequence");
    let mut orders = Vec::new();
    for _ in 0..3 {
        let order = kernel
            .create_transport_order(vec![Destination::new(drop_off.clone(), "drop")])
            .expect("order");
        kernel
            .add_order_sequence_order(&sequence, &order)
            .expect("add member");
        orders.push(order);
    }

    // Activating the third member before the first is rejected.
    let err = kernel.activate_transport_order(&orders[2]).unwrap_err();
    assert!(matches!(err, KernelError::IllegalArgument(_)));

    kernel
        .activate_transport_order(&orders[0])
        .expect("activate o1");
    kernel
        .activate_transport_order(&orders[1])
        .expect("activate o2");
    assert_eq!(
        transport_order(kernel, &orders[1]).state,
        TransportOrderState::Active,
        "o2 waits for o1"
    );

    // Run o1 to completion.
    kernel
        .dispatch_vehicle(&t.vehicle, false)
        .expect("dispatch")
        .expect("assigned o1");
    kernel
        .set_transport_order_next_drive_order(&orders[0])
        .expect("finish drive order");
    assert_eq!(
        transport_order(kernel, &orders[0]).state,
        TransportOrderState::Finished
    );

    assert_eq!(
        transport_order(kernel, &orders[1]).state,
        TransportOrderState::Dispatchable,
        "finishing o1 makes o2 dispatchable"
    );
}

#[test]
fn withdrawal_is_a_two_step_process() {
    let tk = modelling_kernel();
    let kernel = &tk.kernel;
    let t = build_triangle(kernel);
    let (_, drop_off) = add_location(kernel, &[&t.p3], "drop");

    enter_operating(kernel);
    kernel
        .set_vehicle_position(&t.vehicle, Some(&t.p1))
        .expect("position");
    kernel
        .set_vehicle_proc_state(&t.vehicle, VehicleProcState::Idle)
        .expect("idle");
    let order = kernel
        .create_transport_order(vec![Destination::new(drop_off, "drop")])
        .expect("order");
    kernel.activate_transport_order(&order).expect("activate");
    kernel
        .dispatch_vehicle(&t.vehicle, false)
        .expect("dispatch")
        .expect("assigned");

    // Step one: graceful withdrawal. The vehicle keeps its proc state.
    kernel
        .withdraw_transport_order(&order, false)
        .expect("withdraw");
    assert_eq!(
        transport_order(kernel, &order).state,
        TransportOrderState::Withdrawn
    );
    assert_eq!(
        vehicle(kernel, &t.vehicle).proc_state,
        VehicleProcState::ProcessingOrder
    );

    // Step two: the driver reports a clean stop; the order fails.
    kernel
        .set_vehicle_proc_state(&t.vehicle, VehicleProcState::Idle)
        .expect("stop");
    assert_eq!(
        transport_order(kernel, &order).state,
        TransportOrderState::Failed
    );
    assert!(vehicle(kernel, &t.vehicle).transport_order.is_none());
}

#[test]
fn second_withdrawal_aborts_immediately_and_can_disable_the_vehicle() {
    let tk = modelling_kernel();
    let kernel = &tk.kernel;
    let t = build_triangle(kernel);
    let (_, drop_off) = add_location(kernel, &[&t.p3], "drop");

    enter_operating(kernel);
    kernel
        .set_vehicle_position(&t.vehicle, Some(&t.p1))
        .expect("position");
    kernel
        .set_vehicle_proc_state(&t.vehicle, VehicleProcState::Idle)
        .expect("idle");
    let order = kernel
        .create_transport_order(vec![Destination::new(drop_off, "drop")])
        .expect("order");
    kernel.activate_transport_order(&order).expect("activate");
    kernel
        .dispatch_vehicle(&t.vehicle, false)
        .expect("dispatch")
        .expect("assigned");

    kernel
        .withdraw_transport_order(&order, false)
        .expect("withdraw");
    kernel
        .withdraw_transport_order(&order, true)
        .expect("abort");

    assert_eq!(
        transport_order(kernel, &order).state,
        TransportOrderState::Failed
    );
    let vehicle_data = vehicle(kernel, &t.vehicle);
    assert_eq!(vehicle_data.proc_state, VehicleProcState::Unavailable);
    assert!(vehicle_data.transport_order.is_none());
}

#[test]
fn withdrawal_by_vehicle_resolves_the_processed_order() {
    let tk = modelling_kernel();
    let kernel = &tk.kernel;
    let t = build_triangle(kernel);
    let (_, drop_off) = add_location(kernel, &[&t.p3], "drop");

    enter_operating(kernel);
    kernel
        .set_vehicle_position(&t.vehicle, Some(&t.p1))
        .expect("position");
    kernel
        .set_vehicle_proc_state(&t.vehicle, VehicleProcState::Idle)
        .expect("idle");
    let order = kernel
        .create_transport_order(vec![Destination::new(drop_off, "drop")])
        .expect("order");
    kernel.activate_transport_order(&order).expect("activate");
    kernel
        .dispatch_vehicle(&t.vehicle, false)
        .expect("dispatch")
        .expect("assigned");

    kernel
        .withdraw_transport_order_by_vehicle(&t.vehicle, false)
        .expect("withdraw by vehicle");
    assert_eq!(
        transport_order(kernel, &order).state,
        TransportOrderState::Withdrawn
    );

    // A vehicle without an order cannot be withdrawn from.
    kernel
        .withdraw_transport_order_by_vehicle(&t.vehicle, false)
        .expect("second call aborts");
    let err = kernel
        .withdraw_transport_order_by_vehicle(&t.vehicle, false)
        .unwrap_err();
    assert!(matches!(err, KernelError::IllegalArgument(_)));
}

#[test]
fn finishing_all_drive_orders_finishes_the_order_and_frees_the_vehicle() {
    let tk = modelling_kernel();
    let kernel = &tk.kernel;
    let t = build_triangle(kernel);
    let (_, la) = add_location(kernel, &[&t.p2], "drop");
    let (_, lb) = add_location(kernel, &[&t.p3], "pick");

    enter_operating(kernel);
    kernel
        .set_vehicle_position(&t.vehicle, Some(&t.p1))
        .expect("position");
    kernel
        .set_vehicle_proc_state(&t.vehicle, VehicleProcState::Idle)
        .expect("idle");
    let order = kernel
        .create_transport_order(vec![
            Destination::new(la, "drop"),
            Destination::new(lb, "pick"),
        ])
        .expect("order");
    kernel.activate_transport_order(&order).expect("activate");
    kernel
        .dispatch_vehicle(&t.vehicle, false)
        .expect("dispatch")
        .expect("assigned");

    kernel
        .set_transport_order_next_drive_order(&order)
        .expect("first drive order done");
    let in_flight = transport_order(kernel, &order);
    assert_eq!(in_flight.state, TransportOrderState::BeingProcessed);
    assert_eq!(in_flight.past_drive_orders.len(), 1);
    assert!(in_flight.current_drive_order.is_some());

    kernel
        .set_transport_order_next_drive_order(&order)
        .expect("second drive order done");
    let finished = transport_order(kernel, &order);
    assert_eq!(finished.state, TransportOrderState::Finished);
    assert!(finished.current_drive_order.is_none());
    assert_eq!(finished.past_drive_orders.len(), 2);
    assert!(finished.finished_time.is_some());

    let vehicle_data = vehicle(kernel, &t.vehicle);
    assert_eq!(vehicle_data.proc_state, VehicleProcState::Idle);
    assert!(vehicle_data.transport_order.is_none());

    // Terminal orders reject further mutation.
    let err = kernel
        .set_transport_order_deadline(&order, 1)
        .unwrap_err();
    assert!(matches!(err, KernelError::IllegalState(_)));
}

#[test]
fn past_current_and_future_destinations_always_cover_the_original_list() {
    let tk = modelling_kernel();
    let kernel = &tk.kernel;
    let t = build_triangle(kernel);
    let (_, la) = add_location(kernel, &[&t.p2], "drop");
    let (_, lb) = add_location(kernel, &[&t.p3], "pick");

    enter_operating(kernel);
    kernel
        .set_vehicle_position(&t.vehicle, Some(&t.p1))
        .expect("position");
    kernel
        .set_vehicle_proc_state(&t.vehicle, VehicleProcState::Idle)
        .expect("idle");
    let order = kernel
        .create_transport_order(vec![
            Destination::new(la, "drop"),
            Destination::new(lb, "pick"),
        ])
        .expect("order");
    kernel.activate_transport_order(&order).expect("activate");
    kernel
        .dispatch_vehicle(&t.vehicle, false)
        .expect("dispatch")
        .expect("assigned");

    loop {
        let data = transport_order(kernel, &order);
        let mut destinations: Vec<_> = data
            .past_drive_orders
            .iter()
            .map(|d| d.destination.clone())
            .collect();
        destinations.extend(data.current_drive_order.iter().map(|d| d.destination.clone()));
        destinations.extend(data.future_drive_orders.iter().map(|d| d.destination.clone()));
        assert_eq!(destinations, data.destinations);

        if data.state != TransportOrderState::BeingProcessed {
            break;
        }
        kernel
            .set_transport_order_next_drive_order(&order)
            .expect("advance");
    }
}
