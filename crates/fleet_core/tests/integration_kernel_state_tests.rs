//! Kernel mode gating, structural events and the comm-adapter contract.

mod support;

use std::sync::{Arc, Mutex};

use fleet_core::error::KernelError;
use fleet_core::events::ObjectEventKind;
use fleet_core::kernel::{CommAdapter, KernelState, Query, QueryResult};
use fleet_core::model::Vehicle;
use fleet_core::refs::TypedRef;

use support::{build_triangle, enter_operating, modelling_kernel, EventRecorder};

#[test]
fn path_edits_are_rejected_while_operating() {
    let tk = modelling_kernel();
    let kernel = &tk.kernel;
    let t = build_triangle(kernel);
    let recorder = EventRecorder::subscribe(kernel.event_bus());

    enter_operating(kernel);
    let err = kernel.set_path_length(&t.p1_p2, 500).unwrap_err();
    assert!(matches!(err, KernelError::UnsupportedKernelOp(_)));

    kernel
        .set_state(KernelState::Modelling)
        .expect("to modelling");
    kernel
        .set_path_length(&t.p1_p2, 500)
        .expect("length in modelling");

    let modified = recorder.names_for(ObjectEventKind::Modified);
    assert_eq!(
        modified.last().map(String::as_str),
        Some(t.p1_p2.name.as_str()),
        "the successful edit emitted a modification event"
    );
}

#[test]
fn topology_creation_is_modelling_only() {
    let tk = modelling_kernel();
    let kernel = &tk.kernel;
    enter_operating(kernel);

    assert!(matches!(
        kernel.create_point(),
        Err(KernelError::UnsupportedKernelOp(_))
    ));
    assert!(matches!(
        kernel.create_location_type(),
        Err(KernelError::UnsupportedKernelOp(_))
    ));
    assert!(matches!(
        kernel.create_vehicle(),
        Err(KernelError::UnsupportedKernelOp(_))
    ));
}

#[test]
fn property_edits_stay_allowed_while_operating() {
    let tk = modelling_kernel();
    let kernel = &tk.kernel;
    let t = build_triangle(kernel);

    enter_operating(kernel);
    kernel
        .set_object_property(&t.p1.erased(), "zone", Some("cold-storage"))
        .expect("property in operating");
    let snapshot = kernel.object(&t.p1.name).expect("read").expect("exists");
    assert_eq!(
        snapshot.meta.properties.get("zone"),
        Some(&"cold-storage".to_string())
    );

    kernel
        .set_object_property(&t.p1.erased(), "zone", None)
        .expect("remove property");
    let snapshot = kernel.object(&t.p1.name).expect("read").expect("exists");
    assert!(snapshot.meta.properties.get("zone").is_none());
}

#[test]
fn queries_depend_on_the_kernel_state() {
    let tk = modelling_kernel();
    let kernel = &tk.kernel;
    build_triangle(kernel);

    assert!(
        kernel.query(Query::RoutingInfo).is_none(),
        "routing info is an operating-mode query"
    );
    assert!(kernel.query(Query::AvailableScriptFiles).is_some());

    enter_operating(kernel);
    match kernel.query(Query::RoutingInfo) {
        Some(QueryResult::RoutingInfo(info)) => {
            assert_eq!(info.point_count, 3);
            assert_eq!(info.path_count, 3);
        }
        other => panic!("expected routing info, got {other:?}"),
    }

    kernel.set_state(KernelState::Shutdown).expect("shutdown");
    assert!(kernel.query(Query::AvailableScriptFiles).is_none());
}

struct RecordingAdapter {
    received: Mutex<Vec<serde_json::Value>>,
}

impl CommAdapter for RecordingAdapter {
    fn process_message(&self, _vehicle: &TypedRef<Vehicle>, message: &serde_json::Value) {
        self.received
            .lock()
            .expect("adapter lock")
            .push(message.clone());
    }
}

#[test]
fn comm_adapter_messages_are_fire_and_forget() {
    let tk = modelling_kernel();
    let kernel = &tk.kernel;
    let t = build_triangle(kernel);

    enter_operating(kernel);
    // Without an adapter the message is dropped, not an error.
    kernel
        .send_comm_adapter_message(&t.vehicle, &serde_json::json!({"cmd": "beep"}))
        .expect("dropped silently");

    let adapter = Arc::new(RecordingAdapter {
        received: Mutex::new(Vec::new()),
    });
    kernel
        .attach_comm_adapter(&t.vehicle, adapter.clone())
        .expect("attach");
    kernel
        .send_comm_adapter_message(&t.vehicle, &serde_json::json!({"cmd": "stop"}))
        .expect("deliver");

    let received = adapter.received.lock().expect("lock");
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["cmd"], "stop");
}

#[test]
fn vehicle_position_events_clear_the_old_point_first() {
    let tk = modelling_kernel();
    let kernel = &tk.kernel;
    let t = build_triangle(kernel);
    enter_operating(kernel);

    kernel
        .set_vehicle_position(&t.vehicle, Some(&t.p1))
        .expect("position");

    let recorder = EventRecorder::subscribe(kernel.event_bus());
    kernel
        .set_vehicle_position(&t.vehicle, Some(&t.p2))
        .expect("move");

    let modified = recorder.names_for(ObjectEventKind::Modified);
    assert_eq!(
        modified,
        vec![
            t.p1.name.clone(),
            t.p2.name.clone(),
            t.vehicle.name.clone()
        ],
        "old point cleared, new point set, vehicle updated, in that order"
    );
}
