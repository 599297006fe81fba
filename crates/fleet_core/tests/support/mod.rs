//! Shared fixtures for the integration suites: a kernel on temporary
//! directories and canned topologies built through the public surface.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use fleet_core::config::KernelConfig;
use fleet_core::events::{EventBus, EventListener, ObjectEvent, ObjectEventKind};
use fleet_core::kernel::{Kernel, KernelState};
use fleet_core::model::{Location, LocationType, Path, Point, Vehicle};
use fleet_core::refs::TypedRef;

/// A kernel whose model and script directories live in a temp dir that is
/// kept alive alongside it.
pub struct TestKernel {
    pub kernel: Kernel,
    pub dir: TempDir,
}

pub fn modelling_kernel() -> TestKernel {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = KernelConfig::default()
        .with_model_dir(dir.path().join("models"))
        .with_script_dir(dir.path().join("scripts"));
    TestKernel {
        kernel: Kernel::new(config),
        dir,
    }
}

/// The triangle topology: P1 → P2 → P3 at 1000 each, P1 → P3 at 3000, one
/// vehicle (without a position).
pub struct Triangle {
    pub p1: TypedRef<Point>,
    pub p2: TypedRef<Point>,
    pub p3: TypedRef<Point>,
    pub p1_p2: TypedRef<Path>,
    pub p2_p3: TypedRef<Path>,
    pub p1_p3: TypedRef<Path>,
    pub vehicle: TypedRef<Vehicle>,
}

pub fn build_triangle(kernel: &Kernel) -> Triangle {
    let p1 = kernel.create_point().expect("p1");
    let p2 = kernel.create_point().expect("p2");
    let p3 = kernel.create_point().expect("p3");

    let p1_p2 = kernel.create_path(&p1, &p2).expect("p1->p2");
    kernel.set_path_length(&p1_p2, 1000).expect("length");
    let p2_p3 = kernel.create_path(&p2, &p3).expect("p2->p3");
    kernel.set_path_length(&p2_p3, 1000).expect("length");
    let p1_p3 = kernel.create_path(&p1, &p3).expect("p1->p3");
    kernel.set_path_length(&p1_p3, 3000).expect("length");

    let vehicle = kernel.create_vehicle().expect("vehicle");

    Triangle {
        p1,
        p2,
        p3,
        p1_p2,
        p2_p3,
        p1_p3,
        vehicle,
    }
}

/// A location of a fresh type linked to the given points, allowing
/// `operation` on the type.
pub fn add_location(
    kernel: &Kernel,
    points: &[&TypedRef<Point>],
    operation: &str,
) -> (TypedRef<LocationType>, TypedRef<Location>) {
    let location_type = kernel.create_location_type().expect("location type");
    kernel
        .add_location_type_allowed_operation(&location_type, operation)
        .expect("allowed operation");
    let location = kernel.create_location(&location_type).expect("location");
    for point in points {
        kernel
            .connect_location_to_point(&location, point)
            .expect("connect");
    }
    (location_type, location)
}

/// Current state of a transport order, read back through the kernel.
pub fn transport_order(
    kernel: &Kernel,
    order: &TypedRef<fleet_core::model::TransportOrder>,
) -> fleet_core::model::TransportOrder {
    let snapshot = kernel.object(&order.name).expect("read").expect("exists");
    match snapshot.data {
        fleet_core::model::ObjectData::TransportOrder(o) => o,
        other => panic!("expected a transport order, got {other:?}"),
    }
}

/// Current state of a vehicle, read back through the kernel.
pub fn vehicle(kernel: &Kernel, vehicle: &TypedRef<Vehicle>) -> Vehicle {
    let snapshot = kernel.object(&vehicle.name).expect("read").expect("exists");
    match snapshot.data {
        fleet_core::model::ObjectData::Vehicle(v) => v,
        other => panic!("expected a vehicle, got {other:?}"),
    }
}

pub fn enter_operating(kernel: &Kernel) {
    kernel
        .set_state(KernelState::Operating)
        .expect("switch to operating");
}

/// Records every event kind/object-name pair it sees.
pub struct EventRecorder {
    pub seen: Mutex<Vec<(ObjectEventKind, String)>>,
}

impl EventRecorder {
    pub fn subscribe(bus: &Arc<EventBus>) -> Arc<Self> {
        let recorder = Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        });
        bus.subscribe(recorder.clone());
        recorder
    }

    pub fn names_for(&self, kind: ObjectEventKind) -> Vec<String> {
        self.seen
            .lock()
            .expect("recorder lock")
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, name)| name.clone())
            .collect()
    }
}

impl EventListener for EventRecorder {
    fn on_event(&self, event: &ObjectEvent) {
        self.seen
            .lock()
            .expect("recorder lock")
            .push((event.kind, event.snapshot().meta.name.clone()));
    }
}
