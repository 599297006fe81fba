//! Shared fixtures for unit tests: small canned topologies built through the
//! facade, so tests exercise the same code paths production callers use.

use crate::events::EventBus;
use crate::facade::Model;
use crate::model::{Location, LocationType, Path, Point, Vehicle};
use crate::refs::TypedRef;

/// An empty model on a fresh bus.
pub fn empty_model() -> Model {
    Model::new(EventBus::new())
}

/// The triangle used by the routing tests:
///
/// ```text
///   P1 --1000--> P2 --1000--> P3
///    \______________3000______^
/// ```
///
/// All paths are navigable in both directions.
pub struct Triangle {
    pub model: Model,
    pub p1: TypedRef<Point>,
    pub p2: TypedRef<Point>,
    pub p3: TypedRef<Point>,
    pub p1_p2: TypedRef<Path>,
    pub p2_p3: TypedRef<Path>,
    pub p1_p3: TypedRef<Path>,
    pub vehicle: TypedRef<Vehicle>,
}

pub fn triangle() -> Triangle {
    let mut model = empty_model();
    let p1 = model.create_point().expect("p1");
    let p2 = model.create_point().expect("p2");
    let p3 = model.create_point().expect("p3");

    let p1_p2 = model.create_path(&p1, &p2).expect("p1->p2");
    model.set_path_length(&p1_p2, 1000).expect("length");
    let p2_p3 = model.create_path(&p2, &p3).expect("p2->p3");
    model.set_path_length(&p2_p3, 1000).expect("length");
    let p1_p3 = model.create_path(&p1, &p3).expect("p1->p3");
    model.set_path_length(&p1_p3, 3000).expect("length");

    let vehicle = model.create_vehicle().expect("vehicle");

    Triangle {
        model,
        p1,
        p2,
        p3,
        p1_p2,
        p2_p3,
        p1_p3,
        vehicle,
    }
}

/// A location of a fresh type, linked to the given points, with `operation`
/// allowed on the type.
pub fn location_with_links(
    model: &mut Model,
    points: &[&TypedRef<Point>],
    operation: &str,
) -> (TypedRef<LocationType>, TypedRef<Location>) {
    let location_type = model.create_location_type().expect("location type");
    model
        .add_location_type_allowed_operation(&location_type, operation)
        .expect("allowed operation");
    let location = model.create_location(&location_type).expect("location");
    for point in points {
        model
            .connect_location_to_point(&location, point)
            .expect("connect");
    }
    (location_type, location)
}

/// A vehicle placed at `position`.
pub fn vehicle_at(model: &mut Model, position: &TypedRef<Point>) -> TypedRef<Vehicle> {
    let vehicle = model.create_vehicle().expect("vehicle");
    model
        .set_vehicle_position(&vehicle, Some(position))
        .expect("position");
    vehicle
}
