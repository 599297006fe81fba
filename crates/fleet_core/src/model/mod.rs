//! Model entities: components and state enums for the fleet topology and the
//! order pool.
//!
//! Every object in the pool is an ECS entity carrying an [`ObjectMeta`]
//! component (id, name, user properties) plus exactly one kind component
//! ([`Point`], [`Path`], [`Location`], [`Vehicle`], ...). Events and
//! persistence work on [`ObjectSnapshot`]s, deep value copies of one entity.

mod block;
mod layout;
mod location;
mod message;
mod order;
mod path;
mod point;
mod sequence;
mod vehicle;

pub use block::{Block, Group, StaticRoute};
pub use layout::VisualLayout;
pub use location::{Link, Location, LocationType};
pub use message::{Message, MessageKind};
pub use order::{
    Destination, DriveOrder, DriveOrderState, Rejection, Route, Step, StepOrientation,
    TransportOrder, TransportOrderState, OP_MOVE, OP_NOP, OP_PARK,
};
pub use path::Path;
pub use point::{Point, PointKind};
pub use sequence::OrderSequence;
pub use vehicle::{CommAdapterState, LoadHandlingDevice, Vehicle, VehicleProcState, VehicleState};

use std::collections::BTreeMap;

use bevy_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

use crate::refs::ObjectId;

/// A position or offset in model coordinates, millimetres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl Triple {
    pub fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }
}

/// Attributes shared by every model object.
#[derive(Component, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub id: ObjectId,
    pub name: String,
    /// User-defined key→value properties. Setting a key to an absent value
    /// removes it.
    pub properties: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new(id: ObjectId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }
}

/// Discriminant of the model entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Point,
    Path,
    LocationType,
    Location,
    Vehicle,
    Block,
    Group,
    StaticRoute,
    VisualLayout,
    Message,
    TransportOrder,
    OrderSequence,
}

/// Kind-specific payload of one object, as stored in snapshots and persisted
/// models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectData {
    Point(Point),
    Path(Path),
    LocationType(LocationType),
    Location(Location),
    Vehicle(Vehicle),
    Block(Block),
    Group(Group),
    StaticRoute(StaticRoute),
    VisualLayout(VisualLayout),
    Message(Message),
    TransportOrder(TransportOrder),
    OrderSequence(OrderSequence),
}

impl ObjectData {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectData::Point(_) => ObjectKind::Point,
            ObjectData::Path(_) => ObjectKind::Path,
            ObjectData::LocationType(_) => ObjectKind::LocationType,
            ObjectData::Location(_) => ObjectKind::Location,
            ObjectData::Vehicle(_) => ObjectKind::Vehicle,
            ObjectData::Block(_) => ObjectKind::Block,
            ObjectData::Group(_) => ObjectKind::Group,
            ObjectData::StaticRoute(_) => ObjectKind::StaticRoute,
            ObjectData::VisualLayout(_) => ObjectKind::VisualLayout,
            ObjectData::Message(_) => ObjectKind::Message,
            ObjectData::TransportOrder(_) => ObjectKind::TransportOrder,
            ObjectData::OrderSequence(_) => ObjectKind::OrderSequence,
        }
    }
}

/// Deep value copy of one pool object at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub meta: ObjectMeta,
    pub data: ObjectData,
}

impl ObjectSnapshot {
    pub fn id(&self) -> ObjectId {
        self.meta.id
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn kind(&self) -> ObjectKind {
        self.data.kind()
    }
}

/// Implemented by every kind component so the pool can store and snapshot it
/// generically.
pub trait ModelComponent: Component + Clone + Send + Sync + Sized {
    const KIND: ObjectKind;

    fn into_data(self) -> ObjectData;
}

macro_rules! impl_model_component {
    ($($ty:ident),* $(,)?) => {
        $(
            impl ModelComponent for $ty {
                const KIND: ObjectKind = ObjectKind::$ty;

                fn into_data(self) -> ObjectData {
                    ObjectData::$ty(self)
                }
            }
        )*
    };
}

impl_model_component!(
    Point,
    Path,
    LocationType,
    Location,
    Vehicle,
    Block,
    Group,
    StaticRoute,
    VisualLayout,
    Message,
    TransportOrder,
    OrderSequence,
);

/// Serde helper: orientation angles may be NaN ("unspecified"), which JSON
/// cannot represent. NaN maps to `null` on the wire and back.
pub(crate) mod angle_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(angle: &f64, ser: S) -> Result<S::Ok, S::Error> {
        if angle.is_nan() {
            ser.serialize_none()
        } else {
            ser.serialize_some(angle)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<f64, D::Error> {
        let value: Option<f64> = Option::deserialize(de)?;
        Ok(value.unwrap_or(f64::NAN))
    }
}

/// Angle comparison where NaN equals NaN, for snapshot equality.
pub(crate) fn angles_equal(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}
