use bevy_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

use super::location::Link;
use super::{angle_serde, angles_equal, Triple};
use crate::refs::{ObjectRef, TypedRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointKind {
    /// A vehicle may stop here.
    HaltPosition,
    /// Reporting only; vehicles pass through without halting.
    ReportPosition,
    /// A vehicle may stop and park here.
    ParkPosition,
}

impl PointKind {
    /// Halting positions are admissible route destinations.
    pub fn is_halting(self) -> bool {
        matches!(self, PointKind::HaltPosition | PointKind::ParkPosition)
    }
}

/// A discrete position in the driving course.
#[derive(Component, Debug, Clone, Serialize, Deserialize)]
pub struct Point {
    /// Physical coordinates in mm.
    pub position: Triple,
    pub kind: PointKind,
    /// Vehicle orientation at this point in degrees, [-360, 360], or NaN when
    /// unspecified.
    #[serde(with = "angle_serde")]
    pub vehicle_orientation_angle: f64,
    /// Paths ending here. Maintained by the facade.
    pub incoming_paths: Vec<TypedRef<super::Path>>,
    /// Paths starting here. Maintained by the facade.
    pub outgoing_paths: Vec<TypedRef<super::Path>>,
    /// Links to locations attached to this point. Mirrored on the location.
    pub attached_links: Vec<Link>,
    /// The vehicle currently occupying this point, if any.
    pub occupying_vehicle: Option<TypedRef<super::Vehicle>>,
    /// Resources a vehicle implicitly allocates together with this point.
    pub attached_resources: Vec<ObjectRef>,
}

impl Default for Point {
    fn default() -> Self {
        Self {
            position: Triple::default(),
            kind: PointKind::HaltPosition,
            vehicle_orientation_angle: f64::NAN,
            incoming_paths: Vec::new(),
            outgoing_paths: Vec::new(),
            attached_links: Vec::new(),
            occupying_vehicle: None,
            attached_resources: Vec::new(),
        }
    }
}

// NaN orientation angles compare equal so snapshot equality behaves.
impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
            && self.kind == other.kind
            && angles_equal(
                self.vehicle_orientation_angle,
                other.vehicle_orientation_angle,
            )
            && self.incoming_paths == other.incoming_paths
            && self.outgoing_paths == other.outgoing_paths
            && self.attached_links == other.attached_links
            && self.occupying_vehicle == other.occupying_vehicle
            && self.attached_resources == other.attached_resources
    }
}
