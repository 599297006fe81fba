//! Facade operations on location types, locations and location↔point links.
//!
//! A link is stored twice, on the location and on the point; every link
//! mutation goes through here so both copies stay identical and both sides
//! emit a modification event.

use super::{Model, NAME_PREFIX_LOCATION, NAME_PREFIX_LOCATION_TYPE, NAME_SUFFIX_DIGITS};
use crate::error::{KernelError, Result};
use crate::model::{Link, Location, LocationType, Point, Triple};
use crate::refs::TypedRef;

impl Model {
    pub fn create_location_type(&mut self) -> Result<TypedRef<LocationType>> {
        let name = self
            .pool()
            .unique_name(NAME_PREFIX_LOCATION_TYPE, NAME_SUFFIX_DIGITS);
        self.pool_mut().create(name, LocationType::default())
    }

    pub fn add_location_type_allowed_operation(
        &mut self,
        location_type: &TypedRef<LocationType>,
        operation: &str,
    ) -> Result<()> {
        self.require(location_type)?;
        self.pool_mut().modify(location_type, |t| {
            t.allowed_operations.insert(operation.to_string());
        })
    }

    pub fn remove_location_type_allowed_operation(
        &mut self,
        location_type: &TypedRef<LocationType>,
        operation: &str,
    ) -> Result<()> {
        self.require(location_type)?;
        self.pool_mut().modify(location_type, |t| {
            t.allowed_operations.remove(operation);
        })
    }

    /// A location type can only be removed while no location references it.
    pub fn remove_location_type(&mut self, location_type: &TypedRef<LocationType>) -> Result<()> {
        self.require(location_type)?;
        let in_use = self
            .pool()
            .objects_of_kind::<Location>()
            .iter()
            .any(|(_, location)| location.kind.id == location_type.id);
        if in_use {
            return Err(KernelError::IllegalState(format!(
                "location type {location_type} is still referenced by locations"
            )));
        }
        self.pool_mut().remove(location_type.id)?;
        Ok(())
    }

    pub fn create_location(
        &mut self,
        location_type: &TypedRef<LocationType>,
    ) -> Result<TypedRef<Location>> {
        self.require(location_type)?;
        let name = self
            .pool()
            .unique_name(NAME_PREFIX_LOCATION, NAME_SUFFIX_DIGITS);
        self.pool_mut()
            .create(name, Location::new(location_type.clone()))
    }

    pub fn remove_location(&mut self, location: &TypedRef<Location>) -> Result<()> {
        let data = self.require(location)?;
        for link in &data.links {
            self.disconnect_location_from_point(location, &link.point)?;
        }
        self.purge_references(&location.erased())?;
        self.pool_mut().remove(location.id)?;
        Ok(())
    }

    pub fn set_location_position(
        &mut self,
        location: &TypedRef<Location>,
        position: Triple,
    ) -> Result<()> {
        self.require(location)?;
        self.pool_mut()
            .modify(location, |l| l.position = position)
    }

    pub fn set_location_type(
        &mut self,
        location: &TypedRef<Location>,
        location_type: &TypedRef<LocationType>,
    ) -> Result<()> {
        self.require(location)?;
        self.require(location_type)?;
        let location_type = location_type.clone();
        self.pool_mut()
            .modify(location, move |l| l.kind = location_type)
    }

    /// Creates a link with an empty allowed-operation set, stored on both the
    /// location and the point.
    pub fn connect_location_to_point(
        &mut self,
        location: &TypedRef<Location>,
        point: &TypedRef<Point>,
    ) -> Result<()> {
        let location_data = self.require(location)?;
        self.require(point)?;
        if location_data.links.iter().any(|l| l.point.id == point.id) {
            return Err(KernelError::IllegalArgument(format!(
                "location {location} is already connected to point {point}"
            )));
        }

        let link = Link::new(location.clone(), point.clone());
        let link_for_location = link.clone();
        self.pool_mut().modify(location, move |l| {
            l.links.push(link_for_location);
        })?;
        self.pool_mut().modify(point, move |p| {
            p.attached_links.push(link);
        })?;
        Ok(())
    }

    /// Removes the link from both sides.
    pub fn disconnect_location_from_point(
        &mut self,
        location: &TypedRef<Location>,
        point: &TypedRef<Point>,
    ) -> Result<()> {
        let location_data = self.require(location)?;
        if !location_data.links.iter().any(|l| l.point.id == point.id) {
            return Err(KernelError::IllegalArgument(format!(
                "location {location} is not connected to point {point}"
            )));
        }

        let point_id = point.id;
        self.pool_mut().modify(location, move |l| {
            l.links.retain(|link| link.point.id != point_id);
        })?;
        if self.pool().get(point).is_some() {
            let location_id = location.id;
            self.pool_mut().modify(point, move |p| {
                p.attached_links
                    .retain(|link| link.location.id != location_id);
            })?;
        }
        Ok(())
    }

    pub fn add_location_link_allowed_operation(
        &mut self,
        location: &TypedRef<Location>,
        point: &TypedRef<Point>,
        operation: &str,
    ) -> Result<()> {
        self.modify_link(location, point, |link| {
            link.allowed_operations.insert(operation.to_string());
        })
    }

    pub fn remove_location_link_allowed_operation(
        &mut self,
        location: &TypedRef<Location>,
        point: &TypedRef<Point>,
        operation: &str,
    ) -> Result<()> {
        self.modify_link(location, point, |link| {
            link.allowed_operations.remove(operation);
        })
    }

    pub fn clear_location_link_allowed_operations(
        &mut self,
        location: &TypedRef<Location>,
        point: &TypedRef<Point>,
    ) -> Result<()> {
        self.modify_link(location, point, |link| {
            link.allowed_operations.clear();
        })
    }

    /// Applies the same edit to the location-side and point-side copy of a
    /// link, emitting a modification event for each side.
    fn modify_link(
        &mut self,
        location: &TypedRef<Location>,
        point: &TypedRef<Point>,
        edit: impl Fn(&mut Link),
    ) -> Result<()> {
        let location_data = self.require(location)?;
        self.require(point)?;
        if !location_data.links.iter().any(|l| l.point.id == point.id) {
            return Err(KernelError::IllegalArgument(format!(
                "location {location} is not connected to point {point}"
            )));
        }

        let point_id = point.id;
        let location_id = location.id;
        self.pool_mut().modify(location, |l| {
            if let Some(link) = l.links.iter_mut().find(|link| link.point.id == point_id) {
                edit(link);
            }
        })?;
        self.pool_mut().modify(point, |p| {
            if let Some(link) = p
                .attached_links
                .iter_mut()
                .find(|link| link.location.id == location_id)
            {
                edit(link);
            }
        })?;
        Ok(())
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
    fn link_is_mirrored_on_both_sides() {
        let mut model = model();
        let ltype = model.create_location_type().expect("type");
        let location = model.create_location(&ltype).expect("location");
        let point = model.create_point().expect("point");

        model
            .connect_location_to_point(&location, &point)
            .expect("connect");
        model
            .add_location_link_allowed_operation(&location, &point, "pick")
            .expect("allow");

        let location_link = model.pool().get(&location).expect("location").links[0].clone();
        let point_link = model.pool().get(&point).expect("point").attached_links[0].clone();
        assert_eq!(location_link, point_link);
        assert!(location_link.allowed_operations.contains("pick"));

        model
            .disconnect_location_from_point(&location, &point)
            .expect("disconnect");
        assert!(model.pool().get(&location).expect("location").links.is_empty());
        assert!(model
            .pool()
            .get(&point)
            .expect("point")
            .attached_links
            .is_empty());
    }

    #[test]
    fn double_connect_is_rejected() {
        let mut model = model();
        let ltype = model.create_location_type().expect("type");
        let location = model.create_location(&ltype).expect("location");
        let point = model.create_point().expect("point");

        model
            .connect_location_to_point(&location, &point)
            .expect("connect");
        assert!(matches!(
            model.connect_location_to_point(&location, &point),
            Err(KernelError::IllegalArgument(_))
        ));
    }

    #[test]
    fn location_type_in_use_cannot_be_removed() {
        let mut model = model();
        let ltype = model.create_location_type().expect("type");
        let location = model.create_location(&ltype).expect("location");
        assert!(matches!(
            model.remove_location_type(&ltype),
            Err(KernelError::IllegalState(_))
        ));

        model.remove_location(&location).expect("remove location");
        model.remove_location_type(&ltype).expect("remove type");
    }

    #[test]
    fn removing_a_linked_point_disconnects_the_location() {
        let mut model = model();
        let ltype = model.create_location_type().expect("type");
        let location = model.create_location(&ltype).expect("location");
        let point = model.create_point().expect("point");
        model
            .connect_location_to_point(&location, &point)
            .expect("connect");

        model.remove_point(&point).expect("remove point");
        assert!(model.pool().get(&location).expect("location").links.is_empty());
    }
}
