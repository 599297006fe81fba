//! Facade operations on points and paths.
//!
//! The bidirectional endpoint registration (a path is listed in its source
//! point's outgoing set and its destination point's incoming set) is
//! maintained exclusively here.

use super::{Model, NAME_PREFIX_PATH, NAME_PREFIX_POINT, NAME_SUFFIX_DIGITS};
use crate::error::{KernelError, Result};
use crate::model::{Path, Point, PointKind, Triple};
use crate::refs::TypedRef;

impl Model {
    pub fn create_point(&mut self) -> Result<TypedRef<Point>> {
        let name = self
            .pool()
            .unique_name(NAME_PREFIX_POINT, NAME_SUFFIX_DIGITS);
        self.pool_mut().create(name, Point::default())
    }

    pub fn set_point_position(&mut self, point: &TypedRef<Point>, position: Triple) -> Result<()> {
        self.require(point)?;
        self.pool_mut().modify(point, |p| p.position = position)
    }

    pub fn set_point_kind(&mut self, point: &TypedRef<Point>, kind: PointKind) -> Result<()> {
        self.require(point)?;
        self.pool_mut().modify(point, |p| p.kind = kind)
    }

    /// Orientation must be NaN (unspecified) or within [-360, 360] degrees.
    pub fn set_point_vehicle_orientation_angle(
        &mut self,
        point: &TypedRef<Point>,
        angle: f64,
    ) -> Result<()> {
        if !angle.is_nan() && !(-360.0..=360.0).contains(&angle) {
            return Err(KernelError::IllegalArgument(format!(
                "orientation angle {angle} outside [-360, 360]"
            )));
        }
        self.require(point)?;
        self.pool_mut()
            .modify(point, |p| p.vehicle_orientation_angle = angle)
    }

    /// Removes a point and everything hanging off it, in a fixed order:
    /// location links first, then every incoming and outgoing path, then the
    /// point itself.
    pub fn remove_point(&mut self, point: &TypedRef<Point>) -> Result<()> {
        let data = self.require(point)?;

        for link in &data.attached_links {
            self.disconnect_location_from_point(&link.location, point)?;
        }

        let mut paths: Vec<TypedRef<Path>> = data.incoming_paths.clone();
        for outgoing in data.outgoing_paths {
            if !paths.contains(&outgoing) {
                paths.push(outgoing);
            }
        }
        for path in paths {
            self.remove_path(&path)?;
        }

        self.purge_references(&point.erased())?;
        self.pool_mut().remove(point.id)?;
        Ok(())
    }

    /// Creates a path between two existing points and registers it on both
    /// endpoints. Emits one creation event for the path and one modification
    /// event per endpoint.
    pub fn create_path(
        &mut self,
        source: &TypedRef<Point>,
        destination: &TypedRef<Point>,
    ) -> Result<TypedRef<Path>> {
        self.require(source)?;
        self.require(destination)?;

        let name = self
            .pool()
            .unique_name(NAME_PREFIX_PATH, NAME_SUFFIX_DIGITS);
        let path = self
            .pool_mut()
            .create(name, Path::new(source.clone(), destination.clone()))?;

        let path_for_source = path.clone();
        self.pool_mut().modify(source, move |p| {
            p.outgoing_paths.push(path_for_source);
        })?;
        let path_for_destination = path.clone();
        self.pool_mut().modify(destination, move |p| {
            p.incoming_paths.push(path_for_destination);
        })?;
        Ok(path)
    }

    /// Removes a path, deregistering it from both endpoints first.
    pub fn remove_path(&mut self, path: &TypedRef<Path>) -> Result<()> {
        let data = self.require(path)?;

        if self.pool().get(&data.source).is_some() {
            self.pool_mut().modify(&data.source, |p| {
                p.outgoing_paths.retain(|r| r.id != path.id);
            })?;
        }
        if self.pool().get(&data.destination).is_some() {
            self.pool_mut().modify(&data.destination, |p| {
                p.incoming_paths.retain(|r| r.id != path.id);
            })?;
        }

        self.purge_references(&path.erased())?;
        self.pool_mut().remove(path.id)?;
        Ok(())
    }

    pub fn set_path_length(&mut self, path: &TypedRef<Path>, length: i64) -> Result<()> {
        if length <= 0 {
            return Err(KernelError::IllegalArgument(format!(
                "path length {length} must be > 0"
            )));
        }
        self.require(path)?;
        self.pool_mut().modify(path, |p| p.length = length)
    }

    pub fn set_path_routing_cost(&mut self, path: &TypedRef<Path>, cost: i64) -> Result<()> {
        if cost <= 0 {
            return Err(KernelError::IllegalArgument(format!(
                "path routing cost {cost} must be > 0"
            )));
        }
        self.require(path)?;
        self.pool_mut().modify(path, |p| p.routing_cost = cost)
    }

    pub fn set_path_max_velocity(&mut self, path: &TypedRef<Path>, velocity: i64) -> Result<()> {
        if velocity < 0 {
            return Err(KernelError::IllegalArgument(format!(
                "path max velocity {velocity} must be >= 0"
            )));
        }
        self.require(path)?;
        self.pool_mut().modify(path, |p| p.max_velocity = velocity)
    }

    pub fn set_path_max_reverse_velocity(
        &mut self,
        path: &TypedRef<Path>,
        velocity: i64,
    ) -> Result<()> {
        if velocity < 0 {
            return Err(KernelError::IllegalArgument(format!(
                "path max reverse velocity {velocity} must be >= 0"
            )));
        }
        self.require(path)?;
        self.pool_mut()
            .modify(path, |p| p.max_reverse_velocity = velocity)
    }

    pub fn set_path_locked(&mut self, path: &TypedRef<Path>, locked: bool) -> Result<()> {
        self.require(path)?;
        self.pool_mut().modify(path, |p| p.locked = locked)
    }
}
