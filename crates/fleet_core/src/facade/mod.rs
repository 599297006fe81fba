//! The model facade: cross-entity invariants on top of the object pool.
//!
//! The facade owns the pool and is the only writer to it. Each operation
//! validates every precondition before the first write, then performs the
//! mutations as a fixed sequence of pool calls, each of which emits its own
//! event. Cascade deletions run in a fixed order (links, then paths, then the
//! object itself) so listeners can replay a consistent history.
//!
//! Operations are grouped per concern: [`points`] (points and paths),
//! [`locations`], [`vehicles`], [`resources`] (blocks, groups, static routes,
//! layouts, resource expansion).

mod locations;
mod points;
mod resources;
mod vehicles;

use std::sync::Arc;

use tracing::debug;

use crate::error::{KernelError, Result};
use crate::events::EventBus;
use crate::model::{
    Message, MessageKind, ObjectKind, ObjectSnapshot, OrderSequence, TransportOrder,
    TransportOrderState, Vehicle,
};
use crate::pool::ObjectPool;
use crate::refs::{ObjectId, ObjectRef, TypedRef};

pub(crate) const NAME_PREFIX_POINT: &str = "Point-";
pub(crate) const NAME_PREFIX_PATH: &str = "Path-";
pub(crate) const NAME_PREFIX_LOCATION_TYPE: &str = "LType-";
pub(crate) const NAME_PREFIX_LOCATION: &str = "Location-";
pub(crate) const NAME_PREFIX_VEHICLE: &str = "Vehicle-";
pub(crate) const NAME_PREFIX_BLOCK: &str = "Block-";
pub(crate) const NAME_PREFIX_GROUP: &str = "Group-";
pub(crate) const NAME_PREFIX_STATIC_ROUTE: &str = "SRoute-";
pub(crate) const NAME_PREFIX_VISUAL_LAYOUT: &str = "VLayout-";
pub(crate) const NAME_PREFIX_MESSAGE: &str = "Message-";
pub(crate) const NAME_PREFIX_TRANSPORT_ORDER: &str = "TOrder-";
pub(crate) const NAME_PREFIX_ORDER_SEQUENCE: &str = "OrderSeq-";

/// Suffix width of generated object names, e.g. `Point-0007`.
pub(crate) const NAME_SUFFIX_DIGITS: usize = 4;

pub struct Model {
    pool: ObjectPool,
}

impl Model {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            pool: ObjectPool::new(bus),
        }
    }

    pub fn pool(&self) -> &ObjectPool {
        &self.pool
    }

    pub(crate) fn pool_mut(&mut self) -> &mut ObjectPool {
        &mut self.pool
    }

    // -----------------------------------------------------------------------
    // Generic object access
    // -----------------------------------------------------------------------

    pub fn rename_object(&mut self, object: &ObjectRef, new_name: &str) -> Result<()> {
        self.pool.rename(object.id, new_name)
    }

    pub fn set_object_property(
        &mut self,
        object: &ObjectRef,
        key: &str,
        value: Option<&str>,
    ) -> Result<()> {
        self.pool.set_property(object.id, key, value)
    }

    pub fn clear_object_properties(&mut self, object: &ObjectRef) -> Result<()> {
        self.pool.clear_properties(object.id)
    }

    /// Removes an object of any kind, running the kind's cascade first.
    pub fn remove_object(&mut self, object: &ObjectRef) -> Result<ObjectSnapshot> {
        let snapshot = self
            .pool
            .snapshot_by_id(object.id)
            .ok_or_else(|| KernelError::ObjectUnknown(object.name.clone()))?;
        match snapshot.kind() {
            ObjectKind::Point => {
                self.remove_point(&object.typed())?;
            }
            ObjectKind::Path => {
                self.remove_path(&object.typed())?;
            }
            ObjectKind::Location => {
                self.remove_location(&object.typed())?;
            }
            ObjectKind::LocationType => {
                self.remove_location_type(&object.typed())?;
            }
            ObjectKind::Vehicle => {
                self.remove_vehicle(&object.typed())?;
            }
            ObjectKind::TransportOrder => {
                self.remove_transport_order(&object.typed())?;
            }
            ObjectKind::OrderSequence => {
                self.remove_order_sequence(&object.typed())?;
            }
            ObjectKind::Block
            | ObjectKind::Group
            | ObjectKind::StaticRoute
            | ObjectKind::VisualLayout
            | ObjectKind::Message => {
                self.pool.remove(object.id)?;
            }
        }
        Ok(snapshot)
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    /// Creates an immutable message object. The only producer of messages.
    pub fn publish_message(
        &mut self,
        body: impl Into<String>,
        kind: MessageKind,
        timestamp: i64,
    ) -> Result<TypedRef<Message>> {
        let name = self
            .pool
            .unique_name(NAME_PREFIX_MESSAGE, NAME_SUFFIX_DIGITS);
        self.pool.create(
            name,
            Message {
                body: body.into(),
                kind,
                timestamp,
            },
        )
    }

    // -----------------------------------------------------------------------
    // Order object removal (cascade halves; lifecycle rules live in `orders`)
    // -----------------------------------------------------------------------

    fn remove_transport_order(&mut self, order: &TypedRef<TransportOrder>) -> Result<()> {
        let data = self
            .pool
            .get(order)
            .ok_or_else(|| KernelError::ObjectUnknown(order.name.clone()))?;
        if matches!(
            data.state,
            TransportOrderState::BeingProcessed | TransportOrderState::Withdrawn
        ) {
            return Err(KernelError::IllegalState(format!(
                "transport order {order} is still being processed"
            )));
        }
        if let Some(sequence) = data.wrapping_sequence.clone() {
            self.pool.modify(&sequence, |seq: &mut OrderSequence| {
                seq.orders.retain(|member| member.id != order.id);
            })?;
        }
        self.pool.remove(order.id)?;
        Ok(())
    }

    fn remove_order_sequence(&mut self, sequence: &TypedRef<OrderSequence>) -> Result<()> {
        let data = self
            .pool
            .get(sequence)
            .ok_or_else(|| KernelError::ObjectUnknown(sequence.name.clone()))?;
        if data.processing_vehicle.is_some() && !data.finished {
            return Err(KernelError::IllegalState(format!(
                "order sequence {sequence} is still being processed"
            )));
        }
        for member in data.orders.clone() {
            if self.pool.contains_id(member.id) {
                self.pool.modify(&member, |order: &mut TransportOrder| {
                    order.wrapping_sequence = None;
                })?;
            }
        }
        self.pool.remove(sequence.id)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Shared helpers
    // -----------------------------------------------------------------------

    pub(crate) fn require<T: crate::model::ModelComponent>(
        &self,
        r: &TypedRef<T>,
    ) -> Result<T> {
        self.pool
            .get(r)
            .cloned()
            .ok_or_else(|| KernelError::ObjectUnknown(r.name.clone()))
    }

    pub(crate) fn require_resource(&self, object: &ObjectRef) -> Result<ObjectKind> {
        let snapshot = self
            .pool
            .snapshot_by_id(object.id)
            .ok_or_else(|| KernelError::ObjectUnknown(object.name.clone()))?;
        match snapshot.kind() {
            kind @ (ObjectKind::Point | ObjectKind::Path | ObjectKind::Location) => Ok(kind),
            other => Err(KernelError::IllegalArgument(format!(
                "{} is a {:?}, not a resource",
                object.name, other
            ))),
        }
    }

    /// Strips `target` from every member list, hop list, attached-resource
    /// set and vehicle position ref that mentions it, so removal never leaves
    /// dangling references behind.
    pub(crate) fn purge_references(&mut self, target: &ObjectRef) -> Result<()> {
        let target_id = target.id;

        for block in self.pool.refs_of_kind::<crate::model::Block>() {
            let affected = self
                .pool
                .get(&block)
                .is_some_and(|b| b.members.iter().any(|m| m.id == target_id));
            if affected {
                self.pool.modify(&block, |b: &mut crate::model::Block| {
                    b.members.retain(|m| m.id != target_id);
                })?;
            }
        }
        for group in self.pool.refs_of_kind::<crate::model::Group>() {
            let affected = self
                .pool
                .get(&group)
                .is_some_and(|g| g.members.iter().any(|m| m.id == target_id));
            if affected {
                self.pool.modify(&group, |g: &mut crate::model::Group| {
                    g.members.retain(|m| m.id != target_id);
                })?;
            }
        }
        for route in self.pool.refs_of_kind::<crate::model::StaticRoute>() {
            let affected = self
                .pool
                .get(&route)
                .is_some_and(|r| r.hops.iter().any(|h| h.id == target_id));
            if affected {
                self.pool
                    .modify(&route, |r: &mut crate::model::StaticRoute| {
                        r.hops.retain(|h| h.id != target_id);
                    })?;
            }
        }

        let holders: Vec<ObjectRef> = self
            .resource_refs()
            .into_iter()
            .filter(|holder| {
                self.attached_resources_of(holder)
                    .is_some_and(|attached| attached.iter().any(|a| a.id == target_id))
            })
            .collect();
        for holder in holders {
            self.detach_resource(&holder, target)?;
        }

        for vehicle in self.pool.refs_of_kind::<Vehicle>() {
            let affected = self.pool.get(&vehicle).is_some_and(|v| {
                v.current_position.as_ref().is_some_and(|p| p.id == target_id)
                    || v.next_position.as_ref().is_some_and(|p| p.id == target_id)
            });
            if affected {
                self.pool.modify(&vehicle, |v: &mut Vehicle| {
                    if v.current_position.as_ref().is_some_and(|p| p.id == target_id) {
                        v.current_position = None;
                    }
                    if v.next_position.as_ref().is_some_and(|p| p.id == target_id) {
                        v.next_position = None;
                    }
                })?;
            }
        }

        debug!(name = %target.name, "purged references to removed object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_message_creates_named_objects() {
        let mut model = Model::new(EventBus::new());
        let first = model
            .publish_message("vehicle 1 stalled", MessageKind::Warning, 1_000)
            .expect("publish");
        let second = model
            .publish_message("recovered", MessageKind::Info, 2_000)
            .expect("publish");
        assert_eq!(first.name, "Message-0000");
        assert_eq!(second.name, "Message-0001");
    }

    #[test]
    fn remove_object_rejects_unknown_refs() {
        let mut model = Model::new(EventBus::new());
        let ghost = ObjectRef::new(ObjectId(42), "Ghost");
        assert!(matches!(
            model.remove_object(&ghost),
            Err(KernelError::ObjectUnknown(_))
        ));
    }
}
