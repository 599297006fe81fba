//! The object pool: the typed, identity-preserving container for every model
//! entity.
//!
//! Objects live as ECS entities in a [`World`], each carrying an
//! [`ObjectMeta`] component plus exactly one kind component. On top of the
//! world the pool maintains three indexes: a dense id → entity vector (O(1)
//! id lookup), a name → entity map, and an insertion-order vector for stable
//! enumeration.
//!
//! All other core components mutate the model only through the pool (via the
//! facade), and every committed mutation emits one event with before/after
//! snapshots on the shared bus.

use std::collections::HashMap;
use std::sync::Arc;

use bevy_ecs::entity::Entity;
use bevy_ecs::world::World;
use regex::Regex;
use tracing::debug;

use crate::error::{KernelError, Result};
use crate::events::{EventBus, ObjectEvent, ObjectEventKind};
use crate::model::{
    Block, Group, Location, LocationType, Message, ModelComponent, ObjectData, ObjectKind,
    ObjectMeta, ObjectSnapshot, OrderSequence, Path, Point, StaticRoute, TransportOrder, Vehicle,
    VisualLayout,
};
use crate::refs::{IdBitset, ObjectId, ObjectRef, TypedRef};

pub struct ObjectPool {
    world: World,
    id_bits: IdBitset,
    by_id: Vec<Option<Entity>>,
    by_name: HashMap<String, Entity>,
    insertion: Vec<Entity>,
    bus: Arc<EventBus>,
}

impl ObjectPool {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            world: World::new(),
            id_bits: IdBitset::new(),
            by_id: Vec::new(),
            by_name: HashMap::new(),
            insertion: Vec::new(),
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn len(&self) -> usize {
        self.insertion.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insertion.is_empty()
    }

    // -----------------------------------------------------------------------
    // Identity service
    // -----------------------------------------------------------------------

    /// Lowest non-negative id not currently allocated.
    pub fn unique_id(&self) -> ObjectId {
        self.id_bits.lowest_unset()
    }

    /// `prefix` + the smallest non-negative integer, zero-padded to `digits`,
    /// whose resulting name is unused.
    pub fn unique_name(&self, prefix: &str, digits: usize) -> String {
        let mut suffix = 0u64;
        loop {
            let candidate = format!("{prefix}{suffix:0digits$}");
            if !self.by_name.contains_key(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    // -----------------------------------------------------------------------
    // Creation and restoration
    // -----------------------------------------------------------------------

    /// Creates an object under a fresh id. Fails with `ObjectExists` when the
    /// name is taken.
    pub fn create<T: ModelComponent>(
        &mut self,
        name: impl Into<String>,
        component: T,
    ) -> Result<TypedRef<T>> {
        let name = name.into();
        self.assert_not_dispatching();
        if self.by_name.contains_key(&name) {
            return Err(KernelError::ObjectExists(name));
        }
        let id = self.id_bits.allocate();
        self.insert_new(ObjectMeta::new(id, name.clone()), component);
        Ok(TypedRef::new(id, name))
    }

    /// Inserts an object under a caller-provided id and name, e.g. when
    /// restoring a persisted model. Fails with `ObjectExists` on either
    /// collision.
    pub fn restore(&mut self, snapshot: ObjectSnapshot) -> Result<ObjectRef> {
        self.assert_not_dispatching();
        let ObjectSnapshot { meta, data } = snapshot;
        if self.id_bits.contains(meta.id) {
            return Err(KernelError::ObjectExists(format!("id {}", meta.id)));
        }
        if self.by_name.contains_key(&meta.name) {
            return Err(KernelError::ObjectExists(meta.name));
        }
        self.id_bits.set(meta.id);
        let object_ref = ObjectRef::new(meta.id, meta.name.clone());
        match data {
            ObjectData::Point(c) => self.insert_new(meta, c),
            ObjectData::Path(c) => self.insert_new(meta, c),
            ObjectData::LocationType(c) => self.insert_new(meta, c),
            ObjectData::Location(c) => self.insert_new(meta, c),
            ObjectData::Vehicle(c) => self.insert_new(meta, c),
            ObjectData::Block(c) => self.insert_new(meta, c),
            ObjectData::Group(c) => self.insert_new(meta, c),
            ObjectData::StaticRoute(c) => self.insert_new(meta, c),
            ObjectData::VisualLayout(c) => self.insert_new(meta, c),
            ObjectData::Message(c) => self.insert_new(meta, c),
            ObjectData::TransportOrder(c) => self.insert_new(meta, c),
            ObjectData::OrderSequence(c) => self.insert_new(meta, c),
        }
        Ok(object_ref)
    }

    fn insert_new<T: ModelComponent>(&mut self, meta: ObjectMeta, component: T) {
        let id = meta.id;
        let name = meta.name.clone();
        let snapshot = ObjectSnapshot {
            meta: meta.clone(),
            data: component.clone().into_data(),
        };
        let entity = self.world.spawn((meta, component)).id();

        if self.by_id.len() <= id.index() {
            self.by_id.resize(id.index() + 1, None);
        }
        self.by_id[id.index()] = Some(entity);
        self.by_name.insert(name.clone(), entity);
        self.insertion.push(entity);

        debug!(name = %name, id = %id, kind = ?snapshot.kind(), "object created");
        self.emit(ObjectEventKind::Created, Some(snapshot), None);
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    fn entity_of(&self, id: ObjectId) -> Option<Entity> {
        self.by_id.get(id.index()).copied().flatten()
    }

    fn require_entity(&self, id: ObjectId) -> Result<Entity> {
        self.entity_of(id)
            .ok_or_else(|| KernelError::ObjectUnknown(format!("id {id}")))
    }

    pub fn contains_id(&self, id: ObjectId) -> bool {
        self.entity_of(id).is_some()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn meta_by_id(&self, id: ObjectId) -> Option<&ObjectMeta> {
        let entity = self.entity_of(id)?;
        self.world.get::<ObjectMeta>(entity)
    }

    pub fn meta_by_name(&self, name: &str) -> Option<&ObjectMeta> {
        let entity = *self.by_name.get(name)?;
        self.world.get::<ObjectMeta>(entity)
    }

    /// Live component behind a typed ref, or `None` when the ref does not
    /// resolve or the object is of a different kind.
    pub fn get<T: ModelComponent>(&self, r: &TypedRef<T>) -> Option<&T> {
        let entity = self.entity_of(r.id)?;
        self.world.get::<T>(entity)
    }

    pub fn get_by_name<T: ModelComponent>(&self, name: &str) -> Option<&T> {
        let entity = *self.by_name.get(name)?;
        self.world.get::<T>(entity)
    }

    /// Typed ref for a name, when an object of kind `T` holds it.
    pub fn ref_by_name<T: ModelComponent>(&self, name: &str) -> Option<TypedRef<T>> {
        let entity = *self.by_name.get(name)?;
        self.world.get::<T>(entity)?;
        let meta = self.world.get::<ObjectMeta>(entity)?;
        Some(TypedRef::new(meta.id, meta.name.clone()))
    }

    pub fn ref_by_id<T: ModelComponent>(&self, id: ObjectId) -> Option<TypedRef<T>> {
        let entity = self.entity_of(id)?;
        self.world.get::<T>(entity)?;
        let meta = self.world.get::<ObjectMeta>(entity)?;
        Some(TypedRef::new(meta.id, meta.name.clone()))
    }

    pub fn any_ref_by_name(&self, name: &str) -> Option<ObjectRef> {
        let meta = self.meta_by_name(name)?;
        Some(ObjectRef::new(meta.id, meta.name.clone()))
    }

    pub fn any_ref_by_id(&self, id: ObjectId) -> Option<ObjectRef> {
        let meta = self.meta_by_id(id)?;
        Some(ObjectRef::new(meta.id, meta.name.clone()))
    }

    /// Refs to all objects of kind `T`, in insertion order.
    pub fn refs_of_kind<T: ModelComponent>(&self) -> Vec<TypedRef<T>> {
        self.insertion
            .iter()
            .filter(|entity| self.world.get::<T>(**entity).is_some())
            .filter_map(|entity| self.world.get::<ObjectMeta>(*entity))
            .map(|meta| TypedRef::new(meta.id, meta.name.clone()))
            .collect()
    }

    /// All objects of kind `T` with their metadata, in insertion order.
    pub fn objects_of_kind<T: ModelComponent>(&self) -> Vec<(&ObjectMeta, &T)> {
        self.insertion
            .iter()
            .filter_map(|entity| {
                let component = self.world.get::<T>(*entity)?;
                let meta = self.world.get::<ObjectMeta>(*entity)?;
                Some((meta, component))
            })
            .collect()
    }

    pub fn snapshot_by_id(&self, id: ObjectId) -> Option<ObjectSnapshot> {
        let entity = self.entity_of(id)?;
        self.snapshot_entity(entity)
    }

    /// Snapshots of all objects in insertion order, e.g. for a model save.
    pub fn snapshots(&self) -> Vec<ObjectSnapshot> {
        self.insertion
            .iter()
            .filter_map(|entity| self.snapshot_entity(*entity))
            .collect()
    }

    /// Snapshots of objects whose name matches `pattern`, optionally
    /// restricted to one kind, in insertion order. O(N) in model size.
    pub fn find_by_pattern(
        &self,
        kind: Option<ObjectKind>,
        pattern: &Regex,
    ) -> Vec<ObjectSnapshot> {
        self.insertion
            .iter()
            .filter_map(|entity| self.snapshot_entity(*entity))
            .filter(|snapshot| kind.map_or(true, |k| snapshot.kind() == k))
            .filter(|snapshot| pattern.is_match(snapshot.name()))
            .collect()
    }

    fn snapshot_entity(&self, entity: Entity) -> Option<ObjectSnapshot> {
        let meta = self.world.get::<ObjectMeta>(entity)?.clone();
        let data = self.data_of(entity)?;
        Some(ObjectSnapshot { meta, data })
    }

    fn data_of(&self, entity: Entity) -> Option<ObjectData> {
        macro_rules! try_kind {
            ($($ty:ident),* $(,)?) => {
                $(
                    if let Some(c) = self.world.get::<$ty>(entity) {
                        return Some(ObjectData::$ty(c.clone()));
                    }
                )*
            };
        }
        try_kind!(
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
        None
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Applies `f` to the component behind `r` and emits a `Modified` event
    /// carrying the pre- and post-mutation snapshots.
    pub fn modify<T: ModelComponent, R>(
        &mut self,
        r: &TypedRef<T>,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R> {
        self.assert_not_dispatching();
        let entity = self.require_entity(r.id)?;
        let previous = self
            .snapshot_entity(entity)
            .ok_or_else(|| KernelError::ObjectUnknown(r.name.clone()))?;
        let result = {
            let mut component = self
                .world
                .get_mut::<T>(entity)
                .ok_or_else(|| KernelError::ObjectUnknown(r.name.clone()))?;
            f(&mut component)
        };
        let current = self
            .snapshot_entity(entity)
            .ok_or_else(|| KernelError::ObjectUnknown(r.name.clone()))?;
        self.emit(ObjectEventKind::Modified, Some(current), Some(previous));
        Ok(result)
    }

    /// Renames an object. Renaming to the current name is a no-op that still
    /// emits a `Modified` event.
    pub fn rename(&mut self, id: ObjectId, new_name: &str) -> Result<()> {
        self.assert_not_dispatching();
        let entity = self.require_entity(id)?;
        let previous = self
            .snapshot_entity(entity)
            .ok_or_else(|| KernelError::ObjectUnknown(format!("id {id}")))?;

        if previous.name() != new_name {
            if self.by_name.contains_key(new_name) {
                return Err(KernelError::ObjectExists(new_name.to_string()));
            }
            self.by_name.remove(previous.name());
            self.by_name.insert(new_name.to_string(), entity);
            if let Some(mut meta) = self.world.get_mut::<ObjectMeta>(entity) {
                meta.name = new_name.to_string();
            }
        }

        let current = self
            .snapshot_entity(entity)
            .ok_or_else(|| KernelError::ObjectUnknown(format!("id {id}")))?;
        self.emit(ObjectEventKind::Modified, Some(current), Some(previous));
        Ok(())
    }

    /// Sets or, with `None`, removes a user property.
    pub fn set_property(&mut self, id: ObjectId, key: &str, value: Option<&str>) -> Result<()> {
        self.assert_not_dispatching();
        let entity = self.require_entity(id)?;
        let previous = self
            .snapshot_entity(entity)
            .ok_or_else(|| KernelError::ObjectUnknown(format!("id {id}")))?;
        {
            let mut meta = self
                .world
                .get_mut::<ObjectMeta>(entity)
                .ok_or_else(|| KernelError::ObjectUnknown(format!("id {id}")))?;
            match value {
                Some(value) => {
                    meta.properties.insert(key.to_string(), value.to_string());
                }
                None => {
                    meta.properties.remove(key);
                }
            }
        }
        let current = self
            .snapshot_entity(entity)
            .ok_or_else(|| KernelError::ObjectUnknown(format!("id {id}")))?;
        self.emit(ObjectEventKind::Modified, Some(current), Some(previous));
        Ok(())
    }

    pub fn clear_properties(&mut self, id: ObjectId) -> Result<()> {
        self.assert_not_dispatching();
        let entity = self.require_entity(id)?;
        let previous = self
            .snapshot_entity(entity)
            .ok_or_else(|| KernelError::ObjectUnknown(format!("id {id}")))?;
        if let Some(mut meta) = self.world.get_mut::<ObjectMeta>(entity) {
            meta.properties.clear();
        }
        let current = self
            .snapshot_entity(entity)
            .ok_or_else(|| KernelError::ObjectUnknown(format!("id {id}")))?;
        self.emit(ObjectEventKind::Modified, Some(current), Some(previous));
        Ok(())
    }

    /// Removes the object and emits a `Removed` event with its final
    /// snapshot. Cascading (paths of a removed point etc.) is the facade's
    /// responsibility and must happen before this call.
    pub fn remove(&mut self, id: ObjectId) -> Result<ObjectSnapshot> {
        self.assert_not_dispatching();
        let entity = self.require_entity(id)?;
        let snapshot = self
            .snapshot_entity(entity)
            .ok_or_else(|| KernelError::ObjectUnknown(format!("id {id}")))?;

        self.world.despawn(entity);
        self.by_id[id.index()] = None;
        self.by_name.remove(&snapshot.meta.name);
        self.insertion.retain(|e| *e != entity);
        self.id_bits.clear(id);

        debug!(name = %snapshot.meta.name, id = %id, "object removed");
        self.emit(ObjectEventKind::Removed, None, Some(snapshot.clone()));
        Ok(snapshot)
    }

    /// Drops every object and resets identity state. No events are emitted;
    /// this precedes a model load or create.
    pub fn clear(&mut self) {
        self.assert_not_dispatching();
        self.world = World::new();
        self.id_bits.clear_all();
        self.by_id.clear();
        self.by_name.clear();
        self.insertion.clear();
    }

    fn emit(
        &self,
        kind: ObjectEventKind,
        current: Option<ObjectSnapshot>,
        previous: Option<ObjectSnapshot>,
    ) {
        self.bus.publish(&ObjectEvent {
            kind,
            current,
            previous,
        });
    }

    fn assert_not_dispatching(&self) {
        debug_assert!(
            !self.bus.is_dispatching(),
            "model mutation from within an event listener"
        );
    }
}
