//! The kernel supervisor: the three-mode state machine and the public
//! operation surface.
//!
//! Every operation runs under the kernel's reader/writer lock, checks the
//! caller's permission, checks the current mode, and only then touches the
//! model. Structural events are published synchronously while the writer
//! lock is held, so all clients observe one global mutation order.
//!
//! Mode gating in short: `Modelling` admits topology editing and rejects
//! order processing; `Operating` admits order processing, property edits and
//! vehicle-runtime updates but rejects shape changes that would alter
//! routing; `Shutdown` rejects everything.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tracing::{debug, info};

use crate::config::{ConfigurationItem, ConfigurationStore, KernelConfig};
use crate::error::{KernelError, Result};
use crate::events::EventBus;
use crate::facade::Model;
use crate::model::{
    Block, CommAdapterState, Destination, DriveOrder, DriveOrderState, Group, LoadHandlingDevice,
    Location, LocationType, Message, MessageKind, ObjectKind, ObjectSnapshot, OrderSequence, Path,
    Point, PointKind, StaticRoute, TransportOrder, Triple, Vehicle, VehicleProcState, VehicleState,
    VisualLayout, OP_MOVE, OP_PARK,
};
use crate::orders::{now_ms, OrderService};
use crate::persistence::{
    available_scripts, load_order_script, FileModelStore, ModelStore, PersistedModel,
};
use crate::refs::{ObjectId, ObjectRef, TypedRef};
use crate::routing::{Router, TravelCosts};
use crate::users::{Permission, PermissionSet, UserStore};

/// The kernel's operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    /// The model may be edited; orders are not processed.
    Modelling,
    /// Orders are processed; the topology is frozen.
    Operating,
    /// Terminal. Nothing is accepted any more.
    Shutdown,
}

/// Receiver side of `send_comm_adapter_message`: one adapter per vehicle,
/// delivery is one-way and fire-and-forget.
pub trait CommAdapter: Send + Sync {
    fn process_message(&self, vehicle: &TypedRef<Vehicle>, message: &Value);
}

/// Typed queries answerable through [`Kernel::query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    AvailableScriptFiles,
    RoutingInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    AvailableScriptFiles(Vec<String>),
    RoutingInfo(RoutingInfo),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingInfo {
    pub point_count: usize,
    pub path_count: usize,
    pub cached_routing_tables: usize,
}

struct KernelInner {
    state: KernelState,
    model: Model,
    orders: OrderService,
    users: UserStore,
    active_permissions: PermissionSet,
    configuration: ConfigurationStore,
    simulation_time_factor: f64,
    current_model_name: String,
    comm_adapters: HashMap<ObjectId, Arc<dyn CommAdapter>>,
}

pub struct Kernel {
    inner: RwLock<KernelInner>,
    bus: Arc<EventBus>,
    router: Arc<Router>,
    store: Box<dyn ModelStore>,
    config: KernelConfig,
}

impl Kernel {
    /// A kernel in `Modelling` state with a file-backed model store.
    pub fn new(config: KernelConfig) -> Self {
        let store = Box::new(FileModelStore::new(config.model_dir.clone()));
        Self::with_store(config, store)
    }

    pub fn with_store(config: KernelConfig, store: Box<dyn ModelStore>) -> Self {
        let bus = EventBus::new();
        let router = Arc::new(Router::new(config.router.clone()));
        bus.subscribe(router.clone());

        let inner = KernelInner {
            state: KernelState::Modelling,
            model: Model::new(bus.clone()),
            orders: OrderService::new(),
            users: UserStore::new(),
            active_permissions: Permission::all(),
            configuration: ConfigurationStore::default(),
            simulation_time_factor: 1.0,
            current_model_name: "unnamed".to_string(),
            comm_adapters: HashMap::new(),
        };
        Self {
            inner: RwLock::new(inner),
            bus,
            router,
            store,
            config,
        }
    }

    /// The central event bus; clients subscribe here for structural events.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    fn read(&self) -> RwLockReadGuard<'_, KernelInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, KernelInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Gating helpers
    // -----------------------------------------------------------------------

    fn check_permission(inner: &KernelInner, permission: Permission) -> Result<()> {
        if inner.active_permissions.contains(&permission) {
            return Ok(());
        }
        Err(KernelError::Credentials(format!(
            "operation requires the {permission:?} permission"
        )))
    }

    fn check_state(inner: &KernelInner, allowed: &[KernelState], operation: &str) -> Result<()> {
        if allowed.contains(&inner.state) {
            return Ok(());
        }
        Err(KernelError::UnsupportedKernelOp(format!(
            "{operation} is not supported in kernel state {:?}",
            inner.state
        )))
    }

    const LIVE: [KernelState; 2] = [KernelState::Modelling, KernelState::Operating];
    const MODELLING: [KernelState; 1] = [KernelState::Modelling];
    const OPERATING: [KernelState; 1] = [KernelState::Operating];

    fn guard<'a>(
        guard: &'a mut RwLockWriteGuard<'_, KernelInner>,
        permission: Permission,
        allowed: &[KernelState],
        operation: &str,
    ) -> Result<&'a mut KernelInner> {
        Self::check_permission(guard, permission)?;
        Self::check_state(guard, allowed, operation)?;
        Ok(&mut *guard)
    }

    // -----------------------------------------------------------------------
    // Kernel state
    // -----------------------------------------------------------------------

    pub fn state(&self) -> KernelState {
        self.read().state
    }

    /// Modelling ↔ Operating, either → Shutdown. Shutdown is terminal.
    pub fn set_state(&self, state: KernelState) -> Result<()> {
        let mut inner = self.write();
        Self::check_permission(&inner, Permission::ChangeKernelState)?;

        let current = inner.state;
        let allowed = match (current, state) {
            (a, b) if a == b => true,
            (KernelState::Modelling, KernelState::Operating) => true,
            (KernelState::Operating, KernelState::Modelling) => true,
            (_, KernelState::Shutdown) => current != KernelState::Shutdown,
            _ => false,
        };
        if !allowed {
            return Err(KernelError::IllegalState(format!(
                "kernel state transition {current:?} -> {state:?} is not allowed"
            )));
        }
        if current != state {
            info!(from = ?current, to = ?state, "kernel state transition");
            inner.state = state;
            self.router.invalidate();
        }
        Ok(())
    }

    pub fn simulation_time_factor(&self) -> f64 {
        self.read().simulation_time_factor
    }

    pub fn set_simulation_time_factor(&self, factor: f64) -> Result<()> {
        let mut inner = self.write();
        Self::check_permission(&inner, Permission::ChangeConfiguration)?;
        Self::check_state(&inner, &Self::LIVE, "set_simulation_time_factor")?;
        if !factor.is_finite() || factor <= 0.0 {
            return Err(KernelError::IllegalArgument(format!(
                "simulation time factor {factor} must be positive"
            )));
        }
        inner.simulation_time_factor = factor;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users and permissions
    // -----------------------------------------------------------------------

    /// Switches the active client by verifying credentials.
    pub fn login(&self, name: &str, password: &str) -> Result<()> {
        let mut inner = self.write();
        let permissions = inner.users.authenticate(name, password)?;
        inner.active_permissions = permissions;
        Ok(())
    }

    /// Permissions of the currently authenticated client.
    pub fn user_permissions(&self) -> PermissionSet {
        self.read().active_permissions.clone()
    }

    pub fn create_user(
        &self,
        name: &str,
        password: &str,
        permissions: PermissionSet,
    ) -> Result<()> {
        let mut inner = self.write();
        Self::check_permission(&inner, Permission::ManageUsers)?;
        Self::check_state(&inner, &Self::LIVE, "create_user")?;
        inner.users.create_user(name, password, permissions)
    }

    pub fn set_user_password(&self, name: &str, password: &str) -> Result<()> {
        let mut inner = self.write();
        Self::check_permission(&inner, Permission::ManageUsers)?;
        Self::check_state(&inner, &Self::LIVE, "set_user_password")?;
        inner.users.set_user_password(name, password)
    }

    pub fn set_user_permissions(&self, name: &str, permissions: PermissionSet) -> Result<()> {
        let mut inner = self.write();
        Self::check_permission(&inner, Permission::ManageUsers)?;
        Self::check_state(&inner, &Self::LIVE, "set_user_permissions")?;
        inner.users.set_user_permissions(name, permissions)
    }

    pub fn remove_user(&self, name: &str) -> Result<()> {
        let mut inner = self.write();
        Self::check_permission(&inner, Permission::ManageUsers)?;
        Self::check_state(&inner, &Self::LIVE, "remove_user")?;
        inner.users.remove_user(name)
    }

    // -----------------------------------------------------------------------
    // Model lifecycle
    // -----------------------------------------------------------------------

    pub fn model_names(&self) -> Result<Vec<String>> {
        let inner = self.read();
        Self::check_permission(&inner, Permission::ReadData)?;
        Self::check_state(&inner, &Self::LIVE, "model_names")?;
        self.store.model_names()
    }

    pub fn current_model_name(&self) -> String {
        self.read().current_model_name.clone()
    }

    /// Drops the current model and starts an empty one under `name`.
    pub fn create_model(&self, name: &str) -> Result<()> {
        let mut inner = self.write();
        let inner =
            Self::guard(&mut inner, Permission::LoadSaveModel, &Self::MODELLING, "create_model")?;
        inner.model.pool_mut().clear();
        inner.current_model_name = name.to_string();
        self.router.invalidate();
        info!(model = %name, "created empty model");
        Ok(())
    }

    /// Clears the pool (identity state included), then restores every
    /// persisted object under its original id and name.
    pub fn load_model(&self, name: &str) -> Result<()> {
        let mut inner = self.write();
        let inner =
            Self::guard(&mut inner, Permission::LoadSaveModel, &Self::MODELLING, "load_model")?;
        let persisted = self.store.load(name)?;

        inner.model.pool_mut().clear();
        for snapshot in persisted.objects {
            inner.model.pool_mut().restore(snapshot)?;
        }
        inner.current_model_name = persisted.name;
        self.router.invalidate();
        Ok(())
    }

    /// Saves a consistent snapshot under `name` (default: the current model
    /// name).
    pub fn save_model(&self, name: Option<&str>, overwrite: bool) -> Result<()> {
        let mut inner = self.write();
        let inner =
            Self::guard(&mut inner, Permission::LoadSaveModel, &Self::LIVE, "save_model")?;
        let name = name.unwrap_or(&inner.current_model_name).to_string();
        let persisted = PersistedModel {
            name: name.clone(),
            objects: inner.model.pool().snapshots(),
        };
        self.store.save(&persisted, overwrite)?;
        inner.current_model_name = name;
        Ok(())
    }

    pub fn remove_model(&self, name: &str) -> Result<()> {
        let mut inner = self.write();
        Self::guard(&mut inner, Permission::LoadSaveModel, &Self::MODELLING, "remove_model")?;
        self.store.remove(name)
    }

    // -----------------------------------------------------------------------
    // Generic entity access
    // -----------------------------------------------------------------------

    pub fn object(&self, name: &str) -> Result<Option<ObjectSnapshot>> {
        let inner = self.read();
        Self::check_permission(&inner, Permission::ReadData)?;
        Self::check_state(&inner, &Self::LIVE, "object")?;
        Ok(inner
            .model
            .pool()
            .meta_by_name(name)
            .map(|meta| meta.id)
            .and_then(|id| inner.model.pool().snapshot_by_id(id)))
    }

    pub fn object_by_id(&self, id: ObjectId) -> Result<Option<ObjectSnapshot>> {
        let inner = self.read();
        Self::check_permission(&inner, Permission::ReadData)?;
        Self::check_state(&inner, &Self::LIVE, "object_by_id")?;
        Ok(inner.model.pool().snapshot_by_id(id))
    }

    /// Objects filtered by kind and/or a name regex.
    pub fn objects(
        &self,
        kind: Option<ObjectKind>,
        name_pattern: Option<&str>,
    ) -> Result<Vec<ObjectSnapshot>> {
        let inner = self.read();
        Self::check_permission(&inner, Permission::ReadData)?;
        Self::check_state(&inner, &Self::LIVE, "objects")?;
        let pattern = name_pattern.unwrap_or(".*");
        let regex = regex::Regex::new(pattern)
            .map_err(|e| KernelError::IllegalArgument(format!("invalid name pattern: {e}")))?;
        Ok(inner.model.pool().find_by_pattern(kind, &regex))
    }

    pub fn rename_object(&self, object: &ObjectRef, new_name: &str) -> Result<()> {
        let mut inner = self.write();
        let inner =
            Self::guard(&mut inner, Permission::ModifyModel, &Self::MODELLING, "rename_object")?;
        inner.model.rename_object(object, new_name)
    }

    /// Property edits stay allowed while operating.
    pub fn set_object_property(
        &self,
        object: &ObjectRef,
        key: &str,
        value: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::LIVE,
            "set_object_property",
        )?;
        inner.model.set_object_property(object, key, value)
    }

    pub fn clear_object_properties(&self, object: &ObjectRef) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::LIVE,
            "clear_object_properties",
        )?;
        inner.model.clear_object_properties(object)
    }

    pub fn remove_object(&self, object: &ObjectRef) -> Result<()> {
        let mut inner = self.write();
        let inner =
            Self::guard(&mut inner, Permission::ModifyModel, &Self::MODELLING, "remove_object")?;
        inner.model.remove_object(object)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Topology: points and paths (Modelling only)
    // -----------------------------------------------------------------------

    pub fn create_point(&self) -> Result<TypedRef<Point>> {
        let mut inner = self.write();
        let inner =
            Self::guard(&mut inner, Permission::ModifyModel, &Self::MODELLING, "create_point")?;
        inner.model.create_point()
    }

    pub fn set_point_position(&self, point: &TypedRef<Point>, position: Triple) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "set_point_position",
        )?;
        inner.model.set_point_position(point, position)
    }

    pub fn set_point_kind(&self, point: &TypedRef<Point>, kind: PointKind) -> Result<()> {
        let mut inner = self.write();
        let inner =
            Self::guard(&mut inner, Permission::ModifyModel, &Self::MODELLING, "set_point_kind")?;
        inner.model.set_point_kind(point, kind)
    }

    pub fn set_point_vehicle_orientation_angle(
        &self,
        point: &TypedRef<Point>,
        angle: f64,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "set_point_vehicle_orientation_angle",
        )?;
        inner.model.set_point_vehicle_orientation_angle(point, angle)
    }

    pub fn create_path(
        &self,
        source: &TypedRef<Point>,
        destination: &TypedRef<Point>,
    ) -> Result<TypedRef<Path>> {
        let mut inner = self.write();
        let inner =
            Self::guard(&mut inner, Permission::ModifyModel, &Self::MODELLING, "create_path")?;
        inner.model.create_path(source, destination)
    }

    pub fn set_path_length(&self, path: &TypedRef<Path>, length: i64) -> Result<()> {
        let mut inner = self.write();
        let inner =
            Self::guard(&mut inner, Permission::ModifyModel, &Self::MODELLING, "set_path_length")?;
        inner.model.set_path_length(path, length)
    }

    pub fn set_path_routing_cost(&self, path: &TypedRef<Path>, cost: i64) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "set_path_routing_cost",
        )?;
        inner.model.set_path_routing_cost(path, cost)
    }

    pub fn set_path_max_velocity(&self, path: &TypedRef<Path>, velocity: i64) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "set_path_max_velocity",
        )?;
        inner.model.set_path_max_velocity(path, velocity)
    }

    pub fn set_path_max_reverse_velocity(
        &self,
        path: &TypedRef<Path>,
        velocity: i64,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "set_path_max_reverse_velocity",
        )?;
        inner.model.set_path_max_reverse_velocity(path, velocity)
    }

    pub fn set_path_locked(&self, path: &TypedRef<Path>, locked: bool) -> Result<()> {
        let mut inner = self.write();
        let inner =
            Self::guard(&mut inner, Permission::ModifyModel, &Self::MODELLING, "set_path_locked")?;
        inner.model.set_path_locked(path, locked)
    }

    // -----------------------------------------------------------------------
    // Topology: locations (Modelling only)
    // -----------------------------------------------------------------------

    pub fn create_location_type(&self) -> Result<TypedRef<LocationType>> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "create_location_type",
        )?;
        inner.model.create_location_type()
    }

    pub fn add_location_type_allowed_operation(
        &self,
        location_type: &TypedRef<LocationType>,
        operation: &str,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "add_location_type_allowed_operation",
        )?;
        inner
            .model
            .add_location_type_allowed_operation(location_type, operation)
    }

    pub fn remove_location_type_allowed_operation(
        &self,
        location_type: &TypedRef<LocationType>,
        operation: &str,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "remove_location_type_allowed_operation",
        )?;
        inner
            .model
            .remove_location_type_allowed_operation(location_type, operation)
    }

    pub fn create_location(
        &self,
        location_type: &TypedRef<LocationType>,
    ) -> Result<TypedRef<Location>> {
        let mut inner = self.write();
        let inner =
            Self::guard(&mut inner, Permission::ModifyModel, &Self::MODELLING, "create_location")?;
        inner.model.create_location(location_type)
    }

    pub fn set_location_position(
        &self,
        location: &TypedRef<Location>,
        position: Triple,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "set_location_position",
        )?;
        inner.model.set_location_position(location, position)
    }

    pub fn set_location_type(
        &self,
        location: &TypedRef<Location>,
        location_type: &TypedRef<LocationType>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "set_location_type",
        )?;
        inner.model.set_location_type(location, location_type)
    }

    pub fn connect_location_to_point(
        &self,
        location: &TypedRef<Location>,
        point: &TypedRef<Point>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "connect_location_to_point",
        )?;
        inner.model.connect_location_to_point(location, point)
    }

    pub fn disconnect_location_from_point(
        &self,
        location: &TypedRef<Location>,
        point: &TypedRef<Point>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "disconnect_location_from_point",
        )?;
        inner.model.disconnect_location_from_point(location, point)
    }

    pub fn add_location_link_allowed_operation(
        &self,
        location: &TypedRef<Location>,
        point: &TypedRef<Point>,
        operation: &str,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "add_location_link_allowed_operation",
        )?;
        inner
            .model
            .add_location_link_allowed_operation(location, point, operation)
    }

    pub fn remove_location_link_allowed_operation(
        &self,
        location: &TypedRef<Location>,
        point: &TypedRef<Point>,
        operation: &str,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "remove_location_link_allowed_operation",
        )?;
        inner
            .model
            .remove_location_link_allowed_operation(location, point, operation)
    }

    pub fn clear_location_link_allowed_operations(
        &self,
        location: &TypedRef<Location>,
        point: &TypedRef<Point>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "clear_location_link_allowed_operations",
        )?;
        inner
            .model
            .clear_location_link_allowed_operations(location, point)
    }

    // -----------------------------------------------------------------------
    // Topology: blocks, groups, static routes, layouts (Modelling only)
    // -----------------------------------------------------------------------

    pub fn create_block(&self) -> Result<TypedRef<Block>> {
        let mut inner = self.write();
        let inner =
            Self::guard(&mut inner, Permission::ModifyModel, &Self::MODELLING, "create_block")?;
        inner.model.create_block()
    }

    pub fn add_block_member(&self, block: &TypedRef<Block>, member: &ObjectRef) -> Result<()> {
        let mut inner = self.write();
        let inner =
            Self::guard(&mut inner, Permission::ModifyModel, &Self::MODELLING, "add_block_member")?;
        inner.model.add_block_member(block, member)
    }

    pub fn remove_block_member(&self, block: &TypedRef<Block>, member: &ObjectRef) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "remove_block_member",
        )?;
        inner.model.remove_block_member(block, member)
    }

    pub fn create_group(&self) -> Result<TypedRef<Group>> {
        let mut inner = self.write();
        let inner =
            Self::guard(&mut inner, Permission::ModifyModel, &Self::MODELLING, "create_group")?;
        inner.model.create_group()
    }

    pub fn add_group_member(&self, group: &TypedRef<Group>, member: &ObjectRef) -> Result<()> {
        let mut inner = self.write();
        let inner =
            Self::guard(&mut inner, Permission::ModifyModel, &Self::MODELLING, "add_group_member")?;
        inner.model.add_group_member(group, member)
    }

    pub fn remove_group_member(&self, group: &TypedRef<Group>, member: &ObjectRef) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "remove_group_member",
        )?;
        inner.model.remove_group_member(group, member)
    }

    pub fn create_static_route(&self) -> Result<TypedRef<StaticRoute>> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "create_static_route",
        )?;
        inner.model.create_static_route()
    }

    pub fn add_static_route_hop(
        &self,
        route: &TypedRef<StaticRoute>,
        hop: &TypedRef<Point>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "add_static_route_hop",
        )?;
        inner.model.add_static_route_hop(route, hop)
    }

    pub fn clear_static_route_hops(&self, route: &TypedRef<StaticRoute>) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "clear_static_route_hops",
        )?;
        inner.model.clear_static_route_hops(route)
    }

    pub fn create_visual_layout(&self) -> Result<TypedRef<VisualLayout>> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "create_visual_layout",
        )?;
        inner.model.create_visual_layout()
    }

    pub fn set_visual_layout_scale_x(
        &self,
        layout: &TypedRef<VisualLayout>,
        scale: f64,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "set_visual_layout_scale_x",
        )?;
        inner.model.set_visual_layout_scale_x(layout, scale)
    }

    pub fn set_visual_layout_scale_y(
        &self,
        layout: &TypedRef<VisualLayout>,
        scale: f64,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "set_visual_layout_scale_y",
        )?;
        inner.model.set_visual_layout_scale_y(layout, scale)
    }

    pub fn set_visual_layout_colors(
        &self,
        layout: &TypedRef<VisualLayout>,
        colors: std::collections::BTreeMap<String, u32>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "set_visual_layout_colors",
        )?;
        inner.model.set_visual_layout_colors(layout, colors)
    }

    pub fn set_visual_layout_elements(
        &self,
        layout: &TypedRef<VisualLayout>,
        elements: Vec<Value>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "set_visual_layout_elements",
        )?;
        inner.model.set_visual_layout_elements(layout, elements)
    }

    pub fn set_visual_layout_view_bookmarks(
        &self,
        layout: &TypedRef<VisualLayout>,
        bookmarks: Vec<Value>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyModel,
            &Self::MODELLING,
            "set_visual_layout_view_bookmarks",
        )?;
        inner.model.set_visual_layout_view_bookmarks(layout, bookmarks)
    }

    pub fn attach_resource(&self, resource: &ObjectRef, attachment: &ObjectRef) -> Result<()> {
        let mut inner = self.write();
        let inner =
            Self::guard(&mut inner, Permission::ModifyModel, &Self::MODELLING, "attach_resource")?;
        inner.model.attach_resource(resource, attachment)
    }

    pub fn detach_resource(&self, resource: &ObjectRef, attachment: &ObjectRef) -> Result<()> {
        let mut inner = self.write();
        let inner =
            Self::guard(&mut inner, Permission::ModifyModel, &Self::MODELLING, "detach_resource")?;
        inner.model.detach_resource(resource, attachment)
    }

    pub fn expand_resources(
        &self,
        resources: &[ObjectRef],
    ) -> Result<std::collections::BTreeSet<ObjectRef>> {
        let inner = self.read();
        Self::check_permission(&inner, Permission::ReadData)?;
        Self::check_state(&inner, &Self::LIVE, "expand_resources")?;
        inner.model.expand_resources(resources)
    }

    pub fn effective_resources(
        &self,
        resources: &[ObjectRef],
    ) -> Result<std::collections::BTreeSet<ObjectRef>> {
        let inner = self.read();
        Self::check_permission(&inner, Permission::ReadData)?;
        Self::check_state(&inner, &Self::LIVE, "effective_resources")?;
        inner.model.effective_resources(resources)
    }

    // -----------------------------------------------------------------------
    // Vehicles (create/remove in Modelling; runtime updates in both modes)
    // -----------------------------------------------------------------------

    pub fn create_vehicle(&self) -> Result<TypedRef<Vehicle>> {
        let mut inner = self.write();
        let inner =
            Self::guard(&mut inner, Permission::ModifyModel, &Self::MODELLING, "create_vehicle")?;
        inner.model.create_vehicle()
    }

    pub fn set_vehicle_length(&self, vehicle: &TypedRef<Vehicle>, length: i64) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "set_vehicle_length",
        )?;
        inner.model.set_vehicle_length(vehicle, length)
    }

    pub fn set_vehicle_energy_level(&self, vehicle: &TypedRef<Vehicle>, level: u32) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "set_vehicle_energy_level",
        )?;
        inner.model.set_vehicle_energy_level(vehicle, level)
    }

    pub fn set_vehicle_energy_level_critical(
        &self,
        vehicle: &TypedRef<Vehicle>,
        level: u32,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "set_vehicle_energy_level_critical",
        )?;
        inner.model.set_vehicle_energy_level_critical(vehicle, level)
    }

    pub fn set_vehicle_energy_level_good(
        &self,
        vehicle: &TypedRef<Vehicle>,
        level: u32,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "set_vehicle_energy_level_good",
        )?;
        inner.model.set_vehicle_energy_level_good(vehicle, level)
    }

    pub fn set_vehicle_max_velocity(&self, vehicle: &TypedRef<Vehicle>, velocity: i64) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "set_vehicle_max_velocity",
        )?;
        inner.model.set_vehicle_max_velocity(vehicle, velocity)
    }

    pub fn set_vehicle_max_reverse_velocity(
        &self,
        vehicle: &TypedRef<Vehicle>,
        velocity: i64,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "set_vehicle_max_reverse_velocity",
        )?;
        inner.model.set_vehicle_max_reverse_velocity(vehicle, velocity)
    }

    pub fn set_vehicle_recharge_operation(
        &self,
        vehicle: &TypedRef<Vehicle>,
        operation: &str,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "set_vehicle_recharge_operation",
        )?;
        inner.model.set_vehicle_recharge_operation(vehicle, operation)
    }

    pub fn set_vehicle_state(&self, vehicle: &TypedRef<Vehicle>, state: VehicleState) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "set_vehicle_state",
        )?;
        inner.model.set_vehicle_state(vehicle, state)
    }

    /// Proc-state changes go through the order service so a vehicle leaving
    /// `ProcessingOrder` completes a pending withdrawal.
    pub fn set_vehicle_proc_state(
        &self,
        vehicle: &TypedRef<Vehicle>,
        proc_state: VehicleProcState,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "set_vehicle_proc_state",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.set_vehicle_proc_state(model, vehicle, proc_state)
    }

    pub fn set_vehicle_adapter_state(
        &self,
        vehicle: &TypedRef<Vehicle>,
        adapter_state: CommAdapterState,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "set_vehicle_adapter_state",
        )?;
        inner.model.set_vehicle_adapter_state(vehicle, adapter_state)
    }

    pub fn set_vehicle_position(
        &self,
        vehicle: &TypedRef<Vehicle>,
        point: Option<&TypedRef<Point>>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "set_vehicle_position",
        )?;
        inner.model.set_vehicle_position(vehicle, point)
    }

    pub fn set_vehicle_next_position(
        &self,
        vehicle: &TypedRef<Vehicle>,
        point: Option<&TypedRef<Point>>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "set_vehicle_next_position",
        )?;
        inner.model.set_vehicle_next_position(vehicle, point)
    }

    pub fn set_vehicle_precise_position(
        &self,
        vehicle: &TypedRef<Vehicle>,
        position: Option<Triple>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "set_vehicle_precise_position",
        )?;
        inner.model.set_vehicle_precise_position(vehicle, position)
    }

    pub fn set_vehicle_orientation_angle(
        &self,
        vehicle: &TypedRef<Vehicle>,
        angle: f64,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "set_vehicle_orientation_angle",
        )?;
        inner.model.set_vehicle_orientation_angle(vehicle, angle)
    }

    pub fn set_vehicle_transport_order(
        &self,
        vehicle: &TypedRef<Vehicle>,
        order: Option<&TypedRef<TransportOrder>>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "set_vehicle_transport_order",
        )?;
        inner.model.set_vehicle_transport_order(vehicle, order)
    }

    pub fn set_vehicle_order_sequence(
        &self,
        vehicle: &TypedRef<Vehicle>,
        sequence: Option<&TypedRef<OrderSequence>>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "set_vehicle_order_sequence",
        )?;
        inner.model.set_vehicle_order_sequence(vehicle, sequence)
    }

    pub fn set_vehicle_route_progress_index(
        &self,
        vehicle: &TypedRef<Vehicle>,
        index: i32,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "set_vehicle_route_progress_index",
        )?;
        inner.model.set_vehicle_route_progress_index(vehicle, index)
    }

    pub fn set_vehicle_load_handling_devices(
        &self,
        vehicle: &TypedRef<Vehicle>,
        devices: Vec<LoadHandlingDevice>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "set_vehicle_load_handling_devices",
        )?;
        inner.model.set_vehicle_load_handling_devices(vehicle, devices)
    }

    // -----------------------------------------------------------------------
    // Comm adapters
    // -----------------------------------------------------------------------

    pub fn attach_comm_adapter(
        &self,
        vehicle: &TypedRef<Vehicle>,
        adapter: Arc<dyn CommAdapter>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "attach_comm_adapter",
        )?;
        inner.model.require(vehicle)?;
        inner.comm_adapters.insert(vehicle.id, adapter);
        Ok(())
    }

    pub fn detach_comm_adapter(&self, vehicle: &TypedRef<Vehicle>) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyVehicles,
            &Self::LIVE,
            "detach_comm_adapter",
        )?;
        inner.comm_adapters.remove(&vehicle.id);
        Ok(())
    }

    /// One-way, fire-and-forget delivery. A message to a vehicle without an
    /// attached adapter is dropped.
    pub fn send_comm_adapter_message(
        &self,
        vehicle: &TypedRef<Vehicle>,
        message: &Value,
    ) -> Result<()> {
        let inner = self.read();
        Self::check_permission(&inner, Permission::ModifyVehicles)?;
        Self::check_state(&inner, &Self::OPERATING, "send_comm_adapter_message")?;
        inner.model.require(vehicle)?;
        match inner.comm_adapters.get(&vehicle.id) {
            Some(adapter) => adapter.process_message(vehicle, message),
            None => debug!(vehicle = %vehicle.name, "no comm adapter attached, message dropped"),
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    pub fn publish_message(
        &self,
        body: impl Into<String>,
        kind: MessageKind,
    ) -> Result<TypedRef<Message>> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::PublishMessages,
            &Self::OPERATING,
            "publish_message",
        )?;
        inner.model.publish_message(body, kind, now_ms())
    }

    // -----------------------------------------------------------------------
    // Transport orders (Operating only)
    // -----------------------------------------------------------------------

    pub fn create_transport_order(
        &self,
        destinations: Vec<Destination>,
    ) -> Result<TypedRef<TransportOrder>> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "create_transport_order",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.create_transport_order(model, destinations)
    }

    pub fn activate_transport_order(&self, order: &TypedRef<TransportOrder>) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "activate_transport_order",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.activate_transport_order(model, order)
    }

    pub fn set_transport_order_deadline(
        &self,
        order: &TypedRef<TransportOrder>,
        deadline: i64,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "set_transport_order_deadline",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.set_transport_order_deadline(model, order, deadline)
    }

    pub fn set_transport_order_intended_vehicle(
        &self,
        order: &TypedRef<TransportOrder>,
        vehicle: Option<&TypedRef<Vehicle>>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "set_transport_order_intended_vehicle",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.set_transport_order_intended_vehicle(model, order, vehicle)
    }

    pub fn set_transport_order_dispensable(
        &self,
        order: &TypedRef<TransportOrder>,
        dispensable: bool,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "set_transport_order_dispensable",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.set_transport_order_dispensable(model, order, dispensable)
    }

    pub fn set_transport_order_future_drive_orders(
        &self,
        order: &TypedRef<TransportOrder>,
        drive_orders: Vec<DriveOrder>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "set_transport_order_future_drive_orders",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.set_transport_order_future_drive_orders(model, order, drive_orders)
    }

    pub fn add_transport_order_dependency(
        &self,
        order: &TypedRef<TransportOrder>,
        dependency: &TypedRef<TransportOrder>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "add_transport_order_dependency",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.add_transport_order_dependency(model, order, dependency)
    }

    pub fn remove_transport_order_dependency(
        &self,
        order: &TypedRef<TransportOrder>,
        dependency: &TypedRef<TransportOrder>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "remove_transport_order_dependency",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.remove_transport_order_dependency(model, order, dependency)
    }

    pub fn set_transport_order_next_drive_order(
        &self,
        order: &TypedRef<TransportOrder>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "set_transport_order_next_drive_order",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.set_transport_order_next_drive_order(model, order)
    }

    pub fn set_current_drive_order_state(
        &self,
        order: &TypedRef<TransportOrder>,
        state: DriveOrderState,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "set_current_drive_order_state",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.set_current_drive_order_state(model, order, state)
    }

    pub fn withdraw_transport_order(
        &self,
        order: &TypedRef<TransportOrder>,
        disable_vehicle: bool,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "withdraw_transport_order",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.withdraw_transport_order(model, order, disable_vehicle)
    }

    pub fn withdraw_transport_order_by_vehicle(
        &self,
        vehicle: &TypedRef<Vehicle>,
        disable_vehicle: bool,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "withdraw_transport_order_by_vehicle",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.withdraw_transport_order_by_vehicle(model, vehicle, disable_vehicle)
    }

    /// Tries to assign a dispatchable order to the vehicle; see
    /// [`OrderService::dispatch_vehicle`].
    pub fn dispatch_vehicle(
        &self,
        vehicle: &TypedRef<Vehicle>,
        set_idle_if_unavailable: bool,
    ) -> Result<Option<TypedRef<TransportOrder>>> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "dispatch_vehicle",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.dispatch_vehicle(model, &self.router, vehicle, set_idle_if_unavailable)
    }

    // -----------------------------------------------------------------------
    // Order sequences (Operating only)
    // -----------------------------------------------------------------------

    pub fn create_order_sequence(&self) -> Result<TypedRef<OrderSequence>> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "create_order_sequence",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.create_order_sequence(model)
    }

    pub fn add_order_sequence_order(
        &self,
        sequence: &TypedRef<OrderSequence>,
        order: &TypedRef<TransportOrder>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "add_order_sequence_order",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.add_order_sequence_order(model, sequence, order)
    }

    pub fn remove_order_sequence_order(
        &self,
        sequence: &TypedRef<OrderSequence>,
        order: &TypedRef<TransportOrder>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "remove_order_sequence_order",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.remove_order_sequence_order(model, sequence, order)
    }

    pub fn set_order_sequence_complete(&self, sequence: &TypedRef<OrderSequence>) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "set_order_sequence_complete",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.set_order_sequence_complete(model, sequence)
    }

    pub fn set_order_sequence_failure_fatal(
        &self,
        sequence: &TypedRef<OrderSequence>,
        failure_fatal: bool,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "set_order_sequence_failure_fatal",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.set_order_sequence_failure_fatal(model, sequence, failure_fatal)
    }

    pub fn set_order_sequence_intended_vehicle(
        &self,
        sequence: &TypedRef<OrderSequence>,
        vehicle: Option<&TypedRef<Vehicle>>,
    ) -> Result<()> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "set_order_sequence_intended_vehicle",
        )?;
        let KernelInner { model, orders, .. } = inner;
        orders.set_order_sequence_intended_vehicle(model, sequence, vehicle)
    }

    // -----------------------------------------------------------------------
    // Scripted orders
    // -----------------------------------------------------------------------

    /// Creates (and activates) the transport orders described by a script
    /// file in the configured script directory.
    pub fn create_transport_orders_from_script(
        &self,
        file_name: &str,
    ) -> Result<Vec<TypedRef<TransportOrder>>> {
        let mut inner = self.write();
        let inner = Self::guard(
            &mut inner,
            Permission::ModifyOrder,
            &Self::OPERATING,
            "create_transport_orders_from_script",
        )?;
        let script = load_order_script(&self.config.script_dir, file_name)?;
        let KernelInner { model, orders, .. } = inner;

        let mut created: Vec<TypedRef<TransportOrder>> = Vec::new();
        for script_order in script.orders {
            let mut destinations = Vec::with_capacity(script_order.destinations.len());
            for destination in &script_order.destinations {
                destinations.push(resolve_script_destination(
                    model,
                    &destination.location,
                    &destination.operation,
                )?);
            }
            let order = orders.create_transport_order(model, destinations)?;

            if let Some(deadline) = script_order.deadline_ms {
                orders.set_transport_order_deadline(model, &order, deadline)?;
            }
            if let Some(vehicle_name) = &script_order.intended_vehicle {
                let vehicle = model
                    .pool()
                    .ref_by_name::<Vehicle>(vehicle_name)
                    .ok_or_else(|| KernelError::ObjectUnknown(vehicle_name.clone()))?;
                orders.set_transport_order_intended_vehicle(model, &order, Some(&vehicle))?;
            }
            if script_order.depends_on_previous {
                if let Some(previous) = created.last().cloned() {
                    orders.add_transport_order_dependency(model, &order, &previous)?;
                }
            }
            orders.activate_transport_order(model, &order)?;
            created.push(order);
        }
        Ok(created)
    }

    // -----------------------------------------------------------------------
    // Routing queries
    // -----------------------------------------------------------------------

    /// Travel costs from a source location to each given destination
    /// location, cheapest first.
    pub fn travel_costs(
        &self,
        vehicle: &TypedRef<Vehicle>,
        source: &TypedRef<Location>,
        destinations: &[TypedRef<Location>],
    ) -> Result<Vec<TravelCosts>> {
        let inner = self.read();
        Self::check_permission(&inner, Permission::ReadData)?;
        Self::check_state(&inner, &Self::OPERATING, "travel_costs")?;
        self.router
            .travel_costs(&inner.model, vehicle, source, destinations)
    }

    /// Whether `vehicle` could process `order`; see
    /// [`Router::check_routability`].
    pub fn check_routability(
        &self,
        vehicle: &TypedRef<Vehicle>,
        order: &TypedRef<TransportOrder>,
    ) -> Result<bool> {
        let inner = self.read();
        Self::check_permission(&inner, Permission::ReadData)?;
        Self::check_state(&inner, &Self::OPERATING, "check_routability")?;
        self.router.check_routability(&inner.model, vehicle, order)
    }

    /// Recomputes routing tables for every vehicle, one vehicle per worker.
    pub fn recompute_routing_tables(&self) -> Result<usize> {
        let inner = self.read();
        Self::check_permission(&inner, Permission::ReadData)?;
        Self::check_state(&inner, &Self::OPERATING, "recompute_routing_tables")?;
        Ok(self.router.recompute_all(&inner.model))
    }

    // -----------------------------------------------------------------------
    // Configuration and queries
    // -----------------------------------------------------------------------

    pub fn configuration_items(&self) -> Result<Vec<ConfigurationItem>> {
        let inner = self.read();
        Self::check_permission(&inner, Permission::ReadData)?;
        Self::check_state(&inner, &Self::LIVE, "configuration_items")?;
        Ok(inner.configuration.items())
    }

    pub fn set_configuration_item(&self, item: ConfigurationItem) -> Result<()> {
        let mut inner = self.write();
        Self::check_permission(&inner, Permission::ChangeConfiguration)?;
        Self::check_state(&inner, &Self::LIVE, "set_configuration_item")?;
        inner.configuration.set(item);
        Ok(())
    }

    /// Answers a typed query, or `None` when the query is not supported in
    /// the current kernel state.
    pub fn query(&self, query: Query) -> Option<QueryResult> {
        let inner = self.read();
        match query {
            Query::AvailableScriptFiles => {
                if !matches!(inner.state, KernelState::Modelling | KernelState::Operating) {
                    return None;
                }
                available_scripts(&self.config.script_dir)
                    .ok()
                    .map(QueryResult::AvailableScriptFiles)
            }
            Query::RoutingInfo => {
                if inner.state != KernelState::Operating {
                    return None;
                }
                Some(QueryResult::RoutingInfo(RoutingInfo {
                    point_count: inner.model.pool().refs_of_kind::<Point>().len(),
                    path_count: inner.model.pool().refs_of_kind::<Path>().len(),
                    cached_routing_tables: self.router.cached_table_count(),
                }))
            }
        }
    }
}

/// A script destination names either a location or, for `MOVE`/`PARK`, a
/// point (as a dummy-location destination).
fn resolve_script_destination(
    model: &Model,
    location_name: &str,
    operation: &str,
) -> Result<Destination> {
    if let Some(location) = model.pool().ref_by_name::<Location>(location_name) {
        return Ok(Destination::new(location, operation));
    }
    if operation == OP_MOVE || operation == OP_PARK {
        if let Some(point) = model.pool().ref_by_name::<Point>(location_name) {
            return Ok(Destination::new(
                TypedRef::new(point.id, point.name),
                operation,
            ));
        }
    }
    Err(KernelError::ObjectUnknown(location_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel() -> Kernel {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = KernelConfig::default()
            .with_model_dir(dir.path().join("models"))
            .with_script_dir(dir.path().join("scripts"));
        // The tempdir handle is dropped, but these tests never touch disk.
        Kernel::new(config)
    }

    #[test]
    fn state_transitions_follow_the_mode_graph() {
        let kernel = kernel();
        assert_eq!(kernel.state(), KernelState::Modelling);

        kernel.set_state(KernelState::Operating).expect("to operating");
        kernel.set_state(KernelState::Modelling).expect("back to modelling");
        kernel.set_state(KernelState::Shutdown).expect("shutdown");
        assert!(matches!(
            kernel.set_state(KernelState::Operating),
            Err(KernelError::IllegalState(_))
        ));
        assert!(matches!(
            kernel.set_state(KernelState::Modelling),
            Err(KernelError::IllegalState(_))
        ));
    }

    #[test]
    fn shutdown_rejects_operations() {
        let kernel = kernel();
        kernel.set_state(KernelState::Shutdown).expect("shutdown");
        assert!(matches!(
            kernel.create_point(),
            Err(KernelError::UnsupportedKernelOp(_))
        ));
        assert!(matches!(
            kernel.objects(None, None),
            Err(KernelError::UnsupportedKernelOp(_))
        ));
    }

    #[test]
    fn order_operations_require_operating_mode() {
        let kernel = kernel();
        let err = kernel.create_transport_order(Vec::new()).unwrap_err();
        assert!(matches!(err, KernelError::UnsupportedKernelOp(_)));
    }

    #[test]
    fn permissions_gate_operations() {
        let kernel = kernel();
        let mut read_only = PermissionSet::new();
        read_only.insert(Permission::ReadData);
        kernel
            .create_user("viewer", "pw", read_only)
            .expect("create user");
        kernel.login("viewer", "pw").expect("login");

        assert!(matches!(
            kernel.create_point(),
            Err(KernelError::Credentials(_))
        ));
        assert!(kernel.objects(None, None).is_ok());

        kernel.login("Alice", "").expect("login as Alice");
        assert!(kernel.create_point().is_ok());
    }

    #[test]
    fn simulation_time_factor_must_be_positive() {
        let kernel = kernel();
        assert!(matches!(
            kernel.set_simulation_time_factor(0.0),
            Err(KernelError::IllegalArgument(_))
        ));
        assert!(matches!(
            kernel.set_simulation_time_factor(-1.5),
            Err(KernelError::IllegalArgument(_))
        ));
        kernel.set_simulation_time_factor(2.5).expect("factor");
        assert_eq!(kernel.simulation_time_factor(), 2.5);
    }

    #[test]
    fn invalid_name_pattern_is_an_illegal_argument() {
        let kernel = kernel();
        assert!(matches!(
            kernel.objects(None, Some("[")),
            Err(KernelError::IllegalArgument(_))
        ));
    }
}
