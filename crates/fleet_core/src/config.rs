//! Kernel and router configuration.
//!
//! Static configuration is plain structs with `Default` impls and `with_*`
//! builders; the runtime key→value store backs the configuration-item
//! operations of the kernel surface.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::routing::{CostFunctionKind, SearchMode};

/// Configuration of the routing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Completion mode of the table search.
    pub search_mode: SearchMode,
    /// Which cost function scores candidate routes.
    pub cost_function: CostFunctionKind,
    /// When false, a drive order whose admissible points include the
    /// vehicle's current position is satisfied in place at zero cost.
    pub route_to_current_position: bool,
    /// How many per-vehicle tables the cache keeps before evicting.
    pub table_cache_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            search_mode: SearchMode::TerminateEarly,
            cost_function: CostFunctionKind::Distance,
            route_to_current_position: false,
            table_cache_capacity: 32,
        }
    }
}

impl RouterConfig {
    pub fn with_search_mode(mut self, mode: SearchMode) -> Self {
        self.search_mode = mode;
        self
    }

    pub fn with_cost_function(mut self, kind: CostFunctionKind) -> Self {
        self.cost_function = kind;
        self
    }

    pub fn with_route_to_current_position(mut self, enabled: bool) -> Self {
        self.route_to_current_position = enabled;
        self
    }

    pub fn with_table_cache_capacity(mut self, capacity: usize) -> Self {
        self.table_cache_capacity = capacity;
        self
    }
}

/// Configuration of the kernel supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Directory the file model store keeps persisted models in.
    pub model_dir: PathBuf,
    /// Directory transport-order scripts are read from.
    pub script_dir: PathBuf,
    pub router: RouterConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            script_dir: PathBuf::from("scripts"),
            router: RouterConfig::default(),
        }
    }
}

impl KernelConfig {
    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = dir.into();
        self
    }

    pub fn with_script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.script_dir = dir.into();
        self
    }

    pub fn with_router(mut self, router: RouterConfig) -> Self {
        self.router = router;
        self
    }
}

/// One entry of the runtime configuration store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationItem {
    pub key: String,
    pub value: String,
    pub description: String,
}

/// Runtime key→value configuration, editable through the kernel surface.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationStore {
    items: BTreeMap<String, ConfigurationItem>,
}

impl ConfigurationStore {
    pub fn items(&self) -> Vec<ConfigurationItem> {
        self.items.values().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<&ConfigurationItem> {
        self.items.get(key)
    }

    pub fn set(&mut self, item: ConfigurationItem) {
        self.items.insert(item.key.clone(), item);
    }
}
