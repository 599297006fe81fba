use std::collections::BTreeMap;

use bevy_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

/// Visualisation data for graphical clients. The kernel stores the elements
/// and view bookmarks verbatim and never interprets them.
#[derive(Component, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualLayout {
    pub scale_x: f64,
    pub scale_y: f64,
    /// Named colors as 0xRRGGBB values.
    pub colors: BTreeMap<String, u32>,
    pub elements: Vec<serde_json::Value>,
    pub view_bookmarks: Vec<serde_json::Value>,
}

impl Default for VisualLayout {
    fn default() -> Self {
        Self {
            scale_x: 50.0,
            scale_y: 50.0,
            colors: BTreeMap::new(),
            elements: Vec::new(),
            view_bookmarks: Vec::new(),
        }
    }
}
