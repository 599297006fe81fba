use bevy_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Info,
    Warning,
    Error,
}

/// A message published to all kernel clients. Immutable once published.
#[derive(Component, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub body: String,
    pub kind: MessageKind,
    /// Publication time, epoch ms.
    pub timestamp: i64,
}
