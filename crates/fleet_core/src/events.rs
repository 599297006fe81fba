//! Structural event bus: in-process publish/subscribe for object mutations.
//!
//! The pool emits one [`ObjectEvent`] per committed mutation, carrying full
//! before/after snapshots. Delivery is synchronous and happens while the
//! kernel's writer lock is held, so per-object event order equals commit order
//! and every listener observes the same global order.
//!
//! Listeners MUST NOT mutate the model from inside a callback; the pool
//! detects that re-entrance in debug builds via [`EventBus::is_dispatching`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::model::{ObjectKind, ObjectSnapshot};

/// What happened to the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectEventKind {
    Created,
    Modified,
    Removed,
}

/// A committed mutation of one pool object.
///
/// `Created` events have no previous snapshot, `Removed` events no current
/// one; `Modified` events carry both.
#[derive(Debug, Clone)]
pub struct ObjectEvent {
    pub kind: ObjectEventKind,
    pub current: Option<ObjectSnapshot>,
    pub previous: Option<ObjectSnapshot>,
}

impl ObjectEvent {
    /// The most recent snapshot the event carries (current, else previous).
    pub fn snapshot(&self) -> &ObjectSnapshot {
        self.current
            .as_ref()
            .or(self.previous.as_ref())
            .expect("an object event always carries at least one snapshot")
    }

    pub fn object_kind(&self) -> ObjectKind {
        self.snapshot().data.kind()
    }
}

/// Receiver side of the bus. Implementations must not call back into the
/// object pool.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &ObjectEvent);
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// The single central event bus. Shared via `Arc` between the pool (producer)
/// and derived components such as the router (consumers).
pub struct EventBus {
    listeners: Mutex<Vec<(ListenerId, Arc<dyn EventListener>)>>,
    next_id: AtomicU64,
    dispatching: AtomicBool,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            dispatching: AtomicBool::new(false),
        }
    }
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(lid, _)| *lid != id);
    }

    /// Delivers `event` to every listener, in subscription order.
    ///
    /// The listener list is snapshotted first so that callbacks never run
    /// under the bus's own lock.
    pub fn publish(&self, event: &ObjectEvent) {
        let listeners: Vec<Arc<dyn EventListener>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        self.dispatching.store(true, Ordering::Release);
        for listener in &listeners {
            listener.on_event(event);
        }
        self.dispatching.store(false, Ordering::Release);
    }

    /// True while `publish` is delivering callbacks. The pool asserts this is
    /// false on entry to every mutating operation.
    pub fn is_dispatching(&self) -> bool {
        self.dispatching.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ObjectData, ObjectMeta, Point};
    use crate::refs::ObjectId;
    use std::sync::Mutex as StdMutex;

    fn sample_event(kind: ObjectEventKind, name: &str) -> ObjectEvent {
        let snapshot = ObjectSnapshot {
            meta: ObjectMeta::new(ObjectId(0), name),
            data: ObjectData::Point(Point::default()),
        };
        ObjectEvent {
            kind,
            current: Some(snapshot),
            previous: None,
        }
    }

    struct Recorder {
        seen: StdMutex<Vec<String>>,
    }

    impl EventListener for Recorder {
        fn on_event(&self, event: &ObjectEvent) {
            self.seen
                .lock()
                .expect("recorder lock")
                .push(event.snapshot().meta.name.clone());
        }
    }

    #[test]
    fn delivers_in_subscription_order_and_unsubscribes() {
        let bus = EventBus::new();
        let first = Arc::new(Recorder {
            seen: StdMutex::new(Vec::new()),
        });
        let second = Arc::new(Recorder {
            seen: StdMutex::new(Vec::new()),
        });
        let first_id = bus.subscribe(first.clone());
        bus.subscribe(second.clone());

        bus.publish(&sample_event(ObjectEventKind::Created, "Point-0001"));
        bus.unsubscribe(first_id);
        bus.publish(&sample_event(ObjectEventKind::Modified, "Point-0002"));

        assert_eq!(*first.seen.lock().expect("lock"), vec!["Point-0001"]);
        assert_eq!(
            *second.seen.lock().expect("lock"),
            vec!["Point-0001", "Point-0002"]
        );
    }

    #[test]
    fn dispatch_flag_is_visible_inside_callbacks() {
        struct FlagProbe {
            bus: StdMutex<Option<Arc<EventBus>>>,
            observed: StdMutex<Option<bool>>,
        }
        impl EventListener for FlagProbe {
            fn on_event(&self, _event: &ObjectEvent) {
                let bus = self.bus.lock().expect("probe lock").clone();
                if let Some(bus) = bus {
                    *self.observed.lock().expect("probe lock") = Some(bus.is_dispatching());
                }
            }
        }

        let bus = EventBus::new();
        let probe = Arc::new(FlagProbe {
            bus: StdMutex::new(Some(bus.clone())),
            observed: StdMutex::new(None),
        });
        bus.subscribe(probe.clone());
        bus.publish(&sample_event(ObjectEventKind::Created, "Point-0001"));

        assert_eq!(*probe.observed.lock().expect("lock"), Some(true));
        assert!(!bus.is_dispatching());
    }
}
