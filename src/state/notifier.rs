//! Change Notifier
//!
//! Synchronous multicast of granular project changes. Listeners run in
//! registration order on the thread that broadcast the event.
//!
//! The listener list is only written from the control thread. It still sits
//! behind a mutex so that a project can be shared with reader threads, and so
//! that listeners can add or remove listeners while a broadcast is running.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::layers::{LayerKind, NoteEvent};
use crate::state::info::ProjectInfo;

/// Observer of project changes.
///
/// Every method defaults to a no-op so implementors only pick what they need.
pub trait ChangeListener: Send + Sync {
    fn on_event_changed(&self, _layer: Uuid, _old: &NoteEvent, _new: &NoteEvent) {}

    fn on_event_added(&self, _layer: Uuid, _event: &NoteEvent) {}

    fn on_event_removed(&self, _layer: Uuid, _event: &NoteEvent) {}

    /// Sent once after the removals of an action have all been broadcast.
    fn on_event_removed_post_action(&self, _layer: Uuid) {}

    fn on_layer_changed(&self, _layer: Uuid) {}

    fn on_layer_added(&self, _layer: Uuid, _kind: LayerKind) {}

    fn on_layer_removed(&self, _layer: Uuid, _kind: LayerKind) {}

    fn on_layer_moved(&self, _layer: Uuid, _from: usize, _to: usize) {}

    fn on_info_changed(&self, _info: &ProjectInfo) {}

    fn on_beat_range_changed(&self, _start: f32, _end: f32) {}
}

/// A single change to the project.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    EventChanged {
        layer: Uuid,
        old: NoteEvent,
        new: NoteEvent,
    },
    EventAdded {
        layer: Uuid,
        event: NoteEvent,
    },
    EventRemoved {
        layer: Uuid,
        event: NoteEvent,
    },
    EventRemovedPostAction {
        layer: Uuid,
    },
    LayerChanged {
        layer: Uuid,
    },
    LayerAdded {
        layer: Uuid,
        kind: LayerKind,
    },
    LayerRemoved {
        layer: Uuid,
        kind: LayerKind,
    },
    LayerMoved {
        layer: Uuid,
        from: usize,
        to: usize,
    },
    InfoChanged(ProjectInfo),
    BeatRangeChanged {
        start: f32,
        end: f32,
    },
}

impl ChangeEvent {
    /// Invoke the matching listener callback.
    pub fn dispatch_to(&self, listener: &dyn ChangeListener) {
        match self {
            ChangeEvent::EventChanged { layer, old, new } => {
                listener.on_event_changed(*layer, old, new)
            }
            ChangeEvent::EventAdded { layer, event } => listener.on_event_added(*layer, event),
            ChangeEvent::EventRemoved { layer, event } => listener.on_event_removed(*layer, event),
            ChangeEvent::EventRemovedPostAction { layer } => {
                listener.on_event_removed_post_action(*layer)
            }
            ChangeEvent::LayerChanged { layer } => listener.on_layer_changed(*layer),
            ChangeEvent::LayerAdded { layer, kind } => listener.on_layer_added(*layer, *kind),
            ChangeEvent::LayerRemoved { layer, kind } => listener.on_layer_removed(*layer, *kind),
            ChangeEvent::LayerMoved { layer, from, to } => {
                listener.on_layer_moved(*layer, *from, *to)
            }
            ChangeEvent::InfoChanged(info) => listener.on_info_changed(info),
            ChangeEvent::BeatRangeChanged { start, end } => {
                listener.on_beat_range_changed(*start, *end)
            }
        }
    }
}

/// Handle returned by [`ChangeNotifier::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Broadcasts [`ChangeEvent`]s to registered listeners.
#[derive(Default)]
pub struct ChangeNotifier {
    listeners: Mutex<Vec<(ListenerId, Arc<dyn ChangeListener>)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.len())
            .finish()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    /// Returns false if the listener was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn remove_all_listeners(&self) {
        self.listeners.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    fn is_registered(&self, id: ListenerId) -> bool {
        self.listeners.lock().iter().any(|(lid, _)| *lid == id)
    }

    /// Deliver one event to every listener.
    ///
    /// The list is snapshotted first and the lock is not held during callbacks.
    /// A listener removed mid-broadcast is skipped from that point on; one added
    /// mid-broadcast only sees later events.
    pub fn broadcast(&self, event: &ChangeEvent) {
        let snapshot: Vec<(ListenerId, Arc<dyn ChangeListener>)> = self.listeners.lock().clone();

        for (id, listener) in snapshot {
            if !self.is_registered(id) {
                continue;
            }
            event.dispatch_to(listener.as_ref());
        }
    }

    pub fn broadcast_all<'a>(&self, events: impl IntoIterator<Item = &'a ChangeEvent>) {
        for event in events {
            self.broadcast(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;

    #[derive(Default)]
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ChangeListener for Recorder {
        fn on_layer_added(&self, _layer: Uuid, kind: LayerKind) {
            self.log.lock().push(format!("{}:added:{}", self.name, kind));
        }

        fn on_beat_range_changed(&self, start: f32, end: f32) {
            self.log
                .lock()
                .push(format!("{}:range:{}-{}", self.name, start, end));
        }
    }

    /// Removes another listener when it sees a layer added.
    struct Remover {
        notifier: Weak<ChangeNotifier>,
        target: Mutex<Option<ListenerId>>,
    }

    impl ChangeListener for Remover {
        fn on_layer_added(&self, _layer: Uuid, _kind: LayerKind) {
            let target = self.target.lock().take();
            if let (Some(notifier), Some(target)) = (self.notifier.upgrade(), target) {
                notifier.remove_listener(target);
            }
        }
    }

    fn layer_added() -> ChangeEvent {
        ChangeEvent::LayerAdded {
            layer: Uuid::new_v4(),
            kind: LayerKind::Piano,
        }
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let notifier = ChangeNotifier::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        notifier.add_listener(Arc::new(Recorder {
            name: "a",
            log: Arc::clone(&log),
        }));
        notifier.add_listener(Arc::new(Recorder {
            name: "b",
            log: Arc::clone(&log),
        }));

        notifier.broadcast(&layer_added());
        notifier.broadcast(&ChangeEvent::BeatRangeChanged {
            start: 0.0,
            end: 8.0,
        });

        assert_eq!(
            *log.lock(),
            vec!["a:added:Piano", "b:added:Piano", "a:range:0-8", "b:range:0-8"]
        );
    }

    #[test]
    fn test_unhandled_events_are_ignored() {
        let notifier = ChangeNotifier::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        notifier.add_listener(Arc::new(Recorder {
            name: "a",
            log: Arc::clone(&log),
        }));

        notifier.broadcast(&ChangeEvent::LayerChanged {
            layer: Uuid::new_v4(),
        });
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_remove_listener() {
        let notifier = ChangeNotifier::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = notifier.add_listener(Arc::new(Recorder {
            name: "a",
            log: Arc::clone(&log),
        }));

        assert!(notifier.remove_listener(id));
        assert!(!notifier.remove_listener(id));
        notifier.broadcast(&layer_added());
        assert!(log.lock().is_empty());
        assert!(notifier.is_empty());
    }

    #[test]
    fn test_removal_during_dispatch_skips_removed_only() {
        let notifier = Arc::new(ChangeNotifier::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let remover = Arc::new(Remover {
            notifier: Arc::downgrade(&notifier),
            target: Mutex::new(None),
        });
        notifier.add_listener(Arc::new(Recorder {
            name: "first",
            log: Arc::clone(&log),
        }));
        notifier.add_listener(remover.clone());
        let victim = notifier.add_listener(Arc::new(Recorder {
            name: "victim",
            log: Arc::clone(&log),
        }));
        notifier.add_listener(Arc::new(Recorder {
            name: "last",
            log: Arc::clone(&log),
        }));
        *remover.target.lock() = Some(victim);

        notifier.broadcast(&layer_added());

        assert_eq!(*log.lock(), vec!["first:added:Piano", "last:added:Piano"]);
        assert_eq!(notifier.len(), 3);
    }

    #[test]
    fn test_remove_all_listeners() {
        let notifier = ChangeNotifier::new();
        notifier.add_listener(Arc::new(Recorder::default()));
        notifier.add_listener(Arc::new(Recorder::default()));
        notifier.remove_all_listeners();
        assert_eq!(notifier.len(), 0);
    }
}
