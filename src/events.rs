//! Bridge lifecycle events and listener registration.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use uuid::Uuid;

/// Lifecycle transitions a bridge reports to its listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BridgeEvent {
    /// The bridge answered discovery again after being marked offline.
    Online,
    /// The bridge missed too many discovery passes or a send failed.
    Offline,
    /// The bridge lost its last device or was deregistered.
    Destroy,
}

/// Handle returned by listener registration, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        ListenerId(Uuid::new_v4())
    }
}

pub type Listener = Arc<dyn Fn(&BridgeEvent) + Send + Sync>;

struct Registration {
    id: ListenerId,
    filter: Option<BridgeEvent>,
    listener: Listener,
}

/// Listener registry of one bridge.
///
/// Listeners run on the emitting task, after the registry lock is released,
/// so a listener may subscribe or unsubscribe.
#[derive(Default)]
pub(crate) struct EventHub {
    registrations: Mutex<Vec<Registration>>,
}

impl EventHub {
    pub(crate) fn subscribe(&self, filter: Option<BridgeEvent>, listener: Listener) -> ListenerId {
        let id = ListenerId::new();
        self.registrations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Registration {
                id,
                filter,
                listener,
            });
        id
    }

    pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut registrations = self.registrations.lock().unwrap_or_else(|e| e.into_inner());
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }

    pub(crate) fn emit(&self, event: BridgeEvent) {
        let listeners: Vec<Listener> = self
            .registrations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.filter.is_none_or(|f| f == event))
            .map(|r| Arc::clone(&r.listener))
            .collect();

        for listener in listeners {
            listener(&event);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.registrations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Listener) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, Arc::new(move |_: &BridgeEvent| {
            c.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_filtered_listener() {
        let hub = EventHub::default();
        let (offline, listener) = counter();
        hub.subscribe(Some(BridgeEvent::Offline), listener);

        hub.emit(BridgeEvent::Online);
        hub.emit(BridgeEvent::Offline);
        assert_eq!(offline.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_generic_listener_and_unsubscribe() {
        let hub = EventHub::default();
        let (all, listener) = counter();
        let id = hub.subscribe(None, listener);

        hub.emit(BridgeEvent::Online);
        hub.emit(BridgeEvent::Destroy);
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        hub.emit(BridgeEvent::Offline);

        assert_eq!(all.load(Ordering::SeqCst), 2);
        assert_eq!(hub.len(), 0);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(BridgeEvent::Offline.to_string(), "offline");
        assert_eq!(
            serde_json::to_string(&BridgeEvent::Destroy).unwrap(),
            "\"destroy\""
        );
    }
}
