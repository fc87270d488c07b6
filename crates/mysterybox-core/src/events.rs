//! Host-side signals the runtime subscribes to.
//!
//! The host (a page, a terminal session, a test) owns a [`HostEvents`] and
//! reports page visibility, user activity and network connectivity into it.
//! Components hold receivers; dropping a receiver is the unsubscribe.

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    Hidden,
}

impl Visibility {
    pub fn is_visible(self) -> bool {
        self == Visibility::Visible
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

/// User interaction that counts as "not idle".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityEvent {
    VisibilityChange,
    PointerDown,
    KeyDown,
}

const ACTIVITY_CAPACITY: usize = 64;

/// Cloneable handle that can open activity subscriptions later, e.g. from
/// inside a spawned task.
#[derive(Clone)]
pub struct ActivitySource(broadcast::Sender<ActivityEvent>);

impl ActivitySource {
    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.0.subscribe()
    }
}

/// Fan-out point for host signals.
pub struct HostEvents {
    visibility: watch::Sender<Visibility>,
    connectivity: watch::Sender<Connectivity>,
    activity: broadcast::Sender<ActivityEvent>,
}

impl HostEvents {
    pub fn new(visibility: Visibility, connectivity: Connectivity) -> Self {
        let (activity, _) = broadcast::channel(ACTIVITY_CAPACITY);
        Self {
            visibility: watch::Sender::new(visibility),
            connectivity: watch::Sender::new(connectivity),
            activity,
        }
    }

    /// Report a visibility change. Also counts as user activity.
    pub fn set_visibility(&self, visibility: Visibility) {
        let changed = self.visibility.send_if_modified(|current| {
            if *current == visibility {
                false
            } else {
                *current = visibility;
                true
            }
        });
        if changed {
            self.emit(ActivityEvent::VisibilityChange);
        }
    }

    pub fn set_connectivity(&self, connectivity: Connectivity) {
        self.connectivity.send_if_modified(|current| {
            if *current == connectivity {
                false
            } else {
                *current = connectivity;
                true
            }
        });
    }

    pub fn pointer_down(&self) {
        self.emit(ActivityEvent::PointerDown);
    }

    pub fn key_down(&self) {
        self.emit(ActivityEvent::KeyDown);
    }

    fn emit(&self, event: ActivityEvent) {
        // No subscribers is fine: nobody is tracking activity right now.
        let _ = self.activity.send(event);
    }

    pub fn visibility(&self) -> Visibility {
        *self.visibility.borrow()
    }

    pub fn connectivity(&self) -> Connectivity {
        *self.connectivity.borrow()
    }

    pub fn watch_visibility(&self) -> watch::Receiver<Visibility> {
        self.visibility.subscribe()
    }

    pub fn watch_connectivity(&self) -> watch::Receiver<Connectivity> {
        self.connectivity.subscribe()
    }

    pub fn subscribe_activity(&self) -> broadcast::Receiver<ActivityEvent> {
        self.activity.subscribe()
    }

    pub fn activity_source(&self) -> ActivitySource {
        ActivitySource(self.activity.clone())
    }

    /// Number of live activity subscriptions.
    pub fn activity_listeners(&self) -> usize {
        self.activity.receiver_count()
    }
}

impl Default for HostEvents {
    fn default() -> Self {
        Self::new(Visibility::Visible, Connectivity::Online)
    }
}
