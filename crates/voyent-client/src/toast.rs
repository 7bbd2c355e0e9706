//! Toast stacking model.
//!
//! Pure data model of the on-screen toast discipline; rendering belongs to
//! the embedding application. Each screen corner keeps an independent
//! displayed list and queued list.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;
use uuid::Uuid;
use voyent_shared::Notification;

use crate::events::{EventBus, SdkEvent};

/// Screen corner a toast stack lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToastCorner {
    TopRight,
    TopLeft,
    BottomRight,
    BottomLeft,
}

impl ToastCorner {
    pub fn is_bottom(self) -> bool {
        matches!(self, ToastCorner::BottomRight | ToastCorner::BottomLeft)
    }

    pub fn name(self) -> &'static str {
        match self {
            ToastCorner::TopRight => "top-right",
            ToastCorner::TopLeft => "top-left",
            ToastCorner::BottomRight => "bottom-right",
            ToastCorner::BottomLeft => "bottom-left",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToastConfig {
    /// Maximum simultaneously displayed toasts per corner; zero or negative
    /// means unlimited.
    pub stack_limit: i32,
    /// Evict the oldest displayed toast instead of queueing when full.
    pub overwrite_old: bool,
}

impl Default for ToastConfig {
    fn default() -> Self {
        Self { stack_limit: 3, overwrite_old: false }
    }
}

/// Identifies a toast from the moment `display` is called, displayed or
/// queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToastId(Uuid);

/// What happened to a toast handed to [`ToastManager::display`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayOutcome {
    Displayed,
    Queued,
    /// Displayed after evicting the corner's oldest toast.
    DisplacedOldest,
}

/// Direction displayed toasts slide when a gap closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideDirection {
    Up,
    Down,
}

struct Entry {
    id: ToastId,
    notification: Notification,
}

#[derive(Default)]
struct CornerStack {
    displayed: Vec<Entry>,
    queued: Vec<Entry>,
}

/// Per-corner displayed/queued bookkeeping.
#[derive(Clone)]
pub struct ToastManager {
    bus: EventBus,
    config: ToastConfig,
    corners: Arc<Mutex<HashMap<ToastCorner, CornerStack>>>,
}

impl ToastManager {
    pub fn new(bus: EventBus, config: ToastConfig) -> Self {
        Self { bus, config, corners: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ToastCorner, CornerStack>> {
        self.corners.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Show a toast in a corner, or queue it when the corner is full.
    pub fn display(&self, corner: ToastCorner, notification: &Notification) -> (ToastId, DisplayOutcome) {
        self.bus.emit(&SdkEvent::BeforeDisplayNotification { notification: notification.clone() });

        let id = ToastId(Uuid::new_v4());
        let entry = Entry { id, notification: notification.clone() };
        let unlimited = self.config.stack_limit <= 0;
        let limit = self.config.stack_limit.max(0) as usize;

        let (outcome, evicted) = {
            let mut corners = self.lock();
            let stack = corners.entry(corner).or_default();
            if unlimited || stack.displayed.len() < limit {
                stack.displayed.push(entry);
                (DisplayOutcome::Displayed, None)
            } else if self.config.overwrite_old {
                let evicted = stack.displayed.remove(0);
                stack.displayed.push(entry);
                (DisplayOutcome::DisplacedOldest, Some(evicted))
            } else {
                stack.queued.push(entry);
                (DisplayOutcome::Queued, None)
            }
        };

        if let Some(evicted) = evicted {
            self.bus.emit(&SdkEvent::NotificationClosed { notification: evicted.notification });
        }
        if outcome != DisplayOutcome::Queued {
            self.bus.emit(&SdkEvent::AfterDisplayNotification {
                notification: notification.clone(),
            });
        } else {
            debug!(corner = corner.name(), "toast stack full, queueing");
        }
        (id, outcome)
    }

    /// Remove a toast. Displayed removals close the gap (later toasts slide;
    /// the direction depends on the corner) and promote the next queued
    /// toast; queued removals just drop the entry.
    pub fn remove(&self, corner: ToastCorner, id: ToastId) -> Option<SlideDirection> {
        let (closed, promoted, direction) = {
            let mut corners = self.lock();
            let stack = corners.get_mut(&corner)?;

            if let Some(pos) = stack.displayed.iter().position(|e| e.id == id) {
                let closed = stack.displayed.remove(pos);
                let promoted = if stack.queued.is_empty() {
                    None
                } else {
                    let next = stack.queued.remove(0);
                    let notification = next.notification.clone();
                    stack.displayed.push(next);
                    Some(notification)
                };
                let direction =
                    if corner.is_bottom() { SlideDirection::Down } else { SlideDirection::Up };
                (closed.notification, promoted, direction)
            } else if let Some(pos) = stack.queued.iter().position(|e| e.id == id) {
                let closed = stack.queued.remove(pos);
                drop(corners);
                self.bus.emit(&SdkEvent::NotificationClosed { notification: closed.notification });
                return None;
            } else {
                return None;
            }
        };

        self.bus.emit(&SdkEvent::NotificationClosed { notification: closed });
        if let Some(promoted) = promoted {
            self.bus.emit(&SdkEvent::BeforeDisplayNotification {
                notification: promoted.clone(),
            });
            self.bus.emit(&SdkEvent::AfterDisplayNotification { notification: promoted });
        }
        Some(direction)
    }

    /// Report a click on a displayed toast.
    pub fn click(&self, notification: &Notification) {
        self.bus.emit(&SdkEvent::NotificationClicked { notification: notification.clone() });
    }

    pub fn displayed_count(&self, corner: ToastCorner) -> usize {
        self.lock().get(&corner).map_or(0, |s| s.displayed.len())
    }

    pub fn queued_count(&self, corner: ToastCorner) -> usize {
        self.lock().get(&corner).map_or(0, |s| s.queued.len())
    }
}
