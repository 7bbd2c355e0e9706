//! Publish/subscribe event bus.
//!
//! Replaces the browser SDK's custom-event surface with an explicit observer
//! registry. The external event names are unchanged; [`SdkEvent::name`]
//! returns the exact strings the browser SDK fired so passive observers can
//! key off them.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use voyent_shared::Notification;

/// Severity of a generic user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Success,
    Warn,
    Error,
}

/// How long a generic message should stay on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDuration {
    Normal,
    Long,
    Sticky,
}

/// Everything the SDK announces to passive observers.
#[derive(Debug, Clone)]
pub enum SdkEvent {
    LoginSucceeded {
        account: String,
        realm: String,
        username: String,
    },
    SessionExpired,
    TokenRefreshed {
        access_token: String,
    },
    TokenRefreshFailed {
        reason: String,
    },
    BroadcastReceived {
        group: String,
        payload: Value,
    },
    BeforeBroadcastAdded {
        notification: Notification,
    },
    AfterBroadcastAdded {
        notification: Notification,
    },
    BeforeQueueUpdated,
    AfterQueueUpdated,
    QueueRefreshed,
    BeforeDisplayNotification {
        notification: Notification,
    },
    AfterDisplayNotification {
        notification: Notification,
    },
    NotificationChanged {
        notification: Notification,
    },
    NotificationClicked {
        notification: Notification,
    },
    NotificationClosed {
        notification: Notification,
    },
    Message {
        level: MessageLevel,
        duration: MessageDuration,
        text: String,
    },
}

impl SdkEvent {
    /// The event name as fired by the browser SDK. External contract.
    pub fn name(&self) -> &'static str {
        use MessageDuration::*;
        use MessageLevel::*;
        match self {
            SdkEvent::LoginSucceeded { .. } => "voyent-login-succeeded",
            SdkEvent::SessionExpired => "voyent-session-expired",
            SdkEvent::TokenRefreshed { .. } => "voyent-access-token-refreshed",
            SdkEvent::TokenRefreshFailed { .. } => "voyent-access-token-refresh-failed",
            SdkEvent::BroadcastReceived { .. } => "broadcastReceived",
            SdkEvent::BeforeBroadcastAdded { .. } => "beforeBroadcastAdded",
            SdkEvent::AfterBroadcastAdded { .. } => "afterBroadcastAdded",
            SdkEvent::BeforeQueueUpdated => "beforeQueueUpdated",
            SdkEvent::AfterQueueUpdated => "afterQueueUpdated",
            SdkEvent::QueueRefreshed => "notificationQueueRefreshed",
            SdkEvent::BeforeDisplayNotification { .. } => "beforeDisplayNotification",
            SdkEvent::AfterDisplayNotification { .. } => "afterDisplayNotification",
            SdkEvent::NotificationChanged { .. } => "notificationChanged",
            SdkEvent::NotificationClicked { .. } => "notificationClicked",
            SdkEvent::NotificationClosed { .. } => "notificationClosed",
            SdkEvent::Message { level, duration, .. } => match (level, duration) {
                (Info, Normal) => "message-info",
                (Info, Long) => "message-info-long",
                (Info, Sticky) => "message-info-sticky",
                (Success, Normal) => "message-success",
                (Success, Long) => "message-success-long",
                (Success, Sticky) => "message-success-sticky",
                (Warn, Normal) => "message-warn",
                (Warn, Long) => "message-warn-long",
                (Warn, Sticky) => "message-warn-sticky",
                (Error, Normal) => "message-error",
                (Error, Long) => "message-error-long",
                (Error, Sticky) => "message-error-sticky",
            },
        }
    }
}

type Subscriber = Arc<dyn Fn(&SdkEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: Vec<(u64, Subscriber)>,
}

/// Shared observer registry. Cloning yields a handle to the same bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

/// Handle returned from [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSubscription(u64);

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&SdkEvent) + Send + Sync + 'static,
    ) -> EventSubscription {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscribers.push((id, Arc::new(callback)));
        EventSubscription(id)
    }

    pub fn unsubscribe(&self, subscription: EventSubscription) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.subscribers.retain(|(id, _)| *id != subscription.0);
    }

    /// Deliver an event to every subscriber. Subscribers registered during
    /// delivery see only later events.
    pub fn emit(&self, event: &SdkEvent) {
        let subscribers: Vec<Subscriber> = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.subscribers.iter().map(|(_, s)| s.clone()).collect()
        };
        for subscriber in subscribers {
            subscriber(event);
        }
    }
}
