//! Notification queue: validation, alert resolution, dedup, counts and
//! selection survival.
//!
//! Per notification the state machine is received → queued → [selected] →
//! removed. Incoming broadcasts are validated, their alert resolved (cached,
//! with concurrent resolutions coalesced into one fetch), then deduplicated
//! by `nid` and enqueued with the counters updated incrementally.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use voyent_shared::{Alert, Notification, NotificationCounts};

use crate::api::AlertFetcher;
use crate::credentials::CredentialStore;
use crate::events::{EventBus, EventSubscription, SdkEvent};
use crate::toast::{ToastCorner, ToastManager};

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Delay between settling queued alert resolvers, smoothing a
    /// notification storm into a drip.
    pub resolver_stagger: Duration,
    /// Corner new toasts go to.
    pub toast_corner: ToastCorner,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            resolver_stagger: Duration::from_millis(250),
            toast_corner: ToastCorner::TopRight,
        }
    }
}

type RemovalHook = Arc<dyn Fn(&Notification) + Send + Sync>;

struct Queued {
    notification: Notification,
    /// Alert snapshot this entry was counted with. Decrements must use the
    /// same classification even if the cache learns the alert later.
    alert: Option<Alert>,
}

#[derive(Default)]
struct QueueInner {
    /// Insertion order, oldest first. At most one entry per `nid`.
    queue: Vec<Queued>,
    counts: NotificationCounts,
    /// Session-lifetime alert cache; never evicted.
    alerts: Vec<Alert>,
    /// Alert id -> waiters for an in-flight fetch.
    pending: HashMap<String, Vec<oneshot::Sender<Option<Alert>>>>,
}

/// Owns the ordered notification queue and its derived counters.
#[derive(Clone)]
pub struct NotificationManager {
    store: CredentialStore,
    fetcher: Arc<dyn AlertFetcher>,
    bus: EventBus,
    config: NotifyConfig,
    toasts: Option<ToastManager>,
    on_remove: Option<RemovalHook>,
    inner: Arc<Mutex<QueueInner>>,
}

impl NotificationManager {
    pub fn new(store: CredentialStore, fetcher: Arc<dyn AlertFetcher>, bus: EventBus) -> Self {
        Self::with_config(store, fetcher, bus, NotifyConfig::default())
    }

    pub fn with_config(
        store: CredentialStore,
        fetcher: Arc<dyn AlertFetcher>,
        bus: EventBus,
        config: NotifyConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            bus,
            config,
            toasts: None,
            on_remove: None,
            inner: Arc::new(Mutex::new(QueueInner::default())),
        }
    }

    /// Drive a toast manager from this queue.
    pub fn with_toasts(mut self, toasts: ToastManager) -> Self {
        self.toasts = Some(toasts);
        self
    }

    /// Hook invoked on removal, used to cascade deletes into a mailbox
    /// store for persisted notifications.
    pub fn with_removal_hook(mut self, hook: RemovalHook) -> Self {
        self.on_remove = Some(hook);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Feed `broadcastReceived` payloads from the bus into this queue.
    ///
    /// Ingestion (alert resolution included) runs on a spawned task, so this
    /// must be called from within a tokio runtime. Returns the subscription
    /// so the queue can be detached again.
    pub fn subscribe_broadcasts(&self) -> EventSubscription {
        let manager = self.clone();
        self.bus.subscribe(move |event| {
            if let SdkEvent::BroadcastReceived { payload, .. } = event {
                let manager = manager.clone();
                let payload = payload.clone();
                tokio::spawn(async move {
                    manager.handle_broadcast(&payload).await;
                });
            }
        })
    }

    /// Ingest one broadcast payload.
    ///
    /// Invalid payloads are logged and dropped; the system favors
    /// availability over strictness on this path.
    pub async fn handle_broadcast(&self, payload: &Value) {
        let notification: Notification = match serde_json::from_value(payload.clone()) {
            Ok(n) => n,
            Err(err) => {
                warn!(%err, "dropping undecodable broadcast payload");
                return;
            }
        };
        if !notification.is_valid() {
            debug!("dropping broadcast without subject, detail or app-update flag");
            return;
        }

        self.bus.emit(&SdkEvent::BeforeBroadcastAdded { notification: notification.clone() });

        let alert = match notification.alert_id.as_deref() {
            Some(alert_id) => self.resolve_alert(alert_id).await,
            None => None,
        };

        self.enqueue(notification.clone(), alert.as_ref());
        self.bus.emit(&SdkEvent::AfterBroadcastAdded { notification: notification.clone() });

        if let Some(toasts) = &self.toasts {
            toasts.display(self.config.toast_corner, &notification);
        }
    }

    /// Resolve an alert, serving from the cache when possible.
    ///
    /// While a fetch for `alert_id` is in flight, further callers join its
    /// waiter list instead of issuing another request; waiters are settled
    /// with a fixed stagger once the fetch completes.
    pub async fn resolve_alert(&self, alert_id: &str) -> Option<Alert> {
        let waiter = {
            let mut inner = self.lock();
            if let Some(cached) = inner.alerts.iter().find(|a| a.id == alert_id) {
                return Some(cached.clone());
            }
            match inner.pending.get_mut(alert_id) {
                Some(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                None => {
                    inner.pending.insert(alert_id.to_string(), Vec::new());
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            return rx.await.ok().flatten();
        }

        let fetched = match self.fetcher.fetch_alert(alert_id).await {
            Ok(alert) => alert,
            Err(err) => {
                warn!(%err, alert_id, "alert fetch failed");
                None
            }
        };

        let waiters = {
            let mut inner = self.lock();
            if let Some(alert) = &fetched {
                if !inner.alerts.iter().any(|a| a.id == alert.id) {
                    inner.alerts.push(alert.clone());
                }
            }
            inner.pending.remove(alert_id).unwrap_or_default()
        };

        let stagger = self.config.resolver_stagger;
        for (index, tx) in waiters.into_iter().enumerate() {
            let alert = fetched.clone();
            tokio::spawn(async move {
                tokio::time::sleep(stagger * (index as u32 + 1)).await;
                let _ = tx.send(alert);
            });
        }

        fetched
    }

    /// Deduplicate by `nid` and push to the end of the queue, keeping the
    /// counters consistent. The newest entry always wins.
    fn enqueue(&self, notification: Notification, alert: Option<&Alert>) {
        self.bus.emit(&SdkEvent::BeforeQueueUpdated);
        {
            let mut inner = self.lock();
            if let Some(nid) = notification.nid.as_deref() {
                if let Some(pos) = inner
                    .queue
                    .iter()
                    .position(|q| q.notification.nid.as_deref() == Some(nid))
                {
                    let old = inner.queue.remove(pos);
                    apply_counts(&mut inner.counts, &old.notification, old.alert.as_ref(), -1);
                    debug!(nid, "evicting older duplicate notification");
                }
            }
            apply_counts(&mut inner.counts, &notification, alert, 1);
            inner.queue.push(Queued { notification, alert: alert.cloned() });
        }
        self.bus.emit(&SdkEvent::AfterQueueUpdated);
    }

    /// Remove the notification with the given `nid`. Returns whether
    /// anything was removed.
    pub fn remove(&self, nid: &str) -> bool {
        self.bus.emit(&SdkEvent::BeforeQueueUpdated);
        let removed = {
            let mut inner = self.lock();
            let pos = inner
                .queue
                .iter()
                .position(|q| q.notification.nid.as_deref() == Some(nid));
            match pos {
                Some(pos) => {
                    let old = inner.queue.remove(pos);
                    apply_counts(&mut inner.counts, &old.notification, old.alert.as_ref(), -1);
                    Some(old.notification)
                }
                None => None,
            }
        };
        self.bus.emit(&SdkEvent::AfterQueueUpdated);

        match removed {
            Some(notification) => {
                if let Some(hook) = &self.on_remove {
                    hook(&notification);
                }
                true
            }
            None => false,
        }
    }

    /// Drop everything and reset the counters.
    pub fn clear(&self) {
        {
            let mut inner = self.lock();
            inner.queue.clear();
            inner.counts = NotificationCounts::default();
        }
        self.bus.emit(&SdkEvent::QueueRefreshed);
    }

    pub fn queue(&self) -> Vec<Notification> {
        self.lock().queue.iter().map(|q| q.notification.clone()).collect()
    }

    pub fn counts(&self) -> NotificationCounts {
        self.lock().counts
    }

    /// Mark a notification selected, persisting only its `nid` (keyed by the
    /// current username) so the selection survives a redirect.
    pub fn select(&self, notification: &Notification) {
        if let (Some(nid), Some(username)) = (notification.nid.as_deref(), self.store.username())
        {
            self.store.set_injected_nid(&username, nid);
        }
        self.bus.emit(&SdkEvent::NotificationChanged { notification: notification.clone() });
    }

    /// Select and hand back the redirect target; the caller performs the
    /// navigation.
    pub fn redirect_to_notification(&self, notification: &Notification) -> Option<String> {
        self.select(notification);
        notification.url.clone()
    }

    /// Re-resolve the persisted selection against the current queue. Only
    /// the `nid` survived the redirect.
    pub fn restore_selection(&self) -> Option<Notification> {
        let username = self.store.username()?;
        let nid = self.store.injected_nid(&username)?;
        self.lock()
            .queue
            .iter()
            .find(|q| q.notification.nid.as_deref() == Some(nid.as_str()))
            .map(|q| q.notification.clone())
    }
}

/// Apply one notification's classification to the counters.
///
/// A notification without a resolvable alert counts as active; it is current
/// by construction.
fn apply_counts(counts: &mut NotificationCounts, n: &Notification, alert: Option<&Alert>, delta: i32) {
    let active = alert.map_or(true, Alert::is_active);
    let ended = alert.is_some_and(Alert::is_ended);
    let unread = !n.read;

    if active {
        counts.active = counts.active.saturating_add_signed(delta);
        if unread {
            counts.unread_active = counts.unread_active.saturating_add_signed(delta);
        }
    }
    if ended {
        counts.ended = counts.ended.saturating_add_signed(delta);
        if unread {
            counts.unread_ended = counts.unread_ended.saturating_add_signed(delta);
        }
    }
}
