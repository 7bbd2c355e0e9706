//! Broadcast registry: per-group connections and listener dispatch.
//!
//! Listeners are tracked with two maps — group name to listener handles and
//! listener handle to connection — so the two independent teardown paths
//! (bulk by group, individual by handle) never orphan or double-close a
//! connection. The browser SDK keyed the second map by callback identity;
//! the Rust contract returns an explicit [`ListenerHandle`] instead.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use uuid::Uuid;

use voyent_shared::{full_group_name, http_to_ws, Error, BROADCAST_EVENT};

use crate::credentials::CredentialStore;
use crate::events::{EventBus, SdkEvent};
use crate::token::base_url_for_host;

/// Callback invoked with each parsed broadcast payload.
pub type BroadcastCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Raw frame handler given to the transport.
pub type MessageHandler = Box<dyn Fn(String) + Send + Sync>;

/// Opens real-time connections. Injected so tests can run without sockets.
#[async_trait]
pub trait BroadcastTransport: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        on_message: MessageHandler,
    ) -> Result<Box<dyn BroadcastConnection>, Error>;
}

/// One open connection. `close` must be safe to call more than once.
pub trait BroadcastConnection: Send + Sync {
    fn close(&self);
}

/// Identifies one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(Uuid);

/// Unwrap a channel envelope `{"event": ..., "payload": ...}`.
///
/// Frames addressed to a channel other than [`BROADCAST_EVENT`] return
/// `None`; bare frames without an `event` field pass through unchanged.
fn channel_payload(frame: Value) -> Option<Value> {
    match frame {
        Value::Object(ref map) if map.contains_key("event") => {
            if map.get("event").and_then(Value::as_str) == Some(BROADCAST_EVENT) {
                map.get("payload").cloned()
            } else {
                None
            }
        }
        other => Some(other),
    }
}

#[derive(Default)]
struct RegistryInner {
    /// group name -> listeners registered under it
    groups: HashMap<String, Vec<ListenerHandle>>,
    /// listener -> its connection
    connections: HashMap<ListenerHandle, Box<dyn BroadcastConnection>>,
    callbacks: HashMap<ListenerHandle, BroadcastCallback>,
    /// namespaced groups joined through `join_group`
    joined: HashMap<String, ListenerHandle>,
    /// namespaced groups waiting for the transport to become ready
    pending: Vec<String>,
    ready: bool,
}

/// Manages group subscriptions over an injected transport.
#[derive(Clone)]
pub struct BroadcastRegistry {
    store: CredentialStore,
    transport: Arc<dyn BroadcastTransport>,
    bus: EventBus,
    io_base: String,
    inner: Arc<Mutex<RegistryInner>>,
}

impl BroadcastRegistry {
    pub fn new(
        store: CredentialStore,
        transport: Arc<dyn BroadcastTransport>,
        bus: EventBus,
        io_host: impl AsRef<str>,
    ) -> Self {
        Self {
            store,
            transport,
            bus,
            io_base: http_to_ws(&base_url_for_host(io_host.as_ref())),
            inner: Arc::new(Mutex::new(RegistryInner::default())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn group_url(&self, group: &str) -> String {
        format!("{}/{}", self.io_base.trim_end_matches('/'), urlencoding::encode(group))
    }

    /// Open a connection for `group` and register `callback` under it.
    ///
    /// Inbound frames on the broadcast channel are parsed as JSON before
    /// dispatch; malformed frames are logged and dropped.
    pub async fn start_listening(
        &self,
        group: &str,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Result<ListenerHandle, Error> {
        if group.trim().is_empty() {
            return Err(Error::validation("group is required"));
        }

        let handle = ListenerHandle(Uuid::new_v4());
        let callback: BroadcastCallback = Arc::new(callback);

        let dispatch = callback.clone();
        let bus = self.bus.clone();
        let group_name = group.to_string();
        let on_message: MessageHandler = Box::new(move |raw| {
            match serde_json::from_str::<Value>(&raw) {
                Ok(frame) => {
                    let Some(payload) = channel_payload(frame) else {
                        debug!(group = %group_name, "ignoring frame on another channel");
                        return;
                    };
                    bus.emit(&SdkEvent::BroadcastReceived {
                        group: group_name.clone(),
                        payload: payload.clone(),
                    });
                    dispatch(&payload);
                }
                Err(err) => {
                    warn!(%err, group = %group_name, "dropping malformed broadcast payload");
                }
            }
        });

        let connection = self.transport.connect(&self.group_url(group), on_message).await?;

        let mut inner = self.lock();
        inner.groups.entry(group.to_string()).or_default().push(handle);
        inner.connections.insert(handle, connection);
        inner.callbacks.insert(handle, callback);
        debug!(group, "listener registered");
        Ok(handle)
    }

    /// Tear down listeners by group and/or by individual handle. Branches
    /// with a missing argument are no-ops, including both missing.
    pub fn stop_listening(&self, group: Option<&str>, handle: Option<ListenerHandle>) {
        let mut inner = self.lock();

        if let Some(group) = group {
            if let Some(handles) = inner.groups.remove(group) {
                // close everything first, then drop the mappings, so no
                // connection is referenced after it starts closing
                for h in &handles {
                    if let Some(conn) = inner.connections.get(h) {
                        conn.close();
                    }
                }
                for h in &handles {
                    inner.connections.remove(h);
                    inner.callbacks.remove(h);
                }
                inner.joined.retain(|_, joined| !handles.contains(joined));
                debug!(group, count = handles.len(), "stopped listening");
            }
        }

        if let Some(handle) = handle {
            if let Some(conn) = inner.connections.remove(&handle) {
                conn.close();
            }
            inner.callbacks.remove(&handle);
            for handles in inner.groups.values_mut() {
                handles.retain(|h| *h != handle);
            }
            inner.groups.retain(|_, handles| !handles.is_empty());
            inner.joined.retain(|_, joined| *joined != handle);
        }
    }

    /// Join a namespaced broadcast group, resolving account and realm from
    /// the credential store when not provided.
    ///
    /// Silently does nothing when the key can't be built (blank component or
    /// admin realm) — an admin session has no business in recipient groups.
    /// Joins requested before the transport is ready are queued.
    pub async fn join_group(&self, group: &str, account: Option<&str>, realm: Option<&str>) {
        let account = account.map(str::to_string).or_else(|| self.store.account());
        let realm = realm.map(str::to_string).or_else(|| self.store.realm());
        let Some(full) = full_group_name(
            group,
            account.as_deref().unwrap_or(""),
            realm.as_deref().unwrap_or(""),
        ) else {
            debug!(group, "not joining: unresolvable or admin-scoped group");
            return;
        };

        {
            let mut inner = self.lock();
            if inner.joined.contains_key(&full) || inner.pending.contains(&full) {
                return;
            }
            if !inner.ready {
                debug!(group = %full, "transport not ready, queueing join");
                inner.pending.push(full);
                return;
            }
        }
        self.open_group(&full).await;
    }

    /// Mark the transport ready and flush queued joins.
    pub async fn set_ready(&self) {
        let pending = {
            let mut inner = self.lock();
            inner.ready = true;
            std::mem::take(&mut inner.pending)
        };
        for group in pending {
            self.open_group(&group).await;
        }
    }

    async fn open_group(&self, full: &str) {
        if self.lock().joined.contains_key(full) {
            return;
        }
        // group-level joins have no dedicated callback; payloads reach
        // consumers through the event bus
        match self.start_listening(full, |_| {}).await {
            Ok(handle) => {
                self.lock().joined.insert(full.to_string(), handle);
            }
            Err(err) => warn!(%err, group = %full, "failed to join group"),
        }
    }

    /// Leave one joined group.
    pub fn leave_group(&self, group: &str, account: Option<&str>, realm: Option<&str>) {
        let account = account.map(str::to_string).or_else(|| self.store.account());
        let realm = realm.map(str::to_string).or_else(|| self.store.realm());
        let Some(full) = full_group_name(
            group,
            account.as_deref().unwrap_or(""),
            realm.as_deref().unwrap_or(""),
        ) else {
            return;
        };
        self.lock().pending.retain(|g| g != &full);
        self.stop_listening(Some(&full), None);
    }

    /// Tear down every joined group. Called on realm change: membership is
    /// realm-scoped and must not persist across a switch.
    pub fn leave_all_groups(&self) {
        let joined: Vec<String> = {
            let mut inner = self.lock();
            inner.pending.clear();
            inner.joined.keys().cloned().collect()
        };
        for group in joined {
            self.stop_listening(Some(&group), None);
        }
    }

    /// Realm switched; current memberships are no longer valid.
    pub fn on_realm_changed(&self) {
        self.leave_all_groups();
    }

    /// Names of the currently joined namespaced groups.
    pub fn joined_groups(&self) -> Vec<String> {
        self.lock().joined.keys().cloned().collect()
    }
}

/// WebSocket transport over tokio-tungstenite. One reader task per
/// connection; closing aborts the reader and sends a close frame.
pub struct TungsteniteTransport;

struct WsConnectionHandle {
    shutdown: futures_channel::mpsc::UnboundedSender<()>,
    reader: tokio::task::JoinHandle<()>,
}

impl BroadcastConnection for WsConnectionHandle {
    fn close(&self) {
        self.reader.abort();
        let _ = self.shutdown.unbounded_send(());
    }
}

#[async_trait]
impl BroadcastTransport for TungsteniteTransport {
    async fn connect(
        &self,
        url: &str,
        on_message: MessageHandler,
    ) -> Result<Box<dyn BroadcastConnection>, Error> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let (mut write, mut read) = stream.split();

        let reader = tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => on_message(text.to_string()),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(%err, "broadcast socket error");
                        break;
                    }
                }
            }
        });

        let (shutdown_tx, mut shutdown_rx) = futures_channel::mpsc::unbounded();
        tokio::spawn(async move {
            let _ = shutdown_rx.next().await;
            let _ = write.send(Message::Close(None)).await;
        });

        Ok(Box::new(WsConnectionHandle { shutdown: shutdown_tx, reader }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StoreScope;
    use crate::storage::MemoryBackend;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Transport that records every connection and lets tests push frames.
    #[derive(Default)]
    struct MockTransport {
        conns: Mutex<Vec<MockConn>>,
    }

    struct MockConn {
        url: String,
        closed: Arc<AtomicBool>,
        deliver: Arc<dyn Fn(String) + Send + Sync>,
    }

    struct MockConnection {
        closed: Arc<AtomicBool>,
    }

    impl BroadcastConnection for MockConnection {
        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    impl MockTransport {
        fn connection_count(&self) -> usize {
            self.conns.lock().unwrap().len()
        }

        fn deliver(&self, index: usize, frame: &str) {
            let deliver = self.conns.lock().unwrap()[index].deliver.clone();
            deliver(frame.to_string());
        }

        fn closed(&self, index: usize) -> bool {
            self.conns.lock().unwrap()[index].closed.load(Ordering::SeqCst)
        }

        fn url(&self, index: usize) -> String {
            self.conns.lock().unwrap()[index].url.clone()
        }
    }

    #[async_trait]
    impl BroadcastTransport for MockTransport {
        async fn connect(
            &self,
            url: &str,
            on_message: MessageHandler,
        ) -> Result<Box<dyn BroadcastConnection>, Error> {
            let closed = Arc::new(AtomicBool::new(false));
            self.conns.lock().unwrap().push(MockConn {
                url: url.to_string(),
                closed: closed.clone(),
                deliver: Arc::from(on_message),
            });
            Ok(Box::new(MockConnection { closed }))
        }
    }

    fn registry() -> (BroadcastRegistry, Arc<MockTransport>, EventBus) {
        let backend = Arc::new(MemoryBackend::new());
        let store = CredentialStore::new(backend, StoreScope::Recipient);
        store.set_account("acct1");
        store.set_realm("realm1");
        let transport = Arc::new(MockTransport::default());
        let bus = EventBus::new();
        let registry =
            BroadcastRegistry::new(store, transport.clone(), bus.clone(), "io.example.com");
        (registry, transport, bus)
    }

    #[tokio::test]
    async fn listening_requires_a_group() {
        let (registry, _, _) = registry();
        let err = registry.start_listening("  ", |_| {}).await.unwrap_err();
        assert_eq!(err, Error::validation("group is required"));
    }

    #[tokio::test]
    async fn payloads_are_parsed_before_dispatch() {
        let (registry, transport, _) = registry();
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();

        registry
            .start_listening("acct1_realm1_alerts", move |payload| {
                received_clone.lock().unwrap().push(payload.clone());
            })
            .await
            .unwrap();

        assert_eq!(transport.url(0), "wss://io.example.com/acct1_realm1_alerts");
        transport.deliver(0, r#"{"subject":"hi"}"#);
        transport.deliver(0, "this is not json");

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["subject"], "hi");
    }

    #[tokio::test]
    async fn only_broadcast_event_channel_frames_are_dispatched() {
        let (registry, transport, _) = registry();
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();

        registry
            .start_listening("g", move |payload| {
                received_clone.lock().unwrap().push(payload.clone());
            })
            .await
            .unwrap();

        transport.deliver(0, r#"{"event":"broadcast-event","payload":{"subject":"hi"}}"#);
        transport.deliver(0, r#"{"event":"presence","payload":{"subject":"nope"}}"#);

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["subject"], "hi");
    }

    #[tokio::test]
    async fn broadcasts_are_also_emitted_on_the_bus() {
        let (registry, transport, bus) = registry();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        bus.subscribe(move |event| seen_clone.lock().unwrap().push(event.name().to_string()));

        registry.start_listening("g", |_| {}).await.unwrap();
        transport.deliver(0, r#"{"subject":"hi"}"#);
        assert_eq!(*seen.lock().unwrap(), vec!["broadcastReceived"]);
    }

    #[tokio::test]
    async fn stopping_by_group_closes_every_listener() {
        let (registry, transport, _) = registry();
        registry.start_listening("g1", |_| {}).await.unwrap();
        registry.start_listening("g1", |_| {}).await.unwrap();
        registry.start_listening("g2", |_| {}).await.unwrap();

        registry.stop_listening(Some("g1"), None);

        assert!(transport.closed(0));
        assert!(transport.closed(1));
        assert!(!transport.closed(2));
        assert!(registry.lock().groups.contains_key("g2"));
        assert_eq!(registry.lock().connections.len(), 1);
    }

    #[tokio::test]
    async fn stopping_by_handle_closes_only_that_listener() {
        let (registry, transport, _) = registry();
        let first = registry.start_listening("g1", |_| {}).await.unwrap();
        registry.start_listening("g1", |_| {}).await.unwrap();

        registry.stop_listening(None, Some(first));

        assert!(transport.closed(0));
        assert!(!transport.closed(1));
        assert_eq!(registry.lock().groups["g1"].len(), 1);
    }

    #[tokio::test]
    async fn stopping_with_no_arguments_is_a_no_op() {
        let (registry, transport, _) = registry();
        registry.start_listening("g1", |_| {}).await.unwrap();
        registry.stop_listening(None, None);
        assert!(!transport.closed(0));
        assert_eq!(registry.lock().connections.len(), 1);
    }

    #[tokio::test]
    async fn join_group_namespaces_by_account_and_realm() {
        let (registry, transport, _) = registry();
        registry.set_ready().await;
        registry.join_group("alerts", None, None).await;

        assert_eq!(registry.joined_groups(), vec!["acct1_realm1_alerts".to_string()]);
        assert_eq!(transport.url(0), "wss://io.example.com/acct1_realm1_alerts");
    }

    #[tokio::test]
    async fn admin_realm_joins_are_silently_refused() {
        let (registry, transport, _) = registry();
        registry.set_ready().await;
        registry.join_group("alerts", None, Some("admin")).await;
        assert!(registry.joined_groups().is_empty());
        assert_eq!(transport.connection_count(), 0);
    }

    #[tokio::test]
    async fn joins_are_queued_until_the_transport_is_ready() {
        let (registry, transport, _) = registry();
        registry.join_group("alerts", None, None).await;
        assert_eq!(transport.connection_count(), 0);

        registry.set_ready().await;
        assert_eq!(transport.connection_count(), 1);
        assert_eq!(registry.joined_groups(), vec!["acct1_realm1_alerts".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_joins_are_idempotent() {
        let (registry, transport, _) = registry();
        registry.set_ready().await;
        registry.join_group("alerts", None, None).await;
        registry.join_group("alerts", None, None).await;
        assert_eq!(transport.connection_count(), 1);
    }

    #[tokio::test]
    async fn leaving_all_groups_closes_every_connection() {
        let (registry, transport, _) = registry();
        registry.set_ready().await;
        registry.join_group("alerts", None, None).await;
        registry.join_group("weather", None, None).await;

        registry.on_realm_changed();

        assert!(registry.joined_groups().is_empty());
        assert!(transport.closed(0));
        assert!(transport.closed(1));
        assert!(registry.lock().connections.is_empty());
    }

    #[tokio::test]
    async fn leave_group_drops_a_pending_join() {
        let (registry, transport, _) = registry();
        registry.join_group("alerts", None, None).await;
        registry.leave_group("alerts", None, None);

        registry.set_ready().await;
        assert_eq!(transport.connection_count(), 0);
    }
}
