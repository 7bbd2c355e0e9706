//! Voyent client SDK.
//!
//! Typed client for the Voyent services, covering the stateful core of the
//! browser SDK: the session lifecycle (login, token refresh scheduling,
//! inactivity disconnect), the broadcast group registry, and the
//! notification queue with its toast stacking model.
//!
//! All state lives on explicit instances wired together through injected
//! interfaces ([`storage::StorageBackend`], [`token::TokenIssuer`],
//! [`broadcast::BroadcastTransport`], [`api::AlertFetcher`]), so embedders
//! and tests can supply their own implementations.

pub mod api;
pub mod broadcast;
pub mod credentials;
pub mod events;
pub mod logging;
pub mod notify;
pub mod session;
pub mod storage;
pub mod toast;
pub mod token;

pub use api::{AlertFetcher, HttpAlertFetcher};
pub use broadcast::{
    BroadcastConnection, BroadcastRegistry, BroadcastTransport, ListenerHandle,
    TungsteniteTransport,
};
pub use credentials::{CredentialStore, StoreScope};
pub use events::{EventBus, EventSubscription, MessageDuration, MessageLevel, SdkEvent};
pub use notify::{NotificationManager, NotifyConfig};
pub use session::{SessionConfig, SessionManager};
pub use storage::{FileBackend, MemoryBackend, StorageBackend};
pub use toast::{
    DisplayOutcome, SlideDirection, ToastConfig, ToastCorner, ToastId, ToastManager,
};
pub use token::{HttpTokenIssuer, TokenIssuer};
