//! Shared data model, protocol helpers and error types for the Voyent
//! client SDK.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::Error;
pub use models::{
    Alert, AlertSchedule, AlertState, ConnectSettings, LoginParams, Notification,
    NotificationCounts, TokenInfo, TokenParams, TokenRequest, TokenResponse,
};
pub use protocol::{
    full_group_name, http_to_ws, is_local_address, normalize_host, ADMIN_REALM, BROADCAST_EVENT,
};
