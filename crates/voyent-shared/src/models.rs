//! Wire and stored data models for the Voyent client SDK.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters for one token exchange with the auth service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenParams {
    pub account: String,
    pub realm: String,
    pub username: String,
    pub password: String,
    /// Optional host override; the issuer's configured base is used otherwise.
    pub host: Option<String>,
}

/// Request body for `POST .../token/`.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest {
    pub strategy: String,
    pub username: String,
    pub password: String,
}

impl TokenRequest {
    /// The only strategy the SDK uses.
    pub fn query(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            strategy: "query".to_string(),
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Response body of the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Token lifetime in milliseconds.
    pub expires_in: i64,
}

/// A freshly issued token together with its local issue timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub access_token: String,
    /// Token lifetime in milliseconds.
    pub expires_in: i64,
    /// Epoch milliseconds at which the token was stored locally.
    pub issued_at: i64,
}

impl TokenInfo {
    pub fn expires_at(&self) -> i64 {
        self.issued_at + self.expires_in
    }
}

/// Parameters accepted by `login` and `connect`.
///
/// Required fields are optional here so the session manager can report which
/// one is missing in its documented validation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginParams {
    pub account: Option<String>,
    /// Defaults to the admin realm when omitted.
    pub realm: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub admin: bool,
    /// Leave the last-active timestamp untouched on success.
    pub suppress_timestamp_update: bool,
}

/// Connection settings persisted across page loads / process restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectSettings {
    pub host: Option<String>,
    #[serde(default)]
    pub admin: bool,
}

/// A user-facing notification delivered via broadcast or fetched from a
/// mailbox.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Unique id; absent for ephemeral, purely local notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nid: Option<String>,
    /// Links the notification to an [`Alert`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    /// Redirect target when the notification is selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default = "default_notification_type")]
    pub notification_type: String,
    #[serde(default)]
    pub app_update: bool,
    #[serde(default)]
    pub read: bool,
    /// Whatever else rode along on the payload.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

fn default_notification_type() -> String {
    "alert".to_string()
}

impl Notification {
    /// A notification is worth queueing only if it carries a non-blank
    /// subject or detail, or flags an app update.
    pub fn is_valid(&self) -> bool {
        let non_blank = |s: &Option<String>| s.as_deref().is_some_and(|v| !v.trim().is_empty());
        non_blank(&self.subject) || non_blank(&self.detail) || self.app_update
    }
}

/// State of an individual alert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    #[default]
    Draft,
    Scheduled,
    Active,
    Ended,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertSchedule {
    #[serde(default)]
    pub recurring: bool,
}

/// Cached alert record associated with notifications via `alert_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub state: AlertState,
    /// Aggregate state of a scheduled alert's instances, distinct from the
    /// alert's own `state`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_state: Option<AlertState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<AlertSchedule>,
    /// Per-zone acknowledgement properties.
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
}

impl Alert {
    pub fn is_recurring(&self) -> bool {
        self.schedule.as_ref().is_some_and(|s| s.recurring)
    }

    /// A recurring alert is governed purely by its own state; a non-recurring
    /// alert by its family state, where `scheduled` already counts as active.
    pub fn is_active(&self) -> bool {
        if self.is_recurring() {
            self.state == AlertState::Active
        } else {
            matches!(
                self.family_state,
                Some(AlertState::Scheduled) | Some(AlertState::Active)
            )
        }
    }

    /// The ended check carries no `scheduled` special case. The asymmetry
    /// with [`Alert::is_active`] is part of the contract.
    pub fn is_ended(&self) -> bool {
        if self.is_recurring() {
            self.state == AlertState::Ended
        } else {
            self.family_state == Some(AlertState::Ended)
        }
    }
}

/// Incrementally maintained counters over the notification queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotificationCounts {
    pub active: u32,
    pub ended: u32,
    pub unread_active: u32,
    pub unread_ended: u32,
}
