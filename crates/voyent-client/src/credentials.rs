//! Credential store: the single owner of persisted session state.
//!
//! Key names and values are base64 encoded before they hit the backend, and
//! every key carries a scope suffix so an admin console and a recipient app
//! sharing one backend never collide. All readers and writers go through the
//! typed accessors here; nothing else touches these keys.
//!
//! Unparseable stored values read back as `None`. A corrupted entry means
//! "not logged in", never a panic.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use voyent_shared::ConnectSettings;

use crate::storage::StorageBackend;

const TRANSACTION_KEY: &str = "voyentTransaction";
const REALM_KEY: &str = "voyentRealm";
const ADMIN_KEY: &str = "voyentAdmin";
const USERNAME_KEY: &str = "voyentUsername";
const ACCOUNT_KEY: &str = "voyentAccount";
const HOST_KEY: &str = "voyentHost";
const TOKEN_KEY: &str = "voyentToken";
const TOKEN_EXPIRES_KEY: &str = "voyentTokenExpires";
const TOKEN_SET_KEY: &str = "voyentTokenSet";
const PASSWORD_KEY: &str = "voyentPassword";
const CONNECT_SETTINGS_KEY: &str = "voyentConnectSettings";
const LAST_ACTIVE_KEY: &str = "voyentLastActive";
const INJECT_KEY: &str = "voyentNotificationToInject";

const SESSION_KEYS: &[&str] = &[
    TRANSACTION_KEY,
    REALM_KEY,
    ADMIN_KEY,
    USERNAME_KEY,
    ACCOUNT_KEY,
    HOST_KEY,
    TOKEN_KEY,
    TOKEN_EXPIRES_KEY,
    TOKEN_SET_KEY,
    PASSWORD_KEY,
    CONNECT_SETTINGS_KEY,
    LAST_ACTIVE_KEY,
];

/// Which context a store serves; becomes part of every key name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreScope {
    Admin,
    Recipient,
}

impl StoreScope {
    fn suffix(self) -> &'static str {
        match self {
            StoreScope::Admin => "admin",
            StoreScope::Recipient => "recipient",
        }
    }
}

/// Typed accessors over an injected [`StorageBackend`].
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn StorageBackend>,
    scope: StoreScope,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn StorageBackend>, scope: StoreScope) -> Self {
        Self { backend, scope }
    }

    fn key(&self, name: &str) -> String {
        BASE64.encode(format!("{}_{}", name, self.scope.suffix()))
    }

    fn get_raw(&self, name: &str) -> Option<String> {
        let encoded = self.backend.get(&self.key(name))?;
        let bytes = BASE64.decode(encoded).ok()?;
        String::from_utf8(bytes).ok()
    }

    fn set_raw(&self, name: &str, value: &str) {
        self.backend.set(&self.key(name), &BASE64.encode(value));
    }

    fn remove_raw(&self, name: &str) {
        self.backend.remove(&self.key(name));
    }

    // --- Strings ---

    pub fn account(&self) -> Option<String> {
        self.get_raw(ACCOUNT_KEY)
    }

    pub fn set_account(&self, account: &str) {
        self.set_raw(ACCOUNT_KEY, account);
    }

    pub fn realm(&self) -> Option<String> {
        self.get_raw(REALM_KEY)
    }

    pub fn set_realm(&self, realm: &str) {
        self.set_raw(REALM_KEY, realm);
    }

    pub fn username(&self) -> Option<String> {
        self.get_raw(USERNAME_KEY)
    }

    pub fn set_username(&self, username: &str) {
        self.set_raw(USERNAME_KEY, username);
    }

    pub fn password(&self) -> Option<String> {
        self.get_raw(PASSWORD_KEY)
    }

    pub fn set_password(&self, password: &str) {
        self.set_raw(PASSWORD_KEY, password);
    }

    pub fn host(&self) -> Option<String> {
        self.get_raw(HOST_KEY)
    }

    pub fn set_host(&self, host: &str) {
        self.set_raw(HOST_KEY, host);
    }

    pub fn token(&self) -> Option<String> {
        self.get_raw(TOKEN_KEY)
    }

    pub fn set_token(&self, token: &str) {
        self.set_raw(TOKEN_KEY, token);
    }

    pub fn transaction_id(&self) -> Option<String> {
        self.get_raw(TRANSACTION_KEY)
    }

    pub fn set_transaction_id(&self, tx: &str) {
        self.set_raw(TRANSACTION_KEY, tx);
    }

    pub fn clear_transaction_id(&self) {
        self.remove_raw(TRANSACTION_KEY);
    }

    // --- Timestamps and durations (epoch / duration milliseconds) ---

    pub fn token_expires_in(&self) -> Option<i64> {
        self.get_raw(TOKEN_EXPIRES_KEY)?.parse().ok()
    }

    pub fn set_token_expires_in(&self, ms: i64) {
        self.set_raw(TOKEN_EXPIRES_KEY, &ms.to_string());
    }

    pub fn token_set_at(&self) -> Option<i64> {
        self.get_raw(TOKEN_SET_KEY)?.parse().ok()
    }

    pub fn set_token_set_at(&self, epoch_ms: i64) {
        self.set_raw(TOKEN_SET_KEY, &epoch_ms.to_string());
    }

    pub fn last_active_at(&self) -> Option<i64> {
        self.get_raw(LAST_ACTIVE_KEY)?.parse().ok()
    }

    pub fn set_last_active_at(&self, epoch_ms: i64) {
        self.set_raw(LAST_ACTIVE_KEY, &epoch_ms.to_string());
    }

    // --- Flags ---

    pub fn is_admin(&self) -> bool {
        self.get_raw(ADMIN_KEY).as_deref() == Some("true")
    }

    /// Set or clear the admin marker.
    pub fn set_admin(&self, admin: bool) {
        if admin {
            self.set_raw(ADMIN_KEY, "true");
        } else {
            self.remove_raw(ADMIN_KEY);
        }
    }

    // --- JSON blobs ---

    pub fn connect_settings(&self) -> Option<ConnectSettings> {
        serde_json::from_str(&self.get_raw(CONNECT_SETTINGS_KEY)?).ok()
    }

    pub fn set_connect_settings(&self, settings: &ConnectSettings) {
        if let Ok(json) = serde_json::to_string(settings) {
            self.set_raw(CONNECT_SETTINGS_KEY, &json);
        }
    }

    // --- Selected-notification survival (keyed by username) ---

    pub fn injected_nid(&self, username: &str) -> Option<String> {
        self.get_raw(&format!("{INJECT_KEY}_{username}"))
    }

    pub fn set_injected_nid(&self, username: &str, nid: &str) {
        self.set_raw(&format!("{INJECT_KEY}_{username}"), nid);
    }

    pub fn clear_injected_nid(&self, username: &str) {
        self.remove_raw(&format!("{INJECT_KEY}_{username}"));
    }

    /// Remove every session-scoped key. Injected notification ids are kept;
    /// they must survive a redirect that tears the session down.
    pub fn clear_session(&self) {
        for name in SESSION_KEYS {
            self.remove_raw(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    fn store() -> CredentialStore {
        CredentialStore::new(Arc::new(MemoryBackend::new()), StoreScope::Recipient)
    }

    #[test]
    fn values_are_base64_encoded_at_rest() {
        let backend = Arc::new(MemoryBackend::new());
        let store = CredentialStore::new(backend.clone(), StoreScope::Recipient);
        store.set_account("acct1");

        let keys = backend.keys();
        assert_eq!(keys.len(), 1);
        // neither the key name nor the value appears in the clear
        assert!(!keys[0].contains("voyent"));
        assert_ne!(backend.get(&keys[0]).as_deref(), Some("acct1"));
        assert_eq!(store.account().as_deref(), Some("acct1"));
    }

    #[test]
    fn scopes_do_not_collide() {
        let backend = Arc::new(MemoryBackend::new());
        let admin = CredentialStore::new(backend.clone(), StoreScope::Admin);
        let recipient = CredentialStore::new(backend, StoreScope::Recipient);

        admin.set_token("admin-token");
        recipient.set_token("recipient-token");

        assert_eq!(admin.token().as_deref(), Some("admin-token"));
        assert_eq!(recipient.token().as_deref(), Some("recipient-token"));
    }

    #[test]
    fn garbage_values_read_as_none() {
        let backend = Arc::new(MemoryBackend::new());
        let store = CredentialStore::new(backend.clone(), StoreScope::Recipient);

        // valid base64, garbage number
        store.set_token_expires_in(5000);
        assert_eq!(store.token_expires_in(), Some(5000));
        backend.set(&store.key(TOKEN_EXPIRES_KEY), &BASE64.encode("not-a-number"));
        assert_eq!(store.token_expires_in(), None);

        // not even base64
        backend.set(&store.key(TOKEN_KEY), "%%%%");
        assert_eq!(store.token(), None);
    }

    #[test]
    fn admin_marker_is_set_or_cleared() {
        let store = store();
        assert!(!store.is_admin());
        store.set_admin(true);
        assert!(store.is_admin());
        store.set_admin(false);
        assert!(!store.is_admin());
    }

    #[test]
    fn clear_session_removes_all_session_keys() {
        let backend = Arc::new(MemoryBackend::new());
        let store = CredentialStore::new(backend.clone(), StoreScope::Recipient);

        store.set_account("a");
        store.set_realm("r");
        store.set_username("u");
        store.set_password("p");
        store.set_token("t");
        store.set_token_expires_in(1000);
        store.set_token_set_at(2000);
        store.set_last_active_at(3000);
        store.set_admin(true);
        store.set_host("h");
        store.set_transaction_id("tx");
        store.set_connect_settings(&ConnectSettings::default());

        store.clear_session();
        assert!(backend.keys().is_empty());
    }

    #[test]
    fn injected_nid_survives_session_clear() {
        let store = store();
        store.set_injected_nid("alice", "n42");
        store.clear_session();
        assert_eq!(store.injected_nid("alice").as_deref(), Some("n42"));
        store.clear_injected_nid("alice");
        assert_eq!(store.injected_nid("alice"), None);
    }
}
