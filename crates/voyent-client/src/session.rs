//! Session lifecycle: login, connect, token refresh scheduling and
//! inactivity-based disconnect.
//!
//! All session state is persisted through the [`CredentialStore`]; the
//! manager itself holds only the refresh in-flight flag and the timer task
//! handle, so a manager rebuilt after a process restart picks the session
//! back up from storage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use voyent_shared::{
    normalize_host, ConnectSettings, Error, LoginParams, TokenInfo, TokenParams, ADMIN_REALM,
};

use crate::credentials::CredentialStore;
use crate::events::{EventBus, SdkEvent};
use crate::token::TokenIssuer;

/// Timing knobs for the session lifecycle. Defaults match the production
/// service contract.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often the session timer ticks.
    pub timer_period: Duration,
    /// Inactivity window after which the session is torn down.
    pub inactivity_timeout: Duration,
    /// Refresh the token once it is this close to expiry.
    pub refresh_padding: Duration,
    /// Delay before the single refresh retry.
    pub refresh_retry_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timer_period: Duration::from_secs(60),
            inactivity_timeout: Duration::from_secs(20 * 60),
            refresh_padding: Duration::from_secs(5 * 60),
            refresh_retry_delay: Duration::from_secs(2),
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Owns login, the session timer, refresh scheduling and disconnect.
#[derive(Clone)]
pub struct SessionManager {
    store: CredentialStore,
    issuer: Arc<dyn TokenIssuer>,
    bus: EventBus,
    config: SessionConfig,
    refreshing: Arc<AtomicBool>,
    timer: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionManager {
    pub fn new(store: CredentialStore, issuer: Arc<dyn TokenIssuer>, bus: EventBus) -> Self {
        Self::with_config(store, issuer, bus, SessionConfig::default())
    }

    pub fn with_config(
        store: CredentialStore,
        issuer: Arc<dyn TokenIssuer>,
        bus: EventBus,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            issuer,
            bus,
            config,
            refreshing: Arc::new(AtomicBool::new(false)),
            timer: Arc::new(Mutex::new(None)),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Authenticate and persist the session.
    ///
    /// Validation order is part of the contract: account, then password,
    /// then username. The realm is defaulted, never validated.
    pub async fn login(&self, params: &LoginParams) -> Result<TokenInfo, Error> {
        let non_blank = |v: &Option<String>| {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
        };
        let account =
            non_blank(&params.account).ok_or_else(|| Error::validation("account is required"))?;
        let password =
            non_blank(&params.password).ok_or_else(|| Error::validation("password is required"))?;
        let username =
            non_blank(&params.username).ok_or_else(|| Error::validation("username is required"))?;
        let realm = non_blank(&params.realm).unwrap_or_else(|| ADMIN_REALM.to_string());

        let token_params = TokenParams {
            account: account.clone(),
            realm: realm.clone(),
            username: username.clone(),
            password,
            host: params.host.clone(),
        };
        let resp = self.issuer.issue(&token_params).await?;
        let issued_at = now_ms();

        self.store.set_account(&account);
        self.store.set_realm(&realm);
        self.store.set_username(&username);
        self.store.set_token(&resp.access_token);
        self.store.set_token_expires_in(resp.expires_in);
        self.store.set_token_set_at(issued_at);
        if !params.suppress_timestamp_update {
            self.store.set_last_active_at(issued_at);
        }
        self.store.set_admin(params.admin);
        if let Some(host) = &params.host {
            // hosts are stored scheme-free; the scheme is re-inferred at use
            self.store.set_host(&normalize_host(host));
        }

        info!(%account, %realm, %username, "login succeeded");
        self.bus.emit(&SdkEvent::LoginSucceeded { account, realm, username });

        Ok(TokenInfo {
            access_token: resp.access_token,
            expires_in: resp.expires_in,
            issued_at,
        })
    }

    /// Establish a connected session.
    ///
    /// A still-live session short-circuits with `Ok(None)`: connection
    /// settings are persisted and the timer (re)started, but no network call
    /// is made. Otherwise this logs in, persists the normalized username and
    /// the password for later refreshes, and starts the timer.
    pub async fn connect(&self, params: &LoginParams) -> Result<Option<TokenInfo>, Error> {
        let settings = ConnectSettings { host: params.host.clone(), admin: params.admin };

        if self.is_logged_in() {
            debug!("connect: session still live, skipping re-authentication");
            self.store.set_connect_settings(&settings);
            if let Some(host) = &params.host {
                self.store.set_host(&normalize_host(host));
            }
            self.store.set_admin(params.admin);
            self.start_session_timer();
            return Ok(None);
        }

        let info = self.login(params).await?;

        // the service treats usernames case-insensitively and answers with
        // the lowercase form
        if let Some(username) = params.username.as_deref() {
            self.store.set_username(&username.trim().to_lowercase());
        }
        if let Some(password) = params.password.as_deref() {
            self.store.set_password(password);
        }
        self.store.set_connect_settings(&settings);
        self.start_session_timer();

        Ok(Some(info))
    }

    /// Tear down the session: clear every credential field and stop the
    /// timer. Idempotent.
    pub fn disconnect(&self) {
        self.store.clear_session();
        if let Some(handle) = self
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
        debug!("disconnected, credentials cleared");
    }

    /// Token present and not past its expiry. Missing or unparseable stored
    /// values read as "not logged in".
    pub fn is_logged_in(&self) -> bool {
        if self.store.token().is_none() {
            return false;
        }
        match (self.store.token_set_at(), self.store.token_expires_in()) {
            (Some(set_at), Some(expires_in)) => now_ms() < set_at + expires_in,
            _ => false,
        }
    }

    /// Activity hook. Embedding apps call this from their input events to
    /// reset the inactivity clock.
    pub fn touch(&self) {
        self.store.set_last_active_at(now_ms());
    }

    /// Whether the session timer is currently running.
    pub fn timer_running(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Start (or restart) the recurring session timer. At most one timer
    /// task exists per manager.
    pub fn start_session_timer(&self) {
        let mut guard = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = guard.take() {
            previous.abort();
        }
        let manager = self.clone();
        let period = self.config.timer_period;
        *guard = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick of a tokio interval fires immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                if !manager.tick().await {
                    break;
                }
            }
        }));
    }

    /// One timer tick. Returns `false` when the session ended and the timer
    /// should stop.
    async fn tick(&self) -> bool {
        // still-connected guard: a disconnect may have raced this tick
        let (Some(set_at), Some(expires_in)) =
            (self.store.token_set_at(), self.store.token_expires_in())
        else {
            return false;
        };
        if self.store.token().is_none() {
            return false;
        }

        let now = now_ms();
        let expires_at = set_at + expires_in;
        let last_active = self.store.last_active_at().unwrap_or(set_at);
        let inactive_ms = now - last_active;

        if expires_at <= now || inactive_ms > self.config.inactivity_timeout.as_millis() as i64 {
            info!(inactive_ms, "session expired or inactive, disconnecting");
            self.disconnect();
            self.bus.emit(&SdkEvent::SessionExpired);
            return false;
        }

        if expires_at - self.config.refresh_padding.as_millis() as i64 <= now {
            // rejection is already retried and reported inside
            // refresh_access_token
            if let Err(err) = self.refresh_access_token().await {
                debug!(%err, "scheduled token refresh failed");
            }
        }

        true
    }

    /// Exchange the stored credentials for a fresh token.
    ///
    /// At most one refresh is in flight at a time; an overlapping call
    /// resolves immediately with `Ok(None)` without learning the real
    /// outcome. A failed attempt is retried exactly once after a fixed
    /// delay; the second failure emits `voyent-access-token-refresh-failed`
    /// and rejects.
    pub async fn refresh_access_token(&self) -> Result<Option<TokenInfo>, Error> {
        if self.refreshing.swap(true, Ordering::SeqCst) {
            debug!("refresh already in flight, resolving as no-op");
            return Ok(None);
        }

        let result = self.refresh_with_retry().await;
        self.refreshing.store(false, Ordering::SeqCst);

        match &result {
            Ok(info) => {
                self.bus.emit(&SdkEvent::TokenRefreshed {
                    access_token: info.access_token.clone(),
                });
            }
            Err(err) => {
                self.bus.emit(&SdkEvent::TokenRefreshFailed { reason: err.to_string() });
            }
        }
        result.map(Some)
    }

    async fn refresh_with_retry(&self) -> Result<TokenInfo, Error> {
        let params = match self.stored_token_params() {
            Some(params) if self.is_logged_in() => params,
            _ => return Err(Error::NotConnected),
        };

        match self.reissue(&params).await {
            Ok(info) => Ok(info),
            Err(first) => {
                warn!(%first, "token refresh failed, retrying once");
                tokio::time::sleep(self.config.refresh_retry_delay).await;
                self.reissue(&params)
                    .await
                    .map_err(|second| Error::RefreshFailed(second.to_string()))
            }
        }
    }

    async fn reissue(&self, params: &TokenParams) -> Result<TokenInfo, Error> {
        let resp = self.issuer.issue(params).await?;
        let issued_at = now_ms();
        self.store.set_token(&resp.access_token);
        self.store.set_token_expires_in(resp.expires_in);
        self.store.set_token_set_at(issued_at);
        Ok(TokenInfo {
            access_token: resp.access_token,
            expires_in: resp.expires_in,
            issued_at,
        })
    }

    fn stored_token_params(&self) -> Option<TokenParams> {
        Some(TokenParams {
            account: self.store.account()?,
            realm: self.store.realm()?,
            username: self.store.username()?,
            password: self.store.password()?,
            host: self.store.host(),
        })
    }
}
