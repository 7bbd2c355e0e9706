//! Realm-scoped service URL assembly and the alert read path.

use async_trait::async_trait;
use reqwest::Client;

use voyent_shared::{Alert, Error};

use crate::credentials::CredentialStore;
use crate::token::base_url_for_host;

/// Build a realm-scoped service URL:
/// `{base}/{account}/realms/{realm}/{path}?access_token={token}[&tx={id}]`.
pub fn service_url(
    base: &str,
    account: &str,
    realm: &str,
    path: &str,
    access_token: &str,
    tx: Option<&str>,
) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    let mut url = format!(
        "{base}/{account}/realms/{realm}/{path}?access_token={}",
        urlencoding::encode(access_token)
    );
    if let Some(tx) = tx {
        url.push_str("&tx=");
        url.push_str(&urlencoding::encode(tx));
    }
    url
}

/// Read path for alert records, injected into the notification manager.
#[async_trait]
pub trait AlertFetcher: Send + Sync {
    /// `Ok(None)` means the alert is gone or not readable; only transport
    /// and decode problems are errors.
    async fn fetch_alert(&self, alert_id: &str) -> Result<Option<Alert>, Error>;
}

/// HTTP implementation reading from the event service, resolving account,
/// realm and token from the credential store per request.
pub struct HttpAlertFetcher {
    client: Client,
    base: String,
    store: CredentialStore,
}

impl HttpAlertFetcher {
    pub fn new(service_host: impl AsRef<str>, store: CredentialStore) -> Self {
        Self {
            client: Client::new(),
            base: base_url_for_host(service_host.as_ref()),
            store,
        }
    }
}

#[async_trait]
impl AlertFetcher for HttpAlertFetcher {
    async fn fetch_alert(&self, alert_id: &str) -> Result<Option<Alert>, Error> {
        let (account, realm, token) =
            match (self.store.account(), self.store.realm(), self.store.token()) {
                (Some(account), Some(realm), Some(token)) => (account, realm, token),
                _ => return Err(Error::NotConnected),
            };

        let url = service_url(
            &self.base,
            &account,
            &realm,
            &format!("alerts/{alert_id}"),
            &token,
            self.store.transaction_id().as_deref(),
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = resp.status();
        // a 403 on this read path means "not found / not authorized", not a
        // hard failure
        if status.as_u16() == 403 {
            return Ok(None);
        }

        let text = resp
            .text()
            .await
            .map_err(|e| Error::Network(format!("failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(Error::Http { status: status.as_u16(), body: text });
        }

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| Error::Deserialize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_urls_carry_token_and_transaction() {
        let url = service_url(
            "https://api.example.com/",
            "acct1",
            "realm1",
            "/alerts/a1",
            "tok en",
            Some("tx1"),
        );
        assert_eq!(
            url,
            "https://api.example.com/acct1/realms/realm1/alerts/a1?access_token=tok%20en&tx=tx1"
        );
    }

    #[test]
    fn transaction_is_omitted_when_absent() {
        let url = service_url("https://api.example.com", "a", "r", "docs", "t", None);
        assert_eq!(url, "https://api.example.com/a/realms/r/docs?access_token=t");
    }
}
