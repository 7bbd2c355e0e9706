//! Token issuer client.
//!
//! Exchanges username/password for an access token. Stateless; session
//! bookkeeping lives in [`crate::session`].

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use voyent_shared::{is_local_address, Error, TokenParams, TokenRequest, TokenResponse};

/// Issues access tokens. Injected into the session manager so tests can
/// count and fail calls.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self, params: &TokenParams) -> Result<TokenResponse, Error>;
}

/// Resolve a host string to an HTTP base URL, inferring the scheme for
/// local/development hosts.
pub fn base_url_for_host(host: &str) -> String {
    if host.contains("://") {
        return host.trim_end_matches('/').to_string();
    }
    let host = host.trim_end_matches('/');
    if is_local_address(host) {
        format!("http://{host}")
    } else {
        format!("https://{host}")
    }
}

/// HTTP implementation talking to the auth service.
#[derive(Debug, Clone)]
pub struct HttpTokenIssuer {
    client: Client,
    auth_base: String,
}

impl HttpTokenIssuer {
    pub fn new(auth_host: impl AsRef<str>) -> Self {
        Self {
            client: Client::new(),
            auth_base: base_url_for_host(auth_host.as_ref()),
        }
    }

    fn token_url(&self, params: &TokenParams) -> Result<Url, Error> {
        let base = params
            .host
            .as_deref()
            .map(base_url_for_host)
            .unwrap_or_else(|| self.auth_base.clone());
        let raw = format!(
            "{}/{}/realms/{}/token/",
            base.trim_end_matches('/'),
            params.account,
            params.realm
        );
        Url::parse(&raw).map_err(|_| Error::validation(format!("invalid token endpoint: {raw}")))
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn issue(&self, params: &TokenParams) -> Result<TokenResponse, Error> {
        let url = self.token_url(params)?;
        let body = TokenRequest::query(&params.username, &params.password);

        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Network(format!("failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(Error::Http { status: status.as_u16(), body: text });
        }

        serde_json::from_str(&text).map_err(|e| Error::Deserialize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_hosts_get_http_remote_hosts_https() {
        assert_eq!(base_url_for_host("localhost:55010"), "http://localhost:55010");
        assert_eq!(base_url_for_host("api.voyent.cloud"), "https://api.voyent.cloud");
        assert_eq!(base_url_for_host("https://api.voyent.cloud/"), "https://api.voyent.cloud");
    }

    #[test]
    fn token_url_is_account_and_realm_scoped() {
        let issuer = HttpTokenIssuer::new("auth.example.com");
        let params = TokenParams {
            account: "acct1".to_string(),
            realm: "realm1".to_string(),
            username: "alice".to_string(),
            password: "pw".to_string(),
            host: None,
        };
        let url = issuer.token_url(&params).unwrap();
        assert_eq!(url.as_str(), "https://auth.example.com/acct1/realms/realm1/token/");
    }

    #[test]
    fn host_override_wins_over_configured_base() {
        let issuer = HttpTokenIssuer::new("auth.example.com");
        let params = TokenParams {
            account: "acct1".to_string(),
            realm: "realm1".to_string(),
            username: "alice".to_string(),
            password: "pw".to_string(),
            host: Some("localhost:55010".to_string()),
        };
        let url = issuer.token_url(&params).unwrap();
        assert_eq!(url.as_str(), "http://localhost:55010/acct1/realms/realm1/token/");
    }
}
