//! OpenID Connect identity provider client.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use super::gateway::parse_base;
use super::{check_response, ApiError, REQUEST_TIMEOUT_SECS};
use crate::auth::{AuthError, AuthMechanism, Credential, CredentialCache};
use crate::browser::Navigator;
use crate::clock::Clock;
use crate::models::{TokenPair, UserInfo};
use crate::storage::Storage;

const TOKEN_PATH: &str = "protocol/openid-connect/token";
const USERINFO_PATH: &str = "protocol/openid-connect/userinfo";
const AUTH_PATH: &str = "protocol/openid-connect/auth";
const LOGOUT_PATH: &str = "protocol/openid-connect/logout";
const SCOPE: &str = "openid profile email";

#[derive(Clone, Debug)]
pub struct OidcClient {
    client: Client,
    realm_url: Url,
    client_id: String,
    redirect_uri: String,
}

impl OidcClient {
    /// `url` is the identity provider root, e.g. `http://host/auth`.
    pub fn new(url: &str, realm: &str, client_id: &str, redirect_uri: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let realm_url = parse_base(url)?.join(&format!("realms/{}/", realm))?;

        Ok(Self {
            client,
            realm_url,
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
        })
    }

    pub fn realm_url(&self) -> &Url {
        &self.realm_url
    }

    /// Refresh-token grant.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let url = self.realm_url.join(TOKEN_PATH)?;
        debug!(%url, "Refreshing identity provider session");

        let response = self
            .client
            .post(url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;
        let response = check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("token: {}", e)))
    }

    pub async fn userinfo(&self, token: &str) -> Result<UserInfo, ApiError> {
        let url = self.realm_url.join(USERINFO_PATH)?;
        let response = self.client.get(url).bearer_auth(token).send().await?;
        let response = check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("userinfo: {}", e)))
    }

    /// Authorization endpoint for an interactive, authorization-code login.
    ///
    /// A non-empty `return_fragment` is appended to the redirect URI so the
    /// page comes back with its handoff marker intact.
    pub fn authorization_url(
        &self,
        return_fragment: &str,
        state: Option<&str>,
    ) -> Result<Url, ApiError> {
        let return_fragment = return_fragment.strip_prefix('#').unwrap_or(return_fragment);
        let redirect_uri = if return_fragment.is_empty() {
            self.redirect_uri.clone()
        } else {
            format!("{}#{}", self.redirect_uri, return_fragment)
        };

        let mut url = self.realm_url.join(AUTH_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", SCOPE);
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }
        Ok(url)
    }

    pub fn logout_url(&self, post_logout_redirect_uri: &str) -> Result<Url, ApiError> {
        let mut url = self.realm_url.join(LOGOUT_PATH)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("post_logout_redirect_uri", post_logout_redirect_uri);
        Ok(url)
    }
}

/// Authentication against the identity provider using its refresh token.
///
/// Interactive login sends no `state`: the callback page that completes
/// the code exchange issues and verifies it.
pub struct OidcMechanism<S, N, C> {
    client: OidcClient,
    cache: CredentialCache<S>,
    navigator: N,
    clock: C,
    min_validity_secs: i64,
    return_fragment: String,
}

impl<S: Storage, N: Navigator, C: Clock> OidcMechanism<S, N, C> {
    pub fn new(
        client: OidcClient,
        cache: CredentialCache<S>,
        navigator: N,
        clock: C,
        min_validity_secs: i64,
    ) -> Self {
        Self {
            client,
            cache,
            navigator,
            clock,
            min_validity_secs,
            return_fragment: String::new(),
        }
    }

    /// Fragment of the current page, carried through the login round trip.
    pub fn with_return_fragment(mut self, fragment: &str) -> Self {
        self.return_fragment = fragment.to_string();
        self
    }

    pub fn client(&self) -> &OidcClient {
        &self.client
    }
}

impl<S: Storage, N: Navigator, C: Clock> AuthMechanism for OidcMechanism<S, N, C> {
    fn cached_session(&self) -> Result<Option<Credential>, AuthError> {
        Ok(self.cache.load()?)
    }

    async fn silent_renew(&mut self) -> Result<Option<Credential>, AuthError> {
        let Some(cached) = self.cache.load()? else {
            return Ok(None);
        };
        let now = self.clock.now();
        if !cached.needs_refresh_at(now, self.min_validity_secs) {
            return Ok(Some(cached));
        }
        let Some(refresh_token) = cached.refresh_token.as_deref() else {
            debug!("No refresh token, interactive login required");
            return Ok(None);
        };

        match self.client.refresh(refresh_token).await {
            Ok(pair) => {
                let credential = Credential::from_pair(&pair, self.clock.now());
                self.cache.store(&credential)?;
                Ok(Some(credential))
            }
            Err(e) if e.is_transport() => Err(e.into()),
            Err(e) => {
                info!(error = %e, "Identity provider refused refresh");
                self.cache.clear()?;
                Ok(None)
            }
        }
    }

    async fn interactive_login(&mut self) -> Result<(), AuthError> {
        let url = self.client.authorization_url(&self.return_fragment, None)?;
        info!("Redirecting to identity provider login");
        self.navigator.navigate(url.as_str());
        Ok(())
    }

    async fn sign_out(&mut self) -> Result<(), AuthError> {
        if let Err(e) = self.cache.clear() {
            warn!(error = %e, "Failed to clear cached credential before logout");
        }
        let url = self.client.logout_url(&self.client.redirect_uri)?;
        self.navigator.navigate(url.as_str());
        Ok(())
    }

    fn clear_local(&mut self) -> Result<(), AuthError> {
        Ok(self.cache.clear()?)
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo, AuthError> {
        Ok(self.client.userinfo(access_token).await?)
    }
}
